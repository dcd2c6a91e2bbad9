//! Built-in JavaScript component runtime for xflow, powered by boa_engine.

pub mod analyzer;
mod host;
mod modules;
pub mod sandbox;

pub use analyzer::{ComponentAnalyzer, REQUIRE_HOOK};
pub use modules::HOST_MODULES;
pub use sandbox::{JsComponentRuntime, JsRuntimeConfig};

pub use boa_engine;
