//! Sandboxed component loading.
//!
//! The language runtimes live in their own crates behind the
//! [`ComponentRuntime`](xflow_types::ComponentRuntime) trait; this module
//! owns the compile cache and parameter resolution.

pub mod loader;

#[cfg(test)]
pub(crate) mod testing;

pub use loader::{BuildContext, ComponentLoader, LoaderStats};
pub use xflow_types::{
    BuildOutput, BuildRequest, CodeLanguage, CompiledComponent, ComponentRuntime, SandboxError,
    SandboxLimits, SandboxPolicy,
};
