//! Shared contracts between the xflow scheduler and its component runtimes.

pub mod capability;
pub mod descriptor;
pub mod sandbox;

pub use capability::{
    blocked_modules, blocked_primitives, is_dangerous_attribute, CapabilitySet, IsolationLevel,
    ParseIsolationLevelError, DANGEROUS_ATTRIBUTES, HOST_PRIMITIVES, ISOLATION_LEVEL_ENV,
};
pub use descriptor::{ComponentDescriptor, OutputSpec, DEFAULT_ENTRY_POINT, DEFAULT_OUTPUT_NAME};
pub use sandbox::{
    BuildOutput, BuildRequest, CodeAnalysisResult, CodeLanguage, CodeViolation, CompiledComponent,
    ComponentRuntime, SandboxError, SandboxLimits, SandboxPolicy, ViolationKind,
};
