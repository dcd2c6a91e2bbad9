//! Capability registry: which primitives and modules a component namespace
//! may reach at each [`IsolationLevel`].
//!
//! The tables are static. A [`CapabilitySet`] is derived per build by copying
//! [`HOST_PRIMITIVES`] and deleting the entries blocked at the active level.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment variable holding the process-wide isolation level.
pub const ISOLATION_LEVEL_ENV: &str = "XFLOW_SANDBOX_SECURITY_LEVEL";

/// Isolation level applied when executing component source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// No restriction. Trusted contexts only.
    Disabled,
    /// Blocks code evaluation, process/file/module introspection and file opening.
    #[default]
    Moderate,
    /// Moderate plus anything with side effects beyond pure computation.
    Strict,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::Disabled => "disabled",
            IsolationLevel::Moderate => "moderate",
            IsolationLevel::Strict => "strict",
        }
    }

    /// Read the level from [`ISOLATION_LEVEL_ENV`], falling back to the default
    /// when unset or unparseable.
    pub fn from_env() -> Self {
        std::env::var(ISOLATION_LEVEL_ENV)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown isolation level: {0}")]
pub struct ParseIsolationLevelError(pub String);

impl FromStr for IsolationLevel {
    type Err = ParseIsolationLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" | "off" => Ok(IsolationLevel::Disabled),
            "moderate" => Ok(IsolationLevel::Moderate),
            "strict" => Ok(IsolationLevel::Strict),
            other => Err(ParseIsolationLevelError(other.to_string())),
        }
    }
}

/// Every global name the host is able to expose to a component namespace.
/// Anything the engine provides that is not listed here is removed before
/// component code runs.
pub const HOST_PRIMITIVES: &[&str] = &[
    // language core
    "undefined",
    "NaN",
    "Infinity",
    "Object",
    "Function",
    "Array",
    "Number",
    "Boolean",
    "String",
    "Symbol",
    "BigInt",
    "Math",
    "JSON",
    "Date",
    "RegExp",
    "Map",
    "Set",
    "WeakMap",
    "WeakSet",
    "Promise",
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
    "EvalError",
    "URIError",
    "AggregateError",
    "ArrayBuffer",
    "DataView",
    "Uint8Array",
    "Int8Array",
    "Uint16Array",
    "Int16Array",
    "Uint32Array",
    "Int32Array",
    "Float32Array",
    "Float64Array",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "encodeURIComponent",
    "decodeURIComponent",
    "encodeURI",
    "decodeURI",
    // evaluation and introspection
    "eval",
    "Reflect",
    "Proxy",
    "globalThis",
    "WeakRef",
    "FinalizationRegistry",
    "SharedArrayBuffer",
    "Atomics",
    // host interface
    "console",
    "open",
    "require",
    "getattr",
    "hasattr",
    "Data",
    "Message",
];

const MODERATE_BLOCKED_PRIMITIVES: &[&str] = &[
    "eval",
    "Function",
    "Reflect",
    "Proxy",
    "globalThis",
    "WeakRef",
    "FinalizationRegistry",
    "SharedArrayBuffer",
    "Atomics",
    "open",
];

const STRICT_EXTRA_BLOCKED_PRIMITIVES: &[&str] = &["console", "Date"];

const MODERATE_BLOCKED_MODULES: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "child_process",
    "fs",
    "pty",
    "posix",
    "fcntl",
    "ctypes",
    "signal",
    "importlib",
    "builtins",
    "process",
];

const STRICT_EXTRA_BLOCKED_MODULES: &[&str] = &[
    "requests",
    "http",
    "socket",
    "net",
    "urllib",
    "asyncio",
    "tempfile",
    "time",
    "uuid",
    "random",
    "threading",
    "multiprocessing",
];

/// Reflective attribute names that are never readable through the interposed
/// accessors and never accepted as raw attribute syntax.
pub const DANGEROUS_ATTRIBUTES: &[&str] = &[
    "__proto__",
    "constructor",
    "prototype",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
    "caller",
    "callee",
];

pub fn is_dangerous_attribute(name: &str) -> bool {
    DANGEROUS_ATTRIBUTES.contains(&name)
}

/// Primitives removed at `level`.
pub fn blocked_primitives(level: IsolationLevel) -> Vec<&'static str> {
    match level {
        IsolationLevel::Disabled => Vec::new(),
        IsolationLevel::Moderate => MODERATE_BLOCKED_PRIMITIVES.to_vec(),
        IsolationLevel::Strict => MODERATE_BLOCKED_PRIMITIVES
            .iter()
            .chain(STRICT_EXTRA_BLOCKED_PRIMITIVES)
            .copied()
            .collect(),
    }
}

/// Module names the resolution hook refuses at `level`.
pub fn blocked_modules(level: IsolationLevel) -> Vec<&'static str> {
    match level {
        IsolationLevel::Disabled => Vec::new(),
        IsolationLevel::Moderate => MODERATE_BLOCKED_MODULES.to_vec(),
        IsolationLevel::Strict => MODERATE_BLOCKED_MODULES
            .iter()
            .chain(STRICT_EXTRA_BLOCKED_MODULES)
            .copied()
            .collect(),
    }
}

/// The effective capabilities for one sandbox construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    level: IsolationLevel,
    primitives: BTreeSet<&'static str>,
    blocked_modules: BTreeSet<&'static str>,
}

impl CapabilitySet {
    pub fn for_level(level: IsolationLevel) -> Self {
        let mut primitives: BTreeSet<&'static str> = HOST_PRIMITIVES.iter().copied().collect();
        for name in blocked_primitives(level) {
            primitives.remove(name);
        }
        Self {
            level,
            primitives,
            blocked_modules: blocked_modules(level).into_iter().collect(),
        }
    }

    pub fn level(&self) -> IsolationLevel {
        self.level
    }

    pub fn allows_primitive(&self, name: &str) -> bool {
        self.primitives.contains(name)
    }

    pub fn allows_module(&self, name: &str) -> bool {
        !self.blocked_modules.contains(name)
    }

    /// Allowed primitive names in sorted order.
    pub fn primitives(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.primitives.iter().copied()
    }

    pub fn blocked_modules(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.blocked_modules.iter().copied()
    }
}
