//! JavaScript component runtime using boa_engine.
//!
//! Every build gets a fresh [`Context`]:
//! - host hooks (`require`, `getattr`, `hasattr`, `open`) are registered
//! - the prelude deletes every global the capability set does not allow,
//!   strips the `constructor` slot of function prototypes and freezes them
//! - the component source is evaluated, its top-level names are collected
//! - a driver constructs the component class and invokes its entry points

use std::collections::BTreeMap;
use std::sync::Arc;

use boa_engine::{Context, Source};
use serde_json::{Map, Value};

use xflow_types::{
    BuildOutput, BuildRequest, CodeLanguage, CompiledComponent, ComponentDescriptor,
    ComponentRuntime, IsolationLevel, SandboxError, SandboxPolicy, HOST_PRIMITIVES,
};

use crate::analyzer::ComponentAnalyzer;
use crate::host::{self, HostStateGuard};

/// JavaScript runtime configuration
#[derive(Clone, Debug)]
pub struct JsRuntimeConfig {
    /// Capture `console.*` output into the build logs
    pub enable_console: bool,

    /// Freeze function prototypes at MODERATE and STRICT
    pub freeze_prototypes: bool,
}

impl Default for JsRuntimeConfig {
    fn default() -> Self {
        Self {
            enable_console: true,
            freeze_prototypes: true,
        }
    }
}

/// Component runtime for JavaScript source text.
#[derive(Debug, Default, Clone)]
pub struct JsComponentRuntime {
    config: JsRuntimeConfig,
    analyzer: ComponentAnalyzer,
}

impl JsComponentRuntime {
    pub fn new(config: JsRuntimeConfig) -> Self {
        Self {
            config,
            analyzer: ComponentAnalyzer,
        }
    }
}

#[async_trait::async_trait]
impl ComponentRuntime for JsComponentRuntime {
    fn language(&self) -> CodeLanguage {
        CodeLanguage::JavaScript
    }

    fn compile(&self, descriptor: &ComponentDescriptor) -> Result<CompiledComponent, SandboxError> {
        if descriptor.language != CodeLanguage::JavaScript {
            return Err(SandboxError::UnsupportedLanguage(descriptor.language));
        }
        let source = &descriptor.source_text;
        let analysis = self.analyzer.analyze(source)?;
        if !analysis.is_safe {
            let summary = analysis
                .violations
                .iter()
                .map(|v| v.description.clone())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(SandboxError::StructuralViolation(summary));
        }

        let mut candidate_names: Vec<String> = analysis
            .candidate_names
            .into_iter()
            .filter(|name| is_namespace_candidate(name))
            .collect();
        if is_identifier(&descriptor.type_name) && !candidate_names.contains(&descriptor.type_name) {
            candidate_names.push(descriptor.type_name.clone());
        }

        Ok(CompiledComponent {
            descriptor_hash: descriptor.descriptor_hash(),
            type_name: descriptor.type_name.clone(),
            language: CodeLanguage::JavaScript,
            source: Arc::from(source.as_str()),
            invocations: descriptor.invocations(),
            static_imports: analysis.static_imports,
            candidate_names,
        })
    }

    async fn execute(
        &self,
        compiled: Arc<CompiledComponent>,
        request: BuildRequest,
    ) -> Result<BuildOutput, SandboxError> {
        let max_code = request.policy.limits.max_code_length;
        if compiled.source.len() > max_code {
            return Err(SandboxError::CodeTooLarge {
                max: max_code,
                actual: compiled.source.len(),
            });
        }

        // Literal requires are checked before any component code runs.
        let blocked: Vec<&str> = compiled
            .static_imports
            .iter()
            .filter(|m| !request.policy.capabilities.allows_module(m))
            .map(String::as_str)
            .collect();
        if !blocked.is_empty() {
            return Err(SandboxError::SecurityViolation(format!(
                "module(s) {} blocked at isolation level {}",
                blocked.join(", "),
                request.policy.level()
            )));
        }

        let config = self.config.clone();
        tokio::task::spawn_blocking(move || execute_component(&config, &compiled, &request))
            .await
            .map_err(|e| SandboxError::InternalError(format!("Task join error: {}", e)))?
    }
}

fn execute_component(
    config: &JsRuntimeConfig,
    compiled: &CompiledComponent,
    request: &BuildRequest,
) -> Result<BuildOutput, SandboxError> {
    let guard = HostStateGuard::install(request.policy.capabilities.clone());
    let limits = &request.policy.limits;

    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(limits.max_loop_iterations);
    context
        .runtime_limits_mut()
        .set_recursion_limit(limits.max_recursion_depth);

    host::register_hooks(&mut context)
        .map_err(|e| SandboxError::InternalError(format!("Failed to register host hooks: {}", e)))?;
    context
        .eval(Source::from_bytes(&prelude(config, &request.policy)))
        .map_err(|e| SandboxError::InternalError(format!("Prelude failed: {}", e)))?;

    let outcome = run_component(&mut context, compiled, request);

    let violations = guard.take_violations();
    if !violations.is_empty() {
        guard.discard_created_files();
        tracing::debug!(
            vertex_id = %request.vertex_id,
            count = violations.len(),
            "Component build recorded security violations"
        );
        return Err(SandboxError::SecurityViolation(violations.join("; ")));
    }
    if outcome.is_err() {
        guard.discard_created_files();
    }
    outcome
}

fn run_component(
    context: &mut Context,
    compiled: &CompiledComponent,
    request: &BuildRequest,
) -> Result<BuildOutput, SandboxError> {
    context
        .eval(Source::from_bytes(compiled.source.as_bytes()))
        .map_err(|e| SandboxError::ComponentError(e.to_string()))?;

    let namespace = collect_namespace(context, &compiled.candidate_names)?;
    let class_name = resolve_component_type(&compiled.type_name, &namespace)?;

    let driver = build_driver(&class_name, &compiled.invocations, &request.params)?;
    let result = context
        .eval(Source::from_bytes(&driver))
        .map_err(|e| SandboxError::ComponentError(e.to_string()))?;

    let result_str = result
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| {
            SandboxError::SerializationError("build driver did not produce a JSON string".into())
        })?;
    let max_output = request.policy.limits.max_output_bytes;
    if result_str.len() > max_output {
        return Err(SandboxError::OutputTooLarge {
            max: max_output,
            actual: result_str.len(),
        });
    }

    let wrapper: Value = serde_json::from_str(&result_str)
        .map_err(|e| SandboxError::SerializationError(format!("Failed to parse result: {}", e)))?;

    let outputs = wrapper
        .get("outputs")
        .and_then(Value::as_array)
        .map(|pairs| {
            pairs
                .iter()
                .filter_map(|pair| {
                    let name = pair.get(0)?.as_str()?.to_string();
                    Some((name, pair.get(1).cloned().unwrap_or(Value::Null)))
                })
                .collect()
        })
        .unwrap_or_default();
    let status = wrapper.get("status").cloned().filter(|v| !v.is_null());
    let logs = wrapper
        .get("logs")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Ok(BuildOutput {
        outputs,
        namespace,
        status,
        logs,
    })
}

/// Names defined at the top level of the component source, with their
/// `typeof` kind.
fn collect_namespace(
    context: &mut Context,
    candidates: &[String],
) -> Result<BTreeMap<String, String>, SandboxError> {
    if candidates.is_empty() {
        return Ok(BTreeMap::new());
    }
    let mut script = String::from("(function () {\n    var ns = {};\n");
    for name in candidates {
        script.push_str(&format!(
            "    try {{ if (typeof {name} !== 'undefined') {{ ns['{name}'] = typeof {name}; }} }} catch (e) {{}}\n"
        ));
    }
    script.push_str("    return JSON.stringify(ns);\n})();");

    let value = context
        .eval(Source::from_bytes(&script))
        .map_err(|e| SandboxError::ComponentError(e.to_string()))?;
    let raw = value
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| SandboxError::SerializationError("namespace lookup failed".into()))?;
    serde_json::from_str(&raw)
        .map_err(|e| SandboxError::SerializationError(format!("Failed to parse namespace: {}", e)))
}

/// Prefer the descriptor's type name, else the only class-like definition.
fn resolve_component_type(
    type_name: &str,
    namespace: &BTreeMap<String, String>,
) -> Result<String, SandboxError> {
    if namespace.get(type_name).map(String::as_str) == Some("function") {
        return Ok(type_name.to_string());
    }
    let classes: Vec<&String> = namespace
        .iter()
        .filter(|(name, kind)| {
            kind.as_str() == "function" && name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        })
        .map(|(name, _)| name)
        .collect();
    match classes.as_slice() {
        [only] => Ok((*only).clone()),
        [] => Err(SandboxError::InvalidComponent(format!(
            "component type '{}' is not defined by the source",
            type_name
        ))),
        many => Err(SandboxError::InvalidComponent(format!(
            "component type '{}' is not defined and the source defines several candidates: {}",
            type_name,
            many.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ))),
    }
}

fn build_driver(
    class_name: &str,
    invocations: &[(String, String)],
    params: &Map<String, Value>,
) -> Result<String, SandboxError> {
    let params_json = serde_json::to_string(params)
        .map_err(|e| SandboxError::SerializationError(e.to_string()))?;
    let calls_json = serde_json::to_string(invocations)
        .map_err(|e| SandboxError::SerializationError(e.to_string()))?;

    Ok(format!(
        r#"
(function () {{
    var __params = JSON.parse('{params}');
    var __calls = JSON.parse('{calls}');
    var __instance = new {class_name}(__params);
    if (__instance === null || typeof __instance !== 'object') {{
        throw new TypeError("component constructor did not return an object");
    }}
    var __keys = Object.keys(__params);
    for (var i = 0; i < __keys.length; i++) {{
        if (!(__keys[i] in __instance)) {{ __instance[__keys[i]] = __params[__keys[i]]; }}
    }}
    var __outputs = [];
    for (var j = 0; j < __calls.length; j++) {{
        var __method = __instance[__calls[j][1]];
        if (typeof __method !== 'function') {{
            throw new TypeError("component has no method '" + __calls[j][1] + "'");
        }}
        __outputs.push([__calls[j][0], __xflow_materialize(__method.call(__instance))]);
    }}
    var __status = __instance.status === undefined ? null : __instance.status;
    return JSON.stringify({{ outputs: __outputs, status: __status, logs: __xflow_logs }});
}})();
"#,
        params = escape_single_quoted(&params_json),
        calls = escape_single_quoted(&calls_json),
        class_name = class_name,
    ))
}

fn prelude(config: &JsRuntimeConfig, policy: &SandboxPolicy) -> String {
    let restricted = policy.level() != IsolationLevel::Disabled;

    let console_setup = if config.enable_console {
        r#"
var console = {
    log: function () {
        var parts = [];
        for (var i = 0; i < arguments.length; i++) {
            var a = arguments[i];
            parts.push(typeof a === 'object' ? JSON.stringify(a) : String(a));
        }
        __xflow_logs.push(parts.join(' '));
    },
    info: function () { console.log.apply(null, arguments); },
    warn: function () { console.log.apply(null, arguments); },
    error: function () { console.log.apply(null, arguments); },
    debug: function () { console.log.apply(null, arguments); }
};
"#
    } else {
        ""
    };

    let allowed_list = policy
        .capabilities
        .primitives()
        .map(|s| format!("\"{}\"", s))
        .collect::<Vec<_>>()
        .join(",");

    // Function prototypes are reached through literals: the `Function`
    // global is already gone at MODERATE and STRICT.
    let harden_functions = if restricted {
        let freeze = if config.freeze_prototypes {
            "Object.freeze(proto);"
        } else {
            ""
        };
        format!(
            r#"
    var fns = [function () {{}}, function* () {{}}, async function () {{}}, async function* () {{}}];
    for (var k = 0; k < fns.length; k++) {{
        var proto = Object.getPrototypeOf(fns[k]);
        try {{ delete proto.constructor; }} catch (e) {{}}
        {freeze}
    }}
"#
        )
    } else {
        String::new()
    };

    format!(
        r#"
var __xflow_logs = [];
{console_setup}
function Data(data) {{
    return {{ __xflow_type: "data", data: (data === undefined || data === null) ? {{}} : data }};
}}
function Message(text, sender) {{
    return {{
        __xflow_type: "message",
        text: (text === undefined || text === null) ? "" : String(text),
        sender: sender === undefined ? "Machine" : String(sender)
    }};
}}
function __xflow_materialize(value) {{
    if (value === undefined) {{ return null; }}
    if (value !== null && typeof value === 'object') {{
        if (typeof value.then === 'function') {{
            throw new TypeError("build entry points must not return a Promise");
        }}
        if (typeof value.next === 'function' && typeof value[Symbol.iterator] === 'function') {{
            var chunks = [];
            for (var step = value.next(); !step.done; step = value.next()) {{
                if (chunks.length >= {max_chunks}) {{
                    throw new RangeError("stream exceeded {max_chunks} chunks");
                }}
                chunks.push(step.value === undefined ? null : step.value);
            }}
            return {{ __xflow_type: "stream", chunks: chunks }};
        }}
    }}
    return value;
}}
(function () {{
    var allowed = new Set([{allowed_list}]);
    var g = globalThis;
    var names = Object.getOwnPropertyNames(g);
    for (var i = 0; i < names.length; i++) {{
        var key = names[i];
        if (allowed.has(key) || key.indexOf("__xflow_") === 0) {{ continue; }}
        try {{ delete g[key]; }} catch (e) {{}}
        if (Object.prototype.hasOwnProperty.call(g, key)) {{
            try {{ g[key] = undefined; }} catch (e) {{}}
        }}
    }}
{harden_functions}
}})();
"#,
        console_setup = console_setup,
        max_chunks = policy.limits.max_stream_chunks,
        allowed_list = allowed_list,
        harden_functions = harden_functions,
    )
}

fn escape_single_quoted(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn is_namespace_candidate(name: &str) -> bool {
    is_identifier(name) && !name.starts_with("__xflow_") && !HOST_PRIMITIVES.contains(&name)
}

// ================================
// Tests
// ================================
