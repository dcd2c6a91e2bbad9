//! Interposed host hooks: `require`, `getattr`, `hasattr` and the `open`
//! primitive.
//!
//! Hooks are plain function pointers, so the per-build policy lives in a
//! thread-local installed by [`HostStateGuard`] for the duration of one build
//! on the blocking worker. Violations are recorded there as well as thrown,
//! which keeps them visible even if component code catches the exception.
//! Files created by host modules are tracked so a failed build can remove
//! them.

use std::cell::RefCell;
use std::path::PathBuf;

use boa_engine::object::FunctionObjectBuilder;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsNativeError, JsResult, JsString, JsValue, NativeFunction};

use xflow_types::{is_dangerous_attribute, CapabilitySet};

use crate::modules;

struct HostState {
    capabilities: CapabilitySet,
    violations: Vec<String>,
    created_files: Vec<PathBuf>,
}

thread_local! {
    static HOST_STATE: RefCell<Option<HostState>> = const { RefCell::new(None) };
}

/// Installs the capability set for the current thread and clears it on drop.
pub(crate) struct HostStateGuard;

impl HostStateGuard {
    pub(crate) fn install(capabilities: CapabilitySet) -> Self {
        HOST_STATE.with(|state| {
            *state.borrow_mut() = Some(HostState {
                capabilities,
                violations: Vec::new(),
                created_files: Vec::new(),
            });
        });
        HostStateGuard
    }

    pub(crate) fn take_violations(&self) -> Vec<String> {
        HOST_STATE.with(|state| {
            state
                .borrow_mut()
                .as_mut()
                .map(|s| std::mem::take(&mut s.violations))
                .unwrap_or_default()
        })
    }

    /// Remove every file host modules created during this build.
    pub(crate) fn discard_created_files(&self) {
        let files = HOST_STATE.with(|state| {
            state
                .borrow_mut()
                .as_mut()
                .map(|s| std::mem::take(&mut s.created_files))
                .unwrap_or_default()
        });
        for path in files {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), "Failed to remove file of failed build: {}", e);
            }
        }
    }
}

impl Drop for HostStateGuard {
    fn drop(&mut self) {
        HOST_STATE.with(|state| {
            state.borrow_mut().take();
        });
    }
}

/// Without an installed state every module is refused.
fn module_allowed(name: &str) -> bool {
    HOST_STATE.with(|state| {
        state
            .borrow()
            .as_ref()
            .map(|s| s.capabilities.allows_module(name))
            .unwrap_or(false)
    })
}

fn level_name() -> &'static str {
    HOST_STATE.with(|state| {
        state
            .borrow()
            .as_ref()
            .map(|s| s.capabilities.level().as_str())
            .unwrap_or("unknown")
    })
}

pub(crate) fn record_created_file(path: PathBuf) {
    HOST_STATE.with(|state| {
        if let Some(s) = state.borrow_mut().as_mut() {
            s.created_files.push(path);
        }
    });
}

/// Record a violation and build the exception thrown into the component.
pub(crate) fn deny(message: String) -> boa_engine::JsError {
    HOST_STATE.with(|state| {
        if let Some(s) = state.borrow_mut().as_mut() {
            s.violations.push(message.clone());
        }
    });
    JsNativeError::error()
        .with_message(format!("SecurityViolation: {message}"))
        .into()
}

pub(crate) fn register_hooks(context: &mut Context) -> JsResult<()> {
    register_fn(context, "require", 1, host_require)?;
    register_fn(context, "getattr", 3, host_getattr)?;
    register_fn(context, "hasattr", 2, host_hasattr)?;
    register_fn(context, "open", 1, host_open)?;
    Ok(())
}

fn register_fn(
    context: &mut Context,
    name: &'static str,
    length: usize,
    f: fn(&JsValue, &[JsValue], &mut Context) -> JsResult<JsValue>,
) -> JsResult<()> {
    let function = FunctionObjectBuilder::new(context.realm(), NativeFunction::from_fn_ptr(f))
        .name(JsString::from(name))
        .length(length)
        .constructor(false)
        .build();
    context.register_global_property(JsString::from(name), function, Attribute::all())?;
    Ok(())
}

fn host_require(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let name = js_arg_to_string(args.first());
    if !module_allowed(&name) {
        return Err(deny(format!(
            "module '{}' is blocked at isolation level {}",
            name,
            level_name()
        )));
    }
    match modules::load(&name, ctx)? {
        Some(module) => Ok(module),
        None => Err(JsNativeError::error()
            .with_message(format!("ModuleNotFoundError: no module named '{name}'"))
            .into()),
    }
}

fn host_getattr(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let name = js_arg_to_string(args.get(1));
    if is_dangerous_attribute(&name) {
        return Err(deny(format!("getattr access to '{name}' is denied")));
    }
    let target = args.first().cloned().unwrap_or_default();
    let fallback = args.get(2).cloned();
    if target.is_null_or_undefined() {
        return fallback.ok_or_else(|| {
            JsNativeError::typ()
                .with_message(format!("cannot read attribute '{name}' of {}", target.display()))
                .into()
        });
    }
    let object = target.to_object(ctx)?;
    let value = object.get(JsString::from(name.as_str()), ctx)?;
    match (value.is_undefined(), fallback) {
        (true, Some(default)) => Ok(default),
        _ => Ok(value),
    }
}

fn host_hasattr(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let name = js_arg_to_string(args.get(1));
    if is_dangerous_attribute(&name) {
        return Ok(JsValue::from(false));
    }
    let target = args.first().cloned().unwrap_or_default();
    if target.is_null_or_undefined() {
        return Ok(JsValue::from(false));
    }
    let object = target.to_object(ctx)?;
    let found = object.has_property(JsString::from(name.as_str()), ctx)?;
    Ok(JsValue::from(found))
}

/// Read a file as text.
pub(crate) fn host_open(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let path = js_arg_to_string(args.first());
    let text = std::fs::read_to_string(&path).map_err(|e| {
        JsNativeError::error().with_message(format!("cannot open '{path}': {e}"))
    })?;
    Ok(JsValue::from(js_string!(text)))
}

pub(crate) fn js_arg_to_string(arg: Option<&JsValue>) -> String {
    arg.and_then(|v| v.as_string())
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_default()
}
