//! Host capability modules handed out by `require`.
//!
//! Each module is a plain object of native functions created on demand, so a
//! namespace only ever holds the capabilities it asked for and was allowed.

use std::io::Write;
use std::process::Command;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsNativeError, JsResult, JsValue, NativeFunction};
use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::host::{host_open, js_arg_to_string, record_created_file};

/// Names of every module this runtime can provide.
pub const HOST_MODULES: &[&str] = &[
    "base64",
    "builtins",
    "crypto",
    "fs",
    "os",
    "requests",
    "subprocess",
    "sys",
    "tempfile",
    "time",
    "uuid",
];

const MAX_SLEEP_MS: u64 = 60_000;

/// Build the module object for `name`, or `None` when no such module exists.
pub(crate) fn load(name: &str, ctx: &mut Context) -> JsResult<Option<JsValue>> {
    let module = match name {
        "base64" => {
            let mut init = ObjectInitializer::new(ctx);
            init.function(NativeFunction::from_fn_ptr(base64_encode), js_string!("encode"), 1)
                .function(NativeFunction::from_fn_ptr(base64_decode), js_string!("decode"), 1);
            init.build()
        }
        "crypto" => {
            let mut init = ObjectInitializer::new(ctx);
            init.function(NativeFunction::from_fn_ptr(crypto_sha256), js_string!("sha256"), 1);
            init.build()
        }
        "uuid" => {
            let mut init = ObjectInitializer::new(ctx);
            init.function(NativeFunction::from_fn_ptr(uuid_v4), js_string!("v4"), 0);
            init.build()
        }
        "time" => {
            let mut init = ObjectInitializer::new(ctx);
            init.function(NativeFunction::from_fn_ptr(time_now), js_string!("now"), 0)
                .function(NativeFunction::from_fn_ptr(time_iso), js_string!("isoString"), 0)
                .function(NativeFunction::from_fn_ptr(time_sleep), js_string!("sleep"), 1);
            init.build()
        }
        "tempfile" => {
            let mut init = ObjectInitializer::new(ctx);
            init.function(NativeFunction::from_fn_ptr(tempfile_write), js_string!("write"), 1)
                .function(NativeFunction::from_fn_ptr(tempfile_dir), js_string!("dir"), 0);
            init.build()
        }
        "requests" => {
            let mut init = ObjectInitializer::new(ctx);
            init.function(NativeFunction::from_fn_ptr(requests_get), js_string!("get"), 1);
            init.build()
        }
        "os" => {
            let mut init = ObjectInitializer::new(ctx);
            init.function(NativeFunction::from_fn_ptr(os_getenv), js_string!("getenv"), 1)
                .function(NativeFunction::from_fn_ptr(os_getcwd), js_string!("getcwd"), 0)
                .property(
                    js_string!("platform"),
                    JsValue::from(js_string!(std::env::consts::OS)),
                    Attribute::READONLY,
                );
            init.build()
        }
        "sys" => {
            let mut init = ObjectInitializer::new(ctx);
            init.property(
                js_string!("platform"),
                JsValue::from(js_string!(std::env::consts::OS)),
                Attribute::READONLY,
            )
            .property(
                js_string!("version"),
                JsValue::from(js_string!(env!("CARGO_PKG_VERSION"))),
                Attribute::READONLY,
            );
            init.build()
        }
        "subprocess" => {
            let mut init = ObjectInitializer::new(ctx);
            init.function(NativeFunction::from_fn_ptr(subprocess_run), js_string!("run"), 1);
            init.build()
        }
        "fs" => {
            let mut init = ObjectInitializer::new(ctx);
            init.function(NativeFunction::from_fn_ptr(host_open), js_string!("readText"), 1)
                .function(NativeFunction::from_fn_ptr(fs_write_text), js_string!("writeText"), 2)
                .function(NativeFunction::from_fn_ptr(fs_exists), js_string!("exists"), 1);
            init.build()
        }
        "builtins" => {
            let mut init = ObjectInitializer::new(ctx);
            init.function(NativeFunction::from_fn_ptr(host_open), js_string!("open"), 1);
            init.build()
        }
        _ => return Ok(None),
    };
    Ok(Some(module.into()))
}

fn base64_encode(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let input = js_arg_to_string(args.first());
    Ok(JsValue::from(js_string!(BASE64_STANDARD.encode(input.as_bytes()))))
}

fn base64_decode(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let input = js_arg_to_string(args.first());
    let decoded = BASE64_STANDARD
        .decode(input.as_bytes())
        .map_err(|_| JsNativeError::typ().with_message("Invalid base64 input"))?;
    let s = String::from_utf8(decoded)
        .map_err(|_| JsNativeError::typ().with_message("Invalid UTF-8 string"))?;
    Ok(JsValue::from(js_string!(s)))
}

fn crypto_sha256(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let input = js_arg_to_string(args.first());
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    Ok(JsValue::from(js_string!(hex::encode(hasher.finalize()))))
}

fn uuid_v4(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsValue::from(js_string!(Uuid::new_v4().to_string())))
}

fn time_now(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsValue::from(Utc::now().timestamp_millis() as f64))
}

fn time_iso(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let iso = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    Ok(JsValue::from(js_string!(iso)))
}

fn time_sleep(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let ms = args
        .first()
        .and_then(|v| v.as_number())
        .unwrap_or(0.0)
        .max(0.0) as u64;
    std::thread::sleep(Duration::from_millis(ms.min(MAX_SLEEP_MS)));
    Ok(JsValue::undefined())
}

fn tempfile_write(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let content = js_arg_to_string(args.first());
    let io_err = |e: std::io::Error| JsNativeError::error().with_message(format!("tempfile: {e}"));
    let mut file = tempfile::Builder::new()
        .prefix("xflow-")
        .tempfile()
        .map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    let (_, path) = file.keep().map_err(|e| io_err(e.error))?;
    let display = path.to_string_lossy().into_owned();
    record_created_file(path);
    Ok(JsValue::from(js_string!(display)))
}

fn tempfile_dir(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsValue::from(js_string!(std::env::temp_dir()
        .to_string_lossy()
        .into_owned())))
}

fn requests_get(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let url = js_arg_to_string(args.first());
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        JsNativeError::error().with_message("requests: no async runtime available")
    })?;
    let (status, text) = handle
        .block_on(async move {
            let response = reqwest::get(url.as_str()).await?;
            let status = response.status().as_u16();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        })
        .map_err(|e| JsNativeError::error().with_message(format!("requests: {e}")))?;
    let mut init = ObjectInitializer::new(ctx);
    init.property(js_string!("status"), JsValue::from(status as f64), Attribute::all())
        .property(js_string!("text"), JsValue::from(js_string!(text)), Attribute::all());
    Ok(init.build().into())
}

fn os_getenv(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let name = js_arg_to_string(args.first());
    Ok(match std::env::var(&name) {
        Ok(value) => JsValue::from(js_string!(value)),
        Err(_) => JsValue::null(),
    })
}

fn os_getcwd(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let cwd = std::env::current_dir()
        .map_err(|e| JsNativeError::error().with_message(format!("getcwd: {e}")))?;
    Ok(JsValue::from(js_string!(cwd.to_string_lossy().into_owned())))
}

fn subprocess_run(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let command_line = js_arg_to_string(args.first());
    let mut parts = command_line.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| JsNativeError::typ().with_message("subprocess.run: empty command"))?;
    let output = Command::new(program)
        .args(parts)
        .output()
        .map_err(|e| JsNativeError::error().with_message(format!("subprocess.run: {e}")))?;
    let code = output.status.code().unwrap_or(-1);
    let mut init = ObjectInitializer::new(ctx);
    init.property(js_string!("status"), JsValue::from(code), Attribute::all())
        .property(
            js_string!("stdout"),
            JsValue::from(js_string!(String::from_utf8_lossy(&output.stdout).into_owned())),
            Attribute::all(),
        )
        .property(
            js_string!("stderr"),
            JsValue::from(js_string!(String::from_utf8_lossy(&output.stderr).into_owned())),
            Attribute::all(),
        );
    Ok(init.build().into())
}

fn fs_write_text(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let path = js_arg_to_string(args.first());
    let content = js_arg_to_string(args.get(1));
    std::fs::write(&path, content)
        .map_err(|e| JsNativeError::error().with_message(format!("cannot write '{path}': {e}")))?;
    Ok(JsValue::undefined())
}

fn fs_exists(_this: &JsValue, args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let path = js_arg_to_string(args.first());
    Ok(JsValue::from(std::path::Path::new(&path).exists()))
}
