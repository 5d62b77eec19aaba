//! Injected JSON codec options for command input.
//!
//! Each dispatcher owns its own codec instance instead of sharing a
//! process-wide configuration handle, so two dispatchers with different
//! strictness can coexist in one server.

use crate::command::{ArgumentInfo, ArgumentKind};
use serde_json::{Map, Value};

/// Behavior switches for decoding command arguments.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodecOptions {
    /// When false, request fields not present in the declared schema are a
    /// serialization failure instead of being dropped.
    pub ignore_unknown_keys: bool,
    /// When true, string-encoded scalars (`"12"`, `"true"`) are coerced to
    /// the kind the schema declares before typed deserialization.
    pub is_lenient: bool,
}

impl Default for JsonCodecOptions {
    fn default() -> Self {
        Self {
            ignore_unknown_keys: true,
            is_lenient: true,
        }
    }
}

/// JSON codec applied to command request arguments.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    options: JsonCodecOptions,
}

impl JsonCodec {
    pub fn new(options: JsonCodecOptions) -> Self {
        Self { options }
    }

    /// Normalizes raw request arguments against a declared schema.
    ///
    /// Returns the argument object ready for typed deserialization, or a
    /// message describing why the input is unacceptable.
    pub fn normalize(
        &self,
        args: &Map<String, Value>,
        schema: &[ArgumentInfo],
    ) -> Result<Value, String> {
        let mut out = Map::with_capacity(args.len());

        for (key, value) in args {
            let declared = schema.iter().find(|info| info.name == key);
            match declared {
                None if !self.options.ignore_unknown_keys => {
                    return Err(format!("unknown argument field '{key}'"));
                }
                None => continue,
                Some(info) => {
                    let value = if self.options.is_lenient {
                        coerce(value, info.kind)
                    } else {
                        value.clone()
                    };
                    out.insert(key.clone(), value);
                }
            }
        }

        Ok(Value::Object(out))
    }
}

/// Best-effort lenient coercion of string-encoded scalars.
///
/// Anything that does not parse is passed through unchanged so the typed
/// deserialization reports the mismatch.
fn coerce(value: &Value, kind: ArgumentKind) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    match kind {
        ArgumentKind::Integer => s
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        ArgumentKind::Float => s
            .parse::<f64>()
            .ok()
            .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
            .unwrap_or_else(|| value.clone()),
        ArgumentKind::Boolean => s
            .parse::<bool>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        ArgumentKind::String => value.clone(),
    }
}
