//! ABOUTME: Pluggable JSON codec with a register/reset function table
//! ABOUTME: Board implementations thread an instance of this through every read/write

use jb_core::{Error, Result};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub type DumpsFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;
pub type LoadsFn = Arc<dyn Fn(&str) -> Result<Value> + Send + Sync>;
pub type DefaultFn = Arc<dyn Fn(&dyn Any) -> Value + Send + Sync>;

/// A value that either is already JSON-native, or needs the codec's
/// `default` coercion hook to become JSON-native. This stands in for
/// the source system's "pass anything, let `default=` figure it out"
/// behavior, made explicit the way static typing requires.
pub enum Encodable {
    Json(Value),
    Opaque(Box<dyn Any + Send + Sync>),
}

impl From<Value> for Encodable {
    fn from(value: Value) -> Self {
        Encodable::Json(value)
    }
}

/// One of the three slots a [`Codec`] exposes for `register`.
pub enum CodecFn {
    Dumps(DumpsFn),
    Loads(LoadsFn),
    Default(DefaultFn),
}

impl fmt::Debug for CodecFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecFn::Dumps(_) => "dumps",
            CodecFn::Loads(_) => "loads",
            CodecFn::Default(_) => "default",
        };
        write!(f, "CodecFn::{name}")
    }
}

/// A process- or board-scoped JSON function table: `dumps`, `loads`,
/// `default`. Every board read/write goes through one of these.
///
/// Unlike the source system's single process-wide global table, a
/// `Codec` is an owned value handed to each board at construction —
/// tests construct one per case and there is no hidden shared state to
/// reset between them.
pub struct Codec {
    dumps: DumpsFn,
    loads: LoadsFn,
    default: DefaultFn,
}

impl Codec {
    /// Build a codec with the default `serde_json` backed implementation.
    pub fn new() -> Self {
        Self {
            dumps: Arc::new(|value| value.to_string()),
            loads: Arc::new(|s| {
                serde_json::from_str(s).map_err(|e| Error::Codec(e.to_string()))
            }),
            default: Arc::new(|value| Value::String(format!("{value:?}"))),
        }
    }

    /// Restore the default implementations for all three slots.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Set one of the three named slots. An unknown `name` is rejected
    /// (mirrors the source's `KeyError`); a slot/function mismatch (e.g.
    /// passing a `Default` function under `name = "dumps"`) is rejected
    /// too (mirrors the source's `ValueError` for a non-callable value).
    pub fn register(&mut self, name: &str, func: CodecFn) -> Result<()> {
        match (name, func) {
            ("dumps", CodecFn::Dumps(f)) => {
                self.dumps = f;
                Ok(())
            }
            ("loads", CodecFn::Loads(f)) => {
                self.loads = f;
                Ok(())
            }
            ("default", CodecFn::Default(f)) => {
                self.default = f;
                Ok(())
            }
            ("dumps" | "loads" | "default", mismatched) => Err(Error::Codec(format!(
                "must receive a {name} function, got {mismatched:?}"
            ))),
            (other, _) => Err(Error::Codec(format!(
                "no function called {other} is available to register"
            ))),
        }
    }

    /// Serialize a single already-JSON value.
    pub fn dumps_value(&self, value: &Value) -> String {
        (self.dumps)(value)
    }

    /// Parse a JSON string.
    pub fn loads(&self, s: &str) -> Result<Value> {
        (self.loads)(s)
    }

    /// Run an opaque value through the `default` coercion hook.
    pub fn coerce(&self, value: &dyn Any) -> Value {
        (self.default)(value)
    }

    /// Serialize a mapping of [`Encodable`] values, coercing any opaque
    /// entries through `default` first.
    pub fn dumps_map(&self, entries: &[(String, Encodable)]) -> String {
        let mut object = serde_json::Map::new();
        for (key, value) in entries {
            let json_value = match value {
                Encodable::Json(v) => v.clone(),
                Encodable::Opaque(v) => self.coerce(v.as_ref()),
            };
            object.insert(key.clone(), json_value);
        }
        self.dumps_value(&Value::Object(object))
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

/// A process-wide codec instance for callers (tests, the CLI) that don't
/// want to thread one through every call site explicitly.
pub fn default_codec() -> Codec {
    Codec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_dumps_and_loads() {
        let dumps_calls = Arc::new(AtomicUsize::new(0));
        let loads_calls = Arc::new(AtomicUsize::new(0));
        let mut codec = Codec::new();

        let dumps_calls_clone = dumps_calls.clone();
        codec
            .register(
                "dumps",
                CodecFn::Dumps(Arc::new(move |v| {
                    dumps_calls_clone.fetch_add(1, Ordering::SeqCst);
                    v.to_string()
                })),
            )
            .unwrap();

        let loads_calls_clone = loads_calls.clone();
        codec
            .register(
                "loads",
                CodecFn::Loads(Arc::new(move |s| {
                    loads_calls_clone.fetch_add(1, Ordering::SeqCst);
                    serde_json::from_str(s).map_err(|e| Error::Codec(e.to_string()))
                })),
            )
            .unwrap();

        codec.dumps_value(&Value::Object(Default::default()));
        assert_eq!(dumps_calls.load(Ordering::SeqCst), 1);
        assert_eq!(loads_calls.load(Ordering::SeqCst), 0);

        codec.loads("{}").unwrap();
        assert_eq!(loads_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_default_coerces_opaque_entries() {
        let default_calls = Arc::new(AtomicUsize::new(0));
        let default_calls_clone = default_calls.clone();
        let mut codec = Codec::new();
        codec
            .register(
                "default",
                CodecFn::Default(Arc::new(move |_v| {
                    default_calls_clone.fetch_add(1, Ordering::SeqCst);
                    Value::String("opaque".to_string())
                })),
            )
            .unwrap();

        let entries = vec![
            ("a".to_string(), Encodable::Opaque(Box::new(42_u32))),
            ("b".to_string(), Encodable::Opaque(Box::new("raw"))),
        ];
        codec.dumps_map(&entries);
        assert_eq!(default_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_register_rejects_unknown_slot() {
        let mut codec = Codec::new();
        let err = codec
            .register("blah", CodecFn::Dumps(Arc::new(|v| v.to_string())))
            .unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn test_register_rejects_mismatched_slot() {
        let mut codec = Codec::new();
        let err = codec
            .register(
                "dumps",
                CodecFn::Default(Arc::new(|_v| Value::Null)),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut codec = Codec::new();
        codec
            .register("loads", CodecFn::Loads(Arc::new(|_s| Ok(Value::Null))))
            .unwrap();
        assert_eq!(codec.loads("{}").unwrap(), Value::Null);
        codec.reset();
        assert_eq!(codec.loads("{}").unwrap(), serde_json::json!({}));
    }
}
