use crate::level::Level;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// One structured log record handed to the hook.
///
/// `time` is captured on construction but is not part of the wire record;
/// put it into `data` if downstream consumers need it.
#[derive(Debug, Clone)]
pub struct Entry {
    pub time: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub data: BTreeMap<String, FieldValue>,
}

impl Entry {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Entry {
            time: Utc::now(),
            level,
            message: message.into(),
            data: BTreeMap::new(),
        }
    }

    /// Builder-style helper that adds one structured field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// A value that knows how to render itself as JSON.
///
/// Implemented for every `Serialize` type, so any serde model can be
/// attached to an entry as-is through [`FieldValue::json`].
pub trait ToJson: fmt::Debug + Send + Sync {
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T> ToJson for T
where
    T: Serialize + fmt::Debug + Send + Sync,
{
    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Value of a structured field.
///
/// The variants mirror the capabilities the default coercion looks at:
/// values with their own JSON form, errors, values that render to a
/// string, and plain JSON data.
#[derive(Clone)]
pub enum FieldValue {
    Value(serde_json::Value),
    Json(Arc<dyn ToJson>),
    Error(Arc<dyn Error + Send + Sync>),
    Display(Arc<dyn fmt::Display + Send + Sync>),
}

impl FieldValue {
    pub fn json<T: ToJson + 'static>(value: T) -> Self {
        FieldValue::Json(Arc::new(value))
    }

    pub fn error<E: Error + Send + Sync + 'static>(err: E) -> Self {
        FieldValue::Error(Arc::new(err))
    }

    pub fn display<D: fmt::Display + Send + Sync + 'static>(value: D) -> Self {
        FieldValue::Display(Arc::new(value))
    }

    /// The plain JSON value, if this is a `Value` variant.
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Final JSON form used by the encoder. Errors and displayable values
    /// that reach this point (e.g. returned by a filter) render as strings.
    pub(crate) fn into_json(self) -> serde_json::Result<serde_json::Value> {
        match self {
            FieldValue::Value(v) => Ok(v),
            FieldValue::Json(v) => v.to_json(),
            FieldValue::Error(e) => Ok(serde_json::Value::String(e.to_string())),
            FieldValue::Display(d) => Ok(serde_json::Value::String(d.to_string())),
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FieldValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
            FieldValue::Error(e) => f.debug_tuple("Error").field(e).finish(),
            FieldValue::Display(d) => f.debug_tuple("Display").field(&d.to_string()).finish(),
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        FieldValue::Value(v)
    }
}

macro_rules! impl_from_plain {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    FieldValue::Value(serde_json::Value::from(v))
                }
            }
        )*
    };
}

impl_from_plain!(&str, String, bool, i32, i64, u32, u64, f64);
