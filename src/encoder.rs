//! Turns an [`Entry`] into the bytes of one delivery-stream record.
//!
//! The record is a JSON object built from the entry's structured fields,
//! with `message` (unless a field already provides one) and `level` added.
//! Ignored fields are dropped, filtered fields go through their filter and
//! everything else through [`format_data`]. Keys are emitted in ascending
//! lexicographic order.

use crate::error::EncodeError;
use crate::record::{Entry, FieldValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Per-field value transformer registered with [`Encoder::add_filter`].
pub type Filter = Arc<dyn Fn(FieldValue) -> FieldValue + Send + Sync>;

const MESSAGE_KEY: &str = "message";
const LEVEL_KEY: &str = "level";

/// Serialization settings shared by the hook and its buffer loop.
#[derive(Clone, Default)]
pub struct Encoder {
    ignore_fields: HashSet<String>,
    filters: HashMap<String, Filter>,
    add_newline: bool,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Omit `name` from every encoded record. Ignoring wins over a filter
    /// registered for the same field.
    pub fn add_ignore(&mut self, name: impl Into<String>) {
        self.ignore_fields.insert(name.into());
    }

    /// Replace the value of `name` with `filter(value)` before encoding.
    /// Filtered values skip the default coercion.
    pub fn add_filter<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(FieldValue) -> FieldValue + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn set_newline(&mut self, add_newline: bool) {
        self.add_newline = add_newline;
    }

    pub fn adds_newline(&self) -> bool {
        self.add_newline
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore_fields.contains(name)
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn ignored_count(&self) -> usize {
        self.ignore_fields.len()
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// Encode one entry. The entry itself is left untouched.
    pub fn encode(&self, entry: &Entry) -> Result<Vec<u8>, EncodeError> {
        let mut fields = entry.data.clone();
        fields
            .entry(MESSAGE_KEY.to_string())
            .or_insert_with(|| FieldValue::from(entry.message.as_str()));
        fields.insert(LEVEL_KEY.to_string(), FieldValue::from(entry.level.as_str()));

        let mut object = BTreeMap::new();
        for (key, value) in fields {
            if self.ignore_fields.contains(&key) {
                continue;
            }
            let value = match self.filters.get(&key) {
                Some(filter) => filter(value),
                None => format_data(value),
            };
            object.insert(key, value.into_json()?);
        }

        let mut bytes = serde_json::to_vec(&object)?;
        if self.add_newline {
            bytes.push(b'\n');
        }
        Ok(bytes)
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut filters: Vec<&String> = self.filters.keys().collect();
        filters.sort();
        f.debug_struct("Encoder")
            .field("ignore_fields", &self.ignore_fields)
            .field("filters", &filters)
            .field("add_newline", &self.add_newline)
            .finish()
    }
}

/// Default coercion for a field value without a filter.
///
/// Values with their own JSON form pass through, errors become their
/// message, displayable values become their rendering, and plain data
/// is left alone.
pub fn format_data(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Json(_) => value,
        FieldValue::Error(err) => FieldValue::from(err.to_string()),
        FieldValue::Display(d) => FieldValue::from(d.to_string()),
        FieldValue::Value(_) => value,
    }
}
