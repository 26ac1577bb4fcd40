//! Visit payloads: nested form data that may carry dates and files.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Number, Value};

/// Insertion-ordered payload map. Order is preserved in every encoding.
pub type FormMap = IndexMap<String, FormValue>;

/// A payload value. JSON values plus the two kinds JSON cannot express.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    File(FileData),
    List(Vec<FormValue>),
    Map(FormMap),
}

/// Binary content for an upload. A missing name is sent as `blob`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileData {
    pub name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileData {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: Some(name.into()),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn blob(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: None,
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl From<Value> for FormValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => FormValue::Null,
            Value::Bool(b) => FormValue::Bool(b),
            Value::Number(n) => FormValue::Number(n),
            Value::String(s) => FormValue::String(s),
            Value::Array(items) => FormValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                FormValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for FormValue {
    fn from(s: &str) -> Self {
        FormValue::String(s.to_string())
    }
}

impl From<String> for FormValue {
    fn from(s: String) -> Self {
        FormValue::String(s)
    }
}

impl From<bool> for FormValue {
    fn from(b: bool) -> Self {
        FormValue::Bool(b)
    }
}

impl From<i64> for FormValue {
    fn from(n: i64) -> Self {
        FormValue::Number(n.into())
    }
}

impl From<FileData> for FormValue {
    fn from(f: FileData) -> Self {
        FormValue::File(f)
    }
}

impl From<DateTime<Utc>> for FormValue {
    fn from(t: DateTime<Utc>) -> Self {
        FormValue::Date(t)
    }
}

/// Convert a JSON object into a payload map. Non-objects yield an empty map.
pub fn form_map(value: Value) -> FormMap {
    match FormValue::from(value) {
        FormValue::Map(map) => map,
        _ => FormMap::new(),
    }
}

// JSON bodies: dates become ISO strings, files serialize as empty objects.
impl Serialize for FormValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FormValue::Null => serializer.serialize_unit(),
            FormValue::Bool(b) => serializer.serialize_bool(*b),
            FormValue::Number(n) => n.serialize(serializer),
            FormValue::String(s) => serializer.serialize_str(s),
            FormValue::Date(t) => serializer.serialize_str(&to_iso8601(t)),
            FormValue::File(_) => serializer.serialize_map(Some(0))?.end(),
            FormValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FormValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

/// Format a time as `YYYY-MM-DDTHH:MM:SS.sssZ` (UTC, millisecond precision).
pub fn to_iso8601(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
