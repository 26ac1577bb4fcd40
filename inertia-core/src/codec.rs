//! Protocol codec: query strings for body-less requests, multipart bodies for uploads.
//!
//! Query strings follow the bracket conventions servers expect from form posts:
//! `user[name]=Ada`, `ids[]=1` (brackets) or `ids[0]=1` (indices).

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::payload::{to_iso8601, FileData, FormMap, FormValue};
use crate::protocol::Method;

/// Query values keep only RFC 3986 unreserved characters.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const MULTIPART_NAME: &AsciiSet = &percent_encoding::CONTROLS.add(b'"');

/// How array elements are keyed in a query string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryArrayFormat {
    /// `ids[0]=1&ids[1]=2`
    Indices,
    /// `ids[]=1&ids[]=2`
    #[default]
    Brackets,
}

/// Merge `data` into the query string of `url` when the method carries no body.
/// Returns the (possibly rewritten) URL and the data still to be sent as a body.
pub fn encode(
    method: Method,
    mut url: Url,
    data: FormMap,
    format: QueryArrayFormat,
) -> (Url, FormMap) {
    if method.carries_body() || data.is_empty() {
        return (url, data);
    }
    let existing = url.query().map(parse_query).unwrap_or_default();
    let merged = deep_merge(existing, data);
    let query = stringify(&merged, format);
    if query.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&query));
    }
    (url, FormMap::new())
}

/// True when any value (at any depth) is a file or blob.
pub fn contains_binary(data: &FormMap) -> bool {
    data.values().any(value_contains_binary)
}

fn value_contains_binary(value: &FormValue) -> bool {
    match value {
        FormValue::File(_) => true,
        FormValue::List(items) => items.iter().any(value_contains_binary),
        FormValue::Map(map) => contains_binary(map),
        _ => false,
    }
}

/// Serialize a payload into a query string (no leading `?`).
pub fn stringify(data: &FormMap, format: QueryArrayFormat) -> String {
    let mut pairs = Vec::new();
    for (key, value) in data {
        stringify_value(key, value, format, &mut pairs);
    }
    pairs.join("&")
}

fn stringify_value(key: &str, value: &FormValue, format: QueryArrayFormat, out: &mut Vec<String>) {
    let encoded = |s: &str| utf8_percent_encode(s, QUERY_VALUE).to_string();
    match value {
        FormValue::Null => out.push(format!("{key}=")),
        FormValue::Bool(b) => out.push(format!("{key}={b}")),
        FormValue::Number(n) => out.push(format!("{key}={}", encoded(&n.to_string()))),
        FormValue::String(s) => out.push(format!("{key}={}", encoded(s))),
        FormValue::Date(t) => out.push(format!("{key}={}", encoded(&to_iso8601(t)))),
        // Files have no query representation.
        FormValue::File(_) => {}
        FormValue::List(items) => {
            for (i, item) in items.iter().enumerate() {
                let child = match format {
                    QueryArrayFormat::Indices => format!("{key}[{i}]"),
                    QueryArrayFormat::Brackets => format!("{key}[]"),
                };
                stringify_value(&child, item, format, out);
            }
        }
        FormValue::Map(map) => {
            for (k, v) in map {
                stringify_value(&format!("{key}[{k}]"), v, format, out);
            }
        }
    }
}

/// Parse a query string into a nested payload (`a[b]=1`, `a[]=1`, `a[0]=1`).
pub fn parse_query(query: &str) -> FormMap {
    let mut out = FormMap::new();
    for pair in query.trim_start_matches('?').split('&') {
        if pair.is_empty() {
            continue;
        }
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(raw_key);
        let value = FormValue::String(decode_component(raw_value));
        let (root, segments) = split_key(&key);
        let slot = out.entry(root).or_insert(FormValue::Null);
        assign(slot, &segments, value);
    }
    out
}

fn decode_component(s: &str) -> String {
    percent_decode_str(&s.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

// "a[b][]" -> ("a", ["b", ""]). Malformed brackets keep the whole key as root.
fn split_key(key: &str) -> (String, Vec<String>) {
    let Some(open) = key.find('[').filter(|&i| i > 0) else {
        return (key.to_string(), Vec::new());
    };
    let root = key[..open].to_string();
    let mut segments = Vec::new();
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return (key.to_string(), Vec::new());
        };
        segments.push(stripped[..close].to_string());
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        return (key.to_string(), Vec::new());
    }
    (root, segments)
}

fn assign(slot: &mut FormValue, segments: &[String], value: FormValue) {
    let Some((head, tail)) = segments.split_first() else {
        // Repeated keys collect into a list.
        match slot {
            FormValue::Null => *slot = value,
            FormValue::List(items) => items.push(value),
            _ => {
                let previous = std::mem::replace(slot, FormValue::Null);
                *slot = FormValue::List(vec![previous, value]);
            }
        }
        return;
    };
    let index = if head.is_empty() {
        Some(usize::MAX)
    } else {
        head.parse::<usize>().ok()
    };
    if matches!(slot, FormValue::Null) {
        *slot = if index.is_some() {
            FormValue::List(Vec::new())
        } else {
            FormValue::Map(FormMap::new())
        };
    } else if index.is_none() {
        if let FormValue::List(items) = slot {
            let map = std::mem::take(items)
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect();
            *slot = FormValue::Map(map);
        }
    }
    match slot {
        FormValue::List(items) => {
            let i = index.unwrap_or(usize::MAX);
            if i >= items.len() {
                items.push(FormValue::Null);
                let last = items.len() - 1;
                assign(&mut items[last], tail, value);
            } else {
                assign(&mut items[i], tail, value);
            }
        }
        FormValue::Map(map) => {
            let child = map.entry(head.clone()).or_insert(FormValue::Null);
            assign(child, tail, value);
        }
        // A scalar already sits here; nested keys cannot extend it.
        _ => {}
    }
}

/// Deep-merge `overlay` into `base`: maps merge recursively, anything else is replaced.
pub fn deep_merge(mut base: FormMap, overlay: FormMap) -> FormMap {
    for (key, value) in overlay {
        if let Some(slot) = base.get_mut(&key) {
            *slot = match (std::mem::replace(slot, FormValue::Null), value) {
                (FormValue::Map(existing), FormValue::Map(incoming)) => {
                    FormValue::Map(deep_merge(existing, incoming))
                }
                (_, incoming) => incoming,
            };
        } else {
            base.insert(key, value);
        }
    }
    base
}

/// One flattened form field.
#[derive(Debug, Clone, PartialEq)]
pub struct FormEntry {
    pub key: String,
    pub part: FormPart,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text(String),
    File(FileData),
}

/// Flatten a nested payload into `parent[child][index]` form fields.
pub fn to_form_entries(data: &FormMap) -> Vec<FormEntry> {
    let mut out = Vec::new();
    for (key, value) in data {
        append_entry(key.clone(), value, &mut out);
    }
    out
}

fn append_entry(key: String, value: &FormValue, out: &mut Vec<FormEntry>) {
    let text = |s: String| FormPart::Text(s);
    match value {
        FormValue::List(items) => {
            for (i, item) in items.iter().enumerate() {
                append_entry(format!("{key}[{i}]"), item, out);
            }
        }
        FormValue::Map(map) => {
            for (k, v) in map {
                append_entry(format!("{key}[{k}]"), v, out);
            }
        }
        FormValue::Date(t) => out.push(FormEntry {
            key,
            part: text(to_iso8601(t)),
        }),
        FormValue::File(file) => out.push(FormEntry {
            key,
            part: FormPart::File(file.clone()),
        }),
        FormValue::Bool(b) => out.push(FormEntry {
            key,
            part: text(if *b { "1" } else { "0" }.to_string()),
        }),
        FormValue::String(s) => out.push(FormEntry {
            key,
            part: text(s.clone()),
        }),
        FormValue::Number(n) => out.push(FormEntry {
            key,
            part: text(n.to_string()),
        }),
        FormValue::Null => out.push(FormEntry {
            key,
            part: text(String::new()),
        }),
    }
}

/// An encoded `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartBody {
    pub boundary: String,
    pub bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

/// Encode a payload as a multipart body.
pub fn to_multipart(data: &FormMap) -> MultipartBody {
    let boundary = format!("----InertiaFormBoundary{}", uuid::Uuid::new_v4().simple());
    let mut bytes = Vec::new();
    for entry in to_form_entries(data) {
        let name = utf8_percent_encode(&entry.key, MULTIPART_NAME).to_string();
        bytes.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match entry.part {
            FormPart::Text(value) => {
                bytes.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                bytes.extend_from_slice(value.as_bytes());
            }
            FormPart::File(file) => {
                let filename = file.name.as_deref().unwrap_or("blob");
                let filename = utf8_percent_encode(filename, MULTIPART_NAME).to_string();
                let content_type = file
                    .content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream");
                bytes.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                bytes.extend_from_slice(&file.bytes);
            }
        }
        bytes.extend_from_slice(b"\r\n");
    }
    bytes.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    MultipartBody { boundary, bytes }
}
