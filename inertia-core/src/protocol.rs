//! Wire protocol: request headers, methods, response classification.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::codec::MultipartBody;
use crate::page::Page;
use crate::visit::{CancelToken, VisitId};

pub const HEADER_INERTIA: &str = "X-Inertia";
pub const HEADER_LOCATION: &str = "X-Inertia-Location";
pub const HEADER_VERSION: &str = "X-Inertia-Version";
pub const HEADER_PARTIAL_COMPONENT: &str = "X-Inertia-Partial-Component";
pub const HEADER_PARTIAL_DATA: &str = "X-Inertia-Partial-Data";
pub const HEADER_ERROR_BAG: &str = "X-Inertia-Error-Bag";

/// Accept header sent with every visit.
pub const ACCEPT: &str = "text/html, application/xhtml+xml";

/// Session storage key of the pending location-visit marker.
pub const LOCATION_VISIT_KEY: &str = "inertiaLocationVisit";

/// Status used by servers to request a hard navigation.
pub const STATUS_CONFLICT: u16 = 409;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// GET merges its payload into the query string; everything else sends a body.
    pub fn carries_body(self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            "put" => Ok(Method::Put),
            "patch" => Ok(Method::Patch),
            "delete" => Ok(Method::Delete),
            _ => Err(ProtocolError::UnknownMethod(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown method {0:?}")]
    UnknownMethod(String),
}

/// Request body as it goes on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Vec<u8>),
    Multipart(MultipartBody),
}

impl RequestBody {
    pub fn content_type(&self) -> Option<String> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Json(_) => Some("application/json;charset=utf-8".to_string()),
            RequestBody::Multipart(m) => Some(m.content_type()),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            RequestBody::Empty => &[],
            RequestBody::Json(b) => b,
            RequestBody::Multipart(m) => &m.bytes,
        }
    }
}

/// An HTTP request the host must send for a visit.
#[derive(Debug, Clone)]
pub struct Request {
    pub visit: VisitId,
    pub method: Method,
    /// Absolute, without fragment.
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// Cancelled when the visit is cancelled or interrupted.
    pub cancel: CancelToken,
}

impl Request {
    /// Upload progress is only observable for multipart bodies.
    pub fn reports_progress(&self) -> bool {
        matches!(self.body, RequestBody::Multipart(_))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Headers for a visit: caller headers first, protocol headers override them.
pub fn visit_headers(
    custom: &IndexMap<String, String>,
    only: &[String],
    current_component: Option<&str>,
    error_bag: Option<&str>,
    version: Option<&str>,
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = custom
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let mut set = |name: &str, value: String| {
        headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        headers.push((name.to_string(), value));
    };
    set("Accept", ACCEPT.to_string());
    set("X-Requested-With", "XMLHttpRequest".to_string());
    set(HEADER_INERTIA, "true".to_string());
    if !only.is_empty() {
        set(
            HEADER_PARTIAL_COMPONENT,
            current_component.unwrap_or_default().to_string(),
        );
        set(HEADER_PARTIAL_DATA, only.join(","));
    }
    if let Some(bag) = error_bag.filter(|b| !b.is_empty()) {
        set(HEADER_ERROR_BAG, bag.to_string());
    }
    if let Some(version) = version {
        set(HEADER_VERSION, version.to_string());
    }
    headers
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// An HTTP response handed back by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A protocol page response.
    pub fn page(status: u16, page: &Page) -> Self {
        Self::new(status)
            .with_header(HEADER_INERTIA, "true")
            .with_header("Content-Type", "application/json")
            .with_body(serde_json::to_vec(page).unwrap_or_default())
    }

    /// A 409 location response.
    pub fn location(url: &str) -> Self {
        Self::new(STATUS_CONFLICT).with_header(HEADER_LOCATION, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// What a response means for the visit that received it.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// 2xx protocol page.
    Page(Page),
    /// Protocol page with an error status; swapped in without success/error events.
    ErrorPage(Page),
    /// 409 with a location header: hard navigation.
    Location(String),
    /// Anything else; shown to the developer.
    Invalid,
}

pub fn classify(response: &Response) -> Classified {
    if response.header(HEADER_INERTIA).is_some() {
        return match serde_json::from_slice::<Page>(&response.body) {
            Ok(page) if response.is_success() => Classified::Page(page),
            Ok(page) => Classified::ErrorPage(page),
            Err(e) => {
                warn!(status = response.status, error = %e, "protocol response with malformed page body");
                Classified::Invalid
            }
        };
    }
    if response.status == STATUS_CONFLICT {
        if let Some(location) = response.header(HEADER_LOCATION) {
            return Classified::Location(location.to_string());
        }
    }
    Classified::Invalid
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    Body,
    Other,
}

/// Network-level failure: no response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
