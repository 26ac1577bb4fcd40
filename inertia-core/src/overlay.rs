//! Developer overlay for responses that do not speak the protocol.

use serde_json::Value;

use crate::protocol::Response;

const JSON_NOTICE: &str = "All Inertia requests must receive a valid Inertia response, however a plain JSON response was received.";

/// Style of the dimmed container the host places the frame in.
pub const CONTAINER_STYLE: &str = "position:fixed;width:100vw;height:100vh;padding:50px;box-sizing:border-box;background-color:rgba(0,0,0,.6);z-index:200000";

/// Style of the isolated frame inside the container.
pub const FRAME_STYLE: &str = "background-color:white;border-radius:5px;width:100%;height:100%";

/// A raw response rendered for inspection. The host shows it in an isolated frame,
/// hides page scrolling, and dismisses it on click outside or Escape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub status: u16,
    pub html: String,
}

impl Overlay {
    pub fn from_response(response: &Response) -> Self {
        let text = response.body_text();
        let html = match serde_json::from_str::<Value>(&text) {
            Ok(json @ (Value::Object(_) | Value::Array(_))) => {
                format!("{JSON_NOTICE}<hr>{json}")
            }
            _ => text,
        };
        Self {
            status: response.status,
            html,
        }
    }

    /// Full document for the frame. Links navigate the top window, not the frame.
    pub fn frame_document(&self) -> String {
        let body = self.html.replace("<a ", "<a target=\"_top\" ");
        if body.trim_start().to_ascii_lowercase().starts_with("<!doctype")
            || body.trim_start().to_ascii_lowercase().starts_with("<html")
        {
            body
        } else {
            format!("<html><head></head><body>{body}</body></html>")
        }
    }
}
