//! Page model: the server-issued description of one logical screen.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Component props as received from the server.
pub type Props = Map<String, Value>;

/// Validation errors carried in `props.errors`.
pub type Errors = Map<String, Value>;

/// One server-rendered logical screen. Also the unit written to the browser history
/// stack: `remembered_state` is the per-entry cache used by the remember store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub component: String,
    #[serde(default)]
    pub props: Props,
    pub url: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub scroll_regions: Vec<ScrollOffset>,
    #[serde(default)]
    pub remembered_state: Map<String, Value>,
}

impl Page {
    pub fn new(component: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            props: Props::new(),
            url: url.into(),
            version: None,
            scroll_regions: Vec::new(),
            remembered_state: Map::new(),
        }
    }

    /// Errors bag from `props.errors`. Empty when absent or not an object.
    pub fn errors(&self) -> Errors {
        match self.props.get("errors") {
            Some(Value::Object(map)) => map.clone(),
            _ => Errors::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    /// Errors scoped by an error bag. With a bag, only `errors[bag]` counts.
    pub fn scoped_errors(&self, error_bag: Option<&str>) -> Errors {
        let errors = self.errors();
        match error_bag {
            Some(bag) if !bag.is_empty() => match errors.get(bag) {
                Some(Value::Object(scoped)) => scoped.clone(),
                _ => Errors::new(),
            },
            _ => errors,
        }
    }

    /// The page URL resolved against `base` (page URLs are often path-only).
    pub fn resolved_url(&self, base: &Url) -> Result<Url, url::ParseError> {
        base.join(&self.url)
    }

    /// Serialize as a history state object.
    pub fn to_state(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parse a history state object. `None` for anything that is not a page.
    pub fn from_state(state: &Value) -> Option<Page> {
        serde_json::from_value(state.clone()).ok()
    }
}

/// Scroll position of one tracked scroll region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub top: f64,
    pub left: f64,
}

impl ScrollOffset {
    pub const ORIGIN: ScrollOffset = ScrollOffset { top: 0.0, left: 0.0 };

    pub fn new(top: f64, left: f64) -> Self {
        Self { top, left }
    }
}

/// URL without its fragment.
pub fn without_fragment(url: &Url) -> Url {
    let mut out = url.clone();
    out.set_fragment(None);
    out
}
