//! Remember store: named snapshots of component-local state kept in the current
//! history entry, so they survive back/forward navigation.

use serde_json::Value;

use crate::core::Action;
use crate::history::History;

/// Key used when the caller does not name one.
pub const DEFAULT_KEY: &str = "default";

/// Store `data` under `key` in the current entry. Replaces the entry in place; never
/// adds a history stop. `None` before the first page exists.
pub fn remember(history: &mut History, key: &str, data: Value) -> Option<Action> {
    let mut page = history.state()?.clone();
    page.remembered_state.insert(key.to_string(), data);
    Some(history.replace(page))
}

/// Read `key` from the current entry. `None` means never remembered; a remembered
/// `null` or `false` comes back as `Some`.
pub fn restore<'a>(history: &'a History, key: &str) -> Option<&'a Value> {
    history.state()?.remembered_state.get(key)
}
