//! History synchronizer: the mirror of the current history entry, the current
//! location, and scroll capture/restore for tracked scroll regions.
//!
//! Scroll regions are matched by position, not identity: offset `i` of an entry is
//! applied to the `i`-th region the host tracks when the entry becomes active.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::Action;
use crate::page::{Page, ScrollOffset};

/// Default debounce for saving reported scroll positions.
pub const DEFAULT_SCROLL_DEBOUNCE: Duration = Duration::from_millis(100);

/// How the current document was reached, from the host's navigation timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NavigationType {
    #[default]
    Navigate,
    Reload,
    BackForward,
}

impl NavigationType {
    /// Parse a navigation timing entry type (`navigate`, `reload`, `back_forward`).
    /// Unknown or missing entries count as a fresh navigation.
    pub fn from_timing(entry: Option<&str>) -> Self {
        match entry {
            Some("reload") => NavigationType::Reload,
            Some("back_forward") => NavigationType::BackForward,
            _ => NavigationType::Navigate,
        }
    }
}

/// Scroll changes the host must apply.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrollAction {
    /// Scroll the window and every tracked region to the origin, then bring the
    /// element with id `fragment` into view if there is one.
    Reset { fragment: Option<String> },
    /// Apply offsets to tracked regions by index; missing offsets leave a region alone.
    Restore(Vec<ScrollOffset>),
}

/// One-shot marker carried across a hard navigation in session storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationVisit {
    pub preserve_scroll: bool,
}

#[derive(Debug)]
pub struct History {
    state: Option<Page>,
    location: Option<Url>,
    regions: Vec<ScrollOffset>,
    debounce: Duration,
    last_scroll: Option<Instant>,
}

impl History {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: None,
            location: None,
            regions: Vec::new(),
            debounce,
            last_scroll: None,
        }
    }

    /// The current history entry.
    pub fn state(&self) -> Option<&Page> {
        self.state.as_ref()
    }

    pub fn location(&self) -> Option<&Url> {
        self.location.as_ref()
    }

    pub fn set_location(&mut self, location: Url) {
        self.location = Some(location);
    }

    /// Adopt an entry the browser already holds (initial load, popstate).
    pub fn adopt(&mut self, page: Page) {
        self.state = Some(page);
    }

    /// Resolve a possibly relative URL against the current location.
    pub fn resolve(&self, href: &str) -> Result<Url, url::ParseError> {
        match &self.location {
            Some(base) => base.join(href),
            None => Url::parse(href),
        }
    }

    /// True when `page` would land on exactly the current location.
    pub fn is_current(&self, page: &Page) -> bool {
        match (&self.location, self.resolve(&page.url)) {
            (Some(location), Ok(url)) => *location == url,
            _ => false,
        }
    }

    pub fn push(&mut self, page: Page) -> Action {
        self.track_location(&page);
        self.state = Some(page.clone());
        Action::PushState(page)
    }

    pub fn replace(&mut self, page: Page) -> Action {
        self.track_location(&page);
        self.state = Some(page.clone());
        Action::ReplaceState(page)
    }

    fn track_location(&mut self, page: &Page) {
        if let Ok(url) = self.resolve(&page.url) {
            self.location = Some(url);
        }
    }

    /// Offsets last reported by the host.
    pub fn regions(&self) -> &[ScrollOffset] {
        &self.regions
    }

    /// Record a scroll report. Saved into the entry once reports go quiet.
    pub fn record_scroll(&mut self, regions: Vec<ScrollOffset>, now: Instant) {
        self.regions = regions;
        self.last_scroll = Some(now);
    }

    /// Save debounced scroll positions if the quiet period has elapsed.
    pub fn flush_scroll(&mut self, now: Instant) -> Option<Action> {
        let last = self.last_scroll?;
        if now.saturating_duration_since(last) < self.debounce {
            return None;
        }
        self.save_scroll_positions()
    }

    /// Write the current region offsets into the current entry.
    pub fn save_scroll_positions(&mut self) -> Option<Action> {
        self.last_scroll = None;
        let mut page = self.state.clone()?;
        page.scroll_regions = self.regions.clone();
        Some(self.replace(page))
    }

    /// Reset window and regions to the origin and save the zeroed offsets.
    pub fn reset_scroll(&mut self) -> Vec<Action> {
        let fragment = self
            .location
            .as_ref()
            .and_then(|u| u.fragment())
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        self.regions = vec![ScrollOffset::ORIGIN; self.regions.len()];
        let mut actions = vec![Action::Scroll(ScrollAction::Reset { fragment })];
        actions.extend(self.save_scroll_positions());
        actions
    }

    /// Re-apply the offsets stored in the current entry. The mirror takes them on,
    /// growing to cover regions the host has not reported yet.
    pub fn restore_scroll(&mut self) -> Option<Action> {
        let offsets = self.state.as_ref()?.scroll_regions.clone();
        for (i, offset) in offsets.iter().enumerate() {
            match self.regions.get_mut(i) {
                Some(region) => *region = *offset,
                None => self.regions.push(*offset),
            }
        }
        Some(Action::Scroll(ScrollAction::Restore(offsets)))
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLL_DEBOUNCE)
    }
}
