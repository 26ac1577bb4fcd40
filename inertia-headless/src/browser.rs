//! In-memory browser: history stack, location, session storage, scroll regions and
//! the overlay slot. Executes the history, scroll and document actions of the engine.

use inertia_core::protocol::LOCATION_VISIT_KEY;
use inertia_core::{LocationVisit, Overlay, Page, ScrollAction, ScrollOffset};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::session::{SessionError, SessionStorage};

/// One entry of the history stack.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub url: Url,
    pub state: Option<Value>,
}

/// A full document navigation requested by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardNavigation {
    pub url: Url,
    pub reload: bool,
}

#[derive(Debug)]
pub struct HeadlessBrowser {
    entries: Vec<HistoryEntry>,
    index: usize,
    session: SessionStorage,
    regions: Vec<ScrollOffset>,
    focused: Option<String>,
    overlay: Option<Overlay>,
    hard_navigations: Vec<HardNavigation>,
}

impl HeadlessBrowser {
    pub fn new(location: Url) -> Self {
        Self::with_session(location, SessionStorage::in_memory())
    }

    pub fn with_session(location: Url, session: SessionStorage) -> Self {
        Self {
            entries: vec![HistoryEntry {
                url: location,
                state: None,
            }],
            index: 0,
            session,
            regions: Vec::new(),
            focused: None,
            overlay: None,
            hard_navigations: Vec::new(),
        }
    }

    pub fn location(&self) -> &Url {
        &self.current().url
    }

    /// `history.state` of the current entry.
    pub fn history_state(&self) -> Option<&Value> {
        self.current().state.as_ref()
    }

    pub fn history_len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    fn current(&self) -> &HistoryEntry {
        &self.entries[self.index]
    }

    fn entry_for(&self, page: &Page) -> HistoryEntry {
        let url = self
            .location()
            .join(&page.url)
            .unwrap_or_else(|_| self.location().clone());
        HistoryEntry {
            url,
            state: Some(page.to_state()),
        }
    }

    /// Add an entry after the current one, discarding any forward entries.
    pub fn push_state(&mut self, page: &Page) {
        let entry = self.entry_for(page);
        self.entries.truncate(self.index + 1);
        self.entries.push(entry);
        self.index += 1;
    }

    pub fn replace_state(&mut self, page: &Page) {
        let entry = self.entry_for(page);
        self.entries[self.index] = entry;
    }

    /// Step back one entry. Returns what a popstate would carry.
    pub fn back(&mut self) -> Option<HistoryEntry> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        Some(self.current().clone())
    }

    pub fn forward(&mut self) -> Option<HistoryEntry> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        Some(self.current().clone())
    }

    /// Push a fragment-only entry with no state, as following an in-page anchor does.
    pub fn follow_fragment(&mut self, fragment: &str) -> HistoryEntry {
        let mut url = self.location().clone();
        url.set_fragment(Some(fragment));
        self.entries.truncate(self.index + 1);
        self.entries.push(HistoryEntry { url, state: None });
        self.index += 1;
        self.current().clone()
    }

    /// Track `count` scroll regions, all at the origin. The headless document has no
    /// viewport of its own; a host that scrolls it registers it as a region.
    pub fn set_region_count(&mut self, count: usize) {
        self.regions = vec![ScrollOffset::ORIGIN; count];
    }

    /// Scroll region `index` (the user scrolling). Returns offsets of all regions.
    pub fn scroll_region(&mut self, index: usize, offset: ScrollOffset) -> Vec<ScrollOffset> {
        if let Some(region) = self.regions.get_mut(index) {
            *region = offset;
        }
        self.regions.clone()
    }

    pub fn regions(&self) -> &[ScrollOffset] {
        &self.regions
    }

    /// Element id last scrolled into view.
    pub fn focused_fragment(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn apply_scroll(&mut self, action: &ScrollAction) {
        match action {
            ScrollAction::Reset { fragment } => {
                self.regions.iter_mut().for_each(|r| *r = ScrollOffset::ORIGIN);
                self.focused = fragment.clone();
            }
            ScrollAction::Restore(offsets) => {
                for (region, offset) in self.regions.iter_mut().zip(offsets) {
                    *region = *offset;
                }
            }
        }
    }

    pub fn show_overlay(&mut self, overlay: Overlay) {
        debug!(status = overlay.status, "showing response overlay");
        self.overlay = Some(overlay);
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    /// Click outside or Escape.
    pub fn dismiss_overlay(&mut self) -> Option<Overlay> {
        self.overlay.take()
    }

    /// Leave the document. A reload keeps the entry; anything else pushes one.
    pub fn hard_navigate(&mut self, url: Url, reload: bool) {
        debug!(%url, reload, "hard navigation");
        if reload {
            self.entries[self.index].url = url.clone();
        } else {
            self.entries.truncate(self.index + 1);
            self.entries.push(HistoryEntry {
                url: url.clone(),
                state: None,
            });
            self.index += 1;
        }
        self.overlay = None;
        self.hard_navigations.push(HardNavigation { url, reload });
    }

    pub fn hard_navigations(&self) -> &[HardNavigation] {
        &self.hard_navigations
    }

    pub fn session(&self) -> &SessionStorage {
        &self.session
    }

    pub fn store_location_visit(&mut self, marker: LocationVisit) -> Result<(), SessionError> {
        let json = serde_json::to_string(&marker).unwrap_or_else(|_| "{}".to_string());
        self.session.set(LOCATION_VISIT_KEY, json)
    }

    pub fn forget_location_visit(&mut self) -> Result<(), SessionError> {
        self.session.remove(LOCATION_VISIT_KEY).map(|_| ())
    }

    /// The pending location-visit marker, if a hard navigation left one.
    pub fn location_visit(&self) -> Option<LocationVisit> {
        let raw = self.session.get(LOCATION_VISIT_KEY)?;
        match serde_json::from_str(raw) {
            Ok(marker) => Some(marker),
            Err(e) => {
                warn!(error = %e, "ignoring malformed location visit marker");
                None
            }
        }
    }
}
