//! Host-driven API: Router receives host events, returns actions for the host to
//! perform in order.
//!
//! The router owns the three shared resources of a navigation session: the single
//! active visit, the current page, and (through [`History`]) the mirror of the
//! browser history entry. Hosts that run on threads must keep the router behind one
//! owner (a mutex or an actor) so every mutation is serialized.

use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::codec;
use crate::events::{Event, EventBus, EventKind, EventSink, Subscription, Verdict};
use crate::history::{History, LocationVisit, NavigationType, ScrollAction, DEFAULT_SCROLL_DEBOUNCE};
use crate::overlay::Overlay;
use crate::page::{without_fragment, Page, ScrollOffset};
use crate::payload::{FormMap, FormValue};
use crate::protocol::{self, Classified, Method, Request, RequestBody, Response, TransportError};
use crate::remember;
use crate::visit::{CancelToken, Preserve, Progress, Visit, VisitCallbacks, VisitId, VisitOptions};

/// Something the host must do. Execute in the order returned.
#[derive(Debug, Clone)]
pub enum Action {
    /// Send the request; report with `on_response`, `on_transport_error`, `on_progress`.
    Dispatch(Request),
    /// The in-flight request of this visit was cancelled; drop it.
    Abort(VisitId),
    /// Resolve the named component; report with `on_component_resolved`.
    Resolve { id: VisitId, component: String },
    PushState(Page),
    ReplaceState(Page),
    /// Swap the view to `page`; report with `on_swapped`.
    Swap {
        id: VisitId,
        page: Page,
        preserve_state: bool,
    },
    Scroll(ScrollAction),
    /// Full browser navigation. `reload` when the target is the current document.
    HardNavigate { url: Url, reload: bool },
    StoreLocationVisit(LocationVisit),
    ForgetLocationVisit,
    ShowOverlay(Overlay),
}

/// What the host knows when the document first loads.
#[derive(Debug, Clone)]
pub struct InitialPage {
    /// Page rendered by the server into the document.
    pub page: Page,
    /// Current document location.
    pub location: Url,
    /// `history.state` of the current entry, if it holds a page.
    pub history_state: Option<Page>,
    pub navigation: NavigationType,
    /// Marker left in session storage by a hard navigation, if present.
    pub location_visit: Option<LocationVisit>,
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub scroll_debounce: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            scroll_debounce: DEFAULT_SCROLL_DEBOUNCE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("router is not initialized")]
    NotInitialized,
    #[error("router is already initialized")]
    AlreadyInitialized,
    #[error("invalid url {href:?}: {source}")]
    InvalidUrl {
        href: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum VisitError {
    #[error("visit {visit} failed: {source}")]
    Transport {
        visit: VisitId,
        #[source]
        source: TransportError,
    },
}

struct ActiveVisit {
    visit: Visit,
    callbacks: VisitCallbacks,
    token: CancelToken,
    dispatched: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cancellation {
    Cancelled,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterScroll {
    Keep,
    Reset,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NavigateWhen {
    Always,
    Pushed,
}

/// A page waiting for component resolution and the view swap.
struct PendingSwap {
    id: VisitId,
    page: Page,
    replace: bool,
    write_history: bool,
    preserve_state: bool,
    scroll: AfterScroll,
    navigate: NavigateWhen,
    /// `Some(report)` when this swap completes a visit; `report` fires success/error.
    completes: Option<bool>,
    resolved: bool,
    pushed: bool,
}

impl PendingSwap {
    fn new(id: VisitId, page: Page) -> Self {
        Self {
            id,
            page,
            replace: false,
            write_history: true,
            preserve_state: false,
            scroll: AfterScroll::Reset,
            navigate: NavigateWhen::Pushed,
            completes: None,
            resolved: false,
            pushed: false,
        }
    }
}

/// The visit lifecycle manager.
pub struct Router {
    history: History,
    bus: EventBus,
    navigation: NavigationType,
    initialized: bool,
    /// Latest navigation; swaps for any other id are stale.
    current: VisitId,
    active: Option<ActiveVisit>,
    pending: Option<PendingSwap>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            history: History::new(config.scroll_debounce),
            bus: EventBus::new(),
            navigation: NavigationType::Navigate,
            initialized: false,
            current: VisitId::new(),
            active: None,
            pending: None,
        }
    }

    /// One-time setup from the server-rendered page. Picks the back/forward restore,
    /// location-visit continuation, or fresh-load path.
    pub fn init(&mut self, initial: InitialPage) -> Result<Vec<Action>, RouterError> {
        if self.initialized {
            return Err(RouterError::AlreadyInitialized);
        }
        self.initialized = true;
        self.navigation = initial.navigation;
        self.history.set_location(initial.location.clone());

        let mut history_state = initial.history_state;
        if self.navigation == NavigationType::Reload {
            if let Some(state) = history_state.as_mut() {
                state.remembered_state.clear();
            }
        }
        if let Some(state) = &history_state {
            self.history.adopt(state.clone());
        }

        let mut actions = Vec::new();
        let fragment = initial.location.fragment().map(str::to_string);

        if let (NavigationType::BackForward, Some(mut state)) = (self.navigation, history_state.clone()) {
            debug!(url = %state.url, "restoring page from history");
            state.version = initial.page.version.clone();
            let mut swap = PendingSwap::new(self.next_navigation(), state);
            swap.preserve_state = true;
            swap.scroll = AfterScroll::Restore;
            swap.navigate = NavigateWhen::Always;
            actions.extend(self.begin_swap(swap));
            return Ok(actions);
        }

        let mut page = initial.page;
        append_fragment(&mut page, fragment.as_deref());
        let mut swap = match initial.location_visit {
            Some(marker) => {
                debug!(preserve_scroll = marker.preserve_scroll, "continuing location visit");
                actions.push(Action::ForgetLocationVisit);
                let (remembered, regions) = history_state
                    .map(|s| (s.remembered_state, s.scroll_regions))
                    .unwrap_or_default();
                page.remembered_state = remembered;
                page.scroll_regions = regions;
                let mut swap = PendingSwap::new(self.next_navigation(), page);
                swap.scroll = if marker.preserve_scroll {
                    AfterScroll::Restore
                } else {
                    AfterScroll::Reset
                };
                swap
            }
            None => PendingSwap::new(self.next_navigation(), page),
        };
        swap.preserve_state = true;
        swap.navigate = NavigateWhen::Always;
        actions.extend(self.begin_swap(swap));
        Ok(actions)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Start a visit. Returns no `Dispatch` when a `before` handler vetoed it or it
    /// was cancelled from its `cancel_token` callback.
    pub fn visit(&mut self, href: &str, options: VisitOptions) -> Result<Vec<Action>, RouterError> {
        if !self.initialized {
            return Err(RouterError::NotInitialized);
        }
        let mut actions = self.reap_cancelled();
        let url = self
            .history
            .resolve(href)
            .map_err(|source| RouterError::InvalidUrl {
                href: href.to_string(),
                source,
            })?;

        let VisitOptions {
            method,
            data,
            replace,
            preserve_scroll,
            preserve_state,
            only,
            headers,
            error_bag,
            force_form_data,
            query_array_format,
            mut callbacks,
        } = options;

        let form_data = force_form_data || codec::contains_binary(&data);
        let (url, data) = if form_data {
            if !method.carries_body() {
                warn!(%url, "GET visits cannot carry form data; payload dropped");
            }
            (url, data)
        } else {
            codec::encode(method, url, data, query_array_format)
        };

        let id = VisitId::new();
        let visit = Visit {
            id,
            url,
            method,
            data,
            form_data,
            replace,
            preserve_scroll,
            preserve_state: preserve_state.unwrap_or_default(),
            only,
            headers,
            error_bag: error_bag.filter(|b| !b.is_empty()),
            force_form_data,
            query_array_format,
            completed: false,
            cancelled: false,
            interrupted: false,
        };

        if let Some(on_before) = callbacks.on_before.as_mut() {
            if on_before(&visit) == Verdict::Veto {
                debug!(url = %visit.url, "visit vetoed by local before callback");
                return Ok(actions);
            }
        }
        if !self.bus.fire(Event::Before(&visit)) {
            debug!(url = %visit.url, "visit vetoed by before listener");
            return Ok(actions);
        }

        if let Some(previous) = self.active.as_ref().map(|a| a.visit.id) {
            debug!(%previous, "interrupting active visit");
            actions.extend(self.cancel_visit(previous, Cancellation::Interrupted));
        }
        actions.extend(self.history.save_scroll_positions());

        self.current = id;
        if self.pending.as_ref().is_some_and(|p| !p.resolved) {
            self.pending = None;
        }
        let token = CancelToken::new(id);
        if let Some(on_cancel_token) = callbacks.on_cancel_token.as_mut() {
            on_cancel_token(&token);
        }
        self.bus.fire(Event::CancelToken(&token));
        self.active = Some(ActiveVisit {
            visit,
            callbacks,
            token: token.clone(),
            dispatched: false,
        });

        if token.is_cancelled() {
            debug!(%id, "visit cancelled before dispatch");
            actions.extend(self.cancel_visit(id, Cancellation::Cancelled));
            return Ok(actions);
        }

        let request = self.build_request(&token);
        if let Some(active) = self.active.as_mut() {
            if let Some(on_start) = active.callbacks.on_start.as_mut() {
                on_start(&active.visit);
            }
            self.bus.fire(Event::Start(&active.visit));
            active.dispatched = true;
        }
        if let Some(request) = request {
            debug!(%id, method = %request.method, url = %request.url, "dispatching visit");
            actions.push(Action::Dispatch(request));
        }
        Ok(actions)
    }

    fn build_request(&self, token: &CancelToken) -> Option<Request> {
        let visit = &self.active.as_ref()?.visit;
        let current = self.history.state();
        let headers = protocol::visit_headers(
            &visit.headers,
            &visit.only,
            current.map(|p| p.component.as_str()),
            visit.error_bag.as_deref(),
            current.and_then(|p| p.version.as_deref()),
        );
        let body = if !visit.method.carries_body() {
            RequestBody::Empty
        } else if visit.form_data {
            RequestBody::Multipart(codec::to_multipart(&visit.data))
        } else {
            match serde_json::to_vec(&FormValue::Map(visit.data.clone())) {
                Ok(json) => RequestBody::Json(json),
                Err(e) => {
                    warn!(visit = %visit.id, error = %e, "payload not serializable; sending empty object");
                    RequestBody::Json(b"{}".to_vec())
                }
            }
        };
        Some(Request {
            visit: visit.id,
            method: visit.method,
            url: without_fragment(&visit.url),
            headers,
            body,
            cancel: token.clone(),
        })
    }

    /// Visit the current location again, keeping scroll and state.
    pub fn reload(&mut self, options: VisitOptions) -> Result<Vec<Action>, RouterError> {
        let href = self
            .history
            .location()
            .map(Url::to_string)
            .ok_or(RouterError::NotInitialized)?;
        let options = options.preserve_scroll(true).preserve_state(true);
        self.visit(&href, options)
    }

    /// Deprecated: use `visit` with `replace(true)`.
    pub fn replace(&mut self, href: &str, mut options: VisitOptions) -> Result<Vec<Action>, RouterError> {
        warn!("Router::replace is deprecated; use visit with replace(true)");
        options.replace = true;
        options.preserve_state.get_or_insert(Preserve::Always);
        self.visit(href, options)
    }

    pub fn get(&mut self, href: &str, data: FormMap, options: VisitOptions) -> Result<Vec<Action>, RouterError> {
        self.visit(href, options.method(Method::Get).data(data))
    }

    pub fn post(&mut self, href: &str, data: FormMap, options: VisitOptions) -> Result<Vec<Action>, RouterError> {
        self.body_visit(Method::Post, href, data, options)
    }

    pub fn put(&mut self, href: &str, data: FormMap, options: VisitOptions) -> Result<Vec<Action>, RouterError> {
        self.body_visit(Method::Put, href, data, options)
    }

    pub fn patch(&mut self, href: &str, data: FormMap, options: VisitOptions) -> Result<Vec<Action>, RouterError> {
        self.body_visit(Method::Patch, href, data, options)
    }

    pub fn delete(&mut self, href: &str, data: FormMap, options: VisitOptions) -> Result<Vec<Action>, RouterError> {
        self.body_visit(Method::Delete, href, data, options)
    }

    fn body_visit(
        &mut self,
        method: Method,
        href: &str,
        data: FormMap,
        mut options: VisitOptions,
    ) -> Result<Vec<Action>, RouterError> {
        options.preserve_state.get_or_insert(Preserve::Always);
        self.visit(href, options.method(method).data(data))
    }

    /// Cancel a visit. No-op unless it is the active, unfinished visit.
    pub fn cancel(&mut self, id: VisitId) -> Vec<Action> {
        self.cancel_visit(id, Cancellation::Cancelled)
    }

    fn cancel_visit(&mut self, id: VisitId, how: Cancellation) -> Vec<Action> {
        if !matches!(&self.active, Some(a) if a.visit.id == id && !a.visit.is_terminal()) {
            return Vec::new();
        }
        let committed = self.pending.as_ref().is_some_and(|p| p.id == id && p.resolved);
        if committed && how == Cancellation::Cancelled {
            debug!(%id, "history already written; cancel ignored");
            return Vec::new();
        }
        let Some(mut active) = self.active.take() else {
            return Vec::new();
        };
        debug!(%id, interrupted = how == Cancellation::Interrupted, "visit cancelled");
        active.token.cancel();
        active.visit.completed = false;
        active.visit.cancelled = how == Cancellation::Cancelled;
        active.visit.interrupted = how == Cancellation::Interrupted;
        // A committed swap still runs its post-swap steps in `on_swapped`.
        if !committed && self.pending.as_ref().is_some_and(|p| p.id == id) {
            self.pending = None;
        }

        if let Some(on_cancel) = active.callbacks.on_cancel.as_mut() {
            on_cancel();
        }
        self.bus.fire(Event::Cancel(&active.visit));
        if let Some(on_finish) = active.callbacks.on_finish.as_mut() {
            on_finish(&active.visit);
        }
        self.bus.fire(Event::Finish(&active.visit));

        if active.dispatched {
            vec![Action::Abort(id)]
        } else {
            Vec::new()
        }
    }

    // A caller may cancel through its token without going through the router.
    fn reap_cancelled(&mut self) -> Vec<Action> {
        let id = match &self.active {
            Some(a) if a.token.is_cancelled() && !a.visit.is_terminal() => a.visit.id,
            _ => return Vec::new(),
        };
        self.cancel_visit(id, Cancellation::Cancelled)
    }

    /// Upload progress for a multipart visit.
    pub fn on_progress(&mut self, id: VisitId, loaded: u64, total: Option<u64>) -> Vec<Action> {
        let actions = self.reap_cancelled();
        if let Some(active) = self.active.as_mut().filter(|a| a.visit.id == id && a.visit.form_data) {
            let progress = Progress::new(loaded, total);
            if let Some(on_progress) = active.callbacks.on_progress.as_mut() {
                on_progress(&progress);
            }
            self.bus.fire(Event::Progress(&progress));
        }
        actions
    }

    /// Classify a response and continue the visit.
    pub fn on_response(&mut self, id: VisitId, response: Response) -> Vec<Action> {
        let mut actions = self.reap_cancelled();
        let Some(active) = self.active.as_ref().filter(|a| a.visit.id == id) else {
            debug!(%id, status = response.status, "response for inactive visit dropped");
            return actions;
        };
        let request_url = active.visit.url.clone();
        let classified = protocol::classify(&response);
        debug!(%id, status = response.status, kind = classified_name(&classified), "visit response");

        match classified {
            Classified::Page(mut page) => {
                let visit = &active.visit;
                let current = self.history.state();
                if let Some(current) = current {
                    if !visit.only.is_empty() && current.component == page.component {
                        let mut props = current.props.clone();
                        props.extend(std::mem::take(&mut page.props));
                        page.props = props;
                    }
                }
                let preserve_scroll = visit.preserve_scroll.resolve(&page);
                let preserve_state = visit.preserve_state.resolve(&page);
                if let Some(current) = current {
                    if preserve_state
                        && !current.remembered_state.is_empty()
                        && current.component == page.component
                    {
                        page.remembered_state = current.remembered_state.clone();
                    }
                }
                self.carry_fragment(&request_url, &mut page);
                let replace = visit.replace;
                if id != self.current {
                    debug!(%id, "visit superseded by another navigation; skipping swap");
                    self.complete_visit(id, false);
                    return actions;
                }
                let mut swap = PendingSwap::new(id, page);
                swap.replace = replace;
                swap.preserve_state = preserve_state;
                swap.scroll = if preserve_scroll {
                    AfterScroll::Keep
                } else {
                    AfterScroll::Reset
                };
                swap.completes = Some(true);
                actions.extend(self.begin_swap(swap));
            }
            Classified::ErrorPage(page) => {
                if id != self.current {
                    self.complete_visit(id, false);
                    return actions;
                }
                let mut swap = PendingSwap::new(id, page);
                swap.completes = Some(false);
                actions.extend(self.begin_swap(swap));
            }
            Classified::Location(href) => {
                let preserve_scroll = matches!(active.visit.preserve_scroll, Preserve::Always);
                match self.history.resolve(&href) {
                    Ok(mut url) => {
                        if let Some(fragment) = carried_fragment(&request_url, &url) {
                            url.set_fragment(Some(&fragment));
                        }
                        let reload = self
                            .history
                            .location()
                            .is_some_and(|l| without_fragment(l) == without_fragment(&url));
                        debug!(%url, reload, "location visit");
                        actions.push(Action::StoreLocationVisit(LocationVisit { preserve_scroll }));
                        actions.push(Action::HardNavigate { url, reload });
                    }
                    Err(e) => warn!(location = %href, error = %e, "unusable location header"),
                }
                self.complete_visit(id, false);
            }
            Classified::Invalid => {
                if self.bus.fire(Event::Invalid(&response)) {
                    actions.push(Action::ShowOverlay(Overlay::from_response(&response)));
                }
                self.complete_visit(id, false);
            }
        }
        actions
    }

    /// The request failed without a response. Returns the error unless an
    /// `exception` handler vetoed it.
    pub fn on_transport_error(&mut self, id: VisitId, error: TransportError) -> Result<Vec<Action>, VisitError> {
        let actions = self.reap_cancelled();
        if !matches!(&self.active, Some(a) if a.visit.id == id && !a.visit.is_terminal()) {
            return Ok(actions);
        }
        warn!(%id, error = %error, "visit transport failure");
        let handled = !self.bus.fire(Event::Exception(&error));
        self.complete_visit(id, false);
        if handled {
            Ok(actions)
        } else {
            Err(VisitError::Transport {
                visit: id,
                source: error,
            })
        }
    }

    /// The host could not resolve or swap the component for `id`. Drops the pending
    /// swap; a visit then ends through the `exception` path like a transport failure.
    pub fn on_swap_failed(&mut self, id: VisitId, error: TransportError) -> Result<Vec<Action>, VisitError> {
        if self.pending.as_ref().is_some_and(|p| p.id == id) {
            self.pending = None;
        }
        self.on_transport_error(id, error)
    }

    /// The component for `id` is loaded. Writes history and asks for the swap.
    pub fn on_component_resolved(&mut self, id: VisitId) -> Vec<Action> {
        let mut actions = self.reap_cancelled();
        if id != self.current {
            debug!(%id, "stale component resolution ignored");
            if self.active.as_ref().is_some_and(|a| a.visit.id == id) {
                self.complete_visit(id, false);
            }
            return actions;
        }
        let Some(swap) = self.pending.as_mut().filter(|p| p.id == id && !p.resolved) else {
            return actions;
        };
        swap.resolved = true;
        let page = swap.page.clone();
        let preserve_state = swap.preserve_state;
        if swap.write_history {
            let replace = swap.replace || self.history.is_current(&page);
            swap.pushed = !replace;
            actions.push(if replace {
                self.history.replace(page.clone())
            } else {
                self.history.push(page.clone())
            });
        } else {
            self.history.adopt(page.clone());
        }
        actions.push(Action::Swap {
            id,
            page,
            preserve_state,
        });
        actions
    }

    /// The view finished swapping for `id`. Restores scroll and fires the terminal
    /// events of the navigation.
    pub fn on_swapped(&mut self, id: VisitId) -> Vec<Action> {
        let mut actions = self.reap_cancelled();
        if !matches!(&self.pending, Some(p) if p.id == id && p.resolved) {
            return actions;
        }
        let Some(swap) = self.pending.take() else {
            return actions;
        };
        match swap.scroll {
            AfterScroll::Keep => {}
            AfterScroll::Reset => actions.extend(self.history.reset_scroll()),
            AfterScroll::Restore => actions.extend(self.history.restore_scroll()),
        }
        if swap.navigate == NavigateWhen::Always || swap.pushed {
            self.bus.fire(Event::Navigate(&swap.page));
        }
        if let Some(report) = swap.completes {
            self.complete_visit(id, report);
        }
        actions
    }

    /// Back/forward navigation. `state` is the entry's page, or `None` when the entry
    /// was not written by the router (e.g. a fragment-only change).
    pub fn on_popstate(&mut self, state: Option<Page>, location: Url) -> Vec<Action> {
        if !self.initialized {
            return Vec::new();
        }
        self.history.set_location(location.clone());
        match state {
            Some(page) => {
                debug!(url = %page.url, "popstate restore");
                self.history.adopt(page.clone());
                let mut swap = PendingSwap::new(self.next_navigation(), page);
                swap.write_history = false;
                swap.scroll = AfterScroll::Restore;
                swap.navigate = NavigateWhen::Always;
                self.begin_swap(swap)
            }
            None => {
                let Some(mut page) = self.history.state().cloned() else {
                    return Vec::new();
                };
                if let Ok(mut url) = self.history.resolve(&page.url) {
                    url.set_fragment(location.fragment());
                    page.url = url.to_string();
                }
                let mut actions = vec![self.history.replace(page)];
                actions.extend(self.history.reset_scroll());
                actions
            }
        }
    }

    /// Report current offsets of the tracked scroll regions.
    pub fn on_scroll(&mut self, regions: Vec<ScrollOffset>, now: Instant) {
        self.history.record_scroll(regions, now);
    }

    /// Drive timers: saves debounced scroll positions.
    pub fn tick(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = self.reap_cancelled();
        actions.extend(self.history.flush_scroll(now));
        actions
    }

    /// Store component-local state under `key` in the current history entry.
    pub fn remember(&mut self, key: &str, data: Value) -> Vec<Action> {
        remember::remember(&mut self.history, key, data)
            .into_iter()
            .collect()
    }

    /// Read state remembered under `key` in the current history entry.
    pub fn restore(&self, key: &str) -> Option<&Value> {
        remember::restore(&self.history, key)
    }

    pub fn on<F, R>(&mut self, kind: EventKind, handler: F) -> Subscription
    where
        F: FnMut(&Event<'_>) -> R + Send + 'static,
        R: Into<Verdict>,
    {
        self.bus.on(kind, handler)
    }

    pub fn off(&mut self, sub: Subscription) -> bool {
        self.bus.off(sub)
    }

    /// Attach a broadcast-channel receiver.
    pub fn add_sink(&mut self, sink: impl EventSink + 'static) {
        self.bus.add_sink(sink)
    }

    pub fn page(&self) -> Option<&Page> {
        self.history.state()
    }

    pub fn location(&self) -> Option<&Url> {
        self.history.location()
    }

    pub fn navigation_type(&self) -> NavigationType {
        self.navigation
    }

    pub fn active_visit(&self) -> Option<&Visit> {
        self.active.as_ref().map(|a| &a.visit)
    }

    fn next_navigation(&mut self) -> VisitId {
        self.current = VisitId::new();
        self.current
    }

    fn begin_swap(&mut self, swap: PendingSwap) -> Vec<Action> {
        let action = Action::Resolve {
            id: swap.id,
            component: swap.page.component.clone(),
        };
        self.pending = Some(swap);
        vec![action]
    }

    fn carry_fragment(&self, request_url: &Url, page: &mut Page) {
        let Ok(mut url) = self.history.resolve(&page.url) else {
            return;
        };
        if let Some(fragment) = carried_fragment(request_url, &url) {
            url.set_fragment(Some(&fragment));
            page.url = url.to_string();
        }
    }

    /// Mark the active visit completed and fire its terminal events.
    fn complete_visit(&mut self, id: VisitId, report: bool) {
        if !matches!(&self.active, Some(a) if a.visit.id == id && !a.visit.is_terminal()) {
            return;
        }
        let Some(mut active) = self.active.take() else {
            return;
        };
        if report {
            if let Some(page) = self.history.state() {
                if page.has_errors() {
                    let errors = page.scoped_errors(active.visit.error_bag.as_deref());
                    if let Some(on_error) = active.callbacks.on_error.as_mut() {
                        on_error(&errors);
                    }
                    self.bus.fire(Event::Error(&errors));
                } else {
                    if let Some(on_success) = active.callbacks.on_success.as_mut() {
                        on_success(page);
                    }
                    self.bus.fire(Event::Success(page));
                }
            }
        }
        active.visit.completed = true;
        debug!(%id, "visit finished");
        if let Some(on_finish) = active.callbacks.on_finish.as_mut() {
            on_finish(&active.visit);
        }
        self.bus.fire(Event::Finish(&active.visit));
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn append_fragment(page: &mut Page, fragment: Option<&str>) {
    if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
        if !page.url.contains('#') {
            page.url = format!("{}#{fragment}", page.url);
        }
    }
}

// Fragment to carry from the request onto a target that is the same URL without one.
fn carried_fragment(request: &Url, target: &Url) -> Option<String> {
    let fragment = request.fragment().filter(|f| !f.is_empty())?;
    if target.fragment().is_some() || without_fragment(request) != *target {
        return None;
    }
    Some(fragment.to_string())
}

fn classified_name(c: &Classified) -> &'static str {
    match c {
        Classified::Page(_) => "page",
        Classified::ErrorPage(_) => "error_page",
        Classified::Location(_) => "location",
        Classified::Invalid => "invalid",
    }
}
