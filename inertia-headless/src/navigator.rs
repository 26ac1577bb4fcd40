//! Navigator: runs the engine's action protocol against the headless browser, the
//! HTTP transport and the view.
//!
//! The router sits behind one `tokio::sync::Mutex` and is only locked between
//! awaits, so a visit started from another task can interrupt one whose request is
//! still in flight.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use inertia_core::protocol::{self, Classified};
use inertia_core::{
    Action, Event, EventKind, FormMap, InitialPage, NavigationType, Overlay, Page, Request, Router,
    RouterError, ScrollOffset, Subscription, TransportError, TransportErrorKind, Verdict, VisitError,
    VisitId, VisitOptions,
};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::browser::{HeadlessBrowser, HistoryEntry};
use crate::session::SessionError;
use crate::transport::HttpTransport;
use crate::view::{ComponentResolver, View, ViewError};

#[derive(Debug, thiserror::Error)]
pub enum NavigatorError {
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Visit(#[from] VisitError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("component {component:?}: {source}")]
    View {
        component: String,
        #[source]
        source: ViewError,
    },
    #[error("{url} did not answer with a protocol page (status {status})")]
    NotAProtocolPage { url: Url, status: u16 },
}

/// How a visit ended, from the caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum VisitOutcome {
    /// Vetoed by a `before` handler or cancelled before its request went out.
    NotDispatched,
    Cancelled,
    /// A page was swapped in (including protocol error pages).
    Completed(Page),
    /// The server asked for a hard navigation.
    Location(Url),
    /// A non-protocol response was shown in the overlay.
    Invalid(Overlay),
    /// Finished without a swap: an `exception` handler took the failure, the overlay
    /// was vetoed, or a history navigation superseded the visit.
    Abandoned,
}

#[derive(Debug, Default)]
struct Report {
    visit: Option<VisitId>,
    cancelled: bool,
    page: Option<Page>,
    location: Option<Url>,
    overlay: Option<Overlay>,
}

impl Report {
    fn outcome(self) -> VisitOutcome {
        if self.visit.is_none() {
            VisitOutcome::NotDispatched
        } else if self.cancelled {
            VisitOutcome::Cancelled
        } else if let Some(url) = self.location {
            VisitOutcome::Location(url)
        } else if let Some(overlay) = self.overlay {
            VisitOutcome::Invalid(overlay)
        } else if let Some(page) = self.page {
            VisitOutcome::Completed(page)
        } else {
            VisitOutcome::Abandoned
        }
    }
}

pub struct Navigator<R, V>
where
    R: ComponentResolver,
    V: View<R::Component>,
{
    router: Arc<Mutex<Router>>,
    browser: Arc<Mutex<HeadlessBrowser>>,
    transport: HttpTransport,
    resolver: R,
    view: Mutex<V>,
}

impl<R, V> Navigator<R, V>
where
    R: ComponentResolver,
    V: View<R::Component>,
{
    pub fn new(
        router: Router,
        browser: Arc<Mutex<HeadlessBrowser>>,
        transport: HttpTransport,
        resolver: R,
        view: V,
    ) -> Self {
        Self {
            router: Arc::new(Mutex::new(router)),
            browser,
            transport,
            resolver,
            view: Mutex::new(view),
        }
    }

    pub fn router(&self) -> Arc<Mutex<Router>> {
        self.router.clone()
    }

    pub fn browser(&self) -> Arc<Mutex<HeadlessBrowser>> {
        self.browser.clone()
    }

    pub fn view(&self) -> &Mutex<V> {
        &self.view
    }

    pub async fn on<F, T>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: FnMut(&Event<'_>) -> T + Send + 'static,
        T: Into<Verdict>,
    {
        self.router.lock().await.on(kind, handler)
    }

    pub async fn page(&self) -> Option<Page> {
        self.router.lock().await.page().cloned()
    }

    /// Load the document at the browser's current location and start the engine.
    pub async fn boot(&self, navigation: NavigationType) -> Result<Page, NavigatorError> {
        let location = self.browser.lock().await.location().clone();
        let response = self.transport.fetch_initial(&location).await?;
        let page = match protocol::classify(&response) {
            Classified::Page(page) => page,
            _ => {
                return Err(NavigatorError::NotAProtocolPage {
                    url: location,
                    status: response.status,
                })
            }
        };
        self.start(page, navigation).await?;
        self.page()
            .await
            .ok_or(NavigatorError::Router(RouterError::NotInitialized))
    }

    /// Start the engine from a page the host already holds.
    pub async fn start(&self, page: Page, navigation: NavigationType) -> Result<(), NavigatorError> {
        let initial = {
            let browser = self.browser.lock().await;
            InitialPage {
                page,
                location: browser.location().clone(),
                history_state: browser.history_state().and_then(Page::from_state),
                navigation,
                location_visit: browser.location_visit(),
            }
        };
        let actions = self.router.lock().await.init(initial)?;
        self.run(actions).await.map(|_| ())
    }

    pub async fn visit(&self, href: &str, options: VisitOptions) -> Result<VisitOutcome, NavigatorError> {
        let actions = self.router.lock().await.visit(href, options)?;
        Ok(self.run(actions).await?.outcome())
    }

    pub async fn reload(&self, options: VisitOptions) -> Result<VisitOutcome, NavigatorError> {
        let actions = self.router.lock().await.reload(options)?;
        Ok(self.run(actions).await?.outcome())
    }

    pub async fn get(&self, href: &str, data: FormMap, options: VisitOptions) -> Result<VisitOutcome, NavigatorError> {
        let actions = self.router.lock().await.get(href, data, options)?;
        Ok(self.run(actions).await?.outcome())
    }

    pub async fn post(&self, href: &str, data: FormMap, options: VisitOptions) -> Result<VisitOutcome, NavigatorError> {
        let actions = self.router.lock().await.post(href, data, options)?;
        Ok(self.run(actions).await?.outcome())
    }

    pub async fn put(&self, href: &str, data: FormMap, options: VisitOptions) -> Result<VisitOutcome, NavigatorError> {
        let actions = self.router.lock().await.put(href, data, options)?;
        Ok(self.run(actions).await?.outcome())
    }

    pub async fn patch(&self, href: &str, data: FormMap, options: VisitOptions) -> Result<VisitOutcome, NavigatorError> {
        let actions = self.router.lock().await.patch(href, data, options)?;
        Ok(self.run(actions).await?.outcome())
    }

    pub async fn delete(&self, href: &str, data: FormMap, options: VisitOptions) -> Result<VisitOutcome, NavigatorError> {
        let actions = self.router.lock().await.delete(href, data, options)?;
        Ok(self.run(actions).await?.outcome())
    }

    pub async fn cancel(&self, id: VisitId) -> Result<(), NavigatorError> {
        let actions = self.router.lock().await.cancel(id);
        self.run(actions).await.map(|_| ())
    }

    /// Browser back button. False when there is no earlier entry.
    pub async fn back(&self) -> Result<bool, NavigatorError> {
        let entry = self.browser.lock().await.back();
        self.traverse(entry).await
    }

    pub async fn forward(&self) -> Result<bool, NavigatorError> {
        let entry = self.browser.lock().await.forward();
        self.traverse(entry).await
    }

    /// Follow an in-page anchor: a stateless entry plus popstate.
    pub async fn follow_fragment(&self, fragment: &str) -> Result<(), NavigatorError> {
        let entry = self.browser.lock().await.follow_fragment(fragment);
        self.traverse(Some(entry)).await.map(|_| ())
    }

    async fn traverse(&self, entry: Option<HistoryEntry>) -> Result<bool, NavigatorError> {
        let Some(entry) = entry else {
            return Ok(false);
        };
        let state = entry.state.as_ref().and_then(Page::from_state);
        let actions = self.router.lock().await.on_popstate(state, entry.url);
        self.run(actions).await?;
        Ok(true)
    }

    pub async fn remember(&self, key: &str, data: Value) -> Result<(), NavigatorError> {
        let actions = self.router.lock().await.remember(key, data);
        self.run(actions).await.map(|_| ())
    }

    pub async fn restore(&self, key: &str) -> Option<Value> {
        self.router.lock().await.restore(key).cloned()
    }

    /// The user scrolled region `index`.
    pub async fn scroll_region(&self, index: usize, offset: ScrollOffset) {
        let regions = self.browser.lock().await.scroll_region(index, offset);
        self.router.lock().await.on_scroll(regions, Instant::now());
    }

    /// Drive the engine's timers once.
    pub async fn tick(&self) -> Result<(), NavigatorError> {
        let actions = self.router.lock().await.tick(Instant::now());
        self.run(actions).await.map(|_| ())
    }

    /// Tick every `every` until the handle is aborted.
    pub fn spawn_ticker(self: Arc<Self>, every: Duration) -> JoinHandle<()>
    where
        R: 'static,
        V: 'static,
    {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                if let Err(e) = self.tick().await {
                    warn!(error = %e, "tick failed");
                }
            }
        })
    }

    async fn run(&self, actions: Vec<Action>) -> Result<Report, NavigatorError> {
        let mut queue: VecDeque<Action> = actions.into();
        let mut report = Report::default();
        let mut components: HashMap<VisitId, R::Component> = HashMap::new();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Dispatch(request) => {
                    report.visit = Some(request.visit);
                    let (more, cancelled) = self.dispatch(request).await?;
                    report.cancelled |= cancelled;
                    queue.extend(more);
                }
                Action::Abort(id) => {
                    debug!(%id, "request aborted");
                    if report.visit == Some(id) {
                        report.cancelled = true;
                    }
                }
                Action::Resolve { id, component } => match self.resolver.resolve(&component).await {
                    Ok(resolved) => {
                        components.insert(id, resolved);
                        queue.extend(self.router.lock().await.on_component_resolved(id));
                    }
                    Err(source) => {
                        let more = self.swap_failed(id, &component, &source).await?;
                        if report.visit != Some(id) {
                            return Err(NavigatorError::View { component, source });
                        }
                        queue.extend(more);
                    }
                },
                Action::PushState(page) => self.browser.lock().await.push_state(&page),
                Action::ReplaceState(page) => self.browser.lock().await.replace_state(&page),
                Action::Swap {
                    id,
                    page,
                    preserve_state,
                } => {
                    let Some(component) = components.remove(&id) else {
                        warn!(%id, "swap without a resolved component");
                        continue;
                    };
                    let swapped = {
                        let mut view = self.view.lock().await;
                        view.swap(component, &page, preserve_state).await
                    };
                    if let Err(source) = swapped {
                        let more = self.swap_failed(id, &page.component, &source).await?;
                        if report.visit != Some(id) {
                            return Err(NavigatorError::View {
                                component: page.component,
                                source,
                            });
                        }
                        queue.extend(more);
                        continue;
                    }
                    if report.visit == Some(id) {
                        report.page = Some(page);
                    }
                    queue.extend(self.router.lock().await.on_swapped(id));
                }
                Action::Scroll(scroll) => self.browser.lock().await.apply_scroll(&scroll),
                Action::HardNavigate { url, reload } => {
                    self.browser.lock().await.hard_navigate(url.clone(), reload);
                    report.location = Some(url);
                }
                Action::StoreLocationVisit(marker) => {
                    self.browser.lock().await.store_location_visit(marker)?
                }
                Action::ForgetLocationVisit => self.browser.lock().await.forget_location_visit()?,
                Action::ShowOverlay(overlay) => {
                    self.browser.lock().await.show_overlay(overlay.clone());
                    report.overlay = Some(overlay);
                }
            }
        }
        Ok(report)
    }

    // Lets the router finish whatever waited on this swap before the error surfaces.
    async fn swap_failed(&self, id: VisitId, component: &str, source: &ViewError) -> Result<Vec<Action>, NavigatorError> {
        warn!(%id, component, error = %source, "component swap failed");
        let error = TransportError::new(TransportErrorKind::Other, format!("component {component:?}: {source}"));
        Ok(self.router.lock().await.on_swap_failed(id, error)?)
    }

    /// Send one request, racing it against its cancel token. Returns the follow-up
    /// actions and whether the visit was cancelled in flight.
    async fn dispatch(&self, request: Request) -> Result<(Vec<Action>, bool), NavigatorError> {
        let id = request.visit;
        let token = request.cancel.clone();
        let (cancel_tx, mut cancelled) = oneshot::channel();
        token.on_cancel(move || {
            let _ = cancel_tx.send(());
        });
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let progress_tx = request.reports_progress().then_some(progress_tx);

        let send = self.transport.send(&request, progress_tx);
        tokio::pin!(send);
        let mut actions = Vec::new();
        let result = loop {
            tokio::select! {
                result = &mut send => break Some(result),
                Ok(()) = &mut cancelled => break None,
                Some(progress) = progress_rx.recv() => {
                    let mut router = self.router.lock().await;
                    actions.extend(router.on_progress(id, progress.loaded, progress.total));
                }
            }
        };

        let mut router = self.router.lock().await;
        while let Ok(progress) = progress_rx.try_recv() {
            actions.extend(router.on_progress(id, progress.loaded, progress.total));
        }
        match result {
            None => {
                debug!(%id, "request cancelled in flight");
                actions.extend(router.cancel(id));
                Ok((actions, true))
            }
            Some(Ok(response)) => {
                actions.extend(router.on_response(id, response));
                Ok((actions, token.is_cancelled()))
            }
            Some(Err(error)) => {
                actions.extend(router.on_transport_error(id, error)?);
                Ok((actions, token.is_cancelled()))
            }
        }
    }
}
