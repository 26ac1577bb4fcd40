//! Visit descriptors, options, per-visit callbacks and cancellation tokens.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::codec::QueryArrayFormat;
use crate::events::Verdict;
use crate::page::{Errors, Page};
use crate::payload::FormMap;
use crate::protocol::Method;

/// Identifies one navigation (a visit, a popstate restore, an initial load).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitId(uuid::Uuid);

impl VisitId {
    pub fn new() -> Self {
        VisitId(uuid::Uuid::new_v4())
    }
}

impl Default for VisitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Cancellation handle for one visit.
///
/// `cancel` is idempotent. Hooks registered with `on_cancel` run exactly once, at
/// cancellation time (or immediately if the token is already cancelled). Hooks must
/// not call back into the router: the router may be mid-call when it cancels a token.
#[derive(Clone)]
pub struct CancelToken {
    visit: VisitId,
    inner: Arc<TokenState>,
}

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl CancelToken {
    pub fn new(visit: VisitId) -> Self {
        Self {
            visit,
            inner: Arc::new(TokenState::default()),
        }
    }

    pub fn visit(&self) -> VisitId {
        self.visit
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks = std::mem::take(&mut *self.lock_hooks());
        for hook in hooks {
            hook();
        }
    }

    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = self.lock_hooks();
        if self.is_cancelled() {
            drop(hooks);
            hook();
        } else {
            hooks.push(Box::new(hook));
        }
    }

    fn lock_hooks(&self) -> std::sync::MutexGuard<'_, Vec<Box<dyn FnOnce() + Send>>> {
        self.inner
            .hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("visit", &self.visit)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Whether scroll position or component state survives a visit.
#[derive(Clone, Default)]
pub enum Preserve {
    #[default]
    Never,
    Always,
    /// Preserve iff the response carries validation errors.
    OnErrors,
    When(Arc<dyn Fn(&Page) -> bool + Send + Sync>),
}

impl Preserve {
    pub fn when(f: impl Fn(&Page) -> bool + Send + Sync + 'static) -> Self {
        Preserve::When(Arc::new(f))
    }

    pub fn resolve(&self, page: &Page) -> bool {
        match self {
            Preserve::Never => false,
            Preserve::Always => true,
            Preserve::OnErrors => page.has_errors(),
            Preserve::When(f) => f(page),
        }
    }
}

impl From<bool> for Preserve {
    fn from(b: bool) -> Self {
        if b {
            Preserve::Always
        } else {
            Preserve::Never
        }
    }
}

impl fmt::Debug for Preserve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preserve::Never => f.write_str("Never"),
            Preserve::Always => f.write_str("Always"),
            Preserve::OnErrors => f.write_str("OnErrors"),
            Preserve::When(_) => f.write_str("When(..)"),
        }
    }
}

/// Upload progress of a multipart visit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub loaded: u64,
    pub total: Option<u64>,
    pub percentage: Option<u8>,
}

impl Progress {
    pub fn new(loaded: u64, total: Option<u64>) -> Self {
        let percentage = total
            .filter(|&t| t > 0)
            .map(|t| ((loaded as f64 / t as f64) * 100.0).round().min(100.0) as u8);
        Self {
            loaded,
            total,
            percentage,
        }
    }
}

type Callback<T> = Option<Box<dyn FnMut(&T) + Send>>;

/// Callbacks scoped to one visit. Each runs before the global listeners for the
/// same lifecycle point.
#[derive(Default)]
pub struct VisitCallbacks {
    pub on_cancel_token: Callback<CancelToken>,
    pub on_before: Option<Box<dyn FnMut(&Visit) -> Verdict + Send>>,
    pub on_start: Callback<Visit>,
    pub on_progress: Callback<Progress>,
    pub on_cancel: Option<Box<dyn FnMut() + Send>>,
    pub on_success: Callback<Page>,
    pub on_error: Callback<Errors>,
    pub on_finish: Callback<Visit>,
}

impl fmt::Debug for VisitCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisitCallbacks")
            .field("on_cancel_token", &self.on_cancel_token.is_some())
            .field("on_before", &self.on_before.is_some())
            .field("on_start", &self.on_start.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

/// Caller input for a visit. `preserve_state: None` means "method default".
#[derive(Debug, Default)]
pub struct VisitOptions {
    pub method: Method,
    pub data: FormMap,
    pub replace: bool,
    pub preserve_scroll: Preserve,
    pub preserve_state: Option<Preserve>,
    pub only: Vec<String>,
    pub headers: IndexMap<String, String>,
    pub error_bag: Option<String>,
    pub force_form_data: bool,
    pub query_array_format: QueryArrayFormat,
    pub callbacks: VisitCallbacks,
}

impl VisitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn data(mut self, data: FormMap) -> Self {
        self.data = data;
        self
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn preserve_scroll(mut self, preserve: impl Into<Preserve>) -> Self {
        self.preserve_scroll = preserve.into();
        self
    }

    pub fn preserve_state(mut self, preserve: impl Into<Preserve>) -> Self {
        self.preserve_state = Some(preserve.into());
        self
    }

    pub fn only<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn error_bag(mut self, bag: impl Into<String>) -> Self {
        self.error_bag = Some(bag.into());
        self
    }

    pub fn force_form_data(mut self, force: bool) -> Self {
        self.force_form_data = force;
        self
    }

    pub fn query_array_format(mut self, format: QueryArrayFormat) -> Self {
        self.query_array_format = format;
        self
    }

    pub fn on_cancel_token(mut self, f: impl FnMut(&CancelToken) + Send + 'static) -> Self {
        self.callbacks.on_cancel_token = Some(Box::new(f));
        self
    }

    pub fn on_before<R: Into<Verdict>>(
        mut self,
        mut f: impl FnMut(&Visit) -> R + Send + 'static,
    ) -> Self {
        self.callbacks.on_before = Some(Box::new(move |visit| f(visit).into()));
        self
    }

    pub fn on_start(mut self, f: impl FnMut(&Visit) + Send + 'static) -> Self {
        self.callbacks.on_start = Some(Box::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(&Progress) + Send + 'static) -> Self {
        self.callbacks.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_cancel(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.callbacks.on_cancel = Some(Box::new(f));
        self
    }

    pub fn on_success(mut self, f: impl FnMut(&Page) + Send + 'static) -> Self {
        self.callbacks.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&Errors) + Send + 'static) -> Self {
        self.callbacks.on_error = Some(Box::new(f));
        self
    }

    pub fn on_finish(mut self, f: impl FnMut(&Visit) + Send + 'static) -> Self {
        self.callbacks.on_finish = Some(Box::new(f));
        self
    }
}

/// Terminal state of a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitState {
    Active,
    Completed,
    Cancelled,
    Interrupted,
}

/// One navigation attempt. Immutable apart from the terminal flags.
#[derive(Debug, Clone)]
pub struct Visit {
    pub id: VisitId,
    /// Absolute; for GET visits the payload is already merged into the query.
    pub url: Url,
    pub method: Method,
    /// Payload still to be sent as a body.
    pub data: FormMap,
    /// Body goes out as multipart (binary data or forced).
    pub form_data: bool,
    pub replace: bool,
    pub preserve_scroll: Preserve,
    pub preserve_state: Preserve,
    pub only: Vec<String>,
    pub headers: IndexMap<String, String>,
    pub error_bag: Option<String>,
    pub force_form_data: bool,
    pub query_array_format: QueryArrayFormat,
    pub completed: bool,
    pub cancelled: bool,
    pub interrupted: bool,
}

impl Visit {
    pub fn state(&self) -> VisitState {
        if self.completed {
            VisitState::Completed
        } else if self.interrupted {
            VisitState::Interrupted
        } else if self.cancelled {
            VisitState::Cancelled
        } else {
            VisitState::Active
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state() != VisitState::Active
    }
}
