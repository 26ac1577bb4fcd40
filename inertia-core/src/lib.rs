//! Inertia-style navigation engine for server-driven single-page apps.
//! Host-driven: no I/O; host passes events and receives actions.

pub mod codec;
pub mod events;
pub mod history;
pub mod overlay;
pub mod page;
pub mod payload;
pub mod protocol;
pub mod remember;
pub mod visit;
pub mod core;

pub use core::{Action, InitialPage, Router, RouterConfig, RouterError, VisitError};
pub use events::{BroadcastEvent, Event, EventKind, EventSink, Subscription, Verdict};
pub use history::{LocationVisit, NavigationType, ScrollAction};
pub use overlay::Overlay;
pub use page::{Errors, Page, Props, ScrollOffset};
pub use payload::{form_map, FileData, FormMap, FormValue};
pub use protocol::{Method, Request, RequestBody, Response, TransportError, TransportErrorKind};
pub use visit::{CancelToken, Preserve, Progress, Visit, VisitId, VisitOptions, VisitState};
