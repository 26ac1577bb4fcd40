//! Native host for inertia-core: an in-memory browser, a reqwest transport and an
//! async navigator that executes the engine's actions.

pub mod browser;
pub mod config;
pub mod navigator;
pub mod session;
pub mod transport;
pub mod view;

pub use browser::{HardNavigation, HeadlessBrowser, HistoryEntry};
pub use config::Config;
pub use navigator::{Navigator, NavigatorError, VisitOutcome};
pub use session::{SessionError, SessionStorage};
pub use transport::HttpTransport;
pub use view::{ComponentResolver, NameResolver, RecordingView, Swapped, View, ViewError};
