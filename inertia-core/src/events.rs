//! Event bus: named listeners plus a broadcast channel for code outside the router.
//!
//! Both channels see every lifecycle event in the same order. Only `before`,
//! `invalid` and `exception` are cancelable; a veto on any other event is ignored.

use std::fmt;

use crate::page::{Errors, Page};
use crate::protocol::{Response, TransportError};
use crate::visit::{CancelToken, Progress, Visit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Before,
    CancelToken,
    Cancel,
    Start,
    Progress,
    Error,
    Success,
    Invalid,
    Exception,
    Finish,
    Navigate,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::Before,
        EventKind::CancelToken,
        EventKind::Cancel,
        EventKind::Start,
        EventKind::Progress,
        EventKind::Error,
        EventKind::Success,
        EventKind::Invalid,
        EventKind::Exception,
        EventKind::Finish,
        EventKind::Navigate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Before => "before",
            EventKind::CancelToken => "cancelToken",
            EventKind::Cancel => "cancel",
            EventKind::Start => "start",
            EventKind::Progress => "progress",
            EventKind::Error => "error",
            EventKind::Success => "success",
            EventKind::Invalid => "invalid",
            EventKind::Exception => "exception",
            EventKind::Finish => "finish",
            EventKind::Navigate => "navigate",
        }
    }

    /// Name on the broadcast channel, e.g. `inertia:start`.
    pub fn broadcast_name(self) -> &'static str {
        match self {
            EventKind::Before => "inertia:before",
            EventKind::CancelToken => "inertia:cancelToken",
            EventKind::Cancel => "inertia:cancel",
            EventKind::Start => "inertia:start",
            EventKind::Progress => "inertia:progress",
            EventKind::Error => "inertia:error",
            EventKind::Success => "inertia:success",
            EventKind::Invalid => "inertia:invalid",
            EventKind::Exception => "inertia:exception",
            EventKind::Finish => "inertia:finish",
            EventKind::Navigate => "inertia:navigate",
        }
    }

    pub fn is_cancelable(self) -> bool {
        matches!(
            self,
            EventKind::Before | EventKind::Invalid | EventKind::Exception
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A lifecycle event with its payload.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    Before(&'a Visit),
    CancelToken(&'a CancelToken),
    Cancel(&'a Visit),
    Start(&'a Visit),
    Progress(&'a Progress),
    Error(&'a Errors),
    Success(&'a Page),
    Invalid(&'a Response),
    Exception(&'a TransportError),
    Finish(&'a Visit),
    Navigate(&'a Page),
}

impl Event<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Before(_) => EventKind::Before,
            Event::CancelToken(_) => EventKind::CancelToken,
            Event::Cancel(_) => EventKind::Cancel,
            Event::Start(_) => EventKind::Start,
            Event::Progress(_) => EventKind::Progress,
            Event::Error(_) => EventKind::Error,
            Event::Success(_) => EventKind::Success,
            Event::Invalid(_) => EventKind::Invalid,
            Event::Exception(_) => EventKind::Exception,
            Event::Finish(_) => EventKind::Finish,
            Event::Navigate(_) => EventKind::Navigate,
        }
    }

    /// The visit this event is about, if any.
    pub fn visit(&self) -> Option<&Visit> {
        match self {
            Event::Before(v) | Event::Cancel(v) | Event::Start(v) | Event::Finish(v) => Some(v),
            _ => None,
        }
    }
}

/// A handler's answer. `Veto` cancels the default action of cancelable events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verdict {
    #[default]
    Proceed,
    Veto,
}

impl From<bool> for Verdict {
    fn from(proceed: bool) -> Self {
        if proceed {
            Verdict::Proceed
        } else {
            Verdict::Veto
        }
    }
}

impl From<()> for Verdict {
    fn from(_: ()) -> Self {
        Verdict::Proceed
    }
}

/// An event as seen on the broadcast channel.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastEvent<'a> {
    pub name: &'static str,
    pub detail: Event<'a>,
    pub cancelable: bool,
    pub default_prevented: bool,
}

/// Receiver on the broadcast channel.
pub trait EventSink: Send {
    fn dispatch(&mut self, event: &BroadcastEvent<'_>) -> Verdict;
}

impl<F> EventSink for F
where
    F: FnMut(&BroadcastEvent<'_>) -> Verdict + Send,
{
    fn dispatch(&mut self, event: &BroadcastEvent<'_>) -> Verdict {
        self(event)
    }
}

/// Handle returned by [`EventBus::on`]; pass to [`EventBus::off`] to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type Listener = Box<dyn FnMut(&Event<'_>) -> Verdict + Send>;

#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<(Subscription, EventKind, Listener)>,
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F, R>(&mut self, kind: EventKind, mut handler: F) -> Subscription
    where
        F: FnMut(&Event<'_>) -> R + Send + 'static,
        R: Into<Verdict>,
    {
        self.next_id += 1;
        let sub = Subscription(self.next_id);
        self.listeners
            .push((sub, kind, Box::new(move |event| handler(event).into())));
        sub
    }

    /// Returns false if the subscription was already removed.
    pub fn off(&mut self, sub: Subscription) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(s, _, _)| *s != sub);
        self.listeners.len() != before
    }

    pub fn add_sink(&mut self, sink: impl EventSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.iter().filter(|(_, k, _)| *k == kind).count()
    }

    /// Deliver to named listeners, then to the broadcast channel.
    /// Returns false when a cancelable event was vetoed. `before` stops at the
    /// first veto; other cancelable events reach every handler.
    pub fn fire(&mut self, event: Event<'_>) -> bool {
        let kind = event.kind();
        let cancelable = kind.is_cancelable();
        let mut prevented = false;
        for (_, k, listener) in self.listeners.iter_mut() {
            if *k != kind {
                continue;
            }
            if listener(&event) == Verdict::Veto && cancelable {
                prevented = true;
                if kind == EventKind::Before {
                    return false;
                }
            }
        }
        for sink in self.sinks.iter_mut() {
            let broadcast = BroadcastEvent {
                name: kind.broadcast_name(),
                detail: event,
                cancelable,
                default_prevented: prevented,
            };
            if sink.dispatch(&broadcast) == Verdict::Veto && cancelable {
                prevented = true;
                if kind == EventKind::Before {
                    return false;
                }
            }
        }
        !prevented
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
