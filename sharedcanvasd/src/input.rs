//! Raw pointer events and the per-device event source abstraction.
//!
//! Workers only see this module; the evdev implementation lives in
//! [`crate::device`] and tests drive workers with scripted sources.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Relative motion axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// One decoded event from a pointing device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    /// Relative motion along one axis
    Motion { axis: Axis, delta: i32 },
    /// Primary button state change
    Button { pressed: bool },
}

impl RawEvent {
    pub fn motion_x(delta: i32) -> Self {
        RawEvent::Motion { axis: Axis::X, delta }
    }

    pub fn motion_y(delta: i32) -> Self {
        RawEvent::Motion { axis: Axis::Y, delta }
    }

    pub fn press() -> Self {
        RawEvent::Button { pressed: true }
    }

    pub fn release() -> Self {
        RawEvent::Button { pressed: false }
    }
}

/// Outcome of waiting on a source for at most one poll interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePoll {
    Event(RawEvent),
    /// Nothing arrived within the wait
    Idle,
    /// The device is gone; no further events will arrive
    Closed,
}

/// Errors raised by event sources
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: io::Error },

    #[error("failed to grab {path}: {source}")]
    Grab { path: String, source: io::Error },

    #[error("failed to configure {path}: {source}")]
    Configure { path: String, source: nix::Error },

    #[error("failed to read events from {path}: {source}")]
    Read { path: String, source: io::Error },
}

/// A per-device stream of raw events.
///
/// `poll_event` must return within roughly `wait` so the worker can observe
/// the shutdown signal between events.
pub trait EventSource: Send {
    fn poll_event(&mut self, wait: Duration) -> Result<SourcePoll, SourceError>;
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn poll_event(&mut self, wait: Duration) -> Result<SourcePoll, SourceError> {
        (**self).poll_event(wait)
    }
}
