//! Glasses output rate limiting.
//!
//! Finals always go out immediately; interims are capped to one write per
//! interval, with newer interims replacing the one waiting on the timer
//! (coalesce to latest). The timer itself lives in the session worker's
//! select loop — this type only decides and remembers.

use std::time::Duration;

use polyglass_caption::DisplayFrame;
use tokio::time::Instant;

/// Minimum spacing between interim glasses writes.
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(400);

#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    /// Write the frame now.
    SendNow,
    /// Frame was parked; flush it when the deadline passes.
    Deferred(Instant),
}

#[derive(Debug)]
pub struct Debouncer {
    interval: Duration,
    last_sent: Option<Instant>,
    pending: Option<String>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::with_interval(DEBOUNCE_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
            pending: None,
        }
    }

    /// Decide what to do with one frame.
    pub fn offer(&mut self, frame: &DisplayFrame, now: Instant) -> Decision {
        if frame.is_final {
            // Finals cancel any parked interim: it is obsolete.
            self.pending = None;
            self.last_sent = Some(now);
            return Decision::SendNow;
        }

        match self.last_sent {
            Some(last) if now.duration_since(last) < self.interval => {
                self.pending = Some(frame.text.clone());
                Decision::Deferred(last + self.interval)
            }
            _ => {
                self.last_sent = Some(now);
                self.pending = None;
                Decision::SendNow
            }
        }
    }

    /// Deadline of the parked frame, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending
            .as_ref()
            .and_then(|_| self.last_sent.map(|last| last + self.interval))
    }

    /// Flush the parked frame once its deadline has passed.
    ///
    /// A timer flush does not advance `last_sent`: the window is anchored
    /// at the last immediate emit, so an interim arriving a full interval
    /// after that emit goes out at once even when a flush sat in between.
    pub fn take_due(&mut self) -> Option<String> {
        self.pending.take()
    }

    pub fn clear(&mut self) {
        self.last_sent = None;
        self.pending = None;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}
