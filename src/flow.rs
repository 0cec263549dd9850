use crate::types::U31_MAX;
use std::num::NonZeroU32;

pub const DEFAULT_WINDOW_SIZE: u32 = 65_535;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowError {
    #[error("flow-control window exhausted")]
    Underflow,
    #[error("flow-control window overflow")]
    Overflow,
}

/// A signed flow-control credit counter in [-2^31, 2^31 - 1]. Windows go
/// negative only through SETTINGS adjustments; consuming past zero is the
/// peer's flow-control violation.
#[derive(Debug, Clone, Copy)]
pub struct FlowWindow {
    available: i64,
}

impl FlowWindow {
    pub fn new(initial: u32) -> Self {
        Self {
            available: i64::from(initial),
        }
    }

    pub fn available(&self) -> i64 {
        self.available
    }

    pub fn consume(&mut self, octets: u32) -> Result<(), WindowError> {
        let next = self.available - i64::from(octets);
        if next < 0 {
            return Err(WindowError::Underflow);
        }
        self.available = next;
        Ok(())
    }

    pub fn credit(&mut self, octets: u32) -> Result<(), WindowError> {
        let next = self.available + i64::from(octets);
        if next > i64::from(U31_MAX) {
            return Err(WindowError::Overflow);
        }
        self.available = next;
        Ok(())
    }

    /// Applies an INITIAL_WINDOW_SIZE delta. The result may be negative; no
    /// octets can be consumed again until credits bring it back up.
    pub fn adjust(&mut self, delta: i64) {
        self.available += delta;
    }
}

/// Receive-side window that refunds consumed credit back to the peer once
/// the window has dropped to half of its target size.
#[derive(Debug, Clone, Copy)]
pub struct RecvWindow {
    window: FlowWindow,
    target: u32,
}

impl RecvWindow {
    pub fn new(target: u32) -> Self {
        Self {
            window: FlowWindow::new(target),
            target,
        }
    }

    pub fn receive(&mut self, octets: u32) -> Result<(), WindowError> {
        self.window.consume(octets)
    }

    /// The WINDOW_UPDATE increment owed to the peer, if it is time to send one.
    pub fn refill(&mut self) -> Option<NonZeroU32> {
        if self.window.available() > i64::from(self.target / 2) {
            return None;
        }
        let deficit = i64::from(self.target) - self.window.available();
        let increment = NonZeroU32::new(deficit as u32)?;
        self.window.adjust(i64::from(increment.get()));
        Some(increment)
    }
}
