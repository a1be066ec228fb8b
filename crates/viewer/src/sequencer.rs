//! Request ids for discarding out-of-order responses.

#![forbid(unsafe_code)]

/// Identifier handed to an in-flight request.
pub type RequestId = u64;

/// Monotonic request ids; only the most recently issued one is current.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    last: RequestId,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> RequestId {
        self.last += 1;
        self.last
    }

    pub fn is_current(&self, id: RequestId) -> bool {
        id == self.last
    }

    pub fn current(&self) -> RequestId {
        self.last
    }

    /// Make every outstanding id stale without issuing a request.
    pub fn invalidate(&mut self) {
        self.next();
    }
}
