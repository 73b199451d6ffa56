//! Request ownership tracking
//!
//! Each of the driver's three requests lives in a [`Slot`]. The slot
//! holds the request while the driver owns it, and remembers that the
//! controller has it while a transfer is in flight.

/// Where a request currently is
#[derive(Debug)]
pub enum Slot<R> {
    /// No request allocated
    Unallocated,
    /// The driver holds the request
    Idle(R),
    /// The controller holds the request
    InFlight,
}

impl<R> Slot<R> {
    /// Take the request for submission
    ///
    /// Returns `None` if the request is unallocated or already in flight.
    pub fn begin(&mut self) -> Option<R> {
        match core::mem::replace(self, Slot::InFlight) {
            Slot::Idle(req) => Some(req),
            other => {
                *self = other;
                None
            }
        }
    }

    /// The request is back from the controller
    pub fn finish(&mut self, req: R) {
        debug_assert!(!matches!(self, Slot::Idle(_)), "request returned twice");
        *self = Slot::Idle(req);
    }

    /// Borrow the idle request
    pub fn get(&self) -> Option<&R> {
        match self {
            Slot::Idle(req) => Some(req),
            _ => None,
        }
    }

    /// Borrow the idle request
    pub fn get_mut(&mut self) -> Option<&mut R> {
        match self {
            Slot::Idle(req) => Some(req),
            _ => None,
        }
    }

    /// Give up the idle request, for freeing
    pub fn free(&mut self) -> Option<R> {
        match core::mem::replace(self, Slot::Unallocated) {
            Slot::Idle(req) => Some(req),
            Slot::InFlight => {
                *self = Slot::InFlight;
                None
            }
            Slot::Unallocated => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Slot::InFlight)
    }

    pub fn is_allocated(&self) -> bool {
        !matches!(self, Slot::Unallocated)
    }
}

impl<R> Default for Slot<R> {
    fn default() -> Self {
        Slot::Unallocated
    }
}
