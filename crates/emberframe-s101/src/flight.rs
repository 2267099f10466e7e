use crate::error::UsageError;

/// Lifecycle gate serializing operations on one writer or reader.
///
/// Exclusive ownership already keeps two operations from overlapping in
/// time; this tracks the misuse that remains observable at runtime: an
/// unfinished payload, reuse after a failed operation, and use after
/// disposal. Checked at every public entry point so misuse fails fast
/// instead of corrupting buffer cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    PayloadOpen,
    Poisoned,
    Disposed,
}

#[derive(Debug)]
pub(crate) struct Flight {
    state: State,
}

impl Flight {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    /// Gate for operations that start a new message.
    pub fn begin(&self) -> Result<(), UsageError> {
        match self.state {
            State::Idle => Ok(()),
            State::PayloadOpen => Err(UsageError::PayloadSinkOpen),
            State::Poisoned => Err(UsageError::Poisoned),
            State::Disposed => Err(UsageError::Disposed),
        }
    }

    /// Gate for operations that continue an open payload.
    pub fn in_payload(&self) -> Result<(), UsageError> {
        match self.state {
            State::PayloadOpen => Ok(()),
            State::Idle => Err(UsageError::NoOpenPayload),
            State::Poisoned => Err(UsageError::Poisoned),
            State::Disposed => Err(UsageError::Disposed),
        }
    }

    pub fn open_payload(&mut self) {
        debug_assert_eq!(self.state, State::Idle);
        self.state = State::PayloadOpen;
    }

    pub fn close_payload(&mut self) {
        debug_assert_eq!(self.state, State::PayloadOpen);
        self.state = State::Idle;
    }

    /// Mark the instance unusable after a failed operation. Disposal is the
    /// only way out.
    pub fn poison(&mut self) {
        if self.state != State::Disposed {
            self.state = State::Poisoned;
        }
    }

    /// Enter the disposed state. Returns false if already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.state == State::Disposed {
            return false;
        }
        self.state = State::Disposed;
        true
    }
}
