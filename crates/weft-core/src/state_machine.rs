use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Session lifecycle state over the current protocol-client handle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionLifecycleState {
    /// No validation has been run against the current handle yet.
    Unchecked,
    /// A lightweight authenticated probe is in flight.
    Validating,
    /// The handle answered the probe with a valid session.
    Valid,
    /// The probe reported an unknown/expired token.
    Invalid,
    /// A full client rebuild is in flight.
    Refreshing,
    /// The rebuild failed; a new refresh attempt is required to recover.
    Failed,
}

/// State machine driving validate/refresh transitions for one session.
///
/// Legal paths: `Unchecked -> Validating -> Valid` and
/// `Unchecked -> Validating -> Invalid -> Refreshing -> Valid | Failed`.
/// A missing or errored client handle may enter `Refreshing` directly.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    state: SessionLifecycleState,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            state: SessionLifecycleState::Unchecked,
        }
    }
}

impl SessionStateMachine {
    pub fn state(&self) -> SessionLifecycleState {
        self.state
    }

    /// Start a validation probe against the current handle.
    pub fn begin_validation(&mut self) -> Result<(), EngineError> {
        self.transition_from_any_of(
            &[
                SessionLifecycleState::Unchecked,
                SessionLifecycleState::Valid,
                SessionLifecycleState::Failed,
            ],
            SessionLifecycleState::Validating,
            "begin_validation",
        )
    }

    /// The probe confirmed the session.
    pub fn mark_valid(&mut self) -> Result<(), EngineError> {
        self.transition_from_state(
            SessionLifecycleState::Validating,
            SessionLifecycleState::Valid,
            "mark_valid",
        )
    }

    /// The probe reported a token-shaped failure.
    pub fn mark_invalid(&mut self) -> Result<(), EngineError> {
        self.transition_from_state(
            SessionLifecycleState::Validating,
            SessionLifecycleState::Invalid,
            "mark_invalid",
        )
    }

    /// Start a full client rebuild.
    ///
    /// Allowed from any state except an already-running refresh: a missing
    /// client handle skips validation entirely.
    pub fn begin_refresh(&mut self) -> Result<(), EngineError> {
        if self.state == SessionLifecycleState::Refreshing {
            return Err(EngineError::invalid_state(self.state, "begin_refresh"));
        }
        self.state = SessionLifecycleState::Refreshing;
        Ok(())
    }

    /// Record the outcome of a rebuild.
    pub fn finish_refresh(&mut self, success: bool) -> Result<(), EngineError> {
        if self.state != SessionLifecycleState::Refreshing {
            return Err(EngineError::invalid_state(self.state, "finish_refresh"));
        }
        self.state = if success {
            SessionLifecycleState::Valid
        } else {
            SessionLifecycleState::Failed
        };
        Ok(())
    }

    fn transition_from_state(
        &mut self,
        expected: SessionLifecycleState,
        next: SessionLifecycleState,
        action: &str,
    ) -> Result<(), EngineError> {
        if self.state != expected {
            return Err(EngineError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(())
    }

    fn transition_from_any_of(
        &mut self,
        expected: &[SessionLifecycleState],
        next: SessionLifecycleState,
        action: &str,
    ) -> Result<(), EngineError> {
        if !expected.contains(&self.state) {
            return Err(EngineError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(())
    }
}
