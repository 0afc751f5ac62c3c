use jiff::{SignedDuration, Timestamp};
use tracing::{Level, event};
use uuid::Uuid;

use crate::errors::Error;
use crate::storage::ContextId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Success,
    Joined,
    Skipped,
    Failed,
}

/// Log correlation for one refresh exchange.
///
/// Callers that join a running exchange log against the same `attempt_id`,
/// so one grep shows who waited on what.
#[derive(Clone, Debug)]
pub struct RefreshTelemetry {
    attempt_id: Uuid,
    context: ContextId,
    generation: u64,
    started_at: Timestamp,
}

impl RefreshTelemetry {
    pub fn new(context: ContextId, generation: u64) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            context,
            generation,
            started_at: Timestamp::now(),
        }
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit_start(&self) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            generation = self.generation,
            started_at = %self.started_at,
            "refresh.start"
        );
    }

    pub fn emit_joined(&self) {
        event!(
            Level::DEBUG,
            attempt_id = %self.attempt_id,
            generation = self.generation,
            outcome = ?RefreshOutcome::Joined,
            "refresh.joined"
        );
    }

    pub fn emit_skipped(context: ContextId) {
        event!(
            Level::DEBUG,
            context = %context,
            outcome = ?RefreshOutcome::Skipped,
            "refresh.skipped: no refresh token held"
        );
    }

    /// Reports how the exchange settled and how long it was in flight.
    pub fn emit_settled(&self, result: &Result<(), Error>) -> RefreshOutcome {
        let elapsed_ms = self.elapsed().as_millis() as i64;
        match result {
            Ok(()) => {
                event!(
                    Level::INFO,
                    attempt_id = %self.attempt_id,
                    generation = self.generation,
                    elapsed_ms,
                    outcome = ?RefreshOutcome::Success,
                    "refresh.success"
                );
                RefreshOutcome::Success
            }
            Err(error) => {
                event!(
                    Level::ERROR,
                    attempt_id = %self.attempt_id,
                    context = %self.context,
                    generation = self.generation,
                    elapsed_ms,
                    outcome = ?RefreshOutcome::Failed,
                    error = %error,
                    "refresh.failure"
                );
                RefreshOutcome::Failed
            }
        }
    }

    fn elapsed(&self) -> SignedDuration {
        Timestamp::now().duration_since(self.started_at)
    }
}
