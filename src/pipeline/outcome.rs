use std::time::Duration;

use reqwest::Method;
use tracing::Level;
use tracing::event;

use super::RequestState;

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub method: Method,
    pub path: String,
    pub state: RequestState,
    pub replayed: bool,
    pub elapsed: Duration,
}

impl DispatchOutcome {
    pub fn log(&self) {
        event!(
            Level::INFO,
            method = %self.method,
            path = %self.path,
            state = %self.state,
            replayed = self.replayed,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "request.outcome"
        );
    }
}
