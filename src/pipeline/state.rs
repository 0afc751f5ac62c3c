use std::fmt;

/// Lifecycle of a single logical request through the refresh-and-replay path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Dispatched,
    AuthFailed,
    RefreshAwaited,
    Replayed,
    Succeeded,
    Failed,
    GivenUp,
    Cancelled,
}

/// How a transport round trip ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    Unauthorized,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestEvent {
    Dispatch,
    Responded(ResponseClass),
    AwaitRefresh,
    RefreshSettled(bool),
    Cancel,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Succeeded
                | RequestState::Failed
                | RequestState::GivenUp
                | RequestState::Cancelled
        )
    }

    /// Applies `event`. Terminal states absorb everything; an event that makes
    /// no sense for a live state fails the request.
    pub fn next(self, event: RequestEvent) -> RequestState {
        use RequestEvent::*;
        use RequestState::*;

        if self.is_terminal() {
            return self;
        }
        match (self, event) {
            (_, Cancel) => Cancelled,
            (Pending, Dispatch) => Dispatched,
            (Dispatched, Responded(ResponseClass::Success)) => Succeeded,
            (Dispatched, Responded(ResponseClass::Unauthorized)) => AuthFailed,
            (Dispatched, Responded(ResponseClass::Error)) => Failed,
            (AuthFailed, AwaitRefresh) => RefreshAwaited,
            (RefreshAwaited, RefreshSettled(true)) => Replayed,
            (RefreshAwaited, RefreshSettled(false)) => GivenUp,
            (Replayed, Responded(ResponseClass::Success)) => Succeeded,
            // A replay is never refreshed again.
            (Replayed, Responded(ResponseClass::Unauthorized)) => GivenUp,
            (Replayed, Responded(ResponseClass::Error)) => Failed,
            _ => Failed,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Pending => "pending",
            RequestState::Dispatched => "dispatched",
            RequestState::AuthFailed => "auth_failed",
            RequestState::RefreshAwaited => "refresh_awaited",
            RequestState::Replayed => "replayed",
            RequestState::Succeeded => "succeeded",
            RequestState::Failed => "failed",
            RequestState::GivenUp => "given_up",
            RequestState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
