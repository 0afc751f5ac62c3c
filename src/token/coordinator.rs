use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::errors::Error;
use crate::telemetry::refresh::{RefreshOutcome, RefreshTelemetry};

use super::{CredentialPair, CredentialStore};

type RefreshFuture = Shared<BoxFuture<'static, bool>>;

struct InFlight {
    telemetry: RefreshTelemetry,
    attempt: RefreshFuture,
}

/// Single-flight guard around the refresh-token exchange.
///
/// At most one exchange runs at a time; every caller that arrives while it is
/// pending awaits the same outcome. The exchange runs on its own task, so a
/// caller that stops waiting does not cancel it for the others.
pub struct RefreshCoordinator {
    credentials: CredentialStore,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    generation: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            credentials,
            in_flight: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// True while an exchange is pending.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Exchanges the held refresh token for a new pair.
    ///
    /// Resolves `false` without calling `exchange` when no refresh token is held.
    /// Exchange and storage errors are reported through telemetry, never returned.
    pub async fn refresh_token<F, Fut>(&self, exchange: F) -> bool
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<CredentialPair, Error>> + Send + 'static,
    {
        let attempt = {
            let refresh_token = self.credentials.refresh_token();
            if refresh_token.is_empty() {
                RefreshTelemetry::emit_skipped(self.credentials.context_id());
                return false;
            }

            let mut slot = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let pending = slot
                .as_ref()
                .map(|pending| (pending.telemetry.clone(), pending.attempt.clone()));
            match pending {
                Some((telemetry, attempt)) => {
                    telemetry.emit_joined();
                    attempt
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let telemetry =
                        RefreshTelemetry::new(self.credentials.context_id(), generation);
                    let attempt = self.spawn_attempt(telemetry.clone(), exchange(refresh_token));
                    *slot = Some(InFlight {
                        telemetry,
                        attempt: attempt.clone(),
                    });
                    attempt
                }
            }
        };
        attempt.await
    }

    fn spawn_attempt<Fut>(&self, telemetry: RefreshTelemetry, exchange: Fut) -> RefreshFuture
    where
        Fut: Future<Output = Result<CredentialPair, Error>> + Send + 'static,
    {
        let generation = telemetry.generation();
        let credentials = self.credentials.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let on_panic = Arc::clone(&self.in_flight);

        let task = tokio::spawn(async move {
            telemetry.emit_start();
            let result = match exchange.await {
                Ok(pair) => credentials.update_token(&pair),
                Err(err) => Err(err),
            };
            let succeeded = telemetry.emit_settled(&result) == RefreshOutcome::Success;
            release(&in_flight, generation);
            succeeded
        });

        task.map(move |joined| match joined {
            Ok(succeeded) => succeeded,
            Err(_) => {
                release(&on_panic, generation);
                false
            }
        })
        .boxed()
        .shared()
    }
}

/// Empties the slot if it still holds the attempt of `generation`.
fn release(in_flight: &Mutex<Option<InFlight>>, generation: u64) {
    let mut slot = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
    if slot
        .as_ref()
        .is_some_and(|pending| pending.telemetry.generation() == generation)
    {
        *slot = None;
    }
}
