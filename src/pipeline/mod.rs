//! Request preparation stages, the per-request auth state machine, and
//! response normalization.

pub mod attachment;
pub mod disposition;
mod outcome;
mod state;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use tracing::{trace, warn};

use crate::request::{OutboundRequest, RequestBody};
use crate::token::CredentialStore;

pub use attachment::{GatewayResponse, ResponseBody};
pub use outcome::DispatchOutcome;
pub use state::{RequestEvent, RequestState, ResponseClass};

/// Transforms a request just before it goes on the wire.
pub trait RequestStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, request: &mut OutboundRequest, credentials: &CredentialStore);
}

/// Adds `Authorization: Bearer <access token>` when a token is held.
pub struct AuthorizationStage;

impl RequestStage for AuthorizationStage {
    fn name(&self) -> &'static str {
        "authorization"
    }

    fn apply(&self, request: &mut OutboundRequest, credentials: &CredentialStore) {
        let token = credentials.access_token();
        if token.is_empty() {
            request.headers.remove(AUTHORIZATION);
            return;
        }
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => {
                warn!(path = %request.path, "access token is not a valid header value; sending without it");
                request.headers.remove(AUTHORIZATION);
            }
        }
    }
}

/// JSON by default. Multipart and untyped byte bodies carry no JSON content type;
/// the transport sets the boundary-aware one for multipart.
pub struct ContentTypeStage;

impl RequestStage for ContentTypeStage {
    fn name(&self) -> &'static str {
        "content_type"
    }

    fn apply(&self, request: &mut OutboundRequest, _credentials: &CredentialStore) {
        match &request.body {
            RequestBody::Multipart(_)
            | RequestBody::Bytes {
                content_type: None, ..
            } => {
                request.headers.remove(CONTENT_TYPE);
            }
            RequestBody::Bytes {
                content_type: Some(content_type),
                ..
            } => {
                if let Ok(value) = HeaderValue::from_str(content_type) {
                    request.headers.insert(CONTENT_TYPE, value);
                }
            }
            _ => {
                if !request.headers.contains_key(CONTENT_TYPE) {
                    request
                        .headers
                        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
            }
        }
    }
}

/// Ordered list of request stages.
pub struct Pipeline {
    stages: Vec<Box<dyn RequestStage>>,
}

impl Pipeline {
    pub fn empty() -> Self {
        Self { stages: Vec::new() }
    }

    /// Content type first, then authorization.
    pub fn standard() -> Self {
        Self::empty()
            .with_stage(ContentTypeStage)
            .with_stage(AuthorizationStage)
    }

    pub fn with_stage(mut self, stage: impl RequestStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Returns a copy of `original` with every stage applied.
    pub fn prepare(
        &self,
        original: &OutboundRequest,
        credentials: &CredentialStore,
    ) -> OutboundRequest {
        let mut prepared = original.clone();
        for stage in &self.stages {
            stage.apply(&mut prepared, credentials);
            trace!(stage = stage.name(), path = %prepared.path, "request.stage");
        }
        prepared
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}
