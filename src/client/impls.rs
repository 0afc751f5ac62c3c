use std::future::Future;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    Gateway,
    client::GatewayBuilder,
    config::Config,
    errors::Error,
    navigator::sign_in_location,
    pipeline::{
        DispatchOutcome, GatewayResponse, RequestEvent, RequestState, ResponseClass,
        attachment::{self, RawResponse},
    },
    request::{MultipartPart, OutboundRequest, PartValue, RequestBody},
    token::{CredentialPair, CredentialStore, RefreshCoordinator},
    types::{ApiEnvelope, Captcha, RefreshTokenRequest, SignInForm},
};

const CAPTCHA_HEADER: &str = "x-captcha-id";
const MAX_TEXT_MESSAGE: usize = 512;

/// Why a single round trip did not produce a usable response.
enum Failure {
    Unauthorized(Error),
    Other(Error),
    Cancelled,
}

impl Gateway {
    pub fn builder(config: Config) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Last known access token, empty when signed out.
    pub fn access_token(&self) -> String {
        self.credentials.access_token()
    }

    pub fn update_token(&self, pair: &CredentialPair) -> Result<(), Error> {
        self.credentials.update_token(pair)
    }

    /// Absolute URL for `path`; absolute URLs are returned unchanged.
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.api_base, path)
        } else {
            format!("{}/{}", self.api_base, path)
        }
    }

    /// Sends `request`, refreshing the session and replaying once on a 401.
    pub async fn request(&self, request: OutboundRequest) -> Result<GatewayResponse, Error> {
        let started = Instant::now();
        let mut state = RequestState::Pending.next(RequestEvent::Dispatch);
        let mut replayed = false;

        let result = loop {
            let failure = match self.dispatch(&request, replayed).await {
                Ok(raw) => {
                    // A body that cannot be normalized fails the request.
                    let finished = self.finish(raw, &request);
                    let class = match finished {
                        Ok(_) => ResponseClass::Success,
                        Err(_) => ResponseClass::Error,
                    };
                    state = state.next(RequestEvent::Responded(class));
                    break finished;
                }
                Err(failure) => failure,
            };
            match failure {
                Failure::Cancelled => {
                    state = state.next(RequestEvent::Cancel);
                    break Err(Error::Cancelled);
                }
                Failure::Other(err) => {
                    state = state.next(RequestEvent::Responded(ResponseClass::Error));
                    break Err(self.operation_failed(err));
                }
                Failure::Unauthorized(err) => {
                    state = state.next(RequestEvent::Responded(ResponseClass::Unauthorized));
                    if state == RequestState::GivenUp {
                        warn!(
                            method = %request.method,
                            path = %request.path,
                            "replayed request was rejected with 401; giving up"
                        );
                        break Err(err);
                    }
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        status = 401,
                        "request.unauthorized; awaiting token refresh"
                    );
                    state = state.next(RequestEvent::AwaitRefresh);
                    match cancellable(request.cancel.as_ref(), self.refresh_token()).await {
                        Err(_) => {
                            state = state.next(RequestEvent::Cancel);
                            break Err(Error::Cancelled);
                        }
                        Ok(false) => {
                            state = state.next(RequestEvent::RefreshSettled(false));
                            self.redirect_to_sign_in();
                            break Err(err);
                        }
                        Ok(true) => {
                            state = state.next(RequestEvent::RefreshSettled(true));
                            replayed = true;
                        }
                    }
                }
            }
        };

        DispatchOutcome {
            method: request.method.clone(),
            path: request.path.clone(),
            state,
            replayed,
            elapsed: started.elapsed(),
        }
        .log();
        result
    }

    pub async fn get(&self, path: &str) -> Result<GatewayResponse, Error> {
        self.request(OutboundRequest::get(path)).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<GatewayResponse, Error> {
        let body = serde_json::to_value(body)?;
        self.request(OutboundRequest::post(path).json(body)).await
    }

    /// Fetches `path` as a blob; attachments end up in the configured sink.
    pub async fn download(
        &self,
        path: &str,
        file_name: Option<&str>,
    ) -> Result<GatewayResponse, Error> {
        let mut request = OutboundRequest::get(path).blob();
        if let Some(file_name) = file_name {
            request = request.download_file_name(file_name);
        }
        self.request(request).await
    }

    pub async fn upload(
        &self,
        path: &str,
        parts: Vec<MultipartPart>,
    ) -> Result<GatewayResponse, Error> {
        self.request(OutboundRequest::post(path).multipart(parts))
            .await
    }

    /// Exchanges the refresh token for a new pair; concurrent callers share one call.
    pub async fn refresh_token(&self) -> bool {
        let http = self.http.clone();
        let url = self.endpoint("/auth/token");
        self.coordinator
            .refresh_token(move |token| async move {
                let envelope: ApiEnvelope<CredentialPair> = http
                    .post(&url)
                    .json(&RefreshTokenRequest { token })
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                envelope.into_data()
            })
            .await
    }

    pub async fn sign_in(&self, form: &SignInForm) -> Result<(), Error> {
        let response = self
            .http
            .post(self.endpoint("/auth/sign_in"))
            .json(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        let pair = match serde_json::from_slice::<ApiEnvelope<CredentialPair>>(&body) {
            Ok(envelope) => envelope.into_data(),
            Err(err) if status.is_success() => Err(Error::Json(err)),
            Err(_) => Err(Error::Status(status, server_message(status, &body))),
        }
        .inspect_err(|err| warn!(account = %form.account, error = %err, "session.sign_in_rejected"))?;

        self.credentials.update_token(&pair)?;
        info!(account = %form.account, "session.signed_in");
        Ok(())
    }

    pub async fn captcha(&self) -> Result<Captcha, Error> {
        let response = self
            .http
            .get(self.endpoint("/auth/refresh_captcha"))
            .send()
            .await?
            .error_for_status()?;
        let key = response
            .headers()
            .get(CAPTCHA_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::Api(format!("captcha response carried no {CAPTCHA_HEADER}")))?;
        let image = response.bytes().await?;
        Ok(Captcha { key, image })
    }

    /// Notifies the server without waiting, wipes local credentials, and
    /// redirects to sign-in. The redirect happens even if clearing storage fails.
    pub fn sign_out(&self) -> Result<(), Error> {
        self.send_sign_out_beacon();
        let cleared = self.credentials.clear();
        if cleared.is_ok() {
            info!("session.signed_out");
        }
        self.redirect_to_sign_in();
        cleared
    }

    pub fn redirect_to_sign_in(&self) {
        let location = sign_in_location(&self.app_base, &self.navigator.current_path());
        self.navigator.navigate(&location);
    }

    fn send_sign_out_beacon(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime available; sign-out beacon skipped");
            return;
        };
        let beacon = self
            .http
            .get(self.endpoint("/profile/sign_out"))
            .query(&[("access_token", self.credentials.access_token())]);
        runtime.spawn(async move {
            match beacon.send().await {
                Ok(response) => debug!(status = %response.status(), "sign_out.beacon"),
                Err(err) => debug!(error = %err, "sign_out.beacon failed"),
            }
        });
    }

    async fn dispatch(
        &self,
        request: &OutboundRequest,
        replay: bool,
    ) -> Result<RawResponse, Failure> {
        if request.is_cancelled() {
            return Err(Failure::Cancelled);
        }
        let prepared = self.pipeline.prepare(request, &self.credentials);
        let builder = self.build_request(&prepared).map_err(Failure::Other)?;
        debug!(method = %prepared.method, path = %prepared.path, replay, "request.dispatch");

        let cancel = prepared.cancel.as_ref();
        let response = cancellable(cancel, builder.send())
            .await?
            .map_err(|e| Failure::Other(Error::Http(e)))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = cancellable(cancel, response.bytes())
            .await?
            .map_err(|e| Failure::Other(Error::Http(e)))?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(Failure::Unauthorized(Error::Unauthorized(
                status,
                server_message(status, &body),
            )));
        }
        if !status.is_success() {
            return Err(Failure::Other(Error::Status(
                status,
                server_message(status, &body),
            )));
        }
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    fn build_request(&self, prepared: &OutboundRequest) -> Result<RequestBuilder, Error> {
        let mut builder = self
            .http
            .request(prepared.method.clone(), self.endpoint(&prepared.path))
            .headers(prepared.headers.clone());
        if !prepared.query.is_empty() {
            builder = builder.query(&prepared.query);
        }
        let builder = match &prepared.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(serde_json::to_vec(value)?),
            RequestBody::Bytes { data, .. } => builder.body(data.clone()),
            RequestBody::Multipart(parts) => builder.multipart(multipart_form(parts)?),
        };
        Ok(builder)
    }

    fn finish(
        &self,
        raw: RawResponse,
        request: &OutboundRequest,
    ) -> Result<GatewayResponse, Error> {
        attachment::normalize(
            raw,
            request.response_type,
            request.download_file_name.as_deref(),
            self.sink.as_ref(),
            self.locale,
        )
    }

    fn operation_failed(&self, err: Error) -> Error {
        let status = err.status();
        let detail = match err {
            Error::Status(_, message) => message,
            other => other.to_string(),
        };
        Error::OperationFailed {
            status,
            message: format!("{}{}", self.locale.operation_failed_prefix(), detail),
        }
    }
}

/// Races `fut` against the cancellation token, if any.
async fn cancellable<F: Future>(
    token: Option<&CancellationToken>,
    fut: F,
) -> Result<F::Output, Failure> {
    match token {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(Failure::Cancelled),
            output = fut => Ok(output),
        },
        None => Ok(fut.await),
    }
}

fn multipart_form(parts: &[MultipartPart]) -> Result<Form, Error> {
    let mut form = Form::new();
    for part in parts {
        form = match &part.value {
            PartValue::Text(value) => form.text(part.name.clone(), value.clone()),
            PartValue::File {
                file_name,
                content_type,
                data,
            } => {
                let mut file = Part::bytes(data.to_vec()).file_name(file_name.clone());
                if let Some(content_type) = content_type {
                    file = file.mime_str(content_type)?;
                }
                form.part(part.name.clone(), file)
            }
        };
    }
    Ok(form)
}

/// Best human-readable message for a failed response: the envelope `msg`,
/// a short text body, or the status reason.
fn server_message(status: StatusCode, body: &Bytes) -> String {
    if let Ok(envelope) = serde_json::from_slice::<ApiEnvelope<serde_json::Value>>(body)
        && !envelope.msg.is_empty()
    {
        return envelope.msg;
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if !text.is_empty() && text.len() <= MAX_TEXT_MESSAGE {
        return text;
    }
    status
        .canonical_reason()
        .unwrap_or("unexpected status")
        .to_string()
}
