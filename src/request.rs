use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

/// How the caller wants the response body materialized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseType {
    #[default]
    Json,
    Blob,
}

#[derive(Clone, Debug)]
pub enum PartValue {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        data: Bytes,
    },
}

/// One field of a multipart form. Kept as plain data so the form can be rebuilt on replay.
#[derive(Clone, Debug)]
pub struct MultipartPart {
    pub name: String,
    pub value: PartValue,
}

impl MultipartPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: PartValue::Text(value.into()),
        }
    }

    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<&str>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            value: PartValue::File {
                file_name: file_name.into(),
                content_type: content_type.map(str::to_string),
                data: data.into(),
            },
        }
    }
}

#[derive(Clone, Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<MultipartPart>),
    Bytes {
        content_type: Option<String>,
        data: Bytes,
    },
}

/// A request as the caller described it.
///
/// The gateway never mutates this value; every dispatch works on a prepared copy,
/// which is what lets a replay pick up a refreshed token.
#[derive(Clone, Debug)]
pub struct OutboundRequest {
    pub method: Method,
    /// Path below the API base, or an absolute URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub response_type: ResponseType,
    /// Overrides whatever file name the server proposes for an attachment.
    pub download_file_name: Option<String>,
    pub cancel: Option<CancellationToken>,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            response_type: ResponseType::Json,
            download_file_name: None,
            cancel: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, parts: Vec<MultipartPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn bytes(mut self, content_type: Option<&str>, data: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes {
            content_type: content_type.map(str::to_string),
            data: data.into(),
        };
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn blob(mut self) -> Self {
        self.response_type = ResponseType::Blob;
        self
    }

    pub fn download_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.download_file_name = Some(file_name.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}
