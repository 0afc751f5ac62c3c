use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::info;

use crate::download::{Attachment, AttachmentSink};
use crate::errors::Error;
use crate::i18n::Locale;
use crate::request::ResponseType;

use super::disposition;

#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(serde_json::Value),
    Text(String),
    Binary(Bytes),
}

#[derive(Clone, Debug)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl GatewayResponse {
    /// Deserializes a JSON body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        match &self.body {
            ResponseBody::Json(value) => Ok(serde_json::from_value(value.clone())?),
            ResponseBody::Text(text) => Ok(serde_json::from_str(text)?),
            ResponseBody::Binary(bytes) => Ok(serde_json::from_slice(bytes)?),
            ResponseBody::Empty => Ok(serde_json::from_value(serde_json::Value::Null)?),
        }
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Successful response as read off the wire.
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Turns a successful raw response into what callers see.
///
/// Attachments are handed to `sink` and replaced by a "downloading" payload;
/// blobs that are not attachments are parsed as JSON; everything else is decoded
/// according to `response_type`.
pub(crate) fn normalize(
    raw: RawResponse,
    response_type: ResponseType,
    explicit_name: Option<&str>,
    sink: &dyn AttachmentSink,
    locale: Locale,
) -> Result<GatewayResponse, Error> {
    let RawResponse {
        status,
        headers,
        body,
    } = raw;
    let disposition = header_str(&headers, CONTENT_DISPOSITION.as_str());

    if disposition::is_attachment(disposition) {
        let file_name = disposition::resolve_filename(disposition, explicit_name);
        let content_type = Some(header_str(&headers, CONTENT_TYPE.as_str()))
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        info!(file_name = %file_name, size = body.len(), "attachment.save");
        sink.save(Attachment {
            file_name,
            content_type,
            data: body,
        })?;
        let notice = locale.downloading();
        return Ok(GatewayResponse {
            status,
            headers,
            body: ResponseBody::Json(json!({
                "status": 0,
                "msg": notice,
                "message": notice,
            })),
        });
    }

    let body = match response_type {
        // A blob that is not an attachment is a JSON error in disguise.
        ResponseType::Blob => ResponseBody::Json(serde_json::from_slice(&body)?),
        ResponseType::Json => decode(body),
    };
    Ok(GatewayResponse {
        status,
        headers,
        body,
    })
}

fn decode(body: Bytes) -> ResponseBody {
    if body.is_empty() {
        return ResponseBody::Empty;
    }
    match serde_json::from_slice(&body) {
        Ok(value) => ResponseBody::Json(value),
        Err(_) => ResponseBody::Text(String::from_utf8_lossy(&body).into_owned()),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}
