use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Standard server reply: `{status, msg, data}` with `status == 0` meaning success.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub status: i64,
    #[serde(default, alias = "message")]
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn into_data(self) -> Result<T, Error> {
        if self.status != 0 {
            return Err(Error::Api(self.msg));
        }
        self.data
            .ok_or_else(|| Error::Api("response carried no data".to_string()))
    }
}

#[derive(Serialize)]
pub(crate) struct RefreshTokenRequest {
    pub token: String,
}

#[derive(Clone, Serialize)]
pub struct SignInForm {
    pub account: String,
    pub password: String,
    pub captcha_key: String,
    pub captcha_value: String,
}

impl fmt::Debug for SignInForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInForm")
            .field("account", &self.account)
            .field("password", &"<RESERVED>")
            .field("captcha_key", &self.captcha_key)
            .field("captcha_value", &self.captcha_value)
            .finish()
    }
}

/// Captcha challenge: the key to echo back on sign-in plus the PNG image.
#[derive(Clone, Debug)]
pub struct Captcha {
    pub key: String,
    pub image: Bytes,
}
