//! read configuration from a file, the environment, or AWS Secrets Manager

use std::time::Duration;

use aws_config::BehaviorVersion;
use serde::Deserialize;

use crate::errors::Error;
use crate::i18n::Locale;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub enum ConfigLocation {
    File(String),
    Env,
    Secret,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Base of every API path, e.g. `https://console.example.com/api`.
    pub api_base: String,
    /// Base of the console pages; the sign-in redirect is built under it.
    #[serde(default)]
    pub app_base: String,
    /// JSON file holding the credential pair; in-memory storage when unset.
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub download_dir: Option<String>,
    #[serde(default)]
    pub locale: Locale,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Config {
    pub fn from_values(api_base: impl Into<String>, app_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            app_base: app_base.into(),
            storage_path: None,
            download_dir: None,
            locale: Locale::default(),
            timeout_secs: None,
        }
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn from_env() -> Result<Self, Error> {
        Ok(Config {
            api_base: std::env::var("CONSOLE_API_BASE")
                .map_err(|_| Error::Config("Missing CONSOLE_API_BASE env var".to_string()))?,
            app_base: std::env::var("CONSOLE_APP_BASE").unwrap_or_default(),
            storage_path: std::env::var("CONSOLE_STORAGE_PATH").ok(),
            download_dir: std::env::var("CONSOLE_DOWNLOAD_DIR").ok(),
            locale: match std::env::var("CONSOLE_LOCALE") {
                Ok(value) => value.parse()?,
                Err(_) => Locale::default(),
            },
            timeout_secs: match std::env::var("CONSOLE_TIMEOUT_SECS") {
                Ok(value) => Some(value.parse().map_err(|_| {
                    Error::Config(format!("Invalid CONSOLE_TIMEOUT_SECS '{}'", value))
                })?),
                Err(_) => None,
            },
        })
    }

    pub async fn from_secret() -> Result<Self, Error> {
        let secret_arn = std::env::var("CONSOLE_CONFIG_SECRET_ARN").map_err(|_| {
            Error::Config("Missing CONSOLE_CONFIG_SECRET_ARN env var".to_string())
        })?;
        let client = aws_sdk_secretsmanager::Client::new(
            &aws_config::load_defaults(BehaviorVersion::latest()).await,
        );
        let resp = client
            .get_secret_value()
            .secret_id(secret_arn)
            .send()
            .await
            .map_err(|e| Error::Config(format!("Failed to get secret: {}", e)))?;
        let secret = match resp.secret_string() {
            Some(s) => Ok(s),
            None => Err(Error::Config(
                "Failed to get secret string, returned None".to_string(),
            )),
        }?;
        let config: Config = serde_json::from_str(secret)?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

pub async fn read_config(loc: ConfigLocation) -> Result<Config, Error> {
    let config = match loc {
        ConfigLocation::File(path) => Config::from_file(path)?,
        ConfigLocation::Env => Config::from_env()?,
        ConfigLocation::Secret => Config::from_secret().await?,
    };
    Ok(config)
}
