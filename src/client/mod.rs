use std::sync::Arc;

use reqwest::Client;

use crate::config::Config;
use crate::download::{AttachmentSink, DirectorySink};
use crate::errors::Error;
use crate::i18n::Locale;
use crate::navigator::{Navigator, RecordingNavigator};
use crate::pipeline::Pipeline;
use crate::storage::{FileStorage, KeyValueStorage, MemoryStorage};
use crate::token::{CredentialStore, RefreshCoordinator};

mod impls;

const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// Authenticated request gateway.
///
/// Cheap to clone; clones share credentials, the refresh guard, and the transport.
#[derive(Clone)]
pub struct Gateway {
    http: Client,
    api_base: String,
    app_base: String,
    locale: Locale,
    credentials: CredentialStore,
    coordinator: Arc<RefreshCoordinator>,
    pipeline: Arc<Pipeline>,
    sink: Arc<dyn AttachmentSink>,
    navigator: Arc<dyn Navigator>,
}

pub struct GatewayBuilder {
    config: Config,
    http: Option<Client>,
    storage: Option<Arc<dyn KeyValueStorage>>,
    sink: Option<Arc<dyn AttachmentSink>>,
    navigator: Option<Arc<dyn Navigator>>,
    pipeline: Option<Pipeline>,
}

impl GatewayBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            storage: None,
            sink: None,
            navigator: None,
            pipeline: None,
        }
    }

    pub fn http_client(mut self, client: Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Storage area to attach to; several gateways may share one.
    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn attachment_sink(mut self, sink: Arc<dyn AttachmentSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Fails with `Error::Config` when called outside a tokio runtime.
    pub fn build(self) -> Result<Gateway, Error> {
        let config = self.config;
        let api_base = config.api_base.trim_end_matches('/').to_string();
        // Validate the API base before anything goes over the wire
        let _ = reqwest::Url::parse(&api_base).map_err(|e| {
            Error::Config(format!("Invalid API base URL '{}': {}", api_base, e))
        })?;

        let http = match self.http {
            Some(client) => client,
            None => Client::builder().timeout(config.timeout()).build()?,
        };
        let storage: Arc<dyn KeyValueStorage> = match (self.storage, &config.storage_path) {
            (Some(storage), _) => storage,
            (None, Some(path)) => Arc::new(FileStorage::open(path)?),
            (None, None) => Arc::new(MemoryStorage::new()),
        };
        let sink: Arc<dyn AttachmentSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(DirectorySink::new(
                config
                    .download_dir
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DOWNLOAD_DIR.to_string()),
            )),
        };
        let navigator: Arc<dyn Navigator> = match self.navigator {
            Some(navigator) => navigator,
            None => Arc::new(RecordingNavigator::default()),
        };

        let credentials = CredentialStore::init(storage)?;
        let coordinator = Arc::new(RefreshCoordinator::new(credentials.clone()));

        Ok(Gateway {
            http,
            api_base,
            app_base: config.app_base.trim_end_matches('/').to_string(),
            locale: config.locale,
            credentials,
            coordinator,
            pipeline: Arc::new(self.pipeline.unwrap_or_default()),
            sink,
            navigator,
        })
    }
}
