use std::sync::{Arc, Mutex};

use tracing::subscriber::{DefaultGuard, set_default};
use tracing_subscriber::{Registry, fmt, layer::SubscriberExt};
use wiremock::MockServer;

use crate::download::{Attachment, AttachmentSink};
use crate::navigator::RecordingNavigator;
use crate::storage::{KeyValueStorage, MemoryStorage};
use crate::{Config, CredentialPair, Error, Gateway};

pub fn base_config(server: &MockServer) -> Config {
    Config::from_values(format!("{}/api", server.uri()), "/admin")
}

#[derive(Default)]
pub struct CollectingSink {
    saved: Mutex<Vec<Attachment>>,
}

impl CollectingSink {
    pub fn saved(&self) -> Vec<Attachment> {
        self.saved.lock().unwrap().clone()
    }
}

impl AttachmentSink for CollectingSink {
    fn save(&self, attachment: Attachment) -> Result<(), Error> {
        self.saved.lock().unwrap().push(attachment);
        Ok(())
    }
}

pub struct Harness {
    pub gateway: Gateway,
    pub navigator: Arc<RecordingNavigator>,
    pub sink: Arc<CollectingSink>,
}

/// Gateway against `server` with `pair` already stored.
pub fn harness(server: &MockServer, pair: CredentialPair) -> Harness {
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let navigator = Arc::new(RecordingNavigator::new("/admin/system/user"));
    let sink = Arc::new(CollectingSink::default());
    let gateway = Gateway::builder(base_config(server))
        .storage(storage)
        .navigator(navigator.clone())
        .attachment_sink(sink.clone())
        .build()
        .expect("gateway builds");
    gateway.update_token(&pair).expect("seed credentials");
    Harness {
        gateway,
        navigator,
        sink,
    }
}

/// Collects formatted log lines; each write of the fmt layer is one line.
#[derive(Clone, Default)]
struct LineSink(Arc<Mutex<Vec<String>>>);

impl std::io::Write for LineSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Routes this thread's tracing events into memory until `finish` is called.
///
/// Tests run on a current-thread runtime, so events from spawned tasks land
/// here too.
pub struct LogCapture {
    sink: LineSink,
    _guard: DefaultGuard,
}

impl LogCapture {
    pub fn start() -> Self {
        let sink = LineSink::default();
        let writer = sink.clone();
        let subscriber = Registry::default().with(
            fmt::Layer::default()
                .with_writer(move || writer.clone())
                .with_target(false)
                .with_level(true)
                .with_ansi(false),
        );
        Self {
            sink,
            _guard: set_default(subscriber),
        }
    }

    pub fn finish(self) -> Vec<String> {
        self.sink.0.lock().unwrap().clone()
    }
}
