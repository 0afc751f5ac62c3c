#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;

use console_gateway::navigator::RecordingNavigator;
use console_gateway::storage::{KeyValueStorage, MemoryStorage};
use console_gateway::{Config, Gateway};
use wiremock::MockServer;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub fn config(server: &MockServer) -> Config {
    Config::from_values(format!("{}/api", server.uri()), "/admin")
}

/// Per-test scratch location under `target/` to avoid cross-test races.
pub fn scratch_dir(name: &str) -> PathBuf {
    let mut dir = PathBuf::from("target");
    dir.push("it-scratch");
    dir.push(format!("{name}-{}", uuid::Uuid::new_v4()));
    dir
}

pub fn gateway(
    server: &MockServer,
    storage: Arc<dyn KeyValueStorage>,
    navigator: Arc<RecordingNavigator>,
) -> Gateway {
    Gateway::builder(config(server))
        .storage(storage)
        .navigator(navigator)
        .build()
        .expect("gateway builds")
}

pub fn memory_gateway(server: &MockServer) -> (Gateway, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::new("/admin/dashboard"));
    let gateway = gateway(server, Arc::new(MemoryStorage::new()), navigator.clone());
    (gateway, navigator)
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}
