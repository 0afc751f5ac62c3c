use std::sync::{Mutex, PoisonError, RwLock};

use tracing::info;

/// Where the host application navigates when a session ends.
pub trait Navigator: Send + Sync {
    /// Path the user is currently on, used as the post-sign-in return target.
    fn current_path(&self) -> String;

    fn navigate(&self, location: &str);
}

/// `<app_base>/sign_in?redirect=<percent-encoded path>`
pub fn sign_in_location(app_base: &str, current_path: &str) -> String {
    format!(
        "{}/sign_in?redirect={}",
        app_base.trim_end_matches('/'),
        urlencoding::encode(current_path)
    )
}

/// Navigator for headless hosts: tracks a current path and records every redirect.
pub struct RecordingNavigator {
    current: RwLock<String>,
    history: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new(current_path: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(current_path.into()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_location(&self) -> Option<String> {
        self.history().pop()
    }
}

impl Default for RecordingNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn navigate(&self, location: &str) {
        info!(location = %location, "navigator.redirect");
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(location.to_string());
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = location.to_string();
    }
}
