//! Notifier that keeps every notification

use parking_lot::Mutex;
use versium_migrations::{MigrationDirection, MigrationNotifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Success {
        version: String,
        direction: MigrationDirection,
    },
    Error {
        version: String,
        direction: MigrationDirection,
        message: String,
    },
}

impl Notification {
    pub fn is_success(&self) -> bool {
        matches!(self, Notification::Success { .. })
    }

    pub fn version(&self) -> &str {
        match self {
            Notification::Success { version, .. } | Notification::Error { version, .. } => version,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn last(&self) -> Option<Notification> {
        self.notifications.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.notifications.lock().clear();
    }
}

impl MigrationNotifier for RecordingNotifier {
    fn success(&self, version: &str, direction: MigrationDirection) {
        self.notifications.lock().push(Notification::Success {
            version: version.to_string(),
            direction,
        });
    }

    fn error(&self, version: &str, direction: MigrationDirection, message: &str) {
        self.notifications.lock().push(Notification::Error {
            version: version.to_string(),
            direction,
            message: message.to_string(),
        });
    }
}
