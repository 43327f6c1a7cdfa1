//! Statement runner that records instead of executing

use async_trait::async_trait;
use parking_lot::Mutex;
use versium_migrations::{BoxError, StatementRunner};

/// Keeps every statement it is asked to run
///
/// A statement containing the configured failure pattern fails, and nothing
/// after it in the same batch is recorded.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    statements: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(pattern: impl Into<String>) -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
            fail_on: Some(pattern.into()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }
}

#[async_trait]
impl StatementRunner for RecordingRunner {
    async fn run_statement(&self, statement: &str) -> Result<u64, BoxError> {
        if let Some(pattern) = &self.fail_on {
            if statement.contains(pattern.as_str()) {
                return Err(format!("statement failed: {}", statement).into());
            }
        }
        self.statements.lock().push(statement.to_string());
        Ok(0)
    }
}
