//! Scripted migrations

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use versium_migrations::{
    BoxError, Migration, MigrationDirection, MigrationParams, StepOutcome, StepResult,
};

/// What a scripted `up` or `down` call does
#[derive(Debug, Clone)]
pub enum Step {
    Done,
    /// Return `false`
    Reject,
    /// Return an error with this message
    Fail(String),
    /// Panic with this message
    Panic(String),
    /// Merge these values into the params, then ask for a restart
    Restart(MigrationParams),
}

impl Step {
    pub fn fail(message: impl Into<String>) -> Self {
        Step::Fail(message.into())
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Step::Panic(message.into())
    }

    pub fn restart<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Step::Restart(values.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// One observed call into a scripted migration
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub direction: MigrationDirection,
    /// Params bound at the time of the call
    pub params: MigrationParams,
}

#[derive(Default)]
struct ScriptState {
    up: VecDeque<Step>,
    down: VecDeque<Step>,
    calls: Vec<RecordedCall>,
}

/// Shared script driving every instance its factory creates
///
/// Steps are consumed in order across instances. Once a direction's queue
/// is empty, calls in that direction complete with [`Step::Done`].
#[derive(Clone, Default)]
pub struct MigrationScript {
    description: String,
    state: Arc<Mutex<ScriptState>>,
}

impl MigrationScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn then_up(self, step: Step) -> Self {
        self.state.lock().up.push_back(step);
        self
    }

    pub fn then_down(self, step: Step) -> Self {
        self.state.lock().down.push_back(step);
        self
    }

    /// A fresh instance bound to this script
    pub fn build(&self) -> ScriptedMigration {
        ScriptedMigration {
            description: self.description.clone(),
            params: MigrationParams::new(),
            state: self.state.clone(),
        }
    }

    /// Factory for catalog registration
    pub fn factory(&self) -> impl Fn() -> Box<dyn Migration> + Send + Sync + 'static {
        let script = self.clone();
        move || Box::new(script.build()) as Box<dyn Migration>
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, direction: MigrationDirection) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.direction == direction)
            .count()
    }
}

/// Migration whose outcomes come from a [`MigrationScript`]
pub struct ScriptedMigration {
    description: String,
    params: MigrationParams,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedMigration {
    fn step(&mut self, direction: MigrationDirection) -> StepResult {
        let step = {
            let mut state = self.state.lock();
            state.calls.push(RecordedCall {
                direction,
                params: self.params.clone(),
            });
            let queue = match direction {
                MigrationDirection::Up => &mut state.up,
                MigrationDirection::Down => &mut state.down,
            };
            queue.pop_front().unwrap_or(Step::Done)
        };

        match step {
            Step::Done => Ok(StepOutcome::Done),
            Step::Reject => Ok(StepOutcome::Rejected),
            Step::Fail(message) => Err(BoxError::from(message)),
            Step::Panic(message) => panic!("{}", message),
            Step::Restart(values) => {
                self.params.extend(values);
                Ok(StepOutcome::Restart)
            }
        }
    }
}

#[async_trait]
impl Migration for ScriptedMigration {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn set_params(&mut self, params: MigrationParams) {
        self.params = params;
    }

    fn params(&self) -> MigrationParams {
        self.params.clone()
    }

    async fn up(&mut self) -> StepResult {
        self.step(MigrationDirection::Up)
    }

    async fn down(&mut self) -> StepResult {
        self.step(MigrationDirection::Down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_steps_are_consumed_across_instances() {
        let script = MigrationScript::new()
            .then_up(Step::restart([("offset", json!(5))]))
            .then_up(Step::Reject);

        let mut first = script.build();
        assert!(matches!(first.up().await, Ok(StepOutcome::Restart)));
        assert_eq!(first.params().get("offset"), Some(&json!(5)));

        let mut second = script.build();
        assert!(matches!(second.up().await, Ok(StepOutcome::Rejected)));
        assert!(matches!(second.up().await, Ok(StepOutcome::Done)));
        assert!(matches!(second.down().await, Ok(StepOutcome::Done)));

        assert_eq!(script.call_count(MigrationDirection::Up), 3);
        assert_eq!(script.call_count(MigrationDirection::Down), 1);
    }

    #[tokio::test]
    async fn test_calls_record_bound_params() {
        let script = MigrationScript::new().then_down(Step::fail("nope"));
        let mut migration = (script.factory())();
        let mut params = MigrationParams::new();
        params.insert("dry_run".to_string(), json!(true));
        migration.set_params(params.clone());

        let err = migration.down().await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
        assert_eq!(
            script.calls(),
            vec![RecordedCall {
                direction: MigrationDirection::Down,
                params,
            }]
        );
    }
}
