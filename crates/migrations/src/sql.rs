//! SQL definitions - migrations stored as annotated SQL scripts
//!
//! A definition file looks like:
//!
//! ```sql
//! -- Description: create the users table
//! -- Up
//! CREATE TABLE users (id SERIAL PRIMARY KEY);
//! -- Down
//! DROP TABLE users;
//! ```
//!
//! Section markers are the comment lines `-- Up` / `-- Down` (also
//! `-- Up migration` / `-- Down migration`), case-insensitive.

use async_trait::async_trait;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlx::PgPool;
use std::sync::Arc;

use crate::error::BoxError;
use crate::migration::{Migration, MigrationParams, StepOutcome, StepResult};

/// Executes SQL statements on behalf of SQL definitions
#[async_trait]
pub trait StatementRunner: Send + Sync {
    /// Execute one statement, returning the affected row count
    async fn run_statement(&self, statement: &str) -> Result<u64, BoxError>;

    /// Execute a script's statements in order
    ///
    /// Backends that support transactions should run the whole batch in one.
    async fn run_batch(&self, statements: &[String]) -> Result<(), BoxError> {
        for statement in statements {
            self.run_statement(statement).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StatementRunner for PgPool {
    async fn run_statement(&self, statement: &str) -> Result<u64, BoxError> {
        let result = sqlx::query(statement).execute(self).await?;
        Ok(result.rows_affected())
    }

    async fn run_batch(&self, statements: &[String]) -> Result<(), BoxError> {
        let mut transaction = self.begin().await?;
        for statement in statements {
            sqlx::query(statement).execute(&mut *transaction).await?;
        }
        transaction.commit().await?;
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Up,
    Down,
}

/// Parsed contents of a SQL definition file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlDefinition {
    pub description: String,
    pub up_sql: String,
    pub down_sql: String,
}

impl SqlDefinition {
    /// Parse definition text into its description and UP/DOWN bodies
    pub fn parse(content: &str) -> Self {
        let mut description = String::new();
        let mut up_sql = Vec::new();
        let mut down_sql = Vec::new();
        let mut section = Section::Header;

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(comment) = trimmed.strip_prefix("--") {
                let comment = comment.trim();
                let lowered = comment.to_lowercase();

                match lowered.as_str() {
                    "up" | "up migration" => {
                        section = Section::Up;
                        continue;
                    }
                    "down" | "down migration" => {
                        section = Section::Down;
                        continue;
                    }
                    _ => {}
                }

                if section == Section::Header {
                    if let Some(text) = strip_prefix_ignore_case(comment, "description:") {
                        description = text.trim().to_string();
                    }
                }
                continue;
            }

            if trimmed.is_empty() {
                continue;
            }

            match section {
                Section::Up => up_sql.push(line),
                Section::Down => down_sql.push(line),
                Section::Header => {}
            }
        }

        Self {
            description,
            up_sql: up_sql.join("\n").trim().to_string(),
            down_sql: down_sql.join("\n").trim().to_string(),
        }
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        text.get(prefix.len()..)
    } else {
        None
    }
}

/// Split SQL into executable statements
///
/// Uses a SQL parser; scripts it cannot parse fall back to splitting on
/// semicolons.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }

    let dialect = GenericDialect {};
    match Parser::parse_sql(&dialect, sql) {
        Ok(parsed) => parsed.into_iter().map(|stmt| format!("{};", stmt)).collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| format!("{};", s))
                .collect()
        }
    }
}

/// Migration behavior backed by a SQL definition
pub struct SqlMigration {
    definition: SqlDefinition,
    runner: Arc<dyn StatementRunner>,
    params: MigrationParams,
}

impl SqlMigration {
    pub fn new(definition: SqlDefinition, runner: Arc<dyn StatementRunner>) -> Self {
        Self {
            definition,
            runner,
            params: MigrationParams::new(),
        }
    }

    async fn run_script(&self, sql: &str) -> StepResult {
        let statements = split_sql_statements(sql);
        if statements.is_empty() {
            return Ok(StepOutcome::Done);
        }
        tracing::debug!("Executing {} SQL statement(s)", statements.len());
        self.runner.run_batch(&statements).await?;
        Ok(StepOutcome::Done)
    }
}

#[async_trait]
impl Migration for SqlMigration {
    fn description(&self) -> String {
        self.definition.description.clone()
    }

    fn set_params(&mut self, params: MigrationParams) {
        self.params = params;
    }

    fn params(&self) -> MigrationParams {
        self.params.clone()
    }

    async fn up(&mut self) -> StepResult {
        self.run_script(&self.definition.up_sql).await
    }

    async fn down(&mut self) -> StepResult {
        self.run_script(&self.definition.down_sql).await
    }
}
