//! Version Registry - merges the catalog and the ledger
//!
//! Every query re-reads both stores. Definition files can disappear between
//! a listing and a later load, so metadata is never kept between calls.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::catalog::DefinitionCatalog;
use crate::definitions::{MarkResult, StatusSummary, VersionFilter, VersionMetadata, VersionStatus};
use crate::error::MigrationResult;
use crate::ledger::ExecutionLedger;
use crate::version::VersionName;

/// Queryable view over all known versions
pub struct VersionRegistry {
    catalog: Arc<dyn DefinitionCatalog>,
    ledger: Arc<dyn ExecutionLedger>,
}

impl VersionRegistry {
    pub fn new(catalog: Arc<dyn DefinitionCatalog>, ledger: Arc<dyn ExecutionLedger>) -> Self {
        Self { catalog, ledger }
    }

    pub fn catalog(&self) -> &Arc<dyn DefinitionCatalog> {
        &self.catalog
    }

    pub fn ledger(&self) -> &Arc<dyn ExecutionLedger> {
        &self.ledger
    }

    /// Look up one version by name
    ///
    /// Fails with `InvalidIdentifier` for malformed names; returns `None`
    /// when the version is in neither the catalog nor the ledger.
    pub async fn lookup(&self, name: &str) -> MigrationResult<Option<VersionMetadata>> {
        let version = VersionName::parse(name)?;
        self.lookup_version(&version).await
    }

    /// Look up one already-validated version
    pub async fn lookup_version(
        &self,
        version: &VersionName,
    ) -> MigrationResult<Option<VersionMetadata>> {
        let is_record = self.ledger.exists(version.as_str()).await?;
        let is_file = self.catalog.contains(version);
        Ok(self.build_metadata(version, is_file, is_record))
    }

    /// List versions from both stores
    ///
    /// Ascending by timestamp, except listings filtered to `installed` or
    /// `unknown`, which are most recent first.
    pub async fn list(&self, filter: &VersionFilter) -> MigrationResult<Vec<VersionMetadata>> {
        let records: HashSet<VersionName> = self
            .ledger
            .list()
            .await?
            .into_iter()
            .filter_map(|name| VersionName::parse(name).ok())
            .collect();

        let files: HashSet<VersionName> = self
            .catalog
            .entries()?
            .into_iter()
            .filter_map(|entry| VersionName::parse(entry.name).ok())
            .collect();

        let merged: BTreeSet<&VersionName> = records.iter().chain(files.iter()).collect();
        let ordered: Vec<&VersionName> = if filter.is_descending() {
            merged.into_iter().rev().collect()
        } else {
            merged.into_iter().collect()
        };

        let needle = filter.search.trim().to_lowercase();
        let mut result = Vec::new();

        for version in ordered {
            let is_record = records.contains(version);
            let is_file = files.contains(version);

            // Skip loading definitions the status filter would drop anyway.
            let Some(status) = VersionStatus::derive(is_file, is_record) else {
                continue;
            };
            if filter.status.map_or(false, |wanted| wanted != status) {
                continue;
            }

            let Some(meta) = self.build_metadata(version, is_file, is_record) else {
                continue;
            };

            if !needle.is_empty() && !meta.search_text().to_lowercase().contains(&needle) {
                continue;
            }

            result.push(meta);
        }

        Ok(result)
    }

    /// Count versions per status
    pub async fn status_summary(&self) -> MigrationResult<StatusSummary> {
        let mut summary = StatusSummary::default();
        for meta in self.list(&VersionFilter::default()).await? {
            summary.record(meta.status);
        }
        Ok(summary)
    }

    /// Manually override the recorded state of one or more versions
    ///
    /// `search` is either a version name or one of `new`, `installed`,
    /// `unknown`, selecting every version currently in that status. `target`
    /// must be `New` or `Installed`. Returns one result per affected version,
    /// or a single failure when nothing matched.
    pub async fn mark(&self, search: &str, target: VersionStatus) -> Vec<MarkResult> {
        let search = search.trim();
        let mut results = Vec::new();

        if target != VersionStatus::Unknown {
            if let Ok(version) = VersionName::parse(search) {
                let result = match self.ledger.exists(version.as_str()).await {
                    Ok(is_record) => self.mark_one(&version, is_record, target).await,
                    Err(e) => MarkResult::failure(
                        Some(&version),
                        format!("Failed to read ledger for {}: {}", version, e),
                    ),
                };
                results.push(result);
            } else if let Ok(selector) = search.parse::<VersionStatus>() {
                match self.list(&VersionFilter::new().status(selector)).await {
                    Ok(metas) => {
                        for meta in metas {
                            results.push(self.mark_one(&meta.version, meta.is_record, target).await);
                        }
                    }
                    Err(e) => {
                        results.push(MarkResult::failure(
                            None,
                            format!("Failed to list {} migrations: {}", selector, e),
                        ));
                    }
                }
            }
        }

        if results.is_empty() {
            results.push(MarkResult::failure(None, "No migrations found to mark"));
        }

        results
    }

    async fn mark_one(
        &self,
        version: &VersionName,
        is_record: bool,
        target: VersionStatus,
    ) -> MarkResult {
        match target {
            VersionStatus::New if is_record => match self.ledger.remove(version.as_str()).await {
                Ok(true) => {
                    tracing::info!(version = %version, "Marked migration as new");
                    MarkResult::success(version, format!("{} marked as new", version))
                }
                Ok(false) => MarkResult::failure(Some(version), format!("{} is not installed", version)),
                Err(e) => MarkResult::failure(
                    Some(version),
                    format!("Failed to mark {} as new: {}", version, e),
                ),
            },
            VersionStatus::New => {
                MarkResult::failure(Some(version), format!("{} is not installed", version))
            }
            VersionStatus::Installed if !is_record => {
                match self.ledger.add(version.as_str()).await {
                    Ok(true) => {
                        tracing::info!(version = %version, "Marked migration as installed");
                        MarkResult::success(version, format!("{} marked as installed", version))
                    }
                    Ok(false) => MarkResult::failure(
                        Some(version),
                        format!("{} is already installed", version),
                    ),
                    Err(e) => MarkResult::failure(
                        Some(version),
                        format!("Failed to mark {} as installed: {}", version, e),
                    ),
                }
            }
            VersionStatus::Installed => {
                MarkResult::failure(Some(version), format!("{} is already installed", version))
            }
            VersionStatus::Unknown => MarkResult::failure(
                Some(version),
                format!("{} cannot be marked as unknown", version),
            ),
        }
    }

    fn build_metadata(
        &self,
        version: &VersionName,
        is_file: bool,
        is_record: bool,
    ) -> Option<VersionMetadata> {
        let status = VersionStatus::derive(is_file, is_record)?;
        let mut meta = VersionMetadata {
            version: version.clone(),
            is_file,
            is_record,
            status,
            description: None,
            location: None,
            handle: None,
        };

        if !is_file {
            return Some(meta);
        }

        meta.location = Some(self.catalog.location(version));
        match self.catalog.load(version) {
            Ok(loaded) => {
                meta.description = Some(loaded.description);
                meta.handle = Some(loaded.handle);
            }
            Err(e) => {
                tracing::warn!(version = %version, "Failed to load migration definition: {}", e);
            }
        }

        Some(meta)
    }
}
