//! Process context: configuration, the opened question store and, on demand,
//! the completion client.
//!
//! This module owns:
//!   - the `GeneratorConfig` (from TOML or defaults)
//!   - the database path resolution (CLI / QBANK_DATABASE over config)
//!   - the startup inventory log
//!
//! The completion client is built only by commands that generate, so
//! `status` and `merge` work without API keys.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::completion::{self, CompletionService};
use crate::config::{load_config_from_env, GeneratorConfig};
use crate::domain::Subject;
use crate::error::{CompletionError, StoreError};
use crate::monitor::ProgressReport;
use crate::store::QuestionStore;

pub struct AppState {
    pub config: GeneratorConfig,
    pub store: QuestionStore,
}

impl AppState {
    /// Load config, open the database, log what is already there.
    #[instrument(level = "info", skip_all)]
    pub fn new(database_override: Option<PathBuf>) -> Result<Self, StoreError> {
        let config = load_config_from_env().unwrap_or_default();
        Self::with_config(config, database_override)
    }

    pub fn with_config(mut config: GeneratorConfig, database_override: Option<PathBuf>) -> Result<Self, StoreError> {
        if let Some(path) = database_override {
            config.database_path = path;
        }
        let store = QuestionStore::open(&config.database_path)?;
        let state = Self { config, store };
        state.log_inventory();
        Ok(state)
    }

    fn log_inventory(&self) {
        let m = &self.store.document().metadata;
        info!(target: "qbank", path = %self.store.path().display(), total = m.total_questions, "Startup question inventory");
        for subject in Subject::ALL {
            let targets = self.config.subject_targets(subject);
            let target: usize = targets.iter().map(|(_, t)| t).sum();
            let done = targets.iter().filter(|(topic, t)| m.topic_count(subject, topic) >= *t).count();
            info!(
                target: "qbank",
                %subject,
                stored = m.subject_count(subject),
                target,
                topics_complete = done,
                topics = targets.len(),
                "Subject inventory"
            );
        }
    }

    /// Build the configured completion client (needs the provider API key).
    pub fn completion(&self) -> Result<Box<dyn CompletionService>, CompletionError> {
        match completion::from_settings(&self.config.completion, &self.config.prompts.question_system) {
            Ok(client) => {
                info!(target: "qbank", provider = %client.describe(), timeout_secs = self.config.completion.timeout_secs, "Completion service enabled");
                Ok(client)
            }
            Err(e) => {
                warn!(target: "qbank", error = %e, "Completion service unavailable");
                Err(e)
            }
        }
    }

    /// Fresh read of the file, so the report reflects other writers too.
    pub fn report(&self, subjects: &[Subject]) -> Result<ProgressReport, StoreError> {
        let path: &Path = self.store.path();
        let doc = QuestionStore::load(path)?;
        let size = std::fs::metadata(path).ok().map(|m| m.len());
        Ok(ProgressReport::build(&doc, &self.config, subjects).with_file_size(size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_override_wins_over_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GeneratorConfig::default();
        config.database_path = dir.path().join("from-config.json");
        let override_path = dir.path().join("override.json");

        let state = AppState::with_config(config, Some(override_path.clone())).unwrap();
        assert_eq!(state.store.path(), override_path.as_path());
        assert_eq!(state.config.database_path, override_path);
    }

    #[test]
    fn report_on_missing_database_is_all_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::with_config(GeneratorConfig::default(), Some(dir.path().join("db.json"))).unwrap();
        let report = state.report(&[Subject::Biochemistry]).unwrap();
        assert_eq!(report.total_questions, 0);
        assert_eq!(report.remaining(), 700);
        assert_eq!(report.file_size, None);
    }
}
