//! Process store: durable persistence of the workspace snapshot.
//!
//! The whole snapshot (name, steps, both results, transcript) lives in one
//! record under [`SNAPSHOT_KEY`]. It is read once at startup, rewritten in
//! full after every mutation, and erased on reset. Nothing else touches it.
//!
//! The oracle API key is kept in a second record so that a reset leaves it
//! in place.

use crate::db::Database;
use crate::error::Result;
use crate::types::Snapshot;

/// Fixed key of the persisted snapshot record
pub const SNAPSHOT_KEY: &str = "processSimState";

/// Fixed key of the stored oracle API key
pub const CREDENTIAL_KEY: &str = "oracleApiKey";

/// Asks the user to confirm a destructive action.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Prompt shown before a reset
pub const RESET_PROMPT: &str =
    "Reset the process? This clears all steps, simulation results and the chat history.";

/// Snapshot persistence over a [`Database`]
pub struct ProcessStore {
    db: Database,
    default_name: String,
}

impl ProcessStore {
    pub fn new(db: Database, default_name: impl Into<String>) -> Self {
        Self {
            db,
            default_name: default_name.into(),
        }
    }

    /// Snapshot used when nothing (valid) is persisted
    pub fn default_snapshot(&self) -> Snapshot {
        Snapshot::named(self.default_name.clone())
    }

    /// Restore the persisted snapshot.
    ///
    /// Missing or malformed data yields the default snapshot; failures are
    /// logged and never returned.
    pub fn load(&self) -> Snapshot {
        let record = match self.db.get_record(SNAPSHOT_KEY) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!("No persisted snapshot, starting empty");
                return self.default_snapshot();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted snapshot, using defaults");
                return self.default_snapshot();
            }
        };

        match serde_json::from_str::<Snapshot>(&record.value) {
            Ok(snapshot) => {
                tracing::debug!(
                    steps = snapshot.steps.len(),
                    messages = snapshot.chat_history.len(),
                    saved_at = %record.updated_at,
                    "Restored snapshot"
                );
                snapshot
            }
            Err(e) => {
                tracing::warn!(error = %e, "Persisted snapshot is malformed, using defaults");
                self.default_snapshot()
            }
        }
    }

    /// Serialize and write the full snapshot.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.db.put_record(SNAPSHOT_KEY, &json)?;
        tracing::trace!(bytes = json.len(), "Snapshot saved");
        Ok(())
    }

    /// Erase the persisted snapshot after confirmation.
    ///
    /// Returns the default snapshot when confirmed, `None` when declined.
    pub fn reset(&self, confirm: &dyn Confirm) -> Result<Option<Snapshot>> {
        if !confirm.confirm(RESET_PROMPT) {
            tracing::info!("Reset declined");
            return Ok(None);
        }

        self.db.delete_record(SNAPSHOT_KEY)?;
        tracing::info!("Process reset");
        Ok(Some(self.default_snapshot()))
    }

    // ============================================
    // Credential
    // ============================================

    /// Stored API key, if any
    pub fn credential(&self) -> Result<Option<String>> {
        Ok(self
            .db
            .get_record(CREDENTIAL_KEY)?
            .map(|r| r.value)
            .filter(|k| !k.trim().is_empty()))
    }

    pub fn set_credential(&self, api_key: &str) -> Result<()> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(crate::Error::InvalidInput(
                "API key must not be empty".to_string(),
            ));
        }
        self.db.put_record(CREDENTIAL_KEY, api_key)?;
        tracing::info!("Oracle API key stored");
        Ok(())
    }

    /// Returns true if a key was removed
    pub fn clear_credential(&self) -> Result<bool> {
        self.db.delete_record(CREDENTIAL_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ChatMessage, LogStatus, MetricCategory, ProcessStep, RunType, SimulationLog,
        SimulationMetric, SimulationResult,
    };
    use chrono::{Duration, Utc};

    fn run(run_type: RunType, yield_pct: f64) -> SimulationResult {
        SimulationResult {
            id: crate::types::new_id(),
            timestamp: Utc::now() - Duration::minutes(3),
            run_type,
            metrics: vec![
                SimulationMetric {
                    name: "Yield".to_string(),
                    value: yield_pct,
                    unit: "%".to_string(),
                    category: MetricCategory::Yield,
                },
                SimulationMetric {
                    name: "Scrap".to_string(),
                    value: 0.125,
                    unit: "kg".to_string(),
                    category: MetricCategory::Waste,
                },
            ],
            logs: vec![
                SimulationLog {
                    step_id: "1".to_string(),
                    step_name: "Cut".to_string(),
                    outcome: "Cut 100 sheets".to_string(),
                    details: "Burrs on 6".to_string(),
                    status: LogStatus::Warning,
                },
                SimulationLog {
                    step_id: "ghost".to_string(),
                    step_name: "Unknown".to_string(),
                    outcome: "Skipped".to_string(),
                    details: String::new(),
                    status: LogStatus::Failure,
                },
            ],
            summary: "Moderate scrap.".to_string(),
            assumptions: vec!["Single shift".to_string(), "No downtime".to_string()],
        }
    }

    fn test_store() -> ProcessStore {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        ProcessStore::new(db, "My Process")
    }

    #[test]
    fn test_load_empty_gives_defaults() {
        let store = test_store();
        assert_eq!(store.load(), Snapshot::default());
    }

    #[test]
    fn test_load_malformed_gives_defaults() {
        let store = test_store();
        store.db.put_record(SNAPSHOT_KEY, "{not json").unwrap();
        assert_eq!(store.load(), Snapshot::default());

        store.db.put_record(SNAPSHOT_KEY, r#"{"steps": 7}"#).unwrap();
        assert_eq!(store.load(), Snapshot::default());
    }

    #[test]
    fn test_save_then_load() {
        let store = test_store();
        let mut snapshot = Snapshot::named("Stamping");
        snapshot.steps.push(ProcessStep::new("Cut", "Cut sheet"));
        snapshot.chat_history.push(ChatMessage::user("hello"));

        store.save(&snapshot).unwrap();
        assert_eq!(store.load(), snapshot);
    }

    #[test]
    fn test_full_snapshot_round_trip() {
        let store = test_store();
        let steps = vec![
            ProcessStep::new("Cut", "Cut sheet").with_inputs("Steel"),
            ProcessStep::new("Stamp", "Stamp parts").with_conditions("Die installed"),
        ];
        let snapshot = Snapshot {
            process_name: "Stamping".to_string(),
            steps: steps.clone(),
            baseline_result: Some(run(RunType::Baseline, 88.0)),
            optimized_result: Some(run(RunType::Optimized, 93.75)),
            chat_history: vec![
                ChatMessage::user("Can we cut scrap?"),
                ChatMessage::model("Try laser cutting."),
                ChatMessage::proposal("Here is a revised process.", steps),
            ],
        };

        store.save(&snapshot).unwrap();
        let loaded = store.load();
        assert_eq!(loaded, snapshot);
        assert!(loaded.chat_history[2].is_optimization_proposal);
        assert_eq!(loaded.latest_proposal().map(|s| s.len()), Some(2));
    }

    #[test]
    fn test_reset_declined_keeps_record() {
        let store = test_store();
        let snapshot = Snapshot::named("Keep me");
        store.save(&snapshot).unwrap();

        let outcome = store.reset(&|_: &str| false).unwrap();
        assert!(outcome.is_none());
        assert_eq!(store.load().process_name, "Keep me");
    }

    #[test]
    fn test_reset_keeps_credential() {
        let store = test_store();
        store.set_credential("secret").unwrap();
        store.save(&Snapshot::named("x")).unwrap();

        let outcome = store.reset(&|_: &str| true).unwrap();
        assert_eq!(outcome, Some(Snapshot::default()));
        assert!(store.db.get_record(SNAPSHOT_KEY).unwrap().is_none());
        assert_eq!(store.credential().unwrap().as_deref(), Some("secret"));
    }

    #[test]
    fn test_blank_credential_rejected() {
        let store = test_store();
        assert!(store.set_credential("  ").is_err());
        assert!(store.credential().unwrap().is_none());
        assert!(!store.clear_credential().unwrap());
    }
}
