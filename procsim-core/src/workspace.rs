//! Workspace: the in-memory process state and every transition on it.
//!
//! The workspace owns the [`ProcessStore`], the oracle client and the current
//! [`Snapshot`]. Each mutation rewrites the persisted snapshot; a failed write
//! is logged and otherwise ignored. Oracle-backed operations hold a per-activity
//! busy flag for their whole duration, released by a drop guard on every exit
//! path.

use std::cell::Cell;
use std::fmt;

use crate::error::{Error, Result};
use crate::import::parse_description;
use crate::optimize::{converse, fold_failure};
use crate::oracle::payload::assign_unique_ids;
use crate::oracle::OracleClient;
use crate::simulate::simulate;
use crate::store::{Confirm, ProcessStore};
use crate::types::{
    ChatMessage, ProcessDefinition, ProcessStep, RunType, SimulationResult, Snapshot, StepPatch,
};

/// An oracle-backed operation that can be in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    Simulating,
    Importing,
    Chatting,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Activity::Simulating => "simulation",
            Activity::Importing => "import",
            Activity::Chatting => "chat",
        })
    }
}

/// Busy flags, one per activity. Activities do not exclude each other.
#[derive(Debug, Default)]
pub struct BusyFlags {
    simulating: Cell<bool>,
    importing: Cell<bool>,
    chatting: Cell<bool>,
}

impl BusyFlags {
    fn flag(&self, activity: Activity) -> &Cell<bool> {
        match activity {
            Activity::Simulating => &self.simulating,
            Activity::Importing => &self.importing,
            Activity::Chatting => &self.chatting,
        }
    }

    pub fn is_busy(&self, activity: Activity) -> bool {
        self.flag(activity).get()
    }

    /// Mark `activity` busy until the returned guard is dropped.
    pub fn begin(&self, activity: Activity) -> Result<BusyGuard<'_>> {
        let flag = self.flag(activity);
        if flag.replace(true) {
            return Err(Error::Busy(activity));
        }
        tracing::trace!(%activity, "busy");
        Ok(BusyGuard { flag, activity })
    }
}

/// Clears its busy flag when dropped
pub struct BusyGuard<'a> {
    flag: &'a Cell<bool>,
    activity: Activity,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
        tracing::trace!(activity = %self.activity, "idle");
    }
}

fn persist(store: &ProcessStore, snapshot: &Snapshot) {
    if let Err(e) = store.save(snapshot) {
        tracing::warn!(error = %e, "Failed to persist snapshot");
    }
}

/// The process being modeled, its runs and its transcript
pub struct Workspace {
    store: ProcessStore,
    oracle: Box<dyn OracleClient>,
    snapshot: Snapshot,
    busy: BusyFlags,
}

impl Workspace {
    /// Restore the persisted snapshot and wrap it.
    pub fn open(store: ProcessStore, oracle: Box<dyn OracleClient>) -> Self {
        let snapshot = store.load();
        Self {
            store,
            oracle,
            snapshot,
            busy: BusyFlags::default(),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn process(&self) -> ProcessDefinition {
        self.snapshot.definition()
    }

    pub fn store(&self) -> &ProcessStore {
        &self.store
    }

    pub fn is_busy(&self, activity: Activity) -> bool {
        self.busy.is_busy(activity)
    }

    pub fn has_credential(&self) -> bool {
        self.oracle.has_credential()
    }

    // ============================================
    // Process editing
    // ============================================

    pub fn rename(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "process name must not be empty".to_string(),
            ));
        }
        self.snapshot.process_name = name.to_string();
        persist(&self.store, &self.snapshot);
        Ok(())
    }

    /// Append a step. An empty id is replaced with a fresh one.
    ///
    /// Returns the id of the new step.
    pub fn add_step(&mut self, mut step: ProcessStep) -> Result<String> {
        if step.name.trim().is_empty() {
            return Err(Error::InvalidInput("step name must not be empty".to_string()));
        }
        if step.id.is_empty() || self.position(&step.id).is_some() {
            step.id = crate::types::new_id();
        }
        let id = step.id.clone();
        self.snapshot.steps.push(step);
        persist(&self.store, &self.snapshot);
        Ok(id)
    }

    pub fn update_step(&mut self, id: &str, patch: StepPatch) -> Result<()> {
        let index = self
            .position(id)
            .ok_or_else(|| Error::StepNotFound(id.to_string()))?;
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(Error::InvalidInput("step name must not be empty".to_string()));
        }
        patch.apply(&mut self.snapshot.steps[index]);
        persist(&self.store, &self.snapshot);
        Ok(())
    }

    pub fn delete_step(&mut self, id: &str) -> Result<ProcessStep> {
        let index = self
            .position(id)
            .ok_or_else(|| Error::StepNotFound(id.to_string()))?;
        let removed = self.snapshot.steps.remove(index);
        persist(&self.store, &self.snapshot);
        Ok(removed)
    }

    /// Move a step to `position` (0-based, clamped to the list).
    ///
    /// Returns the position the step ended up at.
    pub fn move_step(&mut self, id: &str, position: usize) -> Result<usize> {
        let index = self
            .position(id)
            .ok_or_else(|| Error::StepNotFound(id.to_string()))?;
        let step = self.snapshot.steps.remove(index);
        let target = position.min(self.snapshot.steps.len());
        self.snapshot.steps.insert(target, step);
        persist(&self.store, &self.snapshot);
        Ok(target)
    }

    pub fn replace_steps(&mut self, steps: Vec<ProcessStep>) {
        self.snapshot.steps = steps;
        persist(&self.store, &self.snapshot);
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.snapshot.steps.iter().position(|s| s.id == id)
    }

    // ============================================
    // Oracle-backed operations
    // ============================================

    /// Simulate the current steps and store the run in its slot.
    ///
    /// An optimized run made while a baseline exists must report every
    /// baseline metric name.
    pub fn run_simulation(&mut self, run_type: RunType) -> Result<SimulationResult> {
        let _busy = self.busy.begin(Activity::Simulating)?;

        let references = match (run_type, &self.snapshot.baseline_result) {
            (RunType::Optimized, Some(baseline)) => baseline.metric_names(),
            _ => Vec::new(),
        };

        let result = simulate(
            self.oracle.as_ref(),
            &self.snapshot.process_name,
            &self.snapshot.steps,
            run_type,
            &references,
        )?;

        self.snapshot.set_result(result.clone());
        persist(&self.store, &self.snapshot);
        Ok(result)
    }

    /// Replace the step list with steps extracted from `text`.
    ///
    /// Returns the number of imported steps.
    pub fn import_description(&mut self, text: &str) -> Result<usize> {
        let _busy = self.busy.begin(Activity::Importing)?;

        let steps = parse_description(self.oracle.as_ref(), text)?;
        let count = steps.len();
        self.snapshot.steps = steps;
        persist(&self.store, &self.snapshot);
        Ok(count)
    }

    /// Send a chat message and record the reply.
    ///
    /// A missing API key is returned as `OracleUnavailable` and leaves the
    /// transcript untouched. Oracle failures are recorded as an assistant
    /// message instead of being returned.
    pub fn send_chat(&mut self, text: &str) -> Result<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("message must not be empty".to_string()));
        }
        if !self.oracle.has_credential() {
            return Err(Error::OracleUnavailable);
        }

        let _busy = self.busy.begin(Activity::Chatting)?;

        let history_len = self.snapshot.chat_history.len();
        self.snapshot.chat_history.push(ChatMessage::user(text));
        persist(&self.store, &self.snapshot);

        let process = self.snapshot.definition();
        let reply = converse(
            self.oracle.as_ref(),
            &self.snapshot.chat_history[..history_len],
            text,
            &process,
            self.snapshot.latest_result(),
        )
        .or_else(fold_failure)?;

        let message = reply.into_message();
        self.snapshot.chat_history.push(message.clone());
        persist(&self.store, &self.snapshot);
        Ok(message)
    }

    /// Replace the steps with the most recent proposal in the transcript.
    ///
    /// Repeated ids in the proposal are reassigned so step ids stay unique.
    /// Returns the number of steps applied.
    pub fn apply_latest_proposal(&mut self) -> Result<usize> {
        let mut steps = self
            .snapshot
            .latest_proposal()
            .ok_or(Error::NoProposal)?
            .to_vec();
        assign_unique_ids(&mut steps);
        let count = steps.len();
        self.replace_steps(steps);
        tracing::info!(steps = count, "Applied proposed process");
        Ok(count)
    }

    // ============================================
    // Reset
    // ============================================

    /// Clear everything after confirmation. Returns false if declined.
    pub fn reset(&mut self, confirm: &dyn Confirm) -> Result<bool> {
        match self.store.reset(confirm)? {
            Some(snapshot) => {
                self.snapshot = snapshot;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::oracle::{OracleReply, OracleRequest};
    use std::sync::Mutex;

    struct QueueOracle {
        replies: Mutex<Vec<Result<OracleReply>>>,
    }

    impl QueueOracle {
        fn new(mut replies: Vec<Result<OracleReply>>) -> Box<Self> {
            replies.reverse();
            Box::new(Self {
                replies: Mutex::new(replies),
            })
        }
    }

    impl OracleClient for QueueOracle {
        fn has_credential(&self) -> bool {
            true
        }

        fn generate(&self, _request: &OracleRequest) -> Result<OracleReply> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(Error::Transport("no scripted reply".into())))
        }
    }

    fn workspace(replies: Vec<Result<OracleReply>>) -> Workspace {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        Workspace::open(ProcessStore::new(db, "My Process"), QueueOracle::new(replies))
    }

    #[test]
    fn test_busy_flag_rejects_reentry_and_clears_on_drop() {
        let flags = BusyFlags::default();
        {
            let _guard = flags.begin(Activity::Simulating).unwrap();
            assert!(flags.is_busy(Activity::Simulating));
            assert!(matches!(
                flags.begin(Activity::Simulating),
                Err(Error::Busy(Activity::Simulating))
            ));
            // other activities are independent
            assert!(flags.begin(Activity::Importing).is_ok());
        }
        assert!(!flags.is_busy(Activity::Simulating));
        assert!(!flags.is_busy(Activity::Importing));
    }

    #[test]
    fn test_busy_cleared_after_failed_simulation() {
        let mut ws = workspace(vec![Ok(OracleReply::text("not json"))]);
        ws.add_step(ProcessStep::new("Cut", "Cut sheet")).unwrap();

        let err = ws.run_simulation(RunType::Baseline).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
        assert!(!ws.is_busy(Activity::Simulating));
        assert!(ws.snapshot().baseline_result.is_none());
    }

    #[test]
    fn test_step_editing() {
        let mut ws = workspace(vec![]);
        let a = ws.add_step(ProcessStep::new("A", "a")).unwrap();
        let b = ws.add_step(ProcessStep::new("B", "b")).unwrap();
        let c = ws.add_step(ProcessStep::new("C", "c")).unwrap();

        assert_eq!(ws.move_step(&c, 0).unwrap(), 0);
        assert_eq!(ws.move_step(&a, 99).unwrap(), 2);
        let order: Vec<_> = ws.snapshot().steps.iter().map(|s| s.name.clone()).collect();
        assert_eq!(order, vec!["C", "B", "A"]);

        ws.update_step(
            &b,
            StepPatch {
                inputs: Some("Steel".into()),
                conditions: Some(Some("Dry".into())),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ws.snapshot().steps[1].inputs, "Steel");
        assert_eq!(ws.snapshot().steps[1].conditions.as_deref(), Some("Dry"));

        assert_eq!(ws.delete_step(&b).unwrap().name, "B");
        assert!(matches!(ws.delete_step(&b), Err(Error::StepNotFound(_))));
        assert!(matches!(
            ws.update_step("nope", StepPatch::default()),
            Err(Error::StepNotFound(_))
        ));
    }

    #[test]
    fn test_add_step_replaces_duplicate_id() {
        let mut ws = workspace(vec![]);
        let first = ProcessStep {
            id: "1".into(),
            ..ProcessStep::new("A", "a")
        };
        let second = ProcessStep {
            id: "1".into(),
            ..ProcessStep::new("B", "b")
        };
        assert_eq!(ws.add_step(first).unwrap(), "1");
        assert_ne!(ws.add_step(second).unwrap(), "1");
    }

    #[test]
    fn test_chat_failure_recorded_as_message() {
        let mut ws = workspace(vec![Err(Error::Transport("connection refused".into()))]);
        let reply = ws.send_chat("Can this be faster?").unwrap();

        assert_eq!(reply.text, crate::optimize::CONNECTION_PROBLEM_REPLY);
        assert_eq!(ws.snapshot().chat_history.len(), 2);
        assert!(!ws.is_busy(Activity::Chatting));
    }

    #[test]
    fn test_apply_without_proposal() {
        let mut ws = workspace(vec![]);
        assert!(matches!(ws.apply_latest_proposal(), Err(Error::NoProposal)));
    }

    #[test]
    fn test_applied_proposal_has_unique_ids() {
        let mut ws = workspace(vec![Ok(OracleReply::call(
            crate::oracle::schema::PROPOSE_UPDATE_FN,
            serde_json::json!({
                "steps": [
                    { "id": "1", "name": "Cut", "description": "Laser cut" },
                    { "id": "1", "name": "Inspect", "description": "Inline inspection" }
                ],
                "rationale": "Inspect right after cutting."
            }),
        ))]);
        ws.send_chat("Optimize it").unwrap();

        // A transcript persisted with repeated ids is also cleaned on apply
        let stale = ChatMessage::proposal(
            "old",
            vec![
                ProcessStep { id: "7".into(), ..ProcessStep::new("A", "a") },
                ProcessStep { id: "7".into(), ..ProcessStep::new("B", "b") },
            ],
        );
        ws.apply_latest_proposal().unwrap();
        let ids: Vec<_> = ws.snapshot().steps.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids[0], "1");
        assert_ne!(ids[0], ids[1]);

        ws.snapshot.chat_history.push(stale);
        assert_eq!(ws.apply_latest_proposal().unwrap(), 2);
        let ids: Vec<_> = ws.snapshot().steps.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids[0], "7");
        assert_ne!(ids[0], ids[1]);

        let second = ids[1].clone();
        ws.delete_step(&second).unwrap();
        assert_eq!(ws.snapshot().steps[0].name, "A");
    }

    #[test]
    fn test_rename_rejects_blank() {
        let mut ws = workspace(vec![]);
        assert!(ws.rename("  ").is_err());
        ws.rename("Press line").unwrap();
        assert_eq!(ws.snapshot().process_name, "Press line");
    }
}
