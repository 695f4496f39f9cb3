//! Async watch orchestrator.
//!
//! Drives [`DataManager`] from a tokio task, polling the inputs on an
//! interval and sending a [`RunSnapshot`] through an `mpsc` channel whenever
//! the result may have changed, so the console loop can consume them without
//! any shared mutable state.

use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio::time;
use triage_core::models::Cutoffs;
use triage_core::time_utils::ReferenceClock;
use triage_data::analysis::PipelineOutput;
use triage_data::input::InputStatus;
use triage_data::rules::RuleParams;

use crate::data_manager::{DataManager, InputLocator};

// ── Public types ──────────────────────────────────────────────────────────────

/// One pipeline run forwarded to the presentation layer.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    /// Run counter, starting at 1.
    pub sequence: u64,
    /// The run's output, or the error that prevented it.
    pub result: Result<PipelineOutput, String>,
    /// Provided/missing state of each input.
    pub inputs: Vec<InputStatus>,
    /// The day ages were measured against.
    pub today: NaiveDate,
}

/// Rule settings that stay fixed for the life of a watch.
#[derive(Debug, Clone)]
pub struct WatchParams {
    pub cutoffs: Cutoffs,
    pub alarm_codes: Vec<String>,
    pub clock: ReferenceClock,
}

impl WatchParams {
    /// Rule parameters for the current day.
    pub fn rule_params(&self) -> RuleParams {
        RuleParams::new(self.cutoffs, self.clock.today()).with_alarm_codes(self.alarm_codes.clone())
    }
}

// ── WatchOrchestrator ─────────────────────────────────────────────────────────

/// Background re-run coordinator.
///
/// Call [`WatchOrchestrator::start`] to spin up the loop in a dedicated
/// tokio task and receive a channel endpoint for [`RunSnapshot`] updates.
pub struct WatchOrchestrator {
    /// How often to check the inputs.
    update_interval: Duration,
    locator: InputLocator,
    params: WatchParams,
}

impl WatchOrchestrator {
    /// Create a new orchestrator polling every `update_interval_secs` seconds.
    pub fn new(update_interval_secs: u64, locator: InputLocator, params: WatchParams) -> Self {
        Self {
            update_interval: Duration::from_secs(update_interval_secs),
            locator,
            params,
        }
    }

    /// Start the watch loop.
    ///
    /// Spawns a tokio task that runs the loop. Returns:
    /// - An `mpsc::Receiver<RunSnapshot>` for the caller to poll.
    /// - A [`WatchHandle`] that can be used to abort the loop.
    pub fn start(self) -> (mpsc::Receiver<RunSnapshot>, WatchHandle) {
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(async move {
            self.watch_loop(tx).await;
        });

        (rx, WatchHandle { handle })
    }

    // ── Private implementation ────────────────────────────────────────────

    /// Runs once immediately, then on every tick. A snapshot is sent when
    /// the inputs were reloaded, the day rolled over or the error changed.
    /// The loop exits when the receiver side of the channel is closed.
    async fn watch_loop(self, tx: mpsc::Sender<RunSnapshot>) {
        let mut data_manager = DataManager::new(self.locator.clone());
        let mut state = LoopState::default();

        self.run_and_send(&mut data_manager, &mut state, &tx, true).await;

        let mut interval = time::interval(self.update_interval);
        // The first tick fires immediately; the initial run already happened.
        interval.tick().await;

        loop {
            interval.tick().await;

            if tx.is_closed() {
                tracing::debug!("watch channel closed; exiting loop");
                break;
            }

            self.run_and_send(&mut data_manager, &mut state, &tx, false).await;
        }
    }

    async fn run_and_send(
        &self,
        data_manager: &mut DataManager,
        state: &mut LoopState,
        tx: &mpsc::Sender<RunSnapshot>,
        first: bool,
    ) {
        let params = self.params.rule_params();
        let result = data_manager
            .get_output(&params, first)
            .map_err(|e| e.to_string());

        let error = result.as_ref().err().cloned();
        let changed = first
            || state.today != Some(params.today)
            || state.last_error != error
            || (result.is_ok() && data_manager.last_rebuilt());
        state.today = Some(params.today);
        state.last_error = error;

        if !changed {
            tracing::debug!("inputs unchanged; no snapshot sent");
            return;
        }

        state.sequence += 1;
        let snapshot = RunSnapshot {
            sequence: state.sequence,
            result,
            inputs: data_manager.input_status().to_vec(),
            today: params.today,
        };

        if let Err(e) = tx.send(snapshot).await {
            tracing::warn!(error = %e, "failed to send run snapshot; receiver dropped");
        }
    }
}

/// What the previous run saw, to decide whether a new snapshot is news.
#[derive(Debug, Default)]
struct LoopState {
    sequence: u64,
    today: Option<NaiveDate>,
    last_error: Option<String>,
}

// ── WatchHandle ───────────────────────────────────────────────────────────────

/// A handle to the background watch task.
///
/// Call [`WatchHandle::abort`] to stop the loop.
pub struct WatchHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Immediately abort the watch loop.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;
    use triage_core::models::TableKind;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn write_exports(dir: &Path) {
        write(
            dir,
            "base.csv",
            "MACHINE,SUBASSEMBLY,SPOT_ID,SPOT_NAME,RESPONSIBLE_ANALYST\nM-01,M-01-GB,S1,Gearbox,Ana\n",
        );
        write(dir, "mosaic.csv", "spotId,status,analysisCreatedAt\nS1,A1,2001-01-01\n");
        write(dir, "notes.csv", "Local_de_instalacao,Ordem,Nota,Conclusão_desejada\n");
        write(dir, "order-notes.csv", "Ordem,Status_do_sistema\n");
        write(dir, "order-plans.csv", "Local_de_instalacao,Ordem,Status_do_sistema\n");
        write(dir, "insights.csv", "Machine\n");
    }

    fn watch_params() -> WatchParams {
        WatchParams {
            cutoffs: Cutoffs::new(7, 30, 0),
            alarm_codes: vec!["A1".to_string()],
            clock: ReferenceClock::new("UTC"),
        }
    }

    fn orchestrator(dir: &Path, secs: u64) -> WatchOrchestrator {
        WatchOrchestrator::new(
            secs,
            InputLocator::new(BTreeMap::new(), Some(dir.to_path_buf())),
            watch_params(),
        )
    }

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn test_orchestrator_creation() {
        let orch = orchestrator(Path::new("/tmp/exports"), 5);
        assert_eq!(orch.update_interval, Duration::from_secs(5));
        assert_eq!(orch.locator.input_dir.as_deref(), Some(Path::new("/tmp/exports")));
    }

    #[test]
    fn test_watch_params_rule_params() {
        let params = watch_params().rule_params();
        assert_eq!(params.alarm_codes, vec!["A1"]);
        assert_eq!(params.cutoffs.note_days, Some(0));
    }

    // ── async: start / abort ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_orchestrator_start_and_abort() {
        let dir = tempfile::TempDir::new().unwrap();
        let (_rx, handle) = orchestrator(dir.path(), 60).start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
    }

    // ── async: snapshots ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_orchestrator_sends_initial_snapshot() {
        let dir = tempfile::TempDir::new().unwrap();
        write_exports(dir.path());

        let (mut rx, handle) = orchestrator(dir.path(), 60).start();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("channel closed before receiving snapshot");

        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.inputs.len(), 6);
        let output = snapshot.result.expect("pipeline output");
        assert_eq!(output.outcome.selected().len(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_orchestrator_reports_missing_inputs() {
        let dir = tempfile::TempDir::new().unwrap();
        write_exports(dir.path());
        std::fs::remove_file(dir.path().join("notes.csv")).unwrap();

        let (mut rx, handle) = orchestrator(dir.path(), 60).start();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("channel closed before receiving snapshot");

        assert_eq!(snapshot.result.unwrap_err(), "Missing input tables: notes");
        let notes = snapshot.inputs.iter().find(|s| s.kind == TableKind::Notes).unwrap();
        assert!(!notes.provided);

        handle.abort();
    }

    #[tokio::test]
    async fn test_orchestrator_resends_after_input_change() {
        let dir = tempfile::TempDir::new().unwrap();
        write_exports(dir.path());

        let (mut rx, handle) = orchestrator(dir.path(), 1).start();
        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.sequence, 1);

        write(
            dir.path(),
            "order-notes.csv",
            "Ordem,Status_do_sistema\n9001,LIB CONF\n",
        );
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.sequence, 2);
        assert!(second.result.is_ok());

        handle.abort();
    }
}
