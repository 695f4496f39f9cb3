//! Fingerprint-cached data manager.
//!
//! Wraps [`run_pipeline`] with a cache of the reconciled record set keyed by
//! the size and modification time of every input file. Callers use
//! [`DataManager::get_output`]; when no input changed only the rules are
//! re-evaluated, and transient read failures (a workbook still being saved)
//! are retried with a short back-off.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use triage_core::models::{EnrichedSet, TableKind};
use triage_core::{Result, TriageError};
use triage_data::analysis::{evaluate_enriched, run_pipeline, PipelineOutput};
use triage_data::input::InputStatus;
use triage_data::reader::{find_input_files, load_inputs};
use triage_data::rules::RuleParams;

/// Maximum number of load attempts before giving up.
const MAX_RETRY_ATTEMPTS: u32 = 3;

// ── InputLocator ──────────────────────────────────────────────────────────────

/// Where the six input files come from.
///
/// Explicit paths win; any kind without one is looked up in `input_dir`
/// each time the inputs are resolved, so files dropped in later are found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputLocator {
    pub explicit: BTreeMap<TableKind, PathBuf>,
    pub input_dir: Option<PathBuf>,
}

impl InputLocator {
    pub fn new(explicit: BTreeMap<TableKind, PathBuf>, input_dir: Option<PathBuf>) -> Self {
        Self {
            explicit,
            input_dir,
        }
    }

    /// Current path for every kind that can be located.
    pub fn resolve(&self) -> BTreeMap<TableKind, PathBuf> {
        let mut paths = match &self.input_dir {
            Some(dir) => find_input_files(dir),
            None => BTreeMap::new(),
        };
        paths.extend(self.explicit.iter().map(|(k, p)| (*k, p.clone())));
        paths
    }
}

// ── Fingerprint ───────────────────────────────────────────────────────────────

/// Identity of one input file at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    kind: TableKind,
    path: PathBuf,
    size: u64,
    modified: Option<SystemTime>,
}

/// Stamps of every located input, in kind order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputFingerprint(Vec<FileStamp>);

impl InputFingerprint {
    /// Stat every path; a file that cannot be stat'ed is a read error.
    pub fn of(paths: &BTreeMap<TableKind, PathBuf>) -> Result<Self> {
        paths
            .iter()
            .map(|(kind, path)| {
                let meta = std::fs::metadata(path).map_err(|source| TriageError::FileRead {
                    path: path.clone(),
                    source,
                })?;
                Ok(FileStamp {
                    kind: *kind,
                    path: path.clone(),
                    size: meta.len(),
                    modified: meta.modified().ok(),
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(InputFingerprint)
    }
}

// ── DataManager ───────────────────────────────────────────────────────────────

/// Cache of the last reconciled record set.
///
/// # Example
/// ```no_run
/// use chrono::NaiveDate;
/// use triage_core::models::Cutoffs;
/// use triage_data::rules::RuleParams;
/// use triage_runtime::data_manager::{DataManager, InputLocator};
///
/// let locator = InputLocator::new(Default::default(), Some("exports".into()));
/// let mut mgr = DataManager::new(locator);
/// let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
/// let params = RuleParams::new(Cutoffs::new(7, 30, 0), today);
/// if let Ok(output) = mgr.get_output(&params, false) {
///     println!("selected: {}", output.outcome.selected().len());
/// }
/// ```
pub struct DataManager {
    locator: InputLocator,
    /// Fingerprint the cached set was built from.
    fingerprint: Option<InputFingerprint>,
    cache: Option<EnrichedSet>,
    cache_timestamp: Option<Instant>,
    /// Provided/missing state of each input as of the last load.
    input_status: Vec<InputStatus>,
    last_error: Option<String>,
    /// Whether the last successful call rebuilt the cache.
    last_rebuilt: bool,
}

impl DataManager {
    pub fn new(locator: InputLocator) -> Self {
        Self {
            locator,
            fingerprint: None,
            cache: None,
            cache_timestamp: None,
            input_status: Vec::new(),
            last_error: None,
            last_rebuilt: false,
        }
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Run the pipeline for `params`, reusing the reconciled set when no
    /// input file changed since it was built.
    ///
    /// `force_refresh` rebuilds unconditionally.
    pub fn get_output(&mut self, params: &RuleParams, force_refresh: bool) -> Result<PipelineOutput> {
        let paths = self.locator.resolve();
        let result = self.output_for(&paths, params, force_refresh);
        if let Err(e) = &result {
            tracing::warn!(error = %e, "pipeline run failed");
            self.last_error = Some(e.to_string());
        } else {
            self.last_error = None;
        }
        result
    }

    /// Discard the cache, forcing the next call to reload every input.
    pub fn invalidate_cache(&mut self) {
        self.fingerprint = None;
        self.cache = None;
        self.cache_timestamp = None;
        tracing::debug!("cache invalidated");
    }

    /// Age of the cached set, or `None` before the first successful build.
    pub fn cache_age(&self) -> Option<Duration> {
        self.cache_timestamp.map(|ts| ts.elapsed())
    }

    /// Input status as of the last load attempt.
    pub fn input_status(&self) -> &[InputStatus] {
        &self.input_status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// `true` when the last successful [`get_output`](Self::get_output)
    /// reloaded the inputs rather than reusing the cache.
    pub fn last_rebuilt(&self) -> bool {
        self.last_rebuilt
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn output_for(
        &mut self,
        paths: &BTreeMap<TableKind, PathBuf>,
        params: &RuleParams,
        force_refresh: bool,
    ) -> Result<PipelineOutput> {
        let fingerprint = InputFingerprint::of(paths)?;

        if !force_refresh && self.fingerprint.as_ref() == Some(&fingerprint) {
            if let Some(cached) = &self.cache {
                tracing::debug!("inputs unchanged; re-evaluating cached set");
                self.last_rebuilt = false;
                return Ok(evaluate_enriched(cached.clone(), params));
            }
        }

        let output = self.rebuild_with_retry(paths, params)?;
        self.fingerprint = Some(fingerprint);
        self.cache = Some(output.enriched.clone());
        self.cache_timestamp = Some(Instant::now());
        self.last_rebuilt = true;
        tracing::debug!(
            records = output.enriched.len(),
            inputs = paths.len(),
            "reconciled set cached"
        );
        Ok(output)
    }

    /// Load and run, retrying read and decode failures.
    ///
    /// Back-off schedule: attempt 1 → 0 ms, attempt 2 → 100 ms, attempt 3 → 200 ms.
    fn rebuild_with_retry(
        &mut self,
        paths: &BTreeMap<TableKind, PathBuf>,
        params: &RuleParams,
    ) -> Result<PipelineOutput> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let sleep_ms = (attempt as u64) * 100;
                tracing::debug!(attempt, sleep_ms, "retrying load after back-off");
                thread::sleep(Duration::from_millis(sleep_ms));
            }
            attempt += 1;

            match self.rebuild(paths, params) {
                Err(e) if is_transient(&e) && attempt < MAX_RETRY_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "load attempt failed");
                }
                result => return result,
            }
        }
    }

    fn rebuild(
        &mut self,
        paths: &BTreeMap<TableKind, PathBuf>,
        params: &RuleParams,
    ) -> Result<PipelineOutput> {
        let inputs = load_inputs(paths)?;
        self.input_status = inputs.status();
        run_pipeline(&inputs, params)
    }
}

/// Errors worth another attempt: the file may still be being written.
fn is_transient(err: &TriageError) -> bool {
    matches!(
        err,
        TriageError::FileRead { .. } | TriageError::TableDecode { .. } | TriageError::Io(_)
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
