use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{Cutoffs, TableKind, DEFAULT_ALARM_CODES};
use crate::time_utils::ReferenceClock;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Reconcile monitoring exports and list the points that need analyst attention
#[derive(Parser, Debug, Clone)]
#[command(
    name = "spot-triage",
    about = "Reconcile monitoring exports and list the points that need analyst attention",
    version
)]
pub struct Settings {
    /// Base table of monitoring points
    #[arg(long)]
    pub base: Option<PathBuf>,

    /// Monitoring platform (Mosaic) analysis export
    #[arg(long)]
    pub mosaic: Option<PathBuf>,

    /// M4 maintenance notes export
    #[arg(long)]
    pub notes: Option<PathBuf>,

    /// Order statuses for the note orders
    #[arg(long)]
    pub order_notes: Option<PathBuf>,

    /// Asset-value plan orders export
    #[arg(long)]
    pub order_plans: Option<PathBuf>,

    /// Insights export (machine id in the first column)
    #[arg(long)]
    pub insights: Option<PathBuf>,

    /// Directory to search for inputs not given explicitly
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Alarm cutoff: last analysis older than this many days
    #[arg(long, allow_negative_numbers = true)]
    pub alarm_days: Option<i64>,

    /// Insight cutoff: last analysis older than this many days
    #[arg(long, allow_negative_numbers = true)]
    pub insight_days: Option<i64>,

    /// Note cutoff: desired completion overdue by more than this many days
    #[arg(long, allow_negative_numbers = true)]
    pub note_days: Option<i64>,

    /// Alarm codes searched for in the monitoring status (comma separated)
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_ALARM_CODES.map(String::from))]
    pub alarm_codes: Vec<String>,

    /// Timezone used to decide the current day (auto-detected if not specified)
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// Export path for the prioritized list
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Export format (defaults to the output file extension, then xlsx)
    #[arg(long, value_parser = ["xlsx", "csv"])]
    pub format: Option<String>,

    /// Print the clauses that selected each record
    #[arg(long)]
    pub explain: bool,

    /// Re-run whenever an input file changes
    #[arg(long)]
    pub watch: bool,

    /// Watch polling interval in seconds (1-3600)
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..=3600))]
    pub refresh_rate: u32,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.spot-triage/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_codes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_dir: Option<PathBuf>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    /// Uses `~/.spot-triage/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".spot-triage").join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, resolve `"auto"` values, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation – accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        // Build raw ArgMatches so we can query ValueSource.
        let matches = Settings::command().get_matches_from(args.clone());

        // Parse into the typed struct using the same args.
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!(error = %e, "could not clear saved parameters");
            }
            return Self::resolve_auto_values(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins.
        if settings.alarm_days.is_none() {
            settings.alarm_days = last.alarm_days;
        }
        if settings.insight_days.is_none() {
            settings.insight_days = last.insight_days;
        }
        if settings.note_days.is_none() {
            settings.note_days = last.note_days;
        }
        // clap stores the arg id using the field name (underscores), not the
        // long-flag spelling.
        if !is_arg_explicitly_set(&matches, "alarm_codes") {
            if let Some(v) = last.alarm_codes {
                settings.alarm_codes = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(v) = last.timezone {
                settings.timezone = v;
            }
        }
        if settings.input_dir.is_none() && !settings.has_explicit_inputs() {
            settings.input_dir = last.input_dir;
        }

        settings = Self::resolve_auto_values(settings);

        // Persist current settings for next run.
        let params = LastUsedParams::from(&settings);
        if let Err(e) = params.save_to(config_path) {
            tracing::warn!(error = %e, "could not persist last-used parameters");
        }

        settings
    }

    /// Resolve `"auto"` sentinel values, tidy the alarm codes and apply the
    /// `--debug` flag.
    fn resolve_auto_values(mut settings: Settings) -> Settings {
        if settings.timezone == "auto" {
            settings.timezone = crate::time_utils::get_system_timezone();
        }
        if !ReferenceClock::validate_timezone(&settings.timezone) {
            tracing::warn!(
                "unrecognised timezone \"{}\", using UTC",
                settings.timezone
            );
            settings.timezone = "UTC".to_string();
        }

        settings.alarm_codes = settings
            .alarm_codes
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        // --debug overrides log level.
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        settings
    }

    /// The three rule cutoffs as given (any may still be unset).
    pub fn cutoffs(&self) -> Cutoffs {
        Cutoffs {
            alarm_days: self.alarm_days,
            insight_days: self.insight_days,
            note_days: self.note_days,
        }
    }

    /// Explicit path for one input table, if given on the command line.
    pub fn input_path(&self, kind: TableKind) -> Option<&PathBuf> {
        match kind {
            TableKind::Base => self.base.as_ref(),
            TableKind::Mosaic => self.mosaic.as_ref(),
            TableKind::Notes => self.notes.as_ref(),
            TableKind::OrderNotes => self.order_notes.as_ref(),
            TableKind::OrderPlans => self.order_plans.as_ref(),
            TableKind::Insights => self.insights.as_ref(),
        }
    }

    fn has_explicit_inputs(&self) -> bool {
        TableKind::ALL.iter().any(|k| self.input_path(*k).is_some())
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            alarm_days: s.alarm_days,
            insight_days: s.insight_days,
            note_days: s.note_days,
            alarm_codes: Some(s.alarm_codes.clone()),
            timezone: Some(s.timezone.clone()),
            input_dir: s.input_dir.clone(),
        }
    }
}

// ── Helper: check if an arg was explicitly set on the command line ─────────────

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
