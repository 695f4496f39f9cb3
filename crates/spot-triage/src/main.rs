mod bootstrap;
mod export;
mod report;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use triage_core::models::TableKind;
use triage_core::settings::Settings;
use triage_core::time_utils::ReferenceClock;
use triage_data::analysis::PipelineOutput;
use triage_data::export::{selection_table, summary_table, DEFAULT_EXPORT_FILE};
use triage_data::rules::Outcome;
use triage_runtime::data_manager::{DataManager, InputLocator};
use triage_runtime::orchestrator::{RunSnapshot, WatchOrchestrator, WatchParams};

use crate::export::ExportFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("Spot Triage v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Cutoffs: alarm {:?}, insight {:?}, note {:?}; alarm codes {:?}; timezone {}",
        settings.alarm_days,
        settings.insight_days,
        settings.note_days,
        settings.alarm_codes,
        settings.timezone
    );

    let locator = input_locator(&settings);
    let params = WatchParams {
        cutoffs: settings.cutoffs(),
        alarm_codes: settings.alarm_codes.clone(),
        clock: ReferenceClock::new(&settings.timezone),
    };

    if settings.watch {
        run_watch(&settings, locator, params).await
    } else {
        run_once(&settings, locator, &params)
    }
}

/// Explicit input paths plus the directory to search for the rest.
fn input_locator(settings: &Settings) -> InputLocator {
    let explicit: BTreeMap<TableKind, PathBuf> = TableKind::ALL
        .into_iter()
        .filter_map(|kind| settings.input_path(kind).map(|p| (kind, p.clone())))
        .collect();

    let input_dir = settings.input_dir.clone().or_else(|| {
        if explicit.len() == TableKind::ALL.len() {
            None
        } else {
            bootstrap::discover_input_dir()
        }
    });
    if let Some(dir) = &input_dir {
        tracing::info!("Searching for inputs in {}", dir.display());
    }

    InputLocator::new(explicit, input_dir)
}

fn run_once(settings: &Settings, locator: InputLocator, params: &WatchParams) -> Result<()> {
    let mut data_manager = DataManager::new(locator);
    let result = data_manager.get_output(&params.rule_params(), true);

    if !data_manager.input_status().is_empty() {
        println!("{}", report::render_input_status(data_manager.input_status()));
    }
    let output = result.context("triage run failed")?;

    println!("{}", report::render_output(&output, settings.explain));
    export_output(settings, &output)?;
    Ok(())
}

async fn run_watch(settings: &Settings, locator: InputLocator, params: WatchParams) -> Result<()> {
    tracing::info!("Watching inputs every {}s", settings.refresh_rate);

    let orchestrator = WatchOrchestrator::new(u64::from(settings.refresh_rate), locator, params);
    let (mut rx, handle) = orchestrator.start();

    loop {
        tokio::select! {
            snapshot = rx.recv() => {
                let Some(snapshot) = snapshot else {
                    break;
                };
                show_snapshot(settings, &snapshot);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; stopping watch");
                break;
            }
        }
    }

    handle.abort();
    Ok(())
}

fn show_snapshot(settings: &Settings, snapshot: &RunSnapshot) {
    println!("── Run {} ({}) ──\n", snapshot.sequence, snapshot.today.format("%d/%m/%Y"));
    if !snapshot.inputs.is_empty() {
        println!("{}", report::render_input_status(&snapshot.inputs));
    }

    match &snapshot.result {
        Ok(output) => {
            println!("{}", report::render_output(output, settings.explain));
            if let Err(e) = export_output(settings, output) {
                tracing::error!("{:#}", e);
            }
        }
        Err(message) => {
            println!("Cannot run yet: {}\n", message);
        }
    }
}

/// Write the selection and summary once every cutoff is known.
fn export_output(settings: &Settings, output: &PipelineOutput) -> Result<()> {
    let Outcome::Ready(selected) = &output.outcome else {
        return Ok(());
    };

    let path = settings
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_FILE));
    let format = ExportFormat::resolve(settings.format.as_deref(), &path);

    let selection = selection_table(&output.enriched, selected);
    let summary = summary_table(&output.summary);
    format
        .exporter()
        .export(&selection, &summary, &path)
        .with_context(|| format!("could not export to {}", path.display()))?;

    tracing::info!("Exported {} rows to {}", selection.rows.len(), path.display());
    println!("Saved {}", path.display());
    Ok(())
}
