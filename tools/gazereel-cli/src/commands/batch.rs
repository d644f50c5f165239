//! Render every recording folder matching a glob pattern.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use gazereel_common::config::AppConfig;
use gazereel_recording_model::recording::discover_recordings;
use gazereel_render_engine::batch::{export_batch, BatchOptions};
use gazereel_render_engine::export::{ExportJob, ExportOptions};
use gazereel_render_engine::TracingObserver;

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Glob pattern matching recording folders (e.g. "data/P*")
    #[arg(long)]
    pub folders: String,

    /// Render several folders at once
    #[arg(long)]
    pub run_parallel: bool,

    /// Maximum folders rendered at once (default: config, then CPU count)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Directory for the output videos
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

pub async fn run(args: BatchArgs, config: &AppConfig) -> anyhow::Result<()> {
    let layouts = discover_recordings(&args.folders)?;
    if layouts.is_empty() {
        return Err(anyhow::anyhow!(
            "No recording folders match {} (each needs ScenePics/ and eyeData.csv)",
            args.folders
        ));
    }

    let options = ExportOptions::batch_preset(config)?;
    let output_dir = args.output_dir.unwrap_or_else(|| config.output_dir.clone());
    let jobs: Vec<ExportJob> = layouts
        .iter()
        .map(|layout| ExportJob::from_layout(layout, output_dir.clone(), options.clone()))
        .collect();

    println!("Batch rendering {} recording(s):", jobs.len());
    for job in &jobs {
        println!("  {} -> {}", job.frames_dir.display(), job.output_path().display());
    }

    let batch = BatchOptions {
        parallel: args.run_parallel,
        max_workers: args.workers.unwrap_or(config.batch.max_workers),
    };
    let outcomes = export_batch(jobs, batch, Arc::new(TracingObserver)).await;

    println!();
    let mut failed = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(summary) => println!(
                "[OK]   {}: {} frames -> {}",
                outcome.video,
                summary.frames_written,
                summary.output_path.display()
            ),
            Err(err) => {
                failed += 1;
                println!("[FAIL] {}: {err}", outcome.video);
            }
        }
    }

    if failed > 0 {
        return Err(anyhow::anyhow!(
            "{failed} of {} recordings failed",
            outcomes.len()
        ));
    }
    Ok(())
}
