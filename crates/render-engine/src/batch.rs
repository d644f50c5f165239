//! Batch export over many recording folders.
//!
//! Each video runs the whole pipeline on a blocking worker thread; videos
//! share nothing but the progress observer. A failing or panicking video is
//! reported in its own outcome and never stops its siblings.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use gazereel_common::error::{GazereelError, GazereelResult};

use crate::export::{export_video, ExportJob, ExportSummary};
use crate::progress::ProgressObserver;

/// How a batch is scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Render several videos at once.
    pub parallel: bool,

    /// Concurrent videos in parallel mode (0 = available cores).
    pub max_workers: usize,
}

impl BatchOptions {
    /// Effective worker count.
    pub fn workers(&self) -> usize {
        if !self.parallel {
            return 1;
        }
        if self.max_workers > 0 {
            return self.max_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Result for one job of a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Output video name of the job.
    pub video: String,
    pub result: GazereelResult<ExportSummary>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Export every job with ffmpeg. Outcomes are returned in job order.
pub async fn export_batch(
    jobs: Vec<ExportJob>,
    options: BatchOptions,
    observer: Arc<dyn ProgressObserver>,
) -> Vec<BatchOutcome> {
    run_batch(jobs, options, move |job| export_video(&job, observer.as_ref())).await
}

/// Run `export` for every job under the scheduling of `options`.
pub async fn run_batch<F>(jobs: Vec<ExportJob>, options: BatchOptions, export: F) -> Vec<BatchOutcome>
where
    F: Fn(ExportJob) -> GazereelResult<ExportSummary> + Send + Sync + 'static,
{
    let workers = options.workers();
    tracing::info!(
        videos = jobs.len(),
        parallel = options.parallel,
        workers,
        "Starting batch export"
    );

    let export = Arc::new(export);
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut pending = Vec::with_capacity(jobs.len());

    for job in jobs {
        let video = job.name();
        let export = Arc::clone(&export);
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => {
                let err = GazereelError::Other(anyhow::anyhow!("worker pool closed: {err}"));
                pending.push((video, Pending::Done(Err(err))));
                continue;
            }
        };

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            export(job)
        });

        if options.parallel {
            pending.push((video, Pending::Running(handle)));
        } else {
            let result = join_worker(&video, handle).await;
            pending.push((video, Pending::Done(result)));
        }
    }

    let mut outcomes = Vec::with_capacity(pending.len());
    for (video, state) in pending {
        let result = match state {
            Pending::Running(handle) => join_worker(&video, handle).await,
            Pending::Done(result) => result,
        };
        match &result {
            Ok(summary) => tracing::info!(
                video = %video,
                output = %summary.output_path.display(),
                frames = summary.frames_written,
                "Video finished"
            ),
            Err(err) => tracing::error!(video = %video, error = %err, "Video failed"),
        }
        outcomes.push(BatchOutcome { video, result });
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    tracing::info!(
        videos = outcomes.len(),
        failed,
        "Batch export finished"
    );
    outcomes
}

enum Pending {
    Running(JoinHandle<GazereelResult<ExportSummary>>),
    Done(GazereelResult<ExportSummary>),
}

async fn join_worker(
    video: &str,
    handle: JoinHandle<GazereelResult<ExportSummary>>,
) -> GazereelResult<ExportSummary> {
    match handle.await {
        Ok(result) => result,
        Err(err) => Err(GazereelError::Other(anyhow::anyhow!(
            "worker for {video} terminated abnormally: {err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodeSummary;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn job(name: &str) -> ExportJob {
        let mut job = ExportJob::new(format!("/recordings/{name}/ScenePics"), "eyeData.csv");
        job.video_name = Some(name.to_string());
        job
    }

    fn summary(name: &str) -> ExportSummary {
        ExportSummary {
            output_path: PathBuf::from(format!("{name}.mp4")),
            frames_written: 1,
            missing_frames: 0,
            substituted_frames: 0,
            resized_frames: 0,
            elapsed_secs: 0.0,
            encode: EncodeSummary::default(),
        }
    }

    fn flaky_export(job: ExportJob) -> GazereelResult<ExportSummary> {
        match job.name().as_str() {
            "broken" => Err(GazereelError::range("no event rows")),
            "panics" => panic!("decoder exploded"),
            name => Ok(summary(name)),
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated_in_parallel_mode() {
        let jobs = vec![job("p01"), job("broken"), job("panics"), job("p04")];
        let options = BatchOptions {
            parallel: true,
            max_workers: 2,
        };
        let outcomes = run_batch(jobs, options, flaky_export).await;

        let names: Vec<_> = outcomes.iter().map(|o| o.video.as_str()).collect();
        assert_eq!(names, vec!["p01", "broken", "panics", "p04"]);
        assert!(outcomes[0].is_success());
        assert!(matches!(
            outcomes[1].result,
            Err(GazereelError::Range { .. })
        ));
        assert!(matches!(outcomes[2].result, Err(GazereelError::Other(_))));
        assert!(outcomes[3].is_success());
    }

    #[tokio::test]
    async fn test_failures_are_isolated_in_sequential_mode() {
        let jobs = vec![job("panics"), job("p02")];
        let outcomes = run_batch(jobs, BatchOptions::default(), flaky_export).await;
        assert!(!outcomes[0].is_success());
        assert!(outcomes[1].is_success());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_mode_respects_worker_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));

        let jobs = (0..6).map(|i| job(&format!("p{i:02}"))).collect();
        let options = BatchOptions {
            parallel: true,
            max_workers: 2,
        };
        let outcomes = run_batch(jobs, options, move |job| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            r.fetch_sub(1, Ordering::SeqCst);
            Ok(summary(&job.name()))
        })
        .await;

        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(BatchOutcome::is_success));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(BatchOptions::default().workers(), 1);
        let options = BatchOptions {
            parallel: true,
            max_workers: 3,
        };
        assert_eq!(options.workers(), 3);
        let options = BatchOptions {
            parallel: true,
            max_workers: 0,
        };
        assert!(options.workers() >= 1);
    }
}
