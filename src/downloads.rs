//! Background download jobs started from the HTTP API.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info};

use crate::urls::Quality;
use crate::ytdlp::YtDlp;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl DownloadStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DownloadJob {
    pub id: String,
    pub video_id: String,
    pub quality: Quality,
    pub status: DownloadStatus,
    pub progress: u8,
    pub message: String,
    pub output_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct DownloadManager {
    inner: Arc<DownloadManagerInner>,
}

#[derive(Debug)]
struct DownloadManagerInner {
    jobs: Mutex<HashMap<String, DownloadJob>>,
    counter: AtomicUsize,
    ytdlp: YtDlp,
}

impl DownloadManager {
    pub fn new(ytdlp: YtDlp) -> Self {
        Self {
            inner: Arc::new(DownloadManagerInner {
                jobs: Mutex::new(HashMap::new()),
                counter: AtomicUsize::new(1),
                ytdlp,
            }),
        }
    }

    /// Queues a download and returns its job id right away.
    pub fn start(&self, video_id: String, quality: Quality, output_dir: PathBuf) -> String {
        let job_id = self.next_job_id();
        self.inner.jobs.lock().insert(
            job_id.clone(),
            DownloadJob {
                id: job_id.clone(),
                video_id: video_id.clone(),
                quality,
                status: DownloadStatus::Queued,
                progress: 0,
                message: "Queued".to_string(),
                output_dir: output_dir.clone(),
                file: None,
            },
        );

        let inner = self.inner.clone();
        let job_id_clone = job_id.clone();
        tokio::spawn(async move {
            update_job(&inner, &job_id_clone, |job| {
                job.status = DownloadStatus::Running;
                job.message = "Running".to_string();
            });

            let progress_inner = inner.clone();
            let progress_job = job_id_clone.clone();
            let result = inner
                .ytdlp
                .download(&video_id, quality, &output_dir, move |percent| {
                    update_job(&progress_inner, &progress_job, |job| {
                        job.progress = percent.min(100);
                    });
                })
                .await;

            match result {
                Ok(path) => {
                    info!("{job_id_clone} finished: {}", path.display());
                    update_job(&inner, &job_id_clone, |job| {
                        job.status = DownloadStatus::Completed;
                        job.progress = 100;
                        job.message = "Done".to_string();
                        job.file = Some(path);
                    });
                }
                Err(err) => {
                    error!("{job_id_clone} failed: {err:#}");
                    update_job(&inner, &job_id_clone, |job| {
                        job.status = DownloadStatus::Failed;
                        job.message = format!("Failed: {err:#}");
                    });
                }
            }
        });

        job_id
    }

    pub fn status(&self, job_id: &str) -> Option<DownloadJob> {
        self.inner.jobs.lock().get(job_id).cloned()
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<DownloadJob> {
        let mut jobs: Vec<DownloadJob> = self.inner.jobs.lock().values().cloned().collect();
        jobs.sort_by_key(|job| job_sequence(&job.id));
        jobs
    }

    fn next_job_id(&self) -> String {
        let id = self.inner.counter.fetch_add(1, Ordering::Relaxed);
        format!("download-{id}")
    }
}

fn job_sequence(job_id: &str) -> usize {
    job_id
        .strip_prefix("download-")
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX)
}

fn update_job(inner: &DownloadManagerInner, job_id: &str, apply: impl FnOnce(&mut DownloadJob)) {
    if let Some(job) = inner.jobs.lock().get_mut(job_id) {
        apply(job);
    }
}
