use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::job::{JobResult, JobRunner, JobStatus};
use crate::naming;
use crate::task::DownloadTask;

/// 一次运行的汇总
#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// (标题, 失败原因)
    pub failures: Vec<(String, String)>,
    /// 按完成顺序排列
    pub results: Vec<JobResult>,
}

impl RunSummary {
    fn record(&mut self, result: JobResult) {
        match result.status {
            JobStatus::Success => self.succeeded += 1,
            JobStatus::Skipped => self.skipped += 1,
            JobStatus::Failed => {
                self.failed += 1;
                let reason = result.error.clone().unwrap_or_else(|| "unknown error".to_string());
                self.failures.push((result.task.title.clone(), reason));
            }
        }
        self.results.push(result);
    }

    pub fn log_report(&self) {
        info!(
            "Download finished: {} total, {} succeeded, {} skipped, {} failed",
            self.total, self.succeeded, self.skipped, self.failed
        );
        for (title, reason) in &self.failures {
            error!(" - {}: {}", title, reason);
        }
        for result in &self.results {
            if let Some(reason) = &result.subtitle_error {
                warn!(" - subtitle missing for {}: {}", result.task.title, reason);
            }
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "total: {}, succeeded: {}, skipped: {}, failed: {}",
            self.total, self.succeeded, self.skipped, self.failed
        )?;
        for (title, reason) in &self.failures {
            writeln!(f, "  failed: {} ({})", title, reason)?;
        }
        Ok(())
    }
}

/// 不同标题推导出了同一个文件名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollision {
    pub file_name: String,
    pub titles: Vec<String>,
}

/// 运行前检查视频名和字幕名冲突；完全相同的标题不算冲突
pub fn find_name_collisions(tasks: &[DownloadTask]) -> Vec<NameCollision> {
    let mut by_name: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for task in tasks {
        for name in [naming::video_name(&task.title), naming::subtitle_name(&task.title)] {
            by_name.entry(name).or_default().insert(task.title.as_str());
        }
    }

    by_name
        .into_iter()
        .filter(|(_, titles)| titles.len() > 1)
        .map(|(file_name, titles)| NameCollision {
            file_name,
            titles: titles.into_iter().map(str::to_string).collect(),
        })
        .collect()
}

/// 有界工作池：`worker_limit` 个 worker 从共享队列取任务，结果经通道汇总
pub struct Orchestrator {
    runner: Arc<JobRunner>,
    stop: CancellationToken,
    show_progress: bool,
}

impl Orchestrator {
    /// 与任务执行器共用同一个停止信号
    pub fn new(runner: JobRunner) -> Self {
        Self {
            stop: runner.stop_token(),
            runner: Arc::new(runner),
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// 触发后不再启动新任务，已在运行的任务继续到结束或超时
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub async fn run(&self, tasks: Vec<DownloadTask>, worker_limit: usize) -> RunSummary {
        let mut summary = RunSummary {
            total: tasks.len(),
            ..Default::default()
        };
        if tasks.is_empty() {
            warn!("No download tasks found");
            return summary;
        }

        for collision in find_name_collisions(&tasks) {
            warn!(
                "Name collision: {:?} is derived from {} different titles: {}",
                collision.file_name,
                collision.titles.len(),
                collision.titles.join(" | ")
            );
        }

        let workers = worker_limit.max(1).min(tasks.len());
        info!("Processing {} download tasks with {} workers", tasks.len(), workers);

        let pb = self.progress_bar(tasks.len() as u64);
        let queue = Arc::new(Mutex::new(tasks.into_iter().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::channel::<JobResult>(workers);

        for _ in 0..workers {
            let queue = queue.clone();
            let tx = tx.clone();
            let runner = self.runner.clone();
            let stop = self.stop.clone();

            tokio::spawn(async move {
                loop {
                    let Some(task) = queue.lock().await.pop_front() else {
                        break;
                    };
                    let result = if stop.is_cancelled() {
                        let video_path = runner.context().video_path(&task.title);
                        JobResult::failed(task, video_path, "run stopped before job started")
                    } else {
                        run_isolated(&runner, task).await
                    };
                    if tx.send(result).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        while let Some(result) = rx.recv().await {
            pb.inc(1);
            summary.record(result);
        }
        pb.finish_with_message("done");

        summary
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// 每个任务在独立的 tokio 任务中运行，panic 也只影响自己
async fn run_isolated(runner: &Arc<JobRunner>, task: DownloadTask) -> JobResult {
    let handle = {
        let runner = runner.clone();
        let task = task.clone();
        tokio::spawn(async move { runner.run(task).await })
    };

    match handle.await {
        Ok(result) => result,
        Err(e) => {
            error!("Job task failed: {}: {}", task.title, e);
            let video_path = runner.context().video_path(&task.title);
            JobResult::failed(task, video_path, format!("job task failed: {}", e))
        }
    }
}
