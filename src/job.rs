//! 单个任务的执行：提取地址、下载视频、下载字幕。
//!
//! 所有失败都被收进 [`JobResult`]，不会越过本模块向上传播。

use log::{debug, error, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::context::RunContext;
use crate::error::JobError;
use crate::extractor::Extract;
use crate::fetcher::{Fetch, SubtitleWrite};
use crate::naming;
use crate::retry::{with_retry, RetryPolicy};
use crate::task::DownloadTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Skipped,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Success => write!(f, "success"),
            JobStatus::Skipped => write!(f, "skipped"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Extracting,
    ExtractFailed,
    Fetching,
    FetchFailed,
    Done,
}

#[derive(Debug, Clone)]
pub struct JobResult {
    pub task: DownloadTask,
    pub video_path: PathBuf,
    /// 字幕成功落盘（或已存在且内容一致）时才有值
    pub subtitle_path: Option<PathBuf>,
    pub status: JobStatus,
    pub error: Option<String>,
    /// 字幕失败不影响任务状态，单独记录
    pub subtitle_error: Option<String>,
}

impl JobResult {
    fn new(task: DownloadTask, video_path: PathBuf, status: JobStatus) -> Self {
        Self {
            task,
            video_path,
            subtitle_path: None,
            status,
            error: None,
            subtitle_error: None,
        }
    }

    pub fn failed(task: DownloadTask, video_path: PathBuf, error: impl Into<String>) -> Self {
        let mut result = Self::new(task, video_path, JobStatus::Failed);
        result.error = Some(error.into());
        result
    }
}

pub struct JobRunner {
    context: Arc<RunContext>,
    extractor: Arc<dyn Extract>,
    fetcher: Arc<dyn Fetch>,
    retry: RetryPolicy,
    stop: CancellationToken,
}

impl JobRunner {
    pub fn new(
        context: Arc<RunContext>,
        extractor: Arc<dyn Extract>,
        fetcher: Arc<dyn Fetch>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            context,
            extractor,
            fetcher,
            retry,
            stop: CancellationToken::new(),
        }
    }

    /// 停止信号触发后，失败的传输不再重试
    pub fn with_stop_token(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// 执行一个任务，永不返回错误
    pub async fn run(&self, task: DownloadTask) -> JobResult {
        let title = task.title.clone();
        let video_path = self.context.video_path(&title);
        let mut state = JobState::Pending;

        let safe_title = naming::sanitize(&title);
        if safe_title != title {
            debug!("File name adjusted: {} -> {}", title, safe_title);
        }

        if is_complete(&video_path).await {
            info!("File already exists, skipping: {:?}", video_path);
            advance(&mut state, JobState::Done, &title);
            return JobResult::new(task, video_path, JobStatus::Skipped);
        }

        advance(&mut state, JobState::Extracting, &title);
        let resolved = match self.extractor.extract(&task.source_page_url).await {
            Ok(resolved) => resolved,
            Err(e) => {
                advance(&mut state, JobState::ExtractFailed, &title);
                error!("Extraction failed: {} ({}): {}", title, task.source_page_url, e);
                return JobResult::failed(task, video_path, JobError::from(e).to_string());
            }
        };

        advance(&mut state, JobState::Fetching, &title);
        let video = with_retry(&self.retry, &self.stop, &title, || {
            self.fetcher.fetch_video(&resolved.media_url, &video_path)
        })
        .await;
        if let Err(e) = video {
            advance(&mut state, JobState::FetchFailed, &title);
            error!("Download failed: {} ({}): {}", title, task.source_page_url, e);
            return JobResult::failed(task, video_path, JobError::from(e).to_string());
        }
        info!("Download complete: {}", title);

        let mut result = JobResult::new(task, video_path, JobStatus::Success);
        if let Some(subtitle_url) = &resolved.subtitle_url {
            self.fetch_subtitle(subtitle_url, &mut result).await;
        }

        advance(&mut state, JobState::Done, &title);
        result
    }

    /// 字幕尽力而为：失败只记录，不改变任务状态
    async fn fetch_subtitle(&self, subtitle_url: &str, result: &mut JobResult) {
        let title = result.task.title.clone();
        let subtitle_path = self.context.subtitle_path(&title);

        let outcome = with_retry(&self.retry, &self.stop, &title, || {
            self.fetcher.fetch_subtitle(subtitle_url, &subtitle_path)
        })
        .await;

        match outcome {
            Ok(SubtitleWrite::Written) | Ok(SubtitleWrite::Unchanged) => {
                result.subtitle_path = Some(subtitle_path);
            }
            Ok(SubtitleWrite::Conflict) => {
                let e = JobError::NamingCollision {
                    path: subtitle_path,
                };
                warn!("Subtitle for {} not saved: {}", title, e);
                result.subtitle_error = Some(e.to_string());
            }
            Err(e) => {
                warn!("Subtitle download failed: {} ({}): {}", title, subtitle_url, e);
                result.subtitle_error = Some(JobError::from(e).to_string());
            }
        }
    }
}

fn advance(state: &mut JobState, next: JobState, title: &str) {
    debug!("[{}] {:?} -> {:?}", title, state, next);
    *state = next;
}

async fn is_complete(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
