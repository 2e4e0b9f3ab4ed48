pub mod cli;
pub mod context;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod http;
pub mod job;
pub mod logging;
pub mod merger;
pub mod naming;
pub mod orchestrator;
pub mod retry;
pub mod task;

use anyhow::Result;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cli::{DownloadArgs, MergeArgs};
use crate::context::{RunConfig, RunContext};
use crate::extractor::PageExtractor;
use crate::fetcher::FfmpegFetcher;
use crate::http::build_http_client;
use crate::job::JobRunner;
use crate::merger::{MergeOptions, MergeSummary};
use crate::orchestrator::{Orchestrator, RunSummary};
use crate::retry::RetryPolicy;
use crate::task::load_tasks;

/// 运行批量下载的主要逻辑
///
/// 只有准备阶段的错误（目录、日志、任务列表）会返回 `Err`；
/// 单个任务的失败记录在 [`RunSummary`] 中。
pub async fn run(args: DownloadArgs, stop: CancellationToken) -> Result<RunSummary> {
    let config = RunConfig::with_home_defaults(
        args.output_dir.clone(),
        args.subtitle_dir.clone(),
        args.workers,
    )?;
    let context = Arc::new(RunContext::prepare(&config)?);
    // 目录就绪后立即接管日志，之后的输出都进入运行日志
    logging::init(&context.log_path)?;
    context.report();

    let tasks = load_tasks(&args.json)?;
    info!("Loaded {} tasks from {:?}", tasks.len(), args.json);

    let client = build_http_client(&args.headers, Duration::from_secs(args.timeout))?;
    let extractor = PageExtractor::with_default_adapters(client.clone());
    let fetcher = FfmpegFetcher::new(
        client,
        args.ffmpeg_path.as_deref(),
        Duration::from_secs(args.transcode_timeout),
    );
    let retry = RetryPolicy {
        max_retries: args.retries,
        ..RetryPolicy::default()
    };

    let runner = JobRunner::new(context.clone(), Arc::new(extractor), Arc::new(fetcher), retry)
        .with_stop_token(stop);
    let orchestrator = Orchestrator::new(runner).with_progress(!args.no_progress);

    let summary = orchestrator.run(tasks, context.worker_limit).await;
    summary.log_report();
    context.finish();

    Ok(summary)
}

/// 字幕烧录
pub async fn run_merge(args: MergeArgs) -> Result<MergeSummary> {
    let opts = MergeOptions {
        video_dir: args.video_dir,
        subtitle_dir: args.subtitle_dir,
        output_dir: args.output_dir,
        video_ext: args.video_ext,
        subtitle_ext: args.subtitle_ext,
        ffmpeg: args.ffmpeg_path,
        font_size: args.font_size,
        workers: args.workers,
    };
    merger::run_merge(opts).await
}
