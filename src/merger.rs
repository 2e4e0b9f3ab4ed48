//! 把下载好的字幕烧录进视频。
//!
//! 视频和字幕按文件名中的章节号（如 `3-2`）配对。

use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;

use crate::fetcher::part_path;

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub video_dir: PathBuf,
    pub subtitle_dir: PathBuf,
    pub output_dir: PathBuf,
    pub video_ext: String,
    pub subtitle_ext: String,
    pub ffmpeg: PathBuf,
    pub font_size: u32,
    pub workers: usize,
}

/// 章节号，例如 `3-2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chapter {
    pub start: u32,
    pub end: u32,
}

pub struct ChapterMatcher {
    pattern: Regex,
}

impl ChapterMatcher {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(r"(\d+)-(\d+)")?,
        })
    }

    /// 取文件名中第一个 `数字-数字`
    pub fn chapter(&self, file_name: &str) -> Option<Chapter> {
        let caps = self.pattern.captures(file_name)?;
        Some(Chapter {
            start: caps[1].parse().ok()?,
            end: caps[2].parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeJob {
    pub video: PathBuf,
    pub subtitle: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub total: usize,
    pub merged: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// 字幕样式，对应 ffmpeg subtitles 滤镜的 force_style
pub fn force_style(font_size: u32) -> String {
    [
        format!("FontSize={}", font_size),
        "PrimaryColour=&HFFFFFF&".to_string(),
        "OutlineColour=&H000000&".to_string(),
        "Outline=2".to_string(),
        "FontName=Microsoft YaHei".to_string(),
        "BackColour=&H80000000&".to_string(),
        "Bold=1".to_string(),
    ]
    .join(",")
}

/// 为每个视频寻找章节号相同的字幕，返回配对结果和未配对数量
pub fn plan_merges(opts: &MergeOptions) -> Result<(Vec<MergeJob>, usize)> {
    let matcher = ChapterMatcher::new()?;
    let videos = list_with_ext(&opts.video_dir, &opts.video_ext)?;
    let subtitles: Vec<(String, Option<Chapter>)> = list_with_ext(&opts.subtitle_dir, &opts.subtitle_ext)?
        .into_iter()
        .map(|name| {
            let chapter = matcher.chapter(&name);
            (name, chapter)
        })
        .collect();

    let mut jobs = Vec::new();
    let mut unmatched = 0;

    for video in videos {
        let Some(chapter) = matcher.chapter(&video) else {
            warn!("Cannot extract chapter from {}", video);
            unmatched += 1;
            continue;
        };
        let Some((subtitle, _)) = subtitles.iter().find(|(_, c)| *c == Some(chapter)) else {
            warn!("No matching subtitle for {}", video);
            unmatched += 1;
            continue;
        };

        let stem = Path::new(&video)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| video.clone());
        jobs.push(MergeJob {
            video: opts.video_dir.join(&video),
            subtitle: opts.subtitle_dir.join(subtitle),
            output: opts.output_dir.join(format!("{}_hardsub{}", stem, opts.video_ext)),
        });
    }

    Ok((jobs, unmatched))
}

/// 检查 ffmpeg 是否可用
pub async fn check_ffmpeg(ffmpeg: &Path) -> Result<()> {
    let status = Command::new(ffmpeg)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| anyhow!("FFmpeg check failed for {:?}: {}", ffmpeg, e))?;
    if !status.success() {
        return Err(anyhow!("FFmpeg check failed: {:?} exited with {:?}", ffmpeg, status.code()));
    }
    Ok(())
}

/// 烧录单个视频
///
/// 先写入临时文件，成功后再改名，中断的运行不会留下看似完整的输出。
pub async fn burn_subtitles(ffmpeg: &Path, job: &MergeJob, style: &str) -> Result<()> {
    let filter = format!(
        "subtitles='{}':force_style='{}'",
        escape_filter_path(&job.subtitle),
        style
    );
    let part = partial_output(&job.output);
    debug!("Running {:?} -vf {} -> {:?}", ffmpeg, filter, part);

    let output = Command::new(ffmpeg)
        .arg("-i")
        .arg(&job.video)
        .arg("-vf")
        .arg(&filter)
        .arg("-c:a")
        .arg("copy")
        .arg("-max_muxing_queue_size")
        .arg("1024")
        .arg("-y")
        .arg(&part)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            let _ = fs::remove_file(&part).await;
            return Err(anyhow!("Failed to run {:?}: {}", ffmpeg, e));
        }
    };

    if !output.status.success() {
        let _ = fs::remove_file(&part).await;
        return Err(anyhow!(
            "FFmpeg failed with exit code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    if fs::metadata(&part).await.map(|m| m.len()).unwrap_or(0) == 0 {
        let _ = fs::remove_file(&part).await;
        return Err(anyhow!("FFmpeg produced no output for {:?}", job.video));
    }

    fs::rename(&part, &job.output).await?;
    Ok(())
}

/// ffmpeg 按扩展名选择封装格式，临时文件保留原扩展名
fn partial_output(output: &Path) -> PathBuf {
    let mut name = part_path(output).into_os_string();
    if let Some(ext) = output.extension() {
        name.push(".");
        name.push(ext);
    }
    PathBuf::from(name)
}

/// 批量烧录字幕
pub async fn run_merge(opts: MergeOptions) -> Result<MergeSummary> {
    for dir in [&opts.video_dir, &opts.subtitle_dir] {
        if !dir.is_dir() {
            return Err(anyhow!("Directory does not exist: {:?}", dir));
        }
    }
    check_ffmpeg(&opts.ffmpeg).await?;
    fs::create_dir_all(&opts.output_dir).await?;

    let (jobs, unmatched) = plan_merges(&opts)?;
    let mut summary = MergeSummary {
        total: jobs.len() + unmatched,
        skipped: unmatched,
        ..Default::default()
    };
    info!("Found {} videos, {} matched with subtitles", summary.total, jobs.len());

    let style = force_style(opts.font_size);
    let ffmpeg = opts.ffmpeg.clone();

    let results: Vec<_> = stream::iter(jobs)
        .map(|job| {
            let style = style.clone();
            let ffmpeg = ffmpeg.clone();
            async move {
                if fs::metadata(&job.output).await.map(|m| m.len() > 0).unwrap_or(false) {
                    info!("Output already exists, skipping: {:?}", job.output);
                    return (job, None);
                }
                let result = burn_subtitles(&ffmpeg, &job, &style).await;
                (job, Some(result))
            }
        })
        .buffer_unordered(opts.workers.max(1))
        .collect()
        .await;

    for (job, result) in results {
        match result {
            None => summary.skipped += 1,
            Some(Ok(())) => {
                summary.merged += 1;
                info!("Merged ({}/{}): {:?}", summary.merged, summary.total, job.output);
            }
            Some(Err(e)) => {
                summary.failed += 1;
                error!("Failed to merge {:?}: {}", job.video, e);
            }
        }
    }

    info!(
        "Merge finished: {} total, {} merged, {} skipped, {} failed",
        summary.total, summary.merged, summary.skipped, summary.failed
    );
    Ok(summary)
}

fn list_with_ext(dir: &Path, ext: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(ext))
        .collect();
    names.sort();
    Ok(names)
}

/// ffmpeg 滤镜参数里 `\`、`:` 和 `'` 需要转义
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}
