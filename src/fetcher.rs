use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;

use crate::error::FetchError;

const STDERR_TAIL_LINES: usize = 8;

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 字幕写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleWrite {
    Written,
    /// 目标文件已存在且内容相同
    Unchanged,
    /// 目标文件已存在但内容不同，未覆盖
    Conflict,
}

/// 任务执行器依赖的传输接口
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch_video(&self, media_url: &str, dest: &Path) -> Result<(), FetchError>;

    async fn fetch_subtitle(&self, subtitle_url: &str, dest: &Path) -> Result<SubtitleWrite, FetchError>;
}

/// 视频交给 FFmpeg 拉流转封装，字幕直接 HTTP 下载
pub struct FfmpegFetcher {
    client: Client,
    ffmpeg: PathBuf,
    transcode_timeout: Duration,
}

impl FfmpegFetcher {
    pub fn new(client: Client, ffmpeg_path: Option<&Path>, transcode_timeout: Duration) -> Self {
        // 默认使用系统PATH中的ffmpeg
        let ffmpeg = match ffmpeg_path {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from("ffmpeg"),
        };
        Self {
            client,
            ffmpeg,
            transcode_timeout,
        }
    }
}

#[async_trait]
impl Fetch for FfmpegFetcher {
    async fn fetch_video(&self, media_url: &str, dest: &Path) -> Result<(), FetchError> {
        ensure_parent(dest).await?;
        let part = part_path(dest);

        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(media_url)
            .arg("-c")
            .arg("copy")
            .arg("-c:a")
            .arg("aac")
            .arg("-b:a")
            .arg("128k")
            .arg("-f")
            .arg("mp4")
            .arg("-y")
            .arg(&part)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // 独立进程组：终端的 Ctrl-C 只通知本进程，已开始的下载继续完成
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| FetchError::Spawn {
            program: self.ffmpeg.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(self.transcode_timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| io_error(&part, source))?,
            Err(_) => {
                discard(&part).await;
                return Err(FetchError::Timeout(self.transcode_timeout));
            }
        };

        if !output.status.success() {
            discard(&part).await;
            return Err(FetchError::Transcoder {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        // 退出码为0也可能没有写出任何内容
        let size = fs::metadata(&part).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            discard(&part).await;
            return Err(FetchError::EmptyOutput(dest.to_path_buf()));
        }

        fs::rename(&part, dest)
            .await
            .map_err(|source| io_error(dest, source))?;
        debug!("Wrote {} bytes to {:?}", size, dest);
        Ok(())
    }

    async fn fetch_subtitle(&self, subtitle_url: &str, dest: &Path) -> Result<SubtitleWrite, FetchError> {
        let response = self.client.get(subtitle_url).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(FetchError::EmptyBody(subtitle_url.to_string()));
        }

        if let Ok(existing) = fs::read(dest).await {
            let same = existing.len() == body.len()
                && sha256::digest(&existing[..]) == sha256::digest(&body[..]);
            return Ok(if same {
                SubtitleWrite::Unchanged
            } else {
                SubtitleWrite::Conflict
            });
        }

        ensure_parent(dest).await?;
        let part = part_path(dest);
        if let Err(source) = fs::write(&part, &body).await {
            discard(&part).await;
            return Err(io_error(&part, source));
        }
        fs::rename(&part, dest)
            .await
            .map_err(|source| io_error(dest, source))?;

        info!("Subtitle downloaded: {:?}", dest);
        Ok(SubtitleWrite::Written)
    }
}

async fn ensure_parent(dest: &Path) -> Result<(), FetchError> {
    match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|source| io_error(parent, source)),
        _ => Ok(()),
    }
}

/// 每次传输使用唯一的临时文件，成功后再改名
pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let n = PART_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}-{}.part", std::process::id(), n));
    dest.with_file_name(name)
}

async fn discard(part: &Path) {
    let _ = fs::remove_file(part).await;
}

fn io_error(path: &Path, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_with(ffmpeg: Option<&Path>, timeout: Duration) -> FfmpegFetcher {
        let client = crate::http::build_http_client(&[], Duration::from_secs(5)).unwrap();
        FfmpegFetcher::new(client, ffmpeg, timeout)
    }

    /// 写一个假的 ffmpeg：最后一个参数是输出路径
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("fake-ffmpeg");
        std::fs::write(&script, format!("#!/bin/sh\nfor last; do :; done\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn leftover_parts(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .count()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn video_written_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(dir.path(), r#"printf 'mp4data' > "$last""#);
        let dest = dir.path().join("out").join("Lec 1 Intro-acc.mp4");

        fetcher_with(Some(&ffmpeg), Duration::from_secs(10))
            .fetch_video("http://x/a.m3u8", &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"mp4data");
        assert_eq!(leftover_parts(&dest.parent().unwrap()), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_transcoder_error() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(
            dir.path(),
            r#"printf 'partial' > "$last"; echo "Server returned 403 Forbidden" >&2; exit 1"#,
        );
        let dest = dir.path().join("a-acc.mp4");

        let err = fetcher_with(Some(&ffmpeg), Duration::from_secs(10))
            .fetch_video("http://x/a.m3u8", &dest)
            .await
            .unwrap_err();

        match err {
            FetchError::Transcoder { code, stderr } => {
                assert_eq!(code, Some(1));
                assert!(stderr.contains("403 Forbidden"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dest.exists());
        assert_eq!(leftover_parts(dir.path()), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reported_success_with_empty_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(dir.path(), r#": > "$last""#);
        let dest = dir.path().join("a-acc.mp4");

        let err = fetcher_with(Some(&ffmpeg), Duration::from_secs(10))
            .fetch_video("http://x/a.m3u8", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::EmptyOutput(_)));
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stuck_transcoder_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(dir.path(), "sleep 5");
        let dest = dir.path().join("a-acc.mp4");

        let err = fetcher_with(Some(&ffmpeg), Duration::from_millis(200))
            .fetch_video("http://x/a.m3u8", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_transcoder_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-ffmpeg");
        let err = fetcher_with(Some(&missing), Duration::from_secs(1))
            .fetch_video("http://x/a.m3u8", &dir.path().join("a-acc.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Spawn { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn subtitle_written_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subs/1.vtt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("WEBVTT\n\n00:00.000 --> 00:01.000\nhi\n"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("st.vtt").join("Lec.vtt");
        let fetcher = fetcher_with(None, Duration::from_secs(1));

        let outcome = fetcher
            .fetch_subtitle(&format!("{}/subs/1.vtt", server.uri()), &dest)
            .await
            .unwrap();
        assert_eq!(outcome, SubtitleWrite::Written);
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "WEBVTT\n\n00:00.000 --> 00:01.000\nhi\n"
        );

        let again = fetcher
            .fetch_subtitle(&format!("{}/subs/1.vtt", server.uri()), &dest)
            .await
            .unwrap();
        assert_eq!(again, SubtitleWrite::Unchanged);
    }

    #[tokio::test]
    async fn different_existing_subtitle_is_a_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("WEBVTT\n\nsecond lecture\n"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("Lec.vtt");
        std::fs::write(&dest, "WEBVTT\n\nfirst lecture\n").unwrap();

        let outcome = fetcher_with(None, Duration::from_secs(1))
            .fetch_subtitle(&format!("{}/subs/2.vtt", server.uri()), &dest)
            .await
            .unwrap();
        assert_eq!(outcome, SubtitleWrite::Conflict);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "WEBVTT\n\nfirst lecture\n");
    }

    #[tokio::test]
    async fn subtitle_http_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.vtt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/empty.vtt"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher_with(None, Duration::from_secs(1));

        let err = fetcher
            .fetch_subtitle(&format!("{}/gone.vtt", server.uri()), &dir.path().join("a.vtt"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Http(_)));

        let err = fetcher
            .fetch_subtitle(&format!("{}/empty.vtt", server.uri()), &dir.path().join("b.vtt"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody(_)));
        assert!(!dir.path().join("b.vtt").exists());
    }

    #[test]
    fn keeps_last_stderr_lines() {
        let stderr: String = (1..=20).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 13"));
        assert!(tail.ends_with("line 20"));
    }
}
