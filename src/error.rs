use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// 任务列表加载失败（致命）
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read task list {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed task list {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 运行环境准备失败（致命）
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("cannot resolve the home directory")]
    HomeDir,

    #[error("cannot create directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open log file {path:?}: {source}")]
    OpenLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logger already initialized: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error("invalid worker limit: {0}")]
    WorkerLimit(usize),

    #[error("invalid HTTP header {0:?}")]
    Header(String),

    #[error("cannot build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// 从页面提取媒体地址失败（单任务）
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid page URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no site adapter handles {0}")]
    Unsupported(String),

    #[error("timed out fetching page {0}")]
    Timeout(String),

    #[error("cannot fetch page {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected content at {url}: {reason}")]
    UnexpectedContent { url: String, reason: String },

    #[error("no media source found in {0}")]
    NoMediaSource(String),
}

/// 视频或字幕传输失败（单任务）
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cannot start {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transcoder exited with {code:?}: {stderr}")]
    Transcoder { code: Option<i32>, stderr: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("output {0:?} is missing or empty")]
    EmptyOutput(PathBuf),

    #[error("subtitle request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("empty subtitle body from {0}")]
    EmptyBody(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// 判断是否为可重试的瞬时错误
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::EmptyOutput(_) | FetchError::EmptyBody(_) => true,
            FetchError::Transcoder { .. } => true,
            FetchError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(false, |s| s.is_server_error())
            }
            FetchError::Spawn { .. } | FetchError::Io { .. } => false,
        }
    }
}

/// 单任务失败原因，记录到 JobResult 中
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{path:?} already holds different content; not overwritten")]
    NamingCollision { path: PathBuf },
}
