use chrono::Local;
use log::info;
use std::path::{Path, PathBuf};

use crate::error::SetupError;

/// 运行参数，由命令行解析得到
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output_root: PathBuf,
    pub subtitle_root: PathBuf,
    pub worker_limit: usize,
}

impl RunConfig {
    /// 默认输出到 `~/Desktop/Course`，字幕到 `~/Desktop/st.vtt`
    pub fn with_home_defaults(
        output_root: Option<PathBuf>,
        subtitle_root: Option<PathBuf>,
        worker_limit: usize,
    ) -> Result<Self, SetupError> {
        let desktop = || {
            dirs::home_dir()
                .map(|home| home.join("Desktop"))
                .ok_or(SetupError::HomeDir)
        };
        let output_root = match output_root {
            Some(dir) => dir,
            None => desktop()?.join("Course"),
        };
        let subtitle_root = match subtitle_root {
            Some(dir) => dir,
            None => desktop()?.join("st.vtt"),
        };
        Ok(Self {
            output_root,
            subtitle_root,
            worker_limit,
        })
    }
}

/// 单次运行的只读上下文，所有任务共享
#[derive(Debug, Clone)]
pub struct RunContext {
    pub output_root: PathBuf,
    pub subtitle_root: PathBuf,
    pub log_path: PathBuf,
    pub worker_limit: usize,
    /// 本次运行新建的目录，日志初始化后由 [`RunContext::report`] 输出
    pub created_dirs: Vec<PathBuf>,
}

impl RunContext {
    /// 创建输出目录、字幕目录和日志目录，并确定本次运行的日志文件路径
    pub fn prepare(config: &RunConfig) -> Result<Self, SetupError> {
        if config.worker_limit == 0 {
            return Err(SetupError::WorkerLimit(config.worker_limit));
        }

        let log_dir = config.output_root.join("logs");
        let mut created_dirs = Vec::new();
        for dir in [&config.output_root, &config.subtitle_root, &log_dir] {
            if create_dir(dir)? {
                created_dirs.push(dir.to_path_buf());
            }
        }

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let log_path = log_dir.join(format!("download_{}.log", timestamp));

        Ok(Self {
            output_root: config.output_root.clone(),
            subtitle_root: config.subtitle_root.clone(),
            log_path,
            worker_limit: config.worker_limit,
            created_dirs,
        })
    }

    /// 日志就绪后记录运行目录
    pub fn report(&self) {
        for dir in &self.created_dirs {
            info!("Created directory: {:?}", dir);
        }
        info!("Video directory: {:?}", self.output_root);
        info!("Subtitle directory: {:?}", self.subtitle_root);
        info!("Log file: {:?}", self.log_path);
    }

    pub fn video_path(&self, title: &str) -> PathBuf {
        self.output_root.join(crate::naming::video_name(title))
    }

    pub fn subtitle_path(&self, title: &str) -> PathBuf {
        self.subtitle_root.join(crate::naming::subtitle_name(title))
    }

    /// 运行结束时刷新日志
    pub fn finish(&self) {
        info!("Run log written to {:?}", self.log_path);
        log::logger().flush();
    }
}

/// 返回目录是否为新建
fn create_dir(path: &Path) -> Result<bool, SetupError> {
    let existed = path.is_dir();
    std::fs::create_dir_all(path).map_err(|source| SetupError::CreateDir {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(!existed)
}
