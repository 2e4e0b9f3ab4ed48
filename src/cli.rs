use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Batch downloader for course lecture videos and their subtitles.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub download: DownloadArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Burn downloaded subtitles into the videos, pairing files by chapter number.
    Merge(MergeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// JSON task list: [{"url": "...", "title": "..."}].
    #[arg(long, default_value = "download_tasks.json")]
    pub json: PathBuf,

    /// Maximum number of concurrent downloads.
    #[arg(short, long, default_value_t = 3)]
    pub workers: usize,

    /// Directory for videos and run logs [default: ~/Desktop/Course].
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Directory for subtitles [default: ~/Desktop/st.vtt].
    #[arg(long)]
    pub subtitle_dir: Option<PathBuf>,

    /// Path to the FFmpeg executable.
    #[arg(long)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Custom HTTP header(s). E.g., -H "Cookie: mycookie"
    #[arg(short = 'H', long = "header", action = clap::ArgAction::Append)]
    pub headers: Vec<String>,

    /// HTTP timeout in seconds for page and subtitle requests.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Time limit in seconds for a single FFmpeg download.
    #[arg(long, default_value_t = 3600)]
    pub transcode_timeout: u64,

    /// Extra attempts after a transient download failure.
    #[arg(long, default_value_t = 1)]
    pub retries: u32,

    /// Hide the progress bar.
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    /// Directory containing the downloaded videos.
    #[arg(long)]
    pub video_dir: PathBuf,

    /// Directory containing the subtitles.
    #[arg(long)]
    pub subtitle_dir: PathBuf,

    /// Directory for the merged videos.
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Video file extension.
    #[arg(long, default_value = ".mp4")]
    pub video_ext: String,

    /// Subtitle file extension.
    #[arg(long, default_value = ".vtt")]
    pub subtitle_ext: String,

    /// Path to the FFmpeg executable.
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg_path: PathBuf,

    /// Subtitle font size.
    #[arg(long, default_value_t = 24)]
    pub font_size: u32,

    /// Maximum number of concurrent FFmpeg processes.
    #[arg(short, long, default_value_t = 3)]
    pub workers: usize,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,
}

/// 解析命令行；参数错误以退出码 1 结束，`--help`/`--version` 正常退出
pub fn parse_args() -> Cli {
    Cli::try_parse().unwrap_or_else(|e| {
        let code = exit_code(&e);
        let _ = e.print();
        std::process::exit(code);
    })
}

fn exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["course_downloader_rs"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.download.json, PathBuf::from("download_tasks.json"));
        assert_eq!(cli.download.workers, 3);
        assert_eq!(cli.download.retries, 1);
        assert!(cli.download.output_dir.is_none());
    }

    #[test]
    fn download_flags() {
        let cli = Cli::try_parse_from([
            "course_downloader_rs",
            "--json",
            "tasks.json",
            "--workers",
            "5",
            "-H",
            "Cookie: a=b",
            "-H",
            "Referer: http://x/",
        ])
        .unwrap();
        assert_eq!(cli.download.json, PathBuf::from("tasks.json"));
        assert_eq!(cli.download.workers, 5);
        assert_eq!(cli.download.headers.len(), 2);
    }

    #[test]
    fn merge_subcommand() {
        let cli = Cli::try_parse_from([
            "course_downloader_rs",
            "merge",
            "--video-dir",
            "Course",
            "--subtitle-dir",
            "st.vtt",
            "--output-dir",
            "out",
            "--font-size",
            "30",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Merge(args)) => {
                assert_eq!(args.font_size, 30);
                assert_eq!(args.video_ext, ".mp4");
            }
            None => panic!("expected merge subcommand"),
        }
    }

    #[test]
    fn rejects_non_numeric_workers() {
        let err = Cli::try_parse_from(["course_downloader_rs", "--workers", "many"]).unwrap_err();
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn unknown_flag_exits_with_one() {
        let err = Cli::try_parse_from(["course_downloader_rs", "--bogus"]).unwrap_err();
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn help_and_version_exit_cleanly() {
        let help = Cli::try_parse_from(["course_downloader_rs", "--help"]).unwrap_err();
        assert_eq!(help.kind(), clap::error::ErrorKind::DisplayHelp);
        assert_eq!(exit_code(&help), 0);

        let version = Cli::try_parse_from(["course_downloader_rs", "--version"]).unwrap_err();
        assert_eq!(exit_code(&version), 0);
    }
}
