use course_downloader_rs::cli::Command;
use log::warn;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let cli = course_downloader_rs::cli::parse_args();

    let outcome = match cli.command {
        Some(Command::Merge(args)) => {
            let filter = if args.debug { "debug" } else { "info" };
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
            course_downloader_rs::run_merge(args).await.map(|_| ())
        }
        None => {
            // Ctrl-C 后不再启动新任务
            let stop = CancellationToken::new();
            let signal = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Stop requested; letting running downloads finish");
                    signal.cancel();
                }
            });
            course_downloader_rs::run(cli.download, stop)
                .await
                .map(|summary| print!("{}", summary))
        }
    };

    if let Err(e) = outcome {
        eprintln!("course_downloader_rs error: {:#}", e);
        std::process::exit(1);
    }
}
