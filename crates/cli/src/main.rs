mod cmd;
mod util;

use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[tokio::main]
async fn main() {
    let args: cmd::rerun::Args = argp::parse_args_or_exit(argp::DEFAULT);

    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    // Keep stdout for the report itself
    tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    if let Err(e) = cmd::rerun::run(args).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
