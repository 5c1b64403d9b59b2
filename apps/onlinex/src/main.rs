mod cli;

use clap::Parser;
use cli::Cli;
use onlinex_client::config::Config;
use onlinex_client::telemetry;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply_overrides(&mut config);

    let guard = match telemetry::init_tracing(&config.log_filter, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("❌ cannot open log file: {err}");
            std::process::exit(2);
        }
    };

    let code = match cli::run(cli, config).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("❌ {err:#}");
            1
        }
    };

    drop(guard);
    // stdin is read on a blocking thread that cannot be cancelled; exit
    // instead of waiting for the runtime to join it
    std::process::exit(code);
}
