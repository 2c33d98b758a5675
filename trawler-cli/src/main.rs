use std::process::ExitCode;

use clap::Parser;

use trawler_cli::cli::{Cli, Commands};
use trawler_cli::commands;
use trawler_cli::error::CliError;
use trawler_cli::logging;
use trawler_cli::output::OutputWriter;
use trawler_core::config::TrawlerConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // config 서브커맨드는 설정 파일 자체를 검사하므로 여기서 로드하지 않음
    let config = match cli.command {
        Commands::Config(_) => TrawlerConfig::default(),
        _ => TrawlerConfig::load_or_default(&cli.config).await?,
    };
    logging::init_tracing(&config.general, cli.log_level.as_deref())?;

    tracing::debug!(config = %cli.config.display(), "trawler starting");
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &config, &writer).await,
        Commands::Parse(args) => commands::parse::execute(args, &config, &writer).await,
        Commands::Import(args) => commands::import::execute(args, &config, &writer).await,
        Commands::Validate(args) => commands::validate::execute(args, &config, &writer),
        Commands::Tools(args) => commands::tools::execute(args, &config, &writer),
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}
