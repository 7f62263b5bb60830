use allocforge::config::Config;
use allocforge::error::AfResult;
use allocforge::problem::loader;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::process;
use tracing::{error, info, warn, Level};

mod cmd;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(global = true, short, long, default_value = "data/items.csv")]
    items: String,

    #[arg(global = true, short, long, default_value = "data/buckets.csv")]
    buckets: String,

    /// JSON file layered between the embedded defaults and explicit flags.
    #[arg(global = true, short, long)]
    config: Option<String>,

    #[arg(global = true, long, default_value_t = false)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run(cmd::run::RunArgs),
    Evaluate(cmd::evaluate::EvaluateArgs),
}

fn resolve_config(
    path: Option<&str>,
    cli_config: &Config,
    sub_matches: Option<&ArgMatches>,
) -> AfResult<Config> {
    let config = match path {
        Some(p) => {
            info!("⚙️  Loading config from: {}", p);
            let mut file_config = Config::load_from_file(p)?;
            if let Some(m) = sub_matches {
                file_config.merge_from_cli(cli_config, m);
            }
            file_config
        }
        None => {
            warn!("⚠️  No config file given. Using embedded defaults and flags.");
            cli_config.clone()
        }
    };
    config.validate()?;
    Ok(config)
}

fn main() {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    info!("🚀 Initializing AllocForge...");

    let (cli_config, sub_matches) = match &cli.command {
        Commands::Run(args) => (&args.config, matches.subcommand_matches("run")),
        Commands::Evaluate(args) => (&args.config, matches.subcommand_matches("evaluate")),
    };

    let config = resolve_config(cli.config.as_deref(), cli_config, sub_matches).unwrap_or_else(|e| {
        error!("❌ {}", e);
        process::exit(1);
    });

    let mut problem = loader::load_problem(&cli.items, &cli.buckets).unwrap_or_else(|e| {
        error!("❌ FATAL ERROR LOADING TABLES:");
        error!("   {}", e);
        process::exit(1);
    });

    if config.evolution.honor_exclusions {
        let n = problem.honor_exclusions();
        info!("🚫 {} items excluded from allocation", n);
    }

    let result = match &cli.command {
        Commands::Run(args) => cmd::run::run(args, &config, &problem),
        Commands::Evaluate(args) => cmd::evaluate::run(args, &problem),
    };

    if let Err(e) = result {
        error!("❌ {}", e);
        process::exit(1);
    }
}
