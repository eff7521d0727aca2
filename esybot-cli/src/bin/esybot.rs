use clap::{Parser, Subcommand, command};
use esybot::{Declaration, RecordingMessenger, Runtime, load_declaration_file};
use esybot_cli::{
    config::{CliError, CliResult, load_runtime_config, partial_show_secret, resolve_token},
    console::Console,
    telegram::{TelegramClient, run_polling},
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to runtime config file (JSON)
    #[arg(short, long, default_value = "esybot.json", global = true)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a bot file and print a summary
    Check(CheckArgs),

    /// Chat with a bot in the terminal
    Sim(SimArgs),

    /// Run a bot against the Telegram Bot API
    Run(RunArgs),
}

#[derive(Parser)]
struct CheckArgs {
    /// Bot file (.yaml, .json, .ini, ...)
    file: PathBuf,

    /// Print the normalized declaration as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct SimArgs {
    /// Bot file (.yaml, .json, .ini, ...)
    file: PathBuf,

    /// Chat id used for simulated events
    #[arg(long, default_value_t = 1)]
    chat_id: i64,

    /// First name of the simulated user
    #[arg(long, default_value = "Tester")]
    name: String,
}

#[derive(Parser)]
struct RunArgs {
    /// Bot file (.yaml, .json, .ini, ...)
    file: PathBuf,

    /// Bot token, overrides the one in the bot file
    #[arg(long, env = "ESYBOT_TOKEN")]
    token: Option<String>,
}

fn load(file: &Path) -> CliResult<Declaration> {
    debug!("Loading bot file: {:?}", file);
    Ok(load_declaration_file(file)?)
}

fn check(args: &CheckArgs) -> CliResult<()> {
    let mut declaration = load(&args.file)?;
    let token = resolve_token(None, &declaration.meta.token)?;
    declaration.meta.token = partial_show_secret(&token);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&declaration)?);
        return Ok(());
    }

    let meta = &declaration.meta;
    println!("Bot: {} v{}", meta.name, meta.version);
    if !meta.description.is_empty() {
        println!("Description: {}", meta.description);
    }
    println!("Token: {}", meta.token);
    println!("Variables: {}", declaration.variables.len());
    for variable in &declaration.variables {
        println!("  {} = {}", variable.name, variable.value);
    }
    println!("Keyboards: {}", declaration.keyboards.len());
    for keyboard in &declaration.keyboards {
        println!(
            "  {} ({}, {} buttons)",
            keyboard.name,
            keyboard.kind,
            keyboard.buttons.len()
        );
    }
    println!("Handlers: {}", declaration.handlers.len());
    for handler in &declaration.handlers {
        println!(
            "  {} <- {} ({} effects{}{})",
            handler.name,
            handler.trigger,
            handler.effects.len(),
            if handler.condition.is_some() { ", conditional" } else { "" },
            if handler.script.is_some() { ", script" } else { "" },
        );
    }
    Ok(())
}

async fn simulate(args: &SimArgs, config_path: &Path) -> CliResult<()> {
    let declaration = load(&args.file)?;
    let config = load_runtime_config(config_path)?;
    let messenger = Arc::new(RecordingMessenger::new());
    let runtime = Runtime::new(declaration, config, messenger.clone())?;

    let mut console = Console::new(Arc::new(runtime), messenger, args.chat_id, &args.name);
    console.run(io::stdin().lock(), io::stdout()).await
}

async fn run_bot(args: &RunArgs, config_path: &Path) -> CliResult<()> {
    let declaration = load(&args.file)?;
    let config = load_runtime_config(config_path)?;
    let token = resolve_token(args.token.as_deref(), &declaration.meta.token)?;
    info!(token = %partial_show_secret(&token), "Config loaded.");

    let client = Arc::new(TelegramClient::new(token, &config.transport)?);
    let runtime = Arc::new(Runtime::new(declaration, config, client.clone())?);

    // Message to user as UI.
    println!("Bot started. Press Ctrl+C to shutdown.");
    run_polling(runtime.clone(), client, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    let stats = runtime.stats();
    println!(
        "Shutdown completed. {} events, {} handled.",
        stats.events, stats.handled
    );
    Ok(())
}

async fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Commands::Check(args) => check(args),
        Commands::Sim(args) => simulate(args, &cli.config).await,
        Commands::Run(args) => run_bot(args, &cli.config).await,
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
