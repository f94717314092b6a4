use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{Select, theme::ColorfulTheme};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use amharic_chat::ai::{build_model, ollama::OllamaClient};
use amharic_chat::app::App;
use amharic_chat::config::Config;
use amharic_chat::dataset::{
    GeminiClient, RetryPolicy, convert_directory, generate::DEFAULT_GEMINI_MODEL, generate_dataset,
    save_corpus, save_dataset,
};
use amharic_chat::pipeline::Session;
use amharic_chat::provider::Provider;
use amharic_chat::speech::{AudioArtifacts, build_synthesizer};
use amharic_chat::translate::build_translator;
use amharic_chat::{repl, tui};

const DEFAULT_LOG_FILTER: &str = "amharic_chat=info";

#[derive(Parser)]
#[command(name = "amharic-chat", version)]
#[command(about = "Streaming Amharic chat with spoken replies, plus dataset tools")]
struct Cli {
    /// Config file (default: <config dir>/amharic-chat/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model provider: ollama or openai
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model name for the selected provider
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Disable speech synthesis
    #[arg(long, global = true)]
    no_voice: bool,

    /// Upper bound on reply length, 32-1024
    #[arg(long, global = true)]
    max_tokens: Option<u32>,

    /// Translate replies into the configured language before speaking them
    #[arg(long, global = true)]
    translate: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Full-screen chat (default)
    Chat,
    /// Line-mode chat on stdin/stdout
    Repl,
    /// Synthesize one piece of text and print the file path
    Speak {
        text: String,
        /// Write here instead of the next response_N.mp3
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List models from the provider
    Models {
        /// Pick one interactively and save it as the default
        #[arg(long)]
        select: bool,
    },
    /// Generate a synthetic reasoning dataset with Gemini
    GenerateDataset {
        #[arg(long, default_value = "1000")]
        count: usize,
        #[arg(long, default_value = "4")]
        batch_size: usize,
        #[arg(short, long, default_value = "Amharic_reasoning_dataset")]
        output: PathBuf,
        /// Gemini model name
        #[arg(long, default_value = DEFAULT_GEMINI_MODEL)]
        gemini_model: String,
        /// Stop after this many requests
        #[arg(long)]
        max_attempts: Option<usize>,
    },
    /// Convert a folder of documents into a Harmony corpus
    ConvertDocs {
        #[arg(short, long, default_value = ".")]
        input_dir: PathBuf,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    let command = cli.command.take().unwrap_or(Commands::Chat);

    // The full-screen UI owns the terminal, so it logs to a file.
    let _guard = if matches!(command, Commands::Chat) {
        Some(init_file_logging()?)
    } else {
        init_stderr_logging();
        None
    };

    let config = load_config(&cli)?;

    match &command {
        Commands::Chat => {
            let player = config.player_command.clone();
            let mut app = App::new(build_session(&config)?, player);
            tui::run(&mut app).await?;
        }
        Commands::Repl => repl::run(build_session(&config)?, config.player_command.clone()).await?,
        Commands::Speak { text, output } => speak(&config, text, output.as_deref()).await?,
        Commands::Models { select } => list_models(&config, *select).await?,
        Commands::GenerateDataset { count, batch_size, output, gemini_model, max_attempts } => {
            let key = config
                .gemini_api_key
                .clone()
                .ok_or_else(|| anyhow!("GEMINI_API_KEY is not set"))?;
            let client = GeminiClient::new(&key, gemini_model);
            let policy = RetryPolicy { max_attempts: *max_attempts, ..RetryPolicy::default() };

            println!("🧠 Generating {} samples with {}", count.to_string().bold(), gemini_model.magenta());
            let rows = generate_dataset(&client, *count, *batch_size, &policy).await;
            save_dataset(&rows, output)?;
            println!("{} {} rows in {}", "✓".green(), rows.len(), output.display().to_string().bold());
        }
        Commands::ConvertDocs { input_dir, output_dir } => {
            let out = output_dir.clone().unwrap_or_else(|| input_dir.join("harmony_output"));
            let rows = convert_directory(input_dir)?;
            if rows.is_empty() {
                println!("{}", "No readable documents found".yellow());
                return Ok(());
            }
            save_corpus(&rows, &out)?;
            println!("{} {} chunks in {}", "✓".green(), rows.len(), out.display().to_string().bold());
        }
    }

    Ok(())
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();
}

fn init_file_logging() -> Result<WorkerGuard> {
    let log_dir = Config::data_dir().join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "amharic-chat.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    }
    .with_env();

    if let Some(provider) = &cli.provider {
        let provider: Provider = provider.parse().map_err(anyhow::Error::msg)?;
        config.provider = Some(provider.to_string());
    }
    if let Some(model) = &cli.model {
        let provider = config.current_provider();
        config.set_model(provider, model);
    }
    if cli.no_voice {
        config.voice_enabled = false;
    }
    if let Some(max_tokens) = cli.max_tokens {
        config.max_tokens = max_tokens;
    }
    if cli.translate {
        config.translate_replies = true;
    }
    Ok(config)
}

fn build_session(config: &Config) -> Result<Session> {
    let session = Session::new(
        build_model(config)?,
        build_synthesizer(config)?,
        AudioArtifacts::new(&config.audio_dir),
        config.chat_settings(),
    );
    Ok(match build_translator(config) {
        Some(translator) => session.with_translator(translator),
        None => session,
    })
}

async fn speak(config: &Config, text: &str, output: Option<&Path>) -> Result<()> {
    let synthesizer = build_synthesizer(config)?;
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => AudioArtifacts::new(&config.audio_dir).next_path()?,
    };

    let language = config.language.clone();
    let text = text.to_string();
    let target = path.clone();
    tokio::task::spawn_blocking(move || synthesizer.synthesize(&text, &language, &target)).await??;

    println!("{}", path.display());
    Ok(())
}

async fn list_models(config: &Config, select: bool) -> Result<()> {
    let provider = config.current_provider();

    let models = match provider {
        Provider::Ollama => {
            let client = OllamaClient::new(&config.ollama_url, &config.model_for(provider));
            match client.list_models().await {
                Ok(models) => models,
                Err(e) => {
                    println!("{}: {}", "Error connecting to Ollama".red(), e);
                    println!("Make sure Ollama is running: {}", "ollama serve".bold());
                    return Ok(());
                }
            }
        }
        Provider::OpenAI => amharic_chat::ai::openai::OpenAIClient::list_models(),
    };

    if models.is_empty() {
        println!("{}", "No models found. Pull a model with: ollama pull llama3.2".yellow());
        return Ok(());
    }

    if !select {
        println!("\n{}", format!("🤖 {} models", provider.display_name()).bold().blue());
        println!("{}", "=".repeat(30).dimmed());
        for model in &models {
            println!("  • {}", model.green());
        }
        return Ok(());
    }

    let current = config.model_for(provider);
    let default = models.iter().position(|m| *m == current).unwrap_or(0);
    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Default model")
        .items(&models)
        .default(default)
        .interact()?;

    Config::save_default_model(provider, &models[choice])?;
    println!("{} {}", "Saved default model:".green(), models[choice].bold());
    Ok(())
}
