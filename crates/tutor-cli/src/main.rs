use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tutor_core::{
    Backend, ChatCompletionsBackend, Classifier, Handler, KeywordClassifier, Label,
    ModelClassifier, Router,
};
use tutor_gateway::{GatewayServer, GatewayState};
use tutor_history::HistoryDb;

mod config;

use config::{BackendConfig, ClassifierMode, TutorConfig};

#[derive(Parser)]
#[command(name = "tutor")]
#[command(version)]
#[command(about = "Tutor: routes questions to an academic or a coding model")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration (secrets masked)
    Config,

    /// Answer one question
    Ask {
        /// The question to route
        query: String,

        /// Print the full run outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP gateway
    Serve,

    /// Show recent questions and answers
    History {
        /// Number of interactions to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print the routing graph
    Graph {
        #[arg(short, long, value_enum, default_value_t = GraphFormat::Ascii)]
        format: GraphFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphFormat {
    Mermaid,
    Ascii,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keys may live in a local .env
    let dotenv = dotenvy::dotenv();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Ask { query, json } => cmd_ask(&cli.config, &query, json).await,
        Commands::Serve => cmd_serve(&cli.config).await,
        Commands::History { limit } => cmd_history(&cli.config, limit).await,
        Commands::Graph { format } => cmd_graph(&cli.config, format).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Tutor initialized at {}", config_dir.display());
    println!(
        "Set GROQ_API_KEY, OPENROUTER_API_KEY and OPENROUTER_MODEL, or edit {}.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = TutorConfig::load(config_path)?;
    println!("{:#?}", cfg);
    Ok(())
}

async fn cmd_ask(config_path: &Option<PathBuf>, query: &str, json: bool) -> Result<()> {
    let cfg = TutorConfig::load(config_path)?;
    let router = build_router(&cfg)?;

    let outcome = match router.run(query).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let hint = if e.is_retryable() {
                "transient, try again later"
            } else {
                "permanent, check the backend configuration"
            };
            return Err(anyhow::anyhow!("{} ({})", e, hint));
        }
    };

    if let Some(db) = open_history(&cfg)? {
        if let Err(e) = db
            .record(
                outcome.label.as_str(),
                &outcome.query,
                &outcome.response,
                &outcome.model,
            )
            .await
        {
            warn!("Failed to record interaction: {:#}", e);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        let fallback = if outcome.fell_back { ", fallback" } else { "" };
        println!("[{} via {}{}]\n", outcome.label, outcome.model, fallback);
        println!("{}", outcome.response);
    }
    Ok(())
}

async fn cmd_serve(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = TutorConfig::load(config_path)?;
    let router = Arc::new(build_router(&cfg)?);
    info!("Starting tutor gateway...");

    let history = open_history(&cfg)?;
    if let (Some(db), Some(days)) = (&history, cfg.history.retain_days) {
        db.prune_older_than(days)
            .await
            .context("Failed to prune history")?;
    }

    let state = GatewayState::new(router, history).with_recent_limit(cfg.history.recent_limit);
    let server = GatewayServer::new(cfg.gateway.socket_addr()?, state);

    let cancel = CancellationToken::new();
    let mut server_task = tokio::spawn(server.run_until(cancel.clone()));

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
            server_task.await.context("gateway task panicked")??;
        }
        result = &mut server_task => {
            result.context("gateway task panicked")??;
        }
    }

    println!("Tutor stopped.");
    Ok(())
}

async fn cmd_history(config_path: &Option<PathBuf>, limit: Option<usize>) -> Result<()> {
    let cfg = TutorConfig::load(config_path)?;
    let Some(db) = open_history(&cfg)? else {
        println!("History is disabled in the config.");
        return Ok(());
    };

    let items = db.recent(limit.unwrap_or(cfg.history.recent_limit)).await?;
    if items.is_empty() {
        println!("No interactions yet.");
        return Ok(());
    }

    for item in items {
        println!(
            "{}  [{}] {}",
            item.created_at.format("%Y-%m-%d %H:%M:%S"),
            item.label,
            item.model
        );
        println!("  Q: {}", item.query);
        println!("  A: {}\n", preview(&item.response, 160));
    }
    Ok(())
}

async fn cmd_graph(config_path: &Option<PathBuf>, format: GraphFormat) -> Result<()> {
    let cfg = TutorConfig::load(config_path)?;
    let router = build_router(&cfg)?;
    let graph = match format {
        GraphFormat::Mermaid => tutor_core::render_mermaid(&router),
        GraphFormat::Ascii => tutor_core::render_ascii(&router),
    };
    println!("{}", graph);
    Ok(())
}

fn build_backend(cfg: &BackendConfig) -> Result<Arc<dyn Backend>> {
    let mut backend = ChatCompletionsBackend::new(
        cfg.name.clone(),
        cfg.api_key.clone(),
        cfg.base_url.clone(),
        cfg.model.clone(),
        Duration::from_secs(cfg.timeout_secs),
    )?;
    if let Some(max_tokens) = cfg.max_tokens {
        backend = backend.with_max_tokens(max_tokens);
    }
    if cfg.api_key.is_empty() {
        warn!("Backend {} has no API key; its requests will fail", cfg.name);
    }
    Ok(Arc::new(backend))
}

fn build_handler(label: Label, cfg: &BackendConfig) -> Result<Handler> {
    let mut handler = Handler::new(label, build_backend(cfg)?)
        .with_timeout(Duration::from_secs(cfg.timeout_secs));
    if let Some(prompt) = &cfg.prompt {
        handler = handler.with_template(prompt.clone());
    }
    Ok(handler)
}

fn build_router(cfg: &TutorConfig) -> Result<Router> {
    let classifier: Arc<dyn Classifier> = match cfg.classifier.mode {
        ClassifierMode::Keyword => match &cfg.classifier.coding_terms {
            Some(terms) => Arc::new(KeywordClassifier::new(terms)),
            None => Arc::new(KeywordClassifier::default()),
        },
        ClassifierMode::Model => {
            let model = cfg
                .classifier
                .model
                .as_ref()
                .context("classifier mode is \"model\" but [classifier.model] is missing")?;
            Arc::new(ModelClassifier::new(build_backend(model)?))
        }
    };

    let academic = build_handler(Label::Academic, cfg.backends.get(Label::Academic))?;
    let coding = build_handler(Label::Coding, cfg.backends.get(Label::Coding))?;

    Ok(Router::new(classifier, academic, coding)?.with_fallback(cfg.classifier.fallback))
}

fn open_history(cfg: &TutorConfig) -> Result<Option<HistoryDb>> {
    if !cfg.history.enabled {
        return Ok(None);
    }
    let path = config::expand_home(&cfg.history.path);
    let db = HistoryDb::open(&path)
        .with_context(|| format!("Failed to open history at {}", path.display()))?;
    Ok(Some(db))
}

/// First line of `text`, cut to `max` chars
fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max {
        let cut: String = line.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}
