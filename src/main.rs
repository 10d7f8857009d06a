use clap::{Parser, Subcommand};
use pcm_dialog::memory::MemoryStore;
use pcm_dialog::memory::document;
use pcm_dialog::pipeline::Pipeline;
use pcm_dialog::credentials::{CredentialStore, KeyedProvider};
use pcm_dialog::{config, console, gateway};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pcm-dialog")]
#[command(about = "Task routing, memory retrieval and output parsing for a role-play dialogue agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket gateway
    Serve {
        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Auth token (required for non-loopback)
        #[arg(long, env = "PCM_DIALOG_TOKEN")]
        token: Option<String>,
    },

    /// Read requests from stdin and print each result
    Console {
        /// Session whose ledgers to load instead of the configured default
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Print the clean conversation ledger of a session as JSON
    Export {
        /// Session identifier, optionally `collection\name`
        session: String,
    },

    /// Manage stored API keys
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Show effective configuration
    Status,
}

#[derive(Subcommand)]
enum AuthAction {
    /// Prompt for a provider API key and store it
    Set {
        /// `openai` or `anthropic`
        provider: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, bind, token } => {
            let mut config = config::load()?;
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(bind) = bind {
                config.gateway.bind = bind;
            }
            gateway::run(config, token).await
        }
        Commands::Console { session } => {
            let config = config::load()?;
            let pipeline = Pipeline::from_config(&config).await?;
            if let Some(session) = session {
                pipeline.start_session(&session).await?;
            }
            console::run(&pipeline, tokio::io::stdin(), tokio::io::stdout()).await
        }
        Commands::Export { session } => {
            let config = config::load()?;
            if config.store.backend != "file" {
                anyhow::bail!("export needs the file store backend; set [store] backend = \"file\"");
            }
            let documents = document::from_config(&config.store);
            let store = MemoryStore::load(documents, &session, config.model_id()).await?;
            info!(
                collection = %store.names().collection,
                document = %store.names().clean,
                "exporting clean ledger"
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&store.clean_conversations())?
            );
            Ok(())
        }
        Commands::Auth { action } => match action {
            AuthAction::Set { provider } => {
                let provider: KeyedProvider = provider.parse()?;
                let key = rpassword::prompt_password(format!("{provider} API key: "))?;
                let path = CredentialStore::default_location().save(provider, &key)?;
                println!("stored {provider} key in {}", path.display());
                Ok(())
            }
        },
        Commands::Status => {
            let config = config::load()?;
            println!("pcm-dialog v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "gateway: {}:{}",
                config.gateway.bind, config.gateway.port
            );
            println!(
                "model: {} ({}), key {}",
                config.model.model,
                config.model.provider,
                if config.model.api_key.is_some() { "set" } else { "missing" }
            );
            println!("embedding: {}", config.embedding.provider);
            println!(
                "store: {} / session {}",
                config.store.backend, config.store.default_session
            );
            Ok(())
        }
    }
}
