//! paper2llm key store CLI
//!
//! Stores, inspects and retrieves the API keys the conversion pipeline uses.
//! Keys are kept in the same durable storage the desktop build reads.
//!
//! Output meant for scripts goes to stdout; logs go to stderr.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use keystore_core::{
    CredentialStore, ExpirationClass, FileStorage, KeyStoreConfig, KeyStoreError, KeychainStorage,
    MemoryStorage, ProviderId, ProviderRegistry, StorageArea, StorageBackend, StoreOptions,
    SystemClock,
};

/// paper2llm key store - encrypted API key storage for OCR and vision providers
#[derive(Parser, Debug)]
#[command(name = "keystore")]
#[command(version)]
#[command(about = "Encrypted API key storage for paper2llm providers")]
struct Args {
    /// Directory holding keystore.json (default: platform data directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where durable records are kept
    #[arg(long, global = true, value_enum, default_value_t = Backend::File)]
    backend: Backend,

    /// Password protecting the stored key (prompted for when needed)
    #[arg(long, global = true, env = "PAPER2LLM_KEYSTORE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// keystore.json in the data directory
    File,
    /// OS keychain
    Keychain,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encrypt and store an API key
    Store {
        /// Provider id (default: configured default provider)
        #[arg(long)]
        provider: Option<ProviderId>,

        /// Expiration class: never, 1day, 7days, 30days
        #[arg(long, default_value = "never")]
        expiration: ExpirationClass,

        /// API key; prompted for without echo if omitted
        #[arg(long)]
        key: Option<String>,
    },
    /// Decrypt a stored API key
    Retrieve {
        #[arg(long)]
        provider: Option<ProviderId>,

        /// Print the whole key instead of its prefix
        #[arg(long)]
        reveal: bool,
    },
    /// Show stored records without decrypting them
    Status,
    /// Delete stored API keys
    Clear {
        #[arg(long, conflicts_with = "all")]
        provider: Option<ProviderId>,

        /// Every provider plus legacy entries
        #[arg(long)]
        all: bool,
    },
    /// List registered providers
    Providers,
    /// Check an API key against a provider's format
    Validate {
        key: String,

        #[arg(long)]
        provider: Option<ProviderId>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", describe(e.as_ref()));
        std::process::exit(1);
    }
}

/// Message for the terminal; internal failures are logged in full instead
fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    match err.downcast_ref::<KeyStoreError>() {
        Some(e) if !e.is_user_facing() => {
            error!("{}", e);
            "the key store could not complete the operation".to_string()
        }
        _ => err.to_string(),
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => KeyStoreConfig::load(path)
            .await
            .map_err(|e| format!("Failed to load config {:?}: {}", path, e))?,
        None => KeyStoreConfig::default(),
    };

    let store = open_store(&args, config).await?;

    match args.command {
        Command::Store {
            provider,
            expiration,
            key,
        } => {
            if !store.supported_expirations().contains(&expiration) {
                return Err(KeyStoreError::UnsupportedExpiration(expiration.to_string()).into());
            }

            let key = match key {
                Some(key) => key,
                None => rpassword::prompt_password("API key: ")?,
            };
            let password = password_or_prompt(args.password)?;

            let mut options = StoreOptions::durable(&password).expiring(expiration);
            if let Some(provider) = provider {
                options = options.for_provider(provider);
            }

            store.store(&key, options).await?;
            println!("Stored");
        }
        Command::Retrieve { provider, reveal } => {
            let password = if store.is_password_protected(provider.as_ref()).await? {
                Some(password_or_prompt(args.password)?)
            } else {
                args.password
            };

            match store.retrieve(password.as_deref(), provider.as_ref()).await? {
                Some(value) if reveal => println!("{}", value.expose()),
                Some(value) => println!("{}", value.masked()),
                None => {
                    eprintln!("No API key stored");
                    std::process::exit(1);
                }
            }
        }
        Command::Status => {
            for provider in store.registry().list() {
                match store.record(Some(provider.id())).await? {
                    Some(record) => {
                        let expires = record
                            .expires_at
                            .map(|at| at.to_rfc3339())
                            .unwrap_or_else(|| "-".to_string());
                        let format = record
                            .format_version
                            .map(|v| format!("v{}", v as u32))
                            .unwrap_or_else(|| "unreadable".to_string());
                        let expired = if store.is_expired(Some(provider.id())).await? {
                            " (expired)"
                        } else {
                            ""
                        };
                        println!(
                            "{:<12} {:<8} protected={:<5} expiration={:<7} expires={}{} format={}",
                            provider.id().as_str(),
                            record.scope.as_str(),
                            record.password_protected,
                            record.expiration.as_str(),
                            expires,
                            expired,
                            format
                        );
                    }
                    None => println!("{:<12} -", provider.id().as_str()),
                }
            }
        }
        Command::Clear { provider, all } => {
            if all {
                store.clear(None).await?;
            } else {
                let provider = provider.unwrap_or_else(|| store.registry().default_id().clone());
                store.clear(Some(&provider)).await?;
            }
            println!("Cleared");
        }
        Command::Providers => {
            let default_id = store.registry().default_id().clone();
            for provider in store.registry().list() {
                let marker = if provider.id() == &default_id { "*" } else { " " };
                println!(
                    "{} {:<12} {:<16} {}",
                    marker,
                    provider.id().as_str(),
                    provider.display_name(),
                    provider.format_hint()
                );
            }
        }
        Command::Validate { key, provider } => {
            if store.validate(&key, provider.as_ref())? {
                println!("valid");
            } else {
                println!("invalid");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn open_store(
    args: &Args,
    config: KeyStoreConfig,
) -> keystore_core::Result<CredentialStore> {
    let durable: Arc<dyn StorageArea> = match args.backend {
        Backend::File => match &args.data_dir {
            Some(dir) => Arc::new(FileStorage::open_in(dir).await?),
            None => Arc::new(FileStorage::open().await?),
        },
        Backend::Keychain => {
            let keychain = KeychainStorage::new(&config.namespace);
            if !keychain.probe().await {
                return Err(KeyStoreError::Storage(
                    "OS keychain is not available, use --backend file".to_string(),
                ));
            }
            Arc::new(keychain)
        }
    };

    info!("Using {} storage for durable records", durable.backend_name());

    // A CLI process is one session: session records end with it
    let session: Arc<dyn StorageArea> = Arc::new(MemoryStorage::new());

    let registry = ProviderRegistry::with_builtins(&config.default_provider)?;
    let backend = StorageBackend::new(&config.namespace, durable, session);

    CredentialStore::open(config, registry, backend, Arc::new(SystemClock)).await
}

fn password_or_prompt(password: Option<String>) -> std::io::Result<String> {
    match password {
        Some(password) => Ok(password),
        None => rpassword::prompt_password("Password: "),
    }
}
