//! eSign CLI
//!
//! Command-line client for the eSignature REST APIs.
//!
//! # Usage
//!
//! ```bash
//! # Print the consent URL, then redeem the code from the redirect
//! esign consent-url
//! esign exchange <code>
//!
//! # Who am I, and which accounts can I use?
//! esign userinfo
//!
//! # Raw calls against an API family
//! esign get envelopes --query from_date=2024-01-01 --query status=sent
//! esign download envelopes/<id>/documents/combined --output combined.pdf
//!
//! # Service account
//! esign --jwt jwt-token
//! ```

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use esign_core::{
    ApiVersion, Credential, JwtCredential, LoggedCredential, OAuth2Credential, Operation,
    TracingLogger, UserInfo, generate_state,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

mod config;
mod token_store;

use config::CliConfig;
use token_store::TokenStore;

#[derive(Parser)]
#[command(name = "esign")]
#[command(about = "Command-line client for the eSignature REST APIs")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to esign.toml in the config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Authenticate with the service account from the [jwt] section
    #[arg(long, global = true)]
    jwt: bool,

    /// Act on this account instead of the default one
    #[arg(short, long, global = true)]
    account: Option<String>,

    /// Log every request and response body at debug level
    #[arg(long, global = true)]
    log_calls: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the URL where a user grants consent
    ConsentUrl {
        /// Scopes to request (repeatable)
        #[arg(short, long = "scope")]
        scopes: Vec<String>,

        /// State value echoed back on the redirect (random when omitted)
        #[arg(long)]
        state: Option<String>,

        /// Redirect URI for service-account consent
        #[arg(long)]
        redirect_uri: Option<String>,
    },

    /// Redeem an authorization code and save the token
    Exchange {
        /// Code from the consent redirect
        code: String,
    },

    /// Fetch a service-account access token
    JwtToken {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the authenticated user and their accounts
    Userinfo,

    /// Send a GET request and print the JSON response
    Get {
        /// Path relative to the account, or absolute from the API root
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query")]
        query: Vec<String>,

        /// API family (esign, esign-v2, admin, rooms, click, monitor)
        #[arg(long, default_value = "esign")]
        api: String,
    },

    /// Stream a binary response to a file
    Download {
        path: String,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = "esign")]
        api: String,
    },

    /// Revoke the saved token and delete it
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    init_logging(cli.verbose, &config.log_level);
    info!("Loaded configuration from {:?}", config.config_path);

    match cli.command {
        Commands::ConsentUrl { ref scopes, ref state, ref redirect_uri } => {
            consent_url(&cli, &config, scopes, state.as_deref(), redirect_uri.as_deref())
        }
        Commands::Exchange { ref code } => exchange(&config, code).await,
        Commands::JwtToken { ref format } => jwt_token(&config, format).await,
        Commands::Userinfo => {
            let session = Session::open(&cli, &config)?;
            let result = session
                .user_info()
                .await
                .and_then(|info| print_user_info(&info));
            session.persist().await?;
            result
        }
        Commands::Get { ref path, ref query, ref api } => {
            let session = Session::open(&cli, &config)?;
            let result = get(&session, cli.log_calls, path, query, api).await;
            session.persist().await?;
            result
        }
        Commands::Download { ref path, ref output, ref api } => {
            let session = Session::open(&cli, &config)?;
            let result = download(&session, cli.log_calls, path, output, api).await;
            session.persist().await?;
            result
        }
        Commands::Logout => logout(&config).await,
    }
}

fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// The credential a command runs with.
enum Session {
    OAuth {
        credential: OAuth2Credential,
        store: TokenStore,
    },
    Jwt(JwtCredential),
}

impl Session {
    fn open(cli: &Cli, config: &CliConfig) -> Result<Self> {
        let session = if cli.jwt {
            let section = config.jwt()?;
            let credential = section.to_config()?.credential(&section.user_id)?;
            Session::Jwt(credential)
        } else {
            let store = TokenStore::new(config.token_path());
            let token = store
                .load()?
                .ok_or_else(|| anyhow!("No saved token; run `esign consent-url` and `esign exchange` first"))?;
            let credential = config.oauth()?.credential(token)?;
            Session::OAuth { credential, store }
        };

        Ok(match &cli.account {
            Some(account) => session.with_account_id(account),
            None => session,
        })
    }

    fn with_account_id(self, account_id: &str) -> Self {
        match self {
            Session::OAuth { credential, store } => Session::OAuth {
                credential: credential.with_account_id(account_id),
                store,
            },
            Session::Jwt(credential) => Session::Jwt(credential.with_account_id(account_id)),
        }
    }

    /// The credential to send calls through, optionally logging each call.
    fn credential(&self, log_calls: bool) -> Box<dyn Credential> {
        match self {
            Session::OAuth { credential, .. } => boxed(credential.clone(), log_calls),
            Session::Jwt(credential) => boxed(credential.clone(), log_calls),
        }
    }

    async fn user_info(&self) -> Result<Arc<UserInfo>> {
        let info = match self {
            Session::OAuth { credential, .. } => credential.user_info().await?,
            Session::Jwt(credential) => credential.user_info().await?,
        };
        Ok(info)
    }

    /// Write back a token that was refreshed during the command.
    async fn persist(&self) -> Result<()> {
        if let Session::OAuth { credential, store } = self {
            if let Some(token) = credential.current_token().await {
                store.save(&token)?;
            }
        }
        Ok(())
    }
}

fn boxed<C: Credential + 'static>(credential: C, log_calls: bool) -> Box<dyn Credential> {
    if log_calls {
        Box::new(LoggedCredential::new(credential, TracingLogger))
    } else {
        Box::new(credential)
    }
}

fn api_version(name: &str) -> Result<&'static ApiVersion> {
    ApiVersion::by_name(name).ok_or_else(|| anyhow!("Unknown API family {:?}", name))
}

fn consent_url(
    cli: &Cli,
    config: &CliConfig,
    scopes: &[String],
    state: Option<&str>,
    redirect_uri: Option<&str>,
) -> Result<()> {
    let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();

    let url = if cli.jwt {
        let redirect_uri =
            redirect_uri.ok_or_else(|| anyhow!("--redirect-uri is required for service-account consent"))?;
        config.jwt()?.to_config()?.user_consent_url(redirect_uri, &scopes)?
    } else {
        let state = state.map(str::to_string).unwrap_or_else(generate_state);
        eprintln!("State: {}", state);
        config.oauth()?.authorization_url(&state, &scopes)?
    };

    println!("{}", url);
    Ok(())
}

async fn exchange(config: &CliConfig, code: &str) -> Result<()> {
    let credential = config
        .oauth()?
        .exchange(code)
        .await
        .context("Failed to redeem authorization code")?;

    let token = credential
        .current_token()
        .await
        .ok_or_else(|| anyhow!("Token endpoint returned no token"))?;
    TokenStore::new(config.token_path()).save(&token)?;

    let info = credential.user_info().await?;
    println!("Signed in as {}", info.display_id());
    println!("Token saved to {:?}", config.token_path());
    Ok(())
}

async fn jwt_token(config: &CliConfig, format: &str) -> Result<()> {
    let section = config.jwt()?;
    let credential = section.to_config()?.credential(&section.user_id)?;
    let token = credential
        .valid_token()
        .await
        .context("Failed to obtain service-account token")?;

    match format {
        "json" => {
            let output = serde_json::json!({
                "access_token": token.access_token.expose(),
                "token_type": token.token_type,
                "expires_at": token.expires_at,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => println!("{}", token.access_token.expose()),
    }
    Ok(())
}

fn print_user_info(info: &UserInfo) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(info)?);
    Ok(())
}

fn parse_query(pair: &str) -> Result<(&str, &str)> {
    pair.split_once('=')
        .ok_or_else(|| anyhow!("Query parameter {:?} is not key=value", pair))
}

async fn get(session: &Session, log_calls: bool, path: &str, query: &[String], api: &str) -> Result<()> {
    let mut op = Operation::get(path, api_version(api)?);
    for pair in query {
        let (key, value) = parse_query(pair)?;
        op = op.query(key, value);
    }

    let credential = session.credential(log_calls);
    let body: serde_json::Value = op
        .execute(credential.as_ref())
        .await
        .with_context(|| format!("GET {} failed", path))?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn download(
    session: &Session,
    log_calls: bool,
    path: &str,
    output: &Path,
    api: &str,
) -> Result<()> {
    let credential = session.credential(log_calls);
    let download = Operation::get(path, api_version(api)?)
        .accept("*/*")
        .execute_download(credential.as_ref())
        .await
        .with_context(|| format!("GET {} failed", path))?;

    let mut file = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("Failed to create {:?}", output))?;
    let written = download.write_to(&mut file).await?;
    println!("Wrote {} bytes to {:?}", written, output);
    Ok(())
}

async fn logout(config: &CliConfig) -> Result<()> {
    let store = TokenStore::new(config.token_path());
    if let Some(token) = store.load()? {
        let credential = config.oauth()?.credential(token)?;
        if let Err(e) = credential.revoke().await {
            tracing::warn!("Revocation failed: {}", e);
        }
    }
    store.clear()?;
    println!("Signed out");
    Ok(())
}
