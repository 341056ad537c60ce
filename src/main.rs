//! Quill CLI entry point

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use quill::agent::{AgentLoop, OpenAiOAuthClient};
use quill::auth::{FileTokenStore, LoginFlow, TokenManager, TokenRecord, TokenStore};
use quill::config::{self, Config};
use quill::tools::ToolRegistry;
use quill::ui::{self, EventPrinter};

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill - terminal coding assistant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Init,

    /// Sign in with a ChatGPT account
    Login,

    /// Remove stored OAuth credentials
    Logout,

    /// Show configuration and credential status
    Status,

    /// Chat with the agent
    Agent {
        /// Message to send; starts an interactive session when omitted
        #[arg(short, long)]
        message: Option<String>,

        /// Inline credentials: type="oauth"&refresh="..."&access="..."&expires=...
        #[arg(long)]
        auth: Option<String>,

        /// Model override
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let path = config::config_path();
            if path.exists() {
                ui::print_warning(&format!("Config already exists at {}", path.display()));
            } else {
                config::save(&Config::default())?;
                ui::print_success(&format!("Wrote {}", path.display()));
            }
            println!("\nNext steps:");
            println!("  1. Sign in: quill login");
            println!("  2. Chat: quill agent -m \"Hello!\"");
        }

        Commands::Login => {
            let config = config::load()?;
            run_login(&config).await?;
        }

        Commands::Logout => {
            let config = config::load()?;
            FileTokenStore::new(&config.credentials_path).remove(&config.provider_key)?;
            ui::print_success("Logged out successfully");
        }

        Commands::Status => {
            let config = config::load()?;
            println!("Quill Status\n");
            println!("Workspace: {}", config.workspace().display());
            println!("Model: {}", config.model);
            println!("Provider: {}", config.provider_key);

            let store = FileTokenStore::new(&config.credentials_path);
            match store.load(&config.provider_key)? {
                Some(record) => {
                    let expires = record
                        .expires
                        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| "unknown".to_string());
                    println!("Credentials: ✓ (expires {})", expires);
                    if let Some(account) = record.account_id {
                        println!("Account: {}", account);
                    }
                }
                None => println!("Credentials: not set (run 'quill login')"),
            }
        }

        Commands::Agent {
            message,
            auth,
            model,
        } => {
            let mut config = config::load()?;
            if let Some(model) = model {
                config.model = model;
            }
            run_agent(&config, message.as_deref(), auth.as_deref()).await?;
        }
    }

    Ok(())
}

/// Token manager from inline credentials or the token store
fn token_manager(config: &Config, auth: Option<&str>) -> Result<TokenManager> {
    if let Some(auth) = auth {
        let record = TokenRecord::from_auth_string(auth)?;
        return Ok(TokenManager::from_record(&record));
    }

    let store = Arc::new(FileTokenStore::new(&config.credentials_path));
    let record = store
        .load(&config.provider_key)?
        .with_context(|| {
            format!(
                "No credentials for '{}'; run 'quill login' first",
                config.provider_key
            )
        })?;

    Ok(TokenManager::from_record(&record).persist_to(store, config.provider_key.clone()))
}

async fn run_agent(config: &Config, message: Option<&str>, auth: Option<&str>) -> Result<()> {
    let tokens = Arc::new(token_manager(config, auth)?);
    let client = OpenAiOAuthClient::new(tokens, &config.model);
    let tools = ToolRegistry::with_defaults(&config.workspace());
    let mut agent = AgentLoop::new(client, tools, config.system_prompt.clone());
    let mut printer = EventPrinter::stdout();

    if let Some(message) = message {
        agent.run(message, &mut |event| printer.print(&event)).await?;
        return Ok(());
    }

    ui::print_header(&config.model, &config.provider_key);
    let stdin = io::stdin();

    loop {
        print!("\n{} ", ">".blue().bold());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        // The error event has already been printed; keep the session alive
        if let Err(e) = agent.run(input, &mut |event| printer.print(&event)).await {
            tracing::debug!("Turn ended with error: {}", e);
        }
    }

    println!("Bye!");
    Ok(())
}

async fn run_login(config: &Config) -> Result<()> {
    let flow = LoginFlow::new();
    let start = flow.start()?;

    ui::print_step("Open this URL in your browser to sign in:");
    println!("\n{}\n", start.authorization_url);
    if open::that(&start.authorization_url).is_err() {
        ui::print_warning("Could not open a browser; copy the URL manually");
    }

    ui::print_step("After signing in, paste the redirect URL (or the code):");
    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;

    let record = flow
        .exchange_code(input.trim(), &start.code_verifier, Some(&start.state))
        .await?;

    FileTokenStore::new(&config.credentials_path).save(&config.provider_key, &record)?;
    ui::print_success(&format!(
        "Credentials saved to {}",
        config.credentials_path.display()
    ));
    Ok(())
}
