use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use onlinex_client::api::{ApiClient, ApiError, CreateRoomRequest};
use onlinex_client::chat::console::run_console;
use onlinex_client::chat::{
    CloseReason, ConnectionManager, ConnectionStatus, ConnectionTarget, SessionHandlers,
};
use onlinex_client::config::Config;
use onlinex_client::session::{SessionCredential, SessionStore, StoredSession};
use onlinex_client::transport::websocket::WebSocketDialer;

#[derive(Parser, Debug)]
#[command(name = "onlinex")]
#[command(about = "OnLinex rooms and AI chat from the terminal")]
pub struct Cli {
    /// HTTP API base URL (overrides ONLINEX_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// WebSocket base URL (overrides ONLINEX_WS_URL)
    #[arg(long, global = true)]
    pub ws_url: Option<String>,

    /// Tracing filter, e.g. `debug` or `onlinex::connector=trace`
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    /// Write logs to a file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Write the chat transcript as JSON when the chat ends
    #[arg(long, global = true)]
    pub transcript: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with a registered account
    Login {
        username: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account and log in with it
    Register { username: String },
    /// Get a temporary account that expires after a few hours
    Guest { name: String },
    /// Forget the stored session
    Logout,
    /// Show the stored session and the resolved socket endpoint
    Status,
    /// Create, join and chat in rooms
    Room {
        #[command(subcommand)]
        command: RoomCommands,
    },
    /// Talk to an AI agent
    Ai {
        #[arg(long, default_value = "main")]
        agent: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum RoomCommands {
    /// Create a room and enter its chat
    Create {
        name: String,
        #[arg(long, default_value_t = 2)]
        capacity: u32,
        #[arg(long, default_value = "en")]
        language: String,
        #[arg(long)]
        private: bool,
    },
    /// Join a room by code and enter its chat
    Join { code: String },
    /// Enter the chat of a room you already belong to
    Chat { code: String },
    /// Leave a room
    Leave { code: String },
}

impl Cli {
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(url) = self.api_url.clone() {
            config.api_base_url = Some(url);
        }
        if let Some(url) = self.ws_url.clone() {
            config.ws_base_url = Some(url);
        }
        if let Some(filter) = self.log_filter.clone() {
            config.log_filter = filter;
        }
    }
}

struct App {
    config: Config,
    store: SessionStore,
    transcript: Option<PathBuf>,
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    let store = config.session_store()?;
    let app = App {
        config,
        store,
        transcript: cli.transcript,
    };

    match cli.command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => rpassword::prompt_password("Password: ")?,
            };
            let credential = api(&app)?.login(&username, &password).await?;
            app.store
                .save(&StoredSession::new(&credential, Some(username.clone()), false))?;
            println!("Logged in as {username}");
        }
        Commands::Register { username } => {
            let password = rpassword::prompt_password("Password: ")?;
            let confirm = rpassword::prompt_password("Confirm password: ")?;
            if password != confirm {
                bail!("passwords do not match");
            }
            let credential = api(&app)?.register(&username, &password, &confirm).await?;
            app.store
                .save(&StoredSession::new(&credential, Some(username.clone()), false))?;
            println!("Registered and logged in as {username}");
        }
        Commands::Guest { name } => {
            let grant = api(&app)?.temporary_access(&name).await?;
            let username = grant.username.clone().unwrap_or(name);
            app.store
                .save(&StoredSession::new(&grant.credential, Some(username.clone()), true))?;
            match grant.expires_at {
                Some(expires_at) => println!("Temporary access as {username} until {expires_at}"),
                None => println!("Temporary access as {username}"),
            }
        }
        Commands::Logout => {
            app.store.clear()?;
            println!("Logged out");
        }
        Commands::Status => status(&app)?,
        Commands::Room { command } => room(&app, command).await?,
        Commands::Ai { agent } => {
            let credential = app.store.require_credential()?;
            let conversation_id = guard(&app, api(&app)?.start_conversation(&credential, &agent).await)?;
            println!("Talking to {agent}");
            chat(&app, ConnectionTarget::assistant(conversation_id), &credential).await?;
        }
    }
    Ok(())
}

fn api(app: &App) -> Result<ApiClient> {
    let base = app.config.api_base_url.clone().unwrap_or_default();
    Ok(ApiClient::new(base)?)
}

/// Drop the stored session when the API says it is no longer valid.
fn guard<T>(app: &App, result: Result<T, ApiError>) -> Result<T> {
    if let Err(ApiError::Unauthorized) = &result {
        app.store.clear()?;
    }
    Ok(result?)
}

fn status(app: &App) -> Result<()> {
    match app.store.load()? {
        Some(session) => {
            let who = session.username.as_deref().unwrap_or("unknown user");
            let kind = if session.temporary { "temporary" } else { "registered" };
            println!("Session: {who} ({kind}), updated {}", session.updated_at);
        }
        None => println!("Session: none"),
    }
    let endpoint = app.config.endpoint().resolve();
    if endpoint.is_empty() {
        println!("Socket endpoint: not configured");
    } else {
        println!("Socket endpoint: {endpoint}");
    }
    Ok(())
}

async fn room(app: &App, command: RoomCommands) -> Result<()> {
    let credential = app.store.require_credential()?;
    let client = api(app)?;
    let code = match command {
        RoomCommands::Create {
            name,
            capacity,
            language,
            private,
        } => {
            let request = CreateRoomRequest {
                name,
                capacity,
                language,
                is_public: !private,
            };
            let room = guard(app, client.create_room(&credential, &request).await)?;
            println!("Room created: {}", room.code);
            room.code
        }
        RoomCommands::Join { code } => {
            let message = guard(app, client.join_room(&credential, &code).await)?;
            println!("{message}");
            code
        }
        RoomCommands::Chat { code } => code,
        RoomCommands::Leave { code } => {
            let message = guard(app, client.leave_room(&credential, &code).await)?;
            println!("{message}");
            return Ok(());
        }
    };
    chat(app, ConnectionTarget::room(code), &credential).await
}

async fn chat(app: &App, target: ConnectionTarget, credential: &SessionCredential) -> Result<()> {
    let mut manager = ConnectionManager::new(Arc::new(WebSocketDialer::new()), app.config.endpoint());

    let store = app.store.clone();
    let handlers = SessionHandlers::new()
        .on_status_change(|status| {
            tracing::debug!(target: "onlinex::cli", ?status, "status changed");
        })
        .on_unauthorized(move || {
            if let Err(err) = store.clear() {
                tracing::warn!(target: "onlinex::cli", error = %err, "failed to clear session");
            }
        });
    manager
        .connect(target, credential, handlers)
        .context("cannot open chat")?;

    let (lines_tx, mut lines_rx) = mpsc::channel(32);
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if lines_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut stdout = std::io::stdout();
    let outcome = run_console(&mut manager, &mut lines_rx, &mut stdout).await;
    reader.abort();

    if let Some(path) = app.transcript.as_deref() {
        write_transcript(path, &manager)?;
    }
    manager.disconnect();

    let status = outcome?;
    if status == ConnectionStatus::Closed(CloseReason::Unauthorized) {
        bail!("session is no longer valid; run `onlinex login` or `onlinex guest <name>`");
    }
    Ok(())
}

fn write_transcript(path: &Path, manager: &ConnectionManager) -> Result<()> {
    let json = serde_json::to_string_pretty(manager.messages())?;
    std::fs::write(path, json)
        .with_context(|| format!("cannot write transcript to {}", path.display()))?;
    tracing::info!(
        target: "onlinex::cli",
        path = %path.display(),
        entries = manager.messages().len(),
        "transcript written"
    );
    Ok(())
}
