//! Delivery Board CLI.
//!
//! # Usage
//!
//! ```bash
//! # Log in (password from -p, DELIVERY_BOARD_PASSWORD, or a prompt)
//! delivery-board login -u alice
//!
//! # Show the orders waiting for pick-up
//! delivery-board orders --bucket to-pick-up
//!
//! # Move an order along
//! delivery-board pick-up 42
//! delivery-board deliver 42 --proof ./doorstep.jpg
//! delivery-board cancel 43
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use delivery_board_lib::{
    auth, db, diagnostics,
    media::FilePicker,
    render,
    storage::{CredentialStore, KeyringStore, MemoryStore},
    Bucket, Config, DeliveryOutcome, HttpBackend, OrderBoard, SessionManager,
};

#[derive(Parser)]
#[command(name = "delivery-board")]
#[command(author, version, about = "Order board for delivery handlers")]
struct Cli {
    /// Backend base URL (overrides DELIVERY_BOARD_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Keep the session token in memory only, for this one invocation.
    /// Nothing is saved, so `--ephemeral login` does not log later
    /// commands in, and other commands run this way report "not logged
    /// in". Useful for checking credentials without touching the keyring.
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Log debug output to the console
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with a username or email
    Login {
        /// Username or email
        #[arg(short, long)]
        username: String,

        /// Password
        #[arg(short, long, env = "DELIVERY_BOARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the logged-in handler
    Whoami,
    /// List your orders in one bucket
    Orders {
        /// to-pick-up, to-ship, delivered, cancelled or completed
        #[arg(short, long, default_value = "to-pick-up")]
        bucket: Bucket,
    },
    /// Pick up a confirmed order (Confirmed -> To Ship)
    PickUp { order_id: String },
    /// Cancel an order in transit (To Ship -> Cancelled)
    Cancel { order_id: String },
    /// Mark an order delivered with a photo proof (To Ship -> Delivered)
    Deliver {
        order_id: String,

        /// Photo to upload; prompts for a path when omitted
        #[arg(long)]
        proof: Option<PathBuf>,
    },
    /// Retry deleting orphaned proof uploads
    Cleanup,
    /// List orphaned proof uploads waiting for cleanup
    Pending,
    /// Show build and local state information
    About,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    let _log_guard = diagnostics::init_logging(&config.log_dir, cli.verbose);

    if let Err(e) = run(cli, config).await {
        info!(error = %e, "command failed");
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mut config: Config) -> anyhow::Result<()> {
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }

    let store: Arc<dyn CredentialStore> = if cli.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(KeyringStore::new())
    };
    let backend = HttpBackend::new(&config.api_url, config.timeout)?;
    let ledger = db::init(&config.data_dir).context("Failed to open local database")?;
    let mut board = OrderBoard::new(backend, SessionManager::new(store), ledger);

    match cli.command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password()?,
            };
            let backend = board.backend().clone();
            let user = auth::login(&backend, board.sessions_mut(), &username, &password).await?;
            let name = user.map(|u| u.username).unwrap_or(username);
            println!("{}", render::welcome(&name));
        }
        Commands::Logout => {
            board.logout()?;
            println!("Logged out.");
        }
        Commands::Whoami => {
            let backend = board.backend().clone();
            let user = auth::whoami(&backend, board.sessions_mut()).await?;
            println!("{}", render::welcome(&user.username));
        }
        Commands::Orders { bucket } => {
            board.refresh().await?;
            board.select_bucket(bucket);
            if let Some(name) = board.username() {
                println!("{}", render::welcome(name));
            }
            println!("{}\n", render::tabs(&board.counts(), board.active_bucket()));
            print!("{}", render::order_list(&board.active_orders(), bucket));
        }
        Commands::PickUp { order_id } => {
            board.refresh().await?;
            board.pick_up(&order_id).await?;
            println!("Order {order_id} picked up.");
        }
        Commands::Cancel { order_id } => {
            board.refresh().await?;
            board.cancel(&order_id).await?;
            println!("Order {order_id} cancelled.");
        }
        Commands::Deliver { order_id, proof } => {
            board.refresh().await?;
            let picker = match proof {
                Some(path) => FilePicker::with_path(path),
                None => FilePicker::prompt(),
            };
            match board.deliver(&order_id, &picker).await? {
                DeliveryOutcome::Delivered { .. } => println!("Order {order_id} delivered."),
                DeliveryOutcome::Cancelled => println!("Image upload canceled."),
            }
        }
        Commands::Cleanup => {
            let report = board.cleanup_pending().await?;
            println!("{}", render::cleanup_summary(&report));
        }
        Commands::Pending => {
            print!("{}", render::pending_list(&board.pending_cleanup()?));
        }
        Commands::About => {
            let about = diagnostics::get_about_info();
            let health = diagnostics::get_local_health(board.ledger())?;
            println!("{}", serde_json::to_string_pretty(&about)?);
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }
    Ok(())
}

fn prompt_password() -> anyhow::Result<String> {
    let mut stderr = std::io::stderr();
    write!(stderr, "Password: ")?;
    stderr.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
