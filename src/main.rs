mod commands;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use roam::{logging, Config, Core};

#[derive(Parser, Debug)]
#[command(name = "roam")]
#[command(about = "Talk to a remote coding assistant, online or not")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/roam/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Backend base URL (overrides config)
  #[arg(long, global = true)]
  api_url: Option<String>,

  /// Also log to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Send a message to the assistant
  Chat {
    message: String,

    /// Resume an existing session
    #[arg(short, long)]
    session: Option<String>,

    /// Project directory on the server
    #[arg(short, long)]
    project: Option<String>,

    /// Wait for the reply on one request instead of creating a task
    #[arg(long)]
    sync: bool,

    /// Print the task id and return without waiting
    #[arg(long, conflicts_with = "sync")]
    no_wait: bool,
  },

  /// Show a task, optionally waiting for it to finish
  Task {
    task_id: String,

    #[arg(short, long)]
    wait: bool,
  },

  /// List tasks known to the server
  Tasks,

  /// List resumable sessions
  Sessions {
    #[arg(short, long)]
    limit: Option<u32>,

    /// Only sessions for this project
    #[arg(short, long)]
    project: Option<String>,
  },

  /// List projects with sessions
  Projects,

  /// Check the backend
  Health,

  /// Manage git provider connections
  #[command(subcommand)]
  Connections(ConnectionsCommand),

  /// Inspect or replay mutations made while offline
  #[command(subcommand)]
  Queue(QueueCommand),

  /// Store an API token for later requests
  Login {
    token: String,

    /// Seconds until the token expires
    #[arg(long)]
    expires_in: Option<i64>,
  },

  /// Forget the stored API token
  Logout,
}

#[derive(Subcommand, Debug)]
pub enum ConnectionsCommand {
  List,
  Show { id: String },
  Delete { id: String },
  Status { id: String },
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
  /// List pending mutations
  Status,
  /// Replay pending mutations now
  Flush,
  /// Drop all pending mutations
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = Config::load(args.config.as_deref())?;

  // Override API URL if specified on command line
  if let Some(url) = args.api_url {
    config.api.url = url;
  }

  let log_dir = config
    .data_dir
    .as_ref()
    .map(|d| d.join("logs"))
    .or_else(logging::default_log_dir);
  let _guard = match log_dir {
    Some(dir) => Some(logging::init(&dir, args.verbose)?),
    None => None,
  };

  let core = Core::open(config)?;
  let result = commands::run(&core, args.command).await;
  core.shutdown();
  result
}
