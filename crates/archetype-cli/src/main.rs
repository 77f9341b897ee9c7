mod cmd;
mod output;
mod root;

use archetype_core::user::UserId;
use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, funnel::FunnelSubcommand, user::UserSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "archetype",
    about = "Profile fields, forms, and signup funnels for a membership site",
    version,
    propagate_version = true
)]
struct Cli {
    /// Site root (default: auto-detect from archetype.yaml)
    #[arg(long, global = true, env = "ARCHETYPE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a site in the current directory
    Init {
        /// Site name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Run the HTTP server
    Serve {
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Don't open browser automatically
        #[arg(long)]
        no_open: bool,
    },

    /// List fields, optionally for one context (admin, frontend, signup)
    Fields {
        #[arg(long)]
        context: Option<String>,
    },

    /// List forms and their fields
    Forms,

    /// Manage users and their metadata
    User {
        #[command(subcommand)]
        subcommand: UserSubcommand,
    },

    /// Print a form nonce for an action
    Nonce {
        action: String,
        /// Bind the nonce to this user id
        #[arg(long)]
        user: Option<UserId>,
    },

    /// Inspect and drive signup funnels
    Funnel {
        #[command(subcommand)]
        subcommand: FunnelSubcommand,
    },

    /// Validate or show archetype.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref()),
        Commands::Serve { port, no_open } => cmd::serve::run(&root, port, no_open),
        Commands::Fields { context } => cmd::fields::run(&root, context.as_deref(), cli.json),
        Commands::Forms => cmd::fields::forms(&root, cli.json),
        Commands::User { subcommand } => cmd::user::run(&root, subcommand, cli.json),
        Commands::Nonce { action, user } => cmd::nonce::run(&root, &action, user, cli.json),
        Commands::Funnel { subcommand } => cmd::funnel::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
