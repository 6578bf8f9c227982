//! Clap derive structures for the `tether` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tether -- host a tether store and drive it from the command line
#[derive(Debug, Parser)]
#[command(
    name = "tether",
    version,
    about = "Inspect and modify a tether state store from the command line",
    long_about = "Hosts the canonical store in-process, connects a mirror surface over\n\
        the sync channel and sends every change through it as a command.\n\
        State is restored from and written back to the snapshot file.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "TETHER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Snapshot file (overrides `state_path` from the config)
    #[arg(long, env = "TETHER_STATE", global = true)]
    pub state: Option<PathBuf>,

    /// Output format (defaults to `defaults.output` from the config)
    #[arg(long, short = 'o', env = "TETHER_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation for destructive operations
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

impl GlobalOpts {
    /// Fill unset output and color options from the config defaults.
    pub fn apply_defaults(&mut self, defaults: &tether_config::Defaults) {
        if self.output.is_none() {
            self.output = OutputFormat::from_str(&defaults.output, true).ok();
        }
        if self.color.is_none() {
            self.color = ColorMode::from_str(&defaults.color, true).ok();
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.output.clone().unwrap_or(OutputFormat::Table)
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color.clone().unwrap_or(ColorMode::Auto)
    }
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect or reset the persisted state
    #[command(alias = "st")]
    State(StateArgs),

    /// Manage stored items
    #[command(alias = "i")]
    Items(ItemsArgs),

    /// Read or change the document title
    Title(TitleArgs),

    /// Sign in or out with a configured account
    Auth(AuthArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── State ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StateArgs {
    #[command(subcommand)]
    pub command: StateCommand,
}

#[derive(Debug, Subcommand)]
pub enum StateCommand {
    /// Print the full state tree
    Show,

    /// Print the snapshot file location
    Path,

    /// Delete the snapshot file (requires --yes)
    Reset,
}

// ── Items ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ItemsArgs {
    #[command(subcommand)]
    pub command: ItemsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ItemsCommand {
    /// List stored items
    #[command(alias = "ls")]
    List,

    /// Show a single item
    Get {
        /// Item id
        id: String,
    },

    /// Add an item
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        url: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Change an existing item; omitted fields keep their value
    Change {
        /// Item id
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Remove an item
    #[command(alias = "rm")]
    Remove {
        /// Item id
        id: String,
    },

    /// Clear a recorded validation error
    ClearError,
}

// ── Title ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TitleArgs {
    #[command(subcommand)]
    pub command: TitleCommand,
}

#[derive(Debug, Subcommand)]
pub enum TitleCommand {
    /// Print the current title
    Get,

    /// Set the title
    Set {
        title: String,
    },
}

// ── Auth ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Sign in with an account from the config file
    SignIn {
        /// Account email
        email: String,
    },

    /// Sign out the current user
    SignOut,

    /// Print the signed-in user
    #[command(alias = "status")]
    Whoami,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a default config file
    Init {
        /// Snapshot file to record in the new config
        #[arg(long = "state-path")]
        state_path: Option<PathBuf>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration (secrets redacted)
    Show,

    /// Print the config file location
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
