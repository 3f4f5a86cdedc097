//! Clap derive structures for the `vouchly` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vouchly -- operator CLI for a MikroTik hotspot voucher portal
#[derive(Debug, Parser)]
#[command(
    name = "vouchly",
    version,
    about = "Manage hotspot tariffs, vouchers and sessions on a MikroTik router",
    long_about = "Operator tool for a voucher-gated MikroTik hotspot.\n\n\
        Provisions tariff profiles over the RouterOS REST API, mints and\n\
        redeems vouchers, reconciles live sessions, and settles M-Pesa\n\
        STK push payments.",
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
    /// Router profile to use
    #[arg(long, short = 'p', env = "VOUCHLY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Router URL (overrides profile)
    #[arg(long, short = 'r', env = "VOUCHLY_ROUTER", global = true)]
    pub router: Option<String>,

    /// State file (overrides profile)
    #[arg(long, env = "VOUCHLY_STATE_FILE", global = true)]
    pub state_file: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "VOUCHLY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "VOUCHLY_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "VOUCHLY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
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

#[derive(Debug, Clone, ValueEnum)]
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
    /// Manage tariffs and their router profiles
    #[command(alias = "t")]
    Tariffs(TariffsArgs),

    /// Generate, inspect and revoke vouchers
    #[command(alias = "v")]
    Vouchers(VouchersArgs),

    /// Redeem a voucher for a device
    Redeem(RedeemArgs),

    /// M-Pesa payments
    #[command(alias = "pay")]
    Payments(PaymentsArgs),

    /// Reconcile and list hotspot sessions
    #[command(alias = "s")]
    Sessions(SessionsArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  TARIFFS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct TariffsArgs {
    #[command(subcommand)]
    pub command: TariffsCommand,
}

#[derive(Debug, Subcommand)]
pub enum TariffsCommand {
    /// List tariffs
    #[command(alias = "ls")]
    List,

    /// Create a tariff and its router profile
    Add {
        /// Display name
        #[arg(long)]
        name: String,

        /// Price in whole currency units
        #[arg(long)]
        price: u64,

        /// Session time limit in minutes (omit for unlimited)
        #[arg(long)]
        minutes: Option<u32>,

        /// Data cap in MiB (omit for unlimited)
        #[arg(long)]
        data_mb: Option<u64>,

        /// Upload rate limit in kbps
        #[arg(long)]
        up: u32,

        /// Download rate limit in kbps
        #[arg(long)]
        down: u32,
    },

    /// Edit a tariff and re-provision its router profile
    Update {
        /// Tariff ID
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        price: Option<u64>,

        /// Session time limit in minutes
        #[arg(long, conflicts_with = "no_time_limit")]
        minutes: Option<u32>,

        /// Remove the time limit
        #[arg(long)]
        no_time_limit: bool,

        /// Data cap in MiB
        #[arg(long, conflicts_with = "no_data_limit")]
        data_mb: Option<u64>,

        /// Remove the data cap
        #[arg(long)]
        no_data_limit: bool,

        /// Upload rate limit in kbps
        #[arg(long)]
        up: Option<u32>,

        /// Download rate limit in kbps
        #[arg(long)]
        down: Option<u32>,
    },

    /// Ensure router profiles exist and match their tariffs
    Provision {
        /// Tariff ID
        #[arg(required_unless_present = "all")]
        id: Option<String>,

        /// Provision every tariff
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VOUCHERS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct VouchersArgs {
    #[command(subcommand)]
    pub command: VouchersCommand,
}

#[derive(Debug, Subcommand)]
pub enum VouchersCommand {
    /// Mint unpaid vouchers for printing
    #[command(alias = "gen")]
    Generate {
        /// Tariff ID
        #[arg(long, short = 't')]
        tariff: String,

        /// Number of vouchers (1-100)
        #[arg(long, short = 'n', default_value = "1")]
        count: usize,
    },

    /// List vouchers
    #[command(alias = "ls")]
    List {
        /// Only vouchers in this state (unused, used, expired, revoked)
        #[arg(long)]
        state: Option<String>,

        /// Only vouchers for this tariff ID
        #[arg(long)]
        tariff: Option<String>,
    },

    /// Show one voucher
    Show {
        /// Voucher code
        code: String,
    },

    /// Withdraw a voucher and remove it from the router
    Revoke {
        /// Voucher code
        code: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  REDEEM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RedeemArgs {
    /// Voucher code (case-insensitive)
    pub code: String,

    /// Device MAC address
    #[arg(long, short = 'm')]
    pub mac: String,

    /// Device IP address on the hotspot network
    #[arg(long)]
    pub ip: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PAYMENTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct PaymentsArgs {
    #[command(subcommand)]
    pub command: PaymentsCommand,
}

#[derive(Debug, Subcommand)]
pub enum PaymentsCommand {
    /// Send an STK push prompt to a phone
    Initiate {
        /// Tariff ID
        #[arg(long, short = 't')]
        tariff: String,

        /// Payer phone (2547XXXXXXXX or 2541XXXXXXXX)
        #[arg(long)]
        phone: String,
    },

    /// Apply a Daraja STK callback document
    Callback {
        /// JSON file (reads stdin when omitted)
        #[arg(long, short = 'F')]
        from_file: Option<PathBuf>,
    },

    /// Poll a payment by checkout ID
    Status {
        /// Daraja CheckoutRequestID
        checkout_id: String,
    },

    /// List payments
    #[command(alias = "ls")]
    List,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SESSIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SessionsArgs {
    #[command(subcommand)]
    pub command: SessionsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SessionsCommand {
    /// Pull the router's active list into local session records
    Sync {
        /// Keep reconciling until interrupted
        #[arg(long, short = 'w')]
        watch: bool,

        /// Seconds between passes in watch mode
        #[arg(long, default_value = "60", requires = "watch")]
        interval: u64,
    },

    /// List recorded sessions
    #[command(alias = "ls")]
    List {
        /// Only sessions for this voucher code
        #[arg(long)]
        code: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current configuration (secrets masked)
    Show,

    /// Set a profile value
    Set {
        /// Key (router, username, password_env, ca_cert, insecure, timeout,
        /// state_file, code_length, validity_days)
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a secret in the system keyring
    SetPassword {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,

        /// Which secret to store
        #[arg(long, value_enum, default_value = "router")]
        secret: SecretArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SecretArg {
    /// Router REST API password
    Router,
    /// Daraja consumer secret
    MpesaConsumerSecret,
    /// Daraja STK passkey
    MpesaPasskey,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
