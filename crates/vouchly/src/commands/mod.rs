//! Command dispatch: bridges CLI args -> portal calls -> output formatting.

pub mod config_cmd;
pub mod payments;
pub mod redeem;
pub mod sessions;
pub mod tariffs;
pub mod util;
pub mod vouchers;

use vouchly_core::Portal;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a portal-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, portal: &Portal, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Tariffs(args) => tariffs::handle(portal, args, global).await,
        Command::Vouchers(args) => vouchers::handle(portal, args, global).await,
        Command::Redeem(args) => redeem::handle(portal, args, global).await,
        Command::Payments(args) => payments::handle(portal, args, global).await,
        Command::Sessions(args) => sessions::handle(portal, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}

/// Command name for logs. Arguments may carry voucher codes.
pub fn label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Tariffs(_) => "tariffs",
        Command::Vouchers(_) => "vouchers",
        Command::Redeem(_) => "redeem",
        Command::Payments(_) => "payments",
        Command::Sessions(_) => "sessions",
        Command::Config(_) => "config",
        Command::Completions(_) => "completions",
    }
}
