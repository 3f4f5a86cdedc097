//! Shared helpers for command handlers.

use std::io::{IsTerminal, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use vouchly_core::TariffId;

use crate::error::CliError;

/// Parse a tariff ID argument.
pub fn parse_tariff_id(raw: &str) -> Result<TariffId, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "tariff".into(),
        reason: format!("'{raw}' is not a tariff ID (run: vouchly tariffs list)"),
    })
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal there is nobody to ask, so `--yes` becomes mandatory.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Read a JSON document from `--from-file`, or stdin when absent.
pub fn read_json_input<T: serde::de::DeserializeOwned>(path: Option<&Path>) -> Result<T, CliError> {
    let contents = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Ok(serde_json::from_str(&contents)?)
}

/// `2026-10-18 14:03`.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

pub fn timestamp_opt(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".into(), timestamp)
}
