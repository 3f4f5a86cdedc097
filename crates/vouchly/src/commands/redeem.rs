//! Voucher redemption handler.

use std::net::IpAddr;

use chrono::Utc;
use vouchly_core::{MacAddress, Portal, Session};

use crate::cli::{GlobalOpts, RedeemArgs};
use crate::error::CliError;
use crate::output;

use super::util;

fn parse_mac(raw: &str) -> Result<MacAddress, CliError> {
    let mac = MacAddress::new(raw);
    let well_formed = mac.as_str().split(':').count() == 6
        && mac
            .as_str()
            .split(':')
            .all(|octet| octet.len() == 2 && octet.bytes().all(|b| b.is_ascii_hexdigit()));
    if well_formed {
        Ok(mac)
    } else {
        Err(CliError::Validation {
            field: "mac".into(),
            reason: format!("'{raw}' is not a MAC address"),
        })
    }
}

fn parse_ip(raw: &str) -> Result<IpAddr, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "ip".into(),
        reason: format!("'{raw}' is not an IP address"),
    })
}

fn detail(s: &Session) -> String {
    [
        format!("Voucher:  {}", s.voucher_code),
        format!("Device:   {}", s.mac),
        format!(
            "Address:  {}",
            s.ip.map_or_else(|| "-".into(), |ip| ip.to_string())
        ),
        format!("Started:  {}", util::timestamp(s.started_at)),
    ]
    .join("\n")
}

pub async fn handle(portal: &Portal, args: RedeemArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mac = parse_mac(&args.mac)?;
    let ip = args.ip.as_deref().map(parse_ip).transpose()?;

    let session = portal.redeem(&args.code, &mac, ip, Utc::now()).await?;
    let out = output::render_single(&global.output, &session, detail, |s| s.id.to_string());
    output::print_output(&out, global.quiet);
    Ok(())
}
