//! Voucher command handlers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;
use vouchly_core::{Portal, Voucher, VoucherState};

use crate::cli::{GlobalOpts, VouchersArgs, VouchersCommand};
use crate::error::CliError;
use crate::output::{self, paint_state, should_color};

use super::util;

// ── Views ───────────────────────────────────────────────────────────

/// A voucher with its state as of now (`expired` is derived).
#[derive(Serialize)]
struct VoucherView {
    id: u64,
    code: String,
    tariff_id: u64,
    payment_id: Option<u64>,
    state: VoucherState,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
}

impl VoucherView {
    fn at(v: &Voucher, now: DateTime<Utc>) -> Self {
        Self {
            id: v.id.0,
            code: v.code.to_string(),
            tariff_id: v.tariff_id.0,
            payment_id: v.payment_id.map(|p| p.0),
            state: v.effective_state(now),
            created_at: v.created_at,
            expires_at: v.expires_at,
            used_at: v.used_at,
        }
    }
}

#[derive(Tabled)]
struct VoucherRow {
    #[tabled(rename = "Code")]
    code: String,
    #[tabled(rename = "Tariff")]
    tariff: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Expires")]
    expires: String,
    #[tabled(rename = "Used")]
    used: String,
    #[tabled(rename = "Paid")]
    paid: String,
}

fn row(v: &VoucherView, color: bool) -> VoucherRow {
    VoucherRow {
        code: v.code.clone(),
        tariff: v.tariff_id.to_string(),
        state: paint_state(&v.state.to_string(), color),
        expires: util::timestamp(v.expires_at),
        used: util::timestamp_opt(v.used_at),
        paid: if v.payment_id.is_some() { "mpesa" } else { "-" }.into(),
    }
}

fn detail(v: &VoucherView, color: bool) -> String {
    [
        format!("Code:     {}", v.code),
        format!("Tariff:   {}", v.tariff_id),
        format!("State:    {}", paint_state(&v.state.to_string(), color)),
        format!("Created:  {}", util::timestamp(v.created_at)),
        format!("Expires:  {}", util::timestamp(v.expires_at)),
        format!("Used:     {}", util::timestamp_opt(v.used_at)),
        format!(
            "Payment:  {}",
            v.payment_id.map_or_else(|| "-".into(), |p| p.to_string())
        ),
    ]
    .join("\n")
}

fn parse_state(raw: &str) -> Result<VoucherState, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "state".into(),
        reason: format!("'{raw}' is not one of: unused, used, expired, revoked"),
    })
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    portal: &Portal,
    args: VouchersArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = should_color(&global.color);
    let now = Utc::now();

    match args.command {
        VouchersCommand::Generate { tariff, count } => {
            let tariff_id = util::parse_tariff_id(&tariff)?;
            let minted = portal.generate_vouchers(tariff_id, count, now)?;
            let views: Vec<_> = minted.iter().map(|v| VoucherView::at(v, now)).collect();
            let out = output::render_list(
                &global.output,
                &views,
                |v| row(v, color),
                |v| v.code.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        VouchersCommand::List { state, tariff } => {
            let state = state.as_deref().map(parse_state).transpose()?;
            let tariff = tariff.as_deref().map(util::parse_tariff_id).transpose()?;

            let mut views: Vec<_> = portal
                .vouchers()
                .iter()
                .filter(|v| tariff.is_none_or(|id| v.tariff_id == id))
                .map(|v| VoucherView::at(v, now))
                .filter(|v| state.is_none_or(|s| v.state == s))
                .collect();
            views.sort_by_key(|v| v.id);

            let out = output::render_list(
                &global.output,
                &views,
                |v| row(v, color),
                |v| v.code.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        VouchersCommand::Show { code } => {
            let voucher = portal.voucher(&code)?;
            let view = VoucherView::at(&voucher, now);
            let out = output::render_single(
                &global.output,
                &view,
                |v| detail(v, color),
                |v| v.state.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        VouchersCommand::Revoke { code } => {
            let voucher = portal.voucher(&code)?;
            if !util::confirm(
                &format!("Revoke voucher {} and disconnect its devices?", voucher.code),
                "vouchers revoke",
                global.yes,
            )? {
                return Ok(());
            }

            let revoked = portal.revoke(&code).await?;
            if !global.quiet {
                eprintln!("✓ Voucher {} revoked", revoked.code);
            }
            Ok(())
        }
    }
}
