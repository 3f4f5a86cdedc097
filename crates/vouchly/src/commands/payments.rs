//! M-Pesa payment handlers.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tabled::Tabled;
use vouchly_core::{
    PaymentRecord, PaymentStatusView, Portal, SettlementOutcome, StkCallbackEnvelope,
};

use crate::cli::{GlobalOpts, PaymentsArgs, PaymentsCommand};
use crate::error::CliError;
use crate::output::{self, paint_state, should_color};

use super::util;

// ── Rows & views ────────────────────────────────────────────────────

#[derive(Tabled)]
struct PaymentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Checkout")]
    checkout: String,
    #[tabled(rename = "Phone")]
    phone: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Tariff")]
    tariff: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Receipt")]
    receipt: String,
    #[tabled(rename = "Created")]
    created: String,
}

fn row(p: &PaymentRecord, color: bool) -> PaymentRow {
    PaymentRow {
        id: p.id.to_string(),
        checkout: p.checkout_id.clone(),
        phone: p.phone.clone(),
        amount: p.amount.to_string(),
        tariff: p.tariff_id.to_string(),
        status: paint_state(&p.status.to_string(), color),
        receipt: p.receipt.clone().unwrap_or_else(|| "-".into()),
        created: util::timestamp(p.created_at),
    }
}

fn initiated_detail(p: &PaymentRecord) -> String {
    [
        format!("Checkout:  {}", p.checkout_id),
        format!("Reference: {}", p.account_reference),
        format!("Phone:     {}", p.phone),
        format!("Amount:    {}", p.amount),
        format!("Status:    {}", p.status),
        String::new(),
        "Ask the customer to confirm the prompt on their phone.".into(),
    ]
    .join("\n")
}

fn status_detail(v: &PaymentStatusView, color: bool) -> String {
    let mut lines = vec![format!("Status:   {}", paint_state(&v.status, color))];
    if let Some(ref phone) = v.phone {
        lines.push(format!("Phone:    {phone}"));
    }
    if let Some(amount) = v.amount {
        lines.push(format!("Amount:   {amount}"));
    }
    if let Some(ref code) = v.voucher_code {
        lines.push(format!("Voucher:  {code}"));
    }
    lines.join("\n")
}

/// Serializable summary of one applied callback.
#[derive(Serialize)]
struct CallbackResult {
    outcome: &'static str,
    voucher_code: Option<String>,
}

impl From<Option<SettlementOutcome>> for CallbackResult {
    fn from(outcome: Option<SettlementOutcome>) -> Self {
        let (outcome, voucher_code) = match outcome {
            Some(SettlementOutcome::Issued(voucher)) => ("issued", Some(voucher.code.to_string())),
            Some(SettlementOutcome::Failed) => ("failed", None),
            Some(SettlementOutcome::Duplicate) => ("duplicate", None),
            Some(SettlementOutcome::Unknown) => ("unknown", None),
            None => ("ignored", None),
        };
        Self {
            outcome,
            voucher_code,
        }
    }
}

fn callback_detail(r: &CallbackResult) -> String {
    match (r.outcome, r.voucher_code.as_deref()) {
        ("issued", Some(code)) => format!("✓ Payment settled. Voucher: {code}"),
        ("failed", _) => "Payment failed or was cancelled by the payer.".into(),
        ("duplicate", _) => "Payment already settled; nothing changed.".into(),
        ("unknown", _) => "No payment with that checkout ID.".into(),
        _ => "Document carried no stkCallback; ignored.".into(),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    portal: &Portal,
    args: PaymentsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = should_color(&global.color);

    match args.command {
        PaymentsCommand::Initiate { tariff, phone } => {
            let tariff_id = util::parse_tariff_id(&tariff)?;
            let payment = portal
                .initiate_payment(tariff_id, &phone, Utc::now())
                .await?;
            let out = output::render_single(&global.output, &payment, initiated_detail, |p| {
                p.checkout_id.clone()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        PaymentsCommand::Callback { from_file } => {
            let envelope: StkCallbackEnvelope = util::read_json_input(from_file.as_deref())?;
            let result = CallbackResult::from(portal.handle_callback(&envelope, Utc::now())?);
            let out = output::render_single(&global.output, &result, callback_detail, |r| {
                r.voucher_code
                    .clone()
                    .unwrap_or_else(|| r.outcome.to_owned())
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        PaymentsCommand::Status { checkout_id } => {
            let view = portal.payment_status(&checkout_id)?;
            let out = output::render_single(
                &global.output,
                &view,
                |v| status_detail(v, color),
                |v| v.status.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        PaymentsCommand::List => {
            let mut payments: Vec<Arc<PaymentRecord>> = portal.payments();
            payments.sort_by_key(|p| p.id);
            let out = output::render_list(
                &global.output,
                &payments,
                |p| row(p, color),
                |p| p.checkout_id.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
