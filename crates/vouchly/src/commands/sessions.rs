//! Session reconciliation handlers.

use std::sync::Arc;
use std::time::Duration;

use tabled::Tabled;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vouchly_core::{Portal, ReconcileReport, Session, VoucherCode};

use crate::cli::{GlobalOpts, SessionsArgs, SessionsCommand};
use crate::error::CliError;
use crate::output::{self, human_bytes};

use super::util;

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "Voucher")]
    voucher: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Started")]
    started: String,
    #[tabled(rename = "Ended")]
    ended: String,
    #[tabled(rename = "In")]
    bytes_in: String,
    #[tabled(rename = "Out")]
    bytes_out: String,
}

impl From<&Arc<Session>> for SessionRow {
    fn from(s: &Arc<Session>) -> Self {
        Self {
            voucher: s.voucher_code.to_string(),
            mac: s.mac.to_string(),
            ip: s.ip.map_or_else(|| "-".into(), |ip| ip.to_string()),
            started: util::timestamp(s.started_at),
            ended: util::timestamp_opt(s.ended_at),
            bytes_in: human_bytes(s.bytes_in),
            bytes_out: human_bytes(s.bytes_out),
        }
    }
}

fn summary(r: &ReconcileReport) -> String {
    format!(
        "{} live, {} new, {} updated, {} skipped, {} no longer listed",
        r.seen, r.inserted, r.updated, r.skipped, r.unseen
    )
}

pub async fn handle(
    portal: &Portal,
    args: SessionsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        SessionsCommand::Sync { watch: false, .. } => {
            let report = portal.sync_sessions().await?;
            let out = output::render_single(&global.output, &report, summary, |r| {
                r.seen.to_string()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SessionsCommand::Sync {
            watch: true,
            interval,
        } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                on_signal.cancel();
            });

            info!(interval_secs = interval, "watching sessions");
            let format = global.output.clone();
            let quiet = global.quiet;
            portal
                .watch_sessions(Duration::from_secs(interval.max(1)), cancel, |result| {
                    // Each pass has already been saved under the state lock.
                    if let Ok(report) = result {
                        let out = output::render_single(&format, report, summary, |r| {
                            r.seen.to_string()
                        });
                        output::print_output(&out, quiet);
                    }
                })
                .await;
            Ok(())
        }

        SessionsCommand::List { code } => {
            let mut sessions = match code {
                Some(code) => portal
                    .store()
                    .sessions()
                    .for_voucher(&VoucherCode::normalize(code)),
                None => portal.sessions(),
            };
            sessions.sort_by_key(|s| s.started_at);
            let out = output::render_list(
                &global.output,
                &sessions,
                |s| SessionRow::from(s),
                |s| s.key(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
