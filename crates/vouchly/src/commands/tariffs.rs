//! Tariff command handlers.

use std::sync::Arc;

use tabled::Tabled;
use tracing::warn;
use vouchly_core::{Portal, ProvisionedTariff, Tariff, TariffDraft, TariffId};

use crate::cli::{GlobalOpts, TariffsArgs, TariffsCommand};
use crate::error::CliError;
use crate::output::{self, human_bytes, human_minutes, paint_state, should_color};

use super::util;

const MIB: u64 = 1024 * 1024;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct TariffRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Data")]
    data: String,
    #[tabled(rename = "Rate (up/down)")]
    rate: String,
    #[tabled(rename = "Profile")]
    profile: String,
}

impl From<&Tariff> for TariffRow {
    fn from(t: &Tariff) -> Self {
        Self {
            id: t.id.to_string(),
            name: t.name.clone(),
            price: t.price.to_string(),
            time: t
                .duration_minutes
                .map_or_else(|| "unlimited".into(), human_minutes),
            data: t
                .data_limit_bytes
                .map_or_else(|| "unlimited".into(), human_bytes),
            rate: format!("{}k/{}k", t.upload_kbps, t.download_kbps),
            profile: t.profile_name(),
        }
    }
}

#[derive(Tabled)]
struct ProvisionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Profile")]
    profile: String,
    #[tabled(rename = "Change")]
    change: String,
}

fn detail(p: &ProvisionedTariff, color: bool) -> String {
    let t = &p.tariff;
    [
        format!("ID:       {}", t.id),
        format!("Name:     {}", t.name),
        format!("Price:    {}", t.price),
        format!(
            "Time:     {}",
            t.duration_minutes
                .map_or_else(|| "unlimited".into(), human_minutes)
        ),
        format!(
            "Data:     {}",
            t.data_limit_bytes
                .map_or_else(|| "unlimited".into(), human_bytes)
        ),
        format!("Rate:     {}", t.rate_limit()),
        format!(
            "Profile:  {} ({})",
            t.profile_name(),
            paint_state(&p.profile.to_string(), color)
        ),
    ]
    .join("\n")
}

fn data_limit(mb: Option<u64>) -> Result<Option<u64>, CliError> {
    mb.map(|mb| {
        mb.checked_mul(MIB).ok_or_else(|| CliError::Validation {
            field: "data-mb".into(),
            reason: format!("{mb} MiB is too large"),
        })
    })
    .transpose()
}

fn print_provisioned(provisioned: &ProvisionedTariff, global: &GlobalOpts) {
    let color = should_color(&global.color);
    let out = output::render_single(
        &global.output,
        provisioned,
        |p| detail(p, color),
        |p| p.tariff.id.to_string(),
    );
    output::print_output(&out, global.quiet);
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    portal: &Portal,
    args: TariffsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        TariffsCommand::List => {
            let tariffs: Vec<Arc<Tariff>> = portal.tariffs();
            let out = output::render_list(
                &global.output,
                &tariffs,
                |t| TariffRow::from(t.as_ref()),
                |t| t.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        TariffsCommand::Add {
            name,
            price,
            minutes,
            data_mb,
            up,
            down,
        } => {
            let draft = TariffDraft {
                name,
                price,
                duration_minutes: minutes,
                data_limit_bytes: data_limit(data_mb)?,
                upload_kbps: up,
                download_kbps: down,
            };
            let provisioned = portal.add_tariff(draft).await?;
            print_provisioned(&provisioned, global);
            Ok(())
        }

        TariffsCommand::Update {
            id,
            name,
            price,
            minutes,
            no_time_limit,
            data_mb,
            no_data_limit,
            up,
            down,
        } => {
            let id = util::parse_tariff_id(&id)?;
            let current = portal.tariff(id)?;

            let duration_minutes = if no_time_limit {
                None
            } else {
                minutes.or(current.duration_minutes)
            };
            let data_limit_bytes = if no_data_limit {
                None
            } else {
                data_limit(data_mb)?.or(current.data_limit_bytes)
            };
            let draft = TariffDraft {
                name: name.unwrap_or_else(|| current.name.clone()),
                price: price.unwrap_or(current.price),
                duration_minutes,
                data_limit_bytes,
                upload_kbps: up.unwrap_or(current.upload_kbps),
                download_kbps: down.unwrap_or(current.download_kbps),
            };
            let provisioned = portal.update_tariff(id, draft).await?;
            print_provisioned(&provisioned, global);
            Ok(())
        }

        TariffsCommand::Provision { id, all } => {
            let ids: Vec<TariffId> = if all {
                portal.tariffs().iter().map(|t| t.id).collect()
            } else {
                let raw = id.as_deref().unwrap_or_default();
                vec![util::parse_tariff_id(raw)?]
            };

            let mut done = Vec::with_capacity(ids.len());
            let mut last_err = None;
            for id in ids {
                match portal.provision_tariff(id).await {
                    Ok(provisioned) => done.push(provisioned),
                    Err(err) => {
                        warn!(tariff_id = %id, error = %err, "provisioning failed");
                        last_err = Some(err);
                    }
                }
            }

            let color = should_color(&global.color);
            let out = output::render_list(
                &global.output,
                &done,
                |p| ProvisionRow {
                    id: p.tariff.id.to_string(),
                    name: p.tariff.name.clone(),
                    profile: p.tariff.profile_name(),
                    change: paint_state(&p.profile.to_string(), color),
                },
                |p| p.tariff.id.to_string(),
            );
            output::print_output(&out, global.quiet);

            match last_err {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        }
    }
}
