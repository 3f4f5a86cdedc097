//! Config subcommand handlers.

use std::collections::HashMap;

use dialoguer::{Confirm, Input, Select};
use vouchly_config::{Config, Defaults, MpesaProfile, Profile, SecretKind, store_secret};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, SecretArg};
use crate::config;
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking sensitive fields.
fn format_config_redacted(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "router = \"{}\"", p.router);
        let _ = writeln!(out, "username = \"{}\"", p.username);
        if p.password.is_some() {
            let _ = writeln!(out, "password = \"{MASK}\"");
        }
        if let Some(ref env) = p.password_env {
            let _ = writeln!(out, "password_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(ref state) = p.state_file {
            let _ = writeln!(out, "state_file = \"{}\"", state.display());
        }
        let _ = writeln!(out, "vouchers.code_length = {}", p.vouchers.code_length);
        let _ = writeln!(out, "vouchers.validity_days = {}", p.vouchers.validity_days);

        if let Some(ref m) = p.mpesa {
            let _ = writeln!(out);
            let _ = writeln!(out, "[profiles.{name}.mpesa]");
            let _ = writeln!(out, "environment = \"{}\"", m.environment);
            if let Some(ref url) = m.base_url {
                let _ = writeln!(out, "base_url = \"{url}\"");
            }
            let _ = writeln!(out, "consumer_key = \"{}\"", m.consumer_key);
            if m.consumer_secret.is_some() {
                let _ = writeln!(out, "consumer_secret = \"{MASK}\"");
            }
            let _ = writeln!(out, "shortcode = \"{}\"", m.shortcode);
            if m.passkey.is_some() {
                let _ = writeln!(out, "passkey = \"{MASK}\"");
            }
            let _ = writeln!(out, "callback_url = \"{}\"", m.callback_url);
        }
    }

    out
}

/// Copy of `cfg` with plaintext secrets masked, for structured output.
fn redacted(cfg: &Config) -> Config {
    let mask = |secret: &Option<String>| secret.as_ref().map(|_| MASK.to_owned());
    Config {
        default_profile: cfg.default_profile.clone(),
        defaults: Defaults {
            output: cfg.defaults.output.clone(),
            color: cfg.defaults.color.clone(),
            insecure: cfg.defaults.insecure,
            timeout: cfg.defaults.timeout,
        },
        profiles: cfg
            .profiles
            .iter()
            .map(|(name, p)| {
                let mut p = p.clone();
                p.password = mask(&p.password);
                if let Some(ref mut m) = p.mpesa {
                    m.consumer_secret = mask(&m.consumer_secret);
                    m.passkey = mask(&m.passkey);
                }
                (name.clone(), p)
            })
            .collect(),
    }
}

fn save_config(cfg: &Config) -> Result<(), CliError> {
    config::save_config(cfg)?;
    Ok(())
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn profile_not_found(name: String, cfg: &Config) -> CliError {
    let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
    available.sort();
    CliError::ProfileNotFound {
        name,
        available: if available.is_empty() {
            "(none)".into()
        } else {
            available.join(", ")
        },
    }
}

fn prompt_secret(label: &str) -> Result<String, CliError> {
    let secret = rpassword::prompt_password(label).map_err(prompt_err)?;
    if secret.is_empty() {
        return Err(CliError::Validation {
            field: "secret".into(),
            reason: "value cannot be empty".into(),
        });
    }
    Ok(secret)
}

/// Offer to store a secret in the system keyring or return it for plaintext config.
///
/// Returns `Some(secret)` if the user chose plaintext, `None` if stored in keyring.
fn prompt_keyring_storage(
    secret: String,
    kind: SecretKind,
    profile_name: &str,
    label: &str,
) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt(format!("Where to store the {label}?"))
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        store_secret(kind, profile_name, &secret)?;
        eprintln!("   ✓ {label} stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(secret))
    }
}

fn prompt_text(prompt: &str, default: Option<&str>) -> Result<String, CliError> {
    let mut input = Input::<String>::new().with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default.into());
    }
    input.interact_text().map_err(prompt_err)
}

fn prompt_mpesa(profile_name: &str) -> Result<MpesaProfile, CliError> {
    let environments = &["sandbox", "production"];
    let env_selection = Select::new()
        .with_prompt("Daraja environment")
        .items(environments)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    let consumer_key = prompt_text("Consumer key", None)?;
    let consumer_secret = prompt_keyring_storage(
        prompt_secret("Consumer secret: ")?,
        SecretKind::MpesaConsumerSecret,
        profile_name,
        "consumer secret",
    )?;
    let shortcode = prompt_text("Shortcode (paybill or till)", Some("174379"))?;
    let passkey = prompt_keyring_storage(
        prompt_secret("STK passkey: ")?,
        SecretKind::MpesaPasskey,
        profile_name,
        "passkey",
    )?;
    let callback_url = prompt_text("Public callback URL", None)?;

    Ok(MpesaProfile {
        environment: environments[env_selection].into(),
        base_url: None,
        consumer_key,
        consumer_secret,
        consumer_secret_env: None,
        shortcode,
        passkey,
        passkey_env: None,
        callback_url,
    })
}

fn parse_value<T: std::str::FromStr>(field: &str, value: &str, hint: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: hint.into(),
    })
}

// ── Handler ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("vouchly: configuration wizard");
            eprintln!("   Config path: {}\n", config_path.display());

            // 1. Profile name
            let profile_name = prompt_text("Profile name", Some("default"))?;

            // 2. Router URL and REST user
            let router = prompt_text("Router URL", Some("https://192.168.88.1"))?;
            let username = prompt_text("REST API user", Some("admin"))?;
            let password = prompt_keyring_storage(
                prompt_secret("Password: ")?,
                SecretKind::RouterPassword,
                &profile_name,
                "password",
            )?;

            // 3. TLS
            let insecure = Confirm::new()
                .with_prompt("Accept the router's self-signed certificate?")
                .default(true)
                .interact()
                .map_err(prompt_err)?;

            // 4. Optional M-Pesa
            let with_mpesa = Confirm::new()
                .with_prompt("Configure M-Pesa STK push payments?")
                .default(false)
                .interact()
                .map_err(prompt_err)?;
            let mpesa = if with_mpesa {
                Some(prompt_mpesa(&profile_name)?)
            } else {
                None
            };

            // 5. Build profile and config
            let profile = Profile {
                username,
                password,
                insecure: Some(insecure),
                mpesa,
                ..Profile::new(router)
            };

            let mut profiles = HashMap::new();
            profiles.insert(profile_name.clone(), profile);

            let cfg = Config {
                default_profile: Some(profile_name.clone()),
                defaults: Defaults::default(),
                profiles,
            };

            // 6. Write config
            save_config(&cfg)?;

            eprintln!("\n✓ Configuration written to {}", config_path.display());
            eprintln!("  Active profile: {profile_name}");
            eprintln!("\n  Test it: vouchly sessions sync");

            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config()?);
            let out = output::render_single(&global.output, &cfg, format_config_redacted, |_| {
                config::config_path().display().to_string()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config()?;
            let profile_name = config::active_profile_name(global, &cfg);

            let profile = cfg
                .profiles
                .entry(profile_name.clone())
                .or_insert_with(|| Profile::new(String::new()));

            match key.as_str() {
                "router" => profile.router = value,
                "username" => profile.username = value,
                "password_env" | "password-env" => profile.password_env = Some(value),
                "ca_cert" | "ca-cert" => profile.ca_cert = Some(value.into()),
                "state_file" | "state-file" => profile.state_file = Some(value.into()),
                "insecure" => {
                    profile.insecure =
                        Some(parse_value("insecure", &value, "must be 'true' or 'false'")?);
                }
                "timeout" => {
                    profile.timeout =
                        Some(parse_value("timeout", &value, "must be a number (seconds)")?);
                }
                "code_length" | "code-length" => {
                    profile.vouchers.code_length =
                        parse_value("code_length", &value, "must be a number")?;
                }
                "validity_days" | "validity-days" => {
                    profile.vouchers.validity_days =
                        parse_value("validity_days", &value, "must be a number of days")?;
                }
                other => {
                    return Err(CliError::Validation {
                        field: other.into(),
                        reason: format!(
                            "unknown config key '{other}'. Valid keys: router, username, \
                             password_env, ca_cert, insecure, timeout, state_file, \
                             code_length, validity_days"
                        ),
                    });
                }
            }

            save_config(&cfg)?;
            eprintln!("✓ Set {key} on profile '{profile_name}'");
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: vouchly config init");
            } else {
                let mut names: Vec<_> = cfg.profiles.keys().collect();
                names.sort();
                for name in names {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;
            if !cfg.profiles.contains_key(&name) {
                return Err(profile_not_found(name, &cfg));
            }

            cfg.default_profile = Some(name.clone());
            save_config(&cfg)?;
            eprintln!("✓ Default profile set to '{name}'");
            Ok(())
        }

        // ── SetPassword ─────────────────────────────────────────────
        ConfigCommand::SetPassword { profile, secret } => {
            let cfg = config::load_config()?;
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(profile_not_found(profile_name, &cfg));
            }

            let (kind, label) = match secret {
                SecretArg::Router => (SecretKind::RouterPassword, "Router password: "),
                SecretArg::MpesaConsumerSecret => {
                    (SecretKind::MpesaConsumerSecret, "Consumer secret: ")
                }
                SecretArg::MpesaPasskey => (SecretKind::MpesaPasskey, "STK passkey: "),
            };
            store_secret(kind, &profile_name, &prompt_secret(label)?)?;

            eprintln!("✓ Secret stored in system keyring for profile '{profile_name}'");
            Ok(())
        }
    }
}
