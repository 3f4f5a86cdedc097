//! CLI glue over `vouchly-config`: apply global flags to the active
//! profile and produce a `PortalConfig`.

use vouchly_config::{Config, Overrides, Profile};
use vouchly_core::PortalConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use vouchly_config::{config_path, load_config, save_config};

/// Active profile name: `--profile` flag, else `default_profile`.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    vouchly_config::active_profile_name(global.profile.as_deref(), cfg)
}

fn overrides(global: &GlobalOpts) -> Overrides {
    Overrides {
        router: global.router.clone(),
        insecure: global.insecure,
        timeout: global.timeout,
        state_file: global.state_file.clone(),
    }
}

/// Build a `PortalConfig` from the config file, profile, and CLI overrides.
///
/// Without a matching profile, `--router` alone is enough: the password
/// then comes from `VOUCHLY_PASSWORD` or the keyring.
pub fn build_portal_config(global: &GlobalOpts) -> Result<PortalConfig, CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        return Ok(vouchly_config::resolve_profile(
            profile,
            &profile_name,
            &cfg.defaults,
            &overrides(global),
        )?);
    }

    if global.profile.is_some() {
        let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
        available.sort();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    }

    let router = global.router.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;
    let adhoc = Profile::new(router);
    Ok(vouchly_config::resolve_profile(
        &adhoc,
        &profile_name,
        &cfg.defaults,
        &overrides(global),
    )?)
}
