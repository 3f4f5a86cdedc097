//! Shared configuration for vouchly.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to `vouchly_core::PortalConfig`. Core never reads files;
//! the CLI resolves a profile here and hands the result in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use vouchly_core::{
    DarajaConfig, DarajaEnvironment, PortalConfig, RouterConfig, TlsVerification, VoucherPolicy,
};

const KEYRING_SERVICE: &str = "vouchly";

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "VOUCHLY_CONFIG";
/// Router password fallback when the profile names no variable.
pub const PASSWORD_ENV: &str = "VOUCHLY_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("no {secret} configured for profile '{profile}'")]
    NoCredentials {
        profile: String,
        secret: &'static str,
    },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named router profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}

/// A named router profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Router base URL (e.g., "https://192.168.88.1").
    pub router: String,

    /// REST API user.
    #[serde(default = "default_username")]
    pub username: String,

    /// Password (plaintext -- prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// JSON state file. Defaults to `<data dir>/<profile>.json`.
    pub state_file: Option<PathBuf>,

    #[serde(default)]
    pub vouchers: VoucherSettings,

    /// M-Pesa settings; payments are disabled without them.
    pub mpesa: Option<MpesaProfile>,
}

fn default_username() -> String {
    "admin".into()
}

impl Profile {
    pub fn new(router: impl Into<String>) -> Self {
        Self {
            router: router.into(),
            username: default_username(),
            password: None,
            password_env: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
            state_file: None,
            vouchers: VoucherSettings::default(),
            mpesa: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct VoucherSettings {
    #[serde(default = "default_code_length")]
    pub code_length: usize,

    /// Validity window for tariffs without a duration.
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
}

impl Default for VoucherSettings {
    fn default() -> Self {
        Self {
            code_length: default_code_length(),
            validity_days: default_validity_days(),
        }
    }
}

fn default_code_length() -> usize {
    VoucherPolicy::default().code_length
}
fn default_validity_days() -> u32 {
    VoucherPolicy::default().default_validity_days
}

/// Daraja app credentials for one profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MpesaProfile {
    /// "sandbox" or "production".
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Explicit API root; overrides `environment`.
    pub base_url: Option<String>,

    pub consumer_key: String,

    /// Plaintext -- prefer keyring or env var.
    pub consumer_secret: Option<String>,
    pub consumer_secret_env: Option<String>,

    /// Paybill or till number.
    pub shortcode: String,

    /// Plaintext -- prefer keyring or env var.
    pub passkey: Option<String>,
    pub passkey_env: Option<String>,

    /// Public URL Daraja POSTs STK results to.
    pub callback_url: String,
}

fn default_environment() -> String {
    "sandbox".into()
}

// ── Config file path ────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "vouchly", "vouchly")
}

/// Resolve the config file path: `$VOUCHLY_CONFIG`, else XDG / platform
/// conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    project_dirs().map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default state file for a profile.
pub fn default_state_path(profile_name: &str) -> PathBuf {
    let file = format!("{profile_name}.json");
    project_dirs().map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push(&file);
            p
        },
        |dirs| dirs.data_dir().join(&file),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("vouchly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, layered defaults -> TOML -> `VOUCHLY_` env.
///
/// Env keys nest with a double underscore: `VOUCHLY_DEFAULTS__TIMEOUT=5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(
            Env::prefixed("VOUCHLY_")
                .ignore(&["config", "password"])
                .split("__"),
        );

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile resolution ──────────────────────────────────────────────

/// Resolve the active profile name from an explicit choice and config.
pub fn active_profile_name(explicit: Option<&str>, config: &Config) -> String {
    explicit
        .map(str::to_owned)
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Command-line overrides applied on top of a profile.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub router: Option<String>,
    pub insecure: bool,
    pub timeout: Option<u64>,
    pub state_file: Option<PathBuf>,
}

/// Translate a profile + overrides into a `PortalConfig`, reading
/// secrets from the process environment and the system keyring.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    overrides: &Overrides,
) -> Result<PortalConfig, ConfigError> {
    resolve_profile_with(profile, profile_name, defaults, overrides, &|key| {
        std::env::var(key).ok()
    })
}

/// [`resolve_profile`] with a caller-supplied environment lookup.
///
/// This is the single boundary where config types cross into core types.
pub fn resolve_profile_with(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    overrides: &Overrides,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<PortalConfig, ConfigError> {
    // 1. Router URL (flag > profile)
    let url_str = overrides.router.as_deref().unwrap_or(&profile.router);
    let url = parse_url("router", url_str)?;

    // 2. Router password
    let password = resolve_secret(
        SecretKind::RouterPassword,
        profile_name,
        profile.password_env.as_deref().or(Some(PASSWORD_ENV)),
        profile.password.as_deref(),
        env,
    )?;

    // 3. TLS verification
    let tls = if overrides.insecure || profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    // 4. Timeout (flag > profile > defaults)
    let timeout = Duration::from_secs(
        overrides
            .timeout
            .or(profile.timeout)
            .unwrap_or(defaults.timeout),
    );

    // 5. Voucher policy
    let vouchers = VoucherPolicy {
        code_length: profile.vouchers.code_length,
        default_validity_days: profile.vouchers.validity_days,
        ..VoucherPolicy::default()
    };
    vouchers
        .validate()
        .map_err(|reason| invalid("vouchers", reason))?;

    // 6. M-Pesa
    let daraja = profile
        .mpesa
        .as_ref()
        .map(|mpesa| resolve_mpesa(mpesa, profile_name, timeout, env))
        .transpose()?;

    // 7. State file (flag > profile > data dir)
    let state_file = overrides
        .state_file
        .clone()
        .or_else(|| profile.state_file.clone())
        .unwrap_or_else(|| default_state_path(profile_name));

    Ok(PortalConfig {
        router: RouterConfig {
            url,
            username: profile.username.clone(),
            password,
            tls,
            timeout,
        },
        vouchers,
        daraja,
        state_file: Some(state_file),
    })
}

fn resolve_mpesa(
    mpesa: &MpesaProfile,
    profile_name: &str,
    timeout: Duration,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<DarajaConfig, ConfigError> {
    let base_url = match mpesa.base_url.as_deref() {
        Some(explicit) => parse_url("mpesa.base_url", explicit)?,
        None => parse_url(
            "mpesa.environment",
            parse_environment(&mpesa.environment)?.base_url(),
        )?,
    };

    Ok(DarajaConfig {
        base_url,
        consumer_key: mpesa.consumer_key.clone(),
        consumer_secret: resolve_secret(
            SecretKind::MpesaConsumerSecret,
            profile_name,
            mpesa.consumer_secret_env.as_deref(),
            mpesa.consumer_secret.as_deref(),
            env,
        )?,
        shortcode: mpesa.shortcode.clone(),
        passkey: resolve_secret(
            SecretKind::MpesaPasskey,
            profile_name,
            mpesa.passkey_env.as_deref(),
            mpesa.passkey.as_deref(),
            env,
        )?,
        callback_url: parse_url("mpesa.callback_url", &mpesa.callback_url)?,
        timeout,
    })
}

fn parse_environment(raw: &str) -> Result<DarajaEnvironment, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "sandbox" => Ok(DarajaEnvironment::Sandbox),
        "production" | "live" => Ok(DarajaEnvironment::Production),
        other => Err(invalid(
            "mpesa.environment",
            format!("expected 'sandbox' or 'production', got '{other}'"),
        )),
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse()
        .map_err(|_| invalid(field, format!("invalid URL: {raw}")))
}

// ── Credential helpers ──────────────────────────────────────────────

/// Secrets a profile can keep in the system keyring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    RouterPassword,
    MpesaConsumerSecret,
    MpesaPasskey,
}

impl SecretKind {
    fn label(self) -> &'static str {
        match self {
            Self::RouterPassword => "router password",
            Self::MpesaConsumerSecret => "M-Pesa consumer secret",
            Self::MpesaPasskey => "M-Pesa passkey",
        }
    }

    /// Keyring account for this secret under `profile_name`.
    pub fn keyring_account(self, profile_name: &str) -> String {
        let suffix = match self {
            Self::RouterPassword => "password",
            Self::MpesaConsumerSecret => "mpesa-consumer-secret",
            Self::MpesaPasskey => "mpesa-passkey",
        };
        format!("{profile_name}/{suffix}")
    }
}

/// Credential chain: env var -> system keyring -> plaintext in config.
fn resolve_secret(
    kind: SecretKind,
    profile_name: &str,
    env_name: Option<&str>,
    plaintext: Option<&str>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Env var
    if let Some(val) = env_name.and_then(env) {
        return Ok(SecretString::from(val));
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &kind.keyring_account(profile_name)) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(val) = plaintext {
        return Ok(SecretString::from(val.to_owned()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
        secret: kind.label(),
    })
}

/// Save a secret to the system keyring for `profile_name`.
pub fn store_secret(kind: SecretKind, profile_name: &str, value: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &kind.keyring_account(profile_name))?;
    entry.set_password(value)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn profile() -> Profile {
        Profile {
            password: Some("plain-pass".into()),
            ..Profile::new("https://192.168.88.1")
        }
    }

    #[test]
    fn toml_profile_round_trips_through_figment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_profile = "shop"

[defaults]
timeout = 5

[profiles.shop]
router = "https://10.0.0.1"
username = "api"
insecure = true

[profiles.shop.vouchers]
code_length = 14

[profiles.shop.mpesa]
consumer_key = "ck"
shortcode = "174379"
callback_url = "https://portal.example.com/mpesa/callback"
"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(active_profile_name(None, &config), "shop");
        assert_eq!(active_profile_name(Some("other"), &config), "other");
        assert_eq!(config.defaults.timeout, 5);
        assert_eq!(config.defaults.output, "table");

        let shop = &config.profiles["shop"];
        assert_eq!(shop.username, "api");
        assert_eq!(shop.vouchers.code_length, 14);
        assert_eq!(shop.vouchers.validity_days, 30);
        assert_eq!(shop.mpesa.as_ref().unwrap().environment, "sandbox");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.profiles.insert("default".into(), profile());
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.profiles["default"].router, "https://192.168.88.1");
    }

    #[test]
    fn resolves_router_settings_with_overrides() {
        let overrides = Overrides {
            timeout: Some(3),
            state_file: Some(PathBuf::from("/tmp/state.json")),
            ..Overrides::default()
        };
        let cfg =
            resolve_profile_with(&profile(), "default", &Defaults::default(), &overrides, &no_env)
                .unwrap();
        assert_eq!(cfg.router.url.as_str(), "https://192.168.88.1/");
        assert_eq!(cfg.router.username, "admin");
        assert_eq!(cfg.router.timeout, Duration::from_secs(3));
        assert_eq!(cfg.router.tls, TlsVerification::SystemDefaults);
        assert_eq!(cfg.state_file, Some(PathBuf::from("/tmp/state.json")));
        assert!(cfg.daraja.is_none());
    }

    #[test]
    fn env_password_beats_plaintext() {
        let env = |key: &str| (key == PASSWORD_ENV).then(|| "from-env".to_string());
        let cfg = resolve_profile_with(
            &profile(),
            "default",
            &Defaults::default(),
            &Overrides::default(),
            &env,
        )
        .unwrap();
        assert_eq!(cfg.router.password.expose_secret(), "from-env");
    }

    #[test]
    fn insecure_flag_and_custom_ca() {
        let with_ca = Profile {
            ca_cert: Some(PathBuf::from("/etc/ssl/router.pem")),
            ..profile()
        };
        let cfg = resolve_profile_with(
            &with_ca,
            "default",
            &Defaults::default(),
            &Overrides::default(),
            &no_env,
        )
        .unwrap();
        assert_eq!(
            cfg.router.tls,
            TlsVerification::CustomCa(PathBuf::from("/etc/ssl/router.pem"))
        );

        let insecure = Overrides {
            insecure: true,
            ..Overrides::default()
        };
        let cfg =
            resolve_profile_with(&with_ca, "default", &Defaults::default(), &insecure, &no_env)
                .unwrap();
        assert_eq!(cfg.router.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn invalid_url_and_short_codes_are_rejected() {
        let bad_url = Profile {
            router: "not a url".into(),
            ..profile()
        };
        assert!(matches!(
            resolve_profile_with(&bad_url, "default", &Defaults::default(), &Overrides::default(), &no_env),
            Err(ConfigError::Validation { .. })
        ));

        let short = Profile {
            vouchers: VoucherSettings {
                code_length: 6,
                validity_days: 30,
            },
            ..profile()
        };
        assert!(matches!(
            resolve_profile_with(&short, "default", &Defaults::default(), &Overrides::default(), &no_env),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn mpesa_settings_resolve_from_env() {
        let with_mpesa = Profile {
            mpesa: Some(MpesaProfile {
                environment: "production".into(),
                base_url: None,
                consumer_key: "ck".into(),
                consumer_secret: None,
                consumer_secret_env: Some("SHOP_CONSUMER_SECRET".into()),
                shortcode: "600000".into(),
                passkey: Some("plain-passkey".into()),
                passkey_env: None,
                callback_url: "https://portal.example.com/mpesa/callback".into(),
            }),
            ..profile()
        };
        let env = |key: &str| (key == "SHOP_CONSUMER_SECRET").then(|| "cs".to_string());
        let cfg = resolve_profile_with(
            &with_mpesa,
            "shop",
            &Defaults::default(),
            &Overrides::default(),
            &env,
        )
        .unwrap();

        let daraja = cfg.daraja.unwrap();
        assert_eq!(daraja.base_url.as_str(), "https://api.safaricom.co.ke/");
        assert_eq!(daraja.consumer_secret.expose_secret(), "cs");
        assert_eq!(daraja.passkey.expose_secret(), "plain-passkey");
        assert_eq!(daraja.shortcode, "600000");
    }

    #[test]
    fn unknown_mpesa_environment_is_rejected() {
        assert!(parse_environment("Sandbox").is_ok());
        assert!(matches!(
            parse_environment("staging"),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn keyring_accounts_are_namespaced_by_profile() {
        assert_eq!(SecretKind::RouterPassword.keyring_account("shop"), "shop/password");
        assert_eq!(
            SecretKind::MpesaPasskey.keyring_account("shop"),
            "shop/mpesa-passkey"
        );
    }
}
