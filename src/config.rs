//! Configuration types.
//!
//! Everything is read from environment variables. `from_lookup` takes any
//! key → value source so tests never touch the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::crypto::{EncryptOptions, TextEncoding};
use crate::error::ConfigError;
use crate::pipeline::{FanoutMode, SigningFailureMode};

/// Which pre-send transform the gateway applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GatewayMode {
    #[default]
    Encrypt,
    Sign,
}

impl FromStr for GatewayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "encrypt" => Ok(Self::Encrypt),
            "sign" => Ok(Self::Sign),
            other => Err(format!("expected 'encrypt' or 'sign', got '{other}'")),
        }
    }
}

/// Which backend delivers finished messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportKind {
    #[default]
    Console,
    File,
    Smtp,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "file" => Ok(Self::File),
            "smtp" => Ok(Self::Smtp),
            other => Err(format!("expected console, file or smtp, got '{other}'")),
        }
    }
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

/// Process-wide gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Master switch for the encrypt/sign hooks.
    pub use_gnupg: bool,
    pub always_trust: bool,
    /// Key used for signing, and for sign-while-encrypting.
    pub signing_key: Option<String>,
    pub gnupg_home: Option<PathBuf>,
    pub encoding: TextEncoding,
    pub gpg_binary: PathBuf,
    pub gpg_timeout: Duration,
    pub fanout: FanoutMode,
    pub signing_failures: SigningFailureMode,
    /// `abort`, or a recovery name understood by [`crate::policy::Recovery`].
    pub on_failure: String,
    pub mode: GatewayMode,
    pub db_path: PathBuf,
    pub transport: TransportKind,
    pub file_dir: PathBuf,
    pub smtp: Option<SmtpConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            use_gnupg: true,
            always_trust: false,
            signing_key: None,
            gnupg_home: None,
            encoding: TextEncoding::Utf8,
            gpg_binary: PathBuf::from("gpg"),
            gpg_timeout: Duration::from_secs(60),
            fanout: FanoutMode::PerRecipient,
            signing_failures: SigningFailureMode::Strict,
            on_failure: "abort".to_string(),
            mode: GatewayMode::Encrypt,
            db_path: PathBuf::from("./data/secure-mail.db"),
            transport: TransportKind::Console,
            file_dir: PathBuf::from("./outbox"),
            smtp: None,
        }
    }
}

impl GatewayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let use_gnupg = parse_or(&var, "SECURE_MAIL_USE_GNUPG", defaults.use_gnupg, parse_bool)?;
        let always_trust = parse_or(
            &var,
            "SECURE_MAIL_ALWAYS_TRUST",
            defaults.always_trust,
            parse_bool,
        )?;
        let encoding = parse_or(&var, "SECURE_MAIL_GNUPG_ENCODING", defaults.encoding, |s| {
            s.parse()
        })?;
        let gpg_timeout = parse_or(
            &var,
            "SECURE_MAIL_GPG_TIMEOUT_SECS",
            defaults.gpg_timeout,
            |s| {
                s.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| e.to_string())
            },
        )?;
        let fanout = parse_or(&var, "SECURE_MAIL_FANOUT", defaults.fanout, |s| s.parse())?;
        let signing_failures = parse_or(
            &var,
            "SECURE_MAIL_SIGNING_FAILURES",
            defaults.signing_failures,
            |s| s.parse(),
        )?;
        let mode = parse_or(&var, "SECURE_MAIL_MODE", defaults.mode, |s| s.parse())?;
        let transport = parse_or(&var, "SECURE_MAIL_TRANSPORT", defaults.transport, |s| {
            s.parse()
        })?;

        let on_failure = var("SECURE_MAIL_ON_FAILURE").unwrap_or(defaults.on_failure);
        crate::policy::policy_from_name(&on_failure).map_err(|message| {
            ConfigError::InvalidValue {
                key: "SECURE_MAIL_ON_FAILURE".into(),
                message,
            }
        })?;

        let smtp = match var("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(&var, "SMTP_PORT", 587, |s| {
                    s.parse::<u16>().map_err(|e| e.to_string())
                })?,
                username: var("SMTP_USERNAME").unwrap_or_default(),
                password: SecretString::from(var("SMTP_PASSWORD").unwrap_or_default()),
            }),
            None => None,
        };
        if transport == TransportKind::Smtp && smtp.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "SMTP_HOST".into(),
                hint: "Set SMTP_HOST when SECURE_MAIL_TRANSPORT=smtp".into(),
            });
        }

        Ok(Self {
            use_gnupg,
            always_trust,
            signing_key: var("SECURE_MAIL_SIGNING_KEY"),
            gnupg_home: var("SECURE_MAIL_GNUPG_HOME").map(PathBuf::from),
            encoding,
            gpg_binary: var("SECURE_MAIL_GPG_BINARY")
                .map(PathBuf::from)
                .unwrap_or(defaults.gpg_binary),
            gpg_timeout,
            fanout,
            signing_failures,
            on_failure,
            mode,
            db_path: var("SECURE_MAIL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            transport,
            file_dir: var("SECURE_MAIL_FILE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_dir),
            smtp,
        })
    }

    /// Options passed to every encrypt call.
    pub fn encrypt_options(&self) -> EncryptOptions {
        EncryptOptions {
            always_trust: self.always_trust,
            sign_with: self.signing_key.clone(),
        }
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}

fn parse_or<T, V, P>(var: &V, key: &str, default: T, parse: P) -> Result<T, ConfigError>
where
    V: Fn(&str) -> Option<String>,
    P: FnOnce(&str) -> Result<T, String>,
{
    match var(key) {
        Some(raw) => parse(&raw).map_err(|message| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        }),
        None => Ok(default),
    }
}
