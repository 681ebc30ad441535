use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;

use secure_mail::config::{GatewayConfig, GatewayMode, TransportKind};
use secure_mail::crypto::GpgEngine;
use secure_mail::error::PipelineError;
use secure_mail::keys::KeyDirectory;
use secure_mail::mail::Message;
use secure_mail::pipeline::{Encryptor, Signer};
use secure_mail::policy::{FailurePolicy, policy_from_name};
use secure_mail::store::LibSqlKeyDirectory;
use secure_mail::transport::{
    ConsoleTransport, FileTransport, SecureTransport, SmtpTransport, Transport,
};

/// Outbound mail encryption gateway backed by GnuPG.
#[derive(Debug, Parser)]
#[command(name = "secure-mail", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Commands {
    /// Run a JSON batch of messages through the gateway and deliver it.
    Send {
        /// Batch file, or `-` for stdin.
        source: String,
    },
    /// Register an address whose public key is in the keyring.
    AddAddress {
        address: String,
        /// Do not append `.asc` to encrypted attachment names.
        #[arg(long)]
        no_asc: bool,
        #[arg(long)]
        fingerprint: Option<String>,
    },
    /// Register every address on a key already in the keyring.
    ImportKeyAddresses {
        fingerprint: String,
        #[arg(long)]
        no_asc: bool,
    },
    RemoveAddress {
        address: String,
    },
    ListAddresses,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig::from_env()?;

    match cli.command {
        Commands::Send { source } => {
            let messages = read_batch(&source).await?;
            let transport = build_transport(&config).await?;
            let sent = transport.send_messages(messages).await?;
            println!("{sent}");
        }
        Commands::AddAddress {
            address,
            no_asc,
            fingerprint,
        } => {
            let dir = open_directory(&config).await?;
            dir.upsert_address(&address, !no_asc, fingerprint.as_deref())
                .await?;
            eprintln!("Added {address} (asc suffix: {})", !no_asc);
        }
        Commands::ImportKeyAddresses {
            fingerprint,
            no_asc,
        } => {
            let engine = GpgEngine::from_config(&config);
            let addresses = engine
                .addresses_for_key(&fingerprint)
                .await
                .with_context(|| format!("listing key {fingerprint}"))?;
            if addresses.is_empty() {
                bail!("no addresses found on key {fingerprint}");
            }
            let dir = open_directory(&config).await?;
            for address in &addresses {
                dir.upsert_address(address, !no_asc, Some(fingerprint.as_str()))
                    .await?;
                eprintln!("Added {address}");
            }
        }
        Commands::RemoveAddress { address } => {
            let dir = open_directory(&config).await?;
            if dir.remove_address(&address).await? {
                eprintln!("Removed {address}");
            } else {
                eprintln!("{address} was not registered");
            }
        }
        Commands::ListAddresses => {
            let dir = open_directory(&config).await?;
            for entry in dir.list_addresses().await? {
                println!(
                    "{}\t{}\t{}",
                    entry.address,
                    if entry.use_asc { "asc" } else { "-" },
                    entry.fingerprint.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}

async fn open_directory(config: &GatewayConfig) -> anyhow::Result<LibSqlKeyDirectory> {
    LibSqlKeyDirectory::new_local(&config.db_path)
        .await
        .with_context(|| format!("opening key directory at {}", config.db_path.display()))
}

/// Assemble the configured transport wrapped with the configured pre-send step.
async fn build_transport(config: &GatewayConfig) -> anyhow::Result<SecureTransport> {
    let inner: Arc<dyn Transport> = match config.transport {
        TransportKind::Console => Arc::new(ConsoleTransport::new()),
        TransportKind::File => Arc::new(FileTransport::new(&config.file_dir)?),
        TransportKind::Smtp => {
            let smtp = config
                .smtp
                .as_ref()
                .context("SMTP transport selected without SMTP_HOST")?;
            Arc::new(SmtpTransport::new(smtp)?)
        }
    };

    let engine = Arc::new(GpgEngine::from_config(config));
    let policy: Arc<dyn FailurePolicy> =
        Arc::from(policy_from_name(&config.on_failure).map_err(|e| anyhow!(e))?);

    let transport = match config.mode {
        GatewayMode::Encrypt => {
            let directory: Arc<dyn KeyDirectory> = Arc::new(open_directory(config).await?);
            let encryptor = Encryptor::new(engine, directory, policy)
                .with_options(config.encrypt_options())
                .with_fanout(config.fanout);
            SecureTransport::encrypting(inner, encryptor)
        }
        GatewayMode::Sign => {
            let key = config
                .signing_key
                .clone()
                .ok_or(PipelineError::MissingSigningKey)?;
            let signer =
                Signer::new(engine, policy, key)
                .with_options(config.encrypt_options())
                .with_failure_mode(config.signing_failures);
            SecureTransport::signing(inner, signer)
        }
    };

    tracing::info!(
        transport = transport.name(),
        gnupg = config.use_gnupg,
        "Gateway ready"
    );
    Ok(transport.enabled(config.use_gnupg))
}

async fn read_batch(source: &str) -> anyhow::Result<Vec<Message>> {
    let raw = if source == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(Path::new(source))
            .await
            .with_context(|| format!("reading {source}"))?
    };
    serde_json::from_str(&raw).context("batch must be a JSON array of messages")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Commands, clap::Error> {
        Cli::try_parse_from(std::iter::once("secure-mail").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    #[test]
    fn add_address_flags_before_or_after_the_address() {
        let expected = Commands::AddAddress {
            address: "a@x.com".into(),
            no_asc: true,
            fingerprint: None,
        };
        assert_eq!(parse(&["add-address", "--no-asc", "a@x.com"]).unwrap(), expected);
        assert_eq!(parse(&["add-address", "a@x.com", "--no-asc"]).unwrap(), expected);
    }

    #[test]
    fn add_address_with_fingerprint() {
        assert_eq!(
            parse(&["add-address", "b@x.com", "--fingerprint", "ABCD1234"]).unwrap(),
            Commands::AddAddress {
                address: "b@x.com".into(),
                no_asc: false,
                fingerprint: Some("ABCD1234".into()),
            }
        );
    }

    #[test]
    fn dangling_fingerprint_flag_is_rejected() {
        assert!(parse(&["add-address", "b@x.com", "--fingerprint"]).is_err());
    }

    #[test]
    fn flag_is_never_taken_as_the_address() {
        assert!(parse(&["add-address", "--no-asc"]).is_err());
        assert!(parse(&["remove-address"]).is_err());
    }

    #[test]
    fn remaining_subcommands() {
        assert_eq!(
            parse(&["send", "-"]).unwrap(),
            Commands::Send { source: "-".into() }
        );
        assert_eq!(
            parse(&["import-key-addresses", "0123ABCD", "--no-asc"]).unwrap(),
            Commands::ImportKeyAddresses {
                fingerprint: "0123ABCD".into(),
                no_asc: true,
            }
        );
        assert_eq!(parse(&["list-addresses"]).unwrap(), Commands::ListAddresses);
        assert!(parse(&["frobnicate"]).is_err());
    }
}
