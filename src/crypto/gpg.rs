//! `CryptoEngine` backed by the `gpg` command-line tool.
//!
//! Each operation spawns one `gpg --batch` process, pipes the plaintext on
//! stdin, and reads the machine-readable status lines (`--status-fd 2`) to
//! decide the outcome:
//! - `END_ENCRYPTION` → encryption ok
//! - `SIG_CREATED` → signature created
//! - `INV_RECP`, `NO_RECP`, `INV_SGNR`, `KEYEXPIRED`, `FAILURE`, ... → failure

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::crypto::{
    CryptResult, CryptoEngine, EncryptOptions, STATUS_ENCRYPTION_OK, STATUS_SIGNATURE_CREATED,
    TextEncoding,
};
use crate::keys::addresses_from_uids;

/// Default per-invocation timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Prefix of every line gpg writes to the status fd.
const STATUS_PREFIX: &str = "[GNUPG:] ";

/// GnuPG engine driving the `gpg` binary.
#[derive(Debug, Clone)]
pub struct GpgEngine {
    binary: PathBuf,
    home: Option<PathBuf>,
    encoding: TextEncoding,
    timeout: Duration,
}

impl GpgEngine {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("gpg"),
            home: None,
            encoding: TextEncoding::Utf8,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            binary: config.gpg_binary.clone(),
            home: config.gnupg_home.clone(),
            encoding: config.encoding,
            timeout: config.gpg_timeout,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn common_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["--batch", "--yes", "--no-tty", "--status-fd", "2"]
            .into_iter()
            .map(OsString::from)
            .collect();
        if let Some(home) = &self.home {
            args.push("--homedir".into());
            args.push(home.clone().into_os_string());
        }
        args
    }

    fn encrypt_args(&self, recipient: &str, options: &EncryptOptions) -> Vec<OsString> {
        let mut args = self.common_args();
        args.extend(["--armor", "--encrypt", "--recipient", recipient].map(OsString::from));
        if options.always_trust {
            args.extend(["--trust-model", "always"].map(OsString::from));
        }
        if let Some(key) = &options.sign_with {
            args.extend(["--sign", "--local-user", key.as_str()].map(OsString::from));
        }
        args
    }

    fn sign_args(&self, signing_key: &str, options: &EncryptOptions) -> Vec<OsString> {
        let mut args = self.common_args();
        if options.always_trust {
            args.extend(["--trust-model", "always"].map(OsString::from));
        }
        args.extend(["--armor", "--clearsign", "--local-user", signing_key].map(OsString::from));
        args
    }

    /// Run gpg with `args`, feeding `input` on stdin.
    ///
    /// The child is killed if the timeout elapses.
    async fn run(&self, args: Vec<OsString>, input: &[u8]) -> io::Result<Output> {
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("gpg stdin not captured"))?;
        let input = input.to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("gpg timed out after {:?}", self.timeout),
                )
            })??;

        if let Ok(Err(e)) = writer.await {
            debug!(error = %e, "gpg closed stdin early");
        }
        Ok(output)
    }

    /// E-mail addresses on the user ids of the key with `fingerprint`.
    pub async fn addresses_for_key(&self, fingerprint: &str) -> io::Result<Vec<String>> {
        let mut args = self.common_args();
        args.extend(["--with-colons", "--list-keys", fingerprint].map(OsString::from));
        let output = self.run(args, &[]).await?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "gpg --list-keys {fingerprint} exited with {}",
                output.status
            )));
        }
        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(addresses_from_uids(&uids_from_colons(&listing)))
    }
}

impl Default for GpgEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CryptoEngine for GpgEngine {
    async fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &str,
        options: &EncryptOptions,
    ) -> CryptResult {
        match self.run(self.encrypt_args(recipient, options), plaintext).await {
            Ok(output) => {
                let report = StatusReport::parse(&String::from_utf8_lossy(&output.stderr));
                if output.status.success() && report.encrypted {
                    CryptResult::success(STATUS_ENCRYPTION_OK, output.stdout)
                } else {
                    CryptResult::failure(report.failure_status(&output))
                }
            }
            Err(e) => {
                warn!(recipient, error = %e, "gpg encrypt could not run");
                CryptResult::failure(e.to_string())
            }
        }
    }

    async fn sign(
        &self,
        plaintext: &[u8],
        signing_key: &str,
        options: &EncryptOptions,
    ) -> CryptResult {
        match self.run(self.sign_args(signing_key, options), plaintext).await {
            Ok(output) => {
                let report = StatusReport::parse(&String::from_utf8_lossy(&output.stderr));
                if output.status.success() && report.signed {
                    CryptResult::success(STATUS_SIGNATURE_CREATED, output.stdout)
                } else {
                    CryptResult::failure(report.failure_status(&output))
                }
            }
            Err(e) => {
                warn!(signing_key, error = %e, "gpg sign could not run");
                CryptResult::failure(e.to_string())
            }
        }
    }

    fn encoding(&self) -> TextEncoding {
        self.encoding
    }
}

/// What the status fd told us about one invocation.
#[derive(Debug, Default, PartialEq, Eq)]
struct StatusReport {
    encrypted: bool,
    signed: bool,
    /// Last error-like status, as a short lowercase phrase.
    problem: Option<String>,
}

impl StatusReport {
    fn parse(stderr: &str) -> Self {
        let mut report = Self::default();
        for line in stderr.lines() {
            let Some(rest) = line.strip_prefix(STATUS_PREFIX) else {
                continue;
            };
            let mut parts = rest.splitn(2, ' ');
            let keyword = parts.next().unwrap_or_default();
            let detail = parts.next().unwrap_or_default().trim();
            match keyword {
                "END_ENCRYPTION" => report.encrypted = true,
                "SIG_CREATED" => report.signed = true,
                "INV_RECP" => report.problem = Some("invalid recipient".into()),
                "NO_RECP" => report.problem = Some("no recipients".into()),
                "INV_SGNR" => report.problem = Some("invalid signer".into()),
                "NO_SGNR" => report.problem = Some("no signer".into()),
                "KEYEXPIRED" | "EXPKEYSIG" => report.problem = Some("key expired".into()),
                "KEYREVOKED" | "REVKEYSIG" => report.problem = Some("key revoked".into()),
                "BAD_PASSPHRASE" => report.problem = Some("bad passphrase".into()),
                "MISSING_PASSPHRASE" => report.problem = Some("missing passphrase".into()),
                "FAILURE" => report.problem = Some(format!("failure: {detail}")),
                "ERROR" => report.problem = Some(format!("error: {detail}")),
                _ => {}
            }
        }
        report
    }

    fn failure_status(&self, output: &Output) -> String {
        self.problem
            .clone()
            .unwrap_or_else(|| format!("gpg exited with {}", output.status))
    }
}

/// Pull the user id strings (field 10) out of `--with-colons` output.
fn uids_from_colons(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter(|line| line.starts_with("uid:"))
        .filter_map(|line| line.split(':').nth(9))
        .map(|uid| uid.replace("\\x3a", ":"))
        .filter(|uid| !uid.is_empty())
        .collect()
}
