//! `paperwallet`: issue and inspect paper wallet credentials offline.
//!
//! Never prints key material. Passwords can be passed through `PAPERWALLET_PASSWORD` to keep
//! them out of shell history.

use clap::{Parser, Subcommand};
use eyre::{bail, Result, WrapErr};
use paperwallet_core::credential::{self, KdfParams, TransportPayload};
use secrecy::SecretString;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "paperwallet", version, about = "Issue and inspect paper wallet credentials")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a new credential and print its text payload.
    Generate {
        /// Encrypt the key under this password. Without it the key is stored in the clear.
        #[arg(long, env = "PAPERWALLET_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Argon2id memory cost in KiB.
        #[arg(long, default_value_t = KdfParams::default().m_cost_kib)]
        kdf_memory_kib: u32,
        /// Argon2id passes.
        #[arg(long, default_value_t = KdfParams::default().t_cost)]
        kdf_passes: u32,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Show version, kind and address of a payload without a password.
    Inspect {
        /// Text payload as printed in the QR code.
        payload: String,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Check a password against a payload and print the address it unlocks.
    Unlock {
        /// Text payload as printed in the QR code.
        payload: String,
        /// Password of an encrypted payload.
        #[arg(long, env = "PAPERWALLET_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct Summary {
    address: String,
    version: u8,
    encrypted: bool,
    fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
}

impl Summary {
    fn new(payload: &TransportPayload, text: Option<String>) -> Self {
        Self {
            address: payload.address().to_checksum(None),
            version: payload.version(),
            encrypted: payload.is_encrypted(),
            fingerprint: payload.fingerprint(),
            payload: text,
        }
    }

    fn render(&self, json: bool) -> Result<String> {
        if json {
            return serde_json::to_string_pretty(self).wrap_err("failed to serialize summary");
        }
        let mut out = format!(
            "address:     {}\nversion:     {}\nencrypted:   {}\nfingerprint: {}",
            self.address, self.version, self.encrypted, self.fingerprint
        );
        if let Some(text) = &self.payload {
            out.push_str("\npayload:     ");
            out.push_str(text);
        }
        Ok(out)
    }
}

fn parse_payload(text: &str) -> Result<TransportPayload> {
    let bytes = credential::decode_text(text)?;
    Ok(credential::decode(&bytes)?)
}

fn run(command: Command) -> Result<String> {
    match command {
        Command::Generate {
            password,
            kdf_memory_kib,
            kdf_passes,
            json,
        } => {
            let kdf = KdfParams {
                m_cost_kib: kdf_memory_kib,
                t_cost: kdf_passes,
                ..KdfParams::default()
            };
            kdf.validate().wrap_err("invalid KDF parameters")?;

            let password = password.map(SecretString::from);
            if password.is_none() {
                tracing::warn!("generating an unencrypted credential");
            }
            let payload = credential::generate_with_params(password.as_ref(), kdf)?;
            let text = credential::encode_text(&credential::encode(&payload));
            tracing::info!(address = %payload.address(), "generated credential");
            Summary::new(&payload, Some(text)).render(json)
        }
        Command::Inspect { payload, json } => {
            let payload = parse_payload(&payload)?;
            Summary::new(&payload, None).render(json)
        }
        Command::Unlock { payload, password } => {
            let payload = parse_payload(&payload)?;
            let password = password.map(SecretString::from);
            if payload.is_encrypted() && password.is_none() {
                bail!("payload is encrypted; pass --password or set PAPERWALLET_PASSWORD");
            }
            let account = payload.unlock(password.as_ref())?;
            Ok(format!("unlocked {}", account.address().to_checksum(None)))
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = run(cli.command)?;
    println!("{output}");
    Ok(())
}
