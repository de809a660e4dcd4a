mod link;

use std::io::Read;
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use sealnote_server::crypto::{self, Algorithm};
use sealnote_server::service::{CreatedNote, RetrievedNote};
use sealnote_server::Error;

use crate::link::NoteLink;

const MIN_PASSWORD_CHARS: usize = 8;
const MAX_PASSWORD_ATTEMPTS: usize = 3;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "sealnote", about = "Sealnote: encrypted notes that burn after reading", version)]
struct Cli {
    /// Sealnote server URL (default: http://localhost:8080 or $SEALNOTE_SERVER)
    #[arg(
        long,
        env = "SEALNOTE_SERVER",
        default_value = "http://localhost:8080",
        global = true
    )]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Sealnote HTTP server
    Serve {
        /// Port to listen on (default: $SEALNOTE_PORT or 8080)
        #[arg(long, env = "SEALNOTE_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $SEALNOTE_HOST or 0.0.0.0)
        #[arg(long, env = "SEALNOTE_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Encrypt a note locally, upload the ciphertext and print a one-time link
    Create {
        /// Note text; read from stdin when omitted
        text: Option<String>,
        /// AES-256 or RSA-2048
        #[arg(long, default_value = "AES-256")]
        algorithm: Algorithm,
        /// Expire after 24 hours instead of 72
        #[arg(long)]
        fast_expiry: bool,
        /// Add a password layer (at least 8 characters)
        #[arg(long, env = "SEALNOTE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Stored with the note as metadata; no email is sent
        #[arg(long)]
        recipient_email: Option<String>,
    },
    /// Fetch a note by its link (consuming it) and decrypt it locally
    Open {
        /// Full link including the `#key` fragment
        link: String,
        /// Password for password-protected notes; prompted for when omitted
        #[arg(long, env = "SEALNOTE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SEALNOTE_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(host, port).await,

        Commands::Create {
            text,
            algorithm,
            fast_expiry,
            password,
            recipient_email,
        } => {
            cmd_create(
                &cli.server,
                text,
                algorithm,
                fast_expiry,
                password,
                recipient_email,
            )
            .await
        }

        Commands::Open { link, password } => cmd_open(&link, password).await,
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let cfg = sealnote_server::ServerConfig {
        host,
        port,
        ..Default::default()
    };
    sealnote_server::run(cfg).await
}

async fn cmd_create(
    server: &str,
    text: Option<String>,
    algorithm: Algorithm,
    fast_expiry: bool,
    password: Option<String>,
    recipient_email: Option<String>,
) -> Result<()> {
    let plaintext = match text {
        Some(t) => t,
        None => read_stdin()?,
    };
    let password = password.filter(|p| !p.is_empty());
    if let Some(ref pw) = password {
        if pw.chars().count() < MIN_PASSWORD_CHARS {
            bail!("password must be at least {MIN_PASSWORD_CHARS} characters");
        }
    }

    // Key generation (RSA especially) is CPU-bound; keep it off the runtime.
    let sealed = tokio::task::spawn_blocking(move || {
        crypto::encrypt(&plaintext, algorithm, password.as_deref())
    })
    .await
    .context("encryption task failed")?
    .context("encrypt note")?;

    let body = serde_json::json!({
        "content": sealed.ciphertext,
        "expiresIn": if fast_expiry { 24 } else { 72 },
        "isPasswordProtected": sealed.password_protected,
        "algorithm": sealed.algorithm,
        "recipientEmail": recipient_email,
    });

    let resp = Client::new()
        .post(format!("{}/api/notes", server.trim_end_matches('/')))
        .json(&body)
        .send()
        .await
        .context("HTTP request failed")?;

    if resp.status() != StatusCode::CREATED {
        let status = resp.status();
        let json: Value = resp.json().await.unwrap_or_default();
        bail!(
            "server returned {status}: {}",
            json["error"].as_str().unwrap_or("")
        );
    }
    let created: CreatedNote = resp.json().await.context("parse response")?;

    let link = NoteLink::new(server, created.id.as_str(), sealed.key.as_str());
    println!("{link}");
    Ok(())
}

async fn cmd_open(link: &str, password: Option<String>) -> Result<()> {
    let link = NoteLink::parse(link)?;

    // Only the id goes to the server; the key stays in this process.
    let resp = Client::new()
        .get(link.api_url())
        .send()
        .await
        .context("HTTP request failed")?;

    match resp.status() {
        StatusCode::OK => {}
        StatusCode::NOT_FOUND => bail!("note not found or already accessed"),
        StatusCode::GONE => bail!("note has expired"),
        status => bail!("server returned {status}"),
    }
    let note: RetrievedNote = resp.json().await.context("parse note")?;

    let plaintext = reveal(&note, &link.key, password)?;
    println!("{plaintext}");

    for entry in &note.access_log {
        let at = UNIX_EPOCH + Duration::from_secs(entry.timestamp.max(0) as u64);
        eprintln!(
            "accessed {} from {} ({})",
            humantime::format_rfc3339_seconds(at),
            entry.ip_address,
            entry.user_agent
        );
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Decrypt a fetched note, re-prompting on a wrong password.
/// The note is already consumed server-side, so the ciphertext held here is
/// the only copy left.
fn reveal(note: &RetrievedNote, key: &str, password: Option<String>) -> Result<String> {
    let mut password = password.filter(|p| !p.is_empty());
    if note.is_password_protected && password.is_none() {
        password = Some(prompt_password()?);
    }

    let mut attempts = 1;
    loop {
        match crypto::decrypt(&note.content, key, note.algorithm, password.as_deref()) {
            Ok(plaintext) => return Ok(plaintext),
            Err(e) if e.is_retryable_password() && attempts < MAX_PASSWORD_ATTEMPTS => {
                attempts += 1;
                eprintln!("incorrect password, try again");
                password = Some(prompt_password()?);
            }
            Err(Error::IncorrectPassword) => bail!("incorrect password"),
            Err(_) => bail!("failed to decrypt note; the link may be invalid"),
        }
    }
}

fn prompt_password() -> Result<String> {
    dialoguer::Password::new()
        .with_prompt("Note password")
        .interact()
        .context("read password")
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("read note from stdin")?;
    Ok(buf.trim_end_matches(['\r', '\n']).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(text: &str, password: Option<&str>) -> (RetrievedNote, String) {
        let sealed = crypto::encrypt(text, Algorithm::Aes256, password).unwrap();
        let note = RetrievedNote {
            content: sealed.ciphertext.clone(),
            is_password_protected: sealed.password_protected,
            algorithm: sealed.algorithm,
            access_log: Vec::new(),
        };
        (note, sealed.key.as_str().to_owned())
    }

    #[test]
    fn reveal_plain_note() {
        let (note, key) = fetched("hello", None);
        assert_eq!(reveal(&note, &key, None).unwrap(), "hello");
    }

    #[test]
    fn reveal_with_password() {
        let (note, key) = fetched("hello", Some("hunter22"));
        assert_eq!(
            reveal(&note, &key, Some("hunter22".into())).unwrap(),
            "hello"
        );
    }

    #[test]
    fn bad_key_is_not_a_password_problem() {
        let (note, _key) = fetched("hello", None);
        let (_, other_key) = fetched("other", None);
        let err = reveal(&note, &other_key, None).unwrap_err();
        assert!(err.to_string().contains("link may be invalid"));
    }

    #[test]
    fn cli_parses_create() {
        let cli = Cli::try_parse_from([
            "sealnote",
            "--server",
            "http://example:1",
            "create",
            "hi",
            "--algorithm",
            "RSA-2048",
            "--fast-expiry",
        ])
        .unwrap();
        assert_eq!(cli.server, "http://example:1");
        match cli.command {
            Commands::Create {
                text,
                algorithm,
                fast_expiry,
                ..
            } => {
                assert_eq!(text.as_deref(), Some("hi"));
                assert_eq!(algorithm, Algorithm::Rsa2048);
                assert!(fast_expiry);
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn cli_rejects_unknown_algorithm() {
        assert!(Cli::try_parse_from(["sealnote", "create", "hi", "--algorithm", "DES"]).is_err());
    }
}
