//! Line-oriented TCP/TLS session transport.
//!
//! Speaks newline-delimited JSON with a session gateway. Each
//! [`LineTransport::open`] spawns one task that owns the socket, reports
//! progress as [`SessionEvent`]s and executes commands queued through the
//! returned [`LineSession`].
//!
//! ## Wire format
//!
//! Client to server, one JSON object per line:
//!
//! ```text
//! {"op":"login","username":"bot","version":"1.21.11"}
//! {"op":"chat","text":"hello"}
//! {"op":"quit"}
//! ```
//!
//! Server to client:
//!
//! ```text
//! {"event":"login"}
//! {"event":"spawn"}
//! {"event":"message","text":"<alex> hi"}
//! {"event":"kick","reason":{"translate":"multiplayer.disconnect.kicked"}}
//! {"event":"error","message":"bad packet"}
//! ```
//!
//! Unknown events are ignored. A session always finishes with exactly one
//! `Ended` event, preceded by `Error` when it failed.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::event::{Event, EventSender, SessionEvent, SessionId};
use crate::transport::{ConnectError, ConnectTarget, SessionHandle, Transport};

/// Queued commands per session before new ones are dropped.
const COMMAND_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Inbound {
    Login,
    Spawn,
    Message {
        text: String,
    },
    Kick {
        #[serde(default)]
        reason: serde_json::Value,
    },
    Error {
        message: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Outbound<'a> {
    Login { username: &'a str, version: &'a str },
    Chat { text: &'a str },
    Quit,
}

impl Outbound<'_> {
    fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug)]
enum Command {
    Chat(String),
    Quit,
    ForceEnd(String),
}

/// Opens [`LineSession`]s. Must be used from within a tokio runtime.
#[derive(Debug, Default, Clone)]
pub struct LineTransport;

impl LineTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for LineTransport {
    type Session = LineSession;

    fn open(
        &mut self,
        target: &ConnectTarget,
        id: SessionId,
        events: EventSender,
    ) -> Result<LineSession, ConnectError> {
        if target.host.trim().is_empty() || target.port == 0 {
            return Err(ConnectError::InvalidAddress(target.addr()));
        }
        if target.tls {
            rustls::pki_types::ServerName::try_from(target.host.clone())
                .map_err(|_| ConnectError::InvalidServerName(target.host.clone()))?;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ConnectError::Unavailable("no async runtime".to_string()));
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let target = target.clone();
        tokio::spawn(async move {
            run_session(target, id, events, cmd_rx).await;
        });

        Ok(LineSession { id, cmd_tx })
    }
}

/// Handle to one running line session.
#[derive(Debug, Clone)]
pub struct LineSession {
    id: SessionId,
    cmd_tx: mpsc::Sender<Command>,
}

impl LineSession {
    fn enqueue(&self, command: Command) {
        if let Err(e) = self.cmd_tx.try_send(command) {
            tracing::debug!(session = %self.id, error = %e, "Session command dropped");
        }
    }
}

impl SessionHandle for LineSession {
    fn send(&self, text: &str) {
        self.enqueue(Command::Chat(text.to_string()));
    }

    fn quit(&self) {
        self.enqueue(Command::Quit);
    }

    fn force_end(&self, reason: &str) {
        self.enqueue(Command::ForceEnd(reason.to_string()));
    }
}

async fn run_session(
    target: ConnectTarget,
    id: SessionId,
    events: EventSender,
    cmd_rx: mpsc::Receiver<Command>,
) {
    let reason = match drive(&target, id, &events, cmd_rx).await {
        Ok(reason) => reason,
        Err(e) => {
            let message = format!("{e:#}");
            tracing::debug!(session = %id, error = %message, "Session failed");
            let _ = events
                .send(Event::session(id, SessionEvent::Error { message: message.clone() }))
                .await;
            message
        }
    };
    let _ = events
        .send(Event::session(id, SessionEvent::Ended { reason }))
        .await;
}

async fn drive(
    target: &ConnectTarget,
    id: SessionId,
    events: &EventSender,
    cmd_rx: mpsc::Receiver<Command>,
) -> Result<String> {
    match establish_connection(target).await? {
        EstablishedConnection::Plain(tcp) => {
            let (reader, writer) = tokio::io::split(tcp);
            run_lines(BufReader::new(reader), writer, target, id, events, cmd_rx).await
        }
        EstablishedConnection::Tls(tls) => {
            let (reader, writer) = tokio::io::split(tls);
            run_lines(BufReader::new(reader), writer, target, id, events, cmd_rx).await
        }
    }
}

/// A connection that has completed TCP (and optionally TLS) but has not
/// logged in yet.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

/// Establish the TCP (and optionally TLS) connection for `target`.
pub async fn establish_connection(target: &ConnectTarget) -> Result<EstablishedConnection> {
    let addr = target.addr();
    let mode = if target.tls { "TLS" } else { "plain" };

    tracing::debug!("Resolving {addr}...");
    let tcp = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("TCP connect to {addr} failed"))?;
    tcp.set_nodelay(true).ok();
    tracing::debug!("TCP connected to {addr} ({mode})");

    if !target.tls {
        return Ok(EstablishedConnection::Plain(tcp));
    }

    let tls_config = if target.tls_insecure {
        tracing::debug!("TLS: insecure mode (skipping cert verification)");
        rustls_insecure_config()
    } else {
        rustls_default_config()
    };
    let connector = TlsConnector::from(Arc::new(tls_config));
    let dns_name = rustls::pki_types::ServerName::try_from(target.host.clone())
        .with_context(|| format!("invalid TLS server name {:?}", target.host))?;
    let tls_stream = connector
        .connect(dns_name, tcp)
        .await
        .with_context(|| format!("TLS handshake with {addr} failed"))?;
    tracing::debug!("TLS handshake complete");
    Ok(EstablishedConnection::Tls(tls_stream))
}

/// Run the login exchange and the read/command loop. Returns the reason the
/// session ended cleanly; I/O and protocol failures are errors.
async fn run_lines<R, W>(
    mut reader: R,
    mut writer: W,
    target: &ConnectTarget,
    id: SessionId,
    events: &EventSender,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<String>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let login = Outbound::Login {
        username: &target.username,
        version: &target.version,
    };
    writer.write_all(login.to_line()?.as_bytes()).await?;
    writer.flush().await?;

    let mut line_buf = String::new();
    let mut last_activity = tokio::time::Instant::now();

    loop {
        let idle_deadline = last_activity + target.idle_timeout;
        tokio::select! {
            result = reader.read_line(&mut line_buf) => {
                let n = result.context("read failed")?;
                if n == 0 {
                    return Ok("connection closed".to_string());
                }
                last_activity = tokio::time::Instant::now();

                let raw = line_buf.trim();
                if !raw.is_empty() {
                    match serde_json::from_str::<Inbound>(raw) {
                        Ok(inbound) => {
                            if let Some(event) = translate(inbound) {
                                if events.send(Event::session(id, event)).await.is_err() {
                                    return Ok("supervisor gone".to_string());
                                }
                            }
                        }
                        Err(e) => {
                            tracing::debug!(session = %id, error = %e, line = raw, "Ignoring malformed line");
                        }
                    }
                }
                line_buf.clear();
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Chat(text)) => {
                        let line = Outbound::Chat { text: &text }.to_line()?;
                        writer.write_all(line.as_bytes()).await?;
                        writer.flush().await?;
                    }
                    Some(Command::Quit) => {
                        writer.write_all(Outbound::Quit.to_line()?.as_bytes()).await?;
                        let _ = writer.shutdown().await;
                        return Ok("quit".to_string());
                    }
                    Some(Command::ForceEnd(reason)) => {
                        return Ok(reason);
                    }
                    None => {
                        let _ = writer.shutdown().await;
                        return Ok("session handle dropped".to_string());
                    }
                }
            }
            _ = tokio::time::sleep_until(idle_deadline) => {
                anyhow::bail!(
                    "no traffic from server for {}s",
                    target.idle_timeout.as_secs()
                );
            }
        }
    }
}

fn translate(inbound: Inbound) -> Option<SessionEvent> {
    match inbound {
        Inbound::Login => Some(SessionEvent::LoggedIn),
        Inbound::Spawn => Some(SessionEvent::Spawned),
        Inbound::Message { text } => Some(SessionEvent::Message { text }),
        Inbound::Kick { reason } => Some(SessionEvent::Kicked { reason }),
        Inbound::Error { message } => Some(SessionEvent::Error { message }),
        Inbound::Unknown => None,
    }
}

fn install_crypto_provider() {
    // ring is preferred when both are enabled; aws-lc-rs is the default.
    #[cfg(feature = "ring")]
    {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
    #[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
    {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}

fn rustls_default_config() -> rustls::ClientConfig {
    install_crypto_provider();

    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

fn rustls_insecure_config() -> rustls::ClientConfig {
    install_crypto_provider();
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
        .with_no_client_auth()
}

#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|p| p.signature_verification_algorithms.supported_schemes())
            .unwrap_or_default()
    }
}
