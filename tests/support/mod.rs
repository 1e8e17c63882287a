//! Shared test fixtures: a recording transport and a scripted SMTP relay.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::prelude::*;
use smtp_dispatch::{EmailConfig, MailTransport, TransportError, WireMessage};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Config pointing at `addr` without TLS.
pub fn relay_config(addr: SocketAddr, username: &str, password: &str) -> EmailConfig {
    EmailConfig {
        smtp_server: addr.ip().to_string(),
        smtp_port: addr.port(),
        username: username.to_string(),
        password: password.to_string(),
        use_ssl: false,
        sender_name: "Email Service".to_string(),
        sender_email: "noreply@example.com".to_string(),
        timeout: Duration::from_secs(5),
        hello_name: Some("localhost".to_string()),
        insecure_plaintext: true,
    }
}

/// Config for tests that never reach a relay.
pub fn stub_config() -> EmailConfig {
    EmailConfig {
        sender_email: "noreply@example.com".to_string(),
        ..EmailConfig::default()
    }
}

/// Transport that records recipients and optionally fails on the n-th call (1-based).
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    fail_on: Option<usize>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(call: usize) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_on: Some(call),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.to().email.to_string());
        if Some(sent.len()) == self.fail_on {
            return Err(TransportError::Other("relay unavailable".to_string()));
        }
        Ok(())
    }
}

/// What the scripted relay observed.
#[derive(Debug, Default, Clone)]
pub struct RelayLog {
    pub messages: Vec<Vec<u8>>,
    pub auth_failures: usize,
    pub quits: usize,
    pub sessions_closed: usize,
}

/// Plain-text SMTP relay accepting PLAIN/LOGIN auth with fixed credentials.
pub struct ScriptedRelay {
    pub addr: SocketAddr,
    log: Arc<Mutex<RelayLog>>,
    handle: JoinHandle<()>,
}

impl ScriptedRelay {
    pub async fn start(username: &str, password: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(Mutex::new(RelayLog::default()));
        let credentials = Arc::new((username.to_string(), password.to_string()));

        let accept_log = Arc::clone(&log);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = Arc::clone(&accept_log);
                let credentials = Arc::clone(&credentials);
                tokio::spawn(async move {
                    let _ = handle_session(stream, &credentials, &log).await;
                    log.lock().unwrap().sessions_closed += 1;
                });
            }
        });

        Self { addr, log, handle }
    }

    pub fn log(&self) -> RelayLog {
        self.log.lock().unwrap().clone()
    }
}

impl Drop for ScriptedRelay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

enum LoginState {
    None,
    Username,
    Password(String),
}

async fn handle_session(
    stream: TcpStream,
    credentials: &(String, String),
    log: &Mutex<RelayLog>,
) -> std::io::Result<()> {
    let mut stream = BufReader::new(stream);
    stream.get_mut().write_all(b"220 localhost ESMTP scripted-relay\r\n").await?;

    let mut authenticated = false;
    let mut login = LoginState::None;
    let mut has_sender = false;
    let mut recipients = 0;
    let mut line = String::new();

    loop {
        line.clear();
        if stream.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let trimmed = line.trim();
        let cmd = trimmed.to_uppercase();

        let reply: &[u8] = match std::mem::replace(&mut login, LoginState::None) {
            LoginState::Username => {
                let user = decode(trimmed);
                login = LoginState::Password(user);
                b"334 UGFzc3dvcmQ6\r\n"
            }
            LoginState::Password(user) => {
                authenticated = user == credentials.0 && decode(trimmed) == credentials.1;
                auth_reply(authenticated, log)
            }
            LoginState::None => {
                if cmd.starts_with("EHLO") || cmd.starts_with("HELO") {
                    b"250-localhost Hello\r\n250-AUTH PLAIN LOGIN\r\n250 OK\r\n"
                } else if cmd.starts_with("AUTH PLAIN ") {
                    let decoded = BASE64_STANDARD.decode(trimmed[11..].trim()).unwrap_or_default();
                    let parts: Vec<&[u8]> = decoded.split(|&b| b == 0).collect();
                    authenticated = parts.len() >= 3
                        && parts[1] == credentials.0.as_bytes()
                        && parts[2] == credentials.1.as_bytes();
                    auth_reply(authenticated, log)
                } else if cmd.starts_with("AUTH LOGIN") {
                    login = LoginState::Username;
                    b"334 VXNlcm5hbWU6\r\n"
                } else if cmd.starts_with("MAIL FROM:") {
                    if authenticated {
                        has_sender = true;
                        b"250 OK\r\n"
                    } else {
                        b"530 Authentication required\r\n"
                    }
                } else if cmd.starts_with("RCPT TO:") {
                    if has_sender {
                        recipients += 1;
                        b"250 OK\r\n"
                    } else {
                        b"503 MAIL FROM required first\r\n"
                    }
                } else if cmd == "DATA" {
                    if recipients == 0 {
                        b"503 RCPT TO required first\r\n"
                    } else {
                        stream
                            .get_mut()
                            .write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n")
                            .await?;
                        let data = read_data(&mut stream).await?;
                        log.lock().unwrap().messages.push(data);
                        has_sender = false;
                        recipients = 0;
                        b"250 OK: queued\r\n"
                    }
                } else if cmd == "RSET" {
                    has_sender = false;
                    recipients = 0;
                    b"250 OK\r\n"
                } else if cmd == "NOOP" {
                    b"250 OK\r\n"
                } else if cmd == "QUIT" {
                    log.lock().unwrap().quits += 1;
                    stream.get_mut().write_all(b"221 Bye\r\n").await?;
                    return Ok(());
                } else {
                    b"500 Command not recognized\r\n"
                }
            }
        };

        stream.get_mut().write_all(reply).await?;
    }
}

fn auth_reply(ok: bool, log: &Mutex<RelayLog>) -> &'static [u8] {
    if ok {
        b"235 Authentication successful\r\n"
    } else {
        log.lock().unwrap().auth_failures += 1;
        b"535 Authentication failed\r\n"
    }
}

fn decode(encoded: &str) -> String {
    BASE64_STANDARD
        .decode(encoded)
        .map(|d| String::from_utf8_lossy(&d).into_owned())
        .unwrap_or_default()
}

async fn read_data(reader: &mut BufReader<TcpStream>) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 || line.trim_end() == "." {
            break;
        }
        let content = if line.starts_with("..") { &line[1..] } else { &line };
        data.extend_from_slice(content.as_bytes());
    }

    Ok(data)
}
