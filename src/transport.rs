//! SMTP delivery: one connection per message, no pooling, no retry.

use crate::config::EmailConfig;
use crate::error::TransportError;
use crate::format::WireMessage;
use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const AUTH_MECHANISMS: &[Mechanism] = &[Mechanism::Plain, Mechanism::Login];

/// Run one SMTP step under `limit`, turning an elapsed deadline into
/// `TransportError::Timeout`.
async fn within<T, F>(step: &'static str, limit: Duration, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| {
            warn!(step, ?limit, "SMTP step timed out");
            Err(TransportError::Timeout { step, after: limit })
        })
}

/// Drop the connection, giving lettre's best-effort QUIT at most `limit`.
async fn abort_within(connection: &mut AsyncSmtpConnection, limit: Duration) {
    if tokio::time::timeout(limit, connection.abort()).await.is_err() {
        debug!("Abort timed out, dropping socket");
    }
}

/// Anything that can deliver a wire message.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &WireMessage) -> Result<(), TransportError>;
}

/// Opens sessions with the relay.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection with TLS already negotiated.
    async fn connect(&self) -> Result<Box<dyn RelaySession>, TransportError>;
}

/// An open relay connection.
#[async_trait]
pub trait RelaySession: Send {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), TransportError>;
    async fn transmit(&mut self, envelope: &Envelope, payload: &[u8]) -> Result<(), TransportError>;
    /// Close the connection. Never fails; a failed QUIT drops the socket.
    async fn disconnect(&mut self);
}

/// SMTP transport driving a [`Connector`] through connect, authenticate,
/// transmit and disconnect.
pub struct SmtpTransport {
    credentials: Credentials,
    connector: Arc<dyn Connector>,
}

impl SmtpTransport {
    /// Transport that talks to the relay described by `config`.
    #[must_use]
    pub fn new(config: &EmailConfig) -> Self {
        Self::with_connector(config, Arc::new(LettreConnector::new(config)))
    }

    /// Transport with a custom connector (alternate relays, tests).
    #[must_use]
    pub fn with_connector(config: &EmailConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            credentials: Credentials::new(config.username.clone(), config.password.clone()),
            connector,
        }
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        let rendered = message.render()?;
        let payload = rendered.formatted();
        let recipient = message.to().to_string();

        let mut session = self.connector.connect().await?;

        // Once connected, disconnect runs exactly once on every path.
        let result = exchange(
            session.as_mut(),
            &self.credentials,
            rendered.envelope(),
            &payload,
        )
        .await;
        session.disconnect().await;
        debug!("Disconnected from SMTP relay");

        match &result {
            Ok(()) => info!(recipient = %recipient, "Message accepted by relay"),
            Err(e) => error!(recipient = %recipient, "Failed to deliver message: {e}"),
        }
        result
    }
}

async fn exchange(
    session: &mut dyn RelaySession,
    credentials: &Credentials,
    envelope: &Envelope,
    payload: &[u8],
) -> Result<(), TransportError> {
    debug!("Authenticating with SMTP relay");
    session.authenticate(credentials).await?;
    debug!(bytes = payload.len(), "Transmitting message");
    session.transmit(envelope, payload).await
}

/// How the connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// TLS from the first byte (SMTPS).
    Implicit,
    /// Plain connect, then a mandatory STARTTLS upgrade.
    StartTls,
    /// No TLS at all.
    None,
}

impl Security {
    #[must_use]
    pub const fn from_config(config: &EmailConfig) -> Self {
        if config.insecure_plaintext {
            Self::None
        } else if config.use_ssl {
            Self::Implicit
        } else {
            Self::StartTls
        }
    }
}

/// Connector backed by lettre's async SMTP client.
#[derive(Debug, Clone)]
pub struct LettreConnector {
    host: String,
    port: u16,
    security: Security,
    timeout: Duration,
    hello_name: ClientId,
}

impl LettreConnector {
    #[must_use]
    pub fn new(config: &EmailConfig) -> Self {
        let hello_name = config
            .hello_name
            .clone()
            .map_or_else(ClientId::default, ClientId::Domain);
        Self {
            host: config.smtp_server.clone(),
            port: config.smtp_port,
            security: Security::from_config(config),
            timeout: config.timeout,
            hello_name,
        }
    }

    #[must_use]
    pub const fn security(&self) -> Security {
        self.security
    }

    fn connect_error(&self, source: lettre::transport::smtp::Error) -> TransportError {
        TransportError::Connect {
            host: self.host.clone(),
            port: self.port,
            source,
        }
    }

    /// TCP connect, optional TLS handshake, greeting and EHLO, all under one deadline.
    async fn open(&self, tls: Option<TlsParameters>) -> Result<AsyncSmtpConnection, TransportError> {
        within("connect", self.timeout, async {
            AsyncSmtpConnection::connect_tokio1(
                (self.host.as_str(), self.port),
                Some(self.timeout),
                &self.hello_name,
                tls,
                None,
            )
            .await
            .map_err(|e| self.connect_error(e))
        })
        .await
    }
}

#[async_trait]
impl Connector for LettreConnector {
    async fn connect(&self) -> Result<Box<dyn RelaySession>, TransportError> {
        debug!(
            host = %self.host,
            port = self.port,
            security = ?self.security,
            "Connecting to SMTP relay"
        );

        let connection = match self.security {
            Security::None => self.open(None).await?,
            Security::Implicit => {
                let tls = TlsParameters::new(self.host.clone()).map_err(|e| self.connect_error(e))?;
                self.open(Some(tls)).await?
            }
            Security::StartTls => {
                let tls = TlsParameters::new(self.host.clone()).map_err(|e| self.connect_error(e))?;
                let mut connection = self.open(None).await?;
                let upgraded = within("starttls", self.timeout, async {
                    connection
                        .starttls(tls, &self.hello_name)
                        .await
                        .map_err(|e| self.connect_error(e))
                })
                .await;
                if let Err(e) = upgraded {
                    abort_within(&mut connection, self.timeout).await;
                    return Err(e);
                }
                connection
            }
        };

        Ok(Box::new(LettreSession {
            connection,
            timeout: self.timeout,
        }))
    }
}

/// Every command exchange is bounded by `timeout`.
struct LettreSession {
    connection: AsyncSmtpConnection,
    timeout: Duration,
}

#[async_trait]
impl RelaySession for LettreSession {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), TransportError> {
        let connection = &mut self.connection;
        within("auth", self.timeout, async {
            connection
                .auth(AUTH_MECHANISMS, credentials)
                .await
                .map(|_| ())
                .map_err(TransportError::Auth)
        })
        .await
    }

    async fn transmit(&mut self, envelope: &Envelope, payload: &[u8]) -> Result<(), TransportError> {
        let connection = &mut self.connection;
        within("transmit", self.timeout, async {
            connection
                .send(envelope, payload)
                .await
                .map(|_| ())
                .map_err(TransportError::Transmit)
        })
        .await
    }

    async fn disconnect(&mut self) {
        match tokio::time::timeout(self.timeout, self.connection.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                debug!("QUIT failed, dropping connection: {e}");
                abort_within(&mut self.connection, self.timeout).await;
            }
            Err(_) => {
                debug!("QUIT timed out, dropping connection");
                abort_within(&mut self.connection, self.timeout).await;
            }
        }
    }
}
