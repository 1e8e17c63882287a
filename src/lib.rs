//! HTTP API that validates email requests and relays them to an SMTP server.

pub mod attachment;
pub mod config;
pub mod dispatch;
pub mod email;
mod error;
pub mod format;
pub mod http;
pub mod response;
pub mod transport;
pub mod validate;

pub use config::EmailConfig;
pub use dispatch::Dispatcher;
pub use email::{EmailAttachment, EmailMessage};
pub use error::{AttachmentError, DispatchError, Error, FormatError, Result, TransportError};
pub use format::{Formatter, Sender, WireMessage};
pub use response::ApiResponse;
pub use transport::{MailTransport, SmtpTransport};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Configuration options for the service.
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub bind: Option<IpAddr>,
    pub http_port: Option<u16>,
    /// Largest accepted request body in bytes; [`http::DEFAULT_BODY_LIMIT`] when unset.
    pub max_body_bytes: Option<usize>,
    pub email: EmailConfig,
}

/// Running server handle.
pub struct RunningService {
    pub http_addr: SocketAddr,
    http_handle: tokio::task::JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RunningService {
    /// Stop the server gracefully.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.http_handle.await;
    }
}

/// Start the service, sending through the SMTP relay in `opts.email`.
pub async fn start_service(opts: ServiceOptions) -> std::io::Result<RunningService> {
    let dispatcher = Dispatcher::from_config(&opts.email);
    serve(opts, dispatcher).await
}

/// Start the service with a custom transport in place of the SMTP relay.
pub async fn start_service_with_transport(
    opts: ServiceOptions,
    transport: Arc<dyn MailTransport>,
) -> std::io::Result<RunningService> {
    let formatter = Formatter::new(Sender::from_config(&opts.email));
    serve(opts, Dispatcher::new(formatter, transport)).await
}

async fn serve(opts: ServiceOptions, dispatcher: Dispatcher) -> std::io::Result<RunningService> {
    let bind = opts.bind.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let http_port = opts.http_port.unwrap_or(5000);
    let body_limit = opts.max_body_bytes.unwrap_or(http::DEFAULT_BODY_LIMIT);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let http_listener = TcpListener::bind((bind, http_port)).await?;
    let http_addr = http_listener.local_addr()?;

    info!(
        smtp_server = %opts.email.smtp_server,
        smtp_port = opts.email.smtp_port,
        body_limit,
        "HTTP server listening on {http_addr}, emails at /api/email/send"
    );

    let dispatcher = Arc::new(dispatcher);
    let http_shutdown = shutdown_tx.subscribe();
    let http_handle = tokio::spawn(async move {
        http::run_http_server(http_listener, dispatcher, body_limit, http_shutdown).await;
    });

    Ok(RunningService {
        http_addr,
        http_handle,
        shutdown_tx,
    })
}
