//! CLI entry point for smtp-dispatch.

use clap::Parser;
use smtp_dispatch::{start_service, EmailConfig, ServiceOptions};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "smtp-dispatch")]
#[command(about = "Accept email requests over HTTP and relay them to an SMTP server")]
struct Cli {
    /// Address to bind the HTTP server to
    #[arg(short = 'b', long, env = "EMAIL_SERVICE_BIND", default_value = "127.0.0.1")]
    bind: IpAddr,

    /// HTTP port to listen on
    #[arg(short = 'p', long, env = "EMAIL_SERVICE_PORT", default_value = "5000")]
    port: u16,

    /// Largest accepted request body in bytes
    #[arg(long, env = "EMAIL_SERVICE_MAX_BODY_BYTES", default_value_t = smtp_dispatch::http::DEFAULT_BODY_LIMIT)]
    max_body_bytes: usize,

    /// TOML settings file with an [email] table
    #[arg(short = 'c', long, env = "EMAIL_SERVICE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let email = match EmailConfig::load(cli.config.as_deref()) {
        Ok(email) => email,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return Err(smtp_dispatch::Error::from(e).into());
        }
    };
    info!(
        smtp_server = %email.smtp_server,
        smtp_port = email.smtp_port,
        use_ssl = email.use_ssl,
        sender = %email.sender_email,
        "Starting email service"
    );

    let opts = ServiceOptions {
        bind: Some(cli.bind),
        http_port: Some(cli.port),
        max_body_bytes: Some(cli.max_body_bytes),
        email,
    };

    let service = start_service(opts).await?;

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    service.stop().await;
    info!("Email service stopped");

    Ok(())
}
