use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use issuer_gateway::auth::UnverifiedToken;
use issuer_gateway::{TenantMode, create_gateway, load_security_config};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "issuer-gateway")]
#[command(about = "Multi-tenant JWT authentication gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the public API and the tenant admin API
    Serve {
        #[arg(short, long, default_value = "8080", env = "GATEWAY_PORT")]
        port: u16,
        /// Bind address for the admin API (internal / trusted only)
        #[arg(long, default_value = "127.0.0.1:8081", env = "GATEWAY_ADMIN_BIND")]
        admin_bind: String,
        /// Tenant configuration file (defaults to GATEWAY_CONFIG or ./tenants.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the tenant mode from the configuration file
        #[arg(long, value_enum, env = "GATEWAY_MODE")]
        mode: Option<TenantMode>,
        /// Bearer token required on /admin/* requests
        #[arg(long, env = "GATEWAY_ADMIN_TOKEN", hide_env_values = true)]
        admin_token: Option<String>,
    },
    /// Print the header and unverified claims of a token
    InspectToken { token: String },
    /// Verify a token against the configured tenants, discovering its issuer
    VerifyToken {
        token: String,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

const DEFAULT_LOG_DIRECTIVE: &str = "issuer_gateway=info";

/// `RUST_LOG` when set, otherwise the gateway's own info-level logs.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    match rust_log {
        Some(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(DEFAULT_LOG_DIRECTIVE),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            admin_bind,
            config,
            mode,
            admin_token,
        } => {
            let mut security = load_security_config(config.as_deref())?;
            if let Some(mode) = mode {
                security.mode = mode;
            }
            info!(
                "Starting gateway with {} tenant(s) in {:?} mode",
                security.issuers.len(),
                security.mode
            );

            let state = create_gateway(&security, admin_token)?;
            if state.admin_token.is_none() {
                info!("No admin token configured; admin API relies on its bind address");
            }

            let public_app = issuer_gateway::create_public_router(state.clone());
            let admin_app = issuer_gateway::create_admin_router(state);

            let public_listener =
                tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
            let admin_listener = tokio::net::TcpListener::bind(&admin_bind).await?;

            info!("Public server listening on http://0.0.0.0:{}", port);
            info!("Admin server listening on http://{}", admin_bind);

            tokio::try_join!(
                axum::serve(public_listener, public_app),
                axum::serve(admin_listener, admin_app),
            )?;
        }
        Commands::InspectToken { token } => {
            let header = jsonwebtoken::decode_header(&token).context("invalid token header")?;
            let unverified = UnverifiedToken::parse(&token)?;

            println!("Header:");
            println!("  alg: {:?}", header.alg);
            if let Some(kid) = &header.kid {
                println!("  kid: {}", kid);
            }
            println!();
            println!("Claims (unverified):");
            println!("{}", serde_json::to_string_pretty(unverified.claims())?);
        }
        Commands::VerifyToken { token, config } => {
            let security = load_security_config(config.as_deref())?;
            let state = create_gateway(&security, None)?;

            let principal = state
                .resolver
                .authenticate_token(&token)
                .await
                .context("token rejected")?;

            println!("Token verified for {}", principal.display());
            println!("  Issuer: {}", principal.issuer());
            if let Some(exp) = principal.expires_at() {
                println!("  Expires: {}", exp.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!();
            println!("{}", serde_json::to_string_pretty(principal.claims())?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_defaults_to_gateway_info() {
        assert_eq!(log_filter(None).to_string(), "issuer_gateway=info");
        assert_eq!(log_filter(Some("  ")).to_string(), "issuer_gateway=info");
    }

    #[test]
    fn test_log_filter_honours_rust_log() {
        let filter = log_filter(Some("issuer_gateway=debug")).to_string();
        assert!(filter.contains("issuer_gateway=debug"), "{filter}");
        assert!(!filter.contains("issuer_gateway=info"), "{filter}");
    }
}
