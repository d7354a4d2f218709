//! School portal account server.
//!
//! Serves registration, login and account management over HTTP, backed by
//! PostgreSQL or an in-process store.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use pico_args::Arguments;
use school_portal::{
    accounts::AccountManager,
    auth::{AuthManager, CredentialIssuer, TokenDenylist},
    db::{AccountRepository, Database, InMemoryAccountRepository, PgAccountRepository},
    mail::{LogMailer, Mailer, SmtpMailer},
    security::{LOGIN_ENDPOINT, RateLimiter},
};
use sp_server::{api, config::ServerConfig, logging, metrics};

const HELP: &str = "\
Run the school portal account server

USAGE:
  sp_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --in-memory              Keep accounts in process memory (no database)
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  JWT_SECRET               JWT signing secret (>= 32 chars)
  PASSWORD_PEPPER          Password hashing pepper (>= 16 chars)
  TOKEN_TTL_MINUTES        Session lifetime [default: 1440]
  SMTP_HOST, SMTP_PORT     Mail relay; mail is logged when SMTP_HOST is unset
  SMTP_USERNAME, SMTP_PASSWORD, MAIL_FROM
  QR_EMBED_PASSWORD        Put the password into registration QR codes [default: false]
  RATE_LIMIT_LOGIN_ATTEMPTS, RATE_LIMIT_LOGIN_WINDOW_SECS, RATE_LIMIT_LOGIN_LOCKOUT_SECS
                           Failed login budget [default: 5, 300, 900]
  BOOTSTRAP_CONTROLLER_USERNAME, BOOTSTRAP_CONTROLLER_EMAIL,
  BOOTSTRAP_CONTROLLER_PASSWORD, BOOTSTRAP_CONTROLLER_NAME
  METRICS_BIND             Prometheus exporter address
  RUST_LOG                 Log filter [default: info,sqlx=warn,hyper=warn]
";

/// How often expired login lockouts are swept
const LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        in_memory: pargs.contains("--in-memory"),
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url, args.in_memory)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(anyhow::Error::msg)?;
        tracing::info!(%addr, "Prometheus exporter listening");
    }

    let (accounts, database): (Arc<dyn AccountRepository>, Option<Database>) = if config.in_memory
    {
        tracing::warn!("Using the in-memory account store; accounts are lost on restart");
        (Arc::new(InMemoryAccountRepository::new()), None)
    } else {
        tracing::info!(url = %config.database.redacted_url(), "Connecting to database");
        let database = Database::new(&config.database)
            .await
            .context("Failed to connect to database")?;
        database
            .migrate()
            .await
            .context("Failed to run migrations")?;
        tracing::info!("Database connected successfully");

        let repository = PgAccountRepository::new(database.pool().clone())
            .with_query_timeout(Duration::from_secs(config.database.query_timeout_secs));
        (Arc::new(repository), Some(database))
    };

    let issuer = CredentialIssuer::new(config.security.password_pepper.clone());
    let auth_manager = AuthManager::new(
        accounts.clone(),
        issuer.clone(),
        Arc::new(TokenDenylist::new()),
        config.security.jwt_secret.clone(),
    )
    .with_token_ttl(chrono::Duration::minutes(config.security.token_ttl_minutes));

    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(mail) => {
            tracing::info!(host = %mail.smtp_host, port = mail.smtp_port, "Sending mail via SMTP");
            Arc::new(SmtpMailer::new(mail).context("Failed to configure SMTP transport")?)
        }
        None => {
            tracing::warn!("SMTP_HOST not set; outgoing mail is only logged");
            Arc::new(LogMailer::new())
        }
    };

    let account_manager = AccountManager::new(accounts, issuer, mailer)
        .with_qr_password(config.security.qr_embed_password);

    if let Some(controller) = config.bootstrap_controller.clone() {
        let username = controller.username.clone();
        if account_manager
            .ensure_controller(controller)
            .await
            .context("Failed to create bootstrap controller")?
        {
            tracing::info!(%username, "Bootstrap controller created");
        }
    }

    let login_limiter = RateLimiter::with_configs([(
        LOGIN_ENDPOINT.to_string(),
        config.login_rate_limit.clone(),
    )]);
    let sweeper = login_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sweeper.cleanup_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Swept expired login limiter entries");
            }
        }
    });

    let state = api::AppState {
        auth_manager: Arc::new(auth_manager),
        account_manager: Arc::new(account_manager),
        login_limiter,
        database: database.clone(),
    };

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    tracing::info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down server...");
    if let Some(database) = database {
        database.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}
