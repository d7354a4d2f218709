//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use school_portal::{
    auth::{DEFAULT_TOKEN_TTL_MINUTES, NewController},
    db::DatabaseConfig,
    mail::MailConfig,
    security::{
        DEFAULT_LOGIN_ATTEMPTS, DEFAULT_LOGIN_LOCKOUT_SECS, DEFAULT_LOGIN_WINDOW_SECS,
        RateLimitConfig,
    },
};
use std::net::SocketAddr;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_SMTP_PORT: u16 = 587;
/// One year
const MAX_TOKEN_TTL_MINUTES: i64 = 525_600;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Keep accounts in process memory instead of PostgreSQL
    pub in_memory: bool,
    /// Security configuration
    pub security: SecurityConfig,
    /// Failed password login budget per role and identifier
    pub login_rate_limit: RateLimitConfig,
    /// SMTP relay; mail is only logged when absent
    pub mail: Option<MailConfig>,
    /// Controller account created at startup if missing
    pub bootstrap_controller: Option<NewController>,
    /// Prometheus exporter address; metrics are disabled when absent
    pub metrics_bind: Option<SocketAddr>,
}

/// Security-related configuration
#[derive(Clone)]
pub struct SecurityConfig {
    /// JWT signing secret (required)
    pub jwt_secret: String,
    /// Password hashing pepper (required)
    pub password_pepper: String,
    /// Session lifetime in minutes
    pub token_ttl_minutes: i64,
    /// Embed plaintext passwords in registration QR codes
    pub qr_embed_password: bool,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("jwt_secret", &"***")
            .field("password_pepper", &"***")
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .field("qr_embed_password", &self.qr_embed_password)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `in_memory` - Use the in-memory account store (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        in_memory: bool,
    ) -> Result<Self, ConfigError> {
        Self::from_source(
            &|key: &str| std::env::var(key).ok(),
            bind_override,
            database_url_override,
            in_memory,
        )
    }

    fn from_source(
        vars: &dyn Fn(&str) -> Option<String>,
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        in_memory: bool,
    ) -> Result<Self, ConfigError> {
        // Bind address
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_addr(
                "SERVER_BIND",
                &vars("SERVER_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            )?,
        };

        // Database configuration
        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override.or_else(|| vars("DATABASE_URL")) {
            database.database_url = url;
        }

        // Security configuration (REQUIRED)
        let jwt_secret = vars("JWT_SECRET").ok_or_else(|| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        let password_pepper =
            vars("PASSWORD_PEPPER").ok_or_else(|| ConfigError::MissingRequired {
                var: "PASSWORD_PEPPER".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        let security = SecurityConfig {
            jwt_secret,
            password_pepper,
            token_ttl_minutes: parse_or(vars, "TOKEN_TTL_MINUTES", DEFAULT_TOKEN_TTL_MINUTES),
            qr_embed_password: parse_or(vars, "QR_EMBED_PASSWORD", false),
        };

        let login_rate_limit = RateLimitConfig {
            max_attempts: parse_or(vars, "RATE_LIMIT_LOGIN_ATTEMPTS", DEFAULT_LOGIN_ATTEMPTS),
            window_secs: parse_or(vars, "RATE_LIMIT_LOGIN_WINDOW_SECS", DEFAULT_LOGIN_WINDOW_SECS),
            lockout_secs: parse_or(
                vars,
                "RATE_LIMIT_LOGIN_LOCKOUT_SECS",
                DEFAULT_LOGIN_LOCKOUT_SECS,
            ),
            exponential_backoff: true,
        };

        // Mail relay (optional)
        let mail = match vars("SMTP_HOST") {
            Some(smtp_host) => Some(MailConfig {
                smtp_host,
                smtp_port: parse_or(vars, "SMTP_PORT", DEFAULT_SMTP_PORT),
                username: vars("SMTP_USERNAME"),
                password: vars("SMTP_PASSWORD"),
                from: vars("MAIL_FROM").ok_or_else(|| ConfigError::MissingRequired {
                    var: "MAIL_FROM".to_string(),
                    hint: "Required when SMTP_HOST is set".to_string(),
                })?,
            }),
            None => None,
        };

        // Bootstrap controller (optional, all-or-nothing)
        let bootstrap_controller = match vars("BOOTSTRAP_CONTROLLER_USERNAME") {
            Some(username) => {
                let required = |var: &str| {
                    vars(var).ok_or_else(|| ConfigError::MissingRequired {
                        var: var.to_string(),
                        hint: "Required when BOOTSTRAP_CONTROLLER_USERNAME is set".to_string(),
                    })
                };
                Some(NewController {
                    email: required("BOOTSTRAP_CONTROLLER_EMAIL")?,
                    password: required("BOOTSTRAP_CONTROLLER_PASSWORD")?,
                    name: vars("BOOTSTRAP_CONTROLLER_NAME").unwrap_or_else(|| username.clone()),
                    username,
                })
            }
            None => None,
        };

        let metrics_bind = vars("METRICS_BIND")
            .map(|addr| parse_addr("METRICS_BIND", &addr))
            .transpose()?;

        Ok(ServerConfig {
            bind,
            database,
            in_memory,
            security,
            login_rate_limit,
            mail,
            bootstrap_controller,
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if self.security.password_pepper.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        if self.security.token_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "TOKEN_TTL_MINUTES".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.security.token_ttl_minutes > MAX_TOKEN_TTL_MINUTES {
            return Err(ConfigError::Invalid {
                var: "TOKEN_TTL_MINUTES".to_string(),
                reason: format!("Must not exceed {MAX_TOKEN_TTL_MINUTES} (one year)"),
            });
        }

        if let Err(e) = self.login_rate_limit.validate() {
            let var = if self.login_rate_limit.max_attempts == 0 {
                "RATE_LIMIT_LOGIN_ATTEMPTS"
            } else {
                "RATE_LIMIT_LOGIN_WINDOW_SECS"
            };
            return Err(ConfigError::Invalid {
                var: var.to_string(),
                reason: e.to_string(),
            });
        }

        if let Some(mail) = &self.mail
            && mail.smtp_port == 0
        {
            return Err(ConfigError::Invalid {
                var: "SMTP_PORT".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed DB_MAX_CONNECTIONS ({})",
                    self.database.max_connections
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn parse_addr(var: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        var: var.to_string(),
        reason: format!("{value:?} is not an IP:PORT address"),
    })
}

/// Helper to parse a variable with default fallback
fn parse_or<T>(vars: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    vars(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
