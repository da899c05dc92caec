use std::env;
use std::path::PathBuf;

use chrono::NaiveTime;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub smtp: SmtpConfig,
    pub redeploy: RedeployConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed by CORS (the admin/client front end).
    pub frontend_url: String,
    /// Emit JSON log lines instead of the human readable format.
    /// Read from env var `LOG_FORMAT` (`json` enables it).
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for auth endpoints (e.g. /api/v1/auth)
    pub auth_per_second: u32,
    /// Burst size for auth endpoints
    pub auth_burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding one sub-directory per gallery.
    pub images_dir: PathBuf,
    /// Width (px) of the `web` tier produced on upload.
    pub web_size_width: u32,
    /// Length of the random part of stored image filenames.
    pub filename_length: usize,
    /// Request body cap for image uploads.
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Polling window for the live/expired transition check.
    pub galleries_interval_minutes: i64,
    /// Local wall-clock time at which reminders go out.
    pub reminder_time: NaiveTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub tls: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedeployMode {
    Docker,
    Webhook,
    Disabled,
}

impl RedeployMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "docker" => Some(RedeployMode::Docker),
            "webhook" => Some(RedeployMode::Webhook),
            "disabled" | "none" | "off" => Some(RedeployMode::Disabled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedeployConfig {
    pub mode: RedeployMode,
    /// Unix socket of the Docker daemon.
    pub docker_socket: String,
    /// Substring matched against container names.
    pub client_container: String,
    /// Substring matched against container images.
    pub client_image: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub two_factor: bool,
    /// Public URL of the client site, used for gallery links in emails.
    pub url: String,
    pub photographer_name: String,
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let reminder_time = env::var("CRON_REMINDER_TIME").unwrap_or_else(|_| "08:00".to_string());
        let redeploy_mode = env::var("REDEPLOY_MODE").unwrap_or_else(|_| "docker".to_string());

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                json_logs: env::var("LOG_FORMAT")
                    .map(|v| v.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/gallery.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("JWT_SECRET".to_string()))?,
                expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                    .unwrap_or_else(|_| "6".to_string())
                    .parse()
                    .unwrap_or(6),
            },
            rate_limit: RateLimitConfig {
                auth_per_second: env::var("RATE_LIMIT_AUTH_PER_SECOND")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                auth_burst: env::var("RATE_LIMIT_AUTH_BURST")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            storage: StorageConfig {
                images_dir: PathBuf::from(
                    env::var("IMAGES_DIRECTORY").unwrap_or_else(|_| "data/images".to_string()),
                ),
                web_size_width: env::var("IMAGES_WEB_SIZE_WIDTH")
                    .unwrap_or_else(|_| "1080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("IMAGES_WEB_SIZE_WIDTH".to_string()))?,
                filename_length: env::var("IMAGES_FILENAME_LENGTH")
                    .unwrap_or_else(|_| "12".to_string())
                    .parse()
                    .unwrap_or(12),
                max_upload_bytes: env::var("IMAGES_MAX_UPLOAD_BYTES")
                    .unwrap_or_else(|_| (50 * 1024 * 1024).to_string())
                    .parse()
                    .unwrap_or(50 * 1024 * 1024),
            },
            scheduler: SchedulerConfig {
                enabled: env_bool("CRON_ENABLED", false),
                galleries_interval_minutes: env::var("CRON_GALLERIES_INTERVAL")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .ok()
                    .filter(|m: &i64| *m > 0)
                    .ok_or_else(|| ConfigError::InvalidValue("CRON_GALLERIES_INTERVAL".to_string()))?,
                reminder_time: NaiveTime::parse_from_str(&reminder_time, "%H:%M")
                    .map_err(|_| ConfigError::InvalidValue("CRON_REMINDER_TIME".to_string()))?,
            },
            smtp: SmtpConfig {
                host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
                port: env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("SMTP_PORT".to_string()))?,
                username: env::var("SMTP_USERNAME").ok().filter(|s| !s.is_empty()),
                password: env::var("SMTP_PASSWORD").ok(),
                from: env::var("SMTP_FROM").ok().filter(|s| !s.is_empty()),
                tls: env_bool("SMTP_TLS", true),
            },
            redeploy: RedeployConfig {
                mode: RedeployMode::from_str(&redeploy_mode)
                    .ok_or_else(|| ConfigError::InvalidValue("REDEPLOY_MODE".to_string()))?,
                docker_socket: env::var("DOCKER_HOST")
                    .unwrap_or_else(|_| "unix:///var/run/docker.sock".to_string()),
                client_container: env::var("CLIENT_CONTAINER")
                    .unwrap_or_else(|_| "gshare-client".to_string()),
                client_image: env::var("CLIENT_IMAGE").unwrap_or_else(|_| "gshare".to_string()),
            },
            client: ClientConfig {
                two_factor: env_bool("TWO_FACTOR_AUTHENTICATION", false),
                url: env::var("NEXT_PUBLIC_CLIENT_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                photographer_name: env::var("NEXT_PUBLIC_PHOTOGRAPHER_NAME")
                    .unwrap_or_else(|_| "Your Photographer".to_string()),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
                json_logs: false,
            },
            database: DatabaseConfig {
                url: "sqlite://data/gallery.db".to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: String::new(),
                expiration_hours: 6,
            },
            rate_limit: RateLimitConfig {
                auth_per_second: 3,
                auth_burst: 10,
            },
            storage: StorageConfig {
                images_dir: PathBuf::from("data/images"),
                web_size_width: 1080,
                filename_length: 12,
                max_upload_bytes: 50 * 1024 * 1024,
            },
            scheduler: SchedulerConfig {
                enabled: false,
                galleries_interval_minutes: 10,
                reminder_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            },
            smtp: SmtpConfig {
                host: "smtp.gmail.com".to_string(),
                port: 587,
                username: None,
                password: None,
                from: None,
                tls: true,
            },
            redeploy: RedeployConfig {
                mode: RedeployMode::Docker,
                docker_socket: "unix:///var/run/docker.sock".to_string(),
                client_container: "gshare-client".to_string(),
                client_image: "gshare".to_string(),
            },
            client: ClientConfig {
                two_factor: false,
                url: "http://localhost:3000".to_string(),
                photographer_name: "Your Photographer".to_string(),
            },
        }
    }
}
