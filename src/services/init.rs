//! Initialization helpers for the application:
//! - database connection + migrations
//! - background scheduler spawn helpers

use std::{path::Path, sync::Arc};

use anyhow::Result;
use chrono::{Local, Utc};

use crate::config::Config;
use crate::services::scheduler::{next_daily_run, Scheduler};

/// Redact potentially sensitive information from a database URL before logging.
///
/// Attempts to parse the URL and remove userinfo (username:password) components.
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Initialize SQLite database connection and run migrations.
///
/// Creates the parent directory for the database file (if applicable),
/// opens a connection pool using `create_if_missing(true)` and runs migrations.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    tracing::info!(
        "Successfully connected to database file: {}",
        db_file_path.display()
    );

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Create the image root so the first upload does not race on it.
pub fn init_storage(config: &Config) -> Result<()> {
    let dir = &config.storage.images_dir;
    std::fs::create_dir_all(dir).map_err(|e| {
        anyhow::anyhow!("Failed to create images directory {}: {}", dir.display(), e)
    })?;
    tracing::info!("Images directory: {}", dir.display());
    Ok(())
}

/// Spawn the scheduler workers:
/// - the live/expired transition check every `galleries_interval_minutes`
/// - the expiration reminder pass once a day at `reminder_time` (local)
///
/// Each worker listens for a shutdown notification on `shutdown` and exits
/// between passes. Nothing is spawned when the scheduler is disabled.
pub fn spawn_background_workers(
    state: Arc<crate::AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    if !state.config.scheduler.enabled {
        tracing::info!("Scheduler disabled; set CRON_ENABLED=true to enable it");
        return handles;
    }

    // Gallery transition worker
    {
        let mut shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        let interval = std::time::Duration::from_secs(
            state.config.scheduler.galleries_interval_minutes as u64 * 60,
        );
        handles.push(tokio::spawn(async move {
            tracing::info!(
                "Gallery check scheduled every {} minutes",
                interval.as_secs() / 60
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Gallery check worker shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }

                match Scheduler::check_galleries(&state, Utc::now()).await {
                    Ok(outcomes) => {
                        for outcome in outcomes {
                            tracing::debug!("Gallery check outcome: {:?}", outcome);
                        }
                    }
                    Err(e) => tracing::error!("Gallery check failed: {:?}", e),
                }
            }
        }));
    }

    // Reminder worker
    {
        let mut shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        let at = state.config.scheduler.reminder_time;
        handles.push(tokio::spawn(async move {
            loop {
                let now = Local::now();
                let next = next_daily_run(&now, at);
                let wait = (next - now).to_std().unwrap_or_default();
                tracing::info!("Next reminder pass at {}", next.format("%Y-%m-%d %H:%M %Z"));

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Reminder worker shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }

                match Scheduler::send_reminders(&state, &Local::now()).await {
                    Ok(outcomes) => {
                        for outcome in outcomes {
                            tracing::debug!("Reminder outcome: {:?}", outcome);
                        }
                    }
                    Err(e) => tracing::error!("Reminder pass failed: {:?}", e),
                }
            }
        }));
    }

    handles
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::email::Mailer;
    use crate::services::redeploy::Redeployer;
    use crate::services::storage::{tests::temp_root, ImageStore};
    use crate::AppState;

    /// Fresh in-memory database with migrations applied.
    pub(crate) async fn test_pool() -> sqlx::SqlitePool {
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    /// State over an in-memory database and a temp image root.
    pub(crate) async fn test_state(
        mailer: Arc<dyn Mailer>,
        redeployer: Arc<dyn Redeployer>,
    ) -> Arc<AppState> {
        let mut config = Config::default();
        config.jwt.secret = "test-secret".to_string();
        config.client.url = "https://photos.example.com".to_string();
        config.client.photographer_name = "Jane Doe".to_string();
        config.storage.images_dir = temp_root();
        config.storage.web_size_width = 64;

        Arc::new(AppState {
            db: test_pool().await,
            store: ImageStore::new(&config.storage),
            config,
            mailer,
            redeployer,
            started_at: std::time::Instant::now(),
        })
    }

    #[test]
    fn redacts_credentials() {
        assert_eq!(
            redact_db_url("postgres://user:pass@db:5432/app"),
            "postgres://db:5432/app"
        );
        assert_eq!(redact_db_url("not a url@host"), "(redacted)host");
        assert_eq!(redact_db_url("no-scheme"), "(redacted)");
    }

    #[tokio::test]
    async fn disabled_scheduler_spawns_nothing() {
        let state = test_state(
            Arc::new(crate::services::email::DisabledMailer),
            Arc::new(crate::services::redeploy::DisabledRedeployer),
        )
        .await;
        let (tx, _rx) = tokio::sync::broadcast::channel(1);
        assert!(spawn_background_workers(state, tx).is_empty());
    }
}
