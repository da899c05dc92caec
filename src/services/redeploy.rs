//! Client redeploy trigger.
//!
//! The client site is statically rendered, so gallery changes only become
//! visible after it restarts. `Redeployer` is the seam the scheduler and the
//! manual redeploy endpoint call through.

use std::sync::Arc;

use async_trait::async_trait;
use bollard::container::{ListContainersOptions, RestartContainerOptions};
use bollard::models::ContainerSummary;
use bollard::{Docker, API_DEFAULT_VERSION};
use sqlx::SqlitePool;

use crate::config::{RedeployConfig, RedeployMode};
use crate::db::SettingsRepository;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait Redeployer: Send + Sync + 'static {
    async fn redeploy(&self) -> AppResult<()>;
}

/// Ids of containers whose image contains `image_filter` and whose name
/// contains `name_filter`.
pub fn matching_containers(
    containers: &[ContainerSummary],
    image_filter: &str,
    name_filter: &str,
) -> Vec<String> {
    containers
        .iter()
        .filter(|c| {
            c.image
                .as_deref()
                .map(|image| image.contains(image_filter))
                .unwrap_or(false)
        })
        .filter(|c| {
            c.names
                .as_ref()
                .map(|names| names.iter().any(|n| n.contains(name_filter)))
                .unwrap_or(false)
        })
        .filter_map(|c| c.id.clone())
        .collect()
}

/// Restarts the client container through the Docker API.
pub struct DockerRedeployer {
    docker: Docker,
    client_container: String,
    client_image: String,
}

impl DockerRedeployer {
    pub fn new(config: &RedeployConfig) -> AppResult<Self> {
        let socket = config
            .docker_socket
            .strip_prefix("unix://")
            .unwrap_or(&config.docker_socket);
        let docker = Docker::connect_with_unix(socket, 120, API_DEFAULT_VERSION)
            .map_err(|e| AppError::Config(format!("Invalid Docker socket {}: {}", socket, e)))?;
        Ok(Self {
            docker,
            client_container: config.client_container.clone(),
            client_image: config.client_image.clone(),
        })
    }
}

#[async_trait]
impl Redeployer for DockerRedeployer {
    async fn redeploy(&self) -> AppResult<()> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(|e| AppError::ExternalAction(format!("Failed to list containers: {}", e)))?;

        let ids = matching_containers(&containers, &self.client_image, &self.client_container);
        if ids.is_empty() {
            return Err(AppError::ExternalAction(format!(
                "No container named {} found",
                self.client_container
            )));
        }

        for id in ids {
            self.docker
                .restart_container(&id, None::<RestartContainerOptions>)
                .await
                .map_err(|e| {
                    AppError::ExternalAction(format!("Failed to restart container {}: {}", id, e))
                })?;
            tracing::info!("Restarted client container {}", id);
        }
        Ok(())
    }
}

/// POSTs to the client webhook URL stored in settings.
pub struct WebhookRedeployer {
    pool: SqlitePool,
    client: reqwest::Client,
}

impl WebhookRedeployer {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Redeployer for WebhookRedeployer {
    async fn redeploy(&self) -> AppResult<()> {
        let settings = SettingsRepository::get(&self.pool).await?;
        let url = settings
            .client_webhook_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::ExternalAction("client_webhook_url is not set".to_string()))?;

        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| AppError::ExternalAction(format!("Redeploy webhook failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(AppError::ExternalAction(format!(
                "Redeploy webhook returned {}",
                resp.status()
            )));
        }
        tracing::info!("Client redeploy webhook accepted");
        Ok(())
    }
}

pub struct DisabledRedeployer;

#[async_trait]
impl Redeployer for DisabledRedeployer {
    async fn redeploy(&self) -> AppResult<()> {
        Err(AppError::ExternalAction("Client redeploy is disabled".to_string()))
    }
}

pub fn redeployer_from_config(config: &RedeployConfig, pool: &SqlitePool) -> Arc<dyn Redeployer> {
    match config.mode {
        RedeployMode::Docker => match DockerRedeployer::new(config) {
            Ok(r) => Arc::new(r),
            Err(e) => {
                tracing::warn!("Docker redeploy unavailable: {}", e);
                Arc::new(DisabledRedeployer)
            }
        },
        RedeployMode::Webhook => Arc::new(WebhookRedeployer::new(pool.clone())),
        RedeployMode::Disabled => Arc::new(DisabledRedeployer),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls; fails when `fail` is set.
    #[derive(Default)]
    pub(crate) struct CountingRedeployer {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    #[async_trait]
    impl Redeployer for CountingRedeployer {
        async fn redeploy(&self) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AppError::ExternalAction("docker unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn summary(id: &str, image: &str, name: &str) -> ContainerSummary {
        ContainerSummary {
            id: Some(id.to_string()),
            image: Some(image.to_string()),
            names: Some(vec![format!("/{}", name)]),
            ..Default::default()
        }
    }

    #[test]
    fn matches_image_and_name() {
        let containers = vec![
            summary("1", "ghcr.io/someone/gshare-client:latest", "gshare-client"),
            summary("2", "ghcr.io/someone/gshare-server:latest", "gshare-server"),
            summary("3", "nginx", "gshare-client-proxy"),
        ];
        assert_eq!(
            matching_containers(&containers, "gshare", "gshare-client"),
            vec!["1".to_string()]
        );
        assert!(matching_containers(&containers, "gshare", "other").is_empty());
    }
}
