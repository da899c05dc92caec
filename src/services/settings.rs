use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::{Settings, SettingsRepository, UserRepository};
use crate::error::{AppError, AppResult};
use crate::AppState;

/// Settings as shown to the administrator.
#[derive(Debug, Serialize)]
pub struct SettingsView {
    #[serde(flatten)]
    pub settings: Settings,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// Unauthenticated subset used by the client site and first-run screen.
#[derive(Debug, Serialize)]
pub struct PublicSettings {
    pub photographer_name: String,
    /// No account exists yet; the admin UI shows the bootstrap form.
    pub new_application: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettings {
    pub update: Option<bool>,
    /// `""` removes the webhook URL
    pub client_webhook_url: Option<String>,
}

pub struct SettingsService;

impl SettingsService {
    pub async fn get(state: &Arc<AppState>) -> AppResult<SettingsView> {
        Ok(SettingsView {
            settings: SettingsRepository::get(&state.db).await?,
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: state.started_at.elapsed().as_secs(),
        })
    }

    pub async fn public(state: &Arc<AppState>) -> AppResult<PublicSettings> {
        Ok(PublicSettings {
            photographer_name: state.config.client.photographer_name.clone(),
            new_application: UserRepository::count(&state.db).await? == 0,
        })
    }

    pub async fn update(state: &Arc<AppState>, input: UpdateSettings) -> AppResult<SettingsView> {
        // make sure the singleton row exists before the targeted updates
        SettingsRepository::get(&state.db).await?;

        if let Some(update) = input.update {
            SettingsRepository::set_update_pending(&state.db, update).await?;
        }
        if let Some(url) = input.client_webhook_url {
            let url = url.trim();
            if url.is_empty() {
                SettingsRepository::set_client_webhook_url(&state.db, None).await?;
            } else {
                url::Url::parse(url).map_err(|e| {
                    AppError::Validation(format!("Invalid client_webhook_url: {}", e))
                })?;
                SettingsRepository::set_client_webhook_url(&state.db, Some(url)).await?;
            }
        }
        Self::get(state).await
    }

    /// Manual redeploy. The pending flag is cleared only when it succeeds.
    pub async fn redeploy(state: &Arc<AppState>) -> AppResult<SettingsView> {
        state.redeployer.redeploy().await?;
        SettingsRepository::set_update_pending(&state.db, false).await?;
        tracing::info!("Client redeployed on request");
        Self::get(state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email::tests::RecordingMailer;
    use crate::services::init::tests::test_state;
    use crate::services::redeploy::tests::CountingRedeployer;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn redeploy_clears_flag_only_on_success() {
        let failing = Arc::new(CountingRedeployer {
            fail: true,
            ..Default::default()
        });
        let state = test_state(Arc::new(RecordingMailer::default()), failing.clone()).await;
        SettingsRepository::set_update_pending(&state.db, true).await.unwrap();

        assert!(matches!(
            SettingsService::redeploy(&state).await,
            Err(AppError::ExternalAction(_))
        ));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert!(SettingsService::get(&state).await.unwrap().settings.update_pending);

        let ok = test_state(
            Arc::new(RecordingMailer::default()),
            Arc::new(CountingRedeployer::default()),
        )
        .await;
        SettingsRepository::set_update_pending(&ok.db, true).await.unwrap();
        let view = SettingsService::redeploy(&ok).await.unwrap();
        assert!(!view.settings.update_pending);
    }

    #[tokio::test]
    async fn update_toggles_flag_and_webhook() {
        let state = test_state(
            Arc::new(RecordingMailer::default()),
            Arc::new(CountingRedeployer::default()),
        )
        .await;

        let view = SettingsService::update(
            &state,
            UpdateSettings {
                update: Some(true),
                client_webhook_url: Some("https://hooks.example.com/deploy".to_string()),
            },
        )
        .await
        .unwrap();
        assert!(view.settings.update_pending);
        assert_eq!(
            view.settings.client_webhook_url.as_deref(),
            Some("https://hooks.example.com/deploy")
        );

        assert!(matches!(
            SettingsService::update(
                &state,
                UpdateSettings {
                    client_webhook_url: Some("not a url".to_string()),
                    ..Default::default()
                }
            )
            .await,
            Err(AppError::Validation(_))
        ));

        let view = SettingsService::update(
            &state,
            UpdateSettings {
                client_webhook_url: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(view.settings.client_webhook_url.is_none());
    }

    #[tokio::test]
    async fn public_settings_report_first_run() {
        let state = test_state(
            Arc::new(RecordingMailer::default()),
            Arc::new(CountingRedeployer::default()),
        )
        .await;
        let public = SettingsService::public(&state).await.unwrap();
        assert!(public.new_application);
        assert_eq!(public.photographer_name, "Jane Doe");

        UserRepository::create(&state.db, "a@example.com", "x").await.unwrap();
        assert!(!SettingsService::public(&state).await.unwrap().new_application);
    }
}
