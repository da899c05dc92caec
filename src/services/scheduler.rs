//! Timer-driven gallery maintenance.
//!
//! Two passes, each folded over the gallery list into per-gallery outcomes:
//! the transition check (redeploy the client when a gallery just went live
//! or just expired) and the daily reminder pass. Every action is best
//! effort; a failure is recorded in its outcome and the pass moves on.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::db::{Gallery, GalleryRepository, SettingsRepository, UserRepository};
use crate::error::AppResult;
use crate::services::email::{alert_email, format_expiration, reminder_email};
use crate::services::lifecycle::{self, Transition};
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    Redeployed {
        gallery_id: i64,
        transition: Transition,
    },
    RedeployFailed {
        gallery_id: i64,
        transition: Transition,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReminderOutcome {
    Sent { gallery_id: i64, recipients: usize },
    MissingRecipients { gallery_id: i64 },
    Failed { gallery_id: i64, error: String },
}

/// First occurrence of the wall-clock time `at` strictly after `now`.
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();
    for _ in 0..3 {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }
    now.clone() + Duration::days(1)
}

pub struct Scheduler;

impl Scheduler {
    fn window(state: &Arc<AppState>) -> Duration {
        Duration::minutes(state.config.scheduler.galleries_interval_minutes)
    }

    /// Redeploy the client once for every gallery that crossed its live or
    /// expiration boundary during the last polling window.
    pub async fn check_galleries(
        state: &Arc<AppState>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<CheckOutcome>> {
        let galleries = GalleryRepository::list_all(&state.db).await?;
        let window = Self::window(state);
        tracing::debug!("Checking {} galleries for newly live/expired", galleries.len());

        let mut outcomes = Vec::new();
        for gallery in galleries {
            let Some(transition) =
                lifecycle::transition_within(now, gallery.live, gallery.expiration, window)
            else {
                continue;
            };
            outcomes.push(Self::redeploy_for(state, &gallery, transition).await);
        }
        Ok(outcomes)
    }

    async fn redeploy_for(
        state: &Arc<AppState>,
        gallery: &Gallery,
        transition: Transition,
    ) -> CheckOutcome {
        tracing::info!(
            "Gallery {} {} within the last polling window; redeploying client",
            gallery.id,
            transition.as_str()
        );

        match state.redeployer.redeploy().await {
            Ok(()) => {
                if let Err(e) = SettingsRepository::set_update_pending(&state.db, false).await {
                    tracing::error!("Failed to clear pending update flag: {:?}", e);
                }
                if transition == Transition::WentLive {
                    let msg = format!(
                        "Client container restarted to make gallery {} live",
                        gallery.id
                    );
                    Self::alert_admin(state, &msg).await;
                }
                CheckOutcome::Redeployed {
                    gallery_id: gallery.id,
                    transition,
                }
            }
            Err(e) => {
                let msg = format!("Error restarting client container: {}", e);
                tracing::error!("{}", msg);
                Self::alert_admin(state, &msg).await;
                CheckOutcome::RedeployFailed {
                    gallery_id: gallery.id,
                    transition,
                    error: e.to_string(),
                }
            }
        }
    }

    /// One-shot alert to the administrator; failures are only logged.
    pub async fn alert_admin(state: &Arc<AppState>, message: &str) {
        let admin = match UserRepository::find_admin(&state.db).await {
            Ok(Some(admin)) => admin,
            Ok(None) => {
                tracing::warn!("No administrator account to alert");
                return;
            }
            Err(e) => {
                tracing::error!("Unable to retrieve admin user: {:?}", e);
                return;
            }
        };

        if let Err(e) = state.mailer.send(alert_email(&admin.email, message)).await {
            tracing::error!("Unable to send alert email: {:?}", e);
        }
    }

    /// Send the expiration reminder for every live gallery whose reminder
    /// date falls on `now`'s calendar day.
    pub async fn send_reminders<Tz: TimeZone>(
        state: &Arc<AppState>,
        now: &DateTime<Tz>,
    ) -> AppResult<Vec<ReminderOutcome>> {
        let now_utc = now.with_timezone(&Utc);
        let galleries: Vec<Gallery> = GalleryRepository::list_all(&state.db)
            .await?
            .into_iter()
            .filter(|g| g.is_live_at(now_utc))
            .collect();

        if galleries.is_empty() {
            tracing::debug!("No live galleries to check for reminders");
        }

        let mut outcomes = Vec::new();
        for gallery in galleries {
            if !gallery.reminder || !lifecycle::reminder_due(gallery.expiration, now) {
                continue;
            }

            let recipients = gallery.reminder_recipients();
            if recipients.is_empty() {
                tracing::warn!("Gallery {} has reminders enabled but no recipients", gallery.title);
                outcomes.push(ReminderOutcome::MissingRecipients {
                    gallery_id: gallery.id,
                });
                continue;
            }

            let link = format!(
                "{}/{}",
                state.config.client.url.trim_end_matches('/'),
                gallery.path
            );
            let count = recipients.len();
            let email = reminder_email(
                recipients,
                &link,
                &format_expiration(gallery.expiration),
                &state.config.client.photographer_name,
            );

            match state.mailer.send(email).await {
                Ok(()) => {
                    tracing::info!("{} gallery reminder emails sent", gallery.title);
                    outcomes.push(ReminderOutcome::Sent {
                        gallery_id: gallery.id,
                        recipients: count,
                    });
                }
                Err(e) => {
                    tracing::error!("Unable to send reminder for {}: {:?}", gallery.title, e);
                    outcomes.push(ReminderOutcome::Failed {
                        gallery_id: gallery.id,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(outcomes)
    }
}
