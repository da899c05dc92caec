//! Outgoing email: the `Mailer` seam, its SMTP implementation and the
//! HTML messages the service sends.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::error::{AppError, AppResult};

pub const TWO_FACTOR_SUBJECT: &str = "Two-Factor Authentication Code";
pub const REMINDER_SUBJECT: &str = "Friendly Reminder: Gallery Expiring Soon";
pub const ALERT_SUBJECT: &str = "gshare automated alert";

const TWO_FACTOR_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif;">
  <h2>Your verification code</h2>
  <p>Use the code below to finish signing in:</p>
  <p style="font-size: 28px; letter-spacing: 6px;"><strong>{code}</strong></p>
  <p>If you did not try to sign in, you can ignore this email.</p>
</body>
</html>"#;

const REMINDER_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif;">
  <p>Hello,</p>
  <p>This is a friendly reminder that your gallery will expire on <strong>{expiration_date}</strong>.</p>
  <p>Please download any photos you would like to keep before then:</p>
  <p><a href="{gallery_link}">{gallery_link}</a></p>
  <p>Thank you,<br>{photographer_name}</p>
</body>
</html>"#;

const ALERT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif;">
  <h3>Automated alert</h3>
  <p>{message}</p>
</body>
</html>"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, email: Email) -> AppResult<()>;
}

/// Minimal HTML escaping for values substituted into templates.
fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Replace `{name}` placeholders with escaped values.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), &escape_html(value))
    })
}

/// `January 2, 2006` style date in the server's local time zone.
pub fn format_expiration(expiration: DateTime<Utc>) -> String {
    expiration
        .with_timezone(&Local)
        .format("%B %-d, %Y")
        .to_string()
}

pub fn two_factor_email(to: &str, code: &str) -> Email {
    Email {
        to: vec![to.to_string()],
        subject: TWO_FACTOR_SUBJECT.to_string(),
        html: render_template(TWO_FACTOR_TEMPLATE, &[("code", code)]),
    }
}

pub fn reminder_email(
    recipients: Vec<String>,
    gallery_link: &str,
    expiration_date: &str,
    photographer_name: &str,
) -> Email {
    Email {
        to: recipients,
        subject: REMINDER_SUBJECT.to_string(),
        html: render_template(
            REMINDER_TEMPLATE,
            &[
                ("expiration_date", expiration_date),
                ("gallery_link", gallery_link),
                ("photographer_name", photographer_name),
            ],
        ),
    }
}

pub fn alert_email(to: &str, message: &str) -> Email {
    Email {
        to: vec![to.to_string()],
        subject: ALERT_SUBJECT.to_string(),
        html: render_template(ALERT_TEMPLATE, &[("message", message)]),
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> AppResult<Self> {
        let username = config
            .username
            .clone()
            .ok_or_else(|| AppError::Config("SMTP_USERNAME is not set".to_string()))?;
        let from_address = config.from.clone().unwrap_or_else(|| username.clone());
        let from: Mailbox = from_address
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid SMTP_FROM address: {}", e)))?;
        let credentials = Credentials::new(username, config.password.clone().unwrap_or_default());

        let builder = if config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| AppError::Config(format!("Invalid SMTP relay: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let transport = builder.port(config.port).credentials(credentials).build();

        Ok(Self { transport, from })
    }

    /// Check the connection and credentials once at start-up.
    pub async fn test_connection(&self) -> bool {
        match self.transport.test_connection().await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!("SMTP connection test failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> AppResult<()> {
        if email.to.is_empty() {
            return Err(AppError::Validation("Email has no recipients".to_string()));
        }

        let mut builder = Message::builder().from(self.from.clone());
        for recipient in &email.to {
            let mailbox: Mailbox = recipient.trim().parse().map_err(|e| {
                AppError::Validation(format!("Invalid recipient {}: {}", recipient, e))
            })?;
            builder = builder.to(mailbox);
        }

        let message = builder
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .map_err(|e| AppError::ExternalAction(format!("Failed to build email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::ExternalAction(format!("Failed to send email: {}", e)))?;

        tracing::info!("Email \"{}\" sent to {} recipient(s)", email.subject, email.to.len());
        Ok(())
    }
}

/// Used when SMTP is not configured: every send fails.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, email: Email) -> AppResult<()> {
        tracing::warn!("Email disabled; dropping \"{}\"", email.subject);
        Err(AppError::ExternalAction("Email is not configured".to_string()))
    }
}

/// Build the mailer for the configured SMTP settings.
pub async fn mailer_from_config(config: &SmtpConfig) -> Arc<dyn Mailer> {
    if config.username.is_none() {
        tracing::info!("SMTP is not configured; email is disabled");
        return Arc::new(DisabledMailer);
    }

    match SmtpMailer::new(config) {
        Ok(mailer) => {
            if mailer.test_connection().await {
                tracing::info!("SMTP authentication successful");
            }
            Arc::new(mailer)
        }
        Err(e) => {
            tracing::warn!("Failed to initialize SMTP mailer: {}", e);
            Arc::new(DisabledMailer)
        }
    }
}
