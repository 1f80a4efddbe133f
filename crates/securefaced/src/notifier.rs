//! SMTP delivery of stranger alerts.

use crate::config::AlertConfig;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secureface_core::{AlertNotifier, NotifyError, Visitor};
use std::time::Duration;

const ALERT_SUBJECT: &str = "🚨 Stranger Detected Alert";
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    recipient: Mailbox,
}

impl EmailNotifier {
    /// Build a STARTTLS relay transport. No connection is made until the first alert.
    pub fn new(config: &AlertConfig) -> Result<Self, lettre::transport::smtp::Error> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .timeout(Some(SMTP_TIMEOUT));
        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            sender: config.sender.clone(),
            recipient: config.recipient.clone(),
        })
    }

    fn message(&self, visitor: &Visitor) -> Result<Message, NotifyError> {
        Message::builder()
            .from(self.sender.clone())
            .to(self.recipient.clone())
            .subject(ALERT_SUBJECT)
            .header(ContentType::TEXT_HTML)
            .body(render_alert(visitor))
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}

#[async_trait]
impl AlertNotifier for EmailNotifier {
    async fn notify(&self, visitor: &Visitor) -> Result<(), NotifyError> {
        let message = self.message(visitor)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(())
    }
}

/// HTML body of the alert mail.
pub fn render_alert(visitor: &Visitor) -> String {
    let age = visitor
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let gender = visitor.gender.as_deref().unwrap_or("unknown");
    let emotion = visitor.dominant_emotion.as_deref().unwrap_or("unknown");
    format!(
        "<h1>{ALERT_SUBJECT}</h1>\n\
         <p><strong>Name:</strong> {}</p>\n\
         <p><strong>Age:</strong> {}</p>\n\
         <p><strong>Gender:</strong> {}</p>\n\
         <p><strong>Current Emotion:</strong> {}</p>\n\
         <p><strong>Detected At:</strong> {}</p>\n",
        escape(&visitor.name),
        escape(&age),
        escape(gender),
        escape(emotion),
        visitor.detected_at.to_rfc2822(),
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
