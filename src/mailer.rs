use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::MailConfig;

pub const TEMPLATE_WELCOME: &str = "welcome.tmpl";
pub const TEMPLATE_PASSWORD_RESET: &str = "password_reset.tmpl";

/// Fire-and-forget outbound mail. Sends happen from the job processor, never
/// inline with a request.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        template_file: &str,
        data: &HashMap<String, serde_json::Value>,
    ) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &MailConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .context("failed to configure SMTP relay")?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();

        let sender = cfg
            .sender
            .parse::<Mailbox>()
            .context("SMTP_SENDER is not a valid mailbox")?;

        Ok(Self { transport, sender })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        recipient: &str,
        template_file: &str,
        data: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let (subject, body) = render(template_file, data);

        let message = Message::builder()
            .from(self.sender.clone())
            .to(recipient
                .parse::<Mailbox>()
                .context("recipient is not a valid mailbox")?)
            .subject(subject)
            .body(body)
            .context("failed to build email")?;

        self.transport
            .send(message)
            .await
            .context("failed to send email")?;
        Ok(())
    }
}

fn render(template_file: &str, data: &HashMap<String, serde_json::Value>) -> (String, String) {
    let str_field = |key: &str| {
        data.get(key)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match template_file {
        TEMPLATE_WELCOME => {
            let first_name = str_field("first_name");
            let token = str_field("activation_token");
            (
                "Welcome! Please activate your account".to_string(),
                format!(
                    "Hi {first_name},\n\n\
                     Thanks for signing up. Activate your account with this token:\n\n\
                     {token}\n\n\
                     The token expires in 24 hours.\n"
                ),
            )
        }
        TEMPLATE_PASSWORD_RESET => {
            let token = str_field("reset_token");
            (
                "Password reset requested".to_string(),
                format!(
                    "A password reset was requested for your account.\n\n\
                     Use this token within 15 minutes:\n\n\
                     {token}\n\n\
                     If you did not request this, you can ignore this email.\n"
                ),
            )
        }
        other => (
            "Notification".to_string(),
            format!("Notification of type {other}.\n"),
        ),
    }
}

/// Discards mail after logging; used in the `testing` environment.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(
        &self,
        recipient: &str,
        template_file: &str,
        _data: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        info!(recipient, template = template_file, "mail send skipped (noop mailer)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{render, TEMPLATE_PASSWORD_RESET, TEMPLATE_WELCOME};

    #[test]
    fn welcome_template_embeds_activation_token() {
        let mut data = HashMap::new();
        data.insert(
            "first_name".to_string(),
            serde_json::Value::String("Alice".to_string()),
        );
        data.insert(
            "activation_token".to_string(),
            serde_json::Value::String("ABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string()),
        );

        let (subject, body) = render(TEMPLATE_WELCOME, &data);

        assert!(subject.contains("activate"));
        assert!(body.contains("Alice"));
        assert!(body.contains("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
    }

    #[test]
    fn reset_template_embeds_reset_token() {
        let mut data = HashMap::new();
        data.insert(
            "reset_token".to_string(),
            serde_json::Value::String("RESETTOKEN234567ABCDEFGHIJ".to_string()),
        );

        let (_, body) = render(TEMPLATE_PASSWORD_RESET, &data);
        assert!(body.contains("RESETTOKEN234567ABCDEFGHIJ"));
        assert!(body.contains("15 minutes"));
    }

    #[test]
    fn unknown_template_falls_back_to_generic_notification() {
        let (subject, _) = render("mystery.tmpl", &HashMap::new());
        assert_eq!(subject, "Notification");
    }
}
