use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use handlebars::Handlebars;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::Value;

use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Outbound notification channel. Renders a named template against a
/// structured context and sends the result as an email. Callers treat
/// failures as retryable; nothing here reaches back into the lifecycle
/// engine.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: &Value,
        attachments: &[MailAttachment],
    ) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    templates: Handlebars<'static>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut templates = Handlebars::new();
        templates
            .register_template_string(
                "new-proposal",
                include_str!("../templates/new-proposal.hbs"),
            )
            .context("failed to register new-proposal template")?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port);
        if let (Some(username), Some(password)) =
            (config.smtp_username.clone(), config.smtp_password.clone())
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        let from = config
            .mail_from
            .parse()
            .context("MAIL_FROM is not a valid mailbox")?;

        Ok(Self {
            transport: builder.build(),
            templates,
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: &Value,
        attachments: &[MailAttachment],
    ) -> Result<()> {
        let html = self
            .templates
            .render(template, context)
            .with_context(|| format!("failed to render template {template}"))?;

        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|err| anyhow!("invalid recipient address {to}: {err}"))?;

        let mut body = MultiPart::mixed().singlepart(SinglePart::html(html));
        for attachment in attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|err| anyhow!("invalid attachment content type: {err}"))?;
            body = body.singlepart(
                Attachment::new(attachment.filename.clone())
                    .body(attachment.bytes.clone(), content_type),
            );
        }

        let message = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(subject)
            .multipart(body)
            .context("failed to build email message")?;

        self.transport
            .send(message)
            .await
            .context("failed to send email over SMTP")?;

        Ok(())
    }
}
