use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::{EngineError, EngineResult};
use crate::render::{RenderedMessage, TemplateKind};

use super::{Adapter, AdapterOutcome};

#[derive(Debug, Clone)]
pub struct SmtpCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Stateless, thread-safe email adapter over SMTP. `AsyncSmtpTransport` is
/// internally pooled and `Clone`, so the adapter is cheap to share across
/// workers without wrapping it in its own lock.
#[derive(Clone)]
pub struct EmailAdapter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailAdapter {
    /// Construction is fallible: a missing/invalid adapter is a (a)-class
    /// configuration error at startup (spec §7), not a runtime skip — email
    /// is mandatory ambient infrastructure for this engine, not an optional
    /// integration.
    pub fn new(creds: &SmtpCredentials) -> EngineResult<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&creds.host)
            .map_err(EngineError::Smtp)?
            .port(creds.port)
            .credentials(Credentials::new(
                creds.username.clone(),
                creds.password.clone(),
            ))
            .build();

        let from = creds
            .from
            .parse::<Mailbox>()
            .map_err(EngineError::InvalidEmailAddress)?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Adapter for EmailAdapter {
    async fn send(
        &self,
        channel_address: &str,
        message: &RenderedMessage,
        _kind: TemplateKind,
        _episode_id: &str,
    ) -> AdapterOutcome {
        let to: Mailbox = match channel_address.parse() {
            Ok(addr) => addr,
            Err(_) => return AdapterOutcome::InvalidAddress,
        };

        let email = match Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .multipart(MultiPart::alternative(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(message.body_text.clone()),
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(message.body_html.clone()),
            )) {
            Ok(m) => m,
            Err(_) => return AdapterOutcome::InvalidAddress,
        };

        match self.transport.send(email).await {
            Ok(response) => AdapterOutcome::Sent {
                provider_msg_id: response
                    .message()
                    .next()
                    .unwrap_or("unknown")
                    .to_string(),
            },
            Err(e) => classify_smtp_error(&e),
        }
    }
}

/// SMTP permanent (5xx) replies are terminal; everything else (network
/// errors, transient 4xx) is retryable (spec §4.A).
fn classify_smtp_error(err: &lettre::transport::smtp::Error) -> AdapterOutcome {
    if let Some(code) = err.status().map(|c| c.severity) {
        use lettre::transport::smtp::response::Severity;
        if code == Severity::PermanentNegativeCompletion {
            return AdapterOutcome::ProviderReject {
                reason: err.to_string(),
            };
        }
    }
    AdapterOutcome::TransientFail {
        reason: err.to_string(),
    }
}
