use crate::collectors::{CollectionError, Collector};
use crate::config::{MailConfig, SmtpSecurity};
use crate::metrics::Metrics;
use crate::report::{render_html, render_ticket_text};
use crate::snapshot::SystemSnapshot;
use async_trait::async_trait;
use lettre::address::AddressError;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const PHONE_NOT_PROVIDED: &str = "Not Provided";

/// Form fields as the UI sends them, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketFields {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub description: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("Please enter your full name")]
    MissingName,
    #[error("Please enter a valid email address")]
    InvalidEmail,
}

impl TicketRequest {
    pub fn validate(&self) -> Result<TicketFields, TicketError> {
        let full_name = self.full_name.trim();
        if full_name.is_empty() {
            return Err(TicketError::MissingName);
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(TicketError::InvalidEmail);
        }
        let phone = self.phone.trim();
        let phone = if phone.is_empty() {
            PHONE_NOT_PROVIDED.to_string()
        } else {
            format_phone(phone)
        };

        Ok(TicketFields {
            full_name: full_name.to_string(),
            email: email.to_string(),
            phone,
            description: self.description.trim().to_string(),
        })
    }
}

/// `0825640943` (any punctuation) becomes `(082) 564-0943`; anything else is
/// returned unchanged.
pub fn format_phone(input: &str) -> String {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 10 && digits.starts_with('0') {
        format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..])
    } else {
        input.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMail {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub reply_to: String,
}

impl OutboundMail {
    pub fn compose(cfg: &MailConfig, fields: &TicketFields, snapshot: &SystemSnapshot) -> Self {
        Self {
            from: cfg.from.clone(),
            to: cfg.to.clone(),
            cc: Some(fields.email.clone()).filter(|e| e.contains('@')),
            subject: format!("Support Ticket from {}", fields.full_name),
            text: render_ticket_text(snapshot, fields),
            html: render_html(snapshot, fields),
            reply_to: fields.email.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("mail server is not configured")]
    NotConfigured,
    #[error("invalid mail address '{address}': {source}")]
    Address {
        address: String,
        source: AddressError,
    },
    #[error("failed to build mail: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Hands a composed mail to whatever delivers it.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Returns the Message-ID of the delivered mail.
    async fn send(&self, mail: &OutboundMail) -> Result<String, DeliveryError>;
}

/// Delivers tickets through an SMTP server.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    id_domain: String,
}

impl SmtpMailer {
    pub fn from_config(cfg: &MailConfig) -> Result<Self, DeliveryError> {
        let host = cfg
            .smtp_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(DeliveryError::NotConfigured)?;

        let tls = match cfg.security {
            SmtpSecurity::None => Tls::None,
            security => {
                let params = TlsParameters::builder(host.to_string())
                    .dangerous_accept_invalid_certs(cfg.accept_invalid_certs)
                    .build_rustls()?;
                if security == SmtpSecurity::Tls {
                    Tls::Wrapper(params)
                } else {
                    Tls::Required(params)
                }
            }
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(cfg.smtp_port)
            .tls(tls)
            .timeout(Some(Duration::from_secs(cfg.timeout_secs)));
        if let Some(user) = cfg.username.as_deref().filter(|u| !u.trim().is_empty()) {
            let password = cfg.resolve_password().unwrap_or_default();
            builder = builder.credentials(Credentials::new(user.trim().to_string(), password));
        }

        let id_domain = cfg
            .from
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "supportdesk.local".to_string());

        Ok(Self {
            transport: builder.build(),
            id_domain,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &OutboundMail) -> Result<String, DeliveryError> {
        let message_id = new_message_id(&self.id_domain);
        let message = build_message(mail, &message_id)?;
        let response = self.transport.send(message).await?;
        debug!(code = %response.code(), message_id = %message_id, "SMTP server accepted ticket");
        Ok(message_id)
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .trim()
        .parse()
        .map_err(|source| DeliveryError::Address {
            address: address.to_string(),
            source,
        })
}

fn new_message_id(domain: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("<{nanos}.{}.{seq}@{domain}>", std::process::id())
}

/// MIME message with text and HTML alternatives. An unparsable user address
/// only drops the cc/reply-to headers.
fn build_message(mail: &OutboundMail, message_id: &str) -> Result<Message, DeliveryError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&mail.from)?)
        .to(parse_mailbox(&mail.to)?)
        .subject(mail.subject.clone())
        .message_id(Some(message_id.to_string()));

    match parse_mailbox(&mail.reply_to) {
        Ok(reply_to) => builder = builder.reply_to(reply_to),
        Err(err) => debug!(error = %err, "ticket sent without reply-to"),
    }
    if let Some(cc) = &mail.cc {
        match parse_mailbox(cc) {
            Ok(cc) => builder = builder.cc(cc),
            Err(err) => debug!(error = %err, "ticket sent without cc"),
        }
    }

    Ok(builder.multipart(MultiPart::alternative_plain_html(
        mail.text.clone(),
        mail.html.clone(),
    ))?)
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] TicketError),
    #[error(transparent)]
    Collection(#[from] CollectionError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// What the UI shows after a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<String, SubmitError>> for TicketOutcome {
    fn from(result: Result<String, SubmitError>) -> Self {
        match result {
            Ok(id) => Self {
                success: true,
                message_id: Some(id),
                error: None,
            },
            Err(err) => Self {
                success: false,
                message_id: None,
                error: Some(err.to_string()),
            },
        }
    }
}

pub struct TicketService {
    collector: Arc<Collector>,
    transport: Option<Arc<dyn MailTransport>>,
    mail: MailConfig,
    metrics: Option<Arc<Metrics>>,
}

impl TicketService {
    pub fn new(
        collector: Arc<Collector>,
        transport: Option<Arc<dyn MailTransport>>,
        mail: MailConfig,
    ) -> Self {
        Self {
            collector,
            transport,
            mail,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validates the form, takes a fresh snapshot and sends the ticket.
    pub async fn submit(&self, request: &TicketRequest) -> Result<String, SubmitError> {
        let result = self.submit_inner(request).await;
        let label = match &result {
            Ok(_) => "sent",
            Err(SubmitError::Invalid(_)) => "invalid",
            Err(_) => "failed",
        };
        if let Some(metrics) = &self.metrics {
            metrics.inc_ticket(label);
        }
        match &result {
            Ok(id) => info!(message_id = %id, "support ticket sent"),
            Err(err) => warn!(error = %err, "support ticket not sent"),
        }
        result
    }

    async fn submit_inner(&self, request: &TicketRequest) -> Result<String, SubmitError> {
        let fields = request.validate()?;
        let transport = self
            .transport
            .as_ref()
            .ok_or(DeliveryError::NotConfigured)?;
        let snapshot = self.collector.collect().await?;
        let mail = OutboundMail::compose(&self.mail, &fields, &snapshot);
        Ok(transport.send(&mail).await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::collectors::collector::tests::{FakePlatform, FakeProvider};
    use crate::normalize::{normalize, tests::blank_probes};
    use std::sync::Mutex;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Records every mail and answers with a fixed id.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub(crate) sent: Mutex<Vec<OutboundMail>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, mail: &OutboundMail) -> Result<String, DeliveryError> {
            self.sent.lock().unwrap().push(mail.clone());
            Ok("<ticket-1@desk.example>".to_string())
        }
    }

    fn request(name: &str, email: &str, phone: &str) -> TicketRequest {
        TicketRequest {
            full_name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            description: "  Outlook keeps crashing  ".to_string(),
        }
    }

    pub(crate) fn fake_collector() -> Arc<Collector> {
        Arc::new(Collector::new(
            Arc::new(FakeProvider::default()),
            Arc::new(FakePlatform::default()),
            Duration::from_secs(1),
        ))
    }

    #[test]
    fn validation_messages() {
        assert_eq!(
            request("   ", "a@b.c", "").validate(),
            Err(TicketError::MissingName)
        );
        assert_eq!(
            request("Thandi", "thandi.example.com", "").validate(),
            Err(TicketError::InvalidEmail)
        );
        assert_eq!(
            TicketError::InvalidEmail.to_string(),
            "Please enter a valid email address"
        );
        assert_eq!(
            TicketError::MissingName.to_string(),
            "Please enter your full name"
        );

        let fields = request(" Thandi M ", " thandi@example.com ", "").validate().unwrap();
        assert_eq!(fields.full_name, "Thandi M");
        assert_eq!(fields.phone, "Not Provided");
        assert_eq!(fields.description, "Outlook keeps crashing");
    }

    #[test]
    fn phone_numbers() {
        assert_eq!(format_phone("0825640943"), "(082) 564-0943");
        assert_eq!(format_phone("082 564 0943"), "(082) 564-0943");
        assert_eq!(format_phone("+27 82 564 0943"), "+27 82 564 0943");
        assert_eq!(format_phone("12345"), "12345");
    }

    #[test]
    fn compose_sets_cc_only_for_addresses() {
        let snapshot = normalize(&blank_probes());
        let mut fields = request("Thandi", "thandi@example.com", "").validate().unwrap();
        let mail = OutboundMail::compose(&MailConfig::default(), &fields, &snapshot);
        assert_eq!(mail.subject, "Support Ticket from Thandi");
        assert_eq!(mail.cc.as_deref(), Some("thandi@example.com"));
        assert_eq!(mail.reply_to, "thandi@example.com");
        assert!(mail.text.starts_with("Support Ticket Details:"));
        assert!(mail.html.contains("Support Ticket Details"));

        fields.email = "no-address".to_string();
        let mail = OutboundMail::compose(&MailConfig::default(), &fields, &snapshot);
        assert!(mail.cc.is_none());
        let json = serde_json::to_value(&mail).unwrap();
        assert!(json.get("cc").is_none());
        assert_eq!(json["replyTo"], "no-address");
    }

    #[tokio::test]
    async fn submit_collects_and_sends() {
        let transport = Arc::new(RecordingTransport::default());
        let metrics = Metrics::new().unwrap();
        let service = TicketService::new(
            fake_collector(),
            Some(transport.clone()),
            MailConfig::default(),
        )
        .with_metrics(metrics.clone());

        let id = service
            .submit(&request("Thandi", "thandi@example.com", "0825640943"))
            .await
            .unwrap();
        assert_eq!(id, "<ticket-1@desk.example>");

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("Phone: (082) 564-0943"));
        assert!(sent[0].text.contains("Hostname: desk-01"));
        assert_eq!(metrics.desk_tickets_total.with_label_values(&["sent"]).get(), 1.0);
    }

    #[tokio::test]
    async fn invalid_or_unconfigured_submissions_fail() {
        let service = TicketService::new(fake_collector(), None, MailConfig::default());

        let outcome: TicketOutcome = service.submit(&request("", "x@y.z", "")).await.into();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Please enter your full name"));

        let err = service
            .submit(&request("Thandi", "thandi@example.com", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Delivery(DeliveryError::NotConfigured)));
    }

    /// Envelope commands and DATA body seen by [`spawn_smtp_server`].
    #[derive(Default)]
    struct SmtpSession {
        commands: Vec<String>,
        data: String,
    }

    /// Plaintext SMTP server that accepts one message.
    async fn spawn_smtp_server() -> (u16, tokio::task::JoinHandle<SmtpSession>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let mut session = SmtpSession::default();
            write.write_all(b"220 mail.test ESMTP\r\n").await.unwrap();

            let mut in_data = false;
            while let Some(line) = lines.next_line().await.unwrap() {
                if in_data {
                    if line == "." {
                        in_data = false;
                        write.write_all(b"250 2.0.0 queued\r\n").await.unwrap();
                    } else {
                        session.data.push_str(&line);
                        session.data.push('\n');
                    }
                    continue;
                }
                session.commands.push(line.clone());
                let verb = line.split_whitespace().next().unwrap_or_default().to_ascii_uppercase();
                let reply: &[u8] = match verb.as_str() {
                    "EHLO" | "HELO" => b"250 mail.test\r\n",
                    "DATA" => {
                        in_data = true;
                        b"354 end with <CRLF>.<CRLF>\r\n"
                    }
                    "QUIT" => {
                        write.write_all(b"221 bye\r\n").await.unwrap();
                        break;
                    }
                    _ => b"250 2.1.0 ok\r\n",
                };
                write.write_all(reply).await.unwrap();
            }
            session
        });
        (port, handle)
    }

    #[tokio::test]
    async fn smtp_mailer_delivers_and_returns_message_id() {
        let (port, server) = spawn_smtp_server().await;
        let cfg = MailConfig {
            smtp_host: Some("127.0.0.1".to_string()),
            smtp_port: port,
            security: SmtpSecurity::None,
            from: "helpdesk@desk.example".to_string(),
            to: "support@desk.example".to_string(),
            ..MailConfig::default()
        };
        let mailer = SmtpMailer::from_config(&cfg).unwrap();
        let fields = request("Thandi", "thandi@example.com", "").validate().unwrap();
        let mail = OutboundMail::compose(&cfg, &fields, &normalize(&blank_probes()));

        let id = mailer.send(&mail).await.unwrap();
        assert!(id.starts_with('<') && id.ends_with("@desk.example>"), "{id}");

        let session = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(session.commands.iter().any(|c| c == "MAIL FROM:<helpdesk@desk.example>"));
        assert!(session.commands.iter().any(|c| c == "RCPT TO:<support@desk.example>"));
        assert!(session.commands.iter().any(|c| c == "RCPT TO:<thandi@example.com>"));
        assert!(session.data.contains(&format!("Message-ID: {id}")));
        assert!(session.data.contains("Subject: Support Ticket from Thandi"));
        assert!(session.data.contains("Reply-To: thandi@example.com"));
        assert!(session.data.contains("multipart/alternative"));
    }

    #[tokio::test]
    async fn smtp_mailer_needs_a_host_and_valid_addresses() {
        assert!(matches!(
            SmtpMailer::from_config(&MailConfig::default()),
            Err(DeliveryError::NotConfigured)
        ));

        let fields = request("Thandi", "thandi@example.com", "").validate().unwrap();
        let cfg = MailConfig {
            to: "not an address".to_string(),
            ..MailConfig::default()
        };
        let mail = OutboundMail::compose(&cfg, &fields, &normalize(&blank_probes()));
        let err = build_message(&mail, "<1@desk.example>").unwrap_err();
        assert!(matches!(err, DeliveryError::Address { ref address, .. } if address == "not an address"));
    }

    #[test]
    fn message_ids_are_unique() {
        let a = new_message_id("desk.example");
        let b = new_message_id("desk.example");
        assert_ne!(a, b);
        assert!(a.ends_with("@desk.example>"));
    }
}
