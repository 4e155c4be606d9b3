// ==================== EMAIL NOTIFICATIONS ====================
// OTP codes, moderation decisions and enrollment receipts go out over SMTP.
// Everything except the OTP is best-effort: see `notify`.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpConfig;
use crate::models::{Approval, ApprovalStatus};
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> AppResult<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> AppResult<Self> {
        let relay = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        };
        let builder = relay.map_err(|e| AppError::Internal(format!("Invalid SMTP relay {}: {}", config.host, e)))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .build();

        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| AppError::Internal(format!("Invalid SMTP_FROM address: {}", e)))?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> AppResult<()> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| AppError::BadRequest(format!("Invalid recipient {}: {}", email.to, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::External(format!("SMTP delivery failed: {}", e)))?;

        log::info!("📧 Email sent to {}: {}", email.to, email.subject);
        Ok(())
    }
}

/// Used when SMTP is not configured: mail is written to the log instead.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutboundEmail) -> AppResult<()> {
        log::info!("📧 (smtp disabled) to={} subject={}", email.to, email.subject);
        log::debug!("{}", email.html);
        Ok(())
    }
}

/// Sends without failing the caller; delivery errors are only logged.
pub async fn notify(mailer: &dyn Mailer, email: OutboundEmail) {
    let to = email.to.clone();
    if let Err(e) = mailer.send(email).await {
        log::warn!("⚠️ Notification to {} was not delivered: {}", to, e);
    }
}

// ==================== TEMPLATES ====================

/// Escapes user-supplied text for interpolation into the HTML bodies below.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

pub fn otp_email(to: &str, name: &str, otp: &str, ttl_minutes: i64) -> OutboundEmail {
    OutboundEmail {
        to: to.to_string(),
        subject: "Your instructor verification code".to_string(),
        html: format!(
            "<p>Hi {},</p><p>Your verification code is <b>{}</b>. It expires in {} minutes.</p>",
            escape_html(name),
            otp,
            ttl_minutes
        ),
    }
}

/// `kind` is "instructor application", "course" or "video".
pub fn moderation_email(to: &str, name: &str, kind: &str, title: &str, approval: &Approval) -> OutboundEmail {
    let name = escape_html(name);
    let title = escape_html(title);
    let (subject, body) = match approval.status {
        ApprovalStatus::Approved => (
            format!("Your {} has been approved", kind),
            format!("<p>Hi {},</p><p>Your {} <b>{}</b> has been approved.</p>", name, kind, title),
        ),
        ApprovalStatus::Rejected => (
            format!("Your {} was not approved", kind),
            format!(
                "<p>Hi {},</p><p>Your {} <b>{}</b> was rejected.</p><p>Reason: {}</p>",
                name,
                kind,
                title,
                escape_html(approval.reason.as_deref().unwrap_or("not specified"))
            ),
        ),
        ApprovalStatus::Pending => (
            format!("Your {} is under review", kind),
            format!("<p>Hi {},</p><p>Your {} <b>{}</b> is waiting for review.</p>", name, kind, title),
        ),
    };

    OutboundEmail {
        to: to.to_string(),
        subject,
        html: body,
    }
}

pub fn new_application_email(to: &str, applicant_name: &str, applicant_email: &str) -> OutboundEmail {
    OutboundEmail {
        to: to.to_string(),
        subject: "New instructor application".to_string(),
        html: format!(
            "<p>{} ({}) completed an instructor application and is waiting for review.</p>",
            escape_html(applicant_name),
            escape_html(applicant_email)
        ),
    }
}

pub fn enrollment_email(to: &str, name: &str, course_title: &str) -> OutboundEmail {
    OutboundEmail {
        to: to.to_string(),
        subject: format!("You are enrolled in {}", course_title),
        html: format!(
            "<p>Hi {},</p><p>Your payment was received and you now have access to <b>{}</b>.</p>",
            escape_html(name),
            escape_html(course_title)
        ),
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures outgoing mail; optionally fails every send.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<OutboundEmail>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: OutboundEmail) -> AppResult<()> {
            if self.fail {
                return Err(AppError::External("smtp down".to_string()));
            }
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;

    #[actix_rt::test]
    async fn notify_swallows_delivery_failures() {
        let mailer = RecordingMailer {
            fail: true,
            ..Default::default()
        };
        notify(&mailer, enrollment_email("a@example.com", "A", "Rust")).await;
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn notify_delivers_when_possible() {
        let mailer = RecordingMailer::default();
        notify(&mailer, enrollment_email("a@example.com", "A", "Rust")).await;
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "You are enrolled in Rust");
    }

    #[test]
    fn rejection_email_carries_reason() {
        let approval = Approval {
            status: ApprovalStatus::Rejected,
            reason: Some("audio is missing".to_string()),
        };
        let email = moderation_email("i@example.com", "Ira", "video", "Intro", &approval);
        assert_eq!(email.subject, "Your video was not approved");
        assert!(email.html.contains("audio is missing"));
    }

    #[test]
    fn user_text_is_escaped_in_html_bodies() {
        assert_eq!(escape_html(r#"<a href="x">O'Neil & co</a>"#), "&lt;a href=&quot;x&quot;&gt;O&#39;Neil &amp; co&lt;/a&gt;");

        let approval = Approval {
            status: ApprovalStatus::Rejected,
            reason: Some("<script>alert(1)</script>".to_string()),
        };
        let email = moderation_email("i@example.com", "<b>Ira</b>", "course", "<img src=x>", &approval);
        assert!(!email.html.contains("<script>"));
        assert!(!email.html.contains("<img"));
        assert!(email.html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(email.html.contains("Hi &lt;b&gt;Ira&lt;/b&gt;"));

        let enrolled = enrollment_email("a@example.com", "A", "Rust <Advanced>");
        assert!(enrolled.html.contains("Rust &lt;Advanced&gt;"));
        let notice = new_application_email("admin@example.com", "<i>Eve</i>", "eve@example.com");
        assert!(notice.html.contains("&lt;i&gt;Eve&lt;/i&gt;"));
    }

    #[test]
    fn otp_email_contains_code_and_expiry() {
        let email = otp_email("x@example.com", "X", "042917", 10);
        assert!(email.html.contains("042917"));
        assert!(email.html.contains("10 minutes"));
    }
}
