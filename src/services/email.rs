use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use log::{error, info, warn};

use crate::config::Config;

pub struct EmailService;

impl EmailService {
    pub async fn send_provider_approval(email: &str, name: &str) -> bool {
        let subject = format!("Your {} provider account has been approved", Config::app_name());
        let body = approval_body(name, &Config::app_name(), &Config::client_url());
        Self::deliver(email, subject, body, "approval").await
    }

    pub async fn send_provider_rejection(email: &str, name: &str, reason: Option<&str>) -> bool {
        let subject = format!("Update on your {} provider application", Config::app_name());
        let body = rejection_body(name, &Config::app_name(), reason);
        Self::deliver(email, subject, body, "rejection").await
    }

    async fn deliver(email: &str, subject: String, body: String, kind: &str) -> bool {
        let to = email.to_string();
        let outcome = tokio::task::spawn_blocking(move || try_send(&to, &subject, body)).await;

        match outcome {
            Ok(Ok(())) => {
                info!("Provider {} email sent to {}", kind, email);
                true
            }
            Ok(Err(e)) => {
                error!("Failed to send provider {} email to {}: {}", kind, email, e);
                false
            }
            Err(e) => {
                error!("Email task for {} panicked: {}", email, e);
                false
            }
        }
    }
}

fn try_send(to: &str, subject: &str, body: String) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mail_user = Config::mail_user();
    let mail_password = Config::mail_password();

    if mail_user.is_empty() || mail_password.is_empty() {
        warn!("Email credentials not configured. Skipping email send.");
        return Err("Email not configured".into());
    }

    let from_mailbox: Mailbox = Config::mail_from().parse()?;
    let to_mailbox: Mailbox = to.parse()?;

    let message = Message::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(body)?;

    let mailer = SmtpTransport::starttls_relay(&Config::mail_host())?
        .port(Config::mail_port())
        .credentials(Credentials::new(mail_user, mail_password))
        .build();

    mailer.send(&message)?;
    Ok(())
}

fn layout(app_name: &str, heading: &str, content: &str) -> String {
    format!(
        r#"
        <!DOCTYPE html>
        <html>
        <head>
            <style>
                body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
                .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
                .header {{ background: #2f6fed; color: white; padding: 24px; text-align: center; border-radius: 10px 10px 0 0; }}
                .content {{ background: #f9f9f9; padding: 24px; border-radius: 0 0 10px 10px; }}
                .button {{ display: inline-block; background: #2f6fed; color: white; padding: 10px 20px; border-radius: 6px; text-decoration: none; }}
                .footer {{ text-align: center; margin-top: 20px; color: #666; font-size: 12px; }}
            </style>
        </head>
        <body>
            <div class="container">
                <div class="header"><h1>{app_name}</h1><p>{heading}</p></div>
                <div class="content">{content}</div>
                <div class="footer"><p>{app_name} Team</p></div>
            </div>
        </body>
        </html>
        "#
    )
}

/// Escapes text interpolated into mail markup.
fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn approval_body(name: &str, app_name: &str, client_url: &str) -> String {
    let name = escape_html(name);
    let content = format!(
        r#"
        <p>Hello {name},</p>
        <p>Good news! Your provider account has been approved. You can now log in, apply to jobs and showcase your work.</p>
        <p><a class="button" href="{client_url}/login">Log in</a></p>
        "#
    );
    layout(app_name, "Account approved", &content)
}

fn rejection_body(name: &str, app_name: &str, reason: Option<&str>) -> String {
    let reason = reason
        .filter(|r| !r.trim().is_empty())
        .map(|r| format!("<p><strong>Reason:</strong> {}</p>", escape_html(r)))
        .unwrap_or_default();
    let name = escape_html(name);
    let content = format!(
        r#"
        <p>Hello {name},</p>
        <p>We reviewed your provider application and are unable to approve it at this time.</p>
        {reason}
        <p>If you believe this is a mistake, please contact our support team.</p>
        "#
    );
    layout(app_name, "Application update", &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_mentions_reason_only_when_given() {
        let with = rejection_body("Sam", "WorkBond", Some("Missing documents"));
        assert!(with.contains("Missing documents"));
        let without = rejection_body("Sam", "WorkBond", Some("  "));
        assert!(!without.contains("Reason:"));
    }

    #[test]
    fn approval_links_to_client() {
        let body = approval_body("Sam", "WorkBond", "https://app.example.com");
        assert!(body.contains("https://app.example.com/login"));
        assert!(body.contains("Hello Sam"));
    }

    #[test]
    fn provider_text_is_escaped() {
        let body = rejection_body("<b>Sam</b> & Co", "WorkBond", Some(r#"<a href="x">see</a>"#));
        assert!(body.contains("&lt;b&gt;Sam&lt;/b&gt; &amp; Co"));
        assert!(body.contains("&lt;a href=&quot;x&quot;&gt;see&lt;/a&gt;"));
        assert!(!body.contains("<b>Sam"));

        let approval = approval_body("<script>", "WorkBond", "http://localhost:3000");
        assert!(approval.contains("Hello &lt;script&gt;,"));
    }
}
