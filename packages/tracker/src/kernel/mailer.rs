//! Website-update notification email: rendering and SES dispatch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use std::sync::Mutex;
use url::Url;

use crate::kernel::traits::BaseMailer;

/// A rendered notification email.
#[derive(Debug, Clone)]
pub struct UpdateEmail {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Render the HTML + plain-text notification for a changed website.
pub fn render_update_email(url: &str) -> UpdateEmail {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default();

    let subject = format!("Website Update Alert - {}", url);

    let host_html = if host.is_empty() {
        String::new()
    } else {
        format!("<p><strong>Name:</strong> {}</p>", host)
    };
    let html_body = format!(
        r#"<html>
  <body>
    <div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
      <h2 style="color: #333;">Website Update Notification</h2>
      <div style="background-color: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0;">
        <h3 style="color: #495057; margin-top: 0;">Website Details:</h3>
        <p><strong>URL:</strong> <a href="{url}" style="color: #007bff;">{url}</a></p>
        {host_html}
        <p><strong>Status:</strong> <span style="color: #28a745; font-weight: bold;">Updated</span></p>
      </div>
      <div style="background-color: #e9ecef; padding: 15px; border-radius: 6px;">
        <p style="margin: 0; color: #6c757d;">
          This is an automated notification from your website monitoring service.
          The above website has been updated with new content.
        </p>
      </div>
      <p style="margin-top: 20px; color: #6c757d; font-size: 12px;">
        You are receiving this email because you have subscribed to monitor changes on this website.
      </p>
    </div>
  </body>
</html>"#
    );

    let text_body = format!(
        "Website Update Notification\n\n\
         Website Details:\n\
         - URL: {url}\n\
         - Name: {host}\n\
         - Status: Updated\n\n\
         This is an automated notification from your website monitoring service.\n\
         The above website has been updated with new content.\n\n\
         You are receiving this email because you have subscribed to monitor changes on this website.\n"
    );

    UpdateEmail {
        subject,
        html_body,
        text_body,
    }
}

/// SES-backed mailer with a fixed sender address.
pub struct SesMailer {
    client: aws_sdk_sesv2::Client,
    from_email: String,
}

impl SesMailer {
    /// Build a client from the ambient AWS environment.
    pub async fn from_env(from_email: String) -> Self {
        let region_provider = RegionProviderChain::default_provider().or_else("us-east-1");
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;
        let client = aws_sdk_sesv2::Client::new(&aws_config);
        Self { client, from_email }
    }
}

#[async_trait]
impl BaseMailer for SesMailer {
    async fn send_update_email(&self, to: &str, url: &str) -> Result<()> {
        let email = render_update_email(url);

        let subject = Content::builder()
            .data(email.subject)
            .charset("UTF-8")
            .build()
            .context("Failed to build email subject")?;
        let html = Content::builder()
            .data(email.html_body)
            .charset("UTF-8")
            .build()
            .context("Failed to build email html body")?;
        let text = Content::builder()
            .data(email.text_body)
            .charset("UTF-8")
            .build()
            .context("Failed to build email text body")?;

        let message = Message::builder()
            .subject(subject)
            .body(Body::builder().html(html).text(text).build())
            .build();

        self.client
            .send_email()
            .from_email_address(&self.from_email)
            .destination(Destination::builder().to_addresses(to).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .with_context(|| format!("Failed to send update email to {}", to))?;

        tracing::info!("Email sent successfully to {}", to);
        Ok(())
    }
}

/// A dispatched email recorded by the test mailer.
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub url: String,
    pub subject: String,
}

/// Recording mailer for tests. Optionally fails every send.
#[derive(Default)]
pub struct TestMailer {
    sent: Mutex<Vec<SentEmail>>,
    fail: bool,
}

impl TestMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose sends always fail (delivery-error path).
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent_emails(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl BaseMailer for TestMailer {
    async fn send_update_email(&self, to: &str, url: &str) -> Result<()> {
        if self.fail {
            anyhow::bail!("simulated delivery failure to {}", to);
        }
        let email = render_update_email(url);
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentEmail {
                to: to.to_string(),
                url: url.to_string(),
                subject: email.subject,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_contains_url() {
        let email = render_update_email("https://example.com/jobs");
        assert!(email.subject.contains("https://example.com/jobs"));
    }

    #[test]
    fn body_contains_host_and_status() {
        let email = render_update_email("https://example.com/jobs");
        assert!(email.html_body.contains("example.com"));
        assert!(email.html_body.contains("Updated"));
        assert!(email.text_body.contains("- Name: example.com"));
        assert!(email.text_body.contains("- Status: Updated"));
    }

    #[test]
    fn unparseable_url_still_renders() {
        let email = render_update_email("not a url");
        assert!(email.subject.contains("not a url"));
        assert!(email.text_body.contains("- Name: \n"));
    }
}
