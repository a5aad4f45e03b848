use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

use crate::config::SmtpConfig;
use crate::models::PendingDrop;
use crate::plugins::traits::NotificationTransport;
use crate::utils::error::{AppError, Result};

const TRANSPORT_NAME: &str = "email";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailTestReport {
    pub config_valid: bool,
    pub smtp_connection: bool,
    pub test_email_sent: bool,
    pub error: Option<String>,
}

/// SMTP delivery with multipart text and HTML bodies.
pub struct EmailTransport {
    config: SmtpConfig,
}

fn transport_error(message: impl std::fmt::Display) -> AppError {
    AppError::TransportFailed {
        transport: TRANSPORT_NAME.to_string(),
        message: message.to_string(),
    }
}

impl EmailTransport {
    pub fn new(config: SmtpConfig) -> Self {
        if !config.is_configured() {
            tracing::warn!("SMTP credentials or recipient not configured. Email notifications will be disabled.");
        }
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    fn mailer(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let username = self.config.username.clone().unwrap_or_default();
        let password = self.config.password.clone().unwrap_or_default();
        let credentials = Credentials::new(username, password);

        let builder = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host).map_err(transport_error)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.host)
        };

        Ok(builder.port(self.config.port).credentials(credentials).build())
    }

    fn sender(&self) -> Result<Mailbox> {
        let address = self
            .config
            .from_address
            .as_deref()
            .or(self.config.username.as_deref())
            .ok_or_else(|| transport_error("no sender address configured"))?;
        format!("{} <{}>", self.config.from_name, address)
            .parse()
            .map_err(transport_error)
    }

    fn recipient(&self) -> Result<Mailbox> {
        self.config
            .recipient
            .as_deref()
            .ok_or_else(|| transport_error("no recipient configured"))?
            .parse()
            .map_err(transport_error)
    }

    fn build_message(&self, subject: String, text_body: String, html_body: Option<String>) -> Result<Message> {
        let builder = Message::builder()
            .from(self.sender()?)
            .to(self.recipient()?)
            .subject(subject);

        let message = match html_body {
            Some(html_body) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            ),
            None => builder.header(header::ContentType::TEXT_PLAIN).body(text_body),
        };

        message.map_err(transport_error)
    }

    async fn deliver(&self, message: Message) -> Result<()> {
        self.mailer()?.send(message).await.map_err(transport_error)?;
        Ok(())
    }

    async fn send_logged(&self, what: &str, message: Result<Message>) -> bool {
        if !self.is_enabled() {
            tracing::warn!("Email not configured; {} not sent", what);
            return false;
        }

        let result = match message {
            Ok(message) => self.deliver(message).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!("Sent {} via email", what);
                true
            }
            Err(e) => {
                tracing::error!("Failed to send {}: {}", what, e);
                false
            }
        }
    }

    /// Connect, authenticate and send a short test message.
    pub async fn test_connection(&self) -> EmailTestReport {
        let mut report = EmailTestReport::default();

        if !self.is_enabled() {
            report.error = Some("Invalid email configuration".to_string());
            return report;
        }
        report.config_valid = true;

        let mailer = match self.mailer() {
            Ok(mailer) => mailer,
            Err(e) => {
                report.error = Some(e.to_string());
                return report;
            }
        };

        match mailer.test_connection().await {
            Ok(true) => report.smtp_connection = true,
            Ok(false) => {
                report.error = Some(format!("Could not connect to {}:{}", self.config.host, self.config.port));
                return report;
            }
            Err(e) => {
                report.error = Some(e.to_string());
                return report;
            }
        }

        let text = format!(
            "This is a test email from your Dropwatch installation.\n\n\
             If you received this email, your email configuration is working correctly!\n\n\
             Timestamp: {}\n",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        let sent = match self.build_message("🧪 Dropwatch - Test Email".to_string(), text, None) {
            Ok(message) => self.deliver(message).await,
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => {
                report.test_email_sent = true;
                tracing::info!("Email configuration test successful");
            }
            Err(e) => {
                tracing::error!("Email configuration test failed: {}", e);
                report.error = Some(e.to_string());
            }
        }
        report
    }

    fn format_subject(&self, drop: &PendingDrop) -> String {
        format!("🚨 Price Drop Alert: {}", drop.product_name)
    }

    fn format_summary_subject(&self, drops: &[PendingDrop]) -> String {
        format!("📊 Dropwatch Summary - {} Price Drops", drops.len())
    }

    fn format_html_body(&self, drop: &PendingDrop) -> String {
        let event = &drop.event;
        format!(
            r#"
<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .price-drop {{ background: #e8f5e8; border-left: 4px solid #4CAF50; padding: 15px; border-radius: 5px; }}
        .old-price {{ text-decoration: line-through; color: #6c757d; }}
        .new-price {{ color: #28a745; font-weight: bold; }}
        .button {{ display: inline-block; padding: 8px 15px; text-decoration: none; border-radius: 3px; background: #007cba; color: white; }}
    </style>
</head>
<body>
    <h2>{name}</h2>
    <div class="price-drop">
        <strong>Price dropped by {percent:.1}%</strong> (saving {amount:.2})<br>
        <span class="old-price">Old price: {old:.2}</span><br>
        <span class="new-price">New price: {new:.2}</span><br>
        Threshold: {threshold:.2}
    </div>
    <p><a href="{url}" class="button">View Product</a></p>
</body>
</html>
"#,
            name = escape_html(&drop.product_name),
            percent = event.drop_percent(),
            amount = event.drop_amount(),
            old = event.old_price,
            new = event.new_price,
            threshold = event.threshold_price,
            url = escape_html(&drop.url),
        )
    }

    fn format_text_body(&self, drop: &PendingDrop) -> String {
        let event = &drop.event;
        let mut text = String::new();

        text.push_str("🔔 PRICE DROP ALERT\n\n");
        text.push_str(&format!("Product: {}\n", drop.product_name));
        text.push_str(&format!("Old Price: {:.2}\n", event.old_price));
        text.push_str(&format!("New Price: {:.2}\n", event.new_price));
        text.push_str(&format!(
            "Price Drop: {:.2} ({:.1}%)\n",
            event.drop_amount(),
            event.drop_percent()
        ));
        text.push_str(&format!("Threshold Price: {:.2}\n\n", event.threshold_price));
        text.push_str(&format!("View Product: {}\n", drop.url));

        text
    }

    fn format_summary_text(&self, drops: &[PendingDrop]) -> String {
        let mut text = format!("{} products dropped below your target price:\n\n", drops.len());
        for drop in drops {
            text.push_str(&format!(
                "- {}: {:.2} -> {:.2} ({:.1}% off)\n  {}\n",
                drop.product_name,
                drop.event.old_price,
                drop.event.new_price,
                drop.event.drop_percent(),
                drop.url
            ));
        }
        text
    }

    fn format_summary_html(&self, drops: &[PendingDrop]) -> String {
        let mut rows = String::new();
        for drop in drops {
            rows.push_str(&format!(
                r#"<tr><td><a href="{}">{}</a></td><td>{:.2}</td><td>{:.2}</td><td>{:.1}%</td></tr>"#,
                escape_html(&drop.url),
                escape_html(&drop.product_name),
                drop.event.old_price,
                drop.event.new_price,
                drop.event.drop_percent()
            ));
        }

        format!(
            r#"
<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif;">
    <h2>{} Price Drops</h2>
    <table cellpadding="6">
        <tr><th>Product</th><th>Old</th><th>New</th><th>Drop</th></tr>
        {}
    </table>
</body>
</html>
"#,
            drops.len(),
            rows
        )
    }
}

/// Scraped titles and URLs are untrusted markup.
fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[async_trait]
impl NotificationTransport for EmailTransport {
    fn name(&self) -> &'static str {
        TRANSPORT_NAME
    }

    async fn send_one(&self, drop: &PendingDrop) -> bool {
        let message = self.build_message(
            self.format_subject(drop),
            self.format_text_body(drop),
            Some(self.format_html_body(drop)),
        );
        self.send_logged(&format!("price drop alert for {}", drop.product_name), message)
            .await
    }

    async fn send_summary(&self, drops: &[PendingDrop]) -> bool {
        let message = self.build_message(
            self.format_summary_subject(drops),
            self.format_summary_text(drops),
            Some(self.format_summary_html(drops)),
        );
        self.send_logged(&format!("summary of {} price drops", drops.len()), message)
            .await
    }
}
