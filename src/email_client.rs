/// Mail-sending collaborator
///
/// Thin JSON client for the mail relay. The orchestrator treats sends as
/// fire-and-forget: a failure here is logged, never surfaced as an auth
/// failure, so responses cannot leak whether an address exists or
/// whether delivery worked.

use serde::Serialize;

use crate::configuration::EmailSettings;
use crate::error::EmailError;
use crate::store::TokenPurpose;

#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    relay_url: String,
    sender: String,
    link_base_url: String,
}

#[derive(Serialize)]
struct SendEmailRequest {
    from: String,
    to: String,
    #[serde(rename = "Subject")]
    subject: String,
    #[serde(rename = "Html")]
    html: String,
}

impl EmailClient {
    pub fn new(settings: EmailSettings, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            relay_url: settings.relay_url,
            sender: settings.sender,
            link_base_url: settings.link_base_url,
        }
    }

    /// Render and send the email for a token purpose.
    ///
    /// The plaintext token value is embedded into a link under the
    /// configured base URL; it never appears in logs.
    pub async fn send_token_email(
        &self,
        recipient: &str,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<(), EmailError> {
        let (subject, html) = match purpose {
            TokenPurpose::PasswordReset => (
                "Reset your password",
                format!(
                    "<p>Click <a href=\"{}/password-reset?token={}\">here</a> to choose a new password. The link expires soon and works once.</p>",
                    self.link_base_url, token
                ),
            ),
            TokenPurpose::VerifyEmail => (
                "Confirm your email address",
                format!(
                    "<p>Click <a href=\"{}/verify-email?token={}\">here</a> to activate your account.</p>",
                    self.link_base_url, token
                ),
            ),
        };

        self.send_email(recipient, subject, &html).await
    }

    pub async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), EmailError> {
        let url = format!("{}/email", self.relay_url);
        let request = SendEmailRequest {
            from: self.sender.clone(),
            to: recipient.to_string(),
            subject: subject.to_string(),
            html: html_content.to_string(),
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmailError::ServiceUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        Ok(())
    }
}
