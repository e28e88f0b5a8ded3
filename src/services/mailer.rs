//! Outbound email
//!
//! `EMAIL_API_KEY`가 있으면 HTTP 이메일 API (Resend 호환), 없으면 로그로만 출력

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::EmailConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// 설정에 맞는 mailer 선택
pub fn from_config(config: &EmailConfig) -> Result<Arc<dyn Mailer>> {
    match &config.api_key {
        Some(api_key) => Ok(Arc::new(HttpMailer::new(config, api_key)?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

pub struct HttpMailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(config: &EmailConfig, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build email HTTP client")?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: api_key.to_string(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&SendRequest {
                from: &self.from,
                to: [email.to.as_str()],
                subject: &email.subject,
                text: &email.text,
            })
            .send()
            .await
            .context("email API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("email API returned {}: {}", status, body);
        }

        info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// 개발용: 본문을 로그로 출력
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, body = %email.text, "Email (not sent, no EMAIL_API_KEY)");
        Ok(())
    }
}

/// 로그인 코드 메일
pub fn login_code_email(to: &str, code: &str, public_app_url: &str) -> OutgoingEmail {
    let verify_url = format!("{}/auth/verify", public_app_url.trim_end_matches('/'));
    let link = reqwest::Url::parse_with_params(&verify_url, &[("email", to), ("code", code)])
        .map(|url| url.to_string())
        .unwrap_or(verify_url);

    OutgoingEmail {
        to: to.to_string(),
        subject: "Your sign-in code".to_string(),
        text: format!(
            "Your sign-in code is {code}.\n\nOr open this link to sign in:\n{link}\n\nThe code expires in 10 minutes."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_code_email() {
        let email = login_code_email("jo+test@example.com", "042137", "http://localhost:3000/");
        assert_eq!(email.to, "jo+test@example.com");
        assert!(email.text.contains("042137"));
        assert!(email
            .text
            .contains("http://localhost:3000/auth/verify?email=jo%2Btest%40example.com&code=042137"));
    }

    #[test]
    fn test_log_mailer_without_api_key() {
        let config = EmailConfig {
            api_url: "http://localhost".to_string(),
            api_key: None,
            from: "no-reply@localhost".to_string(),
        };
        assert!(from_config(&config).is_ok());
    }
}
