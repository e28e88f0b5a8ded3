//! OAuth 2.0 login (Google, LinkedIn)
//!
//! 둘 다 OpenID Connect userinfo를 지원하므로 흐름이 같음:
//! authorize URL → (브라우저) → code → token 교환 → userinfo

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::error;

use crate::config::{Config, OAuthCredentials};
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    LinkedIn,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::LinkedIn => "linkedin",
        }
    }

    fn authorize_endpoint(self) -> &'static str {
        match self {
            Provider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Provider::LinkedIn => "https://www.linkedin.com/oauth/v2/authorization",
        }
    }

    fn token_endpoint(self) -> &'static str {
        match self {
            Provider::Google => "https://oauth2.googleapis.com/token",
            Provider::LinkedIn => "https://www.linkedin.com/oauth/v2/accessToken",
        }
    }

    fn userinfo_endpoint(self) -> &'static str {
        match self {
            Provider::Google => "https://openidconnect.googleapis.com/v1/userinfo",
            Provider::LinkedIn => "https://api.linkedin.com/v2/userinfo",
        }
    }

    fn scope(self) -> &'static str {
        match self {
            Provider::Google => "openid email profile",
            Provider::LinkedIn => "openid profile email",
        }
    }
}

impl FromStr for Provider {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "linkedin" => Ok(Provider::LinkedIn),
            other => Err(ApiError::NotFound(format!("OAuth provider {}", other))),
        }
    }
}

/// userinfo에서 필요한 부분
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProfile {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct OAuthClient {
    http: reqwest::Client,
    google: Option<OAuthCredentials>,
    linkedin: Option<OAuthCredentials>,
    redirect_base: String,
}

impl OAuthClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            google: config.google.clone(),
            linkedin: config.linkedin.clone(),
            redirect_base: config.oauth_redirect_base.trim_end_matches('/').to_string(),
        })
    }

    fn credentials(&self, provider: Provider) -> ApiResult<&OAuthCredentials> {
        let creds = match provider {
            Provider::Google => self.google.as_ref(),
            Provider::LinkedIn => self.linkedin.as_ref(),
        };
        creds.ok_or_else(|| {
            ApiError::BadRequest(format!("{} login is not configured", provider.as_str()))
        })
    }

    pub fn redirect_uri(&self, provider: Provider) -> String {
        format!("{}/auth/callback/{}", self.redirect_base, provider.as_str())
    }

    /// 브라우저를 보낼 authorize URL
    pub fn authorize_url(&self, provider: Provider, state: &str) -> ApiResult<String> {
        let creds = self.credentials(provider)?;
        let redirect_uri = self.redirect_uri(provider);

        let url = reqwest::Url::parse_with_params(
            provider.authorize_endpoint(),
            &[
                ("response_type", "code"),
                ("client_id", creds.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("scope", provider.scope()),
                ("state", state),
            ],
        )
        .map_err(|_| ApiError::InternalError)?;

        Ok(url.to_string())
    }

    /// code → access token → userinfo
    pub async fn exchange(&self, provider: Provider, code: &str) -> ApiResult<OAuthProfile> {
        let creds = self.credentials(provider)?;
        let redirect_uri = self.redirect_uri(provider);

        let token: TokenResponse = self
            .http
            .post(provider.token_endpoint())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| upstream_error(provider, "token exchange", e))?
            .json()
            .await
            .map_err(|e| upstream_error(provider, "token decode", e))?;

        let profile: OAuthProfile = self
            .http
            .get(provider.userinfo_endpoint())
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| upstream_error(provider, "userinfo", e))?
            .json()
            .await
            .map_err(|e| upstream_error(provider, "userinfo decode", e))?;

        if profile.email.trim().is_empty() {
            return Err(ApiError::BadGateway(format!("{} userinfo", provider.as_str())));
        }

        Ok(profile)
    }
}

fn upstream_error(provider: Provider, step: &str, e: reqwest::Error) -> ApiError {
    error!(provider = provider.as_str(), step, error = %e, "OAuth provider request failed");
    ApiError::BadGateway(format!("{} {}", provider.as_str(), step))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(google: Option<OAuthCredentials>) -> OAuthClient {
        OAuthClient {
            http: reqwest::Client::new(),
            google,
            linkedin: None,
            redirect_base: "https://app.example.com".to_string(),
        }
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("google".parse::<Provider>().unwrap(), Provider::Google);
        assert_eq!("LinkedIn".parse::<Provider>().unwrap(), Provider::LinkedIn);
        assert!("github".parse::<Provider>().is_err());
    }

    #[test]
    fn test_authorize_url() {
        let c = client(Some(OAuthCredentials {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
        }));

        let url = c.authorize_url(Provider::Google, "abc.def").unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("state=abc.def"));
        assert!(url.contains(
            "redirect_uri=https%3A%2F%2Fapp.example.com%2Fauth%2Fcallback%2Fgoogle"
        ));
        assert!(!url.contains("secret"));
    }

    #[test]
    fn test_unconfigured_provider() {
        let c = client(None);
        assert!(matches!(
            c.authorize_url(Provider::Google, "s"),
            Err(ApiError::BadRequest(_))
        ));
    }
}
