//! Token validation.
//!
//! Either delegated to the user service or done locally against the shared
//! JWT secret, depending on configuration.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, Validation, decode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ClientResult, decode_json, http_client, trim_base_url};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub email: Option<String>,
    pub role: String,
}

#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// `Ok(None)` means the token was understood and rejected.
    async fn validate_token(&self, token: &str) -> ClientResult<Option<Identity>>;
}

/// Claims issued by the user service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
    pub exp: usize,
}

pub struct JwtIdentityClient {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityClient {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

#[async_trait]
impl IdentityClient for JwtIdentityClient {
    async fn validate_token(&self, token: &str) -> ClientResult<Option<Identity>> {
        let claims = match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => data.claims,
            Err(err) => {
                debug!(error = %err, "token rejected");
                return Ok(None);
            }
        };

        let Ok(user_id) = claims.sub.parse::<i64>() else {
            debug!(sub = %claims.sub, "token subject is not a user id");
            return Ok(None);
        };

        Ok(Some(Identity {
            user_id,
            email: claims.email,
            role: claims.role,
        }))
    }
}

#[derive(Debug, Serialize)]
struct ValidateTokenRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidateTokenResponse {
    valid: bool,
    #[serde(default)]
    user_id: i64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: String,
}

/// Delegates validation to the user service.
#[derive(Debug, Clone)]
pub struct RemoteIdentityClient {
    client: Client,
    base_url: String,
}

impl RemoteIdentityClient {
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> ClientResult<Self> {
        Ok(Self {
            client: http_client(connect_timeout, request_timeout)?,
            base_url: trim_base_url(base_url),
        })
    }
}

#[async_trait]
impl IdentityClient for RemoteIdentityClient {
    async fn validate_token(&self, token: &str) -> ClientResult<Option<Identity>> {
        let url = format!("{}/api/v1/auth/validate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ValidateTokenRequest { token })
            .send()
            .await?;
        let body: ValidateTokenResponse = decode_json(response).await?;

        if !body.valid {
            return Ok(None);
        }
        Ok(Some(Identity {
            user_id: body.user_id,
            email: body.email,
            role: body.role,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(secret: &str, sub: &str, exp: usize) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            email: Some("buyer@example.com".into()),
            role: "user".into(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[tokio::test]
    async fn accepts_token_signed_with_shared_secret() {
        let client = JwtIdentityClient::new("secret");
        let identity = client
            .validate_token(&token("secret", "42", far_future()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.user_id, 42);
        assert_eq!(identity.role, "user");
    }

    #[tokio::test]
    async fn rejects_foreign_signature_and_bad_subject() {
        let client = JwtIdentityClient::new("secret");
        assert!(
            client
                .validate_token(&token("other", "42", far_future()))
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            client
                .validate_token(&token("secret", "not-a-number", far_future()))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let client = JwtIdentityClient::new("secret");
        let expired = (chrono::Utc::now().timestamp() - 3600) as usize;
        assert!(
            client
                .validate_token(&token("secret", "42", expired))
                .await
                .unwrap()
                .is_none()
        );
    }
}
