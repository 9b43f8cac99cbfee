pub mod permissions;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// JWT claims carried by bearer tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Staff profile id
    pub sub: String,
    /// Display name, if the issuer embedded one
    #[serde(default)]
    pub name: Option<String>,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
}

/// Authenticated actor attached to every request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub staff_id: Uuid,
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication token")]
    MissingAuth,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Invalid subject: {0}")]
    InvalidSubject(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        ServiceError::Unauthenticated(err.to_string())
    }
}

/// Token validation configuration
#[derive(Clone)]
pub struct AuthConfig {
    secret: String,
    issuer: String,
    audience: String,
    token_ttl_secs: usize,
}

impl AuthConfig {
    pub fn new(secret: String, issuer: String, audience: String, token_ttl_secs: usize) -> Self {
        Self {
            secret,
            issuer,
            audience,
            token_ttl_secs,
        }
    }
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            cfg.auth_issuer.clone(),
            cfg.auth_audience.clone(),
            cfg.jwt_expiration,
        )
    }
}

/// Validates bearer tokens and resolves them into an [`AuthUser`].
///
/// Identity provisioning (login, password storage, refresh) lives in an
/// external identity service; this service only verifies what it is handed.
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Validate a bearer token and return its claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(data.claims)
    }

    /// Issue a token for a staff profile. Used by tooling and tests; the
    /// production issuer lives outside this service.
    pub fn generate_token(
        &self,
        staff_id: Uuid,
        name: Option<&str>,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: staff_id.to_string(),
            name: name.map(str::to_string),
            exp: now + self.config.token_ttl_secs,
            iat: now,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

impl TryFrom<Claims> for AuthUser {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let staff_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::InvalidSubject(claims.sub.clone()))?;
        Ok(AuthUser {
            staff_id,
            name: claims.name,
        })
    }
}

/// Authentication middleware: validates the bearer token and attaches the
/// resulting [`AuthUser`] to request extensions.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AuthError::MissingAuth)?;

    let claims = auth.validate_token(token)?;
    let user = AuthUser::try_from(claims)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> AuthService {
        AuthService::new(AuthConfig::new(
            "test_secret_key_for_testing_purposes_only_32chars".into(),
            "medsupply-api".into(),
            "medsupply-clients".into(),
            3600,
        ))
    }

    #[test]
    fn round_trips_a_generated_token() {
        let service = test_service();
        let staff_id = Uuid::new_v4();

        let token = service.generate_token(staff_id, Some("Dana Ortiz")).unwrap();
        let claims = service.validate_token(&token).unwrap();
        let user = AuthUser::try_from(claims).unwrap();

        assert_eq!(user.staff_id, staff_id);
        assert_eq!(user.name.as_deref(), Some("Dana Ortiz"));
    }

    #[test]
    fn rejects_a_token_signed_with_another_secret() {
        let service = test_service();
        let other = AuthService::new(AuthConfig::new(
            "a_completely_different_secret_key_32_chars_long!".into(),
            "medsupply-api".into(),
            "medsupply-clients".into(),
            3600,
        ));

        let token = other.generate_token(Uuid::new_v4(), None).unwrap();
        assert!(service.validate_token(&token).is_err());
    }

    #[test]
    fn rejects_a_non_uuid_subject() {
        let claims = Claims {
            sub: "not-a-uuid".into(),
            name: None,
            exp: 0,
            iat: 0,
            iss: "x".into(),
            aud: "y".into(),
        };
        assert!(AuthUser::try_from(claims).is_err());
    }
}
