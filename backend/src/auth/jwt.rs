use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

#[cfg(test)]
use jsonwebtoken::{EncodingKey, Header, encode};

/// Claims issued by the authentication provider. `sub` is the opaque user
/// id that history records are keyed by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[cfg(test)]
    #[error("JWT encoding error: {0}")]
    Encoding(String),
    #[error("JWT decoding error: {0}")]
    Decoding(String),
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Token has no subject")]
    MissingSubject,
}

#[derive(Clone)]
pub struct JwtService {
    decoding_key: DecodingKey,
    #[cfg(test)]
    encoding_key: EncodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            #[cfg(test)]
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
        }
    }

    #[cfg(test)]
    pub fn generate_token(&self, user_id: &str, ttl: chrono::Duration) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: None,
            exp: (now + ttl).timestamp().max(0) as usize,
            iat: now.timestamp() as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, JwtError> {
        if token.is_empty() || token.split('.').count() != 3 {
            return Err(JwtError::InvalidToken);
        }

        let validation = Validation::new(Algorithm::HS256);

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(token_data) => {
                let now = Utc::now().timestamp() as usize;
                log::debug!(
                    "JWT decoded for user {} (exp {}, now {})",
                    token_data.claims.sub,
                    token_data.claims.exp,
                    now
                );

                if token_data.claims.exp < now {
                    log::warn!("JWT expired. Exp: {}, Now: {}", token_data.claims.exp, now);
                    return Err(JwtError::TokenExpired);
                }
                if token_data.claims.sub.trim().is_empty() {
                    return Err(JwtError::MissingSubject);
                }
                Ok(token_data.claims)
            }
            Err(err) => {
                log::warn!("JWT decode error: {:?}", err);
                match err.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        Err(JwtError::TokenExpired)
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidToken
                    | jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        Err(JwtError::InvalidToken)
                    }
                    _ => Err(JwtError::Decoding(err.to_string())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let service = JwtService::new("test-secret");
        let token = service.generate_token("user-42", Duration::hours(1)).unwrap();
        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let token = JwtService::new("other-secret")
            .generate_token("user-42", Duration::hours(1))
            .unwrap();
        assert!(matches!(
            JwtService::new("test-secret").verify_token(&token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let service = JwtService::new("test-secret");
        let token = service.generate_token("user-42", Duration::hours(-2)).unwrap();
        assert!(matches!(service.verify_token(&token), Err(JwtError::TokenExpired)));
    }

    #[test]
    fn malformed_token_is_rejected() {
        let service = JwtService::new("test-secret");
        assert!(matches!(service.verify_token(""), Err(JwtError::InvalidToken)));
        assert!(matches!(service.verify_token("abc.def"), Err(JwtError::InvalidToken)));
    }

    #[test]
    fn empty_subject_is_rejected() {
        let service = JwtService::new("test-secret");
        let token = service.generate_token("  ", Duration::hours(1)).unwrap();
        assert!(matches!(service.verify_token(&token), Err(JwtError::MissingSubject)));
    }
}
