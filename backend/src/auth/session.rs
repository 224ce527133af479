use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest, web};
use futures::future::{Ready, err, ok};

use super::jwt::{JwtError, JwtService};
use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid Authorization header format")]
    InvalidHeaderFormat,
    #[error("Authorization header is not a Bearer token")]
    NotBearerToken,
    #[error("Token verification failed: {0}")]
    Verification(#[from] JwtError),
    #[error("Token verification is not configured")]
    NotConfigured,
}

/// The signed-in user behind a request, if any. A request without an
/// Authorization header is anonymous, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session(Option<String>);

impl Session {
    pub fn anonymous() -> Self {
        Session(None)
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Session(Some(user_id.into()))
    }

    pub fn current_user_id(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

fn session_from_request(req: &HttpRequest) -> Result<Session, SessionError> {
    let Some(auth_header) = req.headers().get("Authorization") else {
        return Ok(Session::anonymous());
    };
    let auth_str = auth_header
        .to_str()
        .map_err(|_| SessionError::InvalidHeaderFormat)?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or(SessionError::NotBearerToken)?;

    let jwt_service = req
        .app_data::<web::Data<JwtService>>()
        .ok_or(SessionError::NotConfigured)?;
    let claims = jwt_service.verify_token(token.trim())?;

    log::debug!("Session established for user {}", claims.sub);
    Ok(Session::for_user(claims.sub))
}

impl FromRequest for Session {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match session_from_request(req) {
            Ok(session) => ok(session),
            Err(e) => {
                log::warn!("Rejecting credentials for {}: {}", req.path(), e);
                err(e.into())
            }
        }
    }
}
