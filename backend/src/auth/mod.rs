use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::handlers::AppState;
use crate::proposal::Actor;
use crate::status::Role;

#[cfg(test)]
const TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    exp: usize,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("subject is not a user id: {0}")]
    Subject(#[from] uuid::Error),
    #[cfg(test)]
    #[error("system clock before unix epoch")]
    Clock,
}

/// Tokens are minted by the identity provider that shares `JWT_SECRET`;
/// this mirror of its claims exists for tests.
#[cfg(test)]
pub fn create_token(user_id: Uuid, role: Role, jwt_secret: &str) -> Result<String, AuthError> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| AuthError::Clock)?
        .as_secs();
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: (now + TOKEN_TTL_SECS) as usize,
    };
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_bytes()))?)
}

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<Actor, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(Actor {
        user_id: Uuid::parse_str(&token_data.claims.sub)?,
        role: token_data.claims.role,
    })
}

/// Resolves the bearer token into an [`Actor`] request extension.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or((StatusCode::UNAUTHORIZED, "Missing Authorization header".to_string()))?;
    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Invalid Authorization header format".to_string(),
        ))?;
    let actor = validate_token(token, &state.config.jwt_secret).map_err(|e| {
        log::debug!("Rejected token: {}", e);
        (StatusCode::UNAUTHORIZED, "Invalid or expired token".to_string())
    })?;
    log::debug!("Authenticated {:?} {}", actor.role, actor.user_id);
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_user_and_role() {
        let user_id = Uuid::new_v4();
        let token = create_token(user_id, Role::Host, "secret").unwrap();
        let actor = validate_token(&token, "secret").unwrap();
        assert_eq!(actor, Actor { user_id, role: Role::Host });
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_token(Uuid::new_v4(), Role::Guest, "secret").unwrap();
        assert!(matches!(validate_token(&token, "other"), Err(AuthError::Token(_))));
    }
}
