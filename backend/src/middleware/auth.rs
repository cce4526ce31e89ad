//! Authentication middleware
//!
//! Validates bearer tokens issued by the identity provider and checks the
//! caller's role against each operation

use std::str::FromStr;

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ErrorDetail, ErrorResponse};

/// Roles recognised by the materials service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Bodeguero,
    Tecnico,
    Analista,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Bodeguero => "bodeguero",
            Role::Tecnico => "tecnico",
            Role::Analista => "analista",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bodeguero" => Ok(Role::Bodeguero),
            "tecnico" => Ok(Role::Tecnico),
            "analista" => Ok(Role::Analista),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role '{}'", s)),
        }
    }
}

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub rol: Role,
}

impl AuthUser {
    pub fn has_role(&self, roles: &[Role]) -> bool {
        self.rol == Role::Admin || roles.contains(&self.rol)
    }

    /// Fail unless the user holds one of `roles` (admins always pass)
    pub fn require_role(&self, roles: &[Role]) -> AppResult<()> {
        if self.has_role(roles) {
            Ok(())
        } else {
            let names: Vec<_> = roles.iter().map(Role::as_str).collect();
            Err(AppError::Forbidden(format!(
                "requires role {}",
                names.join(" or ")
            )))
        }
    }

    /// Technician-facing operations: the control's own technician or an admin
    pub fn require_technician(&self, technician_id: Uuid) -> AppResult<()> {
        if self.rol == Role::Admin || (self.rol == Role::Tecnico && self.user_id == technician_id)
        {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "only the assigned technician may do this".to_string(),
            ))
        }
    }

    /// Reads about one technician: that technician, or staff holding `roles`
    pub fn require_self_or_role(&self, technician_id: Uuid, roles: &[Role]) -> AppResult<()> {
        if self.user_id == technician_id || self.has_role(roles) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "not allowed to read another technician's records".to_string(),
            ))
        }
    }

    /// Analysts get entries flagged as hidden from them filtered out
    pub fn sees_hidden_entries(&self) -> bool {
        self.rol != Role::Analista
    }
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return unauthorized_response("Missing or invalid Authorization header"),
    };

    // The middleware runs without router state, so the secret comes from the
    // same environment variable the config layer reads
    let jwt_secret = std::env::var("FMR__JWT__SECRET")
        .unwrap_or_else(|_| "development-secret-key".to_string());

    let auth_user = match decode_jwt(token, &jwt_secret).and_then(AuthUser::try_from) {
        Ok(user) => user,
        Err(msg) => return unauthorized_response(&msg),
    };

    request.extensions_mut().insert(auth_user);

    next.run(request).await
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub rol: String,
    pub exp: i64,
    pub iat: i64,
}

impl TryFrom<Claims> for AuthUser {
    type Error = String;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| "Invalid user ID in token".to_string())?;
        let rol = claims.rol.parse::<Role>()?;
        Ok(AuthUser { user_id, rol })
    }
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> Result<Claims, String> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {}", e))
}

fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail::new("UNAUTHORIZED", message),
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse {
                        error: ErrorDetail::new("UNAUTHORIZED", "Authentication required"),
                    }),
                )
            })
    }
}
