use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, models::Role, token::TokenService};

/// AuthUser
///
/// The resolved identity of an authenticated request. Built only from a token that
/// passed signature and expiry verification, and dropped with the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Matches `users.id`.
    pub id: i64,
    pub username: String,
    /// Used for role-based access control. Always the canonical enum.
    pub role: Role,
}

impl AuthUser {
    /// Role gate: passes only if the identity's role is one of `allowed`.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::InsufficientPrivilege)
        }
    }

    pub fn is_elevated(&self) -> bool {
        self.role.is_elevated()
    }
}

/// Pulls the bearer token out of the `Authorization` header.
fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::MissingCredential)
}

/// AuthUser Extractor Implementation (the Authentication Gate)
///
/// 1. Reuse an identity already attached by `require_auth` further up the stack.
/// 2. Otherwise read `Authorization: Bearer <token>`; absent or malformed → 401
///    `missing_credential`.
/// 3. Verify the token; any failure → 401 `invalid_credential`, with the failure kind
///    logged but not disclosed.
///
/// No datastore access happens here: the token alone carries the identity.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let token = bearer_token(parts)?;
        let tokens = TokenService::from_ref(state);
        let user = tokens.verify(token).map_err(ApiError::InvalidCredential)?;

        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// AdminUser
///
/// An `AuthUser` that also passed the Role Authorization Gate for the elevated set.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        user.require_role(&Role::ELEVATED)?;
        Ok(AdminUser(user))
    }
}

/// Owned
///
/// A resource with a recorded owner.
pub trait Owned {
    fn owner_id(&self) -> i64;
}

impl Owned for crate::models::Item {
    fn owner_id(&self) -> i64 {
        self.publisher_id
    }
}

impl Owned for crate::models::Message {
    fn owner_id(&self) -> i64 {
        self.user_id
    }
}

// A photo is owned through its item. Ids start at 1, so a missing join never matches.
impl Owned for crate::models::Photo {
    fn owner_id(&self) -> i64 {
        self.publisher_id.unwrap_or_default()
    }
}

/// Ownership Authorization Check.
///
/// Call only after the resource was loaded: a missing resource is a 404 before it is
/// ever a 403.
pub fn authorize_owner<R: Owned + ?Sized>(user: &AuthUser, resource: &R) -> Result<(), ApiError> {
    if resource.owner_id() == user.id || user.is_elevated() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// require_auth
///
/// Route-layer middleware for the authenticated router. Rejects with 401 before the
/// handler runs; on success the identity rides along in the request extensions.
pub async fn require_auth(user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(user);
    next.run(request).await
}

/// require_admin
///
/// Route-layer middleware for the admin router: authentication first (401), then the
/// elevated-role check (403).
pub async fn require_admin(
    AdminUser(user): AdminUser,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(user);
    next.run(request).await
}
