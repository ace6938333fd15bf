//! This module holds all endpoints regarding authentication

use actix_web::post;
use actix_web::web::{Data, Json};
use argon2::password_hash::Error;
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use chrono::Utc;
use rorm::{query, update, Database, FieldAccess, Model};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{User, UserRole};
use crate::server::handler::{ApiError, ApiErrorResponse, ApiResult};
use crate::token::TokenIssuer;

/// The request data of a login request
#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    #[schema(example = "herbert@example.com")]
    email: String,
    #[schema(example = "super-secure-password")]
    password: String,
}

/// The response of a successful login
#[derive(ToSchema, Serialize)]
pub struct LoginResponse {
    /// The bearer token to present in the `Authorization` header
    token: String,
}

/// Login with email and password.
///
/// On success you will retrieve a bearer token carrying your identity
/// and role claims.
#[utoipa::path(
    tag = "Authentication",
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 401, description = "Invalid credentials", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse)
    ),
    request_body = LoginRequest,
)]
#[post("/login")]
pub(crate) async fn login(
    req: Json<LoginRequest>,
    db: Data<Database>,
    issuer: Data<TokenIssuer>,
) -> ApiResult<Json<LoginResponse>> {
    let mut tx = db.start_transaction().await?;

    let user = query!(&mut tx, User)
        .condition(User::F.email.equals(&req.email))
        .optional()
        .await?
        .ok_or(ApiError::LoginFailed)?;

    if !user.is_active {
        return Err(ApiError::LoginFailed);
    }

    Argon2::default()
        .verify_password(
            req.password.as_bytes(),
            &PasswordHash::new(&user.password_hash)?,
        )
        .map_err(|e| match e {
            Error::Password => ApiError::LoginFailed,
            _ => ApiError::InvalidHash(e),
        })?;

    let roles = query!(&mut tx, (UserRole::F.role.name,))
        .condition(UserRole::F.user.equals(user.uuid))
        .all()
        .await?;

    update!(&mut tx, User)
        .condition(User::F.uuid.equals(user.uuid))
        .set(User::F.last_login, Some(Utc::now().naive_utc()))
        .exec()
        .await?;

    tx.commit().await?;

    let token = issuer.issue(
        user.uuid,
        user.email,
        roles.into_iter().map(|(name,)| name).collect(),
    );

    Ok(Json(LoginResponse { token }))
}
