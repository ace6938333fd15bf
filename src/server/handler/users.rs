//! All handlers for account registration and profile management live in here

use actix_web::web::{Data, Json};
use actix_web::{get, post, put, HttpResponse};
use argon2::password_hash::{Error, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::thread_rng;
use rorm::fields::types::ForeignModelByField;
use rorm::{insert, query, update, Database, FieldAccess, Model};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Role, RoleInsert, User, UserInsert, UserRoleInsert};
use crate::server::handler::{ApiError, ApiErrorResponse, ApiResult};
use crate::server::middleware::AuthedUser;

/// The name of the role every account receives on registration
const DEFAULT_ROLE: &str = "user";

/// The content to register a new account
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "herbert@example.com")]
    email: String,
    #[schema(example = "user123")]
    username: String,
    #[schema(example = "super-secure-password")]
    password: String,
    #[schema(example = "Herbert")]
    first_name: Option<String>,
    #[schema(example = "Meier")]
    last_name: Option<String>,
}

/// The user data
#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub(crate) uuid: Uuid,
    #[schema(example = "herbert@example.com")]
    pub(crate) email: String,
    #[schema(example = "user123")]
    pub(crate) username: String,
    #[schema(example = "Herbert")]
    pub(crate) first_name: Option<String>,
    #[schema(example = "Meier")]
    pub(crate) last_name: Option<String>,
    pub(crate) is_active: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            uuid: user.uuid,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_active: user.is_active,
        }
    }
}

/// Register a new account
#[utoipa::path(
    tag = "Users",
    responses(
        (status = 201, description = "Account got created", body = UserResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 409, description = "Email or username is occupied", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    request_body = RegisterRequest,
)]
#[post("/register")]
pub async fn register(req: Json<RegisterRequest>, db: Data<Database>) -> ApiResult<HttpResponse> {
    if !valid_email(&req.email) {
        return Err(ApiError::InvalidEmail);
    }

    if !valid_username(&req.username) {
        return Err(ApiError::InvalidUsername);
    }

    if !valid_password(&req.password) {
        return Err(ApiError::InvalidPassword);
    }

    let mut tx = db.start_transaction().await?;

    if query!(&mut tx, (User::F.uuid,))
        .condition(User::F.email.equals(&req.email))
        .optional()
        .await?
        .is_some()
    {
        return Err(ApiError::EmailAlreadyOccupied);
    }

    if query!(&mut tx, (User::F.uuid,))
        .condition(User::F.username.equals(&req.username))
        .optional()
        .await?
        .is_some()
    {
        return Err(ApiError::UsernameAlreadyOccupied);
    }

    let salt = SaltString::generate(&mut thread_rng());
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)?
        .to_string();

    let uuid = Uuid::new_v4();
    insert!(&mut tx, UserInsert)
        .single(&UserInsert {
            uuid,
            email: req.email.clone(),
            username: req.username.clone(),
            first_name: req.first_name.clone(),
            last_name: req.last_name.clone(),
            password_hash,
            is_active: true,
            last_login: None,
        })
        .await?;

    // The default role is created on first use
    let role = match query!(&mut tx, Role)
        .condition(Role::F.name.equals(DEFAULT_ROLE))
        .optional()
        .await?
    {
        Some(role) => role.uuid,
        None => {
            let role_uuid = Uuid::new_v4();
            insert!(&mut tx, RoleInsert)
                .single(&RoleInsert {
                    uuid: role_uuid,
                    name: DEFAULT_ROLE.to_string(),
                    description: Some("Default role of registered accounts".to_string()),
                })
                .await?;
            role_uuid
        }
    };

    insert!(&mut tx, UserRoleInsert)
        .single(&UserRoleInsert {
            uuid: Uuid::new_v4(),
            user: ForeignModelByField::Key(uuid),
            role: ForeignModelByField::Key(role),
        })
        .await?;

    let user = query!(&mut tx, User)
        .condition(User::F.uuid.equals(uuid))
        .optional()
        .await?
        .ok_or(ApiError::InternalServerError)?;

    tx.commit().await?;

    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/// Returns the profile of the currently logged-in user
#[utoipa::path(
    tag = "Users",
    context_path = "/profile",
    responses(
        (status = 200, description = "Returns the profile of the current user", body = UserResponse),
        (status = 401, description = "Unauthenticated", body = ApiErrorResponse),
        (status = 404, description = "User not found", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    security(("bearer_token" = []))
)]
#[get("")]
pub async fn get_profile(db: Data<Database>, user: AuthedUser) -> ApiResult<Json<UserResponse>> {
    let user = query!(db.as_ref(), User)
        .condition(User::F.uuid.equals(user.uuid))
        .optional()
        .await?
        .ok_or(ApiError::UserNotFound)?;

    Ok(Json(UserResponse::from(user)))
}

/// Update profile request data
///
/// All parameter are optional, but at least one of them is required.
#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    #[schema(example = "user321")]
    username: Option<String>,
    #[schema(example = "Heeeerbeeeert")]
    first_name: Option<String>,
    #[schema(example = "Meier")]
    last_name: Option<String>,
}

/// Updates the profile of the currently logged-in user
///
/// All parameter are optional, but at least one of them is required.
#[utoipa::path(
    tag = "Users",
    context_path = "/profile",
    responses(
        (status = 200, description = "Returns the updated profile", body = UserResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 401, description = "Unauthenticated", body = ApiErrorResponse),
        (status = 409, description = "Username is occupied", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    request_body = UpdateProfileRequest,
    security(("bearer_token" = []))
)]
#[put("")]
pub async fn update_profile(
    req: Json<UpdateProfileRequest>,
    db: Data<Database>,
    user: AuthedUser,
) -> ApiResult<Json<UserResponse>> {
    let mut tx = db.start_transaction().await?;

    if let Some(username) = &req.username {
        if !valid_username(username) {
            return Err(ApiError::InvalidUsername);
        }

        if query!(&mut tx, (User::F.uuid,))
            .condition(User::F.username.equals(username))
            .optional()
            .await?
            .is_some()
        {
            return Err(ApiError::UsernameAlreadyOccupied);
        }
    }

    update!(&mut tx, User)
        .condition(User::F.uuid.equals(user.uuid))
        .begin_dyn_set()
        .set_if(User::F.username, req.username.clone())
        .set_if(User::F.first_name, req.first_name.clone().map(Some))
        .set_if(User::F.last_name, req.last_name.clone().map(Some))
        .finish_dyn_set()
        .map_err(|_| ApiError::EmptyJson)?
        .exec()
        .await?;

    let updated = query!(&mut tx, User)
        .condition(User::F.uuid.equals(user.uuid))
        .optional()
        .await?
        .ok_or(ApiError::UserNotFound)?;

    tx.commit().await?;

    Ok(Json(UserResponse::from(updated)))
}

/// The change password request data
#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    #[schema(example = "super-secure-password")]
    current_password: String,
    #[schema(example = "ultra-secure-password!!11!")]
    new_password: String,
}

/// Sets a new password for the currently logged-in user
#[utoipa::path(
    tag = "Users",
    context_path = "/change-password",
    responses(
        (status = 200, description = "New password has been set"),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 401, description = "Current password is incorrect", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    request_body = ChangePasswordRequest,
    security(("bearer_token" = []))
)]
#[post("")]
pub async fn change_password(
    req: Json<ChangePasswordRequest>,
    db: Data<Database>,
    user: AuthedUser,
) -> ApiResult<HttpResponse> {
    if !valid_password(&req.new_password) {
        return Err(ApiError::InvalidPassword);
    }

    let mut tx = db.start_transaction().await?;

    let (pw_hash,) = query!(&mut tx, (User::F.password_hash,))
        .condition(User::F.uuid.equals(user.uuid))
        .optional()
        .await?
        .ok_or(ApiError::UserNotFound)?;

    Argon2::default()
        .verify_password(
            req.current_password.as_bytes(),
            &PasswordHash::new(&pw_hash)?,
        )
        .map_err(|e| match e {
            Error::Password => ApiError::WrongPassword,
            _ => ApiError::InvalidHash(e),
        })?;

    let salt = SaltString::generate(&mut thread_rng());
    let password_hash = Argon2::default()
        .hash_password(req.new_password.as_bytes(), &salt)?
        .to_string();

    update!(&mut tx, User)
        .condition(User::F.uuid.equals(user.uuid))
        .set(User::F.password_hash, password_hash)
        .exec()
        .await?;

    tx.commit().await?;

    Ok(HttpResponse::Ok().finish())
}

/// A very small sanity check: one `@` with a non-empty local part and a
/// dotted domain. Everything beyond that is the mail server's problem.
pub(crate) fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
}

pub(crate) fn valid_username(username: &str) -> bool {
    (3..=30).contains(&username.chars().count())
}

pub(crate) fn valid_password(password: &str) -> bool {
    password.chars().count() >= 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(valid_email("herbert@example.com"));
        assert!(valid_email("a.b+c@mail.example.co.uk"));

        assert!(!valid_email(""));
        assert!(!valid_email("herbert"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("herbert@"));
        assert!(!valid_email("herbert@localhost"));
        assert!(!valid_email("herbert@.com"));
        assert!(!valid_email("herbert@example."));
    }

    #[test]
    fn username_validation() {
        assert!(valid_username("abc"));
        assert!(valid_username("a".repeat(30).as_str()));

        assert!(!valid_username("ab"));
        assert!(!valid_username(""));
        assert!(!valid_username("a".repeat(31).as_str()));
    }

    #[test]
    fn password_validation() {
        assert!(valid_password("12345678"));
        assert!(!valid_password("1234567"));
        assert!(!valid_password(""));
    }
}
