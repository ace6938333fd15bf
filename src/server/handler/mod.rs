//! This module holds the handler of palaver

use std::fmt::{Display, Formatter};

use actix_web::body::BoxBody;
use actix_web::HttpResponse;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};
use serde_repr::Serialize_repr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub use crate::server::handler::auth::*;
pub use crate::server::handler::chats::*;
pub use crate::server::handler::health::*;
pub use crate::server::handler::users::*;
use crate::service::ChatEngineError;
use crate::token::TokenError;

pub mod auth;
pub mod chats;
pub mod health;
pub mod users;

/// The result that is used throughout the complete api.
pub type ApiResult<T> = Result<T, ApiError>;

/// A path containing a single uuid
#[derive(Deserialize, IntoParams)]
pub struct PathUuid {
    pub(crate) uuid: Uuid,
}

#[derive(Serialize_repr, ToSchema)]
#[repr(u16)]
pub(crate) enum ApiStatusCode {
    Unauthenticated = 1000,
    LoginFailed = 1001,
    InvalidEmail = 1002,
    InvalidUsername = 1003,
    InvalidPassword = 1004,
    EmailAlreadyOccupied = 1005,
    UsernameAlreadyOccupied = 1006,
    WrongPassword = 1007,
    InvalidTitle = 1008,
    EmptyMembers = 1009,
    EmptyJson = 1010,
    InvalidJson = 1011,
    UserNotFound = 1012,
    ChatNotFound = 1013,
    NotChatMember = 1014,
    NotGroupChat = 1015,
    AlreadyMember = 1016,
    LastMember = 1017,
    NotFound = 1018,

    InternalServerError = 2000,
    DatabaseError = 2001,
}

#[derive(Serialize, ToSchema)]
pub(crate) struct ApiErrorResponse {
    #[schema(example = "Error message is here")]
    message: String,
    #[schema(example = 1000)]
    status_code: ApiStatusCode,
}

impl ApiErrorResponse {
    pub(crate) fn new(status_code: ApiStatusCode, message: String) -> Self {
        Self {
            message,
            status_code,
        }
    }
}

/// This enum holds all possible error types that can occur in the API
#[derive(Debug)]
pub enum ApiError {
    /// The request carried no valid bearer token
    Unauthenticated,
    /// Login was not successful. Caused by incorrect email / password
    LoginFailed,

    /// The email address failed validation
    InvalidEmail,
    /// The username failed validation
    InvalidUsername,
    /// The password failed validation
    InvalidPassword,
    /// The email address is already occupied
    EmailAlreadyOccupied,
    /// The username is already occupied
    UsernameAlreadyOccupied,
    /// The supplied current password was wrong
    WrongPassword,
    /// The chat title must not be empty
    InvalidTitle,
    /// The member list must not be empty
    EmptyMembers,
    /// An update request contained no fields
    EmptyJson,
    /// The json payload could not be parsed
    InvalidJson,

    /// A referenced user does not exist
    UserNotFound,
    /// The requested chat does not exist
    ChatNotFound,
    /// The caller or target is not an active member of the chat
    NotChatMember,
    /// The operation is restricted to group chats
    NotGroupChat,
    /// A user to be added is already an active member
    AlreadyMember,
    /// The last active member of a chat can not be removed
    LastMember,

    /// Unexpected internal error
    InternalServerError,
    /// All errors that are thrown by the database
    DatabaseError(rorm::Error),
    /// An invalid hash is retrieved from the database
    InvalidHash(argon2::password_hash::Error),
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthenticated => write!(f, "Unauthenticated"),
            ApiError::LoginFailed => write!(f, "The login was not successful"),
            ApiError::InvalidEmail => write!(f, "Invalid email address"),
            ApiError::InvalidUsername => write!(f, "Username must be between 3 and 30 characters"),
            ApiError::InvalidPassword => write!(f, "Password must be at least 8 characters"),
            ApiError::EmailAlreadyOccupied => write!(f, "Email is already occupied"),
            ApiError::UsernameAlreadyOccupied => write!(f, "Username is already occupied"),
            ApiError::WrongPassword => write!(f, "Current password is incorrect"),
            ApiError::InvalidTitle => write!(f, "Title must not be empty"),
            ApiError::EmptyMembers => write!(f, "Member list must not be empty"),
            ApiError::EmptyJson => write!(f, "Request contained no fields to update"),
            ApiError::InvalidJson => write!(f, "Invalid json payload"),
            ApiError::UserNotFound => write!(f, "User not found"),
            ApiError::ChatNotFound => write!(f, "Chat not found"),
            ApiError::NotChatMember => write!(f, "Not a member of this chat"),
            ApiError::NotGroupChat => write!(f, "Not a group chat"),
            ApiError::AlreadyMember => write!(f, "User is already a member"),
            ApiError::LastMember => write!(f, "Cannot remove the last member"),
            ApiError::InternalServerError => write!(f, "Internal server error"),
            ApiError::DatabaseError(_) => write!(f, "Database error occurred"),
            ApiError::InvalidHash(_) => write!(f, "Internal server error"),
        }
    }
}

impl actix_web::ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            ApiError::Unauthenticated => {
                trace!("Unauthenticated");

                HttpResponse::Unauthorized().json(ApiErrorResponse::new(
                    ApiStatusCode::Unauthenticated,
                    self.to_string(),
                ))
            }
            ApiError::LoginFailed => {
                debug!("Login request failed");

                HttpResponse::Unauthorized().json(ApiErrorResponse::new(
                    ApiStatusCode::LoginFailed,
                    self.to_string(),
                ))
            }
            ApiError::WrongPassword => {
                debug!("Password change with wrong current password");

                HttpResponse::Unauthorized().json(ApiErrorResponse::new(
                    ApiStatusCode::WrongPassword,
                    self.to_string(),
                ))
            }
            ApiError::InvalidEmail => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::InvalidEmail,
                self.to_string(),
            )),
            ApiError::InvalidUsername => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::InvalidUsername,
                self.to_string(),
            )),
            ApiError::InvalidPassword => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::InvalidPassword,
                self.to_string(),
            )),
            ApiError::InvalidTitle => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::InvalidTitle,
                self.to_string(),
            )),
            ApiError::EmptyMembers => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::EmptyMembers,
                self.to_string(),
            )),
            ApiError::EmptyJson => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::EmptyJson,
                self.to_string(),
            )),
            ApiError::InvalidJson => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::InvalidJson,
                self.to_string(),
            )),
            ApiError::EmailAlreadyOccupied => {
                debug!("Email is already occupied");

                HttpResponse::Conflict().json(ApiErrorResponse::new(
                    ApiStatusCode::EmailAlreadyOccupied,
                    self.to_string(),
                ))
            }
            ApiError::UsernameAlreadyOccupied => {
                debug!("Username is already occupied");

                HttpResponse::Conflict().json(ApiErrorResponse::new(
                    ApiStatusCode::UsernameAlreadyOccupied,
                    self.to_string(),
                ))
            }
            ApiError::UserNotFound => HttpResponse::NotFound().json(ApiErrorResponse::new(
                ApiStatusCode::UserNotFound,
                self.to_string(),
            )),
            ApiError::ChatNotFound => HttpResponse::NotFound().json(ApiErrorResponse::new(
                ApiStatusCode::ChatNotFound,
                self.to_string(),
            )),
            ApiError::NotChatMember => HttpResponse::Forbidden().json(ApiErrorResponse::new(
                ApiStatusCode::NotChatMember,
                self.to_string(),
            )),
            ApiError::NotGroupChat => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::NotGroupChat,
                self.to_string(),
            )),
            ApiError::AlreadyMember => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::AlreadyMember,
                self.to_string(),
            )),
            ApiError::LastMember => HttpResponse::BadRequest().json(ApiErrorResponse::new(
                ApiStatusCode::LastMember,
                self.to_string(),
            )),
            ApiError::InternalServerError => HttpResponse::InternalServerError().json(
                ApiErrorResponse::new(ApiStatusCode::InternalServerError, self.to_string()),
            ),
            ApiError::DatabaseError(err) => {
                error!("Database error: {err}");

                HttpResponse::InternalServerError().json(ApiErrorResponse::new(
                    ApiStatusCode::DatabaseError,
                    self.to_string(),
                ))
            }
            ApiError::InvalidHash(err) => {
                error!("Got invalid password hash from db: {err}");

                HttpResponse::InternalServerError().json(ApiErrorResponse::new(
                    ApiStatusCode::InternalServerError,
                    self.to_string(),
                ))
            }
        }
    }
}

impl From<rorm::Error> for ApiError {
    fn from(value: rorm::Error) -> Self {
        Self::DatabaseError(value)
    }
}

impl From<argon2::password_hash::Error> for ApiError {
    fn from(value: argon2::password_hash::Error) -> Self {
        Self::InvalidHash(value)
    }
}

impl From<ChatEngineError> for ApiError {
    fn from(value: ChatEngineError) -> Self {
        match value {
            ChatEngineError::ChatNotFound => Self::ChatNotFound,
            ChatEngineError::NotChatMember => Self::NotChatMember,
            ChatEngineError::NotGroupChat => Self::NotGroupChat,
            ChatEngineError::AlreadyMember => Self::AlreadyMember,
            ChatEngineError::LastMember => Self::LastMember,
            ChatEngineError::UserNotFound => Self::UserNotFound,
            ChatEngineError::Database(err) => Self::DatabaseError(err),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(value: TokenError) -> Self {
        trace!("Rejected token: {value}");

        Self::Unauthenticated
    }
}
