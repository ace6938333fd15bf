//! This module holds the definition of the swagger declaration

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::server::handler;

struct TokenSecurity;

impl Modify for TokenSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("The token retrieved through the login endpoint."))
                        .build(),
                ),
            )
        }
    }
}

/// Helper struct for the openapi definitions.
#[derive(OpenApi)]
#[openapi(
    paths(
        handler::register,
        handler::login,
        handler::get_profile,
        handler::update_profile,
        handler::change_password,
        handler::health,
        handler::create_chat,
        handler::get_all_chats,
        handler::get_chat,
        handler::update_chat_title,
        handler::leave_chat,
        handler::add_members,
        handler::remove_member,
    ),
    components(schemas(
        handler::ApiErrorResponse,
        handler::ApiStatusCode,
        handler::RegisterRequest,
        handler::UserResponse,
        handler::UpdateProfileRequest,
        handler::ChangePasswordRequest,
        handler::LoginRequest,
        handler::LoginResponse,
        handler::HealthResponse,
        handler::CreateChatRequest,
        handler::UpdateChatTitleRequest,
        handler::AddMembersRequest,
        handler::ChatMemberResponse,
        handler::FullChatResponse,
        handler::GetAllChatsResponse,
    )),
    modifiers(&TokenSecurity)
)]
pub struct ApiDoc;
