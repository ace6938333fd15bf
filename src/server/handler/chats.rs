//! All handlers for the chat endpoints live in here.
//!
//! The business rules are not enforced here but in the
//! [ChatEngine][crate::service::ChatEngine]; this module validates the
//! request shape and maps engine outcomes to responses.

use actix_web::web::{Data, Json, Path};
use actix_web::{delete, get, post, put, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::server::handler::{ApiError, ApiErrorResponse, ApiResult, PathUuid};
use crate::server::middleware::AuthedUser;
use crate::service::{ChatData, ChatEngine};

/// A member of a chat
#[derive(Serialize, ToSchema)]
pub struct ChatMemberResponse {
    /// The uuid of the user holding the membership
    pub(crate) uuid: Uuid,
    #[schema(example = "user123")]
    pub(crate) username: String,
    pub(crate) joined_at: DateTime<Utc>,
    /// Set if the membership has ended
    pub(crate) left_at: Option<DateTime<Utc>>,
}

/// A chat with all its current and past members
#[derive(Serialize, ToSchema)]
pub struct FullChatResponse {
    pub(crate) uuid: Uuid,
    #[schema(example = "Saturday hiking crew")]
    pub(crate) title: Option<String>,
    pub(crate) is_group: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) members: Vec<ChatMemberResponse>,
}

impl From<ChatData> for FullChatResponse {
    fn from(chat: ChatData) -> Self {
        let mut members: Vec<ChatMemberResponse> = chat
            .members
            .into_iter()
            .map(|m| ChatMemberResponse {
                uuid: m.user,
                username: m.username,
                joined_at: DateTime::from_utc(m.joined_at, Utc),
                left_at: m.left_at.map(|t| DateTime::from_utc(t, Utc)),
            })
            .collect();
        members.sort_by_key(|m| m.joined_at);

        Self {
            uuid: chat.uuid,
            title: chat.title,
            is_group: chat.is_group,
            created_at: DateTime::from_utc(chat.created_at, Utc),
            members,
        }
    }
}

/// The request to create a new chat
#[derive(Deserialize, ToSchema)]
pub struct CreateChatRequest {
    #[schema(example = "Saturday hiking crew")]
    title: Option<String>,
    /// The users to add to the chat. The creator is added automatically.
    member_ids: Vec<Uuid>,
}

/// Create a new chat with the given members.
///
/// The executing user is added to the member set automatically. A chat
/// with more than two members becomes a group chat.
#[utoipa::path(
    tag = "Chats",
    context_path = "/api",
    responses(
        (status = 201, description = "The created chat", body = FullChatResponse),
        (status = 400, description = "Client error", body = ApiErrorResponse),
        (status = 404, description = "Unknown member", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    request_body = CreateChatRequest,
    security(("bearer_token" = []))
)]
#[post("/chats")]
pub async fn create_chat(
    req: Json<CreateChatRequest>,
    engine: Data<dyn ChatEngine>,
    user: AuthedUser,
) -> ApiResult<HttpResponse> {
    let req = req.into_inner();

    if req.member_ids.is_empty() {
        return Err(ApiError::EmptyMembers);
    }

    if let Some(title) = &req.title {
        if title.trim().is_empty() {
            return Err(ApiError::InvalidTitle);
        }
    }

    let chat = engine
        .create_chat(user.uuid, req.title, &req.member_ids)
        .await?;

    Ok(HttpResponse::Created().json(FullChatResponse::from(chat)))
}

/// All chats the executing user is an active member of
#[derive(Serialize, ToSchema)]
pub struct GetAllChatsResponse {
    chats: Vec<FullChatResponse>,
}

/// Retrieve all chats the executing user is an active member of.
#[utoipa::path(
    tag = "Chats",
    context_path = "/api",
    responses(
        (status = 200, description = "The chats of the user", body = GetAllChatsResponse),
        (status = 401, description = "Unauthenticated", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    security(("bearer_token" = []))
)]
#[get("/chats")]
pub async fn get_all_chats(
    engine: Data<dyn ChatEngine>,
    user: AuthedUser,
) -> ApiResult<Json<GetAllChatsResponse>> {
    let chats = engine.get_user_chats(user.uuid).await?;

    Ok(Json(GetAllChatsResponse {
        chats: chats.into_iter().map(FullChatResponse::from).collect(),
    }))
}

/// Retrieve a chat with all its members.
///
/// Past members are included with their leave timestamp set.
#[utoipa::path(
    tag = "Chats",
    context_path = "/api",
    responses(
        (status = 200, description = "The requested chat", body = FullChatResponse),
        (status = 403, description = "Not a member of this chat", body = ApiErrorResponse),
        (status = 404, description = "Chat not found", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    params(PathUuid),
    security(("bearer_token" = []))
)]
#[get("/chats/{uuid}")]
pub async fn get_chat(
    path: Path<PathUuid>,
    engine: Data<dyn ChatEngine>,
    user: AuthedUser,
) -> ApiResult<Json<FullChatResponse>> {
    let chat = engine.get_chat(path.uuid, user.uuid).await?;

    Ok(Json(FullChatResponse::from(chat)))
}

/// The request to set a new chat title
#[derive(Deserialize, ToSchema)]
pub struct UpdateChatTitleRequest {
    #[schema(example = "Sunday hiking crew")]
    title: String,
}

/// Set a new title on a group chat.
///
/// Direct chats have no title.
#[utoipa::path(
    tag = "Chats",
    context_path = "/api",
    responses(
        (status = 200, description = "The updated chat", body = FullChatResponse),
        (status = 400, description = "Not a group chat", body = ApiErrorResponse),
        (status = 403, description = "Not a member of this chat", body = ApiErrorResponse),
        (status = 404, description = "Chat not found", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    params(PathUuid),
    request_body = UpdateChatTitleRequest,
    security(("bearer_token" = []))
)]
#[put("/chats/{uuid}")]
pub async fn update_chat_title(
    path: Path<PathUuid>,
    req: Json<UpdateChatTitleRequest>,
    engine: Data<dyn ChatEngine>,
    user: AuthedUser,
) -> ApiResult<Json<FullChatResponse>> {
    if req.title.trim().is_empty() {
        return Err(ApiError::InvalidTitle);
    }

    let chat = engine
        .update_chat_title(path.uuid, user.uuid, req.title.clone())
        .await?;

    Ok(Json(FullChatResponse::from(chat)))
}

/// Leave a chat.
///
/// If the executing user is the last active member, the chat is retired
/// with them.
#[utoipa::path(
    tag = "Chats",
    context_path = "/api",
    responses(
        (status = 204, description = "Left the chat"),
        (status = 403, description = "Not a member of this chat", body = ApiErrorResponse),
        (status = 404, description = "Chat not found", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    params(PathUuid),
    security(("bearer_token" = []))
)]
#[post("/chats/{uuid}/leave")]
pub async fn leave_chat(
    path: Path<PathUuid>,
    engine: Data<dyn ChatEngine>,
    user: AuthedUser,
) -> ApiResult<HttpResponse> {
    engine.leave_chat(path.uuid, user.uuid).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// The request to add members to a group chat
#[derive(Deserialize, ToSchema)]
pub struct AddMembersRequest {
    member_ids: Vec<Uuid>,
}

/// Add new members to a group chat.
///
/// The batch is all-or-nothing: if any user is unknown or already an
/// active member, nobody is added.
#[utoipa::path(
    tag = "Chats",
    context_path = "/api",
    responses(
        (status = 200, description = "The chat including the new members", body = FullChatResponse),
        (status = 400, description = "Not a group chat or already a member", body = ApiErrorResponse),
        (status = 403, description = "Not a member of this chat", body = ApiErrorResponse),
        (status = 404, description = "Chat or user not found", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    params(PathUuid),
    request_body = AddMembersRequest,
    security(("bearer_token" = []))
)]
#[post("/chats/{uuid}/members")]
pub async fn add_members(
    path: Path<PathUuid>,
    req: Json<AddMembersRequest>,
    engine: Data<dyn ChatEngine>,
    user: AuthedUser,
) -> ApiResult<Json<FullChatResponse>> {
    if req.member_ids.is_empty() {
        return Err(ApiError::EmptyMembers);
    }

    let chat = engine
        .add_members(path.uuid, user.uuid, &req.member_ids)
        .await?;

    Ok(Json(FullChatResponse::from(chat)))
}

/// The path of a member inside a chat
#[derive(Deserialize, IntoParams)]
pub struct ChatMemberPath {
    pub(crate) uuid: Uuid,
    pub(crate) member_uuid: Uuid,
}

/// Remove a member from a group chat.
///
/// The last active member can not be removed; they have to leave.
#[utoipa::path(
    tag = "Chats",
    context_path = "/api",
    responses(
        (status = 204, description = "The member got removed"),
        (status = 400, description = "Not a group chat or last member", body = ApiErrorResponse),
        (status = 403, description = "Not a member of this chat", body = ApiErrorResponse),
        (status = 404, description = "Chat not found", body = ApiErrorResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
    params(ChatMemberPath),
    security(("bearer_token" = []))
)]
#[delete("/chats/{uuid}/members/{member_uuid}")]
pub async fn remove_member(
    path: Path<ChatMemberPath>,
    engine: Data<dyn ChatEngine>,
    user: AuthedUser,
) -> ApiResult<HttpResponse> {
    engine
        .remove_member(path.uuid, user.uuid, path.member_uuid)
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::http::{header, StatusCode};
    use actix_web::web::scope;
    use actix_web::{test, App};
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::server::middleware::AuthenticationRequired;
    use crate::service::{ChatEngineError, ChatMemberData};
    use crate::token::TokenIssuer;

    /// The outcome every operation of the mock engine returns
    #[derive(Clone, Copy)]
    enum MockOutcome {
        Ok,
        ChatNotFound,
        NotChatMember,
        NotGroupChat,
        AlreadyMember,
        LastMember,
        UserNotFound,
    }

    struct MockEngine {
        outcome: MockOutcome,
    }

    impl MockEngine {
        fn chat(&self) -> Result<ChatData, ChatEngineError> {
            match self.outcome {
                MockOutcome::Ok => Ok(sample_chat()),
                MockOutcome::ChatNotFound => Err(ChatEngineError::ChatNotFound),
                MockOutcome::NotChatMember => Err(ChatEngineError::NotChatMember),
                MockOutcome::NotGroupChat => Err(ChatEngineError::NotGroupChat),
                MockOutcome::AlreadyMember => Err(ChatEngineError::AlreadyMember),
                MockOutcome::LastMember => Err(ChatEngineError::LastMember),
                MockOutcome::UserNotFound => Err(ChatEngineError::UserNotFound),
            }
        }

        fn unit(&self) -> Result<(), ChatEngineError> {
            self.chat().map(|_| ())
        }
    }

    #[async_trait]
    impl ChatEngine for MockEngine {
        async fn create_chat(
            &self,
            _creator: Uuid,
            _title: Option<String>,
            _member_ids: &[Uuid],
        ) -> Result<ChatData, ChatEngineError> {
            self.chat()
        }

        async fn get_chat(&self, _chat: Uuid, _caller: Uuid) -> Result<ChatData, ChatEngineError> {
            self.chat()
        }

        async fn get_user_chats(&self, _caller: Uuid) -> Result<Vec<ChatData>, ChatEngineError> {
            self.chat().map(|chat| vec![chat])
        }

        async fn update_chat_title(
            &self,
            _chat: Uuid,
            _caller: Uuid,
            _title: String,
        ) -> Result<ChatData, ChatEngineError> {
            self.chat()
        }

        async fn leave_chat(&self, _chat: Uuid, _caller: Uuid) -> Result<(), ChatEngineError> {
            self.unit()
        }

        async fn add_members(
            &self,
            _chat: Uuid,
            _caller: Uuid,
            _new_member_ids: &[Uuid],
        ) -> Result<ChatData, ChatEngineError> {
            self.chat()
        }

        async fn remove_member(
            &self,
            _chat: Uuid,
            _caller: Uuid,
            _target: Uuid,
        ) -> Result<(), ChatEngineError> {
            self.unit()
        }
    }

    fn sample_chat() -> ChatData {
        let now = Utc::now().naive_utc();
        ChatData {
            uuid: Uuid::new_v4(),
            title: Some("Saturday hiking crew".to_string()),
            is_group: true,
            created_at: now,
            members: vec![
                ChatMemberData {
                    user: Uuid::new_v4(),
                    username: "alice".to_string(),
                    joined_at: now,
                    left_at: None,
                },
                ChatMemberData {
                    user: Uuid::new_v4(),
                    username: "bob".to_string(),
                    joined_at: now,
                    left_at: Some(now),
                },
            ],
        }
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", 3600)
    }

    async fn request(
        outcome: MockOutcome,
        req: test::TestRequest,
        with_token: bool,
    ) -> StatusCode {
        let engine: Arc<dyn ChatEngine> = Arc::new(MockEngine { outcome });
        let issuer = issuer();

        let app = test::init_service(
            App::new()
                .app_data(Data::from(engine))
                .app_data(Data::new(issuer.clone()))
                .service(
                    scope("/api")
                        .wrap(AuthenticationRequired)
                        .service(create_chat)
                        .service(get_all_chats)
                        .service(get_chat)
                        .service(update_chat_title)
                        .service(leave_chat)
                        .service(add_members)
                        .service(remove_member),
                ),
        )
        .await;

        let req = if with_token {
            let token = issuer.issue(Uuid::new_v4(), "alice@example.com".to_string(), vec![]);
            req.insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        } else {
            req
        };

        match test::try_call_service(&app, req.to_request()).await {
            Ok(resp) => resp.status(),
            Err(err) => err.error_response().status(),
        }
    }

    #[actix_web::test]
    async fn create_chat_returns_created() {
        let req = test::TestRequest::post().uri("/api/chats").set_json(
            serde_json::json!({ "title": "hiking", "member_ids": [Uuid::new_v4()] }),
        );

        assert_eq!(request(MockOutcome::Ok, req, true).await, StatusCode::CREATED);
    }

    #[actix_web::test]
    async fn create_chat_rejects_empty_member_list() {
        let req = test::TestRequest::post()
            .uri("/api/chats")
            .set_json(serde_json::json!({ "member_ids": [] }));

        assert_eq!(
            request(MockOutcome::Ok, req, true).await,
            StatusCode::BAD_REQUEST
        );
    }

    #[actix_web::test]
    async fn create_chat_maps_unknown_member_to_not_found() {
        let req = test::TestRequest::post()
            .uri("/api/chats")
            .set_json(serde_json::json!({ "member_ids": [Uuid::new_v4()] }));

        assert_eq!(
            request(MockOutcome::UserNotFound, req, true).await,
            StatusCode::NOT_FOUND
        );
    }

    #[actix_web::test]
    async fn get_chat_requires_token() {
        let req = test::TestRequest::get().uri(&format!("/api/chats/{}", Uuid::new_v4()));

        assert_eq!(
            request(MockOutcome::Ok, req, false).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn get_chat_maps_engine_outcomes() {
        let uri = format!("/api/chats/{}", Uuid::new_v4());

        let req = test::TestRequest::get().uri(&uri);
        assert_eq!(request(MockOutcome::Ok, req, true).await, StatusCode::OK);

        let req = test::TestRequest::get().uri(&uri);
        assert_eq!(
            request(MockOutcome::ChatNotFound, req, true).await,
            StatusCode::NOT_FOUND
        );

        let req = test::TestRequest::get().uri(&uri);
        assert_eq!(
            request(MockOutcome::NotChatMember, req, true).await,
            StatusCode::FORBIDDEN
        );
    }

    #[actix_web::test]
    async fn title_update_on_direct_chat_is_rejected() {
        let req = test::TestRequest::put()
            .uri(&format!("/api/chats/{}", Uuid::new_v4()))
            .set_json(serde_json::json!({ "title": "new title" }));

        assert_eq!(
            request(MockOutcome::NotGroupChat, req, true).await,
            StatusCode::BAD_REQUEST
        );
    }

    #[actix_web::test]
    async fn empty_title_never_reaches_the_engine() {
        let req = test::TestRequest::put()
            .uri(&format!("/api/chats/{}", Uuid::new_v4()))
            .set_json(serde_json::json!({ "title": "   " }));

        assert_eq!(
            request(MockOutcome::Ok, req, true).await,
            StatusCode::BAD_REQUEST
        );
    }

    #[actix_web::test]
    async fn leave_chat_returns_no_content() {
        let req =
            test::TestRequest::post().uri(&format!("/api/chats/{}/leave", Uuid::new_v4()));

        assert_eq!(
            request(MockOutcome::Ok, req, true).await,
            StatusCode::NO_CONTENT
        );
    }

    #[actix_web::test]
    async fn add_members_maps_conflict_to_bad_request() {
        let req = test::TestRequest::post()
            .uri(&format!("/api/chats/{}/members", Uuid::new_v4()))
            .set_json(serde_json::json!({ "member_ids": [Uuid::new_v4()] }));

        assert_eq!(
            request(MockOutcome::AlreadyMember, req, true).await,
            StatusCode::BAD_REQUEST
        );
    }

    #[actix_web::test]
    async fn remove_member_maps_last_member_to_bad_request() {
        let uri = format!("/api/chats/{}/members/{}", Uuid::new_v4(), Uuid::new_v4());

        let req = test::TestRequest::delete().uri(&uri);
        assert_eq!(
            request(MockOutcome::LastMember, req, true).await,
            StatusCode::BAD_REQUEST
        );

        let req = test::TestRequest::delete().uri(&uri);
        assert_eq!(
            request(MockOutcome::Ok, req, true).await,
            StatusCode::NO_CONTENT
        );
    }
}
