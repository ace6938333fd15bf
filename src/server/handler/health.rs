//! This module holds the health endpoint of the server

use actix_web::get;
use actix_web::web::{Data, Json};
use rorm::{query, Database, FieldAccess, Model};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Chat, User};
use crate::server::handler::{ApiErrorResponse, ApiResult};

/// The health data of this server
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = 1337)]
    registered_users: u64,
    #[schema(example = 42)]
    active_chats: u64,
}

/// Request health data from this server.
///
/// Also serves as a liveness probe: a reachable database is required to
/// answer.
#[utoipa::path(
    tag = "Server status",
    responses(
        (status = 200, description = "Health data of this server", body = HealthResponse),
        (status = 500, description = "Server error", body = ApiErrorResponse),
    ),
)]
#[get("/health")]
pub async fn health(db: Data<Database>) -> ApiResult<Json<HealthResponse>> {
    let registered_users = query!(db.as_ref(), (User::F.uuid.count(),)).one().await?.0 as u64;

    let active_chats = query!(db.as_ref(), (Chat::F.uuid.count(),))
        .condition(Chat::F.retired.equals(false))
        .one()
        .await?
        .0 as u64;

    Ok(Json(HealthResponse {
        registered_users,
        active_chats,
    }))
}
