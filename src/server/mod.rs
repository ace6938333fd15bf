//! This module holds the server definition

use std::net::SocketAddr;
use std::sync::Arc;

use actix_toolbox::tb_middleware::{setup_logging_mw, LoggingMiddlewareConfig};
use actix_web::http::StatusCode;
use actix_web::middleware::{Compress, ErrorHandlers};
use actix_web::web::{scope, Data, JsonConfig, PayloadConfig};
use actix_web::{App, HttpServer};
use log::info;
use rorm::Database;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::server::error::StartServerError;
use crate::server::handler::{
    add_members, change_password, create_chat, get_all_chats, get_chat, get_profile, health,
    leave_chat, login, register, remove_member, update_chat_title, update_profile,
};
use crate::server::middleware::{handle_not_found, json_extractor_error, AuthenticationRequired};
use crate::server::swagger::ApiDoc;
use crate::service::{ChatEngine, ChatService};
use crate::token::TokenIssuer;

pub mod error;
pub mod handler;
pub mod middleware;
pub mod swagger;

/// Start the palaver server
///
/// **Parameter**:
/// - `config`: Reference to a [Config] struct
/// - `db`: [Database]
pub async fn start_server(config: &Config, db: Database) -> Result<(), StartServerError> {
    check_secret_key(&config.authentication.secret_key)?;

    let s_addr = SocketAddr::new(config.server.listen_address, config.server.listen_port);

    info!("Starting to listen on {}", s_addr);

    let issuer = TokenIssuer::new(
        &config.authentication.secret_key,
        config.authentication.token_lifetime,
    );
    let engine: Arc<dyn ChatEngine> = Arc::new(ChatService::new(db.clone()));

    HttpServer::new(move || {
        App::new()
            .app_data(PayloadConfig::default())
            .app_data(JsonConfig::default().error_handler(json_extractor_error))
            .app_data(Data::new(db.clone()))
            .app_data(Data::new(issuer.clone()))
            .app_data(Data::from(engine.clone()))
            .wrap(setup_logging_mw(LoggingMiddlewareConfig::default()))
            .wrap(Compress::default())
            .wrap(ErrorHandlers::new().handler(StatusCode::NOT_FOUND, handle_not_found))
            .service(SwaggerUi::new("/docs/{_:.*}").url("/api-doc/openapi.json", ApiDoc::openapi()))
            .service(register)
            .service(login)
            .service(health)
            .service(
                scope("/profile")
                    .wrap(AuthenticationRequired)
                    .service(get_profile)
                    .service(update_profile),
            )
            .service(
                scope("/change-password")
                    .wrap(AuthenticationRequired)
                    .service(change_password),
            )
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
            )
    })
    .bind(s_addr)?
    .run()
    .await?;

    Ok(())
}

/// An empty secret would make the tokens trivially forgeable
fn check_secret_key(secret_key: &str) -> Result<(), StartServerError> {
    if secret_key.is_empty() {
        return Err(StartServerError::EmptySecretKey);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::check_secret_key;
    use crate::server::error::StartServerError;

    #[test]
    fn empty_secret_key_is_rejected() {
        assert!(matches!(
            check_secret_key(""),
            Err(StartServerError::EmptySecretKey)
        ));
        assert!(check_secret_key("change-me-to-a-long-random-string").is_ok());
    }
}
