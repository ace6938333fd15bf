use actix_web::error::JsonPayloadError;
use actix_web::HttpRequest;
use log::debug;

use crate::server::handler::ApiError;

/// Map json extractor failures onto the api's error body
pub(crate) fn json_extractor_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    debug!("Json payload could not be parsed: {err}");

    ApiError::InvalidJson.into()
}
