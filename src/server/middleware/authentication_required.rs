use std::future::{ready, Ready};

use actix_web::dev::{
    forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform,
};
use actix_web::http::header;
use actix_web::web::Data;
use actix_web::{FromRequest, HttpMessage, HttpRequest};
use futures::future::LocalBoxFuture;
use log::trace;
use uuid::Uuid;

use crate::server::handler::ApiError;
use crate::token::TokenIssuer;

/// The identity of the authenticated caller.
///
/// Placed into the request extensions by [AuthenticationRequired] and
/// retrieved by handlers through its [FromRequest] impl.
#[derive(Clone, Debug)]
pub(crate) struct AuthedUser {
    pub(crate) uuid: Uuid,
    pub(crate) email: String,
    pub(crate) roles: Vec<String>,
}

impl FromRequest for AuthedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthedUser>()
                .cloned()
                .ok_or(ApiError::Unauthenticated),
        )
    }
}

pub(crate) struct AuthenticationRequired;

impl<S, B> Transform<S, ServiceRequest> for AuthenticationRequired
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = AuthenticationRequiredMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticationRequiredMiddleware { service }))
    }
}

pub(crate) struct AuthenticationRequiredMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthenticationRequiredMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match authenticate(&req) {
            Ok(user) => {
                req.extensions_mut().insert(user);

                let next = self.service.call(req);
                Box::pin(async move { next.await })
            }
            Err(err) => Box::pin(async move { Err(err.into()) }),
        }
    }
}

/// Validate the bearer token of a request against the [TokenIssuer]
fn authenticate(req: &ServiceRequest) -> Result<AuthedUser, ApiError> {
    let issuer = req
        .app_data::<Data<TokenIssuer>>()
        .ok_or(ApiError::InternalServerError)?;

    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(ApiError::Unauthenticated)?
        .to_str()
        .map_err(|_| ApiError::Unauthenticated)?;

    let token = parse_bearer(header).ok_or(ApiError::Unauthenticated)?;
    let claims = issuer.verify(token)?;

    trace!(
        "Authenticated {} with roles {:?}",
        claims.email,
        claims.roles
    );

    Ok(AuthedUser {
        uuid: claims.sub,
        email: claims.email,
        roles: claims.roles,
    })
}

/// Extract the token from an `Authorization: Bearer <token>` header value
fn parse_bearer(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::parse_bearer;

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(parse_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(parse_bearer("Bearer   spaced  "), Some("spaced"));
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("Basic dXNlcg=="), None);
        assert_eq!(parse_bearer(""), None);
    }
}
