use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorUnauthorized,
    Error, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};

use crate::jwt::{bearer_token, Claims, JwtValidator};

fn unauthorized(message: impl Into<String>) -> Error {
    ErrorUnauthorized(serde_json::json!({
        "status": 401,
        "message": message.into(),
        "data": null,
    }))
}

/// Caller id placed on the request by [`AuthMiddleware`].
pub fn current_user(req: &HttpRequest) -> Result<Claims, Error> {
    req.extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| unauthorized("Unauthorized"))
}

pub struct AuthMiddleware {
    validator: JwtValidator,
}

impl AuthMiddleware {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            validator: JwtValidator::new(jwt_secret),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service,
            validator: self.validator.clone(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    validator: JwtValidator,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = match req.headers().get("Authorization") {
            Some(header) => match header.to_str().ok().and_then(bearer_token) {
                Some(token) => token.to_string(),
                None => {
                    return Box::pin(async { Err(unauthorized("Invalid authorization header")) });
                }
            },
            None => {
                return Box::pin(async { Err(unauthorized("Missing authorization header")) });
            }
        };

        let claims = match self.validator.verify_token(&token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!("Rejected token: {}", e);
                return Box::pin(async move { Err(unauthorized(format!("Unauthorized: {}", e))) });
            }
        };

        // Insert claims into request extensions
        req.extensions_mut().insert(claims);

        let fut = self.service.call(req);
        Box::pin(fut)
    }
}
