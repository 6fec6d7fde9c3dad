use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

/// Caller identity extracted from a verified JWT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

/// Claims issued by the auth service. Older tokens carry the id in `_id`,
/// newer ones in `sub`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "_id", alias = "sub")]
    pub user_id: String,
    pub exp: usize,
}

/// HS256 verifier shared by every worker
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn hs256(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.key, &self.validation).map(|data| data.claims)
    }
}

/// JWT Authentication Middleware
#[derive(Clone)]
pub struct JwtAuthMiddleware {
    verifier: Arc<JwtVerifier>,
}

impl JwtAuthMiddleware {
    pub fn new(verifier: Arc<JwtVerifier>) -> Self {
        Self { verifier }
    }

    pub fn hs256(secret: &str) -> Self {
        Self::new(Arc::new(JwtVerifier::hs256(secret)))
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtAuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            verifier: self.verifier.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    verifier: Arc<JwtVerifier>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let verifier = self.verifier.clone();

        Box::pin(async move {
            let auth_header = req
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .ok_or_else(|| {
                    actix_web::error::ErrorUnauthorized("Missing Authorization header")
                })?;

            let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
                actix_web::error::ErrorUnauthorized("Invalid Authorization header format")
            })?;

            let claims = verifier.verify(token).map_err(|e| {
                tracing::warn!(error = %e, "JWT validation failed");
                actix_web::error::ErrorUnauthorized("Invalid token")
            })?;

            if claims.user_id.is_empty() {
                return Err(actix_web::error::ErrorUnauthorized(
                    "Invalid token: missing user id",
                ));
            }

            req.extensions_mut().insert(CallerId(claims.user_id));

            service.call(req).await
        })
    }
}

impl actix_web::FromRequest for CallerId {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<CallerId>() {
            Some(caller) => ready(Ok(caller.clone())),
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "User not authenticated",
            ))),
        }
    }
}
