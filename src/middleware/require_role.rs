/// Role Check Middleware
///
/// Lets a request through only if the claims injected by [`JwtMiddleware`]
/// carry the required role. Must be wrapped inside `JwtMiddleware`.
///
/// [`JwtMiddleware`]: super::JwtMiddleware

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::Claims;
use crate::error::{AppError, AuthError};

pub struct RequireRole {
    role: String,
}

impl RequireRole {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireRoleService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequireRoleService {
            service: Rc::new(service),
            role: self.role.clone(),
        }))
    }
}

pub struct RequireRoleService<S> {
    service: Rc<S>,
    role: String,
}

impl<S, B> Service<ServiceRequest> for RequireRoleService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let role = req.extensions().get::<Claims>().map(|c| c.role.clone());

        match role {
            None => Box::pin(async { Err(AppError::Auth(AuthError::MissingToken).into()) }),
            Some(role) if role != self.role => {
                tracing::warn!(
                    path = %req.path(),
                    role = %role,
                    required = %self.role,
                    "Insufficient role"
                );
                Box::pin(async { Err(AppError::Auth(AuthError::Forbidden).into()) })
            }
            Some(_) => {
                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
        }
    }
}
