/// CORS Middleware
///
/// Permissive cross-origin headers on every response, including error
/// responses raised further down the pipeline. Preflight `OPTIONS` requests
/// are answered here with 204 and never reach the rate limiter or handlers.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::InternalError,
    http::{
        header::{HeaderMap, HeaderName, HeaderValue},
        Method,
    },
    Error, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

const ALLOW_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE, PATCH";
const ALLOW_HEADERS: &str = "Authorization, Content-Length, X-CSRF-Token, Token, session, \
    X-Requested-With, Accept, Origin, Host, Connection, Accept-Encoding, Accept-Language, DNT, \
    X-CustomHeader, Keep-Alive, User-Agent, If-Modified-Since, Cache-Control, Content-Type, \
    X-Jwt, X-Signature, X-Time-Stamp";
const EXPOSE_HEADERS: &str = "Content-Length, Access-Control-Allow-Origin, \
    Access-Control-Allow-Headers, Cache-Control, Content-Language, Content-Type, Expires, \
    Last-Modified, Pragma";
const MAX_AGE_SECONDS: &str = "172800";

pub const SERVICE_VERSION_HEADER: &str = "x-service-version";

pub struct Cors {
    version: String,
}

impl Cors {
    /// `version` is echoed back in the `X-Service-Version` header
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Cors
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = CorsService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        let version = HeaderValue::from_str(&self.version)
            .unwrap_or_else(|_| HeaderValue::from_static("unknown"));

        std::future::ready(Ok(CorsService {
            service: Rc::new(service),
            version,
        }))
    }
}

pub struct CorsService<S> {
    service: Rc<S>,
    version: HeaderValue,
}

impl<S, B> Service<ServiceRequest> for CorsService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let version = self.version.clone();

        if req.method() == Method::OPTIONS {
            let mut response = HttpResponse::NoContent().finish();
            apply_headers(response.headers_mut(), &version);
            return Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) });
        }

        let service = self.service.clone();

        Box::pin(async move {
            match service.call(req).await {
                Ok(mut res) => {
                    apply_headers(res.headers_mut(), &version);
                    Ok(res.map_into_left_body())
                }
                Err(err) => {
                    // Render now so the rejection carries the same headers
                    let mut response = err.error_response();
                    apply_headers(response.headers_mut(), &version);
                    Err(InternalError::from_response(err, response).into())
                }
            }
        })
    }
}

fn apply_headers(headers: &mut HeaderMap, version: &HeaderValue) {
    let fixed = [
        ("access-control-allow-origin", "*"),
        ("access-control-allow-methods", ALLOW_METHODS),
        ("access-control-allow-headers", ALLOW_HEADERS),
        ("access-control-expose-headers", EXPOSE_HEADERS),
        ("access-control-max-age", MAX_AGE_SECONDS),
        ("access-control-allow-credentials", "true"),
    ];

    for (name, value) in fixed {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers.insert(
        HeaderName::from_static(SERVICE_VERSION_HEADER),
        version.clone(),
    );
}
