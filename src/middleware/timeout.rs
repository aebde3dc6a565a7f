/// Request Timeout Middleware
///
/// Races the downstream chain against a fixed per-request deadline.
///
/// The chain runs on its own local task inside a [`RequestContext`] scope, so
/// store calls made on behalf of the request see the same deadline. Whichever
/// side first wins `RequestContext::try_respond` answers the client:
/// - handler first: its response (or error, or panic) is passed through as is
/// - deadline first: the client gets a 408 and the handler keeps running to
///   completion in the background; its late result is dropped unsent
///
/// Exactly one of the two is ever returned.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::{FutureExt, LocalBoxFuture};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::AppError;
use crate::request_context::RequestContext;

pub struct TimeoutGuard {
    timeout: Duration,
}

impl TimeoutGuard {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S, B> Transform<S, ServiceRequest> for TimeoutGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TimeoutGuardService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(TimeoutGuardService {
            service: Rc::new(service),
            timeout: self.timeout,
        }))
    }
}

pub struct TimeoutGuardService<S> {
    service: Rc<S>,
    timeout: Duration,
}

impl<S, B> Service<ServiceRequest> for TimeoutGuardService<S>
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
        let context = RequestContext::new(self.timeout);
        let deadline = tokio::time::Instant::from_std(context.deadline());
        let path = req.path().to_string();
        let (tx, mut rx) = oneshot::channel();

        let service = self.service.clone();
        let worker_context = context.clone();
        actix_web::rt::spawn(context.clone().scope(async move {
            let outcome = AssertUnwindSafe(async move { service.call(req).await })
                .catch_unwind()
                .await;

            if worker_context.try_respond() {
                let _ = tx.send(outcome);
            } else {
                tracing::debug!("Discarding response of timed-out request");
            }
        }));

        Box::pin(async move {
            let outcome = tokio::select! {
                received = &mut rx => received,
                _ = tokio::time::sleep_until(deadline) => {
                    if context.try_respond() {
                        tracing::warn!(path = %path, "Request timed out");
                        return Err(AppError::Timeout.into());
                    }
                    // The handler claimed the response first; its send is already queued
                    rx.await
                }
            };

            match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(payload)) => panic::resume_unwind(payload),
                Err(_) => Err(AppError::Internal("request task dropped".to_string()).into()),
            }
        })
    }
}
