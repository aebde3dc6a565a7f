//! Per-request deadline and "already responded" flag.
//!
//! The timeout guard creates one [`RequestContext`] per request and runs the
//! downstream handler inside [`RequestContext::scope`]. Code running on behalf
//! of that request (the auth service, its store calls) reads the deadline back
//! with [`RequestContext::current`] without it being threaded through every
//! signature.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

tokio::task_local! {
    static CURRENT: RequestContext;
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Instant,
    responded: Arc<AtomicBool>,
}

impl RequestContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            responded: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline; zero once it has passed
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Claim the right to answer the client.
    ///
    /// Returns `true` for exactly one caller; every later caller must drop
    /// whatever it was about to send.
    pub fn try_respond(&self) -> bool {
        self.responded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn has_responded(&self) -> bool {
        self.responded.load(Ordering::Acquire)
    }

    /// Run `future` with this context installed as the current one.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CURRENT.scope(self, future).await
    }

    /// The context of the request the calling task is serving, if any.
    pub fn current() -> Option<RequestContext> {
        CURRENT.try_with(|context| context.clone()).ok()
    }
}
