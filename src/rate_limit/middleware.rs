use crate::error::GateError;
use crate::principal::Principal;
use crate::rate_limit::RateLimiter;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Requests that can be rate limited: they know who is acting and under which action key.
pub trait ActionRequest {
    /// Principal issuing the request.
    fn principal(&self) -> &Principal;
    /// Rate-limit key of the action.
    fn action(&self) -> &str;
}

/// A layer that enforces rate limits using a [`RateLimiter`].
pub struct RateLimitLayer<L: ?Sized> {
    limiter: Arc<L>,
}

impl<L: ?Sized> Clone for RateLimitLayer<L> {
    fn clone(&self) -> Self {
        Self { limiter: self.limiter.clone() }
    }
}

impl<L> RateLimitLayer<L> {
    /// Create a new rate limit layer.
    pub fn new(limiter: L) -> Self {
        Self { limiter: Arc::new(limiter) }
    }
}

impl<L: ?Sized> RateLimitLayer<L> {
    /// Share an existing limiter (e.g. the one a gateway already uses).
    pub fn shared(limiter: Arc<L>) -> Self {
        Self { limiter }
    }
}

impl<S, L> Layer<S> for RateLimitLayer<L>
where
    L: RateLimiter + ?Sized + 'static,
{
    type Service = RateLimitService<S, L>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService { inner: service, limiter: self.limiter.clone() }
    }
}

/// Middleware service that enforces rate limits.
pub struct RateLimitService<S, L: ?Sized> {
    inner: S,
    limiter: Arc<L>,
}

impl<S: Clone, L: ?Sized> Clone for RateLimitService<S, L> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), limiter: self.limiter.clone() }
    }
}

impl<S, L, Req> Service<Req> for RateLimitService<S, L>
where
    S: Service<Req, Error = GateError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    L: RateLimiter + ?Sized + 'static,
    Req: ActionRequest + Send + 'static,
{
    type Response = S::Response;
    type Error = GateError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let limiter = self.limiter.clone();
        // Swap in a fresh clone so the readied service is the one we call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let principal = req.principal().clone();
        let action = req.action().to_string();

        Box::pin(async move {
            limiter.check(&principal, &action).await?.into_result()?;
            inner.call(req).await
        })
    }
}
