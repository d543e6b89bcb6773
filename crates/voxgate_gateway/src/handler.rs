//! The handler seam the gateway wraps.

use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use voxgate_error::VoxgateResult;

/// Request with a fully buffered body.
pub type GatewayRequest = http::Request<Bytes>;

/// Response with a fully buffered body.
pub type GatewayResponse = http::Response<Bytes>;

/// An endpoint the gateway can guard.
///
/// Errors are mapped to client-safe responses at the gateway boundary;
/// panics are caught there too.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one request.
    async fn handle(&self, request: GatewayRequest) -> VoxgateResult<GatewayResponse>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(&self, request: GatewayRequest) -> VoxgateResult<GatewayResponse> {
        (**self).handle(request).await
    }
}

/// Adapter implementing [`Handler`] for an async closure.
#[derive(Debug, Clone)]
pub struct HandlerFn<F>(F);

/// Wrap an async closure as a [`Handler`].
///
/// # Example
///
/// ```
/// use voxgate_error::VoxgateError;
/// use voxgate_gateway::{handler_fn, GatewayRequest, Handler};
///
/// let echo = handler_fn(|request: GatewayRequest| async move {
///     Ok::<_, VoxgateError>(http::Response::new(request.into_body()))
/// });
/// # let _ = &echo as &dyn Handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(GatewayRequest) -> Fut + Send + Sync,
    Fut: Future<Output = VoxgateResult<GatewayResponse>> + Send,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(GatewayRequest) -> Fut + Send + Sync,
    Fut: Future<Output = VoxgateResult<GatewayResponse>> + Send,
{
    async fn handle(&self, request: GatewayRequest) -> VoxgateResult<GatewayResponse> {
        (self.0)(request).await
    }
}
