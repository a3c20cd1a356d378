//! Tower layers for the payment gates
//!
//! [`SellerLayer`] and [`BuyerLayer`] wrap any infallible service over axum
//! requests, so the gates can sit in front of a proxy or a plain `tower::Service`
//! as well as inside an axum router.

use super::buyer::BuyerGate;
use super::seller::SellerGate;
use axum::extract::Request;
use axum::response::Response;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service, ServiceExt};

type BoxFuture = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

async fn call_inner<S>(inner: S, request: Request) -> Response
where
    S: Service<Request, Response = Response, Error = Infallible>,
{
    match inner.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

/// Layer applying a [`SellerGate`]
#[derive(Debug, Clone)]
pub struct SellerLayer {
    gate: SellerGate,
}

impl SellerLayer {
    pub fn new(gate: SellerGate) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for SellerLayer {
    type Service = SellerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SellerService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SellerService<S> {
    inner: S,
    gate: SellerGate,
}

impl<S> Service<Request> for SellerService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // Keep the service that was driven to readiness
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let gate = self.gate.clone();

        Box::pin(async move {
            Ok(gate
                .handle(request, move |request| call_inner(inner, request))
                .await)
        })
    }
}

/// Layer applying a [`BuyerGate`]
#[derive(Debug, Clone)]
pub struct BuyerLayer {
    gate: BuyerGate,
}

impl BuyerLayer {
    pub fn new(gate: BuyerGate) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for BuyerLayer {
    type Service = BuyerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BuyerService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuyerService<S> {
    inner: S,
    gate: BuyerGate,
}

impl<S> Service<Request> for BuyerService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let inner = self.inner.clone();
        let gate = self.gate.clone();

        Box::pin(async move {
            Ok(gate
                .handle(request, move |request| call_inner(inner.clone(), request))
                .await)
        })
    }
}
