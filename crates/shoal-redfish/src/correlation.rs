use std::task::{Context, Poll};

use http::{HeaderValue, Request};
use tower::{Layer, Service};
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// A request-scoped correlation id. Generated if the incoming request
/// didn't supply one, otherwise preserved verbatim (spec.md §4.12).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn generate() -> Self {
        CorrelationId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `tower::Layer` that stamps every request with a [`CorrelationId`] in its
/// extensions, generating one if absent. Composes the same way
/// `TraceLayer::new_for_http()` does in `nclav-api::app::build_app` — both
/// wrap the whole router, ordered so the correlation id is available to any
/// layer underneath, including the tracing layer.
#[derive(Debug, Clone, Default)]
pub struct CorrelationLayer;

impl<S> Layer<S> for CorrelationLayer {
    type Service = CorrelationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct CorrelationService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for CorrelationService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let id = request
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| CorrelationId(s.to_string()))
            .unwrap_or_else(CorrelationId::generate);

        tracing::Span::current().record("correlation_id", tracing::field::display(&id));

        if let Ok(value) = HeaderValue::from_str(id.as_str()) {
            request.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }
        request.extensions_mut().insert(id);

        self.inner.call(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    #[tokio::test]
    async fn generates_id_when_absent() {
        let svc = service_fn(|req: Request<()>| async move {
            let id = req.extensions().get::<CorrelationId>().cloned();
            Ok::<_, Infallible>(id)
        });
        let mut svc = CorrelationLayer.layer(svc);
        let req = Request::builder().body(()).unwrap();
        let id = svc.ready().await.unwrap().call(req).await.unwrap();
        assert!(id.is_some());
    }

    #[tokio::test]
    async fn preserves_incoming_id() {
        let svc = service_fn(|req: Request<()>| async move {
            let id = req.extensions().get::<CorrelationId>().cloned();
            Ok::<_, Infallible>(id)
        });
        let mut svc = CorrelationLayer.layer(svc);
        let req = Request::builder().header(CORRELATION_ID_HEADER, "fixed-id").body(()).unwrap();
        let id = svc.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(id.unwrap().as_str(), "fixed-id");
    }
}
