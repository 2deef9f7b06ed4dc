use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Instrument, Span, info_span};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

/// JSON logs filtered by `RUST_LOG`, `info` when unset.
pub fn init() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true),
        )
        .try_init()
        .ok();

    Ok(())
}

/// Reuse the caller's correlation id when it is a valid header value,
/// otherwise mint a fresh one.
pub async fn correlation_layer(mut req: Request<Body>, next: Next) -> Response {
    let (id, header) = req
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| {
            let id = value.to_str().ok()?.trim();
            (!id.is_empty()).then(|| (id.to_string(), value.clone()))
        })
        .unwrap_or_else(fresh_correlation);

    req.extensions_mut().insert(CorrelationId(id.clone()));
    req.headers_mut()
        .insert(CORRELATION_ID_HEADER, header.clone());

    let span = info_span!(
        "request",
        method = %req.method(),
        uri = %req.uri(),
        correlation_id = %id
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(CORRELATION_ID_HEADER, header);
    response
}

fn fresh_correlation() -> (String, HeaderValue) {
    let id = Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&id).unwrap_or(HeaderValue::from_static("unknown"));
    (id, header)
}

pub fn correlation_header_value(value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(value).ok()
}

pub fn request_span(name: &str, correlation_id: &str) -> Span {
    info_span!(
        "broker.op",
        operation = name,
        correlation_id = %correlation_id
    )
}
