pub mod browser;
pub mod client;
pub mod cnfg;
pub mod cors;
pub mod document;
pub mod error;
pub mod payload;
pub mod pipeline;
pub mod render_pdf;
pub mod telemetry;

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    middleware,
    routing::{get, post},
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use cors::{AllowedOrigins, cors_middleware};
use pipeline::PdfRenderer;
use render_pdf::{REQUEST_ID_HEADER, method_not_allowed, preflight, render_pdf};

pub const RENDER_PATH: &str = "/api/render-pdf";

#[derive(Clone)]
pub struct AppState {
    pub renderer: Arc<dyn PdfRenderer>,
    pub origins: AllowedOrigins,
    pub max_body_bytes: usize,
}

impl FromRef<AppState> for Arc<dyn PdfRenderer> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.renderer)
    }
}

pub fn app(state: AppState) -> Router {
    let render_route = post(render_pdf)
        .options(preflight)
        .fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(state.max_body_bytes));

    Router::new()
        .route(RENDER_PATH, render_route)
        .route("/healthz", get(healthz))
        .layer(middleware::from_fn_with_state(
            state.origins.clone(),
            cors_middleware,
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "Pong"
}
