use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::{
    document,
    error::HttpError,
    payload::RenderPayload,
    pipeline::PdfRenderer,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn render_pdf(
    State(renderer): State<Arc<dyn PdfRenderer>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, HttpError> {
    let body = body?;
    let payload = RenderPayload::from_json(&body)?;
    let request = payload.validate()?;
    let disposition = request.content_disposition();

    let body_html = request.content.into_body_html();
    let html = document::compose(&request.title, &request.logo_url, &body_html);

    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let pdf = renderer
        .render(&html)
        .await
        .map_err(|err| HttpError::internal(err, request_id.clone()))?;

    let disposition = HeaderValue::try_from(disposition)
        .map_err(|err| HttpError::internal(err, request_id))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        Body::from(pdf),
    )
        .into_response())
}

pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn method_not_allowed() -> HttpError {
    HttpError::MethodNotAllowed
}
