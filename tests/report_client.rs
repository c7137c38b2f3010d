use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::Query,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use report_pdf::{
    AppState, RENDER_PATH, app,
    client::{ClientConfig, ClientError, DEFAULT_LOGO_URL, ReportClient},
    cors::AllowedOrigins,
    payload::RenderPayload,
    pipeline::{PdfRenderer, RenderError},
};
use serde_json::{Value, json};
use url::Url;

async fn spawn(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn grading_service(text: &'static str, seen: Arc<Mutex<Vec<HashMap<String, String>>>>) -> Router {
    Router::new().route(
        "/api/get-grading",
        get(move |Query(params): Query<HashMap<String, String>>| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(params);
                Json(json!({ "gradingText": text }))
            }
        }),
    )
}

struct EchoRenderer;

#[async_trait::async_trait]
impl PdfRenderer for EchoRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        Ok(format!("%PDF-1.7\n{html}").into_bytes())
    }
}

fn client_for(grading: SocketAddr, pdf: SocketAddr) -> ReportClient {
    let mut config = ClientConfig::new(
        Url::parse(&format!("http://{grading}/")).unwrap(),
        Url::parse(&format!("http://{pdf}{RENDER_PATH}")).unwrap(),
    );
    config.logo_url = "https://cdn.example/logo.png".to_string();
    ReportClient::new(config)
}

#[tokio::test]
async fn download_fetches_grading_then_renders_it() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let grading = spawn(grading_service("## Result\nPassed", seen.clone())).await;
    let pdf = spawn(app(AppState {
        renderer: Arc::new(EchoRenderer),
        origins: AllowedOrigins::default(),
        max_body_bytes: 1024 * 1024,
    }))
    .await;

    let download = client_for(grading, pdf)
        .download(" session-7 ")
        .await
        .expect("download succeeds");

    assert_eq!(download.filename, "grading-session-7.pdf");
    assert!(download.bytes.starts_with(b"%PDF"));
    let html = String::from_utf8(download.bytes).unwrap();
    assert!(html.contains("<h1>Consultation Feedback Report</h1>"));
    assert!(html.contains("<h2>Result</h2>"));
    assert!(html.contains("src=\"https://cdn.example/logo.png\""));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["sessionId"], "session-7");
    assert_eq!(seen[0]["force"], "1");
}

#[tokio::test]
async fn default_config_sends_the_report_logo() {
    let grading = spawn(grading_service("Passed", Arc::default())).await;
    let pdf = spawn(app(AppState {
        renderer: Arc::new(EchoRenderer),
        origins: AllowedOrigins::default(),
        max_body_bytes: 1024 * 1024,
    }))
    .await;
    let client = ReportClient::new(ClientConfig::new(
        Url::parse(&format!("http://{grading}/")).unwrap(),
        Url::parse(&format!("http://{pdf}{RENDER_PATH}")).unwrap(),
    ));

    let download = client.download("9").await.expect("download succeeds");

    let html = String::from_utf8(download.bytes).unwrap();
    assert!(html.contains(&format!("src=\"{DEFAULT_LOGO_URL}\"")));
}

#[tokio::test]
async fn blank_grading_text_stops_before_rendering() {
    let rendered = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&rendered);
    let grading = spawn(grading_service("   \n", Arc::default())).await;
    let pdf = spawn(Router::new().route(
        RENDER_PATH,
        post(move || {
            let counter = Arc::clone(&counter);
            async move {
                *counter.lock().unwrap() += 1;
                StatusCode::OK
            }
        }),
    ))
    .await;

    let err = client_for(grading, pdf).download("abc").await.unwrap_err();

    assert!(matches!(err, ClientError::EmptyGrading));
    assert_eq!(*rendered.lock().unwrap(), 0);
}

#[tokio::test]
async fn grading_http_error_is_reported() {
    let grading = spawn(Router::new().route(
        "/api/get-grading",
        get(|| async { StatusCode::NOT_FOUND }),
    ))
    .await;

    let err = client_for(grading, grading)
        .fetch_grading_text("abc")
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Status(404)));
}

#[tokio::test]
async fn service_error_message_is_surfaced() {
    let pdf = spawn(Router::new().route(
        RENDER_PATH,
        post(|| async {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "Payload too large" })),
            )
        }),
    ))
    .await;

    let err = client_for(pdf, pdf)
        .render_pdf(&RenderPayload {
            markdown: Some("x".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Payload too large");
}

#[tokio::test]
async fn non_json_service_error_falls_back_to_status() {
    let pdf = spawn(Router::new().route(
        RENDER_PATH,
        post(|| async {
            (
                StatusCode::BAD_GATEWAY,
                [(header::CONTENT_TYPE, "text/html")],
                "<html>upstream down</html>",
            )
                .into_response()
        }),
    ))
    .await;

    let err = client_for(pdf, pdf)
        .render_pdf(&RenderPayload::default())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "PDF service error (HTTP 502)");
}

#[tokio::test]
async fn payload_is_sent_as_camel_case_json() {
    let received = Arc::new(Mutex::new(None::<Value>));
    let sink = Arc::clone(&received);
    let pdf = spawn(Router::new().route(
        RENDER_PATH,
        post(move |Json(body): Json<Value>| {
            let sink = Arc::clone(&sink);
            async move {
                *sink.lock().unwrap() = Some(body);
                "%PDF-1.7"
            }
        }),
    ))
    .await;

    let bytes = client_for(pdf, pdf)
        .render_pdf(&RenderPayload {
            title: Some("T".to_string()),
            logo_url: Some("https://x/logo.png".to_string()),
            filename: Some("f.pdf".to_string()),
            markdown: Some("m".to_string()),
            html: None,
        })
        .await
        .expect("render succeeds");

    assert_eq!(bytes, b"%PDF-1.7");
    let body = received.lock().unwrap().take().expect("body captured");
    assert_eq!(
        body,
        json!({
            "title": "T",
            "logoUrl": "https://x/logo.png",
            "filename": "f.pdf",
            "markdown": "m",
        })
    );
}
