//! Drives a real Chromium. Run with `cargo test -- --ignored`; set
//! `CHROME_EXECUTABLE` when the browser is not on the default search path.

use std::{path::PathBuf, time::Duration};

use report_pdf::{
    browser::ChromeBackend,
    cnfg::ChromeSettings,
    document,
    pipeline::{Backend, Pipeline, WaitPolicy},
};

fn backend() -> ChromeBackend {
    ChromeBackend::new(ChromeSettings {
        executable: std::env::var_os("CHROME_EXECUTABLE").map(PathBuf::from),
        library_path: None,
        no_sandbox: true,
        launch_timeout: Duration::from_secs(20),
    })
}

#[tokio::test]
#[ignore = "needs a local Chromium"]
async fn network_idle_render_produces_a_pdf() {
    let pipeline = Pipeline::new(backend(), WaitPolicy::NetworkIdle, Duration::from_secs(15));
    let body = document::markdown_to_body("## Summary\n- history taken\n- plan agreed");
    let html = document::compose("Consultation Feedback Report", "", &body);

    let pdf = pipeline.render(&html).await.expect("render succeeds");

    assert!(pdf.starts_with(b"%PDF"));
}

#[tokio::test]
#[ignore = "needs a local Chromium"]
async fn release_reaps_the_browser_and_removes_its_profile() {
    let backend = backend();
    let session = backend.launch().await.expect("launch");
    let profile = session.profile_dir().to_path_buf();
    assert!(profile.is_dir());

    let page = backend.open_page(&session).await.expect("open page");
    backend
        .load(&page, "<p>hello</p>", WaitPolicy::NetworkIdle)
        .await
        .expect("load");
    backend.close_page(page).await.expect("close page");

    tokio::time::timeout(Duration::from_secs(15), backend.close_browser(session))
        .await
        .expect("release is bounded")
        .expect("release succeeds");
    assert!(!profile.exists());
}
