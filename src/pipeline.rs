//! The HTML → PDF render pipeline.
//!
//! Each call to [`Pipeline::render`] walks a fixed sequence of stages:
//! acquire a browser, open a page, load the document, export a PDF, release.
//! Every browser that was acquired is released on every exit path, and a
//! failure while releasing never changes the result of the render.
//!
//! The pipeline does no logging of its own; stage timings and outcomes are
//! handed to a [`StageObserver`].

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

/// How the load stage decides the document has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Wait for the network to go quiet after the content is injected.
    /// Picks up remote logos and fonts, but a connection that never settles
    /// runs into the load timeout.
    NetworkIdle,
    /// Wait for the load event, then sleep for `settle`. Never hangs on a
    /// stuck connection, but a slow remote image may be missing from the PDF.
    Load { settle: Duration },
}

impl fmt::Display for WaitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPolicy::NetworkIdle => f.write_str("networkidle"),
            WaitPolicy::Load { settle } => write!(f, "load+{}ms", settle.as_millis()),
        }
    }
}

/// Physical page setup for the export stage, in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfLayout {
    pub paper_width: f64,
    pub paper_height: f64,
    pub print_background: bool,
    pub prefer_css_page_size: bool,
}

impl PdfLayout {
    pub const A4: PdfLayout = PdfLayout {
        paper_width: 8.27,
        paper_height: 11.69,
        print_background: true,
        prefer_css_page_size: true,
    };
}

impl Default for PdfLayout {
    fn default() -> Self {
        Self::A4
    }
}

/// A headless browser the pipeline can drive.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Browser: Send + Sync;
    type Page: Send + Sync;

    async fn launch(&self) -> anyhow::Result<Self::Browser>;

    async fn open_page(&self, browser: &Self::Browser) -> anyhow::Result<Self::Page>;

    /// Injects `html` as the page's document and waits according to `wait`.
    async fn load(&self, page: &Self::Page, html: &str, wait: WaitPolicy) -> anyhow::Result<()>;

    async fn export(&self, page: &Self::Page, layout: &PdfLayout) -> anyhow::Result<Vec<u8>>;

    async fn close_page(&self, page: Self::Page) -> anyhow::Result<()>;

    async fn close_browser(&self, browser: Self::Browser) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquire,
    Open,
    Load,
    Export,
    ClosePage,
    CloseBrowser,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Open => "open",
            Stage::Load => "load",
            Stage::Export => "export",
            Stage::ClosePage => "close_page",
            Stage::CloseBrowser => "close_browser",
        }
    }

    pub fn is_cleanup(self) -> bool {
        matches!(self, Stage::ClosePage | Stage::CloseBrowser)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEvent {
    pub stage: Stage,
    pub elapsed: Duration,
    pub outcome: Outcome,
}

/// Receives one event per executed stage.
pub trait StageObserver: Send + Sync {
    fn record(&self, event: StageEvent);
}

/// Drops every event.
pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn record(&self, _event: StageEvent) {}
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to start browser: {0:#}")]
    Launch(anyhow::Error),
    #[error("failed to open page: {0:#}")]
    OpenPage(anyhow::Error),
    #[error("failed to load document: {0:#}")]
    Load(anyhow::Error),
    #[error("document did not finish loading within {0:?}")]
    LoadTimeout(Duration),
    #[error("failed to export pdf: {0:#}")]
    Export(anyhow::Error),
}

/// Object-safe entry point used by the HTTP layer.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError>;
}

pub struct Pipeline<B: Backend> {
    backend: B,
    wait: WaitPolicy,
    load_timeout: Duration,
    layout: PdfLayout,
    observer: Arc<dyn StageObserver>,
}

impl<B: Backend> Pipeline<B> {
    pub fn new(backend: B, wait: WaitPolicy, load_timeout: Duration) -> Self {
        Self {
            backend,
            wait,
            load_timeout,
            layout: PdfLayout::default(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        let started = Instant::now();
        let browser = self
            .observe(Stage::Acquire, started, self.backend.launch().await)
            .map_err(RenderError::Launch)?;

        let result = self.render_with(&browser, html).await;

        let started = Instant::now();
        let closed = self.backend.close_browser(browser).await;
        let _ = self.observe(Stage::CloseBrowser, started, closed);

        result
    }

    async fn render_with(&self, browser: &B::Browser, html: &str) -> Result<Vec<u8>, RenderError> {
        let started = Instant::now();
        let page = self
            .observe(Stage::Open, started, self.backend.open_page(browser).await)
            .map_err(RenderError::OpenPage)?;

        let result = self.load_and_export(&page, html).await;

        let started = Instant::now();
        let closed = self.backend.close_page(page).await;
        let _ = self.observe(Stage::ClosePage, started, closed);

        result
    }

    async fn load_and_export(&self, page: &B::Page, html: &str) -> Result<Vec<u8>, RenderError> {
        let started = Instant::now();
        let loaded = tokio::time::timeout(self.load_timeout, self.backend.load(page, html, self.wait))
            .await
            .map_err(|_| RenderError::LoadTimeout(self.load_timeout))
            .and_then(|loaded| loaded.map_err(RenderError::Load));
        self.record(Stage::Load, started, loaded.as_ref().err().map(ToString::to_string));
        loaded?;

        let started = Instant::now();
        self.observe(
            Stage::Export,
            started,
            self.backend.export(page, &self.layout).await,
        )
        .map_err(RenderError::Export)
    }

    fn observe<T>(
        &self,
        stage: Stage,
        started: Instant,
        result: anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        self.record(
            stage,
            started,
            result.as_ref().err().map(|err| format!("{err:#}")),
        );
        result
    }

    fn record(&self, stage: Stage, started: Instant, failure: Option<String>) {
        self.observer.record(StageEvent {
            stage,
            elapsed: started.elapsed(),
            outcome: failure.map_or(Outcome::Ok, Outcome::Failed),
        });
    }
}

#[async_trait]
impl<B: Backend> PdfRenderer for Pipeline<B> {
    async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        Pipeline::render(self, html).await
    }
}
