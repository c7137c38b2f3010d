use std::{collections::HashMap, io, path::Path, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    cdp::browser_protocol::page::{EventLifecycleEvent, PrintToPdfParams},
    page::Page,
};
use futures::{Stream, StreamExt};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::{
    cnfg::ChromeSettings,
    pipeline::{Backend, PdfLayout, WaitPolicy},
};

/// How long a closed browser gets to exit before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Launches one Chromium process per render over CDP.
pub struct ChromeBackend {
    settings: ChromeSettings,
    envs: HashMap<String, String>,
}

/// A running browser plus everything that has to be torn down with it.
pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
    profile: TempDir,
}

impl ChromeSession {
    pub fn profile_dir(&self) -> &Path {
        self.profile.path()
    }
}

impl ChromeBackend {
    /// Resolves the child-process environment once, at startup.
    pub fn new(settings: ChromeSettings) -> Self {
        let mut envs = HashMap::new();
        if let Some(library_path) = &settings.library_path {
            let joined = match std::env::var("LD_LIBRARY_PATH") {
                Ok(existing) if !existing.is_empty() => format!("{library_path}:{existing}"),
                _ => library_path.clone(),
            };
            envs.insert("LD_LIBRARY_PATH".to_string(), joined);
        }
        Self { settings, envs }
    }

    fn browser_config(&self, profile: &TempDir) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .viewport(None)
            .user_data_dir(profile.path())
            .launch_timeout(self.settings.launch_timeout)
            .args(["--disable-gpu", "--disable-dev-shm-usage", "--hide-scrollbars"]);

        if self.settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable);
        }
        if !self.envs.is_empty() {
            builder = builder.envs(self.envs.clone());
        }

        builder
            .build()
            .map_err(|e| anyhow::anyhow!("browser config error: {e}"))
    }

    /// Checks that a browser executable can be resolved without starting it.
    pub fn check(&self) -> Result<()> {
        let profile = tempfile::Builder::new().prefix("report-pdf-check-").tempdir()?;
        self.browser_config(&profile).map(|_| ())
    }
}

#[async_trait]
impl Backend for ChromeBackend {
    type Browser = ChromeSession;
    type Page = Page;

    async fn launch(&self) -> Result<ChromeSession> {
        let profile = tempfile::Builder::new()
            .prefix("report-pdf-profile-")
            .tempdir()
            .context("creating browser profile directory")?;
        let config = self.browser_config(&profile)?;

        let (browser, mut handler) = Browser::launch(config).await?;

        // Some CDP messages fail to deserialize; keep polling past them.
        let handler = tokio::task::spawn(async move {
            while let Some(_event) = handler.next().await {}
        });

        Ok(ChromeSession {
            browser,
            handler,
            profile,
        })
    }

    async fn open_page(&self, session: &ChromeSession) -> Result<Page> {
        Ok(session.browser.new_page("about:blank").await?)
    }

    async fn load(&self, page: &Page, html: &str, wait: WaitPolicy) -> Result<()> {
        // Subscribe first so the lifecycle events from the injected document are not missed.
        let mut lifecycle = page.event_listener::<EventLifecycleEvent>().await?;

        page.set_content(html).await?;

        match wait {
            WaitPolicy::Load { settle } => {
                tokio::time::sleep(settle).await;
            }
            WaitPolicy::NetworkIdle => {
                wait_for_network_idle(lifecycle.map(|event| event.name.clone())).await?;
            }
        }
        Ok(())
    }

    async fn export(&self, page: &Page, layout: &PdfLayout) -> Result<Vec<u8>> {
        let params = PrintToPdfParams::builder()
            .paper_width(layout.paper_width)
            .paper_height(layout.paper_height)
            .print_background(layout.print_background)
            .prefer_css_page_size(layout.prefer_css_page_size)
            .build();

        Ok(page.pdf(params).await?)
    }

    async fn close_page(&self, page: Page) -> Result<()> {
        Ok(page.close().await?)
    }

    async fn close_browser(&self, session: ChromeSession) -> Result<()> {
        let ChromeSession {
            mut browser,
            handler,
            profile,
        } = session;

        let closed = browser.close().await.map(|_| ());
        if closed.is_err() {
            if let Some(Err(err)) = browser.kill().await {
                handler.abort();
                return Err(err).context("killing browser after failed close");
            }
        }
        let reaped = reap(&mut browser, EXIT_GRACE).await;
        handler.abort();
        profile.close().context("removing browser profile directory")?;

        closed.context("closing browser")?;
        reaped
    }
}

/// Resolves on the first `networkIdle` that follows an `init`.
/// `document.open()` restarts the frame lifecycle with `init`; idle events
/// before that belong to `about:blank`.
async fn wait_for_network_idle<S>(mut lifecycle: S) -> Result<()>
where
    S: Stream + Unpin,
    S::Item: AsRef<str>,
{
    let mut restarted = false;
    while let Some(name) = lifecycle.next().await {
        match name.as_ref() {
            "init" => restarted = true,
            "networkIdle" if restarted => return Ok(()),
            _ => {}
        }
    }
    anyhow::bail!("page closed before the network went idle")
}

/// The child-process handle that release needs.
#[async_trait]
trait ChildProcess: Send {
    async fn wait_exit(&mut self) -> io::Result<()>;
    async fn force_kill(&mut self) -> Option<io::Result<()>>;
}

#[async_trait]
impl ChildProcess for Browser {
    async fn wait_exit(&mut self) -> io::Result<()> {
        self.wait().await.map(|_| ())
    }

    async fn force_kill(&mut self) -> Option<io::Result<()>> {
        self.kill().await
    }
}

/// Waits up to `grace` for the child to exit, then kills it and waits once more.
async fn reap<C: ChildProcess>(child: &mut C, grace: Duration) -> Result<()> {
    match tokio::time::timeout(grace, child.wait_exit()).await {
        Ok(exited) => exited.context("waiting for browser exit"),
        Err(_) => {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "browser still running after close, killing it"
            );
            if let Some(Err(err)) = child.force_kill().await {
                return Err(err).context("killing browser that outlived close");
            }
            tokio::time::timeout(grace, child.wait_exit())
                .await
                .context("browser still running after kill")?
                .context("waiting for browser exit")
        }
    }
}
