use chromiumoxide::browser::{Browser as CrBrowser, BrowserConfig as CrBrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;

use crate::config::{BrowserBuilder, BrowserConfig};
use crate::error::{Error, Result};
use crate::page::Page;

/// Chrome flags that improve performance without affecting functionality.
const PERF_ARGS: &[&str] = &[
    "disable-gpu",
    "disable-extensions",
    "metrics-recording-only",
    "mute-audio",
    "no-default-browser-check",
    "disable-client-side-phishing-detection",
    "disable-popup-blocking",
    "disable-prompt-on-repost",
];

/// A browser session: either a locally launched Chrome or a connection to a
/// remote one over its CDP websocket.
pub struct Browser {
    browser: CrBrowser,
    remote: bool,
    default_timeout: std::time::Duration,
    handler_task: tokio::task::JoinHandle<()>,
}

impl Browser {
    /// Create a new BrowserBuilder for configuring and launching a browser.
    pub fn builder() -> BrowserBuilder {
        BrowserBuilder::new()
    }

    /// Launch (or connect to) a browser with the given configuration.
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let (browser, mut handler, remote) = match config.remote_endpoint {
            Some(ref endpoint) => {
                tracing::info!(endpoint = %endpoint, "connecting to remote browser");
                let (browser, handler) = CrBrowser::connect(endpoint.as_str())
                    .await
                    .map_err(|e| Error::LaunchError(format!("connect to {endpoint}: {e}")))?;
                (browser, handler, true)
            }
            None => {
                let cr_config = Self::local_config(&config)?;
                tracing::info!(headless = config.headless, "launching local browser");
                let (browser, handler) = CrBrowser::launch(cr_config)
                    .await
                    .map_err(|e| Error::LaunchError(e.to_string()))?;
                (browser, handler, false)
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
        });

        Ok(Self {
            browser,
            remote,
            default_timeout: config.default_timeout,
            handler_task,
        })
    }

    fn local_config(config: &BrowserConfig) -> Result<CrBrowserConfig> {
        let mut builder = CrBrowserConfig::builder();

        if config.headless {
            builder = builder.new_headless_mode().no_sandbox();
        } else {
            builder = builder.with_head().no_sandbox();
        }

        // chromiumoxide adds the `--` prefix itself
        for arg in PERF_ARGS {
            builder = builder.arg(*arg);
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder = builder.viewport(Viewport {
            width: config.viewport_width,
            height: config.viewport_height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: false,
            has_touch: false,
        });

        builder.build().map_err(Error::LaunchError)
    }

    /// Open a blank page. Navigation is left to the caller.
    pub async fn new_page(&self) -> Result<Page> {
        let cr_page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?;
        Ok(Page::new(cr_page, self.default_timeout))
    }

    /// Shut the session down. A local Chrome is closed and reaped; a remote
    /// browser is only disconnected from.
    pub async fn close(mut self) -> Result<()> {
        if !self.remote {
            self.browser.close().await?;
            if let Err(e) = self.browser.wait().await {
                tracing::warn!(error = %e, "browser process did not exit cleanly");
            }
        }
        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
