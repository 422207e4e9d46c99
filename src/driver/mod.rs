use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context as _, Result};
use thirtyfour::common::capabilities::firefox::{FirefoxCapabilities, FirefoxPreferences};
use thirtyfour::prelude::*;
use tokio::process::{Child, Command};

pub mod dnb;

const CONNECT_ATTEMPTS: u32 = 20;
const CONNECT_INTERVAL: Duration = Duration::from_millis(250);

pub struct SessionOptions {
    /// Resolved path of the geckodriver executable. Passed in explicitly
    /// instead of mutating the process PATH.
    pub geckodriver: PathBuf,
    pub port: u16,
    pub download_dir: PathBuf,
    pub headless: bool,
}

/// A running geckodriver process plus the browser session talking to it.
///
/// `close` has to run on every exit path, error paths included, so the
/// browser is released even when the run fails. The child process is
/// additionally `kill_on_drop` as a last resort against panics.
pub struct Session {
    pub driver: WebDriver,
    geckodriver: Child,
}

impl Session {
    pub async fn start(options: &SessionOptions) -> Result<Self> {
        log::debug!(
            "Starting geckodriver from {}",
            options.geckodriver.display()
        );
        let geckodriver = Command::new(&options.geckodriver)
            .args(["--port", &options.port.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to start geckodriver at {}",
                    options.geckodriver.display()
                )
            })?;

        let capabilities = capabilities(options)?;
        let url = format!("http://localhost:{}", options.port);
        let driver = connect(&url, capabilities).await?;

        log::debug!("Browser session established");
        Ok(Self {
            driver,
            geckodriver,
        })
    }

    /// Best-effort teardown. Failures are logged instead of propagated so
    /// teardown never masks the error that brought the run down.
    pub async fn close(mut self) {
        if let Err(err) = self.driver.quit().await {
            log::warn!("Unable to quit browser session: {err}");
        }
        if let Err(err) = self.geckodriver.kill().await {
            log::warn!("Unable to stop geckodriver: {err}");
        }
    }
}

fn capabilities(options: &SessionOptions) -> Result<FirefoxCapabilities> {
    let mut preferences = FirefoxPreferences::default();
    preferences.set("browser.download.folderList", 2)?;
    preferences.set("browser.download.manager.showWhenStarting", false)?;
    preferences.set(
        "browser.download.dir",
        options.download_dir.display().to_string(),
    )?;
    preferences.set("browser.helperApps.neverAsk.saveToDisk", "application/pdf")?;
    preferences.set("pdfjs.disabled", true)?;
    preferences.set("plugin.scan.plid.all", false)?;
    preferences.set("plugin.scan.Acrobat", "99.0")?;
    preferences.set("general.warnOnAboutConfig", false)?;

    let mut capabilities = DesiredCapabilities::firefox();
    capabilities.set_preferences(preferences)?;
    if options.headless {
        capabilities.set_headless()?;
    }
    Ok(capabilities)
}

/// geckodriver needs a moment before it starts listening on its port.
async fn connect(url: &str, capabilities: FirefoxCapabilities) -> Result<WebDriver> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match WebDriver::new(url, capabilities.clone()).await {
            Ok(driver) => return Ok(driver),
            Err(err) if attempt < CONNECT_ATTEMPTS => {
                log::debug!("WebDriver connect attempt {attempt} failed: {err}");
                tokio::time::sleep(CONNECT_INTERVAL).await;
            }
            Err(err) => {
                return Err(err).context("Unable to connect to geckodriver");
            }
        }
    }
}
