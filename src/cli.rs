use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::Local;
use console::{style, StyledObject};
use indicatif::ProgressBar;

use crate::args::Args;
use crate::cleanup;
use crate::config::{self, Account, Config};
use crate::driver::dnb::DnbPortal;
use crate::driver::{Session, SessionOptions};
use crate::engine;
use crate::merge;
use crate::terminal;

pub async fn main(args: Args) -> Result<()> {
    // Configuration problems must surface before any browser starts.
    let config = config::load(&args.config)?;
    let download_dir = args
        .download_dir
        .canonicalize()
        .with_context(|| format!("Invalid download directory {}", args.download_dir.display()))?;

    let session = Session::start(&SessionOptions {
        geckodriver: args.geckodriver.clone(),
        port: args.port,
        download_dir: download_dir.clone(),
        headless: !args.show,
    })
    .await?;

    let result = run(&session, &config, &download_dir).await;

    // Teardown and the residual sweep run on every exit path, so a failed
    // extraction still releases the browser and leaves no half-finished
    // statement files behind.
    session.close().await;
    match cleanup::remove_residual(&download_dir) {
        Ok(0) => {}
        Ok(removed) => log::info!("Residual cleanup removed {removed} stray statement files"),
        Err(err) => log::warn!("Residual cleanup failed: {err}"),
    }

    result
}

async fn run(session: &Session, config: &Config, download_dir: &Path) -> Result<()> {
    let mut portal = DnbPortal::new(&session.driver);

    let ssn = match &config.ssn {
        Some(ssn) => ssn.clone(),
        None => terminal::input("SSN (11 digits)")?,
    };
    portal.login(&ssn).await?;
    portal.open_statement_archive().await?;

    let today = Local::now().date_naive();
    println!("{}", style_header("Extracting statements:"));

    let mut merge_failures = 0;
    for extraction in &config.extractions {
        for account in &extraction.accounts {
            let spinner = account_spinner(account);
            let report = engine::extract_account(
                &mut portal,
                download_dir,
                account,
                extraction.from,
                extraction.to,
                today,
                engine::MAX_SWEEPS,
            )
            .await;
            // Clear before propagating a fatal error, or the spinner line
            // lingers above the error output.
            spinner.finish_and_clear();
            let report = report?;

            // A merge failure must be visible to the operator but must not
            // stop the remaining accounts.
            match merge::consolidate(download_dir, account) {
                Ok(output) => {
                    println!(
                        "  {} {}: {} months merged into {}, {} unavailable",
                        style("✓").green(),
                        style_account(account),
                        report.downloaded.len(),
                        output.display(),
                        report.unavailable.len(),
                    );
                }
                Err(err) => {
                    merge_failures += 1;
                    log::error!(
                        "Consolidation failed for {}: {err}",
                        account.display_name()
                    );
                    println!(
                        "  {} {}: {err}",
                        style("✗").red(),
                        style_account(account)
                    );
                }
            }
        }
    }

    if merge_failures > 0 {
        log::warn!("{merge_failures} accounts could not be consolidated");
    }
    Ok(())
}

fn account_spinner(account: &Account) -> ProgressBar {
    let spinner = ProgressBar::new_spinner()
        .with_message(format!("Fetching statements for {}", account.display_name()));
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn style_header(header: &str) -> StyledObject<&str> {
    style(header).bold().underlined()
}

fn style_account(account: &Account) -> StyledObject<&str> {
    style(account.display_name()).magenta()
}
