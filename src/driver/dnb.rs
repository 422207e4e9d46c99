use std::time::Duration;

use anyhow::{anyhow, Result};
use thirtyfour::components::SelectElement;
use thirtyfour::prelude::*;

use crate::config::Account;
use crate::engine::{PortalError, SearchOutcome, StatementPortal};
use crate::months::MonthOffset;
use crate::terminal;

/// Timeout for DOM elements to show up. Short on purpose: a miss only costs
/// one sweep, a long wait stalls every month of every account.
const UI_TIMEOUT: Duration = Duration::from_secs(5);
const UI_POLL: Duration = Duration::from_millis(250);

/// Statement downloads carry this document type in the DNB archive.
const DOCUMENT_TYPE: &str = "kontoutskrift";

/// The archive's site-specific locator plumbing. Everything behind the
/// `StatementPortal` trait; the orchestrator never sees a locator.
pub struct DnbPortal<'a> {
    driver: &'a WebDriver,
}

impl<'a> DnbPortal<'a> {
    pub fn new(driver: &'a WebDriver) -> Self {
        Self { driver }
    }

    /// Logs in with the SSN plus a PIN and OTP combo. PIN and OTP are
    /// prompted interactively and never stored anywhere.
    pub async fn login(&self, ssn: &str) -> Result<()> {
        log::info!("Logging in...");
        self.driver.goto("https://dnb.no").await?;
        self.dismiss_consent_modal().await;

        // First stage: SSN.
        let login_button = self
            .driver
            .query(By::Tag("span"))
            .with_text("Logg inn")
            .wait(UI_TIMEOUT, UI_POLL)
            .first()
            .await?;
        login_button.wait_until().wait(UI_TIMEOUT, UI_POLL).clickable().await?;
        login_button.click().await?;

        let login_modal = self
            .driver
            .query(By::Id("dnb-modal-root"))
            .wait(UI_TIMEOUT, UI_POLL)
            .first()
            .await?;
        login_modal.wait_until().wait(UI_TIMEOUT, UI_POLL).displayed().await?;

        let login_form = login_modal.query(By::Tag("form")).first().await?;
        login_form
            .query(By::Tag("input"))
            .with_attribute("name", "uid")
            .first()
            .await?
            .send_keys(ssn)
            .await?;
        let submit = login_form
            .query(By::Tag("button"))
            .with_attribute("type", "submit")
            .first()
            .await?;
        submit.wait_until().wait(UI_TIMEOUT, UI_POLL).clickable().await?;
        submit.click().await?;

        // Second stage: switch from BankID to the PIN and OTP method.
        let container = self
            .driver
            .query(By::Id("r_state-2"))
            .wait(UI_TIMEOUT, UI_POLL)
            .first()
            .await?;
        let method = container
            .query(By::Tag("div"))
            .with_attribute("role", "button")
            .first()
            .await?;
        method.wait_until().wait(UI_TIMEOUT, UI_POLL).clickable().await?;
        method.click().await?;

        let form = container.query(By::Tag("form")).first().await?;
        let pin_input = form.query(By::Id("phoneCode")).first().await?;
        let otp_input = form.query(By::Id("otpCode")).first().await?;
        let submit = form
            .query(By::Tag("button"))
            .with_attribute("type", "submit")
            .first()
            .await?;

        let pin = terminal::secret_digits("PIN (4 digits)", 4)?;
        let otp = terminal::secret_digits("One time password (6 digits)", 6)?;
        pin_input.send_keys(&pin).await?;
        otp_input.send_keys(&otp).await?;
        submit.wait_until().wait(UI_TIMEOUT, UI_POLL).clickable().await?;
        submit.click().await?;

        // Force a navigation to the user's home page. Skipping the click is
        // fine; some logins go there directly without the interstitial.
        if let Ok(logo) = self
            .driver
            .query(By::Tag("a"))
            .with_attribute("title", "DNB")
            .wait(UI_TIMEOUT, UI_POLL)
            .first()
            .await
        {
            if logo.wait_until().wait(UI_TIMEOUT, UI_POLL).clickable().await.is_ok() {
                logo.click().await?;
            }
        }

        log::info!("Logging in...done");
        Ok(())
    }

    /// Navigates to the document archive and narrows it to statements.
    pub async fn open_statement_archive(&self) -> Result<()> {
        log::info!("Opening the statement archive...");

        let menu = self
            .driver
            .query(By::Tag("a"))
            .with_attribute("role", "button")
            .with_text("Dagligbank og lån")
            .wait(UI_TIMEOUT, UI_POLL)
            .first()
            .await?;
        menu.wait_until().wait(UI_TIMEOUT, UI_POLL).clickable().await?;
        menu.click().await?;

        let archive = self
            .driver
            .query(By::Tag("a"))
            .with_attribute("title", "Arkiv")
            .wait(UI_TIMEOUT, UI_POLL)
            .first()
            .await?;
        archive.wait_until().wait(UI_TIMEOUT, UI_POLL).clickable().await?;
        archive.click().await?;

        let document_type = self.reveal_select("documentType").await?;
        document_type.select_by_value(DOCUMENT_TYPE).await?;

        log::info!("Opening the statement archive...done");
        Ok(())
    }

    /// The consent modal only appears on some visits; ignore it if it never
    /// shows up.
    async fn dismiss_consent_modal(&self) {
        let modal = match self
            .driver
            .query(By::Id("consent-modal"))
            .wait(UI_TIMEOUT, UI_POLL)
            .first()
            .await
        {
            Ok(modal) => modal,
            Err(_) => return,
        };
        if modal.is_displayed().await.unwrap_or(false) {
            if let Ok(close) = modal
                .query(By::Tag("button"))
                .with_class("consent-close")
                .first()
                .await
            {
                if let Err(err) = close.click().await {
                    log::debug!("Unable to close consent modal: {err}");
                }
            }
        }
    }

    /// The archive's dropdowns are `display: none` styled custom widgets; the
    /// underlying `<select>` has to be unhidden before it can be driven.
    async fn reveal_select(&self, id: &str) -> WebDriverResult<SelectElement> {
        self.driver
            .query(By::Id(&format!("{id}-button")))
            .wait(UI_TIMEOUT, UI_POLL)
            .first()
            .await?
            .wait_until()
            .wait(UI_TIMEOUT, UI_POLL)
            .clickable()
            .await?;

        self.driver
            .execute(
                &format!(r#"document.getElementById("{id}").style = "display: block;""#),
                vec![],
            )
            .await?;

        let select = self
            .driver
            .query(By::Id(id))
            .wait(UI_TIMEOUT, UI_POLL)
            .first()
            .await?;
        select.wait_until().wait(UI_TIMEOUT, UI_POLL).displayed().await?;
        SelectElement::new(&select).await
    }

    async fn try_select_account(&self, account: &Account) -> WebDriverResult<()> {
        let selector = self.reveal_select("accountNumber").await?;
        selector.select_by_value(&account.normalized_id()).await
    }

    async fn try_request_statement(
        &self,
        offset: MonthOffset,
    ) -> WebDriverResult<SearchOutcome> {
        let month_menu = self.reveal_select("searchIntervalIndex").await?;
        month_menu.select_by_value(&offset.to_string()).await?;

        let submit = self
            .driver
            .query(By::Id("archiveSearchSubmit"))
            .wait(UI_TIMEOUT, UI_POLL)
            .first()
            .await?;
        submit.click().await?;

        // Either a download link shows up in the results table or the page
        // explicitly says the search found nothing.
        let result = self
            .driver
            .query(By::Css(&format!(
                "table a[href='ajax/attachment/0/{DOCUMENT_TYPE}']"
            )))
            .or(By::XPath("//h3[contains(text(), 'Søket ga ingen treff!')]"))
            .wait(UI_TIMEOUT, UI_POLL)
            .first()
            .await?;

        match result.tag_name().await?.as_str() {
            "a" => {
                result.click().await?;
                Ok(SearchOutcome::DownloadStarted)
            }
            "h3" => Ok(SearchOutcome::NoStatement),
            tag => Err(WebDriverError::FatalError(format!(
                "unexpected search result element <{tag}>"
            ))),
        }
    }

    /// A failed wait means either "the page is slow" (retry next sweep) or
    /// "the session is gone" (fatal). The session itself is the tiebreaker:
    /// if it still answers a trivial command, the wait merely timed out.
    async fn classify(&self, err: WebDriverError) -> PortalError {
        match self.driver.title().await {
            Ok(_) => PortalError::Timeout,
            Err(probe_err) => PortalError::Session(
                anyhow!(err).context(format!("session probe failed: {probe_err}")),
            ),
        }
    }
}

impl StatementPortal for DnbPortal<'_> {
    async fn select_account(&mut self, account: &Account) -> Result<(), PortalError> {
        log::debug!("Selecting account {}", account.display_name());
        match self.try_select_account(account).await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.classify(err).await),
        }
    }

    async fn request_statement(
        &mut self,
        offset: MonthOffset,
    ) -> Result<SearchOutcome, PortalError> {
        match self.try_request_statement(offset).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(self.classify(err).await),
        }
    }
}
