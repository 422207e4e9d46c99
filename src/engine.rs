use std::path::Path;

use chrono::NaiveDate;
use thiserror::Error;

use crate::config::Account;
use crate::months::{self, MonthOffset, PendingMonths};
use crate::reconcile;

/// How often we re-sweep an account's pending months before declaring the
/// remote page broken. The source of most re-sweeps is the download latency
/// between clicking a link and the file landing on disk, which one extra
/// sweep usually absorbs.
pub const MAX_SWEEPS: u32 = 25;

/// What the archive UI reported for one requested month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A download link was found and clicked. This only *initiates* the
    /// download; whether the file actually arrived is decided by
    /// reconciliation against the download directory.
    DownloadStarted,

    /// The archive explicitly reported no statement for this month. Permanent
    /// for the month, not an error.
    NoStatement,
}

#[derive(Debug, Error)]
pub enum PortalError {
    /// A wait on the remote page exceeded its timeout. Recoverable; the
    /// month stays pending for the next sweep.
    #[error("timed out waiting for the remote page")]
    Timeout,

    /// The automation channel itself is unusable. Fatal for the run.
    #[error("automation session failed: {0:#}")]
    Session(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(
        "gave up on account {account} after {sweeps} sweeps, months still pending: {remaining:?}"
    )]
    RetriesExhausted {
        account: String,
        sweeps: u32,
        remaining: Vec<MonthOffset>,
    },

    #[error("automation session failed: {0:#}")]
    Session(anyhow::Error),

    #[error("unable to scan download directory: {0}")]
    Scan(#[from] std::io::Error),
}

/// The capability surface the orchestrator needs from the remote UI. The
/// site-specific locator plumbing lives behind it (see `driver::dnb`), and
/// tests drive the orchestrator with a scripted implementation.
#[allow(async_fn_in_trait)]
pub trait StatementPortal {
    /// Brings the remote UI into the context of the given account.
    async fn select_account(&mut self, account: &Account) -> Result<(), PortalError>;

    /// Searches the archive for the statement `offset` months back and
    /// clicks the download link if one shows up.
    async fn request_statement(&mut self, offset: MonthOffset) -> Result<SearchOutcome, PortalError>;
}

/// What happened to one account once its pending set emptied.
#[derive(Debug, PartialEq, Eq)]
pub struct AccountReport {
    /// Months whose statement arrived in the download directory.
    pub downloaded: Vec<MonthOffset>,
    /// Months the archive explicitly has no statement for.
    pub unavailable: Vec<MonthOffset>,
    /// How many sweeps it took.
    pub sweeps: u32,
}

/// Drives the portal for one account until every month in the window is
/// either downloaded or known to be unavailable.
///
/// Each sweep iterates a snapshot of the pending months and then reconciles
/// against the download directory; removals are applied between sweeps, never
/// while a sweep is iterating. Timeouts leave the month pending for the next
/// sweep, bounded by `max_sweeps`.
pub async fn extract_account<P: StatementPortal>(
    portal: &mut P,
    download_dir: &Path,
    account: &Account,
    from: NaiveDate,
    to: NaiveDate,
    today: NaiveDate,
    max_sweeps: u32,
) -> Result<AccountReport, EngineError> {
    let mut pending = PendingMonths::new(months::resolve_window(today, from, to));
    let mut downloaded = Vec::new();
    let mut unavailable = Vec::new();

    log::info!(
        "Extracting {} statements for {}...",
        pending.len(),
        account.display_name()
    );

    // An empty window has nothing to request, so the portal is not touched
    // at all, not even for account selection.
    if !pending.is_empty() {
        select_account(portal, account, max_sweeps, &pending).await?;
    }

    let mut sweeps = 0;
    while !pending.is_empty() {
        if sweeps == max_sweeps {
            return Err(EngineError::RetriesExhausted {
                account: account.display_name().to_string(),
                sweeps,
                remaining: pending.snapshot(),
            });
        }
        sweeps += 1;

        let mut resolved = Vec::new();
        for offset in pending.snapshot() {
            match portal.request_statement(offset).await {
                Ok(SearchOutcome::DownloadStarted) => {
                    // Removal is deferred until the file shows up on disk.
                    log::debug!("Download started for month offset {offset}");
                }
                Ok(SearchOutcome::NoStatement) => {
                    log::info!(
                        "No statement available for {} at month offset {offset}",
                        account.display_name()
                    );
                    resolved.push(offset);
                    unavailable.push(offset);
                }
                Err(PortalError::Timeout) => {
                    log::warn!(
                        "Timed out on {} at month offset {offset}, will retry next sweep",
                        account.display_name()
                    );
                }
                Err(PortalError::Session(err)) => return Err(EngineError::Session(err)),
            }
        }
        pending.remove_all(&resolved);

        let on_disk = reconcile::downloaded_offsets(download_dir, account, today)?;
        let arrived: Vec<MonthOffset> = pending
            .snapshot()
            .into_iter()
            .filter(|offset| on_disk.contains(offset))
            .collect();
        downloaded.extend(arrived.iter().copied());
        pending.remove_all(&arrived);
    }

    log::info!(
        "Extracting statements for {}...done ({} downloaded, {} unavailable, {} sweeps)",
        account.display_name(),
        downloaded.len(),
        unavailable.len(),
        sweeps
    );

    Ok(AccountReport {
        downloaded,
        unavailable,
        sweeps,
    })
}

/// The account dropdown may still be rendering when we get here, so selection
/// timeouts are retried with the same bounded budget as sweeps.
async fn select_account<P: StatementPortal>(
    portal: &mut P,
    account: &Account,
    max_attempts: u32,
    pending: &PendingMonths,
) -> Result<(), EngineError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match portal.select_account(account).await {
            Ok(()) => return Ok(()),
            Err(PortalError::Timeout) if attempts < max_attempts => {
                log::warn!(
                    "Timed out selecting account {}, retrying",
                    account.display_name()
                );
            }
            Err(PortalError::Timeout) => {
                return Err(EngineError::RetriesExhausted {
                    account: account.display_name().to_string(),
                    sweeps: attempts,
                    remaining: pending.snapshot(),
                })
            }
            Err(PortalError::Session(err)) => return Err(EngineError::Session(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::fs;
    use std::path::PathBuf;

    use chrono::Months;

    fn account(id: &str) -> Account {
        Account {
            id: id.to_string(),
            name: None,
        }
    }

    fn date(year: i32, month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, 1).unwrap()
    }

    const TODAY: fn() -> NaiveDate = || date(2024, 3);

    /// One scripted reaction of the fake archive to a statement request.
    enum Step {
        Timeout,
        NoStatement,
        /// "Click succeeded"; the download lands on disk `lag` requests
        /// later, mimicking the gap between click and file arrival.
        Download { lag: u32 },
    }

    struct ScriptedPortal {
        dir: PathBuf,
        account_id: String,
        script: HashMap<MonthOffset, VecDeque<Step>>,
        in_flight: Vec<(u32, MonthOffset)>,
        selected: bool,
        select_timeouts: u32,
        requests: u32,
    }

    impl ScriptedPortal {
        fn new(dir: &Path, script: HashMap<MonthOffset, VecDeque<Step>>) -> Self {
            Self {
                dir: dir.to_owned(),
                account_id: "12345678901".to_string(),
                script,
                in_flight: Vec::new(),
                selected: false,
                select_timeouts: 0,
                requests: 0,
            }
        }

        fn deliver_due_downloads(&mut self) {
            let requests = self.requests;
            for (due, offset) in &self.in_flight {
                if *due <= requests {
                    let month = TODAY() - Months::new(*offset as u32);
                    let name = format!(
                        "{}_-_{}-01_-_Kontoutskrift.pdf",
                        self.account_id,
                        month.format("%Y-%m")
                    );
                    fs::write(self.dir.join(name), b"pdf").unwrap();
                }
            }
            self.in_flight.retain(|(due, _)| *due > requests);
        }
    }

    impl StatementPortal for ScriptedPortal {
        async fn select_account(&mut self, _account: &Account) -> Result<(), PortalError> {
            if self.select_timeouts > 0 {
                self.select_timeouts -= 1;
                return Err(PortalError::Timeout);
            }
            self.selected = true;
            Ok(())
        }

        async fn request_statement(
            &mut self,
            offset: MonthOffset,
        ) -> Result<SearchOutcome, PortalError> {
            assert!(self.selected, "statement requested before account selection");
            self.requests += 1;
            let step = self
                .script
                .get_mut(&offset)
                .and_then(|steps| steps.pop_front())
                .unwrap_or(Step::Timeout);
            let result = match step {
                Step::Timeout => Err(PortalError::Timeout),
                Step::NoStatement => Ok(SearchOutcome::NoStatement),
                Step::Download { lag } => {
                    self.in_flight.push((self.requests + lag, offset));
                    Ok(SearchOutcome::DownloadStarted)
                }
            };
            self.deliver_due_downloads();
            result
        }
    }

    fn script(
        entries: impl IntoIterator<Item = (MonthOffset, Vec<Step>)>,
    ) -> HashMap<MonthOffset, VecDeque<Step>> {
        entries
            .into_iter()
            .map(|(offset, steps)| (offset, steps.into()))
            .collect()
    }

    #[tokio::test]
    async fn converges_when_every_month_eventually_resolves() {
        let dir = tempfile::tempdir().unwrap();
        // window 2023-12..2024-03 => offsets [3, 2, 1]
        let mut portal = ScriptedPortal::new(
            dir.path(),
            script([
                (3, vec![Step::Download { lag: 0 }]),
                (2, vec![Step::Timeout, Step::Timeout, Step::NoStatement]),
                (1, vec![Step::Timeout, Step::Download { lag: 1 }]),
            ]),
        );

        let report = extract_account(
            &mut portal,
            dir.path(),
            &account("1234.56.78901"),
            date(2023, 12),
            date(2024, 3),
            TODAY(),
            MAX_SWEEPS,
        )
        .await
        .unwrap();

        assert_eq!(vec![3, 1], report.downloaded);
        assert_eq!(vec![2], report.unavailable);
        assert!(report.sweeps <= 4);
    }

    #[tokio::test]
    async fn immediate_downloads_finish_in_one_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let mut portal = ScriptedPortal::new(
            dir.path(),
            script([
                (2, vec![Step::Download { lag: 0 }]),
                (1, vec![Step::Download { lag: 0 }]),
            ]),
        );

        let report = extract_account(
            &mut portal,
            dir.path(),
            &account("1234.56.78901"),
            date(2024, 1),
            date(2024, 3),
            TODAY(),
            MAX_SWEEPS,
        )
        .await
        .unwrap();

        assert_eq!(1, report.sweeps);
        assert_eq!(vec![2, 1], report.downloaded);
    }

    #[tokio::test]
    async fn empty_window_reports_done_without_touching_the_portal() {
        let dir = tempfile::tempdir().unwrap();
        let mut portal = ScriptedPortal::new(dir.path(), script([]));

        let report = extract_account(
            &mut portal,
            dir.path(),
            &account("1234.56.78901"),
            date(2024, 3),
            date(2024, 3),
            TODAY(),
            MAX_SWEEPS,
        )
        .await
        .unwrap();

        assert_eq!(0, report.sweeps);
        assert_eq!(0, portal.requests);
        assert!(!portal.selected);
    }

    #[tokio::test]
    async fn a_stuck_page_exhausts_the_sweep_budget() {
        let dir = tempfile::tempdir().unwrap();
        // no script: every request times out
        let mut portal = ScriptedPortal::new(dir.path(), script([]));

        let err = extract_account(
            &mut portal,
            dir.path(),
            &account("1234.56.78901"),
            date(2024, 1),
            date(2024, 3),
            TODAY(),
            3,
        )
        .await
        .unwrap_err();

        match err {
            EngineError::RetriesExhausted {
                sweeps, remaining, ..
            } => {
                assert_eq!(3, sweeps);
                assert_eq!(vec![2, 1], remaining);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn account_selection_timeouts_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut portal = ScriptedPortal::new(
            dir.path(),
            script([(1, vec![Step::Download { lag: 0 }])]),
        );
        portal.select_timeouts = 2;

        let report = extract_account(
            &mut portal,
            dir.path(),
            &account("1234.56.78901"),
            date(2024, 2),
            date(2024, 3),
            TODAY(),
            MAX_SWEEPS,
        )
        .await
        .unwrap();

        assert_eq!(vec![1], report.downloaded);
    }

    #[tokio::test]
    async fn session_errors_abort_immediately() {
        struct BrokenPortal;
        impl StatementPortal for BrokenPortal {
            async fn select_account(&mut self, _account: &Account) -> Result<(), PortalError> {
                Ok(())
            }
            async fn request_statement(
                &mut self,
                _offset: MonthOffset,
            ) -> Result<SearchOutcome, PortalError> {
                Err(PortalError::Session(anyhow::anyhow!("browser crashed")))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let err = extract_account(
            &mut BrokenPortal,
            dir.path(),
            &account("1234.56.78901"),
            date(2024, 1),
            date(2024, 3),
            TODAY(),
            MAX_SWEEPS,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Session(_)));
    }

    #[tokio::test]
    async fn files_already_on_disk_satisfy_months_without_a_download() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("12345678901_-_2024-02-01_-_Kontoutskrift.pdf"),
            b"pdf",
        )
        .unwrap();
        let mut portal = ScriptedPortal::new(
            dir.path(),
            script([(2, vec![Step::Download { lag: 0 }])]),
        );

        let report = extract_account(
            &mut portal,
            dir.path(),
            &account("1234.56.78901"),
            date(2024, 1),
            date(2024, 3),
            TODAY(),
            MAX_SWEEPS,
        )
        .await
        .unwrap();

        // offset 1 (2024-02) was already on disk; only offset 2 needed a click
        assert_eq!(1, report.sweeps);
        assert!(report.downloaded.contains(&1));
        assert!(report.downloaded.contains(&2));
    }
}
