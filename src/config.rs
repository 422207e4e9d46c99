use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read configuration file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("configuration file is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("extraction window starts after it stops: {from} comes after {to}")]
    WindowOrder { from: NaiveDate, to: NaiveDate },

    #[error("account id {0:?} contains no digits")]
    EmptyAccountId(String),
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub ssn: Option<String>,
    pub extractions: Vec<Extraction>,
}

/// One extraction window: the months `from..to` (exclusive of `to`) for a set
/// of accounts. Both dates are month-granular and pinned to day 1.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct Extraction {
    #[serde(with = "month_format")]
    pub from: NaiveDate,

    #[serde(with = "month_format")]
    pub to: NaiveDate,

    pub accounts: Vec<Account>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct Account {
    pub id: String,
    pub name: Option<String>,
}

impl Account {
    /// The account id the way it appears in the DNB UI and in downloaded
    /// filenames: digits only, separators like '.' stripped.
    pub fn normalized_id(&self) -> String {
        self.id.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    /// Base name for the consolidated output document.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Loads and validates the configuration. All validation happens here, before
/// any browser session is started.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    let config: Config = serde_yaml::from_reader(file)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    for extraction in &config.extractions {
        if extraction.from > extraction.to {
            return Err(ConfigError::WindowOrder {
                from: extraction.from,
                to: extraction.to,
            });
        }
        for account in &extraction.accounts {
            if account.normalized_id().is_empty() {
                return Err(ConfigError::EmptyAccountId(account.id.clone()));
            }
        }
    }
    Ok(())
}

mod month_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer};

    const FORMAT: &str = "%d/%m/%Y";

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let month = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&format!("01/{month}"), FORMAT)
            .map_err(|err| serde::de::Error::custom(format!("invalid month {month:?}: {err}")))
    }
}
