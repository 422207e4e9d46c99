use std::path::PathBuf;

use clap::Parser;

/// Download DNB account statements and merge them into one PDF per account.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
pub struct Args {
    /// Show the browser window instead of running headless
    #[clap(long)]
    pub show: bool,

    /// Port used to talk to geckodriver
    #[clap(short, long, default_value_t = 4444)]
    pub port: u16,

    /// Path to the geckodriver executable
    #[clap(long, default_value = "geckodriver")]
    pub geckodriver: PathBuf,

    /// Directory the browser downloads statements into and the merged
    /// documents are written to
    #[clap(long, default_value = ".")]
    pub download_dir: PathBuf,

    /// Path to the configuration file
    pub config: PathBuf,
}

pub fn parse() -> Args {
    Args::parse()
}
