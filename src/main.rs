use std::process::ExitCode;

use dnb_statements::{args, cli, diagnostics};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = args::parse();
    let report_dir = args.download_dir.clone();

    match cli::main(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error:#}");
            match diagnostics::write_failure_report(&report_dir, &error) {
                Ok(path) => eprintln!("A failure report was written to {}", path.display()),
                Err(report_error) => {
                    log::warn!("Unable to write failure report: {report_error}");
                }
            }
            ExitCode::FAILURE
        }
    }
}
