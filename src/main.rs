mod cli;
mod logger;

use anyhow::Result;
use tracing::{error, info};

fn main() -> Result<()> {
    let cli = cli::parse();
    let _log_guard = cli.log_options().init()?;
    info!(args = ?std::env::args().collect::<Vec<_>>(), "lambda-sandbox start");

    match cli::run(cli) {
        Ok(result) => {
            info!("lambda-sandbox finished successfully");
            Ok(result)
        }
        Err(err) => {
            error!(error = ?err, "lambda-sandbox failed");
            Err(err)
        }
    }
}
