// src/main.rs

use nodeserve::errors::ServeError;
use nodeserve::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("nodeserve error: {err:?}");
        std::process::exit(1);
    }

    if let Err(err) = run(args).await {
        report(&err);
        std::process::exit(1);
    }
}

fn report(err: &ServeError) {
    eprintln!("nodeserve error: {err}");
    if let ServeError::Classified(classified) = err {
        if let Some(hint) = classified.remediation() {
            eprintln!("{hint}");
        }
    }
}
