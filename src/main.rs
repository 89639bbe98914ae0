// src/main.rs

use relbuild::errors::BuildError;
use relbuild::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            match err.downcast_ref::<BuildError>() {
                // Nothing ran; the operator only needs the reason.
                Some(e) if e.is_config_error() => {
                    eprintln!("relbuild: invalid release configuration: {e}")
                }
                _ => eprintln!("relbuild error: {err:?}"),
            }
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
