//! Binary entry point: parses CLI options, runs the benchmark, and reports errors.
#[tokio::main]
async fn main() {
    if let Err(err) = squeeze_bench::cli::run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
