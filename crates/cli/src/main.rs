//! The main entrypoint for bootseed, invoking the library.

use anyhow::Result;

fn run() -> Result<()> {
    bootseed_utils::initialize_tracing();
    tracing::trace!("starting {}", env!("CARGO_PKG_NAME"));
    bootseed_lib::cli::run_from_iter(std::env::args_os())
}

fn main() {
    bootseed_utils::run_main(run)
}
