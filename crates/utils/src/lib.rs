//! The inevitable catchall "utils" crate. Generally only add
//! things here that only depend on the standard library and
//! "core" crates.
//!
mod path;
pub use path::*;
mod tracing_util;
pub use tracing_util::*;

/// Run the provided closure as the body of `main`, printing any error
/// along with its full context chain and exiting with status 1.
pub fn run_main(f: impl FnOnce() -> anyhow::Result<()>) {
    // In order to print the error in a custom format (with :#) our
    // main simply invokes a run() where all the work is done.
    if let Err(e) = f() {
        tracing::debug!("exiting with error: {e:?}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
