//! Layer decomposition CLI tool
//!
//! Splits images into foreground and background layers using the layerkit
//! library.

#[cfg(feature = "cli")]
use layerkit::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
