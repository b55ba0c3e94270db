// Fixed layout status bar written in rust with direct Xlib.
// By: Curtis Jones
// Started on Ausust 06, 2020

use anyhow::{Context, Result};
use statbar::*;
use std::process;
use tracing_subscriber::EnvFilter;

fn run() -> Result<()> {
    // Generate configuration from a file and any command line args.
    let conf = gen_config();

    // Open the display, load the font & colours and map the window.
    let bar = Bar::open(&conf).context("could not start the bar")?;

    // Redraw every second and whenever X tells us something changed, until the display
    // connection goes away.
    bar.event_loop();

    // Font, colours, drawing surface, window and display all get released in Drop.
    drop(bar);
    Ok(())
}

fn main() {
    // RUST_LOG controls verbosity, warnings only by default.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    tracing::info!("statbar v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run() {
        eprintln!("statbar: {:#}", e);
        process::exit(1);
    }
}
