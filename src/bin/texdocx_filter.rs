//! pandoc JSON filter: document on stdin, rewritten document on stdout.
//!
//! pandoc passes the target format as the first argument; the passes do not
//! depend on it.

use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use texdocx::{filter_json, ResolverContext};
use tracing::debug;

fn main() -> Result<()> {
    // stdout carries the document, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Some(format) = std::env::args().nth(1) {
        debug!("target format {}", format);
    }

    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("reading pandoc JSON from stdin")?;

    let mut ctx = ResolverContext::from_env();
    let output = filter_json(&input, &mut ctx)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
