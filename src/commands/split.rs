use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::ilog::combined::CombinedLogfile;

#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub src: PathBuf,
    pub dest: PathBuf,
}

pub fn run(opts: &SplitOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("split");
    let archive = CombinedLogfile::open(&opts.src)
        .with_context(|| format!("failed to read archive {}", opts.src.display()))?;

    let written = archive
        .write_originals(&opts.dest)
        .with_context(|| format!("failed to write logs into {}", opts.dest.display()))?;
    report.detail(format!("Wrote {written} logs"));

    Ok(report)
}
