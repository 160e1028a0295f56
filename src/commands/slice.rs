use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::ilog::combined::{CombinedLogfile, LimitSide};
use crate::ilog::portion::{DISPLAY_DATE_FMT, parse_date};

#[derive(Debug, Clone, Default)]
pub struct SliceOptions {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub start: Option<String>,
    pub end: Option<String>,
    pub raw: bool,
}

pub fn run(opts: &SliceOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("slice");

    let start = match opts.start.as_deref().map(parse_date).transpose() {
        Ok(start) => start,
        Err(err) => {
            report.issue(format!("invalid --start: {err}"));
            return Ok(report);
        }
    };
    let end = match opts.end.as_deref().map(parse_date).transpose() {
        Ok(end) => end,
        Err(err) => {
            report.issue(format!("invalid --end: {err}"));
            return Ok(report);
        }
    };

    let mut archive = CombinedLogfile::open(&opts.src)
        .with_context(|| format!("failed to read archive {}", opts.src.display()))?;
    let before = archive.len();

    if let Some(start) = start {
        report.detail(format!("start={}", start.format(DISPLAY_DATE_FMT)));
        archive = archive.limit(start, LimitSide::OnOrAfter);
    }
    if let Some(end) = end {
        report.detail(format!("end={}", end.format(DISPLAY_DATE_FMT)));
        archive = archive.limit(end, LimitSide::OnOrBefore);
    }
    report.detail(format!("portions.kept={} of {before}", archive.len()));

    if archive.is_empty() {
        report.issue("no portions in the requested date range; nothing written");
        return Ok(report);
    }

    if opts.raw {
        archive.write_raw(&opts.dest)
    } else {
        archive.write(Some(&opts.dest)).map(|_| ())
    }
    .with_context(|| format!("failed to write {}", opts.dest.display()))?;
    report.detail(format!("dest={}", opts.dest.display()));
    report.detail(format!("format={}", if opts.raw { "raw" } else { "archive" }));

    Ok(report)
}
