use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::commands::{CommandReport, ReportTable};
use crate::ilog::combined::CombinedLogfile;
use crate::ilog::portion::DISPLAY_DATE_FMT;

#[derive(Debug, Clone)]
pub struct GapsOptions {
    pub file: PathBuf,
}

pub fn run(opts: &GapsOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("gaps");
    let mut archive = CombinedLogfile::open(&opts.file)
        .with_context(|| format!("failed to read archive {}", opts.file.display()))?;

    let gaps = archive.gaps();
    let mut table = ReportTable::new(["start", "end", "days"]).titled("Missing log segments:");
    for gap in &gaps {
        table.row([
            gap.start.format(DISPLAY_DATE_FMT).to_string(),
            gap.end.format(DISPLAY_DATE_FMT).to_string(),
            gap.days.to_string(),
        ]);
    }
    report.table(table);
    report.detail(format!("gaps={}", gaps.len()));
    report.detail(format!(
        "missing_days={}",
        gaps.iter().map(|gap| gap.days).sum::<i64>()
    ));

    Ok(report)
}
