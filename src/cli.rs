use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use std::path::PathBuf;

use crate::commands::{self, CommandReport, ReportTable};
use crate::ilog::config;
use crate::logging;

#[derive(Parser)]
#[command(name = "irclogtools")]
#[command(about = "Collect per-day IRC logs into one archive per channel", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log filter (overrides ILOG_LOG and the config file), e.g. `info` or `debug`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import a directory of raw daily logs into per-channel archives
    Import {
        /// Directory holding `[<network>_]<channel>_<YYYYMMDD>.log` files
        #[arg(short = 'd', long)]
        dir: PathBuf,

        /// Directory receiving `<channel>.log` archives
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Also import private messages and server logs
        #[arg(long)]
        all: bool,

        /// Number of channels imported at once
        #[arg(short = 'p', long)]
        parallel: Option<usize>,
    },

    /// Show what an archive holds
    Inspect {
        /// Archive to read
        #[arg(short = 'f', long)]
        file: PathBuf,

        /// List every portion
        #[arg(long)]
        detail: bool,
    },

    /// Copy a date range of an archive into a new file
    Slice {
        /// Archive to read
        #[arg(short = 's', long)]
        src: PathBuf,

        /// File to write
        #[arg(short = 'd', long)]
        dest: PathBuf,

        /// First day to keep (YYYY-MM-DD or YYYYMMDD)
        #[arg(long)]
        start: Option<String>,

        /// Last day to keep (YYYY-MM-DD or YYYYMMDD)
        #[arg(long)]
        end: Option<String>,

        /// Write plain log lines instead of an archive
        #[arg(long)]
        raw: bool,
    },

    /// Recreate the original daily log files from an archive
    Split {
        /// Archive to read
        #[arg(short = 's', long)]
        src: PathBuf,

        /// Existing directory receiving the daily logs
        #[arg(short = 'd', long)]
        dest: PathBuf,
    },

    /// List spans of days missing from an archive
    Gaps {
        /// Archive to read
        #[arg(short = 'f', long)]
        file: PathBuf,
    },

    /// Print version and build id
    Version,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config()?;

    let filter = cli
        .log_level
        .clone()
        .unwrap_or_else(|| cfg.logging.filter.clone());
    logging::init(&filter);
    config::warn_unknown_env_vars();

    let report = match cli.command {
        Command::Import {
            dir,
            output,
            all,
            parallel,
        } => commands::import::run(
            &commands::import::ImportCommandOptions {
                dir,
                output,
                all,
                parallel,
            },
            &cfg,
        )?,
        Command::Inspect { file, detail } => {
            commands::inspect::run(&commands::inspect::InspectOptions { file, detail })?
        }
        Command::Slice {
            src,
            dest,
            start,
            end,
            raw,
        } => commands::slice::run(&commands::slice::SliceOptions {
            src,
            dest,
            start,
            end,
            raw,
        })?,
        Command::Split { src, dest } => {
            commands::split::run(&commands::split::SplitOptions { src, dest })?
        }
        Command::Gaps { file } => commands::gaps::run(&commands::gaps::GapsOptions { file })?,
        Command::Version => commands::version::run(),
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        bail!("{} failed with {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}

fn render_table(table: &ReportTable) -> Table {
    let mut out = Table::new();
    out.load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(table.headers.clone());
    for row in &table.rows {
        out.add_row(row.clone());
    }
    out
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for table in &report.tables {
        if let Some(title) = &table.title {
            println!("{title}");
        }
        if table.rows.is_empty() {
            println!("(none)");
        } else {
            println!("{}", render_table(table));
        }
    }
    for detail in &report.details {
        println!("{detail}");
    }
    for issue in &report.issues {
        eprintln!("issue: {issue}");
    }
    Ok(())
}
