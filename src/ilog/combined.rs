use crate::error::{ArchiveError, Result};
use crate::ilog::portion::{LogPortion, PortionMeta};
use chrono::NaiveDate;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const HEADER: &str = "#$$$COMBINEDLOG";
const PORTION_BEGIN: &str = "#$$$BEGINPORTION";
const PORTION_END: &str = "#$$$ENDPORTION";
const TEMP_PREFIX: &str = ".ilogtmp-";

/// Which side of a threshold date `CombinedLogfile::limit` keeps. The threshold day itself is always kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSide {
    OnOrAfter,
    OnOrBefore,
}

/// A run of consecutive days with no portion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: i64,
}

/// A portion whose declared line count differs from the lines actually parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineCountDiscrepancy {
    pub name: String,
    pub date: NaiveDate,
    pub declared: usize,
    pub actual: usize,
}

enum ParseState {
    Header,
    Idle,
    InPortion {
        meta: PortionMeta,
        lines: Vec<Vec<u8>>,
        begun_at: usize,
    },
}

/// One channel's full history: every imported day, at most one portion per date.
#[derive(Debug, Clone)]
pub struct CombinedLogfile {
    path: PathBuf,
    channel: String,
    network: String,
    portions: Vec<LogPortion>,
    discrepancies: Vec<LineCountDiscrepancy>,
}

impl CombinedLogfile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            channel: String::new(),
            network: String::new(),
            portions: Vec::new(),
            discrepancies: Vec::new(),
        }
    }

    /// Load an archive that must already exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut archive = Self::new(path);
        let file = File::open(&archive.path)?;
        archive.parse_from(BufReader::new(file))?;
        Ok(archive)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn portions(&self) -> &[LogPortion] {
        &self.portions
    }

    pub fn discrepancies(&self) -> &[LineCountDiscrepancy] {
        &self.discrepancies
    }

    pub fn len(&self) -> usize {
        self.portions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portions.is_empty()
    }

    /// Populate from the bound path. A missing file leaves the archive empty.
    pub fn parse(&mut self) -> Result<()> {
        match File::open(&self.path) {
            Ok(file) => self.parse_from(BufReader::new(file)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no existing archive");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Stream a serialized archive line by line, upserting each completed portion.
    pub fn parse_from<R: BufRead>(&mut self, mut reader: R) -> Result<()> {
        let mut state = ParseState::Header;
        let mut buf = Vec::new();
        let mut line_no = 0usize;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }

            let is_begin = buf.starts_with(PORTION_BEGIN.as_bytes());
            let is_end = buf.starts_with(PORTION_END.as_bytes());

            state = match mem::replace(&mut state, ParseState::Idle) {
                ParseState::Header => {
                    if !buf.starts_with(HEADER.as_bytes()) {
                        return Err(ArchiveError::MissingHeader {
                            path: self.path.clone(),
                        });
                    }
                    ParseState::Idle
                }
                ParseState::Idle if is_begin => {
                    let meta = decode_begin_line(&buf)?;
                    self.adopt_identity(&meta)?;
                    ParseState::InPortion {
                        meta,
                        lines: Vec::new(),
                        begun_at: line_no,
                    }
                }
                ParseState::Idle if is_end => {
                    return Err(ArchiveError::Malformed {
                        line: line_no,
                        message: "portion end outside of a portion".to_string(),
                    });
                }
                // separators between portions
                ParseState::Idle => ParseState::Idle,
                ParseState::InPortion { begun_at, .. } if is_begin => {
                    return Err(ArchiveError::Malformed {
                        line: line_no,
                        message: format!("portion begins inside portion begun at line {begun_at}"),
                    });
                }
                ParseState::InPortion { meta, lines, .. } if is_end => {
                    self.finish_portion(meta, lines)?;
                    ParseState::Idle
                }
                ParseState::InPortion {
                    meta,
                    mut lines,
                    begun_at,
                } => {
                    lines.push(buf.clone());
                    ParseState::InPortion {
                        meta,
                        lines,
                        begun_at,
                    }
                }
            };
        }

        match state {
            ParseState::Header => Err(ArchiveError::MissingHeader {
                path: self.path.clone(),
            }),
            ParseState::InPortion { meta, begun_at, .. } => Err(ArchiveError::Truncated {
                name: meta.name,
                line: begun_at,
            }),
            ParseState::Idle => Ok(()),
        }
    }

    fn finish_portion(&mut self, meta: PortionMeta, lines: Vec<Vec<u8>>) -> Result<()> {
        if meta.lines != lines.len() {
            warn!(
                portion = %meta.name,
                declared = meta.lines,
                actual = lines.len(),
                "declared line count differs from parsed lines"
            );
            self.discrepancies.push(LineCountDiscrepancy {
                name: meta.name.clone(),
                date: meta.date,
                declared: meta.lines,
                actual: lines.len(),
            });
        }
        self.add_portion(LogPortion::new(meta, lines))
    }

    /// First non-empty channel and network win; later non-empty values must match.
    /// Nothing is adopted unless both checks pass.
    fn adopt_identity(&mut self, meta: &PortionMeta) -> Result<()> {
        if !self.channel.is_empty() && !meta.channel.is_empty() && meta.channel != self.channel {
            return Err(ArchiveError::ChannelMismatch {
                archive: self.channel.clone(),
                found: meta.channel.clone(),
                source_name: meta.name.clone(),
            });
        }
        if !self.network.is_empty() && !meta.network.is_empty() && meta.network != self.network {
            return Err(ArchiveError::NetworkMismatch {
                archive: self.network.clone(),
                found: meta.network.clone(),
                source_name: meta.name.clone(),
            });
        }
        if self.channel.is_empty() {
            self.channel = meta.channel.clone();
        }
        if self.network.is_empty() {
            self.network = meta.network.clone();
        }
        Ok(())
    }

    /// Insert a portion, replacing any existing portion for the same date.
    /// Content lines that would read back as portion markers are refused.
    pub fn add_portion(&mut self, portion: LogPortion) -> Result<()> {
        if let Some(idx) = portion.lines.iter().position(|line| is_marker(line)) {
            return Err(ArchiveError::ReservedMarker {
                name: portion.meta.name.clone(),
                line: idx + 1,
            });
        }
        self.adopt_identity(&portion.meta)?;
        let date = portion.meta.date;
        self.portions.retain(|existing| existing.meta.date != date);
        self.portions.push(portion);
        Ok(())
    }

    pub fn sort(&mut self) {
        self.portions.sort_by_key(|portion| portion.meta.date);
    }

    pub fn total_lines(&self) -> usize {
        self.portions.iter().map(|portion| portion.lines.len()).sum()
    }

    /// Dates of the first and last portions. Sorts the archive.
    pub fn get_range(&mut self) -> Result<(NaiveDate, NaiveDate)> {
        self.sort();
        match (self.portions.first(), self.portions.last()) {
            (Some(first), Some(last)) => Ok((first.meta.date, last.meta.date)),
            _ => Err(ArchiveError::EmptyArchive),
        }
    }

    /// Keep only portions on the given side of `when`, inclusive.
    pub fn limit(mut self, when: NaiveDate, side: LimitSide) -> Self {
        self.portions.retain(|portion| match side {
            LimitSide::OnOrAfter => portion.meta.date >= when,
            LimitSide::OnOrBefore => portion.meta.date <= when,
        });
        self
    }

    /// Missing day ranges between consecutive portions. Sorts the archive.
    pub fn gaps(&mut self) -> Vec<Gap> {
        self.sort();
        let mut out = Vec::new();
        for pair in self.portions.windows(2) {
            let (earlier, later) = (pair[0].meta.date, pair[1].meta.date);
            // dates are unique, so any step other than one day is a hole
            if (later - earlier).num_days() <= 1 {
                continue;
            }
            let (Some(start), Some(end)) = (earlier.succ_opt(), later.pred_opt()) else {
                continue;
            };
            out.push(Gap {
                start,
                end,
                days: (later - start).num_days(),
            });
        }
        out
    }

    /// Persist atomically to `dest`, or to the bound path when `dest` is `None`.
    pub fn write(&mut self, dest: Option<&Path>) -> Result<PathBuf> {
        if self.portions.is_empty() {
            return Err(ArchiveError::EmptyArchive);
        }
        let dest = dest.map_or_else(|| self.path.clone(), Path::to_path_buf);
        self.sort();
        info!(
            portions = self.portions.len(),
            channel = %self.channel,
            path = %dest.display(),
            "writing archive"
        );
        write_atomic(&dest, |w| self.write_to(w))?;
        Ok(dest)
    }

    /// Persist only the content lines, without container markup.
    pub fn write_raw(&mut self, dest: &Path) -> Result<()> {
        if self.portions.is_empty() {
            return Err(ArchiveError::EmptyArchive);
        }
        self.sort();
        info!(
            portions = self.portions.len(),
            channel = %self.channel,
            path = %dest.display(),
            "writing raw lines"
        );
        write_atomic(dest, |w| {
            for portion in &self.portions {
                write_lines(w, &portion.lines)?;
            }
            Ok(())
        })
    }

    /// Serialize in the current portion order.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "{HEADER} '{}'", self.channel)?;
        for portion in &self.portions {
            writeln!(w, "{PORTION_BEGIN} {}", portion.meta.encode()?)?;
            write_lines(w, &portion.lines)?;
            writeln!(w, "{PORTION_END} {}", portion.meta.name)?;
        }
        Ok(())
    }

    /// Recreate each portion's original file inside `dir`, overwriting same-named files.
    pub fn write_originals(&self, dir: &Path) -> Result<usize> {
        let mut written = 0usize;
        for portion in &self.portions {
            let name = &portion.meta.name;
            let file_name = Path::new(name)
                .file_name()
                .filter(|file_name| *file_name == name.as_str())
                .ok_or_else(|| ArchiveError::UnsafePortionName(name.clone()))?;
            let target = dir.join(file_name);
            let mut w = BufWriter::new(File::create(&target)?);
            write_lines(&mut w, &portion.lines)?;
            w.flush()?;
            debug!(path = %target.display(), lines = portion.lines.len(), "wrote original log");
            written += 1;
        }
        Ok(written)
    }
}

fn is_marker(line: &[u8]) -> bool {
    line.starts_with(PORTION_BEGIN.as_bytes()) || line.starts_with(PORTION_END.as_bytes())
}

fn decode_begin_line(line: &[u8]) -> Result<PortionMeta> {
    let blob = std::str::from_utf8(&line[PORTION_BEGIN.len()..])
        .map_err(|err| ArchiveError::Format(format!("metadata is not UTF-8: {err}")))?;
    PortionMeta::decode(blob)
}

fn write_lines<W: Write>(w: &mut W, lines: &[Vec<u8>]) -> io::Result<()> {
    for line in lines {
        w.write_all(line)?;
        w.write_all(b"\n")?;
    }
    Ok(())
}

/// Render into a temp file beside `dest`, then rename it over `dest`.
/// The temp file is removed if rendering or the rename fails.
fn write_atomic<F>(dest: &Path, render: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)?;
    {
        let mut w = BufWriter::new(tmp.as_file_mut());
        render(&mut w)?;
        w.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|err| ArchiveError::Persist {
        path: dest.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}

/// Remove temp files in `dir` left by interrupted writes, skipping any modified
/// within `min_age` since another writer may still own them.
pub fn clean_stale_temp_files(dir: &Path, min_age: Duration) -> Result<usize> {
    let mut removed = 0usize;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_temp = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(TEMP_PREFIX));
        if !is_temp || !entry.file_type()?.is_file() {
            continue;
        }
        // a modification time in the future counts as fresh
        let age = entry.metadata()?.modified()?.elapsed().unwrap_or(Duration::ZERO);
        if age < min_age {
            debug!(path = %entry.path().display(), "temp file still fresh; leaving it");
            continue;
        }
        fs::remove_file(entry.path())?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn portion(date: NaiveDate, lines: &[&[u8]]) -> LogPortion {
        let lines = lines.iter().map(|line| line.to_vec()).collect::<Vec<_>>();
        LogPortion::new(
            PortionMeta {
                channel: "#rust".to_string(),
                date,
                lines: lines.len(),
                name: format!("freenode_#rust_{}.log", date.format("%Y%m%d")),
                network: "freenode".to_string(),
                size: lines.iter().map(Vec::len).sum(),
            },
            lines,
        )
    }

    fn parse_bytes(raw: &[u8]) -> (CombinedLogfile, Result<()>) {
        let mut archive = CombinedLogfile::new("mem.log");
        let res = archive.parse_from(raw);
        (archive, res)
    }

    #[test]
    fn write_then_open_round_trips_exact_bytes() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("#rust.log");
        let mut archive = CombinedLogfile::new(&path);
        archive
            .add_portion(portion(day(2020, 1, 2), &[b"[00:00:01] <a> hi\r", b"", b"\xff\xfe raw"]))
            .expect("add");
        archive
            .add_portion(portion(day(2020, 1, 1), &[b"[12:00:00] <b> first"]))
            .expect("add");
        archive.write(None).expect("write");

        let reopened = CombinedLogfile::open(&path).expect("open");
        assert_eq!(reopened.channel(), "#rust");
        assert_eq!(reopened.network(), "freenode");
        assert!(reopened.discrepancies().is_empty());
        let dates = reopened
            .portions()
            .iter()
            .map(|p| p.meta.date)
            .collect::<Vec<_>>();
        assert_eq!(dates, vec![day(2020, 1, 1), day(2020, 1, 2)]);
        assert_eq!(reopened.portions(), archive.portions());
    }

    #[test]
    fn serialized_layout_is_stable() {
        let mut archive = CombinedLogfile::new("unused.log");
        archive
            .add_portion(portion(day(2020, 1, 1), &[b"one", b"two"]))
            .expect("add");
        let mut out = Vec::new();
        archive.write_to(&mut out).expect("serialize");
        let want = concat!(
            "#$$$COMBINEDLOG '#rust'\n",
            "#$$$BEGINPORTION {\"channel\":\"#rust\",\"date\":\"20200101\",\"lines\":2,",
            "\"name\":\"freenode_#rust_20200101.log\",\"network\":\"freenode\",\"size\":6}\n",
            "one\n",
            "two\n",
            "#$$$ENDPORTION freenode_#rust_20200101.log\n",
        );
        assert_eq!(String::from_utf8(out).expect("utf8"), want);
    }

    #[test]
    fn same_date_replaces_with_latest_content() {
        let mut archive = CombinedLogfile::new("a.log");
        archive
            .add_portion(portion(day(2020, 1, 1), &[b"old"]))
            .expect("add");
        archive
            .add_portion(portion(day(2020, 1, 1), &[b"new", b"newer"]))
            .expect("add");
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.portions()[0].lines, vec![b"new".to_vec(), b"newer".to_vec()]);
    }

    #[test]
    fn upsert_keeps_one_portion_per_distinct_date() {
        let mut archive = CombinedLogfile::new("a.log");
        for d in [1, 2, 1, 3, 2] {
            archive
                .add_portion(portion(day(2020, 1, d), &[b"x"]))
                .expect("add");
        }
        assert_eq!(archive.len(), 3);
    }

    #[test]
    fn mismatched_channel_is_rejected_with_source_name() {
        let mut archive = CombinedLogfile::new("a.log");
        archive
            .add_portion(portion(day(2020, 1, 1), &[b"x"]))
            .expect("add");
        let mut other = portion(day(2020, 1, 2), &[b"y"]);
        other.meta.channel = "#go".to_string();
        other.meta.name = "freenode_#go_20200102.log".to_string();
        match archive.add_portion(other) {
            Err(ArchiveError::ChannelMismatch {
                archive,
                found,
                source_name,
            }) => {
                assert_eq!(archive, "#rust");
                assert_eq!(found, "#go");
                assert_eq!(source_name, "freenode_#go_20200102.log");
            }
            other => panic!("expected channel mismatch, got {other:?}"),
        }
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn mismatched_network_is_rejected_but_empty_network_is_accepted() {
        let mut archive = CombinedLogfile::new("a.log");
        archive
            .add_portion(portion(day(2020, 1, 1), &[b"x"]))
            .expect("add");

        let mut blank = portion(day(2020, 1, 2), &[b"y"]);
        blank.meta.network = String::new();
        archive.add_portion(blank).expect("empty network is compatible");

        let mut other = portion(day(2020, 1, 3), &[b"z"]);
        other.meta.network = "oftc".to_string();
        assert!(matches!(
            archive.add_portion(other),
            Err(ArchiveError::NetworkMismatch { .. })
        ));
    }

    #[test]
    fn missing_header_creates_no_portions() {
        let (archive, res) = parse_bytes(
            b"#$$$BEGINPORTION {\"date\":\"20200101\",\"name\":\"a.log\"}\nx\n#$$$ENDPORTION a.log\n",
        );
        assert!(matches!(res, Err(ArchiveError::MissingHeader { .. })));
        assert!(archive.is_empty());

        let (_, res) = parse_bytes(b"");
        assert!(matches!(res, Err(ArchiveError::MissingHeader { .. })));
    }

    #[test]
    fn nested_begin_is_malformed() {
        let (_, res) = parse_bytes(
            b"#$$$COMBINEDLOG '#a'\n\
              #$$$BEGINPORTION {\"date\":\"20200101\",\"name\":\"a.log\"}\n\
              #$$$BEGINPORTION {\"date\":\"20200102\",\"name\":\"b.log\"}\n",
        );
        assert!(matches!(res, Err(ArchiveError::Malformed { line: 3, .. })));
    }

    #[test]
    fn end_outside_portion_is_malformed() {
        let (_, res) = parse_bytes(b"#$$$COMBINEDLOG '#a'\n#$$$ENDPORTION a.log\n");
        assert!(matches!(res, Err(ArchiveError::Malformed { line: 2, .. })));
    }

    #[test]
    fn eof_inside_portion_is_truncated() {
        let (_, res) = parse_bytes(
            b"#$$$COMBINEDLOG '#a'\n#$$$BEGINPORTION {\"date\":\"20200101\",\"name\":\"a.log\"}\nline\n",
        );
        match res {
            Err(ArchiveError::Truncated { name, line }) => {
                assert_eq!(name, "a.log");
                assert_eq!(line, 2);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn mismatch_inside_stream_fails_parse() {
        let (_, res) = parse_bytes(
            b"#$$$COMBINEDLOG '#a'\n\
              #$$$BEGINPORTION {\"channel\":\"#a\",\"date\":\"20200101\",\"lines\":0,\"name\":\"a.log\"}\n\
              #$$$ENDPORTION a.log\n\
              #$$$BEGINPORTION {\"channel\":\"#b\",\"date\":\"20200102\",\"lines\":0,\"name\":\"b.log\"}\n\
              #$$$ENDPORTION b.log\n",
        );
        assert!(matches!(res, Err(ArchiveError::ChannelMismatch { .. })));
    }

    #[test]
    fn blank_lines_between_portions_are_ignored_and_counts_are_advisory() {
        let (archive, res) = parse_bytes(
            b"#$$$COMBINEDLOG '#a'\n\
              \n\
              #$$$BEGINPORTION {\"channel\":\"#a\",\"date\":\"2020-01-01\",\"lines\":5,\"name\":\"a.log\"}\n\
              only\n\
              #$$$ENDPORTION a.log\n\
              \n",
        );
        res.expect("parse");
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.total_lines(), 1);
        assert_eq!(
            archive.discrepancies(),
            &[LineCountDiscrepancy {
                name: "a.log".to_string(),
                date: day(2020, 1, 1),
                declared: 5,
                actual: 1,
            }]
        );
    }

    #[test]
    fn parse_of_absent_file_is_a_no_op() {
        let tmp = tempdir().expect("tempdir");
        let mut archive = CombinedLogfile::new(tmp.path().join("missing.log"));
        archive.parse().expect("parse");
        assert!(archive.is_empty());
        assert!(CombinedLogfile::open(tmp.path().join("missing.log")).is_err());
    }

    #[test]
    fn limit_keeps_threshold_day_on_both_sides() {
        let mut archive = CombinedLogfile::new("a.log");
        for d in [1, 2, 3] {
            archive
                .add_portion(portion(day(2020, 1, d), &[b"x"]))
                .expect("add");
        }
        let after = archive.clone().limit(day(2020, 1, 2), LimitSide::OnOrAfter);
        let mut after_dates = after.portions().iter().map(|p| p.meta.date).collect::<Vec<_>>();
        after_dates.sort();
        assert_eq!(after_dates, vec![day(2020, 1, 2), day(2020, 1, 3)]);

        let before = archive.limit(day(2020, 1, 2), LimitSide::OnOrBefore);
        let mut before_dates = before.portions().iter().map(|p| p.meta.date).collect::<Vec<_>>();
        before_dates.sort();
        assert_eq!(before_dates, vec![day(2020, 1, 1), day(2020, 1, 2)]);
    }

    #[test]
    fn gaps_report_missing_span() {
        let mut archive = CombinedLogfile::new("a.log");
        for d in [5, 1, 2] {
            archive
                .add_portion(portion(day(2020, 1, d), &[b"x"]))
                .expect("add");
        }
        assert_eq!(
            archive.gaps(),
            vec![Gap {
                start: day(2020, 1, 3),
                end: day(2020, 1, 4),
                days: 2,
            }]
        );
        let dates = archive.portions().iter().map(|p| p.meta.date).collect::<Vec<_>>();
        assert!(dates.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn gaps_of_small_archives_are_empty() {
        let mut archive = CombinedLogfile::new("a.log");
        assert!(archive.gaps().is_empty());
        archive
            .add_portion(portion(day(2020, 1, 1), &[b"x"]))
            .expect("add");
        assert!(archive.gaps().is_empty());
    }

    #[test]
    fn range_sorts_and_empty_range_fails() {
        let mut archive = CombinedLogfile::new("a.log");
        assert!(matches!(archive.get_range(), Err(ArchiveError::EmptyArchive)));
        for d in [9, 3, 6] {
            archive
                .add_portion(portion(day(2021, 3, d), &[b"x"]))
                .expect("add");
        }
        assert_eq!(
            archive.get_range().expect("range"),
            (day(2021, 3, 3), day(2021, 3, 9))
        );
        assert_eq!(archive.portions()[1].meta.date, day(2021, 3, 6));
    }

    #[test]
    fn writing_empty_archive_fails() {
        let tmp = tempdir().expect("tempdir");
        let mut archive = CombinedLogfile::new(tmp.path().join("a.log"));
        assert!(matches!(archive.write(None), Err(ArchiveError::EmptyArchive)));
        assert!(!tmp.path().join("a.log").exists());
    }

    #[test]
    fn interrupted_write_leaves_destination_untouched() {
        let tmp = tempdir().expect("tempdir");
        let dest = tmp.path().join("#rust.log");
        fs::write(&dest, b"previous archive\n").expect("seed");

        let res = write_atomic(&dest, |w| {
            w.write_all(b"#$$$COMBINEDLOG '#rust'\npartial")?;
            Err(ArchiveError::Io(io::Error::other("interrupted")))
        });
        assert!(res.is_err());
        assert_eq!(fs::read(&dest).expect("read"), b"previous archive\n");
        assert_eq!(clean_stale_temp_files(tmp.path(), Duration::ZERO).expect("clean"), 0);
    }

    #[test]
    fn content_line_that_looks_like_a_marker_is_refused() {
        let tmp = tempdir().expect("tempdir");
        let dest = tmp.path().join("#rust.log");
        let mut archive = CombinedLogfile::new(&dest);
        archive
            .add_portion(portion(day(2020, 1, 1), &[b"hello"]))
            .expect("add");
        archive.write(None).expect("first write");
        let before = fs::read(&dest).expect("read");

        let mut reopened = CombinedLogfile::open(&dest).expect("open");
        let pasted = portion(day(2020, 1, 2), &[b"ok", b"#$$$ENDPORTION pasted", b"after"]);
        match reopened.add_portion(pasted) {
            Err(ArchiveError::ReservedMarker { name, line }) => {
                assert_eq!(name, "freenode_#rust_20200102.log");
                assert_eq!(line, 2);
            }
            other => panic!("expected reserved marker, got {other:?}"),
        }
        assert!(matches!(
            reopened.add_portion(portion(day(2020, 1, 3), &[b"#$$$BEGINPORTION {}"])),
            Err(ArchiveError::ReservedMarker { line: 1, .. })
        ));
        assert_eq!(reopened.len(), 1);

        reopened.write(None).expect("rewrite");
        assert_eq!(fs::read(&dest).expect("read"), before);
        assert_eq!(CombinedLogfile::open(&dest).expect("reopen").len(), 1);
    }

    #[test]
    fn marker_text_later_in_a_line_is_ordinary_content() {
        let mut archive = CombinedLogfile::new("a.log");
        archive
            .add_portion(portion(day(2020, 1, 1), &[b"<a> try #$$$ENDPORTION x"]))
            .expect("add");
        let mut out = Vec::new();
        archive.write_to(&mut out).expect("serialize");
        let (reparsed, res) = parse_bytes(&out);
        res.expect("parse");
        assert_eq!(reparsed.portions()[0].lines, vec![b"<a> try #$$$ENDPORTION x".to_vec()]);
    }

    #[test]
    fn failed_network_check_adopts_no_identity() {
        let mut archive = CombinedLogfile::new("a.log");
        let mut first = portion(day(2020, 1, 1), &[b"x"]);
        first.meta.channel = String::new();
        first.meta.network = "n1".to_string();
        archive.add_portion(first).expect("add");

        let mut other = portion(day(2020, 1, 2), &[b"y"]);
        other.meta.channel = "#x".to_string();
        other.meta.network = "n2".to_string();
        assert!(matches!(
            archive.add_portion(other),
            Err(ArchiveError::NetworkMismatch { .. })
        ));
        assert_eq!(archive.channel(), "");
        assert_eq!(archive.network(), "n1");
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn stale_temp_files_are_removed() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join(".ilogtmp-abc"), b"junk").expect("seed");
        fs::write(tmp.path().join("#keep.log"), b"keep").expect("seed");
        assert_eq!(
            clean_stale_temp_files(tmp.path(), Duration::ZERO).expect("clean"),
            1
        );
        assert!(tmp.path().join("#keep.log").exists());
    }

    #[test]
    fn fresh_temp_files_belong_to_a_live_writer() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join(".ilogtmp-live"), b"in flight").expect("seed");
        assert_eq!(
            clean_stale_temp_files(tmp.path(), Duration::from_secs(3600)).expect("clean"),
            0
        );
        assert!(tmp.path().join(".ilogtmp-live").exists());
    }

    #[test]
    fn write_originals_recreates_each_day() {
        let tmp = tempdir().expect("tempdir");
        let mut archive = CombinedLogfile::new("a.log");
        archive
            .add_portion(portion(day(2020, 1, 1), &[b"one", b"two"]))
            .expect("add");
        archive
            .add_portion(portion(day(2020, 1, 2), &[b"three"]))
            .expect("add");
        fs::write(tmp.path().join("freenode_#rust_20200101.log"), b"stale").expect("seed");

        assert_eq!(archive.write_originals(tmp.path()).expect("split"), 2);
        assert_eq!(
            fs::read(tmp.path().join("freenode_#rust_20200101.log")).expect("read"),
            b"one\ntwo\n"
        );
        assert_eq!(
            fs::read(tmp.path().join("freenode_#rust_20200102.log")).expect("read"),
            b"three\n"
        );
    }

    #[test]
    fn write_originals_rejects_path_components() {
        let tmp = tempdir().expect("tempdir");
        let mut archive = CombinedLogfile::new("a.log");
        let mut evil = portion(day(2020, 1, 1), &[b"x"]);
        evil.meta.name = "../escape.log".to_string();
        archive.add_portion(evil).expect("add");
        assert!(matches!(
            archive.write_originals(tmp.path()),
            Err(ArchiveError::UnsafePortionName(_))
        ));
    }

    #[test]
    fn write_raw_omits_markup() {
        let tmp = tempdir().expect("tempdir");
        let dest = tmp.path().join("raw.log");
        let mut archive = CombinedLogfile::new("a.log");
        archive
            .add_portion(portion(day(2020, 1, 2), &[b"b"]))
            .expect("add");
        archive
            .add_portion(portion(day(2020, 1, 1), &[b"a"]))
            .expect("add");
        archive.write_raw(&dest).expect("write raw");
        assert_eq!(fs::read(&dest).expect("read"), b"a\nb\n");
    }
}
