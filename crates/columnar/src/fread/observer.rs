//! Timing and counter collection for one read, and the final report.

use super::parsers::ParseType;
use std::fmt;
use std::time::{Duration, Instant};

/// Phases of a read, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Option resolution, line ending and BOM handling.
    Initialize,
    /// Separator, quote rule and field count detection.
    DetectFormat,
    /// Column type sampling and header detection.
    DetectTypes,
    /// Output column allocation.
    Allocate,
    /// First parallel pass over the data.
    Read,
    /// Passes over columns promoted during an earlier pass.
    Reread,
    /// Trimming and assembly of the result.
    Finalize,
}

impl Phase {
    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Initialize => "Initialization",
            Self::DetectFormat => "Separator and quote rule detection",
            Self::DetectTypes => "Column type detection",
            Self::Allocate => "Allocation",
            Self::Read => "Reading data",
            Self::Reread => "Rereading promoted columns",
            Self::Finalize => "Finalization",
        }
    }
}

/// One type promotion discovered while reading.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeBump {
    /// Zero-based column position in the input.
    pub column: usize,
    /// Column name.
    pub name: String,
    /// Type before the promotion.
    pub from: ParseType,
    /// Type after the promotion.
    pub to: ParseType,
    /// Text of the field that did not fit.
    pub field: String,
    /// 1-based line of that field.
    pub line: usize,
}

impl fmt::Display for TypeBump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Column {} (\"{}\") bumped from '{}' to '{}' due to <<{}>> on line {}",
            self.column + 1,
            self.name,
            self.from,
            self.to,
            self.field,
            self.line
        )
    }
}

/// Write-only statistics bag owned by a single reader.
#[derive(Debug)]
pub struct FreadObserver {
    started: Instant,
    last_mark: Instant,
    phases: Vec<(Phase, Duration)>,
    pub(crate) time_read: Duration,
    pub(crate) time_push: Duration,
    pub(crate) input_size: usize,
    pub(crate) lines_sampled: usize,
    pub(crate) rows_allocated: usize,
    pub(crate) cols_allocated: usize,
    pub(crate) allocation_size: usize,
    pub(crate) rows_read: usize,
    pub(crate) cols_read: usize,
    pub(crate) nthreads: usize,
    pub(crate) nchunks: usize,
    pub(crate) reread_columns: usize,
    pub(crate) reread_passes: usize,
    pub(crate) allocation_grown: usize,
    type_bumps: Vec<TypeBump>,
    warnings: Vec<String>,
}

impl Default for FreadObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl FreadObserver {
    /// Starts the clock.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_mark: now,
            phases: Vec::new(),
            time_read: Duration::ZERO,
            time_push: Duration::ZERO,
            input_size: 0,
            lines_sampled: 0,
            rows_allocated: 0,
            cols_allocated: 0,
            allocation_size: 0,
            rows_read: 0,
            cols_read: 0,
            nthreads: 0,
            nchunks: 0,
            reread_columns: 0,
            reread_passes: 0,
            allocation_grown: 0,
            type_bumps: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Records the end of `phase`. Repeated phases accumulate.
    pub fn mark(&mut self, phase: Phase) {
        let now = Instant::now();
        let elapsed = now - self.last_mark;
        self.last_mark = now;
        match self.phases.iter_mut().find(|(p, _)| *p == phase) {
            Some((_, total)) => *total += elapsed,
            None => self.phases.push((phase, elapsed)),
        }
    }

    /// Records one type promotion.
    pub fn type_bump_info(&mut self, bump: TypeBump) {
        self.type_bumps.push(bump);
    }

    /// Records one warning.
    pub fn warning(&mut self, message: String) {
        self.warnings.push(message);
    }

    /// One message per promotion recorded so far.
    pub fn type_bump_messages(&self) -> Vec<String> {
        self.type_bumps.iter().map(ToString::to_string).collect()
    }

    /// Snapshot of everything collected.
    pub fn report(&self) -> FreadReport {
        FreadReport {
            total_time: self.last_mark - self.started,
            phases: self.phases.clone(),
            time_read: self.time_read,
            time_push: self.time_push,
            input_size: self.input_size,
            lines_sampled: self.lines_sampled,
            rows_allocated: self.rows_allocated,
            cols_allocated: self.cols_allocated,
            allocation_size: self.allocation_size,
            rows_read: self.rows_read,
            cols_read: self.cols_read,
            nthreads: self.nthreads,
            nchunks: self.nchunks,
            reread_columns: self.reread_columns,
            reread_passes: self.reread_passes,
            allocation_grown: self.allocation_grown,
            type_bumps: self.type_bumps.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Diagnostics of a finished read.
#[derive(Debug, Clone, Default)]
pub struct FreadReport {
    /// Wall time from start to the last recorded phase.
    pub total_time: Duration,
    /// Wall time per phase.
    pub phases: Vec<(Phase, Duration)>,
    /// Time spent parsing chunks, summed over workers.
    pub time_read: Duration,
    /// Time spent copying chunks into the output, summed over workers.
    pub time_push: Duration,
    /// Input size in bytes.
    pub input_size: usize,
    /// Lines examined during type detection.
    pub lines_sampled: usize,
    /// Rows allocated up front.
    pub rows_allocated: usize,
    /// Columns allocated.
    pub cols_allocated: usize,
    /// Bytes allocated for column storage up front.
    pub allocation_size: usize,
    /// Rows in the result.
    pub rows_read: usize,
    /// Columns in the result.
    pub cols_read: usize,
    /// Worker threads used.
    pub nthreads: usize,
    /// Chunks the data was split into.
    pub nchunks: usize,
    /// Columns read again because of a type promotion.
    pub reread_columns: usize,
    /// Extra passes over the data.
    pub reread_passes: usize,
    /// Times the row allocation had to grow.
    pub allocation_grown: usize,
    /// Every type promotion, in input order.
    pub type_bumps: Vec<TypeBump>,
    /// Warnings about discarded or irregular input.
    pub warnings: Vec<String>,
}

impl FreadReport {
    /// Time recorded for `phase`.
    pub fn phase_time(&self, phase: Phase) -> Duration {
        self.phases
            .iter()
            .find(|(p, _)| *p == phase)
            .map_or(Duration::ZERO, |(_, d)| *d)
    }
}

fn percent(part: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        0.0
    } else {
        100.0 * part.as_secs_f64() / total.as_secs_f64()
    }
}

fn human_bytes(n: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n}B")
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}

impl fmt::Display for FreadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total_time;
        writeln!(f, "=============================")?;
        for (phase, d) in &self.phases {
            write!(
                f,
                "{:8.3}s ({:3.0}%) {}",
                d.as_secs_f64(),
                percent(*d, total),
                phase.label()
            )?;
            match phase {
                Phase::DetectTypes => write!(f, " using {} sample lines", self.lines_sampled)?,
                Phase::Allocate => write!(
                    f,
                    " of {} rows x {} cols ({}), {} rows used",
                    self.rows_allocated,
                    self.cols_allocated,
                    human_bytes(self.allocation_size),
                    self.rows_read
                )?,
                Phase::Read => write!(
                    f,
                    " in {} chunks of {} using {} threads",
                    self.nchunks,
                    human_bytes(self.input_size),
                    self.nthreads
                )?,
                Phase::Reread => write!(f, " ({} columns)", self.reread_columns)?,
                _ => {}
            }
            writeln!(f)?;
        }
        writeln!(
            f,
            "   + {:8.3}s parsing, {:.3}s copying (summed over threads), allocation grown {} times",
            self.time_read.as_secs_f64(),
            self.time_push.as_secs_f64(),
            self.allocation_grown
        )?;
        writeln!(f, "{:8.3}s        Total", total.as_secs_f64())?;
        writeln!(f, "Read {} rows x {} columns", self.rows_read, self.cols_read)?;
        if !self.type_bumps.is_empty() {
            writeln!(f, "{} out-of-sample type bumps:", self.type_bumps.len())?;
            for bump in &self.type_bumps {
                writeln!(f, "  {bump}")?;
            }
        }
        for msg in &self.warnings {
            writeln!(f, "Warning: {msg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_accumulate() {
        let mut obs = FreadObserver::new();
        obs.mark(Phase::Initialize);
        obs.mark(Phase::Read);
        obs.mark(Phase::Reread);
        obs.mark(Phase::Reread);
        let report = obs.report();
        assert_eq!(report.phases.len(), 3);
        assert!(report.phase_time(Phase::Finalize).is_zero());
        let sum: Duration = report.phases.iter().map(|(_, d)| *d).sum();
        assert_eq!(sum, report.total_time);
    }

    #[test]
    fn test_report_lists_bumps_and_warnings() {
        let mut obs = FreadObserver::new();
        obs.rows_read = 3;
        obs.cols_read = 2;
        obs.type_bump_info(TypeBump {
            column: 0,
            name: "a".to_string(),
            from: ParseType::Int32,
            to: ParseType::Float64,
            field: "1.5".to_string(),
            line: 7,
        });
        assert_eq!(
            obs.type_bump_messages(),
            vec!["Column 1 (\"a\") bumped from 'Int32' to 'Float64' due to <<1.5>> on line 7".to_string()]
        );
        obs.warning("trailing text discarded".to_string());
        obs.mark(Phase::Finalize);
        let text = obs.report().to_string();
        assert!(text.contains("Read 3 rows x 2 columns"));
        assert!(text.contains("1 out-of-sample type bumps"));
        assert!(text.contains("bumped from 'Int32' to 'Float64'"));
        assert!(text.contains("Warning: trailing text discarded"));
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512B");
        assert_eq!(human_bytes(2048), "2.0KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.0MB");
    }
}
