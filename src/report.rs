//! Result records and reporting.
//!
//! ## ResultSink Trait
//!
//! The engine emits exactly one [`ResultRecord`] per selected case and hands it to a [`ResultSink`]. What happens
//! to records afterwards is the host's business: collect them ([`CollectingSink`]), print them pytest-style
//! ([`ConsoleReporter`]) or serialize them ([`JsonReporter`]).

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use serde::Serialize;

/// Final status of one case run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    Passed,
    Failed,
    /// Not run: unknown selection name, or stopped after an earlier failure.
    Skipped,
    /// The case or one of its ancestors is disabled; nothing was invoked.
    Disabled,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Passed => "PASSED",
            Status::Failed => "FAILED",
            Status::Skipped => "SKIPPED",
            Status::Disabled => "DISABLED",
        };
        f.write_str(label)
    }
}

/// Outcome of one case run. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub path: String,
    pub status: Status,
    /// Assertion and diagnostic messages in the order they were recorded.
    pub messages: Vec<String>,
    pub duration_millis: u64,
}

impl ResultRecord {
    pub fn new(path: impl Into<String>, status: Status, messages: Vec<String>, duration: Duration) -> Self {
        Self {
            path: path.into(),
            status,
            messages,
            duration_millis: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn disabled(path: impl Into<String>) -> Self {
        Self::new(path, Status::Disabled, Vec::new(), Duration::ZERO)
    }

    pub fn skipped(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::new(path, Status::Skipped, vec![format!("[skip] {reason}")], Duration::ZERO)
    }

    pub fn is_failure(&self) -> bool {
        self.status == Status::Failed
    }
}

/// Counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub disabled: usize,
    pub duration_millis: u64,
}

impl RunSummary {
    /// Tally one record.
    pub fn add(&mut self, status: Status) {
        self.total += 1;
        match status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failed += 1,
            Status::Skipped => self.skipped += 1,
            Status::Disabled => self.disabled += 1,
        }
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ResultRecord>) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.add(record.status);
        }
        summary
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// No case failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

// ============================================================================
// Result Sink Trait
// ============================================================================

/// Consumer of result records.
///
/// Implement this trait to customize what happens to results (console, JSON, collection for assertions).
pub trait ResultSink {
    /// Called once the selection has been resolved into `case_count` cases
    fn on_run_start(&mut self, _case_count: usize) {}

    /// Called before a case starts running
    fn on_case_start(&mut self, _path: &str) {}

    /// Called with the record of every case, in run order
    fn on_record(&mut self, record: &ResultRecord);

    /// Called when every selected case has a record
    fn on_run_complete(&mut self, _summary: &RunSummary) {}
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub records: Vec<ResultRecord>,
    pub summary: Option<RunSummary>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_records(self) -> Vec<ResultRecord> {
        self.records
    }
}

impl ResultSink for CollectingSink {
    fn on_record(&mut self, record: &ResultRecord) {
        self.records.push(record.clone());
    }

    fn on_run_complete(&mut self, summary: &RunSummary) {
        self.summary = Some(summary.clone());
    }
}

// ============================================================================
// Console Reporter
// ============================================================================

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const BOLD_RED: &str = "\x1b[1;31m";
const BOLD_GREEN: &str = "\x1b[1;32m";
const RESET: &str = "\x1b[0m";

/// Pytest-style console output.
///
/// Write errors are kept and returned by [`ConsoleReporter::finish`]; reporting never interrupts a run.
pub struct ConsoleReporter<W: Write> {
    out: W,
    verbose: bool,
    color: bool,
    failures: Vec<ResultRecord>,
    error: Option<io::Error>,
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self {
            out,
            verbose,
            color: true,
            failures: Vec::new(),
            error: None,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Return the writer, or the first write error.
    pub fn finish(self) -> io::Result<W> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.out),
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn emit(&mut self, text: fmt::Arguments<'_>) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.out.write_fmt(text) {
            self.error = Some(err);
        }
    }

    fn status_label(&self, record: &ResultRecord) -> String {
        let code = match record.status {
            Status::Passed => GREEN,
            Status::Failed => RED,
            Status::Skipped | Status::Disabled => YELLOW,
        };
        if self.verbose {
            let label = self.paint(code, &record.status.to_string());
            match record.status {
                Status::Passed | Status::Failed => format!("{label} ({}ms)", record.duration_millis),
                Status::Skipped | Status::Disabled => label,
            }
        } else {
            let mark = match record.status {
                Status::Passed => ".",
                Status::Failed => "F",
                Status::Skipped => "s",
                Status::Disabled => "d",
            };
            self.paint(code, mark)
        }
    }
}

impl<W: Write> ResultSink for ConsoleReporter<W> {
    fn on_run_start(&mut self, case_count: usize) {
        if case_count == 0 {
            self.emit(format_args!("no specs collected\n"));
            return;
        }
        let banner = self.paint(BOLD, "=================== spec session starts ===================");
        self.emit(format_args!("{banner}\ncollected {case_count} item(s)\n\n"));
    }

    fn on_case_start(&mut self, path: &str) {
        if self.verbose {
            self.emit(format_args!("{path} ... "));
        }
    }

    fn on_record(&mut self, record: &ResultRecord) {
        let label = self.status_label(record);
        if self.verbose {
            self.emit(format_args!("{label}\n"));
        } else {
            self.emit(format_args!("{label}"));
        }
        if record.is_failure() {
            self.failures.push(record.clone());
        }
    }

    fn on_run_complete(&mut self, summary: &RunSummary) {
        if summary.total == 0 {
            return;
        }
        if !self.verbose {
            self.emit(format_args!("\n"));
        }

        let failures = std::mem::take(&mut self.failures);
        if !failures.is_empty() {
            let header = self.paint(BOLD_RED, "=================== FAILURES ===================");
            self.emit(format_args!("\n{header}\n"));
            for record in &failures {
                let title = self.paint(BOLD, &format!("___________ {} ___________", record.path));
                self.emit(format_args!("\n{title}\n\n"));
                for message in &record.messages {
                    self.emit(format_args!("    {message}\n"));
                }
            }
        }

        let mut parts = Vec::new();
        if summary.passed > 0 {
            parts.push(format!("{} passed", summary.passed));
        }
        if summary.failed > 0 {
            parts.push(format!("{} failed", summary.failed));
        }
        if summary.skipped > 0 {
            parts.push(format!("{} skipped", summary.skipped));
        }
        if summary.disabled > 0 {
            parts.push(format!("{} disabled", summary.disabled));
        }
        let seconds = Duration::from_millis(summary.duration_millis).as_secs_f64();
        let line = format!("=================== {} in {seconds:.2}s ===================", parts.join(", "));
        let line = self.paint(if summary.is_success() { BOLD_GREEN } else { BOLD_RED }, &line);
        self.emit(format_args!("\n{line}\n"));
    }
}

// ============================================================================
// JSON Reporter
// ============================================================================

#[derive(Serialize)]
struct JsonReport<'a> {
    records: &'a [ResultRecord],
    summary: &'a RunSummary,
}

/// Writes every record and the summary as one JSON document when the run completes.
pub struct JsonReporter<W: Write> {
    out: W,
    records: Vec<ResultRecord>,
    error: Option<io::Error>,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            records: Vec::new(),
            error: None,
        }
    }

    pub fn finish(self) -> io::Result<W> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.out),
        }
    }
}

impl<W: Write> ResultSink for JsonReporter<W> {
    fn on_record(&mut self, record: &ResultRecord) {
        self.records.push(record.clone());
    }

    fn on_run_complete(&mut self, summary: &RunSummary) {
        let report = JsonReport {
            records: &self.records,
            summary,
        };
        let written = serde_json::to_writer_pretty(&mut self.out, &report)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(self.out));
        if let Err(err) = written {
            self.error = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<ResultRecord> {
        vec![
            ResultRecord::new(
                "Sum.zero",
                Status::Passed,
                vec!["[pass] sum of zeros".to_string()],
                Duration::from_millis(3),
            ),
            ResultRecord::new(
                "Sum.broken",
                Status::Failed,
                vec!["[fail] sum: expected 4, got 5".to_string()],
                Duration::from_millis(1),
            ),
            ResultRecord::disabled("Sum.later"),
            ResultRecord::skipped("Missing", "no spec matches 'Missing'"),
        ]
    }

    fn replay(sink: &mut dyn ResultSink) {
        let records = records();
        sink.on_run_start(records.len());
        for record in &records {
            sink.on_case_start(&record.path);
            sink.on_record(record);
        }
        let summary = RunSummary::from_records(&records).with_duration(Duration::from_millis(1250));
        sink.on_run_complete(&summary);
    }

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary::from_records(&records());
        assert_eq!(summary.total, 4);
        assert_eq!(
            (summary.passed, summary.failed, summary.skipped, summary.disabled),
            (1, 1, 1, 1)
        );
        assert!(!summary.is_success());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(&records()[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "path": "Sum.zero",
                "status": "Passed",
                "messages": ["[pass] sum of zeros"],
                "durationMillis": 3,
            })
        );
    }

    #[test]
    fn test_collecting_sink_keeps_order() {
        let mut sink = CollectingSink::new();
        replay(&mut sink);
        let paths: Vec<&str> = sink.records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["Sum.zero", "Sum.broken", "Sum.later", "Missing"]);
        assert_eq!(sink.summary.map(|s| s.total), Some(4));
    }

    #[test]
    fn test_console_reporter_compact() {
        let mut reporter = ConsoleReporter::new(Vec::new(), false).with_color(false);
        replay(&mut reporter);
        let output = String::from_utf8(reporter.finish().unwrap()).unwrap();
        insta::assert_snapshot!(output, @r"
        =================== spec session starts ===================
        collected 4 item(s)

        .Fds

        =================== FAILURES ===================

        ___________ Sum.broken ___________

            [fail] sum: expected 4, got 5

        =================== 1 passed, 1 failed, 1 skipped, 1 disabled in 1.25s ===================
        ");
    }

    #[test]
    fn test_console_reporter_verbose() {
        let mut reporter = ConsoleReporter::new(Vec::new(), true).with_color(false);
        replay(&mut reporter);
        let output = String::from_utf8(reporter.finish().unwrap()).unwrap();
        assert!(output.contains("Sum.zero ... PASSED (3ms)\n"));
        assert!(output.contains("Sum.later ... DISABLED\n"));
        assert!(output.contains("Missing ... SKIPPED\n"));
    }

    #[test]
    fn test_console_reporter_colors_status() {
        let mut reporter = ConsoleReporter::new(Vec::new(), false);
        replay(&mut reporter);
        let output = String::from_utf8(reporter.finish().unwrap()).unwrap();
        assert!(output.contains("\x1b[32m.\x1b[0m"));
        assert!(output.contains("\x1b[31mF\x1b[0m"));
    }

    #[test]
    fn test_empty_run() {
        let mut reporter = ConsoleReporter::new(Vec::new(), false).with_color(false);
        reporter.on_run_start(0);
        reporter.on_run_complete(&RunSummary::default());
        let output = String::from_utf8(reporter.finish().unwrap()).unwrap();
        assert_eq!(output, "no specs collected\n");
    }

    #[test]
    fn test_json_reporter_document() {
        let mut reporter = JsonReporter::new(Vec::new());
        replay(&mut reporter);
        let output = reporter.finish().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["records"].as_array().map(Vec::len), Some(4));
        assert_eq!(value["records"][1]["status"], "Failed");
        assert_eq!(value["summary"]["failed"], 1);
        assert_eq!(value["summary"]["durationMillis"], 1250);
    }
}
