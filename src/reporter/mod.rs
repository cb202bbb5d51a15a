// file: src/reporter/mod.rs
// version: 1.2.0
// guid: 8e2b6d91-4c7f-4a38-90d5-3f1e8b27c604

//! Console transcript and end-of-run reporting
//!
//! Every node run writes through a [`RunLog`]. Master transcripts print
//! as they happen; worker transcripts are buffered and flushed in node
//! order so parallel output never interleaves. All lines are retained in
//! plain form for the optional report file.

use crate::Result;
use colored::Colorize;
use std::path::Path;
use std::time::Duration;

/// Final status of one node run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Completed,
    Failed(String),
    /// Not attempted because an earlier master failed
    Skipped,
}

/// Summary row for one node
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub ip: String,
    pub is_master: bool,
    pub outcome: NodeOutcome,
}

struct Line {
    plain: String,
    shown: String,
}

/// Per-node transcript
pub struct RunLog {
    prefix: String,
    buffered: bool,
    lines: Vec<Line>,
}

impl RunLog {
    /// Transcript that prints each line immediately
    pub fn direct(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            buffered: false,
            lines: Vec::new(),
        }
    }

    /// Transcript that only retains lines until [`RunLog::flush`]
    pub fn buffered(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            buffered: true,
            lines: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn emit(&mut self, plain: String, shown: String) {
        if !self.buffered {
            println!("{}", shown);
        }
        self.lines.push(Line { plain, shown });
    }

    pub fn info(&mut self, message: &str) {
        let plain = format!("[{}] {}", self.prefix, message);
        let shown = format!("[{}] {}", self.prefix.bold(), message);
        self.emit(plain, shown);
    }

    pub fn step_start(&mut self, index: usize, total: usize, title: &str) {
        let plain = format!("[{}] [{}/{}] {}", self.prefix, index, total, title);
        let shown = format!("[{}] [{}/{}] {}", self.prefix.bold(), index, total, title);
        self.emit(plain, shown);
    }

    pub fn step_skipped(&mut self, _title: &str) {
        let plain = "  └─ already satisfied, skipping".to_string();
        let shown = format!("  └─ already satisfied, {}", "skipping".yellow());
        self.emit(plain, shown);
    }

    pub fn step_would_run(&mut self, _title: &str) {
        let plain = "  └─ would execute (dry-run)".to_string();
        let shown = format!("  └─ {} (dry-run)", "would execute".cyan());
        self.emit(plain, shown);
    }

    pub fn step_done(&mut self, _title: &str, elapsed: Duration) {
        let plain = format!("  └─ done in {}", fmt_duration(elapsed));
        let shown = format!("  └─ {} in {}", "done".green(), fmt_duration(elapsed));
        self.emit(plain, shown);
    }

    pub fn step_failed(&mut self, _title: &str) {
        let plain = "  └─ failed".to_string();
        let shown = format!("  └─ {}", "failed".red());
        self.emit(plain, shown);
    }

    /// Print every retained line; used for buffered worker transcripts
    pub fn flush(&self) {
        for line in &self.lines {
            println!("{}", line.shown);
        }
    }

    /// Plain lines, as written to the report file
    pub fn plain_lines(&self) -> Vec<&str> {
        self.lines.iter().map(|l| l.plain.as_str()).collect()
    }
}

/// Human duration: milliseconds under a second, tenths of seconds under
/// a minute, minutes and seconds above
pub fn fmt_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        let secs = d.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

fn role(report: &NodeReport) -> &'static str {
    if report.is_master {
        "master"
    } else {
        "worker"
    }
}

fn outcome_plain(outcome: &NodeOutcome) -> String {
    match outcome {
        NodeOutcome::Completed => "completed".to_string(),
        NodeOutcome::Failed(reason) => format!("failed: {}", reason),
        NodeOutcome::Skipped => "skipped".to_string(),
    }
}

/// Plain-text summary block, one line per node plus totals
pub fn render_summary(reports: &[NodeReport]) -> String {
    let mut out = String::from("== summary ==\n");
    for report in reports {
        out.push_str(&format!(
            "{:<16} {:<7} {}\n",
            report.ip,
            role(report),
            outcome_plain(&report.outcome)
        ));
    }
    let completed = reports
        .iter()
        .filter(|r| r.outcome == NodeOutcome::Completed)
        .count();
    let skipped = reports
        .iter()
        .filter(|r| r.outcome == NodeOutcome::Skipped)
        .count();
    let failed = reports.len() - completed - skipped;
    out.push_str(&format!(
        "{} completed, {} failed, {} skipped\n",
        completed, failed, skipped
    ));
    out
}

/// Print the colored summary to stdout
pub fn print_summary(reports: &[NodeReport]) {
    println!();
    println!("== summary ==");
    for report in reports {
        let status = match &report.outcome {
            NodeOutcome::Completed => "completed".green().to_string(),
            NodeOutcome::Failed(reason) => format!("{}: {}", "failed".red(), reason),
            NodeOutcome::Skipped => "skipped".yellow().to_string(),
        };
        println!("{:<16} {:<7} {}", report.ip, role(report), status);
    }
    let completed = reports
        .iter()
        .filter(|r| r.outcome == NodeOutcome::Completed)
        .count();
    let skipped = reports
        .iter()
        .filter(|r| r.outcome == NodeOutcome::Skipped)
        .count();
    let failed = reports.len() - completed - skipped;
    println!(
        "{} completed, {} failed, {} skipped",
        completed, failed, skipped
    );
}

/// Write the plain summary and every node transcript to `path`
pub fn write_report_file(path: &Path, reports: &[NodeReport], transcripts: &[RunLog]) -> Result<()> {
    let mut body = String::new();
    body.push_str("# cluster install report\n");
    body.push_str(&format!("# generated: {}\n\n", chrono::Utc::now().to_rfc3339()));
    body.push_str(&render_summary(reports));
    for log in transcripts {
        body.push_str(&format!("\n== transcript {} ==\n", log.prefix()));
        for line in log.plain_lines() {
            body.push_str(line);
            body.push('\n');
        }
    }
    std::fs::write(path, body)?;
    Ok(())
}
