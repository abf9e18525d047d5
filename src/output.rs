use std::cell::Cell;
use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunReport};
use crate::domain::TransferState;
use crate::reconcile::{AuditReport, RepairSummary};

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human progress on stderr, reports on stdout.
#[derive(Default)]
pub struct ConsoleOutput {
    progress_line: Cell<bool>,
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_run(&self, report: &RunReport) {
        self.end_progress_line();
        if let Some(summary) = &report.summary {
            print_summary(summary, report.root.as_str());
        }
    }

    fn end_progress_line(&self) {
        if self.progress_line.replace(false) {
            eprintln!();
        }
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Progress { done, total } => {
                let percent = done as f64 * 100.0 / total as f64;
                eprint!("\r   {percent:5.1}%  {} / {}", human_size(done), human_size(total));
                let _ = io::stderr().flush();
                self.progress_line.set(true);
                return;
            }
            _ => self.end_progress_line(),
        }

        match event {
            ProgressEvent::ItemStarted {
                index,
                total,
                label,
                state,
            } => {
                let action = match state {
                    TransferState::Partial => "resume",
                    TransferState::Corrupt => "re-download",
                    _ => "download",
                };
                eprintln!("{CYAN}[{index}/{total}] {action}: {label}{RESET}");
            }
            ProgressEvent::Skipped {
                index,
                total,
                label,
                size,
            } => {
                eprintln!("{GREEN}[{index}/{total}] ok: {label} ({}){RESET}", human_size(size));
            }
            ProgressEvent::Discarded { label } => {
                eprintln!("{YELLOW}   removed corrupt file: {label}{RESET}");
            }
            ProgressEvent::Started { resume_from, total } => {
                if resume_from > 0 {
                    let total = total.map(human_size).unwrap_or_else(|| "?".to_string());
                    eprintln!("   resuming at {} of {total}", human_size(resume_from));
                }
            }
            ProgressEvent::Retrying {
                attempt,
                max_attempts,
                bytes_on_disk,
                wait,
                failure,
            } => {
                eprintln!(
                    "{YELLOW}   attempt {attempt}/{max_attempts} failed: {failure}{RESET}"
                );
                eprintln!(
                    "{YELLOW}   {} kept, retrying in {}s{RESET}",
                    human_size(bytes_on_disk),
                    wait.as_secs()
                );
            }
            ProgressEvent::Saved { bytes } => {
                eprintln!("{GREEN}   saved ({}){RESET}", human_size(bytes));
            }
            ProgressEvent::Failed { attempts, failure } => {
                eprintln!("{RED}   failed after {attempts} attempts: {failure}{RESET}");
            }
            ProgressEvent::Progress { .. } => {}
        }
    }

    fn audit(&self, report: &AuditReport) {
        self.end_progress_line();
        print_audit(report);
    }
}

pub fn print_audit(report: &AuditReport) {
    println!("{CYAN}Audit of {}{RESET}", report.root);
    for entry in &report.entries {
        let (tag, color) = match entry.state {
            TransferState::Valid => ("VALID  ", GREEN),
            TransferState::Partial => ("PARTIAL", YELLOW),
            TransferState::Corrupt => ("CORRUPT", RED),
            TransferState::Missing => ("MISSING", RED),
        };
        let size = entry.size.map(human_size).unwrap_or_else(|| "-".to_string());
        println!("{color}{tag}{RESET} {:>10}  {}", size, entry.label);
    }

    let counts = &report.counts;
    println!();
    println!("{GREEN}Valid:   {}{RESET}", counts.valid);
    println!("{YELLOW}Partial: {}{RESET}", counts.partial);
    println!("{RED}Corrupt: {}{RESET}", counts.corrupt);
    println!("{RED}Missing: {}{RESET}", counts.missing);
    println!("Total:   {}", counts.total());
}

fn print_summary(summary: &RepairSummary, root: &str) {
    println!("{CYAN}fetchmend summary{RESET}");
    println!("{GREEN}Already valid: {}{RESET}", summary.already_valid);
    println!("{GREEN}Downloaded:    {}{RESET}", summary.succeeded);
    if summary.failed > 0 {
        println!("{RED}Failed:        {}{RESET}", summary.failed);
        println!("{YELLOW}Run again to resume the failed files.{RESET}");
    } else {
        println!("Failed:        0");
    }
    println!("Files in: {root}");
}

/// Binary units with one decimal, e.g. `1.5 MiB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
