//! Terminal view of the container, the status line and the console log.

use std::time::Duration;

use owo_colors::OwoColorize;
use serde::Serialize;

use crate::classify::ExecutionResult;
use crate::console::{ConsoleLog, LogLevel};
use crate::orchestrator::{Status, StatusTone};
use crate::render::{Container, Presentation, Tone};

pub struct TerminalPrinter {
    pub color: bool,
}

impl TerminalPrinter {
    pub fn status(&self, status: &Status, elapsed: Option<Duration>) {
        let mut line = status.message.clone();
        if let Some(d) = elapsed {
            line.push_str(&format!(" ({:.1} ms)", d.as_secs_f64() * 1000.0));
        }
        if !self.color {
            eprintln!("{}", line);
            return;
        }
        match status.tone {
            StatusTone::Info => eprintln!("{}", line.cyan()),
            StatusTone::Loading => eprintln!("{}", line.dimmed()),
            StatusTone::Success => eprintln!("{}", line.green()),
            StatusTone::Warning => eprintln!("{}", line.yellow()),
            StatusTone::Error => eprintln!("{}", line.red()),
        }
    }

    pub fn source(&self, code: &str) {
        if self.color {
            eprintln!("{}", "Generated code:".bold());
            eprintln!("{}", source_block(code).dimmed());
        } else {
            eprintln!("Generated code:");
            eprintln!("{}", source_block(code));
        }
    }

    pub fn container(&self, container: &Container) {
        let Some(p) = container.content() else { return };
        let text = describe(p);
        match p {
            Presentation::Placeholder { tone: Tone::Error, .. } if self.color => println!("{}", text.red()),
            Presentation::Plot { .. } | Presentation::Frame(_) if self.color => println!("{}", text.magenta()),
            _ => println!("{}", text),
        }
    }

    pub fn console(&self, log: &ConsoleLog) {
        for entry in log.entries() {
            let line = format!("[{}] {}", entry.timestamp.format("%H:%M:%S"), entry.message);
            if !self.color {
                eprintln!("{}", line);
                continue;
            }
            match entry.level {
                LogLevel::Info => eprintln!("{}", line.dimmed()),
                LogLevel::Success => eprintln!("{}", line.green()),
                LogLevel::Error => eprintln!("{}", line.red()),
                LogLevel::Debug => eprintln!("{}", line.bright_black()),
            }
        }
    }
}

fn source_block(code: &str) -> String {
    code.lines().map(|l| format!("    {}", l)).collect::<Vec<_>>().join("\n")
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_ms: Option<f64>,
    #[serde(flatten)]
    result: &'a ExecutionResult,
}

/// `--json` output: the tagged result plus the source that produced it.
pub fn json_report(
    result: &ExecutionResult,
    source: Option<&str>,
    elapsed: Option<Duration>,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        source,
        elapsed_ms: elapsed.map(|d| d.as_secs_f64() * 1000.0),
        result,
    })
}

/// Plain-text rendition of a presentation.
pub fn describe(p: &Presentation) -> String {
    match p {
        Presentation::Plot { image, media_type, .. } => format!("Plot ({}): {}", media_type, image),
        Presentation::Frame(frame) => format!(
            "Markup rendered in an isolated frame [sandbox=\"{}\"], {} bytes. Use --out to write the page.",
            frame.policy.attribute(),
            frame.srcdoc.len()
        ),
        Presentation::Preformatted { text, .. } => text.clone(),
        Presentation::Placeholder { icon, message, .. } => format!("{} {}", icon, message),
    }
}
