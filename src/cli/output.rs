use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use anyhow::Context;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::{json, Value};
use unicode_width::UnicodeWidthStr;

use crate::error::CliResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!(
                "unknown output format {:?} (expected table or json)",
                other
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Table => f.write_str("table"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

/// A list item with a fixed column layout.
pub trait Tabular: Serialize {
    const HEADERS: &'static [&'static str];

    fn row(&self) -> Vec<String>;
}

/// A single object shown as label/value pairs.
pub trait Record: Serialize {
    fn fields(&self) -> Vec<(&'static str, String)>;
}

/// The structured result of a command, ready for either sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    List {
        json: Value,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Record {
        json: Value,
        fields: Vec<(String, String)>,
    },
    Message(String),
}

impl Output {
    pub fn list<T: Tabular>(items: &[T]) -> CliResult<Self> {
        let json = serde_json::to_value(items).context("encoding command result")?;
        Ok(Output::List {
            json,
            headers: T::HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: items
                .iter()
                .map(|item| item.row().iter().map(|c| single_line(c)).collect())
                .collect(),
        })
    }

    pub fn record<T: Record>(item: &T) -> CliResult<Self> {
        let json = serde_json::to_value(item).context("encoding command result")?;
        Ok(Output::Record {
            json,
            fields: item
                .fields()
                .into_iter()
                .map(|(label, value)| (label.to_string(), single_line(&value)))
                .collect(),
        })
    }

    pub fn message(text: impl Into<String>) -> Self {
        Output::Message(text.into())
    }

    pub fn to_json(&self) -> Value {
        match self {
            Output::List { json, .. } | Output::Record { json, .. } => json.clone(),
            Output::Message(text) => json!({ "message": text }),
        }
    }
}

fn single_line(cell: &str) -> String {
    cell.replace(['\n', '\r'], " ")
}

/// Writes command results to stdout. Nothing else writes results there.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    pub format: OutputFormat,
    pub pretty: bool,
    pub quiet: bool,
    /// Box-drawing borders, used when stdout is a terminal.
    pub decorated: bool,
}

impl Renderer {
    pub fn render(&self, output: &Output, out: &mut dyn Write) -> io::Result<()> {
        if self.quiet && matches!(output, Output::Message(_)) {
            return Ok(());
        }

        match self.format {
            OutputFormat::Json => {
                let value = output.to_json();
                if self.pretty {
                    serde_json::to_writer_pretty(&mut *out, &value)?;
                } else {
                    serde_json::to_writer(&mut *out, &value)?;
                }
                writeln!(out)
            }
            OutputFormat::Table => match output {
                Output::List { headers, rows, .. } => self.write_table(out, Some(headers), rows),
                Output::Record { fields, .. } => {
                    let rows: Vec<Vec<String>> = fields
                        .iter()
                        .map(|(label, value)| vec![label.clone(), value.clone()])
                        .collect();
                    self.write_table(out, None, &rows)
                }
                Output::Message(text) => writeln!(out, "{}", text),
            },
        }
    }

    fn write_table(
        &self,
        out: &mut dyn Write,
        headers: Option<&Vec<String>>,
        rows: &[Vec<String>],
    ) -> io::Result<()> {
        let columns = headers
            .map(Vec::len)
            .or_else(|| rows.first().map(Vec::len))
            .unwrap_or(0);
        if columns == 0 {
            return Ok(());
        }

        let mut widths = vec![0usize; columns];
        for line in headers.into_iter().chain(rows.iter()) {
            for (i, cell) in line.iter().enumerate().take(columns) {
                widths[i] = widths[i].max(cell.width());
            }
        }

        if self.decorated {
            writeln!(out, "{}", rule(&widths, '┌', '┬', '┐'))?;
            if let Some(headers) = headers {
                writeln!(out, "{}", line(headers, &widths, '│'))?;
                writeln!(out, "{}", rule(&widths, '├', '┼', '┤'))?;
            }
            for row in rows {
                writeln!(out, "{}", line(row, &widths, '│'))?;
            }
            writeln!(out, "{}", rule(&widths, '└', '┴', '┘'))
        } else {
            if let Some(headers) = headers {
                writeln!(out, "{}", line(headers, &widths, '|'))?;
                let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
                writeln!(out, "|{}|", dashes.join("|"))?;
            }
            for row in rows {
                writeln!(out, "{}", line(row, &widths, '|'))?;
            }
            Ok(())
        }
    }
}

fn rule(widths: &[usize], left: char, middle: char, right: char) -> String {
    let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
    format!("{}{}{}", left, segments.join(&middle.to_string()), right)
}

fn line(cells: &[String], widths: &[usize], separator: char) -> String {
    let mut rendered = String::new();
    rendered.push(separator);
    for (i, width) in widths.iter().enumerate() {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        rendered.push(' ');
        rendered.push_str(cell);
        rendered.push_str(&" ".repeat(width.saturating_sub(cell.width())));
        rendered.push(' ');
        rendered.push(separator);
    }
    rendered
}
