//! Output formatting for the CLI.
//!
//! Supports multiple output formats:
//! - `table` - Human-readable table (default)
//! - `json` - Structured JSON
//! - `yaml` - YAML format
//!
//! Status lines (progress, success, warnings) go to stderr so that stdout
//! stays machine-readable in `json`/`yaml` mode.

mod steps;
mod table;

use std::io::IsTerminal;

use clap::ValueEnum;
use serde::Serialize;
pub use steps::{format_dot_leader, print_hint, print_plan, visible_len};
pub use table::TableFormatter;

use crate::error::Result;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
    /// YAML format.
    Yaml,
}

/// Trait for types that can be displayed in the CLI.
pub trait Displayable {
    /// Display as a table row.
    fn table_row(&self) -> Vec<String>;

    /// Get column headers for table display.
    fn table_headers() -> Vec<&'static str>;
}

/// Output writer that handles format selection and terminal capabilities.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Output {
    /// Create a new output writer.
    pub const fn new(format: OutputFormat, color: bool, quiet: bool) -> Self {
        Self { format, color, quiet }
    }

    /// Output writer for `format`, with color when stderr is a terminal.
    pub fn detect(format: OutputFormat, quiet: bool) -> Self {
        Self::new(format, std::io::stderr().is_terminal(), quiet)
    }

    /// Output a single serializable value.
    pub fn value<T: Serialize>(&self, value: &T) -> Result<()> {
        match self.format {
            OutputFormat::Yaml => self.yaml(value),
            // Single values have no table form; fall back to JSON.
            OutputFormat::Json | OutputFormat::Table => self.json(value),
        }
    }

    /// Output a list of items as a table.
    pub fn table<T: Displayable + Serialize>(&self, items: &[T]) -> Result<()> {
        match self.format {
            OutputFormat::Table => {
                let mut formatter = TableFormatter::new(T::table_headers());
                for item in items {
                    formatter.row(item.table_row());
                }
                formatter.print();
                Ok(())
            },
            OutputFormat::Json => self.json(items),
            OutputFormat::Yaml => self.yaml(items),
        }
    }

    fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn yaml<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        print!("{}", serde_yaml::to_string(value)?);
        Ok(())
    }

    /// Print a message to stderr (info, progress).
    pub fn info(&self, message: &str) {
        if !self.quiet {
            eprintln!("{message}");
        }
    }

    /// Print a warning message.
    pub fn warn(&self, message: &str) {
        if !self.quiet {
            if self.color {
                eprintln!("\x1b[33m⚠\x1b[0m {message}");
            } else {
                eprintln!("⚠ {message}");
            }
        }
    }

    /// Check if output is in quiet mode.
    pub const fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Check if color is enabled.
    pub const fn has_color(&self) -> bool {
        self.color
    }

    /// Get the current output format.
    pub const fn format(&self) -> OutputFormat {
        self.format
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new(OutputFormat::Table, false, false)
    }
}
