use anyhow::Result;
use basemap::{ChangeType, Severity};
use clap::ValueEnum;
use colored::{Color, Colorize};
use comfy_table::{Attribute, Cell, Color as TableColor, Table};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::theme::{ICONS, THEME};

/// Output format options for CLI commands
#[derive(Clone, Debug, ValueEnum, Default, PartialEq)]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
    /// Compact single-line output
    Compact,
}

/// Global CLI options that affect output and behavior
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
    pub no_color: bool,
}

/// Trait for data that can be displayed as a table
pub trait TableDisplay {
    fn to_table(&self, options: &GlobalOptions) -> Table;
    fn to_compact(&self) -> String;
}

/// Output manager handles formatting and display
pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        Self { options }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.options.output_format, OutputFormat::Json)
    }

    /// Display data according to the configured output format
    pub fn display<T>(&self, data: &T) -> Result<()>
    where
        T: Serialize + TableDisplay,
    {
        if self.options.quiet {
            return Ok(());
        }

        match self.options.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                println!("{json}");
            }
            OutputFormat::Table => {
                let table = data.to_table(&self.options);
                println!("{table}");
            }
            OutputFormat::Compact => {
                println!("{}", data.to_compact());
            }
        }
        Ok(())
    }

    /// Print a rendered document verbatim. Documents are the payload, so
    /// `--quiet` does not suppress them.
    pub fn document(&self, text: &str) {
        print!("{text}");
        if !text.ends_with('\n') {
            println!();
        }
    }

    /// `icon message` in one theme colour. `--no-color` turns colouring off
    /// globally, so the plain form needs no separate branch.
    fn tagged(icon: &str, color: Color, message: &str) -> String {
        format!("{} {}", icon.color(color), message.color(color))
    }

    pub fn success(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", Self::tagged(ICONS.success, THEME.success, message));
        }
    }

    /// Errors are printed even with `--quiet`.
    pub fn error(&self, message: &str) {
        eprintln!("{}", Self::tagged(ICONS.error, THEME.error, message));
    }

    pub fn warning(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", Self::tagged(ICONS.warning, THEME.warning, message));
        }
    }

    /// Diagnostic detail on stderr, only with `--verbose`.
    pub fn verbose(&self, message: &str) {
        if self.options.verbose && !self.options.quiet {
            eprintln!("{}", Self::tagged(ICONS.arrow, THEME.muted, message));
        }
    }

    pub fn info(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", Self::tagged(ICONS.info, THEME.info, message));
        }
    }

    pub fn heading(&self, text: &str) {
        if self.options.quiet {
            return;
        }
        if self.options.no_color {
            println!("\n{text}\n{}", "=".repeat(text.chars().count()));
        } else {
            println!("\n{}", text.color(THEME.primary).bold());
        }
    }

    pub fn key_value(&self, key: &str, value: &str) {
        if !self.options.quiet {
            println!("{}: {}", key.color(THEME.key).bold(), value.color(THEME.value));
        }
    }

    pub fn bullet(&self, text: &str) {
        if !self.options.quiet {
            println!("  {} {text}", ICONS.bullet.color(THEME.muted));
        }
    }

    /// Path of a document written to disk; silent in JSON mode.
    pub fn file_written(&self, path: &Path) {
        if !self.options.quiet && !self.is_json() {
            println!("  {} {}", ICONS.file, path.display().to_string().color(THEME.muted));
        }
    }

    /// One change summary line of a diff, coloured by kind.
    pub fn change(&self, change_type: ChangeType, line: &str) {
        if self.options.quiet {
            return;
        }
        println!("  {}", line.color(THEME.for_change(change_type)));
    }

    /// Transient status line; cleared with [`OutputManager::clear_line`].
    pub fn progress(&self, message: &str) {
        if self.options.quiet || self.is_json() {
            return;
        }
        print!("\r{}...", Self::tagged(ICONS.loading, THEME.highlight, message));
        std::io::stdout().flush().ok();
    }

    pub fn clear_line(&self) {
        if self.options.quiet || self.is_json() {
            return;
        }
        print!("\r{}\r", " ".repeat(80));
        std::io::stdout().flush().ok();
    }
}

pub fn themed_table(options: &GlobalOptions) -> Table {
    let mut table = Table::new();
    if !options.no_color {
        table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
    } else {
        table.load_preset(comfy_table::presets::ASCII_FULL);
    }
    table
}

pub fn header_cells(options: &GlobalOptions, headers: Vec<&str>) -> Vec<Cell> {
    headers
        .into_iter()
        .map(|h| {
            let cell = Cell::new(h).add_attribute(Attribute::Bold);
            if options.no_color {
                cell
            } else {
                cell.fg(TableColor::Cyan)
            }
        })
        .collect()
}

pub fn severity_cell(options: &GlobalOptions, severity: Severity) -> Cell {
    let cell = Cell::new(severity.to_string());
    if options.no_color {
        return cell;
    }
    match severity {
        Severity::High => cell.fg(TableColor::Red).add_attribute(Attribute::Bold),
        Severity::Medium => cell.fg(TableColor::Yellow),
        Severity::Low => cell.fg(TableColor::DarkGrey),
    }
}
