//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        print_warning("No targets found");
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Render an empty value as a dash
pub fn or_dash(value: Option<&String>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.clone(),
        _ => "-".to_string(),
    }
}

/// Color a rule family as enabled or disabled
pub fn color_enabled(count: usize) -> String {
    if count > 0 {
        count.to_string().green().to_string()
    } else {
        "disabled".dimmed().to_string()
    }
}
