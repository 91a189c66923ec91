use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

use crate::constants::ACCENT;

/// Calculate terminal display width, treating emojis as 2 cells wide
///
/// Terminals typically render emojis as 2 cells wide regardless of Unicode
/// Standard Annex #11 width properties, so we use a terminal-specific calculation.
fn terminal_width(s: &str) -> usize {
    use unicode_width::UnicodeWidthChar;
    s.chars()
        .map(|c| {
            if c.is_ascii() {
                1
            } else {
                let w = UnicodeWidthChar::width(c).unwrap_or(0);
                if w > 0 { 2 } else { 0 }
            }
        })
        .sum()
}

/// Print a styled title bar with an accent separator matching the title width
pub fn print_title_bar(title: &str) {
    println!("{}", title.bold().bright_white());
    let separator: String = "─".repeat(terminal_width(title));
    println!("{}", separator.truecolor(ACCENT.0, ACCENT.1, ACCENT.2));
}

/// Print a step heading, e.g. `[2/3] Building SPIFFS image`
pub fn print_step(step: usize, total: usize, title: &str) {
    println!();
    println!(
        "{} {}",
        format!("[{step}/{total}]").truecolor(ACCENT.0, ACCENT.1, ACCENT.2),
        title.bold()
    );
}

/// Display a success message
pub fn success(message: &str) {
    if message.is_empty() {
        println!("  {}", "✓".green());
    } else {
        println!("  {} {}", "✓".green(), message);
    }
}

/// Display a warning message
pub fn warning(message: &str) {
    println!("  {} {}", "⚠".bold().yellow(), message);
}

/// Display an error message
pub fn failure(message: &str) {
    eprintln!("  {} {}", "✗".bold().red(), message);
}

/// Display an info message
pub fn info(message: &str) {
    println!("  • {message}");
}

/// Check if a program resolves through PATH (or exists as given)
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand path: {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
