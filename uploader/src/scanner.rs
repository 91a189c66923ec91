// Source directory scanner
//
// Sums the size of every regular file under the SPIFFS source directory so
// the user can see how full the partition will be before the image is built.

use anyhow::{Context, Result};
use colored::Colorize;
use spiffs_layout::{FlashRegion, format_bytes, usage_percent};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::utils::{info, warning};

/// One file found under the source directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Path relative to the scanned directory
    pub path: PathBuf,
    pub size: u64,
}

/// Totals for a scanned directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub total_bytes: u64,
    pub file_count: usize,
    pub entries: Vec<ScanEntry>,
}

impl ScanReport {
    /// Percentage of `region` the files would occupy
    pub fn usage_percent(&self, region: &FlashRegion) -> f64 {
        usage_percent(self.total_bytes, region.capacity())
    }

    /// Bytes left in `region`, zero when over capacity
    pub fn free_bytes(&self, region: &FlashRegion) -> u64 {
        region.capacity().saturating_sub(self.total_bytes)
    }

    pub fn exceeds(&self, region: &FlashRegion) -> bool {
        self.total_bytes > region.capacity()
    }
}

/// Walk `dir` and total the sizes of all regular files.
///
/// A missing directory is created and reported as empty. A symlink counts
/// with the size of the file it points to; links to directories and broken
/// links are skipped. Entries come back sorted by path.
pub fn scan_directory(dir: &Path) -> Result<ScanReport> {
    if !dir.exists() {
        info(&format!("Directory {} not found, creating it", dir.display()));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        return Ok(ScanReport::default());
    }

    let mut report = ScanReport::default();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("Failed to read directory: {}", dir.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }

        // Follows symlinks, so a linked file reports its target's size
        let metadata = match std::fs::metadata(entry.path()) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warning(&format!("Skipping broken link {}", entry.path().display()));
                continue;
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to stat {}", entry.path().display()));
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let size = metadata.len();
        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or_else(|_| entry.path())
            .to_path_buf();

        log::debug!("{}: {} bytes", relative.display(), size);
        report.total_bytes += size;
        report.file_count += 1;
        report.entries.push(ScanEntry {
            path: relative,
            size,
        });
    }

    Ok(report)
}

/// Print each scanned file with its size
pub fn print_entries(report: &ScanReport) {
    if report.entries.is_empty() {
        info("No files found");
        return;
    }
    for entry in &report.entries {
        println!("    {}: {} bytes", entry.path.display(), entry.size);
    }
}

/// Print the usage summary against the flash region
pub fn print_summary(report: &ScanReport, region: &FlashRegion) {
    let pct = report.usage_percent(region);

    println!();
    println!("  {}", "Summary".bold());
    println!("    Files:       {}", report.file_count);
    println!(
        "    Total size:  {} bytes ({})",
        report.total_bytes,
        format_bytes(report.total_bytes)
    );
    println!(
        "    SPIFFS size: {} bytes ({})",
        region.capacity(),
        format_bytes(region.capacity())
    );
    println!("    Used:        {pct:.2}%");
    println!(
        "    Free:        {}",
        format_bytes(report.free_bytes(region))
    );

    if report.exceeds(region) {
        warning(&format!(
            "Files exceed the SPIFFS partition by {} bytes; the image build will likely fail",
            report.total_bytes - region.capacity()
        ));
    }
}
