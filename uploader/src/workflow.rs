// Erase → build → flash workflow
//
// Each step runs one external tool. The first failing step stops the run;
// the temporary image is removed on every exit path by `ImageGuard`.

use colored::Colorize;
use spiffs_layout::{format_bytes, format_hex};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::FlashSettings;
use crate::display::StepDisplay;
use crate::runner::{CommandRunner, ToolCommand};
use crate::scanner::{self, ScanReport};
use crate::tools::{build_image_command, erase_region_command, write_flash_command};
use crate::utils::{command_exists, failure, info, print_step, success, warning};

pub const TOTAL_STEPS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Erase,
    Build,
    Flash,
}

impl Step {
    fn number(self) -> usize {
        match self {
            Self::Erase => 1,
            Self::Build => 2,
            Self::Flash => 3,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Erase => "Erasing SPIFFS region",
            Self::Build => "Building SPIFFS image",
            Self::Flash => "Flashing SPIFFS image",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{step} failed ({})", describe_exit(*.exit_code))]
    StepFailed { step: Step, exit_code: Option<i32> },

    #[error("Failed to scan source directory: {0:#}")]
    Scan(anyhow::Error),
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "did not run to completion".to_string(),
    }
}

/// Removes the temporary image when dropped, whatever happened before
pub struct ImageGuard {
    path: PathBuf,
}

impl ImageGuard {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl Drop for ImageGuard {
    fn drop(&mut self) {
        if !self.path.exists() {
            log::debug!("No temporary image at {}", self.path.display());
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => info(&format!("Temporary file {} removed", self.path.display())),
            Err(e) => warning(&format!(
                "Failed to remove temporary file {}: {e}",
                self.path.display()
            )),
        }
    }
}

/// Warn about tools that cannot be found before touching the device
pub fn check_tools(settings: &FlashSettings) {
    for tool in [&settings.esptool, &settings.mkspiffs] {
        if command_exists(tool) {
            log::debug!("Found {tool}");
        } else {
            warning(&format!("'{tool}' not found on PATH; the step using it will fail"));
        }
    }
}

pub struct Workflow<'a> {
    settings: &'a FlashSettings,
    runner: &'a mut dyn CommandRunner,
    display: StepDisplay,
}

impl<'a> Workflow<'a> {
    pub fn new(
        settings: &'a FlashSettings,
        runner: &'a mut dyn CommandRunner,
        display: StepDisplay,
    ) -> Self {
        Self {
            settings,
            runner,
            display,
        }
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// The image file does not exist when this returns.
    pub fn run(&mut self) -> Result<ScanReport, WorkflowError> {
        let _guard = ImageGuard::new(&self.settings.image);

        let result = self.run_steps();
        self.display.finish();
        result
    }

    fn run_steps(&mut self) -> Result<ScanReport, WorkflowError> {
        let region = self.settings.region;

        self.begin(Step::Erase);
        self.display.suspend(|| {
            info(&format!(
                "Erasing {} bytes at {} on {}",
                format_hex(region.size),
                format_hex(region.offset),
                self.settings.port
            ));
        });
        self.execute(Step::Erase, &erase_region_command(self.settings))?;

        self.begin(Step::Build);
        let report = self.display.suspend(|| {
            let report = scanner::scan_directory(&self.settings.source_dir)
                .map_err(WorkflowError::Scan)?;
            info(&format!("Contents of {}:", self.settings.source_dir.display()));
            scanner::print_entries(&report);
            scanner::print_summary(&report, &region);
            println!();
            Ok::<_, WorkflowError>(report)
        })?;
        self.execute(Step::Build, &build_image_command(self.settings))?;

        self.begin(Step::Flash);
        self.execute(Step::Flash, &write_flash_command(self.settings))?;

        Ok(report)
    }

    fn begin(&self, step: Step) {
        self.display.update(step.number(), &step.to_string());
        self.display
            .suspend(|| print_step(step.number(), TOTAL_STEPS, &step.to_string()));
    }

    fn execute(&mut self, step: Step, command: &ToolCommand) -> Result<(), WorkflowError> {
        let runner = &mut *self.runner;
        let outcome = self.display.suspend(|| runner.run(command));

        if outcome.success() {
            self.display.suspend(|| success(&format!("{step} done")));
            return Ok(());
        }

        let err = WorkflowError::StepFailed {
            step,
            exit_code: outcome.exit_code,
        };
        self.display.suspend(|| {
            if outcome.exit_code.is_none() && !outcome.stderr.is_empty() {
                failure(outcome.stderr.trim());
            }
            failure(&format!("{err}: {command}"));
        });
        Err(err)
    }
}

/// Print the closing message after a successful run
pub fn print_completion(report: &ScanReport, settings: &FlashSettings) {
    println!();
    println!("{}", "✓ SPIFFS flashed successfully".green().bold());
    println!(
        "  Partition: {} at {}",
        format_bytes(settings.region.capacity()),
        format_hex(settings.region.offset)
    );
    println!(
        "  Free space: {}",
        format_bytes(report.free_bytes(&settings.region))
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploaderConfig;
    use crate::runner::CommandOutcome;
    use std::collections::VecDeque;

    /// Returns scripted exit codes in order and records every call.
    /// Every mkspiffs call writes the image file, so a failed build leaves a partial one.
    struct ScriptedRunner {
        exit_codes: VecDeque<Option<i32>>,
        calls: Vec<ToolCommand>,
        image: PathBuf,
        image_seen_by_flash: bool,
    }

    impl ScriptedRunner {
        fn new(image: &Path, exit_codes: &[Option<i32>]) -> Self {
            Self {
                exit_codes: exit_codes.iter().copied().collect(),
                calls: Vec::new(),
                image: image.to_path_buf(),
                image_seen_by_flash: false,
            }
        }

        fn subcommands(&self) -> Vec<String> {
            self.calls
                .iter()
                .map(|c| {
                    if c.program == "mkspiffs" {
                        "mkspiffs".to_string()
                    } else {
                        c.args[6].clone()
                    }
                })
                .collect()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&mut self, command: &ToolCommand) -> CommandOutcome {
            self.calls.push(command.clone());
            let exit_code = self.exit_codes.pop_front().unwrap_or(Some(0));

            if command.args.iter().any(|a| a == "write_flash") {
                self.image_seen_by_flash = self.image.exists();
            }
            if command.program == "mkspiffs" {
                std::fs::write(&self.image, b"spiffs").unwrap();
            }

            CommandOutcome {
                exit_code,
                ..CommandOutcome::default()
            }
        }
    }

    fn settings(dir: &Path) -> FlashSettings {
        let mut config = UploaderConfig::default();
        config.source_dir = dir.join("spiffs_data");
        config.image = dir.join("spiffs.bin");
        config.resolve().unwrap()
    }

    fn run(
        settings: &FlashSettings,
        runner: &mut ScriptedRunner,
    ) -> Result<ScanReport, WorkflowError> {
        Workflow::new(settings, runner, StepDisplay::hidden()).run()
    }

    #[test]
    fn test_success_runs_all_steps_in_order_and_removes_image() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        std::fs::create_dir_all(&settings.source_dir).unwrap();
        std::fs::write(settings.source_dir.join("a.txt"), vec![1u8; 100]).unwrap();
        std::fs::write(settings.source_dir.join("b.txt"), vec![2u8; 200]).unwrap();

        let mut runner = ScriptedRunner::new(&settings.image, &[]);
        let report = run(&settings, &mut runner).unwrap();

        assert_eq!(report.total_bytes, 300);
        assert_eq!(report.file_count, 2);
        assert_eq!(
            runner.subcommands(),
            ["erase_region", "mkspiffs", "write_flash"]
        );
        assert_eq!(runner.calls[0], erase_region_command(&settings));
        assert_eq!(runner.calls[1], build_image_command(&settings));
        assert_eq!(runner.calls[2], write_flash_command(&settings));
        assert!(runner.image_seen_by_flash);
        assert!(!settings.image.exists());
    }

    #[test]
    fn test_erase_failure_skips_build_and_flash() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());

        let mut runner = ScriptedRunner::new(&settings.image, &[Some(2)]);
        let err = run(&settings, &mut runner).unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::StepFailed {
                step: Step::Erase,
                exit_code: Some(2)
            }
        ));
        assert_eq!(runner.subcommands(), ["erase_region"]);
        assert!(!settings.image.exists());
        // Scanning belongs to the build step, so the directory is untouched
        assert!(!settings.source_dir.exists());
    }

    #[test]
    fn test_build_failure_skips_flash_and_removes_partial_image() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());

        let mut runner = ScriptedRunner::new(&settings.image, &[Some(0), Some(1)]);
        let err = run(&settings, &mut runner).unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::StepFailed {
                step: Step::Build,
                ..
            }
        ));
        assert_eq!(runner.subcommands(), ["erase_region", "mkspiffs"]);
        assert!(!settings.image.exists());
        // Missing source directory was created during the build step
        assert!(settings.source_dir.is_dir());
    }

    #[test]
    fn test_flash_failure_still_removes_image() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());

        let mut runner = ScriptedRunner::new(&settings.image, &[Some(0), Some(0), None]);
        let err = run(&settings, &mut runner).unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::StepFailed {
                step: Step::Flash,
                exit_code: None
            }
        ));
        assert!(runner.image_seen_by_flash);
        assert!(!settings.image.exists());
    }

    #[test]
    fn test_stale_image_is_removed_even_when_erase_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        std::fs::write(&settings.image, b"stale").unwrap();

        let mut runner = ScriptedRunner::new(&settings.image, &[Some(1)]);
        assert!(run(&settings, &mut runner).is_err());
        assert!(!settings.image.exists());
    }

    #[test]
    fn test_guard_removes_file_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("spiffs.bin");
        std::fs::write(&path, b"x").unwrap();
        {
            let _guard = ImageGuard::new(&path);
        }
        assert!(!path.exists());

        // Nothing to remove is fine
        drop(ImageGuard::new(&path));
    }

    #[test]
    fn test_error_messages() {
        let err = WorkflowError::StepFailed {
            step: Step::Build,
            exit_code: Some(1),
        };
        assert_eq!(err.to_string(), "Building SPIFFS image failed (exit code 1)");

        let err = WorkflowError::StepFailed {
            step: Step::Flash,
            exit_code: None,
        };
        assert_eq!(
            err.to_string(),
            "Flashing SPIFFS image failed (did not run to completion)"
        );
    }
}
