use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use spiffs_layout::format_hex;
use std::path::{Path, PathBuf};

use config::{ConfigOverrides, FlashSettings, UploaderConfig};
use display::StepDisplay;
use runner::{CommandRunner, DryRunRunner, OutputMode, SystemRunner};
use utils::{info, print_title_bar};
use workflow::Workflow;

mod config;
mod constants;
mod display;
mod runner;
mod scanner;
mod tools;
mod utils;
mod workflow;

/// Erase, rebuild and flash the SPIFFS partition of an ESP32 over serial
///
/// Without a subcommand the full erase → build → flash sequence runs.
#[derive(Parser, Debug)]
#[command(name = "spiffs-upload")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    flash: FlashArgs,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Display detailed diagnostic information
    #[arg(long, short, global = true)]
    verbose: bool,
}

/// Values that override the config file for this run
#[derive(Args, Debug, Default)]
struct FlashArgs {
    /// Serial port of the device (e.g. /dev/ttyUSB0, COM11)
    #[arg(long, short, global = true)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long, short, global = true)]
    baud: Option<u32>,

    /// Chip identifier passed to esptool
    #[arg(long, global = true)]
    chip: Option<String>,

    /// SPIFFS partition offset (hex with 0x prefix, or decimal)
    #[arg(long, global = true)]
    offset: Option<String>,

    /// SPIFFS partition size (hex with 0x prefix, or decimal)
    #[arg(long, global = true)]
    size: Option<String>,

    /// Directory packed into the image
    #[arg(long, short, global = true, value_name = "DIR")]
    source_dir: Option<PathBuf>,

    /// Temporary image file
    #[arg(long, global = true, value_name = "FILE")]
    image: Option<PathBuf>,

    /// Path to esptool
    #[arg(long, global = true, value_name = "PATH")]
    esptool: Option<String>,

    /// Path to mkspiffs
    #[arg(long, global = true, value_name = "PATH")]
    mkspiffs: Option<String>,

    /// Print the tool invocations without running them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Hide tool output unless a step fails
    #[arg(long, short, global = true)]
    quiet: bool,
}

impl FlashArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            esptool: self.esptool.clone(),
            mkspiffs: self.mkspiffs.clone(),
            chip: self.chip.clone(),
            port: self.port.clone(),
            baud: self.baud,
            offset: self.offset.clone(),
            size: self.size.clone(),
            source_dir: self.source_dir.clone(),
            image: self.image.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Erase the region, build the image and flash it (the default)
    Flash,
    /// Report source directory usage against the partition without touching the device
    Scan,
    /// Manage configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Print shell completion script to stdout
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Display the effective configuration
    Show,
    /// Show configuration file path
    Path,
    /// Write a config file containing the defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Set a configuration value
    Set {
        /// Configuration key (esptool, mkspiffs, chip, port, baud, offset, size,
        /// source-dir, image, block-size, page-size)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let Cli {
        command,
        flash,
        config: config_file,
        verbose,
    } = Cli::parse();

    let log_level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let config_path = config_file.as_deref();

    match command {
        None | Some(Commands::Flash) => {
            let settings = load_settings(config_path, &flash)?;
            run_flash(&settings, &flash)
        }
        Some(Commands::Scan) => {
            let settings = load_settings(config_path, &flash)?;
            run_scan(&settings)
        }
        Some(Commands::Config { command }) => config::run_config_command(command, config_path),
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "spiffs-upload",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

fn load_settings(config_path: Option<&Path>, args: &FlashArgs) -> Result<FlashSettings> {
    let mut config = UploaderConfig::load(config_path)?;
    config.apply(args.overrides());
    log::debug!("Effective configuration: {config:?}");
    config.resolve()
}

fn print_target(settings: &FlashSettings) {
    info(&format!(
        "Device: {} on {} @ {} baud",
        settings.chip, settings.port, settings.baud
    ));
    info(&format!(
        "Region: {} + {}",
        format_hex(settings.region.offset),
        format_hex(settings.region.size)
    ));
    info(&format!("Source: {}", settings.source_dir.display()));
}

fn run_flash(settings: &FlashSettings, args: &FlashArgs) -> Result<()> {
    print_title_bar("🚀 SPIFFS Upload");
    print_target(settings);

    if args.dry_run {
        println!();
        println!(
            "{}",
            "Running in DRY-RUN mode - the device will not be touched"
                .yellow()
                .bold()
        );
    } else {
        workflow::check_tools(settings);
    }

    let mut runner: Box<dyn CommandRunner> = if args.dry_run {
        Box::new(DryRunRunner)
    } else if args.quiet {
        Box::new(SystemRunner::new(OutputMode::Capture))
    } else {
        Box::new(SystemRunner::new(OutputMode::Inherit))
    };

    let display = StepDisplay::new(workflow::TOTAL_STEPS);
    let report = Workflow::new(settings, runner.as_mut(), display).run()?;
    workflow::print_completion(&report, settings);

    Ok(())
}

fn run_scan(settings: &FlashSettings) -> Result<()> {
    print_title_bar("📊 SPIFFS Usage");
    print_target(settings);
    println!();

    let report = scanner::scan_directory(&settings.source_dir)?;
    scanner::print_entries(&report);
    scanner::print_summary(&report, &settings.region);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_arguments_means_flash_with_defaults() {
        let cli = Cli::try_parse_from(["spiffs-upload"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.flash.dry_run);
        assert!(cli.flash.port.is_none());
    }

    #[test]
    fn test_flags_work_before_and_after_subcommand() {
        let cli = Cli::try_parse_from(["spiffs-upload", "--port", "COM11", "scan"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Scan)));
        assert_eq!(cli.flash.port.as_deref(), Some("COM11"));

        let cli = Cli::try_parse_from([
            "spiffs-upload",
            "flash",
            "--offset",
            "0x300000",
            "--dry-run",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Flash)));
        assert!(cli.flash.dry_run);

        let overrides = cli.flash.overrides();
        assert_eq!(overrides.offset.as_deref(), Some("0x300000"));
        assert!(overrides.size.is_none());
    }

    #[test]
    fn test_config_set_parses() {
        let cli = Cli::try_parse_from([
            "spiffs-upload",
            "config",
            "set",
            "port",
            "/dev/ttyACM0",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Config {
                command: ConfigCommands::Set { key, value },
            }) => {
                assert_eq!(key, "port");
                assert_eq!(value, "/dev/ttyACM0");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
