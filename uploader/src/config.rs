// Configuration management for the SPIFFS upload utility
//
// Values are layered: built-in defaults, then the JSON config file
// (XDG config directory or --config), then command-line overrides.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use spiffs_layout::{FlashRegion, ImageGeometry, format_hex, parse_address};
use std::path::{Path, PathBuf};

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_BAUD, DEFAULT_CHIP, DEFAULT_ESPTOOL,
    DEFAULT_IMAGE, DEFAULT_MKSPIFFS, DEFAULT_OFFSET, DEFAULT_PORT, DEFAULT_SIZE,
    DEFAULT_SOURCE_DIR,
};
use crate::utils::{expand_path, success};

/// Keys accepted by `config set`
pub const CONFIG_KEYS: &[&str] = &[
    "esptool",
    "mkspiffs",
    "chip",
    "port",
    "baud",
    "offset",
    "size",
    "source-dir",
    "image",
    "block-size",
    "page-size",
];

/// Uploader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UploaderConfig {
    /// Device programmer executable (name on PATH or full path)
    pub esptool: String,

    /// SPIFFS image builder executable (name on PATH or full path)
    pub mkspiffs: String,

    /// Chip identifier passed to `--chip`
    pub chip: String,

    /// Serial port of the device
    pub port: String,

    /// Serial baud rate
    pub baud: u32,

    /// Partition start address, hex (`0x510000`) or decimal
    pub offset: String,

    /// Partition size, hex (`0x1F0000`) or decimal
    pub size: String,

    /// Directory packed into the image
    pub source_dir: PathBuf,

    /// Temporary image file
    pub image: PathBuf,

    /// SPIFFS block size
    pub block_size: u32,

    /// SPIFFS page size
    pub page_size: u32,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        let geometry = ImageGeometry::default();
        Self {
            esptool: DEFAULT_ESPTOOL.to_string(),
            mkspiffs: DEFAULT_MKSPIFFS.to_string(),
            chip: DEFAULT_CHIP.to_string(),
            port: DEFAULT_PORT.to_string(),
            baud: DEFAULT_BAUD,
            offset: DEFAULT_OFFSET.to_string(),
            size: DEFAULT_SIZE.to_string(),
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            image: PathBuf::from(DEFAULT_IMAGE),
            block_size: geometry.block_size,
            page_size: geometry.page_size,
        }
    }
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub esptool: Option<String>,
    pub mkspiffs: Option<String>,
    pub chip: Option<String>,
    pub port: Option<String>,
    pub baud: Option<u32>,
    pub offset: Option<String>,
    pub size: Option<String>,
    pub source_dir: Option<PathBuf>,
    pub image: Option<PathBuf>,
}

/// Validated configuration with addresses resolved, ready for the workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashSettings {
    pub esptool: String,
    pub mkspiffs: String,
    pub chip: String,
    pub port: String,
    pub baud: u32,
    pub region: FlashRegion,
    pub geometry: ImageGeometry,
    pub source_dir: PathBuf,
    pub image: PathBuf,
}

impl UploaderConfig {
    /// Load configuration from `path`, or from the XDG location when `None`
    ///
    /// A missing file is not an error: the built-in defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            if path.is_some() {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
            log::debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }

        log::debug!("Loading config from {}", config_path.display());
        Self::load_from_file(&config_path)
    }

    /// Load configuration from a specific file path
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get the XDG-compliant configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory (XDG_CONFIG_HOME or ~/.config)")?;

        Ok(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Apply command-line overrides on top of the loaded values
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        let ConfigOverrides {
            esptool,
            mkspiffs,
            chip,
            port,
            baud,
            offset,
            size,
            source_dir,
            image,
        } = overrides;

        if let Some(v) = esptool {
            self.esptool = v;
        }
        if let Some(v) = mkspiffs {
            self.mkspiffs = v;
        }
        if let Some(v) = chip {
            self.chip = v;
        }
        if let Some(v) = port {
            self.port = v;
        }
        if let Some(v) = baud {
            self.baud = v;
        }
        if let Some(v) = offset {
            self.offset = v;
        }
        if let Some(v) = size {
            self.size = v;
        }
        if let Some(v) = source_dir {
            self.source_dir = v;
        }
        if let Some(v) = image {
            self.image = v;
        }
    }

    /// Set a single value by its kebab-case key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "esptool" => self.esptool = value.to_string(),
            "mkspiffs" => self.mkspiffs = value.to_string(),
            "chip" => self.chip = value.to_string(),
            "port" => self.port = value.to_string(),
            "baud" => self.baud = parse_number(key, value)?,
            "offset" => self.offset = value.to_string(),
            "size" => self.size = value.to_string(),
            "source-dir" => self.source_dir = PathBuf::from(value),
            "image" => self.image = PathBuf::from(value),
            "block-size" => self.block_size = parse_number(key, value)?,
            "page-size" => self.page_size = parse_number(key, value)?,
            _ => anyhow::bail!(
                "Unknown configuration key '{}'. Valid keys: {}",
                key,
                CONFIG_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Validate and resolve into settings the workflow can use directly
    pub fn resolve(&self) -> Result<FlashSettings> {
        if self.esptool.trim().is_empty() {
            anyhow::bail!("esptool path must not be empty");
        }
        if self.mkspiffs.trim().is_empty() {
            anyhow::bail!("mkspiffs path must not be empty");
        }
        if self.chip.trim().is_empty() {
            anyhow::bail!("Chip identifier must not be empty");
        }
        if self.port.trim().is_empty() {
            anyhow::bail!("Serial port must not be empty");
        }
        if self.baud == 0 {
            anyhow::bail!("Baud rate must be greater than zero");
        }
        if self.image.as_os_str().is_empty() {
            anyhow::bail!("Image path must not be empty");
        }

        let offset = parse_address(&self.offset).context("Invalid flash offset")?;
        let size = parse_address(&self.size).context("Invalid flash size")?;
        let region = FlashRegion::new(offset, size).context("Invalid flash region")?;

        let geometry = ImageGeometry {
            block_size: self.block_size,
            page_size: self.page_size,
        };
        geometry
            .validate_for(&region)
            .context("Invalid SPIFFS geometry")?;

        Ok(FlashSettings {
            esptool: self.esptool.clone(),
            mkspiffs: self.mkspiffs.clone(),
            chip: self.chip.clone(),
            port: self.port.clone(),
            baud: self.baud,
            region,
            geometry,
            source_dir: expand_path(&self.source_dir).context("Invalid source directory")?,
            image: expand_path(&self.image).context("Invalid image path")?,
        })
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {key}: '{value}' is not a number"))
}

// ============================================================================
// `config` subcommand
// ============================================================================

pub fn run_config_command(command: crate::ConfigCommands, path: Option<&Path>) -> Result<()> {
    match command {
        crate::ConfigCommands::Show => cmd_config_show(path),
        crate::ConfigCommands::Path => cmd_config_path(path),
        crate::ConfigCommands::Init { force } => cmd_config_init(path, force),
        crate::ConfigCommands::Set { key, value } => cmd_config_set(path, &key, &value),
    }
}

fn target_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p.to_path_buf()),
        None => UploaderConfig::config_path(),
    }
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = UploaderConfig::load(path)?;
    let config_path = target_path(path)?;

    println!("{}", "Current Configuration".bold());
    println!();
    let source = if config_path.exists() {
        config_path.display().to_string()
    } else {
        "built-in defaults".to_string()
    };
    println!("  {:<12} {}", "Source:".dimmed(), source);
    println!("  {:<12} {}", "esptool:", config.esptool);
    println!("  {:<12} {}", "mkspiffs:", config.mkspiffs);
    println!("  {:<12} {}", "chip:", config.chip);
    println!("  {:<12} {}", "port:", config.port);
    println!("  {:<12} {}", "baud:", config.baud);
    println!("  {:<12} {}", "offset:", config.offset);
    println!("  {:<12} {}", "size:", config.size);
    println!("  {:<12} {}", "source-dir:", config.source_dir.display());
    println!("  {:<12} {}", "image:", config.image.display());
    println!("  {:<12} {}", "block-size:", config.block_size);
    println!("  {:<12} {}", "page-size:", config.page_size);

    match config.resolve() {
        Ok(settings) => {
            println!();
            println!(
                "  Region {}..{} ({} bytes)",
                format_hex(settings.region.offset),
                format_hex(settings.region.end()),
                settings.region.capacity()
            );
        }
        Err(e) => {
            println!();
            println!("  {} {:#}", "Invalid:".red().bold(), e);
        }
    }

    Ok(())
}

fn cmd_config_path(path: Option<&Path>) -> Result<()> {
    println!("{}", target_path(path)?.display());
    Ok(())
}

fn cmd_config_init(path: Option<&Path>, force: bool) -> Result<()> {
    let config_path = target_path(path)?;
    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            config_path.display()
        );
    }

    UploaderConfig::default().save_to(&config_path)?;
    success(&format!("Wrote default configuration to {}", config_path.display()));
    Ok(())
}

fn cmd_config_set(path: Option<&Path>, key: &str, value: &str) -> Result<()> {
    let config_path = target_path(path)?;
    let mut config = if config_path.exists() {
        UploaderConfig::load_from_file(&config_path)?
    } else {
        UploaderConfig::default()
    };

    config.set(key, value)?;
    config
        .resolve()
        .with_context(|| format!("Refusing to save invalid value for {key}"))?;
    config.save_to(&config_path)?;

    success(&format!("Set {key} = {value}"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve_to_original_partition() {
        let settings = UploaderConfig::default().resolve().unwrap();
        assert_eq!(settings.chip, "esp32s3");
        assert_eq!(settings.baud, 921_600);
        assert_eq!(settings.region.offset, 0x51_0000);
        assert_eq!(settings.region.size, 0x1F_0000);
        assert_eq!(settings.geometry, ImageGeometry::default());
        assert_eq!(settings.source_dir, PathBuf::from("spiffs_data"));
        assert_eq!(settings.image, PathBuf::from("spiffs.bin"));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = UploaderConfig::default();
        config.apply(ConfigOverrides {
            port: Some("/dev/ttyACM1".to_string()),
            baud: Some(115_200),
            size: Some("0x100000".to_string()),
            ..Default::default()
        });

        assert_eq!(config.port, "/dev/ttyACM1");
        assert_eq!(config.baud, 115_200);
        assert_eq!(config.size, "0x100000");
        // Untouched values keep their previous setting
        assert_eq!(config.chip, "esp32s3");
        assert_eq!(config.offset, "0x510000");
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "port": "COM11", "baud": 460800 }"#).unwrap();

        let config = UploaderConfig::load(Some(&path)).unwrap();
        assert_eq!(config.port, "COM11");
        assert_eq!(config.baud, 460_800);
        assert_eq!(config.mkspiffs, "mkspiffs");
        assert_eq!(config.size, "0x1F0000");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = UploaderConfig::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = UploaderConfig::default();
        config.set("chip", "esp32").unwrap();
        config.set("source-dir", "data").unwrap();
        config.save_to(&path).unwrap();

        let loaded = UploaderConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_set_rejects_unknown_key_and_bad_numbers() {
        let mut config = UploaderConfig::default();
        let err = config.set("speed", "fast").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key 'speed'"));

        let err = config.set("baud", "fast").unwrap_err();
        assert!(err.to_string().contains("Invalid value for baud"));
    }

    #[test]
    fn test_resolve_rejects_invalid_values() {
        let mut config = UploaderConfig::default();
        config.offset = "0x510001".to_string();
        let err = config.resolve().unwrap_err();
        assert!(format!("{err:#}").contains("not aligned"));

        let mut config = UploaderConfig::default();
        config.size = "lots".to_string();
        let err = config.resolve().unwrap_err();
        assert!(format!("{err:#}").contains("Invalid flash size"));

        let mut config = UploaderConfig::default();
        config.baud = 0;
        assert!(config.resolve().is_err());

        let mut config = UploaderConfig::default();
        config.port = "  ".to_string();
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_resolve_rejects_unexpandable_paths() {
        let mut config = UploaderConfig::default();
        config.source_dir = PathBuf::from("$SPIFFS_UPLOAD_UNDEFINED_VAR/data");
        let err = config.resolve().unwrap_err();
        assert!(format!("{err:#}").starts_with("Invalid source directory: Failed to expand path"));

        let mut config = UploaderConfig::default();
        config.image = PathBuf::from("$SPIFFS_UPLOAD_UNDEFINED_VAR/spiffs.bin");
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        cmd_config_init(Some(&path), false).unwrap();
        assert!(path.exists());
        assert!(cmd_config_init(Some(&path), false).is_err());
        cmd_config_init(Some(&path), true).unwrap();
    }

    #[test]
    fn test_config_set_persists_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        cmd_config_set(Some(&path), "port", "/dev/ttyACM0").unwrap();
        let loaded = UploaderConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.port, "/dev/ttyACM0");

        // Invalid values are not written
        assert!(cmd_config_set(Some(&path), "size", "0x123").is_err());
        let loaded = UploaderConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.size, "0x1F0000");
    }
}
