// Constants for the SPIFFS upload utility
//
// Built-in defaults for every configurable value. They describe the
// partition table this tool was first written for; anything device or
// machine specific can be overridden through the config file or flags.

// ============================================================================
// External Tools
// ============================================================================

/// Device programmer (erase_region / write_flash)
pub const DEFAULT_ESPTOOL: &str = "esptool";

/// SPIFFS image builder
pub const DEFAULT_MKSPIFFS: &str = "mkspiffs";

// ============================================================================
// Device Connection
// ============================================================================

/// Chip identifier passed to `--chip`
pub const DEFAULT_CHIP: &str = "esp32s3";

/// Serial port the device enumerates on
#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM3";

/// Serial port the device enumerates on
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Serial baud rate
pub const DEFAULT_BAUD: u32 = 921_600;

// ============================================================================
// Partition Layout
// ============================================================================

/// Start of the SPIFFS partition
pub const DEFAULT_OFFSET: &str = "0x510000";

/// Size of the SPIFFS partition (~1.93 MB)
pub const DEFAULT_SIZE: &str = "0x1F0000";

// ============================================================================
// Local Files
// ============================================================================

/// Directory whose contents become the filesystem image
pub const DEFAULT_SOURCE_DIR: &str = "spiffs_data";

/// Temporary image written by the builder and consumed by the programmer
pub const DEFAULT_IMAGE: &str = "spiffs.bin";

/// Config file name inside the XDG config directory
pub const CONFIG_DIR_NAME: &str = "spiffs-upload";
pub const CONFIG_FILE_NAME: &str = "config.json";

// ============================================================================
// Terminal Colors
// ============================================================================

/// Accent color for title bars and step indicators
/// Uses (0, 175, 255) so it lands exactly on xterm-256 color 39
pub const ACCENT: (u8, u8, u8) = (0, 175, 255);

/// Nearest xterm-256 color cube index for an RGB triple
///
/// Cube levels are 0, 95, 135, 175, 215, 255; index = 16 + 36r + 6g + b.
const fn rgb_to_xterm256(r: u8, g: u8, b: u8) -> u8 {
    const fn nearest_idx(val: u8) -> u8 {
        if val < 48 {
            0
        } else if val < 115 {
            1
        } else if val < 155 {
            2
        } else if val < 195 {
            3
        } else if val < 235 {
            4
        } else {
            5
        }
    }
    16 + 36 * nearest_idx(r) + 6 * nearest_idx(g) + nearest_idx(b)
}

/// Accent color as an xterm-256 code for indicatif templates
pub const ACCENT_256: u8 = rgb_to_xterm256(ACCENT.0, ACCENT.1, ACCENT.2);
