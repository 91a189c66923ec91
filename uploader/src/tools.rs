// Command lines for the external image builder and device programmer

use spiffs_layout::format_hex;

use crate::config::FlashSettings;
use crate::runner::ToolCommand;

/// Arguments shared by every esptool invocation
fn esptool_base(settings: &FlashSettings) -> Vec<String> {
    vec![
        "--chip".to_string(),
        settings.chip.clone(),
        "--port".to_string(),
        settings.port.clone(),
        "--baud".to_string(),
        settings.baud.to_string(),
    ]
}

/// `esptool ... erase_region <offset> <size>`
pub fn erase_region_command(settings: &FlashSettings) -> ToolCommand {
    let mut args = esptool_base(settings);
    args.extend([
        "erase_region".to_string(),
        format_hex(settings.region.offset),
        format_hex(settings.region.size),
    ]);
    ToolCommand::new(&settings.esptool, args)
}

/// `mkspiffs -c <dir> -b <block> -p <page> -s <size> <image>`
pub fn build_image_command(settings: &FlashSettings) -> ToolCommand {
    ToolCommand::new(
        &settings.mkspiffs,
        [
            "-c".to_string(),
            settings.source_dir.display().to_string(),
            "-b".to_string(),
            settings.geometry.block_size.to_string(),
            "-p".to_string(),
            settings.geometry.page_size.to_string(),
            "-s".to_string(),
            format_hex(settings.region.size),
            settings.image.display().to_string(),
        ],
    )
}

/// `esptool ... write_flash <offset> <image>`
pub fn write_flash_command(settings: &FlashSettings) -> ToolCommand {
    let mut args = esptool_base(settings);
    args.extend([
        "write_flash".to_string(),
        format_hex(settings.region.offset),
        settings.image.display().to_string(),
    ]);
    ToolCommand::new(&settings.esptool, args)
}
