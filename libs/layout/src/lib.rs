use core::fmt;

/// Flash erase granularity; `erase_region` rejects ranges not aligned to it
pub const SECTOR_SIZE: u32 = 4096;

/// Default SPIFFS logical block size passed to the image builder (`-b`)
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Default SPIFFS logical page size passed to the image builder (`-p`)
pub const DEFAULT_PAGE_SIZE: u32 = 256;

/// Device address range reserved for the filesystem image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashRegion {
    pub offset: u32,
    pub size: u32,
}

/// Error returned when a flash region or image geometry is unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    ZeroSize,
    MisalignedOffset { offset: u32 },
    MisalignedSize { size: u32 },
    AddressOverflow { offset: u32, size: u32 },
    PageExceedsBlock { block_size: u32, page_size: u32 },
    BlockNotPageMultiple { block_size: u32, page_size: u32 },
    SizeNotBlockMultiple { size: u32, block_size: u32 },
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroSize => write!(f, "Flash region size must be greater than zero"),
            Self::MisalignedOffset { offset } => write!(
                f,
                "Flash offset {} is not aligned to the {} byte sector size",
                format_hex(*offset),
                SECTOR_SIZE
            ),
            Self::MisalignedSize { size } => write!(
                f,
                "Flash region size {} is not a multiple of the {} byte sector size",
                format_hex(*size),
                SECTOR_SIZE
            ),
            Self::AddressOverflow { offset, size } => write!(
                f,
                "Flash region {}+{} extends past the 32-bit address space",
                format_hex(*offset),
                format_hex(*size)
            ),
            Self::PageExceedsBlock {
                block_size,
                page_size,
            } => write!(
                f,
                "Page size {page_size} is larger than block size {block_size}"
            ),
            Self::BlockNotPageMultiple {
                block_size,
                page_size,
            } => write!(
                f,
                "Block size {block_size} is not a multiple of page size {page_size}"
            ),
            Self::SizeNotBlockMultiple { size, block_size } => write!(
                f,
                "Flash region size {} is not a multiple of block size {}",
                format_hex(*size),
                block_size
            ),
        }
    }
}

impl std::error::Error for RegionError {}

/// Error returned when an address or size string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddressError {
    pub input: String,
}

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid address '{}': expected 0x-prefixed hex or decimal",
            self.input
        )
    }
}

impl std::error::Error for ParseAddressError {}

impl FlashRegion {
    /// Build a region, checking sector alignment and address overflow.
    pub fn new(offset: u32, size: u32) -> Result<Self, RegionError> {
        if size == 0 {
            return Err(RegionError::ZeroSize);
        }
        if offset % SECTOR_SIZE != 0 {
            return Err(RegionError::MisalignedOffset { offset });
        }
        if size % SECTOR_SIZE != 0 {
            return Err(RegionError::MisalignedSize { size });
        }
        if offset.checked_add(size).is_none() {
            return Err(RegionError::AddressOverflow { offset, size });
        }
        Ok(Self { offset, size })
    }

    /// Region capacity in bytes
    pub fn capacity(&self) -> u64 {
        u64::from(self.size)
    }

    /// First address past the region
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }
}

/// SPIFFS builder parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageGeometry {
    pub block_size: u32,
    pub page_size: u32,
}

impl Default for ImageGeometry {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ImageGeometry {
    /// Check that the geometry can tile the given region.
    pub fn validate_for(&self, region: &FlashRegion) -> Result<(), RegionError> {
        let Self {
            block_size,
            page_size,
        } = *self;

        if page_size == 0 || page_size > block_size {
            return Err(RegionError::PageExceedsBlock {
                block_size,
                page_size,
            });
        }
        if block_size % page_size != 0 {
            return Err(RegionError::BlockNotPageMultiple {
                block_size,
                page_size,
            });
        }
        if region.size % block_size != 0 {
            return Err(RegionError::SizeNotBlockMultiple {
                size: region.size,
                block_size,
            });
        }
        Ok(())
    }
}

/// Parse `0x`-prefixed hexadecimal or plain decimal, allowing `_` separators.
pub fn parse_address(text: &str) -> Result<u32, ParseAddressError> {
    let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => cleaned.parse::<u32>(),
    };
    parsed.map_err(|_| ParseAddressError {
        input: text.to_string(),
    })
}

/// Format an address the way the flashing tools expect it: `0x1F0000`
pub fn format_hex(value: u32) -> String {
    format!("{value:#X}")
}

/// Percentage of `capacity` occupied by `total_bytes`.
///
/// Returns 0.0 for a zero capacity instead of NaN or infinity.
#[expect(
    clippy::cast_precision_loss,
    reason = "flash regions are far below 2^52 bytes"
)]
pub fn usage_percent(total_bytes: u64, capacity: u64) -> f64 {
    if capacity == 0 {
        return 0.0;
    }
    (total_bytes as f64 / capacity as f64) * 100.0
}

/// Format bytes as a human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        let (whole, frac) = div_with_tenths(bytes, GB);
        format!("{whole}.{frac} GB")
    } else if bytes >= MB {
        let (whole, frac) = div_with_tenths(bytes, MB);
        format!("{whole}.{frac} MB")
    } else if bytes >= KB {
        let (whole, frac) = div_with_tenths(bytes, KB);
        format!("{whole}.{frac} KB")
    } else {
        format!("{bytes} B")
    }
}

/// Divide with one decimal place of precision using integer arithmetic
fn div_with_tenths(value: u64, divisor: u64) -> (u64, u64) {
    let whole = value / divisor;
    let remainder = value % divisor;
    let tenths = (remainder * 10 + divisor / 2) / divisor;
    (whole, tenths.min(9))
}
