//! The capability every flashing channel provides.

use std::fmt;

use async_trait::async_trait;
use fwflash_core::Checksum;
use serde::{Deserialize, Serialize};

use crate::error::{FlashError, FlashResult, VerifySide};

/// Where the image goes.
///
/// `address` is transport specific: a mount point for mass-storage
/// bootloaders, a serial port for bootloader tools, a probe selector for
/// debug probes, `host:port` for network programmers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTarget {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chip: Option<String>,
}

impl DeviceTarget {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            chip: None,
        }
    }

    pub fn with_chip(mut self, chip: impl Into<String>) -> Self {
        self.chip = Some(chip.into());
        self
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.chip {
            Some(chip) => write!(f, "{} ({chip})", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// What a completed transfer reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub device: String,
    pub bytes_written: u64,
    /// Checksum confirmed by the receiving side.
    pub checksum: Checksum,
    pub duration_ms: u64,
}

/// A flashing channel.
///
/// Implementations must check `checksum` against the bytes that actually
/// reached the receiving side before committing the write, and must not
/// retry on their own.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Short name used in logs (`serial`, `network`, ...).
    fn kind(&self) -> &'static str;

    async fn transfer(
        &self,
        image: &[u8],
        checksum: &Checksum,
        device: &DeviceTarget,
    ) -> FlashResult<TransferReceipt>;
}

/// Confirm `image` hashes to `expected`.
pub fn verify_image(image: &[u8], expected: &Checksum, side: VerifySide) -> FlashResult<()> {
    if image.is_empty() {
        return Err(FlashError::EmptyImage);
    }
    let actual = Checksum::compute(image);
    if &actual != expected {
        return Err(FlashError::ChecksumMismatch {
            side,
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Leading bytes of an ELF container, which is what cargo links.
pub const ELF_MAGIC: &[u8] = b"\x7fELF";

pub fn is_elf(image: &[u8]) -> bool {
    image.starts_with(ELF_MAGIC)
}

/// Refuse an ELF container on a channel that writes bytes verbatim.
///
/// Raw-image channels would place the ELF headers at the flash base; the
/// image has to be converted (`objcopy -O binary`, `elf2uf2`) first.
pub fn require_raw_image(image: &[u8], transport: &str) -> FlashResult<()> {
    if is_elf(image) {
        return Err(FlashError::InvalidTarget(format!(
            "{transport} transport writes raw images but the artifact is an ELF file; \
             use the probe transport or flash a converted image"
        )));
    }
    Ok(())
}
