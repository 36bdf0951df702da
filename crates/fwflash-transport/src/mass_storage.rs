//! Drag-and-drop bootloaders that enumerate as a USB drive (UF2, DAPLink).
//!
//! The image is written to a temporary file on the mounted volume, synced,
//! read back and checked, and only then renamed to its final name. The
//! bootloader starts programming on the rename, so a copy that does not
//! verify is discarded before the device ever sees it.
//!
//! These bootloaders program whatever file lands on the volume, so ELF
//! output is refused; flash a `.uf2` or raw `.bin` conversion instead.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use fwflash_core::Checksum;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{FlashError, FlashResult, VerifySide};
use crate::transport::{
    require_raw_image, verify_image, DeviceTarget, DeviceTransport, TransferReceipt,
};

/// File name used on the volume when none is configured.
pub const DEFAULT_IMAGE_FILE_NAME: &str = "firmware.bin";

/// Copies the image onto a mounted bootloader volume.
#[derive(Debug, Clone)]
pub struct MassStorageTransport {
    file_name: String,
}

impl Default for MassStorageTransport {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_FILE_NAME)
    }
}

impl MassStorageTransport {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

#[async_trait]
impl DeviceTransport for MassStorageTransport {
    fn kind(&self) -> &'static str {
        "mass_storage"
    }

    async fn transfer(
        &self,
        image: &[u8],
        checksum: &Checksum,
        device: &DeviceTarget,
    ) -> FlashResult<TransferReceipt> {
        verify_image(image, checksum, VerifySide::Sender)?;
        require_raw_image(image, self.kind())?;

        let mount = PathBuf::from(&device.address);
        if !mount.is_dir() {
            return Err(FlashError::Unreachable {
                device: device.address.clone(),
                reason: "mount point is not a directory".to_string(),
            });
        }
        if !is_plain_file_name(&self.file_name) {
            return Err(FlashError::InvalidTarget(format!(
                "image file name {:?} must be a single path component",
                self.file_name
            )));
        }

        let start = Instant::now();
        let destination = mount.join(&self.file_name);
        let bytes = image.to_vec();
        let expected = checksum.clone();

        let written = tokio::task::spawn_blocking(move || {
            copy_verified(&mount, &destination, &bytes, &expected)
        })
        .await
        .map_err(|e| FlashError::Io(std::io::Error::other(e)))??;

        let receipt = TransferReceipt {
            device: device.address.clone(),
            bytes_written: written,
            checksum: checksum.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            device = %device,
            bytes = receipt.bytes_written,
            duration_ms = receipt.duration_ms,
            "image committed to mass-storage volume"
        );
        Ok(receipt)
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn copy_verified(
    mount: &Path,
    destination: &Path,
    image: &[u8],
    expected: &Checksum,
) -> FlashResult<u64> {
    let mut tmp = NamedTempFile::new_in(mount)?;
    tmp.write_all(image)?;
    tmp.as_file().sync_all()?;

    let landed = fs::read(tmp.path())?;
    debug!(staged = %tmp.path().display(), bytes = landed.len(), "read back staged image");
    verify_image(&landed, expected, VerifySide::Receiver)?;

    tmp.persist(destination).map_err(|e| FlashError::Io(e.error))?;
    Ok(landed.len() as u64)
}
