//! Flasher: checksum-gated delegation to a device transport.

use std::sync::Arc;
use std::time::Duration;

use fwflash_core::{Artifact, IntegrityRecord};
use fwflash_transport::{DeviceTarget, DeviceTransport, FlashError, TransferReceipt, VerifySide};
use tracing::{error, info};

/// Default flash timeout (2 minutes).
pub const DEFAULT_FLASH_TIMEOUT_SECS: u64 = 120;

/// Sends a recorded artifact to a device. One attempt per call.
pub struct Flasher {
    transport: Arc<dyn DeviceTransport>,
    timeout: Duration,
}

impl Flasher {
    pub fn new(transport: Arc<dyn DeviceTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn transport_kind(&self) -> &'static str {
        self.transport.kind()
    }

    /// Flash the bytes captured in `record`.
    ///
    /// The image comes from the record, not from a second read of the file,
    /// and is re-hashed before the transport sees it.
    pub async fn flash(
        &self,
        artifact: &Artifact,
        record: &IntegrityRecord,
        device: &DeviceTarget,
    ) -> Result<TransferReceipt, FlashError> {
        if !record.describes(artifact.path()) {
            return Err(FlashError::RecordMismatch(format!(
                "record describes {}, artifact is {}",
                record.path,
                artifact.path().display()
            )));
        }

        let image = record
            .decode_content()
            .map_err(|e| FlashError::RecordMismatch(e.to_string()))?;
        if image.len() as u64 != artifact.size() {
            return Err(FlashError::RecordMismatch(format!(
                "record holds {} bytes, artifact has {}",
                image.len(),
                artifact.size()
            )));
        }
        fwflash_transport::verify_image(&image, &record.checksum, VerifySide::Sender)?;

        info!(
            transport = self.transport.kind(),
            device = %device,
            bytes = image.len(),
            checksum = %record.checksum.short(),
            "flashing"
        );
        let receipt = match tokio::time::timeout(
            self.timeout,
            self.transport.transfer(&image, &record.checksum, device),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                error!(
                    device = %device,
                    limit_ms = self.timeout.as_millis() as u64,
                    "flash timed out; device state unknown"
                );
                return Err(FlashError::Timeout {
                    limit_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        if receipt.checksum != record.checksum {
            return Err(FlashError::ChecksumMismatch {
                side: VerifySide::Receiver,
                expected: record.checksum.to_string(),
                actual: receipt.checksum.to_string(),
            });
        }
        Ok(receipt)
    }
}
