//! In-memory transport (testing only)
//!
//! `MemoryTransport` satisfies the `DeviceTransport` contract without any
//! hardware: it keeps every committed image and can be scripted to reject,
//! corrupt in transit, or stall.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fwflash_core::Checksum;

use crate::error::{FlashError, FlashResult, VerifySide};
use crate::transport::{verify_image, DeviceTarget, DeviceTransport, TransferReceipt};

/// One image the fake accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedImage {
    pub device: DeviceTarget,
    pub image: Vec<u8>,
    pub checksum: Checksum,
}

#[derive(Debug, Clone, Default)]
enum Behavior {
    #[default]
    Accept,
    Reject(String),
    /// Flip one byte between sender and receiver.
    Corrupt,
    Stall(Duration),
}

/// Recording fake for `DeviceTransport`.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    behavior: Behavior,
    calls: Mutex<usize>,
    committed: Mutex<Vec<CommittedImage>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every transfer with `reason`.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Reject(reason.into()),
            ..Self::default()
        }
    }

    /// Damage the image in transit so receiver-side verification fails.
    pub fn corrupting() -> Self {
        Self {
            behavior: Behavior::Corrupt,
            ..Self::default()
        }
    }

    /// Sleep for `delay` before answering.
    pub fn stalling(delay: Duration) -> Self {
        Self {
            behavior: Behavior::Stall(delay),
            ..Self::default()
        }
    }

    /// Number of times `transfer` was invoked.
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    /// Images that passed verification and were committed.
    pub fn committed(&self) -> Vec<CommittedImage> {
        self.committed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceTransport for MemoryTransport {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn transfer(
        &self,
        image: &[u8],
        checksum: &Checksum,
        device: &DeviceTarget,
    ) -> FlashResult<TransferReceipt> {
        *self.calls.lock().unwrap() += 1;

        let mut received = image.to_vec();
        match &self.behavior {
            Behavior::Accept => {}
            Behavior::Reject(reason) => {
                return Err(FlashError::Rejected {
                    device: device.address.clone(),
                    reason: reason.clone(),
                })
            }
            Behavior::Corrupt => {
                if let Some(byte) = received.last_mut() {
                    *byte ^= 0xFF;
                }
            }
            Behavior::Stall(delay) => tokio::time::sleep(*delay).await,
        }

        verify_image(&received, checksum, VerifySide::Receiver)?;

        let bytes_written = received.len() as u64;
        self.committed.lock().unwrap().push(CommittedImage {
            device: device.clone(),
            image: received,
            checksum: checksum.clone(),
        });
        Ok(TransferReceipt {
            device: device.address.clone(),
            bytes_written,
            checksum: checksum.clone(),
            duration_ms: 0,
        })
    }
}
