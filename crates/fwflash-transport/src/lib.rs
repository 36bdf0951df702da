//! fwflash device transports
//!
//! The hardware-facing half of the pipeline. Every transport implements
//! [`DeviceTransport`], verifies the image against its checksum on the
//! receiving side before committing, and reports failure without retrying.
//!
//! - [`MassStorageTransport`]: UF2/DAPLink style drag-and-drop volumes
//! - [`ProgrammerTransport`]: serial bootloader and JTAG/SWD probe tools
//! - [`NetworkTransport`]: TCP-attached programmers
//! - [`fakes::MemoryTransport`]: in-memory fake for tests

pub mod config;
pub mod error;
pub mod fakes;
pub mod mass_storage;
pub mod network;
pub mod programmer;
pub mod transport;

pub use config::{TransportConfig, UnknownTransport};
pub use error::{FlashError, FlashResult, VerifySide};
pub use mass_storage::MassStorageTransport;
pub use network::{NetworkTransport, TransferHeader, TransferResponse};
pub use programmer::ProgrammerTransport;
pub use transport::{
    is_elf, require_raw_image, verify_image, DeviceTarget, DeviceTransport, TransferReceipt,
};
