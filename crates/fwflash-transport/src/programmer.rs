//! Flashing through an external programming tool.
//!
//! Covers serial bootloaders (`stm32flash`) and JTAG/SWD debug probes
//! (`probe-rs`). The chip-specific protocol lives in the tool; this transport
//! hands it a verified copy of the image and reports its exit status.
//!
//! Argument templates may use `{image}`, `{device}` and `{chip}`.
//!
//! `stm32flash` writes anything that is not Intel HEX verbatim, so the serial
//! default only takes raw images. `probe-rs` reads ELF and places sections
//! itself.

use std::fs;
use std::io::Write;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use fwflash_core::Checksum;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{FlashError, FlashResult, VerifySide};
use crate::transport::{
    require_raw_image, verify_image, DeviceTarget, DeviceTransport, TransferReceipt,
};

/// Serial bootloader default: write, verify on device, then jump to 0x0.
pub const SERIAL_PROGRAM: &str = "stm32flash";
pub const SERIAL_ARGS: &[&str] = &["-w", "{image}", "-v", "-g", "0x0", "{device}"];

/// Debug probe default.
pub const PROBE_PROGRAM: &str = "probe-rs";
pub const PROBE_ARGS: &[&str] = &[
    "download",
    "--chip",
    "{chip}",
    "--probe",
    "{device}",
    "--verify",
    "{image}",
];

/// Runs a programming tool against a verified on-disk copy of the image.
#[derive(Debug, Clone)]
pub struct ProgrammerTransport {
    kind: &'static str,
    program: String,
    args: Vec<String>,
    accepts_elf: bool,
}

impl ProgrammerTransport {
    /// Custom tool with an argument template. Takes raw images only until
    /// [`accepting_elf`](Self::accepting_elf) is called.
    pub fn new(kind: &'static str, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            kind,
            program: program.into(),
            args,
            accepts_elf: false,
        }
    }

    /// The tool understands ELF input; the handoff file gets an `.elf` name.
    pub fn accepting_elf(mut self) -> Self {
        self.accepts_elf = true;
        self
    }

    pub fn serial() -> Self {
        Self::new("serial", SERIAL_PROGRAM, owned(SERIAL_ARGS))
    }

    pub fn probe() -> Self {
        Self::new("probe", PROBE_PROGRAM, owned(PROBE_ARGS)).accepting_elf()
    }

    pub fn accepts_elf(&self) -> bool {
        self.accepts_elf
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Expand the argument template for one transfer.
    pub fn render_args(&self, image_path: &str, device: &DeviceTarget) -> FlashResult<Vec<String>> {
        self.args
            .iter()
            .map(|arg| {
                let mut out = arg.replace("{image}", image_path);
                out = out.replace("{device}", &device.address);
                if out.contains("{chip}") {
                    let chip = device.chip.as_deref().ok_or_else(|| {
                        FlashError::InvalidTarget(format!(
                            "{} needs a chip name for {}",
                            self.program, device.address
                        ))
                    })?;
                    out = out.replace("{chip}", chip);
                }
                Ok(out)
            })
            .collect()
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[async_trait]
impl DeviceTransport for ProgrammerTransport {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn transfer(
        &self,
        image: &[u8],
        checksum: &Checksum,
        device: &DeviceTarget,
    ) -> FlashResult<TransferReceipt> {
        verify_image(image, checksum, VerifySide::Sender)?;
        if !self.accepts_elf {
            require_raw_image(image, self.kind)?;
        }

        // The tool reads the image from disk, so the copy it will read is
        // what gets verified.
        let mut handoff = tempfile::Builder::new()
            .prefix("fwflash-image-")
            .suffix(if self.accepts_elf { ".elf" } else { ".bin" })
            .tempfile()?;
        write_handoff(&mut handoff, image)?;
        let landed = fs::read(handoff.path())?;
        verify_image(&landed, checksum, VerifySide::Receiver)?;

        let image_path = handoff.path().to_string_lossy().into_owned();
        let args = self.render_args(&image_path, device)?;

        let start = Instant::now();
        debug!(tool = %self.program, args = ?args, "launching programmer");
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FlashError::ToolLaunch {
                tool: self.program.clone(),
                source: e,
            })?;

        let output = child.wait_with_output().await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        if output.status.code() != Some(0) {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                tool = %self.program,
                code = ?output.status.code(),
                duration_ms,
                "programmer reported failure"
            );
            return Err(FlashError::Programmer {
                tool: self.program.clone(),
                code: output.status.code(),
                stderr,
            });
        }

        info!(
            tool = %self.program,
            device = %device,
            bytes = landed.len(),
            duration_ms,
            "programmer finished"
        );
        Ok(TransferReceipt {
            device: device.address.clone(),
            bytes_written: landed.len() as u64,
            checksum: checksum.clone(),
            duration_ms,
        })
    }
}

fn write_handoff(file: &mut NamedTempFile, image: &[u8]) -> std::io::Result<()> {
    file.write_all(image)?;
    file.as_file().sync_all()
}
