//! Network-attached programmers over TCP.
//!
//! # Wire format
//!
//! ```text
//! HEADER   (host -> programmer): one JSON line  {"size":N,"checksum":"<sha256 hex>"}
//! IMAGE    (host -> programmer): N raw bytes
//! RESPONSE (programmer -> host): one JSON line
//!     {"status":"committed","checksum":"<sha256 hex>","bytes_written":N}
//!     {"status":"rejected","reason":"..."}
//! ```
//!
//! The programmer hashes what it received and commits only on a match. The
//! host then checks the checksum echoed back in the response.

use std::time::Instant;

use async_trait::async_trait;
use fwflash_core::Checksum;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::{FlashError, FlashResult, VerifySide};
use crate::transport::{verify_image, DeviceTarget, DeviceTransport, TransferReceipt};

/// Largest image a header may announce.
pub const MAX_IMAGE_SIZE: u64 = 64 * 1024 * 1024;

/// Upper bound on a header or response line.
const MAX_LINE_LEN: u64 = 4096;

/// Announces the image that follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHeader {
    pub size: u64,
    pub checksum: Checksum,
}

/// The programmer's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferResponse {
    Committed { checksum: Checksum, bytes_written: u64 },
    Rejected { reason: String },
}

async fn write_line<W, T>(writer: &mut W, value: &T) -> FlashResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value).map_err(|e| FlashError::Protocol(e.to_string()))?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

async fn read_line<R, T>(reader: &mut R) -> FlashResult<T>
where
    R: AsyncBufRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut line = String::new();
    let n = (&mut *reader).take(MAX_LINE_LEN).read_line(&mut line).await?;
    if n == 0 {
        return Err(FlashError::Protocol("connection closed before a line was read".to_string()));
    }
    if !line.ends_with('\n') {
        return Err(FlashError::Protocol(format!("line exceeds {MAX_LINE_LEN} bytes")));
    }
    serde_json::from_str(line.trim_end()).map_err(|e| FlashError::Protocol(e.to_string()))
}

/// Writes the transfer header.
pub async fn write_header<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &TransferHeader,
) -> FlashResult<()> {
    write_line(writer, header).await
}

/// Reads the transfer header, rejecting oversized announcements.
pub async fn read_header<R: AsyncBufRead + Unpin>(reader: &mut R) -> FlashResult<TransferHeader> {
    let header: TransferHeader = read_line(reader).await?;
    if header.size == 0 || header.size > MAX_IMAGE_SIZE {
        return Err(FlashError::Protocol(format!(
            "announced image size {} outside 1..={MAX_IMAGE_SIZE}",
            header.size
        )));
    }
    Ok(header)
}

/// Reads exactly the announced number of image bytes.
pub async fn read_image<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    header: &TransferHeader,
) -> FlashResult<Vec<u8>> {
    let mut image = vec![0u8; header.size as usize];
    reader.read_exact(&mut image).await?;
    Ok(image)
}

/// Writes the programmer's verdict.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &TransferResponse,
) -> FlashResult<()> {
    write_line(writer, response).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the programmer's verdict.
pub async fn read_response<R: AsyncBufRead + Unpin>(reader: &mut R) -> FlashResult<TransferResponse> {
    read_line(reader).await
}

/// Receiving half of the exchange: read header and image, verify, answer.
///
/// `commit` runs only when the received bytes match the announced checksum;
/// its error string becomes the rejection reason.
pub async fn receive<S, F>(stream: S, commit: F) -> FlashResult<TransferResponse>
where
    S: tokio::io::AsyncRead + AsyncWrite + Unpin,
    F: FnOnce(&[u8]) -> Result<(), String>,
{
    let mut stream = BufReader::new(stream);
    let header = read_header(&mut stream).await?;
    let image = read_image(&mut stream, &header).await?;

    let response = match verify_image(&image, &header.checksum, VerifySide::Receiver) {
        Err(e) => TransferResponse::Rejected {
            reason: e.to_string(),
        },
        Ok(()) => match commit(&image) {
            Ok(()) => TransferResponse::Committed {
                checksum: header.checksum.clone(),
                bytes_written: image.len() as u64,
            },
            Err(reason) => TransferResponse::Rejected { reason },
        },
    };
    write_response(stream.get_mut(), &response).await?;
    Ok(response)
}

/// Streams the image to a programmer listening on `host:port`.
#[derive(Debug, Clone, Default)]
pub struct NetworkTransport;

impl NetworkTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeviceTransport for NetworkTransport {
    fn kind(&self) -> &'static str {
        "network"
    }

    async fn transfer(
        &self,
        image: &[u8],
        checksum: &Checksum,
        device: &DeviceTarget,
    ) -> FlashResult<TransferReceipt> {
        verify_image(image, checksum, VerifySide::Sender)?;
        let start = Instant::now();

        let stream = TcpStream::connect(&device.address)
            .await
            .map_err(|e| FlashError::Unreachable {
                device: device.address.clone(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        let (read_half, mut write_half) = stream.into_split();

        let header = TransferHeader {
            size: image.len() as u64,
            checksum: checksum.clone(),
        };
        write_header(&mut write_half, &header).await?;
        write_half.write_all(image).await?;
        write_half.flush().await?;
        debug!(device = %device, bytes = image.len(), "image sent, awaiting verdict");

        let mut reader = BufReader::new(read_half);
        match read_response(&mut reader).await? {
            TransferResponse::Committed {
                checksum: echoed,
                bytes_written,
            } => {
                if &echoed != checksum {
                    return Err(FlashError::ChecksumMismatch {
                        side: VerifySide::Receiver,
                        expected: checksum.to_string(),
                        actual: echoed.to_string(),
                    });
                }
                let duration_ms = start.elapsed().as_millis() as u64;
                info!(device = %device, bytes_written, duration_ms, "programmer committed image");
                Ok(TransferReceipt {
                    device: device.address.clone(),
                    bytes_written,
                    checksum: echoed,
                    duration_ms,
                })
            }
            TransferResponse::Rejected { reason } => {
                warn!(device = %device, reason = %reason, "programmer rejected image");
                Err(FlashError::Rejected {
                    device: device.address.clone(),
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_header_line_is_json() {
        let mut buf = Vec::new();
        let header = TransferHeader {
            size: 3,
            checksum: Checksum::compute(b"abc"),
        };
        write_header(&mut buf, &header).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.starts_with("{\"size\":3,\"checksum\":\"ba7816bf"));
    }

    #[tokio::test]
    async fn test_oversized_header_is_refused() {
        let line = format!(
            "{{\"size\":{},\"checksum\":\"{}\"}}\n",
            MAX_IMAGE_SIZE + 1,
            Checksum::compute(b"x")
        );
        let mut reader = BufReader::new(line.as_bytes());
        assert!(matches!(
            read_header(&mut reader).await,
            Err(FlashError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_response_tagging() {
        let mut buf = Vec::new();
        write_response(
            &mut buf,
            &TransferResponse::Rejected {
                reason: "flash locked".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "{\"status\":\"rejected\",\"reason\":\"flash locked\"}\n"
        );
    }

    #[tokio::test]
    async fn test_receive_rejects_tampered_bytes() {
        let (mut host, programmer) = tokio::io::duplex(1024);
        let header = TransferHeader {
            size: 5,
            checksum: Checksum::compute(b"hello"),
        };
        write_header(&mut host, &header).await.unwrap();
        host.write_all(b"hellO").await.unwrap();

        let mut committed = false;
        let response = receive(programmer, |_| {
            committed = true;
            Ok(())
        })
        .await
        .unwrap();
        assert!(matches!(response, TransferResponse::Rejected { .. }));
        assert!(!committed);
    }
}
