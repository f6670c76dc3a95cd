//! Length-prefixed framing for the engine socket.
//!
//! Each message is sent as `Content-Length: N\r\n\r\n{json}`. [`FrameReader`]
//! yields raw frame bodies so a body that fails to decode can be skipped
//! without tearing down the stream; [`FrameWriter`] serializes any
//! `Serialize` message.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum frame size (4 MiB). Documents are sent whole, so this bounds model size too.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Longest accepted header line, terminator included.
const MAX_HEADER_LINE_BYTES: u64 = 8 * 1024;

pub struct FrameReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Read the next frame body.
    ///
    /// `Ok(None)` means the peer closed the stream between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(len) = self.read_header_block().await? else {
            return Ok(None);
        };
        if len > MAX_FRAME_BYTES {
            bail!("frame of {len} bytes exceeds limit of {MAX_FRAME_BYTES}");
        }

        let mut body = vec![0u8; len];
        self.reader
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;
        Ok(Some(body))
    }

    async fn read_header_block(&mut self) -> Result<Option<usize>> {
        let mut content_length = None;
        let mut started = false;

        loop {
            self.line.clear();
            let n = (&mut self.reader)
                .take(MAX_HEADER_LINE_BYTES)
                .read_line(&mut self.line)
                .await
                .context("reading frame header")?;
            if n as u64 == MAX_HEADER_LINE_BYTES && !self.line.ends_with('\n') {
                bail!("frame header line exceeds {MAX_HEADER_LINE_BYTES} bytes");
            }
            if n == 0 {
                if started {
                    bail!("stream ended inside a frame header");
                }
                return Ok(None);
            }
            started = true;

            let header = self.line.trim();
            if header.is_empty() {
                break;
            }
            if let Some(len) = parse_content_length(header)? {
                content_length = Some(len);
            }
        }

        content_length
            .map(Some)
            .context("frame header without Content-Length")
    }
}

/// `Ok(None)` for headers other than Content-Length.
fn parse_content_length(header: &str) -> Result<Option<usize>> {
    let Some((key, value)) = header.split_once(':') else {
        return Ok(None);
    };
    if !key.trim().eq_ignore_ascii_case("content-length") {
        return Ok(None);
    }
    let len = value
        .trim()
        .parse()
        .with_context(|| format!("invalid Content-Length {value:?}"))?;
    Ok(Some(len))
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let body = serde_json::to_vec(message).context("serializing frame body")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.writer
            .write_all(&body)
            .await
            .context("writing frame body")?;
        self.writer.flush().await.context("flushing frame")?;
        Ok(())
    }
}
