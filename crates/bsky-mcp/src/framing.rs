//! JSON-RPC message framing for the MCP transport.
//!
//! Two framings are accepted on input:
//!
//! - **Content-Length**: `Content-Length: N\r\n\r\n<N bytes>`
//! - **Newline-delimited**: one JSON object per `\n`-terminated line
//!
//! [`MessageReader`] detects the framing per message and reports it, so the
//! server can answer each request in the framing the client used.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on a single message, in either framing.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Wire framing of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// `Content-Length` header block followed by the body.
    ContentLength,
    /// A single line.
    #[default]
    Newline,
}

/// One decoded message and the framing it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// JSON text.
    pub body: String,
    /// How it was framed.
    pub framing: Framing,
}

/// Reads MCP messages from an async reader, auto-detecting the framing.
///
/// Both framings are capped at [`MAX_FRAME_BYTES`]. An oversized message is
/// consumed in full before the error is returned, so the stream stays in
/// sync and the next call starts at the following message.
pub struct MessageReader<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    /// Wrap `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: Vec::new(),
        }
    }

    /// Read the next message, returning `None` on EOF.
    ///
    /// # Errors
    ///
    /// - [`io::ErrorKind::InvalidData`] for an oversized or non-UTF-8
    ///   message. The message has been skipped; reading may continue.
    /// - [`io::ErrorKind::InvalidInput`] for an unparseable `Content-Length`
    ///   value. The body length is unknown, so the stream cannot be resynced.
    /// - [`io::ErrorKind::UnexpectedEof`] when the stream ends inside a frame.
    pub async fn next_message(&mut self) -> io::Result<Option<Frame>> {
        loop {
            if self.read_line_capped().await? == 0 {
                return Ok(None);
            }

            let text = utf8(std::mem::take(&mut self.line))?;
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }

            let Some(rest) = strip_header(trimmed, "content-length:") else {
                return Ok(Some(Frame {
                    body: trimmed.to_string(),
                    framing: Framing::Newline,
                }));
            };

            let len: usize = rest
                .trim()
                .parse()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

            // Remaining headers (e.g. Content-Type) up to the blank line.
            loop {
                match self.read_line_capped().await {
                    Ok(0) => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "EOF in Content-Length headers",
                        ));
                    }
                    Ok(_) if self.line.trim_ascii().is_empty() => break,
                    Ok(_) => {}
                    // Mid-frame; the body boundary is lost.
                    Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidInput, e)),
                }
            }

            if len > MAX_FRAME_BYTES {
                let mut body = (&mut self.reader).take(len as u64);
                tokio::io::copy(&mut body, &mut tokio::io::sink()).await?;
                return Err(oversized(len));
            }

            let mut body = vec![0u8; len];
            self.reader.read_exact(&mut body).await?;
            return Ok(Some(Frame {
                body: utf8(body)?,
                framing: Framing::ContentLength,
            }));
        }
    }

    /// Read one line into `self.line`. Returns the bytes read, 0 on EOF.
    ///
    /// A line longer than [`MAX_FRAME_BYTES`] is discarded through its
    /// terminating newline and reported as `InvalidData`.
    async fn read_line_capped(&mut self) -> io::Result<usize> {
        self.line.clear();
        let limit = MAX_FRAME_BYTES as u64 + 1;
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.line)
            .await?;
        if n as u64 == limit && self.line.last() != Some(&b'\n') {
            self.line = Vec::new();
            self.discard_through_newline().await?;
            return Err(oversized(n));
        }
        Ok(n)
    }

    async fn discard_through_newline(&mut self) -> io::Result<()> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }
            let (used, done) = match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (buf.len(), false),
            };
            self.reader.consume(used);
            if done {
                return Ok(());
            }
        }
    }
}

fn oversized(len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("frame of at least {len} bytes exceeds limit of {MAX_FRAME_BYTES}"),
    )
}

fn utf8(bytes: Vec<u8>) -> io::Result<String> {
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Case-insensitive header prefix match.
fn strip_header<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let head = line.get(..name.len())?;
    head.eq_ignore_ascii_case(name).then(|| &line[name.len()..])
}

/// Encode a JSON message in Content-Length framing.
pub fn encode_content_length(json: &str) -> Vec<u8> {
    let header = format!("Content-Length: {}\r\n\r\n", json.len());
    let mut buf = Vec::with_capacity(header.len() + json.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(json.as_bytes());
    buf
}

/// Write `json` in `framing` and flush.
///
/// # Errors
///
/// Returns an I/O error if writing or flushing fails.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, framing: Framing, json: &str) -> io::Result<()> {
    match framing {
        Framing::ContentLength => writer.write_all(&encode_content_length(json)).await?,
        Framing::Newline => {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await
}
