//! Framing codec
//!
//! ```text
//! offset 0:           u32 json_len   (big-endian)
//! offset 4:           u32 bin_len    (big-endian)
//! offset 8:           json_len bytes of UTF-8 JSON
//! offset 8+json_len:  bin_len bytes of raw payload
//! ```
//!
//! `bin_len = 0` means the frame carries no binary payload.

use std::convert::TryFrom;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::FRAME_HEADER_LEN;
use super::error::ProtocolError;
use super::message::Message;

/// One decoded frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
	pub message: Message,
	pub payload: Vec<u8>,
}

impl Frame {
	pub fn new(message: Message, payload: Vec<u8>) -> Self {
		Self { message, payload }
	}
}

/// Serialize `message` and `payload` into a single frame
pub fn encode(message: &Message, payload: Option<&[u8]>) -> Result<Vec<u8>, ProtocolError> {
	let json = message.to_json_bytes()?;
	let payload = payload.unwrap_or(&[]);

	let json_len = length_field(json.len())?;
	let bin_len = length_field(payload.len())?;

	let mut out = Vec::with_capacity(FRAME_HEADER_LEN + json.len() + payload.len());
	out.extend_from_slice(&json_len.to_be_bytes());
	out.extend_from_slice(&bin_len.to_be_bytes());
	out.extend_from_slice(&json);
	out.extend_from_slice(payload);
	Ok(out)
}

fn length_field(len: usize) -> Result<u32, ProtocolError> {
	u32::try_from(len).map_err(|_| ProtocolError::FrameTooLarge { len, max: u32::MAX as usize })
}

/// Parse the two length fields of a frame header
pub fn parse_header(header: &[u8; FRAME_HEADER_LEN]) -> (usize, usize) {
	let json_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
	let bin_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
	(json_len as usize, bin_len as usize)
}

/// Encode and write one frame, refusing frames above `max_frame_size`
pub async fn write_frame<W>(
	writer: &mut W,
	message: &Message,
	payload: Option<&[u8]>,
	max_frame_size: usize,
) -> Result<(), ProtocolError>
where
	W: AsyncWrite + Unpin,
{
	let frame = encode(message, payload)?;
	let body_len = frame.len() - FRAME_HEADER_LEN;
	if body_len > max_frame_size {
		return Err(ProtocolError::FrameTooLarge { len: body_len, max: max_frame_size });
	}
	writer.write_all(&frame).await?;
	writer.flush().await?;
	Ok(())
}

/// Read exactly one frame from `reader`
///
/// Returns `Ok(None)` when the stream ends before a complete frame is read.
/// A JSON segment that is not a JSON object fails with `MalformedHeader`;
/// lengths above `max_frame_size` fail before any payload is allocated.
pub async fn decode_stream<R>(
	reader: &mut R,
	max_frame_size: usize,
) -> Result<Option<Frame>, ProtocolError>
where
	R: AsyncRead + Unpin,
{
	let mut header = [0u8; FRAME_HEADER_LEN];
	if !read_full(reader, &mut header).await? {
		return Ok(None);
	}
	let (json_len, bin_len) = parse_header(&header);

	let total = json_len.saturating_add(bin_len);
	if total > max_frame_size {
		return Err(ProtocolError::FrameTooLarge { len: total, max: max_frame_size });
	}

	let mut json = vec![0u8; json_len];
	if !read_full(reader, &mut json).await? {
		return Ok(None);
	}
	let value: serde_json::Value = serde_json::from_slice(&json)
		.map_err(|e| ProtocolError::MalformedHeader(e.to_string()))?;
	let message = Message::from_value(value)?;

	let mut payload = vec![0u8; bin_len];
	if !read_full(reader, &mut payload).await? {
		return Ok(None);
	}

	Ok(Some(Frame { message, payload }))
}

/// Fill `buf` completely; `false` means the stream closed first
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool, ProtocolError>
where
	R: AsyncRead + Unpin,
{
	match reader.read_exact(buf).await {
		Ok(_) => Ok(true),
		Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
		Err(e) => Err(ProtocolError::Io(e)),
	}
}


// vim: ts=4
