//! Frame handling: decode a buffer holding a run of length-delimited messages.
//!
//! Each message is preceded by its varint length. When a message fails to parse but
//! its length prefix is intact, it is removed and decoding continues with the next
//! one. A broken length prefix ends the frame with an error, since nothing after it
//! can be located.

use crate::codec::CodecError;
use crate::message::Message;
use crate::reader::ParseOptions;
use crate::varint;
use crate::writer::CodedWriter;
use tracing::debug;

/// Result of decoding a frame: the messages that parsed and the ones that were removed.
#[derive(Debug)]
pub struct FrameDecodeResult<M> {
    pub messages: Vec<DecodedMessage<M>>,
    pub removed: Vec<RemovedMessage>,
}

#[derive(Debug)]
pub struct DecodedMessage<M> {
    pub message: M,
    /// Range of the message body within the frame, length prefix excluded.
    pub byte_range: (usize, usize),
}

#[derive(Debug)]
pub struct RemovedMessage {
    pub byte_range: (usize, usize),
    pub reason: String,
}

/// Decode every length-delimited message in `bytes`.
pub fn decode_delimited_frame<M: Message + Default>(
    bytes: &[u8],
    options: &ParseOptions,
) -> Result<FrameDecodeResult<M>, CodecError> {
    let mut messages = Vec::new();
    let mut removed = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let (length, prefix_len) = varint::decode_varint32(&bytes[offset..])?;
        if (length as i32) < 0 {
            return Err(CodecError::NegativeSize);
        }
        let start = offset + prefix_len;
        let end = start + length as usize;
        if end > bytes.len() {
            return Err(CodecError::TruncatedMessage);
        }

        let mut message = M::default();
        match message.merge_from_bytes_with(&bytes[start..end], options.clone()) {
            Ok(()) if message.is_initialized() => messages.push(DecodedMessage {
                message,
                byte_range: (start, end),
            }),
            Ok(()) => removed.push(RemovedMessage {
                byte_range: (start, end),
                reason: "message is missing required fields".to_string(),
            }),
            Err(e) => {
                debug!(start, end, error = %e, "removing message from frame");
                removed.push(RemovedMessage {
                    byte_range: (start, end),
                    reason: e.to_string(),
                });
            }
        }
        offset = end;
    }

    Ok(FrameDecodeResult { messages, removed })
}

/// Re-encode a frame with only the messages that decoded.
pub fn encode_delimited_frame<M: Message>(result: &FrameDecodeResult<M>) -> Result<Vec<u8>, CodecError> {
    let mut output = CodedWriter::from_writer(Vec::new());
    for decoded in &result.messages {
        output.write_message(&decoded.message)?;
    }
    Ok(output.finish()?.into_inner())
}
