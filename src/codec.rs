use std::io;

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Deserializer;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::message::{Message, ParseError, Protocol};

/// The largest amount of buffered bytes a single message may occupy.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("message exceeds the frame limit ({0} bytes buffered)")]
    FrameTooLarge(usize),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Frames JSON messages on a byte stream.
///
/// JSON values delimit themselves, so a message is complete as soon as its closing brace has
/// been read. Outgoing messages are followed by a newline.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    protocol: Protocol,
}

impl MessageCodec {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (next, consumed) = {
            let mut values = Deserializer::from_slice(&src[..]).into_iter::<Message>();
            let next = values.next();
            (next, values.byte_offset())
        };

        match next {
            // Nothing but whitespace.
            None => {
                src.clear();
                Ok(None)
            }
            Some(Ok(message)) => {
                src.advance(consumed);
                self.protocol.check_version(&message);

                Ok(Some(message.normalize()))
            }
            Some(Err(e)) if e.is_eof() => {
                if src.len() > MAX_FRAME_LEN {
                    return Err(CodecError::FrameTooLarge(src.len()));
                }

                Ok(None)
            }
            Some(Err(e)) => {
                src.clear();
                Err(ParseError::from(e).into())
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => {
                src.clear();
                Err(ParseError::Truncated.into())
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = serde_json::to_vec(&message)?;
        dst.reserve(bytes.len() + 1);
        dst.extend_from_slice(&bytes);
        dst.put_u8(b'\n');

        Ok(())
    }
}
