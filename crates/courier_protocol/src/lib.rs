#![forbid(unsafe_code)]

pub mod events;
pub mod framing;

pub use events::{
	ClientEvent, DirectMessageIn, DirectMessageOut, Envelope, Hello, MessageBody, Ping, Pong, ServerEvent, SignalIn,
	SignalOut, ValidationError, validate_message_content,
};
pub use framing::{DEFAULT_MAX_FRAME_SIZE, FramingError, decode_frame, encode_frame, try_decode_frame_from_buffer};

/// v1 protocol version written into `Envelope.v`.
pub const PROTOCOL_VERSION: u32 = 1;
