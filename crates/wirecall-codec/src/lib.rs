//! Frame layer and pluggable codecs for wirecall.
//!
//! Every value on a connection travels in a frame:
//! - A 2-byte magic number ("WC") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 2-byte little-endian frame kind (option, header, body)
//!
//! On top of the frames sits the [`Codec`] contract: a request or response is
//! one [`Header`] frame followed by exactly one body frame, both encoded with the
//! codec negotiated at connection start. [`CodecReader`] and [`CodecWriter`] are
//! the two halves a connection works with once the codec is known.

pub mod codec;
pub mod error;
pub mod frame;
pub mod header;
pub mod json;
pub mod kind;
pub mod msgpack;
pub mod reader;
pub mod writer;

pub use codec::{Codec, CodecRegistry, CodecType};
pub use error::{CodecError, Result};
pub use frame::{
    decode_frame, encode_frame, Frame, FrameCodec, FrameConfig, FramedMessage,
    DEFAULT_MAX_PAYLOAD, FRAME_HEADER_SIZE,
};
pub use header::Header;
pub use json::JsonCodec;
pub use kind::{BODY, HEADER, OPTION};
pub use msgpack::MsgPackCodec;
pub use reader::CodecReader;
pub use writer::CodecWriter;
