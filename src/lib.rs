//! # protowire: protocol-buffer wire format codec
//!
//! The encoding and decoding engine underneath generated protocol-buffer messages:
//! wire primitives, a read cursor and a write cursor over pluggable byte sources and
//! sinks, exact size computation, unknown-field preservation and extension fields.
//!
//! ## Layers
//!
//! - **Primitives**: [`wire`] (tags, wire types, zigzag), [`varint`], [`size`]
//! - **Cursors**: [`CodedReader`] over a [`ReadSource`] (slice, `Read` stream, `Buf`
//!   chunks) and [`CodedWriter`] over a [`WriteSink`] (slice, `Write` stream, `Bytes`
//!   chunks)
//! - **Messages**: the [`Message`] trait, [`UnknownFieldSet`], and extensions via
//!   [`ExtendableMessage`] and [`ExtensionRegistry`]
//! - **Tools**: [`frame`] for runs of length-delimited messages, [`dump`] for text output
//!
//! ## Example
//!
//! ```
//! use protowire::{Message, UnknownFieldSet, UnknownValue};
//!
//! let mut fields = UnknownFieldSet::new();
//! fields.merge_field(1, UnknownValue::Varint(300));
//! let bytes = fields.to_bytes().expect("encode");
//! assert_eq!(bytes, [0x08, 0xAC, 0x02]);
//!
//! let parsed = UnknownFieldSet::parse_from_bytes(&bytes).expect("decode");
//! assert_eq!(parsed, fields);
//! ```

pub mod codec;
pub mod dump;
pub mod extension;
pub mod frame;
pub mod message;
pub mod reader;
pub mod sink;
pub mod size;
pub mod source;
pub mod unknown;
pub mod value;
pub mod varint;
pub mod wire;
pub mod writer;

pub use codec::{CodecError, FieldType};
pub use extension::{
    ExtendableMessage, Extension, ExtensionDescriptor, ExtensionLabel, ExtensionRegistry, ExtensionSet,
    RepeatedExtension,
};
pub use frame::{decode_delimited_frame, encode_delimited_frame, FrameDecodeResult};
pub use message::Message;
pub use reader::{CodedReader, ParseOptions};
pub use sink::{ChunkedSink, SliceSink, StreamSink, WriteSink};
pub use source::{ChunkedSource, ReadSource, SliceSource, StreamSource};
pub use unknown::{UnknownField, UnknownFieldSet, UnknownValue};
pub use value::Value;
pub use wire::WireType;
pub use writer::CodedWriter;
