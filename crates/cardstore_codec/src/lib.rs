//! # cardstore Codec
//!
//! Value encodings for cardstore: tagged dictionary compression and
//! collection segmentation.
//!
//! This crate is pure. It never touches a backend; the engine reads and
//! writes strings and asks this crate how to shape them.
//!
//! ## Stored value format
//!
//! - `C:<payload>` - dictionary-compressed text
//! - `R:<text>` - raw text
//! - anything else - untagged raw text written by older versions
//!
//! ## Usage
//!
//! ```
//! use cardstore_codec::{decode_value, encode_value, CompressionPolicy};
//!
//! let text = "{\"front\":\"hola\",\"back\":\"hello\"}".repeat(20);
//! let stored = encode_value(&text, &CompressionPolicy::default());
//! assert!(stored.starts_with("C:"));
//! assert_eq!(decode_value(&stored), text);
//!
//! // Values written before tagging existed are returned unchanged.
//! assert_eq!(decode_value("[1,2,3]"), "[1,2,3]");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compression;
mod error;
mod segment;

pub use compression::{
    compress, decode_value, decompress, encode_value, encoding_of, try_decode_value,
    CompressionPolicy, Encoding, COMPRESSED_TAG, RAW_TAG,
};
pub use error::{CodecError, CodecResult};
pub use segment::{
    classify, parse_segment_key, plan, reassemble, segment_key, Reassembled, SegmentMeta,
    SegmentPlan, SegmentSlot, SegmentWarning, StoredCollection, MAX_SEGMENTS, SEGMENT_SEPARATOR,
};
