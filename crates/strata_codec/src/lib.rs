//! # Strata Codec
//!
//! Value codecs for the strata columnar format.
//!
//! Three codecs sit between in-memory values and the bytes of a column line:
//!
//! - [`scalar`]: typed values to and from their on-disk strings
//! - [`line`]: an ordered list of strings to and from one text line, with a
//!   mandatory read-back check on every write
//! - [`rle`]: run-length compression of a column's values, kept only when it
//!   saves enough
//!
//! Both reversible codecs prove their own reversibility on every call and
//! fail loudly instead of writing something they cannot read back.
//!
//! ## Usage
//!
//! ```
//! use strata_codec::{line, rle};
//!
//! let column = vec!["us".to_string(), "us".to_string(), "us".to_string()];
//! let packed = rle::compress_if_threshold_met("country", column.clone(), 30).unwrap();
//! let encoded = line::encode_line(&packed).unwrap();
//!
//! let decoded = line::decode_str(&encoded);
//! assert_eq!(rle::decompress(decoded).unwrap(), column);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod line;
pub mod rle;
pub mod scalar;
mod value;

pub use error::{CodecError, CodecResult};
pub use rle::RLE_SEPARATOR;
pub use scalar::DataType;
pub use value::Value;
