//! # Encoding Module
//!
//! - **Varint encoding**: length prefixes
//! - **Row codec**: column lists with NULLs, projection and group merge

pub mod row;
pub mod varint;

pub use row::{decode_projection, decode_row, encode_row, merge_rows, restrict_row, Column};
pub use varint::{get_varint, put_varint, varint_len};
