//! # Internal Macros
//!
//! ## zerocopy_accessors!
//!
//! On-page headers are `#[repr(C)]` structs of zerocopy little-endian
//! wrappers so they can be read straight out of a byte buffer. The macro
//! generates a native-typed getter and a `set_` method per field:
//!
//! ```ignore
//! #[repr(C)]
//! struct EntryHeader {
//!     xmin: U64,
//!     cmin: U32,
//! }
//!
//! impl EntryHeader {
//!     zerocopy_accessors! {
//!         xmin: u64,
//!         cmin: u32,
//!     }
//! }
//!
//! // header.xmin() -> u64, header.set_cmin(7)
//! ```
//!
//! Supported native types: `u16`, `u32`, `u64`.

macro_rules! le_wrapper {
    (u16) => {
        ::zerocopy::little_endian::U16
    };
    (u32) => {
        ::zerocopy::little_endian::U32
    };
    (u64) => {
        ::zerocopy::little_endian::U64
    };
}

macro_rules! zerocopy_accessors {
    ($($field:ident : $ty:tt),* $(,)?) => {
        ::paste::paste! {
            $(
                #[inline]
                pub fn $field(&self) -> $ty {
                    self.$field.get()
                }

                #[inline]
                #[allow(dead_code)]
                pub fn [<set_ $field>](&mut self, val: $ty) {
                    self.$field = <le_wrapper!($ty)>::new(val);
                }
            )*
        }
    };
}
