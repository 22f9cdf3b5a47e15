//! Codec module - building command source from host values.
//!
//! - [`LuaCodec`] - string escaping and `print(` rewriting
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than
//! trait objects; there is exactly one command language on the device.

mod lua;

pub use lua::{LuaCodec, PRINT_LONG};
