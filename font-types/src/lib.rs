//! Scalar wire types shared by the OpenType layout engine.
//!
//! This is a deliberately small crate: a 16-bit glyph identifier, a 4-byte
//! tag, and a big-endian cursor/sink pair. Everything else a font file needs
//! (variable-width scalars, fixed-point numbers, outlines) belongs to the
//! table-framing and rendering subsystems this workspace does not implement.

mod glyph_id;
mod raw;
mod tag;

pub use glyph_id::GlyphId;
pub use raw::{ByteSink, Cursor};
pub use tag::Tag;
