//! Glyph identifiers
//!
//! Although these are treated as u16s in the spec, we choose to represent
//! them as a distinct type.

/// A 16-bit glyph identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlyphId(u16);

impl GlyphId {
    /// The identifier reserved for unknown/undefined glyphs.
    pub const NOTDEF: GlyphId = GlyphId(0);

    /// Construct a new `GlyphId`.
    pub const fn new(raw: u16) -> Self {
        GlyphId(raw)
    }

    /// The identifier as a `u16`.
    pub const fn to_u16(self) -> u16 {
        self.0
    }

    pub const fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    pub const fn from_be_bytes(bytes: [u8; 2]) -> Self {
        GlyphId(u16::from_be_bytes(bytes))
    }

    /// Add a signed delta, wrapping modulo 2^16 as required by GSUB 1.1.
    pub fn wrapping_add_delta(self, delta: i16) -> Self {
        GlyphId(self.0.wrapping_add(delta as u16))
    }
}

impl std::fmt::Display for GlyphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

impl From<u16> for GlyphId {
    fn from(raw: u16) -> Self {
        GlyphId(raw)
    }
}

impl From<GlyphId> for u16 {
    fn from(gid: GlyphId) -> Self {
        gid.0
    }
}
