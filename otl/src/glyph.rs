//! The mutable glyph sequence that the engine shapes.

use font_types::GlyphId;

/// A single glyph in the working stream.
///
/// The `text` field carries the originating code points so that backing
/// text survives substitution: the invariant `seq.iter().map(|g|
/// &g.text).concat() == input_text` holds at every point during shaping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Glyph {
    pub gid: GlyphId,
    pub text: String,
    pub advance: i32,
    pub x_offset: i16,
    pub y_offset: i16,
}

impl Glyph {
    pub fn new(gid: GlyphId, text: impl Into<String>, advance: i32) -> Self {
        Glyph {
            gid,
            text: text.into(),
            advance,
            x_offset: 0,
            y_offset: 0,
        }
    }

    /// Construct a glyph carrying no backing text (used by lookups that
    /// introduce a glyph with no unicode counterpart, such as an inserted
    /// ligature component placeholder).
    pub fn notdef(advance: i32) -> Self {
        Glyph {
            gid: GlyphId::NOTDEF,
            text: String::new(),
            advance,
            x_offset: 0,
            y_offset: 0,
        }
    }

    /// Apply a positional adjustment: add placement to the offsets and
    /// x-advance to the advance width.
    pub fn apply_value_record(&mut self, value: &crate::primitives::ValueRecord) {
        self.x_offset = self.x_offset.saturating_add(value.x_placement);
        self.y_offset = self.y_offset.saturating_add(value.y_placement);
        self.advance = self.advance.saturating_add(value.x_advance as i32);
    }
}

/// The glyph sequence that a shaping call mutates in place.
///
/// This is a thin, semantically-named wrapper over `Vec<Glyph>`; the engine
/// operates directly on `&mut Vec<Glyph>` so that splice/insert/remove read
/// naturally, but code outside the engine is expected to hold one of these
/// rather than a bare vector.
pub type GlyphSequence = Vec<Glyph>;

/// Concatenate the `text` of every glyph in the sequence, in order.
///
/// Used by tests asserting the splice invariant (§8): no backing text is
/// ever discarded across any number of substitutions.
pub fn concat_text(seq: &[Glyph]) -> String {
    seq.iter().map(|g| g.text.as_str()).collect()
}
