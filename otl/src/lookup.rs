//! Lookups: an ordered list of subtables sharing flags and a type.

use font_types::{ByteSink, Cursor};

use crate::flags::bitflags_like;
use crate::primitives::Gdef;

bitflags_like! {
    /// The lookup-level flags consulted by the ignore-glyph filter (§4.4).
    pub struct LookupFlag: u16 {
        const RIGHT_TO_LEFT = 0x0001;
        const IGNORE_BASE_GLYPHS = 0x0002;
        const IGNORE_LIGATURES = 0x0004;
        const IGNORE_MARKS = 0x0008;
        const USE_MARK_FILTERING_SET = 0x0010;
        // bits 0x0020 reserved, 0xFF00 is the mark attachment type.
    }
}

impl LookupFlag {
    pub fn mark_attachment_type(&self) -> u16 {
        (self.bits() & 0xFF00) >> 8
    }

    pub fn with_mark_attachment_type(mut self, class: u16) -> Self {
        self = LookupFlag::from_bits_truncate((self.bits() & 0x00FF) | ((class & 0xFF) << 8));
        self
    }
}

/// A predicate over glyphs that decides whether the matcher should skip
/// past them while scanning for input/backtrack/lookahead sequences.
///
/// Built once per lookup application from a [`LookupFlag`] and an optional
/// [`Gdef`] collaborator per §4.4:
/// - No GDEF present: always keep (matches even when `IGNORE_MARKS` is set,
///   since there is no classification to ignore by).
/// - `ignore_base_glyphs` / `ignore_ligatures`: reject matching classes.
/// - Else `ignore_marks`: reject marks.
/// - Else `use_mark_filtering_set`: keep only glyphs in the indexed set
///   (read literally — this applies to every glyph, not only marks, absent
///   a documented correction).
/// - Else a non-zero mark attachment type with a `mark_attach_class_def`
///   present: keep only glyphs whose attachment class matches.
/// - Otherwise: keep.
pub struct GlyphFilter<'a> {
    flag: LookupFlag,
    gdef: Option<&'a Gdef>,
    mark_filtering_set: Option<&'a crate::primitives::CoverageSet>,
}

impl<'a> GlyphFilter<'a> {
    pub fn new(
        flag: LookupFlag,
        gdef: Option<&'a Gdef>,
        mark_filtering_set: Option<&'a crate::primitives::CoverageSet>,
    ) -> Self {
        GlyphFilter {
            flag,
            gdef,
            mark_filtering_set,
        }
    }

    pub fn keep(&self, gid: font_types::GlyphId) -> bool {
        let gdef = match self.gdef {
            Some(g) => g,
            None => return true,
        };
        let class = gdef.glyph_class(gid);
        if self.flag.contains(LookupFlag::IGNORE_BASE_GLYPHS)
            && class == Some(crate::primitives::GlyphClass::Base)
        {
            return false;
        }
        if self.flag.contains(LookupFlag::IGNORE_LIGATURES)
            && class == Some(crate::primitives::GlyphClass::Ligature)
        {
            return false;
        }
        if self.flag.contains(LookupFlag::IGNORE_MARKS) {
            return class != Some(crate::primitives::GlyphClass::Mark);
        }
        if self.flag.contains(LookupFlag::USE_MARK_FILTERING_SET) {
            if let Some(set) = self.mark_filtering_set {
                return set.contains(gid);
            }
            // the indexed mark-glyph-set did not resolve (out of range, or
            // no GDEF mark-glyph-set table); fall through to the
            // mark-attachment-type check rather than accepting everything.
        }
        let attach_type = self.flag.mark_attachment_type();
        if attach_type != 0 {
            if let Some(requested_class) = gdef.mark_attach_class(gid) {
                return requested_class == attach_type;
            }
        }
        true
    }
}

/// An ordered collection of subtables of a single lookup type, sharing one
/// set of flags.
///
/// `T` is the subtable enum (`GsubSubtable` or `GposSubtable`); kept generic
/// so [`crate::lookup_list::LookupList`] and the extension-promotion logic
/// in §4.8 are written once and shared by both tables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Lookup<T> {
    pub lookup_type: u16,
    pub flag: LookupFlag,
    pub mark_filtering_set: Option<u16>,
    pub subtables: Vec<T>,
}

impl<T> Lookup<T> {
    pub fn new(lookup_type: u16, flag: LookupFlag, subtables: Vec<T>) -> Self {
        Lookup {
            lookup_type,
            flag,
            mark_filtering_set: None,
            subtables,
        }
    }
}

/// Shared behavior a subtable enum must provide so `Lookup<T>`/`LookupList<T>`
/// can encode and decode it without knowing its concrete variants.
///
/// Extension subtables (GSUB 7.1 / GPOS 9.1) are never represented as a
/// variant of `Self`: decoded subtables are always stored unwrapped (per
/// the design note in §9), and [`crate::lookup_list::LookupList`] re-adds
/// the indirection purely as an encoding-time concern when offsets would
/// overflow 16 bits (§4.8). `EXTENSION_LOOKUP_TYPE` is what the lookup list
/// needs to recognize that indirection on the way in.
pub trait SubtableCodec: Sized {
    const EXTENSION_LOOKUP_TYPE: u16;
    fn encode_len(&self) -> usize;
    fn encode(&self, sink: &mut ByteSink);
    fn read(lookup_type: u16, data: &[u8], pos: usize) -> crate::error::Result<Self>;
}

pub(crate) fn read_u16_at(cur: &mut Cursor) -> crate::error::Result<u16> {
    cur.read_u16()
        .ok_or_else(|| crate::error::Error::invalid("lookup", "truncated field"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{ClassDef, CoverageSet, Gdef};
    use font_types::GlyphId;
    use std::collections::BTreeMap;

    fn gid(n: u16) -> GlyphId {
        GlyphId::new(n)
    }

    /// §4.4: an invalid/out-of-range mark-filtering-set index (`None`)
    /// must fall through to the mark-attachment-type check rather than
    /// short-circuit to "keep everything".
    #[test]
    fn invalid_mark_filtering_set_falls_through_to_attach_type() {
        let mut attach = BTreeMap::new();
        attach.insert(gid(5), 7u16);
        let gdef = Gdef {
            mark_attach_class_def: Some(ClassDef::from_map(attach)),
            ..Gdef::default()
        };
        let flag = LookupFlag::USE_MARK_FILTERING_SET.with_mark_attachment_type(7);
        let filter = GlyphFilter::new(flag, Some(&gdef), None);

        assert!(filter.keep(gid(5)));
        assert!(!filter.keep(gid(6)));
    }

    #[test]
    fn valid_mark_filtering_set_checks_membership() {
        let gdef = Gdef::default();
        let set = CoverageSet::from_glyphs(vec![gid(10)]);
        let filter = GlyphFilter::new(LookupFlag::USE_MARK_FILTERING_SET, Some(&gdef), Some(&set));

        assert!(filter.keep(gid(10)));
        assert!(!filter.keep(gid(11)));
    }

    /// §8: flags that don't classify a glyph at all (no GDEF classes
    /// involved) are idempotent — applying the same filter twice to an
    /// unaffected glyph always agrees with itself.
    #[test]
    fn identity_flags_are_idempotent() {
        let gdef = Gdef::default();
        let filter = GlyphFilter::new(LookupFlag::IGNORE_MARKS, Some(&gdef), None);
        let g = gid(42);
        assert_eq!(filter.keep(g), filter.keep(g));
    }

    #[test]
    fn no_gdef_keeps_everything() {
        let filter = GlyphFilter::new(LookupFlag::IGNORE_MARKS, None, None);
        assert!(filter.keep(gid(1)));
    }
}
