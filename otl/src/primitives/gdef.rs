//! The GDEF (Glyph Definition) collaborator.
//!
//! GDEF is parsed here because the lookup-flag filter (§4.4) needs to query
//! it, but it is an external collaborator to GSUB/GPOS proper: a shaper may
//! supply `None` and the engine still functions (the filter degrades to
//! "accept everything").

use font_types::{ByteSink, Cursor, GlyphId};

use crate::error::{Error, Result};
use crate::primitives::{ClassDef, CoverageSet};

/// GDEF's `GlyphClassDef` enumeration (clause 2.3.5 of the OpenType spec).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GlyphClass {
    Base,
    Ligature,
    Mark,
    Component,
}

impl GlyphClass {
    fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(GlyphClass::Base),
            2 => Some(GlyphClass::Ligature),
            3 => Some(GlyphClass::Mark),
            4 => Some(GlyphClass::Component),
            _ => None,
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            GlyphClass::Base => 1,
            GlyphClass::Ligature => 2,
            GlyphClass::Mark => 3,
            GlyphClass::Component => 4,
        }
    }
}

/// An indexed collection of coverage sets enumerating permitted mark
/// glyphs, referenced by a lookup's `markFilteringSet` field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkGlyphSets {
    pub sets: Vec<CoverageSet>,
}

impl MarkGlyphSets {
    pub fn get(&self, index: u16) -> Option<&CoverageSet> {
        self.sets.get(index as usize)
    }
}

/// The glyph-classification auxiliary data the layout engine consults when
/// building a lookup's ignore-glyph filter.
///
/// Device/variation-index fields on GDEF subtables (`ItemVarStore`) are not
/// represented: this core does not resolve variation indices (§1).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gdef {
    pub glyph_class_def: Option<ClassDef>,
    pub mark_attach_class_def: Option<ClassDef>,
    pub mark_glyph_sets: Option<MarkGlyphSets>,
}

impl Gdef {
    pub fn glyph_class(&self, gid: GlyphId) -> Option<GlyphClass> {
        self.glyph_class_def
            .as_ref()
            .and_then(|cd| GlyphClass::from_u16(cd.get(gid)))
    }

    /// The glyph's mark-attachment class, defaulting to 0 per `ClassDef`
    /// semantics, but only if a `MarkAttachClassDef` is present at all —
    /// the filter needs to distinguish "no attachment classes in this
    /// font" from "this glyph's attachment class happens to be 0".
    pub fn mark_attach_class(&self, gid: GlyphId) -> Option<u16> {
        self.mark_attach_class_def.as_ref().map(|cd| cd.get(gid))
    }

    pub fn mark_glyph_set(&self, index: u16) -> Option<&CoverageSet> {
        self.mark_glyph_sets.as_ref().and_then(|s| s.get(index))
    }

    pub fn encode_len(&self) -> usize {
        let header = 12 + 4; // version(4) + 3 table offsets(6) + markGlyphSetsDefOffset(2), rounded below
        let mut len = header;
        if let Some(cd) = &self.glyph_class_def {
            len += cd.encode_len();
        }
        // attach-list omitted: not represented by this core, written as a
        // null offset (see encode()).
        if let Some(cd) = &self.mark_attach_class_def {
            len += cd.encode_len();
        }
        if let Some(sets) = &self.mark_glyph_sets {
            len += 4 + sets.sets.iter().map(|s| s.encode_len()).sum::<usize>()
                + sets.sets.len() * 4;
        }
        len
    }

    pub fn encode(&self, sink: &mut ByteSink) {
        sink.write_u16(1); // major version
        sink.write_u16(if self.mark_glyph_sets.is_some() { 2 } else { 0 }); // minor version
        let has_sets = self.mark_glyph_sets.is_some();
        let header_len = if has_sets { 12 } else { 10 };
        let mut offset = header_len;
        let glyph_class_off = if self.glyph_class_def.is_some() {
            let o = offset;
            offset += self.glyph_class_def.as_ref().unwrap().encode_len();
            o
        } else {
            0
        };
        // attach list: never constructed by this core.
        let attach_list_off = 0usize;
        let mark_attach_off = if self.mark_attach_class_def.is_some() {
            let o = offset;
            offset += self.mark_attach_class_def.as_ref().unwrap().encode_len();
            o
        } else {
            0
        };
        let mark_glyph_sets_off = if has_sets { offset } else { 0 };

        sink.write_u16(glyph_class_off as u16);
        sink.write_u16(attach_list_off as u16);
        sink.write_u16(mark_attach_off as u16);
        if has_sets {
            sink.write_u16(mark_glyph_sets_off as u16);
        }
        if let Some(cd) = &self.glyph_class_def {
            cd.encode(sink);
        }
        if let Some(cd) = &self.mark_attach_class_def {
            cd.encode(sink);
        }
        if let Some(sets) = &self.mark_glyph_sets {
            let set_header_len = 2 + sets.sets.len() * 4;
            let mut set_offset = set_header_len;
            let mut set_offsets = Vec::with_capacity(sets.sets.len());
            for s in &sets.sets {
                set_offsets.push(set_offset);
                set_offset += s.encode_len();
            }
            sink.write_u16(sets.sets.len() as u16);
            for off in &set_offsets {
                sink.write_u32(*off as u32);
            }
            for s in &sets.sets {
                s.encode(sink);
            }
        }
    }

    pub fn read(data: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(data);
        let major = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("gdef", "truncated version"))?;
        let minor = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("gdef", "truncated version"))?;
        if major != 1 {
            return Err(Error::unsupported("gdef", format!("version {major}.{minor}")));
        }
        let glyph_class_off = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("gdef", "truncated glyph class offset"))?;
        let _attach_list_off = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("gdef", "truncated attach list offset"))?;
        let mark_attach_off = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("gdef", "truncated mark attach offset"))?;
        let mark_glyph_sets_off = if minor >= 2 {
            cur.read_u16()
        } else {
            None
        };

        let glyph_class_def = if glyph_class_off != 0 {
            Some(ClassDef::read(data, glyph_class_off as usize)?)
        } else {
            None
        };
        let mark_attach_class_def = if mark_attach_off != 0 {
            Some(ClassDef::read(data, mark_attach_off as usize)?)
        } else {
            None
        };
        let mark_glyph_sets = match mark_glyph_sets_off {
            Some(off) if off != 0 => Some(Self::read_mark_glyph_sets(data, off as usize)?),
            _ => None,
        };

        Ok(Gdef {
            glyph_class_def,
            mark_attach_class_def,
            mark_glyph_sets,
        })
    }

    fn read_mark_glyph_sets(data: &[u8], pos: usize) -> Result<MarkGlyphSets> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("gdef", "mark glyph sets offset out of bounds"))?;
        let mut cur = Cursor::new(base);
        let _format = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("gdef", "truncated mark glyph sets format"))?;
        let count = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("gdef", "truncated mark glyph sets count"))?;
        let mut sets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let off = cur
                .read_u32()
                .ok_or_else(|| Error::invalid("gdef", "truncated mark glyph set offset"))?;
            sets.push(if off != 0 {
                CoverageSet::read(base, off as usize)?
            } else {
                CoverageSet::default()
            });
        }
        Ok(MarkGlyphSets { sets })
    }
}

impl GlyphClass {
    #[cfg(test)]
    pub(crate) fn as_u16(self) -> u16 {
        self.to_u16()
    }
}
