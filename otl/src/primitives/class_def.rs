//! Class definition tables.
//!
//! A `ClassDef` maps a glyph id to a class number; unlisted glyphs default
//! to class 0. Two wire formats, same idea as `CoverageTable`: a contiguous
//! start-glyph array (format 1) or sorted range records (format 2). The
//! encoder picks whichever is smaller, following
//! `write_fonts::tables::layout::ClassDef`.

use std::collections::BTreeMap;

use font_types::{ByteSink, Cursor, GlyphId};

use crate::error::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassDef {
    // glyphs with a non-zero class; absent glyphs are class 0.
    classes: BTreeMap<GlyphId, u16>,
}

impl ClassDef {
    pub fn from_map(classes: BTreeMap<GlyphId, u16>) -> Self {
        ClassDef {
            classes: classes.into_iter().filter(|(_, c)| *c != 0).collect(),
        }
    }

    pub fn get(&self, gid: GlyphId) -> u16 {
        self.classes.get(&gid).copied().unwrap_or(0)
    }

    /// The number of distinct non-zero classes present, plus the implicit
    /// class 0 — used by `write_fonts`-style pair-adjustment format-2
    /// encoders to size the `class1Count`/`class2Count` fields.
    pub fn class_count(&self) -> u16 {
        let mut classes: Vec<u16> = self.classes.values().copied().collect();
        classes.push(0);
        classes.sort_unstable();
        classes.dedup();
        classes.len() as u16
    }

    pub fn iter(&self) -> impl Iterator<Item = (GlyphId, u16)> + '_ {
        self.classes.iter().map(|(g, c)| (*g, *c))
    }

    fn ranges(&self) -> Vec<(GlyphId, GlyphId, u16)> {
        let mut ranges = Vec::new();
        let mut iter = self.classes.iter().peekable();
        while let Some((&start, &class)) = iter.next() {
            let mut end = start;
            while let Some(&(&next, &next_class)) = iter.peek() {
                if next.to_u16() == end.to_u16().wrapping_add(1) && next_class == class {
                    end = next;
                    iter.next();
                } else {
                    break;
                }
            }
            ranges.push((start, end, class));
        }
        ranges
    }

    fn format1_len(&self) -> Option<usize> {
        let start = *self.classes.keys().next()?;
        let end = *self.classes.keys().next_back()?;
        let span = (end.to_u16() - start.to_u16()) as usize + 1;
        Some(6 + span * 2)
    }

    fn format2_len(&self) -> usize {
        4 + self.ranges().len() * 6
    }

    pub fn encode_len(&self) -> usize {
        match self.format1_len() {
            Some(f1) => f1.min(self.format2_len()),
            None => self.format2_len().max(4),
        }
    }

    pub fn encode(&self, sink: &mut ByteSink) {
        let f2_len = self.format2_len();
        match self.format1_len() {
            Some(f1_len) if f1_len <= f2_len => {
                let start = *self.classes.keys().next().unwrap();
                let end = *self.classes.keys().next_back().unwrap();
                let span = end.to_u16() - start.to_u16() + 1;
                sink.write_u16(1);
                sink.write_glyph_id(start);
                sink.write_u16(span);
                for raw in start.to_u16()..=end.to_u16() {
                    sink.write_u16(self.get(GlyphId::new(raw)));
                }
            }
            _ => {
                let ranges = self.ranges();
                sink.write_u16(2);
                sink.write_u16(ranges.len() as u16);
                for (start, end, class) in ranges {
                    sink.write_glyph_id(start);
                    sink.write_glyph_id(end);
                    sink.write_u16(class);
                }
            }
        }
    }

    pub fn read(data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("classdef", "offset out of bounds"))?;
        let mut cur = Cursor::new(base);
        let format = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("classdef", "truncated header"))?;
        let mut classes = BTreeMap::new();
        match format {
            1 => {
                let start = cur
                    .read_glyph_id()
                    .ok_or_else(|| Error::invalid("classdef", "truncated start glyph"))?;
                let count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("classdef", "truncated count"))?;
                for i in 0..count {
                    let class = cur
                        .read_u16()
                        .ok_or_else(|| Error::invalid("classdef", "truncated class array"))?;
                    if class != 0 {
                        classes.insert(GlyphId::new(start.to_u16().wrapping_add(i)), class);
                    }
                }
            }
            2 => {
                let count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("classdef", "truncated range count"))?;
                for _ in 0..count {
                    let start = cur
                        .read_glyph_id()
                        .ok_or_else(|| Error::invalid("classdef", "truncated range"))?;
                    let end = cur
                        .read_glyph_id()
                        .ok_or_else(|| Error::invalid("classdef", "truncated range"))?;
                    let class = cur
                        .read_u16()
                        .ok_or_else(|| Error::invalid("classdef", "truncated range"))?;
                    if start.to_u16() > end.to_u16() || class == 0 {
                        continue;
                    }
                    for raw in start.to_u16()..=end.to_u16() {
                        classes.insert(GlyphId::new(raw), class);
                    }
                }
            }
            other => {
                return Err(Error::invalid(
                    "classdef",
                    format!("unknown classdef format {other}"),
                ))
            }
        }
        Ok(ClassDef::from_map(classes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlisted_glyphs_are_class_zero() {
        let mut map = BTreeMap::new();
        map.insert(GlyphId::new(5), 2);
        let cd = ClassDef::from_map(map);
        assert_eq!(cd.get(GlyphId::new(5)), 2);
        assert_eq!(cd.get(GlyphId::new(6)), 0);
    }

    #[test]
    fn round_trips_format1_and_format2() {
        let mut map = BTreeMap::new();
        for i in 0..5u16 {
            map.insert(GlyphId::new(100 + i), 1);
        }
        let cd = ClassDef::from_map(map);
        let mut sink = ByteSink::new();
        cd.encode(&mut sink);
        let bytes = sink.into_vec();
        let decoded = ClassDef::read(&bytes, 0).unwrap();
        assert_eq!(cd, decoded);
        let mut sink2 = ByteSink::new();
        decoded.encode(&mut sink2);
        assert_eq!(bytes, sink2.into_vec());
    }
}
