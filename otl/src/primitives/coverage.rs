//! Coverage tables.
//!
//! A coverage table maps a glyph id to a dense index `[0, n)` in ascending
//! glyph-id order. On the wire it has two formats — a sorted glyph array
//! (format 1) or a sorted array of glyph ranges with accumulated starting
//! index (format 2) — and the encoder picks whichever serializes smaller,
//! mirroring `write_fonts::tables::layout::CoverageTable::build` (which
//! also chooses the minimal-size format on write).

use font_types::{ByteSink, Cursor, GlyphId};

use crate::error::{Error, Result};

/// A glyph-id → coverage-index mapping, in ascending glyph-id order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverageTable {
    // always kept sorted + deduplicated by construction.
    glyphs: Vec<GlyphId>,
}

impl CoverageTable {
    pub fn from_glyphs(mut glyphs: Vec<GlyphId>) -> Self {
        glyphs.sort_unstable();
        glyphs.dedup();
        CoverageTable { glyphs }
    }

    pub fn contains(&self, gid: GlyphId) -> bool {
        self.glyphs.binary_search(&gid).is_ok()
    }

    pub fn index(&self, gid: GlyphId) -> Option<u16> {
        self.glyphs.binary_search(&gid).ok().map(|i| i as u16)
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = GlyphId> + '_ {
        self.glyphs.iter().copied()
    }

    /// Keep only the first `n` glyphs in index order.
    ///
    /// Used to reconcile a coverage table against a shorter parallel array
    /// (substitute list, rule set, anchor records) per the defensive
    /// parsing policy in §6.
    pub fn prune(&mut self, n: usize) {
        self.glyphs.truncate(n);
    }

    fn ranges(&self) -> Vec<(GlyphId, GlyphId, u16)> {
        let mut ranges = Vec::new();
        let mut iter = self.glyphs.iter().enumerate();
        if let Some((i0, &g0)) = iter.next() {
            let (mut start, mut start_idx, mut prev) = (g0, i0 as u16, g0);
            for (i, &g) in iter {
                if g.to_u16() == prev.to_u16().wrapping_add(1) {
                    prev = g;
                    continue;
                }
                ranges.push((start, prev, start_idx));
                start = g;
                start_idx = i as u16;
                prev = g;
            }
            ranges.push((start, prev, start_idx));
        }
        ranges
    }

    fn format1_len(&self) -> usize {
        4 + self.glyphs.len() * 2
    }

    fn format2_len(&self) -> usize {
        4 + self.ranges().len() * 6
    }

    pub fn encode_len(&self) -> usize {
        self.format1_len().min(self.format2_len())
    }

    pub fn encode(&self, sink: &mut ByteSink) {
        if self.format1_len() <= self.format2_len() {
            sink.write_u16(1);
            sink.write_u16(self.glyphs.len() as u16);
            for g in &self.glyphs {
                sink.write_glyph_id(*g);
            }
        } else {
            let ranges = self.ranges();
            sink.write_u16(2);
            sink.write_u16(ranges.len() as u16);
            for (start, end, start_idx) in ranges {
                sink.write_glyph_id(start);
                sink.write_glyph_id(end);
                sink.write_u16(start_idx);
            }
        }
    }

    pub fn read(data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("coverage", "offset out of bounds"))?;
        let mut cur = Cursor::new(base);
        let format = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("coverage", "truncated header"))?;
        match format {
            1 => {
                let count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("coverage", "truncated glyph count"))?;
                let mut glyphs = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let gid = cur
                        .read_glyph_id()
                        .ok_or_else(|| Error::invalid("coverage", "truncated glyph array"))?;
                    glyphs.push(gid);
                }
                Ok(CoverageTable::from_glyphs(glyphs))
            }
            2 => {
                let count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("coverage", "truncated range count"))?;
                let mut glyphs = Vec::new();
                for _ in 0..count {
                    let start = cur
                        .read_glyph_id()
                        .ok_or_else(|| Error::invalid("coverage", "truncated range record"))?;
                    let end = cur
                        .read_glyph_id()
                        .ok_or_else(|| Error::invalid("coverage", "truncated range record"))?;
                    let _start_idx = cur
                        .read_u16()
                        .ok_or_else(|| Error::invalid("coverage", "truncated range record"))?;
                    if start.to_u16() > end.to_u16() {
                        continue;
                    }
                    for raw in start.to_u16()..=end.to_u16() {
                        glyphs.push(GlyphId::new(raw));
                    }
                }
                Ok(CoverageTable::from_glyphs(glyphs))
            }
            other => Err(Error::invalid(
                "coverage",
                format!("unknown coverage format {other}"),
            )),
        }
    }
}

/// A coverage table used only for membership testing (no index is needed).
///
/// Identical wire representation to [`CoverageTable`]; kept as a distinct
/// type so call sites that only ever ask "is this glyph in the set" don't
/// carry around index-lookup API they won't use, matching the distinction
/// the specification draws between `CoverageTable` and `CoverageSet`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverageSet(CoverageTable);

impl CoverageSet {
    pub fn from_glyphs(glyphs: Vec<GlyphId>) -> Self {
        CoverageSet(CoverageTable::from_glyphs(glyphs))
    }

    pub fn contains(&self, gid: GlyphId) -> bool {
        self.0.contains(gid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = GlyphId> + '_ {
        self.0.iter()
    }

    pub fn encode_len(&self) -> usize {
        self.0.encode_len()
    }

    pub fn encode(&self, sink: &mut ByteSink) {
        self.0.encode(sink)
    }

    pub fn read(data: &[u8], pos: usize) -> Result<Self> {
        CoverageTable::read(data, pos).map(CoverageSet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gid(n: u16) -> GlyphId {
        GlyphId::new(n)
    }

    #[test]
    fn coverage_invariant() {
        let cov = CoverageTable::from_glyphs(vec![gid(9), gid(3), gid(3), gid(7)]);
        assert_eq!(cov.len(), 3);
        for (i, g) in cov.iter().enumerate() {
            assert_eq!(cov.index(g), Some(i as u16));
            assert!(cov.contains(g));
        }
        assert_eq!(cov.index(gid(4)), None);
        assert!(!cov.contains(gid(4)));
    }

    #[test]
    fn round_trip_format1() {
        let cov = CoverageTable::from_glyphs(vec![gid(1), gid(500), gid(1000)]);
        let mut sink = ByteSink::new();
        cov.encode(&mut sink);
        assert_eq!(sink.len(), cov.encode_len());
        let bytes = sink.into_vec();
        let decoded = CoverageTable::read(&bytes, 0).unwrap();
        assert_eq!(cov, decoded);
        let mut sink2 = ByteSink::new();
        decoded.encode(&mut sink2);
        assert_eq!(bytes, sink2.into_vec());
    }

    #[test]
    fn round_trip_format2_contiguous_run() {
        let glyphs: Vec<_> = (10..20).map(gid).collect();
        let cov = CoverageTable::from_glyphs(glyphs);
        let mut sink = ByteSink::new();
        cov.encode(&mut sink);
        let bytes = sink.into_vec();
        // contiguous run should pick format 2 (smaller than 10 * 2 + 4).
        assert_eq!(bytes[1], 2);
        let decoded = CoverageTable::read(&bytes, 0).unwrap();
        assert_eq!(cov, decoded);
    }

    #[test]
    fn prune_shortens_to_shorter_parallel_array() {
        let mut cov = CoverageTable::from_glyphs(vec![gid(1), gid(2), gid(3), gid(4)]);
        cov.prune(2);
        assert_eq!(cov.len(), 2);
        assert!(cov.contains(gid(2)));
        assert!(!cov.contains(gid(3)));
    }
}
