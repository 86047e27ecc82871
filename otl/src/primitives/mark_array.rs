//! Mark arrays: per-mark (class, anchor) records.

use font_types::{ByteSink, Cursor};

use crate::error::{Error, Result};
use crate::primitives::Anchor;

/// One entry of a [`MarkArray`]: the mark's class (an index into the
/// base/ligature/mark2 array's per-class anchor slots) and its own anchor.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkRecord {
    pub mark_class: u16,
    pub mark_anchor: Anchor,
}

/// An array of mark records, indexed by the containing mark coverage
/// table's coverage index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkArray {
    pub records: Vec<MarkRecord>,
}

impl MarkArray {
    pub fn class_count(&self) -> u16 {
        let mut classes: Vec<u16> = self.records.iter().map(|r| r.mark_class).collect();
        classes.sort_unstable();
        classes.dedup();
        classes.len() as u16
    }

    pub fn encode_len(&self) -> usize {
        let header = 2 + self.records.len() * 4;
        let bodies: usize = self.records.iter().map(|r| r.mark_anchor.encode_len()).sum();
        header + bodies
    }

    pub fn encode(&self, sink: &mut ByteSink) {
        sink.write_u16(self.records.len() as u16);
        let header_len = 2 + self.records.len() * 4;
        let mut offset = header_len;
        let mut anchor_offsets = Vec::with_capacity(self.records.len());
        for r in &self.records {
            anchor_offsets.push(offset);
            offset += r.mark_anchor.encode_len();
        }
        for (r, anchor_off) in self.records.iter().zip(&anchor_offsets) {
            sink.write_u16(r.mark_class);
            sink.write_u16(*anchor_off as u16);
        }
        for r in &self.records {
            r.mark_anchor.encode(sink);
        }
    }

    pub fn read(data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("mark-array", "offset out of bounds"))?;
        let mut cur = Cursor::new(base);
        let count = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("mark-array", "truncated count"))?;
        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mark_class = cur
                .read_u16()
                .ok_or_else(|| Error::invalid("mark-array", "truncated mark class"))?;
            let anchor_offset = cur
                .read_u16()
                .ok_or_else(|| Error::invalid("mark-array", "truncated anchor offset"))?;
            let mark_anchor = Anchor::read(base, anchor_offset as usize)?;
            records.push(MarkRecord {
                mark_class,
                mark_anchor,
            });
        }
        Ok(MarkArray { records })
    }
}
