//! `LookupList<T>`: the indexed collection of [`Lookup`]s every feature
//! points into, plus the extension-subtable indirection of §4.8.
//!
//! Grounded loosely on `write_fonts::graph`'s iterative offset-overflow
//! resolution (lay out optimistically, promote the object(s) that don't
//! fit, relay out), narrowed from that crate's general object graph to the
//! one overflow this engine ever needs to resolve: a `Lookup` table's
//! `Offset16` subtable pointers.

use font_types::ByteSink;

use crate::error::{Error, Result};
use crate::lookup::{Lookup, LookupFlag, SubtableCodec};

const EXTENSION_WRAPPER_LEN: usize = 8; // format(2) + extensionLookupType(2) + extensionOffset(4)

/// An ordered, indexable collection of lookups of one table (`GSUB` or
/// `GPOS`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LookupList<T> {
    pub lookups: Vec<Lookup<T>>,
}

impl<T: SubtableCodec> LookupList<T> {
    pub fn get(&self, index: u16) -> Option<&Lookup<T>> {
        self.lookups.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    fn header_len(lookup: &Lookup<T>) -> usize {
        let mark_set = if lookup.flag.contains(LookupFlag::USE_MARK_FILTERING_SET) {
            2
        } else {
            0
        };
        6 + lookup.subtables.len() * 2 + mark_set
    }

    /// Compute a full byte layout for a given promotion choice, returning
    /// `None` when some `Offset16` in that layout would not fit.
    fn try_layout(&self, promoted: &[bool]) -> Option<Layout> {
        let n = self.lookups.len();
        let header_list_len = 2 + n * 2;
        let header_lens: Vec<usize> = self.lookups.iter().map(Self::header_len).collect();
        let mut header_offsets = Vec::with_capacity(n);
        let mut offset = header_list_len;
        for len in &header_lens {
            header_offsets.push(offset);
            offset += len;
        }
        let inline_start = offset;

        let inline_sizes: Vec<usize> = self
            .lookups
            .iter()
            .zip(promoted)
            .map(|(lookup, &is_promoted)| {
                if is_promoted {
                    lookup.subtables.len() * EXTENSION_WRAPPER_LEN
                } else {
                    lookup.subtables.iter().map(T::encode_len).sum()
                }
            })
            .collect();
        let mut inline_offsets = Vec::with_capacity(n);
        let mut offset = inline_start;
        for size in &inline_sizes {
            inline_offsets.push(offset);
            offset += size;
        }
        let ext_pool_start = offset;

        let mut subtable_target_abs = Vec::with_capacity(n);
        let mut subtable_rel_offsets = Vec::with_capacity(n);
        let mut ext_body_abs = Vec::with_capacity(n);
        let mut ext_cursor = ext_pool_start;
        let mut feasible = true;

        for (i, lookup) in self.lookups.iter().enumerate() {
            let mut targets = Vec::with_capacity(lookup.subtables.len());
            let mut rel = Vec::with_capacity(lookup.subtables.len());
            let mut bodies = Vec::with_capacity(lookup.subtables.len());
            let mut within = inline_offsets[i];
            for subtable in &lookup.subtables {
                let target = within;
                targets.push(target);
                let delta = target as isize - header_offsets[i] as isize;
                if delta < 0 || delta > u16::MAX as isize {
                    feasible = false;
                }
                rel.push(delta.max(0) as u16);
                if promoted[i] {
                    within += EXTENSION_WRAPPER_LEN;
                    bodies.push(ext_cursor);
                    ext_cursor += subtable.encode_len();
                } else {
                    within += subtable.encode_len();
                    bodies.push(0);
                }
            }
            subtable_target_abs.push(targets);
            subtable_rel_offsets.push(rel);
            ext_body_abs.push(bodies);
            if header_offsets[i] > u16::MAX as usize {
                feasible = false;
            }
        }

        let total_len = ext_cursor;
        let layout = Layout {
            _header_list_len: header_list_len,
            header_offsets,
            subtable_target_abs,
            subtable_rel_offsets,
            ext_body_abs,
            total_len,
            promoted: promoted.to_vec(),
        };
        feasible.then_some(layout)
    }

    /// Find a feasible layout, promoting the largest not-yet-promoted
    /// lookup on each failure, per §4.8.
    fn plan(&self) -> Result<Layout> {
        let n = self.lookups.len();
        let mut promoted = vec![false; n];
        loop {
            if let Some(layout) = self.try_layout(&promoted) {
                return Ok(layout);
            }
            let raw_size = |lookup: &Lookup<T>| -> usize {
                lookup.subtables.iter().map(T::encode_len).sum()
            };
            let next = (0..n)
                .filter(|&i| !promoted[i])
                .max_by_key(|&i| raw_size(&self.lookups[i]));
            match next {
                Some(i) => promoted[i] = true,
                None => {
                    return Err(Error::unsupported(
                        "lookup-list",
                        "offsets exceed 16-bit range even after promoting every lookup",
                    ))
                }
            }
        }
    }

    pub fn encode_len(&self) -> Result<usize> {
        Ok(self.plan()?.total_len)
    }

    pub fn encode(&self, sink: &mut ByteSink) -> Result<()> {
        let layout = self.plan()?;
        let promoted = &layout.promoted;

        sink.write_u16(self.lookups.len() as u16);
        for &offset in &layout.header_offsets {
            sink.write_u16(offset as u16);
        }
        for (i, lookup) in self.lookups.iter().enumerate() {
            let lookup_type = if promoted[i] {
                T::EXTENSION_LOOKUP_TYPE
            } else {
                lookup.lookup_type
            };
            sink.write_u16(lookup_type);
            sink.write_u16(lookup.flag.bits());
            sink.write_u16(lookup.subtables.len() as u16);
            for &rel in &layout.subtable_rel_offsets[i] {
                sink.write_u16(rel);
            }
            if lookup.flag.contains(LookupFlag::USE_MARK_FILTERING_SET) {
                sink.write_u16(lookup.mark_filtering_set.unwrap_or(0));
            }
        }
        for (i, lookup) in self.lookups.iter().enumerate() {
            for (j, subtable) in lookup.subtables.iter().enumerate() {
                if promoted[i] {
                    let wrapper_abs = layout.subtable_target_abs[i][j];
                    let body_abs = layout.ext_body_abs[i][j];
                    sink.write_u16(1);
                    sink.write_u16(lookup.lookup_type);
                    sink.write_u32((body_abs - wrapper_abs) as u32);
                } else {
                    subtable.encode(sink);
                }
            }
        }
        for (i, lookup) in self.lookups.iter().enumerate() {
            if promoted[i] {
                for subtable in &lookup.subtables {
                    subtable.encode(sink);
                }
            }
        }
        Ok(())
    }

    pub fn read(data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("lookup-list", "offset out of bounds"))?;
        let mut cur = font_types::Cursor::new(base);
        let count = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("lookup-list", "truncated lookup count"))?;
        let mut offsets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            offsets.push(
                cur.read_u16()
                    .ok_or_else(|| Error::invalid("lookup-list", "truncated lookup offset"))?,
            );
        }
        let lookups = offsets
            .into_iter()
            .map(|off| Self::read_lookup(base, off as usize))
            .collect::<Result<Vec<_>>>()?;
        Ok(LookupList { lookups })
    }

    fn read_lookup(data: &[u8], pos: usize) -> Result<Lookup<T>> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("lookup", "offset out of bounds"))?;
        let mut cur = font_types::Cursor::new(base);
        let lookup_type = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("lookup", "truncated lookup type"))?;
        let flag_bits = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("lookup", "truncated lookup flag"))?;
        let flag = LookupFlag::from_bits_truncate(flag_bits);
        let subtable_count = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("lookup", "truncated subtable count"))?;
        let mut subtable_offsets = Vec::with_capacity(subtable_count as usize);
        for _ in 0..subtable_count {
            subtable_offsets.push(
                cur.read_u16()
                    .ok_or_else(|| Error::invalid("lookup", "truncated subtable offset"))?,
            );
        }
        let mark_filtering_set = if flag.contains(LookupFlag::USE_MARK_FILTERING_SET) {
            Some(
                cur.read_u16()
                    .ok_or_else(|| Error::invalid("lookup", "truncated mark filtering set"))?,
            )
        } else {
            None
        };

        let is_extension = lookup_type == T::EXTENSION_LOOKUP_TYPE;
        let mut real_type = lookup_type;
        let mut subtables = Vec::with_capacity(subtable_offsets.len());
        for (idx, &sub_off) in subtable_offsets.iter().enumerate() {
            if is_extension {
                let wrapper = base
                    .get(sub_off as usize..)
                    .ok_or_else(|| Error::invalid("lookup", "extension offset out of bounds"))?;
                let mut wcur = font_types::Cursor::new(wrapper);
                let format = wcur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("lookup", "truncated extension format"))?;
                if format != 1 {
                    return Err(Error::invalid("lookup", "unrecognized extension format"));
                }
                let ext_type = wcur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("lookup", "truncated extension lookup type"))?;
                let ext_offset = wcur
                    .read_u32()
                    .ok_or_else(|| Error::invalid("lookup", "truncated extension offset"))?;
                if idx == 0 {
                    real_type = ext_type;
                } else if ext_type != real_type {
                    return Err(Error::invalid(
                        "lookup",
                        "extension subtables disagree on real lookup type",
                    ));
                }
                let real_pos = (sub_off as usize)
                    .checked_add(ext_offset as usize)
                    .ok_or_else(|| Error::invalid("lookup", "extension offset overflow"))?;
                subtables.push(T::read(real_type, base, real_pos)?);
            } else {
                subtables.push(T::read(lookup_type, base, sub_off as usize)?);
            }
        }

        Ok(Lookup {
            lookup_type: real_type,
            flag,
            mark_filtering_set,
            subtables,
        })
    }
}

struct Layout {
    _header_list_len: usize,
    header_offsets: Vec<usize>,
    subtable_target_abs: Vec<Vec<usize>>,
    subtable_rel_offsets: Vec<Vec<u16>>,
    ext_body_abs: Vec<Vec<usize>>,
    total_len: usize,
    promoted: Vec<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtables::gpos::GposSubtable;

    fn single_uniform(x_advance: i16) -> GposSubtable {
        use crate::primitives::{CoverageTable, ValueRecord};
        GposSubtable::SingleUniform {
            coverage: CoverageTable::from_glyphs(vec![font_types::GlyphId::new(5)]),
            value: ValueRecord {
                x_advance,
                ..Default::default()
            },
        }
    }

    #[test]
    fn round_trips_small_lookup_list_without_promotion() {
        let list = LookupList {
            lookups: vec![Lookup::new(1, LookupFlag::empty(), vec![single_uniform(10)])],
        };
        let mut sink = ByteSink::new();
        list.encode(&mut sink).unwrap();
        let bytes = sink.into_vec();
        let decoded = LookupList::<GposSubtable>::read(&bytes, 0).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn promotes_a_lookup_when_offsets_would_overflow() {
        // A lookup whose subtable bodies alone exceed 0xFFFF bytes forces
        // promotion to an extension lookup on encode, and must still
        // decode back to the same unwrapped lookup type and subtables.
        let big_coverage: Vec<font_types::GlyphId> = (0..4_000u32)
            .map(|g| font_types::GlyphId::new(g as u16))
            .collect();
        use crate::primitives::{CoverageTable, ValueRecord};
        let oversized = GposSubtable::SingleList {
            coverage: CoverageTable::from_glyphs(big_coverage),
            values: (0..4_000u32)
                .map(|_| ValueRecord {
                    x_advance: 1,
                    ..Default::default()
                })
                .collect(),
        };
        let list = LookupList {
            lookups: vec![
                Lookup::new(1, LookupFlag::empty(), vec![single_uniform(1)]),
                Lookup::new(1, LookupFlag::empty(), vec![oversized]),
            ],
        };
        let mut sink = ByteSink::new();
        list.encode(&mut sink).unwrap();
        let bytes = sink.into_vec();
        let decoded = LookupList::<GposSubtable>::read(&bytes, 0).unwrap();
        assert_eq!(decoded, list);
    }
}
