//! GPOS subtable formats.

use font_types::{ByteSink, Cursor, GlyphId};
use log::trace;

use crate::error::{Error, Result};
use crate::glyph::Glyph;
use crate::lookup::SubtableCodec;
use crate::primitives::{Anchor, CoverageTable, ClassDef, MarkArray, ValueFormat, ValueRecord};

use super::context::{ChainedSequenceContext, SequenceContext};
use super::{find_preceding_covered, Match};

fn sat_i16(x: i32) -> i16 {
    x.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GposSubtable {
    /// 1.1: same value record applied to every covered glyph.
    SingleUniform {
        coverage: CoverageTable,
        value: ValueRecord,
    },
    /// 1.2: per-coverage-index value record.
    SingleList {
        coverage: CoverageTable,
        values: Vec<ValueRecord>,
    },
    /// 2.1: explicit glyph pairs.
    PairList {
        coverage: CoverageTable,
        pair_sets: Vec<Vec<(GlyphId, ValueRecord, ValueRecord)>>,
    },
    /// 2.2: class-pair grid.
    PairClass {
        coverage: CoverageTable,
        class_def1: ClassDef,
        class_def2: ClassDef,
        class2_count: u16,
        records: Vec<(ValueRecord, ValueRecord)>,
    },
    /// 3.1: cursive attachment, one (entry, exit) anchor pair per covered
    /// glyph (either may be absent).
    Cursive {
        coverage: CoverageTable,
        entry_exit: Vec<(Option<Anchor>, Option<Anchor>)>,
    },
    /// 4.1: mark to base.
    MarkToBase {
        mark_coverage: CoverageTable,
        base_coverage: CoverageTable,
        mark_array: MarkArray,
        base_array: Vec<Vec<Anchor>>,
    },
    /// 5.1: mark to ligature. Component selection is simplified to the
    /// first ligature component — this core's `Glyph` does not carry a
    /// per-glyph ligature-component tag, so it cannot recover which
    /// component a given mark followed from an earlier GSUB 4.1
    /// substitution.
    MarkToLigature {
        mark_coverage: CoverageTable,
        ligature_coverage: CoverageTable,
        mark_array: MarkArray,
        ligature_array: Vec<Vec<Vec<Anchor>>>,
    },
    /// 6.1: mark to mark.
    MarkToMark {
        mark1_coverage: CoverageTable,
        mark2_coverage: CoverageTable,
        mark1_array: MarkArray,
        mark2_array: Vec<Vec<Anchor>>,
    },
    Context(SequenceContext),
    ChainContext(ChainedSequenceContext),
    Unsupported {
        lookup_type: u16,
    },
}

impl GposSubtable {
    pub fn apply(
        &self,
        seq: &[Glyph],
        keep: &dyn Fn(GlyphId) -> bool,
        a: usize,
        b: usize,
        rtl: bool,
    ) -> Result<Option<Match>> {
        if a >= b {
            return Ok(None);
        }
        match self {
            GposSubtable::SingleUniform { coverage, value } => {
                let Some(_) = coverage.index(seq[a].gid) else {
                    return Ok(None);
                };
                value.check_applicable("gpos")?;
                let mut g = seq[a].clone();
                g.apply_value_record(value);
                trace!("gpos 1.1 match at {a}");
                Ok(Some(Match::replace(vec![a], vec![g], a + 1)))
            }
            GposSubtable::SingleList { coverage, values } => {
                let Some(idx) = coverage.index(seq[a].gid) else {
                    return Ok(None);
                };
                let Some(value) = values.get(idx as usize) else {
                    return Ok(None);
                };
                value.check_applicable("gpos")?;
                let mut g = seq[a].clone();
                g.apply_value_record(value);
                trace!("gpos 1.2 match at {a}");
                Ok(Some(Match::replace(vec![a], vec![g], a + 1)))
            }
            GposSubtable::PairList {
                coverage,
                pair_sets,
            } => {
                let Some(idx) = coverage.index(seq[a].gid) else {
                    return Ok(None);
                };
                let Some(set) = pair_sets.get(idx as usize) else {
                    return Ok(None);
                };
                let Some(b_pos) = next_kept(seq, keep, a + 1, b) else {
                    return Ok(None);
                };
                let gid2 = seq[b_pos].gid;
                let Some((_, v1, v2)) = set.iter().find(|(g, _, _)| *g == gid2) else {
                    return Ok(None);
                };
                v1.check_applicable("gpos")?;
                v2.check_applicable("gpos")?;
                trace!("gpos 2.1 pair match at {a},{b_pos}");
                let mut g1 = seq[a].clone();
                g1.apply_value_record(v1);
                let mut g2 = seq[b_pos].clone();
                g2.apply_value_record(v2);
                Ok(Some(Match::replace(vec![a, b_pos], vec![g1, g2], b_pos + 1)))
            }
            GposSubtable::PairClass {
                coverage,
                class_def1,
                class_def2,
                class2_count,
                records,
            } => {
                let Some(_) = coverage.index(seq[a].gid) else {
                    return Ok(None);
                };
                let Some(b_pos) = next_kept(seq, keep, a + 1, b) else {
                    return Ok(None);
                };
                let class1 = class_def1.get(seq[a].gid);
                let class2 = class_def2.get(seq[b_pos].gid);
                let idx = class1 as usize * *class2_count as usize + class2 as usize;
                let Some((v1, v2)) = records.get(idx) else {
                    return Ok(None);
                };
                v1.check_applicable("gpos")?;
                v2.check_applicable("gpos")?;
                trace!("gpos 2.2 pair match at {a},{b_pos} (classes {class1},{class2})");
                let mut g1 = seq[a].clone();
                g1.apply_value_record(v1);
                let mut g2 = seq[b_pos].clone();
                g2.apply_value_record(v2);
                Ok(Some(Match::replace(vec![a, b_pos], vec![g1, g2], b_pos + 1)))
            }
            GposSubtable::Cursive {
                coverage,
                entry_exit,
            } => {
                let Some(idx) = coverage.index(seq[a].gid) else {
                    return Ok(None);
                };
                let Some((entry, _exit)) = entry_exit.get(idx as usize) else {
                    return Ok(None);
                };
                let Some(entry) = entry.as_ref() else {
                    return Ok(None);
                };
                let Some(prev_pos) = find_preceding_covered(seq, keep, a, coverage) else {
                    return Ok(None);
                };
                let Some(prev_idx) = coverage.index(seq[prev_pos].gid) else {
                    return Ok(None);
                };
                let Some((_, prev_exit)) = entry_exit.get(prev_idx as usize) else {
                    return Ok(None);
                };
                let Some(prev_exit) = prev_exit.as_ref() else {
                    return Ok(None);
                };
                trace!("gpos 3.1 cursive match {prev_pos} -> {a}");
                let dx = prev_exit.x as i32 - entry.x as i32;
                let dy = prev_exit.y as i32 - entry.y as i32;
                let mut cur = seq[a].clone();
                let mut prev = seq[prev_pos].clone();
                if rtl {
                    cur.advance = cur.advance.saturating_sub(dx);
                    cur.y_offset = sat_i16(cur.y_offset as i32 + dy);
                } else {
                    prev.advance = prev.advance.saturating_add(dx);
                    cur.y_offset = sat_i16(cur.y_offset as i32 + dy);
                }
                Ok(Some(Match::replace(
                    vec![prev_pos, a],
                    vec![prev, cur],
                    a + 1,
                )))
            }
            GposSubtable::MarkToBase {
                mark_coverage,
                base_coverage,
                mark_array,
                base_array,
            } => {
                let Some(mark_idx) = mark_coverage.index(seq[a].gid) else {
                    return Ok(None);
                };
                let Some(record) = mark_array.records.get(mark_idx as usize) else {
                    return Ok(None);
                };
                let Some(base_pos) = find_preceding_covered(seq, keep, a, base_coverage) else {
                    return Ok(None);
                };
                let Some(base_idx) = base_coverage.index(seq[base_pos].gid) else {
                    return Ok(None);
                };
                let Some(base_anchors) = base_array.get(base_idx as usize) else {
                    return Ok(None);
                };
                let Some(base_anchor) = base_anchors.get(record.mark_class as usize) else {
                    return Ok(None);
                };
                trace!("gpos 4.1 mark-to-base {base_pos} -> {a}");
                let mut mark = seq[a].clone();
                apply_mark_anchor(seq, base_pos, a, base_anchor, &record.mark_anchor, &mut mark);
                Ok(Some(Match::replace(vec![a], vec![mark], a + 1)))
            }
            GposSubtable::MarkToLigature {
                mark_coverage,
                ligature_coverage,
                mark_array,
                ligature_array,
            } => {
                let Some(mark_idx) = mark_coverage.index(seq[a].gid) else {
                    return Ok(None);
                };
                let Some(record) = mark_array.records.get(mark_idx as usize) else {
                    return Ok(None);
                };
                let Some(lig_pos) = find_preceding_covered(seq, keep, a, ligature_coverage) else {
                    return Ok(None);
                };
                let Some(lig_idx) = ligature_coverage.index(seq[lig_pos].gid) else {
                    return Ok(None);
                };
                let Some(components) = ligature_array.get(lig_idx as usize) else {
                    return Ok(None);
                };
                // simplification documented on the variant: always the
                // first component.
                let Some(component) = components.first() else {
                    return Ok(None);
                };
                let Some(base_anchor) = component.get(record.mark_class as usize) else {
                    return Ok(None);
                };
                trace!("gpos 5.1 mark-to-ligature {lig_pos} -> {a}");
                let mut mark = seq[a].clone();
                apply_mark_anchor(seq, lig_pos, a, base_anchor, &record.mark_anchor, &mut mark);
                Ok(Some(Match::replace(vec![a], vec![mark], a + 1)))
            }
            GposSubtable::MarkToMark {
                mark1_coverage,
                mark2_coverage,
                mark1_array,
                mark2_array,
            } => {
                let Some(mark_idx) = mark1_coverage.index(seq[a].gid) else {
                    return Ok(None);
                };
                let Some(record) = mark1_array.records.get(mark_idx as usize) else {
                    return Ok(None);
                };
                let Some(base_pos) = find_preceding_covered(seq, keep, a, mark2_coverage) else {
                    return Ok(None);
                };
                let Some(base_idx) = mark2_coverage.index(seq[base_pos].gid) else {
                    return Ok(None);
                };
                let Some(base_anchors) = mark2_array.get(base_idx as usize) else {
                    return Ok(None);
                };
                let Some(base_anchor) = base_anchors.get(record.mark_class as usize) else {
                    return Ok(None);
                };
                trace!("gpos 6.1 mark-to-mark {base_pos} -> {a}");
                let mut mark = seq[a].clone();
                apply_mark_anchor(seq, base_pos, a, base_anchor, &record.mark_anchor, &mut mark);
                Ok(Some(Match::replace(vec![a], vec![mark], a + 1)))
            }
            GposSubtable::Context(ctx) => Ok(ctx.apply(seq, keep, a, b)),
            GposSubtable::ChainContext(ctx) => Ok(ctx.apply(seq, keep, a, b)),
            GposSubtable::Unsupported { .. } => Ok(None),
        }
    }
}

fn apply_mark_anchor(
    seq: &[Glyph],
    base_pos: usize,
    mark_pos: usize,
    base_anchor: &Anchor,
    mark_anchor: &Anchor,
    mark: &mut Glyph,
) {
    let base = &seq[base_pos];
    let sum_adv: i32 = seq[base_pos..mark_pos].iter().map(|g| g.advance).sum();
    let dx = base.x_offset as i32 + base_anchor.x as i32 - sum_adv - mark_anchor.x as i32;
    let dy = base.y_offset as i32 + base_anchor.y as i32 - mark_anchor.y as i32;
    mark.x_offset = sat_i16(dx);
    mark.y_offset = sat_i16(dy);
}

fn next_kept(seq: &[Glyph], keep: &dyn Fn(GlyphId) -> bool, mut pos: usize, bound: usize) -> Option<usize> {
    while pos < bound {
        if keep(seq[pos].gid) {
            return Some(pos);
        }
        pos += 1;
    }
    None
}

impl SubtableCodec for GposSubtable {
    const EXTENSION_LOOKUP_TYPE: u16 = 9;

    fn encode_len(&self) -> usize {
        match self {
            GposSubtable::SingleUniform { coverage, value } => {
                6 + ValueRecord::encode_len(value.format()) + coverage.encode_len()
            }
            GposSubtable::SingleList { coverage, values } => {
                let format = ValueRecord::format_or_min_nonzero(values.iter().copied());
                let per = ValueRecord::encode_len(format);
                8 + values.len() * per + coverage.encode_len()
            }
            GposSubtable::PairList {
                coverage,
                pair_sets,
            } => {
                let (f1, f2) = pair_formats(pair_sets.iter().flatten().map(|(_, v1, v2)| (*v1, *v2)));
                let header = 10 + pair_sets.len() * 2;
                let bodies: usize = pair_sets
                    .iter()
                    .map(|set| {
                        2 + set.len()
                            * (2 + ValueRecord::encode_len(f1) + ValueRecord::encode_len(f2))
                    })
                    .sum();
                header + coverage.encode_len() + bodies
            }
            GposSubtable::PairClass {
                coverage,
                class_def1,
                class_def2,
                class2_count,
                records,
            } => {
                let (f1, f2) =
                    pair_formats(records.iter().map(|(v1, v2)| (*v1, *v2)));
                let per = ValueRecord::encode_len(f1) + ValueRecord::encode_len(f2);
                let _ = class2_count;
                16 + coverage.encode_len()
                    + class_def1.encode_len()
                    + class_def2.encode_len()
                    + records.len() * per
            }
            GposSubtable::Cursive {
                coverage,
                entry_exit,
            } => {
                let header = 6 + entry_exit.len() * 4;
                let anchors: usize = entry_exit
                    .iter()
                    .flat_map(|(e, x)| [e, x])
                    .filter_map(|a| a.as_ref())
                    .map(|a| a.encode_len())
                    .sum();
                header + coverage.encode_len() + anchors
            }
            GposSubtable::MarkToBase {
                mark_coverage,
                base_coverage,
                mark_array,
                base_array,
            } => {
                let class_count = mark_array.class_count() as usize;
                let header = 12;
                let base_array_len = 2 + base_array.len() * class_count * 2
                    + base_array
                        .iter()
                        .flatten()
                        .map(|a| a.encode_len())
                        .sum::<usize>();
                header
                    + mark_coverage.encode_len()
                    + base_coverage.encode_len()
                    + mark_array.encode_len()
                    + base_array_len
            }
            GposSubtable::MarkToLigature {
                mark_coverage,
                ligature_coverage,
                mark_array,
                ligature_array,
            } => {
                let class_count = mark_array.class_count() as usize;
                let header = 12;
                let lig_array_header = 2 + ligature_array.len() * 2;
                let lig_attach_bodies: usize = ligature_array
                    .iter()
                    .map(|components| {
                        2 + components.len() * class_count * 2
                            + components
                                .iter()
                                .flatten()
                                .map(|a| a.encode_len())
                                .sum::<usize>()
                    })
                    .sum();
                header
                    + mark_coverage.encode_len()
                    + ligature_coverage.encode_len()
                    + mark_array.encode_len()
                    + lig_array_header
                    + lig_attach_bodies
            }
            GposSubtable::MarkToMark {
                mark1_coverage,
                mark2_coverage,
                mark1_array,
                mark2_array,
            } => {
                let class_count = mark1_array.class_count() as usize;
                let header = 12;
                let mark2_array_len = 2 + mark2_array.len() * class_count * 2
                    + mark2_array
                        .iter()
                        .flatten()
                        .map(|a| a.encode_len())
                        .sum::<usize>();
                header
                    + mark1_coverage.encode_len()
                    + mark2_coverage.encode_len()
                    + mark1_array.encode_len()
                    + mark2_array_len
            }
            GposSubtable::Context(ctx) => ctx.encode_len(),
            GposSubtable::ChainContext(ctx) => ctx.encode_len(),
            GposSubtable::Unsupported { .. } => {
                panic!("cannot encode an unsupported GPOS subtable placeholder")
            }
        }
    }

    fn encode(&self, sink: &mut ByteSink) {
        match self {
            GposSubtable::SingleUniform { coverage, value } => {
                let format = value.format();
                sink.write_u16(1);
                sink.write_u16(6);
                sink.write_u16(format.bits());
                value.encode(format, sink);
                coverage.encode(sink);
            }
            GposSubtable::SingleList { coverage, values } => {
                let format = ValueRecord::format_or_min_nonzero(values.iter().copied());
                sink.write_u16(2);
                sink.write_u16(8);
                sink.write_u16(format.bits());
                sink.write_u16(values.len() as u16);
                for v in values {
                    v.encode(format, sink);
                }
                coverage.encode(sink);
            }
            GposSubtable::PairList {
                coverage,
                pair_sets,
            } => {
                let (f1, f2) = pair_formats(pair_sets.iter().flatten().map(|(_, v1, v2)| (*v1, *v2)));
                sink.write_u16(1);
                let header_len = 10 + pair_sets.len() * 2;
                sink.write_u16(header_len as u16);
                sink.write_u16(f1.bits());
                sink.write_u16(f2.bits());
                sink.write_u16(pair_sets.len() as u16);
                let pair_len = |n: usize| 2 + n * (2 + ValueRecord::encode_len(f1) + ValueRecord::encode_len(f2));
                let mut offset = header_len + coverage.encode_len();
                let mut offsets = Vec::with_capacity(pair_sets.len());
                for s in pair_sets {
                    offsets.push(offset);
                    offset += pair_len(s.len());
                }
                for off in &offsets {
                    sink.write_u16(*off as u16);
                }
                coverage.encode(sink);
                for s in pair_sets {
                    sink.write_u16(s.len() as u16);
                    for (gid2, v1, v2) in s {
                        sink.write_glyph_id(*gid2);
                        v1.encode(f1, sink);
                        v2.encode(f2, sink);
                    }
                }
            }
            GposSubtable::PairClass {
                coverage,
                class_def1,
                class_def2,
                class2_count,
                records,
            } => {
                let (f1, f2) = pair_formats(records.iter().map(|(v1, v2)| (*v1, *v2)));
                let class1_count = class_def1.class_count();
                sink.write_u16(2);
                let header_len = 16;
                sink.write_u16(header_len as u16);
                sink.write_u16(f1.bits());
                sink.write_u16(f2.bits());
                let class_def1_off = header_len + coverage.encode_len();
                let class_def2_off = class_def1_off + class_def1.encode_len();
                sink.write_u16(class_def1_off as u16);
                sink.write_u16(class_def2_off as u16);
                sink.write_u16(class1_count);
                sink.write_u16(*class2_count);
                coverage.encode(sink);
                class_def1.encode(sink);
                class_def2.encode(sink);
                for (v1, v2) in records {
                    v1.encode(f1, sink);
                    v2.encode(f2, sink);
                }
            }
            GposSubtable::Cursive {
                coverage,
                entry_exit,
            } => {
                sink.write_u16(1);
                let header_len = 6 + entry_exit.len() * 4;
                sink.write_u16(header_len as u16);
                sink.write_u16(entry_exit.len() as u16);
                let mut offset = header_len + coverage.encode_len();
                let mut offsets = Vec::with_capacity(entry_exit.len() * 2);
                for (entry, exit) in entry_exit {
                    let e_off = if let Some(a) = entry {
                        let o = offset;
                        offset += a.encode_len();
                        o
                    } else {
                        0
                    };
                    let x_off = if let Some(a) = exit {
                        let o = offset;
                        offset += a.encode_len();
                        o
                    } else {
                        0
                    };
                    offsets.push((e_off, x_off));
                }
                for (e_off, x_off) in &offsets {
                    sink.write_u16(*e_off as u16);
                    sink.write_u16(*x_off as u16);
                }
                coverage.encode(sink);
                for (entry, exit) in entry_exit {
                    if let Some(a) = entry {
                        a.encode(sink);
                    }
                    if let Some(a) = exit {
                        a.encode(sink);
                    }
                }
            }
            GposSubtable::MarkToBase {
                mark_coverage,
                base_coverage,
                mark_array,
                base_array,
            } => encode_mark_to_simple_base(
                1,
                mark_coverage,
                base_coverage,
                mark_array,
                base_array,
                sink,
            ),
            GposSubtable::MarkToMark {
                mark1_coverage,
                mark2_coverage,
                mark1_array,
                mark2_array,
            } => encode_mark_to_simple_base(
                1,
                mark1_coverage,
                mark2_coverage,
                mark1_array,
                mark2_array,
                sink,
            ),
            GposSubtable::MarkToLigature {
                mark_coverage,
                ligature_coverage,
                mark_array,
                ligature_array,
            } => {
                sink.write_u16(1);
                let class_count = mark_array.class_count();
                let header_len = 12;
                let mark_cov_off = header_len;
                let lig_cov_off = mark_cov_off + mark_coverage.encode_len();
                let mark_array_off = lig_cov_off + ligature_coverage.encode_len();
                let lig_array_off = mark_array_off + mark_array.encode_len();
                sink.write_u16(mark_cov_off as u16);
                sink.write_u16(lig_cov_off as u16);
                sink.write_u16(class_count);
                sink.write_u16(mark_array_off as u16);
                sink.write_u16(lig_array_off as u16);
                mark_coverage.encode(sink);
                ligature_coverage.encode(sink);
                mark_array.encode(sink);
                sink.write_u16(ligature_array.len() as u16);
                let lig_header = 2 + ligature_array.len() * 2;
                let mut offset = lig_header;
                let mut lig_offsets = Vec::with_capacity(ligature_array.len());
                for components in ligature_array {
                    lig_offsets.push(offset);
                    offset += 2
                        + components.len() * class_count as usize * 2
                        + components
                            .iter()
                            .flatten()
                            .map(|a| a.encode_len())
                            .sum::<usize>();
                }
                for off in &lig_offsets {
                    sink.write_u16(*off as u16);
                }
                for components in ligature_array {
                    sink.write_u16(components.len() as u16);
                    let attach_header = 2 + components.len() * class_count as usize * 2;
                    let mut anchor_offset = attach_header;
                    let mut anchor_offsets = Vec::with_capacity(components.len() * class_count as usize);
                    for comp in components {
                        for c in 0..class_count as usize {
                            match comp.get(c) {
                                Some(a) => {
                                    anchor_offsets.push(anchor_offset);
                                    anchor_offset += a.encode_len();
                                }
                                None => anchor_offsets.push(0),
                            }
                        }
                    }
                    let mut it = anchor_offsets.iter();
                    for comp in components {
                        for _ in 0..class_count {
                            let off = it.next().copied().unwrap_or(0);
                            sink.write_u16(if off == 0 { 0 } else { off as u16 });
                        }
                        let _ = comp;
                    }
                    for comp in components {
                        for c in 0..class_count as usize {
                            if let Some(a) = comp.get(c) {
                                a.encode(sink);
                            }
                        }
                    }
                }
            }
            GposSubtable::Context(ctx) => ctx.encode(sink),
            GposSubtable::ChainContext(ctx) => ctx.encode(sink),
            GposSubtable::Unsupported { .. } => {
                panic!("cannot encode an unsupported GPOS subtable placeholder")
            }
        }
    }

    fn read(lookup_type: u16, data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("gpos", "subtable offset out of bounds"))?;
        match lookup_type {
            1 => {
                let mut cur = Cursor::new(base);
                let format = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated format"))?;
                let cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated coverage offset"))?;
                let coverage = CoverageTable::read(base, cov_off as usize)?;
                match format {
                    1 => {
                        let fmt_bits = cur
                            .read_u16()
                            .ok_or_else(|| Error::invalid("gpos", "truncated value format"))?;
                        let format = ValueFormat::from_bits_truncate(fmt_bits);
                        let value = ValueRecord::read(&mut cur, format)?;
                        Ok(GposSubtable::SingleUniform { coverage, value })
                    }
                    2 => {
                        let fmt_bits = cur
                            .read_u16()
                            .ok_or_else(|| Error::invalid("gpos", "truncated value format"))?;
                        let format = ValueFormat::from_bits_truncate(fmt_bits);
                        let count = cur
                            .read_u16()
                            .ok_or_else(|| Error::invalid("gpos", "truncated value count"))?;
                        let mut values = Vec::with_capacity(count as usize);
                        for _ in 0..count {
                            values.push(ValueRecord::read(&mut cur, format)?);
                        }
                        let mut coverage = coverage;
                        if coverage.len() != values.len() {
                            log::warn!("gpos 1.2: coverage/value length mismatch, pruning");
                            coverage.prune(coverage.len().min(values.len()));
                        }
                        Ok(GposSubtable::SingleList { coverage, values })
                    }
                    other => Err(Error::invalid("gpos", format!("unknown format 1.{other}"))),
                }
            }
            2 => {
                let mut cur = Cursor::new(base);
                let format = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated format"))?;
                let cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated coverage offset"))?;
                let f1_bits = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated value format 1"))?;
                let f2_bits = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated value format 2"))?;
                let f1 = ValueFormat::from_bits_truncate(f1_bits);
                let f2 = ValueFormat::from_bits_truncate(f2_bits);
                let coverage = CoverageTable::read(base, cov_off as usize)?;
                match format {
                    1 => {
                        let count = cur
                            .read_u16()
                            .ok_or_else(|| Error::invalid("gpos", "truncated pair set count"))?;
                        let mut offsets = Vec::with_capacity(count as usize);
                        for _ in 0..count {
                            offsets.push(
                                cur.read_u16()
                                    .ok_or_else(|| Error::invalid("gpos", "truncated pair set offset"))?,
                            );
                        }
                        let pair_sets = offsets
                            .into_iter()
                            .map(|o| read_pair_set(base, o as usize, f1, f2))
                            .collect::<Result<Vec<_>>>()?;
                        Ok(GposSubtable::PairList {
                            coverage,
                            pair_sets,
                        })
                    }
                    2 => {
                        let class_def1_off = cur
                            .read_u16()
                            .ok_or_else(|| Error::invalid("gpos", "truncated class def 1 offset"))?;
                        let class_def2_off = cur
                            .read_u16()
                            .ok_or_else(|| Error::invalid("gpos", "truncated class def 2 offset"))?;
                        let class1_count = cur
                            .read_u16()
                            .ok_or_else(|| Error::invalid("gpos", "truncated class1 count"))?;
                        let class2_count = cur
                            .read_u16()
                            .ok_or_else(|| Error::invalid("gpos", "truncated class2 count"))?;
                        let class_def1 = ClassDef::read(base, class_def1_off as usize)?;
                        let class_def2 = ClassDef::read(base, class_def2_off as usize)?;
                        let total = class1_count as usize * class2_count as usize;
                        let mut records = Vec::with_capacity(total);
                        for _ in 0..total {
                            let v1 = ValueRecord::read(&mut cur, f1)?;
                            let v2 = ValueRecord::read(&mut cur, f2)?;
                            records.push((v1, v2));
                        }
                        Ok(GposSubtable::PairClass {
                            coverage,
                            class_def1,
                            class_def2,
                            class2_count,
                            records,
                        })
                    }
                    other => Err(Error::invalid("gpos", format!("unknown format 2.{other}"))),
                }
            }
            3 => {
                let mut cur = Cursor::new(base);
                let _format = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated format"))?;
                let cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated coverage offset"))?;
                let count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated entry exit count"))?;
                let mut pairs = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let entry_off = cur
                        .read_u16()
                        .ok_or_else(|| Error::invalid("gpos", "truncated entry offset"))?;
                    let exit_off = cur
                        .read_u16()
                        .ok_or_else(|| Error::invalid("gpos", "truncated exit offset"))?;
                    pairs.push((entry_off, exit_off));
                }
                let coverage = CoverageTable::read(base, cov_off as usize)?;
                let entry_exit = pairs
                    .into_iter()
                    .map(|(e, x)| {
                        let entry = if e != 0 {
                            Some(Anchor::read(base, e as usize)?)
                        } else {
                            None
                        };
                        let exit = if x != 0 {
                            Some(Anchor::read(base, x as usize)?)
                        } else {
                            None
                        };
                        Ok((entry, exit))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(GposSubtable::Cursive {
                    coverage,
                    entry_exit,
                })
            }
            4 => {
                let (mark_coverage, base_coverage, mark_array, base_array) =
                    read_mark_to_simple_base(base)?;
                Ok(GposSubtable::MarkToBase {
                    mark_coverage,
                    base_coverage,
                    mark_array,
                    base_array,
                })
            }
            6 => {
                let (mark1_coverage, mark2_coverage, mark1_array, mark2_array) =
                    read_mark_to_simple_base(base)?;
                Ok(GposSubtable::MarkToMark {
                    mark1_coverage,
                    mark2_coverage,
                    mark1_array,
                    mark2_array,
                })
            }
            5 => {
                let mut cur = Cursor::new(base);
                let _format = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated format"))?;
                let mark_cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated mark coverage offset"))?;
                let lig_cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated ligature coverage offset"))?;
                let class_count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated class count"))?;
                let mark_array_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated mark array offset"))?;
                let lig_array_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gpos", "truncated ligature array offset"))?;
                let mark_coverage = CoverageTable::read(base, mark_cov_off as usize)?;
                let ligature_coverage = CoverageTable::read(base, lig_cov_off as usize)?;
                let mark_array = MarkArray::read(base, mark_array_off as usize)?;
                let ligature_array = read_ligature_array(base, lig_array_off as usize, class_count)?;
                Ok(GposSubtable::MarkToLigature {
                    mark_coverage,
                    ligature_coverage,
                    mark_array,
                    ligature_array,
                })
            }
            7 => Ok(GposSubtable::Context(SequenceContext::read(data, pos)?)),
            8 => Ok(GposSubtable::ChainContext(ChainedSequenceContext::read(
                data, pos,
            )?)),
            other => {
                log::warn!("gpos: unsupported lookup type {other}, installing inert placeholder");
                Ok(GposSubtable::Unsupported {
                    lookup_type: other,
                })
            }
        }
    }
}

fn pair_formats(pairs: impl Iterator<Item = (ValueRecord, ValueRecord)>) -> (ValueFormat, ValueFormat) {
    let mut f1 = ValueFormat::empty();
    let mut f2 = ValueFormat::empty();
    let mut any = false;
    for (v1, v2) in pairs {
        any = true;
        f1 |= v1.format();
        f2 |= v2.format();
    }
    if !any {
        f1 = ValueFormat::X_ADVANCE;
    }
    (f1, f2)
}

fn read_pair_set(
    data: &[u8],
    pos: usize,
    f1: ValueFormat,
    f2: ValueFormat,
) -> Result<Vec<(GlyphId, ValueRecord, ValueRecord)>> {
    let base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("gpos", "pair set offset out of bounds"))?;
    let mut cur = Cursor::new(base);
    let count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gpos", "truncated pair value count"))?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let gid2 = cur
            .read_glyph_id()
            .ok_or_else(|| Error::invalid("gpos", "truncated second glyph"))?;
        let v1 = ValueRecord::read(&mut cur, f1)?;
        let v2 = ValueRecord::read(&mut cur, f2)?;
        out.push((gid2, v1, v2));
    }
    Ok(out)
}

fn encode_mark_to_simple_base(
    format: u16,
    mark_coverage: &CoverageTable,
    base_coverage: &CoverageTable,
    mark_array: &MarkArray,
    base_array: &[Vec<Anchor>],
    sink: &mut ByteSink,
) {
    sink.write_u16(format);
    let class_count = mark_array.class_count();
    let header_len = 12;
    let mark_cov_off = header_len;
    let base_cov_off = mark_cov_off + mark_coverage.encode_len();
    let mark_array_off = base_cov_off + base_coverage.encode_len();
    let base_array_off = mark_array_off + mark_array.encode_len();
    sink.write_u16(mark_cov_off as u16);
    sink.write_u16(base_cov_off as u16);
    sink.write_u16(class_count);
    sink.write_u16(mark_array_off as u16);
    sink.write_u16(base_array_off as u16);
    mark_coverage.encode(sink);
    base_coverage.encode(sink);
    mark_array.encode(sink);

    sink.write_u16(base_array.len() as u16);
    let header = 2 + base_array.len() * class_count as usize * 2;
    let mut offset = header;
    let mut offsets = Vec::with_capacity(base_array.len() * class_count as usize);
    for row in base_array {
        for c in 0..class_count as usize {
            match row.get(c) {
                Some(a) if !a.is_empty() || true => {
                    offsets.push(offset);
                    offset += a.encode_len();
                }
                _ => offsets.push(0),
            }
        }
    }
    for off in &offsets {
        sink.write_u16(*off as u16);
    }
    for row in base_array {
        for c in 0..class_count as usize {
            if let Some(a) = row.get(c) {
                a.encode(sink);
            }
        }
    }
}

fn read_mark_to_simple_base(
    base: &[u8],
) -> Result<(CoverageTable, CoverageTable, MarkArray, Vec<Vec<Anchor>>)> {
    let mut cur = Cursor::new(base);
    let _format = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gpos", "truncated format"))?;
    let mark_cov_off = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gpos", "truncated mark coverage offset"))?;
    let base_cov_off = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gpos", "truncated base coverage offset"))?;
    let class_count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gpos", "truncated class count"))?;
    let mark_array_off = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gpos", "truncated mark array offset"))?;
    let base_array_off = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gpos", "truncated base array offset"))?;
    let mark_coverage = CoverageTable::read(base, mark_cov_off as usize)?;
    let base_coverage = CoverageTable::read(base, base_cov_off as usize)?;
    let mark_array = MarkArray::read(base, mark_array_off as usize)?;
    let base_array = read_base_array(base, base_array_off as usize, class_count)?;
    Ok((mark_coverage, base_coverage, mark_array, base_array))
}

fn read_base_array(data: &[u8], pos: usize, class_count: u16) -> Result<Vec<Vec<Anchor>>> {
    let array_base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("gpos", "base array offset out of bounds"))?;
    let mut cur = Cursor::new(array_base);
    let count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gpos", "truncated base count"))?;
    let mut rows = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut row = Vec::with_capacity(class_count as usize);
        for _ in 0..class_count {
            let off = cur
                .read_u16()
                .ok_or_else(|| Error::invalid("gpos", "truncated base anchor offset"))?;
            row.push(if off != 0 {
                Anchor::read(array_base, off as usize)?
            } else {
                Anchor::default()
            });
        }
        rows.push(row);
    }
    Ok(rows)
}

fn read_ligature_array(data: &[u8], pos: usize, class_count: u16) -> Result<Vec<Vec<Vec<Anchor>>>> {
    let array_base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("gpos", "ligature array offset out of bounds"))?;
    let mut cur = Cursor::new(array_base);
    let count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gpos", "truncated ligature count"))?;
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(
            cur.read_u16()
                .ok_or_else(|| Error::invalid("gpos", "truncated ligature attach offset"))?,
        );
    }
    offsets
        .into_iter()
        .map(|o| read_ligature_attach(array_base, o as usize, class_count))
        .collect()
}

fn read_ligature_attach(data: &[u8], pos: usize, class_count: u16) -> Result<Vec<Vec<Anchor>>> {
    let attach_base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("gpos", "ligature attach offset out of bounds"))?;
    let mut cur = Cursor::new(attach_base);
    let component_count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gpos", "truncated component count"))?;
    let mut components = Vec::with_capacity(component_count as usize);
    for _ in 0..component_count {
        let mut row = Vec::with_capacity(class_count as usize);
        for _ in 0..class_count {
            let off = cur
                .read_u16()
                .ok_or_else(|| Error::invalid("gpos", "truncated component anchor offset"))?;
            row.push(if off != 0 {
                Anchor::read(attach_base, off as usize)?
            } else {
                Anchor::default()
            });
        }
        components.push(row);
    }
    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gid(n: u16) -> GlyphId {
        GlyphId::new(n)
    }

    #[test]
    fn single_uniform_adjusts_advance() {
        let sub = GposSubtable::SingleUniform {
            coverage: CoverageTable::from_glyphs(vec![gid(5)]),
            value: ValueRecord {
                x_advance: 12,
                ..Default::default()
            },
        };
        let seq = vec![Glyph::new(gid(5), "x", 100)];
        let keep = |_: GlyphId| true;
        let m = sub.apply(&seq, &keep, 0, seq.len(), false).unwrap().unwrap();
        if let super::super::MatchKind::Replace(replace) = m.kind {
            assert_eq!(replace[0].advance, 112);
        } else {
            panic!("expected replace");
        }
    }

    #[test]
    fn apply_rejects_y_advance_at_apply_time() {
        let sub = GposSubtable::SingleUniform {
            coverage: CoverageTable::from_glyphs(vec![gid(5)]),
            value: ValueRecord {
                y_advance: 3,
                ..Default::default()
            },
        };
        let seq = vec![Glyph::new(gid(5), "x", 100)];
        let keep = |_: GlyphId| true;
        assert!(sub.apply(&seq, &keep, 0, seq.len(), false).is_err());
    }
}
