//! GSUB subtable formats: the tagged variant dispatched by `lookupType`.

use font_types::{ByteSink, Cursor, GlyphId};
use log::trace;

use crate::error::{Error, Result};
use crate::glyph::Glyph;
use crate::lookup::SubtableCodec;
use crate::primitives::CoverageTable;

use super::context::{ChainedSequenceContext, SequenceContext};
use super::Match;

/// One entry of a ligature set: the components after the first glyph
/// (already implied by the set's coverage index) plus the output glyph.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ligature {
    pub components: Vec<GlyphId>,
    pub glyph: GlyphId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GsubSubtable {
    /// 1.1: uniform delta.
    SingleDelta {
        coverage: CoverageTable,
        delta: i16,
    },
    /// 1.2: per-coverage-index substitute.
    SingleList {
        coverage: CoverageTable,
        substitutes: Vec<GlyphId>,
    },
    /// 2.1: one glyph expands to many.
    Multiple {
        coverage: CoverageTable,
        sequences: Vec<Vec<GlyphId>>,
    },
    /// 3.1: one glyph has several alternates; default policy picks index 0.
    Alternate {
        coverage: CoverageTable,
        alternate_sets: Vec<Vec<GlyphId>>,
    },
    /// 4.1: many glyphs collapse to one.
    Ligature {
        coverage: CoverageTable,
        ligature_sets: Vec<Vec<Ligature>>,
    },
    Context(SequenceContext),
    ChainContext(ChainedSequenceContext),
    /// 8.1: reverse-chaining single substitution; applied right-to-left by
    /// the outer driver (§4.3), not by anything in this subtable itself.
    ReverseChainSingle {
        coverage: CoverageTable,
        backtrack_coverages: Vec<CoverageTable>,
        lookahead_coverages: Vec<CoverageTable>,
        substitutes: Vec<GlyphId>,
    },
    /// A type/format combination this core does not understand. Parses
    /// successfully (so the rest of the lookup list is usable) but never
    /// matches; encoding one is a programming error (§4.2).
    Unsupported {
        lookup_type: u16,
    },
}

impl GsubSubtable {
    pub fn apply(
        &self,
        seq: &[Glyph],
        keep: &dyn Fn(GlyphId) -> bool,
        a: usize,
        b: usize,
    ) -> Option<Match> {
        if a >= b {
            return None;
        }
        match self {
            GsubSubtable::SingleDelta { coverage, delta } => {
                let gid = seq[a].gid;
                coverage.index(gid)?;
                let out = GlyphId::new(gid.to_u16().wrapping_add(*delta as u16));
                trace!("gsub 1.1 match at {a}: {gid} -> {out}");
                let mut g = seq[a].clone();
                g.gid = out;
                Some(Match::replace(vec![a], vec![g], a + 1))
            }
            GsubSubtable::SingleList {
                coverage,
                substitutes,
            } => {
                let idx = coverage.index(seq[a].gid)? as usize;
                let out = *substitutes.get(idx)?;
                trace!("gsub 1.2 match at {a}: -> {out}");
                let mut g = seq[a].clone();
                g.gid = out;
                Some(Match::replace(vec![a], vec![g], a + 1))
            }
            GsubSubtable::Multiple {
                coverage,
                sequences,
            } => {
                let idx = coverage.index(seq[a].gid)? as usize;
                let outputs = sequences.get(idx)?;
                if outputs.is_empty() {
                    return None;
                }
                trace!("gsub 2.1 match at {a}: expanding to {} glyphs", outputs.len());
                let mut replaced = Vec::with_capacity(outputs.len());
                for (i, gid) in outputs.iter().enumerate() {
                    let text = if i == 0 {
                        seq[a].text.clone()
                    } else {
                        String::new()
                    };
                    replaced.push(Glyph::new(*gid, text, 0));
                }
                Some(Match::replace(vec![a], replaced, a + outputs.len()))
            }
            GsubSubtable::Alternate {
                coverage,
                alternate_sets,
            } => {
                let idx = coverage.index(seq[a].gid)? as usize;
                let alternates = alternate_sets.get(idx)?;
                let out = *alternates.first()?;
                trace!("gsub 3.1 match at {a}: default alternate -> {out}");
                let mut g = seq[a].clone();
                g.gid = out;
                Some(Match::replace(vec![a], vec![g], a + 1))
            }
            GsubSubtable::Ligature {
                coverage,
                ligature_sets,
            } => {
                let idx = coverage.index(seq[a].gid)?;
                let set = ligature_sets.get(idx as usize)?;
                for lig in set {
                    if let Some(positions) =
                        match_components(seq, keep, a + 1, b, &lig.components)
                    {
                        let mut input_positions = vec![a];
                        input_positions.extend(positions);
                        let text: String = input_positions
                            .iter()
                            .map(|&i| seq[i].text.as_str())
                            .collect();
                        trace!(
                            "gsub 4.1 ligature match at {a}: {} glyphs -> {}",
                            input_positions.len(),
                            lig.glyph
                        );
                        let next = *input_positions.last().unwrap() + 1;
                        return Some(Match::replace(
                            input_positions,
                            vec![Glyph::new(lig.glyph, text, 0)],
                            next,
                        ));
                    }
                }
                None
            }
            GsubSubtable::Context(ctx) => ctx.apply(seq, keep, a, b),
            GsubSubtable::ChainContext(ctx) => ctx.apply(seq, keep, a, b),
            GsubSubtable::ReverseChainSingle {
                coverage,
                backtrack_coverages,
                lookahead_coverages,
                substitutes,
            } => {
                let idx = coverage.index(seq[a].gid)? as usize;
                let out = *substitutes.get(idx)?;
                if !super::context_backward_covered(seq, keep, a, backtrack_coverages) {
                    return None;
                }
                if !super::context_forward_covered(seq, keep, a + 1, seq.len(), lookahead_coverages)
                {
                    return None;
                }
                let mut g = seq[a].clone();
                g.gid = out;
                // reverse chaining never advances past itself: the outer
                // driver steps backward regardless of `next`.
                Some(Match::replace(vec![a], vec![g], a))
            }
            GsubSubtable::Unsupported { .. } => None,
        }
    }
}

/// Match a ligature's trailing components against the virtual sequence,
/// returning the real positions consumed (the stray glyphs the ignore
/// filter skips over survive unmatched, per §4.2's 4.1 row).
fn match_components(
    seq: &[Glyph],
    keep: &dyn Fn(GlyphId) -> bool,
    mut pos: usize,
    bound: usize,
    components: &[GlyphId],
) -> Option<Vec<usize>> {
    let mut out = Vec::with_capacity(components.len());
    for want in components {
        loop {
            if pos >= bound {
                return None;
            }
            let gid = seq[pos].gid;
            if !keep(gid) {
                pos += 1;
                continue;
            }
            if gid != *want {
                return None;
            }
            out.push(pos);
            pos += 1;
            break;
        }
    }
    Some(out)
}

impl SubtableCodec for GsubSubtable {
    const EXTENSION_LOOKUP_TYPE: u16 = 7;

    fn encode_len(&self) -> usize {
        match self {
            GsubSubtable::SingleDelta { coverage, .. } => 6 + coverage.encode_len(),
            GsubSubtable::SingleList {
                coverage,
                substitutes,
            } => 6 + substitutes.len() * 2 + coverage.encode_len(),
            GsubSubtable::Multiple {
                coverage,
                sequences,
            } => {
                let header = 6 + sequences.len() * 2;
                let bodies: usize = sequences.iter().map(|s| 2 + s.len() * 2).sum();
                header + coverage.encode_len() + bodies
            }
            GsubSubtable::Alternate {
                coverage,
                alternate_sets,
            } => {
                let header = 6 + alternate_sets.len() * 2;
                let bodies: usize = alternate_sets.iter().map(|s| 2 + s.len() * 2).sum();
                header + coverage.encode_len() + bodies
            }
            GsubSubtable::Ligature {
                coverage,
                ligature_sets,
            } => {
                let header = 6 + ligature_sets.len() * 2;
                let set_bodies: usize = ligature_sets
                    .iter()
                    .map(|set| {
                        let set_header = 2 + set.len() * 2;
                        let ligs: usize = set.iter().map(|l| 4 + l.components.len() * 2).sum();
                        set_header + ligs
                    })
                    .sum();
                header + coverage.encode_len() + set_bodies
            }
            GsubSubtable::Context(ctx) => ctx.encode_len(),
            GsubSubtable::ChainContext(ctx) => ctx.encode_len(),
            GsubSubtable::ReverseChainSingle {
                coverage,
                backtrack_coverages,
                lookahead_coverages,
                substitutes,
            } => {
                let header = 2
                    + 2
                    + 2 * backtrack_coverages.len()
                    + 2
                    + 2 * lookahead_coverages.len()
                    + 2
                    + substitutes.len() * 2;
                let bodies: usize = std::iter::once(coverage)
                    .chain(backtrack_coverages.iter())
                    .chain(lookahead_coverages.iter())
                    .map(|c| c.encode_len())
                    .sum();
                header + bodies
            }
            GsubSubtable::Unsupported { .. } => {
                panic!("cannot encode an unsupported GSUB subtable placeholder")
            }
        }
    }

    fn encode(&self, sink: &mut ByteSink) {
        match self {
            GsubSubtable::SingleDelta { coverage, delta } => {
                sink.write_u16(1);
                sink.write_u16(6);
                sink.write_i16(*delta);
                coverage.encode(sink);
            }
            GsubSubtable::SingleList {
                coverage,
                substitutes,
            } => {
                sink.write_u16(2);
                sink.write_u16(6);
                sink.write_u16(substitutes.len() as u16);
                for g in substitutes {
                    sink.write_glyph_id(*g);
                }
                coverage.encode(sink);
            }
            GsubSubtable::Multiple {
                coverage,
                sequences,
            } => {
                sink.write_u16(1);
                let header_len = 6 + sequences.len() * 2;
                sink.write_u16(header_len as u16);
                sink.write_u16(sequences.len() as u16);
                let mut offset = header_len + coverage.encode_len();
                let mut offsets = Vec::with_capacity(sequences.len());
                for s in sequences {
                    offsets.push(offset);
                    offset += 2 + s.len() * 2;
                }
                for off in &offsets {
                    sink.write_u16(*off as u16);
                }
                coverage.encode(sink);
                for s in sequences {
                    sink.write_u16(s.len() as u16);
                    for g in s {
                        sink.write_glyph_id(*g);
                    }
                }
            }
            GsubSubtable::Alternate {
                coverage,
                alternate_sets,
            } => {
                sink.write_u16(1);
                let header_len = 6 + alternate_sets.len() * 2;
                sink.write_u16(header_len as u16);
                sink.write_u16(alternate_sets.len() as u16);
                let mut offset = header_len + coverage.encode_len();
                let mut offsets = Vec::with_capacity(alternate_sets.len());
                for s in alternate_sets {
                    offsets.push(offset);
                    offset += 2 + s.len() * 2;
                }
                for off in &offsets {
                    sink.write_u16(*off as u16);
                }
                coverage.encode(sink);
                for s in alternate_sets {
                    sink.write_u16(s.len() as u16);
                    for g in s {
                        sink.write_glyph_id(*g);
                    }
                }
            }
            GsubSubtable::Ligature {
                coverage,
                ligature_sets,
            } => {
                sink.write_u16(1);
                let header_len = 6 + ligature_sets.len() * 2;
                sink.write_u16(header_len as u16);
                sink.write_u16(ligature_sets.len() as u16);
                let mut offset = header_len + coverage.encode_len();
                let mut set_offsets = Vec::with_capacity(ligature_sets.len());
                for set in ligature_sets {
                    set_offsets.push(offset);
                    let set_header = 2 + set.len() * 2;
                    let ligs: usize = set.iter().map(|l| 4 + l.components.len() * 2).sum();
                    offset += set_header + ligs;
                }
                for off in &set_offsets {
                    sink.write_u16(*off as u16);
                }
                coverage.encode(sink);
                for set in ligature_sets {
                    sink.write_u16(set.len() as u16);
                    let set_header = 2 + set.len() * 2;
                    let mut lig_offset = set_header;
                    let mut lig_offsets = Vec::with_capacity(set.len());
                    for l in set {
                        lig_offsets.push(lig_offset);
                        lig_offset += 4 + l.components.len() * 2;
                    }
                    for off in &lig_offsets {
                        sink.write_u16(*off as u16);
                    }
                    for l in set {
                        sink.write_glyph_id(l.glyph);
                        sink.write_u16(l.components.len() as u16 + 1);
                        for c in &l.components {
                            sink.write_glyph_id(*c);
                        }
                    }
                }
            }
            GsubSubtable::Context(ctx) => ctx.encode(sink),
            GsubSubtable::ChainContext(ctx) => ctx.encode(sink),
            GsubSubtable::ReverseChainSingle {
                coverage,
                backtrack_coverages,
                lookahead_coverages,
                substitutes,
            } => {
                sink.write_u16(1);
                let header_len = 2
                    + 2
                    + 2 * backtrack_coverages.len()
                    + 2
                    + 2 * lookahead_coverages.len()
                    + 2
                    + substitutes.len() * 2;
                let mut offset = header_len;
                sink.write_u16(offset as u16);
                offset += coverage.encode_len();
                sink.write_u16(backtrack_coverages.len() as u16);
                let mut bt_offsets = Vec::with_capacity(backtrack_coverages.len());
                for c in backtrack_coverages {
                    bt_offsets.push(offset);
                    offset += c.encode_len();
                }
                for off in &bt_offsets {
                    sink.write_u16(*off as u16);
                }
                sink.write_u16(lookahead_coverages.len() as u16);
                let mut la_offsets = Vec::with_capacity(lookahead_coverages.len());
                for c in lookahead_coverages {
                    la_offsets.push(offset);
                    offset += c.encode_len();
                }
                for off in &la_offsets {
                    sink.write_u16(*off as u16);
                }
                sink.write_u16(substitutes.len() as u16);
                for g in substitutes {
                    sink.write_glyph_id(*g);
                }
                coverage.encode(sink);
                for c in backtrack_coverages {
                    c.encode(sink);
                }
                for c in lookahead_coverages {
                    c.encode(sink);
                }
            }
            GsubSubtable::Unsupported { .. } => {
                panic!("cannot encode an unsupported GSUB subtable placeholder")
            }
        }
    }

    fn read(lookup_type: u16, data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("gsub", "subtable offset out of bounds"))?;
        match lookup_type {
            1 => {
                let mut cur = Cursor::new(base);
                let format = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated format"))?;
                let cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated coverage offset"))?;
                let coverage = CoverageTable::read(base, cov_off as usize)?;
                match format {
                    1 => {
                        let delta = cur
                            .read_i16()
                            .ok_or_else(|| Error::invalid("gsub", "truncated delta"))?;
                        Ok(GsubSubtable::SingleDelta { coverage, delta })
                    }
                    2 => {
                        let count = cur
                            .read_u16()
                            .ok_or_else(|| Error::invalid("gsub", "truncated count"))?;
                        let mut substitutes = Vec::with_capacity(count as usize);
                        for _ in 0..count {
                            substitutes.push(cur.read_glyph_id().ok_or_else(|| {
                                Error::invalid("gsub", "truncated substitute array")
                            })?);
                        }
                        let mut coverage = coverage;
                        if coverage.len() != substitutes.len() {
                            log::warn!(
                                "gsub 1.2: coverage length {} disagrees with substitute count {}, pruning",
                                coverage.len(),
                                substitutes.len()
                            );
                            coverage.prune(substitutes.len().min(coverage.len()));
                        }
                        Ok(GsubSubtable::SingleList {
                            coverage,
                            substitutes,
                        })
                    }
                    other => Err(Error::invalid("gsub", format!("unknown format 1.{other}"))),
                }
            }
            2 => {
                let mut cur = Cursor::new(base);
                let _format = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated format"))?;
                let cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated coverage offset"))?;
                let count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated sequence count"))?;
                let mut offsets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    offsets.push(
                        cur.read_u16()
                            .ok_or_else(|| Error::invalid("gsub", "truncated sequence offset"))?,
                    );
                }
                let coverage = CoverageTable::read(base, cov_off as usize)?;
                let sequences = offsets
                    .into_iter()
                    .map(|o| read_glyph_seq(base, o as usize))
                    .collect::<Result<Vec<_>>>()?;
                Ok(GsubSubtable::Multiple {
                    coverage,
                    sequences,
                })
            }
            3 => {
                let mut cur = Cursor::new(base);
                let _format = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated format"))?;
                let cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated coverage offset"))?;
                let count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated alternate set count"))?;
                let mut offsets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    offsets.push(
                        cur.read_u16()
                            .ok_or_else(|| Error::invalid("gsub", "truncated alternate set offset"))?,
                    );
                }
                let coverage = CoverageTable::read(base, cov_off as usize)?;
                let alternate_sets = offsets
                    .into_iter()
                    .map(|o| read_glyph_seq(base, o as usize))
                    .collect::<Result<Vec<_>>>()?;
                Ok(GsubSubtable::Alternate {
                    coverage,
                    alternate_sets,
                })
            }
            4 => {
                let mut cur = Cursor::new(base);
                let _format = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated format"))?;
                let cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated coverage offset"))?;
                let count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated ligature set count"))?;
                let mut offsets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    offsets.push(
                        cur.read_u16()
                            .ok_or_else(|| Error::invalid("gsub", "truncated ligature set offset"))?,
                    );
                }
                let coverage = CoverageTable::read(base, cov_off as usize)?;
                let ligature_sets = offsets
                    .into_iter()
                    .map(|o| read_ligature_set(base, o as usize))
                    .collect::<Result<Vec<_>>>()?;
                Ok(GsubSubtable::Ligature {
                    coverage,
                    ligature_sets,
                })
            }
            5 => Ok(GsubSubtable::Context(SequenceContext::read(data, pos)?)),
            6 => Ok(GsubSubtable::ChainContext(ChainedSequenceContext::read(
                data, pos,
            )?)),
            8 => {
                let mut cur = Cursor::new(base);
                let _format = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated format"))?;
                let cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated coverage offset"))?;
                let bt_count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated backtrack count"))?;
                let mut bt_offsets = Vec::with_capacity(bt_count as usize);
                for _ in 0..bt_count {
                    bt_offsets.push(
                        cur.read_u16()
                            .ok_or_else(|| Error::invalid("gsub", "truncated backtrack offset"))?,
                    );
                }
                let la_count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated lookahead count"))?;
                let mut la_offsets = Vec::with_capacity(la_count as usize);
                for _ in 0..la_count {
                    la_offsets.push(
                        cur.read_u16()
                            .ok_or_else(|| Error::invalid("gsub", "truncated lookahead offset"))?,
                    );
                }
                let sub_count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("gsub", "truncated substitute count"))?;
                let mut substitutes = Vec::with_capacity(sub_count as usize);
                for _ in 0..sub_count {
                    substitutes.push(
                        cur.read_glyph_id()
                            .ok_or_else(|| Error::invalid("gsub", "truncated substitute array"))?,
                    );
                }
                let mut coverage = CoverageTable::read(base, cov_off as usize)?;
                if coverage.len() != substitutes.len() {
                    log::warn!("gsub 8.1: coverage/substitute length mismatch, pruning");
                    let n = coverage.len().min(substitutes.len());
                    coverage.prune(n);
                }
                let backtrack_coverages = bt_offsets
                    .into_iter()
                    .map(|o| CoverageTable::read(base, o as usize))
                    .collect::<Result<Vec<_>>>()?;
                let lookahead_coverages = la_offsets
                    .into_iter()
                    .map(|o| CoverageTable::read(base, o as usize))
                    .collect::<Result<Vec<_>>>()?;
                Ok(GsubSubtable::ReverseChainSingle {
                    coverage,
                    backtrack_coverages,
                    lookahead_coverages,
                    substitutes,
                })
            }
            other => {
                log::warn!("gsub: unsupported lookup type {other}, installing inert placeholder");
                Ok(GsubSubtable::Unsupported {
                    lookup_type: other,
                })
            }
        }
    }
}

fn read_glyph_seq(data: &[u8], pos: usize) -> Result<Vec<GlyphId>> {
    let base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("gsub", "sequence offset out of bounds"))?;
    let mut cur = Cursor::new(base);
    let count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gsub", "truncated sequence glyph count"))?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(
            cur.read_glyph_id()
                .ok_or_else(|| Error::invalid("gsub", "truncated sequence glyph"))?,
        );
    }
    Ok(out)
}

fn read_ligature_set(data: &[u8], pos: usize) -> Result<Vec<Ligature>> {
    let base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("gsub", "ligature set offset out of bounds"))?;
    let mut cur = Cursor::new(base);
    let count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gsub", "truncated ligature count"))?;
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(
            cur.read_u16()
                .ok_or_else(|| Error::invalid("gsub", "truncated ligature offset"))?,
        );
    }
    offsets
        .into_iter()
        .map(|o| read_ligature(base, o as usize))
        .collect()
}

fn read_ligature(data: &[u8], pos: usize) -> Result<Ligature> {
    let base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("gsub", "ligature offset out of bounds"))?;
    let mut cur = Cursor::new(base);
    let glyph = cur
        .read_glyph_id()
        .ok_or_else(|| Error::invalid("gsub", "truncated ligature glyph"))?;
    let count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("gsub", "truncated component count"))?;
    if count == 0 {
        return Err(Error::invalid("gsub", "zero-length ligature component count"));
    }
    let mut components = Vec::with_capacity(count as usize - 1);
    for _ in 0..count - 1 {
        components.push(
            cur.read_glyph_id()
                .ok_or_else(|| Error::invalid("gsub", "truncated ligature component"))?,
        );
    }
    Ok(Ligature { components, glyph })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph::concat_text;

    fn gid(n: u16) -> GlyphId {
        GlyphId::new(n)
    }

    fn glyph(n: u16, text: &str) -> Glyph {
        Glyph::new(gid(n), text, 10)
    }

    #[test]
    fn scenario_delta_substitution() {
        let sub = GsubSubtable::SingleDelta {
            coverage: CoverageTable::from_glyphs(vec![gid(3)]),
            delta: 26,
        };
        let mut seq: Vec<Glyph> = [(1, "a"), (2, "b"), (3, "c"), (4, "d")]
            .into_iter()
            .map(|(g, t)| glyph(g, t))
            .collect();
        let keep = |_: GlyphId| true;
        let m = sub.apply(&seq, &keep, 2, seq.len()).unwrap();
        assert_eq!(m.input_positions, vec![2]);
        if let super::super::MatchKind::Replace(replace) = m.kind {
            seq[2] = replace.into_iter().next().unwrap();
        } else {
            panic!("expected replace");
        }
        let gids: Vec<u16> = seq.iter().map(|g| g.gid.to_u16()).collect();
        assert_eq!(gids, vec![1, 2, 29, 4]);
    }

    #[test]
    fn scenario_ligature_with_strays() {
        let sub = GsubSubtable::Ligature {
            coverage: CoverageTable::from_glyphs(vec![gid(10)]),
            ligature_sets: vec![vec![Ligature {
                components: vec![gid(11), gid(12)],
                glyph: gid(99),
            }]],
        };
        let seq: Vec<Glyph> = [(10, "a"), (77, "x"), (11, "b"), (12, "c"), (20, "d")]
            .into_iter()
            .map(|(g, t)| glyph(g, t))
            .collect();
        let keep = |g: GlyphId| g != gid(77);
        let m = sub.apply(&seq, &keep, 0, seq.len()).unwrap();
        assert_eq!(m.input_positions, vec![0, 2, 3]);
        if let super::super::MatchKind::Replace(replace) = &m.kind {
            assert_eq!(replace.len(), 1);
            assert_eq!(replace[0].text, "abc");
        } else {
            panic!("expected replace");
        }
        assert_eq!(concat_text(&seq), "axbcd");
    }
}
