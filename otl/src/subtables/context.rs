//! Sequence-context and chained-sequence-context subtables.
//!
//! These are the only subtable families shared byte-for-byte between GSUB
//! (types 5 and 6) and GPOS (types 7 and 8): both just yield nested actions
//! rather than a replacement. Living here once and being wrapped by
//! [`super::gsub::GsubSubtable`] and [`super::gpos::GposSubtable`] keeps the
//! matching logic — and its filter-aware backtrack/lookahead walk — written
//! a single time.

use font_types::{ByteSink, Cursor, GlyphId};

use crate::error::{Error, Result};
use crate::glyph::Glyph;
use crate::primitives::{ClassDef, CoverageTable};

use super::{Match, SequenceLookupRecord};

fn read_actions(cur: &mut Cursor, subsystem: &'static str) -> Result<Vec<SequenceLookupRecord>> {
    let count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid(subsystem, "truncated seq lookup count"))?;
    let mut actions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let seq_index = cur
            .read_u16()
            .ok_or_else(|| Error::invalid(subsystem, "truncated seq lookup record"))?;
        let lookup_index = cur
            .read_u16()
            .ok_or_else(|| Error::invalid(subsystem, "truncated seq lookup record"))?;
        actions.push((seq_index, lookup_index));
    }
    Ok(actions)
}

fn write_actions(actions: &[SequenceLookupRecord], sink: &mut ByteSink) {
    sink.write_u16(actions.len() as u16);
    for (seq_index, lookup_index) in actions {
        sink.write_u16(*seq_index);
        sink.write_u16(*lookup_index);
    }
}

fn actions_len(actions: &[SequenceLookupRecord]) -> usize {
    2 + actions.len() * 4
}

/// Forward-match `count` selectors against the virtual (filtered) sequence
/// starting at `pos`, bounded by `bound` (exclusive). Returns the real
/// positions consumed, in order, or `None` if any selector fails or the
/// sequence runs out before `bound`.
fn match_forward(
    seq: &[Glyph],
    keep: &dyn Fn(GlyphId) -> bool,
    mut pos: usize,
    bound: usize,
    count: usize,
    matches_at: impl Fn(usize, GlyphId) -> bool,
) -> Option<Vec<usize>> {
    let mut out = Vec::with_capacity(count);
    let mut i = 0;
    while i < count {
        if pos >= bound {
            return None;
        }
        let gid = seq[pos].gid;
        if !keep(gid) {
            pos += 1;
            continue;
        }
        if !matches_at(i, gid) {
            return None;
        }
        out.push(pos);
        pos += 1;
        i += 1;
    }
    Some(out)
}

/// Backward-match `count` selectors against the virtual sequence, searching
/// strictly below `pos`. `matches_at(0, ..)` is checked against the nearest
/// preceding kept glyph, matching the wire order of a backtrack sequence.
fn match_backward(
    seq: &[Glyph],
    keep: &dyn Fn(GlyphId) -> bool,
    mut pos: usize,
    count: usize,
    matches_at: impl Fn(usize, GlyphId) -> bool,
) -> bool {
    let mut i = 0;
    while i < count {
        if pos == 0 {
            return false;
        }
        pos -= 1;
        let gid = seq[pos].gid;
        if !keep(gid) {
            continue;
        }
        if !matches_at(i, gid) {
            return false;
        }
        i += 1;
    }
    true
}

/// A single glyph-keyed rule: the glyphs after the first (which is already
/// implied by the coverage index selecting this rule set) plus the actions
/// to fire on a full match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeqRule {
    pub input: Vec<GlyphId>,
    pub actions: Vec<SequenceLookupRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeqRuleSet {
    pub rules: Vec<SeqRule>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassSeqRule {
    pub input_classes: Vec<u16>,
    pub actions: Vec<SequenceLookupRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassSeqRuleSet {
    pub rules: Vec<ClassSeqRule>,
}

/// `SequenceContextFormat1/2/3`, shared by GSUB 5.1/5.2/5.3 and GPOS
/// 7.1/7.2/7.3.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SequenceContext {
    Format1 {
        coverage: CoverageTable,
        rule_sets: Vec<Option<SeqRuleSet>>,
    },
    Format2 {
        coverage: CoverageTable,
        class_def: ClassDef,
        rule_sets: Vec<Option<ClassSeqRuleSet>>,
    },
    Format3 {
        coverages: Vec<CoverageTable>,
        actions: Vec<SequenceLookupRecord>,
    },
}

impl SequenceContext {
    pub fn apply(
        &self,
        seq: &[Glyph],
        keep: &dyn Fn(GlyphId) -> bool,
        a: usize,
        b: usize,
    ) -> Option<Match> {
        if a >= b || !keep(seq[a].gid) {
            return None;
        }
        match self {
            SequenceContext::Format1 {
                coverage,
                rule_sets,
            } => {
                let idx = coverage.index(seq[a].gid)? as usize;
                let rule_set = rule_sets.get(idx)?.as_ref()?;
                for rule in &rule_set.rules {
                    let glyphs = &rule.input;
                    if let Some(mut positions) =
                        match_forward(seq, keep, a + 1, b, glyphs.len(), |i, gid| {
                            gid == glyphs[i]
                        })
                    {
                        let mut input_positions = vec![a];
                        input_positions.append(&mut positions);
                        let next = *input_positions.last().unwrap() + 1;
                        return Some(Match::actions(input_positions, rule.actions.clone(), next));
                    }
                }
                None
            }
            SequenceContext::Format2 {
                coverage,
                class_def,
                rule_sets,
            } => {
                coverage.index(seq[a].gid)?;
                let class = class_def.get(seq[a].gid) as usize;
                let rule_set = rule_sets.get(class)?.as_ref()?;
                for rule in &rule_set.rules {
                    let classes = &rule.input_classes;
                    if let Some(mut positions) =
                        match_forward(seq, keep, a + 1, b, classes.len(), |i, gid| {
                            class_def.get(gid) == classes[i]
                        })
                    {
                        let mut input_positions = vec![a];
                        input_positions.append(&mut positions);
                        let next = *input_positions.last().unwrap() + 1;
                        return Some(Match::actions(input_positions, rule.actions.clone(), next));
                    }
                }
                None
            }
            SequenceContext::Format3 { coverages, actions } => {
                let first = coverages.first()?;
                if !first.contains(seq[a].gid) {
                    return None;
                }
                let rest = &coverages[1..];
                let mut positions =
                    match_forward(seq, keep, a + 1, b, rest.len(), |i, gid| rest[i].contains(gid))?;
                let mut input_positions = vec![a];
                input_positions.append(&mut positions);
                let next = *input_positions.last().unwrap() + 1;
                Some(Match::actions(input_positions, actions.clone(), next))
            }
        }
    }

    pub fn encode_len(&self) -> usize {
        match self {
            SequenceContext::Format1 {
                coverage,
                rule_sets,
            } => {
                let header = 6 + rule_sets.len() * 2;
                header + coverage.encode_len() + rule_sets_len(rule_sets)
            }
            SequenceContext::Format2 {
                coverage,
                class_def,
                rule_sets,
            } => {
                let header = 8 + rule_sets.len() * 2;
                header
                    + coverage.encode_len()
                    + class_def.encode_len()
                    + class_rule_sets_len(rule_sets)
            }
            SequenceContext::Format3 { coverages, actions } => {
                let header = 6 + coverages.len() * 2;
                header
                    + actions_len(actions)
                    + coverages.iter().map(|c| c.encode_len()).sum::<usize>()
            }
        }
    }

    pub fn encode(&self, sink: &mut ByteSink) {
        match self {
            SequenceContext::Format1 {
                coverage,
                rule_sets,
            } => {
                sink.write_u16(1);
                let header_len = 6 + rule_sets.len() * 2;
                let cov_off = header_len;
                sink.write_u16(cov_off as u16);
                sink.write_u16(rule_sets.len() as u16);
                let mut offset = header_len + coverage.encode_len();
                let mut offsets = Vec::with_capacity(rule_sets.len());
                for rs in rule_sets {
                    offsets.push(offset);
                    offset += rule_set_len(rs);
                }
                for (rs, off) in rule_sets.iter().zip(&offsets) {
                    sink.write_u16(if rs.is_some() { *off as u16 } else { 0 });
                }
                coverage.encode(sink);
                for rs in rule_sets {
                    if let Some(rs) = rs {
                        encode_rule_set(rs, sink);
                    }
                }
            }
            SequenceContext::Format2 {
                coverage,
                class_def,
                rule_sets,
            } => {
                sink.write_u16(2);
                let header_len = 8 + rule_sets.len() * 2;
                let cov_off = header_len;
                let class_off = cov_off + coverage.encode_len();
                sink.write_u16(cov_off as u16);
                sink.write_u16(class_off as u16);
                sink.write_u16(rule_sets.len() as u16);
                let mut offset = class_off + class_def.encode_len();
                let mut offsets = Vec::with_capacity(rule_sets.len());
                for rs in rule_sets {
                    offsets.push(offset);
                    offset += class_rule_set_len(rs);
                }
                for (rs, off) in rule_sets.iter().zip(&offsets) {
                    sink.write_u16(if rs.is_some() { *off as u16 } else { 0 });
                }
                coverage.encode(sink);
                class_def.encode(sink);
                for rs in rule_sets {
                    if let Some(rs) = rs {
                        encode_class_rule_set(rs, sink);
                    }
                }
            }
            SequenceContext::Format3 { coverages, actions } => {
                sink.write_u16(3);
                sink.write_u16(coverages.len() as u16);
                write_actions(actions, sink);
                let header_len = 6 + coverages.len() * 2;
                let mut offset = header_len;
                let mut offsets = Vec::with_capacity(coverages.len());
                for c in coverages {
                    offsets.push(offset);
                    offset += c.encode_len();
                }
                for off in &offsets {
                    sink.write_u16(*off as u16);
                }
                for c in coverages {
                    c.encode(sink);
                }
            }
        }
    }

    pub fn read(data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("sequence-context", "offset out of bounds"))?;
        let mut cur = Cursor::new(base);
        let format = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("sequence-context", "truncated format"))?;
        match format {
            1 => {
                let cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("sequence-context", "truncated coverage offset"))?;
                let count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("sequence-context", "truncated rule set count"))?;
                let mut offsets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    offsets.push(cur.read_u16().ok_or_else(|| {
                        Error::invalid("sequence-context", "truncated rule set offset")
                    })?);
                }
                let coverage = CoverageTable::read(base, cov_off as usize)?;
                let rule_sets = offsets
                    .into_iter()
                    .map(|o| {
                        if o == 0 {
                            Ok(None)
                        } else {
                            read_rule_set(base, o as usize).map(Some)
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(SequenceContext::Format1 {
                    coverage,
                    rule_sets,
                })
            }
            2 => {
                let cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("sequence-context", "truncated coverage offset"))?;
                let class_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("sequence-context", "truncated class offset"))?;
                let count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("sequence-context", "truncated rule set count"))?;
                let mut offsets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    offsets.push(cur.read_u16().ok_or_else(|| {
                        Error::invalid("sequence-context", "truncated rule set offset")
                    })?);
                }
                let coverage = CoverageTable::read(base, cov_off as usize)?;
                let class_def = ClassDef::read(base, class_off as usize)?;
                let rule_sets = offsets
                    .into_iter()
                    .map(|o| {
                        if o == 0 {
                            Ok(None)
                        } else {
                            read_class_rule_set(base, o as usize).map(Some)
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(SequenceContext::Format2 {
                    coverage,
                    class_def,
                    rule_sets,
                })
            }
            3 => {
                let glyph_count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("sequence-context", "truncated glyph count"))?;
                let actions = read_actions(&mut cur, "sequence-context")?;
                let mut offsets = Vec::with_capacity(glyph_count as usize);
                for _ in 0..glyph_count {
                    offsets.push(cur.read_u16().ok_or_else(|| {
                        Error::invalid("sequence-context", "truncated coverage offset")
                    })?);
                }
                let coverages = offsets
                    .into_iter()
                    .map(|o| CoverageTable::read(base, o as usize))
                    .collect::<Result<Vec<_>>>()?;
                Ok(SequenceContext::Format3 { coverages, actions })
            }
            other => Err(Error::invalid(
                "sequence-context",
                format!("unknown sequence context format {other}"),
            )),
        }
    }
}

fn rule_set_len(rs: &Option<SeqRuleSet>) -> usize {
    match rs {
        None => 0,
        Some(rs) => 2 + rs.rules.len() * 2 + rs.rules.iter().map(rule_len).sum::<usize>(),
    }
}

fn rule_len(rule: &SeqRule) -> usize {
    4 + rule.input.len() * 2 + actions_len(&rule.actions)
}

fn encode_rule_set(rs: &SeqRuleSet, sink: &mut ByteSink) {
    sink.write_u16(rs.rules.len() as u16);
    let header_len = 2 + rs.rules.len() * 2;
    let mut offset = header_len;
    let mut offsets = Vec::with_capacity(rs.rules.len());
    for r in &rs.rules {
        offsets.push(offset);
        offset += rule_len(r);
    }
    for off in &offsets {
        sink.write_u16(*off as u16);
    }
    for r in &rs.rules {
        sink.write_u16(r.input.len() as u16 + 1);
        for g in &r.input {
            sink.write_glyph_id(*g);
        }
        write_actions(&r.actions, sink);
    }
}

fn read_rule_set(data: &[u8], pos: usize) -> Result<SeqRuleSet> {
    let base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("sequence-context", "rule set offset out of bounds"))?;
    let mut cur = Cursor::new(base);
    let count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("sequence-context", "truncated rule count"))?;
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(
            cur.read_u16()
                .ok_or_else(|| Error::invalid("sequence-context", "truncated rule offset"))?,
        );
    }
    let mut rules = Vec::with_capacity(count as usize);
    for o in offsets {
        rules.push(read_rule(base, o as usize)?);
    }
    Ok(SeqRuleSet { rules })
}

fn read_rule(data: &[u8], pos: usize) -> Result<SeqRule> {
    let base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("sequence-context", "rule offset out of bounds"))?;
    let mut cur = Cursor::new(base);
    let glyph_count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("sequence-context", "truncated glyph count"))?;
    if glyph_count == 0 {
        return Err(Error::invalid("sequence-context", "zero glyph count"));
    }
    let mut input = Vec::with_capacity(glyph_count as usize - 1);
    for _ in 0..glyph_count - 1 {
        input.push(
            cur.read_glyph_id()
                .ok_or_else(|| Error::invalid("sequence-context", "truncated input glyph"))?,
        );
    }
    let actions = read_actions(&mut cur, "sequence-context")?;
    Ok(SeqRule { input, actions })
}

fn class_rule_sets_len(rule_sets: &[Option<ClassSeqRuleSet>]) -> usize {
    rule_sets.iter().map(class_rule_set_len).sum()
}

fn class_rule_set_len(rs: &Option<ClassSeqRuleSet>) -> usize {
    match rs {
        None => 0,
        Some(rs) => 2 + rs.rules.len() * 2 + rs.rules.iter().map(class_rule_len).sum::<usize>(),
    }
}

fn class_rule_len(rule: &ClassSeqRule) -> usize {
    4 + rule.input_classes.len() * 2 + actions_len(&rule.actions)
}

fn encode_class_rule_set(rs: &ClassSeqRuleSet, sink: &mut ByteSink) {
    sink.write_u16(rs.rules.len() as u16);
    let header_len = 2 + rs.rules.len() * 2;
    let mut offset = header_len;
    let mut offsets = Vec::with_capacity(rs.rules.len());
    for r in &rs.rules {
        offsets.push(offset);
        offset += class_rule_len(r);
    }
    for off in &offsets {
        sink.write_u16(*off as u16);
    }
    for r in &rs.rules {
        sink.write_u16(r.input_classes.len() as u16 + 1);
        for c in &r.input_classes {
            sink.write_u16(*c);
        }
        write_actions(&r.actions, sink);
    }
}

fn read_class_rule_set(data: &[u8], pos: usize) -> Result<ClassSeqRuleSet> {
    let base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("sequence-context", "class rule set offset out of bounds"))?;
    let mut cur = Cursor::new(base);
    let count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("sequence-context", "truncated rule count"))?;
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(
            cur.read_u16()
                .ok_or_else(|| Error::invalid("sequence-context", "truncated rule offset"))?,
        );
    }
    let mut rules = Vec::with_capacity(count as usize);
    for o in offsets {
        rules.push(read_class_rule(base, o as usize)?);
    }
    Ok(ClassSeqRuleSet { rules })
}

fn read_class_rule(data: &[u8], pos: usize) -> Result<ClassSeqRule> {
    let base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("sequence-context", "class rule offset out of bounds"))?;
    let mut cur = Cursor::new(base);
    let glyph_count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("sequence-context", "truncated glyph count"))?;
    if glyph_count == 0 {
        return Err(Error::invalid("sequence-context", "zero glyph count"));
    }
    let mut input_classes = Vec::with_capacity(glyph_count as usize - 1);
    for _ in 0..glyph_count - 1 {
        input_classes.push(
            cur.read_u16()
                .ok_or_else(|| Error::invalid("sequence-context", "truncated input class"))?,
        );
    }
    let actions = read_actions(&mut cur, "sequence-context")?;
    Ok(ClassSeqRule {
        input_classes,
        actions,
    })
}

fn rule_sets_len(rule_sets: &[Option<SeqRuleSet>]) -> usize {
    rule_sets.iter().map(rule_set_len).sum()
}

/// A single glyph-keyed chained rule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainedSeqRule {
    /// Nearest-preceding-glyph-first, matching wire order.
    pub backtrack: Vec<GlyphId>,
    pub input: Vec<GlyphId>,
    /// Nearest-following-glyph-first, matching wire order.
    pub lookahead: Vec<GlyphId>,
    pub actions: Vec<SequenceLookupRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainedSeqRuleSet {
    pub rules: Vec<ChainedSeqRule>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainedClassSeqRule {
    pub backtrack_classes: Vec<u16>,
    pub input_classes: Vec<u16>,
    pub lookahead_classes: Vec<u16>,
    pub actions: Vec<SequenceLookupRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainedClassSeqRuleSet {
    pub rules: Vec<ChainedClassSeqRule>,
}

/// `ChainContextFormat1/2/3`, shared by GSUB 6.1/6.2/6.3 and GPOS
/// 8.1/8.2/8.3.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChainedSequenceContext {
    Format1 {
        coverage: CoverageTable,
        rule_sets: Vec<Option<ChainedSeqRuleSet>>,
    },
    Format2 {
        coverage: CoverageTable,
        backtrack_class_def: ClassDef,
        input_class_def: ClassDef,
        lookahead_class_def: ClassDef,
        rule_sets: Vec<Option<ChainedClassSeqRuleSet>>,
    },
    Format3 {
        backtrack_coverages: Vec<CoverageTable>,
        input_coverages: Vec<CoverageTable>,
        lookahead_coverages: Vec<CoverageTable>,
        actions: Vec<SequenceLookupRecord>,
    },
}

impl ChainedSequenceContext {
    pub fn apply(
        &self,
        seq: &[Glyph],
        keep: &dyn Fn(GlyphId) -> bool,
        a: usize,
        b: usize,
    ) -> Option<Match> {
        if a >= b || !keep(seq[a].gid) {
            return None;
        }
        match self {
            ChainedSequenceContext::Format1 {
                coverage,
                rule_sets,
            } => {
                let idx = coverage.index(seq[a].gid)? as usize;
                let rule_set = rule_sets.get(idx)?.as_ref()?;
                for rule in &rule_set.rules {
                    if !match_backward(seq, keep, a, rule.backtrack.len(), |i, gid| {
                        gid == rule.backtrack[i]
                    }) {
                        continue;
                    }
                    let Some(mut positions) =
                        match_forward(seq, keep, a + 1, b, rule.input.len(), |i, gid| {
                            gid == rule.input[i]
                        })
                    else {
                        continue;
                    };
                    let mut input_positions = vec![a];
                    input_positions.append(&mut positions);
                    let after = *input_positions.last().unwrap() + 1;
                    if match_forward(seq, keep, after, seq.len(), rule.lookahead.len(), |i, gid| {
                        gid == rule.lookahead[i]
                    })
                    .is_none()
                    {
                        continue;
                    }
                    return Some(Match::actions(input_positions, rule.actions.clone(), after));
                }
                None
            }
            ChainedSequenceContext::Format2 {
                coverage,
                backtrack_class_def,
                input_class_def,
                lookahead_class_def,
                rule_sets,
            } => {
                coverage.index(seq[a].gid)?;
                let class = input_class_def.get(seq[a].gid) as usize;
                let rule_set = rule_sets.get(class)?.as_ref()?;
                for rule in &rule_set.rules {
                    if !match_backward(seq, keep, a, rule.backtrack_classes.len(), |i, gid| {
                        backtrack_class_def.get(gid) == rule.backtrack_classes[i]
                    }) {
                        continue;
                    }
                    let Some(mut positions) =
                        match_forward(seq, keep, a + 1, b, rule.input_classes.len(), |i, gid| {
                            input_class_def.get(gid) == rule.input_classes[i]
                        })
                    else {
                        continue;
                    };
                    let mut input_positions = vec![a];
                    input_positions.append(&mut positions);
                    let after = *input_positions.last().unwrap() + 1;
                    if match_forward(
                        seq,
                        keep,
                        after,
                        seq.len(),
                        rule.lookahead_classes.len(),
                        |i, gid| lookahead_class_def.get(gid) == rule.lookahead_classes[i],
                    )
                    .is_none()
                    {
                        continue;
                    }
                    return Some(Match::actions(input_positions, rule.actions.clone(), after));
                }
                None
            }
            ChainedSequenceContext::Format3 {
                backtrack_coverages,
                input_coverages,
                lookahead_coverages,
                actions,
            } => {
                let first = input_coverages.first()?;
                if !first.contains(seq[a].gid) {
                    return None;
                }
                if !match_backward(seq, keep, a, backtrack_coverages.len(), |i, gid| {
                    backtrack_coverages[i].contains(gid)
                }) {
                    return None;
                }
                let rest = &input_coverages[1..];
                let mut positions =
                    match_forward(seq, keep, a + 1, b, rest.len(), |i, gid| rest[i].contains(gid))?;
                let mut input_positions = vec![a];
                input_positions.append(&mut positions);
                let after = *input_positions.last().unwrap() + 1;
                match_forward(
                    seq,
                    keep,
                    after,
                    seq.len(),
                    lookahead_coverages.len(),
                    |i, gid| lookahead_coverages[i].contains(gid),
                )?;
                Some(Match::actions(input_positions, actions.clone(), after))
            }
        }
    }

    pub fn encode_len(&self) -> usize {
        match self {
            ChainedSequenceContext::Format1 {
                coverage,
                rule_sets,
            } => {
                6 + rule_sets.len() * 2
                    + coverage.encode_len()
                    + rule_sets
                        .iter()
                        .map(chained_rule_set_len)
                        .sum::<usize>()
            }
            ChainedSequenceContext::Format2 {
                coverage,
                backtrack_class_def,
                input_class_def,
                lookahead_class_def,
                rule_sets,
            } => {
                10 + rule_sets.len() * 2
                    + coverage.encode_len()
                    + backtrack_class_def.encode_len()
                    + input_class_def.encode_len()
                    + lookahead_class_def.encode_len()
                    + rule_sets
                        .iter()
                        .map(chained_class_rule_set_len)
                        .sum::<usize>()
            }
            ChainedSequenceContext::Format3 {
                backtrack_coverages,
                input_coverages,
                lookahead_coverages,
                actions,
            } => {
                let header = 2
                    + 2
                    + backtrack_coverages.len() * 2
                    + 2
                    + input_coverages.len() * 2
                    + 2
                    + lookahead_coverages.len() * 2
                    + actions_len(actions);
                let bodies: usize = backtrack_coverages
                    .iter()
                    .chain(input_coverages.iter())
                    .chain(lookahead_coverages.iter())
                    .map(|c| c.encode_len())
                    .sum();
                header + bodies
            }
        }
    }

    pub fn encode(&self, sink: &mut ByteSink) {
        match self {
            ChainedSequenceContext::Format1 {
                coverage,
                rule_sets,
            } => {
                sink.write_u16(1);
                let header_len = 6 + rule_sets.len() * 2;
                sink.write_u16(header_len as u16);
                sink.write_u16(rule_sets.len() as u16);
                let mut offset = header_len + coverage.encode_len();
                let mut offsets = Vec::with_capacity(rule_sets.len());
                for rs in rule_sets {
                    offsets.push(offset);
                    offset += chained_rule_set_len(rs);
                }
                for (rs, off) in rule_sets.iter().zip(&offsets) {
                    sink.write_u16(if rs.is_some() { *off as u16 } else { 0 });
                }
                coverage.encode(sink);
                for rs in rule_sets {
                    if let Some(rs) = rs {
                        encode_chained_rule_set(rs, sink);
                    }
                }
            }
            ChainedSequenceContext::Format2 {
                coverage,
                backtrack_class_def,
                input_class_def,
                lookahead_class_def,
                rule_sets,
            } => {
                sink.write_u16(2);
                let header_len = 10 + rule_sets.len() * 2;
                let cov_off = header_len;
                let bt_off = cov_off + coverage.encode_len();
                let in_off = bt_off + backtrack_class_def.encode_len();
                let la_off = in_off + input_class_def.encode_len();
                sink.write_u16(cov_off as u16);
                sink.write_u16(bt_off as u16);
                sink.write_u16(in_off as u16);
                sink.write_u16(la_off as u16);
                sink.write_u16(rule_sets.len() as u16);
                let mut offset = la_off + lookahead_class_def.encode_len();
                let mut offsets = Vec::with_capacity(rule_sets.len());
                for rs in rule_sets {
                    offsets.push(offset);
                    offset += chained_class_rule_set_len(rs);
                }
                for (rs, off) in rule_sets.iter().zip(&offsets) {
                    sink.write_u16(if rs.is_some() { *off as u16 } else { 0 });
                }
                coverage.encode(sink);
                backtrack_class_def.encode(sink);
                input_class_def.encode(sink);
                lookahead_class_def.encode(sink);
                for rs in rule_sets {
                    if let Some(rs) = rs {
                        encode_chained_class_rule_set(rs, sink);
                    }
                }
            }
            ChainedSequenceContext::Format3 {
                backtrack_coverages,
                input_coverages,
                lookahead_coverages,
                actions,
            } => {
                sink.write_u16(3);
                sink.write_u16(backtrack_coverages.len() as u16);
                let header_len = 2
                    + 2
                    + backtrack_coverages.len() * 2
                    + 2
                    + input_coverages.len() * 2
                    + 2
                    + lookahead_coverages.len() * 2
                    + actions_len(actions);
                let mut offset = header_len;
                let mut bt_offsets = Vec::with_capacity(backtrack_coverages.len());
                for c in backtrack_coverages {
                    bt_offsets.push(offset);
                    offset += c.encode_len();
                }
                for off in &bt_offsets {
                    sink.write_u16(*off as u16);
                }
                sink.write_u16(input_coverages.len() as u16);
                let mut in_offsets = Vec::with_capacity(input_coverages.len());
                for c in input_coverages {
                    in_offsets.push(offset);
                    offset += c.encode_len();
                }
                for off in &in_offsets {
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
                write_actions(actions, sink);
                for c in backtrack_coverages {
                    c.encode(sink);
                }
                for c in input_coverages {
                    c.encode(sink);
                }
                for c in lookahead_coverages {
                    c.encode(sink);
                }
            }
        }
    }

    pub fn read(data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("chained-context", "offset out of bounds"))?;
        let mut cur = Cursor::new(base);
        let format = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("chained-context", "truncated format"))?;
        match format {
            1 => {
                let cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("chained-context", "truncated coverage offset"))?;
                let count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("chained-context", "truncated rule set count"))?;
                let mut offsets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    offsets.push(cur.read_u16().ok_or_else(|| {
                        Error::invalid("chained-context", "truncated rule set offset")
                    })?);
                }
                let coverage = CoverageTable::read(base, cov_off as usize)?;
                let rule_sets = offsets
                    .into_iter()
                    .map(|o| {
                        if o == 0 {
                            Ok(None)
                        } else {
                            read_chained_rule_set(base, o as usize).map(Some)
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ChainedSequenceContext::Format1 {
                    coverage,
                    rule_sets,
                })
            }
            2 => {
                let cov_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("chained-context", "truncated coverage offset"))?;
                let bt_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("chained-context", "truncated backtrack offset"))?;
                let in_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("chained-context", "truncated input offset"))?;
                let la_off = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("chained-context", "truncated lookahead offset"))?;
                let count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("chained-context", "truncated rule set count"))?;
                let mut offsets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    offsets.push(cur.read_u16().ok_or_else(|| {
                        Error::invalid("chained-context", "truncated rule set offset")
                    })?);
                }
                let coverage = CoverageTable::read(base, cov_off as usize)?;
                let backtrack_class_def = ClassDef::read(base, bt_off as usize)?;
                let input_class_def = ClassDef::read(base, in_off as usize)?;
                let lookahead_class_def = ClassDef::read(base, la_off as usize)?;
                let rule_sets = offsets
                    .into_iter()
                    .map(|o| {
                        if o == 0 {
                            Ok(None)
                        } else {
                            read_chained_class_rule_set(base, o as usize).map(Some)
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ChainedSequenceContext::Format2 {
                    coverage,
                    backtrack_class_def,
                    input_class_def,
                    lookahead_class_def,
                    rule_sets,
                })
            }
            3 => {
                let bt_count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("chained-context", "truncated backtrack count"))?;
                let mut bt_offsets = Vec::with_capacity(bt_count as usize);
                for _ in 0..bt_count {
                    bt_offsets.push(cur.read_u16().ok_or_else(|| {
                        Error::invalid("chained-context", "truncated backtrack offset")
                    })?);
                }
                let in_count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("chained-context", "truncated input count"))?;
                let mut in_offsets = Vec::with_capacity(in_count as usize);
                for _ in 0..in_count {
                    in_offsets.push(cur.read_u16().ok_or_else(|| {
                        Error::invalid("chained-context", "truncated input offset")
                    })?);
                }
                let la_count = cur
                    .read_u16()
                    .ok_or_else(|| Error::invalid("chained-context", "truncated lookahead count"))?;
                let mut la_offsets = Vec::with_capacity(la_count as usize);
                for _ in 0..la_count {
                    la_offsets.push(cur.read_u16().ok_or_else(|| {
                        Error::invalid("chained-context", "truncated lookahead offset")
                    })?);
                }
                let actions = read_actions(&mut cur, "chained-context")?;
                let backtrack_coverages = bt_offsets
                    .into_iter()
                    .map(|o| CoverageTable::read(base, o as usize))
                    .collect::<Result<Vec<_>>>()?;
                let input_coverages = in_offsets
                    .into_iter()
                    .map(|o| CoverageTable::read(base, o as usize))
                    .collect::<Result<Vec<_>>>()?;
                let lookahead_coverages = la_offsets
                    .into_iter()
                    .map(|o| CoverageTable::read(base, o as usize))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ChainedSequenceContext::Format3 {
                    backtrack_coverages,
                    input_coverages,
                    lookahead_coverages,
                    actions,
                })
            }
            other => Err(Error::invalid(
                "chained-context",
                format!("unknown chained context format {other}"),
            )),
        }
    }
}

fn chained_rule_set_len(rs: &Option<ChainedSeqRuleSet>) -> usize {
    match rs {
        None => 0,
        Some(rs) => {
            2 + rs.rules.len() * 2 + rs.rules.iter().map(chained_rule_len).sum::<usize>()
        }
    }
}

fn chained_rule_len(rule: &ChainedSeqRule) -> usize {
    2 + rule.backtrack.len() * 2
        + 2
        + rule.input.len() * 2
        + 2
        + rule.lookahead.len() * 2
        + actions_len(&rule.actions)
}

fn encode_chained_rule_set(rs: &ChainedSeqRuleSet, sink: &mut ByteSink) {
    sink.write_u16(rs.rules.len() as u16);
    let header_len = 2 + rs.rules.len() * 2;
    let mut offset = header_len;
    let mut offsets = Vec::with_capacity(rs.rules.len());
    for r in &rs.rules {
        offsets.push(offset);
        offset += chained_rule_len(r);
    }
    for off in &offsets {
        sink.write_u16(*off as u16);
    }
    for r in &rs.rules {
        sink.write_u16(r.backtrack.len() as u16);
        for g in &r.backtrack {
            sink.write_glyph_id(*g);
        }
        sink.write_u16(r.input.len() as u16 + 1);
        for g in &r.input {
            sink.write_glyph_id(*g);
        }
        sink.write_u16(r.lookahead.len() as u16);
        for g in &r.lookahead {
            sink.write_glyph_id(*g);
        }
        write_actions(&r.actions, sink);
    }
}

fn read_chained_rule_set(data: &[u8], pos: usize) -> Result<ChainedSeqRuleSet> {
    let base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("chained-context", "rule set offset out of bounds"))?;
    let mut cur = Cursor::new(base);
    let count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("chained-context", "truncated rule count"))?;
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(
            cur.read_u16()
                .ok_or_else(|| Error::invalid("chained-context", "truncated rule offset"))?,
        );
    }
    let mut rules = Vec::with_capacity(count as usize);
    for o in offsets {
        rules.push(read_chained_rule(base, o as usize)?);
    }
    Ok(ChainedSeqRuleSet { rules })
}

fn read_chained_rule(data: &[u8], pos: usize) -> Result<ChainedSeqRule> {
    let base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("chained-context", "rule offset out of bounds"))?;
    let mut cur = Cursor::new(base);
    let bt_count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("chained-context", "truncated backtrack count"))?;
    let mut backtrack = Vec::with_capacity(bt_count as usize);
    for _ in 0..bt_count {
        backtrack.push(
            cur.read_glyph_id()
                .ok_or_else(|| Error::invalid("chained-context", "truncated backtrack glyph"))?,
        );
    }
    let glyph_count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("chained-context", "truncated glyph count"))?;
    if glyph_count == 0 {
        return Err(Error::invalid("chained-context", "zero glyph count"));
    }
    let mut input = Vec::with_capacity(glyph_count as usize - 1);
    for _ in 0..glyph_count - 1 {
        input.push(
            cur.read_glyph_id()
                .ok_or_else(|| Error::invalid("chained-context", "truncated input glyph"))?,
        );
    }
    let la_count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("chained-context", "truncated lookahead count"))?;
    let mut lookahead = Vec::with_capacity(la_count as usize);
    for _ in 0..la_count {
        lookahead.push(
            cur.read_glyph_id()
                .ok_or_else(|| Error::invalid("chained-context", "truncated lookahead glyph"))?,
        );
    }
    let actions = read_actions(&mut cur, "chained-context")?;
    Ok(ChainedSeqRule {
        backtrack,
        input,
        lookahead,
        actions,
    })
}

fn chained_class_rule_set_len(rs: &Option<ChainedClassSeqRuleSet>) -> usize {
    match rs {
        None => 0,
        Some(rs) => {
            2 + rs.rules.len() * 2
                + rs.rules.iter().map(chained_class_rule_len).sum::<usize>()
        }
    }
}

fn chained_class_rule_len(rule: &ChainedClassSeqRule) -> usize {
    2 + rule.backtrack_classes.len() * 2
        + 2
        + rule.input_classes.len() * 2
        + 2
        + rule.lookahead_classes.len() * 2
        + actions_len(&rule.actions)
}

fn encode_chained_class_rule_set(rs: &ChainedClassSeqRuleSet, sink: &mut ByteSink) {
    sink.write_u16(rs.rules.len() as u16);
    let header_len = 2 + rs.rules.len() * 2;
    let mut offset = header_len;
    let mut offsets = Vec::with_capacity(rs.rules.len());
    for r in &rs.rules {
        offsets.push(offset);
        offset += chained_class_rule_len(r);
    }
    for off in &offsets {
        sink.write_u16(*off as u16);
    }
    for r in &rs.rules {
        sink.write_u16(r.backtrack_classes.len() as u16);
        for c in &r.backtrack_classes {
            sink.write_u16(*c);
        }
        sink.write_u16(r.input_classes.len() as u16 + 1);
        for c in &r.input_classes {
            sink.write_u16(*c);
        }
        sink.write_u16(r.lookahead_classes.len() as u16);
        for c in &r.lookahead_classes {
            sink.write_u16(*c);
        }
        write_actions(&r.actions, sink);
    }
}

fn read_chained_class_rule_set(data: &[u8], pos: usize) -> Result<ChainedClassSeqRuleSet> {
    let base = data.get(pos..).ok_or_else(|| {
        Error::invalid("chained-context", "class rule set offset out of bounds")
    })?;
    let mut cur = Cursor::new(base);
    let count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("chained-context", "truncated rule count"))?;
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(
            cur.read_u16()
                .ok_or_else(|| Error::invalid("chained-context", "truncated rule offset"))?,
        );
    }
    let mut rules = Vec::with_capacity(count as usize);
    for o in offsets {
        rules.push(read_chained_class_rule(base, o as usize)?);
    }
    Ok(ChainedClassSeqRuleSet { rules })
}

fn read_chained_class_rule(data: &[u8], pos: usize) -> Result<ChainedClassSeqRule> {
    let base = data
        .get(pos..)
        .ok_or_else(|| Error::invalid("chained-context", "class rule offset out of bounds"))?;
    let mut cur = Cursor::new(base);
    let bt_count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("chained-context", "truncated backtrack count"))?;
    let mut backtrack_classes = Vec::with_capacity(bt_count as usize);
    for _ in 0..bt_count {
        backtrack_classes.push(
            cur.read_u16()
                .ok_or_else(|| Error::invalid("chained-context", "truncated backtrack class"))?,
        );
    }
    let glyph_count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("chained-context", "truncated glyph count"))?;
    if glyph_count == 0 {
        return Err(Error::invalid("chained-context", "zero glyph count"));
    }
    let mut input_classes = Vec::with_capacity(glyph_count as usize - 1);
    for _ in 0..glyph_count - 1 {
        input_classes.push(
            cur.read_u16()
                .ok_or_else(|| Error::invalid("chained-context", "truncated input class"))?,
        );
    }
    let la_count = cur
        .read_u16()
        .ok_or_else(|| Error::invalid("chained-context", "truncated lookahead count"))?;
    let mut lookahead_classes = Vec::with_capacity(la_count as usize);
    for _ in 0..la_count {
        lookahead_classes.push(
            cur.read_u16()
                .ok_or_else(|| Error::invalid("chained-context", "truncated lookahead class"))?,
        );
    }
    let actions = read_actions(&mut cur, "chained-context")?;
    Ok(ChainedClassSeqRule {
        backtrack_classes,
        input_classes,
        lookahead_classes,
        actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph::Glyph;

    fn gid(n: u16) -> GlyphId {
        GlyphId::new(n)
    }

    fn glyph(n: u16) -> Glyph {
        Glyph::new(gid(n), "", 0)
    }

    #[test]
    fn chained_format1_backtrack_and_lookahead() {
        let ctx = ChainedSequenceContext::Format1 {
            coverage: CoverageTable::from_glyphs(vec![gid(3)]),
            rule_sets: vec![Some(ChainedSeqRuleSet {
                rules: vec![ChainedSeqRule {
                    backtrack: vec![gid(2), gid(1)],
                    input: vec![gid(4)],
                    lookahead: vec![gid(5)],
                    actions: vec![(0, 7)],
                }],
            })],
        };
        let seq: Vec<Glyph> = [1, 2, 3, 4, 5, 6].into_iter().map(glyph).collect();
        let keep = |_: GlyphId| true;
        let m = ctx.apply(&seq, &keep, 2, seq.len()).unwrap();
        assert_eq!(m.input_positions, vec![2, 3]);
        assert_eq!(m.next, 4);

        let seq2: Vec<Glyph> = [9, 2, 3, 4, 5].into_iter().map(glyph).collect();
        assert!(ctx.apply(&seq2, &keep, 2, seq2.len()).is_none());
    }

    #[test]
    fn round_trips_format1() {
        let ctx = SequenceContext::Format1 {
            coverage: CoverageTable::from_glyphs(vec![gid(1)]),
            rule_sets: vec![Some(SeqRuleSet {
                rules: vec![SeqRule {
                    input: vec![gid(2)],
                    actions: vec![(0, 1)],
                }],
            })],
        };
        let mut sink = ByteSink::new();
        ctx.encode(&mut sink);
        assert_eq!(sink.len(), ctx.encode_len());
        let bytes = sink.into_vec();
        let decoded = SequenceContext::read(&bytes, 0).unwrap();
        assert_eq!(ctx, decoded);
    }
}
