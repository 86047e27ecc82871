//! The outer lookup-application driver (§4.3), the splice primitive
//! (§4.5), the stack-based nested-action executor (§4.6), and the
//! `shape_run` entry point composing selection (§4.7) with application.
//!
//! Grounded in shape, not in fontations (a parse/compile library that never
//! drives a glyph buffer through a lookup): the top-level loop and the
//! index-fixup contract follow allsorts' `gsub::apply`/`gpos::apply` and
//! harfruzz's apply-plan loop, adapted to this crate's `Match`/`MatchKind`
//! contract and tagged-variant subtables.

use std::collections::BTreeSet;

use font_types::{GlyphId, Tag};
use log::{debug, trace, warn};

use crate::error::Result;
use crate::glyph::GlyphSequence;
use crate::lookup::{GlyphFilter, Lookup, LookupFlag};
use crate::lookup_list::LookupList;
use crate::primitives::Gdef;
use crate::script::{select_lookups, FeatureList, ScriptList};
use crate::subtables::{ApplySubtable, Match, MatchKind, SequenceLookupRecord};
use crate::table::{Gpos, Gsub};

/// Ceiling on the number of nested actions a single top-level match may
/// dispatch before the executor gives up and returns whatever prefix of
/// work it completed (§4.6). 64 is the value observed to match reference
/// shapers on pathologically self-multiplying rule sets.
pub const ACTION_CEILING: usize = 64;

fn build_filter<'a, T>(lookup: &'a Lookup<T>, gdef: Option<&'a Gdef>) -> GlyphFilter<'a> {
    let mark_filtering_set = match (lookup.mark_filtering_set, gdef) {
        (Some(index), Some(g)) => g.mark_glyph_set(index),
        _ => None,
    };
    GlyphFilter::new(lookup.flag, gdef, mark_filtering_set)
}

/// The effect a single [`apply_match`] splice has on every other live
/// position handle: which real indices vanished, where survivors that sat
/// between them landed, and the uniform shift for everything past the
/// splice. This is the "remove → insert → shift" contract of §4.6.
///
/// The first matched position is not treated as vanished: it is where the
/// replacement now lives, so a handle pointing at it is remapped to the
/// replacement's last glyph rather than invalidated. Without this, a
/// context rule that recurses into itself at the same `sequence_index`
/// (§8 scenario 4) would see its own handle invalidated by the first
/// action it dispatches and could never recurse a second time.
struct SpliceEffect {
    first: usize,
    /// Where a handle on `first` now points, or `None` if the replacement
    /// was empty (nothing left to alias).
    first_maps_to: Option<usize>,
    /// Every other matched position — these have no surviving counterpart.
    invalidated: Vec<usize>,
    /// `(old position, new position)` for every stray glyph relocated by
    /// the splice (glyphs between the first and last matched position that
    /// were not themselves matched).
    stray_remap: Vec<(usize, usize)>,
    last: usize,
    delta: isize,
    /// The real index at which the outer driver (or executor frame) should
    /// resume: one past the relocated strays, i.e. the start of the
    /// untouched tail.
    next: usize,
}

impl SpliceEffect {
    /// Translate a position handle through this splice, or `None` if that
    /// handle has no surviving counterpart.
    fn fixup(&self, pos: usize) -> Option<usize> {
        if pos == self.first {
            return self.first_maps_to;
        }
        if self.invalidated.contains(&pos) {
            return None;
        }
        if pos > self.last {
            return Some((pos as isize + self.delta) as usize);
        }
        self.stray_remap
            .iter()
            .find(|(old, _)| *old == pos)
            .map(|(_, new)| *new)
            .or(Some(pos))
    }
}

/// Splice a match's replacement into the sequence per §4.5: the matched
/// positions are removed, glyphs strictly between them that the filter
/// skipped over (the "strays") are preserved in order immediately after
/// the replacement, and the replacement is inserted at the first matched
/// position. Subtables are responsible for concatenating removed glyphs'
/// text into the replacement themselves (see e.g. `GsubSubtable::Ligature`)
/// — this primitive only rearranges positions.
fn apply_match(
    seq: &mut GlyphSequence,
    input_positions: &[usize],
    replacement: Vec<crate::glyph::Glyph>,
) -> SpliceEffect {
    debug_assert!(!input_positions.is_empty());
    debug_assert!(input_positions.windows(2).all(|w| w[0] < w[1]));
    let first = input_positions[0];
    let last = *input_positions.last().unwrap();
    let matched: BTreeSet<usize> = input_positions.iter().copied().collect();

    let strays: Vec<(usize, crate::glyph::Glyph)> = (first..=last)
        .filter(|pos| !matched.contains(pos))
        .map(|pos| (pos, seq[pos].clone()))
        .collect();

    let k = replacement.len();
    let stray_count = strays.len();
    let new_span = k + stray_count;
    let old_span = last + 1 - first;

    let stray_remap: Vec<(usize, usize)> = strays
        .iter()
        .enumerate()
        .map(|(i, (old, _))| (*old, first + k + i))
        .collect();

    let tail: Vec<_> = seq.split_off(last + 1);
    seq.truncate(first);
    seq.extend(replacement);
    seq.extend(strays.into_iter().map(|(_, g)| g));
    seq.extend(tail);

    SpliceEffect {
        first,
        first_maps_to: (k > 0).then_some(first + k - 1),
        invalidated: input_positions[1..].to_vec(),
        stray_remap,
        last,
        delta: new_span as isize - old_span as isize,
        next: first + new_span,
    }
}

/// One frame of the nested-action executor: the real-index handles the
/// frame's pending actions index into, the actions themselves, and the
/// bound matching within this frame must respect.
struct Frame {
    input_positions: Vec<Option<usize>>,
    actions: Vec<SequenceLookupRecord>,
    next_action: usize,
    end_pos: usize,
}

/// Run the nested-action machine seeded by a context/chained-context
/// match's `actions`, per §4.6. Returns the real index at which the outer
/// driver should resume once every frame has drained (or the action
/// ceiling has been hit).
fn run_actions<T: ApplySubtable>(
    lookups: &LookupList<T>,
    seq: &mut GlyphSequence,
    gdef: Option<&Gdef>,
    initial_positions: Vec<usize>,
    initial_actions: Vec<SequenceLookupRecord>,
    initial_end_pos: usize,
) -> Result<usize> {
    let mut stack = vec![Frame {
        input_positions: initial_positions.into_iter().map(Some).collect(),
        actions: initial_actions,
        next_action: 0,
        end_pos: initial_end_pos,
    }];
    let mut action_count = 0usize;
    let mut resume = initial_end_pos;

    'outer: while let Some(frame) = stack.last_mut() {
        if frame.next_action >= frame.actions.len() {
            resume = frame.end_pos;
            stack.pop();
            continue;
        }
        if action_count >= ACTION_CEILING {
            debug!("nested executor hit the action ceiling ({ACTION_CEILING}); truncating");
            break;
        }

        let (sequence_index, lookup_index) = frame.actions[frame.next_action];
        frame.next_action += 1;
        action_count += 1;

        let Some(Some(real_pos)) = frame.input_positions.get(sequence_index as usize).copied()
        else {
            continue;
        };
        let Some(target) = lookups.get(lookup_index) else {
            warn!("nested action referenced out-of-range lookup {lookup_index}; skipped");
            continue;
        };

        let keep = build_filter(target, gdef);
        let rtl = target.flag.contains(LookupFlag::RIGHT_TO_LEFT);
        let end_pos = frame.end_pos;
        let mut matched: Option<Match> = None;
        for subtable in &target.subtables {
            if let Some(m) = subtable.try_apply(seq, &|g| keep.keep(g), real_pos, end_pos, rtl)? {
                matched = Some(m);
                break;
            }
        }
        let Some(m) = matched else { continue };

        match m.kind {
            MatchKind::Replace(replacement) => {
                let effect = apply_match(seq, &m.input_positions, replacement);
                for f in stack.iter_mut() {
                    for handle in f.input_positions.iter_mut() {
                        *handle = handle.and_then(|p| effect.fixup(p));
                    }
                    f.end_pos = (f.end_pos as isize + effect.delta) as usize;
                }
                resume = effect.next;
            }
            MatchKind::Actions(nested) => {
                stack.push(Frame {
                    input_positions: m.input_positions.into_iter().map(Some).collect(),
                    actions: nested,
                    next_action: 0,
                    end_pos: m.next,
                });
            }
        }
        if action_count >= ACTION_CEILING {
            break 'outer;
        }
    }
    Ok(resume)
}

/// Apply one lookup across the whole glyph sequence, per §4.3. GSUB 8.1
/// (reverse chaining) runs back-to-front; every other lookup type runs
/// forward with the explicit progress guard.
pub fn apply_lookup<T: ApplySubtable>(
    lookups: &LookupList<T>,
    lookup_index: u16,
    seq: &mut GlyphSequence,
    gdef: Option<&Gdef>,
) -> Result<()> {
    let Some(lookup) = lookups.get(lookup_index) else {
        warn!("shape_run requested out-of-range lookup {lookup_index}; skipped");
        return Ok(());
    };

    let filter = build_filter(lookup, gdef);
    let keep = |g: GlyphId| filter.keep(g);
    let rtl = lookup.flag.contains(LookupFlag::RIGHT_TO_LEFT);

    if T::runs_backward(lookup.lookup_type) {
        let mut pos = seq.len();
        while pos > 0 {
            pos -= 1;
            let bound = seq.len();
            for subtable in &lookup.subtables {
                if let Some(m) = subtable.try_apply(seq, &keep, pos, bound, rtl)? {
                    trace!("reverse lookup {lookup_index} matched at {pos}");
                    if let MatchKind::Replace(replacement) = m.kind {
                        apply_match(seq, &m.input_positions, replacement);
                    }
                    break;
                }
            }
        }
        return Ok(());
    }

    let mut pos = 0usize;
    while pos < seq.len() {
        let num_left_before = seq.len() - pos;
        let bound = seq.len();
        let mut matched: Option<Match> = None;
        for subtable in &lookup.subtables {
            if let Some(m) = subtable.try_apply(seq, &keep, pos, bound, rtl)? {
                matched = Some(m);
                break;
            }
        }

        let mut next = match matched {
            None => pos + 1,
            Some(m) => match m.kind {
                MatchKind::Replace(replacement) => {
                    trace!("lookup {lookup_index} matched at {pos}, replaced");
                    apply_match(seq, &m.input_positions, replacement).next
                }
                MatchKind::Actions(actions) => {
                    trace!("lookup {lookup_index} matched at {pos}, dispatching nested actions");
                    run_actions(lookups, seq, gdef, m.input_positions, actions, m.next)?
                }
            },
        };

        let num_left_after = seq.len().saturating_sub(next);
        if num_left_after >= num_left_before {
            next = next.max(pos) + 1;
        }
        pos = next;
    }
    Ok(())
}

/// Resolve `(script, language)` plus an enabled-feature set to a lookup
/// order (§4.7) and apply every selected lookup in turn (§4.3), using
/// `gdef` for glyph-ignore filtering (§4.4).
pub fn apply_lookups<T: ApplySubtable>(
    lookup_list: &LookupList<T>,
    script_list: &ScriptList,
    feature_list: &FeatureList,
    script: Option<Tag>,
    language: Option<Tag>,
    enabled_features: &BTreeSet<Tag>,
    gdef: Option<&Gdef>,
    seq: &mut GlyphSequence,
) -> Result<()> {
    let order = select_lookups(
        script_list,
        feature_list,
        lookup_list.len(),
        script,
        language,
        enabled_features,
    );
    for lookup_index in order {
        apply_lookup(lookup_list, lookup_index, seq, gdef)?;
    }
    Ok(())
}

/// Run a complete substitution + positioning pass over a glyph sequence:
/// `GSUB` lookups first, then `GPOS` lookups, each resolved against its own
/// table's `ScriptList`/`FeatureList` for the same locale and enabled
/// features. Mirrors the two-pass structure every production shaper uses
/// (substitute, then position) rather than interleaving the tables.
pub fn shape_run(
    gsub: Option<&Gsub>,
    gpos: Option<&Gpos>,
    gdef: Option<&Gdef>,
    script: Option<Tag>,
    language: Option<Tag>,
    enabled_features: &BTreeSet<Tag>,
    seq: &mut GlyphSequence,
) -> Result<()> {
    if let Some(gsub) = gsub {
        apply_lookups(
            &gsub.lookup_list,
            &gsub.script_list,
            &gsub.feature_list,
            script,
            language,
            enabled_features,
            gdef,
            seq,
        )?;
    }
    if let Some(gpos) = gpos {
        apply_lookups(
            &gpos.lookup_list,
            &gpos.script_list,
            &gpos.feature_list,
            script,
            language,
            enabled_features,
            gdef,
            seq,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph::{concat_text, Glyph};
    use crate::lookup::Lookup;
    use crate::primitives::CoverageTable;
    use crate::subtables::context::{ChainedSequenceContext, SeqRule, SeqRuleSet};
    use crate::subtables::gsub::{GsubSubtable, Ligature};

    fn glyph(gid: u16, text: &str) -> Glyph {
        Glyph::new(GlyphId::new(gid), text, 10)
    }

    /// Scenario 1 (§8): a delta substitution through the full lookup
    /// driver, not just the subtable's own `apply`.
    #[test]
    fn scenario_delta_substitution_end_to_end() {
        let lookup = Lookup::new(
            1,
            LookupFlag::empty(),
            vec![GsubSubtable::SingleDelta {
                coverage: CoverageTable::from_glyphs(vec![GlyphId::new(5)]),
                delta: 1,
            }],
        );
        let list = LookupList { lookups: vec![lookup] };
        let mut seq = vec![glyph(5, "a"), glyph(9, "b")];
        apply_lookup(&list, 0, &mut seq, None).unwrap();
        assert_eq!(seq[0].gid, GlyphId::new(6));
        assert_eq!(seq[1].gid, GlyphId::new(9));
    }

    /// Scenario 2 (§8): multiple substitution must preserve backing text,
    /// splitting it across the expansion with only the first output glyph
    /// carrying it.
    #[test]
    fn scenario_multiple_substitution_preserves_text() {
        let lookup = Lookup::new(
            2,
            LookupFlag::empty(),
            vec![GsubSubtable::Multiple {
                coverage: CoverageTable::from_glyphs(vec![GlyphId::new(1)]),
                sequences: vec![vec![GlyphId::new(10), GlyphId::new(11), GlyphId::new(12)]],
            }],
        );
        let list = LookupList { lookups: vec![lookup] };
        let mut seq = vec![glyph(1, "B")];
        apply_lookup(&list, 0, &mut seq, None).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(concat_text(&seq), "B");
        assert_eq!(seq[1].text, "");
        assert_eq!(seq[2].text, "");
    }

    /// Scenario 3 (§8): ligature substitution swallowing a stray glyph the
    /// filter skips over, preserving both the stray and the backing text.
    #[test]
    fn scenario_ligature_with_stray_end_to_end() {
        let lookup = Lookup::new(
            4,
            LookupFlag::IGNORE_MARKS,
            vec![GsubSubtable::Ligature {
                coverage: CoverageTable::from_glyphs(vec![GlyphId::new(1)]),
                ligature_sets: vec![vec![Ligature {
                    components: vec![GlyphId::new(2)],
                    glyph: GlyphId::new(99),
                }]],
            }],
        );
        let list = LookupList { lookups: vec![lookup] };
        use std::collections::BTreeMap;
        use crate::primitives::{ClassDef, Gdef, GlyphClass};
        let mut classes = BTreeMap::new();
        classes.insert(GlyphId::new(50), GlyphClass::Mark.as_u16());
        let gdef = Gdef {
            glyph_class_def: Some(ClassDef::from_map(classes)),
            ..Gdef::default()
        };
        let mut seq = vec![glyph(1, "f"), glyph(50, "\u{0301}"), glyph(2, "i")];
        apply_lookup(&list, 0, &mut seq, Some(&gdef)).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq[0].gid, GlyphId::new(99));
        assert_eq!(seq[1].gid, GlyphId::new(50));
        assert_eq!(concat_text(&seq), "fi\u{0301}");
    }

    /// Scenario 4 (§8): nested recursion must terminate at the action
    /// ceiling rather than looping forever, and must produce a finite
    /// prefix of A's followed by the untouched B.
    #[test]
    fn scenario_bounded_recursion_terminates() {
        // Lookup 0: a SeqContext1 rule on input [A] that fires two nested
        // actions at the same matched position: multiply via lookup 1,
        // then recurse into lookup 0 again.
        let multiply = Lookup::new(
            1,
            LookupFlag::empty(),
            vec![GsubSubtable::Multiple {
                coverage: CoverageTable::from_glyphs(vec![GlyphId::new(1)]),
                sequences: vec![vec![GlyphId::new(1), GlyphId::new(1)]],
            }],
        );
        let rule = SeqRule {
            input: vec![GlyphId::new(2)],
            actions: vec![(0, 1), (0, 0)],
        };
        let context = Lookup::new(
            5,
            LookupFlag::empty(),
            vec![GsubSubtable::Context(crate::subtables::context::SequenceContext::Format1 {
                coverage: CoverageTable::from_glyphs(vec![GlyphId::new(1)]),
                rule_sets: vec![Some(SeqRuleSet { rules: vec![rule] })],
            })],
        );
        let list = LookupList {
            lookups: vec![context, multiply],
        };
        let mut seq = vec![glyph(1, "A"), glyph(2, "B")];
        apply_lookup(&list, 0, &mut seq, None).unwrap();
        assert!(seq.len() >= 6, "expected at least 5 A's before the trailing B");
        assert_eq!(seq.last().unwrap().gid, GlyphId::new(2));
        assert!(seq[..seq.len() - 1].iter().all(|g| g.gid == GlyphId::new(1)));
        assert!(seq.len() <= ACTION_CEILING + 2);
    }

    /// Scenario 5 (§8): chained context with backtrack, driven end to end.
    #[test]
    fn scenario_chained_context_backtrack_and_lookahead() {
        use crate::subtables::context::{ChainedSeqRule, ChainedSeqRuleSet};
        let swap = Lookup::new(
            1,
            LookupFlag::empty(),
            vec![GsubSubtable::SingleDelta {
                coverage: CoverageTable::from_glyphs(vec![GlyphId::new(3)]),
                delta: 27,
            }],
        );
        let rule = ChainedSeqRule {
            backtrack: vec![GlyphId::new(2), GlyphId::new(1)],
            input: vec![GlyphId::new(3), GlyphId::new(4)],
            lookahead: vec![GlyphId::new(5)],
            actions: vec![(0, 1)],
        };
        let chain = Lookup::new(
            6,
            LookupFlag::empty(),
            vec![GsubSubtable::ChainContext(ChainedSequenceContext::Format1 {
                coverage: CoverageTable::from_glyphs(vec![GlyphId::new(3)]),
                rule_sets: vec![Some(ChainedSeqRuleSet { rules: vec![rule] })],
            })],
        );
        let list = LookupList {
            lookups: vec![chain, swap],
        };

        let mut seq: GlyphSequence = [1u16, 2, 3, 4, 5, 6]
            .iter()
            .map(|&g| glyph(g, ""))
            .collect();
        apply_lookup(&list, 0, &mut seq, None).unwrap();
        let gids: Vec<u16> = seq.iter().map(|g| g.gid.to_u16()).collect();
        assert_eq!(gids, vec![1, 2, 30, 4, 5, 6]);

        let mut unchanged: GlyphSequence = [9u16, 2, 3, 4, 5]
            .iter()
            .map(|&g| glyph(g, ""))
            .collect();
        apply_lookup(&list, 0, &mut unchanged, None).unwrap();
        let gids: Vec<u16> = unchanged.iter().map(|g| g.gid.to_u16()).collect();
        assert_eq!(gids, vec![9, 2, 3, 4, 5]);
    }

    /// §7: an apply-time-unsupported GPOS value record (y-advance) is
    /// fatal for the shaping call, not silently dropped.
    #[test]
    fn unsupported_value_record_is_fatal_at_apply_time() {
        use crate::primitives::ValueRecord;
        use crate::subtables::gpos::GposSubtable;

        let lookup = Lookup::new(
            1,
            LookupFlag::empty(),
            vec![GposSubtable::SingleUniform {
                coverage: CoverageTable::from_glyphs(vec![GlyphId::new(5)]),
                value: ValueRecord {
                    y_advance: 10,
                    ..Default::default()
                },
            }],
        );
        let list = LookupList { lookups: vec![lookup] };
        let mut seq = vec![glyph(5, "a")];
        assert!(apply_lookup(&list, 0, &mut seq, None).is_err());
    }
}
