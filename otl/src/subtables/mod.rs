//! Subtables: the leaves of the GSUB/GPOS lookup graph.
//!
//! Every subtable format — whether it replaces glyphs (GSUB) or adjusts
//! their position (GPOS) — is matched against the uniform contract
//! described in the module docs of [`crate::lookup`]: given a starting
//! real index and a bound, produce at most one [`Match`]. The concrete
//! formats are tagged variants (see [`gsub::GsubSubtable`] and
//! [`gpos::GposSubtable`]) rather than trait objects, per the "closed set,
//! known at build time" design note: one `match` per `apply` call beats a
//! vtable indirection on what is the hottest loop in the engine.

pub mod context;
pub mod gpos;
pub mod gsub;

use font_types::GlyphId;

use crate::error::Result;
use crate::glyph::Glyph;
use crate::primitives::CoverageTable;

/// Adapts each subtable enum's bespoke `apply` method (GPOS's takes an
/// extra `rtl` flag for cursive attachment's sign convention, GSUB's does
/// not) to one signature the engine's lookup driver can call generically,
/// and tells the driver which lookup types run right-to-left (§4.3: "a
/// property of the lookup type, not a user-visible flag").
///
/// Returns `Result` rather than a plain `Option` because GPOS value
/// records can hit an apply-time `UnsupportedFeature` (§4.1/§7) that must
/// propagate out of the shaping call rather than being silently dropped.
pub trait ApplySubtable: Sized {
    fn try_apply(
        &self,
        seq: &[Glyph],
        keep: &dyn Fn(GlyphId) -> bool,
        a: usize,
        b: usize,
        rtl: bool,
    ) -> Result<Option<Match>>;

    /// Whether a lookup of this recorded type is applied back-to-front by
    /// the outer driver. Only GSUB 8.1 (reverse chaining) answers `true`.
    fn runs_backward(_lookup_type: u16) -> bool {
        false
    }
}

impl ApplySubtable for gsub::GsubSubtable {
    fn try_apply(
        &self,
        seq: &[Glyph],
        keep: &dyn Fn(GlyphId) -> bool,
        a: usize,
        b: usize,
        _rtl: bool,
    ) -> Result<Option<Match>> {
        Ok(self.apply(seq, keep, a, b))
    }

    fn runs_backward(lookup_type: u16) -> bool {
        lookup_type == 8
    }
}

impl ApplySubtable for gpos::GposSubtable {
    fn try_apply(
        &self,
        seq: &[Glyph],
        keep: &dyn Fn(GlyphId) -> bool,
        a: usize,
        b: usize,
        rtl: bool,
    ) -> Result<Option<Match>> {
        self.apply(seq, keep, a, b, rtl)
    }
}

/// A `(sequence_index, lookup_list_index)` pair: "apply lookup
/// `lookup_list_index` at the real position of the `sequence_index`-th
/// matched glyph", per §4.6.
pub type SequenceLookupRecord = (u16, u16);

/// The outcome of a successful subtable match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchKind {
    /// A direct replacement: the matched glyphs are spliced out and these
    /// glyphs spliced in (§4.5).
    Replace(Vec<Glyph>),
    /// Nested lookups to run at specific matched positions (§4.6).
    Actions(Vec<SequenceLookupRecord>),
}

/// A successful match of a subtable against the glyph sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    /// Real indices of every matched glyph, strictly increasing, never
    /// empty.
    pub input_positions: Vec<usize>,
    pub kind: MatchKind,
    /// The real index at which the outer driver should resume.
    pub next: usize,
}

impl Match {
    pub fn replace(input_positions: Vec<usize>, replace: Vec<Glyph>, next: usize) -> Self {
        debug_assert!(!input_positions.is_empty());
        Match {
            input_positions,
            kind: MatchKind::Replace(replace),
            next,
        }
    }

    pub fn actions(
        input_positions: Vec<usize>,
        actions: Vec<SequenceLookupRecord>,
        next: usize,
    ) -> Self {
        debug_assert!(!input_positions.is_empty());
        Match {
            input_positions,
            kind: MatchKind::Actions(actions),
            next,
        }
    }
}

/// Match `coverages.len()` backtrack selectors against the virtual sequence
/// strictly preceding `pos`, nearest-glyph-first. Shared by GSUB 8.1
/// (reverse chaining) and the chained-context formats' format-3 variant.
pub(crate) fn context_backward_covered(
    seq: &[Glyph],
    keep: &dyn Fn(GlyphId) -> bool,
    mut pos: usize,
    coverages: &[CoverageTable],
) -> bool {
    let mut i = 0;
    while i < coverages.len() {
        if pos == 0 {
            return false;
        }
        pos -= 1;
        let gid = seq[pos].gid;
        if !keep(gid) {
            continue;
        }
        if !coverages[i].contains(gid) {
            return false;
        }
        i += 1;
    }
    true
}

/// Forward counterpart of [`context_backward_covered`], matching lookahead
/// coverages starting at `pos`, bounded by `bound`.
pub(crate) fn context_forward_covered(
    seq: &[Glyph],
    keep: &dyn Fn(GlyphId) -> bool,
    mut pos: usize,
    bound: usize,
    coverages: &[CoverageTable],
) -> bool {
    let mut i = 0;
    while i < coverages.len() {
        if pos >= bound {
            return false;
        }
        let gid = seq[pos].gid;
        if !keep(gid) {
            pos += 1;
            continue;
        }
        if !coverages[i].contains(gid) {
            return false;
        }
        pos += 1;
        i += 1;
    }
    true
}

/// Scan backward from `pos` (exclusive) for the nearest kept glyph present
/// in `coverage`, skipping kept-but-uncovered glyphs along the way. Used by
/// the GPOS mark-attachment and cursive-attachment families to find "the
/// most recent preceding base/ligature/mark/entry glyph" per §4.2.
pub(crate) fn find_preceding_covered(
    seq: &[Glyph],
    keep: &dyn Fn(GlyphId) -> bool,
    mut pos: usize,
    coverage: &CoverageTable,
) -> Option<usize> {
    while pos > 0 {
        pos -= 1;
        let gid = seq[pos].gid;
        if !keep(gid) {
            continue;
        }
        if coverage.contains(gid) {
            return Some(pos);
        }
    }
    None
}
