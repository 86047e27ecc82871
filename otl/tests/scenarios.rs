//! End-to-end coverage of the §8 concrete scenarios, driven entirely through
//! the public API rather than any crate-internal helper.

use font_types::{GlyphId, Tag};
use otl::lookup::{Lookup, LookupFlag};
use otl::lookup_list::LookupList;
use otl::primitives::{ClassDef, CoverageTable, Gdef};
use otl::script::{Feature, FeatureList, LangSys, Script, ScriptList};
use otl::subtables::gsub::{GsubSubtable, Ligature};
use otl::{apply_lookup, apply_lookups, Glyph, GlyphSequence};
use std::collections::{BTreeMap, BTreeSet};

fn glyph(gid: u16, text: &str) -> Glyph {
    Glyph::new(GlyphId::new(gid), text, 10)
}

fn seq(gids: &[u16]) -> GlyphSequence {
    gids.iter().map(|&g| glyph(g, "")).collect()
}

fn gid_seq(seq: &GlyphSequence) -> Vec<u16> {
    seq.iter().map(|g| g.gid.to_u16()).collect()
}

/// Scenario 1: delta substitution, text preserved untouched either side.
#[test]
fn delta_substitution() {
    let lookup = Lookup::new(
        1,
        LookupFlag::empty(),
        vec![GsubSubtable::SingleDelta {
            coverage: CoverageTable::from_glyphs(vec![GlyphId::new(3)]),
            delta: 26,
        }],
    );
    let list = LookupList { lookups: vec![lookup] };
    let mut glyphs = seq(&[1, 2, 3, 4]);
    apply_lookup(&list, 0, &mut glyphs, None).unwrap();
    assert_eq!(gid_seq(&glyphs), vec![1, 2, 29, 4]);
}

/// Scenario 2: multiple substitution must keep all backing text, with only
/// the first output glyph of the expansion carrying it.
#[test]
fn multiple_substitution_preserves_text() {
    let lookup = Lookup::new(
        2,
        LookupFlag::empty(),
        vec![GsubSubtable::Multiple {
            coverage: CoverageTable::from_glyphs(vec![GlyphId::new(2)]),
            sequences: vec![vec![GlyphId::new(5), GlyphId::new(5), GlyphId::new(5)]],
        }],
    );
    let list = LookupList { lookups: vec![lookup] };
    let mut glyphs = vec![glyph(1, "A"), glyph(2, "B"), glyph(3, "C")];
    apply_lookup(&list, 0, &mut glyphs, None).unwrap();
    assert_eq!(gid_seq(&glyphs), vec![1, 5, 5, 5, 3]);
    let texts: Vec<&str> = glyphs.iter().map(|g| g.text.as_str()).collect();
    assert_eq!(texts, vec!["A", "B", "", "", "C"]);
}

/// Scenario 3: ligature substitution swallows a stray glyph the ignore-class
/// filter skips over; the stray survives, and the ligature's text is the
/// concatenation of the non-stray matched positions only.
#[test]
fn ligature_with_stray() {
    let lookup = Lookup::new(
        4,
        LookupFlag::IGNORE_LIGATURES,
        vec![GsubSubtable::Ligature {
            coverage: CoverageTable::from_glyphs(vec![GlyphId::new(10)]),
            ligature_sets: vec![vec![Ligature {
                components: vec![GlyphId::new(11), GlyphId::new(12)],
                glyph: GlyphId::new(99),
            }]],
        }],
    );
    let list = LookupList { lookups: vec![lookup] };
    let mut classes = BTreeMap::new();
    classes.insert(GlyphId::new(77), 2u16); // GDEF ligature class
    let gdef = Gdef {
        glyph_class_def: Some(ClassDef::from_map(classes)),
        ..Gdef::default()
    };
    let mut glyphs = vec![
        glyph(10, "a"),
        glyph(77, "b"),
        glyph(11, "c"),
        glyph(12, "d"),
        glyph(20, "e"),
    ];
    apply_lookup(&list, 0, &mut glyphs, Some(&gdef)).unwrap();
    assert_eq!(gid_seq(&glyphs), vec![99, 77, 20]);
    assert_eq!(glyphs[0].text, "acd");
    assert_eq!(glyphs[1].text, "b");
    assert_eq!(glyphs[2].text, "e");
}

/// Scenario 5: chained context with a failing and a succeeding backtrack.
#[test]
fn chained_context_backtrack_and_lookahead() {
    use otl::subtables::context::{ChainedSeqRule, ChainedSeqRuleSet, ChainedSequenceContext};

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
    let list = LookupList { lookups: vec![chain, swap] };

    let mut matches = seq(&[1, 2, 3, 4, 5, 6]);
    apply_lookup(&list, 0, &mut matches, None).unwrap();
    assert_eq!(gid_seq(&matches), vec![1, 2, 30, 4, 5, 6]);

    let mut fails = seq(&[9, 2, 3, 4, 5]);
    apply_lookup(&list, 0, &mut fails, None).unwrap();
    assert_eq!(gid_seq(&fails), vec![9, 2, 3, 4, 5]);
}

/// Scenario 6: feature-list ordering — required feature plus enabled
/// optional features, deduplicated and ascending.
#[test]
fn feature_list_ordering() {
    let latin = Tag::new(b"latn");
    let feature_tags: [Tag; 4] = [
        Tag::new(b"aaaa"),
        Tag::new(b"cccc"),
        Tag::new(b"eeee"),
        Tag::new(b"gggg"),
    ];

    let script_list = ScriptList {
        records: vec![(
            latin,
            Script {
                default_lang_sys: Some(LangSys {
                    required_feature: Some(3),
                    feature_indices: vec![0, 1, 2],
                }),
                lang_sys_records: vec![],
            },
        )],
    };
    let feature_list = FeatureList {
        features: vec![
            Feature { tag: feature_tags[0], params: None, lookup_indices: vec![10, 20] },
            Feature { tag: feature_tags[1], params: None, lookup_indices: vec![15] },
            Feature { tag: feature_tags[2], params: None, lookup_indices: vec![5, 20] },
            Feature { tag: feature_tags[3], params: None, lookup_indices: vec![0] },
        ],
    };
    let enabled: BTreeSet<Tag> = [feature_tags[0], feature_tags[2]].into_iter().collect();

    let mut glyphs = seq(&[1]);
    // No lookups actually fire (none of them match); this exercises
    // selection end to end through `apply_lookups` with an empty-but-valid
    // LookupList sized to 21 entries so every selected index is in range.
    let lookups: Vec<Lookup<GsubSubtable>> = (0..21)
        .map(|_| Lookup::new(1, LookupFlag::empty(), vec![]))
        .collect();
    let lookup_list = LookupList { lookups };
    apply_lookups(
        &lookup_list,
        &script_list,
        &feature_list,
        Some(latin),
        None,
        &enabled,
        None,
        &mut glyphs,
    )
    .unwrap();

    let order = otl::script::select_lookups(
        &script_list,
        &feature_list,
        lookup_list.len(),
        Some(latin),
        None,
        &enabled,
    );
    assert_eq!(order, vec![0, 5, 10, 20]);
}
