//! `ScriptList` / `FeatureList`: the locale → lookup-order selection layer
//! described in §4.7.
//!
//! Grounded on `read_fonts::tables::layout::script`'s `ScriptList::select`
//! (index-for-tag via binary search over a sorted record array) and
//! `layout::feature`'s `FeatureList::get`, adapted from that crate's
//! zero-copy `FontRead` views to the owned, mutable representation this
//! engine needs.

use std::collections::BTreeSet;

use font_types::{ByteSink, Cursor, Tag};

use crate::error::{Error, Result};

/// The script tag OpenType reserves for "no specific script requested".
pub const DFLT: Tag = Tag::new(b"DFLT");

/// One language system's feature selection within a [`Script`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LangSys {
    /// `0xFFFF` on the wire means "no required feature"; represented here
    /// as `None` so callers can't forget the sentinel.
    pub required_feature: Option<u16>,
    pub feature_indices: Vec<u16>,
}

impl LangSys {
    fn encode_len(&self) -> usize {
        6 + self.feature_indices.len() * 2
    }

    fn encode(&self, sink: &mut ByteSink) {
        sink.write_u16(0); // lookupOrderOffset: reserved, always NULL.
        sink.write_u16(self.required_feature.unwrap_or(0xFFFF));
        sink.write_u16(self.feature_indices.len() as u16);
        for idx in &self.feature_indices {
            sink.write_u16(*idx);
        }
    }

    fn read(data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("langsys", "offset out of bounds"))?;
        let mut cur = Cursor::new(base);
        let lookup_order = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("langsys", "truncated lookup order offset"))?;
        if lookup_order != 0 {
            return Err(Error::unsupported(
                "langsys",
                "reordering table in a language system",
            ));
        }
        let required = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("langsys", "truncated required feature index"))?;
        let count = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("langsys", "truncated feature index count"))?;
        let mut feature_indices = Vec::with_capacity(count as usize);
        for _ in 0..count {
            feature_indices.push(
                cur.read_u16()
                    .ok_or_else(|| Error::invalid("langsys", "truncated feature index"))?,
            );
        }
        Ok(LangSys {
            required_feature: (required != 0xFFFF).then_some(required),
            feature_indices,
        })
    }
}

/// One entry of a [`ScriptList`]: a default language system plus any number
/// of tagged, overriding ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Script {
    pub default_lang_sys: Option<LangSys>,
    /// Kept sorted by tag, matching the wire's required ordering.
    pub lang_sys_records: Vec<(Tag, LangSys)>,
}

impl Script {
    fn lang_sys(&self, tag: Option<Tag>) -> Option<&LangSys> {
        match tag {
            None => self.default_lang_sys.as_ref(),
            Some(tag) => self
                .lang_sys_records
                .binary_search_by_key(&tag, |(t, _)| *t)
                .ok()
                .map(|i| &self.lang_sys_records[i].1),
        }
    }

    fn encode_len(&self) -> usize {
        let header = 4 + self.lang_sys_records.len() * 6;
        let default_len = self.default_lang_sys.as_ref().map_or(0, LangSys::encode_len);
        let records_len: usize = self.lang_sys_records.iter().map(|(_, l)| l.encode_len()).sum();
        header + default_len + records_len
    }

    fn encode(&self, sink: &mut ByteSink) {
        let header_len = 4 + self.lang_sys_records.len() * 6;
        let mut offset = header_len;
        let default_off = self.default_lang_sys.as_ref().map(|l| {
            let o = offset;
            offset += l.encode_len();
            o
        });
        sink.write_u16(default_off.unwrap_or(0) as u16);
        sink.write_u16(self.lang_sys_records.len() as u16);
        let mut offsets = Vec::with_capacity(self.lang_sys_records.len());
        for (_, l) in &self.lang_sys_records {
            offsets.push(offset);
            offset += l.encode_len();
        }
        for ((tag, _), off) in self.lang_sys_records.iter().zip(&offsets) {
            sink.write_tag(*tag);
            sink.write_u16(*off as u16);
        }
        if let Some(l) = &self.default_lang_sys {
            l.encode(sink);
        }
        for (_, l) in &self.lang_sys_records {
            l.encode(sink);
        }
    }

    fn read(data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("script", "offset out of bounds"))?;
        let mut cur = Cursor::new(base);
        let default_off = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("script", "truncated default langsys offset"))?;
        let count = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("script", "truncated langsys count"))?;
        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let tag = cur
                .read_tag()
                .ok_or_else(|| Error::invalid("script", "truncated langsys tag"))?;
            let off = cur
                .read_u16()
                .ok_or_else(|| Error::invalid("script", "truncated langsys offset"))?;
            records.push((tag, off));
        }
        let default_lang_sys = if default_off != 0 {
            Some(LangSys::read(base, default_off as usize)?)
        } else {
            None
        };
        let mut lang_sys_records = records
            .into_iter()
            .map(|(tag, off)| LangSys::read(base, off as usize).map(|l| (tag, l)))
            .collect::<Result<Vec<_>>>()?;
        lang_sys_records.sort_by_key(|(tag, _)| *tag);
        Ok(Script {
            default_lang_sys,
            lang_sys_records,
        })
    }
}

/// Script tag → [`Script`] mapping, kept sorted by tag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScriptList {
    pub records: Vec<(Tag, Script)>,
}

impl ScriptList {
    pub fn index_for_tag(&self, tag: Tag) -> Option<usize> {
        self.records.binary_search_by_key(&tag, |(t, _)| *t).ok()
    }

    fn lang_sys_for(&self, script: Tag, lang: Option<Tag>) -> Option<&LangSys> {
        let idx = self.index_for_tag(script)?;
        self.records[idx].1.lang_sys(lang)
    }

    /// Resolve a (script, language) locale to a [`LangSys`] per the search
    /// order in §4.7: `(undefined, undefined)`, then `(script, undefined)`,
    /// then `(undefined, language)`, then `(script, language)` — first hit
    /// wins. This is *not* "most specific wins"; it is the literal order
    /// the specification states.
    pub fn resolve(&self, script: Option<Tag>, language: Option<Tag>) -> Option<&LangSys> {
        if let Some(ls) = self.lang_sys_for(DFLT, None) {
            return Some(ls);
        }
        if let Some(s) = script {
            if let Some(ls) = self.lang_sys_for(s, None) {
                return Some(ls);
            }
        }
        if let Some(l) = language {
            if let Some(ls) = self.lang_sys_for(DFLT, Some(l)) {
                return Some(ls);
            }
        }
        if let (Some(s), Some(l)) = (script, language) {
            if let Some(ls) = self.lang_sys_for(s, Some(l)) {
                return Some(ls);
            }
        }
        None
    }

    pub fn encode_len(&self) -> usize {
        let header = 2 + self.records.len() * 6;
        header + self.records.iter().map(|(_, s)| s.encode_len()).sum::<usize>()
    }

    pub fn encode(&self, sink: &mut ByteSink) {
        let header_len = 2 + self.records.len() * 6;
        sink.write_u16(self.records.len() as u16);
        let mut offset = header_len;
        let mut offsets = Vec::with_capacity(self.records.len());
        for (_, s) in &self.records {
            offsets.push(offset);
            offset += s.encode_len();
        }
        for ((tag, _), off) in self.records.iter().zip(&offsets) {
            sink.write_tag(*tag);
            sink.write_u16(*off as u16);
        }
        for (_, s) in &self.records {
            s.encode(sink);
        }
    }

    pub fn read(data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("script-list", "offset out of bounds"))?;
        let mut cur = Cursor::new(base);
        let count = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("script-list", "truncated script count"))?;
        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let tag = cur
                .read_tag()
                .ok_or_else(|| Error::invalid("script-list", "truncated script tag"))?;
            let off = cur
                .read_u16()
                .ok_or_else(|| Error::invalid("script-list", "truncated script offset"))?;
            records.push((tag, off));
        }
        let mut records = records
            .into_iter()
            .map(|(tag, off)| Script::read(base, off as usize).map(|s| (tag, s)))
            .collect::<Result<Vec<_>>>()?;
        records.sort_by_key(|(tag, _)| *tag);
        Ok(ScriptList { records })
    }
}

/// A tagged, indexed bag of lookup indices.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feature {
    pub tag: Tag,
    /// Opaque `FeatureParams` tail bytes, retained verbatim for round-trip
    /// but never interpreted (stylistic-set names, size features, etc. are
    /// out of scope — this core only needs the lookup index list).
    pub params: Option<Vec<u8>>,
    pub lookup_indices: Vec<u16>,
}

impl Feature {
    fn encode_len(&self) -> usize {
        let params_len = self.params.as_ref().map_or(0, |p| p.len());
        6 + self.lookup_indices.len() * 2 + params_len
    }

    fn encode(&self, sink: &mut ByteSink) {
        let header_len = 6 + self.lookup_indices.len() * 2;
        sink.write_u16(if self.params.is_some() { header_len as u16 } else { 0 });
        sink.write_u16(self.lookup_indices.len() as u16);
        for idx in &self.lookup_indices {
            sink.write_u16(*idx);
        }
        if let Some(p) = &self.params {
            sink.write_bytes(p);
        }
    }

    fn read(data: &[u8], pos: usize) -> Result<Self, Error> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("feature", "offset out of bounds"))?;
        let mut cur = Cursor::new(base);
        let params_off = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("feature", "truncated feature params offset"))?;
        let count = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("feature", "truncated lookup index count"))?;
        let mut lookup_indices = Vec::with_capacity(count as usize);
        for _ in 0..count {
            lookup_indices.push(
                cur.read_u16()
                    .ok_or_else(|| Error::invalid("feature", "truncated lookup index"))?,
            );
        }
        let params = (params_off != 0)
            .then(|| base.get(params_off as usize..).unwrap_or(&[]).to_vec());
        Ok(Feature {
            // tag is filled in by FeatureList::read, which owns it.
            tag: Tag::default(),
            params,
            lookup_indices,
        })
    }
}

/// Index-ordered feature list, matching `read_fonts::FeatureList::get`'s
/// `FeatureIndex`-keyed access.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureList {
    pub features: Vec<Feature>,
}

impl FeatureList {
    pub fn get(&self, index: u16) -> Option<&Feature> {
        self.features.get(index as usize)
    }

    pub fn encode_len(&self) -> usize {
        let header = 2 + self.features.len() * 6;
        header + self.features.iter().map(Feature::encode_len).sum::<usize>()
    }

    pub fn encode(&self, sink: &mut ByteSink) {
        let header_len = 2 + self.features.len() * 6;
        sink.write_u16(self.features.len() as u16);
        let mut offset = header_len;
        let mut offsets = Vec::with_capacity(self.features.len());
        for f in &self.features {
            offsets.push(offset);
            offset += f.encode_len();
        }
        for (f, off) in self.features.iter().zip(&offsets) {
            sink.write_tag(f.tag);
            sink.write_u16(*off as u16);
        }
        for f in &self.features {
            f.encode(sink);
        }
    }

    pub fn read(data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("feature-list", "offset out of bounds"))?;
        let mut cur = Cursor::new(base);
        let count = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("feature-list", "truncated feature count"))?;
        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let tag = cur
                .read_tag()
                .ok_or_else(|| Error::invalid("feature-list", "truncated feature tag"))?;
            let off = cur
                .read_u16()
                .ok_or_else(|| Error::invalid("feature-list", "truncated feature offset"))?;
            records.push((tag, off));
        }
        let features = records
            .into_iter()
            .map(|(tag, off)| {
                Feature::read(base, off as usize).map(|mut f| {
                    f.tag = tag;
                    f
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FeatureList { features })
    }
}

/// Resolve a locale and an enabled-feature set to the final, ordered lookup
/// index list per §4.7: required feature plus the union of requested
/// optional features' lookups, clipped to `lookup_count`, strictly
/// ascending and deduplicated regardless of the include-set's iteration
/// order (a `BTreeSet` is used purely as a sorting/dedup device here, not
/// because lookup indices are a semantic set elsewhere in the engine).
pub fn select_lookups(
    script_list: &ScriptList,
    feature_list: &FeatureList,
    lookup_count: usize,
    script: Option<Tag>,
    language: Option<Tag>,
    enabled_features: &BTreeSet<Tag>,
) -> Vec<u16> {
    let Some(lang_sys) = script_list.resolve(script, language) else {
        return Vec::new();
    };
    let mut lookups = BTreeSet::new();
    if let Some(required) = lang_sys.required_feature {
        if let Some(feature) = feature_list.get(required) {
            lookups.extend(feature.lookup_indices.iter().copied());
        }
    }
    for &feature_index in &lang_sys.feature_indices {
        let Some(feature) = feature_list.get(feature_index) else {
            continue;
        };
        if enabled_features.contains(&feature.tag) {
            lookups.extend(feature.lookup_indices.iter().copied());
        }
    }
    lookups
        .into_iter()
        .filter(|&idx| (idx as usize) < lookup_count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(s: &str) -> Tag {
        Tag::new(s.as_bytes())
    }

    /// Scenario 6 in §8: ScriptList has `(Latin, und) -> {required: 7,
    /// optional: [1,3,5]}`; FeatureList has `{1:[10,20], 3:[15], 5:[5,20],
    /// 7:[0]}`. Requesting locale (Latin, und) with features 1 and 5
    /// enabled must yield `[0, 5, 10, 20]`.
    fn build_scenario() -> (ScriptList, FeatureList) {
        let lang_sys = LangSys {
            required_feature: Some(7),
            feature_indices: vec![1, 3, 5],
        };
        let script = Script {
            default_lang_sys: Some(lang_sys),
            lang_sys_records: vec![],
        };
        let script_list = ScriptList {
            records: vec![(tag("latn"), script)],
        };
        let feature = |t: &str, lookups: &[u16]| Feature {
            tag: tag(t),
            params: None,
            lookup_indices: lookups.to_vec(),
        };
        // Built explicitly by index so the feature indices line up with
        // the scenario's numbering.
        let mut features = vec![Feature::default(); 8];
        features[1] = feature("liga", &[10, 20]);
        features[3] = feature("kern", &[15]);
        features[5] = feature("mark", &[5, 20]);
        features[7] = feature("ccmp", &[0]);
        (script_list, FeatureList { features })
    }

    #[test]
    fn feature_selection_matches_scenario() {
        let (script_list, feature_list) = build_scenario();
        let mut enabled = BTreeSet::new();
        enabled.insert(tag("liga"));
        enabled.insert(tag("mark"));
        let lookups = select_lookups(
            &script_list,
            &feature_list,
            100,
            Some(tag("latn")),
            None,
            &enabled,
        );
        assert_eq!(lookups, vec![0, 5, 10, 20]);
    }

    #[test]
    fn selection_is_independent_of_include_set_order() {
        let (script_list, feature_list) = build_scenario();
        let mut enabled_a = BTreeSet::new();
        enabled_a.insert(tag("liga"));
        enabled_a.insert(tag("mark"));
        let mut enabled_b = BTreeSet::new();
        enabled_b.insert(tag("mark"));
        enabled_b.insert(tag("liga"));
        let a = select_lookups(&script_list, &feature_list, 100, Some(tag("latn")), None, &enabled_a);
        let b = select_lookups(&script_list, &feature_list, 100, Some(tag("latn")), None, &enabled_b);
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn lookup_indices_are_clipped_to_range() {
        let (script_list, mut feature_list) = build_scenario();
        feature_list.features[7].lookup_indices = vec![0, 999];
        let lookups = select_lookups(
            &script_list,
            &feature_list,
            10,
            Some(tag("latn")),
            None,
            &BTreeSet::new(),
        );
        assert_eq!(lookups, vec![0]);
    }

    #[test]
    fn round_trips_script_list_and_feature_list() {
        let (script_list, feature_list) = build_scenario();
        let mut sink = ByteSink::new();
        script_list.encode(&mut sink);
        assert_eq!(sink.len(), script_list.encode_len());
        let bytes = sink.into_vec();
        let decoded = ScriptList::read(&bytes, 0).unwrap();
        assert_eq!(script_list, decoded);

        let mut sink = ByteSink::new();
        feature_list.encode(&mut sink);
        let bytes = sink.into_vec();
        let decoded = FeatureList::read(&bytes, 0).unwrap();
        assert_eq!(feature_list, decoded);
    }
}
