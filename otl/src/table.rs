//! The top-level `GSUB`/`GPOS` table header: version, and the three offsets
//! (four from version 1.1) that hand the engine its `ScriptList`,
//! `FeatureList`, `LookupList`, and optional `FeatureVariations` table.
//!
//! Table framing above this point (the `sfnt` directory, `cmap`, outline
//! data) is out of scope; this is the minimal header needed to get from "a
//! `GSUB`/`GPOS` byte slice" to the three/four sub-offsets the rest of the
//! engine consumes, grounded on `read_fonts::tables::gsub::Gsub` and
//! `tables::gpos::Gpos`'s top-level record shape.

use font_types::{ByteSink, Cursor};

use crate::error::{Error, Result};
use crate::lookup::SubtableCodec;
use crate::lookup_list::LookupList;
use crate::script::{FeatureList, ScriptList};

/// A `GSUB` or `GPOS` table, generic over its subtable enum so the two
/// tables share one implementation, the same way [`crate::lookup::Lookup`]
/// and [`LookupList`] do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Table<T> {
    pub major_version: u16,
    pub minor_version: u16,
    pub script_list: ScriptList,
    pub feature_list: FeatureList,
    pub lookup_list: LookupList<T>,
    /// Raw `FeatureVariations` bytes, present only when `minor_version >=
    /// 1`. Parsed only far enough to preserve round-trip; variation-index
    /// application is out of scope.
    pub feature_variations: Option<Vec<u8>>,
}

impl<T: SubtableCodec> Table<T> {
    fn header_len(&self) -> usize {
        if self.minor_version >= 1 {
            14
        } else {
            10
        }
    }

    pub fn encode_len(&self) -> Result<usize> {
        let header = self.header_len();
        let fv_len = self.feature_variations.as_ref().map_or(0, |v| v.len());
        Ok(header
            + self.script_list.encode_len()
            + self.feature_list.encode_len()
            + self.lookup_list.encode_len()?
            + fv_len)
    }

    pub fn encode(&self, sink: &mut ByteSink) -> Result<()> {
        let header_len = self.header_len();
        let script_list_off = header_len;
        let feature_list_off = script_list_off + self.script_list.encode_len();
        let lookup_list_off = feature_list_off + self.feature_list.encode_len();
        let lookup_list_len = self.lookup_list.encode_len()?;
        let fv_off = lookup_list_off + lookup_list_len;

        for (name, off) in [
            ("script list", script_list_off),
            ("feature list", feature_list_off),
            ("lookup list", lookup_list_off),
        ] {
            if off > u16::MAX as usize {
                return Err(Error::unsupported(
                    "table",
                    format!("{name} offset exceeds 16-bit range"),
                ));
            }
        }

        sink.write_u16(self.major_version);
        sink.write_u16(self.minor_version);
        sink.write_u16(script_list_off as u16);
        sink.write_u16(feature_list_off as u16);
        sink.write_u16(lookup_list_off as u16);
        if self.minor_version >= 1 {
            let fv = self.feature_variations.as_ref().map_or(0, |_| fv_off as u32);
            sink.write_u32(fv);
        }

        self.script_list.encode(sink);
        self.feature_list.encode(sink);
        self.lookup_list.encode(sink)?;
        if let Some(bytes) = &self.feature_variations {
            sink.write_bytes(bytes);
        }
        Ok(())
    }

    pub fn read(data: &[u8], pos: usize) -> Result<Self> {
        let base = data
            .get(pos..)
            .ok_or_else(|| Error::invalid("table", "offset out of bounds"))?;
        let mut cur = Cursor::new(base);
        let major_version = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("table", "truncated major version"))?;
        let minor_version = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("table", "truncated minor version"))?;
        let script_list_off = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("table", "truncated script list offset"))?;
        let feature_list_off = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("table", "truncated feature list offset"))?;
        let lookup_list_off = cur
            .read_u16()
            .ok_or_else(|| Error::invalid("table", "truncated lookup list offset"))?;
        let feature_variations_off = if minor_version >= 1 {
            cur.read_u32()
                .ok_or_else(|| Error::invalid("table", "truncated feature variations offset"))?
        } else {
            0
        };

        let script_list = ScriptList::read(base, script_list_off as usize)?;
        let feature_list = FeatureList::read(base, feature_list_off as usize)?;
        let lookup_list = LookupList::read(base, lookup_list_off as usize)?;
        let feature_variations = (feature_variations_off != 0)
            .then(|| base.get(feature_variations_off as usize..).unwrap_or(&[]).to_vec());

        Ok(Table {
            major_version,
            minor_version,
            script_list,
            feature_list,
            lookup_list,
            feature_variations,
        })
    }
}

/// A `GSUB` table: version header plus `ScriptList`/`FeatureList`/
/// `LookupList` of [`crate::subtables::gsub::GsubSubtable`].
pub type Gsub = Table<crate::subtables::gsub::GsubSubtable>;

/// A `GPOS` table: version header plus `ScriptList`/`FeatureList`/
/// `LookupList` of [`crate::subtables::gpos::GposSubtable`].
pub type Gpos = Table<crate::subtables::gpos::GposSubtable>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{Lookup, LookupFlag};
    use crate::primitives::{CoverageTable, ValueRecord};
    use crate::subtables::gpos::GposSubtable;
    use font_types::GlyphId;

    fn sample_gpos() -> Gpos {
        let lookup = Lookup::new(
            1,
            LookupFlag::empty(),
            vec![GposSubtable::SingleUniform {
                coverage: CoverageTable::from_glyphs(vec![GlyphId::new(3)]),
                value: ValueRecord {
                    x_advance: 50,
                    ..Default::default()
                },
            }],
        );
        Table {
            major_version: 1,
            minor_version: 0,
            script_list: ScriptList::default(),
            feature_list: FeatureList::default(),
            lookup_list: LookupList { lookups: vec![lookup] },
            feature_variations: None,
        }
    }

    #[test]
    fn round_trips_minimal_table() {
        let table = sample_gpos();
        let mut sink = ByteSink::new();
        table.encode(&mut sink).unwrap();
        let bytes = sink.into_vec();
        let decoded = Gpos::read(&bytes, 0).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn preserves_feature_variations_tail_bytes() {
        let mut table = sample_gpos();
        table.minor_version = 1;
        table.feature_variations = Some(vec![0, 0, 0, 1, 0xAB, 0xCD]);
        let mut sink = ByteSink::new();
        table.encode(&mut sink).unwrap();
        let bytes = sink.into_vec();
        let decoded = Gpos::read(&bytes, 0).unwrap();
        assert_eq!(decoded.feature_variations, table.feature_variations);
    }
}
