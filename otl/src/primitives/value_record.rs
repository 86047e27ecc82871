//! Value records: sparse positional adjustments.

use font_types::{ByteSink, Cursor};

use crate::error::{Error, Result};
use crate::flags::bitflags_like;

bitflags_like! {
    /// The 8 flags (plus 8 reserved, always-zero bits) that select which
    /// fields of a `ValueRecord` are present on the wire.
    pub struct ValueFormat: u16 {
        const X_PLACEMENT = 0x0001;
        const Y_PLACEMENT = 0x0002;
        const X_ADVANCE = 0x0004;
        const Y_ADVANCE = 0x0008;
        const X_PLACEMENT_DEVICE = 0x0010;
        const Y_PLACEMENT_DEVICE = 0x0020;
        const X_ADVANCE_DEVICE = 0x0040;
        const Y_ADVANCE_DEVICE = 0x0080;
    }
}

/// A sparse record of positional adjustments.
///
/// Device-table offsets are retained only as opaque presence flags: this
/// core parses them (so it can round-trip a font that has them) but never
/// resolves or applies them, per the non-goals in §1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueRecord {
    pub x_placement: i16,
    pub y_placement: i16,
    pub x_advance: i16,
    pub y_advance: i16,
    pub has_x_placement_device: bool,
    pub has_y_placement_device: bool,
    pub has_x_advance_device: bool,
    pub has_y_advance_device: bool,
}

impl ValueRecord {
    pub fn is_null(&self) -> bool {
        *self == ValueRecord::default()
    }

    /// The minimal format needed to carry this record's non-zero fields.
    pub fn format(&self) -> ValueFormat {
        let mut f = ValueFormat::empty();
        if self.x_placement != 0 {
            f |= ValueFormat::X_PLACEMENT;
        }
        if self.y_placement != 0 {
            f |= ValueFormat::Y_PLACEMENT;
        }
        if self.x_advance != 0 {
            f |= ValueFormat::X_ADVANCE;
        }
        if self.y_advance != 0 {
            f |= ValueFormat::Y_ADVANCE;
        }
        if self.has_x_placement_device {
            f |= ValueFormat::X_PLACEMENT_DEVICE;
        }
        if self.has_y_placement_device {
            f |= ValueFormat::Y_PLACEMENT_DEVICE;
        }
        if self.has_x_advance_device {
            f |= ValueFormat::X_ADVANCE_DEVICE;
        }
        if self.has_y_advance_device {
            f |= ValueFormat::Y_ADVANCE_DEVICE;
        }
        f
    }

    pub fn encode_len(format: ValueFormat) -> usize {
        format.bits().count_ones() as usize * 2
    }

    pub fn encode(&self, format: ValueFormat, sink: &mut ByteSink) {
        if format.contains(ValueFormat::X_PLACEMENT) {
            sink.write_i16(self.x_placement);
        }
        if format.contains(ValueFormat::Y_PLACEMENT) {
            sink.write_i16(self.y_placement);
        }
        if format.contains(ValueFormat::X_ADVANCE) {
            sink.write_i16(self.x_advance);
        }
        if format.contains(ValueFormat::Y_ADVANCE) {
            sink.write_i16(self.y_advance);
        }
        if format.contains(ValueFormat::X_PLACEMENT_DEVICE) {
            sink.write_u16(0); // offsets to device tables are not constructed.
        }
        if format.contains(ValueFormat::Y_PLACEMENT_DEVICE) {
            sink.write_u16(0);
        }
        if format.contains(ValueFormat::X_ADVANCE_DEVICE) {
            sink.write_u16(0);
        }
        if format.contains(ValueFormat::Y_ADVANCE_DEVICE) {
            sink.write_u16(0);
        }
    }

    pub fn read(cur: &mut Cursor, format: ValueFormat) -> Result<Self> {
        let mut vr = ValueRecord::default();
        if format.contains(ValueFormat::X_PLACEMENT) {
            vr.x_placement = cur
                .read_i16()
                .ok_or_else(|| Error::invalid("value-record", "truncated x placement"))?;
        }
        if format.contains(ValueFormat::Y_PLACEMENT) {
            vr.y_placement = cur
                .read_i16()
                .ok_or_else(|| Error::invalid("value-record", "truncated y placement"))?;
        }
        if format.contains(ValueFormat::X_ADVANCE) {
            vr.x_advance = cur
                .read_i16()
                .ok_or_else(|| Error::invalid("value-record", "truncated x advance"))?;
        }
        if format.contains(ValueFormat::Y_ADVANCE) {
            vr.y_advance = cur
                .read_i16()
                .ok_or_else(|| Error::invalid("value-record", "truncated y advance"))?;
        }
        if format.contains(ValueFormat::X_PLACEMENT_DEVICE) {
            let off = cur
                .read_u16()
                .ok_or_else(|| Error::invalid("value-record", "truncated device offset"))?;
            vr.has_x_placement_device = off != 0;
        }
        if format.contains(ValueFormat::Y_PLACEMENT_DEVICE) {
            let off = cur
                .read_u16()
                .ok_or_else(|| Error::invalid("value-record", "truncated device offset"))?;
            vr.has_y_placement_device = off != 0;
        }
        if format.contains(ValueFormat::X_ADVANCE_DEVICE) {
            let off = cur
                .read_u16()
                .ok_or_else(|| Error::invalid("value-record", "truncated device offset"))?;
            vr.has_x_advance_device = off != 0;
        }
        if format.contains(ValueFormat::Y_ADVANCE_DEVICE) {
            let off = cur
                .read_u16()
                .ok_or_else(|| Error::invalid("value-record", "truncated device offset"))?;
            vr.has_y_advance_device = off != 0;
        }
        Ok(vr)
    }

    /// Fail fast on constructs this core cannot apply: device tables and
    /// y-advance are parsed but applying them is unsupported (§4.1).
    pub fn check_applicable(&self, subsystem: &'static str) -> Result<()> {
        if self.has_x_placement_device
            || self.has_y_placement_device
            || self.has_x_advance_device
            || self.has_y_advance_device
        {
            return Err(Error::unsupported(subsystem, "device table in value record"));
        }
        if self.y_advance != 0 {
            return Err(Error::unsupported(subsystem, "y-advance in value record"));
        }
        Ok(())
    }

    /// The minimal shared format for a collection of records, per
    /// `write_fonts::tables::gpos::SinglePosFormat2::compute_value_format`:
    /// the union of bits any record needs. If every record is entirely
    /// zero but the slot is known to carry a (present, if empty) record,
    /// the caller should use [`ValueRecord::format_or_min_nonzero`] instead
    /// so the all-zero case is still distinguishable on the wire from "no
    /// value record here at all".
    pub fn shared_format(records: impl IntoIterator<Item = ValueRecord>) -> ValueFormat {
        records
            .into_iter()
            .fold(ValueFormat::empty(), |acc, r| acc | r.format())
    }

    /// As [`ValueRecord::shared_format`], but a record that exists yet is
    /// all-zero still gets `X_ADVANCE` so a null-mask (format 0, meaning
    /// "there is no value record in this slot at all") never collides with
    /// a present-but-empty one.
    pub fn format_or_min_nonzero(records: impl IntoIterator<Item = ValueRecord>) -> ValueFormat {
        let f = Self::shared_format(records);
        if f.is_empty() {
            ValueFormat::X_ADVANCE
        } else {
            f
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_format_from_nonzero_fields() {
        let vr = ValueRecord {
            x_advance: 50,
            ..Default::default()
        };
        assert_eq!(vr.format(), ValueFormat::X_ADVANCE);
        assert_eq!(ValueRecord::default().format(), ValueFormat::empty());
    }

    #[test]
    fn round_trip_through_cursor() {
        let vr = ValueRecord {
            x_placement: -3,
            y_advance: 7,
            ..Default::default()
        };
        let format = vr.format();
        let mut sink = ByteSink::new();
        vr.encode(format, &mut sink);
        assert_eq!(sink.len(), ValueRecord::encode_len(format));
        let bytes = sink.into_vec();
        let mut cur = Cursor::new(&bytes);
        let decoded = ValueRecord::read(&mut cur, format).unwrap();
        assert_eq!(vr, decoded);
    }

    #[test]
    fn present_but_empty_uses_advance_sentinel() {
        let all_zero = [ValueRecord::default(), ValueRecord::default()];
        assert_eq!(
            ValueRecord::format_or_min_nonzero(all_zero),
            ValueFormat::X_ADVANCE
        );
        assert_eq!(ValueRecord::shared_format(all_zero), ValueFormat::empty());
    }

    #[test]
    fn check_applicable_rejects_device_tables() {
        let vr = ValueRecord {
            has_x_placement_device: true,
            ..Default::default()
        };
        assert!(vr.check_applicable("gpos").is_err());
    }

    #[test]
    fn check_applicable_rejects_y_advance() {
        let vr = ValueRecord {
            y_advance: 5,
            ..Default::default()
        };
        assert!(vr.check_applicable("gpos").is_err());
    }

    #[test]
    fn check_applicable_accepts_plain_adjustments() {
        let vr = ValueRecord {
            x_placement: -3,
            x_advance: 50,
            ..Default::default()
        };
        assert!(vr.check_applicable("gpos").is_ok());
    }
}
