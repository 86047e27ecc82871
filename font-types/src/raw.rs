//! Minimal big-endian byte cursor.
//!
//! The full font-engineering workspace this grew out of reads tables through
//! a zero-copy trait graph (`FontData`/`FontRead`/`Scalar`) that is driven by
//! codegen. This engine's tables are owned and mutable after decode (they
//! need to be: shaping mutates the lookup-selected subtable's view of the
//! glyph stream), so a plain cursor over a borrowed `&[u8]` is all the
//! decode side needs.

/// A cursor over a byte slice that reads big-endian scalars.
///
/// Every read method bounds-checks and returns `None` on underrun rather
/// than panicking; callers map that to `Error::InvalidFont` at the point
/// where they know which table/field was being read.
#[derive(Clone, Copy, Debug)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Cursor { data, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn skip(&mut self, n: usize) -> Option<()> {
        let new_pos = self.pos.checked_add(n)?;
        if new_pos > self.data.len() {
            return None;
        }
        self.pos = new_pos;
        Some(())
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn read_i16(&mut self) -> Option<i16> {
        self.take(2).map(|b| i16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        self.take(4)
            .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.take(4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_tag(&mut self) -> Option<crate::Tag> {
        self.take(4)
            .map(|b| crate::Tag::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_glyph_id(&mut self) -> Option<crate::GlyphId> {
        self.read_u16().map(crate::GlyphId::new)
    }
}

/// An append-only big-endian byte buffer.
///
/// Mirrors the subset of `write_fonts::TableWriter` this engine needs: plain
/// scalar writes plus the ability to record the current length as an offset
/// target. Full offset-graph packing (arbitrary object graphs, cycle
/// detection) lives in `otl::lookup_list`, which is the only place that
/// needs it.
#[derive(Debug, Default, Clone)]
pub struct ByteSink {
    buf: Vec<u8>,
}

impl ByteSink {
    pub fn new() -> Self {
        ByteSink { buf: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_tag(&mut self, v: crate::Tag) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_glyph_id(&mut self, v: crate::GlyphId) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Overwrite a previously-written `u16` at `pos` (used to patch offset
    /// fields once the pointed-to body's final position is known).
    pub fn patch_u16(&mut self, pos: usize, v: u16) {
        self.buf[pos..pos + 2].copy_from_slice(&v.to_be_bytes());
    }

    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&v.to_be_bytes());
    }
}
