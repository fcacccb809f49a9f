//! Binary module reader.
//!
//! Layout: version byte, string pool, prototype pool, entry index. Every
//! read goes through [`ByteReader`], so malformed input surfaces as a
//! [`DecodeError`] instead of reading past the buffer.

use log::{debug, trace};

use super::proto::{Constant, Import, LineTable, Module, Proto};
use crate::{ByteReader, DecodeError, DecodeResult, BYTECODE_VERSION};

const CONST_TAG_NIL: u8 = 0;
const CONST_TAG_BOOLEAN: u8 = 1;
const CONST_TAG_NUMBER: u8 = 2;
const CONST_TAG_STRING: u8 = 3;
const CONST_TAG_IMPORT: u8 = 4;
const CONST_TAG_TABLE: u8 = 5;
const CONST_TAG_CLOSURE: u8 = 6;

/// Module-wide string table, addressed with 1-based indices (0 = absent).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringPool {
    strings: Vec<String>,
}

impl StringPool {
    /// Wraps already decoded strings.
    pub fn new(strings: Vec<String>) -> Self {
        Self { strings }
    }

    /// Reads a LEB128 count followed by length-prefixed strings.
    ///
    /// Invalid UTF-8 is replaced with U+FFFD.
    pub fn read(r: &mut ByteReader<'_>) -> DecodeResult<Self> {
        let count = r.read_count()?;
        let mut strings = Vec::with_capacity(r.capacity_hint(count, 1));
        for _ in 0..count {
            let len = r.read_count()?;
            let bytes = r.read_bytes(len)?;
            strings.push(String::from_utf8_lossy(bytes).into_owned());
        }
        Ok(Self { strings })
    }

    /// Number of strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// True when the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// 1-based lookup; `None` for 0 or out of range.
    pub fn lookup(&self, index: u32) -> Option<&str> {
        let slot = (index as usize).checked_sub(1)?;
        self.strings.get(slot).map(String::as_str)
    }

    /// 1-based lookup where a string is mandatory.
    pub fn resolve(&self, index: u32) -> DecodeResult<&str> {
        self.lookup(index).ok_or(DecodeError::StringIndexOutOfRange {
            index,
            len: self.strings.len(),
        })
    }
}

/// Reads one prototype's constant table.
pub fn read_constants(r: &mut ByteReader<'_>, pool: &StringPool) -> DecodeResult<Vec<Constant>> {
    let count = r.read_count()?;
    let mut constants = Vec::with_capacity(r.capacity_hint(count, 1));

    for index in 0..count {
        let tag = r.read_u8()?;
        let value = match tag {
            CONST_TAG_NIL => Constant::Nil,
            CONST_TAG_BOOLEAN => Constant::Boolean(r.read_u8()? != 0),
            CONST_TAG_NUMBER => Constant::Number(r.read_f64_le()?),
            CONST_TAG_STRING => {
                let id = r.read_varint()?;
                Constant::String(pool.resolve(id)?.to_owned())
            }
            CONST_TAG_IMPORT => {
                let word = r.read_u32_le()?;
                // `constants` only holds earlier entries: forward references fail here.
                let import = Import::resolve(word, &constants)
                    .map_err(|segment| DecodeError::InvalidImport { index, segment })?;
                Constant::Import(import)
            }
            CONST_TAG_TABLE => {
                let keys = r.read_count()?;
                for _ in 0..keys {
                    r.read_varint()?;
                }
                Constant::Table
            }
            CONST_TAG_CLOSURE => Constant::Closure(r.read_varint()?),
            _ => return Err(DecodeError::UnknownConstantTag { tag, index }),
        };
        constants.push(value);
    }

    Ok(constants)
}

/// Reads a line table for a prototype of `instructions` words.
pub fn read_line_table(r: &mut ByteReader<'_>, instructions: usize) -> DecodeResult<LineTable> {
    let gap_log2 = r.read_u8()?;
    let intervals = LineTable::interval_count(instructions, gap_log2);

    let mut offsets = Vec::with_capacity(r.capacity_hint(instructions, 1));
    let mut last_offset: u8 = 0;
    for _ in 0..instructions {
        last_offset = last_offset.wrapping_add(r.read_u8()?);
        offsets.push(last_offset);
    }

    let mut interval_base = Vec::with_capacity(r.capacity_hint(intervals, 4));
    let mut last_line: i32 = 0;
    for _ in 0..intervals {
        last_line = last_line.wrapping_add_unsigned(r.read_u32_le()?);
        interval_base.push(i64::from(last_line));
    }

    Ok(LineTable::new(gap_log2, offsets, interval_base))
}

/// Reads one prototype record.
pub fn read_proto(r: &mut ByteReader<'_>, pool: &StringPool) -> DecodeResult<Proto> {
    let mut proto = Proto {
        max_stack_size: r.read_u8()?,
        num_params: r.read_u8()?,
        num_upvalues: r.read_u8()?,
        is_vararg: r.read_u8()?,
        ..Proto::default()
    };

    let size_code = r.read_count()?;
    proto.code.reserve(r.capacity_hint(size_code, 4));
    for _ in 0..size_code {
        proto.code.push(r.read_u32_le()?);
    }

    proto.constants = read_constants(r, pool)?;

    let size_children = r.read_count()?;
    proto.children.reserve(r.capacity_hint(size_children, 1));
    for _ in 0..size_children {
        proto.children.push(r.read_varint()?);
    }

    proto.line_defined = r.read_varint()?;

    let debug_name = r.read_varint()?;
    if debug_name != 0 {
        proto.debug_name = pool.resolve(debug_name)?.to_owned();
    }

    if r.read_u8()? != 0 {
        proto.lines = Some(read_line_table(r, proto.code.len())?);
    }

    if r.read_u8()? != 0 {
        proto.debug_locals = r.read_varint()?;
        for _ in 0..proto.debug_locals {
            // name, start pc, end pc, register
            r.read_varint()?;
            r.read_varint()?;
            r.read_varint()?;
            r.read_u8()?;
        }
        proto.debug_upvalues = r.read_varint()?;
        for _ in 0..proto.debug_upvalues {
            r.read_varint()?;
        }
    }

    Ok(proto)
}

impl Module {
    /// Decodes a complete module.
    ///
    /// The version byte is checked before anything else. Bytes after the
    /// entry index are ignored.
    pub fn from_bytes(bytes: &[u8]) -> DecodeResult<Self> {
        let mut r = ByteReader::new(bytes);

        let version = r.read_u8()?;
        if version != BYTECODE_VERSION {
            return Err(DecodeError::UnsupportedVersion { found: version });
        }

        let pool = StringPool::read(&mut r)?;
        trace!("string pool: {} entries", pool.len());

        let count = r.read_count()?;
        let mut protos = Vec::with_capacity(r.capacity_hint(count, 11));
        for id in 0..count {
            let proto = read_proto(&mut r, &pool)?;
            trace!(
                "proto #{id} `{}`: {} words, {} constants, {} children",
                proto.debug_name,
                proto.code.len(),
                proto.constants.len(),
                proto.children.len()
            );
            protos.push(proto);
        }

        let main = r.read_varint()?;
        if r.remaining() > 0 {
            debug!("ignoring {} trailing bytes after entry index", r.remaining());
        }
        debug!("decoded module: {} protos, main = {main}", protos.len());

        Ok(Self { version, protos, main })
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ByteWriter;
    use pretty_assertions::assert_eq;

    fn module_head(strings: &[&str], protos: u32) -> ByteWriter {
        let mut w = ByteWriter::new();
        w.write_u8(BYTECODE_VERSION);
        w.write_varint(strings.len() as u32);
        for s in strings {
            w.write_str(s);
        }
        w.write_varint(protos);
        w
    }

    fn proto_head(w: &mut ByteWriter, code: &[u32]) {
        w.write_bytes(&[4, 1, 0, 0]);
        w.write_varint(code.len() as u32);
        for &word in code {
            w.write_u32_le(word);
        }
    }

    /// children, linedefined, debug name, no line info, no debug info
    fn proto_tail(w: &mut ByteWriter) {
        w.write_varint(0);
        w.write_varint(0);
        w.write_varint(0);
        w.write_u8(0);
        w.write_u8(0);
    }

    #[test]
    fn rejects_other_versions_first() {
        assert_eq!(Module::from_bytes(&[0x01]), Err(DecodeError::UnsupportedVersion { found: 1 }));
        assert_eq!(Module::from_bytes(&[0x03, 0xFF]), Err(DecodeError::UnsupportedVersion { found: 3 }));
    }

    #[test]
    fn empty_buffer_is_truncated() {
        assert_eq!(Module::from_bytes(&[]), Err(DecodeError::TruncatedInput { needed: 1, at: 0 }));
    }

    #[test]
    fn truncated_mid_string_length() {
        // one string whose length varint never terminates
        let err = Module::from_bytes(&[2, 0x01, 0x80]).unwrap_err();
        assert_eq!(err, DecodeError::TruncatedInput { needed: 1, at: 3 });
    }

    #[test]
    fn truncated_string_body() {
        let err = Module::from_bytes(&[2, 0x01, 0x05, b'a', b'b']).unwrap_err();
        assert_eq!(err, DecodeError::TruncatedInput { needed: 5, at: 3 });
    }

    #[test]
    fn minimal_module() -> DecodeResult<()> {
        let mut w = module_head(&[], 1);
        proto_head(&mut w, &[0]);
        w.write_varint(0); // constants
        proto_tail(&mut w);
        w.write_varint(0); // main

        let m = Module::from_bytes(w.as_slice())?;
        assert_eq!(m.version, 2);
        assert_eq!(m.main, 0);
        assert_eq!(m.protos.len(), 1);
        let p = &m.protos[0];
        assert_eq!((p.max_stack_size, p.num_params, p.num_upvalues, p.is_vararg), (4, 1, 0, 0));
        assert_eq!(p.code, vec![0]);
        assert_eq!(p.debug_name, "UNNAMED");
        assert!(p.lines.is_none());
        Ok(())
    }

    #[test]
    fn constants_of_every_tag() -> DecodeResult<()> {
        let mut w = module_head(&["game", "Players"], 1);
        proto_head(&mut w, &[]);
        w.write_varint(9);
        w.write_u8(CONST_TAG_NIL);
        w.write_u8(CONST_TAG_BOOLEAN);
        w.write_u8(7);
        w.write_u8(CONST_TAG_NUMBER);
        w.write_f64_le(1.5);
        w.write_u8(CONST_TAG_STRING);
        w.write_varint(1);
        w.write_u8(CONST_TAG_STRING);
        w.write_varint(2);
        w.write_u8(CONST_TAG_IMPORT);
        w.write_u32_le((2 << 30) | (3 << 20) | (4 << 10));
        w.write_u8(CONST_TAG_TABLE);
        w.write_varint(2);
        w.write_varint(3);
        w.write_varint(4);
        w.write_u8(CONST_TAG_CLOSURE);
        w.write_varint(1);
        w.write_u8(CONST_TAG_BOOLEAN);
        w.write_u8(0);
        proto_tail(&mut w);
        w.write_varint(0);

        let m = Module::from_bytes(w.as_slice())?;
        assert_eq!(
            m.protos[0].constants,
            vec![
                Constant::Nil,
                Constant::Boolean(true),
                Constant::Number(1.5),
                Constant::String("game".into()),
                Constant::String("Players".into()),
                Constant::Import(Import { path: "game.Players".into(), count: 2 }),
                Constant::Table,
                Constant::Closure(1),
                Constant::Boolean(false),
            ]
        );
        Ok(())
    }

    #[test]
    fn unknown_constant_tag() {
        let mut w = module_head(&[], 1);
        proto_head(&mut w, &[]);
        w.write_varint(2);
        w.write_u8(CONST_TAG_NIL);
        w.write_u8(7);
        assert_eq!(
            Module::from_bytes(w.as_slice()),
            Err(DecodeError::UnknownConstantTag { tag: 7, index: 1 })
        );
    }

    #[test]
    fn import_cannot_reference_later_constant() {
        let mut w = module_head(&["x"], 1);
        proto_head(&mut w, &[]);
        w.write_varint(2);
        w.write_u8(CONST_TAG_IMPORT);
        w.write_u32_le((1 << 30) | (1 << 20));
        w.write_u8(CONST_TAG_STRING);
        w.write_varint(1);
        assert_eq!(
            Module::from_bytes(w.as_slice()),
            Err(DecodeError::InvalidImport { index: 0, segment: 1 })
        );
    }

    #[test]
    fn string_constant_out_of_range() {
        let mut w = module_head(&["only"], 1);
        proto_head(&mut w, &[]);
        w.write_varint(1);
        w.write_u8(CONST_TAG_STRING);
        w.write_varint(5);
        assert_eq!(
            Module::from_bytes(w.as_slice()),
            Err(DecodeError::StringIndexOutOfRange { index: 5, len: 1 })
        );
    }

    #[test]
    fn string_constant_zero_is_rejected() {
        let mut w = module_head(&["only"], 1);
        proto_head(&mut w, &[]);
        w.write_varint(1);
        w.write_u8(CONST_TAG_STRING);
        w.write_varint(0);
        assert!(matches!(
            Module::from_bytes(w.as_slice()),
            Err(DecodeError::StringIndexOutOfRange { index: 0, .. })
        ));
    }

    #[test]
    fn line_table_and_debug_records() -> DecodeResult<()> {
        let mut w = module_head(&["main"], 1);
        proto_head(&mut w, &[0, 0, 0, 0]);
        w.write_varint(0); // constants
        w.write_varint(0); // children
        w.write_varint(10); // linedefined
        w.write_varint(1); // debug name
        w.write_u8(1);
        w.write_u8(0); // gap_log2
        w.write_bytes(&[0, 1, 1, 1]);
        for delta in [10, 0, 0, 0] {
            w.write_u32_le(delta);
        }
        w.write_u8(1);
        w.write_varint(1); // one local
        w.write_varint(1);
        w.write_varint(0);
        w.write_varint(4);
        w.write_u8(0);
        w.write_varint(2); // two upvalue names
        w.write_varint(1);
        w.write_varint(1);
        w.write_varint(0); // main
        w.write_bytes(&[0xAA, 0xBB]); // trailing junk

        let m = Module::from_bytes(w.as_slice())?;
        let p = &m.protos[0];
        assert_eq!(p.debug_name, "main");
        assert_eq!(p.line_defined, 10);
        assert_eq!((p.debug_locals, p.debug_upvalues), (1, 2));
        let lines: Vec<i64> = (0..4).map(|pc| p.line_for_pc(pc)).collect();
        assert_eq!(lines, vec![10, 11, 12, 13]);
        Ok(())
    }

    #[test]
    fn line_offsets_wrap_at_eight_bits() -> DecodeResult<()> {
        let mut w = ByteWriter::new();
        w.write_u8(0);
        w.write_bytes(&[200, 100]);
        w.write_u32_le(1);
        w.write_u32_le(u32::MAX); // -1 once wrapped to 32 bits
        let mut r = ByteReader::new(w.as_slice());
        let t = read_line_table(&mut r, 2)?;
        assert_eq!(t.offsets(), &[200, 44]);
        assert_eq!(t.interval_base(), &[1, 0]);
        Ok(())
    }

    #[test]
    fn huge_counts_fail_without_allocating() {
        // claims 2^32-1 strings in a 7-byte buffer
        let bytes = [2, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F, 0x00];
        assert!(matches!(Module::from_bytes(&bytes), Err(DecodeError::TruncatedInput { .. })));
    }

    #[test]
    fn string_pool_lookup_is_one_based() {
        let pool = StringPool::new(vec!["a".into(), "b".into()]);
        assert_eq!(pool.lookup(0), None);
        assert_eq!(pool.lookup(1), Some("a"));
        assert_eq!(pool.lookup(2), Some("b"));
        assert_eq!(pool.lookup(3), None);
        assert_eq!(pool.resolve(3), Err(DecodeError::StringIndexOutOfRange { index: 3, len: 2 }));
    }

    #[test]
    fn invalid_utf8_is_replaced() -> DecodeResult<()> {
        let mut r = ByteReader::new(&[1, 2, 0xFF, b'a']);
        let pool = StringPool::read(&mut r)?;
        assert_eq!(pool.lookup(1), Some("\u{FFFD}a"));
        Ok(())
    }
}
