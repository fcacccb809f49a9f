//! Decoded module structures: prototypes, constants and line tables.

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::DEFAULT_DEBUG_NAME;

/// Values that can live in a prototype's constant table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Constant {
    /// `nil` literal.
    Nil,
    /// Boolean literal.
    Boolean(bool),
    /// Double precision number.
    Number(f64),
    /// String, resolved from the module string pool.
    String(String),
    /// Resolved import path (`game.Players`).
    Import(Import),
    /// Table template; keys are consumed by the reader and not retained.
    Table,
    /// Closure template pointing at a prototype id.
    Closure(u32),
}

/// Import path rebuilt from up to three string constants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Import {
    /// Segments joined with `.`.
    pub path: String,
    /// Number of segments declared by the import word (top 2 bits).
    pub count: u8,
}

impl Import {
    /// Splits an import word into its segment count and constant indices.
    ///
    /// Indices are packed 10 bits each from the high end; only the first
    /// `count` entries of the returned array are meaningful.
    pub const fn unpack(word: u32) -> (u8, [u32; 3]) {
        let count = (word >> 30) as u8;
        let ids = [(word >> 20) & 0x3FF, (word >> 10) & 0x3FF, word & 0x3FF];
        (count, ids)
    }

    /// Resolves an import word against a constant table.
    ///
    /// Every segment must name a [`Constant::String`] present in `constants`.
    /// On failure the offending constant index is returned.
    pub fn resolve(word: u32, constants: &[Constant]) -> Result<Self, u32> {
        let (count, ids) = Self::unpack(word);
        let mut segments = Vec::with_capacity(usize::from(count));
        for &id in ids.iter().take(usize::from(count)) {
            match constants.get(id as usize) {
                Some(Constant::String(s)) => segments.push(s.as_str()),
                _ => return Err(id),
            }
        }
        Ok(Self { path: segments.join("."), count })
    }

    /// Like [`Import::resolve`] but substitutes `?` for unresolvable segments.
    pub fn resolve_lossy(word: u32, constants: &[Constant]) -> Self {
        let (count, ids) = Self::unpack(word);
        let segments: Vec<&str> = ids
            .iter()
            .take(usize::from(count))
            .map(|&id| match constants.get(id as usize) {
                Some(Constant::String(s)) => s.as_str(),
                _ => "?",
            })
            .collect();
        Self { path: segments.join("."), count }
    }
}

/// Compressed pc → source line mapping.
///
/// `line(pc) = interval_base[pc >> gap_log2] + offsets[pc]`: coarse absolute
/// checkpoints per interval plus a per-instruction 8-bit offset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct LineTable {
    gap_log2: u8,
    offsets: Vec<u8>,
    interval_base: Vec<i64>,
}

impl LineTable {
    /// Builds a table from already accumulated offsets and absolute interval lines.
    pub fn new(gap_log2: u8, offsets: Vec<u8>, interval_base: Vec<i64>) -> Self {
        Self { gap_log2, offsets, interval_base }
    }

    /// Number of intervals covering `instructions` words at the given granularity.
    pub fn interval_count(instructions: usize, gap_log2: u8) -> usize {
        if instructions == 0 {
            return 0;
        }
        (instructions - 1).checked_shr(u32::from(gap_log2)).unwrap_or(0) + 1
    }

    /// Log2 of the interval size.
    pub fn gap_log2(&self) -> u8 { self.gap_log2 }
    /// Per-instruction offsets (cumulative, modulo 256).
    pub fn offsets(&self) -> &[u8] { &self.offsets }
    /// Absolute line of each interval.
    pub fn interval_base(&self) -> &[i64] { &self.interval_base }

    /// Resolves the source line of a program counter; 0 when `pc` is not covered.
    pub fn line(&self, pc: usize) -> i64 {
        let Some(&offset) = self.offsets.get(pc) else {
            return 0;
        };
        let interval = pc.checked_shr(u32::from(self.gap_log2)).unwrap_or(0);
        self.interval_base
            .get(interval)
            .map_or(0, |base| base + i64::from(offset))
    }
}

/// One compiled function.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Proto {
    /// Register window size.
    pub max_stack_size: u8,
    /// Fixed parameter count.
    pub num_params: u8,
    /// Upvalue count.
    pub num_upvalues: u8,
    /// Vararg flag byte, kept raw.
    pub is_vararg: u8,
    /// Raw instruction words, auxiliary words inline.
    pub code: Vec<u32>,
    /// Constant table.
    pub constants: Vec<Constant>,
    /// Child prototypes, as indices into [`Module::protos`].
    pub children: Vec<u32>,
    /// Debug name (`UNNAMED` when the module carries none).
    pub debug_name: String,
    /// Line where the function is defined.
    pub line_defined: u32,
    /// Optional line information.
    pub lines: Option<LineTable>,
    /// Number of local-variable debug records skipped by the reader.
    pub debug_locals: u32,
    /// Number of upvalue-name debug records skipped by the reader.
    pub debug_upvalues: u32,
}

impl Default for Proto {
    fn default() -> Self {
        Self {
            max_stack_size: 0,
            num_params: 0,
            num_upvalues: 0,
            is_vararg: 0,
            code: Vec::new(),
            constants: Vec::new(),
            children: Vec::new(),
            debug_name: DEFAULT_DEBUG_NAME.to_owned(),
            line_defined: 0,
            lines: None,
            debug_locals: 0,
            debug_upvalues: 0,
        }
    }
}

impl Proto {
    /// Source line for a program counter (0 without line information).
    pub fn line_for_pc(&self, pc: usize) -> i64 {
        self.lines.as_ref().map_or(0, |lines| lines.line(pc))
    }

    /// Constant lookup tolerant of negative or out-of-range indices.
    pub fn constant(&self, index: i64) -> Option<&Constant> {
        usize::try_from(index).ok().and_then(|i| self.constants.get(i))
    }
}

/// Decoded bytecode module: prototypes in file order plus the entry index.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Module {
    /// Format version read from the first byte.
    pub version: u8,
    /// All prototypes; children refer to them by index.
    pub protos: Vec<Proto>,
    /// Index of the entry prototype.
    pub main: u32,
}

impl Module {
    /// Number of prototypes.
    pub fn len(&self) -> usize { self.protos.len() }
    /// True when the module holds no prototype.
    pub fn is_empty(&self) -> bool { self.protos.is_empty() }
    /// Entry prototype, if the index is valid.
    pub fn main_proto(&self) -> Option<&Proto> { self.protos.get(self.main as usize) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(values: &[&str]) -> Vec<Constant> {
        values.iter().map(|s| Constant::String((*s).to_owned())).collect()
    }

    #[test]
    fn import_two_segments() {
        let k = strings(&["game", "Players"]);
        // count=2, id0=0, id1=1, id2 left at a junk value
        let word = (2 << 30) | (0 << 20) | (1 << 10) | 0x3FF;
        let import = Import::resolve(word, &k).unwrap();
        assert_eq!(import, Import { path: "game.Players".into(), count: 2 });
    }

    #[test]
    fn import_single_segment() {
        let k = strings(&["print"]);
        let import = Import::resolve(1 << 30, &k).unwrap();
        assert_eq!(import.path, "print");
        assert_eq!(import.count, 1);
    }

    #[test]
    fn import_three_segments() {
        let k = strings(&["a", "b", "c"]);
        let word = (3 << 30) | (2 << 20) | (1 << 10) | 0;
        assert_eq!(Import::resolve(word, &k).unwrap().path, "c.b.a");
    }

    #[test]
    fn import_rejects_non_string_segment() {
        let k = vec![Constant::Nil, Constant::String("x".into())];
        let word = (2 << 30) | (1 << 20) | (0 << 10);
        assert_eq!(Import::resolve(word, &k), Err(0));
        assert_eq!(Import::resolve_lossy(word, &k).path, "x.?");
    }

    #[test]
    fn line_table_granularity_zero() {
        let t = LineTable::new(0, vec![0, 1, 2, 3], vec![10, 10, 10, 10]);
        let lines: Vec<i64> = (0..4).map(|pc| t.line(pc)).collect();
        assert_eq!(lines, vec![10, 11, 12, 13]);
        assert_eq!(t.line(4), 0);
    }

    #[test]
    fn line_table_buckets_by_interval() {
        // gap 2 → intervals of 4 instructions
        let t = LineTable::new(2, vec![0, 0, 1, 1, 0, 2], vec![5, 40]);
        assert_eq!(t.line(3), 6);
        assert_eq!(t.line(4), 40);
        assert_eq!(t.line(5), 42);
    }

    #[test]
    fn interval_count_matches_granularity() {
        assert_eq!(LineTable::interval_count(0, 0), 0);
        assert_eq!(LineTable::interval_count(1, 0), 1);
        assert_eq!(LineTable::interval_count(4, 0), 4);
        assert_eq!(LineTable::interval_count(4, 2), 1);
        assert_eq!(LineTable::interval_count(5, 2), 2);
        assert_eq!(LineTable::interval_count(5, 40), 1);
    }

    #[test]
    fn proto_defaults() {
        let p = Proto::default();
        assert_eq!(p.debug_name, "UNNAMED");
        assert_eq!(p.line_for_pc(0), 0);
        assert_eq!(p.constant(-1), None);
    }

    #[test]
    fn import_with_zero_segments_is_empty() {
        assert_eq!(Import::resolve(0, &[]), Ok(Import { path: String::new(), count: 0 }));
        assert_eq!(Import::resolve_lossy(0x3FF, &[]).path, "");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn model_is_serializable() {
        fn assert_serialize<T: serde::Serialize>() {}
        assert_serialize::<Module>();
        assert_serialize::<Constant>();
        assert_serialize::<LineTable>();
    }
}
