//! Opcode table.
//!
//! One row per opcode: mnemonic, operand shape, printed operands and the
//! comment that follows them. The disassembler never matches on individual
//! opcodes; everything it needs comes from [`OpInfo`].

#[cfg(feature = "serde")]
use serde::Serialize;

/// Opcode byte values (low 8 bits of an instruction word).
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[repr(u8)]
pub enum Op {
    Nop = 0x00,
    Break = 0xE3,
    LoadNil = 0xC6,
    LoadB = 0xA9,
    LoadN = 0x8C,
    LoadK = 0x6F,
    Move = 0x52,
    GetGlobal = 0x35,
    SetGlobal = 0x18,
    GetUpval = 0xFB,
    SetUpval = 0xDE,
    CloseUpvals = 0xC1,
    GetImport = 0xA4,
    GetTable = 0x87,
    SetTable = 0x6A,
    GetTableKs = 0x4D,
    SetTableKs = 0x30,
    GetTableN = 0x13,
    SetTableN = 0xF6,
    NewClosure = 0xD9,
    NameCall = 0xBC,
    Call = 0x9F,
    Return = 0x82,
    Jump = 0x65,
    JumpBack = 0x48,
    JumpIf = 0x2B,
    JumpIfNot = 0x0E,
    JumpIfEq = 0xF1,
    JumpIfLe = 0xD4,
    JumpIfLt = 0xB7,
    JumpIfNotEq = 0x9A,
    JumpIfNotLe = 0x7D,
    JumpIfNotLt = 0x60,
    Add = 0x43,
    Sub = 0x26,
    Mul = 0x09,
    Div = 0xEC,
    Mod = 0xCF,
    Pow = 0xB2,
    AddK = 0x95,
    SubK = 0x78,
    MulK = 0x5B,
    DivK = 0x3E,
    ModK = 0x21,
    PowK = 0x04,
    And = 0xE7,
    Or = 0xCA,
    AndK = 0xAD,
    OrK = 0x90,
    Concat = 0x73,
    Not = 0x56,
    Minus = 0x39,
    Length = 0x1C,
    NewTable = 0xFF,
    DupTable = 0xE2,
    SetList = 0xC5,
    ForNPrep = 0xA8,
    ForNLoop = 0x8B,
    ForGLoop = 0x6E,
    ForGPrepINext = 0x51,
    ForGLoopINext = 0x34,
    ForGPrepNext = 0x17,
    ForGLoopNext = 0xFA,
    GetVarargs = 0xDD,
    DupClosure = 0xC0,
    PrepVarargs = 0xA3,
    LoadKx = 0x86,
    JumpX = 0x69,
    FastCall = 0x4C,
    Coverage = 0x2F,
    Capture = 0x12,
    JumpIfEqK = 0xF5,
    JumpIfNotEqK = 0xD8,
    FastCall1 = 0xBB,
    FastCall2 = 0x9E,
    FastCall2K = 0x81,
}

impl Op {
    /// Maps an opcode byte to its table row.
    pub fn from_byte(byte: u8) -> Option<Self> {
        OpInfo::lookup(byte).map(|info| info.op)
    }

    /// Table row for this opcode.
    pub fn info(self) -> &'static OpInfo {
        match OpInfo::lookup(self as u8) {
            Some(info) => info,
            None => unreachable!("every Op has a table row"),
        }
    }
}

/// Physical encoding of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Shape {
    /// No operands.
    None,
    /// `A`.
    A,
    /// `A B`.
    AB,
    /// `A B C`.
    ABC,
    /// `A D` (signed 16-bit).
    AD,
    /// `E` (signed 24-bit).
    AE,
    /// `A D` followed by an aux word.
    ADAux,
    /// `A B C` followed by an aux word.
    ABCAux,
    /// `A` followed by an aux word.
    AAux,
}

impl Shape {
    /// True when the instruction owns the following word.
    pub const fn has_aux(self) -> bool {
        matches!(self, Self::ADAux | Self::ABCAux | Self::AAux)
    }

    /// Width in words.
    pub const fn width(self) -> usize {
        if self.has_aux() { 2 } else { 1 }
    }
}

/// Operand printed after the mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Field {
    /// Bits 8..16.
    A,
    /// Bits 16..24.
    B,
    /// Bits 24..32.
    C,
    /// Signed upper 16 bits.
    D,
    /// Signed upper 24 bits.
    E,
    /// Auxiliary word.
    Aux,
    /// `C`, printed only when non-zero.
    OptC,
    /// Whole instruction word as `(0x%08X)`.
    Raw,
}

/// Annotation appended after `;`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Comment {
    /// No annotation.
    None,
    /// `true`/`false` from B, plus `jump to pc+C+1` when C > 0.
    Bool,
    /// `K(x) = k` for the constant indexed by the field.
    Const(Field),
    /// `count = N, 'path'` from the aux word.
    Import,
    /// `global id = children[D]`.
    ChildProto,
    /// `X arguments, Y results` from B and C.
    Call,
    /// `values start at A, num returned values = X`.
    Return,
    /// `index = C+1`.
    TableIndex,
    /// `start at register B, fill X values, start at table index aux`.
    SetList,
    /// `X values` from B.
    Varargs,
    /// Capture kind named by A.
    Capture,
    /// `hits = E`.
    Coverage,
    /// `to pc+field+1`.
    Jump(Field),
    /// `to (pc+1)+D`, counted from the aux word.
    JumpAfterAux,
    /// `to (pc+1)+D, aux variables`.
    ForGLoop,
    /// `K(aux) = k, to pc+D`.
    ConstJump,
    /// `jump to pc+C+1`.
    CallJump,
    /// `jump to (pc+1)+C`.
    CallJumpAfterAux,
    /// `K(aux) = k, jump to (pc+1)+C`.
    ConstCallJump,
}

/// One row of the opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct OpInfo {
    /// Opcode.
    pub op: Op,
    /// Mnemonic.
    pub name: &'static str,
    /// Encoding shape.
    pub shape: Shape,
    /// Operands in print order.
    pub operands: &'static [Field],
    /// Trailing annotation.
    pub comment: Comment,
}

impl OpInfo {
    /// Table lookup by opcode byte.
    pub fn lookup(byte: u8) -> Option<&'static Self> {
        LOOKUP[byte as usize].as_ref()
    }
}

const fn row(
    op: Op,
    name: &'static str,
    shape: Shape,
    operands: &'static [Field],
    comment: Comment,
) -> OpInfo {
    OpInfo { op, name, shape, operands, comment }
}

use Field::{Aux, OptC, Raw, A, B, C, D, E};

const A_: &[Field] = &[A];
const AB_: &[Field] = &[A, B];
const ABC_: &[Field] = &[A, B, C];
const AD_: &[Field] = &[A, D];
const D_: &[Field] = &[D];
const E_: &[Field] = &[E];
const A_AUX: &[Field] = &[A, Aux];
const AB_AUX: &[Field] = &[A, B, Aux];
const A_AUX_D: &[Field] = &[A, Aux, D];
const AD_AUX: &[Field] = &[A, D, Aux];
const AB_AUX_C: &[Field] = &[A, B, Aux, C];

/// Every known opcode.
pub const OPCODES: &[OpInfo] = &[
    row(Op::Nop, "NOP", Shape::None, &[Raw], Comment::None),
    row(Op::Break, "BREAK", Shape::None, &[], Comment::None),
    row(Op::LoadNil, "LOADNIL", Shape::A, A_, Comment::None),
    row(Op::LoadB, "LOADB", Shape::ABC, &[A, B, OptC], Comment::Bool),
    row(Op::LoadN, "LOADN", Shape::AD, AD_, Comment::None),
    row(Op::LoadK, "LOADK", Shape::AD, AD_, Comment::Const(D)),
    row(Op::Move, "MOVE", Shape::AB, AB_, Comment::None),
    row(Op::GetGlobal, "GETGLOBAL", Shape::ABCAux, A_AUX, Comment::Const(Aux)),
    row(Op::SetGlobal, "SETGLOBAL", Shape::ABCAux, A_AUX, Comment::Const(Aux)),
    row(Op::GetUpval, "GETUPVAL", Shape::AB, AB_, Comment::None),
    row(Op::SetUpval, "SETUPVAL", Shape::AB, AB_, Comment::None),
    row(Op::CloseUpvals, "CLOSEUPVALS", Shape::A, A_, Comment::None),
    row(Op::GetImport, "GETIMPORT", Shape::ADAux, AD_, Comment::Import),
    row(Op::GetTable, "GETTABLE", Shape::ABC, ABC_, Comment::None),
    row(Op::SetTable, "SETTABLE", Shape::ABC, ABC_, Comment::None),
    row(Op::GetTableKs, "GETTABLEKS", Shape::ABCAux, AB_AUX, Comment::Const(Aux)),
    row(Op::SetTableKs, "SETTABLEKS", Shape::ABCAux, AB_AUX, Comment::Const(Aux)),
    row(Op::GetTableN, "GETTABLEN", Shape::ABC, ABC_, Comment::TableIndex),
    row(Op::SetTableN, "SETTABLEN", Shape::ABC, ABC_, Comment::TableIndex),
    row(Op::NewClosure, "NEWCLOSURE", Shape::AD, AD_, Comment::ChildProto),
    row(Op::NameCall, "NAMECALL", Shape::ABCAux, AB_AUX, Comment::Const(Aux)),
    row(Op::Call, "CALL", Shape::ABC, ABC_, Comment::Call),
    row(Op::Return, "RETURN", Shape::AB, AB_, Comment::Return),
    row(Op::Jump, "JUMP", Shape::AD, D_, Comment::Jump(D)),
    row(Op::JumpBack, "JUMPBACK", Shape::AD, D_, Comment::Jump(D)),
    row(Op::JumpIf, "JUMPIF", Shape::AD, AD_, Comment::Jump(D)),
    row(Op::JumpIfNot, "JUMPIFNOT", Shape::AD, AD_, Comment::Jump(D)),
    row(Op::JumpIfEq, "JUMPIFEQ", Shape::ADAux, A_AUX_D, Comment::JumpAfterAux),
    row(Op::JumpIfLe, "JUMPIFLE", Shape::ADAux, A_AUX_D, Comment::JumpAfterAux),
    row(Op::JumpIfLt, "JUMPIFLT", Shape::ADAux, A_AUX_D, Comment::JumpAfterAux),
    row(Op::JumpIfNotEq, "JUMPIFNOTEQ", Shape::ADAux, A_AUX_D, Comment::JumpAfterAux),
    row(Op::JumpIfNotLe, "JUMPIFNOTLE", Shape::ADAux, A_AUX_D, Comment::JumpAfterAux),
    row(Op::JumpIfNotLt, "JUMPIFNOTLT", Shape::ADAux, A_AUX_D, Comment::JumpAfterAux),
    row(Op::Add, "ADD", Shape::ABC, ABC_, Comment::None),
    row(Op::Sub, "SUB", Shape::ABC, ABC_, Comment::None),
    row(Op::Mul, "MUL", Shape::ABC, ABC_, Comment::None),
    row(Op::Div, "DIV", Shape::ABC, ABC_, Comment::None),
    row(Op::Mod, "MOD", Shape::ABC, ABC_, Comment::None),
    row(Op::Pow, "POW", Shape::ABC, ABC_, Comment::None),
    row(Op::AddK, "ADDK", Shape::ABC, ABC_, Comment::Const(C)),
    row(Op::SubK, "SUBK", Shape::ABC, ABC_, Comment::Const(C)),
    row(Op::MulK, "MULK", Shape::ABC, ABC_, Comment::Const(C)),
    row(Op::DivK, "DIVK", Shape::ABC, ABC_, Comment::Const(C)),
    row(Op::ModK, "MODK", Shape::ABC, ABC_, Comment::Const(C)),
    row(Op::PowK, "POWK", Shape::ABC, ABC_, Comment::Const(C)),
    row(Op::And, "AND", Shape::ABC, ABC_, Comment::None),
    row(Op::Or, "OR", Shape::ABC, ABC_, Comment::None),
    row(Op::AndK, "ANDK", Shape::ABC, ABC_, Comment::Const(C)),
    row(Op::OrK, "ORK", Shape::ABC, ABC_, Comment::Const(C)),
    row(Op::Concat, "CONCAT", Shape::ABC, ABC_, Comment::None),
    row(Op::Not, "NOT", Shape::AB, AB_, Comment::None),
    row(Op::Minus, "MINUS", Shape::AB, AB_, Comment::None),
    row(Op::Length, "LENGTH", Shape::AB, AB_, Comment::None),
    row(Op::NewTable, "NEWTABLE", Shape::ABCAux, AB_AUX, Comment::None),
    row(Op::DupTable, "DUPTABLE", Shape::AD, AD_, Comment::None),
    row(Op::SetList, "SETLIST", Shape::ABCAux, &[A, B, C, Aux], Comment::SetList),
    row(Op::ForNPrep, "FORNPREP", Shape::AD, AD_, Comment::Jump(D)),
    row(Op::ForNLoop, "FORNLOOP", Shape::AD, AD_, Comment::Jump(D)),
    row(Op::ForGLoop, "FORGLOOP", Shape::ADAux, AD_AUX, Comment::ForGLoop),
    row(Op::ForGPrepINext, "FORGPREP_INEXT", Shape::AD, AD_, Comment::Jump(D)),
    row(Op::ForGLoopINext, "FORGLOOP_INEXT", Shape::AD, AD_, Comment::Jump(D)),
    row(Op::ForGPrepNext, "FORGPREP_NEXT", Shape::AD, AD_, Comment::Jump(D)),
    row(Op::ForGLoopNext, "FORGLOOP_NEXT", Shape::AD, AD_, Comment::Jump(D)),
    row(Op::GetVarargs, "GETVARARGS", Shape::AB, AB_, Comment::Varargs),
    row(Op::DupClosure, "DUPCLOSURE", Shape::AD, AD_, Comment::Const(D)),
    row(Op::PrepVarargs, "PREPVARARGS", Shape::A, A_, Comment::None),
    row(Op::LoadKx, "LOADKX", Shape::AAux, A_AUX, Comment::Const(Aux)),
    row(Op::JumpX, "JUMPX", Shape::AE, E_, Comment::Jump(E)),
    row(Op::FastCall, "FASTCALL", Shape::ABC, &[A, C], Comment::Jump(C)),
    row(Op::Coverage, "COVERAGE", Shape::AE, E_, Comment::Coverage),
    row(Op::Capture, "CAPTURE", Shape::AB, AB_, Comment::Capture),
    row(Op::JumpIfEqK, "JUMPIFEQK", Shape::ADAux, A_AUX_D, Comment::ConstJump),
    row(Op::JumpIfNotEqK, "JUMPIFNOTEQK", Shape::ADAux, A_AUX_D, Comment::ConstJump),
    row(Op::FastCall1, "FASTCALL1", Shape::ABC, ABC_, Comment::CallJump),
    row(Op::FastCall2, "FASTCALL2", Shape::ABCAux, AB_AUX_C, Comment::CallJumpAfterAux),
    row(Op::FastCall2K, "FASTCALL2K", Shape::ABCAux, AB_AUX_C, Comment::ConstCallJump),
];

static LOOKUP: [Option<OpInfo>; 256] = build_lookup();

const fn build_lookup() -> [Option<OpInfo>; 256] {
    let mut table: [Option<OpInfo>; 256] = [None; 256];
    let mut i = 0;
    while i < OPCODES.len() {
        let info = OPCODES[i];
        table[info.op as usize] = Some(info);
        i += 1;
    }
    table
}

/// Bit-field view over one instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insn(pub u32);

impl Insn {
    /// Opcode byte.
    pub const fn opcode(self) -> u8 { (self.0 & 0xFF) as u8 }
    /// Register A.
    pub const fn a(self) -> u8 { ((self.0 >> 8) & 0xFF) as u8 }
    /// Operand B.
    pub const fn b(self) -> u8 { ((self.0 >> 16) & 0xFF) as u8 }
    /// Operand C.
    pub const fn c(self) -> u8 { (self.0 >> 24) as u8 }
    /// Signed 16-bit D.
    pub const fn d(self) -> i32 { (self.0 as i32) >> 16 }
    /// Signed 24-bit E.
    pub const fn e(self) -> i32 { (self.0 as i32) >> 8 }
}

/* ─────────────────────────── Tests ─────────────────────────── */
