//! Bytecode model, reader, opcode table and disassembler.
//!
//! The reader turns a raw buffer into a [`Module`]; the disassembler walks
//! each prototype with the static opcode table and renders text.

/// Decoded module model (prototypes, constants, line tables).
pub mod proto;
/// Binary reader (string pool, constant pool, prototypes).
pub mod reader;
/// Opcode table and instruction bit fields.
pub mod opcode;
/// Instruction walk and text rendering.
pub mod disasm;
/// Structural validation used by tooling.
pub mod helpers;

pub use opcode::{Comment, Field, Insn, Op, OpInfo, Shape};
pub use proto::{Constant, Import, LineTable, Module, Proto};
pub use reader::StringPool;
