//! Textual disassembly.
//!
//! [`InsnIter`] walks a prototype's words, pairing each instruction with its
//! aux word when the opcode table says it owns one. [`format_insn`] turns a
//! decoded instruction into one line; [`render_module`] adds the per-proto
//! header blocks.

use core::fmt::Write;

use log::warn;

use super::opcode::{Comment, Field, Insn, OpInfo};
use super::proto::{Constant, Import, Module, Proto};

/// One instruction with its optional aux word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// Index of the instruction's first word.
    pub pc: usize,
    /// Instruction word.
    pub insn: Insn,
    /// Aux word; `None` when the opcode owns none or the stream ended early.
    pub aux: Option<u32>,
    /// Table row, `None` for an unknown opcode.
    pub info: Option<&'static OpInfo>,
}

impl Decoded {
    /// Aux value as rendered (0 when missing).
    pub fn aux_or_zero(&self) -> u32 {
        self.aux.unwrap_or(0)
    }

    fn field(&self, field: Field) -> i64 {
        let insn = self.insn;
        match field {
            Field::A => i64::from(insn.a()),
            Field::B => i64::from(insn.b()),
            Field::C | Field::OptC => i64::from(insn.c()),
            Field::D => i64::from(insn.d()),
            Field::E => i64::from(insn.e()),
            Field::Aux => i64::from(self.aux_or_zero()),
            Field::Raw => i64::from(insn.0),
        }
    }
}

/// Walks an instruction stream; aux words are never yielded on their own.
#[derive(Debug, Clone)]
pub struct InsnIter<'a> {
    code: &'a [u32],
    pc: usize,
}

impl<'a> InsnIter<'a> {
    /// Starts at word 0.
    pub fn new(code: &'a [u32]) -> Self {
        Self { code, pc: 0 }
    }
}

impl Iterator for InsnIter<'_> {
    type Item = Decoded;

    fn next(&mut self) -> Option<Decoded> {
        let pc = self.pc;
        let insn = Insn(*self.code.get(pc)?);
        let info = OpInfo::lookup(insn.opcode());
        let aux = match info {
            Some(info) if info.shape.has_aux() => {
                self.pc += 2;
                self.code.get(pc + 1).copied()
            }
            _ => {
                self.pc += 1;
                None
            }
        };
        Some(Decoded { pc, insn, aux, info })
    }
}

/// Text of a constant as it appears in comments.
pub fn show_const(constant: Option<&Constant>) -> String {
    match constant {
        None => "<out of range>".to_owned(),
        Some(Constant::Nil) => "nil".to_owned(),
        Some(Constant::Boolean(b)) => b.to_string(),
        Some(Constant::Number(n)) => show_number(*n),
        Some(Constant::String(s)) => format!("'{s}'"),
        Some(Constant::Import(import)) => format!("import '{}'", import.path),
        Some(Constant::Table) => "table".to_owned(),
        Some(Constant::Closure(id)) => format!("closure {id}"),
    }
}

/// `%4.3f`: lowercase `nan`/`inf` for non-finite values.
fn show_number(n: f64) -> String {
    if n.is_finite() {
        return format!("{n:4.3}");
    }
    let word = if n.is_nan() { "nan" } else { "inf" };
    let sign = if n.is_sign_negative() { "-" } else { "" };
    format!("{:>4}", format!("{sign}{word}"))
}

/// `MULTRET` for 0, otherwise the field minus one.
pub fn multret(field: u8) -> String {
    match field {
        0 => "MULTRET".to_owned(),
        n => (n - 1).to_string(),
    }
}

fn capture_kind(kind: u8) -> &'static str {
    match kind {
        0 => "VAL",
        1 => "REF",
        2 => "UPVAL",
        _ => "UNKNOWN",
    }
}

fn constant_ref(proto: &Proto, index: i64) -> String {
    format!("K({index}) = {}", show_const(proto.constant(index)))
}

fn comment(proto: &Proto, d: &Decoded, kind: Comment) -> Option<String> {
    let insn = d.insn;
    let pc = d.pc as i64;
    let aux = d.aux_or_zero();
    let c = i64::from(insn.c());
    let text = match kind {
        Comment::None => return None,
        Comment::Bool => {
            let value = insn.b() != 0;
            if c > 0 {
                format!("{value}, jump to {}", pc + c + 1)
            } else {
                value.to_string()
            }
        }
        Comment::Const(field) => constant_ref(proto, d.field(field)),
        Comment::Import => {
            let import = Import::resolve_lossy(aux, &proto.constants);
            format!("count = {}, '{}'", import.count, import.path)
        }
        Comment::ChildProto => {
            let child = usize::try_from(insn.d()).ok().and_then(|i| proto.children.get(i));
            match child {
                Some(id) => format!("global id = {id}"),
                None => "global id = <out of range>".to_owned(),
            }
        }
        Comment::Call => format!("{} arguments, {} results", multret(insn.b()), multret(insn.c())),
        Comment::Return => format!(
            "values start at {}, num returned values = {}",
            insn.a(),
            multret(insn.b())
        ),
        Comment::TableIndex => format!("index = {}", c + 1),
        Comment::SetList => format!(
            "start at register {}, fill {} values, start at table index {aux}",
            insn.b(),
            multret(insn.c())
        ),
        Comment::Varargs => format!("{} values", multret(insn.b())),
        Comment::Capture => format!("{} capture", capture_kind(insn.a())),
        Comment::Coverage => format!("hits = {}", insn.e()),
        Comment::Jump(field) => format!("to {}", pc + d.field(field) + 1),
        Comment::JumpAfterAux => format!("to {}", pc + 1 + i64::from(insn.d())),
        Comment::ForGLoop => format!("to {}, {aux} variables", pc + 1 + i64::from(insn.d())),
        // measured from the instruction itself, without the +1
        Comment::ConstJump => format!(
            "{}, to {}",
            constant_ref(proto, i64::from(aux)),
            pc + i64::from(insn.d())
        ),
        Comment::CallJump => format!("jump to {}", pc + c + 1),
        Comment::CallJumpAfterAux => format!("jump to {}", pc + 1 + c),
        Comment::ConstCallJump => format!(
            "{}, jump to {}",
            constant_ref(proto, i64::from(aux)),
            pc + 1 + c
        ),
    };
    Some(text)
}

/// Formats one decoded instruction (no trailing newline).
pub fn format_insn(proto: &Proto, d: &Decoded, show_lines: bool) -> String {
    let mut out = String::new();
    if show_lines {
        let _ = write!(out, "L{} ", proto.line_for_pc(d.pc));
    }
    let _ = write!(out, "[{:03}] ", d.pc);

    let Some(info) = d.info else {
        out.push_str("UNKNOWN");
        return out;
    };

    out.push_str(info.name);
    for &field in info.operands {
        match field {
            Field::Raw => {
                let _ = write!(out, " (0x{:08X})", d.insn.0);
            }
            Field::OptC if d.insn.c() == 0 => {}
            _ => {
                let _ = write!(out, " {}", d.field(field));
            }
        }
    }
    if let Some(text) = comment(proto, d, info.comment) {
        let _ = write!(out, " ; {text}");
    }
    out
}

/// Instruction lines of one prototype, in stream order.
pub fn instruction_lines(proto: &Proto, show_lines: bool) -> Vec<String> {
    InsnIter::new(&proto.code)
        .map(|d| format_insn(proto, &d, show_lines))
        .collect()
}

/// Header comment block of one prototype.
pub fn render_header(out: &mut String, id: usize, proto: &Proto) {
    let _ = writeln!(out, "; global id: {id}");
    let _ = writeln!(out, "; proto name: {}", proto.debug_name);
    let _ = writeln!(out, "; linedefined: {}", proto.line_defined);
    out.push('\n');
    let _ = writeln!(out, "; maxstacksize: {}", proto.max_stack_size);
    let _ = writeln!(out, "; numparams: {}", proto.num_params);
    let _ = writeln!(out, "; nups: {}", proto.num_upvalues);
    let _ = writeln!(out, "; is_vararg: {:02X}", proto.is_vararg);
    if !proto.children.is_empty() {
        let children: Vec<String> = proto.children.iter().map(u32::to_string).collect();
        let _ = writeln!(out, "\n; child protos: {}", children.join(", "));
    }
    out.push('\n');
    let _ = writeln!(out, "; sizecode: {}", proto.code.len());
    let _ = writeln!(out, "; sizek: {}", proto.constants.len());
}

/// Header plus instruction lines of one prototype.
pub fn render_proto(out: &mut String, id: usize, proto: &Proto, show_lines: bool) {
    render_header(out, id, proto);

    let mut unknown = 0usize;
    for d in InsnIter::new(&proto.code) {
        if d.info.is_none() {
            unknown += 1;
        }
        out.push_str(&format_insn(proto, &d, show_lines));
        out.push('\n');
    }
    if unknown > 0 {
        warn!(
            "proto #{id} `{}`: {unknown} unknown opcode(s), following instructions may be misaligned",
            proto.debug_name
        );
    }
}

/// Full text of a module, prototypes in module order.
pub fn render_module(module: &Module, show_lines: bool) -> String {
    let words: usize = module.protos.iter().map(|p| p.code.len()).sum();
    let mut out = String::with_capacity(words * 48);
    for (id, proto) in module.protos.iter().enumerate() {
        render_proto(&mut out, id, proto, show_lines);
    }
    out
}

/* ─────────────────────────── Tests ─────────────────────────── */
