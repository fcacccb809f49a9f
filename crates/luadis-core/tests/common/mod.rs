//! Fabrique de modules binaires pour les tests d’intégration.

#![allow(dead_code)]

use luadis_core::{ByteWriter, BYTECODE_VERSION};

/// Constante telle qu’encodée (indices bruts).
#[derive(Debug, Clone)]
pub enum K {
    Nil,
    Bool(bool),
    Num(f64),
    /// Index 1-based dans la table de chaînes.
    Str(u32),
    Import(u32),
    Table(Vec<u32>),
    Closure(u32),
}

/// Description d’un prototype à encoder.
#[derive(Debug, Clone, Default)]
pub struct ProtoSpec {
    pub header: [u8; 4],
    pub code: Vec<u32>,
    pub constants: Vec<K>,
    pub children: Vec<u32>,
    pub line_defined: u32,
    pub debug_name: u32,
    /// (gap_log2, octets d’offset bruts, deltas de lignes)
    pub lines: Option<(u8, Vec<u8>, Vec<u32>)>,
    /// (locaux, noms d’upvalues)
    pub debug: Option<(u32, u32)>,
}

pub fn import_word(ids: &[u32]) -> u32 {
    let mut word = (ids.len() as u32) << 30;
    for (slot, id) in ids.iter().enumerate() {
        word |= id << (20 - 10 * slot as u32);
    }
    word
}

pub fn abc(op: u8, a: u8, b: u8, c: u8) -> u32 {
    u32::from(op) | (u32::from(a) << 8) | (u32::from(b) << 16) | (u32::from(c) << 24)
}

pub fn ad(op: u8, a: u8, d: i16) -> u32 {
    u32::from(op) | (u32::from(a) << 8) | (u32::from(d as u16) << 16)
}

pub fn module_bytes(strings: &[&str], protos: &[ProtoSpec], main: u32) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_u8(BYTECODE_VERSION);
    w.write_varint(strings.len() as u32);
    for s in strings {
        w.write_str(s);
    }
    w.write_varint(protos.len() as u32);
    for p in protos {
        write_proto(&mut w, p);
    }
    w.write_varint(main);
    w.into_vec()
}

fn write_proto(w: &mut ByteWriter, p: &ProtoSpec) {
    w.write_bytes(&p.header);
    w.write_varint(p.code.len() as u32);
    for &word in &p.code {
        w.write_u32_le(word);
    }

    w.write_varint(p.constants.len() as u32);
    for k in &p.constants {
        match k {
            K::Nil => w.write_u8(0),
            K::Bool(b) => {
                w.write_u8(1);
                w.write_u8(u8::from(*b));
            }
            K::Num(n) => {
                w.write_u8(2);
                w.write_f64_le(*n);
            }
            K::Str(id) => {
                w.write_u8(3);
                w.write_varint(*id);
            }
            K::Import(word) => {
                w.write_u8(4);
                w.write_u32_le(*word);
            }
            K::Table(keys) => {
                w.write_u8(5);
                w.write_varint(keys.len() as u32);
                for &key in keys {
                    w.write_varint(key);
                }
            }
            K::Closure(id) => {
                w.write_u8(6);
                w.write_varint(*id);
            }
        }
    }

    w.write_varint(p.children.len() as u32);
    for &child in &p.children {
        w.write_varint(child);
    }
    w.write_varint(p.line_defined);
    w.write_varint(p.debug_name);

    match &p.lines {
        Some((gap, offsets, deltas)) => {
            w.write_u8(1);
            w.write_u8(*gap);
            w.write_bytes(offsets);
            for &delta in deltas {
                w.write_u32_le(delta);
            }
        }
        None => w.write_u8(0),
    }

    match p.debug {
        Some((locals, upvalues)) => {
            w.write_u8(1);
            w.write_varint(locals);
            for _ in 0..locals {
                w.write_varint(0);
                w.write_varint(0);
                w.write_varint(1);
                w.write_u8(0);
            }
            w.write_varint(upvalues);
            for _ in 0..upvalues {
                w.write_varint(0);
            }
        }
        None => w.write_u8(0),
    }
}
