//! luadis-core: décodage et désassemblage de bytecode Luau (format version 2)
//!
//! Fournit :
//! - `ByteReader` : lecteur séquentiel borné (LE + LEB128), jamais de lecture hors buffer
//! - `ByteWriter` : écriture LE/LEB128 (fabrication de modules de test)
//! - `DecodeError` + alias `DecodeResult<T>`
//! - `bytecode` : modèle (`Module`, `Proto`, `Constant`, `LineTable`), lecteur,
//!   table d’opcodes, désassembleur et rendu texte
//!
//! Points d’entrée :
//! - [`decode`] : octets → [`Module`]
//! - [`render`] : [`Module`] → texte
//! - [`disassemble`] : les deux d’un coup
//!
//! Features :
//! - `serde` (par défaut) : derive `Serialize` sur le modèle décodé

#![deny(missing_docs)]
#![forbid(unsafe_code)]

/* ─────────────────────────── Imports ─────────────────────────── */

use byteorder::{ByteOrder, LittleEndian};

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Modèle, lecteur, opcodes, désassembleur.
pub mod bytecode;

/// Raccourci : ré-exporte le désassembleur textuel.
pub use bytecode::disasm;
/// Raccourci : ré-exporte les validations structurelles.
pub use bytecode::helpers;

pub use bytecode::{Constant, Import, LineTable, Module, Proto};

/* ─────────────────────────── Constantes de format ─────────────────────────── */

/// Seule version de format acceptée (premier octet du buffer).
pub const BYTECODE_VERSION: u8 = 2;

/// Nom attribué aux prototypes sans nom de debug.
pub const DEFAULT_DEBUG_NAME: &str = "UNNAMED";

/* ─────────────────────────── Résultat commun ─────────────────────────── */

/// Alias résultat commun au décodage.
pub type DecodeResult<T> = Result<T, DecodeError>;

/* ─────────────────────────── Points d’entrée ─────────────────────────── */

/// Décode un module complet depuis ses octets.
pub fn decode(bytes: &[u8]) -> DecodeResult<Module> {
    Module::from_bytes(bytes)
}

/// Rend le texte complet d’un module décodé (`show_lines` préfixe chaque ligne par `L<line>`).
pub fn render(module: &Module, show_lines: bool) -> String {
    disasm::render_module(module, show_lines)
}

/// Décode puis rend un module ; aucune sortie partielle en cas d’erreur.
pub fn disassemble(bytes: &[u8], show_lines: bool) -> DecodeResult<String> {
    let module = decode(bytes)?;
    Ok(render(&module, show_lines))
}

/* ─────────────────────────── Byte Writer (LE) ─────────────────────────── */

/// Buffer d’écriture (croît automatiquement).
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Crée un writer vide.
    pub fn new() -> Self { Self { buf: Vec::new() } }
    /// Accès en lecture au contenu.
    pub fn as_slice(&self) -> &[u8] { &self.buf }
    /// Récupère le buffer (consomme).
    pub fn into_vec(self) -> Vec<u8> { self.buf }
    /// Ajoute des octets bruts.
    pub fn write_bytes(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }
    /// Écrit un octet.
    pub fn write_u8(&mut self, v: u8) { self.buf.push(v); }
    /// Écrit un u32 little-endian.
    pub fn write_u32_le(&mut self, v: u32) { self.buf.extend_from_slice(&v.to_le_bytes()); }
    /// Écrit un f64 little-endian.
    pub fn write_f64_le(&mut self, v: f64) { self.buf.extend_from_slice(&v.to_le_bytes()); }

    /// Écrit un entier non signé en LEB128.
    pub fn write_varint(&mut self, mut v: u32) {
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
    }

    /// Écrit une chaîne préfixée par sa longueur (LEB128).
    pub fn write_str(&mut self, s: &str) {
        self.write_varint(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }
}

/* ─────────────────────────── Byte Reader (LE) ─────────────────────────── */

/// Lecteur séquentiel sur un slice d’octets (helpers LE + LEB128).
///
/// Toute lecture qui dépasserait la fin du buffer échoue avec
/// [`DecodeError::TruncatedInput`].
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    off: usize,
}

impl<'a> ByteReader<'a> {
    /// Construit un lecteur.
    pub fn new(data: &'a [u8]) -> Self { Self { data, off: 0 } }
    /// Offset courant.
    pub fn offset(&self) -> usize { self.off }
    /// Taille restante.
    pub fn remaining(&self) -> usize { self.data.len().saturating_sub(self.off) }

    /// Capacité raisonnable pour `count` éléments d’au moins `min_size` octets chacun.
    ///
    /// Un compteur lu dans l’entrée ne doit jamais piloter une allocation
    /// plus grande que ce que le buffer peut effectivement contenir.
    pub fn capacity_hint(&self, count: usize, min_size: usize) -> usize {
        count.min(self.remaining() / min_size.max(1))
    }

    /// Lit `n` octets (ou erreur si EOF).
    pub fn read_bytes(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodeError::TruncatedInput { needed: n, at: self.off });
        }
        let start = self.off;
        self.off += n;
        Ok(&self.data[start..self.off])
    }

    /// Lit un octet.
    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        let b = self.read_bytes(1)?;
        Ok(b[0])
    }

    /// Lit un u32 LE.
    pub fn read_u32_le(&mut self) -> DecodeResult<u32> {
        let b = self.read_bytes(4)?;
        Ok(LittleEndian::read_u32(b))
    }

    /// Lit un f64 LE.
    pub fn read_f64_le(&mut self) -> DecodeResult<f64> {
        let b = self.read_bytes(8)?;
        Ok(LittleEndian::read_f64(b))
    }

    /// Lit un entier LEB128 non signé.
    ///
    /// La largeur encodée n’est pas bornée ; les bits au-delà de 32 sont ignorés.
    pub fn read_varint(&mut self) -> DecodeResult<u32> {
        let mut result: u32 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_u8()?;
            if shift < 32 {
                result |= u32::from(byte & 0x7F) << shift;
            }
            shift = shift.saturating_add(7);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
    }

    /// Lit un compteur LEB128 (taille de table).
    pub fn read_count(&mut self) -> DecodeResult<usize> {
        Ok(self.read_varint()? as usize)
    }
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs de décodage. Toutes sont fatales pour la requête en cours.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Le premier octet n’est pas [`BYTECODE_VERSION`].
    #[error("unsupported bytecode version {found} (expected {})", BYTECODE_VERSION)]
    UnsupportedVersion {
        /// Version lue.
        found: u8,
    },
    /// Tag de constante inconnu.
    #[error("unknown constant tag {tag} for constant #{index}")]
    UnknownConstantTag {
        /// Tag brut.
        tag: u8,
        /// Position de la constante dans sa table.
        index: usize,
    },
    /// Fin de buffer inattendue.
    #[error("truncated input: need {needed} bytes at offset {at}")]
    TruncatedInput {
        /// Nombre d’octets demandés.
        needed: usize,
        /// Offset où l’erreur s’est produite.
        at: usize,
    },
    /// Référence 1-based vers la table de chaînes hors bornes (ou 0 là où une chaîne est exigée).
    #[error("string index {index} out of range (pool holds {len} strings)")]
    StringIndexOutOfRange {
        /// Index brut (1-based).
        index: u32,
        /// Taille de la table.
        len: usize,
    },
    /// Segment d’import qui ne désigne pas une constante chaîne déjà décodée.
    #[error("import constant #{index} references constant {segment}, which is not an earlier string")]
    InvalidImport {
        /// Position de la constante import.
        index: usize,
        /// Index du segment fautif.
        segment: u32,
    },
    /// Module incohérent (validation structurelle).
    #[error("invalid module: {0}")]
    Invalid(String),
}

impl DecodeError {
    /// Construit une erreur de validation.
    pub fn invalid(msg: impl Into<String>) -> Self { DecodeError::Invalid(msg.into()) }
}

/* ─────────────────────────── Prélude (reexports utiles) ─────────────────────────── */

/// Prélude pratique pour importer les types/funcs clés du crate.
pub mod prelude {
    /// Réexports utiles pour une importation rapide.
    pub use super::{
        decode, disassemble, render, ByteReader, ByteWriter, Constant, DecodeError, DecodeResult,
        Import, LineTable, Module, Proto, BYTECODE_VERSION, DEFAULT_DEBUG_NAME,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */
#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn writer_reader_le() -> DecodeResult<()> {
        let mut w = ByteWriter::new();
        w.write_u8(7);
        w.write_u32_le(0xDEAD_BEEF);
        w.write_f64_le(3.5);
        w.write_varint(300);
        w.write_str("hi");

        let mut r = ByteReader::new(w.as_slice());
        assert_eq!(r.read_u8()?, 7);
        assert_eq!(r.read_u32_le()?, 0xDEAD_BEEF);
        assert_eq!(r.read_f64_le()?, 3.5);
        assert_eq!(r.read_varint()?, 300);
        let len = r.read_count()?;
        assert_eq!(r.read_bytes(len)?, b"hi");
        assert_eq!(r.remaining(), 0);
        Ok(())
    }

    #[test]
    fn varint_multi_byte() -> DecodeResult<()> {
        // 0xE5 0x8E 0x26 = 624485
        let mut r = ByteReader::new(&[0xE5, 0x8E, 0x26]);
        assert_eq!(r.read_varint()?, 624_485);
        assert_eq!(r.offset(), 3);
        Ok(())
    }

    #[test]
    fn varint_wider_than_32_bits_is_consumed() -> DecodeResult<()> {
        let mut r = ByteReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x2A]);
        assert_eq!(r.read_varint()?, u32::MAX);
        assert_eq!(r.read_u8()?, 0x2A);
        Ok(())
    }

    #[test]
    fn truncated_reads_report_offset() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        assert_eq!(r.read_u8(), Ok(1));
        assert_eq!(r.read_u32_le(), Err(DecodeError::TruncatedInput { needed: 4, at: 1 }));
        // l’échec ne consomme rien
        assert_eq!(r.offset(), 1);
    }

    #[test]
    fn varint_without_terminator_is_truncated() {
        let mut r = ByteReader::new(&[0x80, 0x80]);
        assert_eq!(r.read_varint(), Err(DecodeError::TruncatedInput { needed: 1, at: 2 }));
    }

    #[test]
    fn capacity_hint_is_bounded_by_remaining_bytes() {
        let r = ByteReader::new(&[0; 16]);
        assert_eq!(r.capacity_hint(1_000_000, 4), 4);
        assert_eq!(r.capacity_hint(2, 4), 2);
        assert_eq!(r.capacity_hint(9, 0), 9);
    }

    #[test]
    fn error_messages_are_descriptive() {
        let e = DecodeError::UnsupportedVersion { found: 1 };
        assert_eq!(e.to_string(), "unsupported bytecode version 1 (expected 2)");
        let e = DecodeError::TruncatedInput { needed: 8, at: 12 };
        assert_eq!(e.to_string(), "truncated input: need 8 bytes at offset 12");
    }
}
