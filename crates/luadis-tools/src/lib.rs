//! luadis-tools: Bibliothèque commune pour les outils luadis.
//!
//! Objectifs : mutualiser I/O, chrono, couleurs, logs, transcodage des charges
//! utiles (binaire / base64) et résumé de module.
//!
//! ## Modules & zones clés
//! - `prelude` : import rapide des types/fns usuels
//! - I/O       : `read_bytes`, `read_stdin_to_bytes`, `write_text`
//! - Time      : `Timer`, `human_millis`
//! - Couleurs  : `ColorMode`, `setup_colors`
//! - Logs      : `init_logging` (`-v/-q` → `RUST_LOG`)
//! - Payload   : `decode_base64_payload`
//! - Disasm    : `ModuleSummary`, `check_strict`
//!
//! Les fonctions sont pensées "no surprises" et avec `anyhow::Result`.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![cfg_attr(not(debug_assertions), warn(missing_docs))]

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use camino::{Utf8Path, Utf8PathBuf};

use luadis_core::disasm::InsnIter;
use luadis_core::helpers::{empty_protos, validate_module};
pub use luadis_core::{Module, Proto};

/// Version lisible du crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Petite bannière de version utile pour logs/outils.
pub fn version_banner(tool: &str) -> String {
    format!("{tool} (luadis-tools {VERSION})")
}

/* ------------------------------------------------------------------------- */
/* Prelude                                                                   */
/* ------------------------------------------------------------------------- */

/// Prelude pratique pour les bins: re-exports compacts.
pub mod prelude {
    pub use anyhow::{anyhow, Context, Result};
    pub use camino::{Utf8Path, Utf8PathBuf};
    pub use crate::{
        version_banner, human_millis, Timer,
        read_bytes, read_stdin_to_bytes, write_text, to_utf8,
        default_filename_with_ext,
        ColorMode, setup_colors, init_logging,
        decode_base64_payload, check_strict, ModuleSummary,
    };
}

/* ------------------------------------------------------------------------- */
/* I/O utils                                                                 */
/* ------------------------------------------------------------------------- */

/// Lis un fichier binaire.
pub fn read_bytes(path: &Utf8Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("lecture {path}"))
}

/// Lis tout `stdin` en bytes.
pub fn read_stdin_to_bytes() -> Result<Vec<u8>> {
    let mut v = Vec::new();
    io::stdin().read_to_end(&mut v).context("lecture stdin")?;
    Ok(v)
}

/// Écrit un texte (UTF-8). Crée les dossiers au besoin.
pub fn write_text(path: &Utf8Path, s: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("création {parent}"))?;
        }
    }
    let mut f = fs::File::create(path).with_context(|| format!("écriture {path}"))?;
    f.write_all(s.as_bytes())?;
    Ok(())
}

/// Convertit un `PathBuf` en `Utf8PathBuf` (erreur si non UTF-8).
pub fn to_utf8(p: PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(p).map_err(|p| anyhow!("chemin non UTF-8: {}", p.display()))
}

/// Construit un nom `<stem>.<ext>` à partir d'un input.
pub fn default_filename_with_ext(input: &Utf8Path, ext: &str) -> String {
    let stem = input.file_stem().unwrap_or("module");
    format!("{stem}.{ext}")
}

/* ------------------------------------------------------------------------- */
/* Time / chrono                                                             */
/* ------------------------------------------------------------------------- */

/// Chrono de scope simple; loggable ensuite.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Démarre un chrono.
    pub fn start() -> Self { Self { start: Instant::now() } }
    /// Durée écoulée.
    pub fn elapsed(&self) -> Duration { self.start.elapsed() }
    /// Format humain court.
    pub fn pretty(&self) -> String { human_millis(self.elapsed()) }
}

/// Format "humain" d'une durée.
pub fn human_millis(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1_000 { return format!("{ms} ms"); }
    let s = ms as f64 / 1000.0;
    if s < 60.0 { return format!("{s:.3} s"); }
    let m = (s / 60.0).floor();
    let rest = s - m * 60.0;
    format!("{m:.0} min {rest:.1} s")
}

/* ------------------------------------------------------------------------- */
/* Couleurs                                                                  */
/* ------------------------------------------------------------------------- */

/// Contrôle l'application de couleurs ANSI dans les sorties CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ColorMode {
    /// Active les couleurs seulement si la sortie supporte ANSI.
    Auto,
    /// Force l'activation des couleurs.
    Always,
    /// Désactive complètement les couleurs ANSI.
    Never,
}

/// Configure le mode couleur global pour yansi (si feature `colors` active).
pub fn setup_colors(mode: ColorMode) {
    #[cfg(feature = "colors")]
    {
        match mode {
            ColorMode::Auto => yansi::whenever(yansi::Condition::DEFAULT),
            ColorMode::Always => yansi::enable(),
            ColorMode::Never => yansi::disable(),
        }
    }
    #[cfg(not(feature = "colors"))]
    { let _ = mode; }
}

/* ------------------------------------------------------------------------- */
/* Logs                                                                      */
/* ------------------------------------------------------------------------- */

/// Niveau de log pour `-v` répété / `-q`.
pub const fn log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialise `env_logger` ; `RUST_LOG` garde la priorité s’il est défini.
pub fn init_logging(verbose: u8, quiet: bool) {
    let env = env_logger::Env::default().default_filter_or(log_level(verbose, quiet));
    // un second appel (tests, bins multiples) est sans effet
    let _ = env_logger::Builder::from_env(env).format_timestamp_millis().try_init();
}

/* ------------------------------------------------------------------------- */
/* Payload                                                                   */
/* ------------------------------------------------------------------------- */

/// Décode une charge utile base64 (espaces en bordure ignorés).
pub fn decode_base64_payload(text: &[u8]) -> Result<Vec<u8>> {
    STANDARD.decode(text.trim_ascii()).context("base64 invalide")
}

/* ------------------------------------------------------------------------- */
/* Disasm helpers                                                            */
/* ------------------------------------------------------------------------- */

/// Mode `--strict` : indices cohérents et aucun prototype vide.
pub fn check_strict(module: &Module) -> Result<()> {
    validate_module(module)?;
    let empty = empty_protos(module);
    if !empty.is_empty() {
        return Err(anyhow!("prototype(s) vide(s) (0 instruction): {empty:?}"));
    }
    Ok(())
}

/// Compteurs d’un module (pour `--summary` et la vue JSON).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ModuleSummary {
    /// Version de format.
    pub version: u8,
    /// Nombre de prototypes.
    pub protos: usize,
    /// Prototype d’entrée.
    pub main: u32,
    /// Mots de code (aux inclus).
    pub words: usize,
    /// Instructions (aux exclus).
    pub instructions: usize,
    /// Constantes, tous prototypes confondus.
    pub constants: usize,
    /// Opcodes inconnus rencontrés.
    pub unknown_opcodes: usize,
    /// Prototypes porteurs d’une table de lignes.
    pub with_line_info: usize,
    /// Enregistrements de debug ignorés (locaux + upvalues).
    pub debug_records: u64,
}

impl ModuleSummary {
    /// Calcule le résumé d’un module décodé.
    pub fn of(module: &Module) -> Self {
        let mut s = Self {
            version: module.version,
            protos: module.protos.len(),
            main: module.main,
            ..Self::default()
        };
        for proto in &module.protos {
            s.words += proto.code.len();
            s.constants += proto.constants.len();
            s.with_line_info += usize::from(proto.lines.is_some());
            s.debug_records += u64::from(proto.debug_locals) + u64::from(proto.debug_upvalues);
            for insn in InsnIter::new(&proto.code) {
                s.instructions += 1;
                s.unknown_opcodes += usize::from(insn.info.is_none());
            }
        }
        s
    }
}

/* ------------------------------------------------------------------------- */
/* Tests                                                                     */
/* ------------------------------------------------------------------------- */
