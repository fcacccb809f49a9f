// crates/luadis-tools/src/bin/luadis.rs
//! Désassembleur de bytecode Luau (format v2).
//!
//! Exemples :
//!   luadis a.luauc
//!   luadis a.luauc b.luauc --out-dir target/disasm/
//!   cat a.luauc | luadis - --stdin-name a.luauc --line-info
//!   luadis a.b64 --base64 --json | jq
//!
//! Options utiles :
//!   --line-info     : préfixe chaque ligne par `L<ligne>`
//!   --disasm        : imprime le désassemblage sur stdout (défaut sans autre sortie)
//!   --emit <f>      : écrit le désassemblage dans un fichier
//!   --out-dir <d>   : un fichier `<stem>.disasm.txt` par entrée
//!   --json          : imprime une vue JSON structurée
//!   --summary       : résumé (protos/instructions/constantes) sur stderr
//!   --strict        : échec si indices incohérents ou prototype vide
//!   --base64        : l’entrée est du texte base64
//!   --color <mode>  : auto|always|never (couleurs pour résumé)
//!   --time          : chrono

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{ArgAction, Parser, ValueEnum};
use log::{debug, info};
use serde::Serialize;
use yansi::{Color, Paint};

use luadis_core::disasm::{format_insn, InsnIter};
use luadis_core::{Constant, Module};
use luadis_tools::prelude::*;
use luadis_tools::ColorMode as GlobalColorMode;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ColorMode { Auto, Always, Never }

#[derive(Parser, Debug)]
#[command(name = "luadis", version, about = "Désassembleur de bytecode Luau (binaire -> texte/JSON)")]
struct Cli {
    /// Fichier(s) de bytecode (ou '-' pour stdin, unique)
    inputs: Vec<String>,

    /// Préfixe chaque instruction par sa ligne source (`L<n>`)
    #[arg(short = 'l', long, env = "LUADIS_LINE_INFO")]
    line_info: bool,

    /// Affiche le désassemblage sur stdout
    #[arg(long)]
    disasm: bool,

    /// Chemin fichier où écrire le désassemblage (si 1 entrée)
    #[arg(long, conflicts_with = "out_dir")]
    emit: Option<PathBuf>,

    /// Dossier où écrire le(s) désassemblage(s) (si N entrées)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Affiche un JSON structuré sur stdout
    #[arg(long)]
    json: bool,

    /// Résumé rapide sur stderr
    #[arg(long)]
    summary: bool,

    /// Échec si module incohérent ou prototype vide
    #[arg(long)]
    strict: bool,

    /// L’entrée est du texte base64
    #[arg(long)]
    base64: bool,

    /// Nom logique quand l’entrée est '-' (stdin)
    #[arg(long, default_value = "<stdin>")]
    stdin_name: String,

    /// Affiche la durée de traitement
    #[arg(long)]
    time: bool,

    /// Couleurs du résumé: auto|always|never
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,

    /// Verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Silencieux (erreurs seulement)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

impl Cli {
    /// Sans sortie explicite, on imprime le texte.
    fn wants_text_stdout(&self) -> bool {
        self.disasm || (!self.json && !self.summary && self.emit.is_none() && self.out_dir.is_none())
    }
}

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        eprintln!("error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn real_main() -> Result<()> {
    let cli = Cli::parse();
    setup_colors(match cli.color {
        ColorMode::Auto => GlobalColorMode::Auto,
        ColorMode::Always => GlobalColorMode::Always,
        ColorMode::Never => GlobalColorMode::Never,
    });
    init_logging(cli.verbose, cli.quiet);
    debug!("{}", version_banner("luadis"));

    if cli.inputs.is_empty() {
        return Err(anyhow!("aucune entrée. Exemple: luadis a.luauc --line-info"));
    }
    let use_stdin = cli.inputs.iter().any(|i| i == "-");
    if use_stdin && cli.inputs.len() > 1 {
        return Err(anyhow!("'-' (stdin) doit être l’unique entrée"));
    }
    if use_stdin && cli.out_dir.is_some() {
        return Err(anyhow!("--out-dir n’a pas de sens avec stdin; utilise --emit"));
    }
    if cli.inputs.len() > 1 && cli.emit.is_some() {
        return Err(anyhow!("plusieurs entrées → utilise --out-dir au lieu de --emit"));
    }

    for input in &cli.inputs {
        let (bytes, name) = read_input(input, &cli)?;
        process_one(&bytes, &name, &cli)?;
    }
    Ok(())
}

fn read_input(arg: &str, cli: &Cli) -> Result<(Vec<u8>, Utf8PathBuf)> {
    let (raw, name) = if arg == "-" {
        (read_stdin_to_bytes()?, Utf8PathBuf::from(&cli.stdin_name))
    } else {
        let p = Utf8PathBuf::from(arg);
        (read_bytes(&p)?, p)
    };
    let bytes = if cli.base64 {
        decode_base64_payload(&raw).with_context(|| format!("entrée {name}"))?
    } else {
        raw
    };
    info!("{name}: {} octets", bytes.len());
    Ok((bytes, name))
}

fn process_one(bytes: &[u8], name: &Utf8Path, cli: &Cli) -> Result<()> {
    let timer = Timer::start();
    let module = luadis_core::decode(bytes).with_context(|| format!("chargement échoué: {name}"))?;

    if cli.strict {
        check_strict(&module).with_context(|| format!("--strict ({name})"))?;
    }

    if cli.summary {
        print_summary(&module, name);
    }

    if cli.wants_text_stdout() || cli.emit.is_some() || cli.out_dir.is_some() {
        let txt = luadis_core::render(&module, cli.line_info);
        if let Some(file) = &cli.emit {
            let out = to_utf8(file.clone())?;
            write_text(&out, &txt)?;
            eprintln!("disasm → {out}");
        } else if let Some(dir) = &cli.out_dir {
            let out = to_utf8(dir.clone())?.join(default_filename_with_ext(name, "disasm.txt"));
            write_text(&out, &txt)?;
            eprintln!("disasm → {out}");
        }
        if cli.wants_text_stdout() {
            print!("{txt}");
        }
    }

    if cli.json {
        let j = build_json(&module, name, cli.line_info);
        println!("{}", serde_json::to_string_pretty(&j)?);
    }

    if cli.time {
        eprintln!("{name}: {}", timer.pretty());
    }
    Ok(())
}

fn print_summary(module: &Module, name: &Utf8Path) {
    let s = ModuleSummary::of(module);
    let title = name.file_name().unwrap_or("<stdin>");
    let hdr = format!("== {title} ==");
    eprintln!("{}", hdr.paint(Color::Cyan).bold());
    eprintln!(
        "{} version={}, protos={}, main={}, instructions={} ({} mots), constants={}",
        "•".paint(Color::Blue),
        s.version, s.protos, s.main, s.instructions, s.words, s.constants
    );
    eprintln!(
        "{} line info: {}/{} protos, debug records ignorés: {}",
        "•".paint(Color::Blue),
        s.with_line_info, s.protos, s.debug_records
    );
    if s.unknown_opcodes > 0 {
        eprintln!(
            "{} {} opcode(s) inconnu(s), la suite peut être désalignée",
            "!".paint(Color::Yellow),
            s.unknown_opcodes
        );
    }
    if let Some(main) = module.main_proto() {
        eprintln!("{} entry: #{} `{}`", "•".paint(Color::Blue), module.main, main.debug_name);
    }
}

#[derive(Serialize)]
struct ModuleJson<'a> {
    file: &'a str,
    summary: ModuleSummary,
    protos: Vec<ProtoJson<'a>>,
}

#[derive(Serialize)]
struct ProtoJson<'a> {
    id: usize,
    name: &'a str,
    line_defined: u32,
    max_stack_size: u8,
    num_params: u8,
    num_upvalues: u8,
    is_vararg: u8,
    children: &'a [u32],
    constants: &'a [Constant],
    instructions: Vec<InsnJson>,
}

#[derive(Serialize)]
struct InsnJson {
    pc: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<i64>,
    op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    aux: Option<u32>,
    text: String,
}

fn build_json<'a>(module: &'a Module, name: &'a Utf8Path, line_info: bool) -> ModuleJson<'a> {
    let protos = module
        .protos
        .iter()
        .enumerate()
        .map(|(id, p)| ProtoJson {
            id,
            name: &p.debug_name,
            line_defined: p.line_defined,
            max_stack_size: p.max_stack_size,
            num_params: p.num_params,
            num_upvalues: p.num_upvalues,
            is_vararg: p.is_vararg,
            children: &p.children,
            constants: &p.constants,
            instructions: InsnIter::new(&p.code)
                .map(|d| InsnJson {
                    pc: d.pc,
                    line: p.lines.as_ref().map(|t| t.line(d.pc)),
                    op: d.info.map_or("UNKNOWN", |i| i.name),
                    aux: d.aux,
                    text: format_insn(p, &d, line_info),
                })
                .collect(),
        })
        .collect();

    ModuleJson { file: name.as_str(), summary: ModuleSummary::of(module), protos }
}
