// Command-line front end for deltapack.
//
// Thin wrappers over the library entry points: file patches (`diff`,
// `patch`), update packages (`pack`, `apply`), diagnostics (`inspect`) and
// build details (`config`).

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::bsdiff::{self, DiffOptions};
use crate::compress::BlockCompression;
use crate::delta::DeltaManager;
use crate::io::{diff_file, patch_file};
use crate::package::{
    self, CURRENT_FORMAT_VERSION, FileEntryKind, PackageAssembler, PackageLoader, PackageOptions,
};

const DEFAULT_LEVEL: u32 = 9;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Binary patches and update packages.
#[derive(Parser, Debug)]
#[command(
    name = "deltapack",
    version,
    about = "bsdiff patches and delta update packages",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Create a patch turning OLD into NEW.
    Diff(DiffArgs),
    /// Apply a patch to OLD.
    Patch(PatchArgs),
    /// Build an update package from a new tree (and optionally an old one).
    Pack(PackArgs),
    /// Materialize a package into a directory.
    Apply(ApplyArgs),
    /// Print information about a patch or a package.
    Inspect(InspectArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CompressionArg {
    Zlib,
    Lzma,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// Old file.
    #[arg(value_hint = ValueHint::FilePath)]
    old: PathBuf,

    /// New file.
    #[arg(value_hint = ValueHint::FilePath)]
    new: PathBuf,

    /// Patch output file.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Block compressor for the patch sections.
    #[arg(long, value_enum, default_value_t = CompressionArg::Zlib)]
    compression: CompressionArg,

    /// Zlib compression level (0-9).
    #[arg(long, short = 'l', value_parser = clap::value_parser!(u32).range(0..=9), default_value_t = DEFAULT_LEVEL)]
    level: u32,
}

#[derive(Args, Debug)]
struct PatchArgs {
    /// Old file.
    #[arg(value_hint = ValueHint::FilePath)]
    old: PathBuf,

    /// Patch file.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Reconstructed output file.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct PackArgs {
    /// Installed tree to diff against (omit for a full package).
    #[arg(long, value_hint = ValueHint::DirPath)]
    old: Option<PathBuf>,

    /// New tree.
    #[arg(value_hint = ValueHint::DirPath)]
    new: PathBuf,

    /// Package output file.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Package format version of the target clients.
    #[arg(long = "format-version", default_value_t = CURRENT_FORMAT_VERSION)]
    format_version: u32,

    /// Ship renamed files in full instead of as moves.
    #[arg(long = "no-moves")]
    no_moves: bool,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Installed tree the package was built against.
    #[arg(long, value_hint = ValueHint::DirPath)]
    old: Option<PathBuf>,

    /// Package file.
    #[arg(value_hint = ValueHint::FilePath)]
    package: PathBuf,

    /// Output directory.
    #[arg(value_hint = ValueHint::DirPath)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Patch or package file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

/// Global flags shared by every command.
#[derive(Debug, Clone, Copy)]
struct Globals {
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
}

impl Globals {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            force: cli.force,
            quiet: cli.quiet,
            verbose: cli.verbose.min(2),
            json_output: cli.json_output,
        }
    }

    fn report(&self) -> bool {
        self.verbose > 0 && !self.quiet
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("deltapack".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = Globals::from_cli(&cli);
        if let Cmd::Diff(args) = &cli.command {
            let _ = diff_options(args);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn diff_options(args: &DiffArgs) -> Result<DiffOptions, String> {
    let compression = match args.compression {
        CompressionArg::Zlib => BlockCompression::Zlib { level: args.level },
        #[cfg(feature = "lzma")]
        CompressionArg::Lzma => BlockCompression::Lzma,
        #[cfg(not(feature = "lzma"))]
        CompressionArg::Lzma => {
            return Err("lzma block compression not compiled in (enable the `lzma` feature)".into());
        }
    };
    Ok(DiffOptions { compression })
}

/// Refuse to clobber an existing output unless `-f` was given.
fn check_output(path: &Path, globals: &Globals) -> bool {
    if path.exists() && !globals.force {
        eprintln!(
            "deltapack: output file exists, use -f to overwrite: {}",
            path.display()
        );
        return false;
    }
    true
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("deltapack version {version} (Rust)");

    let lzma = cfg!(feature = "lzma") as u8;
    let parallel = cfg!(feature = "parallel") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("BLOCK_ZLIB=1");
    eprintln!("BLOCK_LZMA={lzma}");
    eprintln!("PARALLEL_RACE={parallel}");
    eprintln!("FORMAT_VERSION={CURRENT_FORMAT_VERSION}");
    eprintln!("DEFAULT_LEVEL={DEFAULT_LEVEL}");
    let codecs: Vec<String> = DeltaManager::default()
        .codecs()
        .map(|c| format!("{}(.{})", c.name(), c.extension()))
        .collect();
    eprintln!("CODECS={}", codecs.join(","));
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Diff / patch commands
// ---------------------------------------------------------------------------

fn cmd_diff(args: &DiffArgs, globals: &Globals) -> i32 {
    let opts = match diff_options(args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("deltapack: {e}");
            return 1;
        }
    };
    if !check_output(&args.patch, globals) {
        return 1;
    }

    let stats = match diff_file(&args.old, &args.new, &args.patch, &opts) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("deltapack: diff: {e}");
            return 1;
        }
    };

    if globals.report() {
        eprintln!(
            "deltapack: diff: old size: {}, new size: {}, patch size: {}",
            stats.old_size, stats.new_size, stats.patch_size
        );
    }
    if globals.json_output {
        let json = serde_json::json!({
            "command": "diff",
            "old_size": stats.old_size,
            "new_size": stats.new_size,
            "patch_size": stats.patch_size,
            "old_sha256": stats.old_sha256.to_string(),
            "new_sha256": stats.new_sha256.to_string(),
        });
        eprintln!("{json:#}");
    }
    0
}

fn cmd_patch(args: &PatchArgs, globals: &Globals) -> i32 {
    if !check_output(&args.output, globals) {
        return 1;
    }

    let stats = match patch_file(&args.old, &args.patch, &args.output) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("deltapack: patch: {e}");
            return 1;
        }
    };

    if globals.report() {
        eprintln!(
            "deltapack: patch: output size: {}, triples: {}",
            stats.output_size, stats.triples
        );
    }
    if globals.json_output {
        let json = serde_json::json!({
            "command": "patch",
            "old_size": stats.old_size,
            "patch_size": stats.patch_size,
            "output_size": stats.output_size,
            "triples": stats.triples,
            "output_sha256": stats.output_sha256.to_string(),
        });
        eprintln!("{json:#}");
    }
    0
}

// ---------------------------------------------------------------------------
// Pack / apply commands
// ---------------------------------------------------------------------------

fn cmd_pack(args: &PackArgs, globals: &Globals) -> i32 {
    if !check_output(&args.output, globals) {
        return 1;
    }

    let options = PackageOptions {
        format_version: args.format_version,
        detect_moves: !args.no_moves,
    };
    let assembler = PackageAssembler::new(options, DeltaManager::default());
    let stats = match assembler.assemble(args.old.as_deref(), &args.new, &args.output) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("deltapack: pack: {e}");
            return 1;
        }
    };

    if !globals.quiet {
        eprintln!(
            "deltapack: pack: {} files ({} new, {} moved, {} unchanged, {} delta), {} -> {} bytes",
            stats.files(),
            stats.new_files,
            stats.moved_files,
            stats.unchanged_files,
            stats.delta_files,
            stats.tree_size,
            stats.archive_size
        );
    }
    if globals.json_output {
        let json = serde_json::json!({
            "command": "pack",
            "format_version": options.format_version,
            "new_files": stats.new_files,
            "moved_files": stats.moved_files,
            "unchanged_files": stats.unchanged_files,
            "delta_files": stats.delta_files,
            "tree_size": stats.tree_size,
            "payload_size": stats.payload_size,
            "archive_size": stats.archive_size,
        });
        eprintln!("{json:#}");
    }
    0
}

fn cmd_apply(args: &ApplyArgs, globals: &Globals) -> i32 {
    let package = match PackageLoader::load(&args.package) {
        Ok(package) => package,
        Err(e) => {
            eprintln!("deltapack: {}: {e}", args.package.display());
            return 1;
        }
    };
    if !package.is_full() && args.old.is_none() {
        eprintln!("deltapack: apply: delta package needs --old <DIR>");
        return 1;
    }

    let manager = DeltaManager::default();
    let stats = match package::apply_package(&package, args.old.as_deref(), &args.output, &manager)
    {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("deltapack: apply: {e}");
            return 1;
        }
    };

    if globals.report() {
        eprintln!(
            "deltapack: apply: {} files, {} bytes written",
            stats.files(),
            stats.bytes_written
        );
    }
    if globals.json_output {
        let json = serde_json::json!({
            "command": "apply",
            "new_files": stats.new_files,
            "moved_files": stats.moved_files,
            "unchanged_files": stats.unchanged_files,
            "delta_files": stats.delta_files,
            "bytes_written": stats.bytes_written,
        });
        eprintln!("{json:#}");
    }
    0
}

// ---------------------------------------------------------------------------
// Inspect command
// ---------------------------------------------------------------------------

fn cmd_inspect(args: &InspectArgs, globals: &Globals) -> i32 {
    let data = match fs::read(&args.input) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("deltapack: {}: {e}", args.input.display());
            return 1;
        }
    };

    if data.starts_with(&GZIP_MAGIC) {
        inspect_package(&data, globals)
    } else {
        inspect_patch(&data, globals)
    }
}

fn inspect_patch(data: &[u8], globals: &Globals) -> i32 {
    let (header, triples) = match bsdiff::read_control_block(data) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("deltapack: invalid patch: {e}");
            return 1;
        }
    };

    let magic = String::from_utf8_lossy(&header.magic);
    let copied: i64 = triples.iter().map(|t| t.copy_len).sum();
    let inserted: i64 = triples.iter().map(|t| t.extra_len).sum();

    if globals.json_output {
        let list: Vec<_> = triples
            .iter()
            .map(|t| serde_json::json!([t.copy_len, t.extra_len, t.seek]))
            .collect();
        let json = serde_json::json!({
            "kind": "patch",
            "magic": magic,
            "control_len": header.control_len,
            "diff_len": header.diff_len,
            "new_size": header.new_size,
            "triples": list,
        });
        println!("{json:#}");
        return 0;
    }

    println!("magic:        {magic}");
    println!("control len:  {}", header.control_len);
    println!("diff len:     {}", header.diff_len);
    println!("new size:     {}", header.new_size);
    println!("triples:      {}", triples.len());
    println!("copied bytes: {copied}");
    println!("extra bytes:  {inserted}");
    if globals.verbose > 0 {
        for (i, t) in triples.iter().enumerate() {
            println!("  {i:6}: copy {:10} extra {:10} seek {:+}", t.copy_len, t.extra_len, t.seek);
        }
    }
    0
}

fn inspect_package(data: &[u8], globals: &Globals) -> i32 {
    let package = match PackageLoader::read(data) {
        Ok(package) => package,
        Err(e) => {
            eprintln!("deltapack: invalid package: {e}");
            return 1;
        }
    };

    if globals.json_output {
        let entries: Vec<_> = package
            .entries()
            .iter()
            .map(|e| {
                let mut value = serde_json::json!({
                    "path": e.path,
                    "kind": e.kind.label(),
                    "size": e.size,
                    "sha256": e.hash.to_string(),
                });
                match &e.kind {
                    FileEntryKind::Moved { previous } => value["previous"] = previous.as_str().into(),
                    FileEntryKind::Delta { extension } => value["codec"] = extension.as_str().into(),
                    FileEntryKind::New | FileEntryKind::Unchanged => {}
                }
                value
            })
            .collect();
        let json = serde_json::json!({ "kind": "package", "entries": entries });
        println!("{json:#}");
        return 0;
    }

    for e in package.entries() {
        let detail = match &e.kind {
            FileEntryKind::Moved { previous } => format!(" <- {previous}"),
            FileEntryKind::Delta { extension } => format!(" [{extension}, {} bytes]", e.body().len()),
            FileEntryKind::New | FileEntryKind::Unchanged => String::new(),
        };
        println!("{:9} {:>12} {} {}{detail}", e.kind.label(), e.size, e.hash, e.path);
    }
    if globals.report() {
        eprintln!(
            "deltapack: {} entries ({} new, {} moved, {} unchanged, {} delta)",
            package.len(),
            package.new_files().count(),
            package.moved_files().count(),
            package.unchanged_files().count(),
            package.delta_files().count()
        );
    }
    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run() -> ! {
    let cli = Cli::parse();
    let globals = Globals::from_cli(&cli);

    let default_filter = match (globals.quiet, globals.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let exit_code = match &cli.command {
        Cmd::Diff(args) => cmd_diff(args, &globals),
        Cmd::Patch(args) => cmd_patch(args, &globals),
        Cmd::Pack(args) => cmd_pack(args, &globals),
        Cmd::Apply(args) => cmd_apply(args, &globals),
        Cmd::Inspect(args) => cmd_inspect(args, &globals),
        Cmd::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let argv: Vec<String> = std::iter::once("deltapack".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        Cli::try_parse_from(argv).expect("cli parse failed")
    }

    #[test]
    fn diff_subcommand_maps_correctly() {
        let cli = parse(&["diff", "--level", "5", "old.bin", "new.bin", "out.bsdiff"]);
        let Cmd::Diff(args) = &cli.command else {
            panic!("expected diff");
        };
        assert_eq!(args.old, PathBuf::from("old.bin"));
        assert_eq!(args.patch, PathBuf::from("out.bsdiff"));
        assert_eq!(
            diff_options(args).unwrap().compression,
            BlockCompression::Zlib { level: 5 }
        );
    }

    #[cfg(feature = "lzma")]
    #[test]
    fn diff_lzma_compression() {
        let cli = parse(&["diff", "--compression", "lzma", "a", "b", "c"]);
        let Cmd::Diff(args) = &cli.command else {
            panic!("expected diff");
        };
        assert_eq!(diff_options(args).unwrap().compression, BlockCompression::Lzma);
    }

    #[test]
    fn level_out_of_range_rejected() {
        let argv = ["deltapack", "diff", "--level", "10", "a", "b", "c"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn pack_subcommand_maps_correctly() {
        let cli = parse(&["-f", "pack", "--old", "v1", "--format-version", "1", "v2", "up.pkg"]);
        assert!(cli.force);
        let Cmd::Pack(args) = &cli.command else {
            panic!("expected pack");
        };
        assert_eq!(args.old.as_deref(), Some(Path::new("v1")));
        assert_eq!(args.format_version, 1);
        assert!(!args.no_moves);
    }

    #[test]
    fn global_flags() {
        let cli = parse(&["inspect", "p.bsdiff", "-vv", "--json"]);
        let globals = Globals::from_cli(&cli);
        assert_eq!(globals.verbose, 2);
        assert!(globals.json_output);
        assert!(globals.report());
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let argv = ["deltapack", "-q", "-v", "config"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn fuzz_parse_never_panics() {
        fuzz_try_parse_args(&["diff".into(), "--compression".into(), "zip".into()]);
        fuzz_try_parse_args(&[]);
    }
}
