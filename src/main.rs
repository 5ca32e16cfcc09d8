use clap::{ArgAction, Parser, Subcommand};
use spiritpak::container::{repack_files, unpack_files, unpack_files_with_manifest, RepackOptions};
use spiritpak::directory::{
    DirectoryLayout, SectorDirectory, DEFAULT_CD_SECTOR_BASE, DEFAULT_SECTORS_OFFSET, DEFAULT_SLOT_COUNT,
};
use spiritpak::manifest::{Entry, EntryBody, Manifest, MANIFEST_FILE};
use spiritpak::signature::classify;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "spiritpak", about = "Unpack and repack sector-indexed PlayStation asset containers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Byte offset of the sector directory inside the directory file
    #[arg(long, global = true, default_value_t = DEFAULT_SECTORS_OFFSET, value_parser = parse_offset)]
    sectors_offset: usize,
    /// Number of directory slots
    #[arg(long, global = true, default_value_t = DEFAULT_SLOT_COUNT)]
    slot_count: usize,
    /// Disc sector of the container's first sector
    #[arg(long, global = true, default_value_t = DEFAULT_CD_SECTOR_BASE)]
    cd_base: u32,
    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Unpack a container into a directory tree plus manifest
    Unpack {
        container: PathBuf,
        /// File holding the sector directory (the executable)
        #[arg(required_unless_present = "structure")]
        directory: Option<PathBuf>,
        #[arg(short = 'C', long, default_value = "extracted")]
        output_dir: PathBuf,
        /// Re-extract along an existing manifest instead of the directory
        #[arg(long)]
        structure: Option<PathBuf>,
    },
    /// Rebuild a container from an unpacked tree
    Repack {
        source:    PathBuf,
        /// Directory file to copy and patch
        directory: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Where to write the patched directory file
        #[arg(short, long)]
        patched: PathBuf,
        /// Do not append a zero dword after top-level packed containers
        #[arg(long)]
        no_terminator: bool,
    },
    /// Print the detected type of a file
    Classify {
        input: PathBuf,
        /// Classify as a container child (packed check suppressed)
        #[arg(long)]
        child: bool,
    },
    /// Dump the sector directory
    Sectors {
        directory: PathBuf,
    },
    /// Print the entry tree of an unpacked directory
    Tree {
        source: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let layout = DirectoryLayout {
        offset:         cli.sectors_offset,
        slot_count:     cli.slot_count,
        cd_sector_base: cli.cd_base,
    };

    match cli.command {

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { container, directory, output_dir, structure } => {
            let manifest = match (structure, directory) {
                (Some(structure), _) => {
                    unpack_files_with_manifest(&container, manifest_path(&structure), &output_dir)?
                }
                (None, Some(directory)) => unpack_files(&container, &directory, &output_dir, &layout)?,
                (None, None) => return Err("a directory file or --structure is required".into()),
            };
            println!("Unpacked {} entries from {} slots to {}",
                     manifest.entry_count(), manifest.entries.len(), output_dir.display());
        }

        // ── Repack ───────────────────────────────────────────────────────────
        Commands::Repack { source, directory, output, patched, no_terminator } => {
            let opts = RepackOptions { packed_terminator: !no_terminator };
            let repacked = repack_files(&source, &directory, &output, &patched, &layout, &opts)?;
            println!("Created: {} ({} bytes, {} slots)",
                     output.display(), repacked.container.len(), repacked.directory.len());
            println!("Patched: {}", patched.display());
        }

        // ── Classify ─────────────────────────────────────────────────────────
        Commands::Classify { input, child } => {
            let data = std::fs::read(&input)?;
            let tag = classify(&data, child);
            println!("{:<10} {:>10}  {}  {}",
                     tag, data.len(), hex::encode(&data[..data.len().min(16)]), input.display());
        }

        // ── Sectors ──────────────────────────────────────────────────────────
        Commands::Sectors { directory } => {
            let bytes = std::fs::read(&directory)?;
            let sectors = SectorDirectory::read(&bytes, &layout)?;
            println!("{:>5} {:>7} {:>8} {:>10} {:>8}", "Slot", "Section", "Sector", "Size", "CD");
            for (i, slot) in sectors.slots.iter().enumerate() {
                if slot.is_empty() {
                    println!("{:>5} {:>7} {:>8}", i, slot.section, "-");
                } else {
                    println!("{:>5} {:>7} {:>8} {:>10} {:>8}",
                             i, slot.section, slot.sector, slot.size, slot.sector.saturating_add(layout.cd_sector_base));
                }
            }
        }

        // ── Tree ─────────────────────────────────────────────────────────────
        Commands::Tree { source } => {
            let manifest = Manifest::load(manifest_path(&source))?;
            println!("Manifest v{}  created {}  container {} bytes",
                     manifest.version, manifest.created.to_rfc3339(), manifest.container_len);
            for record in &manifest.entries {
                if matches!(record.entry.body, EntryBody::Empty) {
                    continue;
                }
                print!("[{:>4}] sector {:>6}  ", record.slot, record.sector);
                print_entry(&record.entry, 0);
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn manifest_path(source: &Path) -> PathBuf {
    if source.is_dir() { source.join(MANIFEST_FILE) } else { source.to_path_buf() }
}

fn print_entry(entry: &Entry, depth: usize) {
    let name = if entry.is_container() { entry.dir_name() } else { entry.leaf_file_name() };
    println!("{:indent$}{:<24} {:>#8x} {:>8}", "", name, entry.offset, entry.length, indent = depth * 2);
    for child in entry.children() {
        print_entry(child, depth + 1);
    }
}

fn parse_offset(s: &str) -> Result<usize, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None      => s.parse(),
    };
    parsed.map_err(|e| format!("invalid offset '{s}': {e}"))
}
