use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::process;

use clap::Parser;

use blkdelta::{Bpatch, DontCareMap, PatchError};

#[derive(Parser, Debug)]
#[command(
    name = "blkpatch",
    version,
    about = "streaming XZ+VCDIFF block patcher",
    long_about = "blkpatch <source> <patch> <target>\n\
                  blkpatch <source> <sourcemap> <patch> <target> <targetmap>\n\n\
                  source and target may be the same file on disk for in-place \
                  A/B updates."
)]
struct Args {
    /// override the write queue depth (advanced; affects in-place safety)
    #[arg(long)]
    write_queue_length: Option<usize>,

    /// override the read cache size
    #[arg(long)]
    read_cache_length: Option<usize>,

    /// `source patch target`, or `source sourcemap patch target targetmap`
    paths: Vec<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

struct Paths {
    source: String,
    source_map: Option<String>,
    patch: String,
    target: String,
    target_map: Option<String>,
}

fn parse_positionals(paths: &[String]) -> blkdelta::Result<Paths> {
    match paths {
        [source, patch, target] => Ok(Paths {
            source: source.clone(),
            source_map: None,
            patch: patch.clone(),
            target: target.clone(),
            target_map: None,
        }),
        [source, source_map, patch, target, target_map] => Ok(Paths {
            source: source.clone(),
            source_map: Some(source_map.clone()),
            patch: patch.clone(),
            target: target.clone(),
            target_map: Some(target_map.clone()),
        }),
        _ => Err(PatchError::ArgError(
            "expected `source patch target` or `source sourcemap patch target targetmap`".into(),
        )),
    }
}

fn load_map(path: Option<&str>) -> blkdelta::Result<DontCareMap> {
    match path {
        None => Ok(DontCareMap::identity()),
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(PatchError::SourceIoError)?;
            DontCareMap::parse(&text)
        }
    }
}

/// Whether `a` and `b` name the same underlying file, which decides whether
/// the read-frontier guard needs to be armed.
fn same_file(a: &str, b: &str) -> io::Result<bool> {
    let a = std::fs::canonicalize(Path::new(a))?;
    let b = std::fs::canonicalize(Path::new(b))?;
    Ok(a == b)
}

fn run(args: Args) -> blkdelta::Result<()> {
    let paths = parse_positionals(&args.paths)?;

    let source_map = load_map(paths.source_map.as_deref())?;
    let target_map = load_map(paths.target_map.as_deref())?;

    let patch_file = File::open(&paths.patch).map_err(PatchError::SourceIoError)?;
    // relies on nothing else truncating/writing patch_file while it's mapped
    let patch_map = unsafe { memmap2::Mmap::map(&patch_file) }.map_err(PatchError::SourceIoError)?;

    let aliased = same_file(&paths.source, &paths.target).map_err(PatchError::SourceIoError)?;

    let (source_file, target_file) = if aliased {
        let rw = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&paths.source)
            .map_err(PatchError::SourceIoError)?;
        let clone = rw.try_clone().map_err(PatchError::TargetIoError)?;
        (rw, clone)
    } else {
        let source = File::open(&paths.source).map_err(PatchError::SourceIoError)?;
        let target = OpenOptions::new()
            .write(true)
            .open(&paths.target)
            .map_err(PatchError::TargetIoError)?;
        (source, target)
    };

    let mut bpatch = Bpatch::new(&patch_map[..]);
    if let Some(n) = args.write_queue_length {
        bpatch = bpatch.write_queue_length(n);
    }
    if let Some(n) = args.read_cache_length {
        bpatch = bpatch.read_cache_length(n);
    }

    bpatch.apply(source_file, &source_map, target_file, &target_map, aliased)
}
