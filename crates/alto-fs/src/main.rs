//! `par` — pack archiver for Alto filesystem images.
//!
//! Reads, checks and mutates Diablo pack images. Mutations only persist
//! with `-rw`.

use std::path::PathBuf;
use std::process;
use std::time::SystemTime;

use alto_fs::{AltoFs, alto_time_from_system};
use format_diablo::{DiabloImage, ImageFormat};

struct CliArgs {
    disk1: Option<PathBuf>,
    disk2: Option<PathBuf>,
    format: bool,
    boot: Option<String>,
    scavenge: bool,
    wipe_free: bool,
    list: Vec<String>,
    extract: Vec<(String, PathBuf)>,
    insert: Vec<(PathBuf, String)>,
    copy: Vec<(String, String)>,
    remove: Vec<String>,
    mkdir: Vec<String>,
    no_remove_underlying: bool,
    no_update_descriptor: bool,
    read_write: bool,
    input_bfs: bool,
    output_bfs: bool,
    verbose: bool,
}

fn usage() -> ! {
    eprintln!("Usage: par -1 <disk1> [-2 <disk2>] [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -1 <file>            First pack image");
    eprintln!("  -2 <file>            Second pack image");
    eprintln!("  -f                   Format fresh packs instead of loading");
    eprintln!("  -b <name>            Install <name> as the boot file");
    eprintln!("  -s                   Scavenge (rebuild from labels)");
    eprintln!("  -wfp                 Wipe (zero) the data of free pages");
    eprintln!("  -d <dir>             List a directory");
    eprintln!("  -e <name> <file>     Extract <name> into host <file>");
    eprintln!("  -i <file> <name>     Insert host <file> as <name>");
    eprintln!("  -c <src> <dst>       Copy a file within the image");
    eprintln!("  -r <name>            Remove <name>");
    eprintln!("  -m <dir>             Make a directory");
    eprintln!("  -nru                 Do not free a removed file's pages");
    eprintln!("  -nud                 Do not update the disk descriptor");
    eprintln!("  -rw                  Write changes back to the image files");
    eprintln!("  -ibfs / -obfs        Read / write the BFS container format");
    eprintln!("  -v                   Verbose");
    eprintln!("  --help               Show this help");
    process::exit(0);
}

fn missing_value(flag: &str) -> ! {
    eprintln!("Missing value for {flag}");
    process::exit(1);
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        disk1: None,
        disk2: None,
        format: false,
        boot: None,
        scavenge: false,
        wipe_free: false,
        list: Vec::new(),
        extract: Vec::new(),
        insert: Vec::new(),
        copy: Vec::new(),
        remove: Vec::new(),
        mkdir: Vec::new(),
        no_remove_underlying: false,
        no_update_descriptor: false,
        read_write: false,
        input_bfs: false,
        output_bfs: false,
        verbose: false,
    };

    let mut i = 1;
    let value = |i: &mut usize, flag: &str| -> String {
        *i += 1;
        args.get(*i).cloned().unwrap_or_else(|| missing_value(flag))
    };
    while i < args.len() {
        match args[i].as_str() {
            "-1" => cli.disk1 = Some(PathBuf::from(value(&mut i, "-1"))),
            "-2" => cli.disk2 = Some(PathBuf::from(value(&mut i, "-2"))),
            "-f" => cli.format = true,
            "-b" => cli.boot = Some(value(&mut i, "-b")),
            "-s" => cli.scavenge = true,
            "-wfp" => cli.wipe_free = true,
            "-d" => {
                let dir = value(&mut i, "-d");
                cli.list.push(dir);
            }
            "-e" => {
                let name = value(&mut i, "-e");
                let file = value(&mut i, "-e");
                cli.extract.push((name, PathBuf::from(file)));
            }
            "-i" => {
                let file = value(&mut i, "-i");
                let name = value(&mut i, "-i");
                cli.insert.push((PathBuf::from(file), name));
            }
            "-c" => {
                let src = value(&mut i, "-c");
                let dst = value(&mut i, "-c");
                cli.copy.push((src, dst));
            }
            "-r" => {
                let name = value(&mut i, "-r");
                cli.remove.push(name);
            }
            "-m" => {
                let dir = value(&mut i, "-m");
                cli.mkdir.push(dir);
            }
            "-nru" => cli.no_remove_underlying = true,
            "-nud" => cli.no_update_descriptor = true,
            "-rw" => cli.read_write = true,
            "-ibfs" => cli.input_bfs = true,
            "-obfs" => cli.output_bfs = true,
            "-v" => cli.verbose = true,
            "--help" | "-h" => usage(),
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }
    cli
}

fn load_image(path: &PathBuf, format: ImageFormat) -> Result<DiabloImage, String> {
    let data = std::fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
    DiabloImage::from_bytes(data, format).map_err(|e| format!("{}: {e}", path.display()))
}

fn main() {
    let cli = parse_args();

    let Some(ref disk1) = cli.disk1 else {
        eprintln!("No pack image specified. Use -1 <file> (see --help).");
        process::exit(1);
    };

    let mutating = cli.format
        || cli.scavenge
        || cli.wipe_free
        || cli.boot.is_some()
        || !cli.insert.is_empty()
        || !cli.copy.is_empty()
        || !cli.remove.is_empty()
        || !cli.mkdir.is_empty();
    if mutating && !cli.read_write {
        eprintln!("Mutating operations require -rw.");
        process::exit(1);
    }

    let in_format = if cli.input_bfs {
        ImageFormat::Bfs
    } else {
        ImageFormat::Raw
    };
    let out_format = if cli.output_bfs {
        ImageFormat::Bfs
    } else {
        ImageFormat::Raw
    };

    let mut failed = false;
    let mut report = |what: &str, result: Result<(), String>| {
        if let Err(e) = result {
            eprintln!("par: {what}: {e}");
            failed = true;
        }
    };

    let mut fs = if cli.format {
        let disks = 1 + u32::from(cli.disk2.is_some());
        match AltoFs::create(disks) {
            Ok(fs) => fs,
            Err(e) => {
                eprintln!("par: format: {e}");
                process::exit(1);
            }
        }
    } else {
        let mut disks = Vec::new();
        for path in [Some(disk1), cli.disk2.as_ref()].into_iter().flatten() {
            match load_image(path, in_format) {
                Ok(image) => disks.push(image),
                Err(e) => {
                    eprintln!("par: {e}");
                    process::exit(1);
                }
            }
        }
        match AltoFs::open(disks) {
            Ok(fs) => fs,
            Err(e) => {
                eprintln!("par: {e}");
                process::exit(1);
            }
        }
    };

    if cli.scavenge {
        match fs.scavenge() {
            Ok(r) => {
                if cli.verbose {
                    eprintln!(
                        "scavenge: {} files, {} pages freed, {} entries added, {} removed",
                        r.files_seen, r.pages_freed, r.entries_added, r.entries_removed
                    );
                }
            }
            Err(e) => report("scavenge", Err(e.to_string())),
        }
    }

    if cli.wipe_free {
        fs.wipe_free_pages();
        if cli.verbose {
            eprintln!("wiped free pages");
        }
    }

    for dir in &cli.mkdir {
        report(&format!("mkdir {dir}"), fs.make_directory(dir).map_err(|e| e.to_string()));
    }

    for (file, name) in &cli.insert {
        let result = std::fs::read(file)
            .map_err(|e| format!("{}: {e}", file.display()))
            .and_then(|content| {
                let mtime = std::fs::metadata(file)
                    .and_then(|m| m.modified())
                    .unwrap_or_else(|_| SystemTime::now());
                fs.insert_file(name, &content, alto_time_from_system(mtime))
                    .map_err(|e| e.to_string())
            });
        if result.is_ok() && cli.verbose {
            eprintln!("inserted {name}");
        }
        report(&format!("insert {name}"), result);
    }

    for (src, dst) in &cli.copy {
        report(
            &format!("copy {src} {dst}"),
            fs.copy_file(src, dst).map_err(|e| e.to_string()),
        );
    }

    if let Some(ref name) = cli.boot {
        report(
            &format!("install boot {name}"),
            fs.install_boot(name).map_err(|e| e.to_string()),
        );
    }

    for name in &cli.remove {
        report(
            &format!("remove {name}"),
            fs.remove_file(name, !cli.no_remove_underlying)
                .map_err(|e| e.to_string()),
        );
    }

    for (name, file) in &cli.extract {
        let result = fs
            .extract_file(name, false)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                std::fs::write(file, &content).map_err(|e| format!("{}: {e}", file.display()))
            });
        if result.is_ok() && cli.verbose {
            eprintln!("extracted {name} -> {}", file.display());
        }
        report(&format!("extract {name}"), result);
    }

    for dir in &cli.list {
        match fs.list_directory(dir) {
            Ok(entries) => {
                for entry in entries {
                    if entry.missing && !cli.verbose {
                        continue;
                    }
                    let marker = if entry.missing { " (missing)" } else { "" };
                    println!(
                        "{:<40} {:>8} bytes  sn {}{}",
                        entry.name, entry.length, entry.sn, marker
                    );
                }
            }
            Err(e) => report(&format!("list {dir}"), Err(e.to_string())),
        }
    }

    if mutating && cli.read_write {
        if !cli.no_update_descriptor {
            report("update descriptor", fs.update_descriptor().map_err(|e| e.to_string()));
        }
        let paths = [Some(disk1), cli.disk2.as_ref()];
        for (index, path) in paths.into_iter().flatten().enumerate() {
            let bytes = fs.disks()[index].to_bytes(out_format);
            report(
                &format!("write {}", path.display()),
                std::fs::write(path, bytes).map_err(|e| e.to_string()),
            );
        }
    }

    process::exit(i32::from(failed));
}
