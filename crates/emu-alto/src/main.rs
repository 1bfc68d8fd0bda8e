//! `psim` — Alto simulator with an interactive microcode debugger.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process;

use emu_alto::debugger::{ANY_MPC, ANY_TASK};
use emu_alto::{Alto, AltoConfig, Breakpoint, Observable, StopReason, SystemType, UdpTransport};

struct CliArgs {
    constant_rom: Option<PathBuf>,
    microcode_rom: Option<PathBuf>,
    disk1: Option<PathBuf>,
    disk2: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        constant_rom: None,
        microcode_rom: None,
        disk1: None,
        disk2: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" => {
                i += 1;
                cli.constant_rom = args.get(i).map(PathBuf::from);
            }
            "-m" => {
                i += 1;
                cli.microcode_rom = args.get(i).map(PathBuf::from);
            }
            "-1" => {
                i += 1;
                cli.disk1 = args.get(i).map(PathBuf::from);
            }
            "-2" => {
                i += 1;
                cli.disk2 = args.get(i).map(PathBuf::from);
            }
            "--help" | "-h" => {
                eprintln!("Usage: psim -c <const.rom> -m <micro.rom> [-1 <disk1>] [-2 <disk2>]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  -c <file>   Constant ROM (256 LE words)");
                eprintln!("  -m <file>   Microcode ROM bank 0 (1024 LE longwords)");
                eprintln!("  -1 <file>   Pack image for drive 0");
                eprintln!("  -2 <file>   Pack image for drive 1");
                eprintln!("  --help      Show this help");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }
    cli
}

fn read_file(path: &PathBuf, what: &str) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Failed to read {what} {}: {e}", path.display());
            process::exit(1);
        }
    }
}

/// Debugger numbers are octal, per Alto convention.
fn parse_octal(s: &str) -> Option<u16> {
    u16::from_str_radix(s.trim_start_matches("0o"), 8).ok()
}

fn print_stop(alto: &Alto, reason: StopReason) {
    match reason {
        StopReason::CycleLimit => {}
        StopReason::Breakpoint(slot) => eprintln!("breakpoint {slot}"),
        StopReason::Fault(e) => eprintln!("CPU fault: {e}"),
    }
    eprintln!(
        "T{:02o} {}",
        alto.cpu.ctask,
        alto.disassemble_current()
    );
}

fn help() {
    eprintln!("Commands:");
    eprintln!("  s [n]              step n cycles (default 1)");
    eprintln!("  c [n]              continue up to n cycles (default 10000000)");
    eprintln!("  nt                 run to the next task switch");
    eprintln!("  r                  register dump");
    eprintln!("  x <path>           query one value (e.g. x task_mpc.4)");
    eprintln!("  d [mpc] [task]     disassemble 8 words (octal address)");
    eprintln!("  b <task> <mpc>     breakpoint (task 377 = any, mpc 177777 = any)");
    eprintln!("  bl                 list breakpoints");
    eprintln!("  bd <slot>          delete a breakpoint");
    eprintln!("  sc <file.png>      screenshot");
    eprintln!("  reset              reset the machine");
    eprintln!("  q                  quit");
}

fn main() {
    let cli = parse_args();

    let Some(ref const_path) = cli.constant_rom else {
        eprintln!("No constant ROM specified. Use -c <file> (see --help).");
        process::exit(1);
    };
    let Some(ref micro_path) = cli.microcode_rom else {
        eprintln!("No microcode ROM specified. Use -m <file> (see --help).");
        process::exit(1);
    };

    let config = AltoConfig {
        sys_type: SystemType::AltoII3KRam,
        constant_rom: read_file(const_path, "constant ROM"),
        microcode_rom0: read_file(micro_path, "microcode ROM"),
        microcode_rom1: None,
        disk1: cli.disk1.as_ref().map(|p| read_file(p, "disk image")),
        disk2: cli.disk2.as_ref().map(|p| read_file(p, "disk image")),
    };

    let transport = match UdpTransport::new() {
        Ok(t) => Box::new(t),
        Err(e) => {
            eprintln!("Failed to open the Ethernet transport: {e}");
            process::exit(1);
        }
    };

    let mut alto = match Alto::new(&config, transport) {
        Ok(alto) => alto,
        Err(e) => {
            eprintln!("Failed to build the machine: {e}");
            process::exit(1);
        }
    };
    eprintln!("Alto II ready; type ? for help.");

    let stdin = std::io::stdin();
    loop {
        eprint!("psim> ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = words.first() else {
            continue;
        };

        match command {
            "s" => {
                let n = words
                    .get(1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1u64);
                let reason = alto.run(n);
                print_stop(&alto, reason);
            }
            "c" => {
                let n = words
                    .get(1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10_000_000u64);
                let reason = alto.run(n);
                print_stop(&alto, reason);
            }
            "nt" => {
                let reason = alto.run_to_task_switch(10_000_000);
                print_stop(&alto, reason);
            }
            "r" => eprint!("{}", alto.register_dump()),
            "x" => match words.get(1).and_then(|p| alto.query(p)) {
                Some(value) => eprintln!("{value}"),
                None => eprintln!("unknown path"),
            },
            "d" => {
                let mpc = words.get(1).and_then(|s| parse_octal(s)).unwrap_or(alto.cpu.mpc);
                let task = words
                    .get(2)
                    .and_then(|s| parse_octal(s))
                    .map_or(alto.cpu.ctask, |t| t as u8);
                for offset in 0..8 {
                    eprintln!("{}", alto.disassemble(mpc.wrapping_add(offset), task));
                }
            }
            "b" => {
                let (Some(task), Some(mpc)) = (
                    words.get(1).and_then(|s| parse_octal(s)),
                    words.get(2).and_then(|s| parse_octal(s)),
                ) else {
                    eprintln!("usage: b <task> <mpc> (octal)");
                    continue;
                };
                let bp = Breakpoint {
                    task: if task == 0o377 { ANY_TASK } else { task as u8 },
                    mpc: if mpc == 0o177777 { ANY_MPC } else { mpc },
                    ..Breakpoint::any()
                };
                match alto.debugger.add(bp) {
                    Some(slot) => eprintln!("breakpoint {slot}"),
                    None => eprintln!("breakpoint table full"),
                }
            }
            "bl" => {
                for (slot, bp) in alto.debugger.iter() {
                    eprintln!(
                        "{slot:4}  task {:03o}  mpc {:06o}  {}",
                        bp.task,
                        bp.mpc,
                        if bp.enable { "enabled" } else { "disabled" }
                    );
                }
            }
            "bd" => {
                let removed = words
                    .get(1)
                    .and_then(|s| s.parse().ok())
                    .is_some_and(|slot| alto.debugger.remove(slot));
                if !removed {
                    eprintln!("no such breakpoint");
                }
            }
            #[cfg(feature = "native")]
            "sc" => {
                let Some(path) = words.get(1) else {
                    eprintln!("usage: sc <file.png>");
                    continue;
                };
                match emu_alto::capture::save_screenshot(&alto, std::path::Path::new(path)) {
                    Ok(()) => eprintln!("screenshot saved to {path}"),
                    Err(e) => eprintln!("screenshot failed: {e}"),
                }
            }
            "reset" => alto.reset(),
            "q" | "quit" => break,
            "?" | "help" => help(),
            other => eprintln!("unknown command {other} (? for help)"),
        }
    }
}
