//! Driver: loads a Forth kernel image, wires it into a fresh [`Machine`],
//! and either dumps it or runs it to a halt.
//!
//! Grounded directly in `original_source/sim.c::main`'s flag set, default
//! values, and loop structure, with CLI parsing in `amiga-runner::main`'s
//! manual-loop idiom.

use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::process;

use arm_cpu::cpu::{Cpu, StepOutcome};
use arm_cpu::host_io::SearchPath;
use arm_disasm::Annotations;
use format_forth_image::{ParsedImage, DEFAULT_LOAD_BASE, DEFAULT_REGION_SIZE};
use sim_core::registers::{FLAGS_REG, REGISTER_NAMES};
use sim_core::{flags, Machine};

/// Guest region reserved for `readfile` blobs, directly above the image
/// region. `io.c`'s bump allocator never reclaims within a run, so a
/// generous size here just bounds how many/how large the files a session
/// can load are.
const FILE_REGION_SIZE: u32 = 8 * 1024 * 1024;

struct CliArgs {
    image_path: PathBuf,
    search_path: PathBuf,
    dump: bool,
    backtrace: bool,
    quiet: bool,
    undo_disabled: bool,
    interactive: bool,
}

fn print_usage_and_exit(code: i32) -> ! {
    eprintln!("Usage: muforth-runner [-dqvu] [-no-undo] [-b] [-f filename] [-p path]");
    eprintln!();
    eprintln!("Simulates an ARM processor hosting a FORTH dictionary image.");
    eprintln!();
    eprintln!("  -f filename   Name of the FORTH dictionary to load [default: FORTH.img]");
    eprintln!("  -p path       Search path for FORTH files to load (or MUFORTH_PATH env var)");
    eprintln!("  -d            Dump the dictionary as assembly and FORTH words");
    eprintln!("  -b            Print a backtrace after every step");
    eprintln!("  -q            Quiet output; don't list each instruction and register file");
    eprintln!("  -v            Verbose output; list each instruction and register file");
    eprintln!("  -no-undo      Don't enable the undo logic [default]");
    eprintln!("  -u            Enable the undo logic");
    eprintln!("  -i            Interactive mode; also enables verbose output and undo");
    eprintln!("  -h, --help    Show this help");
    process::exit(code);
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();

    let mut image_path = PathBuf::from("FORTH.img");
    let mut search_path = std::env::var_os("MUFORTH_PATH").map_or_else(
        || PathBuf::from("."),
        PathBuf::from,
    );
    let mut dump = false;
    let mut backtrace = false;
    let mut quiet = true;
    let mut undo_disabled = true;
    let mut interactive = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-f" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    print_usage_and_exit(1);
                };
                image_path = PathBuf::from(value);
            }
            "-p" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    print_usage_and_exit(1);
                };
                search_path = PathBuf::from(value);
            }
            "-d" => dump = true,
            "-b" => backtrace = true,
            "-q" => quiet = true,
            "-v" => quiet = false,
            "-no-undo" => undo_disabled = true,
            "-u" => undo_disabled = false,
            "-i" => {
                interactive = true;
                undo_disabled = false;
                quiet = false;
            }
            "-h" | "--help" => print_usage_and_exit(0),
            _ => print_usage_and_exit(1),
        }
        i += 1;
    }

    CliArgs {
        image_path,
        search_path: canonicalise_path(&search_path),
        dump,
        backtrace,
        quiet,
        undo_disabled,
        interactive,
    }
}

/// Strip one trailing `/`, matching `sim.c::canonicalise_path`. A bare
/// `/` is left alone.
fn canonicalise_path(path: &Path) -> PathBuf {
    let s = path.to_string_lossy().into_owned();
    if s.len() > 1 && s.ends_with('/') {
        PathBuf::from(&s[..s.len() - 1])
    } else {
        PathBuf::from(s)
    }
}

fn fatal(message: &str) -> ! {
    eprintln!("muforth-runner: {message}");
    process::exit(1);
}

fn print_registers(machine: &Machine) {
    let regs = machine.registers();
    for (i, name) in REGISTER_NAMES.iter().enumerate() {
        print!("{name:>5}: {:08x}", regs.get(i));
        if i % 4 == 3 {
            println!();
        } else {
            print!("   ");
        }
    }
    let f = regs.get(FLAGS_REG);
    let bit = |set: u32, upper: char, lower: char| if flags::is_set(f, set) { upper } else { lower };
    println!(
        "Flags: {}{}{}{}",
        bit(flags::N, 'N', 'n'),
        bit(flags::C, 'C', 'c'),
        bit(flags::V, 'V', 'v'),
        bit(flags::Z, 'Z', 'z'),
    );
}

/// `forth_backtrace()` has no body in the kept source (`sim.h` only
/// declares it). Walks the Forth return stack from the current `rp`
/// (register 5) up to `rp0`, the stack's cold value recorded in the
/// parameter block at load time, printing each saved return address. See
/// DESIGN.md's Open Question decision for why this shape was chosen.
fn print_backtrace(machine: &Machine, load_base: u32, annotations: &Annotations) {
    const RP: usize = 5;
    let rp0 = machine
        .memory()
        .load_word(format_forth_image::param_block::field_addr(
            load_base,
            format_forth_image::param_block::RP0,
        ));
    let rp = machine.registers().get(RP);
    if rp > rp0 {
        return;
    }
    println!("Backtrace:");
    let mut cursor = rp;
    while cursor < rp0 {
        let addr = machine.memory().load_word(cursor);
        match annotations.name_for(addr) {
            Some(name) => println!("  {cursor:08x}: {addr:08x} ; {name}"),
            None => println!("  {cursor:08x}: {addr:08x}"),
        }
        cursor = cursor.wrapping_add(4);
    }
}

fn run_dump(machine: &Machine, bytes: &[u8], load_base: u32) {
    let image = match ParsedImage::parse(bytes) {
        Ok(image) => image,
        Err(e) => fatal(&e.to_string()),
    };
    let skip = format_forth_image::param_block::WORD_COUNT;
    let n_words = image.word_count().saturating_sub(skip);
    let addr = format_forth_image::param_block::field_addr(load_base, skip);

    let annotations = Annotations::default();
    for line in forth_inspect::dump(machine, addr, n_words, &annotations) {
        println!("{line}");
    }
}

fn run_loop(cpu: &mut Cpu, cli: &CliArgs, load_base: u32) {
    let annotations = Annotations::default();

    if !cli.quiet {
        print_registers(&cpu.machine);
    }

    loop {
        if !cli.quiet {
            let pc = cpu.machine.registers().pc();
            if cpu.machine.memory().range_valid(pc, 4) {
                let instr = cpu.machine.memory().load_word(pc);
                let line = arm_disasm::disassemble(&cpu.machine, pc, instr, &annotations);
                println!("{pc:08x}: {instr:08x}  {line}");
            }
        }

        if cli.interactive {
            print!("SIM> ");
            let _ = io::stdout().flush();
            let mut command = String::new();
            let _ = io::stdin().read_line(&mut command);
        }

        match cpu.step() {
            Ok(StepOutcome::Continue) => {}
            Ok(StepOutcome::Halted) => break,
            Err(e) => fatal(&e.to_string()),
        }

        if cli.backtrace {
            print_backtrace(&cpu.machine, load_base, &annotations);
        }
        if !cli.quiet {
            print_registers(&cpu.machine);
        }
    }

    println!("Simulator terminated");
}

fn main() {
    let cli = parse_args();

    let load_base = DEFAULT_LOAD_BASE;
    let mut machine = Machine::new();
    machine
        .memory_mut()
        .register_region("guest", load_base, DEFAULT_REGION_SIZE)
        .unwrap_or_else(|e| fatal(&e));
    let file_region_base = load_base.wrapping_add(DEFAULT_REGION_SIZE);
    machine
        .memory_mut()
        .register_region("files", file_region_base, FILE_REGION_SIZE)
        .unwrap_or_else(|e| fatal(&e));

    let bytes = std::fs::read(&cli.image_path).unwrap_or_else(|e| {
        fatal(&format!("couldn't read {}: {e}", cli.image_path.display()))
    });

    let loaded = format_forth_image::load(&mut machine, &bytes, load_base, DEFAULT_REGION_SIZE)
        .unwrap_or_else(|e| fatal(&e.to_string()));

    machine.set_journal_disabled(true);
    machine.write_register(sim_core::PC, loaded.entry);
    machine.write_register(0, load_base);
    machine.set_journal_disabled(cli.undo_disabled);

    if cli.dump {
        run_dump(&machine, &bytes, load_base);
        return;
    }

    let mut cpu = Cpu::new(machine, SearchPath::new(cli.search_path.clone()), file_region_base);
    run_loop(&mut cpu, &cli, load_base);
}
