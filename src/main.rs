//! aap interpreter and compiler: file or REPL.
//!
//! Usage:
//!   aap                       # runs main.aap when present, otherwise REPL
//!   aap <file.aap>            # interpret
//!   aap <file.aap> <out.s>    # compile the first named function
//!   aap --performance ...     # timing and memory report on stderr

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::process;
use std::time::{Duration, Instant};

use log::info;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use sysinfo::{Pid, System};

use aap::{displayable, entry_function, generate, parse, tokenize, Error, Interpreter, Value};

const DEFAULT_FILE: &str = "main.aap";

fn main() {
    env_logger::init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let performance = extract_flag(&mut args, "--performance");

    let code = match args.as_slice() {
        [] if Path::new(DEFAULT_FILE).exists() => interpret_file(DEFAULT_FILE, performance),
        [] => {
            repl();
            0
        }
        [path] => interpret_file(path, performance),
        [input, output] => compile_file(input, output, performance),
        _ => {
            eprintln!("usage: aap [--performance] [file.aap [out.s]]");
            2
        }
    };
    process::exit(code);
}

fn read_source(path: &str) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(src) => Some(src),
        Err(e) => {
            eprintln!("cannot read {}: {}", path, e);
            None
        }
    }
}

fn interpret_file(path: &str, performance: bool) -> i32 {
    let Some(src) = read_source(path) else {
        return 1;
    };
    info!("interpreting {}", path);
    let mut interp = Interpreter::new();
    if run_with_interp(&mut interp, &src, path, performance) {
        0
    } else {
        1
    }
}

fn compile_file(input: &str, output: &str, performance: bool) -> i32 {
    let Some(src) = read_source(input) else {
        return 1;
    };
    let perf_start = Instant::now();
    let mem_start = rss_kb();

    let t0 = Instant::now();
    let tokens = tokenize(&src);
    let program = match parse(&tokens) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", diagnostic(input, Error::from(e)));
            return 1;
        }
    };
    let parse_dur = t0.elapsed();
    let mem_after_parse = rss_kb();

    let t1 = Instant::now();
    let assembly = match entry_function(&program).and_then(generate) {
        Ok(asm) => asm,
        Err(e) => {
            eprintln!("{}", diagnostic(input, Error::from(e)));
            return 1;
        }
    };
    let codegen_dur = t1.elapsed();
    let mem_after_codegen = rss_kb();

    if let Err(e) = fs::write(output, assembly) {
        eprintln!("cannot write {}: {}", output, e);
        return 1;
    }
    println!("wrote {}", output);

    if performance {
        print_perf(
            perf_start.elapsed(),
            &[("parse", parse_dur), ("codegen", codegen_dur)],
            &[
                ("start", mem_start),
                ("parse", mem_after_parse),
                ("codegen", mem_after_codegen),
            ],
        );
    }
    0
}

fn repl() {
    println!("[ repl mode on ]\nfor quitting repl mode use \";q\" command");
    let mut interp = Interpreter::new();
    let mut rl = match Editor::<(), DefaultHistory>::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("repl error: {}", e);
            return;
        }
    };
    let history_path = repl_history_path();
    if let Some(ref path) = history_path {
        let _ = rl.load_history(path);
    }

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "> " } else { "... " };
        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                if buffer.is_empty() {
                    break;
                }
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("repl error: {}", e);
                break;
            }
        };
        let line = line.trim_end();

        if buffer.is_empty() && line.is_empty() {
            continue;
        }
        if buffer.is_empty() && line.starts_with(";q") {
            println!("Quitting repl mode");
            break;
        }
        let _ = rl.add_history_entry(line);
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(line);

        // Keep reading while the parser only ran out of input.
        let tokens = tokenize(&buffer);
        match parse(&tokens) {
            Err(e) if e.is_incomplete() => continue,
            Err(e) => eprintln!("{}", diagnostic("repl", Error::from(e))),
            Ok(program) => match interp.run(&program) {
                Ok(value) => print_result(value),
                Err(e) => eprintln!("{}", diagnostic("repl", Error::from(e))),
            },
        }
        buffer.clear();
    }

    if let Some(ref path) = history_path {
        let _ = rl.save_history(path);
    }
}

fn run_with_interp(interp: &mut Interpreter, src: &str, unit: &str, performance: bool) -> bool {
    let perf_start = Instant::now();
    let mem_start = rss_kb();

    let t0 = Instant::now();
    let tokens = tokenize(src);
    let program = match parse(&tokens) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", diagnostic(unit, Error::from(e)));
            return false;
        }
    };
    let parse_dur = t0.elapsed();
    let mem_after_parse = rss_kb();

    let t1 = Instant::now();
    let run_res = interp.run(&program);
    let run_dur = t1.elapsed();
    let mem_after_run = rss_kb();

    let ok = match run_res {
        Ok(value) => {
            print_result(value);
            true
        }
        Err(e) => {
            eprintln!("{}", diagnostic(unit, Error::from(e)));
            false
        }
    };

    if performance {
        print_perf(
            perf_start.elapsed(),
            &[("parse", parse_dur), ("runtime", run_dur)],
            &[
                ("start", mem_start),
                ("parse", mem_after_parse),
                ("runtime", mem_after_run),
            ],
        );
    }
    ok
}

/// Error line prefixed with the file (or `repl`) it came from.
fn diagnostic(unit: &str, error: impl fmt::Display) -> String {
    format!("{}: {}", unit, error)
}

fn print_result(value: Value) {
    let value = displayable(value);
    if !value.is_null() {
        println!("{}", value);
    }
}

fn repl_history_path() -> Option<String> {
    let home = env::var("HOME").ok()?;
    Some(format!("{}/.aap_history", home))
}

fn extract_flag(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(pos) = args.iter().position(|a| a == flag) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn rss_kb() -> Option<u64> {
    let pid = Pid::from_u32(process::id());
    let mut sys = System::new_all();
    sys.refresh_process(pid);
    // sysinfo reports bytes.
    sys.process(pid).map(|p| p.memory() / 1024)
}

fn print_perf(total: Duration, phases: &[(&str, Duration)], memory: &[(&str, Option<u64>)]) {
    eprintln!("[performance]");
    eprintln!("  total:     {}", fmt_duration(total));
    for (name, dur) in phases {
        eprintln!("  {:<10} {}", format!("{}:", name), fmt_duration(*dur));
    }
    if memory.iter().all(|(_, kb)| kb.is_some()) {
        eprintln!("  mem:");
        for (name, kb) in memory {
            if let Some(kb) = kb {
                eprintln!("    {:<8} {}", format!("{}:", name), fmt_mem(*kb));
            }
        }
    } else {
        eprintln!("  mem: unavailable");
    }
}

fn fmt_duration(d: Duration) -> String {
    let micros = d.as_micros();
    if micros < 1000 {
        format!("{}µs", micros)
    } else if micros < 1_000_000 {
        format!("{:.2}ms", micros as f64 / 1000.0)
    } else {
        format!("{:.2}s", micros as f64 / 1_000_000.0)
    }
}

fn fmt_mem(kb: u64) -> String {
    if kb < 1024 {
        return format!("{} KB", kb);
    }
    let mb = kb as f64 / 1024.0;
    format!("{:.2} MB", mb)
}
