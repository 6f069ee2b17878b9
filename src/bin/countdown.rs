//! Demo driver for the interpreter.
//!
//! Builds the counting-loop sample program (count 9 down to 1 through a
//! native callback, then return 42), and either disassembles it or runs it.
//!
//! # Usage
//! ```text
//! countdown [OPTIONS]
//! ```
//!
//! # Options
//! - `-d, --disassemble`: Print the disassembly and exit
//! - `--no-color`: Disassemble without ANSI colors
//! - `-v, --verbose`: Enable debug logging

use interp::log::{self, Level};
use interp::{Interpreter, Reg, VmError, Width};
use std::env;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut disassemble = false;
    let mut color = true;
    let mut level = Level::Info;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--disassemble" | "-d" => disassemble = true,
            "--no-color" => color = false,
            "--verbose" | "-v" => level = Level::Debug,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other => {
                eprintln!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
        i += 1;
    }

    log::init(level);

    let mut vm = Interpreter::new();
    if let Err(err) = build_program(&mut vm) {
        eprintln!("build error: {err}");
        process::exit(1);
    }

    if disassemble {
        let listing = if color {
            vm.disassemble()
        } else {
            vm.disassemble_plain()
        };
        print!("{listing}");
        return;
    }

    match vm.run() {
        Ok(value) => println!("program returned {value}"),
        Err(err) => {
            eprintln!("runtime error: {err}");
            process::exit(1);
        }
    }
}

/// The counting loop: `display` is called with 9, 8, .. 1, then the
/// program returns 42.
fn build_program(vm: &mut Interpreter) -> Result<(), VmError> {
    let r1 = Reg::new(1);
    let r2 = Reg::new(2);

    vm.create_move(r2, 9)?;
    let loop_start = vm.current_addr();
    vm.create_call("display")?;
    vm.create_sub(r2, r2, 1)?;
    vm.create_branch_ifnz(r2, loop_start)?;
    vm.create_move(r1, 42)?;
    vm.create_return();

    vm.defun("display", |vm| {
        println!("{}", vm.arg(0, Width::W64)?);
        Ok(())
    })
}

fn print_usage(program: &str) {
    eprintln!("Usage: {program} [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -d, --disassemble   Print the disassembly and exit");
    eprintln!("      --no-color      Disassemble without ANSI colors");
    eprintln!("  -v, --verbose       Enable debug logging");
    eprintln!("  -h, --help          Show this help");
}
