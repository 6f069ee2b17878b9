//! Interpreter benchmark binary.
//!
//! Measures build + execution time for representative programs.
//! Run with: `cargo run --release --bin bench`

use interp::{Interpreter, Reg, VmError, Word};
use std::time::{Duration, Instant};

struct BenchResult {
    name: &'static str,
    iterations: u64,
    total: Duration,
}

impl BenchResult {
    fn per_iteration(&self) -> Duration {
        self.total / self.iterations.max(1) as u32
    }
}

/// Builds once, runs `iterations` times, and checks the return value every
/// time so the work can't be optimized into nothing.
fn bench(
    name: &'static str,
    iterations: u64,
    build: fn(&mut Interpreter) -> Result<(), VmError>,
    expected: Word,
) -> BenchResult {
    let mut vm = Interpreter::new();
    build(&mut vm).expect("build failed");

    let start = Instant::now();
    for _ in 0..iterations {
        let value = vm.run().expect("run failed");
        assert_eq!(value, expected, "{name} returned a wrong value");
    }
    BenchResult {
        name,
        iterations,
        total: start.elapsed(),
    }
}

/// Count 10_000 down to zero with a register-immediate subtract.
fn countdown(vm: &mut Interpreter) -> Result<(), VmError> {
    let r1 = Reg::new(1);
    let r2 = Reg::new(2);
    vm.create_move(r2, 10_000)?;
    let loop_start = vm.current_addr();
    vm.create_sub(r2, r2, 1)?;
    vm.create_branch_ifnz(r2, loop_start)?;
    vm.create_move(r1, 7)?;
    vm.create_return();
    Ok(())
}

/// A straight-line mix of the arithmetic opcodes.
fn arithmetic(vm: &mut Interpreter) -> Result<(), VmError> {
    let r1 = Reg::new(1);
    let r2 = Reg::new(2);
    let r3 = Reg::new(3);
    vm.create_move(r2, 1)?;
    vm.create_move(r3, 2)?;
    for _ in 0..200 {
        vm.create_add(r2, r2, r3)?;
        vm.create_muli(r2, r2, 3)?;
        vm.create_shift_right_logical(r2, r2, 2)?;
        vm.create_remu(r2, r2, 1_000_003)?;
    }
    vm.create_move(r1, r2)?;
    vm.create_return();
    Ok(())
}

/// Call a two-instruction bytecode function in a loop.
fn calls(vm: &mut Interpreter) -> Result<(), VmError> {
    let r1 = Reg::new(1);
    let r2 = Reg::new(2);
    let r3 = Reg::new(3);
    vm.create_move(r2, 1_000)?;
    let loop_start = vm.current_addr();
    vm.create_call("touch")?;
    vm.create_sub(r2, r2, 1)?;
    vm.create_branch_ifnz(r2, loop_start)?;
    vm.create_move(r1, r3)?;
    vm.create_return();

    vm.create_function("touch")?;
    vm.create_alloca(16);
    vm.create_add(r3, r2, 1)?;
    vm.create_return();
    Ok(())
}

fn main() {
    let results = [
        bench("countdown 10k", 200, countdown, 7),
        bench("arithmetic mix", 500, arithmetic, expected_arithmetic()),
        bench("bytecode calls 1k", 200, calls, 2),
    ];

    println!(
        "{:<20} {:>10} {:>14} {:>14}",
        "name", "iters", "total", "per-iter"
    );
    for result in &results {
        println!(
            "{:<20} {:>10} {:>12.2?} {:>12.2?}",
            result.name,
            result.iterations,
            result.total,
            result.per_iteration()
        );
    }
}

/// The arithmetic-mix program computed in plain Rust.
fn expected_arithmetic() -> Word {
    let mut value: Word = 1;
    let addend: Word = 2;
    for _ in 0..200 {
        value = value.wrapping_add(addend);
        value = (value as i64).wrapping_mul(3) as Word;
        value >>= 2;
        value %= 1_000_003;
    }
    value
}
