//! End-to-end execution tests: whole programs built through the public
//! builder API and run to completion.

use super::Interpreter;
use crate::errors::VmError;
use crate::operand::{Reg, Width, Word};
use std::cell::RefCell;
use std::rc::Rc;

fn r(index: u8) -> Reg {
    Reg::new(index)
}

// ==================== Scenarios ====================

#[test]
fn counting_loop_drives_a_native_callback() {
    let mut interp = Interpreter::new();
    let seen: Rc<RefCell<Vec<Word>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);

    interp.create_move(r(2), 9).unwrap();
    let loop_start = interp.current_addr();
    interp.create_call("display").unwrap();
    interp.create_sub(r(2), r(2), 1).unwrap();
    interp.create_branch_ifnz(r(2), loop_start).unwrap();
    interp.create_move(r(1), 42).unwrap();
    interp.create_return();
    interp
        .defun("display", move |interp| {
            sink.borrow_mut().push(interp.arg(0, Width::W64)?);
            Ok(())
        })
        .unwrap();

    assert_eq!(interp.run().unwrap(), 42);
    assert_eq!(*seen.borrow(), vec![9, 8, 7, 6, 5, 4, 3, 2, 1]);
}

#[test]
fn arithmetic_chain() {
    let mut interp = Interpreter::new();
    interp.create_move(r(2), 1).unwrap();
    interp.create_move(r(3), 2).unwrap();
    interp.create_add(r(2), r(2), r(3)).unwrap();
    interp.create_move(r(3), 3).unwrap();
    interp.create_muli(r(2), r(2), r(3)).unwrap();
    interp.create_move(r(1), r(2)).unwrap();
    interp.create_return();
    assert_eq!(interp.run().unwrap(), 9);
}

#[test]
fn xchg_truncates_through_a_narrow_alias() {
    let mut interp = Interpreter::new();
    interp.create_move(r(2), (1u64 << 38) + 35).unwrap();
    interp
        .create_xchg(r(2), Reg::sized(2, Width::W8))
        .unwrap();
    interp.create_return();
    interp.run().unwrap();
    // The wide read swaps in the 8-bit read's zero-extended value.
    assert_eq!(interp.reg(r(2)).unwrap(), 35);
}

#[test]
fn direct_and_frame_relative_memory() {
    let mut interp = Interpreter::new();
    let global = interp.create_global(8).unwrap();
    interp.create_move(r(4), 34).unwrap();
    interp.create_store(global, r(4)).unwrap();
    interp.create_load(r(5), global).unwrap();

    let local = interp.create_alloca(8);
    interp.create_move(r(4), 35).unwrap();
    interp.create_store_rel(r(0), local, r(4)).unwrap();
    interp.create_load_rel(r(6), r(0), local).unwrap();
    interp.create_return();

    interp.run().unwrap();
    assert_eq!(interp.reg(r(5)).unwrap(), 34);
    assert_eq!(interp.reg(r(6)).unwrap(), 35);
}

#[test]
fn nested_bytecode_calls() {
    let mut interp = Interpreter::new();
    interp.create_move(r(2), 7).unwrap();
    interp.create_call("square").unwrap();
    interp.create_move(r(1), r(2)).unwrap();
    interp.create_return();

    interp.create_function("square").unwrap();
    interp.create_mulu(r(2), r(2), r(2)).unwrap();
    interp.create_return();

    assert_eq!(interp.run().unwrap(), 49);
}

#[test]
fn unbound_forward_reference_names_the_function() {
    let mut interp = Interpreter::new();
    interp.create_call("missing").unwrap();
    interp.create_return();
    let err = interp.run().unwrap_err();
    assert!(matches!(err, VmError::UndefinedFunction { .. }));
    assert!(err.to_string().contains("missing"));
}

// ==================== Frame discipline ====================

#[test]
fn frames_balance_across_bytecode_calls() {
    let mut interp = Interpreter::new();
    let observed: Rc<RefCell<Vec<(Word, Word)>>> = Rc::new(RefCell::new(Vec::new()));
    let probe_log = Rc::clone(&observed);

    interp.create_move(r(3), 5).unwrap();
    interp.create_call("probe").unwrap();
    interp.create_call("work").unwrap();
    interp.create_call("probe").unwrap();
    interp.create_move(r(1), r(5)).unwrap();
    interp.create_return();

    interp.create_function("work").unwrap();
    interp.create_alloca(16);
    interp.create_move(r(5), 77).unwrap();
    interp.create_return();

    interp
        .defun("probe", move |interp| {
            probe_log
                .borrow_mut()
                .push((interp.memory.sp, interp.memory.stack_base));
            Ok(())
        })
        .unwrap();

    assert_eq!(interp.run().unwrap(), 77);
    let observed = observed.borrow();
    // sp and the frame base are exactly restored after the call returns.
    assert_eq!(observed.len(), 2);
    assert_eq!(observed[0], observed[1]);
    // Registers changed only where the callee wrote.
    assert_eq!(interp.reg(r(3)).unwrap(), 5);
    assert_eq!(interp.reg(r(5)).unwrap(), 77);
}

#[test]
fn runaway_recursion_overflows_the_stack() {
    let mut interp = Interpreter::with_max_memory(4096);
    interp.create_call("spin").unwrap();
    interp.create_return();
    interp.create_function("spin").unwrap();
    interp.create_call("spin").unwrap();
    interp.create_return();
    assert!(matches!(interp.run(), Err(VmError::StackOverflow)));
}

#[test]
fn missing_return_runs_off_the_bytecode() {
    let mut interp = Interpreter::new();
    interp.create_move(r(1), 1).unwrap();
    assert!(matches!(interp.run(), Err(VmError::IpOutOfBounds { .. })));
}

// ==================== Width semantics ====================

#[test]
fn mov_narrow_destination_truncates() {
    let mut interp = Interpreter::new();
    interp
        .create_move(Reg::sized(2, Width::W8), 0x1FF)
        .unwrap();
    interp.create_return();
    interp.run().unwrap();
    assert_eq!(interp.reg(r(2)).unwrap(), 0xFF);
}

#[test]
fn jnz_condition_honors_the_size_tag() {
    let mut interp = Interpreter::new();
    // 258 counts down until its low byte hits zero at 256.
    interp.create_move(r(2), 258).unwrap();
    let loop_start = interp.current_addr();
    interp.create_sub(r(2), r(2), 1).unwrap();
    interp
        .create_branch_ifnz(Reg::sized(2, Width::W8), loop_start)
        .unwrap();
    interp.create_move(r(1), r(2)).unwrap();
    interp.create_return();
    assert_eq!(interp.run().unwrap(), 256);
}

#[test]
fn narrow_memory_roundtrip_preserves_neighbors() {
    let mut interp = Interpreter::new();
    let global = interp.create_global(8).unwrap();
    interp.create_move(r(2), Word::MAX).unwrap();
    interp.create_store(global, r(2)).unwrap();
    interp.create_move(r(3), 0).unwrap();
    interp
        .create_store(global, Reg::sized(3, Width::W16))
        .unwrap();
    interp.create_load(r(4), global).unwrap();
    interp
        .create_load(Reg::sized(5, Width::W16), global)
        .unwrap();
    interp.create_return();
    interp.run().unwrap();
    assert_eq!(interp.reg(r(4)).unwrap(), 0xFFFF_FFFF_FFFF_0000);
    assert_eq!(interp.reg(r(5)).unwrap(), 0);
}

// ==================== Signed and shift semantics ====================

#[test]
fn signed_arithmetic() {
    let mut interp = Interpreter::new();
    interp.create_move(r(2), (-9i64) as Word).unwrap();
    interp.create_divi(r(3), r(2), 3).unwrap();
    interp.create_muli(r(4), r(2), 2).unwrap();
    interp.create_remi(r(5), r(2), 4).unwrap();
    interp.create_return();
    interp.run().unwrap();
    assert_eq!(interp.reg(r(3)).unwrap() as i64, -3);
    assert_eq!(interp.reg(r(4)).unwrap() as i64, -18);
    assert_eq!(interp.reg(r(5)).unwrap() as i64, -1);
}

#[test]
fn shifts_mask_the_count_modulo_64() {
    let mut interp = Interpreter::new();
    interp.create_move(r(2), 0x10).unwrap();
    interp.create_shift_left(r(3), r(2), 64).unwrap();
    interp.create_shift_right_logical(r(4), r(2), 68).unwrap();
    interp.create_return();
    interp.run().unwrap();
    assert_eq!(interp.reg(r(3)).unwrap(), 0x10);
    assert_eq!(interp.reg(r(4)).unwrap(), 0x1);
}

#[test]
fn arithmetic_right_shift_extends_the_sign() {
    let mut interp = Interpreter::new();
    interp.create_move(r(2), (-16i64) as Word).unwrap();
    interp.create_shift_right_arithmetic(r(3), r(2), 2).unwrap();
    interp.create_shift_right_logical(r(4), r(2), 2).unwrap();
    interp.create_return();
    interp.run().unwrap();
    assert_eq!(interp.reg(r(3)).unwrap() as i64, -4);
    assert_eq!(interp.reg(r(4)).unwrap(), (-16i64 as u64) >> 2);
}

#[test]
fn division_by_zero_fails() {
    type Emit = fn(&mut Interpreter) -> Result<(), VmError>;
    let cases: [Emit; 4] = [
        |i| i.create_divu(Reg::new(3), Reg::new(2), 0),
        |i| i.create_divi(Reg::new(3), Reg::new(2), 0),
        |i| i.create_remu(Reg::new(3), Reg::new(2), 0),
        |i| i.create_remi(Reg::new(3), Reg::new(2), 0),
    ];
    for emit in cases {
        let mut interp = Interpreter::new();
        interp.create_move(r(2), 10).unwrap();
        emit(&mut interp).unwrap();
        interp.create_return();
        assert!(matches!(interp.run(), Err(VmError::DivisionByZero)));
    }
}

// ==================== Branching ====================

#[test]
fn unconditional_branch_skips_patched_region() {
    let mut interp = Interpreter::new();
    interp.create_move(r(1), 1).unwrap();
    let jmp_at = interp.current_addr();
    interp.create_branch(1).unwrap();
    interp.create_move(r(1), 99).unwrap();
    let target = interp.current_addr();
    interp.create_move(r(2), 7).unwrap();
    interp.create_return();
    // Forward targets don't exist while building, so patch the operand the
    // way a host with its own fixup list would.
    interp.bytecode[jmp_at + 1] = target as u8;

    assert_eq!(interp.run().unwrap(), 1);
    assert_eq!(interp.reg(r(2)).unwrap(), 7);
}

#[test]
fn branch_to_the_sentinel_fails() {
    let mut interp = Interpreter::new();
    interp.create_nop();
    let jmp_at = interp.current_addr();
    interp.create_branch(1).unwrap();
    interp.bytecode[jmp_at + 1] = 0;
    assert!(matches!(
        interp.run(),
        Err(VmError::InvalidOpcode {
            opcode: 0,
            offset: 0
        })
    ));
}

#[test]
fn decoded_jump_out_of_bounds_fails() {
    let mut interp = Interpreter::new();
    let jmp_at = interp.current_addr();
    interp.create_branch(1).unwrap();
    interp.bytecode[jmp_at + 1] = 200;
    assert!(matches!(
        interp.run(),
        Err(VmError::JumpOutOfBounds { target: 200 })
    ));
}

#[test]
fn decoded_call_out_of_bounds_fails() {
    let mut interp = Interpreter::new();
    interp.bytecode.push(crate::isa::Opcode::Call8 as u8);
    interp.bytecode.push(9);
    assert!(matches!(
        interp.run(),
        Err(VmError::CallIndexOutOfBounds { index: 9 })
    ));
}

#[test]
fn unknown_opcode_fails_with_its_offset() {
    let mut interp = Interpreter::new();
    interp.bytecode.push(0xEE);
    assert!(matches!(
        interp.run(),
        Err(VmError::InvalidOpcode {
            opcode: 0xEE,
            offset: 1
        })
    ));
}

#[test]
fn truncated_operands_fail() {
    let mut interp = Interpreter::new();
    interp.bytecode.push(crate::isa::Opcode::Mov as u8);
    interp.bytecode.push(0x02);
    assert!(matches!(
        interp.run(),
        Err(VmError::TruncatedBytecode { .. })
    ));
}

// ==================== Host state API ====================

#[test]
fn native_callback_computes_with_args_stack_and_return() {
    let mut interp = Interpreter::new();
    interp.create_move(r(2), 30).unwrap();
    interp.create_move(r(3), 12).unwrap();
    interp.create_call("sum2").unwrap();
    interp.create_return();
    interp
        .defun("sum2", |interp| {
            let a = interp.arg(0, Width::W64)?;
            let b = interp.arg(1, Width::W64)?;
            interp.push(a + b)?;
            let sum = interp.pop()?;
            interp.set_return_value(sum);
            Ok(())
        })
        .unwrap();
    assert_eq!(interp.run().unwrap(), 42);
}

#[test]
fn native_callback_errors_surface_from_run() {
    let mut interp = Interpreter::new();
    interp.create_call("boom").unwrap();
    interp.create_return();
    interp
        .defun("boom", |_| {
            Err(VmError::NativeCallback {
                message: "host said no".to_string(),
            })
        })
        .unwrap();
    let err = interp.run().unwrap_err();
    assert!(err.to_string().contains("host said no"));
}

#[test]
fn argument_registers_are_offset_by_two() {
    let mut interp = Interpreter::new();
    let seen = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&seen);
    interp.create_move(r(2), 11).unwrap();
    interp.create_call("peek").unwrap();
    interp.create_return();
    interp
        .defun("peek", move |interp| {
            *sink.borrow_mut() = interp.arg(0, Width::W64)?;
            assert!(matches!(
                interp.arg(62, Width::W64),
                Err(VmError::ArgumentOutOfBounds { index: 62 })
            ));
            interp.arg(61, Width::W64)?;
            Ok(())
        })
        .unwrap();
    interp.run().unwrap();
    assert_eq!(*seen.borrow(), 11);
}

#[test]
fn host_register_access_validates_indices() {
    let mut interp = Interpreter::new();
    interp.set_reg(r(9), 1234).unwrap();
    assert_eq!(interp.reg(r(9)).unwrap(), 1234);
    assert_eq!(interp.reg(Reg::sized(9, Width::W8)).unwrap(), 0xD2);
    assert!(matches!(
        interp.reg(r(64)),
        Err(VmError::InvalidRegister { index: 64 })
    ));
    assert!(matches!(
        interp.set_reg(r(200), 1),
        Err(VmError::InvalidRegister { index: 200 })
    ));
}

#[test]
fn host_memory_access_checks_sizes() {
    let mut interp = Interpreter::new();
    assert!(matches!(
        interp.load_mem(8, 3),
        Err(VmError::InvalidSize { size: 3 })
    ));
    assert!(matches!(
        interp.store_mem(8, 1, 0),
        Err(VmError::InvalidSize { size: 0 })
    ));
}

#[test]
fn host_memory_access_follows_a_run() {
    let mut interp = Interpreter::new();
    let global = interp.create_global(8).unwrap();
    interp.create_return();
    interp.run().unwrap();
    interp.store_mem(global, 0xABCD, 8).unwrap();
    assert_eq!(interp.load_mem(global, 8).unwrap(), 0xABCD);
    assert_eq!(interp.load_mem(global, 2).unwrap(), 0xABCD);
    assert_eq!(interp.load_mem(global, 1).unwrap(), 0xCD);
}

#[test]
fn native_address_access_roundtrip() {
    let mut value: Word = 0;
    let address = &mut value as *mut Word as *mut u8;
    unsafe {
        Interpreter::store_native(address, 0x1122_3344_5566_7788, 8).unwrap();
        assert_eq!(
            Interpreter::load_native(address, 8).unwrap(),
            0x1122_3344_5566_7788
        );
        assert_eq!(Interpreter::load_native(address, 1).unwrap(), 0x88);
        assert!(matches!(
            Interpreter::load_native(address, 5),
            Err(VmError::InvalidSize { size: 5 })
        ));
    }
}

// ==================== Lifecycle ====================

#[test]
fn globals_persist_across_runs_registers_do_not() {
    let mut interp = Interpreter::new();
    let counter = interp.create_global(8).unwrap();
    interp.create_load(r(2), counter).unwrap();
    interp.create_add(r(2), r(2), 1).unwrap();
    interp.create_store(counter, r(2)).unwrap();
    interp.create_move(r(1), r(2)).unwrap();
    interp.create_return();

    assert_eq!(interp.run().unwrap(), 1);
    assert_eq!(interp.run().unwrap(), 2);
    assert_eq!(interp.run().unwrap(), 3);
}

#[test]
fn empty_program_returns_zero() {
    let mut interp = Interpreter::new();
    interp.create_return();
    assert_eq!(interp.run().unwrap(), 0);
}

#[test]
fn nop_is_a_no_op() {
    let mut interp = Interpreter::new();
    interp.create_nop();
    interp.create_move(r(1), 3).unwrap();
    interp.create_nop();
    interp.create_return();
    assert_eq!(interp.run().unwrap(), 3);
}
