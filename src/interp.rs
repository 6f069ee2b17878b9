//! Interpreter core: build-phase state, the function table, and the
//! execution loop.
//!
//! # Architecture
//!
//! - **Registers**: 64 64-bit slots aliased at four access widths
//! - **Memory**: one flat arena shared by globals and the call stack
//! - **Instruction format**: variable-length encoded bytecode; offset 0 is
//!   an invalid sentinel and execution starts at offset 1
//! - **Functions**: an append-only table of tagged slots (undefined /
//!   bytecode / native callback / library binding); encoded calls reference
//!   slots by index, so entries are never reordered or removed
//!
//! A host drives the build phase through the builder methods (see
//! [`builder`](self) for the encoders), then calls [`Interpreter::run`],
//! which executes from the entry point until the entry frame returns and
//! yields the value in register 1.

mod builder;
mod library;
mod memory;
mod registers;
#[cfg(test)]
mod tests;

use crate::errors::VmError;
use crate::isa::Opcode;
use crate::log::Logger;
use crate::operand::{Addr, Ptr, Reg, Width, Word, REGISTER_COUNT};
use library::LibraryRecord;
use memory::{Memory, DEFAULT_MAX_MEMORY, WORD_SIZE};
use registers::Registers;
use std::collections::HashMap;
use std::rc::Rc;

pub(crate) use library::LibraryFunction;

/// Host callback invoked when `call` hits a native function slot.
///
/// Arguments live in registers 2 and up (see [`Interpreter::arg`]); the
/// callback writes its result through [`Interpreter::set_return_value`].
/// Errors propagate out of [`Interpreter::run`] unchanged.
pub type NativeFn = Rc<dyn Fn(&mut Interpreter) -> Result<(), VmError>>;

/// Name of the implicit entry function occupying slot 0.
pub const ENTRY_FUNCTION: &str = "__entry__";

/// Bytecode address where execution starts. Offset 0 holds the sentinel.
pub(crate) const IP_START: Addr = 1;

/// What a function slot resolves to.
pub(crate) enum FunctionKind {
    /// Forward reference; calling it fails until it is defined.
    Undefined,
    /// Body in the bytecode buffer.
    Bytecode(Addr),
    /// Host callback.
    Native(NativeFn),
    /// Symbol in a shared library, invoked through the trampoline.
    Library(LibraryFunction),
}

/// One slot in the function table.
pub(crate) struct Function {
    pub(crate) kind: FunctionKind,
    /// Bytes reserved on the stack for this function's locals on entry.
    pub(crate) locals_size: Word,
}

impl Function {
    fn undefined() -> Self {
        Self {
            kind: FunctionKind::Undefined,
            locals_size: 0,
        }
    }
}

/// Register-based bytecode interpreter.
///
/// One instance owns one bytecode buffer, one memory arena, and one function
/// table. Build and run phases alternate freely: bytecode and function slots
/// persist for the interpreter's lifetime, while registers and the stack are
/// reset at the start of every [`run`](Interpreter::run).
pub struct Interpreter {
    /// Encoded instruction stream. Byte 0 is the invalid sentinel.
    pub(crate) bytecode: Vec<u8>,
    /// Instruction pointer.
    ip: Addr,
    /// Register file.
    pub(crate) registers: Registers,
    /// Globals and stack arena.
    pub(crate) memory: Memory,
    /// Function slots; indices are baked into encoded calls.
    pub(crate) functions: Vec<Function>,
    /// Function name to slot index. Library symbols are tracked per library
    /// instead and do not appear here.
    pub(crate) functions_map: HashMap<String, usize>,
    /// Slot whose locals the next `create_alloca` grows.
    current_function: usize,
    /// Loaded libraries by path; handles close when the interpreter drops.
    pub(crate) libraries: HashMap<String, LibraryRecord>,
    log: Logger,
}

impl Interpreter {
    /// Creates an interpreter with the default 1 MiB arena.
    pub fn new() -> Self {
        Self::with_max_memory(DEFAULT_MAX_MEMORY)
    }

    /// Creates an interpreter with a custom arena cap.
    pub fn with_max_memory(max_memory: usize) -> Self {
        let mut interp = Self {
            // The sentinel keeps offset 0 from ever decoding, so branches
            // to 0 fail.
            bytecode: vec![0x00],
            ip: 0,
            registers: Registers::new(),
            memory: Memory::new(max_memory),
            functions: Vec::new(),
            functions_map: HashMap::new(),
            current_function: 0,
            libraries: HashMap::new(),
            log: Logger::new("interp"),
        };
        // Slot 0 is the entry function; alloca calls made before any other
        // create_function accumulate its locals.
        interp
            .functions_map
            .insert(ENTRY_FUNCTION.to_string(), 0);
        interp.functions.push(Function {
            kind: FunctionKind::Bytecode(IP_START),
            locals_size: 0,
        });
        interp
    }

    /// Binds `name` to a host callback, resolving a forward reference if
    /// calls to `name` were already emitted.
    pub fn defun<F>(&mut self, name: &str, func: F) -> Result<(), VmError>
    where
        F: Fn(&mut Interpreter) -> Result<(), VmError> + 'static,
    {
        let func: NativeFn = Rc::new(func);
        match self.functions_map.get(name) {
            Some(&index) => {
                if !matches!(self.functions[index].kind, FunctionKind::Undefined) {
                    return Err(VmError::FunctionRedefined {
                        name: name.to_string(),
                    });
                }
                self.functions[index].kind = FunctionKind::Native(func);
            }
            None => {
                self.functions_map
                    .insert(name.to_string(), self.functions.len());
                self.functions.push(Function {
                    kind: FunctionKind::Native(func),
                    locals_size: 0,
                });
            }
        }
        Ok(())
    }

    /// Starts a bytecode function at the current address. Subsequent builder
    /// calls emit its body and `create_alloca` grows its frame.
    pub fn create_function(&mut self, name: &str) -> Result<(), VmError> {
        let address = self.bytecode.len();
        match self.functions_map.get(name) {
            Some(&index) => {
                if !matches!(self.functions[index].kind, FunctionKind::Undefined) {
                    return Err(VmError::FunctionRedefined {
                        name: name.to_string(),
                    });
                }
                self.functions[index].kind = FunctionKind::Bytecode(address);
                self.current_function = index;
            }
            None => {
                let index = self.functions.len();
                self.functions_map.insert(name.to_string(), index);
                self.functions.push(Function {
                    kind: FunctionKind::Bytecode(address),
                    locals_size: 0,
                });
                self.current_function = index;
            }
        }
        Ok(())
    }

    /// The address the next emitted instruction will land at. Record this
    /// before emitting a loop body to get a branch target.
    pub fn current_addr(&self) -> Addr {
        self.bytecode.len()
    }

    // =========================================================================
    //  State manipulation (host-facing, used from native callbacks)
    // =========================================================================

    /// Reads argument register `index` at the given width. Argument 0 is
    /// register 2; the check applies to the post-offset index, so arguments
    /// 62 and up are rejected.
    pub fn arg(&self, index: usize, width: Width) -> Result<Word, VmError> {
        let register = index + 2;
        if register >= REGISTER_COUNT as usize {
            return Err(VmError::ArgumentOutOfBounds { index });
        }
        Ok(self.registers.read(Reg::sized(register as u8, width)))
    }

    /// Reads a register, honoring its size tag.
    pub fn reg(&self, reg: Reg) -> Result<Word, VmError> {
        self.check_regs(&[reg])?;
        Ok(self.registers.read(reg))
    }

    /// Writes a register, honoring its size tag.
    pub fn set_reg(&mut self, reg: Reg, value: Word) -> Result<(), VmError> {
        self.check_regs(&[reg])?;
        self.registers.write(reg, value);
        Ok(())
    }

    /// Writes the return-value register (register 1).
    pub fn set_return_value(&mut self, value: Word) {
        self.registers.set_word(1, value);
    }

    /// Pushes one word onto the stack.
    pub fn push(&mut self, value: Word) -> Result<(), VmError> {
        self.memory.push(value)
    }

    /// Pops one word off the stack.
    pub fn pop(&mut self) -> Result<Word, VmError> {
        self.memory.pop()
    }

    /// Loads `size` bytes (1, 2, 4, or 8) from an arena pointer.
    pub fn load_mem(&self, pointer: Ptr, size: usize) -> Result<Word, VmError> {
        let width = Width::from_size(size).ok_or(VmError::InvalidSize { size })?;
        self.memory.load(pointer, width)
    }

    /// Stores the low `size` bytes of `value` at an arena pointer.
    pub fn store_mem(&mut self, pointer: Ptr, value: Word, size: usize) -> Result<(), VmError> {
        let width = Width::from_size(size).ok_or(VmError::InvalidSize { size })?;
        self.memory.store(pointer, value, width)
    }

    /// Loads `size` bytes from a raw host address.
    ///
    /// # Safety
    ///
    /// `address` must be valid for reads of `size` bytes for the duration of
    /// the call. No alignment is required.
    pub unsafe fn load_native(address: *const u8, size: usize) -> Result<Word, VmError> {
        match size {
            1 => Ok(unsafe { address.read_unaligned() } as Word),
            2 => Ok(unsafe { address.cast::<u16>().read_unaligned() } as Word),
            4 => Ok(unsafe { address.cast::<u32>().read_unaligned() } as Word),
            8 => Ok(unsafe { address.cast::<u64>().read_unaligned() }),
            _ => Err(VmError::InvalidSize { size }),
        }
    }

    /// Stores the low `size` bytes of `value` to a raw host address.
    ///
    /// # Safety
    ///
    /// `address` must be valid for writes of `size` bytes for the duration
    /// of the call. No alignment is required.
    pub unsafe fn store_native(address: *mut u8, value: Word, size: usize) -> Result<(), VmError> {
        match size {
            1 => unsafe { address.write_unaligned(value as u8) },
            2 => unsafe { address.cast::<u16>().write_unaligned(value as u16) },
            4 => unsafe { address.cast::<u32>().write_unaligned(value as u32) },
            8 => unsafe { address.cast::<u64>().write_unaligned(value) },
            _ => return Err(VmError::InvalidSize { size }),
        }
        Ok(())
    }

    // =========================================================================
    //  Execution
    // =========================================================================

    /// Runs the program from the entry point until the entry frame returns.
    ///
    /// Registers and the stack are reset; global values survive across runs.
    /// The return value is whatever register 1 holds when the entry frame's
    /// `ret` executes.
    pub fn run(&mut self) -> Result<Word, VmError> {
        self.memory.prepare_run(self.functions[0].locals_size)?;
        self.registers.reset();
        self.ip = IP_START;
        let entry_frame = self.memory.stack_base;

        loop {
            if self.ip >= self.bytecode.len() {
                return Err(VmError::IpOutOfBounds { ip: self.ip });
            }
            let offset = self.ip;
            let byte = self.bytecode[offset];
            self.ip += 1;
            let op = Opcode::try_from(byte).map_err(|_| VmError::InvalidOpcode {
                opcode: byte,
                offset,
            })?;

            match op {
                Opcode::Nop => {}

                Opcode::Ret => {
                    // The entry frame halts the machine instead of popping.
                    if self.memory.stack_base == entry_frame {
                        return Ok(self.registers.word(1));
                    }
                    self.memory.sp = self.memory.stack_base;
                    self.memory.stack_base = self.memory.pop()?;
                    self.ip = self.memory.pop()? as Addr;
                }

                Opcode::Mov => {
                    let dest = Reg::decode(self.fetch_byte()?);
                    let src = Reg::decode(self.fetch_byte()?);
                    let value = self.read_operand(src)?;
                    self.registers.write(dest, value);
                }

                Opcode::Add => self.arithmetic(|a, b| Ok(a.wrapping_add(b)))?,
                Opcode::Sub => self.arithmetic(|a, b| Ok(a.wrapping_sub(b)))?,
                Opcode::Mulu => self.arithmetic(|a, b| Ok(a.wrapping_mul(b)))?,
                Opcode::Muli => {
                    self.arithmetic(|a, b| Ok((a as i64).wrapping_mul(b as i64) as Word))?
                }
                Opcode::Divu => self.arithmetic(|a, b| {
                    if b == 0 {
                        return Err(VmError::DivisionByZero);
                    }
                    Ok(a / b)
                })?,
                Opcode::Divi => self.arithmetic(|a, b| {
                    if b == 0 {
                        return Err(VmError::DivisionByZero);
                    }
                    Ok((a as i64).wrapping_div(b as i64) as Word)
                })?,
                Opcode::Remu => self.arithmetic(|a, b| {
                    if b == 0 {
                        return Err(VmError::DivisionByZero);
                    }
                    Ok(a % b)
                })?,
                Opcode::Remi => self.arithmetic(|a, b| {
                    if b == 0 {
                        return Err(VmError::DivisionByZero);
                    }
                    Ok((a as i64).wrapping_rem(b as i64) as Word)
                })?,
                Opcode::Shl => self.arithmetic(|a, b| Ok(a << (b & 63)))?,
                Opcode::Sar => self.arithmetic(|a, b| Ok(((a as i64) >> (b & 63)) as Word))?,
                Opcode::Shr => self.arithmetic(|a, b| Ok(a >> (b & 63)))?,

                Opcode::Load8 | Opcode::Load16 | Opcode::Load32 | Opcode::Load64 => {
                    let dest = Reg::decode(self.fetch_byte()?);
                    let pointer = self.read_sized_address(op)?;
                    let value = self.memory.load(pointer, dest.width())?;
                    self.registers.write(dest, value);
                }

                Opcode::LoadRel8 | Opcode::LoadRel16 | Opcode::LoadRel32 | Opcode::LoadRel64 => {
                    let dest = Reg::decode(self.fetch_byte()?);
                    let base = Reg::decode(self.fetch_byte()?);
                    let offset = self.read_sized_address(op)?;
                    let pointer = self.relative_address(base, offset);
                    let value = self.memory.load(pointer, dest.width())?;
                    self.registers.write(dest, value);
                }

                Opcode::Store8 | Opcode::Store16 | Opcode::Store32 | Opcode::Store64 => {
                    let src = Reg::decode(self.fetch_byte()?);
                    let pointer = self.read_sized_address(op)?;
                    let value = self.registers.read(src);
                    self.memory.store(pointer, value, src.width())?;
                }

                Opcode::StoreRel8
                | Opcode::StoreRel16
                | Opcode::StoreRel32
                | Opcode::StoreRel64 => {
                    let base = Reg::decode(self.fetch_byte()?);
                    let src = Reg::decode(self.fetch_byte()?);
                    let offset = self.read_sized_address(op)?;
                    let pointer = self.relative_address(base, offset);
                    let value = self.registers.read(src);
                    self.memory.store(pointer, value, src.width())?;
                }

                Opcode::Call8 | Opcode::Call16 | Opcode::Call32 | Opcode::Call64 => {
                    let index = self.read_sized_address(op)? as usize;
                    self.call(index)?;
                }

                Opcode::Jmp8 | Opcode::Jmp16 | Opcode::Jmp32 | Opcode::Jmp64 => {
                    let target = self.read_sized_address(op)? as Addr;
                    if target >= self.bytecode.len() {
                        return Err(VmError::JumpOutOfBounds { target });
                    }
                    self.ip = target;
                }

                Opcode::Jnz8 | Opcode::Jnz16 | Opcode::Jnz32 | Opcode::Jnz64 => {
                    let cond = Reg::decode(self.fetch_byte()?);
                    let target = self.read_sized_address(op)? as Addr;
                    // The target is validated even when the branch is not
                    // taken.
                    if target >= self.bytecode.len() {
                        return Err(VmError::JumpOutOfBounds { target });
                    }
                    if self.registers.read(cond) != 0 {
                        self.ip = target;
                    }
                }

                Opcode::Xchg => {
                    let r1 = Reg::decode(self.fetch_byte()?);
                    let r2 = Reg::decode(self.fetch_byte()?);
                    let v1 = self.registers.read(r1);
                    let v2 = self.registers.read(r2);
                    self.registers.write(r1, v2);
                    self.registers.write(r2, v1);
                }
            }
        }
    }

    /// Dispatches `call` on a function slot.
    fn call(&mut self, index: usize) -> Result<(), VmError> {
        if index >= self.functions.len() {
            return Err(VmError::CallIndexOutOfBounds { index });
        }
        match &self.functions[index].kind {
            FunctionKind::Native(func) => {
                // Clone out of the table so the callback may mutate the
                // interpreter, including the table itself.
                let func = Rc::clone(func);
                func(self)
            }
            FunctionKind::Bytecode(target) => {
                let target = *target;
                let locals = self.functions[index].locals_size;
                let saved_base = self.memory.stack_base;
                self.memory.push(self.ip as Word)?;
                self.memory.push(saved_base)?;
                self.memory.stack_base = self.memory.sp;
                let new_sp = self.memory.sp + locals;
                if new_sp as usize > self.memory.max {
                    return Err(VmError::StackOverflow);
                }
                self.memory.sp = new_sp;
                self.ip = target;
                Ok(())
            }
            FunctionKind::Library(func) => {
                let func = func.clone();
                // SAFETY: the host vouched for the symbol's signature when it
                // created the binding; see the trampoline's contract.
                unsafe { self.dispatch_library_call(&func) }
            }
            FunctionKind::Undefined => Err(self.undefined_function_error(index)),
        }
    }

    /// Names the slot if it has a recorded name.
    fn undefined_function_error(&self, index: usize) -> VmError {
        match self
            .functions_map
            .iter()
            .find(|(_, &slot)| slot == index)
        {
            Some((name, _)) => VmError::UndefinedFunction { name: name.clone() },
            None => VmError::UndefinedFunctionIndex { index },
        }
    }

    /// Effective address of a register-relative access; base index 0 is the
    /// frame base.
    fn relative_address(&self, base: Reg, offset: Word) -> Ptr {
        let base_value = if base.index() == 0 {
            self.memory.stack_base
        } else {
            self.registers.read(base)
        };
        base_value.wrapping_add(offset)
    }

    /// Decodes one arithmetic triple and resolves both source values.
    fn decode_arithmetic(&mut self) -> Result<(Reg, Word, Word), VmError> {
        let dest = Reg::decode(self.fetch_byte()?);
        let src1 = Reg::decode(self.fetch_byte()?);
        let src2 = Reg::decode(self.fetch_byte()?);
        if src1.index() == 0 && src2.index() == 0 {
            return Err(VmError::BothSourcesImmediate);
        }
        let a = self.read_operand(src1)?;
        let b = self.read_operand(src2)?;
        Ok((dest, a, b))
    }

    /// Executes one three-operand arithmetic instruction.
    fn arithmetic(
        &mut self,
        op: impl Fn(Word, Word) -> Result<Word, VmError>,
    ) -> Result<(), VmError> {
        let (dest, a, b) = self.decode_arithmetic()?;
        let value = op(a, b)?;
        self.registers.write(dest, value);
        Ok(())
    }

    /// Resolves a source operand byte: index 0 is the immediate marker and
    /// pulls the inline payload, anything else reads the register.
    fn read_operand(&mut self, reg: Reg) -> Result<Word, VmError> {
        if reg.index() == 0 {
            return self.fetch_le(reg.width().bytes());
        }
        Ok(self.registers.read(reg))
    }

    /// Reads the address operand of a variable-width opcode.
    fn read_sized_address(&mut self, op: Opcode) -> Result<Word, VmError> {
        self.fetch_le(op.address_bytes())
    }

    /// Fetches the next bytecode byte.
    fn fetch_byte(&mut self) -> Result<u8, VmError> {
        match self.bytecode.get(self.ip) {
            Some(&byte) => {
                self.ip += 1;
                Ok(byte)
            }
            None => Err(VmError::TruncatedBytecode {
                ip: self.ip,
                needed: 1,
            }),
        }
    }

    /// Fetches `count` little-endian bytes as a zero-extended word.
    fn fetch_le(&mut self, count: usize) -> Result<Word, VmError> {
        let start = self.ip;
        let end = start + count;
        if end > self.bytecode.len() {
            return Err(VmError::TruncatedBytecode {
                ip: start,
                needed: end - self.bytecode.len(),
            });
        }
        let mut buf = [0u8; WORD_SIZE];
        buf[..count].copy_from_slice(&self.bytecode[start..end]);
        self.ip = end;
        Ok(Word::from_le_bytes(buf))
    }

    /// Validates register indices against the register file.
    pub(crate) fn check_regs(&self, regs: &[Reg]) -> Result<(), VmError> {
        for reg in regs {
            if reg.index() >= REGISTER_COUNT {
                return Err(VmError::InvalidRegister { index: reg.index() });
            }
        }
        Ok(())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
