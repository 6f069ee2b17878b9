//! Instruction builders: the public construction API.
//!
//! One method per logical operation. Each builder validates its operands,
//! appends the opcode (choosing the minimal-width variant for the
//! variable-width families), then the register bytes, then any inline
//! immediate or address payload. The decoder in the execution loop mirrors
//! these rules byte for byte, so the encoding here is a stable contract.

use super::Interpreter;
use crate::errors::VmError;
use crate::isa::Opcode;
use crate::operand::{Addr, Operand, Ptr, Reg, Width, Word};

/// Generates the three-operand arithmetic builders. Either source may be a
/// register or an immediate; both immediates at once is rejected at encode
/// time.
macro_rules! arith_builders {
    (
        $(
            $(#[$doc:meta])*
            $fn_name:ident => $opcode:ident
        ),* $(,)?
    ) => {
        $(
            $(#[$doc])*
            pub fn $fn_name(
                &mut self,
                dest: Reg,
                src1: impl Into<Operand>,
                src2: impl Into<Operand>,
            ) -> Result<(), VmError> {
                self.encode_arithmetic(Opcode::$opcode, dest, src1.into(), src2.into())
            }
        )*
    };
}

impl Interpreter {
    /// Emits a `nop`.
    pub fn create_nop(&mut self) {
        self.bytecode.push(Opcode::Nop as u8);
    }

    /// Emits a `ret`. Returning from the entry frame halts the run and
    /// yields register 1.
    pub fn create_return(&mut self) {
        self.bytecode.push(Opcode::Ret as u8);
    }

    /// Emits a `mov` into `dest` from a register or an immediate.
    pub fn create_move(&mut self, dest: Reg, src: impl Into<Operand>) -> Result<(), VmError> {
        let src = src.into();
        self.check_regs(&[dest])?;
        match src {
            Operand::Reg(reg) => {
                if reg.index() == 0 {
                    return Err(VmError::SourceRegisterZero);
                }
                self.check_regs(&[reg])?;
                self.bytecode.push(Opcode::Mov as u8);
                self.bytecode.push(dest.encode());
                self.bytecode.push(reg.encode());
            }
            Operand::Imm(value) => {
                self.bytecode.push(Opcode::Mov as u8);
                self.bytecode.push(dest.encode());
                self.push_imm_marker(value);
                self.push_imm_payload(value);
            }
        }
        Ok(())
    }

    /// Emits an `xchg` swapping two registers. With equal indices at
    /// different widths, the value is truncated to the narrower width.
    pub fn create_xchg(&mut self, r1: Reg, r2: Reg) -> Result<(), VmError> {
        self.check_regs(&[r1, r2])?;
        self.bytecode.push(Opcode::Xchg as u8);
        self.bytecode.push(r1.encode());
        self.bytecode.push(r2.encode());
        Ok(())
    }

    arith_builders! {
        /// Emits an `add` (wrapping).
        create_add => Add,
        /// Emits a `sub` (wrapping).
        create_sub => Sub,
        /// Emits a signed multiply.
        create_muli => Muli,
        /// Emits an unsigned multiply.
        create_mulu => Mulu,
        /// Emits a signed divide. Division by zero fails at run time.
        create_divi => Divi,
        /// Emits an unsigned divide. Division by zero fails at run time.
        create_divu => Divu,
        /// Emits a signed remainder. A zero divisor fails at run time.
        create_remi => Remi,
        /// Emits an unsigned remainder. A zero divisor fails at run time.
        create_remu => Remu,
        /// Emits a shift left; the count is masked modulo 64.
        create_shift_left => Shl,
        /// Emits an arithmetic shift right; the count is masked modulo 64.
        create_shift_right_arithmetic => Sar,
        /// Emits a logical shift right; the count is masked modulo 64.
        create_shift_right_logical => Shr,
    }

    /// Emits a call to `name`. An unknown name becomes a forward reference:
    /// a new undefined slot whose index is baked into the call, to be
    /// resolved by a later `create_function` or `defun`.
    pub fn create_call(&mut self, name: &str) -> Result<(), VmError> {
        let index = match self.functions_map.get(name) {
            Some(&index) => index,
            None => {
                let index = self.functions.len();
                self.functions_map.insert(name.to_string(), index);
                self.functions.push(super::Function::undefined());
                index
            }
        };
        self.emit_call(index);
        Ok(())
    }

    /// Emits an unconditional branch to an absolute bytecode address.
    pub fn create_branch(&mut self, target: Addr) -> Result<(), VmError> {
        self.check_branch_target(target)?;
        let op = Opcode::jmp_for(target as Word);
        self.bytecode.push(op as u8);
        self.push_address(op, target as Word);
        Ok(())
    }

    /// Emits a branch taken when `cond` reads nonzero at its size tag.
    pub fn create_branch_ifnz(&mut self, cond: Reg, target: Addr) -> Result<(), VmError> {
        self.check_regs(&[cond])?;
        self.check_branch_target(target)?;
        let op = Opcode::jnz_for(target as Word);
        self.bytecode.push(op as u8);
        self.bytecode.push(cond.encode());
        self.push_address(op, target as Word);
        Ok(())
    }

    /// Reserves at least `size` bytes in the frame of the function being
    /// built, returning the frame-relative offset of the allocation. Resolve
    /// it at run time with the register-relative memory ops and base `r0`.
    pub fn create_alloca(&mut self, size: Word) -> Word {
        let size = size.max(super::WORD_SIZE as Word);
        let function = &mut self.functions[self.current_function];
        let offset = function.locals_size;
        function.locals_size += size;
        offset
    }

    /// Allocates at least `size` bytes of global memory, returning an arena
    /// pointer. Fails once the globals region would exceed the arena.
    pub fn create_global(&mut self, size: Word) -> Result<Ptr, VmError> {
        self.memory.alloc_global(size as usize)
    }

    /// Emits a load of `dest`'s width from an absolute arena pointer.
    pub fn create_load(&mut self, dest: Reg, src: Ptr) -> Result<(), VmError> {
        self.check_pointer(src)?;
        self.check_regs(&[dest])?;
        let op = Opcode::load_for(src);
        self.bytecode.push(op as u8);
        self.bytecode.push(dest.encode());
        self.push_address(op, src);
        Ok(())
    }

    /// Emits a load of `dest`'s width from `base + offset`. Base index 0
    /// addresses relative to the frame base.
    pub fn create_load_rel(&mut self, dest: Reg, base: Reg, offset: Word) -> Result<(), VmError> {
        self.check_regs(&[dest, base])?;
        let op = Opcode::load_rel_for(offset);
        self.bytecode.push(op as u8);
        self.bytecode.push(dest.encode());
        self.bytecode.push(base.encode());
        self.push_address(op, offset);
        Ok(())
    }

    /// Emits a store of `src`'s width to an absolute arena pointer.
    pub fn create_store(&mut self, dest: Ptr, src: Reg) -> Result<(), VmError> {
        self.check_pointer(dest)?;
        self.check_regs(&[src])?;
        let op = Opcode::store_for(dest);
        self.bytecode.push(op as u8);
        self.bytecode.push(src.encode());
        self.push_address(op, dest);
        Ok(())
    }

    /// Emits a store of `src`'s width to `base + offset`. Base index 0
    /// addresses relative to the frame base.
    pub fn create_store_rel(&mut self, base: Reg, offset: Word, src: Reg) -> Result<(), VmError> {
        self.check_regs(&[base, src])?;
        let op = Opcode::store_rel_for(offset);
        self.bytecode.push(op as u8);
        self.bytecode.push(base.encode());
        self.bytecode.push(src.encode());
        self.push_address(op, offset);
        Ok(())
    }

    // =========================================================================
    //  Encoding internals
    // =========================================================================

    /// Encodes one arithmetic triple: opcode, dest byte, two source bytes
    /// (registers or immediate markers), then any immediate payloads.
    fn encode_arithmetic(
        &mut self,
        op: Opcode,
        dest: Reg,
        src1: Operand,
        src2: Operand,
    ) -> Result<(), VmError> {
        if matches!((&src1, &src2), (Operand::Imm(_), Operand::Imm(_))) {
            return Err(VmError::BothSourcesImmediate);
        }
        self.check_regs(&[dest])?;
        for src in [&src1, &src2] {
            if let Operand::Reg(reg) = src {
                // A real register in a source slot can't be index 0; the
                // decoder would read it as an immediate marker.
                if reg.index() == 0 {
                    return Err(VmError::SourceRegisterZero);
                }
                self.check_regs(&[*reg])?;
            }
        }

        self.bytecode.push(op as u8);
        self.bytecode.push(dest.encode());
        for src in [&src1, &src2] {
            match src {
                Operand::Reg(reg) => self.bytecode.push(reg.encode()),
                Operand::Imm(value) => self.push_imm_marker(*value),
            }
        }
        for src in [&src1, &src2] {
            if let Operand::Imm(value) = src {
                self.push_imm_payload(*value);
            }
        }
        Ok(())
    }

    /// Emits the call opcode variant and slot-index operand.
    pub(crate) fn emit_call(&mut self, index: usize) {
        let op = Opcode::call_for(index as Word);
        self.bytecode.push(op as u8);
        self.push_address(op, index as Word);
    }

    /// Appends the immediate marker byte: register index 0 tagged with the
    /// immediate's width.
    fn push_imm_marker(&mut self, value: Word) {
        self.bytecode.push(Width::of_value(value) as u8);
    }

    /// Appends the little-endian immediate payload at its minimal width.
    fn push_imm_payload(&mut self, value: Word) {
        let count = Width::of_value(value).bytes();
        self.bytecode
            .extend_from_slice(&value.to_le_bytes()[..count]);
    }

    /// Appends the address operand at exactly the width the opcode variant
    /// demands.
    fn push_address(&mut self, op: Opcode, value: Word) {
        let count = op.address_bytes();
        self.bytecode
            .extend_from_slice(&value.to_le_bytes()[..count]);
    }

    /// Rejects arena pointers that could never be valid at run time.
    fn check_pointer(&self, pointer: Ptr) -> Result<(), VmError> {
        if pointer == 0 || pointer as usize >= self.memory.max {
            return Err(VmError::InvalidPointer { pointer });
        }
        Ok(())
    }

    /// Branch targets must land inside bytecode that already exists.
    fn check_branch_target(&self, target: Addr) -> Result<(), VmError> {
        if target > self.bytecode.len() {
            return Err(VmError::JumpOutOfBounds { target });
        }
        Ok(())
    }
}
