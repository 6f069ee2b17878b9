//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the canonical
//! opcode list and invokes a callback macro for code generation, so multiple
//! modules can generate opcode-related code without duplicating definitions.
//!
//! This module generates:
//! - The [`Opcode`] enum with stable byte values
//! - `TryFrom<u8>` for decoding opcodes
//! - [`Opcode::mnemonic`] and [`Opcode::address_bytes`]
//!
//! # Bytecode Format
//!
//! Byte 0 of the buffer is an invalid sentinel; execution starts at byte 1.
//! Each instruction is a one-byte opcode followed by a variable operand
//! payload:
//! - Register operand: 1 byte (size tag in the top two bits, index below)
//! - Inline immediate: announced by a register byte with index 0; its size
//!   tag gives the payload width (1/2/4/8 bytes, little-endian)
//! - Address operand: 1/2/4/8 bytes (little-endian) depending on the opcode
//!   variant; `call`, `jmp`, `jnz`, `load`, `store`, `load_rel`, and
//!   `store_rel` each come in four width-suffixed variants and the encoder
//!   always picks the smallest variant that fits

use crate::errors::VmError;
use crate::operand::{Width, Word};

/// Invokes a callback macro with the complete opcode definition list.
///
/// Byte values are a stable contract between the encoder and the decoder;
/// never renumber them.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Control
            // =========================
            /// NOP ; does nothing
            Nop = 0x01, "nop", addr 0,
            /// RET ; pop the current frame, or halt with register 1 at the entry frame
            Ret = 0x02, "ret", addr 0,
            /// MOV rd, rs|imm ; copy into rd, honoring rd's size tag
            Mov = 0x03, "mov", addr 0,
            // =========================
            // Arithmetic (three-operand; either source may be an immediate)
            // =========================
            /// ADD rd, rs1, rs2 ; rd = rs1 + rs2
            Add = 0x04, "add", addr 0,
            /// SUB rd, rs1, rs2 ; rd = rs1 - rs2
            Sub = 0x05, "sub", addr 0,
            /// MULI rd, rs1, rs2 ; rd = rs1 * rs2 (signed)
            Muli = 0x06, "muli", addr 0,
            /// MULU rd, rs1, rs2 ; rd = rs1 * rs2 (unsigned)
            Mulu = 0x07, "mulu", addr 0,
            /// DIVI rd, rs1, rs2 ; rd = rs1 / rs2 (signed, traps on zero)
            Divi = 0x08, "divi", addr 0,
            /// DIVU rd, rs1, rs2 ; rd = rs1 / rs2 (unsigned, traps on zero)
            Divu = 0x09, "divu", addr 0,
            /// REMI rd, rs1, rs2 ; rd = rs1 % rs2 (signed, traps on zero)
            Remi = 0x0A, "remi", addr 0,
            /// REMU rd, rs1, rs2 ; rd = rs1 % rs2 (unsigned, traps on zero)
            Remu = 0x0B, "remu", addr 0,
            /// SHL rd, rs1, rs2 ; rd = rs1 << (rs2 & 63)
            Shl = 0x0C, "shl", addr 0,
            /// SAR rd, rs1, rs2 ; rd = rs1 >> (rs2 & 63) (arithmetic)
            Sar = 0x0D, "sar", addr 0,
            /// SHR rd, rs1, rs2 ; rd = rs1 >> (rs2 & 63) (logical)
            Shr = 0x0E, "shr", addr 0,
            // =========================
            // Calls (operand: function-table index)
            // =========================
            /// CALL fn ; 8-bit slot index
            Call8 = 0x0F, "call", addr 1,
            /// CALL fn ; 16-bit slot index
            Call16 = 0x10, "call", addr 2,
            /// CALL fn ; 32-bit slot index
            Call32 = 0x11, "call", addr 4,
            /// CALL fn ; 64-bit slot index
            Call64 = 0x12, "call", addr 8,
            // =========================
            // Branches (operand: absolute bytecode address)
            // =========================
            /// JMP target ; 8-bit address
            Jmp8 = 0x13, "jmp", addr 1,
            /// JMP target ; 16-bit address
            Jmp16 = 0x14, "jmp", addr 2,
            /// JMP target ; 32-bit address
            Jmp32 = 0x15, "jmp", addr 4,
            /// JMP target ; 64-bit address
            Jmp64 = 0x16, "jmp", addr 8,
            /// JNZ cond, target ; branch if cond reads nonzero; 8-bit address
            Jnz8 = 0x17, "jnz", addr 1,
            /// JNZ cond, target ; 16-bit address
            Jnz16 = 0x18, "jnz", addr 2,
            /// JNZ cond, target ; 32-bit address
            Jnz32 = 0x19, "jnz", addr 4,
            /// JNZ cond, target ; 64-bit address
            Jnz64 = 0x1A, "jnz", addr 8,
            // =========================
            // Memory (operand: arena pointer or register-relative offset)
            // =========================
            /// LD rd, [addr] ; 8-bit pointer
            Load8 = 0x1B, "ld", addr 1,
            /// LD rd, [addr] ; 16-bit pointer
            Load16 = 0x1C, "ld", addr 2,
            /// LD rd, [addr] ; 32-bit pointer
            Load32 = 0x1D, "ld", addr 4,
            /// LD rd, [addr] ; 64-bit pointer
            Load64 = 0x1E, "ld", addr 8,
            /// LD rd, [rs + offs] ; r0 is the frame base; 8-bit offset
            LoadRel8 = 0x1F, "ld", addr 1,
            /// LD rd, [rs + offs] ; 16-bit offset
            LoadRel16 = 0x20, "ld", addr 2,
            /// LD rd, [rs + offs] ; 32-bit offset
            LoadRel32 = 0x21, "ld", addr 4,
            /// LD rd, [rs + offs] ; 64-bit offset
            LoadRel64 = 0x22, "ld", addr 8,
            /// ST [addr], rs ; 8-bit pointer
            Store8 = 0x23, "st", addr 1,
            /// ST [addr], rs ; 16-bit pointer
            Store16 = 0x24, "st", addr 2,
            /// ST [addr], rs ; 32-bit pointer
            Store32 = 0x25, "st", addr 4,
            /// ST [addr], rs ; 64-bit pointer
            Store64 = 0x26, "st", addr 8,
            /// ST [rd + offs], rs ; r0 is the frame base; 8-bit offset
            StoreRel8 = 0x27, "st", addr 1,
            /// ST [rd + offs], rs ; 16-bit offset
            StoreRel16 = 0x28, "st", addr 2,
            /// ST [rd + offs], rs ; 32-bit offset
            StoreRel32 = 0x29, "st", addr 4,
            /// ST [rd + offs], rs ; 64-bit offset
            StoreRel64 = 0x2A, "st", addr 8,
            // =========================
            // Exchange
            // =========================
            /// XCHG r1, r2 ; swap; equal indices at mixed widths truncate
            Xchg = 0x2B, "xchg", addr 0,
        }
    };
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $value:literal, $mnemonic:literal, addr $addr:literal
        ),* $(,)?
    ) => {
        /// Bytecode operation.
        ///
        /// Byte 0 is reserved for the invalid sentinel and never decodes.
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $value,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = VmError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok(Opcode::$name), )*
                    _ => Err(VmError::InvalidOpcode {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Opcode {
            /// Returns the disassembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Width in bytes of the inline address operand, or 0 when the
            /// opcode carries none.
            pub const fn address_bytes(&self) -> usize {
                match self {
                    $( Opcode::$name => $addr, )*
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);

/// Picks the family member matching the minimal encoding width of `value`.
const fn pick(family: [Opcode; 4], value: Word) -> Opcode {
    match Width::of_value(value) {
        Width::W8 => family[0],
        Width::W16 => family[1],
        Width::W32 => family[2],
        Width::W64 => family[3],
    }
}

impl Opcode {
    /// Smallest `call` variant whose operand holds `index`.
    pub(crate) const fn call_for(index: Word) -> Opcode {
        pick(
            [Opcode::Call8, Opcode::Call16, Opcode::Call32, Opcode::Call64],
            index,
        )
    }

    /// Smallest `jmp` variant whose operand holds `target`.
    pub(crate) const fn jmp_for(target: Word) -> Opcode {
        pick(
            [Opcode::Jmp8, Opcode::Jmp16, Opcode::Jmp32, Opcode::Jmp64],
            target,
        )
    }

    /// Smallest `jnz` variant whose operand holds `target`.
    pub(crate) const fn jnz_for(target: Word) -> Opcode {
        pick(
            [Opcode::Jnz8, Opcode::Jnz16, Opcode::Jnz32, Opcode::Jnz64],
            target,
        )
    }

    /// Smallest `load` variant whose operand holds `pointer`.
    pub(crate) const fn load_for(pointer: Word) -> Opcode {
        pick(
            [Opcode::Load8, Opcode::Load16, Opcode::Load32, Opcode::Load64],
            pointer,
        )
    }

    /// Smallest `load_rel` variant whose operand holds `offset`.
    pub(crate) const fn load_rel_for(offset: Word) -> Opcode {
        pick(
            [
                Opcode::LoadRel8,
                Opcode::LoadRel16,
                Opcode::LoadRel32,
                Opcode::LoadRel64,
            ],
            offset,
        )
    }

    /// Smallest `store` variant whose operand holds `pointer`.
    pub(crate) const fn store_for(pointer: Word) -> Opcode {
        pick(
            [
                Opcode::Store8,
                Opcode::Store16,
                Opcode::Store32,
                Opcode::Store64,
            ],
            pointer,
        )
    }

    /// Smallest `store_rel` variant whose operand holds `offset`.
    pub(crate) const fn store_rel_for(offset: Word) -> Opcode {
        pick(
            [
                Opcode::StoreRel8,
                Opcode::StoreRel16,
                Opcode::StoreRel32,
                Opcode::StoreRel64,
            ],
            offset,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_try_from_sentinel() {
        assert!(matches!(
            Opcode::try_from(0x00),
            Err(VmError::InvalidOpcode { opcode: 0x00, .. })
        ));
    }

    #[test]
    fn opcode_try_from_invalid() {
        assert!(matches!(
            Opcode::try_from(0xFF),
            Err(VmError::InvalidOpcode { opcode: 0xFF, .. })
        ));
    }

    #[test]
    fn opcode_byte_roundtrip() {
        for byte in 0x01..=0x2B {
            let op = Opcode::try_from(byte).expect("defined opcode");
            assert_eq!(op as u8, byte);
        }
    }

    #[test]
    fn address_widths_per_family() {
        assert_eq!(Opcode::Call8.address_bytes(), 1);
        assert_eq!(Opcode::Call64.address_bytes(), 8);
        assert_eq!(Opcode::Jnz16.address_bytes(), 2);
        assert_eq!(Opcode::StoreRel32.address_bytes(), 4);
        assert_eq!(Opcode::Mov.address_bytes(), 0);
        assert_eq!(Opcode::Xchg.address_bytes(), 0);
    }

    #[test]
    fn family_selection_is_minimal() {
        assert_eq!(Opcode::call_for(0), Opcode::Call8);
        assert_eq!(Opcode::call_for(255), Opcode::Call8);
        assert_eq!(Opcode::call_for(256), Opcode::Call16);
        assert_eq!(Opcode::jmp_for(70_000), Opcode::Jmp32);
        assert_eq!(Opcode::store_for(u32::MAX as Word + 1), Opcode::Store64);
        assert_eq!(Opcode::load_rel_for(16), Opcode::LoadRel8);
        assert_eq!(Opcode::jnz_for(65_535), Opcode::Jnz16);
        assert_eq!(Opcode::store_rel_for(300), Opcode::StoreRel16);
        assert_eq!(Opcode::load_for(1), Opcode::Load8);
    }
}
