//! Human-readable bytecode disassembler.
//!
//! Formatting invariants, so the output stays aligned:
//! - every line starts with the absolute byte offset as `[XXXXXXXX]: `
//! - the raw bytes of the instruction come first, two hex digits each with
//!   a space before every byte except the first on the line
//! - a 64-bit immediate spills its high four bytes onto a continuation
//!   line carrying their offset
//! - the byte area is padded to a fixed column before the mnemonic
//! - a function whose body starts at the current offset gets its name
//!   printed on a preceding line
//!
//! Output is ANSI-colored; the plain renderer produces the same text
//! without escapes.

use crate::interp::{FunctionKind, Interpreter};
use crate::isa::Opcode;
use crate::operand::{Addr, Reg, Word, INDEX_MASK};
use std::collections::HashMap;
use std::fmt::Write;

/// Byte-slot width of the fixed mnemonic column.
const PAD_TO: usize = 8;

/// Colour roles used by the renderer.
#[derive(Clone, Copy)]
enum Color {
    /// Line offsets and bytecode-address annotations.
    Offset,
    /// Opcode bytes and mnemonics.
    Op,
    /// Register bytes and register operands.
    Register,
    /// Immediate marker bytes, punctuation, unknown bytes.
    Plain,
    /// Immediate payload bytes and values.
    Immediate,
    /// Memory addresses and their payload bytes.
    Address,
    /// Function names and call payload bytes.
    Function,
}

impl Color {
    const fn code(self) -> &'static str {
        match self {
            Color::Offset => "38;5;215",
            Color::Op => "33",
            Color::Register => "31",
            Color::Plain => "37",
            Color::Immediate => "35",
            Color::Address => "38;5;108",
            Color::Function => "32",
        }
    }
}

/// ANSI renderer. With `color` off the same text is produced bare.
struct Style {
    color: bool,
}

impl Style {
    fn paint(&self, color: Color, text: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", color.code(), text)
        } else {
            text.to_string()
        }
    }
}

/// Signalled when the buffer ends inside an instruction. Encoder output
/// never triggers it; hand-built buffers might.
struct Truncated;

struct Disassembler<'a> {
    interp: &'a Interpreter,
    style: Style,
    /// Bytecode address of each named bytecode function.
    names: HashMap<Addr, &'a str>,
    /// Function-table index to name, for call operands.
    slot_names: HashMap<usize, &'a str>,
    out: String,
    i: Addr,
}

impl Interpreter {
    /// Renders the bytecode as colorized text.
    pub fn disassemble(&self) -> String {
        Disassembler::new(self, true).render()
    }

    /// Renders the bytecode without ANSI escapes.
    pub fn disassemble_plain(&self) -> String {
        Disassembler::new(self, false).render()
    }
}

impl<'a> Disassembler<'a> {
    fn new(interp: &'a Interpreter, color: bool) -> Self {
        let mut names = HashMap::new();
        let mut slot_names = HashMap::new();
        for (name, &index) in &interp.functions_map {
            slot_names.insert(index, name.as_str());
            if let Some(function) = interp.functions.get(index) {
                if let FunctionKind::Bytecode(address) = function.kind {
                    names.insert(address, name.as_str());
                }
            }
        }
        Self {
            interp,
            style: Style { color },
            names,
            slot_names,
            out: String::new(),
            i: 0,
        }
    }

    fn render(mut self) -> String {
        while self.i < self.interp.bytecode.len() {
            let offset = self.i;

            // The entry function starts right after the sentinel; printing
            // its header against the sentinel line would mislabel offset 0.
            if let Some(name) = self.names.get(&offset) {
                if offset != 1 {
                    self.out.push('\n');
                }
                let _ = writeln!(
                    self.out,
                    "{}{}",
                    self.style.paint(Color::Function, name),
                    self.style.paint(Color::Offset, ":")
                );
            }

            self.line_offset(offset);
            let byte = self.interp.bytecode[offset];
            let color = if offset == 0 { Color::Plain } else { Color::Op };
            let text = format!("{:02x}", byte);
            self.out.push_str(&self.style.paint(color, &text));
            self.i += 1;

            if self.instruction(byte, offset).is_err() {
                self.out
                    .push_str(&self.style.paint(Color::Plain, " <truncated>"));
                self.out.push('\n');
                break;
            }
        }
        self.out
    }

    /// Renders the operand bytes and mnemonic of one instruction whose
    /// opcode byte is already printed.
    fn instruction(&mut self, byte: u8, offset: Addr) -> Result<(), Truncated> {
        let op = match Opcode::try_from(byte) {
            Ok(op) => op,
            Err(_) => {
                self.padding(1);
                let text = if offset == 0 && byte == 0 {
                    " .sentinel"
                } else {
                    " ???"
                };
                self.out.push_str(&self.style.paint(Color::Plain, text));
                self.out.push('\n');
                return Ok(());
            }
        };

        match op {
            Opcode::Nop | Opcode::Ret => {
                self.padding(1);
                let text = format!(" {}", op.mnemonic());
                self.out.push_str(&self.style.paint(Color::Op, &text));
                self.out.push('\n');
            }

            Opcode::Mov => {
                let dest = self.take_byte()?;
                let src = self.take_byte()?;
                self.print_reg_byte(dest);
                self.print_reg_byte(src);

                let marker = Reg::decode(src);
                if marker.index() == 0 {
                    let size = marker.width().bytes();
                    let value = self.peek_word(size)?;
                    self.print_bytes(Color::Immediate, size.min(4));
                    self.padding(size.min(4) + 3);
                    let dest_text = self.reg_str(dest);
                    let _ = write!(
                        self.out,
                        " {} {}{} {}",
                        self.style.paint(Color::Op, "mov "),
                        dest_text,
                        self.style.paint(Color::Plain, ","),
                        self.style.paint(Color::Immediate, &value.to_string())
                    );
                    self.out.push('\n');
                    if size == 8 {
                        self.spill_high_imm_bytes();
                    }
                } else {
                    self.padding(3);
                    let dest_text = self.reg_str(dest);
                    let src_text = self.reg_str(src);
                    let _ = write!(
                        self.out,
                        " {} {}{} {}",
                        self.style.paint(Color::Op, "mov "),
                        dest_text,
                        self.style.paint(Color::Plain, ","),
                        src_text
                    );
                    self.out.push('\n');
                }
            }

            Opcode::Add
            | Opcode::Sub
            | Opcode::Muli
            | Opcode::Mulu
            | Opcode::Divi
            | Opcode::Divu
            | Opcode::Remi
            | Opcode::Remu
            | Opcode::Shl
            | Opcode::Sar
            | Opcode::Shr => self.arithmetic(op)?,

            Opcode::Load8 | Opcode::Load16 | Opcode::Load32 | Opcode::Load64 => {
                let dest = self.take_byte()?;
                self.print_reg_byte(dest);
                let size = op.address_bytes();
                let address = self.peek_word(size)?;
                self.print_bytes(Color::Address, size);
                self.padding(size + 2);
                let dest_text = self.reg_str(dest);
                let _ = write!(
                    self.out,
                    " {} {}{} {}{}{}",
                    self.style.paint(Color::Op, "ld  "),
                    dest_text,
                    self.style.paint(Color::Plain, ","),
                    self.style.paint(Color::Plain, "["),
                    self.style.paint(Color::Address, &address.to_string()),
                    self.style.paint(Color::Plain, "]")
                );
                self.out.push('\n');
            }

            Opcode::LoadRel8 | Opcode::LoadRel16 | Opcode::LoadRel32 | Opcode::LoadRel64 => {
                let dest = self.take_byte()?;
                let base = self.take_byte()?;
                self.print_reg_byte(dest);
                self.print_reg_byte(base);
                let size = op.address_bytes();
                let offset_value = self.peek_word(size)?;
                self.print_bytes(Color::Address, size);
                self.padding(size + 3);
                let dest_text = self.reg_str(dest);
                let base_text = self.reg_str(base);
                let _ = write!(
                    self.out,
                    " {} {}{} {}{} {} {}{}",
                    self.style.paint(Color::Op, "ld  "),
                    dest_text,
                    self.style.paint(Color::Plain, ","),
                    self.style.paint(Color::Plain, "["),
                    base_text,
                    self.style.paint(Color::Plain, "+"),
                    self.style.paint(Color::Address, &offset_value.to_string()),
                    self.style.paint(Color::Plain, "]")
                );
                self.out.push('\n');
            }

            Opcode::Store8 | Opcode::Store16 | Opcode::Store32 | Opcode::Store64 => {
                let src = self.take_byte()?;
                self.print_reg_byte(src);
                let size = op.address_bytes();
                let address = self.peek_word(size)?;
                self.print_bytes(Color::Address, size);
                self.padding(size + 2);
                let src_text = self.reg_str(src);
                let _ = write!(
                    self.out,
                    " {} {}{}{}{} {}",
                    self.style.paint(Color::Op, "st  "),
                    self.style.paint(Color::Plain, "["),
                    self.style.paint(Color::Address, &address.to_string()),
                    self.style.paint(Color::Plain, "]"),
                    self.style.paint(Color::Plain, ","),
                    src_text
                );
                self.out.push('\n');
            }

            Opcode::StoreRel8 | Opcode::StoreRel16 | Opcode::StoreRel32 | Opcode::StoreRel64 => {
                let base = self.take_byte()?;
                let src = self.take_byte()?;
                self.print_reg_byte(base);
                self.print_reg_byte(src);
                let size = op.address_bytes();
                let offset_value = self.peek_word(size)?;
                self.print_bytes(Color::Address, size);
                self.padding(size + 3);
                let base_text = self.reg_str(base);
                let src_text = self.reg_str(src);
                let _ = write!(
                    self.out,
                    " {} {}{} {} {}{}{} {}",
                    self.style.paint(Color::Op, "st  "),
                    self.style.paint(Color::Plain, "["),
                    base_text,
                    self.style.paint(Color::Plain, "+"),
                    self.style.paint(Color::Address, &offset_value.to_string()),
                    self.style.paint(Color::Plain, "]"),
                    self.style.paint(Color::Plain, ","),
                    src_text
                );
                self.out.push('\n');
            }

            Opcode::Call8 | Opcode::Call16 | Opcode::Call32 | Opcode::Call64 => {
                let size = op.address_bytes();
                let index = self.peek_word(size)? as usize;
                self.print_bytes(Color::Function, size);
                self.padding(size + 1);
                self.call_operand(index);
                self.out.push('\n');
            }

            Opcode::Jmp8 | Opcode::Jmp16 | Opcode::Jmp32 | Opcode::Jmp64 => {
                let size = op.address_bytes();
                let target = self.peek_word(size)?;
                self.print_bytes(Color::Offset, size);
                self.padding(size + 1);
                let _ = write!(
                    self.out,
                    " {} {}",
                    self.style.paint(Color::Op, "jmp "),
                    self.style
                        .paint(Color::Offset, &format!("{:08x}", target))
                );
                self.out.push('\n');
            }

            Opcode::Jnz8 | Opcode::Jnz16 | Opcode::Jnz32 | Opcode::Jnz64 => {
                let cond = self.take_byte()?;
                self.print_reg_byte(cond);
                let size = op.address_bytes();
                let target = self.peek_word(size)?;
                self.print_bytes(Color::Offset, size);
                self.padding(size + 2);
                let cond_text = self.reg_str(cond);
                let _ = write!(
                    self.out,
                    " {} {}{} {}",
                    self.style.paint(Color::Op, "jnz "),
                    cond_text,
                    self.style.paint(Color::Plain, ","),
                    self.style
                        .paint(Color::Offset, &format!("{:08x}", target))
                );
                self.out.push('\n');
            }

            Opcode::Xchg => {
                let r1 = self.take_byte()?;
                let r2 = self.take_byte()?;
                self.print_reg_byte(r1);
                self.print_reg_byte(r2);
                self.padding(3);
                let r1_text = self.reg_str(r1);
                let r2_text = self.reg_str(r2);
                let _ = write!(
                    self.out,
                    " {} {}{} {}",
                    self.style.paint(Color::Op, "xchg"),
                    r1_text,
                    self.style.paint(Color::Plain, ","),
                    r2_text
                );
                self.out.push('\n');
            }
        }
        Ok(())
    }

    /// Renders a three-operand arithmetic instruction, immediate markers
    /// included.
    fn arithmetic(&mut self, op: Opcode) -> Result<(), Truncated> {
        let dest = self.take_byte()?;
        let src1 = self.take_byte()?;
        let src2 = self.take_byte()?;
        self.print_reg_byte(dest);
        self.print_reg_byte(src1);
        self.print_reg_byte(src2);

        // At most one source can be an immediate marker.
        let marker = [src1, src2]
            .into_iter()
            .position(|b| Reg::decode(b).index() == 0);
        let imm_size = match marker {
            Some(slot) => Reg::decode([src1, src2][slot]).width().bytes(),
            None => 0,
        };
        let imm_value = if marker.is_some() {
            let value = self.peek_word(imm_size)?;
            self.print_bytes(Color::Immediate, imm_size.min(4));
            value
        } else {
            0
        };
        self.padding(imm_size + 4);

        let dest_text = self.reg_str(dest);
        let imm_text = self.style.paint(Color::Immediate, &imm_value.to_string());
        let src1_text = if marker == Some(0) {
            imm_text.clone()
        } else {
            self.reg_str(src1)
        };
        let src2_text = if marker == Some(1) {
            imm_text
        } else {
            self.reg_str(src2)
        };
        let _ = write!(
            self.out,
            " {} {}{} {}{} {}",
            self.style
                .paint(Color::Op, &format!("{:<4}", op.mnemonic())),
            dest_text,
            self.style.paint(Color::Plain, ","),
            src1_text,
            self.style.paint(Color::Plain, ","),
            src2_text
        );
        self.out.push('\n');

        if imm_size == 8 {
            self.spill_high_imm_bytes();
        }
        Ok(())
    }

    /// Renders the target of a call: a resolved name where the slot is
    /// known, otherwise the raw index, plus the call-type annotation.
    fn call_operand(&mut self, index: usize) {
        let mnemonic = self.style.paint(Color::Op, "call");
        let name = self.slot_names.get(&index);
        match self.interp.functions.get(index).map(|f| &f.kind) {
            Some(FunctionKind::Bytecode(address)) => {
                let target = match name {
                    Some(name) => self.style.paint(Color::Function, name),
                    None => self.style.paint(Color::Immediate, &index.to_string()),
                };
                let _ = write!(
                    self.out,
                    " {} {} {}",
                    mnemonic,
                    target,
                    self.style
                        .paint(Color::Offset, &format!("@ {:08x}", address))
                );
            }
            Some(FunctionKind::Native(_)) => {
                let target = match name {
                    Some(name) => self.style.paint(Color::Function, name),
                    None => self.style.paint(Color::Immediate, &index.to_string()),
                };
                let _ = write!(
                    self.out,
                    " {} {} {}",
                    mnemonic,
                    target,
                    self.style.paint(Color::Offset, "@ native")
                );
            }
            Some(FunctionKind::Library(function)) => {
                let _ = write!(
                    self.out,
                    " {} {} {}",
                    mnemonic,
                    self.style.paint(Color::Function, &function.name),
                    self.style.paint(Color::Offset, "@ library")
                );
            }
            // Undefined slots and out-of-table indices print bare.
            _ => {
                let _ = write!(
                    self.out,
                    " {} {}",
                    mnemonic,
                    self.style.paint(Color::Plain, &index.to_string())
                );
            }
        }
    }

    // =========================================================================
    //  Low-level rendering helpers
    // =========================================================================

    fn line_offset(&mut self, offset: Addr) {
        let text = format!("[{:08x}]: ", offset);
        self.out.push_str(&self.style.paint(Color::Offset, &text));
    }

    /// Fills the byte area out to the mnemonic column, given how many bytes
    /// the line shows.
    fn padding(&mut self, shown: usize) {
        if shown < PAD_TO {
            for _ in 0..(PAD_TO - shown) {
                self.out.push_str("   ");
            }
        }
    }

    /// Prints an already-consumed operand byte as hex: white for immediate
    /// markers, red for registers.
    fn print_reg_byte(&mut self, byte: u8) {
        let color = if Reg::decode(byte).index() == 0 {
            Color::Plain
        } else {
            Color::Register
        };
        let text = format!(" {:02x}", byte);
        self.out.push_str(&self.style.paint(color, &text));
    }

    /// Prints `count` raw bytes at the cursor and advances past them.
    fn print_bytes(&mut self, color: Color, count: usize) {
        for offset in 0..count {
            let text = format!(" {:02x}", self.interp.bytecode[self.i + offset]);
            self.out.push_str(&self.style.paint(color, &text));
        }
        self.i += count;
    }

    /// Continuation line for the high half of a 64-bit immediate.
    fn spill_high_imm_bytes(&mut self) {
        self.line_offset(self.i);
        for offset in 0..4 {
            let text = if offset == 0 {
                format!("{:02x}", self.interp.bytecode[self.i + offset])
            } else {
                format!(" {:02x}", self.interp.bytecode[self.i + offset])
            };
            self.out.push_str(&self.style.paint(Color::Immediate, &text));
        }
        self.i += 4;
        self.out.push('\n');
    }

    /// Reads `count` little-endian bytes at the cursor without advancing.
    fn peek_word(&self, count: usize) -> Result<Word, Truncated> {
        let end = self.i + count;
        if end > self.interp.bytecode.len() {
            return Err(Truncated);
        }
        let mut buf = [0u8; 8];
        buf[..count].copy_from_slice(&self.interp.bytecode[self.i..end]);
        Ok(Word::from_le_bytes(buf))
    }

    /// Consumes the next byte; rendering happens separately.
    fn take_byte(&mut self) -> Result<u8, Truncated> {
        match self.interp.bytecode.get(self.i) {
            Some(&byte) => {
                self.i += 1;
                Ok(byte)
            }
            None => Err(Truncated),
        }
    }

    /// Register operand text: `rN` with the width suffix of its size tag.
    fn reg_str(&self, byte: u8) -> String {
        let reg = Reg::decode(byte);
        let text = format!(
            "r{}{}",
            byte & INDEX_MASK,
            reg.width().reg_suffix()
        );
        self.style.paint(Color::Register, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::{Reg, Width};

    fn sample() -> Interpreter {
        let mut interp = Interpreter::new();
        let r1 = Reg::new(1);
        let r2 = Reg::new(2);
        let r3 = Reg::new(3);
        interp.create_move(r2, 9).unwrap();
        let loop_start = interp.current_addr();
        interp.create_call("display").unwrap();
        interp.create_sub(r2, r2, 1).unwrap();
        interp.create_branch_ifnz(r2, loop_start).unwrap();
        interp.create_move(r2, u32::MAX as Word + 35).unwrap();
        interp.create_add(r3, r2, 70_000).unwrap();
        interp
            .create_xchg(r2, Reg::sized(2, Width::W8))
            .unwrap();
        let global = interp.create_global(8).unwrap();
        interp.create_store(global, r2).unwrap();
        interp.create_load(r3, global).unwrap();
        interp.create_store_rel(Reg::new(0), 8, r2).unwrap();
        interp.create_load_rel(r3, Reg::new(0), 8).unwrap();
        interp.create_move(r1, 42).unwrap();
        interp.create_return();
        interp.create_function("square").unwrap();
        interp.create_mulu(r2, r2, r2).unwrap();
        interp.create_return();
        interp.defun("display", |_| Ok(())).unwrap();
        interp
    }

    /// Walks the bytecode with an independent reference decoder and returns
    /// the byte offset of every instruction's opcode.
    fn instruction_offsets(interp: &Interpreter) -> Vec<usize> {
        let code = &interp.bytecode;
        let mut offsets = Vec::new();
        let mut i = 1;
        while i < code.len() {
            offsets.push(i);
            let op = Opcode::try_from(code[i]).expect("encoder emits valid opcodes");
            i += 1;
            match op {
                Opcode::Nop | Opcode::Ret => {}
                Opcode::Xchg => i += 2,
                Opcode::Mov => {
                    let marker = Reg::decode(code[i + 1]);
                    i += 2;
                    if marker.index() == 0 {
                        i += marker.width().bytes();
                    }
                }
                Opcode::Add
                | Opcode::Sub
                | Opcode::Muli
                | Opcode::Mulu
                | Opcode::Divi
                | Opcode::Divu
                | Opcode::Remi
                | Opcode::Remu
                | Opcode::Shl
                | Opcode::Sar
                | Opcode::Shr => {
                    let src1 = Reg::decode(code[i + 1]);
                    let src2 = Reg::decode(code[i + 2]);
                    i += 3;
                    for src in [src1, src2] {
                        if src.index() == 0 {
                            i += src.width().bytes();
                        }
                    }
                }
                Opcode::Call8 | Opcode::Call16 | Opcode::Call32 | Opcode::Call64 => {
                    i += op.address_bytes();
                }
                Opcode::Jmp8 | Opcode::Jmp16 | Opcode::Jmp32 | Opcode::Jmp64 => {
                    i += op.address_bytes();
                }
                Opcode::Jnz8 | Opcode::Jnz16 | Opcode::Jnz32 | Opcode::Jnz64 => {
                    i += 1 + op.address_bytes();
                }
                Opcode::Load8 | Opcode::Load16 | Opcode::Load32 | Opcode::Load64 => {
                    i += 1 + op.address_bytes();
                }
                Opcode::Store8 | Opcode::Store16 | Opcode::Store32 | Opcode::Store64 => {
                    i += 1 + op.address_bytes();
                }
                Opcode::LoadRel8
                | Opcode::LoadRel16
                | Opcode::LoadRel32
                | Opcode::LoadRel64
                | Opcode::StoreRel8
                | Opcode::StoreRel16
                | Opcode::StoreRel32
                | Opcode::StoreRel64 => {
                    i += 2 + op.address_bytes();
                }
            }
        }
        assert_eq!(i, code.len(), "reference decoder must consume every byte");
        offsets
    }

    // ==================== Surjectivity ====================

    #[test]
    fn every_instruction_line_carries_its_opcode_offset() {
        let interp = sample();
        let text = interp.disassemble_plain();
        for offset in instruction_offsets(&interp) {
            let prefix = format!("[{:08x}]: ", offset);
            assert!(
                text.contains(&prefix),
                "missing line for offset {offset:#x}\n{text}"
            );
        }
    }

    #[test]
    fn line_offsets_cover_the_buffer_in_order() {
        let interp = sample();
        let text = interp.disassemble_plain();
        let mut offsets: Vec<usize> = text
            .lines()
            .filter(|line| line.starts_with('['))
            .map(|line| usize::from_str_radix(&line[1..9], 16).unwrap())
            .collect();
        let sorted = {
            let mut sorted = offsets.clone();
            sorted.sort_unstable();
            sorted
        };
        assert_eq!(offsets, sorted, "offsets must be monotonic");
        offsets.dedup();
        assert_eq!(offsets.len(), sorted.len(), "no offset repeats");
        assert_eq!(offsets[0], 0, "the sentinel line is rendered");
    }

    #[test]
    fn sentinel_line_is_labelled() {
        let interp = Interpreter::new();
        let text = interp.disassemble_plain();
        assert!(text.starts_with("[00000000]: 00"));
        assert!(text.contains(".sentinel"));
    }

    // ==================== Symbolic rendering ====================

    #[test]
    fn function_names_precede_their_bodies() {
        let interp = sample();
        let text = interp.disassemble_plain();
        assert!(text.contains("__entry__:\n"));
        assert!(text.contains("\nsquare:\n"));
    }

    #[test]
    fn registers_render_with_width_suffixes() {
        let mut interp = Interpreter::new();
        interp
            .create_move(Reg::sized(2, Width::W8), Reg::sized(3, Width::W16))
            .unwrap();
        interp
            .create_xchg(Reg::sized(4, Width::W32), Reg::new(5))
            .unwrap();
        let text = interp.disassemble_plain();
        assert!(text.contains("r2b, r3w"));
        assert!(text.contains("r4d, r5"));
    }

    #[test]
    fn immediates_render_as_values_not_r0() {
        let mut interp = Interpreter::new();
        interp.create_move(Reg::new(2), 9).unwrap();
        interp.create_sub(Reg::new(2), Reg::new(2), 1).unwrap();
        let text = interp.disassemble_plain();
        assert!(text.contains("mov  r2, 9"));
        assert!(text.contains("sub  r2, r2, 1"));
        assert!(!text.contains("r0,"), "markers must not render as r0");
    }

    #[test]
    fn calls_resolve_names_and_kinds() {
        let interp = sample();
        let text = interp.disassemble_plain();
        assert!(text.contains("call display @ native"));
        assert!(text.contains("call square @ "));
    }

    #[test]
    fn undefined_call_renders_bare_index() {
        let mut interp = Interpreter::new();
        interp.create_call("missing").unwrap();
        interp.create_return();
        let text = interp.disassemble_plain();
        assert!(text.contains("call 1\n"));
    }

    #[test]
    fn wide_immediates_spill_to_a_continuation_line() {
        let mut interp = Interpreter::new();
        interp
            .create_move(Reg::new(2), 0x0123_4567_89AB_CDEF)
            .unwrap();
        interp.create_return();
        let text = interp.disassemble_plain();
        // Low half on the instruction line, high half on its own line at
        // the right offset: the payload starts at offset 4 (sentinel,
        // opcode, dest, marker), so the spill line covers offsets 8..11.
        assert!(text.contains("[00000008]: 67 45 23 01\n"));
        assert!(text.contains(&0x0123_4567_89AB_CDEFu64.to_string()));
    }

    #[test]
    fn colored_output_strips_to_the_plain_text() {
        let interp = sample();
        let colored = interp.disassemble();
        let plain = interp.disassemble_plain();
        let mut stripped = String::new();
        let mut rest = colored.as_str();
        while let Some(start) = rest.find('\x1b') {
            stripped.push_str(&rest[..start]);
            let after = &rest[start..];
            let end = after.find('m').map(|p| p + 1).unwrap_or(after.len());
            rest = &after[end..];
        }
        stripped.push_str(rest);
        assert_eq!(stripped, plain);
    }
}
