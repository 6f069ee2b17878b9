//! Errors raised while building, decoding, and executing bytecode.

use interp_derive::Error;

/// Errors raised by the interpreter core.
///
/// One category covers all phases: builder methods surface the build-time
/// variants, `run` surfaces decode and runtime variants. Failures abort the
/// current operation; nothing is retried.
#[derive(Debug, Error)]
pub enum VmError {
    /// Register index exceeds the register file.
    #[error("invalid register: {index}")]
    InvalidRegister { index: u8 },
    /// Register 0 used in a source-operand position, which is reserved for
    /// the immediate marker.
    #[error("source register 0 is reserved for immediate operands")]
    SourceRegisterZero,
    /// Arithmetic triple with immediates in both source positions.
    #[error("invalid instruction: both source operands can't be immediates")]
    BothSourcesImmediate,
    /// Function defined twice (as bytecode or as a native callback).
    #[error("function '{name}' is already defined")]
    FunctionRedefined { name: String },
    /// Global allocation would exceed the memory arena.
    #[error("global memory overflow: {requested} bytes requested, {available} available")]
    GlobalMemoryOverflow { requested: usize, available: usize },
    /// Null or out-of-range arena pointer.
    #[error("segmentation fault: invalid pointer {pointer:#010x}")]
    InvalidPointer { pointer: u64 },
    /// Shared library could not be opened.
    #[error("failed to load library {path}: {reason}")]
    LibraryLoad { path: String, reason: String },
    /// Symbol not found in an opened library.
    #[error("failed to load symbol \"{symbol}\" from library {path}: {reason}")]
    SymbolLookup {
        symbol: String,
        path: String,
        reason: String,
    },
    /// Library binding beyond the dispatch table's arity range.
    #[error("cannot bind a library function with more than 62 arguments (got {arity})")]
    ArityTooLarge { arity: usize },
    /// Instruction pointer ran past the bytecode buffer.
    #[error("instruction pointer out of bounds: {ip}")]
    IpOutOfBounds { ip: usize },
    /// Bytecode ended in the middle of an instruction's operands.
    #[error("unexpected end of bytecode at {ip}: {needed} more bytes needed")]
    TruncatedBytecode { ip: usize, needed: usize },
    /// Unknown opcode byte.
    #[error("invalid opcode {opcode:#04x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    /// Branch target outside the bytecode buffer.
    #[error("jump target out of bounds: {target}")]
    JumpOutOfBounds { target: usize },
    /// Encoded call slot past the end of the function table.
    #[error("call index out of bounds: {index}")]
    CallIndexOutOfBounds { index: usize },
    /// Call to a slot that was declared but never defined.
    #[error("unknown function \"{name}\" called")]
    UndefinedFunction { name: String },
    /// Call to an undefined slot with no recorded name.
    #[error("unknown function with index {index} called")]
    UndefinedFunctionIndex { index: usize },
    /// Stack pointer would leave the memory arena.
    #[error("stack overflow")]
    StackOverflow,
    /// Pop below the globals region.
    #[error("stack underflow")]
    StackUnderflow,
    /// Division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Host-supplied access size that is not 1, 2, 4, or 8 bytes.
    #[error("invalid size: {size}")]
    InvalidSize { size: usize },
    /// Argument register index past the register file.
    #[error("argument index {index} is out of bounds")]
    ArgumentOutOfBounds { index: usize },
    /// Failure reported by a host callback.
    #[error("native callback error: {message}")]
    NativeCallback { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_structured_fields() {
        let err = VmError::InvalidRegister { index: 91 };
        assert_eq!(err.to_string(), "invalid register: 91");

        let err = VmError::InvalidPointer { pointer: 0 };
        assert_eq!(err.to_string(), "segmentation fault: invalid pointer 0x00000000");

        let err = VmError::UndefinedFunction {
            name: "missing".to_string(),
        };
        assert_eq!(err.to_string(), "unknown function \"missing\" called");
    }

    #[test]
    fn error_trait_is_implemented() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&VmError::DivisionByZero);
    }
}
