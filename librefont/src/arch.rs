//! Architecture constants for the x86 family.

/// Size in bytes of a `jmp rel32` patch.
pub const JMP_REL32_LEN: usize = 5;

/// Size in bytes of an absolute `jmp [rip+0]` + 8-byte address thunk.
pub const JMP_ABS64_LEN: usize = 14;

/// Worst-case jump encoding length on the current architecture.
#[cfg(target_arch = "x86")]
pub const MAX_JUMP_LEN: usize = JMP_REL32_LEN;

/// Worst-case jump encoding length on the current architecture.
#[cfg(not(target_arch = "x86"))]
pub const MAX_JUMP_LEN: usize = JMP_ABS64_LEN;

/// Decoder/encoder bitness passed to iced-x86.
#[cfg(target_arch = "x86")]
pub const BITNESS: u32 = 32;

/// Decoder/encoder bitness passed to iced-x86.
#[cfg(not(target_arch = "x86"))]
pub const BITNESS: u32 = 64;

/// Longest legal x86 instruction. Used as slack when reading code bytes so
/// the decoder never runs out of buffer mid-instruction.
pub const MAX_INSTRUCTION_LEN: usize = 15;
