//! Prologue capture with instruction-boundary validation.
//!
//! Overwriting the entry of a function with a jump steals its first bytes.
//! The stolen region must end on an instruction boundary, so the patch
//! width is rounded up to whole instructions via a real length decoder
//! instead of assuming any fixed prologue shape. If the entry contains an
//! instruction that cannot survive relocation the hook aborts here, before
//! a single target byte is written.

use iced_x86::{
    BlockEncoder, BlockEncoderOptions, Decoder, DecoderOptions, FlowControl, Instruction,
    InstructionBlock, Mnemonic,
};
use thiserror::Error;

use crate::arch::BITNESS;

#[derive(Debug, Error)]
pub enum PrologueError {
    #[error("invalid instruction at 0x{0:X}")]
    InvalidInstruction(u64),

    #[error("code buffer ended before a whole-instruction boundary was reached")]
    ShortBuffer,

    #[error("function ends inside the patch region ({0:?} at 0x{1:X})")]
    TerminatorInPatchRegion(Mnemonic, u64),

    #[error("unrelocatable instruction {0:?} at 0x{1:X}")]
    Unrelocatable(Mnemonic, u64),

    #[error("relocation failed: {0}")]
    Relocation(String),
}

pub type PrologueResult<T> = std::result::Result<T, PrologueError>;

/// The captured entry instructions of a hook target.
///
/// Holds the exact original bytes (restored nowhere, but recorded in the
/// [`PatchRecord`](crate::hook::install::PatchRecord)) and the decoded
/// instructions used for relocation into the trampoline.
pub struct Prologue {
    ip: u64,
    bytes: Vec<u8>,
    instructions: Vec<Instruction>,
}

impl Prologue {
    /// Decodes whole instructions from `code` (which starts at address
    /// `ip`) until at least `min_len` bytes are covered.
    ///
    /// Fails on invalid encodings and on returns, unconditional or
    /// indirect jumps and `loop`-family instructions inside the patch
    /// region: either the function is too short to hook or the control
    /// flow would not survive being re-executed from the trampoline.
    /// Conditional branches and calls are allowed; the block encoder
    /// re-targets them during relocation.
    pub fn decode(code: &[u8], ip: u64, min_len: usize) -> PrologueResult<Self> {
        let mut decoder = Decoder::with_ip(BITNESS, code, ip, DecoderOptions::NONE);

        let mut taken = 0usize;
        let mut instructions = Vec::new();

        while taken < min_len {
            if !decoder.can_decode() {
                return Err(PrologueError::ShortBuffer);
            }

            let instruction = decoder.decode();

            if instruction.is_invalid() {
                return Err(PrologueError::InvalidInstruction(instruction.ip()));
            }

            match instruction.flow_control() {
                FlowControl::Return | FlowControl::UnconditionalBranch => {
                    return Err(PrologueError::TerminatorInPatchRegion(
                        instruction.mnemonic(),
                        instruction.ip(),
                    ));
                }
                FlowControl::IndirectBranch | FlowControl::IndirectCall => {
                    return Err(PrologueError::Unrelocatable(
                        instruction.mnemonic(),
                        instruction.ip(),
                    ));
                }
                _ => {}
            }

            // loop/jecxz only encode as rel8 and cannot be widened
            if matches!(
                instruction.mnemonic(),
                Mnemonic::Loop | Mnemonic::Loope | Mnemonic::Loopne | Mnemonic::Jcxz | Mnemonic::Jecxz | Mnemonic::Jrcxz
            ) {
                return Err(PrologueError::Unrelocatable(
                    instruction.mnemonic(),
                    instruction.ip(),
                ));
            }

            taken += instruction.len();
            instructions.push(instruction);
        }

        Ok(Self {
            ip,
            bytes: code[..taken].to_vec(),
            instructions,
        })
    }

    /// Number of stolen bytes; always `>= min_len` and a whole number of
    /// instructions.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The exact original bytes, captured before any write to the target.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Address the prologue was captured from.
    pub fn ip(&self) -> u64 {
        self.ip
    }

    /// Re-encodes the stolen instructions for execution at `new_ip`.
    ///
    /// Relative branches and RIP-relative memory operands are fixed up by
    /// the block encoder; if a fix-up is impossible (target out of reach
    /// from the trampoline) this fails and the hook is aborted.
    pub fn relocate(&self, new_ip: u64) -> PrologueResult<Vec<u8>> {
        let block = InstructionBlock::new(&self.instructions, new_ip);

        let encoded = BlockEncoder::encode(BITNESS, block, BlockEncoderOptions::NONE)
            .map_err(|err| PrologueError::Relocation(err.to_string()))?;

        if encoded.code_buffer.is_empty() {
            return Err(PrologueError::Relocation(
                "block encoder produced no bytes".to_string(),
            ));
        }

        Ok(encoded.code_buffer)
    }
}

#[cfg(all(test, not(target_arch = "x86")))]
mod tests {
    use super::*;
    use iced_x86::OpKind;

    // push rbp; mov rbp, rsp; sub rsp, 0x20
    const FRAME_SETUP: [u8; 8] = [0x55, 0x48, 0x89, 0xE5, 0x48, 0x83, 0xEC, 0x20];

    #[test]
    fn rounds_up_to_instruction_boundary() {
        let prologue = Prologue::decode(&FRAME_SETUP, 0x1000, 5).unwrap();

        // 5 bytes requested; push (1) + mov (3) = 4, so the sub is taken too
        assert_eq!(prologue.len(), 8);
        assert_eq!(prologue.bytes(), &FRAME_SETUP);
    }

    #[test]
    fn exact_boundary_takes_no_extra_instruction() {
        let prologue = Prologue::decode(&FRAME_SETUP, 0x1000, 4).unwrap();
        assert_eq!(prologue.len(), 4);
    }

    #[test]
    fn one_long_instruction_can_cover_the_patch() {
        // mov rax, 0x1122334455667788 (10 bytes)
        let code = [0x48, 0xB8, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11];

        let prologue = Prologue::decode(&code, 0x1000, 5).unwrap();
        assert_eq!(prologue.len(), 10);
    }

    #[test]
    fn return_in_patch_region_aborts() {
        // xor eax, eax; ret
        let code = [0x31, 0xC0, 0xC3, 0x90, 0x90, 0x90, 0x90];

        let err = Prologue::decode(&code, 0x1000, 5);
        assert!(matches!(
            err,
            Err(PrologueError::TerminatorInPatchRegion(Mnemonic::Ret, _))
        ));
    }

    #[test]
    fn unconditional_jump_aborts() {
        // jmp rel32
        let code = [0xE9, 0x00, 0x01, 0x00, 0x00, 0x90, 0x90];

        let err = Prologue::decode(&code, 0x1000, 5);
        assert!(matches!(
            err,
            Err(PrologueError::TerminatorInPatchRegion(Mnemonic::Jmp, _))
        ));
    }

    #[test]
    fn short_buffer_is_detected() {
        let err = Prologue::decode(&FRAME_SETUP[..3], 0x1000, 5);
        assert!(matches!(err, Err(PrologueError::ShortBuffer)));
    }

    #[test]
    fn position_independent_code_relocates_verbatim() {
        let prologue = Prologue::decode(&FRAME_SETUP, 0x1000, 5).unwrap();

        let relocated = prologue.relocate(0x9000_0000).unwrap();
        assert_eq!(relocated, FRAME_SETUP);
    }

    #[test]
    fn relative_call_is_retargeted() {
        // call rel32 to 0x2000 from ip 0x1000
        let disp = (0x2000i32 - 0x1000 - 5).to_le_bytes();
        let code = [0xE8, disp[0], disp[1], disp[2], disp[3], 0x90, 0x90];

        let prologue = Prologue::decode(&code, 0x1000, 5).unwrap();
        let new_ip = 0x8000u64;
        let relocated = prologue.relocate(new_ip).unwrap();

        // decode the relocated bytes and confirm the call still reaches 0x2000
        let mut decoder = Decoder::with_ip(BITNESS, &relocated, new_ip, DecoderOptions::NONE);
        let call = decoder.decode();

        assert_eq!(call.mnemonic(), Mnemonic::Call);
        assert!(matches!(call.op0_kind(), OpKind::NearBranch64));
        assert_eq!(call.near_branch_target(), 0x2000);
    }

    #[test]
    fn rip_relative_load_is_retargeted() {
        // lea rax, [rip+0x100] at ip 0x1000 -> absolute target 0x1107
        let code = [0x48, 0x8D, 0x05, 0x00, 0x01, 0x00, 0x00, 0x90];

        let prologue = Prologue::decode(&code, 0x1000, 5).unwrap();
        let new_ip = 0x4000u64;
        let relocated = prologue.relocate(new_ip).unwrap();

        let mut decoder = Decoder::with_ip(BITNESS, &relocated, new_ip, DecoderOptions::NONE);
        let lea = decoder.decode();

        assert_eq!(lea.mnemonic(), Mnemonic::Lea);
        assert_eq!(lea.memory_displacement64(), 0x1000 + 7 + 0x100);
    }
}
