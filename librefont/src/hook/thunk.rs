//! Raw jump instruction encodings.
//!
//! Two forms exist. `jmp rel32` (5 bytes, `E9 xx xx xx xx`) covers targets
//! within ±2 GiB of the patch site; the displacement is
//! `to - from - 5`, i.e. relative to the end of the instruction. Targets
//! further away on x86_64 need the 14-byte indirect form
//! `FF 25 00 00 00 00` followed by the absolute 8-byte address.

use thiserror::Error;

use crate::arch::{JMP_ABS64_LEN, JMP_REL32_LEN};

#[derive(Debug, Error)]
pub enum ThunkError {
    #[error("jump displacement out of rel32 range (from 0x{from:X} to 0x{to:X})")]
    DisplacementOutOfRange { from: usize, to: usize },
}

pub type ThunkResult<T> = std::result::Result<T, ThunkError>;

const JMP_REL32_OPCODE: u8 = 0xE9;
const JMP_ABS64_PREFIX: [u8; 6] = [0xFF, 0x25, 0x00, 0x00, 0x00, 0x00];

fn rel32_displacement(from: usize, to: usize) -> Option<i32> {
    let disp = (to as isize)
        .wrapping_sub(from as isize)
        .wrapping_sub(JMP_REL32_LEN as isize);

    i32::try_from(disp).ok()
}

/// Patch width needed to jump from `from` to `to`.
///
/// Always 5 on x86. On x86_64 the relative form only reaches ±2 GiB, so a
/// distant detour widens the patch to the 14-byte absolute form.
pub fn jump_len(from: usize, to: usize) -> usize {
    #[cfg(target_arch = "x86")]
    {
        let _ = (from, to);
        JMP_REL32_LEN
    }

    #[cfg(not(target_arch = "x86"))]
    {
        if rel32_displacement(from, to).is_some() {
            JMP_REL32_LEN
        } else {
            JMP_ABS64_LEN
        }
    }
}

/// Encodes `jmp rel32` located at `from` transferring to `to`.
pub fn encode_jmp_rel32(from: usize, to: usize) -> ThunkResult<[u8; JMP_REL32_LEN]> {
    let disp =
        rel32_displacement(from, to).ok_or(ThunkError::DisplacementOutOfRange { from, to })?;

    let mut bytes = [0u8; JMP_REL32_LEN];
    bytes[0] = JMP_REL32_OPCODE;
    bytes[1..].copy_from_slice(&disp.to_le_bytes());

    Ok(bytes)
}

/// Encodes `jmp [rip+0]` followed by the absolute target address.
pub fn encode_jmp_abs64(to: usize) -> [u8; JMP_ABS64_LEN] {
    let mut bytes = [0u8; JMP_ABS64_LEN];
    bytes[..6].copy_from_slice(&JMP_ABS64_PREFIX);
    bytes[6..].copy_from_slice(&(to as u64).to_le_bytes());

    bytes
}

/// Encodes whichever jump form [`jump_len`] selected for this pair.
pub fn encode_jump(from: usize, to: usize) -> ThunkResult<Vec<u8>> {
    if jump_len(from, to) == JMP_REL32_LEN {
        Ok(encode_jmp_rel32(from, to)?.to_vec())
    } else {
        Ok(encode_jmp_abs64(to).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_rel32() {
        let bytes = encode_jmp_rel32(0x1000, 0x2000).unwrap();

        assert_eq!(bytes[0], 0xE9);
        // 0x2000 - 0x1000 - 5
        let disp = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        assert_eq!(disp, 0x0FFB);
    }

    #[test]
    fn backward_rel32() {
        let bytes = encode_jmp_rel32(0x2000, 0x1000).unwrap();

        let disp = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        assert_eq!(disp, -0x1005);
    }

    #[test]
    fn zero_length_jump_targets_next_instruction() {
        // jmp to the byte right after the instruction itself
        let bytes = encode_jmp_rel32(0x1000, 0x1005).unwrap();

        let disp = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        assert_eq!(disp, 0);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn out_of_range_displacement_is_rejected() {
        let err = encode_jmp_rel32(0x1000, 0x1_0000_0000_0000);
        assert!(matches!(
            err,
            Err(ThunkError::DisplacementOutOfRange { .. })
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn distant_target_selects_absolute_form() {
        let from = 0x1000usize;
        let to = 0x7FFF_FFFF_0000usize;

        assert_eq!(jump_len(from, to), JMP_ABS64_LEN);

        let bytes = encode_jump(from, to).unwrap();
        assert_eq!(bytes.len(), JMP_ABS64_LEN);
        assert_eq!(&bytes[..6], &[0xFF, 0x25, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(&bytes[6..], &(to as u64).to_le_bytes());
    }

    #[test]
    fn near_target_selects_relative_form() {
        assert_eq!(jump_len(0x1000, 0x2000), JMP_REL32_LEN);
        assert_eq!(encode_jump(0x1000, 0x2000).unwrap().len(), JMP_REL32_LEN);
    }
}
