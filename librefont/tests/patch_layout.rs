//! End-to-end checks of the redirect and trampoline byte layout, driven
//! entirely over byte buffers so they run on any host.
//!
//! The semantic claim: after patching, the target entry decodes as a jump
//! to the detour, and the trampoline bytes decode as the original stolen
//! instructions followed by a jump to the first unstolen byte.

#![cfg(not(target_arch = "x86"))]

use iced_x86::{Decoder, DecoderOptions, FlowControl, Mnemonic};

use librefont::arch::BITNESS;
use librefont::hook::prologue::Prologue;
use librefont::hook::thunk;

// push rbp; mov rbp, rsp; sub rsp, 0x20; mov [rbp-8], rcx; nops
const TARGET_CODE: [u8; 16] = [
    0x55, 0x48, 0x89, 0xE5, 0x48, 0x83, 0xEC, 0x20, 0x48, 0x89, 0x4D, 0xF8, 0x90, 0x90, 0x90,
    0x90,
];

const TARGET_IP: u64 = 0x7FF6_0001_0000;
const DETOUR_IP: u64 = 0x7FF6_0003_0000;
const TRAMPOLINE_IP: u64 = 0x7FF6_0002_0000;

fn decode_all(bytes: &[u8], ip: u64) -> Vec<iced_x86::Instruction> {
    let mut decoder = Decoder::with_ip(BITNESS, bytes, ip, DecoderOptions::NONE);
    let mut out = Vec::new();
    while decoder.can_decode() {
        out.push(decoder.decode());
    }
    out
}

#[test]
fn patch_redirects_target_entry_to_detour() {
    let patch_len = thunk::jump_len(TARGET_IP as usize, DETOUR_IP as usize);
    assert_eq!(patch_len, 5);

    let patch = thunk::encode_jump(TARGET_IP as usize, DETOUR_IP as usize).unwrap();

    let mut decoder = Decoder::with_ip(BITNESS, &patch, TARGET_IP, DecoderOptions::NONE);
    let jump = decoder.decode();

    assert_eq!(jump.mnemonic(), Mnemonic::Jmp);
    assert_eq!(jump.near_branch_target(), DETOUR_IP);
}

#[test]
fn trampoline_replays_prologue_then_resumes_past_the_patch() {
    let patch_len = thunk::jump_len(TARGET_IP as usize, DETOUR_IP as usize);

    let prologue = Prologue::decode(&TARGET_CODE, TARGET_IP, patch_len).unwrap();

    // whole instructions only: push(1) + mov(3) + sub(4) = 8 >= 5
    assert_eq!(prologue.len(), 8);
    assert_eq!(prologue.bytes(), &TARGET_CODE[..8]);

    // assemble the trampoline image the way the installer would
    let relocated = prologue.relocate(TRAMPOLINE_IP).unwrap();
    let resume_at = TARGET_IP + prologue.len() as u64;
    let jump_back_ip = TRAMPOLINE_IP + relocated.len() as u64;
    let jump_back =
        thunk::encode_jump(jump_back_ip as usize, resume_at as usize).unwrap();

    let mut stub = relocated.clone();
    stub.extend_from_slice(&jump_back);

    let instructions = decode_all(&stub, TRAMPOLINE_IP);

    // original instruction sequence survives relocation
    let mnemonics: Vec<Mnemonic> = instructions.iter().map(|i| i.mnemonic()).collect();
    assert_eq!(
        mnemonics,
        vec![Mnemonic::Push, Mnemonic::Mov, Mnemonic::Sub, Mnemonic::Jmp]
    );

    // and the stub hands control back to the first unstolen byte
    let jump = instructions.last().unwrap();
    assert_eq!(jump.flow_control(), FlowControl::UnconditionalBranch);
    assert_eq!(jump.near_branch_target(), resume_at);
}

#[test]
fn saved_prologue_matches_target_bytes_exactly() {
    let prologue = Prologue::decode(&TARGET_CODE, TARGET_IP, 5).unwrap();

    // the record of what the patch will overwrite (and more, up to the
    // instruction boundary) is bit-for-bit the original code
    assert!(prologue.len() >= 5);
    assert_eq!(prologue.bytes(), &TARGET_CODE[..prologue.len()]);
}
