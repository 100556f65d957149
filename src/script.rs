/// Output Script Decoding
///
/// Extracts the destination address and the optional output lock from a
/// scriptPubKey. Time-locked outputs carry a standard script prefixed by
/// `<locktime> OP_CHECKLOCKTIMEVERIFY OP_DROP`.
///
/// Supported destinations:
/// - P2PKH: `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
/// - P2SH:  `OP_HASH160 <20> OP_EQUAL`
/// - P2PK:  `<33|65 byte pubkey> OP_CHECKSIG` (reported as the key's P2PKH address)

use ripemd160::Ripemd160;
use sha2::{Digest, Sha256};

use crate::types::{AddressKey, AddressKind};

#[allow(dead_code)]
mod opcodes {
    pub const OP_0: u8 = 0x00;
    pub const OP_PUSHBYTES_MAX: u8 = 0x4b;
    pub const OP_1NEGATE: u8 = 0x4f;
    pub const OP_1: u8 = 0x51;
    pub const OP_16: u8 = 0x60;
    pub const OP_DROP: u8 = 0x75;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;
    pub const OP_HASH160: u8 = 0xa9;
    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
}

use opcodes::*;

/// Largest CScriptNum accepted as a lock value (CLTV allows 5 bytes)
const MAX_LOCK_NUM_BYTES: usize = 5;

/// Split a script into its lock value and the remaining standard script.
///
/// Returns `(0, script)` when there is no lock prefix.
pub fn split_lock_prefix(script: &[u8]) -> (u32, &[u8]) {
    let Some(&first) = script.first() else {
        return (0, script);
    };

    let (value, consumed) = match first {
        OP_0 => (0i64, 1usize),
        OP_1..=OP_16 => ((first - OP_1 + 1) as i64, 1),
        n if n >= 1 && (n as usize) <= MAX_LOCK_NUM_BYTES => {
            let len = n as usize;
            if script.len() < 1 + len {
                return (0, script);
            }
            match decode_script_num(&script[1..1 + len]) {
                Some(v) => (v, 1 + len),
                None => return (0, script),
            }
        }
        _ => return (0, script),
    };

    if script.len() < consumed + 2
        || script[consumed] != OP_CHECKLOCKTIMEVERIFY
        || script[consumed + 1] != OP_DROP
    {
        return (0, script);
    }

    // Negative or oversized values can never satisfy CLTV; treat as unlocked marker
    let lock = if (0..=u32::MAX as i64).contains(&value) { value as u32 } else { 0 };
    (lock, &script[consumed + 2..])
}

/// Lock value of an output script, zero when the output is not locked
pub fn output_lock_time(script: &[u8]) -> u32 {
    split_lock_prefix(script).0
}

/// Destination of an output script, ignoring any lock prefix
pub fn extract_destination(script: &[u8]) -> Option<AddressKey> {
    let (_, script) = split_lock_prefix(script);

    // P2PKH: 76a914{20 byte pubkey hash}88ac
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        return Some(AddressKey::new(to_hash160(&script[3..23]), AddressKind::PubKeyHash));
    }

    // P2SH: a914{20 byte script hash}87
    if script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL {
        return Some(AddressKey::new(to_hash160(&script[2..22]), AddressKind::ScriptHash));
    }

    // P2PK: compressed (0x21 + 33 + ac) or uncompressed (0x41 + 65 + ac)
    if (script.len() == 35 && script[0] == 0x21 && script[34] == OP_CHECKSIG)
        || (script.len() == 67 && script[0] == 0x41 && script[66] == OP_CHECKSIG)
    {
        let pubkey = &script[1..script.len() - 1];
        return Some(AddressKey::new(hash160(pubkey), AddressKind::PubKeyHash));
    }

    None
}

/// Standard scriptPubKey paying to an address key
pub fn script_for_key(key: &AddressKey) -> Vec<u8> {
    match key.kind {
        AddressKind::PubKeyHash => {
            let mut script = Vec::with_capacity(25);
            script.extend_from_slice(&[OP_DUP, OP_HASH160, 0x14]);
            script.extend_from_slice(&key.hash);
            script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
            script
        }
        AddressKind::ScriptHash => {
            let mut script = Vec::with_capacity(23);
            script.extend_from_slice(&[OP_HASH160, 0x14]);
            script.extend_from_slice(&key.hash);
            script.push(OP_EQUAL);
            script
        }
    }
}

/// `<lock> OP_CHECKLOCKTIMEVERIFY OP_DROP` prefix for a lock value
pub fn lock_prefix(lock_time: u32) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(8);
    match lock_time {
        0 => prefix.push(OP_0),
        1..=16 => prefix.push(OP_1 + (lock_time as u8) - 1),
        _ => {
            let num = encode_script_num(lock_time as i64);
            prefix.push(num.len() as u8);
            prefix.extend_from_slice(&num);
        }
    }
    prefix.extend_from_slice(&[OP_CHECKLOCKTIMEVERIFY, OP_DROP]);
    prefix
}

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(&sha);
    to_hash160(&ripemd)
}

fn to_hash160(bytes: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes[..20]);
    out
}

/// Little-endian sign-magnitude number as used by script pushes
fn decode_script_num(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    let mut value: i64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        value |= (*byte as i64) << (8 * i);
    }
    let last = bytes[bytes.len() - 1];
    if last & 0x80 != 0 {
        let mask = !(0x80i64 << (8 * (bytes.len() - 1)));
        return Some(-(value & mask));
    }
    Some(value)
}

fn encode_script_num(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let neg = value < 0;
    let mut abs = value.unsigned_abs();
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if out[out.len() - 1] & 0x80 != 0 {
        out.push(if neg { 0x80 } else { 0x00 });
    } else if neg {
        let last = out.len() - 1;
        out[last] |= 0x80;
    }
    out
}
