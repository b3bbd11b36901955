//! Keccak-f[800] and the two ProgPow absorptions built on it.
//!
//! ProgPow uses the 800-bit Keccak permutation (25 x u32 state, 22 rounds)
//! instead of the usual f[1600]: the seed derivation ("short", 64-bit
//! output) and the final hash ("long", 256-bit output) share one state
//! layout: words 0..8 hold the header hash, 8..10 a 64-bit value (nonce or
//! seed), 10..18 an 8-word digest, and the rest stay zero.

const ROUNDS: usize = 22;

/// Keccak round constants truncated to 32 bits.
const RNDC: [u32; ROUNDS] = [
    0x0000_0001, 0x0000_8082, 0x0000_808a, 0x8000_8000, 0x0000_808b, 0x8000_0001, 0x8000_8081,
    0x0000_8009, 0x0000_008a, 0x0000_0088, 0x8000_8009, 0x8000_000a, 0x8000_808b, 0x0000_008b,
    0x0000_8089, 0x0000_8003, 0x0000_8002, 0x0000_0080, 0x0000_800a, 0x8000_000a, 0x8000_8081,
    0x0000_8080,
];

/// Rho rotation offsets, reduced mod 32 for the u32 lane width.
const ROTC: [u32; 24] = [
    1, 3, 6, 10, 15, 21, 28, 4, 13, 23, 2, 14, 27, 9, 24, 8, 25, 11, 30, 18, 7, 29, 20, 12,
];

/// Pi lane permutation schedule.
const PILN: [usize; 24] = [
    10, 7, 11, 17, 18, 3, 5, 16, 8, 21, 24, 4, 15, 23, 19, 13, 12, 2, 20, 14, 22, 9, 6, 1,
];

fn keccak_f800_round(st: &mut [u32; 25], round: usize) {
    // Theta
    let mut bc = [0u32; 5];
    for i in 0..5 {
        bc[i] = st[i] ^ st[i + 5] ^ st[i + 10] ^ st[i + 15] ^ st[i + 20];
    }
    for i in 0..5 {
        let t = bc[(i + 4) % 5] ^ bc[(i + 1) % 5].rotate_left(1);
        for j in (0..25).step_by(5) {
            st[j + i] ^= t;
        }
    }
    // Rho & Pi
    let mut t = st[1];
    for i in 0..24 {
        let j = PILN[i];
        let tmp = st[j];
        st[j] = t.rotate_left(ROTC[i]);
        t = tmp;
    }
    // Chi
    for j in (0..25).step_by(5) {
        let row = [st[j], st[j + 1], st[j + 2], st[j + 3], st[j + 4]];
        for i in 0..5 {
            st[j + i] = row[i] ^ (!row[(i + 1) % 5] & row[(i + 2) % 5]);
        }
    }
    // Iota
    st[0] ^= RNDC[round];
}

pub(crate) fn keccak_f800(st: &mut [u32; 25]) {
    for round in 0..ROUNDS {
        keccak_f800_round(st, round);
    }
}

fn absorb(header_hash: &[u8; 32], value: u64, digest: &[u32; 8]) -> [u32; 25] {
    let mut st = [0u32; 25];
    for (word, chunk) in st.iter_mut().zip(header_hash.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    st[8] = value as u32;
    st[9] = (value >> 32) as u32;
    st[10..18].copy_from_slice(digest);
    st
}

/// Derive the 64-bit ProgPow seed from (header hash, nonce, result).
///
/// The result slot is zero when deriving the initial seed; the state
/// layout is shared with [`keccak_f800_long`] so miners can keep both
/// absorptions in one kernel.
pub fn keccak_f800_short(header_hash: &[u8; 32], nonce: u64, result: &[u32; 8]) -> u64 {
    let mut st = absorb(header_hash, nonce, result);
    keccak_f800(&mut st);
    u64::from(st[0]) | (u64::from(st[1]) << 32)
}

/// Compute the final 32-byte ProgPow result from (header hash, seed, mix).
pub fn keccak_f800_long(header_hash: &[u8; 32], seed: u64, mix: &[u32; 8]) -> [u8; 32] {
    let mut st = absorb(header_hash, seed, mix);
    keccak_f800(&mut st);
    let mut out = [0u8; 32];
    for (chunk, word) in out.chunks_exact_mut(4).zip(st.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}
