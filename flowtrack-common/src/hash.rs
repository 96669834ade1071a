//! Jenkins hash over flow key bytes.
//!
//! This is Bob Jenkins' lookup3 `hashlittle`, the same function DPDK ships as
//! `rte_jhash`, so a key hashed here lands in the same bucket as one hashed by
//! a DPDK flow table configured with the same seed.

/// Seed used for all flow key hashing.
pub const FLOW_HASH_SEED: u32 = 0;

const JHASH_GOLDEN_RATIO: u32 = 0xdead_beef;

#[inline(always)]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

#[inline(always)]
fn finalize(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

/// Read up to four bytes as a little-endian word, zero padded.
#[inline(always)]
fn read_partial(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word[..bytes.len()].copy_from_slice(bytes);
    u32::from_le_bytes(word)
}

/// Hash `data` with the given `seed`.
pub fn jhash(data: &[u8], seed: u32) -> u32 {
    let init = JHASH_GOLDEN_RATIO
        .wrapping_add(data.len() as u32)
        .wrapping_add(seed);
    let (mut a, mut b, mut c) = (init, init, init);

    let mut rest = data;
    while rest.len() > 12 {
        a = a.wrapping_add(read_partial(&rest[0..4]));
        b = b.wrapping_add(read_partial(&rest[4..8]));
        c = c.wrapping_add(read_partial(&rest[8..12]));
        mix(&mut a, &mut b, &mut c);
        rest = &rest[12..];
    }

    // Zero-length tail: no final mixing.
    if rest.is_empty() {
        return c;
    }

    let tail_a = &rest[..rest.len().min(4)];
    let tail_b = rest.get(4..rest.len().min(8)).unwrap_or(&[]);
    let tail_c = rest.get(8..).unwrap_or(&[]);
    a = a.wrapping_add(read_partial(tail_a));
    b = b.wrapping_add(read_partial(tail_b));
    c = c.wrapping_add(read_partial(tail_c));
    finalize(&mut a, &mut b, &mut c);
    c
}

/// Hash a flow key's byte representation with [`FLOW_HASH_SEED`].
#[inline]
pub fn flow_hash(bytes: &[u8]) -> u32 {
    jhash(bytes, FLOW_HASH_SEED)
}
