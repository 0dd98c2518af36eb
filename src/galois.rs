//! GF(2^8) arithmetic surface
//!
//! Thin wrappers over the `reed-solomon-erasure` Galois tables so the pair
//! codec and the scalar MDS codec always agree on the field (polynomial
//! 0x11D, field size 256). Region operations work on whole sub-chunks; the
//! backing implementation may vectorize them.

use reed_solomon_erasure::galois_8;

/// Field addition (XOR)
#[inline]
pub fn gf_add(a: u8, b: u8) -> u8 {
    galois_8::add(a, b)
}

/// Field multiplication
#[inline]
pub fn gf_mul(a: u8, b: u8) -> u8 {
    galois_8::mul(a, b)
}

/// Multiplicative inverse, `1 / a`. `a` must be non-zero.
#[inline]
pub fn gf_inv(a: u8) -> u8 {
    debug_assert_ne!(a, 0);
    galois_8::div(1, a)
}

/// `dst[i] = c * src[i]` over the whole region
#[inline]
pub fn region_multiply(c: u8, src: &[u8], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    galois_8::mul_slice(c, src, dst);
}

/// `dst[i] ^= c * src[i]` over the whole region
#[inline]
pub fn region_multiply_xor(c: u8, src: &[u8], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    galois_8::mul_slice_xor(c, src, dst);
}

/// `dst[i] ^= src[i]` over the whole region
#[inline]
pub fn region_xor(src: &[u8], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

// =============================================================================
// Tests
// =============================================================================
