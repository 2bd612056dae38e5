//! Payload masking (RFC 6455 Section 5.3) and the random values it needs.

use std::time::{SystemTime, UNIX_EPOCH};

/// Scalar byte-by-byte XOR masking.
///
/// Byte `i` is XORed with `mask[i % 4]`. Applying the same mask twice
/// restores the input.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Word-at-a-time XOR masking.
///
/// Produces exactly the same output as [`apply_mask`], processing four bytes
/// per step.
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);

    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(val ^ mask_u32).to_ne_bytes());
    }

    // Remainder starts on a multiple of 4, so the mask index restarts at 0.
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i];
    }
}

/// Fill `buf` from the OS random source.
///
/// Falls back to a time-seeded mix if the OS source is unavailable.
fn fill_random(buf: &mut [u8]) {
    if getrandom::getrandom(buf).is_ok() {
        return;
    }

    tracing::warn!("OS random source unavailable, falling back to time-seeded mask");
    let mut state = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u32)
        .unwrap_or(0x1234_5678);
    for chunk in buf.chunks_mut(4) {
        state = state.wrapping_add(0x9E37_79B9);
        let b = state.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        let d = c.wrapping_mul(0xC2B2_AE35);
        let bytes = d.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
}

/// Generate a fresh masking key for one outgoing frame.
#[must_use]
pub fn generate_mask() -> [u8; 4] {
    let mut key = [0u8; 4];
    fill_random(&mut key);
    key
}

/// Generate the 16 random bytes behind a `Sec-WebSocket-Key`.
#[must_use]
pub fn generate_nonce() -> [u8; 16] {
    let mut nonce = [0u8; 16];
    fill_random(&mut nonce);
    nonce
}
