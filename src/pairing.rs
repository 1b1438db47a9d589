//! Deterministic pairing keys shared by every cache in the crate.
//!
//! `key(x, y)` is the Cantor pairing function. It is injective on pairs of
//! non-negative integers and order dependent, so `key(a, b)` and `key(b, a)`
//! name the two directions of a link while `unordered_key` names the link.
//!
//! Inputs are u32 and keys u128: the largest key, `key(u32::MAX, u32::MAX)`,
//! is below 2^66, so the arithmetic never overflows.

/// Cantor pairing `((x + y)(x + y + 1)) / 2 + y`
pub const fn key(x: u32, y: u32) -> u128 {
    let (x, y) = (x as u128, y as u128);
    ((x + y) * (x + y + 1)) / 2 + y
}

/// Direction-independent key for the pair `{x, y}`
pub fn unordered_key(x: u32, y: u32) -> u128 {
    key(x.min(y), x.max(y))
}

/// Forward and reverse keys of the directed pair `(x, y)`
pub fn directed_keys(x: u32, y: u32) -> (u128, u128) {
    (key(x, y), key(y, x))
}
