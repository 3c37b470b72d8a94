//! Clock identity derivation.
//!
//! IEEE 1588 reserves EUI-64 based identities for clocks that know a
//! hardware MAC address (`mac[0..3] + 0xFFFE + mac[3..6]`). We do not assume
//! one, so identities are built in the non-EUI-64 space (7.5.2.2.3): the two
//! most significant octets are `0xFFFF` and the remaining six carry a
//! caller-supplied seed.

/// Prefix occupying the two most significant octets of every identity we derive.
pub const NON_EUI64_PREFIX: u64 = 0xFFFF_0000_0000_0000;

/// Bits of the seed that survive into the identity (48 bits).
pub const CLOCK_IDENTITY_SEED_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Derive a 64-bit clock identity from a seed of up to 48 bits.
///
/// Bits above the lower 48 are discarded. Seed uniqueness across daemons is
/// the caller's responsibility.
#[must_use]
pub const fn clock_identity_from_seed(seed: u64) -> u64 {
    NON_EUI64_PREFIX | (seed & CLOCK_IDENTITY_SEED_MASK)
}
