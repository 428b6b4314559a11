//! Account discriminators.
//!
//! Every Anchor account starts with an 8-byte prefix identifying its type:
//! the first 8 bytes of `SHA-256("account:<TypeName>")`, where `TypeName`
//! is the account name exactly as declared in the IDL. Collisions between
//! differently named types are assumed absent.

use sha2::{Digest, Sha256};

/// Width of the discriminator prefix in bytes.
pub const DISCRIMINATOR_SIZE: usize = 8;

/// An account type discriminator.
pub type Discriminator = [u8; DISCRIMINATOR_SIZE];

/// Compute the discriminator for the account type `name`.
pub fn account_discriminator(name: &str) -> Discriminator {
    let digest = Sha256::digest(format!("account:{name}").as_bytes());
    let mut out = [0u8; DISCRIMINATOR_SIZE];
    out.copy_from_slice(&digest[..DISCRIMINATOR_SIZE]);
    out
}

/// Returns `true` if `data` begins with `discriminator`.
/// Data shorter than the prefix never matches.
pub fn matches(discriminator: &Discriminator, data: &[u8]) -> bool {
    data.len() >= DISCRIMINATOR_SIZE && data[..DISCRIMINATOR_SIZE] == discriminator[..]
}
