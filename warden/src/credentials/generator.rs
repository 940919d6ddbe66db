//! Secret generation.
//!
//! Conformance is constructive: one character is drawn from every required
//! class, the rest come uniformly from the full alphabet, and the result is
//! shuffled. No candidate is ever rejected and redrawn.

use super::policy::SecretPolicy;
use super::secret::Secret;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use zeroize::Zeroizing;

/// Bytes in a generated symmetric key.
pub const KEY_BYTES: usize = 32;

/// Generate a secret for `policy` from `rng`.
pub fn generate_with<R: Rng>(policy: &SecretPolicy, rng: &mut R) -> Secret {
    let alphabet = policy.full_alphabet();
    let length = policy.generated_length();
    let mut buf = Zeroizing::new(Vec::with_capacity(length));

    for class in &policy.required {
        let chars = class.alphabet();
        buf.push(chars[rng.random_range(0..chars.len())]);
    }
    while buf.len() < length {
        buf.push(alphabet[rng.random_range(0..alphabet.len())]);
    }
    buf.shuffle(rng);

    // Every alphabet is ASCII.
    Secret::new(buf.iter().map(|&b| b as char).collect::<String>())
}

/// Generate a secret for `policy` from the thread-local CSPRNG.
pub fn generate(policy: &SecretPolicy) -> Secret {
    generate_with(policy, &mut rand::rng())
}

/// Hex-encoded 256-bit key.
pub fn generate_key_with<R: RngCore>(rng: &mut R) -> Secret {
    let mut bytes = Zeroizing::new([0u8; KEY_BYTES]);
    rng.fill_bytes(&mut bytes[..]);
    Secret::new(hex::encode(&bytes[..]))
}

/// Source of every secret generated during one resolution.
pub struct CredentialGenerator {
    rng: StdRng,
}

impl CredentialGenerator {
    /// Seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible generator for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn secret(&mut self, policy: &SecretPolicy) -> Secret {
        generate_with(policy, &mut self.rng)
    }

    pub fn key(&mut self) -> Secret {
        generate_key_with(&mut self.rng)
    }
}

impl Default for CredentialGenerator {
    fn default() -> Self {
        Self::new()
    }
}
