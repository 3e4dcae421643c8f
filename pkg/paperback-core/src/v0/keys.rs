/*
 * paperback: paper backup generator suitable for long-term storage
 * Copyright (C) 2018-2022 Aleksa Sarai <cyphar@cyphar.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use crate::v0::{ChaChaPolyNonce, Error, CHACHAPOLY_KEY_LENGTH};

use argon2::{Algorithm, Argon2, Params, Version};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

const SEED_SIZE: usize = 128;

// The KDF input is 128 bytes of CSPRNG output, so this pass is entropy
// whitening against a bad OS RNG rather than passphrase stretching --
// memory-hardness is not load-bearing here and the parameters can stay
// small. Key generation happens once per artifact.
const ARGON2_MEMORY_KIB: u32 = 1024;
const ARGON2_TIME_COST: u32 = 2;
const ARGON2_LANES: u32 = 1;

/// Generate a new ChaCha20-Poly1305 key, sourced from the caller's CSPRNG
/// and passed through Argon2id to reduce the probability of getting a "bad
/// key" out of a compromised entropy source.
pub(crate) fn generate_key<R: RngCore + CryptoRng + ?Sized>(
    rng: &mut R,
) -> Result<Zeroizing<[u8; CHACHAPOLY_KEY_LENGTH]>, Error> {
    let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
    rng.fill_bytes(&mut *seed);
    let mut salt = Zeroizing::new([0u8; SEED_SIZE]);
    rng.fill_bytes(&mut *salt);

    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_TIME_COST,
        ARGON2_LANES,
        Some(CHACHAPOLY_KEY_LENGTH),
    )
    .expect("static argon2 parameters must be valid");
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; CHACHAPOLY_KEY_LENGTH]);
    argon2
        .hash_password_into(&*seed, &*salt, &mut *key)
        .map_err(|err| Error::Other(format!("argon2 key generation: {}", err)))?;
    Ok(key)
}

/// Draw a fresh ChaCha20-Poly1305 nonce straight from the caller's CSPRNG.
/// Nonces must never be derived deterministically -- reuse under the same
/// key is catastrophic for this AEAD.
pub(crate) fn generate_nonce<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> ChaChaPolyNonce {
    let mut nonce = ChaChaPolyNonce::default();
    rng.fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod test {
    use super::*;

    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn generated_keys_are_distinct() {
        let mut rng = ChaCha20Rng::seed_from_u64(0x6b6579);
        let a = generate_key(&mut rng).unwrap();
        let b = generate_key(&mut rng).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn generated_nonces_are_distinct() {
        let mut rng = ChaCha20Rng::seed_from_u64(0x6e6f6e);
        assert_ne!(generate_nonce(&mut rng), generate_nonce(&mut rng));
    }

    #[test]
    fn same_seed_same_key() {
        let a = generate_key(&mut ChaCha20Rng::seed_from_u64(7)).unwrap();
        let b = generate_key(&mut ChaCha20Rng::seed_from_u64(7)).unwrap();
        assert_eq!(*a, *b);
    }
}
