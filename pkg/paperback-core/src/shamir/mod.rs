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

//! This package implements a Shamir Secret Sharing scheme over a randomly
//! generated prime field for arbitrary blobs of data. The prime is published
//! alongside the shards. The data is split into fixed-size blocks and each
//! block is shared with its own polynomial (all blocks of one shard share a
//! single x-value). Note that the secret *length* is not kept secret in this
//! scheme (it is published in the shard metadata) -- if you wish to obscure
//! the secret length, pad the secret before splitting it.
//!
//! We have also added some protections outside the original outline of
//! Shamir's paper, as a reaction to the concerns raised by Pieprzyk and
//! Zhang about cheating in linear secret sharing. Rather than their
//! probabilistic method, we take a much simpler approach: at split time an
//! ed25519 keypair is generated and every shard is signed with it. The
//! public key is embedded in each shard (so fraudulent shards can be
//! identified and grouped), while the private key is stored *inside* the
//! shared secret -- which also allows a quorum to mint new compatible
//! shards. If that capability is not wanted, the private key is simply not
//! stored ("sealed"), after which nobody can forge or extend shards.

mod field;
mod poly;
pub(crate) mod shard;

pub use shard::{parse_id, Shard};
pub(crate) use shard::{ShardMeta, ShardPayload};

use std::collections::{HashMap, HashSet};

use ed25519_dalek::SigningKey;
use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

use crate::v0::{FromWire, ShardId, ToWire};

/// The block size (in bytes) used by default.
pub const DEFAULT_BLOCK_SIZE: u32 = 16;

/// Version of the internal secret schema. This is detached from the other
/// versions in paperback because this module can change independently.
pub(crate) const INTERNAL_SECRET_VERSION: u8 = 0x00;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("k-threshold cannot be zero")]
    InvalidThreshold,

    #[error("too few shards generated for a ({threshold}, {total}) threshold scheme")]
    NotEnoughTotalShards { threshold: u32, total: u32 },

    #[error("'prime' used for secret sharing is not a prime")]
    NotPrime,

    #[error("prime is too small for the given block size")]
    PrimeTooSmall,

    #[error("shard metadata is malformed: {0}")]
    InvalidShardMeta(&'static str),

    #[error("too few shards present to reconstruct secret (needed {needed}, had {given} usable)")]
    TooFewShards { needed: u32, given: usize },

    #[error("provided shards do not come from the same secret: {0}")]
    MismatchedShards(&'static str),

    #[error("shards carry more than one identity -- forgery detected")]
    InconsistentIdentities { groups: Vec<Vec<ShardId>> },

    #[error("shard signatures failed to verify -- forgery detected: {}", .shard_ids.join(", "))]
    ForgeryDetected { shard_ids: Vec<ShardId> },

    #[error("reconstructed secret is the wrong size (expected {expected} bytes, got {actual})")]
    WrongSecretSize { expected: usize, actual: usize },

    #[error("reconstructed secret has unknown schema version {0}")]
    UnknownSecretVersion(u8),

    #[error("recovered signing key does not match the shard public key")]
    MismatchedSigningKey,

    #[error("backup is sealed -- no new shards can be created")]
    Sealed,

    #[error("shard x-value {x_id} was already issued for this backup")]
    DuplicateX { x_id: ShardId },

    #[error("shard x-value is outside the usable field range")]
    InvalidX,

    #[error("failed to decode internal secret: {0}")]
    SecretDecode(String),

    #[error("polynomial operation failed: {0}")]
    Poly(#[from] poly::Error),
}

/// The internal representation of the secret we share. This includes the
/// caller's secret (obviously) but also the private key used for signing
/// shards -- unless the backup was sealed.
#[derive(Debug)]
pub(crate) struct InternalSecret {
    pub(crate) version: u8,
    pub(crate) id_private_key: Option<SigningKey>,
    pub(crate) data: Vec<u8>,
}

impl Drop for InternalSecret {
    fn drop(&mut self) {
        // SigningKey zeroes itself on drop.
        self.data.zeroize();
    }
}

impl InternalSecret {
    fn take_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

#[cfg(test)]
impl PartialEq for InternalSecret {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.data == other.data
            && match (&self.id_private_key, &other.id_private_key) {
                (Some(left), Some(right)) => left.to_bytes() == right.to_bytes(),
                (None, None) => true,
                _ => false,
            }
    }
}

// Shared result of verifying a pile of untrusted shards: the agreed-upon
// metadata, the de-duplicated shards, and the first-k interpolation points
// of every block.
struct VerifiedShards<'a> {
    meta: ShardMeta,
    unique: Vec<&'a Shard>,
    block_points: Vec<Vec<poly::Point>>,
}

fn verify_shards(shards: &[Shard]) -> Result<VerifiedShards<'_>, Error> {
    let first = match shards.first() {
        Some(first) => first,
        None => return Err(Error::TooFewShards { needed: 1, given: 0 }),
    };
    let meta = &first.payload.meta;

    // Group by claimed identity. More than one group means somebody slipped
    // in shards from a different (or forged) backup; report the groupings so
    // a human can figure out whose shards don't belong.
    let mut groups: HashMap<[u8; 32], Vec<ShardId>> = HashMap::new();
    for shard in shards {
        groups
            .entry(*shard.public_key().as_bytes())
            .or_default()
            .push(shard.id());
    }
    if groups.len() > 1 {
        return Err(Error::InconsistentIdentities {
            groups: groups.into_values().collect(),
        });
    }

    // Every signature must verify. Shards that fail are named, not silently
    // dropped -- the caller needs to know who to stop trusting.
    let bad_ids = shards
        .iter()
        .filter(|shard| !shard.verify())
        .map(Shard::id)
        .collect::<Vec<_>>();
    if !bad_ids.is_empty() {
        return Err(Error::ForgeryDetected { shard_ids: bad_ids });
    }

    // All shards must agree on all metadata and have the same shape.
    let num_blocks = first.payload.ys.len();
    for shard in shards {
        if shard.payload.meta != *meta {
            return Err(Error::MismatchedShards("mismatched metadata"));
        }
        if shard.payload.ys.len() != num_blocks {
            return Err(Error::MismatchedShards("mismatched block counts"));
        }
    }

    // Sanity-check the metadata itself (it is attacker-controlled up to the
    // signature check above, and self-signed garbage must still not panic).
    if meta.threshold < 1 {
        return Err(Error::InvalidShardMeta("threshold cannot be zero"));
    }
    if meta.block_size < 1 {
        return Err(Error::InvalidShardMeta("block size cannot be zero"));
    }
    if !field::probably_prime(&meta.prime, field::VERIFY_PRIME_ROUNDS) {
        return Err(Error::NotPrime);
    }
    if meta.prime <= max_block_value(meta.block_size) {
        return Err(Error::PrimeTooSmall);
    }
    if expected_block_count(meta.secret_len, meta.block_size) != Some(num_blocks) {
        return Err(Error::InvalidShardMeta(
            "block count disagrees with recorded secret size",
        ));
    }

    // De-duplicate by x. Duplicates are only acceptable if they are exact
    // copies; a duplicated x with different y-values is an attack on the
    // interpolation.
    let mut unique: Vec<&Shard> = Vec::with_capacity(shards.len());
    let mut seen: HashMap<&BigUint, &Shard> = HashMap::new();
    for shard in shards {
        match seen.get(shard.x()) {
            None => {
                seen.insert(shard.x(), shard);
                unique.push(shard);
            }
            Some(previous) if *previous == shard => continue,
            Some(_) => return Err(Error::MismatchedShards("conflicting duplicate shards")),
        }
    }

    if (unique.len() as u64) < meta.threshold as u64 {
        return Err(Error::TooFewShards {
            needed: meta.threshold,
            given: unique.len(),
        });
    }

    // Only the first k unique shards take part in interpolation.
    let quorum = &unique[..meta.threshold as usize];
    let block_points = (0..num_blocks)
        .map(|block_idx| {
            quorum
                .iter()
                .map(|shard| (shard.x().clone(), shard.payload.ys[block_idx].clone()))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    Ok(VerifiedShards {
        meta: meta.clone(),
        unique,
        block_points,
    })
}

// Max value that can be stored in a block of the given size, which is
// (2^(8*size) - 1). Every block value must be a legal field element.
fn max_block_value(block_size: u32) -> BigUint {
    (BigUint::one() << (8 * block_size as u64)) - BigUint::one()
}

// The recorded size is untrusted, so the arithmetic is checked.
fn expected_block_count(secret_len: usize, block_size: u32) -> Option<usize> {
    let block_size = block_size as usize;
    secret_len
        .checked_add(block_size - 1)
        .map(|padded| padded / block_size)
}

// Concatenate interpolated block constants back into the internal secret,
// right-sizing the (possibly short) trailing block using the recorded size.
fn combine_chunks(meta: &ShardMeta, chunks: &[BigUint]) -> Result<InternalSecret, Error> {
    let block_size = meta.block_size as usize;
    let mut secret_bytes = Zeroizing::new(Vec::with_capacity(meta.secret_len));
    for (idx, chunk) in chunks.iter().enumerate() {
        let min_length = if idx == chunks.len() - 1 {
            match meta.secret_len % block_size {
                0 => block_size,
                trailing => trailing,
            }
        } else {
            block_size
        };
        let bytes = chunk.to_bytes_be();
        if bytes.len() < min_length {
            secret_bytes.extend(std::iter::repeat(0u8).take(min_length - bytes.len()));
        }
        secret_bytes.extend_from_slice(&bytes);
    }

    if secret_bytes.len() != meta.secret_len {
        return Err(Error::WrongSecretSize {
            expected: meta.secret_len,
            actual: secret_bytes.len(),
        });
    }

    let secret =
        InternalSecret::from_wire(&*secret_bytes).map_err(Error::SecretDecode)?;
    if secret.version != INTERNAL_SECRET_VERSION {
        return Err(Error::UnknownSecretVersion(secret.version));
    }
    // Defense in depth -- anyone who gets this far already holds a quorum,
    // but the recovered key agreeing with the advertised public key is an
    // invariant worth checking.
    if let Some(key) = &secret.id_private_key {
        if key.verifying_key() != meta.public_key {
            return Err(Error::MismatchedSigningKey);
        }
    }
    Ok(secret)
}

/// Dealer for a single backup: owns the per-block polynomials and the
/// identity keypair, and hands out signed shards with unique x-values.
#[derive(Clone, Debug)]
pub struct Dealer {
    meta: ShardMeta,
    polys: Vec<poly::Polynomial>,
    id_keypair: Option<SigningKey>,
    used_xs: HashSet<BigUint>,
}

impl Dealer {
    /// Construct a new dealer for a `(threshold, _)` scheme over the given
    /// secret. If `sealed` is set, the identity private key is *not* stored
    /// inside the shared secret, which permanently disables shard extension.
    pub fn new<R: RngCore + CryptoRng + ?Sized>(
        rng: &mut R,
        threshold: u32,
        secret: &[u8],
        sealed: bool,
    ) -> Result<Self, Error> {
        if threshold < 1 {
            return Err(Error::InvalidThreshold);
        }

        let block_size = DEFAULT_BLOCK_SIZE;
        let prime = field::generate_prime(rng, 8 * block_size as u64 + 1);

        // Sanity checks for the generated prime.
        if !field::probably_prime(&prime, field::VERIFY_PRIME_ROUNDS) {
            return Err(Error::NotPrime);
        }
        if prime <= max_block_value(block_size) {
            return Err(Error::PrimeTooSmall);
        }

        // Generate the identity keypair and wrap the caller's secret into
        // our internal representation. The original secret is effectively
        // dropped so we don't accidentally share it raw.
        let mut id_secret = ed25519_dalek::SecretKey::default();
        rng.fill_bytes(&mut id_secret);
        let id_keypair = SigningKey::from_bytes(&id_secret);
        let internal_wire = Zeroizing::new(
            InternalSecret {
                version: INTERNAL_SECRET_VERSION,
                id_private_key: match sealed {
                    false => Some(id_keypair.clone()),
                    true => None,
                },
                data: secret.to_vec(),
            }
            .to_wire(),
        );

        // Split the internal secret into blocks; each block gets its own
        // random polynomial (required for security) whose constant term is
        // the block value.
        let polys = internal_wire
            .chunks(block_size as usize)
            .map(|block| {
                let mut poly = poly::Polynomial::new_rand(threshold - 1, &prime, rng);
                poly.set_constant(BigUint::from_bytes_be(block));
                poly
            })
            .collect::<Vec<_>>();

        let meta = ShardMeta {
            secret_len: internal_wire.len(),
            block_size,
            prime,
            threshold,
            public_key: id_keypair.verifying_key(),
        };

        Ok(Dealer {
            meta,
            polys,
            id_keypair: Some(id_keypair),
            used_xs: HashSet::new(),
        })
    }

    /// Reconstruct a dealer from a quorum of shards, by interpolating the
    /// full polynomial of every block. The recovered dealer can mint new
    /// shards compatible with the old ones -- unless the backup was sealed.
    pub fn recover(shards: &[Shard]) -> Result<Self, Error> {
        let verified = verify_shards(shards)?;
        let meta = verified.meta;

        let polys = verified
            .block_points
            .iter()
            .map(|points| poly::Polynomial::interpolate(meta.threshold, &meta.prime, points))
            .collect::<Result<Vec<_>, _>>()?;

        // Recover the internal secret (which holds the signing key for
        // unsealed backups) from the interpolated constants.
        let constants = polys
            .iter()
            .map(|poly| poly.constant().clone())
            .collect::<Vec<_>>();
        let secret = combine_chunks(&meta, &constants)?;

        Ok(Dealer {
            used_xs: verified
                .unique
                .iter()
                .map(|shard| shard.x().clone())
                .collect(),
            id_keypair: secret.id_private_key.clone(),
            meta,
            polys,
        })
    }

    /// Number of unique shards required to recover the secret.
    pub fn threshold(&self) -> u32 {
        self.meta.threshold
    }

    /// Public half of this backup's identity key.
    pub fn public_key(&self) -> ed25519_dalek::VerifyingKey {
        self.meta.public_key
    }

    pub(crate) fn id_keypair(&self) -> Result<&SigningKey, Error> {
        self.id_keypair.as_ref().ok_or(Error::Sealed)
    }

    /// The secret this dealer was constructed over.
    pub fn secret(&self) -> Result<Vec<u8>, Error> {
        let constants = self
            .polys
            .iter()
            .map(|poly| poly.constant().clone())
            .collect::<Vec<_>>();
        let mut secret = combine_chunks(&self.meta, &constants)?;
        Ok(secret.take_data())
    }

    /// Produce a new signed shard at a fresh random x-value, distinct from
    /// every x this dealer has issued or recovered.
    pub fn next_shard<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<Shard, Error> {
        let x = loop {
            // x = 0 would publish a block constant outright, so it is never
            // a valid evaluation point.
            let candidate = rng.gen_biguint_below(&self.meta.prime);
            if !candidate.is_zero() && !self.used_xs.contains(&candidate) {
                break candidate;
            }
        };
        self.mint_shard(x)
    }

    /// Produce a new signed shard at a caller-chosen x-value. This is used
    /// to re-issue a lost shard under its original identifier (so that
    /// repeated "losses" cannot be used to harvest extra distinct shards).
    pub fn shard_with_x(&mut self, x: &BigUint) -> Result<Shard, Error> {
        if x.is_zero() || *x >= self.meta.prime {
            return Err(Error::InvalidX);
        }
        if self.used_xs.contains(x) {
            return Err(Error::DuplicateX {
                x_id: multibase::encode(multibase::Base::Base32Z, x.to_bytes_be()),
            });
        }
        self.mint_shard(x.clone())
    }

    fn mint_shard(&mut self, x: BigUint) -> Result<Shard, Error> {
        let id_keypair = self.id_keypair.as_ref().ok_or(Error::Sealed)?;

        let ys = self
            .polys
            .iter()
            .map(|poly| poly.evaluate(&x, &self.meta.prime))
            .collect::<Result<Vec<_>, _>>()?;

        self.used_xs.insert(x.clone());
        Ok(ShardPayload {
            meta: self.meta.clone(),
            x,
            ys,
        }
        .sign(id_keypair))
    }
}

/// Construct a `(threshold, total)` scheme over the given secret, producing
/// `total` shards of which any `threshold` suffice to reconstruct it.
pub fn split<R: RngCore + CryptoRng + ?Sized>(
    rng: &mut R,
    threshold: u32,
    total: u32,
    secret: &[u8],
    sealed: bool,
) -> Result<Vec<Shard>, Error> {
    if threshold > total {
        return Err(Error::NotEnoughTotalShards { threshold, total });
    }
    let mut dealer = Dealer::new(rng, threshold, secret, sealed)?;
    (0..total).map(|_| dealer.next_shard(rng)).collect()
}

/// Reconstruct the secret from a set of shards. Only the constant term of
/// each block polynomial is interpolated, which is much cheaper than a full
/// `Dealer::recover`.
pub fn recover_secret(shards: &[Shard]) -> Result<Vec<u8>, Error> {
    let verified = verify_shards(shards)?;
    let meta = verified.meta;

    let constants = verified
        .block_points
        .iter()
        .map(|points| poly::interpolate_constant(meta.threshold, &meta.prime, points))
        .collect::<Result<Vec<_>, _>>()?;

    let mut secret = combine_chunks(&meta, &constants)?;
    Ok(secret.take_data())
}

/// Mint `count` additional shards compatible with the provided quorum.
pub fn extend<R: RngCore + CryptoRng + ?Sized>(
    rng: &mut R,
    count: u32,
    shards: &[Shard],
) -> Result<Vec<Shard>, Error> {
    let mut dealer = Dealer::recover(shards)?;
    (0..count).map(|_| dealer.next_shard(rng)).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    use quickcheck::TestResult;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn test_rng(seed: u64) -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(seed)
    }

    #[quickcheck]
    fn split_combine_roundtrip(k: u8, n: u8, secret: Vec<u8>) -> TestResult {
        let (k, n) = (k as u32, n as u32);
        if k < 1 || k > n || n > 6 {
            return TestResult::discard();
        }
        let mut rng = test_rng(0x517e);
        let shards = split(&mut rng, k, n, &secret, false).unwrap();
        assert_eq!(shards.len(), n as usize);

        // Any k shards suffice (take the tail to make sure order and choice
        // don't matter).
        let quorum = &shards[(n - k) as usize..];
        TestResult::from_bool(recover_secret(quorum).unwrap() == secret)
    }

    #[quickcheck]
    fn too_few_shards_fail(k: u8, n: u8, secret: Vec<u8>) -> TestResult {
        let (k, n) = (k as u32, n as u32);
        if k < 2 || k > n || n > 6 {
            return TestResult::discard();
        }
        let mut rng = test_rng(0x7007);
        let shards = split(&mut rng, k, n, &secret, false).unwrap();
        let not_enough = &shards[..(k - 1) as usize];
        TestResult::from_bool(matches!(
            recover_secret(not_enough),
            Err(Error::TooFewShards { .. })
        ))
    }

    #[test]
    fn shard_order_is_irrelevant() {
        let mut rng = test_rng(0x0bde);
        let secret = b"ordering should not matter";
        let mut shards = split(&mut rng, 3, 5, secret, false).unwrap();
        shards.reverse();
        assert_eq!(recover_secret(&shards).unwrap(), secret);
        shards.swap(0, 2);
        shards.swap(1, 4);
        assert_eq!(recover_secret(&shards).unwrap(), secret);
    }

    #[test]
    fn shard_xs_are_pairwise_distinct() {
        let mut rng = test_rng(0xd15c);
        let shards = split(&mut rng, 2, 32, b"some secret", false).unwrap();
        let mut xs = shards.iter().map(|s| s.x().clone()).collect::<Vec<_>>();
        xs.sort();
        xs.dedup();
        assert_eq!(xs.len(), shards.len());
    }

    #[test]
    fn empty_secret_roundtrips() {
        let mut rng = test_rng(0xe004);
        let shards = split(&mut rng, 2, 3, b"", false).unwrap();
        assert_eq!(recover_secret(&shards).unwrap(), b"");
    }

    #[test]
    fn invalid_thresholds_rejected() {
        let mut rng = test_rng(0xbad0);
        assert!(matches!(
            split(&mut rng, 0, 3, b"x", false),
            Err(Error::InvalidThreshold)
        ));
        assert!(matches!(
            split(&mut rng, 4, 3, b"x", false),
            Err(Error::NotEnoughTotalShards { threshold: 4, total: 3 })
        ));
    }

    #[test]
    fn tampered_y_is_detected() {
        let mut rng = test_rng(0xf0f0);
        let mut shards = split(&mut rng, 2, 4, b"tamper with me", false).unwrap();
        shards[1].payload.ys[0] += 1u32;
        match recover_secret(&shards) {
            Err(Error::ForgeryDetected { shard_ids }) => {
                assert_eq!(shard_ids, vec![shards[1].id()]);
            }
            other => panic!("expected forgery detection, got {:?}", other.err()),
        }
    }

    #[test]
    fn tampered_x_is_detected() {
        let mut rng = test_rng(0xf0f1);
        let mut shards = split(&mut rng, 2, 4, b"tamper with me", false).unwrap();
        shards[2].payload.x += 1u32;
        assert!(matches!(
            recover_secret(&shards),
            Err(Error::ForgeryDetected { .. })
        ));
    }

    #[test]
    fn tampered_meta_is_detected() {
        let mut rng = test_rng(0xf0f2);
        let mut shards = split(&mut rng, 2, 4, b"tamper with me", false).unwrap();
        shards[0].payload.meta.threshold = 1;
        assert!(matches!(
            recover_secret(&shards),
            Err(Error::ForgeryDetected { .. })
        ));
    }

    #[test]
    fn swapped_signature_is_detected() {
        let mut rng = test_rng(0xf0f3);
        let mut shards = split(&mut rng, 2, 4, b"tamper with me", false).unwrap();
        shards[3].signature = shards[0].signature;
        assert!(matches!(
            recover_secret(&shards),
            Err(Error::ForgeryDetected { .. })
        ));
    }

    #[test]
    fn mixed_backups_are_detected() {
        let mut rng = test_rng(0x2bad);
        let backup_a = split(&mut rng, 2, 3, b"secret A", false).unwrap();
        let backup_b = split(&mut rng, 2, 3, b"secret B", false).unwrap();
        let mixed = vec![backup_a[0].clone(), backup_b[0].clone()];
        match recover_secret(&mixed) {
            Err(Error::InconsistentIdentities { groups }) => assert_eq!(groups.len(), 2),
            other => panic!("expected inconsistent identities, got {:?}", other.err()),
        }
    }

    #[test]
    fn conflicting_duplicate_x_is_detected() {
        let mut rng = test_rng(0xdddd);
        let shards = split(&mut rng, 2, 3, b"duplicates", false).unwrap();

        // A shard that reuses shard[0]'s x but carries different y-values.
        // Signed with the real key to get past signature checks -- this
        // models a quorum member attacking the interpolation itself.
        let mut dealer = Dealer::recover(&shards).unwrap();
        let keypair = dealer.id_keypair().unwrap().clone();
        let mut forged_payload = shards[1].payload.clone();
        forged_payload.x = shards[0].payload.x.clone();
        let forged = forged_payload.sign(&keypair);

        let set = vec![shards[0].clone(), forged, shards[2].clone()];
        assert!(matches!(
            recover_secret(&set),
            Err(Error::MismatchedShards("conflicting duplicate shards"))
        ));
        drop(dealer.next_shard(&mut rng));
    }

    #[test]
    fn extend_produces_compatible_shards() {
        let mut rng = test_rng(0xe27e);
        let secret = b"expansion keeps working";
        let shards = split(&mut rng, 3, 5, secret, false).unwrap();

        let new_shards = extend(&mut rng, 3, &shards[..3]).unwrap();
        assert_eq!(new_shards.len(), 3);

        // Any 3 drawn from the union reconstruct the same secret.
        let union = shards
            .iter()
            .chain(new_shards.iter())
            .cloned()
            .collect::<Vec<_>>();
        for window in [
            [&union[0], &union[5], &union[7]],
            [&union[6], &union[1], &union[4]],
            [&union[5], &union[6], &union[7]],
        ] {
            let quorum = window.iter().map(|&s| s.clone()).collect::<Vec<_>>();
            assert_eq!(recover_secret(&quorum).unwrap(), secret);
        }
    }

    #[test]
    fn extend_rejects_sealed_backups() {
        let mut rng = test_rng(0x5ea1);
        let secret = b"sealed forever";
        let shards = split(&mut rng, 2, 2, secret, true).unwrap();

        assert!(matches!(
            extend(&mut rng, 1, &shards),
            Err(Error::Sealed)
        ));
        // Sealing must not affect recovery.
        assert_eq!(recover_secret(&shards).unwrap(), secret);
    }

    #[test]
    fn recovered_dealer_rejects_duplicate_x() {
        let mut rng = test_rng(0x4e4e);
        let shards = split(&mut rng, 2, 3, b"no duplicate ids", false).unwrap();
        let mut dealer = Dealer::recover(&shards[..2]).unwrap();

        // An x from the provided quorum must be refused.
        assert!(matches!(
            dealer.shard_with_x(shards[0].x()),
            Err(Error::DuplicateX { .. })
        ));
        // An x of a *lost* shard (not part of the quorum) is fine, and the
        // recreated shard carries the requested identifier.
        let recreated = dealer.shard_with_x(shards[2].x()).unwrap();
        assert_eq!(recreated.id(), shards[2].id());

        let quorum = vec![shards[0].clone(), recreated];
        assert_eq!(recover_secret(&quorum).unwrap(), b"no duplicate ids");
    }

    #[test]
    fn recreated_shard_with_unusable_x_is_rejected() {
        let mut rng = test_rng(0x0bad);
        let shards = split(&mut rng, 2, 2, b"bad x values", false).unwrap();
        let mut dealer = Dealer::recover(&shards).unwrap();
        assert!(matches!(
            dealer.shard_with_x(&BigUint::zero()),
            Err(Error::InvalidX)
        ));
        let too_big = dealer.meta.prime.clone() + BigUint::one();
        assert!(matches!(
            dealer.shard_with_x(&too_big),
            Err(Error::InvalidX)
        ));
    }

    #[test]
    fn dealer_secret_matches_input() {
        let mut rng = test_rng(0x5ec2);
        let secret = b"dealer remembers";
        let dealer = Dealer::new(&mut rng, 2, secret, false).unwrap();
        assert_eq!(dealer.secret().unwrap(), secret);
    }

    #[test]
    fn large_secret_roundtrips() {
        let mut rng = test_rng(0x1a26);
        let mut secret = vec![0u8; 10 * 1024];
        rng.fill_bytes(&mut secret);
        let shards = split(&mut rng, 3, 5, &secret, false).unwrap();
        assert_eq!(recover_secret(&shards[1..4]).unwrap(), secret);
    }
}
