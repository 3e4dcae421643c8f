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

use crate::v0::{FromWire, ShardId, ToWire};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use num_bigint::BigUint;
use unsigned_varint::encode as varuint_encode;

/// Shard-independent metadata which is embedded (and signed) in every shard
/// of a backup. All shards of one backup must agree on every field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShardMeta {
    /// Byte length of the (internal) secret being shared.
    pub(super) secret_len: usize,
    /// Byte length of one secret block. Each block is shared with its own
    /// polynomial.
    pub(super) block_size: u32,
    /// The prime defining the finite field.
    pub(super) prime: BigUint,
    /// Number of unique shards needed to recover the secret (degree+1).
    pub(super) threshold: u32,
    /// Public half of the identity key used for signing.
    pub(super) public_key: VerifyingKey,
}

/// The signed portion of a [`Shard`]: the metadata plus this shard's point
/// on every per-block polynomial.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShardPayload {
    pub(super) meta: ShardMeta,
    pub(super) x: BigUint,
    pub(super) ys: Vec<BigUint>,
}

impl ShardPayload {
    /// Sign the payload, producing a full [`Shard`]. The signing key must
    /// match the public key embedded in the metadata.
    pub(super) fn sign(self, id_keypair: &SigningKey) -> Shard {
        assert_eq!(
            self.meta.public_key,
            id_keypair.verifying_key(),
            "embedded public key doesn't match signing key"
        );
        let signature = id_keypair.sign(&self.to_wire());
        Shard {
            payload: self,
            signature,
        }
    }
}

/// Piece of a secret which has been sharded with [Shamir Secret Sharing][sss],
/// signed by the backup's identity key so that cheating shard-holders can be
/// identified during recovery.
///
/// [sss]: https://en.wikipedia.org/wiki/Shamir%27s_Secret_Sharing
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Shard {
    pub(super) payload: ShardPayload,
    pub(super) signature: Signature,
}

impl Shard {
    /// Returns the *unique* identifier for a given `Shard`.
    ///
    /// If two shards have the same identifier, they cannot be used together
    /// for secret recovery.
    pub fn id(&self) -> ShardId {
        multibase::encode(multibase::Base::Base32Z, self.payload.x.to_bytes_be())
    }

    /// Returns the number of *unique* sister `Shard`s required to recover
    /// the stored secret.
    pub fn threshold(&self) -> u32 {
        self.payload.meta.threshold
    }

    /// Public half of the identity key this shard claims to be signed by.
    pub fn public_key(&self) -> VerifyingKey {
        self.payload.meta.public_key
    }

    pub(crate) fn x(&self) -> &BigUint {
        &self.payload.x
    }

    pub(crate) fn meta(&self) -> &ShardMeta {
        &self.payload.meta
    }

    /// Verify the shard's signature against the public key embedded in its
    /// own metadata.
    pub(crate) fn verify(&self) -> bool {
        self.payload
            .meta
            .public_key
            .verify(&self.payload.to_wire(), &self.signature)
            .is_ok()
    }
}

/// Parse a shard identifier back into the x-value it encodes.
pub fn parse_id<S: AsRef<str>>(id: S) -> Result<BigUint, multibase::Error> {
    let (_, data) = multibase::decode(id)?;
    Ok(BigUint::from_bytes_be(&data))
}

impl ToWire for ShardMeta {
    fn to_wire(&self) -> Vec<u8> {
        use crate::v0::wire::helpers::encode_biguint;

        let mut bytes = vec![];

        // Encode secret length.
        varuint_encode::usize(self.secret_len, &mut varuint_encode::usize_buffer())
            .iter()
            .for_each(|b| bytes.push(*b));

        // Encode block size.
        varuint_encode::u32(self.block_size, &mut varuint_encode::u32_buffer())
            .iter()
            .for_each(|b| bytes.push(*b));

        // Encode prime (length-prefixed big-endian).
        encode_biguint(&self.prime, &mut bytes);

        // Encode threshold.
        varuint_encode::u32(self.threshold, &mut varuint_encode::u32_buffer())
            .iter()
            .for_each(|b| bytes.push(*b));

        // Encode ed25519 public key (with multicodec prefix).
        varuint_encode::u32(
            crate::v0::wire::prefixes::PREFIX_ED25519_PUB,
            &mut varuint_encode::u32_buffer(),
        )
        .iter()
        .chain(self.public_key.as_bytes())
        .for_each(|b| bytes.push(*b));

        bytes
    }
}

impl FromWire for ShardMeta {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), String> {
        use crate::v0::wire::helpers::{
            take_biguint, take_ed25519_pub, varint_u32, varint_usize,
        };
        use ed25519_dalek::{SignatureError, VerifyingKey};
        use nom::{combinator::complete, IResult};

        type ParseResult = (
            usize,
            u32,
            BigUint,
            u32,
            Result<VerifyingKey, SignatureError>,
        );

        fn parse(input: &[u8]) -> IResult<&[u8], ParseResult> {
            let (input, secret_len) = varint_usize(input)?;
            let (input, block_size) = varint_u32(input)?;
            let (input, prime) = take_biguint(input)?;
            let (input, threshold) = varint_u32(input)?;
            let (input, public_key) = take_ed25519_pub(input)?;

            Ok((input, (secret_len, block_size, prime, threshold, public_key)))
        }
        let mut parse = complete(parse);

        let (input, (secret_len, block_size, prime, threshold, public_key)) =
            parse(input).map_err(|err| format!("{:?}", err))?;

        Ok((
            input,
            ShardMeta {
                secret_len,
                block_size,
                prime,
                threshold,
                public_key: public_key.map_err(|err| format!("{:?}", err))?,
            },
        ))
    }
}

impl ToWire for ShardPayload {
    fn to_wire(&self) -> Vec<u8> {
        use crate::v0::wire::helpers::encode_biguint;

        let mut bytes = self.meta.to_wire();

        // Encode x-value.
        encode_biguint(&self.x, &mut bytes);

        // Encode y-values (length-prefixed).
        varuint_encode::usize(self.ys.len(), &mut varuint_encode::usize_buffer())
            .iter()
            .for_each(|b| bytes.push(*b));
        for y in &self.ys {
            encode_biguint(y, &mut bytes);
        }

        bytes
    }
}

impl FromWire for ShardPayload {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), String> {
        use crate::v0::wire::helpers::{take_biguint, varint_usize};
        use nom::{combinator::complete, multi::many_m_n, IResult};

        let (input, meta) = ShardMeta::from_wire_partial(input)?;

        fn parse(input: &[u8]) -> IResult<&[u8], (BigUint, Vec<BigUint>)> {
            let (input, x) = take_biguint(input)?;
            let (input, ys_length) = varint_usize(input)?;
            let (input, ys) = many_m_n(ys_length, ys_length, take_biguint)(input)?;

            Ok((input, (x, ys)))
        }
        let mut parse = complete(parse);

        let (input, (x, ys)) = parse(input).map_err(|err| format!("{:?}", err))?;

        Ok((input, ShardPayload { meta, x, ys }))
    }
}

impl ToWire for Shard {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = self.payload.to_wire();

        // Encode ed25519 signature (with multicodec prefix).
        varuint_encode::u32(
            crate::v0::wire::prefixes::PREFIX_ED25519_SIG,
            &mut varuint_encode::u32_buffer(),
        )
        .iter()
        .chain(&self.signature.to_bytes()[..])
        .for_each(|b| bytes.push(*b));

        bytes
    }
}

impl FromWire for Shard {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), String> {
        use crate::v0::wire::helpers::take_ed25519_sig;

        let (input, payload) = ShardPayload::from_wire_partial(input)?;
        let (input, signature) =
            take_ed25519_sig(input).map_err(|err| format!("{:?}", err))?;

        Ok((
            input,
            Shard {
                payload,
                signature: signature.map_err(|err| format!("{:?}", err))?,
            },
        ))
    }
}


#[cfg(test)]
impl quickcheck::Arbitrary for Shard {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        test_helpers::arbitrary_shard(g)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[quickcheck]
    fn shard_bytes_roundtrip(shard: Shard) {
        let shard2 = Shard::from_wire(&shard.to_wire()).unwrap();
        assert_eq!(shard, shard2);
    }

    #[quickcheck]
    fn shard_signature_verifies(shard: Shard) -> bool {
        shard.verify()
    }

    #[quickcheck]
    fn shard_id_roundtrip(shard: Shard) -> bool {
        parse_id(shard.id()).unwrap() == shard.payload.x
    }

    #[quickcheck]
    fn tampered_shard_fails_verification(shard: Shard) -> bool {
        let mut forged = shard;
        forged.payload.x += 1u32;
        !forged.verify()
    }
}
