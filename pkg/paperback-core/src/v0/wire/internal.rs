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

use crate::{
    shamir::InternalSecret,
    v0::{
        wire::{helpers, prefixes::*, FromWire, ToWire},
        Identity, ShardSecret,
    },
};

use ed25519_dalek::SigningKey;
use nom::bytes::streaming::take;

// Internal only -- users can't see Identity.
impl ToWire for Identity {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        // Encode ed25519 public key (with multicodec prefix).
        helpers::encode_ed25519_pub(&self.id_public_key, &mut bytes);

        // Encode ed25519 signature (with multicodec prefix).
        helpers::encode_ed25519_sig(&self.id_signature, &mut bytes);

        bytes
    }
}

// Internal only -- users can't see Identity.
impl FromWire for Identity {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), String> {
        let (input, public_key) =
            helpers::take_ed25519_pub(input).map_err(|err| format!("{:?}", err))?;
        let (input, signature) =
            helpers::take_ed25519_sig(input).map_err(|err| format!("{:?}", err))?;

        Ok((
            input,
            Identity {
                id_public_key: public_key.map_err(|err| format!("{:?}", err))?,
                id_signature: signature.map_err(|err| format!("{:?}", err))?,
            },
        ))
    }
}

// Internal only -- users can't see InternalSecret. These bytes are what
// actually gets split by the shamir dealer, so this encoding must never
// change within a schema version.
impl ToWire for InternalSecret {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![self.version];

        let (prefix, id_private_key) = match &self.id_private_key {
            Some(key) => (PREFIX_ED25519_SECRET, key.to_bytes()),
            None => (
                PREFIX_ED25519_SECRET_SEALED,
                [0u8; ed25519_dalek::SECRET_KEY_LENGTH],
            ),
        };
        helpers::encode_varint_u64(prefix, &mut bytes);
        bytes.extend_from_slice(&id_private_key);

        helpers::encode_varint_usize(self.data.len(), &mut bytes);
        bytes.extend_from_slice(&self.data);

        bytes
    }
}

// Internal only -- users can't see InternalSecret.
impl FromWire for InternalSecret {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), String> {
        let (input, version) =
            take::<_, _, nom::error::Error<&[u8]>>(1usize)(input).map_err(|err| format!("{:?}", err))?;
        let version = version[0];

        let (input, private_key) =
            helpers::take_ed25519_sec(input).map_err(|err| format!("{:?}", err))?;

        let (input, data_len) =
            helpers::varint_usize(input).map_err(|err| format!("{:?}", err))?;
        let (input, data) =
            take::<_, _, nom::error::Error<&[u8]>>(data_len)(input).map_err(|err| format!("{:?}", err))?;

        Ok((
            input,
            InternalSecret {
                version,
                id_private_key: private_key.map(|key| SigningKey::from_bytes(&key)),
                data: data.to_vec(),
            },
        ))
    }
}

// Internal only -- users can't see ShardSecret.
impl ToWire for ShardSecret {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        // Encode ChaCha20-Poly1305 key.
        helpers::encode_varint_u64(PREFIX_CHACHA20POLY1305_KEY, &mut bytes);
        bytes.extend_from_slice(&self.doc_key);

        bytes
    }
}

// Internal only -- users can't see ShardSecret.
impl FromWire for ShardSecret {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), String> {
        let (input, doc_key) =
            helpers::take_chachapoly_key(input).map_err(|err| format!("{:?}", err))?;

        Ok((input, ShardSecret { doc_key }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::{shamir::INTERNAL_SECRET_VERSION, v0::ChaChaPolyKey};

    use ed25519_dalek::Signer;
    use rand::{rngs::OsRng, RngCore};

    #[quickcheck]
    fn identity_roundtrip(data: Vec<u8>) -> bool {
        let id_keypair = SigningKey::generate(&mut OsRng);

        let identity = Identity {
            id_public_key: id_keypair.verifying_key(),
            id_signature: id_keypair.sign(&data),
        };
        let identity2 = Identity::from_wire(identity.to_wire()).unwrap();

        identity == identity2
    }

    #[quickcheck]
    fn internal_secret_roundtrip(data: Vec<u8>, sealed: bool) -> bool {
        let secret = InternalSecret {
            version: INTERNAL_SECRET_VERSION,
            id_private_key: match sealed {
                true => None,
                false => Some(SigningKey::generate(&mut OsRng)),
            },
            data,
        };
        let secret2 = InternalSecret::from_wire(secret.to_wire()).unwrap();

        secret == secret2
    }

    #[quickcheck]
    fn shard_secret_roundtrip(_: u32) -> bool {
        let mut doc_key = ChaChaPolyKey::default();
        OsRng.fill_bytes(&mut doc_key);

        let secret = ShardSecret { doc_key };
        let secret2 = ShardSecret::from_wire(secret.to_wire()).unwrap();

        secret2.doc_key == doc_key
    }
}
