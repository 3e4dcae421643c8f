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

use crate::v0::{
    wire::{helpers, FromWire, ToWire},
    EncryptedKeyShard, Identity, KeyShardMeta, PAPERBACK_VERSION,
};

use multihash::MultihashDigest;

// Internal only -- users can't see KeyShardMeta.
#[doc(hidden)]
impl ToWire for KeyShardMeta {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        // Encode version.
        helpers::encode_varint_u32(self.version, &mut bytes);

        // Encode multihash checksum of the main document.
        bytes.extend_from_slice(&self.doc_chksum.to_bytes());

        bytes
    }
}

// Internal only -- users can't see KeyShardMeta.
#[doc(hidden)]
impl FromWire for KeyShardMeta {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), String> {
        let (input, version) =
            helpers::varint_u32(input).map_err(|err| format!("{:?}", err))?;
        let (input, doc_chksum) =
            helpers::take_multihash(input).map_err(|err| format!("{:?}", err))?;

        Ok((
            input,
            KeyShardMeta {
                version,
                doc_chksum,
            },
        ))
    }
}

impl ToWire for EncryptedKeyShard {
    fn to_wire(&self) -> Vec<u8> {
        // The trailing checksum covers everything before it, and is checked
        // on parse -- paper artifacts pick up scan damage.
        let mut bytes = self.checksummable_bytes();
        bytes.extend_from_slice(&self.checksum().to_bytes());
        bytes
    }
}

impl FromWire for EncryptedKeyShard {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), String> {
        let start = input;

        let (input, meta) = KeyShardMeta::from_wire_partial(input)?;
        let (input, nonce) =
            helpers::take_chachapoly_nonce(input).map_err(|err| format!("{:?}", err))?;
        let (input, ciphertext) =
            helpers::take_chachapoly_ciphertext(input).map_err(|err| format!("{:?}", err))?;
        let (input, identity) = Identity::from_wire_partial(input)?;

        let checksummed_len = start.len() - input.len();
        let (input, chksum) =
            helpers::take_multihash(input).map_err(|err| format!("{:?}", err))?;

        if meta.version != PAPERBACK_VERSION {
            return Err(format!(
                "key shard version must be '{}' not '{}'",
                PAPERBACK_VERSION, meta.version
            ));
        }
        if meta.doc_chksum.code() != u64::from(crate::v0::CHECKSUM_ALGORITHM) {
            return Err("document checksum must be Blake2b-256".to_string());
        }

        let expected = crate::v0::CHECKSUM_ALGORITHM.digest(&start[..checksummed_len]);
        if chksum != expected {
            return Err("key shard checksum mismatch -- damaged or forged artifact".into());
        }

        Ok((
            input,
            EncryptedKeyShard {
                meta,
                nonce,
                ciphertext: ciphertext.into(),
                identity,
            },
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[quickcheck]
    fn key_shard_meta_roundtrip(meta: KeyShardMeta) -> bool {
        let meta2 = KeyShardMeta::from_wire(meta.to_wire()).unwrap();
        meta == meta2
    }

    #[quickcheck]
    fn encrypted_key_shard_roundtrip(shard: EncryptedKeyShard) -> bool {
        let shard2 = EncryptedKeyShard::from_wire(shard.to_wire()).unwrap();
        shard == shard2
    }

    #[quickcheck]
    fn encrypted_key_shard_checksum_is_verified(shard: EncryptedKeyShard) -> bool {
        let mut wire = shard.to_wire();
        let last = wire.len() - 1;
        wire[last] ^= 0x01;
        EncryptedKeyShard::from_wire(&wire).is_err()
    }

    #[quickcheck]
    fn encrypted_key_shard_multibase_roundtrip(shard: EncryptedKeyShard) -> bool {
        let encoded = shard.to_wire_multibase(multibase::Base::Base32Z);
        let shard2 = EncryptedKeyShard::from_wire_multibase(encoded).unwrap();
        shard == shard2
    }
}
