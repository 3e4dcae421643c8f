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
    Identity, MainDocument, MainDocumentBuilder, MainDocumentMeta, PAPERBACK_VERSION,
};

use multihash::MultihashDigest;

// Internal only -- users can't see MainDocumentMeta.
#[doc(hidden)]
impl ToWire for MainDocumentMeta {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        // Encode version.
        helpers::encode_varint_u32(self.version, &mut bytes);

        // Encode quorum size.
        helpers::encode_varint_u32(self.quorum_size, &mut bytes);

        bytes
    }
}

// Internal only -- users can't see MainDocumentMeta.
#[doc(hidden)]
impl FromWire for MainDocumentMeta {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), String> {
        let (input, version) =
            helpers::varint_u32(input).map_err(|err| format!("{:?}", err))?;
        let (input, quorum_size) =
            helpers::varint_u32(input).map_err(|err| format!("{:?}", err))?;

        Ok((
            input,
            MainDocumentMeta {
                version,
                quorum_size,
            },
        ))
    }
}

// Internal only -- users can't see MainDocumentBuilder.
#[doc(hidden)]
impl ToWire for MainDocumentBuilder {
    fn to_wire(&self) -> Vec<u8> {
        let mut bytes = vec![];

        // Encode metadata.
        bytes.append(&mut self.meta.to_wire());

        // Encode nonce.
        helpers::encode_chachapoly_nonce(&self.nonce, &mut bytes);

        // Encode ciphertext (length-prefixed).
        helpers::encode_chachapoly_ciphertext(&self.ciphertext, &mut bytes);

        bytes
    }
}

// Internal only -- users can't see MainDocumentBuilder.
#[doc(hidden)]
impl FromWire for MainDocumentBuilder {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), String> {
        let (input, meta) = MainDocumentMeta::from_wire_partial(input)?;
        let (input, nonce) =
            helpers::take_chachapoly_nonce(input).map_err(|err| format!("{:?}", err))?;
        let (input, ciphertext) =
            helpers::take_chachapoly_ciphertext(input).map_err(|err| format!("{:?}", err))?;

        Ok((
            input,
            MainDocumentBuilder {
                meta,
                nonce,
                ciphertext: ciphertext.into(),
            },
        ))
    }
}

impl ToWire for MainDocument {
    fn to_wire(&self) -> Vec<u8> {
        // The trailing checksum covers everything before it, and is checked
        // on parse -- paper artifacts pick up scan damage.
        let mut bytes = self.checksummable_bytes();
        bytes.extend_from_slice(&self.checksum().to_bytes());
        bytes
    }
}

impl FromWire for MainDocument {
    fn from_wire_partial(input: &[u8]) -> Result<(&[u8], Self), String> {
        let start = input;

        let (input, inner) = MainDocumentBuilder::from_wire_partial(input)?;
        let (input, identity) = Identity::from_wire_partial(input)?;

        let checksummed_len = start.len() - input.len();
        let (input, chksum) =
            helpers::take_multihash(input).map_err(|err| format!("{:?}", err))?;

        if inner.meta.version != PAPERBACK_VERSION {
            return Err(format!(
                "main document version must be '{}' not '{}'",
                PAPERBACK_VERSION, inner.meta.version
            ));
        }

        let expected = crate::v0::CHECKSUM_ALGORITHM.digest(&start[..checksummed_len]);
        if chksum != expected {
            return Err("main document checksum mismatch -- damaged or forged artifact".into());
        }

        Ok((input, MainDocument { inner, identity }))
    }
}
