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
    wire::prefixes::*, ChaChaPolyKey, ChaChaPolyNonce, CHACHAPOLY_KEY_LENGTH,
    CHACHAPOLY_NONCE_LENGTH,
};

use ed25519_dalek::{Signature, SignatureError, VerifyingKey};
use multihash::Multihash;
use nom::{
    bytes::streaming::{tag, take},
    error::{Error as NomError, ErrorKind},
    Err as NomErr, IResult, Needed,
};
use num_bigint::BigUint;
use unsigned_varint::{decode as varuint_decode, encode as varuint_encode};

// unsigned-varint's own nom support is tied to a different nom major
// version, so we adapt its plain decoder into our parsers by hand.
macro_rules! varint_parser {
    ($($name:ident, $tag_name:ident, $t:ident);* $(;)?) => {
        $(
            #[allow(dead_code)]
            pub(crate) fn $name(input: &[u8]) -> IResult<&[u8], $t> {
                match varuint_decode::$t(input) {
                    Ok((value, remain)) => Ok((remain, value)),
                    Err(varuint_decode::Error::Insufficient) => {
                        Err(NomErr::Incomplete(Needed::Unknown))
                    }
                    Err(_) => Err(NomErr::Error(NomError::new(input, ErrorKind::TooLarge))),
                }
            }

            #[allow(dead_code)]
            pub(crate) fn $tag_name(expected: $t) -> impl Fn(&[u8]) -> IResult<&[u8], $t> {
                move |input: &[u8]| match $name(input)? {
                    (remain, value) if value == expected => Ok((remain, value)),
                    _ => Err(NomErr::Error(NomError::new(input, ErrorKind::Tag))),
                }
            }
        )*
    }
}

varint_parser! {
    varint_u32, varint_u32_tag, u32;
    varint_u64, varint_u64_tag, u64;
    varint_usize, varint_usize_tag, usize;
}

pub(crate) fn encode_varint_u32(value: u32, bytes: &mut Vec<u8>) {
    varuint_encode::u32(value, &mut varuint_encode::u32_buffer())
        .iter()
        .for_each(|b| bytes.push(*b));
}

pub(crate) fn encode_varint_u64(value: u64, bytes: &mut Vec<u8>) {
    varuint_encode::u64(value, &mut varuint_encode::u64_buffer())
        .iter()
        .for_each(|b| bytes.push(*b));
}

pub(crate) fn encode_varint_usize(value: usize, bytes: &mut Vec<u8>) {
    varuint_encode::usize(value, &mut varuint_encode::usize_buffer())
        .iter()
        .for_each(|b| bytes.push(*b));
}

/// Encode a big integer as a varint length followed by its big-endian bytes.
pub(crate) fn encode_biguint(value: &BigUint, bytes: &mut Vec<u8>) {
    let value_bytes = value.to_bytes_be();
    encode_varint_usize(value_bytes.len(), bytes);
    bytes.extend_from_slice(&value_bytes);
}

pub(crate) fn take_biguint(input: &[u8]) -> IResult<&[u8], BigUint> {
    let (input, length) = varint_usize(input)?;
    let (input, value_bytes) = take(length)(input)?;
    Ok((input, BigUint::from_bytes_be(value_bytes)))
}

pub(crate) fn encode_ed25519_pub(key: &VerifyingKey, bytes: &mut Vec<u8>) {
    encode_varint_u32(PREFIX_ED25519_PUB, bytes);
    bytes.extend_from_slice(key.as_bytes());
}

pub(crate) fn take_ed25519_pub(
    input: &[u8],
) -> IResult<&[u8], Result<VerifyingKey, SignatureError>> {
    let (input, _) = varint_u32_tag(PREFIX_ED25519_PUB)(input)?;
    let (input, public_key) = take(ed25519_dalek::PUBLIC_KEY_LENGTH)(input)?;

    // This conversion cannot fail, by definition.
    let public_key_arr: [u8; ed25519_dalek::PUBLIC_KEY_LENGTH] =
        public_key.try_into().unwrap_or_else(|_| {
            panic!(
                "slice of length {} should convert to array of length {}",
                public_key.len(),
                ed25519_dalek::PUBLIC_KEY_LENGTH
            )
        });

    Ok((input, VerifyingKey::from_bytes(&public_key_arr)))
}

pub(crate) fn encode_ed25519_sig(signature: &Signature, bytes: &mut Vec<u8>) {
    encode_varint_u32(PREFIX_ED25519_SIG, bytes);
    bytes.extend_from_slice(&signature.to_bytes());
}

pub(crate) fn take_ed25519_sig(
    input: &[u8],
) -> IResult<&[u8], Result<Signature, SignatureError>> {
    let (input, _) = varint_u32_tag(PREFIX_ED25519_SIG)(input)?;
    let (input, sig) = take(ed25519_dalek::SIGNATURE_LENGTH)(input)?;

    Ok((input, Signature::from_slice(sig)))
}

pub(crate) fn take_ed25519_sec(
    input: &[u8],
) -> IResult<&[u8], Option<[u8; ed25519_dalek::SECRET_KEY_LENGTH]>> {
    const ZEROES: [u8; ed25519_dalek::SECRET_KEY_LENGTH] =
        [0u8; ed25519_dalek::SECRET_KEY_LENGTH];

    // Unsealed secret -- fetch the key. Sealed secret -- the key slot must
    // be all zeroes.
    if let Ok((input, _)) = varint_u64_tag(PREFIX_ED25519_SECRET)(input) {
        let (input, private_key) = take(ed25519_dalek::SECRET_KEY_LENGTH)(input)?;
        let private_key_arr: [u8; ed25519_dalek::SECRET_KEY_LENGTH] =
            private_key.try_into().unwrap_or_else(|_| {
                panic!(
                    "slice of length {} should convert to array of length {}",
                    private_key.len(),
                    ed25519_dalek::SECRET_KEY_LENGTH
                )
            });
        Ok((input, Some(private_key_arr)))
    } else {
        let (input, _) = varint_u64_tag(PREFIX_ED25519_SECRET_SEALED)(input)?;
        let (input, _) = tag(&ZEROES[..])(input)?;
        Ok((input, None))
    }
}

pub(crate) fn take_chachapoly_key(input: &[u8]) -> IResult<&[u8], ChaChaPolyKey> {
    let (input, _) = varint_u64_tag(PREFIX_CHACHA20POLY1305_KEY)(input)?;
    let (input, key) = take(CHACHAPOLY_KEY_LENGTH)(input)?;

    Ok((input, {
        let mut buffer = ChaChaPolyKey::default();
        buffer.copy_from_slice(key);
        buffer
    }))
}

pub(crate) fn encode_chachapoly_nonce(nonce: &ChaChaPolyNonce, bytes: &mut Vec<u8>) {
    assert_eq!(nonce.len(), CHACHAPOLY_NONCE_LENGTH);
    encode_varint_u64(PREFIX_CHACHA20POLY1305_NONCE, bytes);
    bytes.extend_from_slice(nonce);
}

pub(crate) fn take_chachapoly_nonce(input: &[u8]) -> IResult<&[u8], ChaChaPolyNonce> {
    let (input, _) = varint_u64_tag(PREFIX_CHACHA20POLY1305_NONCE)(input)?;
    let (input, nonce) = take(CHACHAPOLY_NONCE_LENGTH)(input)?;

    Ok((input, {
        let mut buffer = ChaChaPolyNonce::default();
        buffer.copy_from_slice(nonce);
        buffer
    }))
}

pub(crate) fn encode_chachapoly_ciphertext(ciphertext: &[u8], bytes: &mut Vec<u8>) {
    encode_varint_u64(PREFIX_CHACHA20POLY1305_CIPHERTEXT, bytes);
    encode_varint_usize(ciphertext.len(), bytes);
    bytes.extend_from_slice(ciphertext);
}

pub(crate) fn take_chachapoly_ciphertext(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, _) = varint_u64_tag(PREFIX_CHACHA20POLY1305_CIPHERTEXT)(input)?;
    let (input, length) = varint_usize(input)?;

    take(length)(input)
}

pub(crate) fn take_multihash(input: &[u8]) -> IResult<&[u8], Multihash> {
    // Annoyingly, multihash doesn't let you partially-read a slice so we
    // have to manually decode the length (the second parameter).
    let (partial, _) = varint_u64(input)?;
    let (partial, length) = varint_usize(partial)?;

    // The length doesn't include the (type, length) prefix, so calculate
    // that based on the partially-parsed input. We return an Incomplete if
    // there aren't enough bytes for the hash (split_at would panic
    // otherwise). The addition is checked -- the length is untrusted.
    let length = match length.checked_add(input.len() - partial.len()) {
        Some(length) => length,
        None => return Err(NomErr::Error(NomError::new(input, ErrorKind::TooLarge))),
    };
    if length > input.len() {
        return Err(NomErr::Incomplete(Needed::new(length - input.len())));
    }
    let (hash, input) = input.split_at(length);

    // All errors are just treated as format ("tag") errors. Sadly we can't
    // return much more context through nom at the moment (due to how
    // restrictive nom::error::ErrorKind is).
    let hash = Multihash::from_bytes(hash)
        .map_err(|_| NomErr::Error(NomError::new(input, ErrorKind::Tag)))?;
    Ok((input, hash))
}
