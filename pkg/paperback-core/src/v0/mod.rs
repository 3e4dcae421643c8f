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
    shamir::{Error as ShamirError, Shard},
    v0::wire::helpers as wire_helpers,
};

use aead::Payload;
use bip39::{Language, Mnemonic};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, KeyInit};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use multihash::{Multihash, MultihashDigest};
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

pub type ShardId = String;
pub type DocumentId = String;

/// Human-typable rendering of a shard's wrapping key, one BIP-39 English
/// word per entry.
pub type KeyShardCodewords = Vec<String>;

pub(crate) type ChaChaPolyKey = chacha20poly1305::Key;
pub(crate) const CHACHAPOLY_KEY_LENGTH: usize = 32usize;

pub(crate) type ChaChaPolyNonce = chacha20poly1305::Nonce;
pub(crate) const CHACHAPOLY_NONCE_LENGTH: usize = 12usize;

#[cfg(test)]
#[test]
fn check_length_consts() {
    // GenericArray doesn't give us a way to get the size, so we need to do
    // this in a test...
    assert_eq!(CHACHAPOLY_KEY_LENGTH, ChaChaPolyKey::default().len());
    assert_eq!(CHACHAPOLY_NONCE_LENGTH, ChaChaPolyNonce::default().len());
}

/// Version of the paperback wire formats implemented by this module.
pub const PAPERBACK_VERSION: u32 = 0;

const CHECKSUM_ALGORITHM: multihash::Code = multihash::Code::Blake2b256;
const CHECKSUM_MULTIBASE: multibase::Base = multibase::Base::Base32Z;
const ID_MULTIBASE: multibase::Base = multibase::Base::Base32Z;

const CODEWORD_LANGUAGE: Language = Language::English;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("security invariant violated: {0}")]
    InvariantViolation(&'static str),

    #[error("missing necessary capabilities to complete request: {0}")]
    MissingCapability(&'static str),

    #[error("forgery detected: {0}")]
    Forgery(&'static str),

    #[error("aead encryption cryptographic error: {0}")]
    AeadEncryption(aead::Error),

    #[error("decryption failed -- possible forgery: {0}")]
    AeadDecryption(aead::Error),

    #[error("shamir algorithm operation: {0}")]
    Shamir(#[from] ShamirError),

    #[error("failed to decode artifact: {0}")]
    Decode(String),

    #[error("bip39 phrase failure: {0}")]
    Bip39(bip39::ErrorKind),

    #[error("other error: {0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(inner: anyhow::Error) -> Self {
        match inner.downcast::<bip39::ErrorKind>() {
            Ok(err) => Self::Bip39(err),
            Err(err) => Self::Other(err.to_string()),
        }
    }
}

/// The public identity bound to an artifact: the backup's public key and a
/// signature made with its private half.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Identity {
    pub(crate) id_public_key: VerifyingKey,
    pub(crate) id_signature: Signature,
}

/// The secret actually fed to the shamir dealer: the key protecting the
/// main document. (The identity private key travels next to it, inside the
/// shamir module's own internal secret wrapper.)
#[derive(Debug)]
pub(crate) struct ShardSecret {
    pub(crate) doc_key: ChaChaPolyKey,
}

impl Drop for ShardSecret {
    fn drop(&mut self) {
        self.doc_key.as_mut_slice().zeroize();
    }
}

fn multihash_short_id(hash: &Multihash, length: usize) -> String {
    let digest = hash.digest();
    let length = length.min(digest.len());
    // The digest *prefix* is the ID.
    multibase::encode(ID_MULTIBASE, &digest[..length])
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MainDocumentMeta {
    pub(crate) version: u32, // must be 0 for this version
    pub(crate) quorum_size: u32,
}

impl MainDocumentMeta {
    // The authenticated header of the main document: the metadata followed
    // by the public key used for signing.
    fn aad(&self, id_public_key: &VerifyingKey) -> Vec<u8> {
        let mut bytes = self.to_wire();
        wire_helpers::encode_ed25519_pub(id_public_key, &mut bytes);
        bytes
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MainDocumentBuilder {
    pub(crate) meta: MainDocumentMeta,
    pub(crate) nonce: ChaChaPolyNonce,
    pub(crate) ciphertext: Vec<u8>,
}

impl MainDocumentBuilder {
    fn signable_bytes(&self, id_public_key: &VerifyingKey) -> Vec<u8> {
        let mut bytes = self.to_wire();
        wire_helpers::encode_ed25519_pub(id_public_key, &mut bytes);
        bytes
    }

    fn sign(self, id_keypair: &SigningKey) -> MainDocument {
        let bytes = self.signable_bytes(&id_keypair.verifying_key());
        MainDocument {
            inner: self,
            identity: Identity {
                id_public_key: id_keypair.verifying_key(),
                id_signature: id_keypair.sign(&bytes),
            },
        }
    }
}

/// The printable artifact carrying the AEAD-encrypted user plaintext.
#[derive(Clone, Debug)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub struct MainDocument {
    pub(crate) inner: MainDocumentBuilder,
    pub(crate) identity: Identity,
}

impl MainDocument {
    /// Number of checksum bytes used for the short document ID.
    pub const ID_LENGTH: usize = 6;

    pub(crate) fn checksummable_bytes(&self) -> Vec<u8> {
        let mut bytes = self.inner.to_wire();
        bytes.append(&mut self.identity.to_wire());
        bytes
    }

    pub fn checksum(&self) -> Multihash {
        CHECKSUM_ALGORITHM.digest(&self.checksummable_bytes())
    }

    pub fn checksum_string(&self) -> String {
        multibase::encode(CHECKSUM_MULTIBASE, self.checksum().to_bytes())
    }

    pub fn id(&self) -> DocumentId {
        multihash_short_id(&self.checksum(), Self::ID_LENGTH)
    }

    pub fn quorum_size(&self) -> u32 {
        self.inner.meta.quorum_size
    }

    pub(crate) fn public_key(&self) -> VerifyingKey {
        self.identity.id_public_key
    }

    /// Verify the document's identity signature. This is also done when the
    /// document joins a quorum.
    pub fn verify_signature(&self) -> Result<(), Error> {
        self.identity
            .id_public_key
            .verify_strict(
                &self.inner.signable_bytes(&self.identity.id_public_key),
                &self.identity.id_signature,
            )
            .map_err(|_| Error::Forgery("main document signature is invalid"))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct KeyShardMeta {
    pub(crate) version: u32, // must be 0 for this version
    pub(crate) doc_chksum: Multihash,
}

impl KeyShardMeta {
    // The authenticated header of a key shard envelope.
    fn aad(&self, id_public_key: &VerifyingKey) -> Vec<u8> {
        let mut bytes = self.to_wire();
        wire_helpers::encode_ed25519_pub(id_public_key, &mut bytes);
        bytes
    }
}

// The envelope signature covers the cleartext header *and* the encrypted
// body, so a reprinted shard can be authenticated without its codewords.
fn key_shard_signable_bytes(
    meta: &KeyShardMeta,
    nonce: &ChaChaPolyNonce,
    ciphertext: &[u8],
    id_public_key: &VerifyingKey,
) -> Vec<u8> {
    let mut bytes = meta.to_wire();
    wire_helpers::encode_chachapoly_nonce(nonce, &mut bytes);
    wire_helpers::encode_chachapoly_ciphertext(ciphertext, &mut bytes);
    wire_helpers::encode_ed25519_pub(id_public_key, &mut bytes);
    bytes
}

/// Unencrypted key shard state, used while minting new shards.
#[derive(Clone, Debug)]
pub(crate) struct KeyShardBuilder {
    pub(crate) meta: KeyShardMeta,
    pub(crate) shard: Shard,
}

impl KeyShardBuilder {
    fn encrypt_and_sign<R: RngCore + CryptoRng + ?Sized>(
        self,
        rng: &mut R,
        id_keypair: &SigningKey,
    ) -> Result<(EncryptedKeyShard, KeyShardCodewords), Error> {
        let id_public_key = id_keypair.verifying_key();

        // Serialise the contents: the threshold followed by the raw shard.
        let mut plaintext = Zeroizing::new(Vec::new());
        wire_helpers::encode_varint_u32(self.shard.threshold(), &mut plaintext);
        plaintext.append(&mut self.shard.to_wire());

        // Generate key and nonce.
        let shard_key = keys::generate_key(rng)?;
        let shard_nonce = keys::generate_nonce(rng);

        // Encrypt the contents, authenticating the envelope header.
        let aead = ChaCha20Poly1305::new(ChaChaPolyKey::from_slice(&*shard_key));
        let ciphertext = aead
            .encrypt(
                &shard_nonce,
                Payload {
                    msg: &plaintext,
                    aad: &self.meta.aad(&id_public_key),
                },
            )
            .map_err(Error::AeadEncryption)?;

        let signable =
            key_shard_signable_bytes(&self.meta, &shard_nonce, &ciphertext, &id_public_key);
        let identity = Identity {
            id_public_key,
            id_signature: id_keypair.sign(&signable),
        };

        // Convert the key to a BIP-39 mnemonic.
        let phrase = Mnemonic::from_entropy(&*shard_key, CODEWORD_LANGUAGE)
            .map_err(Error::from)?
            .into_phrase();
        let codewords = phrase
            .split_whitespace()
            .map(|s| s.to_owned())
            .collect::<Vec<_>>();

        Ok((
            EncryptedKeyShard {
                meta: self.meta,
                nonce: shard_nonce,
                ciphertext,
                identity,
            },
            codewords,
        ))
    }
}

/// A decrypted key shard: one shamir shard plus the envelope metadata tying
/// it to its main document.
#[derive(Clone, Debug)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub struct KeyShard {
    pub(crate) meta: KeyShardMeta,
    pub(crate) shard: Shard,
    pub(crate) identity: Identity,
}

impl KeyShard {
    pub fn id(&self) -> ShardId {
        self.shard.id()
    }

    pub fn threshold(&self) -> u32 {
        self.shard.threshold()
    }

    pub(crate) fn document_checksum(&self) -> &Multihash {
        &self.meta.doc_chksum
    }

    pub fn document_id(&self) -> DocumentId {
        multihash_short_id(self.document_checksum(), MainDocument::ID_LENGTH)
    }
}

/// The printable artifact carrying an encrypted key shard. The header,
/// identity and checksum are cleartext so that a shard can be grouped and
/// authenticated without entering its codewords.
#[derive(Clone, Debug)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub struct EncryptedKeyShard {
    pub(crate) meta: KeyShardMeta,
    pub(crate) nonce: ChaChaPolyNonce,
    pub(crate) ciphertext: Vec<u8>,
    pub(crate) identity: Identity,
}

impl EncryptedKeyShard {
    pub(crate) fn checksummable_bytes(&self) -> Vec<u8> {
        let mut bytes = self.meta.to_wire();
        wire_helpers::encode_chachapoly_nonce(&self.nonce, &mut bytes);
        wire_helpers::encode_chachapoly_ciphertext(&self.ciphertext, &mut bytes);
        bytes.append(&mut self.identity.to_wire());
        bytes
    }

    fn signable_bytes(&self) -> Vec<u8> {
        key_shard_signable_bytes(
            &self.meta,
            &self.nonce,
            &self.ciphertext,
            &self.identity.id_public_key,
        )
    }

    pub fn checksum(&self) -> Multihash {
        CHECKSUM_ALGORITHM.digest(&self.checksummable_bytes())
    }

    pub fn checksum_string(&self) -> String {
        multibase::encode(CHECKSUM_MULTIBASE, self.checksum().to_bytes())
    }

    pub fn document_id(&self) -> DocumentId {
        multihash_short_id(&self.meta.doc_chksum, MainDocument::ID_LENGTH)
    }

    /// Verify the envelope's identity signature. This does not require the
    /// codewords and is also done implicitly by `decrypt`.
    pub fn verify_signature(&self) -> Result<(), Error> {
        self.identity
            .id_public_key
            .verify_strict(&self.signable_bytes(), &self.identity.id_signature)
            .map_err(|_| Error::Forgery("key shard envelope signature is invalid"))
    }

    /// Decrypt the shard contents with the codewords printed alongside the
    /// shard (or held by its keeper).
    pub fn decrypt<A: AsRef<[String]>>(&self, codewords: A) -> Result<KeyShard, Error> {
        // Convert the BIP-39 mnemonic back to a key.
        let phrase = codewords.as_ref().join(" ").to_lowercase();
        let mnemonic = Mnemonic::from_phrase(&phrase, CODEWORD_LANGUAGE).map_err(Error::from)?;
        if mnemonic.entropy().len() != CHACHAPOLY_KEY_LENGTH {
            return Err(Error::Other(
                "codewords do not encode a full shard key".to_string(),
            ));
        }

        // Cheap checks first: the envelope signature doesn't need the key.
        self.verify_signature()?;

        let mut shard_key = ChaChaPolyKey::default();
        shard_key.copy_from_slice(mnemonic.entropy());

        // Decrypt the contents, re-deriving the authenticated header.
        let aead = ChaCha20Poly1305::new(&shard_key);
        let plaintext = aead
            .decrypt(
                &self.nonce,
                Payload {
                    msg: &self.ciphertext,
                    aad: &self.meta.aad(&self.identity.id_public_key),
                },
            )
            .map(Zeroizing::new)
            .map_err(Error::AeadDecryption);
        shard_key.as_mut_slice().zeroize();
        let plaintext = plaintext?;

        // Deserialise the contents.
        let (rest, threshold) = wire_helpers::varint_u32(&plaintext)
            .map_err(|err| Error::Decode(format!("{:?}", err)))?;
        let shard = Shard::from_wire(rest).map_err(Error::Decode)?;

        if threshold != shard.threshold() {
            return Err(Error::Forgery(
                "threshold prefix disagrees with shard metadata",
            ));
        }
        if shard.public_key() != self.identity.id_public_key {
            return Err(Error::Forgery(
                "envelope and shard public keys disagree",
            ));
        }

        Ok(KeyShard {
            meta: self.meta.clone(),
            shard,
            identity: self.identity.clone(),
        })
    }
}

mod keys;

pub(crate) mod wire;
pub use wire::*;

mod recover;
pub use recover::*;

mod backup;
pub use backup::*;

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;

    use quickcheck::{Arbitrary, Gen};

    // Copied from <https://github.com/BurntSushi/quickcheck/pull/292/files>.
    pub(crate) fn arbitrary_fill_slice<S, T>(g: &mut Gen, mut slice: S)
    where
        T: Arbitrary,
        S: AsMut<[T]>,
    {
        slice.as_mut().fill_with(|| T::arbitrary(g))
    }

    pub(crate) fn arbitrary_multihash(g: &mut Gen) -> Multihash {
        CHECKSUM_ALGORITHM.digest(&Vec::<u8>::arbitrary(g))
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Identity {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let bytes = Vec::<u8>::arbitrary(g);

        let id_keypair = SigningKey::generate(&mut rand::rngs::OsRng);
        let id_signature = id_keypair.sign(&bytes);

        Self {
            id_public_key: id_keypair.verifying_key(),
            id_signature,
        }
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for MainDocumentMeta {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Self {
            version: PAPERBACK_VERSION,
            quorum_size: u32::arbitrary(g),
        }
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for MainDocumentBuilder {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let mut nonce = ChaChaPolyNonce::default();
        test_helpers::arbitrary_fill_slice(g, &mut nonce);
        Self {
            meta: MainDocumentMeta::arbitrary(g),
            nonce,
            ciphertext: Vec::<u8>::arbitrary(g),
        }
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for MainDocument {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let id_keypair = SigningKey::generate(&mut rand::rngs::OsRng);
        MainDocumentBuilder::arbitrary(g).sign(&id_keypair)
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for KeyShardMeta {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Self {
            version: PAPERBACK_VERSION,
            doc_chksum: test_helpers::arbitrary_multihash(g),
        }
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for EncryptedKeyShard {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let id_keypair = SigningKey::generate(&mut rand::rngs::OsRng);
        let meta = KeyShardMeta::arbitrary(g);
        let mut nonce = ChaChaPolyNonce::default();
        test_helpers::arbitrary_fill_slice(g, &mut nonce);
        let ciphertext = Vec::<u8>::arbitrary(g);
        let signable = key_shard_signable_bytes(
            &meta,
            &nonce,
            &ciphertext,
            &id_keypair.verifying_key(),
        );
        Self {
            meta,
            nonce,
            ciphertext,
            identity: Identity {
                id_public_key: id_keypair.verifying_key(),
                id_signature: id_keypair.sign(&signable),
            },
        }
    }
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

    fn wire_roundtrip_backup(
        backup: (MainDocument, Vec<(EncryptedKeyShard, KeyShardCodewords)>),
    ) -> (MainDocument, Vec<(EncryptedKeyShard, KeyShardCodewords)>) {
        let (main_document, shards) = backup;
        let main_document = {
            let zbase32_bytes = main_document.to_wire_multibase(multibase::Base::Base32Z);
            MainDocument::from_wire_multibase(zbase32_bytes).unwrap()
        };
        let shards = shards
            .into_iter()
            .map(|(shard, codewords)| {
                let zbase32_bytes = shard.to_wire_multibase(multibase::Base::Base32Z);
                let shard = EncryptedKeyShard::from_wire_multibase(zbase32_bytes).unwrap();
                (shard, codewords)
            })
            .collect::<Vec<_>>();
        (main_document, shards)
    }

    fn make_backup(
        rng: &mut ChaCha20Rng,
        quorum_size: u32,
        num_shards: u32,
        secret: &[u8],
        sealed: bool,
    ) -> (MainDocument, Vec<(EncryptedKeyShard, KeyShardCodewords)>) {
        let mut backup = if sealed {
            Backup::new_sealed(rng, quorum_size, secret).unwrap()
        } else {
            Backup::new(rng, quorum_size, secret).unwrap()
        };
        let main_document = backup.main_document().clone();
        let shards = (0..num_shards)
            .map(|_| backup.next_shard(rng).unwrap())
            .collect::<Vec<_>>();
        (main_document, shards)
    }

    #[quickcheck]
    fn paperback_roundtrip_smoke(quorum_size: u8, secret: Vec<u8>) -> TestResult {
        if quorum_size < 2 || quorum_size > 4 {
            return TestResult::discard();
        }
        let mut rng = test_rng(0x60d0 + quorum_size as u64);

        // Construct a backup and round-trip everything through the wire.
        let (main_document, shards) = wire_roundtrip_backup(make_backup(
            &mut rng,
            quorum_size.into(),
            quorum_size.into(),
            &secret,
            false,
        ));

        // Construct a quorum.
        let mut quorum = UntrustedQuorum::new();
        quorum.main_document(main_document);
        for (shard, codewords) in &shards {
            let shard = shard.decrypt(codewords).unwrap();
            quorum.push_shard(shard);
        }
        let quorum = quorum.validate().unwrap();

        // Recover the secret.
        let recovered_secret = quorum.recover_document().unwrap();

        TestResult::from_bool(recovered_secret == secret)
    }

    fn inner_paperback_expand_smoke(quorum_size: u32, secret: &[u8]) -> bool {
        let mut rng = test_rng(0xe8 + quorum_size as u64);
        let (main_document, shards) = wire_roundtrip_backup(make_backup(
            &mut rng,
            quorum_size,
            quorum_size,
            secret,
            false,
        ));

        // Construct a quorum *without the main document*.
        let mut quorum = UntrustedQuorum::new();
        for (shard, codewords) in &shards {
            quorum.push_shard(shard.decrypt(codewords).unwrap());
        }
        let quorum = quorum.validate().unwrap();

        // Secret recovery should fail.
        let _ = quorum.recover_document().unwrap_err();

        // But we can expand it -- take the new shards through a round-trip.
        let new_shards = quorum
            .extend_shards(&mut rng, quorum_size)
            .unwrap()
            .into_iter()
            .map(|(shard, codewords)| {
                let zbase32_bytes = shard.to_wire_multibase(multibase::Base::Base32Z);
                let shard = EncryptedKeyShard::from_wire_multibase(zbase32_bytes).unwrap();
                (shard, codewords)
            })
            .collect::<Vec<_>>();
        std::mem::drop(quorum); // make sure it's gone

        // Construct a new quorum with a mix of old and expanded shards.
        let take_old = (quorum_size as usize) / 2;
        let take_new = (quorum_size as usize) - take_old;
        let mut quorum = UntrustedQuorum::new();
        quorum.main_document(main_document);
        for (shard, codewords) in shards
            .iter()
            .take(take_old)
            .chain(new_shards.iter().take(take_new))
        {
            quorum.push_shard(shard.decrypt(codewords).unwrap());
        }
        let quorum = quorum.validate().unwrap();

        // Recover the secret.
        quorum.recover_document().unwrap() == secret
    }

    macro_rules! paperback_expand_test {
        ($func:ident, $quorum_size:expr) => {
            #[test]
            fn $func() {
                let mut secret = [0; 256];
                test_rng(0xbead).fill_bytes(&mut secret[..]);
                assert!(inner_paperback_expand_smoke($quorum_size, &secret[..]))
            }
        };
    }

    paperback_expand_test!(paperback_expand_smoke_2, 2);
    paperback_expand_test!(paperback_expand_smoke_3, 3);
    paperback_expand_test!(paperback_expand_smoke_4, 4);
    paperback_expand_test!(paperback_expand_smoke_5, 5);

    #[test]
    fn hello_world_recovery() {
        let mut rng = test_rng(0x4869);
        let (main_document, shards) = make_backup(&mut rng, 2, 3, b"Hello, world!", false);

        // The first and third shards are enough.
        let mut quorum = UntrustedQuorum::new();
        quorum.main_document(main_document);
        for (shard, codewords) in [&shards[0], &shards[2]] {
            quorum.push_shard(shard.decrypt(codewords).unwrap());
        }
        let quorum = quorum.validate().unwrap();
        assert_eq!(quorum.recover_document().unwrap(), b"Hello, world!");
    }

    #[test]
    fn key_shard_encryption_roundtrip() {
        let mut rng = test_rng(0x6e6e);
        let (_, shards) = make_backup(&mut rng, 2, 3, b"roundtrip", false);
        for (shard, codewords) in &shards {
            let decrypted = shard.decrypt(codewords).unwrap();
            // Re-encrypting isn't possible without the private key, but the
            // envelope must decrypt consistently.
            assert_eq!(decrypted, shard.decrypt(codewords).unwrap());
            assert_eq!(shard.document_id(), decrypted.document_id());
        }
    }

    #[test]
    fn wrong_codewords_fail_decryption() {
        let mut rng = test_rng(0xbadc);
        let (_, shards) = make_backup(&mut rng, 2, 2, b"wrong codewords", false);
        let (shard_a, codewords_a) = &shards[0];
        let (_, codewords_b) = &shards[1];
        assert_ne!(codewords_a, codewords_b);
        assert!(matches!(
            shard_a.decrypt(codewords_b),
            Err(Error::AeadDecryption(_))
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let mut rng = test_rng(0x7a39);
        let (_, mut shards) = make_backup(&mut rng, 2, 2, b"tamper-evident", false);
        let (shard, codewords) = &mut shards[0];
        shard.ciphertext[0] ^= 0x01;
        // Both the envelope signature and the AEAD authenticate this byte.
        assert!(shard.decrypt(&*codewords).is_err());
    }

    #[test]
    fn tampered_nonce_fails_decryption() {
        let mut rng = test_rng(0x7a3a);
        let (_, mut shards) = make_backup(&mut rng, 2, 2, b"tamper-evident", false);
        let (shard, codewords) = &mut shards[0];
        shard.nonce[0] ^= 0x01;
        assert!(shard.decrypt(&*codewords).is_err());
    }

    #[test]
    fn tampered_header_fails_decryption() {
        let mut rng = test_rng(0x7a3b);
        let (_, mut shards) = make_backup(&mut rng, 2, 2, b"tamper-evident", false);
        let (shard, codewords) = &mut shards[0];
        shard.meta.doc_chksum = CHECKSUM_ALGORITHM.digest(b"some other document");
        assert!(shard.decrypt(&*codewords).is_err());
    }

    #[test]
    fn tampered_wire_fails_checksum() {
        let mut rng = test_rng(0x7a3c);
        let (main_document, shards) = make_backup(&mut rng, 2, 2, b"paper damage", false);

        let mut wire = main_document.to_wire();
        wire[10] ^= 0x01;
        assert!(MainDocument::from_wire(&wire).is_err());

        let mut wire = shards[0].0.to_wire();
        wire[10] ^= 0x01;
        assert!(EncryptedKeyShard::from_wire(&wire).is_err());
    }

    #[test]
    fn document_ids_are_stable() {
        let mut rng = test_rng(0x1d1d);
        let (main_document, shards) = make_backup(&mut rng, 2, 3, b"ids", false);
        for (shard, codewords) in &shards {
            assert_eq!(shard.document_id(), main_document.id());
            assert_eq!(
                shard.decrypt(codewords).unwrap().document_id(),
                main_document.id()
            );
        }
    }
}
