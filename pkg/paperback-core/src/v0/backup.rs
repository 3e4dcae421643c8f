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
    shamir::Dealer,
    v0::{
        keys, ChaChaPolyKey, EncryptedKeyShard, Error, KeyShardBuilder, KeyShardCodewords,
        KeyShardMeta, MainDocument, MainDocumentBuilder, MainDocumentMeta, ShardSecret, ToWire,
        PAPERBACK_VERSION,
    },
};

use aead::Payload;
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, KeyInit};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

/// An in-progress backup: the signed main document plus the dealer that
/// mints its key shards.
pub struct Backup {
    main_document: MainDocument,
    dealer: Dealer,
}

impl Backup {
    fn inner_new<R: RngCore + CryptoRng + ?Sized>(
        rng: &mut R,
        quorum_size: u32,
        secret: &[u8],
        sealed: bool,
    ) -> Result<Self, Error> {
        // Generate the document key. This is the only thing the quorum
        // actually reconstructs -- everything else is derived from it.
        let doc_key = keys::generate_key(rng)?;
        let shard_secret_wire = Zeroizing::new(
            ShardSecret {
                doc_key: ChaChaPolyKey::clone_from_slice(&doc_key[..]),
            }
            .to_wire(),
        );

        // Construct the SSS dealer. This also generates the prime field and
        // the identity keypair used to sign every artifact of this backup.
        let dealer = Dealer::new(rng, quorum_size, &shard_secret_wire, sealed)?;
        let id_keypair = dealer.id_keypair()?;

        // Encrypt the user's plaintext, authenticating the document header.
        let main_document_meta = MainDocumentMeta {
            version: PAPERBACK_VERSION,
            quorum_size,
        };
        let doc_nonce = keys::generate_nonce(rng);
        let aead = ChaCha20Poly1305::new(ChaChaPolyKey::from_slice(&doc_key[..]));
        let ciphertext = aead
            .encrypt(
                &doc_nonce,
                Payload {
                    msg: secret,
                    aad: &main_document_meta.aad(&id_keypair.verifying_key()),
                },
            )
            .map_err(Error::AeadEncryption)?;

        let main_document = MainDocumentBuilder {
            meta: main_document_meta,
            nonce: doc_nonce,
            ciphertext,
        }
        .sign(id_keypair);

        Ok(Backup {
            main_document,
            dealer,
        })
    }

    pub fn new<R: RngCore + CryptoRng + ?Sized, B: AsRef<[u8]>>(
        rng: &mut R,
        quorum_size: u32,
        secret: B,
    ) -> Result<Self, Error> {
        Self::inner_new(rng, quorum_size, secret.as_ref(), false)
    }

    /// Like [`Backup::new`], but the identity private key is destroyed
    /// instead of being stored inside the shared secret. No new shards can
    /// ever be minted for a sealed backup.
    pub fn new_sealed<R: RngCore + CryptoRng + ?Sized, B: AsRef<[u8]>>(
        rng: &mut R,
        quorum_size: u32,
        secret: B,
    ) -> Result<Self, Error> {
        Self::inner_new(rng, quorum_size, secret.as_ref(), true)
    }

    pub fn main_document(&self) -> &MainDocument {
        &self.main_document
    }

    pub fn quorum_size(&self) -> u32 {
        self.main_document.quorum_size()
    }

    /// Mint the next key shard of this backup, wrapped under a fresh shard
    /// key which is returned as its BIP-39 codewords.
    pub fn next_shard<R: RngCore + CryptoRng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<(EncryptedKeyShard, KeyShardCodewords), Error> {
        let shard = self.dealer.next_shard(rng)?;
        let id_keypair = self.dealer.id_keypair()?;
        KeyShardBuilder {
            meta: KeyShardMeta {
                version: self.main_document.inner.meta.version,
                doc_chksum: self.main_document.checksum(),
            },
            shard,
        }
        .encrypt_and_sign(rng, id_keypair)
    }
}
