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
    shamir::{self, Dealer},
    v0::{
        EncryptedKeyShard, Error, FromWire, KeyShard, KeyShardBuilder, KeyShardCodewords,
        KeyShardMeta, MainDocument, ShardId, ShardSecret, PAPERBACK_VERSION,
    },
};

use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
};

use aead::Payload;
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, KeyInit};
use ed25519_dalek::VerifyingKey;
use multihash::Multihash;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

/// An artifact after verification, with forged artifacts kept (for display
/// to the person adjudicating the recovery) but never used.
#[derive(Debug, Clone)]
pub enum Type {
    MainDocument(MainDocument),
    ForgedMainDocument(MainDocument),
    KeyShard(KeyShard),
    ForgedKeyShard(KeyShard),
}

impl Type {
    fn main_document(&self) -> Option<&MainDocument> {
        match self {
            Type::MainDocument(main) => Some(main),
            _ => None,
        }
    }

    fn key_shard(&self) -> Option<&KeyShard> {
        match self {
            Type::KeyShard(shard) => Some(shard),
            _ => None,
        }
    }

    /// Human identifier of the underlying artifact.
    pub fn id(&self) -> String {
        match self {
            Type::MainDocument(main) | Type::ForgedMainDocument(main) => main.id(),
            Type::KeyShard(shard) | Type::ForgedKeyShard(shard) => shard.id(),
        }
    }

    pub fn is_forged(&self) -> bool {
        matches!(self, Type::ForgedMainDocument(_) | Type::ForgedKeyShard(_))
    }
}

impl From<MainDocument> for Type {
    fn from(main: MainDocument) -> Self {
        match main.verify_signature() {
            Ok(_) => Type::MainDocument(main),
            Err(_) => Type::ForgedMainDocument(main),
        }
    }
}

impl From<KeyShard> for Type {
    fn from(shard: KeyShard) -> Self {
        // The envelope signature was verified when the shard was decrypted;
        // here we check the inner (shamir-level) signature and that both
        // layers agree on the identity.
        let consistent = shard.shard.verify()
            && shard.shard.public_key() == shard.identity.id_public_key;
        match consistent {
            true => Type::KeyShard(shard),
            false => Type::ForgedKeyShard(shard),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Grouping(pub Vec<Vec<Type>>);

#[derive(Debug, Clone, Eq)]
struct HashablePublicKey(VerifyingKey);

impl PartialEq for HashablePublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes() == other.0.as_bytes()
    }
}

impl Hash for HashablePublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_bytes().hash(state);
    }
}

#[derive(Debug)]
pub struct InconsistentQuorumError {
    message: String,
    groups: Grouping,
}

impl InconsistentQuorumError {
    pub fn as_groups(&self) -> &Grouping {
        &self.groups
    }
}

impl fmt::Display for InconsistentQuorumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "quorum failed to validate: {}", self.message)
    }
}

impl std::error::Error for InconsistentQuorumError {}

/// Collection progress of an [`UntrustedQuorum`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum QuorumState {
    /// Still collecting shards. `remaining` is unknown until the first
    /// artifact has been added.
    Collecting {
        remaining: Option<u32>,
        accepted: Vec<ShardId>,
    },
    /// Enough unique shards are present to attempt validation.
    Ready,
}

/// A pile of artifacts as scanned in, before any cross-artifact
/// verification. Artifacts can be added in any order.
#[derive(Debug, Clone, Default)]
pub struct UntrustedQuorum {
    untrusted_main_document: Option<MainDocument>,
    untrusted_shards: Vec<KeyShard>,
}

impl UntrustedQuorum {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push_shard(&mut self, shard: KeyShard) -> &mut Self {
        self.untrusted_shards.push(shard);
        self
    }

    pub fn main_document(&mut self, main: MainDocument) -> &mut Self {
        self.untrusted_main_document = Some(main);
        self
    }

    fn unique_shard_ids(&self) -> Vec<ShardId> {
        let mut ids = self
            .untrusted_shards
            .iter()
            .map(KeyShard::id)
            .collect::<Vec<_>>();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Report how far along collection is. The threshold is taken from the
    /// main document if present, otherwise from the first shard.
    pub fn state(&self) -> QuorumState {
        let threshold = self
            .untrusted_main_document
            .as_ref()
            .map(MainDocument::quorum_size)
            .or_else(|| self.untrusted_shards.first().map(KeyShard::threshold));
        let accepted = self.unique_shard_ids();

        match threshold {
            Some(threshold) if accepted.len() >= threshold as usize => QuorumState::Ready,
            Some(threshold) => QuorumState::Collecting {
                remaining: Some(threshold - accepted.len() as u32),
                accepted,
            },
            None => QuorumState::Collecting {
                remaining: None,
                accepted,
            },
        }
    }

    fn group(&self) -> Vec<Vec<Type>> {
        let documents = self
            .untrusted_main_document
            .iter()
            .cloned()
            .map(Type::from)
            .chain(self.untrusted_shards.iter().cloned().map(Type::from))
            .collect::<Vec<_>>();

        #[derive(Clone, Debug, Eq, Hash, PartialEq)]
        struct GroupId {
            // All artifacts must agree on the paperback version. This could
            // be faked by an attacker but this is just a sanity-check.
            version: u32,
            // All artifacts must agree on the document checksum.
            doc_chksum: Multihash,
            // All artifacts must agree on quorum size.
            quorum_size: u32,
            // All artifacts must use the same public key for their identity.
            id_public_key: HashablePublicKey,
        }

        let mut groups: HashMap<GroupId, Vec<Type>> = HashMap::new();
        for document in documents {
            let group_id = match &document {
                Type::MainDocument(main) | Type::ForgedMainDocument(main) => GroupId {
                    version: main.inner.meta.version,
                    doc_chksum: main.checksum(),
                    quorum_size: main.quorum_size(),
                    id_public_key: HashablePublicKey(main.identity.id_public_key),
                },
                Type::KeyShard(shard) | Type::ForgedKeyShard(shard) => GroupId {
                    version: shard.meta.version,
                    doc_chksum: shard.document_checksum().clone(),
                    quorum_size: shard.threshold(),
                    id_public_key: HashablePublicKey(shard.identity.id_public_key),
                },
            };
            groups.entry(group_id).or_default().push(document);
        }
        groups.into_values().collect::<Vec<_>>()
    }

    pub fn validate(self) -> Result<Quorum, InconsistentQuorumError> {
        let groups = self.group();
        let fail = |message: &str| InconsistentQuorumError {
            message: message.into(),
            groups: Grouping(groups.clone()),
        };

        // Must only have one grouping of artifacts.
        let documents = match &groups[..] {
            [] => return Err(fail("empty quorum")),
            [documents] => documents,
            _ => return Err(fail("key shards and documents are inconsistent")),
        };

        // Must not contain any forged artifacts.
        if let Some(forged) = documents.iter().find(|d| d.is_forged()) {
            return Err(fail(&format!(
                "quorum contains forged artifact {}",
                forged.id()
            )));
        }

        // Extract the main document from the grouping (there may be none --
        // shard expansion doesn't need one).
        let main_document = {
            let mains = documents
                .iter()
                .filter_map(Type::main_document)
                .collect::<Vec<_>>();
            match mains[..] {
                [] => None,
                [main] => Some(main.clone()),
                _ => return Err(fail("more than one main document in grouping")),
            }
        };

        // Extract the key shards from the grouping.
        let shards = documents
            .iter()
            .filter_map(Type::key_shard)
            .cloned()
            .collect::<Vec<_>>();
        let first_shard = match shards.first() {
            Some(first) => first,
            None => return Err(fail("quorum contains no key shards")),
        };

        // All shards must agree on the share parameters (prime, block size,
        // secret size) -- grouping only compares the envelope headers.
        if shards
            .iter()
            .any(|shard| shard.shard.meta() != first_shard.shard.meta())
        {
            return Err(fail("key shard share parameters are inconsistent"));
        }

        // The quorum must hold at least threshold many *unique* shards.
        let threshold = main_document
            .as_ref()
            .map(MainDocument::quorum_size)
            .unwrap_or_else(|| first_shard.threshold());
        let unique_shards = {
            let mut ids = shards.iter().map(KeyShard::id).collect::<Vec<_>>();
            ids.sort();
            ids.dedup();
            ids.len()
        };
        if unique_shards < threshold as usize {
            return Err(fail(&format!(
                "quorum size required is {} but only had {} unique shards",
                threshold, unique_shards
            )));
        }

        // All shards must have agreed on these properties -- otherwise the
        // grouping checks above would've caused an error.
        let id_public_key = first_shard.identity.id_public_key;
        let doc_chksum = first_shard.document_checksum().clone();

        Ok(Quorum {
            main_document,
            shards,
            id_public_key,
            doc_chksum,
            threshold,
        })
    }
}

/// The kind of shard to mint from a validated quorum.
#[derive(Debug, Clone)]
pub enum NewShardKind {
    /// A brand-new shard with a fresh random identifier.
    NewShard,
    /// A replacement for a lost shard, re-issued under its original
    /// identifier. The identifier must not belong to any shard in the
    /// quorum.
    ExistingShard(ShardId),
}

/// A fully cross-checked quorum of artifacts from one backup.
#[derive(Debug, Clone)]
pub struct Quorum {
    main_document: Option<MainDocument>,
    shards: Vec<KeyShard>,
    // Cached consensus information.
    id_public_key: VerifyingKey,
    doc_chksum: Multihash,
    threshold: u32,
}

impl Quorum {
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    fn raw_shards(&self) -> Vec<shamir::Shard> {
        self.shards
            .iter()
            .map(|shard| shard.shard.clone())
            .collect::<Vec<_>>()
    }

    /// Recover the backed-up plaintext.
    pub fn recover_document(&self) -> Result<Vec<u8>, Error> {
        let main_document = self
            .main_document
            .as_ref()
            .ok_or(Error::MissingCapability("no main document in quorum"))?;

        let secret_wire = Zeroizing::new(shamir::recover_secret(&self.raw_shards())?);
        let shard_secret = ShardSecret::from_wire(&*secret_wire).map_err(Error::Decode)?;

        // Decrypt the contents, re-deriving the authenticated header.
        let aead = ChaCha20Poly1305::new(&shard_secret.doc_key);
        aead.decrypt(
            &main_document.inner.nonce,
            Payload {
                msg: &main_document.inner.ciphertext,
                aad: &main_document.inner.meta.aad(&self.id_public_key),
            },
        )
        .map_err(Error::AeadDecryption)
    }

    fn recovered_dealer(&self) -> Result<Dealer, Error> {
        let dealer = Dealer::recover(&self.raw_shards())?;
        // Defense in depth: the dealer's recovered identity must be the one
        // every artifact in this quorum was checked against.
        if dealer.public_key() != self.id_public_key {
            return Err(Error::InvariantViolation(
                "recovered dealer key does not match quorum identity",
            ));
        }
        Ok(dealer)
    }

    fn mint_shard<R: RngCore + CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        dealer: &mut Dealer,
        kind: NewShardKind,
    ) -> Result<(EncryptedKeyShard, KeyShardCodewords), Error> {
        let shard = match kind {
            NewShardKind::NewShard => dealer.next_shard(rng)?,
            NewShardKind::ExistingShard(id) => {
                let x = shamir::parse_id(&id)
                    .map_err(|err| Error::Decode(format!("parse shard id '{}': {}", id, err)))?;
                dealer.shard_with_x(&x)?
            }
        };
        let id_keypair = dealer.id_keypair()?;
        KeyShardBuilder {
            meta: KeyShardMeta {
                version: PAPERBACK_VERSION,
                doc_chksum: self.doc_chksum.clone(),
            },
            shard,
        }
        .encrypt_and_sign(rng, id_keypair)
    }

    /// Mint a single new shard. Fails with a sealed-backup error if the
    /// backup was created sealed.
    pub fn new_shard<R: RngCore + CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        kind: NewShardKind,
    ) -> Result<(EncryptedKeyShard, KeyShardCodewords), Error> {
        let mut dealer = self.recovered_dealer()?;
        self.mint_shard(rng, &mut dealer, kind)
    }

    /// Mint `count` new shards with fresh identifiers, all distinct from
    /// each other and from every shard in this quorum.
    pub fn extend_shards<R: RngCore + CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        count: u32,
    ) -> Result<Vec<(EncryptedKeyShard, KeyShardCodewords)>, Error> {
        let mut dealer = self.recovered_dealer()?;
        (0..count)
            .map(|_| self.mint_shard(rng, &mut dealer, NewShardKind::NewShard))
            .collect()
    }

    /// Re-issue replacement shards under the given (lost) identifiers.
    pub fn recreate_shards<R: RngCore + CryptoRng + ?Sized>(
        &self,
        rng: &mut R,
        shard_ids: &[ShardId],
    ) -> Result<Vec<(EncryptedKeyShard, KeyShardCodewords)>, Error> {
        let mut dealer = self.recovered_dealer()?;
        shard_ids
            .iter()
            .map(|id| self.mint_shard(rng, &mut dealer, NewShardKind::ExistingShard(id.clone())))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::v0::Backup;

    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn test_rng(seed: u64) -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(seed)
    }

    fn backup_with_shards(
        rng: &mut ChaCha20Rng,
        quorum_size: u32,
        num_shards: u32,
        secret: &[u8],
        sealed: bool,
    ) -> (MainDocument, Vec<KeyShard>) {
        let mut backup = if sealed {
            Backup::new_sealed(rng, quorum_size, secret).unwrap()
        } else {
            Backup::new(rng, quorum_size, secret).unwrap()
        };
        let main_document = backup.main_document().clone();
        let shards = (0..num_shards)
            .map(|_| {
                let (shard, codewords) = backup.next_shard(rng).unwrap();
                shard.decrypt(&codewords).unwrap()
            })
            .collect::<Vec<_>>();
        (main_document, shards)
    }

    #[test]
    fn collection_state_reports_progress() {
        let mut rng = test_rng(0xc011);
        let (main_document, shards) = backup_with_shards(&mut rng, 3, 3, b"progress", false);

        let mut quorum = UntrustedQuorum::new();
        assert_eq!(
            quorum.state(),
            QuorumState::Collecting {
                remaining: None,
                accepted: vec![],
            }
        );

        quorum.main_document(main_document);
        assert!(matches!(
            quorum.state(),
            QuorumState::Collecting {
                remaining: Some(3),
                ..
            }
        ));

        quorum.push_shard(shards[0].clone());
        // Pushing the same shard twice must not count it twice.
        quorum.push_shard(shards[0].clone());
        match quorum.state() {
            QuorumState::Collecting {
                remaining: Some(2),
                accepted,
            } => assert_eq!(accepted, vec![shards[0].id()]),
            state => panic!("unexpected quorum state {:?}", state),
        }

        quorum.push_shard(shards[1].clone());
        quorum.push_shard(shards[2].clone());
        assert_eq!(quorum.state(), QuorumState::Ready);

        assert!(quorum.validate().is_ok());
    }

    #[test]
    fn extra_shards_are_accepted() {
        let mut rng = test_rng(0xe872);
        let (main_document, shards) = backup_with_shards(&mut rng, 2, 5, b"extras", false);

        let mut quorum = UntrustedQuorum::new();
        quorum.main_document(main_document);
        for shard in shards {
            quorum.push_shard(shard);
        }
        let quorum = quorum.validate().unwrap();
        assert_eq!(quorum.recover_document().unwrap(), b"extras");
    }

    #[test]
    fn insufficient_shards_fail_validation() {
        let mut rng = test_rng(0x1e55);
        let (main_document, shards) = backup_with_shards(&mut rng, 3, 5, b"too few", false);

        let mut quorum = UntrustedQuorum::new();
        quorum.main_document(main_document);
        quorum.push_shard(shards[0].clone());
        quorum.push_shard(shards[1].clone());
        assert!(quorum.validate().is_err());
    }

    #[test]
    fn cross_document_shards_fail_validation() {
        let mut rng = test_rng(0xc20d);
        let (main_document, shards_a) = backup_with_shards(&mut rng, 2, 2, b"backup A", false);
        let (_, shards_b) = backup_with_shards(&mut rng, 2, 2, b"backup B", false);

        let mut quorum = UntrustedQuorum::new();
        quorum.main_document(main_document);
        quorum.push_shard(shards_a[0].clone());
        quorum.push_shard(shards_b[0].clone());
        let err = quorum.validate().unwrap_err();
        assert!(err.as_groups().0.len() > 1);
    }

    #[test]
    fn recovery_without_main_document_fails() {
        let mut rng = test_rng(0x0d0c);
        let (_, shards) = backup_with_shards(&mut rng, 2, 2, b"no doc", false);

        let mut quorum = UntrustedQuorum::new();
        for shard in shards {
            quorum.push_shard(shard);
        }
        let quorum = quorum.validate().unwrap();
        assert!(matches!(
            quorum.recover_document(),
            Err(Error::MissingCapability(_))
        ));
    }

    #[test]
    fn sealed_backup_cannot_expand_but_recovers() {
        let mut rng = test_rng(0x5ead);
        let (main_document, shards) =
            backup_with_shards(&mut rng, 2, 2, b"sealed payload", true);

        let mut quorum = UntrustedQuorum::new();
        quorum.main_document(main_document);
        for shard in shards {
            quorum.push_shard(shard);
        }
        let quorum = quorum.validate().unwrap();

        assert!(matches!(
            quorum.new_shard(&mut rng, NewShardKind::NewShard),
            Err(Error::Shamir(shamir::Error::Sealed))
        ));
        assert_eq!(quorum.recover_document().unwrap(), b"sealed payload");
    }

    #[test]
    fn recreate_shard_under_lost_id() {
        let mut rng = test_rng(0x4ec2);
        let (main_document, shards) = backup_with_shards(&mut rng, 2, 3, b"recreate me", false);
        let lost = &shards[2];

        let mut quorum = UntrustedQuorum::new();
        quorum.main_document(main_document.clone());
        quorum.push_shard(shards[0].clone());
        quorum.push_shard(shards[1].clone());
        let quorum = quorum.validate().unwrap();

        // Recreating an id that is present in the quorum must fail.
        assert!(matches!(
            quorum.recreate_shards(&mut rng, &[shards[0].id()]),
            Err(Error::Shamir(shamir::Error::DuplicateX { .. }))
        ));

        // Recreating the lost shard works, and the replacement carries the
        // lost shard's identifier and can take its place in recovery.
        let recreated = quorum.recreate_shards(&mut rng, &[lost.id()]).unwrap();
        let (encrypted, codewords) = &recreated[0];
        let replacement = encrypted.decrypt(codewords).unwrap();
        assert_eq!(replacement.id(), lost.id());

        let mut quorum = UntrustedQuorum::new();
        quorum.main_document(main_document);
        quorum.push_shard(shards[0].clone());
        quorum.push_shard(replacement);
        let quorum = quorum.validate().unwrap();
        assert_eq!(quorum.recover_document().unwrap(), b"recreate me");
    }

    #[test]
    fn garbage_shard_id_is_rejected() {
        let mut rng = test_rng(0x6a2b);
        let (_, shards) = backup_with_shards(&mut rng, 2, 2, b"bad ids", false);

        let mut quorum = UntrustedQuorum::new();
        for shard in shards {
            quorum.push_shard(shard);
        }
        let quorum = quorum.validate().unwrap();
        assert!(matches!(
            quorum.recreate_shards(&mut rng, &["not-a-multibase-id!".to_string()]),
            Err(Error::Decode(_))
        ));
    }
}
