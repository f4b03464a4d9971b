use std::ops::Deref;

use chrono::{DateTime, SubsecRound, Utc};
use data_encoding::HEXLOWER;
use hmac::{digest::CtOutput, Hmac, Mac};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::model::{common::ballot::PositionVote, mongodb::Id};

pub type HmacSha256 = Hmac<Sha256>;

/// Core ballot data, as stored in the database. Never modified after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotCore {
    /// Foreign Key session ID. Unique: a session produces at most one ballot.
    pub session_id: Id,
    /// Foreign Key election ID.
    pub election_id: Id,
    /// The voter who cast this ballot. Unique per election.
    pub voter_id: Id,
    /// One entry per position of the election, in ballot order.
    pub position_votes: Vec<PositionVote>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub submitted_at: DateTime<Utc>,
    /// Hex HMAC-SHA256 over the ballot's canonical bytes.
    pub integrity_hash: String,
}

/// A ballot from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub ballot: BallotCore,
}

impl Ballot {
    /// Seal a new ballot, computing its integrity hash with the given key.
    ///
    /// `submitted_at` is truncated to the millisecond precision the database stores.
    pub fn seal(
        session_id: Id,
        election_id: Id,
        voter_id: Id,
        position_votes: Vec<PositionVote>,
        submitted_at: DateTime<Utc>,
        key: &[u8],
    ) -> Self {
        let mut ballot = Self {
            id: Id::new(),
            ballot: BallotCore {
                session_id,
                election_id,
                voter_id,
                position_votes,
                submitted_at: submitted_at.trunc_subsecs(3),
                integrity_hash: String::new(),
            },
        };
        ballot.ballot.integrity_hash = HEXLOWER.encode(&ballot.mac(key).into_bytes());
        ballot
    }

    /// Check that the stored hash matches the ballot contents.
    pub fn verify_integrity(&self, key: &[u8]) -> bool {
        match HEXLOWER.decode(self.integrity_hash.as_bytes()) {
            Ok(expected) => self.mac_state(key).verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }

    fn mac(&self, key: &[u8]) -> CtOutput<HmacSha256> {
        self.mac_state(key).finalize()
    }

    fn mac_state(&self, key: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take a key of any size");
        mac.update(&self.to_bytes());
        mac
    }

    /// Canonical byte encoding of everything the integrity hash covers.
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(self.id.to_bytes());
        bytes.extend(self.session_id.to_bytes());
        bytes.extend(self.election_id.to_bytes());
        bytes.extend(self.voter_id.to_bytes());
        bytes.extend(self.submitted_at.timestamp_millis().to_le_bytes());
        for vote in &self.position_votes {
            bytes.extend(vote.to_bytes());
        }
        bytes
    }
}

impl Deref for Ballot {
    type Target = BallotCore;

    fn deref(&self) -> &Self::Target {
        &self.ballot
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::{from_document, to_document};

    use super::*;

    const KEY: &[u8] = b"integrity";

    fn example() -> Ballot {
        let p1 = Id::new();
        let p2 = Id::new();
        Ballot::seal(
            Id::new(),
            Id::new(),
            Id::new(),
            vec![
                PositionVote::selected(p1, vec![Id::new()]),
                PositionVote::abstained(p2),
            ],
            Utc::now(),
            KEY,
        )
    }

    #[test]
    fn sealed_ballot_verifies() {
        let ballot = example();
        assert_eq!(ballot.integrity_hash.len(), 64);
        assert!(ballot.verify_integrity(KEY));
        assert!(!ballot.verify_integrity(b"another key"));
    }

    #[test]
    fn tampering_breaks_integrity() {
        let mut ballot = example();
        let position_id = ballot.position_votes[1].position_id;
        ballot.ballot.position_votes[1] = PositionVote::selected(position_id, vec![Id::new()]);
        assert!(!ballot.verify_integrity(KEY));

        let mut ballot = example();
        ballot.ballot.integrity_hash = "zz".to_string();
        assert!(!ballot.verify_integrity(KEY));
    }

    #[test]
    fn survives_a_database_round_trip() {
        let ballot = example();
        let stored: Ballot = from_document(to_document(&ballot).unwrap()).unwrap();
        assert_eq!(stored, ballot);
        assert!(stored.verify_integrity(KEY));
    }

    #[test]
    fn stored_shape() {
        let ballot = example();
        let doc = to_document(&ballot).unwrap();
        for key in [
            "_id",
            "session_id",
            "election_id",
            "voter_id",
            "position_votes",
            "submitted_at",
            "integrity_hash",
        ] {
            assert!(doc.contains_key(key), "missing {key}");
        }
        let votes = doc.get_array("position_votes").unwrap();
        let abstained = votes[1].as_document().unwrap();
        assert_eq!(abstained.get_bool("abstain").unwrap(), true);
        assert!(abstained.get_array("candidate_ids").unwrap().is_empty());
    }
}
