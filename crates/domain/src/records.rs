//! Typed records per address space.
//!
//! Field names and enum values follow the ledger's payload schema. Several
//! record kinds carry an ordered version list; the last entry is
//! authoritative for current-state queries, earlier entries are audit
//! history.

use common::{PublicKey, TransactionId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an actor, from its latest profile entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorStatus {
    Active,
    Waiting,
    Inactive,
}

impl ActorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorStatus::Active => "ACTIVE",
            ActorStatus::Waiting => "WAITING",
            ActorStatus::Inactive => "INACTIVE",
        }
    }
}

/// Role an actor plays in the credential system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Institution,
    Teacher,
    Student,
    Other,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Institution => "INSTITUTION",
            ActorRole::Teacher => "TEACHER",
            ActorRole::Student => "STUDENT",
            ActorRole::Other => "OTHER",
        }
    }
}

/// One entry in an actor's profile history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileEntry {
    pub data: String,
    pub status: ActorStatus,
    pub timestamp: i64,
    pub transaction_id: TransactionId,
}

/// A participant registered on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Actor {
    pub actor_public_key: PublicKey,
    pub manager_public_key: PublicKey,
    pub id: String,
    pub role: ActorRole,
    pub profile: Vec<ProfileEntry>,
    pub timestamp: i64,
    pub transaction_id: TransactionId,
}

impl Actor {
    /// The authoritative profile entry, if any exist.
    pub fn latest_profile(&self) -> Option<&ProfileEntry> {
        self.profile.last()
    }
}

/// Status of a credential record, from its latest version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Created,
    Revoked,
    Reactivated,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Created => "CREATED",
            RecordStatus::Revoked => "REVOKED",
            RecordStatus::Reactivated => "REACTIVATED",
        }
    }
}

/// Kind of credential a record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Certificate,
    Subject,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Certificate => "CERTIFICATE",
            RecordType::Subject => "SUBJECT",
        }
    }
}

/// One version of a credential record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordVersion {
    pub portfolio_id: String,
    /// Encrypted credential payload; opaque to the projector.
    pub data: String,
    pub record_status: RecordStatus,
    pub timestamp: i64,
    pub transaction_id: TransactionId,
}

/// A credential issued to an owner and managed by an institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Record {
    pub owner_public_key: PublicKey,
    pub issuer_public_key: PublicKey,
    pub manager_public_key: PublicKey,
    pub record_id: String,
    pub record_type: RecordType,
    pub versions: Vec<RecordVersion>,
}

impl Record {
    /// The authoritative version, if any exist.
    pub fn latest_version(&self) -> Option<&RecordVersion> {
        self.versions.last()
    }
}

/// A class taught at an institution, enrolling several students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Class {
    pub class_id: String,
    pub institution_public_key: PublicKey,
    pub subject_id: String,
    pub teacher_public_key: PublicKey,
    pub credit: u32,
    pub student_public_keys: Vec<PublicKey>,
    pub timestamp: i64,
    pub transaction_id: TransactionId,
}

/// Kind of a portfolio entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortfolioType {
    EduProgram,
    Other,
}

/// One entry in a portfolio's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortfolioEntry {
    pub portfolio_type: PortfolioType,
    /// Entry payload; for `EDU_PROGRAM` entries this is [`EduProgramData`]
    /// as JSON.
    pub data: String,
    pub timestamp: i64,
    pub transaction_id: TransactionId,
}

/// A portfolio of programs owned by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Portfolio {
    pub owner_public_key: PublicKey,
    pub manager_public_key: PublicKey,
    pub id: String,
    #[serde(rename = "portfolio_data")]
    pub entries: Vec<PortfolioEntry>,
}

impl Portfolio {
    /// The authoritative entry, if any exist.
    pub fn latest_entry(&self) -> Option<&PortfolioEntry> {
        self.entries.last()
    }
}

/// Education-program details carried inside an `EDU_PROGRAM` portfolio entry.
///
/// Field names are camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EduProgramData {
    pub name: String,
    pub total_credit: u32,
    pub min_year: u16,
    pub max_year: u16,
}

impl PortfolioEntry {
    /// Parses the entry payload as education-program data.
    ///
    /// Returns `Ok(None)` for entries of another type.
    pub fn edu_program(&self) -> Result<Option<EduProgramData>, serde_json::Error> {
        if self.portfolio_type != PortfolioType::EduProgram {
            return Ok(None);
        }
        serde_json::from_str(&self.data).map(Some)
    }
}

/// Whether a vote on an institution is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteType {
    Active,
    Closed,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Active => "ACTIVE",
            VoteType::Closed => "CLOSED",
        }
    }
}

/// Outcome of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteResult {
    Unknown,
    Accepted,
    Rejected,
}

impl VoteResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteResult::Unknown => "UNKNOWN",
            VoteResult::Accepted => "ACCEPTED",
            VoteResult::Rejected => "REJECTED",
        }
    }
}

/// A single elector's ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Vote {
    pub elector_public_key: PublicKey,
    pub accept: bool,
    pub timestamp: i64,
}

/// The voting state published when an institution registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Voting {
    pub publisher_public_key: PublicKey,
    pub elector_public_key: PublicKey,
    pub vote_type: VoteType,
    #[serde(rename = "vote")]
    pub votes: Vec<Vote>,
    pub vote_result: VoteResult,
    pub close_vote_timestamp: i64,
    pub timestamp: i64,
    pub transaction_id: TransactionId,
}

/// Chain-level configuration held at the environment singleton address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Environment {
    pub id: String,
    pub data: String,
    pub timestamp: i64,
    pub transaction_id: TransactionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&ActorStatus::Waiting).unwrap(),
            "\"WAITING\""
        );
        assert_eq!(
            serde_json::to_string(&RecordStatus::Reactivated).unwrap(),
            "\"REACTIVATED\""
        );
        assert_eq!(
            serde_json::to_string(&PortfolioType::EduProgram).unwrap(),
            "\"EDU_PROGRAM\""
        );
    }

    #[test]
    fn latest_profile_is_last_entry() {
        let actor = Actor {
            actor_public_key: "02aa".into(),
            manager_public_key: "02bb".into(),
            id: "a1".into(),
            role: ActorRole::Institution,
            profile: vec![
                ProfileEntry {
                    data: String::new(),
                    status: ActorStatus::Waiting,
                    timestamp: 1,
                    transaction_id: "t1".into(),
                },
                ProfileEntry {
                    data: String::new(),
                    status: ActorStatus::Active,
                    timestamp: 2,
                    transaction_id: "t2".into(),
                },
            ],
            timestamp: 1,
            transaction_id: "t1".into(),
        };
        assert_eq!(actor.latest_profile().unwrap().status, ActorStatus::Active);
    }

    #[test]
    fn edu_program_parses_camel_case_payload() {
        let entry = PortfolioEntry {
            portfolio_type: PortfolioType::EduProgram,
            data: r#"{"name":"CS","totalCredit":120,"minYear":3,"maxYear":6}"#.into(),
            timestamp: 0,
            transaction_id: "t1".into(),
        };
        let program = entry.edu_program().unwrap().unwrap();
        assert_eq!(program.name, "CS");
        assert_eq!(program.total_credit, 120);
        assert_eq!(program.min_year, 3);
        assert_eq!(program.max_year, 6);
    }

    #[test]
    fn edu_program_of_other_type_is_none() {
        let entry = PortfolioEntry {
            portfolio_type: PortfolioType::Other,
            data: "free-form".into(),
            timestamp: 0,
            transaction_id: "t1".into(),
        };
        assert!(entry.edu_program().unwrap().is_none());
    }
}
