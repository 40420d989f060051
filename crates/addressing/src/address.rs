use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use common::PublicKey;

/// Transaction family name; the namespace is derived from it.
pub const FAMILY_NAME: &str = "credchain";

/// Total length of every address in the family, in hex characters.
pub const ADDRESS_LENGTH: usize = 70;

const ACTOR_PREFIX: &str = "000";
const VOTING_PREFIX: &str = "001";
const PORTFOLIO_PREFIX: &str = "010";
const CLASS_PREFIX: &str = "011";
const RECORD_PREFIX: &str = "100";
const JOB_PREFIX: &str = "101";

/// Character range of the owner correlation segment in a RECORD address.
const OWNER_SEGMENT: std::ops::Range<usize> = 9..19;

/// Character range of the manager correlation segment in a RECORD address.
const MANAGER_SEGMENT: std::ops::Range<usize> = 19..29;

static NAMESPACE: LazyLock<String> = LazyLock::new(|| sha512_hex(FAMILY_NAME)[..6].to_string());

static ENVIRONMENT_ADDRESS: LazyLock<String> =
    LazyLock::new(|| format!("{}{}", namespace(), "0".repeat(64)));

/// The 6-character namespace prefix shared by every address in the family.
pub fn namespace() -> &'static str {
    &NAMESPACE
}

fn sha512_hex(input: &str) -> String {
    let digest = Sha512::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Truncated digest of a participant key, taken from the tail of the hash.
fn tail_segment(key: &PublicKey, len: usize) -> String {
    let digest = sha512_hex(key.as_str());
    digest[digest.len() - len..].to_string()
}

/// The 10-character owner correlation segment for a participant key.
pub fn owner_segment(key: &PublicKey) -> String {
    tail_segment(key, 10)
}

/// The 10-character manager correlation segment for a participant key.
pub fn manager_segment(key: &PublicKey) -> String {
    tail_segment(key, 10)
}

/// The entity-type classification of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSpace {
    Actor,
    Voting,
    Portfolio,
    Class,
    Record,
    Job,
    Environment,
    /// An address outside this family's namespace, including malformed input.
    OtherFamily,
}

impl std::fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AddressSpace::Actor => "ACTOR",
            AddressSpace::Voting => "VOTING",
            AddressSpace::Portfolio => "PORTFOLIO",
            AddressSpace::Class => "CLASS",
            AddressSpace::Record => "RECORD",
            AddressSpace::Job => "JOB",
            AddressSpace::Environment => "ENVIRONMENT",
            AddressSpace::OtherFamily => "OTHER_FAMILY",
        };
        write!(f, "{name}")
    }
}

/// A ledger state address.
///
/// Addresses arrive from the feed as opaque hex strings; construction does
/// not validate, classification does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps a raw hex string from the wire.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the hex string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this address starts with the family namespace.
    pub fn in_namespace(&self) -> bool {
        self.0.get(..6) == Some(namespace())
    }

    /// Classifies this address into its [`AddressSpace`].
    ///
    /// Total over arbitrary input: wrong length, foreign namespace, or an
    /// unknown type prefix all yield [`AddressSpace::OtherFamily`].
    pub fn space(&self) -> AddressSpace {
        if self.0.len() != ADDRESS_LENGTH || !self.in_namespace() {
            return AddressSpace::OtherFamily;
        }
        if self.0 == *ENVIRONMENT_ADDRESS {
            return AddressSpace::Environment;
        }
        match self.0.get(6..9) {
            Some(ACTOR_PREFIX) => AddressSpace::Actor,
            Some(VOTING_PREFIX) => AddressSpace::Voting,
            Some(PORTFOLIO_PREFIX) => AddressSpace::Portfolio,
            Some(CLASS_PREFIX) => AddressSpace::Class,
            Some(RECORD_PREFIX) => AddressSpace::Record,
            Some(JOB_PREFIX) => AddressSpace::Job,
            _ => AddressSpace::OtherFamily,
        }
    }

    /// True iff this is a RECORD address whose owner correlation segment was
    /// derived from `key`.
    ///
    /// Compares only the embedded segment; the identifier hash at the tail of
    /// the address is not recomputed.
    pub fn is_owned_by(&self, key: &PublicKey) -> bool {
        self.space() == AddressSpace::Record
            && self.0.get(OWNER_SEGMENT) == Some(owner_segment(key).as_str())
    }

    /// True iff this is a RECORD address whose manager correlation segment
    /// was derived from `key`.
    pub fn is_managed_by(&self, key: &PublicKey) -> bool {
        self.space() == AddressSpace::Record
            && self.0.get(MANAGER_SEGMENT) == Some(manager_segment(key).as_str())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// The well-known singleton address holding chain-level configuration.
pub fn environment_address() -> Address {
    Address(ENVIRONMENT_ADDRESS.clone())
}

/// Derives the address of an actor's state from their public key.
pub fn actor_address(key: &PublicKey) -> Address {
    Address(format!(
        "{}{}{}",
        namespace(),
        ACTOR_PREFIX,
        &sha512_hex(key.as_str())[..61]
    ))
}

/// Derives the address of the voting state published for an actor.
pub fn voting_address(key: &PublicKey) -> Address {
    Address(format!(
        "{}{}{}",
        namespace(),
        VOTING_PREFIX,
        &sha512_hex(key.as_str())[..61]
    ))
}

/// Derives a class address from its identifier and the institution key.
pub fn class_address(class_id: &str, institution_key: &PublicKey) -> Address {
    Address(format!(
        "{}{}{}{}",
        namespace(),
        CLASS_PREFIX,
        tail_segment(institution_key, 10),
        &sha512_hex(class_id)[..51]
    ))
}

/// Derives a record address from its identifier and the owner/manager keys.
pub fn record_address(record_id: &str, owner_key: &PublicKey, manager_key: &PublicKey) -> Address {
    Address(format!(
        "{}{}{}{}{}",
        namespace(),
        RECORD_PREFIX,
        owner_segment(owner_key),
        manager_segment(manager_key),
        &sha512_hex(record_id)[..41]
    ))
}

/// Derives a portfolio address from its identifier and the owner/manager keys.
pub fn portfolio_address(id: &str, owner_key: &PublicKey, manager_key: &PublicKey) -> Address {
    Address(format!(
        "{}{}{}{}{}",
        namespace(),
        PORTFOLIO_PREFIX,
        tail_segment(owner_key, 10),
        tail_segment(manager_key, 20),
        &sha512_hex(id)[..31]
    ))
}

/// Derives a job address from its identifier and the company/candidate keys.
pub fn job_address(job_id: &str, company_key: &PublicKey, candidate_key: &PublicKey) -> Address {
    Address(format!(
        "{}{}{}{}{}",
        namespace(),
        JOB_PREFIX,
        tail_segment(company_key, 10),
        tail_segment(candidate_key, 20),
        &sha512_hex(job_id)[..31]
    ))
}
