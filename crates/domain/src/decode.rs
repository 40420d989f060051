//! Payload decoding dispatched on address classification.

use addressing::{Address, AddressSpace};
use serde::Deserialize;

use crate::error::{DecodeError, Result};
use crate::records::{Actor, Class, Environment, Portfolio, Record, Voting};

// One state key holds a container with a repeated group, so a single payload
// can decode into several logical records.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActorContainer {
    actors: Vec<Actor>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VotingContainer {
    votings: Vec<Voting>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PortfolioContainer {
    portfolios: Vec<Portfolio>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassContainer {
    classes: Vec<Class>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordContainer {
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnvironmentContainer {
    environments: Vec<Environment>,
}

/// Decoded records from one state change, tagged by address space.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEntry {
    Actors(Vec<Actor>),
    Votings(Vec<Voting>),
    Portfolios(Vec<Portfolio>),
    Classes(Vec<Class>),
    Records(Vec<Record>),
    Environment(Vec<Environment>),
}

impl StateEntry {
    /// The address space this entry was decoded from.
    pub fn space(&self) -> AddressSpace {
        match self {
            StateEntry::Actors(_) => AddressSpace::Actor,
            StateEntry::Votings(_) => AddressSpace::Voting,
            StateEntry::Portfolios(_) => AddressSpace::Portfolio,
            StateEntry::Classes(_) => AddressSpace::Class,
            StateEntry::Records(_) => AddressSpace::Record,
            StateEntry::Environment(_) => AddressSpace::Environment,
        }
    }

    /// Number of logical records in the entry.
    pub fn len(&self) -> usize {
        match self {
            StateEntry::Actors(v) => v.len(),
            StateEntry::Votings(v) => v.len(),
            StateEntry::Portfolios(v) => v.len(),
            StateEntry::Classes(v) => v.len(),
            StateEntry::Records(v) => v.len(),
            StateEntry::Environment(v) => v.len(),
        }
    }

    /// True if the entry holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse<'a, T: Deserialize<'a>>(
    address: &Address,
    space: AddressSpace,
    bytes: &'a [u8],
) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| DecodeError::Malformed {
        address: address.clone(),
        space,
        source,
    })
}

/// Decodes a raw state payload according to its address classification.
///
/// A payload that does not match the schema for its address space is a hard
/// failure, never a silent empty result. [`AddressSpace::Job`] state is not
/// projected and surfaces as [`DecodeError::Unsupported`] so callers can skip
/// it deliberately.
pub fn decode(address: &Address, bytes: &[u8]) -> Result<StateEntry> {
    let space = address.space();
    match space {
        AddressSpace::Actor => {
            let container: ActorContainer = parse(address, space, bytes)?;
            Ok(StateEntry::Actors(container.actors))
        }
        AddressSpace::Voting => {
            let container: VotingContainer = parse(address, space, bytes)?;
            Ok(StateEntry::Votings(container.votings))
        }
        AddressSpace::Portfolio => {
            let container: PortfolioContainer = parse(address, space, bytes)?;
            Ok(StateEntry::Portfolios(container.portfolios))
        }
        AddressSpace::Class => {
            let container: ClassContainer = parse(address, space, bytes)?;
            Ok(StateEntry::Classes(container.classes))
        }
        AddressSpace::Record => {
            let container: RecordContainer = parse(address, space, bytes)?;
            Ok(StateEntry::Records(container.records))
        }
        AddressSpace::Environment => {
            let container: EnvironmentContainer = parse(address, space, bytes)?;
            Ok(StateEntry::Environment(container.environments))
        }
        AddressSpace::Job => Err(DecodeError::Unsupported(space)),
        AddressSpace::OtherFamily => Err(DecodeError::ForeignNamespace(address.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use addressing::{actor_address, job_address, record_address};
    use common::PublicKey;
    use serde_json::json;

    fn key(name: &str) -> PublicKey {
        PublicKey::new(name)
    }

    fn actor_json(id: &str, status: &str) -> serde_json::Value {
        json!({
            "actor_public_key": "02aa",
            "manager_public_key": "02bb",
            "id": id,
            "role": "INSTITUTION",
            "profile": [
                {"data": "", "status": status, "timestamp": 10, "transaction_id": "t1"}
            ],
            "timestamp": 10,
            "transaction_id": "t1"
        })
    }

    #[test]
    fn decodes_repeated_group_into_one_record_each() {
        let addr = actor_address(&key("02aa"));
        let payload =
            serde_json::to_vec(&json!({"actors": [actor_json("a1", "ACTIVE"), actor_json("a2", "WAITING")]}))
                .unwrap();

        let entry = decode(&addr, &payload).unwrap();
        assert_eq!(entry.space(), AddressSpace::Actor);
        assert_eq!(entry.len(), 2);
        let StateEntry::Actors(actors) = entry else {
            panic!("expected actors");
        };
        assert_eq!(actors[0].id, "a1");
        assert_eq!(actors[1].latest_profile().unwrap().status.as_str(), "WAITING");
    }

    #[test]
    fn wrong_schema_is_a_hard_failure() {
        // A record payload under an actor address must not decode silently.
        let addr = actor_address(&key("02aa"));
        let payload = serde_json::to_vec(&json!({"records": []})).unwrap();

        let err = decode(&addr, &payload).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Malformed {
                space: AddressSpace::Actor,
                ..
            }
        ));
    }

    #[test]
    fn garbage_bytes_are_a_hard_failure() {
        let addr = actor_address(&key("02aa"));
        let err = decode(&addr, b"\x00\x01\x02").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn job_space_is_unsupported() {
        let addr = job_address("j1", &key("02aa"), &key("02bb"));
        let err = decode(&addr, b"{}").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Unsupported(AddressSpace::Job)
        ));
    }

    #[test]
    fn foreign_namespace_is_rejected() {
        let addr = Address::new("f".repeat(70));
        if addr.in_namespace() {
            return;
        }
        let err = decode(&addr, b"{}").unwrap_err();
        assert!(matches!(err, DecodeError::ForeignNamespace(_)));
    }

    #[test]
    fn decodes_record_container() {
        let addr = record_address("r1", &key("02aa"), &key("02bb"));
        let payload = serde_json::to_vec(&json!({
            "records": [{
                "owner_public_key": "02aa",
                "issuer_public_key": "02cc",
                "manager_public_key": "02bb",
                "record_id": "r1",
                "record_type": "CERTIFICATE",
                "versions": [
                    {"portfolio_id": "p1", "data": "enc", "record_status": "CREATED",
                     "timestamp": 10, "transaction_id": "t1"},
                    {"portfolio_id": "p1", "data": "enc", "record_status": "REVOKED",
                     "timestamp": 20, "transaction_id": "t2"}
                ]
            }]
        }))
        .unwrap();

        let entry = decode(&addr, &payload).unwrap();
        let StateEntry::Records(records) = entry else {
            panic!("expected records");
        };
        assert_eq!(records.len(), 1);
        let latest = records[0].latest_version().unwrap();
        assert_eq!(latest.record_status.as_str(), "REVOKED");
        assert_eq!(latest.transaction_id.as_str(), "t2");
    }

    #[test]
    fn empty_container_decodes_to_empty_entry() {
        let addr = actor_address(&key("02aa"));
        let payload = serde_json::to_vec(&json!({"actors": []})).unwrap();
        let entry = decode(&addr, &payload).unwrap();
        assert!(entry.is_empty());
    }
}
