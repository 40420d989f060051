//! Projected rows: one relational row per entity per address.
//!
//! Rows carry denormalized latest-version fields plus `start_block_num`.
//! They are built from decoded [`StateEntry`] values before the store
//! transaction begins, so the apply step is pure writes.

use addressing::Address;
use chrono::{DateTime, Utc};
use common::{PublicKey, TransactionId};
use domain::StateEntry;

use crate::error::Result;

/// Converts a ledger timestamp (unix seconds) to UTC, clamping out-of-range
/// values to the epoch. Upstream timestamps come from committed transactions
/// and are never out of chrono's range in practice.
pub(crate) fn to_datetime(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorRow {
    pub address: Address,
    pub actor_public_key: PublicKey,
    pub manager_public_key: PublicKey,
    pub id: String,
    pub role: String,
    pub status: String,
    pub start_block_num: i64,
    pub timestamp: DateTime<Utc>,
    pub transaction_id: TransactionId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub address: Address,
    pub owner_public_key: PublicKey,
    pub issuer_public_key: PublicKey,
    pub manager_public_key: PublicKey,
    pub record_id: String,
    pub portfolio_id: String,
    pub record_status: String,
    pub record_type: String,
    pub start_block_num: i64,
    pub timestamp: DateTime<Utc>,
    pub transaction_id: TransactionId,
}

/// One row per enrolled student; `(address, student_public_key)` is the key.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassRow {
    pub address: Address,
    pub student_public_key: PublicKey,
    pub class_id: String,
    pub institution_public_key: PublicKey,
    pub subject_id: String,
    pub teacher_public_key: PublicKey,
    pub credit: i32,
    pub start_block_num: i64,
    pub timestamp: DateTime<Utc>,
    pub transaction_id: TransactionId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EduProgramRow {
    pub address: Address,
    pub owner_public_key: PublicKey,
    pub manager_public_key: PublicKey,
    pub id: String,
    pub name: String,
    pub total_credit: i32,
    pub min_year: i16,
    pub max_year: i16,
    pub start_block_num: i64,
    pub timestamp: DateTime<Utc>,
    pub transaction_id: TransactionId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VotingRow {
    pub address: Address,
    pub publisher_public_key: PublicKey,
    pub elector_public_key: PublicKey,
    pub vote_type: String,
    pub vote_result: String,
    pub close_vote_timestamp: DateTime<Utc>,
    pub start_block_num: i64,
    pub timestamp: DateTime<Utc>,
    pub transaction_id: TransactionId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentRow {
    pub address: Address,
    pub id: String,
    pub data: String,
    pub start_block_num: i64,
    pub timestamp: DateTime<Utc>,
    pub transaction_id: TransactionId,
}

/// A projected row, tagged by target table.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedEntity {
    Actor(ActorRow),
    Record(RecordRow),
    Class(ClassRow),
    EduProgram(EduProgramRow),
    Voting(VotingRow),
    Environment(EnvironmentRow),
}

impl ProjectedEntity {
    /// Name of the table this row is written to.
    pub fn table_name(&self) -> &'static str {
        match self {
            ProjectedEntity::Actor(_) => "actors",
            ProjectedEntity::Record(_) => "records",
            ProjectedEntity::Class(_) => "classes",
            ProjectedEntity::EduProgram(_) => "edu_programs",
            ProjectedEntity::Voting(_) => "votings",
            ProjectedEntity::Environment(_) => "environment",
        }
    }
}

/// Flattens a decoded state entry into projected rows, stamping each with
/// `start_block_num`.
///
/// Records with an empty version history have never been committed and
/// produce no rows. Multi-student classes fan out into one row per student.
pub fn rows_for_entry(
    address: &Address,
    entry: StateEntry,
    block_num: i64,
) -> Result<Vec<ProjectedEntity>> {
    let mut rows = Vec::new();
    match entry {
        StateEntry::Actors(actors) => {
            for actor in actors {
                let Some(profile) = actor.latest_profile() else {
                    continue;
                };
                rows.push(ProjectedEntity::Actor(ActorRow {
                    address: address.clone(),
                    actor_public_key: actor.actor_public_key.clone(),
                    manager_public_key: actor.manager_public_key.clone(),
                    id: actor.id.clone(),
                    role: actor.role.as_str().to_string(),
                    status: profile.status.as_str().to_string(),
                    start_block_num: block_num,
                    timestamp: to_datetime(actor.timestamp),
                    transaction_id: actor.transaction_id.clone(),
                }));
            }
        }
        StateEntry::Records(records) => {
            for record in records {
                let Some(version) = record.latest_version() else {
                    continue;
                };
                rows.push(ProjectedEntity::Record(RecordRow {
                    address: address.clone(),
                    owner_public_key: record.owner_public_key.clone(),
                    issuer_public_key: record.issuer_public_key.clone(),
                    manager_public_key: record.manager_public_key.clone(),
                    record_id: record.record_id.clone(),
                    portfolio_id: version.portfolio_id.clone(),
                    record_status: version.record_status.as_str().to_string(),
                    record_type: record.record_type.as_str().to_string(),
                    start_block_num: block_num,
                    timestamp: to_datetime(version.timestamp),
                    transaction_id: version.transaction_id.clone(),
                }));
            }
        }
        StateEntry::Classes(classes) => {
            for class in classes {
                for student in &class.student_public_keys {
                    rows.push(ProjectedEntity::Class(ClassRow {
                        address: address.clone(),
                        student_public_key: student.clone(),
                        class_id: class.class_id.clone(),
                        institution_public_key: class.institution_public_key.clone(),
                        subject_id: class.subject_id.clone(),
                        teacher_public_key: class.teacher_public_key.clone(),
                        credit: class.credit as i32,
                        start_block_num: block_num,
                        timestamp: to_datetime(class.timestamp),
                        transaction_id: class.transaction_id.clone(),
                    }));
                }
            }
        }
        StateEntry::Portfolios(portfolios) => {
            for portfolio in portfolios {
                let Some(entry) = portfolio.latest_entry() else {
                    continue;
                };
                let Some(program) = entry.edu_program()? else {
                    continue;
                };
                rows.push(ProjectedEntity::EduProgram(EduProgramRow {
                    address: address.clone(),
                    owner_public_key: portfolio.owner_public_key.clone(),
                    manager_public_key: portfolio.manager_public_key.clone(),
                    id: portfolio.id.clone(),
                    name: program.name,
                    total_credit: program.total_credit as i32,
                    min_year: program.min_year as i16,
                    max_year: program.max_year as i16,
                    start_block_num: block_num,
                    timestamp: to_datetime(entry.timestamp),
                    transaction_id: entry.transaction_id.clone(),
                }));
            }
        }
        StateEntry::Votings(votings) => {
            for voting in votings {
                rows.push(ProjectedEntity::Voting(VotingRow {
                    address: address.clone(),
                    publisher_public_key: voting.publisher_public_key.clone(),
                    elector_public_key: voting.elector_public_key.clone(),
                    vote_type: voting.vote_type.as_str().to_string(),
                    vote_result: voting.vote_result.as_str().to_string(),
                    close_vote_timestamp: to_datetime(voting.close_vote_timestamp),
                    start_block_num: block_num,
                    timestamp: to_datetime(voting.timestamp),
                    transaction_id: voting.transaction_id.clone(),
                }));
            }
        }
        StateEntry::Environment(environments) => {
            for environment in environments {
                rows.push(ProjectedEntity::Environment(EnvironmentRow {
                    address: address.clone(),
                    id: environment.id.clone(),
                    data: environment.data.clone(),
                    start_block_num: block_num,
                    timestamp: to_datetime(environment.timestamp),
                    transaction_id: environment.transaction_id.clone(),
                }));
            }
        }
    }
    Ok(rows)
}
