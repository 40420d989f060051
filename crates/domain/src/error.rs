//! Decoder error types.

use addressing::{Address, AddressSpace};
use thiserror::Error;

/// Errors raised while decoding a state payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload does not match the schema implied by the address space.
    /// This only happens on data corruption and always aborts the batch.
    #[error("payload at {address} does not match the {space} schema: {source}")]
    Malformed {
        address: Address,
        space: AddressSpace,
        #[source]
        source: serde_json::Error,
    },

    /// The address classifies to a space this projector does not decode.
    #[error("no decoder for address space {0}")]
    Unsupported(AddressSpace),

    /// The address is outside the family namespace.
    #[error("address {0} is outside the family namespace")]
    ForeignNamespace(Address),
}

/// Result type for decoding operations.
pub type Result<T> = std::result::Result<T, DecodeError>;
