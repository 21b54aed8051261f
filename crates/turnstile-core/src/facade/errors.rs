use std::time::Duration;
use thiserror::Error;

use crate::{abi::AbiError, registry::RegistryError, types::TxHash};

/// Errors surfaced by the [`ChainFacade`](super::ChainFacade).
///
/// `Unreachable` is the only variant produced after failover; every other variant is a
/// deterministic answer and is returned without contacting further backends.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Every eligible backend failed at the transport level.
    #[error("no ledger backend reachable after {attempts} attempt(s): {last_error}")]
    Unreachable { attempts: usize, last_error: String },

    /// The ledger executed the call and it reverted.
    #[error("execution reverted: {reason}")]
    Reverted { reason: String, data: Option<Vec<u8>> },

    /// A write was refused before or at submission.
    #[error("transaction rejected: {reason}")]
    Rejected { reason: String },

    /// The call could not be built from the given contract, function or arguments.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("no signer available")]
    SignerUnavailable,

    #[error("signer failed: {0}")]
    Signing(String),

    #[error("transaction {hash} not confirmed after {waited:?}")]
    Timeout { hash: TxHash, waited: Duration },

    /// The ledger answered but the payload did not match the declared outputs.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ChainError {
    /// Turns a simulated revert into the refusal a write reports.
    #[must_use]
    pub fn into_rejection(self) -> Self {
        match self {
            Self::Reverted { reason, .. } => Self::Rejected { reason },
            other => other,
        }
    }
}

impl From<RegistryError> for ChainError {
    fn from(e: RegistryError) -> Self {
        Self::InvalidArgs(e.to_string())
    }
}

impl From<AbiError> for ChainError {
    fn from(e: AbiError) -> Self {
        Self::InvalidArgs(e.to_string())
    }
}
