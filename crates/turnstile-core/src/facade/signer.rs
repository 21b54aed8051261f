use async_trait::async_trait;

use crate::types::{Address, TransactionRequest};

/// What a signer hands back for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedPayload {
    /// Fully signed RLP bytes, submitted with `eth_sendRawTransaction`.
    Raw(Vec<u8>),
    /// Unsigned request for an account the node manages, submitted with
    /// `eth_sendTransaction`.
    NodeManaged(TransactionRequest),
}

/// Signing context for writes.
///
/// Raw signers own nonce, fee and chain-id selection; the facade only supplies the call
/// fields and the simulated gas estimate.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    async fn sign(&self, request: TransactionRequest) -> Result<SignedPayload, String>;
}

/// Signer for an account unlocked on the backend node (development chains).
#[derive(Debug, Clone, Copy)]
pub struct NodeAccountSigner {
    address: Address,
}

impl NodeAccountSigner {
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

#[async_trait]
impl Signer for NodeAccountSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, request: TransactionRequest) -> Result<SignedPayload, String> {
        Ok(SignedPayload::NodeManaged(request))
    }
}
