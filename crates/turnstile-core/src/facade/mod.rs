//! Single entry point for ledger reads and writes.
//!
//! # Selection
//!
//! Every call walks the backends offering the needed capability in preference order,
//! healthy ones first, skipping those the health monitor marked unreachable. When every
//! candidate is unreachable the walk falls back to all capable backends (fail-open).
//!
//! ```text
//! call ──► backend #1 ── transport failure ──► backend #2 ── ... ──► Unreachable
//!               │                                   │
//!               ├── revert ──────────────► Reverted / Rejected (no further backend)
//!               └── invalid params ──────► InvalidArgs
//! ```
//!
//! Node-managed submissions (`eth_sendTransaction`) only move on when the first backend
//! refused the connection, since a node that did accept one would assign its own nonce.
//!
//! The facade never touches the cache; callers hand the returned hash to the
//! reconciliation loop's pending set.

pub mod errors;
pub mod signer;

use num_bigint::BigUint;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

pub use errors::ChainError;
pub use signer::{NodeAccountSigner, SignedPayload, Signer};

use crate::{
    abi::{decode_revert_reason, AbiValue, FunctionSpec},
    backend::{AccessBackend, BackendError, BackendSet, HealthStatus, HealthTable},
    config::{Capability, ConfirmationConfig},
    registry::{ContractEntry, ContractRegistry},
    types::{Address, Receipt, TransactionRequest, TxHash},
    utils::{format_hex, parse_hex_bytes, parse_hex_u64, parse_quantity},
};

/// Outcome of a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Simulation {
    pub return_data: Vec<u8>,
    pub return_values: Vec<AbiValue>,
    pub gas_estimate: BigUint,
}

pub struct ChainFacade {
    backends: Arc<BackendSet>,
    health: Arc<HealthTable>,
    registry: Arc<ContractRegistry>,
    confirmation: ConfirmationConfig,
}

impl ChainFacade {
    #[must_use]
    pub fn new(
        backends: Arc<BackendSet>,
        health: Arc<HealthTable>,
        registry: Arc<ContractRegistry>,
        confirmation: ConfirmationConfig,
    ) -> Self {
        Self { backends, health, registry, confirmation }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ContractRegistry> {
        &self.registry
    }

    /// Calls a view function at `latest`.
    pub async fn read(
        &self,
        contract: &str,
        function: &str,
        args: &[AbiValue],
    ) -> Result<Vec<AbiValue>, ChainError> {
        let (entry, spec) = self.resolve(contract, function, Capability::Read)?;
        let data = spec.encode_call(args)?;

        let call = json!({ "to": entry.address.to_string(), "data": format_hex(&data) });
        let output = self.execute(Capability::Read, "eth_call", json!([call, "latest"]), parse_data).await?;

        spec.decode_output(&output).map_err(|e| ChainError::Decode(e.to_string()))
    }

    /// Dry-runs a call from `from`: `eth_call` for the result, `eth_estimateGas` for cost.
    /// Never submits anything.
    pub async fn simulate(
        &self,
        contract: &str,
        function: &str,
        args: &[AbiValue],
        from: Address,
    ) -> Result<Simulation, ChainError> {
        let (entry, spec) = self.resolve(contract, function, Capability::Read)?;
        let request = TransactionRequest {
            from,
            to: entry.address,
            data: spec.encode_call(args)?,
            value: BigUint::default(),
            gas: None,
        };
        self.simulate_request(spec, &request).await
    }

    async fn simulate_request(
        &self,
        spec: &FunctionSpec,
        request: &TransactionRequest,
    ) -> Result<Simulation, ChainError> {
        let call = request.to_json();

        let return_data =
            self.execute(Capability::Read, "eth_call", json!([call, "latest"]), parse_data).await?;

        let gas_estimate = self
            .execute(Capability::Read, "eth_estimateGas", json!([call]), |value| {
                value
                    .as_str()
                    .and_then(parse_quantity)
                    .ok_or_else(|| BackendError::InvalidResponse(format!("bad gas estimate: {value}")))
            })
            .await?;

        let return_values =
            spec.decode_output(&return_data).map_err(|e| ChainError::Decode(e.to_string()))?;

        Ok(Simulation { return_data, return_values, gas_estimate })
    }

    /// Simulates, signs and submits a state-changing call.
    ///
    /// A simulated revert is returned as [`ChainError::Rejected`] with the decoded reason
    /// and nothing is submitted.
    pub async fn write(
        &self,
        contract: &str,
        function: &str,
        args: &[AbiValue],
        signer: Option<&dyn Signer>,
    ) -> Result<TxHash, ChainError> {
        let (entry, spec) = self.resolve(contract, function, Capability::Write)?;
        let data = spec.encode_call(args)?;
        let signer = signer.ok_or(ChainError::SignerUnavailable)?;

        let mut request = TransactionRequest {
            from: signer.address(),
            to: entry.address,
            data,
            value: BigUint::default(),
            gas: None,
        };

        let simulation =
            self.simulate_request(spec, &request).await.map_err(ChainError::into_rejection)?;
        request.gas = Some(simulation.gas_estimate);

        // A raw transaction resubmits under the same hash. A node-managed one gets a new
        // nonce on every node, so it only moves on when the first node was never reached.
        let (method, params, resubmit): (_, _, fn(&BackendError) -> bool) =
            match signer.sign(request).await.map_err(ChainError::Signing)? {
                SignedPayload::Raw(bytes) => {
                    ("eth_sendRawTransaction", json!([format_hex(&bytes)]), |_| true)
                }
                SignedPayload::NodeManaged(request) => (
                    "eth_sendTransaction",
                    json!([request.to_json()]),
                    |e| matches!(e, BackendError::ConnectionFailed(_)),
                ),
            };

        let hash = self
            .execute_with(Capability::Write, method, params, resubmit, |value| {
                value
                    .as_str()
                    .and_then(|s| s.parse::<TxHash>().ok())
                    .ok_or_else(|| BackendError::InvalidResponse(format!("bad transaction hash: {value}")))
            })
            .await
            .map_err(ChainError::into_rejection)?;

        debug!(contract = contract, function = function, hash = %hash, "transaction submitted");
        Ok(hash)
    }

    /// Single non-blocking receipt lookup. `None` while the transaction is unmined.
    pub async fn receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, ChainError> {
        self.execute(
            Capability::Read,
            "eth_getTransactionReceipt",
            json!([hash.to_string()]),
            |value| {
                if value.is_null() {
                    return Ok(None);
                }
                Receipt::from_json(&value)
                    .map(Some)
                    .map_err(|e| BackendError::InvalidResponse(format!("bad receipt: {e}")))
            },
        )
        .await
    }

    /// Polls for the receipt until it appears or the configured timeout elapses.
    ///
    /// A mined but failed transaction is reported as [`ChainError::Reverted`].
    pub async fn wait_for_confirmation(&self, hash: &TxHash) -> Result<Receipt, ChainError> {
        let timeout = Duration::from_secs(self.confirmation.timeout_seconds);
        let poll_interval = Duration::from_millis(self.confirmation.poll_interval_ms);
        let started = tokio::time::Instant::now();

        loop {
            match self.receipt(hash).await {
                Ok(Some(receipt)) if receipt.status => return Ok(receipt),
                Ok(Some(receipt)) => {
                    return Err(ChainError::Reverted {
                        reason: format!("transaction reverted in block {}", receipt.block_number),
                        data: None,
                    })
                }
                Ok(None) => {}
                Err(ChainError::Unreachable { last_error, .. }) => {
                    debug!(hash = %hash, error = %last_error, "receipt lookup failed, will retry");
                }
                Err(e) => return Err(e),
            }

            let waited = started.elapsed();
            if waited + poll_interval > timeout {
                return Err(ChainError::Timeout { hash: *hash, waited });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn block_number(&self) -> Result<u64, ChainError> {
        self.execute(Capability::Read, "eth_blockNumber", json!([]), |value| {
            value
                .as_str()
                .and_then(parse_hex_u64)
                .ok_or_else(|| BackendError::InvalidResponse(format!("bad block number: {value}")))
        })
        .await
    }

    /// Reads a `uint` counter and returns it as a `BigUint`.
    pub async fn read_counter(&self, contract: &str, function: &str) -> Result<BigUint, ChainError> {
        let values = self.read(contract, function, &[]).await?;
        match values.into_iter().next() {
            Some(AbiValue::Uint(value)) => Ok(value),
            other => Err(ChainError::Decode(format!("{contract}.{function} returned {other:?}"))),
        }
    }

    fn resolve(
        &self,
        contract: &str,
        function: &str,
        capability: Capability,
    ) -> Result<(&ContractEntry, &FunctionSpec), ChainError> {
        let (entry, spec) = self.registry.function(contract, function)?;
        if !entry.allows(capability) {
            return Err(ChainError::InvalidArgs(format!(
                "contract {contract} does not allow {capability:?} calls"
            )));
        }
        Ok((entry, spec))
    }

    /// Backends eligible for `capability`, best first.
    fn eligible(&self, capability: Capability) -> Vec<Arc<AccessBackend>> {
        let mut ranked: Vec<(HealthStatus, Arc<AccessBackend>)> = self
            .backends
            .with_capability(capability)
            .map(|b| (self.health.status(b.name()), Arc::clone(b)))
            .collect();

        if ranked.iter().all(|(status, _)| *status == HealthStatus::Unreachable) {
            if !ranked.is_empty() {
                warn!(capability = ?capability, "all backends unreachable, attempting anyway");
            }
            return ranked.into_iter().map(|(_, b)| b).collect();
        }

        ranked.retain(|(status, _)| *status != HealthStatus::Unreachable);
        // stable: preference order is kept within a status class
        ranked.sort_by_key(|(status, _)| status.rank());
        ranked.into_iter().map(|(_, b)| b).collect()
    }

    /// Runs one call with failover.
    ///
    /// `parse` failures are treated like malformed responses and move on to the next
    /// backend.
    async fn execute<T>(
        &self,
        capability: Capability,
        method: &str,
        params: Value,
        parse: impl Fn(Value) -> Result<T, BackendError>,
    ) -> Result<T, ChainError> {
        self.execute_with(capability, method, params, |_| true, parse).await
    }

    /// Like [`execute`](Self::execute), but a transport failure only moves on to the next
    /// backend when `fail_over` accepts it.
    async fn execute_with<T>(
        &self,
        capability: Capability,
        method: &str,
        params: Value,
        fail_over: impl Fn(&BackendError) -> bool,
        parse: impl Fn(Value) -> Result<T, BackendError>,
    ) -> Result<T, ChainError> {
        let candidates = self.eligible(capability);
        let mut attempts = 0;
        let mut last_error = format!("no backend offers {capability:?}");

        for backend in candidates {
            attempts += 1;
            let result = backend.request(method, params.clone()).await.and_then(&parse);

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_execution_error() => return Err(revert_error(&e)),
                Err(e) if e.is_invalid_params() => {
                    return Err(ChainError::InvalidArgs(e.to_string()));
                }
                Err(e) if !fail_over(&e) => {
                    warn!(
                        backend = %backend.name(),
                        method = method,
                        error = %e,
                        "backend call failed, not safe to repeat elsewhere"
                    );
                    return Err(ChainError::Unreachable {
                        attempts,
                        last_error: format!("{}: {e}", backend.name()),
                    });
                }
                Err(e) => {
                    warn!(
                        backend = %backend.name(),
                        method = method,
                        error = %e,
                        "backend call failed, trying next backend"
                    );
                    last_error = format!("{}: {e}", backend.name());
                }
            }
        }

        Err(ChainError::Unreachable { attempts, last_error })
    }
}

fn parse_data(value: Value) -> Result<Vec<u8>, BackendError> {
    value
        .as_str()
        .and_then(parse_hex_bytes)
        .ok_or_else(|| BackendError::InvalidResponse(format!("bad call data: {value}")))
}

fn revert_error(error: &BackendError) -> ChainError {
    let data = error.revert_data().and_then(parse_hex_bytes).filter(|d| !d.is_empty());
    let reason = data.as_deref().and_then(decode_revert_reason).unwrap_or_else(|| match error {
        BackendError::RpcError(_, message, _) => message
            .strip_prefix("execution reverted: ")
            .unwrap_or(message)
            .to_string(),
        other => other.to_string(),
    });
    ChainError::Reverted { reason, data }
}

impl std::fmt::Debug for ChainFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainFacade")
            .field("backends", &self.backends.len())
            .field("contracts", &self.registry.len())
            .finish_non_exhaustive()
    }
}
