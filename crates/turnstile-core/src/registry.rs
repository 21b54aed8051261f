//! Typed contract registry.
//!
//! Contract addresses and ABI fragments are resolved once from configuration. Callers
//! refer to contracts and functions by logical name; a typo fails at startup rather than
//! on the first ledger call.

use std::collections::HashMap;
use thiserror::Error;

use crate::{
    abi::{AbiError, EventSpec, FunctionSpec},
    config::{Capability, ContractConfig},
    types::{Address, HexParseError},
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown contract: {0}")]
    UnknownContract(String),
    #[error("contract {contract} has no function {function}")]
    UnknownFunction { contract: String, function: String },
    #[error("contract {contract} has no event {event}")]
    UnknownEvent { contract: String, event: String },
    #[error("duplicate contract name: {0}")]
    DuplicateContract(String),
    #[error("invalid address for contract {contract}: {source}")]
    InvalidAddress { contract: String, source: HexParseError },
    #[error("invalid ABI fragment on contract {contract}: {source}")]
    InvalidAbi { contract: String, source: AbiError },
}

/// A resolved contract.
#[derive(Debug, Clone)]
pub struct ContractEntry {
    pub name: String,
    pub address: Address,
    pub functions: HashMap<String, FunctionSpec>,
    pub events: HashMap<String, EventSpec>,
    pub capabilities: Vec<Capability>,
}

impl ContractEntry {
    fn from_config(config: &ContractConfig) -> Result<Self, RegistryError> {
        let address = config.address.parse().map_err(|source| RegistryError::InvalidAddress {
            contract: config.name.clone(),
            source,
        })?;

        let invalid = |source| RegistryError::InvalidAbi { contract: config.name.clone(), source };

        let functions = config
            .functions
            .iter()
            .map(|sig| FunctionSpec::parse(sig).map(|f| (f.name.clone(), f)))
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(invalid)?;

        let events = config
            .events
            .iter()
            .map(|sig| EventSpec::parse(sig).map(|e| (e.name.clone(), e)))
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(invalid)?;

        Ok(Self {
            name: config.name.clone(),
            address,
            functions,
            events,
            capabilities: config.capabilities.clone(),
        })
    }

    pub fn function(&self, name: &str) -> Result<&FunctionSpec, RegistryError> {
        self.functions.get(name).ok_or_else(|| RegistryError::UnknownFunction {
            contract: self.name.clone(),
            function: name.to_string(),
        })
    }

    pub fn event(&self, name: &str) -> Result<&EventSpec, RegistryError> {
        self.events.get(name).ok_or_else(|| RegistryError::UnknownEvent {
            contract: self.name.clone(),
            event: name.to_string(),
        })
    }

    #[must_use]
    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: HashMap<String, ContractEntry>,
}

impl ContractRegistry {
    pub fn from_config(configs: &[ContractConfig]) -> Result<Self, RegistryError> {
        let mut contracts = HashMap::with_capacity(configs.len());
        for config in configs {
            let entry = ContractEntry::from_config(config)?;
            if contracts.insert(entry.name.clone(), entry).is_some() {
                return Err(RegistryError::DuplicateContract(config.name.clone()));
            }
        }
        tracing::debug!(contracts = contracts.len(), "contract registry resolved");
        Ok(Self { contracts })
    }

    pub fn contract(&self, name: &str) -> Result<&ContractEntry, RegistryError> {
        self.contracts.get(name).ok_or_else(|| RegistryError::UnknownContract(name.to_string()))
    }

    /// Resolves `contract.function` in one step.
    pub fn function(
        &self,
        contract: &str,
        function: &str,
    ) -> Result<(&ContractEntry, &FunctionSpec), RegistryError> {
        let entry = self.contract(contract)?;
        Ok((entry, entry.function(function)?))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
