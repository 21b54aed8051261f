//! Maps subscribed logs onto invalidation signals.

use num_bigint::BigUint;
use thiserror::Error;

use crate::{
    abi::keccak256,
    invalidation::InvalidationSignal,
    types::{Address, LogEntry},
    utils::{parse_hex_array, parse_hex_bytes},
};

pub const TRANSFER_SIGNATURE: &str = "Transfer(address,address,uint256)";
pub const TRANSFER_SINGLE_SIGNATURE: &str =
    "TransferSingle(address,address,address,uint256,uint256)";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log has no topics")]
    NoTopics,

    #[error("malformed topic {0}")]
    BadTopic(String),

    #[error("{event} log has {actual} topics, expected {expected}")]
    TopicCount { event: &'static str, expected: usize, actual: usize },

    #[error("malformed log address {0}")]
    BadAddress(String),
}

/// What a log turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogKind {
    Created { id: Option<BigUint> },
    Transfer { from: Address, to: Address },
    Unknown,
}

/// Classifies logs from the `[[created, Transfer, TransferSingle]]` topic filter.
#[derive(Debug, Clone)]
pub struct LogDecoder {
    factory: Address,
    created_topic: [u8; 32],
    transfer_topic: [u8; 32],
    transfer_single_topic: [u8; 32],
}

impl LogDecoder {
    #[must_use]
    pub fn new(factory: Address, created_topic: [u8; 32]) -> Self {
        Self {
            factory,
            created_topic,
            transfer_topic: keccak256(TRANSFER_SIGNATURE.as_bytes()),
            transfer_single_topic: keccak256(TRANSFER_SINGLE_SIGNATURE.as_bytes()),
        }
    }

    /// Topic-0 alternatives for the `eth_subscribe` filter.
    #[must_use]
    pub fn topic_filter(&self) -> Vec<[u8; 32]> {
        vec![self.created_topic, self.transfer_topic, self.transfer_single_topic]
    }

    pub fn classify(&self, log: &LogEntry) -> Result<LogKind, DecodeError> {
        let topics = log
            .topics
            .iter()
            .map(|t| parse_hex_array::<32>(t).ok_or_else(|| DecodeError::BadTopic(t.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(topic0) = topics.first() else {
            return Err(DecodeError::NoTopics);
        };

        if *topic0 == self.created_topic {
            let address: Address =
                log.address.parse().map_err(|_| DecodeError::BadAddress(log.address.clone()))?;
            if address != self.factory {
                return Ok(LogKind::Unknown);
            }
            return Ok(LogKind::Created { id: created_id(&topics, &log.data) });
        }

        if *topic0 == self.transfer_topic {
            if topics.len() < 3 {
                return Err(DecodeError::TopicCount {
                    event: "Transfer",
                    expected: 3,
                    actual: topics.len(),
                });
            }
            return Ok(LogKind::Transfer {
                from: topic_address(&topics[1])?,
                to: topic_address(&topics[2])?,
            });
        }

        if *topic0 == self.transfer_single_topic {
            if topics.len() != 4 {
                return Err(DecodeError::TopicCount {
                    event: "TransferSingle",
                    expected: 4,
                    actual: topics.len(),
                });
            }
            return Ok(LogKind::Transfer {
                from: topic_address(&topics[2])?,
                to: topic_address(&topics[3])?,
            });
        }

        Ok(LogKind::Unknown)
    }

    /// Signals for one log, given the viewer bound at the time it arrived.
    pub fn decode(
        &self,
        log: &LogEntry,
        viewer: Option<Address>,
    ) -> Result<Vec<InvalidationSignal>, DecodeError> {
        let signals = match self.classify(log)? {
            LogKind::Created { id } => {
                let mut signals = vec![InvalidationSignal::Collection];
                if let Some(id) = id {
                    signals.push(InvalidationSignal::Entity { id: id.to_string() });
                }
                signals
            }
            LogKind::Transfer { from, to } => match viewer {
                Some(address) if address == from || address == to => {
                    vec![InvalidationSignal::Holder { address }, InvalidationSignal::Collection]
                }
                _ => vec![InvalidationSignal::Collection],
            },
            LogKind::Unknown => Vec::new(),
        };
        Ok(signals)
    }
}

fn topic_address(topic: &[u8; 32]) -> Result<Address, DecodeError> {
    Address::from_word(topic).map_err(|_| DecodeError::BadTopic(crate::utils::format_hex(topic)))
}

/// Indexed id in topic 1, else the first data word.
fn created_id(topics: &[[u8; 32]], data: &str) -> Option<BigUint> {
    if let Some(topic) = topics.get(1) {
        return Some(BigUint::from_bytes_be(topic));
    }
    let data = parse_hex_bytes(data)?;
    data.get(..32).map(BigUint::from_bytes_be)
}
