use num_bigint::BigUint;

/// What a block height reading means relative to the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockChange {
    /// First successful reading of this process.
    Baseline,
    Unchanged,
    /// Height differs from the last reading, in either direction.
    Changed { previous: u64 },
}

/// What an entity counter reading means relative to the watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterChange {
    Baseline,
    Unchanged,
    Increased { previous: BigUint },
    /// Lower than the watermark (reorg or a lagging backend). The watermark is kept.
    Decreased,
}

/// Last observed block height and entity counter. In memory only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watermark {
    block: Option<u64>,
    counter: Option<BigUint>,
}

impl Watermark {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from known values instead of re-baselining.
    #[must_use]
    pub fn preset(block: Option<u64>, counter: Option<BigUint>) -> Self {
        Self { block, counter }
    }

    #[must_use]
    pub fn block(&self) -> Option<u64> {
        self.block
    }

    #[must_use]
    pub fn counter(&self) -> Option<&BigUint> {
        self.counter.as_ref()
    }

    pub fn observe_block(&mut self, height: u64) -> BlockChange {
        match self.block.replace(height) {
            None => BlockChange::Baseline,
            Some(previous) if previous == height => BlockChange::Unchanged,
            Some(previous) => BlockChange::Changed { previous },
        }
    }

    pub fn observe_counter(&mut self, value: BigUint) -> CounterChange {
        match &self.counter {
            None => {
                self.counter = Some(value);
                CounterChange::Baseline
            }
            Some(current) if value == *current => CounterChange::Unchanged,
            Some(current) if value < *current => CounterChange::Decreased,
            Some(_) => {
                let previous = self.counter.replace(value).unwrap_or_default();
                CounterChange::Increased { previous }
            }
        }
    }
}
