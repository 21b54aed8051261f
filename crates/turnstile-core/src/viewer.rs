//! The identity whose holdings the observers watch.
//!
//! Both observers read the slot at the moment they need it (every tick, every message),
//! so binding or clearing a viewer takes effect without restarting anything.

use arc_swap::ArcSwapOption;
use std::sync::Arc;

use crate::types::Address;

#[derive(Debug, Default)]
pub struct ViewerIdentity {
    current: ArcSwapOption<Address>,
}

impl ViewerIdentity {
    #[must_use]
    pub fn new(initial: Option<Address>) -> Self {
        Self { current: ArcSwapOption::from(initial.map(Arc::new)) }
    }

    pub fn bind(&self, address: Address) {
        tracing::info!(viewer = %address, "viewer bound");
        self.current.store(Some(Arc::new(address)));
    }

    pub fn clear(&self) {
        if self.current.swap(None).is_some() {
            tracing::info!("viewer cleared");
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<Address> {
        self.current.load().as_deref().copied()
    }
}
