//! Per-operation execution context.
//!
//! An [`OperationContext`] bundles what one public operation may touch
//! outside the engines: the price oracle, a journaled view of the asset
//! ledger, the current block clock and the events staged so far. Events
//! only reach the protocol log when the whole operation commits.

use crate::core::asset::AssetId;
use crate::error::Result;
use crate::ledger::asset_ledger::AssetLedger;
use crate::ledger::settlement::{Movement, Settlement};
use crate::oracle::price_feed::{PriceOracle, PriceSnapshot};
use crate::protocol::events::ProtocolEvent;

/// Collaborators and staged effects of a single operation
pub struct OperationContext<'a> {
    oracle: &'a dyn PriceOracle,
    settlement: Settlement<'a>,
    block_height: u64,
    timestamp: u64,
    max_price_age: u64,
    events: Vec<ProtocolEvent>,
}

impl<'a> OperationContext<'a> {
    /// Open a context at the given block clock
    pub fn new(
        oracle: &'a dyn PriceOracle,
        ledger: &'a mut dyn AssetLedger,
        block_height: u64,
        timestamp: u64,
        max_price_age: u64,
    ) -> Self {
        Self {
            oracle,
            settlement: Settlement::new(ledger),
            block_height,
            timestamp,
            max_price_age,
            events: Vec::new(),
        }
    }

    /// Current block height
    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    /// Current block timestamp
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Fresh prices for `assets`, read once
    pub fn prices<'i, I>(&self, assets: I) -> Result<PriceSnapshot>
    where
        I: IntoIterator<Item = &'i AssetId>,
    {
        PriceSnapshot::capture(self.oracle, assets, self.timestamp, self.max_price_age)
    }

    /// Journaled ledger access
    pub fn settlement(&mut self) -> &mut Settlement<'a> {
        &mut self.settlement
    }

    /// Stage an event
    pub fn emit(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Events staged so far
    pub fn staged_events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Keep every transfer and release the staged events
    pub fn commit(self) -> (Vec<Movement>, Vec<ProtocolEvent>) {
        (self.settlement.commit(), self.events)
    }

    /// Reverse every transfer and drop the staged events
    pub fn rollback(self) -> Result<()> {
        self.settlement.rollback()
    }
}
