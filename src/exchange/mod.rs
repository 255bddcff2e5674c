// =============================================================================
// Exchange integration — wire formats, REST client, streaming transport
// =============================================================================

pub mod client;
pub mod stream;
pub mod wire;

pub use client::ExchangeClient;
pub use stream::{StreamingTransport, TransportState};
pub use wire::{FundingUpdate, InstrumentInfo, PriceUpdate, TickerSnapshot};
