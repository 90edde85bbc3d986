pub mod market;
pub mod service;

pub use market::{FinalResult, Ledger, LedgerView, Market, Quote, TickOutcome};
pub use service::{spawn, Command, EngineHandle};
