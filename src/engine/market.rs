//! The market state machine.
//!
//! Owns the round countdown, per-instrument quotes and every session ledger.
//! Purely synchronous; only the engine task in `service` touches it, which
//! serializes ticks and trades by construction.

use crate::config::{Config, InstrumentConfig};
use crate::error::MarketError;
use crate::types::{MarketSnapshot, TradeAction};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// One instrument's live price and its last-tick change.
#[derive(Debug, Clone)]
pub struct Quote {
    /// Current price, never below 1.
    pub price: i64,
    /// Post-clamp change applied on the most recent tick.
    pub change: i64,
}

/// A participant's cash and share counts. Created on connect, reset on
/// round start, discarded on disconnect.
#[derive(Debug, Clone)]
pub struct Ledger {
    pub cash: i64,
    pub holdings: BTreeMap<String, u32>,
}

impl Ledger {
    fn new(initial_cash: i64, instruments: &[InstrumentConfig]) -> Self {
        Self {
            cash: initial_cash,
            holdings: instruments
                .iter()
                .map(|i| (i.symbol.clone(), 0))
                .collect(),
        }
    }
}

/// Per-session view returned after a successful trade.
#[derive(Debug, Clone)]
pub struct LedgerView {
    pub cash: i64,
    pub holdings: BTreeMap<String, u32>,
    /// Mark-to-market profit: cash + holdings valued at current prices,
    /// minus initial cash.
    pub profit: i64,
}

/// Result of a settled round for one session.
#[derive(Debug, Clone)]
pub struct FinalResult {
    pub final_balance: i64,
    pub profit: i64,
}

/// Outcome of one tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// The round continues.
    Running,
    /// The countdown reached zero; every ledger has been settled.
    RoundOver(Vec<(Uuid, FinalResult)>),
}

/// The market state machine.
pub struct Market {
    instruments: Vec<InstrumentConfig>,
    initial_cash: i64,
    round_duration_secs: u64,
    active: bool,
    time_left: u64,
    quotes: BTreeMap<String, Quote>,
    ledgers: HashMap<Uuid, Ledger>,
}

impl Market {
    pub fn new(config: &Config) -> Self {
        let quotes = config
            .instruments
            .iter()
            .map(|i| {
                (
                    i.symbol.clone(),
                    Quote {
                        price: i.start_price,
                        change: 0,
                    },
                )
            })
            .collect();

        Self {
            instruments: config.instruments.clone(),
            initial_cash: config.initial_cash,
            round_duration_secs: config.round_duration_secs,
            active: false,
            time_left: config.round_duration_secs,
            quotes,
            ledgers: HashMap::new(),
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn time_left(&self) -> u64 {
        self.time_left
    }

    pub fn session_count(&self) -> usize {
        self.ledgers.len()
    }

    /// Current price per instrument.
    pub fn prices(&self) -> BTreeMap<String, i64> {
        self.quotes
            .iter()
            .map(|(s, q)| (s.clone(), q.price))
            .collect()
    }

    /// Last-tick change per instrument.
    pub fn changes(&self) -> BTreeMap<String, i64> {
        self.quotes
            .iter()
            .map(|(s, q)| (s.clone(), q.change))
            .collect()
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            active: self.active,
            time_left: self.time_left,
            prices: self.prices(),
            changes: self.changes(),
            sessions: self.ledgers.len(),
        }
    }

    /// Register a session with a fresh ledger and return a view of it.
    pub fn connect(&mut self, session: Uuid) -> LedgerView {
        let ledger = Ledger::new(self.initial_cash, &self.instruments);
        let view = self.view_of(&ledger);
        self.ledgers.insert(session, ledger);
        view
    }

    /// Drop a session's ledger. A round in flight simply no longer settles it.
    pub fn disconnect(&mut self, session: Uuid) {
        self.ledgers.remove(&session);
    }

    pub fn ledger(&self, session: Uuid) -> Option<&Ledger> {
        self.ledgers.get(&session)
    }

    /// Begin a new round: reset the countdown, every quote and every ledger.
    /// Rejected while a round is already running, leaving all state untouched.
    pub fn start_round(&mut self) -> Result<(), MarketError> {
        if self.active {
            return Err(MarketError::RoundAlreadyActive);
        }

        self.active = true;
        self.time_left = self.round_duration_secs;
        for instrument in &self.instruments {
            if let Some(quote) = self.quotes.get_mut(&instrument.symbol) {
                quote.price = instrument.start_price;
                quote.change = 0;
            }
        }
        for ledger in self.ledgers.values_mut() {
            *ledger = Ledger::new(self.initial_cash, &self.instruments);
        }

        Ok(())
    }

    /// Advance the round by one tick: decrement the countdown and apply an
    /// independent uniform draw in `[-max_move, +max_move]` to each
    /// instrument, clamping prices at 1. The recorded change is post-clamp.
    /// Settles and deactivates when the countdown reaches zero.
    pub fn tick(&mut self, rng: &mut impl Rng) -> TickOutcome {
        self.time_left = self.time_left.saturating_sub(1);

        for instrument in &self.instruments {
            if let Some(quote) = self.quotes.get_mut(&instrument.symbol) {
                let fluctuation = rng.gen_range(-instrument.max_move..=instrument.max_move);
                let new_price = (quote.price + fluctuation).max(1);
                quote.change = new_price - quote.price;
                quote.price = new_price;
            }
        }

        if self.time_left == 0 {
            self.active = false;
            TickOutcome::RoundOver(self.settle())
        } else {
            TickOutcome::Running
        }
    }

    /// Execute a single-share trade against a session's ledger at the
    /// current price. Every rejection leaves the ledger untouched.
    pub fn trade(
        &mut self,
        session: Uuid,
        action: TradeAction,
        symbol: &str,
    ) -> Result<LedgerView, MarketError> {
        if !self.active {
            return Err(MarketError::RoundNotActive);
        }

        let price = self
            .quotes
            .get(symbol)
            .map(|q| q.price)
            .ok_or_else(|| MarketError::InvalidInstrument(symbol.to_string()))?;

        let ledger = self
            .ledgers
            .get_mut(&session)
            .ok_or(MarketError::UnknownSession(session))?;

        match action {
            TradeAction::Buy => {
                if ledger.cash < price {
                    return Err(MarketError::InsufficientFunds(symbol.to_string()));
                }
                ledger.cash -= price;
                *ledger.holdings.entry(symbol.to_string()).or_insert(0) += 1;
            }
            TradeAction::Sell => {
                let count = ledger.holdings.entry(symbol.to_string()).or_insert(0);
                if *count == 0 {
                    return Err(MarketError::NoHoldings(symbol.to_string()));
                }
                *count -= 1;
                ledger.cash += price;
            }
        }

        let ledger = self.ledgers[&session].clone();
        Ok(self.view_of(&ledger))
    }

    /// Liquidate every ledger's holdings at current prices. Called exactly
    /// once per round, when the countdown hits zero.
    fn settle(&mut self) -> Vec<(Uuid, FinalResult)> {
        let mut results = Vec::with_capacity(self.ledgers.len());

        for (session, ledger) in self.ledgers.iter_mut() {
            for (symbol, count) in ledger.holdings.iter_mut() {
                if *count > 0 {
                    if let Some(quote) = self.quotes.get(symbol) {
                        ledger.cash += i64::from(*count) * quote.price;
                    }
                    *count = 0;
                }
            }

            results.push((
                *session,
                FinalResult {
                    final_balance: ledger.cash,
                    profit: ledger.cash - self.initial_cash,
                },
            ));
        }

        results
    }

    fn view_of(&self, ledger: &Ledger) -> LedgerView {
        let market_value: i64 = ledger
            .holdings
            .iter()
            .filter_map(|(symbol, count)| {
                self.quotes
                    .get(symbol)
                    .map(|q| i64::from(*count) * q.price)
            })
            .sum();

        LedgerView {
            cash: ledger.cash,
            holdings: ledger.holdings.clone(),
            profit: ledger.cash + market_value - self.initial_cash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            initial_cash: 500_000,
            round_duration_secs: 3,
            tick_interval_ms: 1000,
            instruments: crate::config::default_instruments(),
        }
    }

    fn started_market() -> Market {
        let mut market = Market::new(&test_config());
        market.start_round().unwrap();
        market
    }

    // =========================================================================
    // Tick Tests
    // =========================================================================

    #[test]
    fn test_prices_never_drop_below_one() {
        let config = Config {
            instruments: vec![InstrumentConfig {
                symbol: "X".to_string(),
                start_price: 5,
                max_move: 1000,
            }],
            round_duration_secs: 200,
            ..test_config()
        };
        let mut market = Market::new(&config);
        market.start_round().unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..199 {
            market.tick(&mut rng);
            assert!(market.prices()["X"] >= 1);
        }
    }

    #[test]
    fn test_change_is_exactly_post_clamp_difference() {
        let mut market = started_market();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..2 {
            let before = market.prices();
            market.tick(&mut rng);
            let after = market.prices();
            let changes = market.changes();

            for symbol in before.keys() {
                assert_eq!(changes[symbol], after[symbol] - before[symbol]);
            }
        }
    }

    #[test]
    fn test_fluctuation_bounded_by_max_move() {
        let config = Config {
            instruments: vec![InstrumentConfig {
                symbol: "X".to_string(),
                start_price: 50_000,
                max_move: 100,
            }],
            round_duration_secs: 500,
            ..test_config()
        };
        let mut market = Market::new(&config);
        market.start_round().unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..499 {
            market.tick(&mut rng);
            assert!(market.changes()["X"].abs() <= 100);
        }
    }

    #[test]
    fn test_round_runs_exactly_duration_ticks() {
        let mut market = started_market();
        let mut rng = StdRng::seed_from_u64(1);
        let mut ticks = 0;

        loop {
            ticks += 1;
            if let TickOutcome::RoundOver(_) = market.tick(&mut rng) {
                break;
            }
        }

        assert_eq!(ticks, 3);
        assert!(!market.active());
        assert_eq!(market.time_left(), 0);
    }

    // =========================================================================
    // Trade Tests
    // =========================================================================

    #[test]
    fn test_buy_then_sell_restores_cash() {
        let mut market = started_market();
        let session = Uuid::new_v4();
        market.connect(session);

        let view = market.trade(session, TradeAction::Buy, "A").unwrap();
        assert_eq!(view.cash, 450_000);
        assert_eq!(view.holdings["A"], 1);

        let view = market.trade(session, TradeAction::Sell, "A").unwrap();
        assert_eq!(view.cash, 500_000);
        assert_eq!(view.holdings["A"], 0);
    }

    #[test]
    fn test_buy_rejected_when_cash_short() {
        let config = Config {
            initial_cash: 49_999,
            ..test_config()
        };
        let mut market = Market::new(&config);
        market.start_round().unwrap();
        let session = Uuid::new_v4();
        market.connect(session);

        let err = market.trade(session, TradeAction::Buy, "A").unwrap_err();
        assert_eq!(err, MarketError::InsufficientFunds("A".to_string()));

        let ledger = market.ledger(session).unwrap();
        assert_eq!(ledger.cash, 49_999);
        assert_eq!(ledger.holdings["A"], 0);
    }

    #[test]
    fn test_buy_allowed_with_exactly_price_in_cash() {
        let config = Config {
            initial_cash: 50_000,
            ..test_config()
        };
        let mut market = Market::new(&config);
        market.start_round().unwrap();
        let session = Uuid::new_v4();
        market.connect(session);

        let view = market.trade(session, TradeAction::Buy, "A").unwrap();
        assert_eq!(view.cash, 0);
        assert_eq!(view.holdings["A"], 1);
    }

    #[test]
    fn test_sell_rejected_without_holdings() {
        let mut market = started_market();
        let session = Uuid::new_v4();
        market.connect(session);

        let err = market.trade(session, TradeAction::Sell, "B").unwrap_err();
        assert_eq!(err, MarketError::NoHoldings("B".to_string()));
        assert_eq!(market.ledger(session).unwrap().cash, 500_000);
    }

    #[test]
    fn test_trade_rejected_while_idle() {
        let mut market = Market::new(&test_config());
        let session = Uuid::new_v4();
        market.connect(session);

        let err = market.trade(session, TradeAction::Buy, "A").unwrap_err();
        assert_eq!(err, MarketError::RoundNotActive);
        assert_eq!(market.ledger(session).unwrap().cash, 500_000);
    }

    #[test]
    fn test_trade_rejected_for_unknown_instrument() {
        let mut market = started_market();
        let session = Uuid::new_v4();
        market.connect(session);

        let err = market.trade(session, TradeAction::Buy, "Z").unwrap_err();
        assert_eq!(err, MarketError::InvalidInstrument("Z".to_string()));
    }

    #[test]
    fn test_trade_rejected_for_unknown_session() {
        let mut market = started_market();
        let stranger = Uuid::new_v4();

        let err = market.trade(stranger, TradeAction::Buy, "A").unwrap_err();
        assert_eq!(err, MarketError::UnknownSession(stranger));
    }

    #[test]
    fn test_mark_to_market_profit_tracks_price_moves() {
        let mut market = started_market();
        let session = Uuid::new_v4();
        market.connect(session);

        market.trade(session, TradeAction::Buy, "A").unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        market.tick(&mut rng);

        let view = market.trade(session, TradeAction::Buy, "B").unwrap();
        let prices = market.prices();
        let expected = view.cash + prices["A"] + prices["B"] - 500_000;
        assert_eq!(view.profit, expected);
    }

    // =========================================================================
    // Round Lifecycle Tests
    // =========================================================================

    #[test]
    fn test_start_round_while_active_is_rejected() {
        let mut market = started_market();
        let mut rng = StdRng::seed_from_u64(5);
        market.tick(&mut rng);

        let before_prices = market.prices();
        let before_time = market.time_left();

        let err = market.start_round().unwrap_err();
        assert_eq!(err, MarketError::RoundAlreadyActive);
        assert_eq!(market.prices(), before_prices);
        assert_eq!(market.time_left(), before_time);
        assert!(market.active());
    }

    #[test]
    fn test_start_round_resets_quotes_and_ledgers() {
        let mut market = started_market();
        let session = Uuid::new_v4();
        market.connect(session);
        market.trade(session, TradeAction::Buy, "A").unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        loop {
            if let TickOutcome::RoundOver(_) = market.tick(&mut rng) {
                break;
            }
        }

        market.start_round().unwrap();

        assert_eq!(market.time_left(), 3);
        for (symbol, price) in market.prices() {
            let start = market
                .instruments
                .iter()
                .find(|i| i.symbol == symbol)
                .unwrap()
                .start_price;
            assert_eq!(price, start);
        }
        assert!(market.changes().values().all(|&c| c == 0));

        let ledger = market.ledger(session).unwrap();
        assert_eq!(ledger.cash, 500_000);
        assert!(ledger.holdings.values().all(|&h| h == 0));
    }

    // =========================================================================
    // Settlement Tests
    // =========================================================================

    #[test]
    fn test_settlement_liquidates_holdings_at_final_prices() {
        let mut market = started_market();
        let session = Uuid::new_v4();
        market.connect(session);

        market.trade(session, TradeAction::Buy, "A").unwrap();
        market.trade(session, TradeAction::Buy, "A").unwrap();
        let cash_before = market.ledger(session).unwrap().cash;

        let mut rng = StdRng::seed_from_u64(21);
        let results = loop {
            if let TickOutcome::RoundOver(results) = market.tick(&mut rng) {
                break results;
            }
        };

        let final_price = market.prices()["A"];
        assert_eq!(results.len(), 1);
        let (id, result) = &results[0];
        assert_eq!(*id, session);
        assert_eq!(result.final_balance, cash_before + 2 * final_price);
        assert_eq!(result.profit, result.final_balance - 500_000);

        let ledger = market.ledger(session).unwrap();
        assert!(ledger.holdings.values().all(|&h| h == 0));
        assert_eq!(ledger.cash, result.final_balance);
    }

    #[test]
    fn test_settlement_skips_disconnected_sessions() {
        let mut market = started_market();
        let stayer = Uuid::new_v4();
        let leaver = Uuid::new_v4();
        market.connect(stayer);
        market.connect(leaver);
        market.disconnect(leaver);

        let mut rng = StdRng::seed_from_u64(13);
        let results = loop {
            if let TickOutcome::RoundOver(results) = market.tick(&mut rng) {
                break results;
            }
        };

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, stayer);
    }

    #[test]
    fn test_two_sessions_trade_against_one_price() {
        let mut market = started_market();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        market.connect(alice);
        market.connect(bob);

        let price = market.prices()["C"];
        let a = market.trade(alice, TradeAction::Buy, "C").unwrap();
        let b = market.trade(bob, TradeAction::Buy, "C").unwrap();

        assert_eq!(a.cash, 500_000 - price);
        assert_eq!(b.cash, 500_000 - price);
        assert_eq!(a.holdings["C"], 1);
        assert_eq!(b.holdings["C"], 1);
    }
}
