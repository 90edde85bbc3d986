use std::env;

/// A tradable instrument with its starting price and per-tick fluctuation bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentConfig {
    /// Display symbol, e.g. "A" or "BTC".
    pub symbol: String,
    /// Price at the start of every round.
    pub start_price: i64,
    /// Maximum absolute price move per tick.
    pub max_move: i64,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Cash every participant starts a round with.
    pub initial_cash: i64,
    /// Round length in seconds (one tick per second at the default interval).
    pub round_duration_secs: u64,
    /// Tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// The tradable instrument set.
    pub instruments: Vec<InstrumentConfig>,
}

/// Parse instruments from a piped-list string.
/// Format: "symbol|start_price|max_move,symbol2|start_price2|max_move2"
pub fn parse_instruments(raw: &str) -> Vec<InstrumentConfig> {
    raw.split(',')
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split('|').collect();
            if parts.len() >= 3 {
                let symbol = parts[0].trim();
                let start_price: i64 = parts[1].trim().parse().ok()?;
                let max_move: i64 = parts[2].trim().parse().ok()?;
                if symbol.is_empty() || start_price < 1 || max_move < 0 {
                    return None;
                }
                Some(InstrumentConfig {
                    symbol: symbol.to_string(),
                    start_price,
                    max_move,
                })
            } else {
                None
            }
        })
        .collect()
}

/// The reference instrument set: four symbols, equal starting prices,
/// increasing volatility.
pub fn default_instruments() -> Vec<InstrumentConfig> {
    [("A", 1000), ("B", 2000), ("C", 3000), ("D", 5000)]
        .into_iter()
        .map(|(symbol, max_move)| InstrumentConfig {
            symbol: symbol.to_string(),
            start_price: 50_000,
            max_move,
        })
        .collect()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3001);

        // Instrument set from INSTRUMENTS env var, format "sym|start|range,..."
        let instruments = env::var("INSTRUMENTS")
            .ok()
            .map(|s| parse_instruments(&s))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(default_instruments);

        Self {
            host,
            port,
            initial_cash: env::var("INITIAL_CASH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500_000),
            round_duration_secs: env::var("ROUND_DURATION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            tick_interval_ms: env::var("TICK_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            instruments,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_instruments() {
        let instruments = default_instruments();

        assert_eq!(instruments.len(), 4);
        assert_eq!(instruments[0].symbol, "A");
        assert_eq!(instruments[0].start_price, 50_000);
        assert_eq!(instruments[0].max_move, 1000);
        assert_eq!(instruments[3].symbol, "D");
        assert_eq!(instruments[3].max_move, 5000);
    }

    #[test]
    fn test_parse_instruments() {
        let instruments = parse_instruments("BTC|60000|2500,ETH|3000|150");

        assert_eq!(instruments.len(), 2);
        assert_eq!(instruments[0].symbol, "BTC");
        assert_eq!(instruments[0].start_price, 60_000);
        assert_eq!(instruments[0].max_move, 2500);
        assert_eq!(instruments[1].symbol, "ETH");
    }

    #[test]
    fn test_parse_instruments_skips_malformed_entries() {
        let instruments = parse_instruments("A|100|10,broken,B|x|5,C|200|20");

        assert_eq!(instruments.len(), 2);
        assert_eq!(instruments[0].symbol, "A");
        assert_eq!(instruments[1].symbol, "C");
    }

    #[test]
    fn test_parse_instruments_rejects_nonpositive_start_price() {
        let instruments = parse_instruments("A|0|10,B|-5|10,C|1|10");

        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].symbol, "C");
        assert_eq!(instruments[0].start_price, 1);
    }

    #[test]
    fn test_config_manual_construction() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 4000,
            initial_cash: 500_000,
            round_duration_secs: 120,
            tick_interval_ms: 1000,
            instruments: default_instruments(),
        };

        assert_eq!(config.port, 4000);
        assert_eq!(config.initial_cash, 500_000);
        assert_eq!(config.instruments.len(), 4);
    }
}
