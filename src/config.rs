//! Configuration management with validation and defaults
//!
//! Sectioned engine configuration: global betting bounds, per-game limits
//! and payout multipliers, event bus sizing. Loadable from a TOML file with
//! environment variable overrides.

use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Top-level engine configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    pub betting: BettingConfig,
    pub games: GamesConfig,
    pub events: EventsConfig,
}

/// Global stake bounds applied to every wager before per-account and
/// per-match overrides are consulted
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BettingConfig {
    pub min_stake: u64,
    pub max_stake: u64,
}

impl Default for BettingConfig {
    fn default() -> Self {
        Self {
            min_stake: 10,
            max_stake: 1_000_000,
        }
    }
}

/// Per-game limits and payout multipliers (hundredths: 240 = 2.40x).
/// Defaults are fair-odds multipliers reduced by the game's house edge.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct GamesConfig {
    pub coin_flip: CoinFlipConfig,
    pub dice: DiceConfig,
    pub hi_lo: HiLoConfig,
    pub card_duel: CardDuelConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoinFlipConfig {
    pub enabled: bool,
    pub min_stake: u64,
    pub max_stake: u64,
    /// Return-to-player in basis points, reported to the game catalog
    pub rtp_bps: u32,
    pub win_multiplier: u32,
}

impl Default for CoinFlipConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_stake: 10,
            max_stake: 100_000,
            rtp_bps: 9_800,
            win_multiplier: 196,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiceConfig {
    pub enabled: bool,
    pub min_stake: u64,
    pub max_stake: u64,
    pub rtp_bps: u32,
    /// Default sum target when the wager does not carry one
    pub default_target: u8,
    pub over_multiplier: u32,
    pub under_multiplier: u32,
    pub exact_multiplier: u32,
}

impl Default for DiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_stake: 10,
            max_stake: 100_000,
            rtp_bps: 9_700,
            default_target: 7,
            // Fair odds for over/under 7 are 36/15 = 2.40x; exact 7 is 6.00x
            over_multiplier: 233,
            under_multiplier: 233,
            exact_multiplier: 582,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HiLoConfig {
    pub enabled: bool,
    pub min_stake: u64,
    pub max_stake: u64,
    pub rtp_bps: u32,
    pub high_multiplier: u32,
    pub low_multiplier: u32,
    /// Exact-seven pays a fixed 13x
    pub exact_multiplier: u32,
}

impl Default for HiLoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_stake: 10,
            max_stake: 50_000,
            rtp_bps: 9_700,
            high_multiplier: 210,
            low_multiplier: 210,
            exact_multiplier: 1_300,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CardDuelConfig {
    pub enabled: bool,
    pub min_stake: u64,
    pub max_stake: u64,
    pub rtp_bps: u32,
    pub win_multiplier: u32,
}

impl Default for CardDuelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_stake: 10,
            max_stake: 50_000,
            rtp_bps: 9_750,
            win_multiplier: 195,
        }
    }
}

/// Event bus sizing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 10_000,
        }
    }
}

impl EngineConfig {
    /// Validate cross-field consistency of the final configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.betting.min_stake > self.betting.max_stake {
            return Err(EngineError::validation(format!(
                "betting.min_stake {} exceeds betting.max_stake {}",
                self.betting.min_stake, self.betting.max_stake
            )));
        }

        let game_bounds = [
            ("coin_flip", self.games.coin_flip.min_stake, self.games.coin_flip.max_stake),
            ("dice", self.games.dice.min_stake, self.games.dice.max_stake),
            ("hi_lo", self.games.hi_lo.min_stake, self.games.hi_lo.max_stake),
            ("card_duel", self.games.card_duel.min_stake, self.games.card_duel.max_stake),
        ];
        for (name, min, max) in game_bounds {
            if min > max {
                return Err(EngineError::validation(format!(
                    "games.{}.min_stake {} exceeds max_stake {}",
                    name, min, max
                )));
            }
        }

        if !(2..=12).contains(&self.games.dice.default_target) {
            return Err(EngineError::validation(format!(
                "games.dice.default_target {} outside 2..=12",
                self.games.dice.default_target
            )));
        }

        if self.events.channel_capacity == 0 {
            return Err(EngineError::validation(
                "events.channel_capacity must be positive",
            ));
        }

        Ok(())
    }
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> EngineResult<EngineConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            EngineConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> EngineResult<EngineConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::validation(format!("failed to read {}: {}", path, e))
        })?;

        toml::from_str(&content)
            .map_err(|e| EngineError::validation(format!("failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut EngineConfig) -> EngineResult<()> {
        if let Ok(raw) = env::var("STAKEHOUSE_MIN_STAKE") {
            config.betting.min_stake = raw.parse().map_err(|_| {
                EngineError::validation(format!("invalid STAKEHOUSE_MIN_STAKE: {}", raw))
            })?;
        }
        if let Ok(raw) = env::var("STAKEHOUSE_MAX_STAKE") {
            config.betting.max_stake = raw.parse().map_err(|_| {
                EngineError::validation(format!("invalid STAKEHOUSE_MAX_STAKE: {}", raw))
            })?;
        }
        if let Ok(raw) = env::var("STAKEHOUSE_EVENT_CAPACITY") {
            config.events.channel_capacity = raw.parse().map_err(|_| {
                EngineError::validation(format!("invalid STAKEHOUSE_EVENT_CAPACITY: {}", raw))
            })?;
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_stake_bounds_rejected() {
        let mut config = EngineConfig::default();
        config.betting.min_stake = 500;
        config.betting.max_stake = 100;
        assert!(matches!(
            config.validate(),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_inverted_game_bounds_rejected() {
        let mut config = EngineConfig::default();
        config.games.dice.min_stake = 1_000;
        config.games.dice.max_stake = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dice_target_bounds() {
        let mut config = EngineConfig::default();
        config.games.dice.default_target = 13;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = EngineConfig::default();
        let serialized = toml::to_string(&config).expect("serialize");
        let parsed: EngineConfig = toml::from_str(&serialized).expect("parse");
        assert_eq!(parsed.betting.min_stake, config.betting.min_stake);
        assert_eq!(
            parsed.games.hi_lo.exact_multiplier,
            config.games.hi_lo.exact_multiplier
        );
    }
}
