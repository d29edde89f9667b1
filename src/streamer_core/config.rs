use std::env;
use thiserror::Error;
use yellowstone_grpc_proto::geyser::CommitmentLevel;

/// DEX programs whose transactions are streamed by default, with their platform labels
pub const TRACKED_PROGRAMS: [(&str, &str); 5] = [
    ("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P", "PumpFun"),
    ("pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA", "PumpSwap"),
    ("LanMV9sAd7wArD4vJFi2qDdfnVhFxYSUg6eADduJ3uj", "BonkSwap"),
    ("MoonCVVNZFSYkqNXP6bxHLPL6QQJiMagDL3qcqUQTrG", "Moonshot"),
    ("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8", "RaydiumV4"),
];

/// Platform label for a program id, if it is one we know
pub fn platform_for_program(program_id: &str) -> Option<&'static str> {
    TRACKED_PROGRAMS
        .iter()
        .find(|(id, _)| *id == program_id)
        .map(|(_, name)| *name)
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub geyser_url: String,
    pub x_token: Option<String>,
    pub commitment_level: CommitmentLevel,
    /// Transactions touching any of these programs are streamed
    pub program_filters: Vec<String>,
    /// Slot to resume from before any event has been seen
    pub resume_from_slot: Option<u64>,
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let geyser_url = env::var("GEYSER_URL")
            .map_err(|_| ConfigError::MissingVariable("GEYSER_URL".to_string()))?;

        if !geyser_url.starts_with("http://") && !geyser_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "GEYSER_URL must start with http:// or https://".to_string(),
            ));
        }

        let x_token = env::var("X_TOKEN").ok().filter(|t| !t.is_empty());

        let commitment_str = env::var("COMMITMENT_LEVEL").unwrap_or_else(|_| "Confirmed".to_string());
        let commitment_level = match commitment_str.to_lowercase().as_str() {
            "finalized" => CommitmentLevel::Finalized,
            "confirmed" => CommitmentLevel::Confirmed,
            "processed" => CommitmentLevel::Processed,
            _ => {
                log::warn!(
                    "Invalid COMMITMENT_LEVEL '{}', defaulting to Confirmed",
                    commitment_str
                );
                CommitmentLevel::Confirmed
            }
        };

        let program_filters: Vec<String> = match env::var("PROGRAM_FILTERS") {
            Ok(list) => list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            Err(_) => TRACKED_PROGRAMS.iter().map(|(id, _)| id.to_string()).collect(),
        };

        if let Some(bad) = program_filters.iter().find(|p| p.len() < 32 || p.len() > 44) {
            return Err(ConfigError::InvalidValue(format!(
                "program filter must be 32-44 characters (base58 Pubkey), got '{}'",
                bad
            )));
        }

        let resume_from_slot = match env::var("RESUME_FROM_SLOT") {
            Ok(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(format!("RESUME_FROM_SLOT must be a slot number, got '{}'", raw))
            })?),
            Err(_) => None,
        };

        let reconnect_delay_ms = env::var("RECONNECT_DELAY_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse::<u64>()
            .unwrap_or(2_000);

        Ok(Self {
            geyser_url,
            x_token,
            commitment_level,
            program_filters,
            resume_from_slot,
            reconnect_delay_ms,
        })
    }
}
