//! Checkout configuration
//! Loads settings from environment variables (and `.env` when present) and validates them

use crate::payments::registry::RegistryConfig;
use crate::payments::types::GatewayId;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main checkout configuration
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub currency: String,
    pub gateways: RegistryConfig,
    pub polling: PollPolicy,
    pub collection_account: CollectionAccountConfig,
    pub logging: LoggingConfig,
}

/// Verification polling after a provider token is accepted
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

/// Account that receives manual bank transfers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionAccountConfig {
    pub bank_name: String,
    pub account_name: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl CheckoutConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();

        Ok(CheckoutConfig {
            currency: env::var("CHECKOUT_CURRENCY").unwrap_or_else(|_| "NGN".to_string()),
            gateways: gateways_from_env()?,
            polling: PollPolicy::from_env()?,
            collection_account: CollectionAccountConfig::from_env(),
            logging: LoggingConfig::from_env(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::InvalidValue("CHECKOUT_CURRENCY".to_string()));
        }

        self.gateways
            .validate()
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
        self.polling.validate()?;
        self.collection_account.validate()?;
        self.logging.validate()?;

        Ok(())
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: "NGN".to_string(),
            gateways: RegistryConfig::default(),
            polling: PollPolicy::default(),
            collection_account: CollectionAccountConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn gateways_from_env() -> Result<RegistryConfig, ConfigError> {
    let default_gateway = env::var("DEFAULT_PAYMENT_GATEWAY")
        .unwrap_or_else(|_| GatewayId::Paystack.to_string());
    let default_gateway = GatewayId::from_str(&default_gateway)
        .map_err(|_| ConfigError::InvalidValue("DEFAULT_PAYMENT_GATEWAY".to_string()))?;

    let enabled_gateways = match env::var("ENABLED_PAYMENT_GATEWAYS") {
        Ok(raw) => parse_gateway_list(&raw)?,
        Err(_) => GatewayId::ALL.to_vec(),
    };

    Ok(RegistryConfig {
        default_gateway,
        enabled_gateways,
    })
}

fn parse_gateway_list(raw: &str) -> Result<Vec<GatewayId>, ConfigError> {
    let mut gateways = Vec::new();
    for part in raw.split(',') {
        let value = part.trim();
        if value.is_empty() {
            continue;
        }
        let gateway = GatewayId::from_str(value)
            .map_err(|_| ConfigError::InvalidValue(format!("ENABLED_PAYMENT_GATEWAYS: {}", value)))?;
        if !gateways.contains(&gateway) {
            gateways.push(gateway);
        }
    }
    Ok(gateways)
}

impl PollPolicy {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(PollPolicy {
            max_attempts: env::var("VERIFY_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("VERIFY_MAX_ATTEMPTS".to_string()))?,
            initial_delay: Duration::from_millis(
                env::var("VERIFY_INITIAL_DELAY_MS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("VERIFY_INITIAL_DELAY_MS".to_string()))?,
            ),
            max_delay: Duration::from_millis(
                env::var("VERIFY_MAX_DELAY_MS")
                    .unwrap_or_else(|_| "4000".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("VERIFY_MAX_DELAY_MS".to_string()))?,
            ),
            multiplier: env::var("VERIFY_BACKOFF_MULTIPLIER")
                .unwrap_or_else(|_| "2.0".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("VERIFY_BACKOFF_MULTIPLIER".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "VERIFY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "VERIFY_BACKOFF_MULTIPLIER must be >= 1.0".to_string(),
            ));
        }

        if self.initial_delay > self.max_delay {
            return Err(ConfigError::InvalidValue(
                "VERIFY_INITIAL_DELAY_MS must be <= VERIFY_MAX_DELAY_MS".to_string(),
            ));
        }

        Ok(())
    }

    /// Policy with no waiting between checks.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
        }
    }
}

impl CollectionAccountConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        CollectionAccountConfig {
            bank_name: env::var("COLLECTION_BANK_NAME").unwrap_or(defaults.bank_name),
            account_name: env::var("COLLECTION_ACCOUNT_NAME").unwrap_or(defaults.account_name),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bank_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue("COLLECTION_BANK_NAME".to_string()));
        }

        if self.account_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "COLLECTION_ACCOUNT_NAME".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for CollectionAccountConfig {
    fn default() -> Self {
        Self {
            bank_name: "Wema Bank".to_string(),
            account_name: "Lesson Checkout Collections".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Plain,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CheckoutConfig::default().validate().is_ok());
    }

    #[test]
    fn test_gateway_list_parsing() {
        let gateways = parse_gateway_list("paystack, bank-transfer,,ussd,paystack").unwrap();
        assert_eq!(
            gateways,
            vec![GatewayId::Paystack, GatewayId::BankTransfer, GatewayId::Ussd]
        );
        assert!(parse_gateway_list("paystack,paypal").is_err());
    }

    #[test]
    fn test_poll_policy_validation() {
        let mut policy = PollPolicy::default();
        assert!(policy.validate().is_ok());

        policy.max_attempts = 0;
        assert!(policy.validate().is_err());

        let policy = PollPolicy {
            multiplier: 0.5,
            ..PollPolicy::default()
        };
        assert!(policy.validate().is_err());

        let policy = PollPolicy {
            initial_delay: Duration::from_secs(10),
            ..PollPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_invalid_currency_validation() {
        let config = CheckoutConfig {
            currency: "naira".to_string(),
            ..CheckoutConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_gateway_must_be_enabled() {
        let config = CheckoutConfig {
            gateways: RegistryConfig {
                default_gateway: GatewayId::Flutterwave,
                enabled_gateways: vec![GatewayId::Paystack],
            },
            ..CheckoutConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_log_level_validation() {
        let config = LoggingConfig {
            level: "verbose".to_string(),
            format: LogFormat::Json,
        };
        assert!(config.validate().is_err());
    }
}
