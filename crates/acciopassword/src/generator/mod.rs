//! Password generation contract.
//!
//! Handlers depend only on [`PasswordGenerator`]; [`StandardGenerator`] is the
//! implementation wired in by `main`.

pub mod standard;

pub use standard::StandardGenerator;

use thiserror::Error;

/// Default length of a random password.
pub const DEFAULT_RANDOM_LENGTH: usize = 128;
/// Upper bound on the `length` parameter of `/v1/random`.
pub const MAX_RANDOM_LENGTH: usize = 256;

/// Default number of words in a diceware passphrase.
pub const DEFAULT_DICEWARE_LENGTH: usize = 8;
/// Upper bound on the `length` parameter of `/v1/diceware`.
pub const MAX_DICEWARE_LENGTH: usize = 64;
/// Separator used between diceware words when none is given.
pub const DEFAULT_DICEWARE_SEPARATOR: &str = "-";

/// Default number of digits in a PIN.
pub const DEFAULT_PIN_LENGTH: usize = 6;
/// Upper bound on the `length` parameter of `/v1/pin`.
pub const MAX_PIN_LENGTH: usize = 64;

/// Errors reported by a generator.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Every character class was switched off.
    #[error("at least one character class must be enabled")]
    NoCharacterClasses,

    /// The diceware word list is empty.
    #[error("word list is empty")]
    EmptyWordList,
}

/// Shape of a random password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomOptions {
    pub length: usize,
    pub lowercase: bool,
    pub uppercase: bool,
    pub numbers: bool,
    pub symbols: bool,
}

impl Default for RandomOptions {
    fn default() -> Self {
        Self {
            length: DEFAULT_RANDOM_LENGTH,
            lowercase: true,
            uppercase: true,
            numbers: true,
            symbols: true,
        }
    }
}

/// Shape of a diceware passphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicewareOptions {
    pub length: usize,
    pub separator: String,
    pub capitalize: bool,
}

impl Default for DicewareOptions {
    fn default() -> Self {
        Self {
            length: DEFAULT_DICEWARE_LENGTH,
            separator: DEFAULT_DICEWARE_SEPARATOR.into(),
            capitalize: false,
        }
    }
}

/// Shape of a numeric PIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinOptions {
    pub length: usize,
}

impl Default for PinOptions {
    fn default() -> Self {
        Self {
            length: DEFAULT_PIN_LENGTH,
        }
    }
}

/// Capability to produce passwords of each supported kind.
#[cfg_attr(test, mockall::automock)]
pub trait PasswordGenerator: Send + Sync {
    /// Generate a password from the enabled character classes.
    fn random(&self, options: &RandomOptions) -> Result<String, GenerationError>;

    /// Generate a passphrase of dictionary words.
    fn diceware(&self, options: &DicewareOptions) -> Result<String, GenerationError>;

    /// Generate a digits-only PIN.
    fn pin(&self, options: &PinOptions) -> Result<String, GenerationError>;
}
