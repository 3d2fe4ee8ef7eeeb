//! Migration configuration, validation, and error types.
//!
//! [`MigrationConfig`] is the input to [`MigrationStep`](crate::MigrationStep).
//! [`validate()`](MigrationConfig::validate) checks the numeric settings
//! once, before any rank starts work.

use std::error::Error;
use std::fmt;

use strata_core::Phase;
use strata_grid::BlockingThresholds;

// ── StuckPolicy ────────────────────────────────────────────────────

/// What happens to charge that reaches the crest of a reservoir nobody
/// detected or designated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StuckPolicy {
    /// The crest becomes a terminal and the charge is discarded.
    #[default]
    Eliminate,
    /// Charge continues into the node directly above when that node is
    /// permeable; otherwise it is discarded.
    FunnelUp,
}

// ── Expulsion ──────────────────────────────────────────────────────

/// Direction of source-rock expulsion, which sets the fraction of
/// expelled mass that migrates upward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Expulsion {
    /// Everything expelled migrates upward.
    #[default]
    UpAndDownward,
    /// Half of the expelled mass migrates upward.
    Upward,
}

impl Expulsion {
    /// Fraction of the expelled mass that enters the flow paths.
    pub fn fraction(self) -> f64 {
        match self {
            Self::UpAndDownward => 1.0,
            Self::Upward => 0.5,
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`MigrationConfig::validate()`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// A blocking threshold is negative or not finite.
    InvalidBlocking {
        /// Which threshold.
        name: &'static str,
        /// The invalid value.
        value: f64,
    },
    /// A minimum column height is negative or not finite.
    InvalidColumnHeight {
        /// The phase the height applies to.
        phase: Phase,
        /// The invalid value.
        value: f64,
    },
    /// `max_rounds` is zero.
    ZeroRounds,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBlocking { name, value } => {
                write!(f, "blocking {name} must be finite and non-negative, got {value}")
            }
            Self::InvalidColumnHeight { phase, value } => write!(
                f,
                "minimum {phase:?} column height must be finite and non-negative, got {value}"
            ),
            Self::ZeroRounds => write!(f, "max_rounds must be at least 1"),
        }
    }
}

impl Error for ConfigError {}

// ── MigrationConfig ────────────────────────────────────────────────

/// Settings of one migration step.
#[derive(Clone, Debug, PartialEq)]
pub struct MigrationConfig {
    /// Permeability and porosity at or below which nodes block flow.
    /// Formations declared with their own thresholds keep them.
    pub blocking: BlockingThresholds,
    /// Minimum oil column a seal must hold to flag a reservoir. Default: 1.0.
    pub min_oil_column_height: f64,
    /// Minimum gas column a seal must hold to flag a reservoir. Default: 1.0.
    pub min_gas_column_height: f64,
    /// Include the overpressure difference across the seal in
    /// reservoir detection.
    pub pressure_run: bool,
    /// Every flow direction is straight up.
    pub vertical_migration: bool,
    /// Use pressure and capillary gradients in the flow direction.
    pub dynamic: bool,
    /// Phase whose density and capillary pressure drive the flow
    /// direction. Default: oil.
    pub flow_phase: Phase,
    /// Policy for charge reaching an undetected crest.
    pub stuck_policy: StuckPolicy,
    /// Run crest detection on formations that are not designated
    /// reservoirs.
    pub detect_reservoirs: bool,
    /// Expulsion direction of the source rocks.
    pub expulsion: Expulsion,
    /// Convergence rounds allowed per layer before the step gives up.
    /// Default: 1000.
    pub max_rounds: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            blocking: BlockingThresholds::default(),
            min_oil_column_height: 1.0,
            min_gas_column_height: 1.0,
            pressure_run: false,
            vertical_migration: false,
            dynamic: false,
            flow_phase: Phase::Oil,
            stuck_policy: StuckPolicy::default(),
            detect_reservoirs: true,
            expulsion: Expulsion::default(),
            max_rounds: 1000,
        }
    }
}

impl MigrationConfig {
    /// Validate the numeric settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !non_negative(self.blocking.permeability) {
            return Err(ConfigError::InvalidBlocking {
                name: "permeability",
                value: self.blocking.permeability,
            });
        }
        if !non_negative(self.blocking.porosity) {
            return Err(ConfigError::InvalidBlocking {
                name: "porosity",
                value: self.blocking.porosity,
            });
        }
        if !non_negative(self.min_gas_column_height) {
            return Err(ConfigError::InvalidColumnHeight {
                phase: Phase::Gas,
                value: self.min_gas_column_height,
            });
        }
        if !non_negative(self.min_oil_column_height) {
            return Err(ConfigError::InvalidColumnHeight {
                phase: Phase::Oil,
                value: self.min_oil_column_height,
            });
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        Ok(())
    }

    /// Minimum column height for one phase.
    pub fn min_column_height(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Gas => self.min_gas_column_height,
            Phase::Oil => self.min_oil_column_height,
        }
    }
}
