//! Centralized defaults for a training run.
//!
//! Every default is prefixed with `GAUNTLET_`, matching the environment variable the binary
//! reads to override it.

// ============================================================================
// Run Parameters
// ============================================================================

/// Generations to evolve before giving up on finding a winner
pub const GAUNTLET_GENERATIONS: usize = 500;

/// Individuals per generation
pub const GAUNTLET_POPULATION: usize = 32;

/// Hard per-episode step cap, so that an environment which never finishes can't stall a run
pub const GAUNTLET_STEP_CAP: usize = 1000;

/// Fraction of a generation allowed to fail before the run is aborted
pub const GAUNTLET_FAILURE_TOLERANCE: f64 = 0.5;

/// Upper bound on evaluation threads the controller will spin up
pub const GAUNTLET_WORKERS: usize = 8;

/// Score given to an individual whose evaluation failed
pub const GAUNTLET_WORST_SCORE: f64 = f64::MIN;

// ============================================================================
// Reference Controller Parameters
// ============================================================================

/// Number of best individuals preserved unchanged per generation
pub const GAUNTLET_ELITE: usize = 1;

/// Fraction of each generation allowed to breed
pub const GAUNTLET_SURVIVAL: f64 = 0.3;

/// Probability that a child is produced by crossover rather than by copying
pub const GAUNTLET_CROSSOVER_PROB: f64 = 0.75;

/// Probability that any single parameter is mutated
pub const GAUNTLET_MUTATE_PROB: f64 = 0.2;

/// Standard deviation of a parameter perturbation
pub const GAUNTLET_PERTURB_STD: f64 = 0.5;

/// Probability of replacing a mutated parameter rather than perturbing it
pub const GAUNTLET_REPLACE_PROB: f64 = 0.1;

/// Minimum value of a replaced parameter
pub const GAUNTLET_PARAM_MIN: f64 = -3.0;

/// Maximum value of a replaced parameter
pub const GAUNTLET_PARAM_MAX: f64 = 3.0;

/// Network integration steps per layer when settling a turn based input
pub const GAUNTLET_PRECISION: usize = 3;

// ============================================================================
// Environment Parameters
// ============================================================================

/// Rows of the catch board
pub const GAUNTLET_CATCH_ROWS: usize = 8;

/// Columns of the catch board
pub const GAUNTLET_CATCH_COLS: usize = 5;

/// Balls dropped per catch episode
pub const GAUNTLET_CATCH_BALLS: usize = 5;

/// Winning score of an environment who declares no reward threshold
pub const GAUNTLET_DEFAULT_THRESHOLD: f64 = 1000.0;
