//! Static configuration of a run, read once at startup.

use crate::{
    constants::{GAUNTLET_GENERATIONS, GAUNTLET_STEP_CAP},
    controller::ControllerConfig,
    error::HarnessError,
};
use core::{num::NonZeroUsize, time::Duration};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

/// Built-in scoring functions a run can be pointed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentKind {
    #[default]
    Xor,
    CartPole,
    MountainCar,
    Catch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub environment: EnvironmentKind,
    /// Seed of every environment episode
    pub seed: u64,
    pub generations: usize,
    /// Stop at the first generation with a winner
    pub stop_on_winner: bool,
    pub step_cap: usize,
    /// Winning score, when not the environment's own
    pub threshold: Option<f64>,
    /// Instances that may be evaluated at once
    pub max_threads: usize,
    pub flush_between: bool,
    /// Tick of a real time environment, in milliseconds. Unset runs turn based
    pub realtime_tick_ms: Option<u64>,
    /// Winner file, stdout when unset
    pub export: Option<PathBuf>,
    pub archive: Option<PathBuf>,
    pub controller: ControllerConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            environment: EnvironmentKind::default(),
            seed: 0,
            generations: GAUNTLET_GENERATIONS,
            stop_on_winner: true,
            step_cap: GAUNTLET_STEP_CAP,
            threshold: None,
            max_threads: 1,
            flush_between: true,
            realtime_tick_ms: None,
            export: None,
            archive: None,
            controller: ControllerConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let config: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        let fail = |msg: &str| Err(HarnessError::Config(msg.into()));
        if self.generations == 0 {
            return fail("generations must be at least 1");
        }
        if self.step_cap == 0 {
            return fail("step cap must be at least 1");
        }
        if self.max_threads == 0 {
            return fail("max threads must be at least 1");
        }
        if self.threshold.is_some_and(|t| !t.is_finite()) {
            return fail("threshold must be finite");
        }
        if self.realtime_tick_ms == Some(0) {
            return fail("real time tick must be at least 1ms");
        }

        let c = &self.controller;
        if c.population == 0 {
            return fail("population must not be empty");
        }
        if c.workers == 0 {
            return fail("workers must be at least 1");
        }
        if !(0. ..=1.).contains(&c.failure_tolerance) {
            return fail("failure tolerance must be within [0, 1]");
        }
        if !(c.survival > 0. && c.survival <= 1.) {
            return fail("survival must be within (0, 1]");
        }
        if c.hidden.contains(&0) {
            return fail("hidden layers can't be empty");
        }
        Ok(())
    }

    pub fn max_threads(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_threads).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn realtime_tick(&self) -> Option<Duration> {
        self.realtime_tick_ms.map(Duration::from_millis)
    }
}
