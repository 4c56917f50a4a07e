#![allow(mixed_script_confusables)]
#![allow(confusable_idents)]

pub mod assess;
pub mod config;
pub mod constants;
pub mod controller;
pub mod driver;
pub mod encoding;
pub mod environment;
pub mod error;
mod macros;
pub mod network;
pub mod random;
pub mod remote;
pub mod scoring;
pub mod serialize;

pub use assess::{Assessment, Assessor, GenerationAssessment, Phenotype};
pub use config::{EnvironmentKind, RunConfig};
pub use controller::{Controller, ControllerConfig, Individual, LocalController};
pub use driver::{Driver, Export, GenerationResult, Hooks, RunOutcome, WinnerRecord};
pub use encoding::{EncodingDescriptor, Shape};
pub use environment::{Environment, Seeded};
pub use error::{ContractError, EnvError, EpisodeError, HarnessError};
pub use network::{Ctrnn, DenseGenome};
pub use remote::RemoteScoring;
pub use scoring::{
    Checked, EpisodeScoring, Input, Processing, ScoringFunction, ScoringInstance, SeededScoring,
    XorScoring,
};
