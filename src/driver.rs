//! The generation loop of a run: assess, report, stop on a winner, export it.

use crate::{
    constants::GAUNTLET_GENERATIONS,
    controller::{Controller, Individual},
    encoding::EncodingDescriptor,
    error::HarnessError,
    scoring::ScoringFunction,
};
use core::ops::ControlFlow;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{error, info};

/// What one generation came to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub generation: usize,
    /// Aggregate fitness of the population
    pub fitness: f64,
    pub best_fitness: f64,
    pub winner_found: bool,
}

/// The exported champion of a winning generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerRecord<G> {
    pub generation: usize,
    pub fitness: f64,
    pub genome: G,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome<G> {
    /// Generations assessed
    pub generations: usize,
    /// Latest exported winner
    pub winner: Option<WinnerRecord<G>>,
    pub history: Vec<GenerationResult>,
}

/// Where a winner is written
#[derive(Debug, Clone, PartialEq)]
pub enum Export {
    Stdout,
    File(PathBuf),
}

impl Export {
    pub fn write<G: Serialize>(&self, record: &WinnerRecord<G>) -> Result<(), HarnessError> {
        let json = serde_json::to_string_pretty(record)?;
        match self {
            Export::Stdout => writeln!(io::stdout().lock(), "{json}")?,
            Export::File(path) => fs::write(path, json + "\n")?,
        }
        Ok(())
    }
}

pub type Hook<G> = Box<dyn FnMut(&GenerationResult, &Individual<G>) -> ControlFlow<()>>;

/// Called in order after every generation with its result and champion. The first to break
/// stops the run, without exporting
pub struct Hooks<G> {
    hooks: Vec<Hook<G>>,
}

impl<G> Hooks<G> {
    pub fn new(hooks: Vec<Hook<G>>) -> Self {
        Self { hooks }
    }

    pub fn push(&mut self, hook: Hook<G>) {
        self.hooks.push(hook)
    }

    fn run(&mut self, result: &GenerationResult, best: &Individual<G>) -> ControlFlow<()> {
        for hook in self.hooks.iter_mut() {
            hook(result, best)?;
        }
        ControlFlow::Continue(())
    }
}

impl<G> Default for Hooks<G> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[derive(Serialize)]
struct ArchiveEntry<'a, G> {
    result: &'a GenerationResult,
    best: &'a Individual<G>,
}

fn write_pretty(path: &Path, value: &impl Serialize) -> Result<(), HarnessError> {
    fs::write(path, serde_json::to_string_pretty(value)? + "\n")?;
    Ok(())
}

/// Drives a [Controller] through a run against one [ScoringFunction]
pub struct Driver<C, S>
where
    C: Controller<S>,
    S: ScoringFunction,
{
    controller: C,
    scoring: S,
    descriptor: EncodingDescriptor,
    generations: usize,
    stop_on_winner: bool,
    export: Option<Export>,
    archive: Option<PathBuf>,
    hooks: Hooks<C::Genome>,
}

impl<C, S> Driver<C, S>
where
    C: Controller<S>,
    S: ScoringFunction,
{
    pub fn new(controller: C, scoring: S, descriptor: EncodingDescriptor) -> Self {
        Self {
            controller,
            scoring,
            descriptor,
            generations: GAUNTLET_GENERATIONS,
            stop_on_winner: true,
            export: Some(Export::Stdout),
            archive: None,
            hooks: Hooks::default(),
        }
    }

    /// Most generations to assess
    pub fn generations(mut self, generations: usize) -> Self {
        self.generations = generations;
        self
    }

    /// When false, a winning generation's champion is exported and evolution goes on
    pub fn stop_on_winner(mut self, stop: bool) -> Self {
        self.stop_on_winner = stop;
        self
    }

    pub fn export(mut self, export: Option<Export>) -> Self {
        self.export = export;
        self
    }

    /// Keep every generation's result and champion in `dir`
    pub fn archive(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive = Some(dir.into());
        self
    }

    pub fn hooks(mut self, hooks: Hooks<C::Genome>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn hook(mut self, hook: Hook<C::Genome>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    fn abort(&self, generation: usize, err: HarnessError) -> HarnessError {
        let fitness = self.controller.fitness();
        error!(generation, fitness, %err, "run aborted");
        HarnessError::RunAborted {
            generation,
            fitness,
            source: Box::new(err),
        }
    }

    pub fn run(mut self) -> Result<RunOutcome<C::Genome>, HarnessError> {
        self.controller
            .init(self.descriptor.clone())
            .and_then(|()| self.controller.create_first_generation())
            .map_err(|err| self.abort(0, err))?;
        if let Some(dir) = &self.archive {
            fs::create_dir_all(dir)
                .map_err(HarnessError::from)
                .and_then(|()| write_pretty(&dir.join("encoding.json"), &self.descriptor))
                .map_err(|err| self.abort(0, err))?;
        }

        let mut history = Vec::new();
        let mut winner = None;
        for _ in 0..self.generations {
            let generation = self.controller.generation_num();
            match self.generation(generation, &mut history, &mut winner) {
                Ok(ControlFlow::Continue(())) => (),
                Ok(ControlFlow::Break(())) => break,
                Err(err) => return Err(self.abort(generation, err)),
            }
        }

        Ok(RunOutcome {
            generations: history.len(),
            winner,
            history,
        })
    }

    fn generation(
        &mut self,
        generation: usize,
        history: &mut Vec<GenerationResult>,
        winner: &mut Option<WinnerRecord<C::Genome>>,
    ) -> Result<ControlFlow<()>, HarnessError> {
        let found = self.controller.assess_generation(&self.scoring)?;
        let best = self.controller.best_individual().ok_or_else(|| {
            HarnessError::Controller("assessed generation has no best individual".into())
        })?;
        let result = GenerationResult {
            generation,
            fitness: self.controller.fitness(),
            best_fitness: best.fitness,
            winner_found: found,
        };
        info!("Gen {}: {:.2}, {:.1}", generation, result.fitness, result.best_fitness);

        if let Some(dir) = &self.archive {
            write_pretty(
                &dir.join(format!("G{generation:05}.json")),
                &ArchiveEntry {
                    result: &result,
                    best,
                },
            )?;
        }
        history.push(result.clone());

        if self.hooks.run(&result, best).is_break() {
            info!(generation, "stopped by hook");
            return Ok(ControlFlow::Break(()));
        }

        if found {
            let record = WinnerRecord {
                generation,
                fitness: best.fitness,
                genome: best.genome.clone(),
            };
            if let Some(export) = &self.export {
                export.write(&record)?;
            }
            info!(generation, fitness = record.fitness, "winner found");
            *winner = Some(record);
            if self.stop_on_winner {
                return Ok(ControlFlow::Break(()));
            }
        }

        self.controller.next_generation()?;
        Ok(ControlFlow::Continue(()))
    }
}
