//! Assessment of one generation against a [ScoringFunction]: instance lifecycle, the thread cap
//! the scoring function advertises, and what to do when individuals fail.

use crate::{
    constants::{GAUNTLET_FAILURE_TOLERANCE, GAUNTLET_WORKERS, GAUNTLET_WORST_SCORE},
    encoding::EncodingDescriptor,
    error::{EnvError, EpisodeError, HarnessError},
    scoring::{Checked, Processing, ScoringFunction, ScoringInstance},
};
use fxhash::FxHashMap;
use tracing::{debug, error, warn};

/// Verdict on one individual's episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub score: f64,
    pub winner: bool,
    /// The episode ended in an environment failure, and `score` is the worst possible
    pub failed: bool,
    /// Input/output pairs exchanged before the episode ended
    pub exchanges: usize,
}

/// Anything that can turn an input vector into an output vector, as a genome expressed as a
/// network does
pub trait Phenotype: Send {
    fn activate(&mut self, input: &[f64], processing: Processing) -> Vec<f64>;

    /// Drop any state carried over from a previous episode
    fn flush(&mut self) {}
}

impl<F: FnMut(&[f64]) -> Vec<f64> + Send> Phenotype for F {
    fn activate(&mut self, input: &[f64], _: Processing) -> Vec<f64> {
        self(input)
    }
}

/// Every individual's [Assessment], in population order, and the generation's aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationAssessment {
    pub assessments: Vec<Assessment>,
    /// Mean score of the individuals who didn't fail
    pub fitness: f64,
    pub winner: bool,
    pub failed: usize,
}

impl GenerationAssessment {
    fn new(assessments: Vec<Assessment>) -> Self {
        let (sum, done) = assessments
            .iter()
            .filter(|a| !a.failed)
            .fold((0., 0), |(sum, n), a| (sum + a.score, n + 1));
        Self {
            fitness: if done == 0 {
                GAUNTLET_WORST_SCORE
            } else {
                sum / done as f64
            },
            winner: assessments.iter().any(|a| a.winner),
            failed: assessments.len() - done,
            assessments,
        }
    }

    /// Index of the highest scoring individual, the first of them on ties
    pub fn best(&self) -> Option<usize> {
        self.assessments
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (idx, a)| match best {
                Some((_, score)) if score >= a.score => best,
                _ => Some((idx, a.score)),
            })
            .map(|(idx, _)| idx)
    }
}

struct Outcome<I> {
    assessment: Assessment,
    instance: Option<Checked<I>>,
}

/// What every episode of one generation shares
struct Episode<'a, S> {
    scoring: &'a S,
    descriptor: &'a EncodingDescriptor,
    processing: Processing,
    generation: usize,
}

impl<S: ScoringFunction> Episode<'_, S> {
    /// One individual, one episode. A kept instance is restarted, otherwise a fresh one is
    /// made. A failed episode is scored as the worst possible, anything else that goes wrong
    /// ends the generation
    fn evaluate<P: Phenotype>(
        &self,
        individual: usize,
        slot: Option<Checked<S::Instance>>,
        phenotype: &mut P,
    ) -> Result<Outcome<S::Instance>, HarnessError> {
        let (result, instance) = self.run(slot, phenotype);
        match result {
            Ok(assessment) => Ok(Outcome {
                assessment,
                instance,
            }),
            Err(EpisodeError::Env(EnvError::Episode(reason))) => {
                warn!(generation = self.generation, individual, %reason, "episode failed");
                Ok(Outcome {
                    assessment: Assessment::failed(instance.as_ref().map_or(0, |i| i.outputs())),
                    instance,
                })
            }
            Err(err) => {
                error!(generation = self.generation, individual, %err, "aborting assessment");
                Err(HarnessError::episode(self.generation, individual, err))
            }
        }
    }

    fn run<P: Phenotype>(
        &self,
        slot: Option<Checked<S::Instance>>,
        phenotype: &mut P,
    ) -> (Result<Assessment, EpisodeError>, Option<Checked<S::Instance>>) {
        let mut instance = match slot {
            Some(mut instance) => match instance.restart() {
                Ok(()) => instance,
                Err(err) => return (Err(err), None),
            },
            None => match self.scoring.create_new() {
                Ok(instance) => Checked::new(instance, self.descriptor),
                Err(err) => return (Err(err.into()), None),
            },
        };

        phenotype.flush();
        let result = instance
            .run(|input| phenotype.activate(input, self.processing))
            .and_then(|()| Ok(instance.assessment()?));
        (result, Some(instance))
    }
}

/// Runs one episode per individual, honoring [ScoringFunction::max_threads] and
/// [ScoringFunction::flush_between].
///
/// Instances kept alive across generations are held per population slot, and only ever touched
/// by one thread at a time.
pub struct Assessor<I> {
    descriptor: EncodingDescriptor,
    workers: usize,
    failure_tolerance: f64,
    retained: FxHashMap<usize, Checked<I>>,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl<I: ScoringInstance + Send> Assessor<I> {
    pub fn new(descriptor: EncodingDescriptor) -> Self {
        Self {
            descriptor,
            workers: GAUNTLET_WORKERS,
            failure_tolerance: GAUNTLET_FAILURE_TOLERANCE,
            retained: FxHashMap::default(),
            #[cfg(feature = "parallel")]
            pool: None,
        }
    }

    /// Most threads this assessor will ever run, whatever a scoring function allows
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Fraction of a generation allowed to fail before the run is aborted
    pub fn failure_tolerance(mut self, tolerance: f64) -> Self {
        self.failure_tolerance = tolerance.clamp(0., 1.);
        self
    }

    #[inline]
    pub fn descriptor(&self) -> &EncodingDescriptor {
        &self.descriptor
    }

    /// Instances currently kept for reuse in the next generation
    #[inline]
    pub fn retained(&self) -> usize {
        self.retained.len()
    }

    /// Threads a generation of `scoring` is assessed on
    pub fn threads<S: ScoringFunction>(&self, scoring: &S) -> usize {
        if cfg!(feature = "parallel") {
            scoring.max_threads().get().min(self.workers)
        } else {
            1
        }
    }

    pub fn assess<S, P>(
        &mut self,
        scoring: &S,
        generation: usize,
        phenotypes: &mut [P],
    ) -> Result<GenerationAssessment, HarnessError>
    where
        S: ScoringFunction<Instance = I>,
        P: Phenotype,
    {
        let flush = scoring.flush_between();
        let processing = scoring.processing();
        let slots = if flush {
            self.retained.clear();
            (0..phenotypes.len()).map(|_| None).collect::<Vec<_>>()
        } else {
            let slots = (0..phenotypes.len())
                .map(|idx| self.retained.remove(&idx))
                .collect::<Vec<_>>();
            self.retained.clear();
            slots
        };

        let threads = self.threads(scoring);
        debug!(
            generation,
            population = phenotypes.len(),
            threads,
            flush,
            ?processing,
            "assessing generation"
        );

        let descriptor = self.descriptor.clone();
        let episode = Episode {
            scoring,
            descriptor: &descriptor,
            processing,
            generation,
        };

        // the first error stops any episode not yet started
        let outcomes: Vec<Outcome<I>> = match threads {
            #[cfg(feature = "parallel")]
            2.. => self.assess_parallel(threads, slots, phenotypes, &episode)?,
            _ => slots
                .into_iter()
                .zip(phenotypes.iter_mut())
                .enumerate()
                .map(|(idx, (slot, phenotype))| episode.evaluate(idx, slot, phenotype))
                .collect::<Result<_, _>>()?,
        };

        let mut assessments = Vec::with_capacity(outcomes.len());
        for (idx, outcome) in outcomes.into_iter().enumerate() {
            if let (false, Some(instance)) = (flush, outcome.instance) {
                self.retained.insert(idx, instance);
            }
            assessments.push(outcome.assessment);
        }

        let result = GenerationAssessment::new(assessments);
        let allowed = (self.failure_tolerance * result.assessments.len() as f64).floor() as usize;
        if result.failed > allowed {
            error!(generation, failed = result.failed, allowed, "too many failures");
            return Err(HarnessError::TooManyFailures {
                generation,
                failed: result.failed,
                population: result.assessments.len(),
            });
        }

        debug!(
            generation,
            fitness = result.fitness,
            failed = result.failed,
            winner = result.winner,
            "generation assessed"
        );
        Ok(result)
    }

    #[cfg(feature = "parallel")]
    fn assess_parallel<S, P>(
        &mut self,
        threads: usize,
        slots: Vec<Option<Checked<I>>>,
        phenotypes: &mut [P],
        episode: &Episode<'_, S>,
    ) -> Result<Vec<Outcome<I>>, HarnessError>
    where
        S: ScoringFunction<Instance = I>,
        P: Phenotype,
    {
        use rayon::prelude::*;

        let pool = match self.pool.take() {
            Some(pool) if pool.current_num_threads() == threads => pool,
            _ => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|idx| format!("assess-{idx}"))
                .build()
                .map_err(|err| HarnessError::Pool(err.to_string()))?,
        };

        let outcomes = pool.install(|| {
            slots
                .into_par_iter()
                .zip(phenotypes.par_iter_mut())
                .enumerate()
                .map(|(idx, (slot, phenotype))| episode.evaluate(idx, slot, phenotype))
                .collect::<Result<Vec<_>, _>>()
        });
        self.pool = Some(pool);
        outcomes
    }
}
