use super::{Controller, Individual};
use crate::{
    assess::Assessor,
    constants::{
        GAUNTLET_CROSSOVER_PROB, GAUNTLET_ELITE, GAUNTLET_FAILURE_TOLERANCE, GAUNTLET_MUTATE_PROB,
        GAUNTLET_PARAM_MAX, GAUNTLET_PARAM_MIN, GAUNTLET_PERTURB_STD, GAUNTLET_POPULATION,
        GAUNTLET_PRECISION, GAUNTLET_REPLACE_PROB, GAUNTLET_SURVIVAL, GAUNTLET_WORKERS,
        GAUNTLET_WORST_SCORE,
    },
    encoding::EncodingDescriptor,
    error::HarnessError,
    network::{Ctrnn, DenseGenome},
    random::WyRng,
    scoring::ScoringFunction,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Knobs of the reference controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub population: usize,
    /// Hidden layer sizes, for encodings that don't declare their own
    pub hidden: Vec<usize>,
    pub seed: u64,
    /// Best individuals carried over unchanged
    pub elite: usize,
    /// Fraction of a generation allowed to breed
    pub survival: f64,
    /// Probability a child is bred by crossover rather than copied
    pub crossover: f64,
    /// Probability any one parameter is mutated
    pub mutate: f64,
    /// Deviation of a parameter perturbation
    pub perturb: f64,
    /// Probability a mutated parameter is replaced instead of perturbed
    pub replace: f64,
    pub precision: usize,
    pub workers: usize,
    pub failure_tolerance: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            population: GAUNTLET_POPULATION,
            hidden: Vec::new(),
            seed: 0,
            elite: GAUNTLET_ELITE,
            survival: GAUNTLET_SURVIVAL,
            crossover: GAUNTLET_CROSSOVER_PROB,
            mutate: GAUNTLET_MUTATE_PROB,
            perturb: GAUNTLET_PERTURB_STD,
            replace: GAUNTLET_REPLACE_PROB,
            precision: GAUNTLET_PRECISION,
            workers: GAUNTLET_WORKERS,
            failure_tolerance: GAUNTLET_FAILURE_TOLERANCE,
        }
    }
}

/// A small in-process controller: fixed topology dense networks, truncation selection with
/// elitism, uniform crossover and gaussian mutation
pub struct LocalController<S: ScoringFunction> {
    config: ControllerConfig,
    rng: WyRng,
    assessor: Option<Assessor<S::Instance>>,
    population: Vec<Individual<DenseGenome>>,
    best: Option<usize>,
    fitness: f64,
    generation: usize,
}

impl<S: ScoringFunction> LocalController<S>
where
    S::Instance: Send,
{
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            rng: WyRng::seeded(config.seed),
            config,
            assessor: None,
            population: Vec::new(),
            best: None,
            fitness: GAUNTLET_WORST_SCORE,
            generation: 0,
        }
    }

    #[inline]
    pub fn population(&self) -> &[Individual<DenseGenome>] {
        &self.population
    }

    fn descriptor(&self) -> Result<&EncodingDescriptor, HarnessError> {
        self.assessor
            .as_ref()
            .map(|a| a.descriptor())
            .ok_or_else(|| HarnessError::Controller("not initialized".into()))
    }

    fn layers(&self) -> Result<Vec<usize>, HarnessError> {
        let mut layers = self.descriptor()?.layer_sizes();
        if layers.len() == 2 {
            layers.splice(1..1, self.config.hidden.iter().copied());
        }
        Ok(layers)
    }

    fn network(&self, genome: &DenseGenome) -> Ctrnn {
        let mut network = genome.network();
        network.precision = self.config.precision.max(1);
        network
    }

    /// Population indices, best first. Ties keep population order
    fn ranked(&self) -> Vec<usize> {
        let mut ranked = (0..self.population.len()).collect::<Vec<_>>();
        ranked.sort_by(|l, r| {
            self.population[*r]
                .fitness
                .total_cmp(&self.population[*l].fitness)
        });
        ranked
    }

    fn breed(&mut self, parents: &[DenseGenome]) -> DenseGenome {
        let l = &parents[self.rng.random_range(0..parents.len())];
        let mut child = if self.rng.random_bool(self.config.crossover.clamp(0., 1.)) {
            let r = &parents[self.rng.random_range(0..parents.len())];
            l.crossover(r, &mut self.rng)
        } else {
            l.clone()
        };
        child.mutate(
            &mut self.rng,
            self.config.mutate,
            self.config.replace,
            self.config.perturb,
            (GAUNTLET_PARAM_MIN, GAUNTLET_PARAM_MAX),
        );
        child
    }
}

impl<S: ScoringFunction> Controller<S> for LocalController<S>
where
    S::Instance: Send,
{
    type Genome = DenseGenome;

    fn init(&mut self, descriptor: EncodingDescriptor) -> Result<(), HarnessError> {
        if self.assessor.is_some() {
            return Err(HarnessError::Controller(
                "already initialized, the encoding of a run can't change".into(),
            ));
        }
        if self.config.population == 0 {
            return Err(HarnessError::Config("population must not be empty".into()));
        }
        descriptor.validate()?;
        self.assessor = Some(
            Assessor::new(descriptor)
                .workers(self.config.workers)
                .failure_tolerance(self.config.failure_tolerance),
        );
        Ok(())
    }

    fn create_first_generation(&mut self) -> Result<(), HarnessError> {
        let layers = self.layers()?;
        debug!(?layers, population = self.config.population, "first generation");
        self.population = (0..self.config.population)
            .map(|_| Individual {
                genome: DenseGenome::random(&layers, &mut self.rng),
                fitness: GAUNTLET_WORST_SCORE,
                winner: false,
            })
            .collect();
        self.generation = 0;
        self.best = None;
        Ok(())
    }

    fn assess_generation(&mut self, scoring: &S) -> Result<bool, HarnessError> {
        if self.population.is_empty() {
            return Err(HarnessError::Controller(
                "no generation to assess, create the first one".into(),
            ));
        }
        let mut networks = self
            .population
            .iter()
            .map(|i| self.network(&i.genome))
            .collect::<Vec<_>>();
        let assessor = self
            .assessor
            .as_mut()
            .ok_or_else(|| HarnessError::Controller("not initialized".into()))?;
        let result = assessor.assess(scoring, self.generation, &mut networks)?;

        for (individual, assessment) in self.population.iter_mut().zip(&result.assessments) {
            individual.fitness = assessment.score;
            individual.winner = assessment.winner;
        }
        self.fitness = result.fitness;
        self.best = result.best();
        Ok(result.winner)
    }

    fn next_generation(&mut self) -> Result<(), HarnessError> {
        if self.best.is_none() {
            return Err(HarnessError::Controller(
                "can't breed a generation that wasn't assessed".into(),
            ));
        }
        let size = self.population.len();
        let ranked = self.ranked();
        let survivors = ((self.config.survival * size as f64).ceil() as usize).clamp(1, size);
        let parents = ranked[..survivors]
            .iter()
            .map(|idx| self.population[*idx].genome.clone())
            .collect::<Vec<_>>();

        let mut next = ranked
            .iter()
            .take(self.config.elite.min(size))
            .map(|idx| self.population[*idx].genome.clone())
            .collect::<Vec<_>>();
        while next.len() < size {
            let child = self.breed(&parents);
            next.push(child);
        }

        self.population = next
            .into_iter()
            .map(|genome| Individual {
                genome,
                fitness: GAUNTLET_WORST_SCORE,
                winner: false,
            })
            .collect();
        self.best = None;
        self.generation += 1;
        Ok(())
    }

    fn best_individual(&self) -> Option<&Individual<DenseGenome>> {
        self.best.and_then(|idx| self.population.get(idx))
    }

    fn fitness(&self) -> f64 {
        self.fitness
    }

    fn generation_num(&self) -> usize {
        self.generation
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scoring::XorScoring;

    fn config() -> ControllerConfig {
        ControllerConfig {
            population: 20,
            hidden: vec![3],
            seed: 7,
            ..Default::default()
        }
    }

    fn xor_controller() -> LocalController<XorScoring> {
        let mut c = LocalController::new(config());
        c.init(EncodingDescriptor::flat(3, 1).unwrap()).unwrap();
        c.create_first_generation().unwrap();
        c
    }

    #[test]
    fn test_init_once() {
        let mut c = LocalController::<XorScoring>::new(config());
        assert!(c.create_first_generation().is_err());
        c.init(EncodingDescriptor::flat(3, 1).unwrap()).unwrap();
        assert!(matches!(
            c.init(EncodingDescriptor::flat(3, 2).unwrap()),
            Err(HarnessError::Controller(_))
        ));
    }

    #[test]
    fn test_topology() {
        let c = xor_controller();
        assert_eq!(c.population().len(), 20);
        assert!(c.population().iter().all(|i| i.genome.layers == vec![3, 3, 1]));
        assert!(c.best_individual().is_none());
        assert_eq!(c.generation_num(), 0);

        let mut layered = LocalController::<XorScoring>::new(config());
        layered
            .init(
                EncodingDescriptor::substrate()
                    .inputs([3])
                    .add_layer([2, 2])
                    .outputs([1])
                    .build()
                    .unwrap(),
            )
            .unwrap();
        layered.create_first_generation().unwrap();
        assert_eq!(layered.population()[0].genome.layers, vec![3, 4, 1]);
    }

    #[test]
    fn test_order_of_operations() {
        let scoring = XorScoring::new(1);
        let mut c = xor_controller();
        assert!(c.next_generation().is_err());
        c.assess_generation(&scoring).unwrap();
        c.next_generation().unwrap();
        assert!(c.next_generation().is_err());
        assert_eq!(c.generation_num(), 1);
    }

    #[test]
    fn test_assess_and_breed() {
        let scoring = XorScoring::new(1);
        let mut c = xor_controller();
        c.assess_generation(&scoring).unwrap();
        assert!(c.population().iter().all(|i| i.fitness > 0.));

        let best = c.best_individual().unwrap().clone();
        assert!(c.population().iter().all(|i| i.fitness <= best.fitness));
        let mean = c.population().iter().map(|i| i.fitness).sum::<f64>() / 20.;
        assert!((c.fitness() - mean).abs() < 1e-9);

        c.next_generation().unwrap();
        assert_eq!(c.population().len(), 20);
        assert_eq!(c.population()[0].genome, best.genome);
        assert_eq!(c.generation_num(), 1);
    }

    #[test]
    fn test_elite_never_regresses() {
        let scoring = XorScoring::new(3);
        let mut c = xor_controller();
        let mut last = f64::MIN;
        for _ in 0..15 {
            c.assess_generation(&scoring).unwrap();
            let best = c.best_individual().unwrap().fitness;
            assert!(best >= last - 1e-9, "best fell from {last} to {best}");
            last = best;
            c.next_generation().unwrap();
        }
    }

    #[test]
    fn test_seeded_replays() {
        let run = || {
            let scoring = XorScoring::new(3);
            let mut c = xor_controller();
            (0..5)
                .map(|_| {
                    c.assess_generation(&scoring).unwrap();
                    let f = c.fitness();
                    c.next_generation().unwrap();
                    f
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
