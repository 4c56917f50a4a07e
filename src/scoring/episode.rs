use super::{Input, ScoringFunction, ScoringInstance};
use crate::{
    constants::{GAUNTLET_DEFAULT_THRESHOLD, GAUNTLET_STEP_CAP},
    encoding::EncodingDescriptor,
    environment::{Action, ActionMap, Environment, Seeded},
    error::{EnvError, HarnessError},
};
use core::{fmt, num::NonZeroUsize, time::Duration};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};
use tracing::debug;

/// Source of time for real-time episodes
pub trait Clock: fmt::Debug + Send + Sync {
    /// Time elapsed since some fixed origin
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to. Clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.0.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone)]
struct RealTime {
    tick: Duration,
    clock: Arc<dyn Clock>,
}

impl RealTime {
    /// Whole ticks between `since` and now
    fn missed(&self, since: Duration) -> usize {
        let late = self.clock.now().saturating_sub(since);
        (late.as_nanos() / self.tick.as_nanos().max(1)) as usize
    }
}

/// Scores an individual by the reward it collects over one episode of an [Environment].
///
/// Every instance builds its own environment from `factory` with the same seed, so two
/// instances fed the same outputs score the same. Episodes end when the environment says so or
/// after `step_cap` steps, whichever is first, and win when their reward reaches the threshold.
pub struct EpisodeScoring<F> {
    factory: F,
    seed: u64,
    action_map: Option<ActionMap>,
    step_cap: usize,
    threshold: Option<f64>,
    max_threads: NonZeroUsize,
    flush_between: bool,
    realtime: Option<RealTime>,
}

/// An [EpisodeScoring] over an environment built by [Seeded::seeded]
pub type SeededScoring<E> = EpisodeScoring<fn(u64) -> Result<E, EnvError>>;

fn build_seeded<E: Seeded>(seed: u64) -> Result<E, EnvError> {
    Ok(E::seeded(seed))
}

impl<E: Seeded> SeededScoring<E> {
    pub fn seeded(seed: u64) -> Self {
        EpisodeScoring::new(build_seeded::<E> as fn(u64) -> Result<E, EnvError>).seed(seed)
    }
}

impl<F> EpisodeScoring<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            seed: 0,
            action_map: None,
            step_cap: GAUNTLET_STEP_CAP,
            threshold: None,
            max_threads: NonZeroUsize::MIN,
            flush_between: true,
            realtime: None,
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Override the conventional [ActionMap::for_space] of the environment's action space
    pub fn action_map(mut self, map: ActionMap) -> Self {
        self.action_map = Some(map);
        self
    }

    pub fn step_cap(mut self, cap: usize) -> Self {
        self.step_cap = cap.max(1);
        self
    }

    /// Override the environment's own reward threshold
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn threads(mut self, threads: NonZeroUsize) -> Self {
        self.max_threads = threads;
        self
    }

    pub fn flush(mut self, flush: bool) -> Self {
        self.flush_between = flush;
        self
    }

    /// Keep the environment ticking every `tick` of `clock` whether or not an output arrived
    pub fn realtime(mut self, tick: Duration, clock: Arc<dyn Clock>) -> Self {
        self.realtime = Some(RealTime { tick, clock });
        self
    }
}

impl<E, F> EpisodeScoring<F>
where
    E: Environment,
    F: Fn(u64) -> Result<E, EnvError>,
{
    /// The topology a network needs to play this environment. Multi-dimensional observations
    /// are described as a substrate, vectors as a flat encoding
    pub fn descriptor(&self) -> Result<EncodingDescriptor, HarnessError> {
        let env = (self.factory)(self.seed)
            .map_err(|err| HarnessError::Config(format!("probing environment: {err}")))?;
        let observation = env.observation_space();
        let action = env.action_space();
        let outputs = self
            .action_map
            .clone()
            .unwrap_or_else(|| ActionMap::for_space(&action))
            .arity(&action);

        let shape = observation.shape();
        Ok(if shape.len() > 1 {
            EncodingDescriptor::substrate()
                .inputs(shape)
                .outputs([outputs])
                .build()?
        } else {
            EncodingDescriptor::flat(observation.len(), outputs)?
        })
    }
}

impl<E, F> ScoringFunction for EpisodeScoring<F>
where
    E: Environment,
    F: Fn(u64) -> Result<E, EnvError> + Sync,
{
    type Instance = EpisodeInstance<E>;

    fn create_new(&self) -> Result<Self::Instance, EnvError> {
        let env = (self.factory)(self.seed)?;
        let map = self
            .action_map
            .clone()
            .unwrap_or_else(|| ActionMap::for_space(&env.action_space()));
        let threshold = self
            .threshold
            .or_else(|| env.reward_threshold())
            .unwrap_or(GAUNTLET_DEFAULT_THRESHOLD);

        let mut instance = EpisodeInstance {
            env,
            map,
            step_cap: self.step_cap,
            threshold,
            realtime: self.realtime.clone(),
            pending: Vec::new(),
            score: 0.,
            steps: 0,
            done: false,
            last_action: None,
            issued: None,
            episodes: 0,
        };
        instance.begin()?;
        Ok(instance)
    }

    fn max_threads(&self) -> NonZeroUsize {
        self.max_threads
    }

    fn flush_between(&self) -> bool {
        self.flush_between
    }

    fn real_time_processing(&self) -> bool {
        self.realtime.is_some()
    }
}

/// One episode of one environment, owned outright
#[derive(Debug)]
pub struct EpisodeInstance<E> {
    env: E,
    map: ActionMap,
    step_cap: usize,
    threshold: f64,
    realtime: Option<RealTime>,
    pending: Vec<f64>,
    score: f64,
    steps: usize,
    done: bool,
    last_action: Option<Action>,
    issued: Option<Duration>,
    episodes: usize,
}

impl<E: Environment> EpisodeInstance<E> {
    #[inline]
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Environment steps taken this episode, missed ticks included
    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Episodes begun by this instance, which survive [ScoringInstance::restart]
    #[inline]
    pub fn episodes(&self) -> usize {
        self.episodes
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn begin(&mut self) -> Result<(), EnvError> {
        self.pending = self.env.reset()?.flatten();
        self.score = 0.;
        self.steps = 0;
        self.done = false;
        self.last_action = None;
        self.issued = None;
        self.episodes += 1;
        Ok(())
    }

    fn advance(&mut self, action: &Action) -> Result<(), EnvError> {
        let transition = self.env.step(action)?;
        self.score += transition.reward;
        self.steps += 1;
        self.pending = transition.observation.flatten();
        if transition.done {
            self.done = true;
        } else if self.steps >= self.step_cap {
            debug!(steps = self.steps, score = self.score, "episode hit its step cap");
            self.done = true;
        }
        Ok(())
    }
}

impl<E: Environment> ScoringInstance for EpisodeInstance<E> {
    fn generate_input(&mut self) -> Result<Input, EnvError> {
        if self.done {
            return Ok(Input::Done);
        }
        if let Some(rt) = &self.realtime {
            self.issued = Some(rt.clock.now());
        }
        Ok(Input::Continue(self.pending.clone()))
    }

    fn accept_output(&mut self, output: &[f64]) -> Result<(), EnvError> {
        if self.done {
            return Err(EnvError::Episode("output given to a finished episode".into()));
        }
        let action = self.map.apply(output);

        let missed = match (&self.realtime, self.issued.take()) {
            (Some(rt), Some(issued)) => rt.missed(issued),
            _ => 0,
        };
        if missed > 0 {
            let filler = self.last_action.clone().unwrap_or_else(|| action.clone());
            for _ in 0..missed {
                self.advance(&filler)?;
                if self.done {
                    return Ok(());
                }
            }
        }

        self.advance(&action)?;
        self.last_action = Some(action);
        Ok(())
    }

    fn score(&self) -> f64 {
        self.score
    }

    fn is_winner(&self) -> bool {
        self.done && self.score >= self.threshold
    }

    fn restart(&mut self) -> Result<(), EnvError> {
        self.begin()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        environment::{CartPole, Catch, Observation, Space, Transition},
        scoring::{Checked, Processing},
    };

    /// One reward per step for `len` steps, recording every action it's given
    #[derive(Debug)]
    struct Tally {
        len: usize,
        at: usize,
        actions: Vec<usize>,
    }

    impl Environment for Tally {
        fn observation_space(&self) -> Space {
            Space::Continuous {
                shape: vec![1],
                low: 0.,
                high: f64::MAX,
            }
        }

        fn action_space(&self) -> Space {
            Space::Discrete(2)
        }

        fn reset(&mut self) -> Result<Observation, EnvError> {
            self.at = 0;
            self.actions.clear();
            Ok(Observation::vector(vec![0.]))
        }

        fn step(&mut self, action: &Action) -> Result<Transition, EnvError> {
            let Action::Discrete(a) = action else {
                return Err(EnvError::Episode("tally is discrete".into()));
            };
            self.at += 1;
            self.actions.push(*a);
            Ok(Transition {
                observation: Observation::vector(vec![self.at as f64]),
                reward: 1.,
                done: self.at >= self.len,
            })
        }

        fn reward_threshold(&self) -> Option<f64> {
            Some(self.len as f64)
        }
    }

    fn tally(len: usize) -> EpisodeScoring<impl Fn(u64) -> Result<Tally, EnvError> + Sync> {
        EpisodeScoring::new(move |_: u64| {
            Ok::<_, EnvError>(Tally {
                len,
                at: 0,
                actions: Vec::new(),
            })
        })
    }

    fn play<I: ScoringInstance>(instance: &mut I, outputs: &[[f64; 2]]) {
        let mut outputs = outputs.iter().cycle();
        while let Input::Continue(_) = instance.generate_input().unwrap() {
            instance.accept_output(outputs.next().unwrap()).unwrap();
        }
    }

    #[test]
    fn test_deterministic_episode() {
        let scoring = SeededScoring::<CartPole>::seeded(17);
        let outputs = [[0.9, 0.1], [0.2, 0.8], [0.1, 0.9], [0.7, 0.3]];

        let mut l = scoring.create_new().unwrap();
        let mut r = scoring.create_new().unwrap();
        play(&mut l, &outputs);
        play(&mut r, &outputs);
        assert!(l.steps() > 0);
        assert_eq!(l.score(), r.score());
        assert_eq!(l.steps(), r.steps());

        l.restart().unwrap();
        play(&mut l, &outputs);
        assert_eq!(l.score(), r.score());
    }

    #[test]
    fn test_step_cap() {
        let scoring = tally(100).step_cap(10);
        let mut instance = scoring.create_new().unwrap();
        play(&mut instance, &[[1., 0.]]);
        assert_eq!(instance.steps(), 10);
        assert_eq!(instance.score(), 10.);
        assert!(!instance.is_winner());
        assert_eq!(instance.generate_input().unwrap(), Input::Done);
        assert!(instance.accept_output(&[1., 0.]).is_err());
    }

    #[test]
    fn test_winner_threshold() {
        let mut instance = tally(5).create_new().unwrap();
        assert_eq!(instance.threshold(), 5.);
        instance.generate_input().unwrap();
        instance.accept_output(&[0., 1.]).unwrap();
        assert!(!instance.is_winner());
        play(&mut instance, &[[0., 1.]]);
        assert!(instance.is_winner());

        let mut instance = tally(5).threshold(6.).create_new().unwrap();
        play(&mut instance, &[[0., 1.]]);
        assert_eq!(instance.score(), 5.);
        assert!(!instance.is_winner());
    }

    #[test]
    fn test_restart_keeps_resources() {
        let scoring = tally(3).flush(false);
        assert!(!scoring.flush_between());
        let mut instance = scoring.create_new().unwrap();
        play(&mut instance, &[[1., 0.]]);
        assert_eq!(instance.episodes(), 1);

        instance.restart().unwrap();
        assert_eq!(instance.episodes(), 2);
        assert_eq!(instance.score(), 0.);
        assert_eq!(instance.steps(), 0);
        assert!(!instance.is_winner());
    }

    #[test]
    fn test_realtime_missed_ticks() {
        let clock = ManualClock::new();
        let tick = Duration::from_millis(10);
        let scoring = tally(100).realtime(tick, Arc::new(clock.clone()));
        assert_eq!(scoring.processing(), Processing::RealTime);
        let mut instance = scoring.create_new().unwrap();

        // answering within a tick costs nothing
        instance.generate_input().unwrap();
        clock.advance(Duration::from_millis(4));
        instance.accept_output(&[0., 1.]).unwrap();
        assert_eq!(instance.env().actions, vec![1]);

        // two and a half ticks late: the last action is held for two ticks
        instance.generate_input().unwrap();
        clock.advance(Duration::from_millis(25));
        instance.accept_output(&[1., 0.]).unwrap();
        assert_eq!(instance.env().actions, vec![1, 1, 1, 0]);
        assert_eq!(instance.steps(), 4);
        assert_eq!(instance.score(), 4.);
    }

    #[test]
    fn test_realtime_first_step_uses_new_action() {
        let clock = ManualClock::new();
        let scoring = tally(100).realtime(Duration::from_millis(10), Arc::new(clock.clone()));
        let mut instance = scoring.create_new().unwrap();
        instance.generate_input().unwrap();
        clock.advance(Duration::from_millis(20));
        instance.accept_output(&[1., 0.]).unwrap();
        assert_eq!(instance.env().actions, vec![0, 0, 0]);
    }

    #[test]
    fn test_realtime_late_action_discarded() {
        let clock = ManualClock::new();
        let scoring = tally(3).realtime(Duration::from_millis(10), Arc::new(clock.clone()));
        let mut instance = scoring.create_new().unwrap();
        instance.generate_input().unwrap();
        instance.accept_output(&[1., 0.]).unwrap();

        instance.generate_input().unwrap();
        clock.advance(Duration::from_millis(50));
        instance.accept_output(&[0., 1.]).unwrap();
        assert_eq!(instance.env().actions, vec![0, 0, 0]);
        assert_eq!(instance.generate_input().unwrap(), Input::Done);
        assert!(instance.is_winner());
    }

    #[test]
    fn test_descriptor() {
        let d = SeededScoring::<CartPole>::seeded(0).descriptor().unwrap();
        assert_eq!(d, EncodingDescriptor::flat(4, 2).unwrap());

        let d = SeededScoring::<Catch>::seeded(0).descriptor().unwrap();
        assert!(matches!(d, EncodingDescriptor::Layered { .. }));
        assert_eq!(d.layer_sizes(), vec![80, 3]);
    }

    #[test]
    fn test_arity_matches_descriptor() {
        let scoring = SeededScoring::<Catch>::seeded(3);
        let d = scoring.descriptor().unwrap();
        let mut checked = Checked::new(scoring.create_new().unwrap(), &d);
        checked.run(|input| {
            assert_eq!(input.len(), 80);
            vec![0., 1., 0.]
        })
        .unwrap();
        // seven rows to fall, five balls
        assert_eq!(checked.inputs(), 35);
        assert_eq!(checked.inputs(), checked.outputs());
        assert!(checked.assessment().unwrap().score <= 5.);
    }
}
