use super::{Action, Environment, Observation, Seeded, Space, Transition};
use crate::{error::EnvError, random::WyRng};
use rand::Rng;

const MIN_POSITION: f64 = -1.2;
const MAX_POSITION: f64 = 0.6;
const MAX_SPEED: f64 = 0.07;
const GOAL_POSITION: f64 = 0.45;
const POWER: f64 = 0.0015;
const MAX_STEPS: usize = 999;

/// Drive an underpowered car out of a valley with a continuous throttle in `[-1, 1]`.
/// Reaching the flag is worth 100, and every step costs `0.1 * throttle²`.
///
/// Observation is `[position, velocity]`
#[derive(Debug, Clone)]
pub struct MountainCar {
    seed: u64,
    position: f64,
    velocity: f64,
    steps: usize,
    done: bool,
}

impl MountainCar {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            position: 0.,
            velocity: 0.,
            steps: 0,
            done: true,
        }
    }

    fn observation(&self) -> Observation {
        Observation::vector(vec![self.position, self.velocity])
    }
}

impl Seeded for MountainCar {
    fn seeded(seed: u64) -> Self {
        Self::new(seed)
    }
}

impl Environment for MountainCar {
    fn observation_space(&self) -> Space {
        Space::Continuous {
            shape: vec![2],
            low: MIN_POSITION,
            high: MAX_POSITION,
        }
    }

    fn action_space(&self) -> Space {
        Space::Continuous {
            shape: vec![1],
            low: -1.,
            high: 1.,
        }
    }

    fn reset(&mut self) -> Result<Observation, EnvError> {
        self.position = WyRng::seeded(self.seed).random_range(-0.6..-0.4);
        self.velocity = 0.;
        self.steps = 0;
        self.done = false;
        Ok(self.observation())
    }

    fn step(&mut self, action: &Action) -> Result<Transition, EnvError> {
        if self.done {
            return Err(EnvError::Episode(
                "mountain car stepped after its episode ended".into(),
            ));
        }
        let throttle = match action {
            Action::Continuous(v) if v.len() == 1 && !v[0].is_nan() => v[0].clamp(-1., 1.),
            other => {
                return Err(EnvError::Episode(format!(
                    "invalid mountain car action {other:?}"
                )))
            }
        };

        self.velocity = (self.velocity + throttle * POWER - 0.0025 * (3. * self.position).cos())
            .clamp(-MAX_SPEED, MAX_SPEED);
        self.position = (self.position + self.velocity).clamp(MIN_POSITION, MAX_POSITION);
        if self.position == MIN_POSITION && self.velocity < 0. {
            self.velocity = 0.;
        }
        self.steps += 1;

        let reached = self.position >= GOAL_POSITION && self.velocity >= 0.;
        self.done = reached || self.steps >= MAX_STEPS;

        Ok(Transition {
            observation: self.observation(),
            reward: (if reached { 100. } else { 0. }) - 0.1 * throttle * throttle,
            done: self.done,
        })
    }

    fn reward_threshold(&self) -> Option<f64> {
        Some(90.)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_f64_approx;

    #[test]
    fn test_idle_costs_nothing() {
        let mut env = MountainCar::new(4);
        env.reset().unwrap();
        for _ in 0..100 {
            let t = env.step(&Action::Continuous(vec![0.])).unwrap();
            assert_f64_approx!(t.reward, 0.);
            assert!(!t.done);
        }
    }

    #[test]
    fn test_rocking_reaches_goal() {
        let mut env = MountainCar::new(4);
        env.reset().unwrap();
        let mut total = 0.;
        let mut velocity = 0.;
        for _ in 0..MAX_STEPS {
            // push along the direction of travel
            let throttle = if velocity >= 0. { 1. } else { -1. };
            let t = env.step(&Action::Continuous(vec![throttle])).unwrap();
            total += t.reward;
            velocity = t.observation.as_slice()[1];
            if t.done {
                break;
            }
        }
        assert!(env.position >= GOAL_POSITION);
        assert!(total > 0., "reached the goal with {total}");
    }

    #[test]
    fn test_invalid_action() {
        let mut env = MountainCar::new(4);
        env.reset().unwrap();
        assert!(env.step(&Action::Discrete(0)).is_err());
        assert!(env.step(&Action::Continuous(vec![f64::NAN])).is_err());
        assert!(env.step(&Action::Continuous(vec![0., 0.])).is_err());
    }
}
