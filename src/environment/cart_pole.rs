use super::{Action, Environment, Observation, Seeded, Space, Transition};
use crate::{error::EnvError, random::WyRng};
use rand::Rng;

const GRAVITY: f64 = 9.8;
const MASS_CART: f64 = 1.0;
const MASS_POLE: f64 = 0.1;
const TOTAL_MASS: f64 = MASS_CART + MASS_POLE;
const HALF_LENGTH: f64 = 0.5;
const POLE_MOMENT: f64 = MASS_POLE * HALF_LENGTH;
const FORCE: f64 = 10.0;
const TAU: f64 = 0.02;
const THETA_LIMIT: f64 = 12. * 2. * core::f64::consts::PI / 360.;
const X_LIMIT: f64 = 2.4;
const MAX_STEPS: usize = 500;

/// Balance a pole on a cart by pushing it left or right. One reward per step the pole stays up,
/// for at most 500 steps.
///
/// Observation is `[x, v, θ, ω]`, action is `0` (left) or `1` (right)
#[derive(Debug, Clone)]
pub struct CartPole {
    seed: u64,
    rng: WyRng,
    state: [f64; 4],
    steps: usize,
    done: bool,
}

impl CartPole {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: WyRng::seeded(seed),
            state: [0.; 4],
            steps: 0,
            done: true,
        }
    }

    fn observation(&self) -> Observation {
        Observation::vector(self.state.to_vec())
    }
}

impl Seeded for CartPole {
    fn seeded(seed: u64) -> Self {
        Self::new(seed)
    }
}

impl Environment for CartPole {
    fn observation_space(&self) -> Space {
        Space::Continuous {
            shape: vec![4],
            low: f64::MIN,
            high: f64::MAX,
        }
    }

    fn action_space(&self) -> Space {
        Space::Discrete(2)
    }

    fn reset(&mut self) -> Result<Observation, EnvError> {
        self.rng = WyRng::seeded(self.seed);
        for v in self.state.iter_mut() {
            *v = self.rng.random_range(-0.05..0.05);
        }
        self.steps = 0;
        self.done = false;
        Ok(self.observation())
    }

    fn step(&mut self, action: &Action) -> Result<Transition, EnvError> {
        if self.done {
            return Err(EnvError::Episode(
                "cart pole stepped after its episode ended".into(),
            ));
        }
        let force = match action {
            Action::Discrete(0) => -FORCE,
            Action::Discrete(1) => FORCE,
            other => {
                return Err(EnvError::Episode(format!(
                    "invalid cart pole action {other:?}"
                )))
            }
        };

        let [x, v, θ, ω] = self.state;
        let (sin, cos) = θ.sin_cos();
        let temp = (force + POLE_MOMENT * ω * ω * sin) / TOTAL_MASS;
        let α = (GRAVITY * sin - cos * temp)
            / (HALF_LENGTH * (4. / 3. - MASS_POLE * cos * cos / TOTAL_MASS));
        let a = temp - POLE_MOMENT * α * cos / TOTAL_MASS;

        self.state = [x + TAU * v, v + TAU * a, θ + TAU * ω, ω + TAU * α];
        self.steps += 1;

        let [x, _, θ, _] = self.state;
        let fallen =
            !(-X_LIMIT..=X_LIMIT).contains(&x) || !(-THETA_LIMIT..=THETA_LIMIT).contains(&θ);
        self.done = fallen || self.steps >= MAX_STEPS;

        Ok(Transition {
            observation: self.observation(),
            reward: 1.,
            done: self.done,
        })
    }

    fn reward_threshold(&self) -> Option<f64> {
        Some(475.)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reset_near_upright() {
        let mut env = CartPole::new(1);
        let obs = env.reset().unwrap();
        assert!(obs.as_slice().iter().all(|v| v.abs() < 0.05));
        assert_eq!(env.reset().unwrap(), obs);
    }

    #[test]
    fn test_pushing_one_way_falls() {
        let mut env = CartPole::new(2);
        env.reset().unwrap();
        let mut steps = 0;
        loop {
            let t = env.step(&Action::Discrete(1)).unwrap();
            steps += 1;
            assert_eq!(t.reward, 1.);
            if t.done {
                break;
            }
        }
        assert!(steps < 100, "pole survived {steps} steps of constant pushing");
        assert!(env.step(&Action::Discrete(1)).is_err());
    }

    #[test]
    fn test_invalid_action() {
        let mut env = CartPole::new(3);
        env.reset().unwrap();
        assert!(env.step(&Action::Discrete(2)).is_err());
        assert!(env.step(&Action::Continuous(vec![1.])).is_err());
    }
}
