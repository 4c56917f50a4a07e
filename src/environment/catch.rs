use super::{Action, Environment, Observation, Seeded, Space, Transition};
use crate::{
    constants::{GAUNTLET_CATCH_BALLS, GAUNTLET_CATCH_COLS, GAUNTLET_CATCH_ROWS},
    error::EnvError,
    random::WyRng,
};
use rand::Rng;

/// Catch falling balls with a paddle on the bottom row. The screen is observed as a
/// `[rows, cols, 2]` image whose first channel holds the ball and second the paddle.
///
/// Actions are `0` (left), `1` (stay) and `2` (right). A caught ball is worth 1, a missed one
/// costs 1, and the episode ends after the last ball lands.
#[derive(Debug, Clone)]
pub struct Catch {
    rows: usize,
    cols: usize,
    balls: usize,
    seed: u64,
    rng: WyRng,
    ball: (usize, usize),
    paddle: usize,
    remaining: usize,
}

impl Catch {
    pub fn new(rows: usize, cols: usize, balls: usize, seed: u64) -> Self {
        debug_assert!(rows >= 2 && cols >= 1 && balls >= 1, "degenerate catch board");
        Self {
            rows,
            cols,
            balls,
            seed,
            rng: WyRng::seeded(seed),
            ball: (0, 0),
            paddle: cols / 2,
            remaining: 0,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.rows, self.cols, 2]
    }

    fn drop_ball(&mut self) {
        self.ball = (0, self.rng.random_range(0..self.cols));
    }

    fn observation(&self) -> Observation {
        let mut data = vec![0.; self.rows * self.cols * 2];
        let (row, col) = self.ball;
        data[(row * self.cols + col) * 2] = 1.;
        data[((self.rows - 1) * self.cols + self.paddle) * 2 + 1] = 1.;
        Observation::tensor(self.shape().to_vec(), data)
    }
}

impl Seeded for Catch {
    fn seeded(seed: u64) -> Self {
        Self::new(
            GAUNTLET_CATCH_ROWS,
            GAUNTLET_CATCH_COLS,
            GAUNTLET_CATCH_BALLS,
            seed,
        )
    }
}

impl Environment for Catch {
    fn observation_space(&self) -> Space {
        Space::Continuous {
            shape: self.shape().to_vec(),
            low: 0.,
            high: 1.,
        }
    }

    fn action_space(&self) -> Space {
        Space::Discrete(3)
    }

    fn reset(&mut self) -> Result<Observation, EnvError> {
        self.rng = WyRng::seeded(self.seed);
        self.paddle = self.cols / 2;
        self.remaining = self.balls;
        self.drop_ball();
        Ok(self.observation())
    }

    fn step(&mut self, action: &Action) -> Result<Transition, EnvError> {
        if self.remaining == 0 {
            return Err(EnvError::Episode(
                "catch stepped after its episode ended".into(),
            ));
        }
        self.paddle = match action {
            Action::Discrete(0) => self.paddle.saturating_sub(1),
            Action::Discrete(1) => self.paddle,
            Action::Discrete(2) => (self.paddle + 1).min(self.cols - 1),
            other => {
                return Err(EnvError::Episode(format!(
                    "invalid catch action {other:?}"
                )))
            }
        };

        self.ball.0 += 1;
        let mut reward = 0.;
        if self.ball.0 == self.rows - 1 {
            reward = if self.ball.1 == self.paddle { 1. } else { -1. };
            self.remaining -= 1;
            if self.remaining > 0 {
                self.drop_ball();
            }
        }

        Ok(Transition {
            observation: self.observation(),
            reward,
            done: self.remaining == 0,
        })
    }

    fn reward_threshold(&self) -> Option<f64> {
        Some(self.balls as f64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn column_of(obs: &Observation, channel: usize, row: usize) -> Option<usize> {
        (0..obs.shape()[1]).find(|col| obs.at(&[row, *col, channel]) == Some(1.))
    }

    #[test]
    fn test_observation_layout() {
        let mut env = Catch::new(4, 3, 1, 0);
        let obs = env.reset().unwrap();
        assert_eq!(obs.shape(), &[4, 3, 2]);
        assert!(column_of(&obs, 0, 0).is_some());
        assert_eq!(column_of(&obs, 1, 3), Some(1));
        assert_eq!(obs.as_slice().iter().sum::<f64>(), 2.);
    }

    #[test]
    fn test_tracking_catches_everything() {
        let mut env = Catch::new(6, 5, 4, 21);
        let mut obs = env.reset().unwrap();
        let mut total = 0.;
        loop {
            let ball = (0..6).find_map(|row| column_of(&obs, 0, row)).unwrap();
            let paddle = column_of(&obs, 1, 5).unwrap();
            let action = match ball.cmp(&paddle) {
                core::cmp::Ordering::Less => 0,
                core::cmp::Ordering::Equal => 1,
                core::cmp::Ordering::Greater => 2,
            };
            let t = env.step(&Action::Discrete(action)).unwrap();
            total += t.reward;
            obs = t.observation;
            if t.done {
                break;
            }
        }
        assert_eq!(total, 4.);
        assert_eq!(Some(total), env.reward_threshold());
    }

    #[test]
    fn test_standing_still_misses() {
        let mut env = Catch::new(3, 5, 20, 8);
        env.reset().unwrap();
        let mut total = 0.;
        loop {
            let t = env.step(&Action::Discrete(1)).unwrap();
            total += t.reward;
            if t.done {
                break;
            }
        }
        assert!(total < 20.);
        assert!(env.step(&Action::Discrete(1)).is_err());
    }
}
