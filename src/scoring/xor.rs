use super::{Input, ScoringFunction, ScoringInstance};
use crate::{error::EnvError, random::WyRng};
use core::num::NonZeroUsize;
use rand::seq::SliceRandom;

/// Truth table rows, each led by a constant bias input
const ROWS: [[f64; 3]; 4] = [
    [1., 0., 0.],
    [1., 0., 1.],
    [1., 1., 0.],
    [1., 1., 1.],
];

/// Best attainable score, reached with zero error
pub const XOR_MAX_SCORE: f64 = 16.;

/// Presents the XOR truth table once per episode, in a shuffled order. Every instance starts
/// from the same seed, so the order an individual sees doesn't depend on which thread built its
/// instance or when
#[derive(Debug)]
pub struct XorScoring {
    seed: u64,
    max_threads: NonZeroUsize,
}

impl XorScoring {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_threads: NonZeroUsize::MIN,
        }
    }

    pub fn threads(mut self, threads: NonZeroUsize) -> Self {
        self.max_threads = threads;
        self
    }
}

impl ScoringFunction for XorScoring {
    type Instance = XorInstance;

    fn create_new(&self) -> Result<Self::Instance, EnvError> {
        Ok(XorInstance::new(WyRng::seeded(self.seed)))
    }

    fn max_threads(&self) -> NonZeroUsize {
        self.max_threads
    }

    fn flush_between(&self) -> bool {
        true
    }
}

#[derive(Debug)]
pub struct XorInstance {
    rng: WyRng,
    order: [usize; 4],
    at: usize,
    expected: bool,
    error: f64,
    correct: usize,
}

impl XorInstance {
    fn new(rng: WyRng) -> Self {
        let mut instance = Self {
            rng,
            order: [0, 1, 2, 3],
            at: 0,
            expected: false,
            error: 0.,
            correct: 0,
        };
        instance.order.shuffle(&mut instance.rng);
        instance
    }

    /// Rows answered on the right side of 0.5
    #[inline]
    pub fn correct(&self) -> usize {
        self.correct
    }

    /// Order the rows are presented in this episode
    #[inline]
    pub fn order(&self) -> [usize; 4] {
        self.order
    }
}

impl ScoringInstance for XorInstance {
    fn generate_input(&mut self) -> Result<Input, EnvError> {
        let Some(row) = self.order.get(self.at).map(|idx| ROWS[*idx]) else {
            return Ok(Input::Done);
        };
        self.expected = (row[1] != 0.) ^ (row[2] != 0.);
        self.at += 1;
        Ok(Input::Continue(row.to_vec()))
    }

    fn accept_output(&mut self, output: &[f64]) -> Result<(), EnvError> {
        let out = output[0];
        let want = if self.expected { 1. } else { 0. };
        self.error += (want - out).abs();
        if (out >= 0.5) == self.expected {
            self.correct += 1;
        }
        Ok(())
    }

    fn score(&self) -> f64 {
        (4. - self.error).powi(2)
    }

    fn is_winner(&self) -> bool {
        self.correct == 4
    }

    fn restart(&mut self) -> Result<(), EnvError> {
        self.order.shuffle(&mut self.rng);
        self.at = 0;
        self.expected = false;
        self.error = 0.;
        self.correct = 0;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{assert_f64_approx, encoding::EncodingDescriptor, scoring::Checked};

    fn xor(input: &[f64]) -> f64 {
        if (input[1] != 0.) ^ (input[2] != 0.) {
            1.
        } else {
            0.
        }
    }

    #[test]
    fn test_perfect_answers_win() {
        let scoring = XorScoring::new(5);
        let mut checked = Checked::new(
            scoring.create_new().unwrap(),
            &EncodingDescriptor::flat(3, 1).unwrap(),
        );
        checked.run(|input| vec![xor(input)]).unwrap();
        assert_eq!(checked.inputs(), 4);

        let a = checked.assessment().unwrap();
        assert!(a.winner);
        assert_f64_approx!(a.score, XOR_MAX_SCORE);
    }

    #[test]
    fn test_near_misses() {
        let mut instance = XorScoring::new(5).create_new().unwrap();
        while let Input::Continue(input) = instance.generate_input().unwrap() {
            // right side of 0.5, but not exact
            let out = if xor(&input) == 1. { 0.75 } else { 0.25 };
            instance.accept_output(&[out]).unwrap();
        }
        assert!(instance.is_winner());
        assert_f64_approx!(instance.score(), 9.);
    }

    #[test]
    fn test_one_wrong_loses() {
        let mut instance = XorScoring::new(5).create_new().unwrap();
        let mut first = true;
        while let Input::Continue(input) = instance.generate_input().unwrap() {
            let out = if first { 1. - xor(&input) } else { xor(&input) };
            first = false;
            instance.accept_output(&[out]).unwrap();
        }
        assert_eq!(instance.correct(), 3);
        assert!(!instance.is_winner());
        assert_f64_approx!(instance.score(), 9.);
        assert!(instance.score() < XOR_MAX_SCORE);
    }

    #[test]
    fn test_every_row_once() {
        let scoring = XorScoring::new(9);
        for _ in 0..8 {
            let mut instance = scoring.create_new().unwrap();
            let mut order = instance.order();
            order.sort();
            assert_eq!(order, [0, 1, 2, 3]);

            let mut seen = Vec::new();
            while let Input::Continue(input) = instance.generate_input().unwrap() {
                assert_eq!(input[0], 1.);
                seen.push(input);
                instance.accept_output(&[0.]).unwrap();
            }
            seen.sort_by(|l, r| l.partial_cmp(r).unwrap());
            assert_eq!(seen, ROWS.iter().map(|r| r.to_vec()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_order_replays() {
        let scoring = XorScoring::new(11).threads(NonZeroUsize::new(4).unwrap());
        let first = scoring.create_new().unwrap().order();
        let orders = std::thread::scope(|s| {
            let handles = (0..4)
                .map(|_| s.spawn(|| scoring.create_new().unwrap().order()))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });
        assert!(orders.iter().all(|order| *order == first));

        let mut left = scoring.create_new().unwrap();
        let mut right = XorScoring::new(11).create_new().unwrap();
        for _ in 0..3 {
            left.restart().unwrap();
            right.restart().unwrap();
            assert_eq!(left.order(), right.order());
        }
    }

    #[test]
    fn test_restart() {
        let mut instance = XorScoring::new(1).create_new().unwrap();
        while let Input::Continue(_) = instance.generate_input().unwrap() {
            instance.accept_output(&[0.5]).unwrap();
        }
        assert!(instance.score() < XOR_MAX_SCORE);
        instance.restart().unwrap();
        assert_eq!(instance.correct(), 0);
        assert_f64_approx!(instance.score(), XOR_MAX_SCORE);
        assert!(!instance.generate_input().unwrap().is_done());
    }
}
