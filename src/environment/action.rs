use super::{Action, Space};

/// `v * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub scale: f64,
    pub offset: f64,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        scale: 1.,
        offset: 0.,
    };

    /// `[0, 1]` onto `[-1, 1]`, or `2v - 1`
    pub const SYMMETRIC: Affine = Affine {
        scale: 2.,
        offset: -1.,
    };

    /// `[0, 1]` onto `[low, high]`
    pub fn onto(low: f64, high: f64) -> Self {
        Self {
            scale: high - low,
            offset: low,
        }
    }

    #[inline]
    pub fn apply(&self, v: f64) -> f64 {
        v * self.scale + self.offset
    }
}

/// How a network's output vector becomes an environment action. Every adapter declares one,
/// and the same output always maps to the same action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionMap {
    /// Index of the largest output. Ties go to the lowest index, and NaN never wins
    Argmax,
    /// Each output used as is
    PassThrough,
    /// One rescale per output dimension
    Affine(Vec<Affine>),
}

impl ActionMap {
    /// The conventional map for a space, assuming outputs in `[0, 1]`
    pub fn for_space(space: &Space) -> Self {
        match space {
            Space::Discrete(_) => ActionMap::Argmax,
            Space::Continuous { low, high, .. } if *low == 0. && *high == 1. => {
                ActionMap::PassThrough
            }
            Space::Continuous { low, high, .. } if *low == -1. && *high == 1. => {
                ActionMap::Affine(vec![Affine::SYMMETRIC; space.len()])
            }
            Space::Continuous { low, high, .. } => {
                ActionMap::Affine(vec![Affine::onto(*low, *high); space.len()])
            }
        }
    }

    pub fn affine(dims: Vec<Affine>) -> Self {
        ActionMap::Affine(dims)
    }

    /// Outputs this map expects for a space
    pub fn arity(&self, space: &Space) -> usize {
        match self {
            ActionMap::Affine(dims) => dims.len(),
            _ => space.len(),
        }
    }

    pub fn apply(&self, output: &[f64]) -> Action {
        match self {
            ActionMap::Argmax => Action::Discrete(argmax(output)),
            ActionMap::PassThrough => Action::Continuous(output.to_vec()),
            ActionMap::Affine(dims) => Action::Continuous(
                output
                    .iter()
                    .zip(dims.iter())
                    .map(|(v, a)| a.apply(*v))
                    .collect(),
            ),
        }
    }
}

fn argmax(output: &[f64]) -> usize {
    output
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, max), (idx, v)| {
            if *v > max {
                (idx, *v)
            } else {
                (best, max)
            }
        })
        .0
}
