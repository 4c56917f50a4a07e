//! Declarations of network topology, handed to a controller once per run so that it can build
//! genomes whose inputs and outputs line up with what a scoring function produces and consumes.

use crate::error::{ContractError, Side};
use serde::{Deserialize, Serialize};

/// Dimensions of a multi-dimensional layer, outermost first. A 96x96 RGB image is `[96, 96, 3]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Result<Self, ContractError> {
        let dims = dims.into();
        if dims.is_empty() {
            return Err(ContractError::Encoding("shape has no dimensions".into()));
        }
        if dims.contains(&0) {
            return Err(ContractError::Encoding(format!(
                "shape {dims:?} has an empty dimension"
            )));
        }
        Ok(Self(dims))
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of values in a flattened vector of this shape
    #[inline]
    pub fn len(&self) -> usize {
        self.0.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Input and output arity of every genome in a run. Immutable once a controller is initialized
/// with it; a different arity means a different run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncodingDescriptor {
    /// A single input vector and a single output vector
    Flat { inputs: usize, outputs: usize },
    /// Substrate style topology, where every layer is laid out as a multi-dimensional shape
    Layered {
        input: Shape,
        hidden: Vec<Shape>,
        output: Shape,
    },
}

impl EncodingDescriptor {
    pub fn flat(inputs: usize, outputs: usize) -> Result<Self, ContractError> {
        let descriptor = Self::Flat { inputs, outputs };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn substrate() -> SubstrateBuilder {
        SubstrateBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        match self {
            Self::Flat { inputs, outputs } if *inputs == 0 || *outputs == 0 => {
                Err(ContractError::Encoding(format!(
                    "flat encoding needs inputs and outputs, got {inputs}x{outputs}"
                )))
            }
            Self::Flat { .. } => Ok(()),
            Self::Layered { .. } => self.layers().try_for_each(|s| Shape::new(s.0).map(drop)),
        }
    }

    pub fn input_arity(&self) -> usize {
        match self {
            Self::Flat { inputs, .. } => *inputs,
            Self::Layered { input, .. } => input.len(),
        }
    }

    pub fn output_arity(&self) -> usize {
        match self {
            Self::Flat { outputs, .. } => *outputs,
            Self::Layered { output, .. } => output.len(),
        }
    }

    /// Every layer from input to output. Flat encodings are a single input and output layer
    pub fn layers(&self) -> Box<dyn Iterator<Item = Shape> + '_> {
        match self {
            Self::Flat { inputs, outputs } => {
                Box::new([Shape(vec![*inputs]), Shape(vec![*outputs])].into_iter())
            }
            Self::Layered {
                input,
                hidden,
                output,
            } => Box::new(
                std::iter::once(input.clone())
                    .chain(hidden.iter().cloned())
                    .chain(std::iter::once(output.clone())),
            ),
        }
    }

    /// Flattened size of every layer from input to output
    pub fn layer_sizes(&self) -> Vec<usize> {
        self.layers().map(|s| s.len()).collect()
    }

    #[inline]
    pub fn check_input(&self, input: &[f64]) -> Result<(), ContractError> {
        check_arity(Side::Input, self.input_arity(), input.len())
    }

    #[inline]
    pub fn check_output(&self, output: &[f64]) -> Result<(), ContractError> {
        check_arity(Side::Output, self.output_arity(), output.len())
    }
}

#[inline]
pub(crate) fn check_arity(
    side: Side,
    expected: usize,
    got: usize,
) -> Result<(), ContractError> {
    if expected == got {
        Ok(())
    } else {
        Err(ContractError::Arity {
            side,
            expected,
            got,
        })
    }
}

/// Builds a [EncodingDescriptor::Layered]. Hidden layers are kept in the order they're added
#[derive(Debug, Default)]
pub struct SubstrateBuilder {
    input: Option<Vec<usize>>,
    hidden: Vec<Vec<usize>>,
    output: Option<Vec<usize>>,
}

impl SubstrateBuilder {
    /// Input dimension sizes. A 5x4x3 input space is `[5, 4, 3]`
    pub fn inputs(mut self, dims: impl Into<Vec<usize>>) -> Self {
        self.input = Some(dims.into());
        self
    }

    /// Output dimension sizes
    pub fn outputs(mut self, dims: impl Into<Vec<usize>>) -> Self {
        self.output = Some(dims.into());
        self
    }

    /// Push a hidden layer after every one added so far
    pub fn add_layer(mut self, dims: impl Into<Vec<usize>>) -> Self {
        self.hidden.push(dims.into());
        self
    }

    pub fn build(self) -> Result<EncodingDescriptor, ContractError> {
        let input = self
            .input
            .ok_or_else(|| ContractError::Encoding("substrate has no input layer".into()))?;
        let output = self
            .output
            .ok_or_else(|| ContractError::Encoding("substrate has no output layer".into()))?;
        Ok(EncodingDescriptor::Layered {
            input: Shape::new(input)?,
            hidden: self
                .hidden
                .into_iter()
                .map(Shape::new)
                .collect::<Result<_, _>>()?,
            output: Shape::new(output)?,
        })
    }
}
