//! Bit-exact serde helpers for rulinalg matrices, so that a network read back from an archive
//! behaves exactly like the one written.

use rulinalg::matrix::{BaseMatrix, Matrix};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize_matrix<S: Serializer>(
    matrix: &Matrix<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let bits: Vec<u64> = matrix.data().iter().map(|&f| f64::to_bits(f)).collect();
    bits.serialize(serializer)
}

fn deserialize_bits<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
    Vec::<u64>::deserialize(deserializer).map(|v| v.into_iter().map(f64::from_bits).collect())
}

/// A single row
pub fn deserialize_matrix_flat<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Matrix<f64>, D::Error> {
    let data = deserialize_bits(deserializer)?;
    Ok(Matrix::new(1, data.len(), data))
}

pub fn deserialize_matrix_square<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Matrix<f64>, D::Error> {
    let data = deserialize_bits(deserializer)?;
    let n = (data.len() as f64).sqrt() as usize;
    if n * n != data.len() {
        return Err(serde::de::Error::custom(format!(
            "{} weights can't fill a square matrix",
            data.len()
        )));
    }
    Ok(Matrix::new(n, n, data))
}
