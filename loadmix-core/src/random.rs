//! Uniform random sources in `[0, 1)`.

use rand::Rng;
use thiserror::Error;

/// A sampler of uniform floats in `[0, 1)`.
///
/// Borrowed mutably for the whole of an invoker loop, so one source is never
/// shared between concurrent loops.
pub trait RandomSource {
    fn next_unit(&mut self) -> f64;
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn next_unit(&mut self) -> f64 {
        // Standard distribution for f64 is uniform over [0, 1).
        self.gen::<f64>()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SourceError {
    #[error("scripted source needs at least one value")]
    Empty,
    #[error("value {value} at position {index} is outside [0, 1)")]
    OutOfRange { index: usize, value: f64 },
}

/// A fixed, replayable sequence of samples. Wraps around when exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    values: Vec<f64>,
    cursor: usize,
}

impl ScriptedSource {
    pub fn new(values: Vec<f64>) -> Result<Self, SourceError> {
        if values.is_empty() {
            return Err(SourceError::Empty);
        }
        if let Some((index, &value)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !(0.0..1.0).contains(*v))
        {
            return Err(SourceError::OutOfRange { index, value });
        }
        Ok(Self { values, cursor: 0 })
    }

    /// Number of samples drawn so far.
    pub fn drawn(&self) -> usize {
        self.cursor
    }
}

impl RandomSource for ScriptedSource {
    fn next_unit(&mut self) -> f64 {
        let value = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        value
    }
}
