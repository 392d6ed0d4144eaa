//! Read-only, time-sampled property storage.
//!
//! The archive is treated as an opaque store of sampled properties. The
//! [`SampleSource`] trait is the read side every series pulls from;
//! [`Property`] is the in-memory implementation used by the scene graph.

use serde::{Deserialize, Serialize};

use super::TimeSampling;
use crate::util::{Chrono, Error, Result};

/// A time-sampled property that can be read sample by sample.
pub trait SampleSource<T> {
    /// Time sampling describing when each sample was recorded.
    fn time_sampling(&self) -> &TimeSampling;

    /// Number of stored samples.
    fn num_samples(&self) -> usize;

    /// Read the sample at `index`.
    fn read_sample(&self, index: usize) -> Result<T>;

    /// True if the property holds at most one sample.
    fn is_constant(&self) -> bool {
        self.num_samples() <= 1
    }

    /// First and last sample times, if animated.
    fn time_range(&self) -> Option<(Chrono, Chrono)> {
        self.time_sampling().time_range(self.num_samples())
    }
}

/// In-memory sampled property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property<T> {
    #[serde(default)]
    pub time_sampling: TimeSampling,
    pub samples: Vec<T>,
}

impl<T> Default for Property<T> {
    fn default() -> Self {
        Self {
            time_sampling: TimeSampling::IDENTITY,
            samples: Vec::new(),
        }
    }
}

impl<T> Property<T> {
    /// Single static sample.
    pub fn constant(value: T) -> Self {
        Self {
            time_sampling: TimeSampling::IDENTITY,
            samples: vec![value],
        }
    }

    /// Samples with an explicit time sampling.
    pub fn animated(time_sampling: TimeSampling, samples: Vec<T>) -> Self {
        Self {
            time_sampling,
            samples,
        }
    }

    /// Samples recorded at explicit times.
    pub fn sampled_at(times: Vec<Chrono>, samples: Vec<T>) -> Self {
        Self::animated(TimeSampling::acyclic(times), samples)
    }
}

impl<T: Clone> SampleSource<T> for Property<T> {
    fn time_sampling(&self) -> &TimeSampling {
        &self.time_sampling
    }

    fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn read_sample(&self, index: usize) -> Result<T> {
        self.samples
            .get(index)
            .cloned()
            .ok_or(Error::SampleOutOfBounds {
                index,
                count: self.samples.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_property() {
        let p = Property::constant(3.0f32);
        assert!(p.is_constant());
        assert_eq!(p.read_sample(0).unwrap(), 3.0);
        assert!(p.time_range().is_none());
        assert!(matches!(
            p.read_sample(1),
            Err(Error::SampleOutOfBounds { index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_animated_property() {
        let p = Property::sampled_at(vec![0.0, 1.0, 2.0], vec![1, 2, 3]);
        assert!(!p.is_constant());
        assert_eq!(p.time_range(), Some((0.0, 2.0)));
        assert_eq!(p.read_sample(2).unwrap(), 3);
    }
}
