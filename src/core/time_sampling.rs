//! Time sampling for archive properties.
//!
//! Every property in the archive is sampled over time. A [`TimeSampling`]
//! maps sample indices to times (seconds) and answers floor/ceil/near
//! lookups used when pulling samples into a
//! [`TimeSampleSeries`](crate::core::TimeSampleSeries).

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::util::Chrono;

/// Tolerance when matching a time against sample times, relative to the
/// magnitude of the time.
pub fn chrono_epsilon(time: Chrono) -> Chrono {
    (1e-12 * time.abs()).max(1e-9)
}

/// Type of time sampling.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeSamplingType {
    /// Single static sample at time 0.
    #[default]
    Identity,

    /// Samples at `start_time + index * time_per_cycle`.
    Uniform {
        time_per_cycle: Chrono,
        start_time: Chrono,
    },

    /// Repeating pattern of sample times.
    Cyclic {
        time_per_cycle: Chrono,
        times: Vec<Chrono>,
    },

    /// Explicit time for each sample.
    Acyclic { times: Vec<Chrono> },
}

/// Time sampling information for a property.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSampling {
    /// The type of sampling.
    pub sampling_type: TimeSamplingType,
}

impl TimeSampling {
    /// Identity time sampling (single sample at time 0).
    pub const IDENTITY: Self = Self {
        sampling_type: TimeSamplingType::Identity,
    };

    /// Create uniform time sampling.
    pub fn uniform(time_per_cycle: Chrono, start_time: Chrono) -> Self {
        Self {
            sampling_type: TimeSamplingType::Uniform {
                time_per_cycle,
                start_time,
            },
        }
    }

    /// Create acyclic time sampling from explicit times.
    pub fn acyclic(times: Vec<Chrono>) -> Self {
        Self {
            sampling_type: TimeSamplingType::Acyclic { times },
        }
    }

    /// Create cyclic time sampling.
    pub fn cyclic(time_per_cycle: Chrono, times: Vec<Chrono>) -> Self {
        Self {
            sampling_type: TimeSamplingType::Cyclic {
                time_per_cycle,
                times,
            },
        }
    }

    /// Get the time for a specific sample index.
    pub fn sample_time(&self, index: usize) -> Chrono {
        match &self.sampling_type {
            TimeSamplingType::Identity => 0.0,
            TimeSamplingType::Uniform {
                time_per_cycle,
                start_time,
            } => *start_time + (index as Chrono) * *time_per_cycle,
            TimeSamplingType::Cyclic {
                time_per_cycle,
                times,
            } => {
                if times.is_empty() {
                    return 0.0;
                }
                let cycle = index / times.len();
                let local_idx = index % times.len();
                times[local_idx] + (cycle as Chrono) * *time_per_cycle
            }
            TimeSamplingType::Acyclic { times } => times.get(index).copied().unwrap_or(0.0),
        }
    }

    /// First and last sample times, if the property is animated.
    pub fn time_range(&self, num_samples: usize) -> Option<(Chrono, Chrono)> {
        if num_samples < 2 {
            return None;
        }
        Some((self.sample_time(0), self.sample_time(num_samples - 1)))
    }

    /// Find the floor index (largest index with time <= given time).
    pub fn floor_index(&self, time: Chrono, num_samples: usize) -> (usize, Chrono) {
        if num_samples == 0 {
            return (0, 0.0);
        }

        match &self.sampling_type {
            TimeSamplingType::Identity => (0, 0.0),
            TimeSamplingType::Uniform {
                time_per_cycle,
                start_time,
            } => {
                if time <= *start_time || *time_per_cycle <= 0.0 {
                    return (0, *start_time);
                }
                let mut idx = ((time - start_time) / time_per_cycle).floor() as usize;
                idx = idx.min(num_samples - 1);
                // A time within rounding of the next sample belongs to it.
                if idx + 1 < num_samples
                    && self.sample_time(idx + 1) - time <= chrono_epsilon(time)
                {
                    idx += 1;
                }
                (idx, self.sample_time(idx))
            }
            TimeSamplingType::Cyclic { .. } | TimeSamplingType::Acyclic { .. } => {
                let mut lo = 0;
                let mut hi = num_samples;
                while lo < hi {
                    let mid = lo + (hi - lo) / 2;
                    if self.sample_time(mid) <= time {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }
                let idx = lo.saturating_sub(1);
                (idx, self.sample_time(idx))
            }
        }
    }

    /// Find the ceiling index (smallest index with time >= given time).
    pub fn ceil_index(&self, time: Chrono, num_samples: usize) -> (usize, Chrono) {
        if num_samples == 0 {
            return (0, 0.0);
        }

        let (floor_idx, floor_time) = self.floor_index(time, num_samples);
        if floor_time >= time {
            return (floor_idx, floor_time);
        }

        let ceil_idx = (floor_idx + 1).min(num_samples - 1);
        (ceil_idx, self.sample_time(ceil_idx))
    }

    /// Find the nearest index to the given time.
    pub fn near_index(&self, time: Chrono, num_samples: usize) -> (usize, Chrono) {
        if num_samples == 0 {
            return (0, 0.0);
        }

        let (floor_idx, floor_time) = self.floor_index(time, num_samples);
        if floor_idx >= num_samples - 1 {
            return (floor_idx, floor_time);
        }

        let ceil_idx = floor_idx + 1;
        let ceil_time = self.sample_time(ceil_idx);

        if (time - floor_time).abs() <= (ceil_time - time).abs() {
            (floor_idx, floor_time)
        } else {
            (ceil_idx, ceil_time)
        }
    }

    /// Indices needed to evaluate the window `[start, end]`.
    ///
    /// With interpolation allowed the range spans the floor sample of
    /// `start` to the ceil sample of `end`, so both ends can be blended.
    /// Without it, only the nearest samples of each end are covered.
    pub fn window_indices(
        &self,
        start: Chrono,
        end: Chrono,
        num_samples: usize,
        allow_interpolation: bool,
    ) -> Option<RangeInclusive<usize>> {
        if num_samples == 0 {
            return None;
        }
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let (first, last) = if allow_interpolation {
            (
                self.floor_index(start, num_samples).0,
                self.ceil_index(end, num_samples).0,
            )
        } else {
            (
                self.near_index(start, num_samples).0,
                self.near_index(end, num_samples).0,
            )
        };
        Some(first..=last.max(first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sampling() {
        let ts = TimeSampling::uniform(1.0 / 24.0, 0.0);

        assert_eq!(ts.sample_time(0), 0.0);
        assert!((ts.sample_time(24) - 1.0).abs() < 1e-10);
        assert!((ts.sample_time(48) - 2.0).abs() < 1e-10);
        assert_eq!(ts.floor_index(1.0, 100).0, 24);
    }

    #[test]
    fn test_uniform_floor_at_large_times() {
        let ts = TimeSampling::uniform(1.0 / 24.0, 0.0);
        let n = 1_000_000_000;
        for idx in [1, 23, 24_001, 3_600_017, 86_400_000 * 3 + 7, 999_999_998] {
            let t = ts.sample_time(idx);
            assert_eq!(ts.floor_index(t, n).0, idx, "sample {idx} at {t}");
            assert_eq!(ts.ceil_index(t, n).0, idx);
            // Half a frame early still floors to the previous sample.
            assert_eq!(ts.floor_index(t - 0.5 / 24.0, n).0, idx - 1);
        }
        assert!(chrono_epsilon(1e7) > chrono_epsilon(1.0));
        assert!(chrono_epsilon(1e7) < 1e-3);
        assert_eq!(chrono_epsilon(0.0), 1e-9);
    }

    #[test]
    fn test_acyclic_sampling() {
        let ts = TimeSampling::acyclic(vec![0.0, 0.5, 1.0, 2.0]);

        assert_eq!(ts.sample_time(1), 0.5);
        assert_eq!(ts.floor_index(0.75, 4), (1, 0.5));
        assert_eq!(ts.ceil_index(0.75, 4), (2, 1.0));
        assert_eq!(ts.near_index(0.8, 4), (2, 1.0));
        assert_eq!(ts.time_range(4), Some((0.0, 2.0)));
        assert_eq!(ts.time_range(1), None);
    }

    #[test]
    fn test_cyclic_sampling() {
        let ts = TimeSampling::cyclic(1.0, vec![0.0, 0.25]);
        assert_eq!(ts.sample_time(2), 1.0);
        assert_eq!(ts.sample_time(3), 1.25);
    }

    #[test]
    fn test_window_indices() {
        let ts = TimeSampling::uniform(1.0, 0.0);
        assert_eq!(ts.window_indices(1.5, 1.5, 10, true), Some(1..=2));
        assert_eq!(ts.window_indices(1.4, 1.4, 10, false), Some(1..=1));
        assert_eq!(ts.window_indices(-3.0, -3.0, 10, true), Some(0..=0));
        assert_eq!(ts.window_indices(42.0, 42.0, 10, true), Some(9..=9));
        assert_eq!(ts.window_indices(0.0, 1.0, 0, true), None);
    }
}
