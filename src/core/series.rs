//! Ordered time-sample series with bracketing lookups.
//!
//! A [`TimeSampleSeries`] caches the raw samples of one property that are
//! needed for a motion-blur window and resolves any query time to the two
//! bracketing samples plus a blend factor. Times outside the stored range
//! clamp to the nearest endpoint.

use super::SampleSource;
use crate::util::{Chrono, Lerp, Result};

/// A single `(time, value)` pair of one property.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSample<T> {
    /// Sample time in seconds.
    pub time: Chrono,
    /// Index of the sample in its source property.
    pub index: usize,
    /// Sample value.
    pub data: T,
}

/// Result of [`TimeSampleSeries::get_samples`].
///
/// The interpolated value is `(1 - blend) * sample0 + blend * sample1`.
#[derive(Debug)]
pub struct Bracket<'a, T> {
    pub sample0: &'a TimeSample<T>,
    pub sample1: &'a TimeSample<T>,
    pub blend: f64,
}

impl<T> Clone for Bracket<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Bracket<'_, T> {}

impl<'a, T> Bracket<'a, T> {
    /// Both ends on the same sample.
    #[inline]
    pub fn exact(sample: &'a TimeSample<T>) -> Self {
        Self {
            sample0: sample,
            sample1: sample,
            blend: 0.0,
        }
    }

    /// True if no blending is needed.
    #[inline]
    pub fn is_exact(&self) -> bool {
        self.blend <= 0.0
    }

    /// The sample closest in time (discrete/topology data).
    #[inline]
    pub fn nearest(&self) -> &'a TimeSample<T> {
        if self.blend > 0.5 {
            self.sample1
        } else {
            self.sample0
        }
    }
}

impl<T: Lerp + Clone> Bracket<'_, T> {
    /// Blend the two samples.
    pub fn interpolate(&self) -> T {
        if self.is_exact() {
            self.sample0.data.clone()
        } else {
            self.sample0.data.interp(&self.sample1.data, self.blend)
        }
    }
}

/// Ordered-by-time samples of one property.
#[derive(Clone, Debug)]
pub struct TimeSampleSeries<T> {
    samples: Vec<TimeSample<T>>,
}

impl<T> Default for TimeSampleSeries<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimeSampleSeries<T> {
    /// Create an empty series.
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    /// Number of cached samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if nothing has been pulled yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop all cached samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Iterate samples in time order.
    pub fn iter(&self) -> impl Iterator<Item = &TimeSample<T>> {
        self.samples.iter()
    }

    /// Earliest cached sample.
    pub fn first(&self) -> Option<&TimeSample<T>> {
        self.samples.first()
    }

    /// Latest cached sample.
    pub fn last(&self) -> Option<&TimeSample<T>> {
        self.samples.last()
    }

    /// Insert a sample, keeping times strictly increasing.
    ///
    /// Returns false if a sample with the same time is already present.
    pub fn insert(&mut self, time: Chrono, index: usize, data: T) -> bool {
        let pos = self.samples.partition_point(|s| s.time < time);
        if self.samples.get(pos).is_some_and(|s| s.time == time) {
            return false;
        }
        self.samples.insert(pos, TimeSample { time, index, data });
        true
    }

    /// Pull the samples needed for the window `[time_start, time_end]`.
    ///
    /// Samples already present are kept, so calling this once per motion
    /// sample time accumulates everything the window needs. With
    /// `allow_interpolation` the bracketing samples on both sides are
    /// pulled; without it only the nearest ones. Returns true if the
    /// series holds at least one sample afterwards.
    pub fn update<S>(
        &mut self,
        source: &S,
        time_start: Chrono,
        time_end: Chrono,
        allow_interpolation: bool,
    ) -> Result<bool>
    where
        S: SampleSource<T> + ?Sized,
    {
        let num_samples = source.num_samples();
        let ts = source.time_sampling();
        let Some(range) = ts.window_indices(time_start, time_end, num_samples, allow_interpolation)
        else {
            return Ok(!self.is_empty());
        };

        for index in range {
            let time = ts.sample_time(index);
            if self.samples.iter().any(|s| s.time == time) {
                continue;
            }
            let data = source.read_sample(index)?;
            self.insert(time, index, data);
        }

        Ok(!self.is_empty())
    }

    /// Resolve `t` to its bracketing samples and blend factor.
    ///
    /// Outside the stored range both samples are the endpoint and the
    /// blend is 0. A single-sample series always returns that sample twice.
    pub fn get_samples(&self, t: Chrono) -> Option<Bracket<'_, T>> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;

        if self.samples.len() == 1 || t <= first.time {
            return Some(Bracket::exact(first));
        }
        if t >= last.time {
            return Some(Bracket::exact(last));
        }

        let pos = self.samples.partition_point(|s| s.time <= t);
        let s0 = &self.samples[pos - 1];
        if s0.time == t {
            return Some(Bracket::exact(s0));
        }
        let s1 = &self.samples[pos];
        let blend = (t - s0.time) / (s1.time - s0.time);

        Some(Bracket {
            sample0: s0,
            sample1: s1,
            blend,
        })
    }

    /// Sample closest to `t`.
    pub fn nearest(&self, t: Chrono) -> Option<&TimeSample<T>> {
        self.get_samples(t).map(|b| b.nearest())
    }
}

impl<T: Lerp + Clone> TimeSampleSeries<T> {
    /// Interpolated value at `t`.
    pub fn value_at(&self, t: Chrono) -> Option<T> {
        self.get_samples(t).map(|b| b.interpolate())
    }
}
