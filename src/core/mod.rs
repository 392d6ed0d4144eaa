//! Core layer - time sampling and sampled property access.
//!
//! This module provides:
//! - [`TimeSampling`] - Time sampling for animated properties
//! - [`SampleSource`] / [`Property`] - Read side of a time-sampled property
//! - [`TimeSampleSeries`] - Cached samples with bracketing lookups
//! - [`GeometryScope`] / [`TopologyVariance`] - Sample descriptors

mod property;
mod sample;
mod series;
mod time_sampling;

pub use property::{Property, SampleSource};
pub use sample::{GeometryScope, TopologyVariance};
pub use series::{Bracket, TimeSample, TimeSampleSeries};
pub use time_sampling::{chrono_epsilon, TimeSampling, TimeSamplingType};
