//! Expansion settings.
//!
//! [`ExpandSettings`] is the whole per-request configuration. It is plain
//! serde data so hosts can keep it in JSON next to their scenes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::geom::AttributeFilter;
use crate::scene::TraversalOptions;
use crate::util::{Chrono, Result};

/// Out-of-range behaviour when retiming into the play range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleType {
    #[default]
    Hold,
    Loop,
    Reverse,
    Bounce,
}

const RETIME_EPS: f64 = 0.001;

/// Map `time` into `[first, last]` according to `cycle`.
pub fn retime(time: Chrono, first: Chrono, last: Chrono, cycle: CycleType) -> Chrono {
    let play = last - first;
    if play <= 0.0 {
        return first;
    }
    let fraction = || {
        let offset = (time - first) / play;
        (offset - offset.floor()).abs()
    };

    match cycle {
        CycleType::Hold => {
            if time < first - RETIME_EPS {
                first
            } else if time > last + RETIME_EPS {
                last
            } else {
                time
            }
        }
        CycleType::Loop => {
            if time < first - RETIME_EPS || time > last + RETIME_EPS {
                first + play * fraction()
            } else {
                time
            }
        }
        CycleType::Reverse => {
            if time > first + RETIME_EPS && time < last - RETIME_EPS {
                last - play * fraction()
            } else if time < first + RETIME_EPS {
                last
            } else {
                first
            }
        }
        CycleType::Bounce => {
            if time < first - RETIME_EPS || time > last + RETIME_EPS {
                let cycle_index = ((time - first) / play).floor() as i64;
                if cycle_index.rem_euclid(2) == 0 {
                    first + play * fraction()
                } else {
                    last - play * fraction()
                }
            } else {
                time
            }
        }
    }
}

/// When attributes are sampled relative to the motion range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributesEvaluationTime {
    #[default]
    Render,
    /// Centre of the motion range.
    Shutter,
    ShutterOpen,
    ShutterClose,
}

/// Host frame parameters converted to seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSettings {
    pub frame: f64,
    pub fps: f64,
    pub speed: f64,
    /// Frame offset.
    pub offset: f64,
    pub cycle: CycleType,
    /// Play range in frames; defaults to the scene's animated range.
    pub start_frame: Option<f64>,
    pub end_frame: Option<f64>,
    pub preserve_start_frame: bool,
    /// Number of motion samples.
    pub samples: usize,
    /// Shutter offsets in frames, relative to `frame`.
    pub shutter_open: f64,
    pub shutter_close: f64,
}

impl Default for TimeSettings {
    fn default() -> Self {
        Self {
            frame: 1.0,
            fps: 24.0,
            speed: 1.0,
            offset: 0.0,
            cycle: CycleType::Hold,
            start_frame: None,
            end_frame: None,
            preserve_start_frame: false,
            samples: 1,
            shutter_open: 0.0,
            shutter_close: 0.0,
        }
    }
}

impl TimeSettings {
    pub fn fps(&self) -> f64 {
        if self.fps > 0.0 {
            self.fps
        } else {
            24.0
        }
    }

    fn play_range(&self, scene_range: Option<(Chrono, Chrono)>) -> Option<(Chrono, Chrono)> {
        let inv_fps = 1.0 / self.fps();
        let first = self.start_frame.map(|f| f * inv_fps).or(scene_range.map(|r| r.0))?;
        let last = self.end_frame.map(|f| f * inv_fps).or(scene_range.map(|r| r.1))?;
        Some((first, last))
    }

    /// Time after speed and offset, before retiming.
    pub fn adjusted_time(&self, scene_range: Option<(Chrono, Chrono)>) -> Chrono {
        let inv_fps = 1.0 / self.fps();
        let mut start_offset = 0.0;
        if self.preserve_start_frame && self.speed.abs() > 1e-4 {
            let start_frame = self
                .start_frame
                .or(scene_range.map(|r| r.0 * self.fps()))
                .unwrap_or(0.0);
            start_offset = start_frame * (self.speed - 1.0) / self.speed;
        }
        (self.frame * inv_fps - (start_offset + self.offset) * inv_fps) * self.speed
    }

    /// Render time in seconds.
    pub fn render_time(&self, scene_range: Option<(Chrono, Chrono)>) -> Chrono {
        let t = self.adjusted_time(scene_range);
        match self.play_range(scene_range) {
            Some((first, last)) => retime(t, first, last, self.cycle),
            None => t,
        }
    }

    /// Motion sample times around `render_time`, evenly spread over the shutter.
    pub fn motion_times(&self, render_time: Chrono) -> SmallVec<[Chrono; 4]> {
        if self.samples <= 1 {
            return smallvec![render_time];
        }
        let inv_fps = 1.0 / self.fps();
        let span = self.shutter_close - self.shutter_open;
        let last = (self.samples - 1) as f64;
        (0..self.samples)
            .map(|i| render_time + (self.shutter_open + span * i as f64 / last) * inv_fps)
            .collect()
    }

    /// Build the request for the current frame.
    pub fn request(&self, scene_range: Option<(Chrono, Chrono)>) -> ExpandRequest {
        let render_time = self.render_time(scene_range);
        ExpandRequest {
            render_time,
            motion_times: self.motion_times(render_time),
        }
    }
}

/// Times of one expansion request, in seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpandRequest {
    pub render_time: Chrono,
    pub motion_times: SmallVec<[Chrono; 4]>,
}

impl ExpandRequest {
    /// Single-sample request.
    pub fn at(render_time: Chrono) -> Self {
        Self {
            render_time,
            motion_times: smallvec![render_time],
        }
    }

    pub fn with_motion_times(render_time: Chrono, times: &[Chrono]) -> Self {
        Self {
            render_time,
            motion_times: times.iter().copied().collect(),
        }
    }

    /// Motion times, never empty.
    pub fn sample_times(&self) -> SmallVec<[Chrono; 4]> {
        if self.motion_times.is_empty() {
            smallvec![self.render_time]
        } else {
            self.motion_times.clone()
        }
    }

    pub fn is_motion_blurred(&self) -> bool {
        self.motion_times.len() > 1
    }

    fn shutter(&self) -> (Chrono, Chrono) {
        let times = self.sample_times();
        let open = times.iter().copied().fold(f64::INFINITY, f64::min);
        let close = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (open, close)
    }
}

/// Configuration of a scene expansion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandSettings {
    pub time: TimeSettings,

    // Geometry
    pub reverse_winding: bool,
    pub read_normals: bool,
    /// Share built geometry between instances of the same shape.
    pub instancing: bool,

    // Ignore flags
    pub ignore_deform_blur: bool,
    pub ignore_transform_blur: bool,
    pub ignore_visibility: bool,
    pub ignore_transforms: bool,
    pub ignore_instances: bool,
    pub ignore_nurbs: bool,

    // Attributes
    pub attributes: AttributeFilter,
    pub attributes_evaluation_time: AttributesEvaluationTime,
    /// UV sets to derive tangents for (`"uv"` is the default set).
    pub compute_tangents_for_uvs: Vec<String>,

    // Velocity
    pub velocity_scale: f64,
    pub velocity_name: Option<String>,
    pub acceleration_name: Option<String>,
    /// Extrapolate from velocities on constant topology meshes too.
    pub force_velocity_blur: bool,

    /// Prepended to every output shape name.
    pub name_prefix: String,
    /// Log per-shape summaries at info level.
    pub verbose: bool,
}

impl Default for ExpandSettings {
    fn default() -> Self {
        Self {
            time: TimeSettings::default(),
            reverse_winding: true,
            read_normals: true,
            instancing: true,
            ignore_deform_blur: false,
            ignore_transform_blur: false,
            ignore_visibility: false,
            ignore_transforms: false,
            ignore_instances: false,
            ignore_nurbs: false,
            attributes: AttributeFilter::default(),
            attributes_evaluation_time: AttributesEvaluationTime::Render,
            compute_tangents_for_uvs: Vec::new(),
            velocity_scale: 1.0,
            velocity_name: None,
            acceleration_name: None,
            force_velocity_blur: false,
            name_prefix: String::new(),
            verbose: false,
        }
    }
}

impl ExpandSettings {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Traversal parameters for `request`.
    pub fn traversal_options(&self, request: &ExpandRequest) -> TraversalOptions {
        TraversalOptions {
            render_time: request.render_time,
            motion_times: request.sample_times(),
            ignore_visibility: self.ignore_visibility,
            ignore_transforms: self.ignore_transforms,
            ignore_transform_blur: self.ignore_transform_blur,
            ignore_instances: self.ignore_instances,
            ignore_nurbs: self.ignore_nurbs,
            name_prefix: self.name_prefix.clone(),
        }
    }

    /// Time at which attributes of constant topology meshes are read.
    pub fn attributes_time(&self, request: &ExpandRequest) -> Chrono {
        let (open, close) = request.shutter();
        match self.attributes_evaluation_time {
            AttributesEvaluationTime::Render => request.render_time,
            AttributesEvaluationTime::Shutter => 0.5 * (open + close),
            AttributesEvaluationTime::ShutterOpen => open,
            AttributesEvaluationTime::ShutterClose => close,
        }
    }

    /// Whether tangents are requested for UV set `set` (empty is the default set).
    pub fn computes_tangents(&self, set: &str) -> bool {
        let name = if set.is_empty() { "uv" } else { set };
        self.compute_tangents_for_uvs.iter().any(|s| s == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_retime_cycles() {
        assert_eq!(retime(-1.0, 0.0, 2.0, CycleType::Hold), 0.0);
        assert_eq!(retime(5.0, 0.0, 2.0, CycleType::Hold), 2.0);
        assert_eq!(retime(1.0, 0.0, 2.0, CycleType::Hold), 1.0);

        assert!(close(retime(2.5, 0.0, 2.0, CycleType::Loop), 0.5));
        assert!(close(retime(-0.5, 0.0, 2.0, CycleType::Loop), 1.5));

        assert!(close(retime(0.5, 0.0, 2.0, CycleType::Reverse), 1.5));
        assert_eq!(retime(-1.0, 0.0, 2.0, CycleType::Reverse), 2.0);
        assert_eq!(retime(3.0, 0.0, 2.0, CycleType::Reverse), 0.0);

        assert!(close(retime(2.5, 0.0, 2.0, CycleType::Bounce), 1.5));
        assert!(close(retime(4.5, 0.0, 2.0, CycleType::Bounce), 0.5));
    }

    #[test]
    fn test_time_conversion() {
        let ts = TimeSettings {
            frame: 12.0,
            speed: 2.0,
            ..Default::default()
        };
        assert!(close(ts.adjusted_time(None), 1.0));

        let ts = TimeSettings {
            frame: 12.0,
            offset: 6.0,
            ..Default::default()
        };
        assert!(close(ts.render_time(None), 0.25));

        // Preserving the start frame keeps frame 10 at 10 whatever the speed.
        let ts = TimeSettings {
            frame: 10.0,
            speed: 2.0,
            start_frame: Some(10.0),
            end_frame: Some(100.0),
            preserve_start_frame: true,
            ..Default::default()
        };
        assert!(close(ts.render_time(None), 10.0 / 24.0));

        let ts = TimeSettings {
            frame: 500.0,
            ..Default::default()
        };
        assert!(close(ts.render_time(Some((0.0, 2.0))), 2.0));
    }

    #[test]
    fn test_motion_times() {
        let ts = TimeSettings {
            frame: 24.0,
            samples: 3,
            shutter_open: -0.5,
            shutter_close: 0.5,
            ..Default::default()
        };
        let req = ts.request(None);
        assert!(close(req.render_time, 1.0));
        assert_eq!(req.motion_times.len(), 3);
        assert!(close(req.motion_times[0], 1.0 - 0.5 / 24.0));
        assert!(close(req.motion_times[2], 1.0 + 0.5 / 24.0));
        assert!(req.is_motion_blurred());
    }

    #[test]
    fn test_settings_json_defaults() {
        let s = ExpandSettings::from_json(r#"{ "reverse_winding": false, "time": { "frame": 48 } }"#).unwrap();
        assert!(!s.reverse_winding);
        assert!(s.read_normals);
        assert_eq!(s.time.fps, 24.0);
        assert_eq!(s.velocity_scale, 1.0);

        let back = ExpandSettings::from_json(&s.to_json().unwrap()).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_attributes_time() {
        let req = ExpandRequest::with_motion_times(1.0, &[0.5, 1.0, 2.0]);
        let mut s = ExpandSettings::default();
        assert_eq!(s.attributes_time(&req), 1.0);
        s.attributes_evaluation_time = AttributesEvaluationTime::Shutter;
        assert_eq!(s.attributes_time(&req), 1.25);
        s.attributes_evaluation_time = AttributesEvaluationTime::ShutterClose;
        assert_eq!(s.attributes_time(&req), 2.0);

        s.compute_tangents_for_uvs = vec!["uv".into(), "map1".into()];
        assert!(s.computes_tangents(""));
        assert!(s.computes_tangents("map1"));
        assert!(!s.computes_tangents("map2"));
    }
}
