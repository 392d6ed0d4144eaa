//! Visibility support.
//!
//! Objects can carry a time-sampled `visible` property that controls
//! whether they (and their subtree) are expanded. Visibility can be:
//! - Deferred: inherit from parent
//! - Hidden: explicitly hidden
//! - Visible: explicitly visible
//!
//! Both `int8` and `bool` encodings of the property are accepted.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{AttributeProperty, AttributeValues};
use crate::util::Chrono;

/// Visibility property name constant.
pub const VISIBILITY_PROPERTY_NAME: &str = "visible";

/// Object visibility state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i8)]
pub enum ObjectVisibility {
    /// Visibility is deferred to parent.
    /// If root is reached, object is visible.
    #[default]
    Deferred = -1,

    /// Object is explicitly hidden.
    Hidden = 0,

    /// Object is explicitly visible.
    Visible = 1,
}

impl ObjectVisibility {
    /// Parse from i8 value (as stored in property).
    pub fn from_i8(value: i8) -> Self {
        match value {
            0 => Self::Hidden,
            1 => Self::Visible,
            _ => Self::Deferred, // -1 or any other value
        }
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::Visible
        } else {
            Self::Hidden
        }
    }

    /// Convert to i8 for storage.
    pub fn to_i8(self) -> i8 {
        self as i8
    }

    pub fn is_deferred(self) -> bool {
        matches!(self, Self::Deferred)
    }

    pub fn is_hidden(self) -> bool {
        matches!(self, Self::Hidden)
    }

    pub fn is_visible(self) -> bool {
        matches!(self, Self::Visible)
    }
}

impl From<i8> for ObjectVisibility {
    fn from(value: i8) -> Self {
        Self::from_i8(value)
    }
}

impl From<ObjectVisibility> for i8 {
    fn from(vis: ObjectVisibility) -> Self {
        vis.to_i8()
    }
}

/// Build a constant `visible` property.
pub fn visibility_property(visible: bool) -> AttributeProperty {
    AttributeProperty::constant(VISIBILITY_PROPERTY_NAME, AttributeValues::Bool(vec![visible]))
}

/// Visibility of an object's properties at `time`.
///
/// Reads the sample nearest to `time`. Objects without the property (or
/// with an unreadable one) are deferred.
pub fn get_visibility(props: &[AttributeProperty], time: Chrono) -> ObjectVisibility {
    let Some(prop) = props.iter().find(|p| p.name == VISIBILITY_PROPERTY_NAME) else {
        return ObjectVisibility::Deferred;
    };
    let num_samples = prop.samples.len();
    if num_samples == 0 {
        return ObjectVisibility::Deferred;
    }
    let (index, _) = prop.time_sampling.near_index(time, num_samples);
    let Some(sample) = prop.samples.get(index) else {
        return ObjectVisibility::Deferred;
    };

    match &sample.values {
        AttributeValues::Bool(v) if !v.is_empty() => ObjectVisibility::from_bool(v[0]),
        AttributeValues::Int(v) if !v.is_empty() => ObjectVisibility::from_i8(v[0] as i8),
        AttributeValues::UInt(v) if !v.is_empty() => ObjectVisibility::from_i8(v[0] as i8),
        other => {
            warn!(kind = other.kind(), "Ignore visibility: unsupported encoding");
            ObjectVisibility::Deferred
        }
    }
}

/// True unless the object is explicitly hidden at `time`.
pub fn is_visible(props: &[AttributeProperty], time: Chrono) -> bool {
    !get_visibility(props, time).is_hidden()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TimeSampling;
    use crate::core::GeometryScope;

    #[test]
    fn test_visibility_conversion() {
        assert_eq!(ObjectVisibility::from_i8(-1), ObjectVisibility::Deferred);
        assert_eq!(ObjectVisibility::from_i8(0), ObjectVisibility::Hidden);
        assert_eq!(ObjectVisibility::from_i8(1), ObjectVisibility::Visible);
        assert_eq!(ObjectVisibility::from_i8(42), ObjectVisibility::Deferred);
        assert_eq!(ObjectVisibility::Hidden.to_i8(), 0);
        assert_eq!(i8::from(ObjectVisibility::Deferred), -1);
    }

    #[test]
    fn test_bool_and_int8_encodings() {
        assert_eq!(get_visibility(&[visibility_property(false)], 0.0), ObjectVisibility::Hidden);
        assert_eq!(get_visibility(&[visibility_property(true)], 3.0), ObjectVisibility::Visible);

        let int8 = AttributeProperty::constant(VISIBILITY_PROPERTY_NAME, AttributeValues::Int(vec![0]));
        assert!(!is_visible(&[int8], 0.0));
        assert_eq!(get_visibility(&[], 0.0), ObjectVisibility::Deferred);
    }

    #[test]
    fn test_animated_visibility_uses_nearest_sample() {
        let prop = AttributeProperty::new(VISIBILITY_PROPERTY_NAME, GeometryScope::Constant, 1)
            .with_time_sampling(TimeSampling::uniform(1.0, 0.0))
            .with_sample(AttributeValues::Int(vec![1]))
            .with_sample(AttributeValues::Int(vec![0]));
        let props = [prop];
        assert!(is_visible(&props, 0.4));
        assert!(!is_visible(&props, 0.6));
    }

    #[test]
    fn test_unsupported_encoding_defers() {
        let prop = AttributeProperty::constant(
            VISIBILITY_PROPERTY_NAME,
            AttributeValues::String(vec!["yes".into()]),
        );
        assert!(get_visibility(&[prop], 0.0).is_deferred());
    }
}
