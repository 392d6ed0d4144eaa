//! Geometry parameters and user attributes.
//!
//! [`GeomParam`] provides typed access to indexed per-element data such as
//! normals and UVs. [`AttributeProperty`] is the untyped form used for
//! arbitrary geometry parameters and user properties; the
//! [`AttributeClassifier`] routes those into object/primitive/point/corner
//! buckets or into the UV-set table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{
    GeometryScope, Property, SampleSource, TimeSampleSeries, TimeSampling,
};
use crate::util::{Chrono, Error, Lerp, Result};

/// Point attribute names consumed directly by the mesh assembler.
pub const RESERVED_POINT_NAMES: [&str; 5] = ["velocity", "v", "acceleration", "accel", "a"];
/// Name that may not be used for an extra UV set.
pub const RESERVED_UV_NAME: &str = "uv";
/// Table key of the mesh's default (unnamed) UV set.
pub const DEFAULT_UV_SET: &str = "";
/// Interpretation tag marking a 2-vector parameter as texture coordinates.
pub const UV_INTERPRETATION: &str = "uv";

// ---------------------------------------------------------------------------
// Typed geom params
// ---------------------------------------------------------------------------

/// Values with an optional index buffer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedSample<T> {
    pub values: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<u32>>,
}

impl<T> IndexedSample<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self { values, indices: None }
    }

    pub fn indexed(values: Vec<T>, indices: Vec<u32>) -> Self {
        Self { values, indices: Some(indices) }
    }

    /// Number of elements after index resolution.
    pub fn len(&self) -> usize {
        self.indices.as_ref().map_or(self.values.len(), Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_indexed(&self) -> bool {
        self.indices.is_some()
    }

    /// Element `i`, resolved through the index buffer.
    pub fn get(&self, i: usize) -> Option<&T> {
        match &self.indices {
            Some(idx) => self.values.get(*idx.get(i)? as usize),
            None => self.values.get(i),
        }
    }

    /// True if every index points into the values.
    pub fn indices_in_range(&self) -> bool {
        self.indices
            .as_ref()
            .is_none_or(|idx| idx.iter().all(|&i| (i as usize) < self.values.len()))
    }
}

impl<T: Clone> IndexedSample<T> {
    /// One value per element, with indices resolved.
    pub fn expanded(&self) -> Option<Vec<T>> {
        (0..self.len()).map(|i| self.get(i).cloned()).collect()
    }
}

impl<T: Lerp + Clone> IndexedSample<T> {
    /// Per-element blend of two samples.
    ///
    /// Returns `None` when the element counts differ.
    pub fn blended(&self, other: &Self, blend: f64) -> Option<Vec<T>> {
        if self.len() != other.len() {
            return None;
        }
        (0..self.len())
            .map(|i| Some(self.get(i)?.interp(other.get(i)?, blend)))
            .collect()
    }
}

/// Typed geometry parameter (normals, UVs).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeomParam<T> {
    #[serde(default)]
    pub scope: GeometryScope,
    pub samples: Property<IndexedSample<T>>,
}

impl<T> GeomParam<T> {
    pub fn new(scope: GeometryScope, samples: Property<IndexedSample<T>>) -> Self {
        Self { scope, samples }
    }

    pub fn constant(scope: GeometryScope, sample: IndexedSample<T>) -> Self {
        Self::new(scope, Property::constant(sample))
    }
}

impl<T: Clone> SampleSource<IndexedSample<T>> for GeomParam<T> {
    fn time_sampling(&self) -> &TimeSampling {
        &self.samples.time_sampling
    }

    fn num_samples(&self) -> usize {
        self.samples.num_samples()
    }

    fn read_sample(&self, index: usize) -> Result<IndexedSample<T>> {
        self.samples.read_sample(index)
    }
}

// ---------------------------------------------------------------------------
// Untyped attribute properties
// ---------------------------------------------------------------------------

/// Raw scalar storage of an attribute sample.
///
/// Values are stored flat; `extent` on the owning property gives the
/// number of scalars per element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AttributeValues {
    Bool(Vec<bool>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    String(Vec<String>),
}

macro_rules! map_values {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            AttributeValues::Bool($v) => AttributeValues::Bool($body),
            AttributeValues::Int($v) => AttributeValues::Int($body),
            AttributeValues::UInt($v) => AttributeValues::UInt($body),
            AttributeValues::Float($v) => AttributeValues::Float($body),
            AttributeValues::Double($v) => AttributeValues::Double($body),
            AttributeValues::String($v) => AttributeValues::String($body),
        }
    };
}

fn gather<T: Clone>(values: &[T], extent: usize, elements: &[usize]) -> Vec<T> {
    let mut out = Vec::with_capacity(elements.len() * extent);
    for &e in elements {
        out.extend_from_slice(&values[e * extent..(e + 1) * extent]);
    }
    out
}

impl AttributeValues {
    /// Number of stored scalars.
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::UInt(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the scalar type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
        }
    }

    /// True for floating point storage, which can be blended.
    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Float(_) | Self::Double(_))
    }

    fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Pick elements (of `extent` scalars each) by element index.
    ///
    /// Callers guarantee every index is in range.
    pub fn gather(&self, extent: usize, elements: &[usize]) -> Self {
        map_values!(self, v => gather(v, extent, elements))
    }
}

impl Lerp for AttributeValues {
    // Discrete data and mismatched buffers fall back to the nearest side.
    fn interp(&self, other: &Self, blend: f64) -> Self {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) if a.len() == b.len() => {
                Self::Float(a.interp(b, blend))
            }
            (Self::Double(a), Self::Double(b)) if a.len() == b.len() => {
                Self::Double(a.interp(b, blend))
            }
            _ if blend > 0.5 => other.clone(),
            _ => self.clone(),
        }
    }
}

/// One sample of an attribute property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeSample {
    pub values: AttributeValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<u32>>,
}

impl AttributeSample {
    pub fn new(values: AttributeValues) -> Self {
        Self { values, indices: None }
    }

    pub fn indexed(values: AttributeValues, indices: Vec<u32>) -> Self {
        Self { values, indices: Some(indices) }
    }

    fn blendable(&self, other: &Self) -> bool {
        self.values.is_continuous()
            && self.values.same_kind(&other.values)
            && self.values.len() == other.values.len()
            && self.indices == other.indices
    }
}

impl Lerp for AttributeSample {
    fn interp(&self, other: &Self, blend: f64) -> Self {
        if self.blendable(other) {
            Self {
                values: self.values.interp(&other.values, blend),
                indices: self.indices.clone(),
            }
        } else if blend > 0.5 {
            other.clone()
        } else {
            self.clone()
        }
    }
}

/// Declared element type of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Bool,
    Int,
    UInt,
    Float,
    Vector2,
    Vector3,
    Rgba,
    Matrix,
    String,
}

impl ElementType {
    /// Element type for a scalar kind and extent, if supported.
    pub fn from_values(values: &AttributeValues, extent: usize) -> Option<Self> {
        let continuous = values.is_continuous();
        match (extent, values) {
            (1, AttributeValues::Bool(_)) => Some(Self::Bool),
            (1, AttributeValues::Int(_)) => Some(Self::Int),
            (1, AttributeValues::UInt(_)) => Some(Self::UInt),
            (1, AttributeValues::String(_)) => Some(Self::String),
            (1, _) if continuous => Some(Self::Float),
            (2, _) if continuous => Some(Self::Vector2),
            (3, _) if continuous => Some(Self::Vector3),
            (4, _) if continuous => Some(Self::Rgba),
            (16, _) if continuous => Some(Self::Matrix),
            _ => None,
        }
    }

    /// Scalars per element.
    pub fn extent(self) -> usize {
        match self {
            Self::Vector2 => 2,
            Self::Vector3 => 3,
            Self::Rgba => 4,
            Self::Matrix => 16,
            _ => 1,
        }
    }
}

fn default_extent() -> usize {
    1
}

/// Time-sampled attribute property (arbitrary geom param or user property).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeProperty {
    pub name: String,
    #[serde(default)]
    pub scope: GeometryScope,
    /// Scalars per element.
    #[serde(default = "default_extent")]
    pub extent: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interpretation: String,
    #[serde(default)]
    pub time_sampling: TimeSampling,
    pub samples: Vec<AttributeSample>,
}

impl AttributeProperty {
    pub fn new(name: impl Into<String>, scope: GeometryScope, extent: usize) -> Self {
        Self {
            name: name.into(),
            scope,
            extent,
            interpretation: String::new(),
            time_sampling: TimeSampling::IDENTITY,
            samples: Vec::new(),
        }
    }

    /// Constant-scope, single-sample property.
    pub fn constant(name: impl Into<String>, values: AttributeValues) -> Self {
        Self::new(name, GeometryScope::Constant, 1).with_sample(values)
    }

    pub fn with_interpretation(mut self, interpretation: impl Into<String>) -> Self {
        self.interpretation = interpretation.into();
        self
    }

    pub fn with_time_sampling(mut self, time_sampling: TimeSampling) -> Self {
        self.time_sampling = time_sampling;
        self
    }

    pub fn with_sample(mut self, values: AttributeValues) -> Self {
        self.samples.push(AttributeSample::new(values));
        self
    }

    pub fn with_indexed_sample(mut self, values: AttributeValues, indices: Vec<u32>) -> Self {
        self.samples.push(AttributeSample::indexed(values, indices));
        self
    }

    /// Element type, derived from the first sample.
    pub fn element_type(&self) -> Option<ElementType> {
        let first = self.samples.first()?;
        ElementType::from_values(&first.values, self.extent)
    }

    /// FaceVarying float 2-vectors tagged as texture coordinates.
    pub fn is_uv_like(&self) -> bool {
        self.scope == GeometryScope::FaceVarying
            && self.element_type() == Some(ElementType::Vector2)
            && self.interpretation == UV_INTERPRETATION
    }

    /// Value at `time`, blended between bracketing samples when allowed.
    pub fn resolve(&self, time: Chrono, allow_interpolation: bool) -> Result<Option<AttributeSample>> {
        let mut series = TimeSampleSeries::new();
        if !series.update(self, time, time, allow_interpolation)? {
            return Ok(None);
        }
        Ok(series.get_samples(time).map(|b| b.interpolate()))
    }
}

impl SampleSource<AttributeSample> for AttributeProperty {
    fn time_sampling(&self) -> &TimeSampling {
        &self.time_sampling
    }

    fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn read_sample(&self, index: usize) -> Result<AttributeSample> {
        self.samples
            .get(index)
            .cloned()
            .ok_or(Error::SampleOutOfBounds {
                index,
                count: self.samples.len(),
            })
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Interpolation category of an output attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeCategory {
    /// One value for the whole shape.
    Object,
    /// One value per face.
    Primitive,
    /// One value per control point.
    Point,
    /// One value per face corner.
    Corner,
}

impl AttributeCategory {
    /// Category for a declared scope. Unknown scopes are unsupported.
    pub fn from_scope(scope: GeometryScope) -> Option<Self> {
        match scope {
            GeometryScope::Constant => Some(Self::Object),
            GeometryScope::Uniform => Some(Self::Primitive),
            GeometryScope::Varying | GeometryScope::Vertex => Some(Self::Point),
            GeometryScope::FaceVarying => Some(Self::Corner),
            GeometryScope::Unknown => None,
        }
    }
}

/// A resolved attribute ready for output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub name: String,
    pub element_type: ElementType,
    pub category: AttributeCategory,
    /// Number of elements after index resolution.
    pub count: usize,
    pub values: AttributeValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<u32>>,
}

impl AttributeRecord {
    /// Build a record from a resolved sample.
    ///
    /// Fails if the value buffer is not a whole number of elements or an
    /// index points past the values.
    pub fn from_sample(
        name: impl Into<String>,
        category: AttributeCategory,
        element_type: ElementType,
        sample: AttributeSample,
    ) -> Result<Self> {
        let name = name.into();
        let extent = element_type.extent();
        let num_values = sample.values.len();
        if num_values % extent != 0 {
            return Err(Error::invalid(format!(
                "attribute '{name}': {num_values} scalars is not a multiple of {extent}"
            )));
        }
        let num_elements = num_values / extent;
        if let Some(idx) = &sample.indices {
            if let Some(bad) = idx.iter().find(|&&i| i as usize >= num_elements) {
                return Err(Error::invalid(format!(
                    "attribute '{name}': index {bad} out of {num_elements} elements"
                )));
            }
        }
        let count = sample.indices.as_ref().map_or(num_elements, Vec::len);
        Ok(Self {
            name,
            element_type,
            category,
            count,
            values: sample.values,
            indices: sample.indices,
        })
    }

    /// Collapse to a single `Object` value holding the first element.
    pub fn into_constant(self) -> Self {
        let first = self
            .indices
            .as_ref()
            .and_then(|idx| idx.first().map(|&i| i as usize))
            .unwrap_or(0);
        let elements = if self.count > 0 { vec![first] } else { Vec::new() };
        Self {
            values: self.values.gather(self.element_type.extent(), &elements),
            count: elements.len(),
            category: AttributeCategory::Object,
            indices: None,
            ..self
        }
    }

    /// Reorder elements so that element `i` moves to `perm[i]`.
    ///
    /// Indexed records permute their index buffer, others their values.
    pub fn reorder(&mut self, perm: &[u32]) {
        if perm.len() != self.count {
            return;
        }
        match &mut self.indices {
            Some(idx) => {
                let mut out = vec![0u32; idx.len()];
                for (i, &p) in perm.iter().enumerate() {
                    out[p as usize] = idx[i];
                }
                *idx = out;
            }
            None => {
                let mut src = vec![0usize; perm.len()];
                for (i, &p) in perm.iter().enumerate() {
                    src[p as usize] = i;
                }
                self.values = self.values.gather(self.element_type.extent(), &src);
            }
        }
    }

    /// Float view of the values (for motion extrapolation inputs).
    pub fn as_f32(&self) -> Option<Vec<f32>> {
        match &self.values {
            AttributeValues::Float(v) => Some(v.clone()),
            AttributeValues::Double(v) => Some(v.iter().map(|&x| x as f32).collect()),
            _ => None,
        }
    }
}

/// Attribute records grouped by category.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeBuckets {
    pub object: Vec<AttributeRecord>,
    pub primitive: Vec<AttributeRecord>,
    pub point: Vec<AttributeRecord>,
    pub corner: Vec<AttributeRecord>,
}

impl AttributeBuckets {
    pub fn bucket(&self, category: AttributeCategory) -> &Vec<AttributeRecord> {
        match category {
            AttributeCategory::Object => &self.object,
            AttributeCategory::Primitive => &self.primitive,
            AttributeCategory::Point => &self.point,
            AttributeCategory::Corner => &self.corner,
        }
    }

    pub fn bucket_mut(&mut self, category: AttributeCategory) -> &mut Vec<AttributeRecord> {
        match category {
            AttributeCategory::Object => &mut self.object,
            AttributeCategory::Primitive => &mut self.primitive,
            AttributeCategory::Point => &mut self.point,
            AttributeCategory::Corner => &mut self.corner,
        }
    }

    /// Insert, replacing a record of the same name in the same bucket.
    pub fn push(&mut self, record: AttributeRecord) {
        let bucket = self.bucket_mut(record.category);
        if let Some(existing) = bucket.iter_mut().find(|r| r.name == record.name) {
            *existing = record;
        } else {
            bucket.push(record);
        }
    }

    pub fn get(&self, category: AttributeCategory, name: &str) -> Option<&AttributeRecord> {
        self.bucket(category).iter().find(|r| r.name == name)
    }

    pub fn contains(&self, category: AttributeCategory, name: &str) -> bool {
        self.get(category, name).is_some()
    }

    pub fn remove(&mut self, category: AttributeCategory, name: &str) -> Option<AttributeRecord> {
        let bucket = self.bucket_mut(category);
        let pos = bucket.iter().position(|r| r.name == name)?;
        Some(bucket.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.object.len() + self.primitive.len() + self.point.len() + self.corner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeRecord> {
        self.object
            .iter()
            .chain(&self.primitive)
            .chain(&self.point)
            .chain(&self.corner)
    }
}

/// Which attributes are read and how their names are cleaned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeFilter {
    pub read_object: bool,
    pub read_primitive: bool,
    pub read_point: bool,
    /// Per-corner (face-varying) attributes.
    pub read_vertex: bool,
    /// Prefixes stripped from attribute names; the first match wins.
    pub remove_prefixes: Vec<String>,
    /// Cleaned names never read.
    pub ignore: Vec<String>,
    /// Cleaned names collapsed to a single object value.
    pub force_constant: Vec<String>,
}

impl Default for AttributeFilter {
    fn default() -> Self {
        Self {
            read_object: true,
            read_primitive: true,
            read_point: true,
            read_vertex: true,
            remove_prefixes: Vec::new(),
            ignore: Vec::new(),
            force_constant: Vec::new(),
        }
    }
}

impl AttributeFilter {
    /// Strip the first matching prefix.
    pub fn clean_name<'a>(&self, name: &'a str) -> &'a str {
        self.remove_prefixes
            .iter()
            .filter(|p| !p.is_empty())
            .find_map(|p| name.strip_prefix(p.as_str()))
            .filter(|n| !n.is_empty())
            .unwrap_or(name)
    }

    fn reads(&self, category: AttributeCategory) -> bool {
        match category {
            AttributeCategory::Object => self.read_object,
            AttributeCategory::Primitive => self.read_primitive,
            AttributeCategory::Point => self.read_point,
            AttributeCategory::Corner => self.read_vertex,
        }
    }
}

/// Where a property goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeRoute {
    /// Dedicated UV-set table, keyed by set name.
    UvSet(String),
    /// Generic attribute bucket.
    Attribute {
        name: String,
        category: AttributeCategory,
        force_constant: bool,
    },
    Skip,
}

/// Attributes resolved at one time.
#[derive(Debug, Default)]
pub struct ClassifiedAttributes<'p> {
    pub buckets: AttributeBuckets,
    pub uv_sets: BTreeMap<String, &'p AttributeProperty>,
}

/// Maps declared scopes to categories and resolves attribute values.
#[derive(Clone, Debug)]
pub struct AttributeClassifier<'a> {
    filter: &'a AttributeFilter,
    reserved: Vec<&'a str>,
}

impl<'a> AttributeClassifier<'a> {
    pub fn new(filter: &'a AttributeFilter) -> Self {
        Self {
            filter,
            reserved: RESERVED_POINT_NAMES.to_vec(),
        }
    }

    /// Treat an extra name (custom velocity/acceleration) as reserved.
    pub fn with_reserved(mut self, name: &'a str) -> Self {
        if !name.is_empty() && !self.reserved.contains(&name) {
            self.reserved.push(name);
        }
        self
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(&name)
    }

    /// Category for a name, scope and element type, honoring the filter.
    pub fn category(
        &self,
        name: &str,
        scope: GeometryScope,
        element_type: Option<ElementType>,
    ) -> Option<AttributeCategory> {
        element_type?;
        let category = AttributeCategory::from_scope(scope)?;
        let name = self.filter.clean_name(name);
        if self.is_reserved(name) {
            return Some(category);
        }
        if self.filter.ignore.iter().any(|n| n == name) || !self.filter.reads(category) {
            return None;
        }
        if self.filter.force_constant.iter().any(|n| n == name) {
            return Some(AttributeCategory::Object);
        }
        Some(category)
    }

    /// Decide where a property goes.
    pub fn route(&self, prop: &AttributeProperty) -> AttributeRoute {
        if prop.is_uv_like() {
            if prop.name == RESERVED_UV_NAME {
                warn!(name = %prop.name, "\"uv\" is a reserved UV set name");
                return AttributeRoute::Skip;
            }
            return AttributeRoute::UvSet(prop.name.clone());
        }

        let Some(element_type) = prop.element_type() else {
            if !prop.samples.is_empty() {
                warn!(
                    name = %prop.name,
                    extent = prop.extent,
                    kind = prop.samples[0].values.kind(),
                    "Skip attribute: unsupported element type"
                );
            }
            return AttributeRoute::Skip;
        };
        let Some(declared) = AttributeCategory::from_scope(prop.scope) else {
            warn!(name = %prop.name, "Skip attribute: unknown scope");
            return AttributeRoute::Skip;
        };

        let name = self.filter.clean_name(&prop.name);
        match self.category(name, prop.scope, Some(element_type)) {
            Some(category) => AttributeRoute::Attribute {
                name: name.to_string(),
                category,
                force_constant: !self.is_reserved(name) && category != declared,
            },
            None => {
                debug!(name = %prop.name, "Attribute filtered out");
                AttributeRoute::Skip
            }
        }
    }

    /// Route and resolve every property at `time`.
    ///
    /// Unsupported or malformed properties are skipped with a warning.
    pub fn classify<'p, I>(&self, props: I, time: Chrono, allow_interpolation: bool) -> ClassifiedAttributes<'p>
    where
        I: IntoIterator<Item = &'p AttributeProperty>,
    {
        let mut out = ClassifiedAttributes::default();

        for prop in props {
            let (name, category, force_constant) = match self.route(prop) {
                AttributeRoute::Skip => continue,
                AttributeRoute::UvSet(set) => {
                    out.uv_sets.insert(set, prop);
                    continue;
                }
                AttributeRoute::Attribute { name, category, force_constant } => {
                    (name, category, force_constant)
                }
            };
            let Some(element_type) = prop.element_type() else {
                continue;
            };

            let sample = match prop.resolve(time, allow_interpolation) {
                Ok(Some(sample)) => sample,
                Ok(None) => continue,
                Err(e) => {
                    warn!(name = %prop.name, error = %e, "Skip attribute: read failed");
                    continue;
                }
            };

            let declared = if force_constant {
                AttributeCategory::from_scope(prop.scope).unwrap_or(category)
            } else {
                category
            };
            match AttributeRecord::from_sample(name, declared, element_type, sample) {
                Ok(record) if force_constant => out.buckets.push(record.into_constant()),
                Ok(record) => out.buckets.push(record),
                Err(e) => warn!(name = %prop.name, error = %e, "Skip attribute"),
            }
        }

        out
    }
}
