//! Cross-match criteria: decide whether two records describe the same star
//!
//! A [`Criteria`] list is compiled once per comparison session and evaluated
//! pairwise. Spatial criteria always run first since they reject most pairs.

use crate::error::{StarError, StarResult};
use crate::property::PropertyCell;
use crate::schema::{fields, PropertySchema, PropertyType};
use crate::stars::StarRecord;
use serde::{Deserialize, Serialize};
use starfuse_core::coordinates::{angular_distance_deg, ra_difference_deg};
use std::sync::Arc;

/// Magnitude distance reported when the reference magnitude is unknown
pub const UNKNOWN_MAG_DISTANCE: f64 = 3.0;

/// Bounds applied to the magnitude error before scaling by n-sigma
const MAG_ERROR_MIN: f64 = 0.1;
const MAG_ERROR_MAX: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriterionKind {
    /// RA/DEC closeness; circular when `is_radius`, rectangular otherwise
    Spatial,
    NumericDelta,
    StringEquality,
    /// Estimated G magnitude on the left record against Gaia G on the right
    GaiaMagnitude,
}

/// One compiled predicate
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionInfo {
    pub kind: CriterionKind,
    /// Property read on the left record; RA index for spatial criteria
    pub left: usize,
    /// Property read on the right record; DEC index for spatial criteria
    pub right: usize,
    /// Radius, RA tolerance, max delta or n-sigma depending on `kind`
    pub range: f64,
    /// DEC tolerance in box mode
    pub dec_range: f64,
    pub is_radius: bool,
}

/// Result of a pairwise evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Separation in degrees, when a spatial criterion computed it
    pub distance_angular: Option<f64>,
    /// Magnitude distance from the magnitude-consistency criterion
    pub distance_magnitude: Option<f64>,
}

impl MatchResult {
    fn pending() -> Self {
        Self { matched: true, distance_angular: None, distance_magnitude: None }
    }
}

/// Per-criterion failure tallies, owned by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchDiagnostics {
    pub evaluated: u64,
    pub matched: u64,
    pub failures: Vec<u64>,
}

impl MatchDiagnostics {
    pub fn failure_count(&self, criterion: usize) -> u64 {
        self.failures.get(criterion).copied().unwrap_or(0)
    }
}

/// Ordered list of compiled criteria
#[derive(Debug, Clone)]
pub struct Criteria {
    schema_len: usize,
    criteria: Vec<CriterionInfo>,
}

impl Criteria {
    /// Compile from an ordered (property id, tolerance) list.
    ///
    /// `RA` and `DEC` produce a single spatial criterion: a radius search
    /// when both tolerances are equal, a box otherwise. `MAG_G_EST` produces
    /// a magnitude-consistency check with the tolerance as n-sigma. Other
    /// string properties compare for equality and numeric ones by delta.
    /// Tolerances on coordinates are in degrees.
    pub fn compile<S: AsRef<str>>(schema: &Arc<PropertySchema>, entries: &[(S, f64)]) -> StarResult<Self> {
        let mut builder = CriteriaBuilder::new(schema);
        let mut ra_tol = None;
        let mut dec_tol = None;

        for (id, tolerance) in entries {
            let tolerance = *tolerance;
            if tolerance.is_nan() || tolerance < 0.0 {
                return Err(StarError::Configuration(format!(
                    "tolerance for '{}' must be a non-negative number",
                    id.as_ref()
                )));
            }

            builder = match id.as_ref() {
                fields::RA => {
                    ra_tol = Some(tolerance);
                    builder
                }
                fields::DEC => {
                    dec_tol = Some(tolerance);
                    builder
                }
                fields::MAG_G_EST => builder.gaia_magnitude(tolerance)?,
                other => {
                    let index = schema.require(other)?;
                    match schema.descriptor(index).map(|d| d.kind) {
                        Some(PropertyType::String) => builder.string_equality(other)?,
                        _ => builder.numeric_delta(other, other, tolerance)?,
                    }
                }
            };
        }

        builder = match (ra_tol, dec_tol) {
            (Some(ra), Some(dec)) if ra == dec => builder.spatial_radius(ra),
            (Some(ra), Some(dec)) => builder.spatial_box(ra, dec),
            (Some(tol), None) | (None, Some(tol)) => builder.spatial_box(tol, tol),
            (None, None) => builder,
        };

        Ok(builder.build())
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CriterionInfo> {
        self.criteria.iter()
    }

    pub fn has_spatial(&self) -> bool {
        self.criteria.iter().any(|c| c.kind == CriterionKind::Spatial)
    }

    fn check_schema(&self, left: &StarRecord, right: &StarRecord) -> StarResult<()> {
        for len in [left.len(), right.len()] {
            if len != self.schema_len {
                return Err(StarError::SchemaMismatch { left: self.schema_len, right: len });
            }
        }
        Ok(())
    }

    /// Evaluate, stopping at the first failing criterion
    pub fn evaluate(&self, left: &StarRecord, right: &StarRecord) -> StarResult<MatchResult> {
        self.check_schema(left, right)?;

        let mut result = MatchResult::pending();
        for criterion in &self.criteria {
            if !check(criterion, left, right, &mut result, false) {
                result.matched = false;
                break;
            }
        }
        Ok(result)
    }

    /// Evaluate every criterion and tally failures.
    ///
    /// Slower than [`Criteria::evaluate`]: nothing short-circuits and the
    /// angular separation is computed in box mode too.
    pub fn evaluate_with(&self, left: &StarRecord, right: &StarRecord, diagnostics: &mut MatchDiagnostics) -> StarResult<MatchResult> {
        self.check_schema(left, right)?;

        if diagnostics.failures.len() < self.criteria.len() {
            diagnostics.failures.resize(self.criteria.len(), 0);
        }
        diagnostics.evaluated += 1;

        let mut result = MatchResult::pending();
        for (i, criterion) in self.criteria.iter().enumerate() {
            if !check(criterion, left, right, &mut result, true) {
                result.matched = false;
                diagnostics.failures[i] += 1;
            }
        }

        if result.matched {
            diagnostics.matched += 1;
        }
        Ok(result)
    }
}

fn check(c: &CriterionInfo, left: &StarRecord, right: &StarRecord, result: &mut MatchResult, full: bool) -> bool {
    match c.kind {
        CriterionKind::Spatial => check_spatial(c, left, right, result, full),
        CriterionKind::NumericDelta => {
            let a = cell(left, c.left).number_or_nan();
            let b = cell(right, c.right).number_or_nan();
            // NaN (unset) fails the comparison
            (a - b).abs() <= c.range
        }
        CriterionKind::StringEquality => {
            cell(left, c.left).text_or_empty() == cell(right, c.right).text_or_empty()
        }
        CriterionKind::GaiaMagnitude => check_gaia_magnitude(c, cell(left, c.left), cell(right, c.right), result),
    }
}

fn cell(star: &StarRecord, index: usize) -> &PropertyCell {
    // indices were validated against the schema length at compile time
    &star.cells()[index]
}

fn check_spatial(c: &CriterionInfo, left: &StarRecord, right: &StarRecord, result: &mut MatchResult, full: bool) -> bool {
    let (Ok(a), Ok(b)) = (left.position(), right.position()) else {
        return false;
    };

    if c.is_radius || full {
        let separation = angular_distance_deg(a.ra, a.dec, b.ra, b.dec);
        result.distance_angular = Some(separation);
        if c.is_radius {
            return separation <= c.range;
        }
    }

    (a.dec - b.dec).abs() <= c.dec_range && ra_difference_deg(a.ra, b.ra) <= c.range
}

fn check_gaia_magnitude(c: &CriterionInfo, estimate: &PropertyCell, reference: &PropertyCell, result: &mut MatchResult) -> bool {
    if !reference.is_set() {
        // no ground truth: accept tentatively at a large distance
        result.distance_magnitude = Some(UNKNOWN_MAG_DISTANCE);
        return true;
    }
    if !estimate.is_set() {
        return false;
    }

    let error = reference.error_or_nan().max(estimate.error_or_nan());
    let error = if error.is_nan() { MAG_ERROR_MIN } else { error.clamp(MAG_ERROR_MIN, MAG_ERROR_MAX) };
    let threshold = c.range * error;

    let distance = (estimate.number_or_nan() - reference.number_or_nan()).abs();
    result.distance_magnitude = Some(distance);
    distance <= threshold
}

/// Explicit construction of a criteria list
pub struct CriteriaBuilder<'a> {
    schema: &'a Arc<PropertySchema>,
    criteria: Vec<CriterionInfo>,
}

impl<'a> CriteriaBuilder<'a> {
    pub fn new(schema: &'a Arc<PropertySchema>) -> Self {
        Self { schema, criteria: Vec::new() }
    }

    /// Circular search, radius in degrees
    pub fn spatial_radius(mut self, radius_deg: f64) -> Self {
        self.criteria.push(self.spatial(radius_deg, radius_deg, true));
        self
    }

    /// Rectangular search, tolerances in degrees
    pub fn spatial_box(mut self, ra_deg: f64, dec_deg: f64) -> Self {
        self.criteria.push(self.spatial(ra_deg, dec_deg, false));
        self
    }

    fn spatial(&self, range: f64, dec_range: f64, is_radius: bool) -> CriterionInfo {
        CriterionInfo {
            kind: CriterionKind::Spatial,
            left: self.schema.ra_index(),
            right: self.schema.dec_index(),
            range,
            dec_range,
            is_radius,
        }
    }

    /// `|left[left_id] - right[right_id]| <= range`
    pub fn numeric_delta(mut self, left_id: &str, right_id: &str, range: f64) -> StarResult<Self> {
        let left = self.typed(left_id, &[PropertyType::Float, PropertyType::Integer, PropertyType::Boolean])?;
        let right = self.typed(right_id, &[PropertyType::Float, PropertyType::Integer, PropertyType::Boolean])?;
        self.criteria.push(CriterionInfo {
            kind: CriterionKind::NumericDelta,
            left,
            right,
            range,
            dec_range: 0.0,
            is_radius: false,
        });
        Ok(self)
    }

    pub fn string_equality(mut self, id: &str) -> StarResult<Self> {
        let index = self.typed(id, &[PropertyType::String])?;
        self.criteria.push(CriterionInfo {
            kind: CriterionKind::StringEquality,
            left: index,
            right: index,
            range: 0.0,
            dec_range: 0.0,
            is_radius: false,
        });
        Ok(self)
    }

    /// Estimated G (left record) against catalog G (right record)
    pub fn gaia_magnitude(mut self, n_sigma: f64) -> StarResult<Self> {
        let left = self.typed(fields::MAG_G_EST, &[PropertyType::Float])?;
        let right = self.typed(fields::MAG_G, &[PropertyType::Float])?;
        self.criteria.push(CriterionInfo {
            kind: CriterionKind::GaiaMagnitude,
            left,
            right,
            range: n_sigma,
            dec_range: 0.0,
            is_radius: false,
        });
        Ok(self)
    }

    fn typed(&self, id: &str, allowed: &[PropertyType]) -> StarResult<usize> {
        let index = self.schema.require(id)?;
        let kind = self.schema.descriptor(index).map(|d| d.kind);
        match kind {
            Some(kind) if allowed.contains(&kind) => Ok(index),
            _ => Err(StarError::Configuration(format!(
                "property '{}' cannot be used by this criterion",
                id
            ))),
        }
    }

    pub fn build(mut self) -> Criteria {
        // stable: spatial first, the rest in caller order
        self.criteria.sort_by_key(|c| c.kind != CriterionKind::Spatial);
        Criteria { schema_len: self.schema.len(), criteria: self.criteria }
    }
}
