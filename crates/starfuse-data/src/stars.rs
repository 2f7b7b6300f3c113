//! Star records: one cell per schema property

use crate::error::{StarError, StarResult};
use crate::merge::{self, OverwritePolicy, PropertyMask};
use crate::origin::{Confidence, Origin};
use crate::property::PropertyCell;
use crate::schema::PropertySchema;
use starfuse_core::coordinates::{format_dec, format_ra, parse_dec, parse_ra};
use starfuse_core::EquatorialPosition;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Bit pattern of the quiet NaN marking an empty coordinate cache
const UNSET: u64 = 0x7ff8_0000_0000_0000;

/// Outcome of resolving a coordinate through the normalizing accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Stored text was already canonical sexagesimal
    Canonical,
    /// Stored text was rewritten to canonical sexagesimal
    Rewritten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Ra,
    Dec,
}

impl Axis {
    fn name(self) -> &'static str {
        match self {
            Axis::Ra => "RA",
            Axis::Dec => "DEC",
        }
    }

    fn other(self) -> Axis {
        match self {
            Axis::Ra => Axis::Dec,
            Axis::Dec => Axis::Ra,
        }
    }
}

/// A catalog object: fixed-size cell array laid out on a shared schema.
///
/// RA/DEC are stored as text and parsed lazily. The parsed degrees are
/// memoized in atomic caches so that `&StarRecord` can be read from several
/// threads; the caches are reset by every write to the RA or DEC cell made
/// through this type, so they never disagree with the stored text.
#[derive(Debug)]
pub struct StarRecord {
    schema: Arc<PropertySchema>,
    cells: Box<[PropertyCell]>,
    ra_cache: AtomicU64,
    dec_cache: AtomicU64,
}

impl Clone for StarRecord {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            cells: self.cells.clone(),
            ra_cache: AtomicU64::new(self.ra_cache.load(Ordering::Relaxed)),
            dec_cache: AtomicU64::new(self.dec_cache.load(Ordering::Relaxed)),
        }
    }
}

impl StarRecord {
    pub fn new(schema: Arc<PropertySchema>) -> Self {
        let cells = schema
            .descriptors()
            .enumerate()
            .map(|(index, d)| PropertyCell::new(index, d.kind))
            .collect();

        Self {
            schema,
            cells,
            ra_cache: AtomicU64::new(UNSET),
            dec_cache: AtomicU64::new(UNSET),
        }
    }

    /// Record on the process-wide standard schema
    pub fn standard() -> Self {
        Self::new(PropertySchema::standard())
    }

    pub fn schema(&self) -> &Arc<PropertySchema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[PropertyCell] {
        &self.cells
    }

    pub fn get(&self, index: usize) -> Option<&PropertyCell> {
        self.cells.get(index)
    }

    pub fn get_by_id(&self, id: &str) -> Option<&PropertyCell> {
        self.schema.index_of(id).and_then(|i| self.cells.get(i))
    }

    /// Mutable cell access; writing RA or DEC this way drops the caches
    pub fn cell_mut(&mut self, index: usize) -> Option<&mut PropertyCell> {
        self.invalidate(index);
        self.cells.get_mut(index)
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.cells.get(index).is_some_and(|c| c.is_set())
    }

    fn cell_for_write(&mut self, index: usize) -> StarResult<&mut PropertyCell> {
        let len = self.cells.len();
        self.cell_mut(index)
            .ok_or_else(|| StarError::Configuration(format!("property #{} outside a {}-field schema", index, len)))
    }

    fn cell(&self, index: usize) -> StarResult<&PropertyCell> {
        self.cells
            .get(index)
            .ok_or_else(|| StarError::Configuration(format!("property #{} outside a {}-field schema", index, self.cells.len())))
    }

    pub fn set_string(&mut self, index: usize, value: &str, origin: Origin, confidence: Confidence, overwrite: bool) -> StarResult<bool> {
        self.cell_for_write(index)?.set_string(value, origin, confidence, overwrite)
    }

    pub fn set_number(&mut self, index: usize, value: f64, origin: Origin, confidence: Confidence, overwrite: bool) -> StarResult<bool> {
        self.cell_for_write(index)?.set_number(value, origin, confidence, overwrite)
    }

    pub fn set_integer(&mut self, index: usize, value: i64, origin: Origin, confidence: Confidence, overwrite: bool) -> StarResult<bool> {
        self.cell_for_write(index)?.set_integer(value, origin, confidence, overwrite)
    }

    pub fn set_bool(&mut self, index: usize, value: bool, origin: Origin, confidence: Confidence, overwrite: bool) -> StarResult<bool> {
        self.cell_for_write(index)?.set_bool(value, origin, confidence, overwrite)
    }

    pub fn set_error(&mut self, index: usize, error: f64, overwrite: bool) -> StarResult<bool> {
        self.cell_for_write(index)?.set_error(error, overwrite)
    }

    /// Parse raw catalog text into the property, typed by the schema
    pub fn parse_and_set(&mut self, index: usize, text: &str, origin: Origin, confidence: Confidence, overwrite: bool) -> StarResult<bool> {
        self.cell_for_write(index)?.parse_and_set(text, origin, confidence, overwrite)
    }

    pub fn clear_property(&mut self, index: usize) -> StarResult<()> {
        self.cell_for_write(index)?.clear();
        Ok(())
    }

    /// Reset every cell and both coordinate caches
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(PropertyCell::clear);
        self.reset_caches();
    }

    pub fn number(&self, index: usize) -> StarResult<f64> {
        self.cell(index)?.value_as_number()
    }

    pub fn text(&self, index: usize) -> StarResult<&str> {
        self.cell(index)?.value_as_string()
    }

    pub fn integer(&self, index: usize) -> StarResult<i64> {
        self.cell(index)?.value_as_integer()
    }

    fn invalidate(&mut self, index: usize) {
        if index == self.schema.ra_index() || index == self.schema.dec_index() {
            self.reset_caches();
        }
    }

    fn reset_caches(&mut self) {
        *self.ra_cache.get_mut() = UNSET;
        *self.dec_cache.get_mut() = UNSET;
    }

    fn cache(&self, axis: Axis) -> &AtomicU64 {
        match axis {
            Axis::Ra => &self.ra_cache,
            Axis::Dec => &self.dec_cache,
        }
    }

    fn cached(&self, axis: Axis) -> Option<f64> {
        let bits = self.cache(axis).load(Ordering::Relaxed);
        (bits != UNSET).then(|| f64::from_bits(bits))
    }

    fn axis_index(&self, axis: Axis) -> usize {
        match axis {
            Axis::Ra => self.schema.ra_index(),
            Axis::Dec => self.schema.dec_index(),
        }
    }

    fn parse_axis(&self, axis: Axis) -> StarResult<f64> {
        let cell = &self.cells[self.axis_index(axis)];
        if !cell.is_set() {
            return Err(StarError::MissingCoordinate(axis.name()));
        }
        let text = cell.value_as_string()?;
        let degrees = match axis {
            Axis::Ra => parse_ra(text)?,
            Axis::Dec => parse_dec(text)?,
        };
        Ok(degrees)
    }

    fn resolve(&self, axis: Axis) -> StarResult<f64> {
        if let Some(degrees) = self.cached(axis) {
            return Ok(degrees);
        }

        let degrees = self.parse_axis(axis)?;
        self.cache(axis).store(degrees.to_bits(), Ordering::Relaxed);

        // fill the other axis too so both caches leave the sentinel together
        let other = axis.other();
        if self.cached(other).is_none() {
            if let Ok(value) = self.parse_axis(other) {
                self.cache(other).store(value.to_bits(), Ordering::Relaxed);
            }
        }

        Ok(degrees)
    }

    /// Right ascension in degrees, from cache when possible
    pub fn ra_deg(&self) -> StarResult<f64> {
        self.resolve(Axis::Ra)
    }

    /// Declination in degrees, from cache when possible
    pub fn dec_deg(&self) -> StarResult<f64> {
        self.resolve(Axis::Dec)
    }

    pub fn position(&self) -> StarResult<EquatorialPosition> {
        Ok(EquatorialPosition::new(self.ra_deg()?, self.dec_deg()?))
    }

    /// RA in degrees, rewriting the stored text to "HH MM SS.sss" if needed
    pub fn ra_degrees(&mut self) -> StarResult<(f64, Normalization)> {
        self.normalize(Axis::Ra)
    }

    /// DEC in degrees, rewriting the stored text to "+DD MM SS.ss" if needed
    pub fn dec_degrees(&mut self) -> StarResult<(f64, Normalization)> {
        self.normalize(Axis::Dec)
    }

    fn normalize(&mut self, axis: Axis) -> StarResult<(f64, Normalization)> {
        let degrees = self.resolve(axis)?;
        let canonical = match axis {
            Axis::Ra => format_ra(degrees),
            Axis::Dec => format_dec(degrees),
        };

        // bypass cell_mut: the other axis stays cached
        let index = self.axis_index(axis);
        let cell = &mut self.cells[index];
        if cell.value_as_string()? == canonical {
            return Ok((degrees, Normalization::Canonical));
        }

        tracing::debug!("{} '{}' normalized to '{}'", axis.name(), cell.text_or_empty(), canonical);
        let (origin, confidence) = (cell.origin(), cell.confidence());
        cell.set_string(&canonical, origin, confidence, true)?;

        // rounding to canonical precision moves the angle; cache what is stored now
        let degrees = match axis {
            Axis::Ra => parse_ra(&canonical)?,
            Axis::Dec => parse_dec(&canonical)?,
        };
        self.cache(axis).store(degrees.to_bits(), Ordering::Relaxed);

        Ok((degrees, Normalization::Rewritten))
    }

    /// Proper motion in RA without the cos(DEC) factor catalogs apply.
    ///
    /// Missing proper motion is common and reads as 0.
    pub fn proper_motion_ra(&self) -> StarResult<f64> {
        let pm = match self.schema.pmra_index().map(|i| &self.cells[i]) {
            Some(cell) if cell.is_set() => cell.value_as_number()?,
            _ => return Ok(0.0),
        };
        let dec = self.dec_deg()?;
        Ok(pm / dec.to_radians().cos())
    }

    /// Identifier used in logs and exports.
    ///
    /// Priority: SIMBAD name, HD, HIP, 2MASS, Gaia DR3, TYC, WDS, then the
    /// raw "RA DEC" text, then "unknown". Exported files rely on this order.
    pub fn resolve_display_id(&self) -> String {
        for &(index, prefix) in self.schema.identifier_chain() {
            let text = self.cells[index].text_or_empty().trim();
            if text.is_empty() {
                continue;
            }
            return if prefix.is_empty() {
                text.to_string()
            } else {
                format!("{} {}", prefix, text)
            };
        }

        let ra = self.cells[self.schema.ra_index()].text_or_empty();
        let dec = self.cells[self.schema.dec_index()].text_or_empty();
        if !ra.is_empty() && !dec.is_empty() {
            return format!("{} {}", ra, dec);
        }

        "unknown".to_string()
    }

    /// Exact duplicate test: both positions resolve to bit-identical degrees
    pub fn same_position_as(&self, other: &StarRecord) -> bool {
        match (self.position(), other.position()) {
            (Ok(a), Ok(b)) => a.ra.to_bits() == b.ra.to_bits() && a.dec.to_bits() == b.dec.to_bits(),
            _ => false,
        }
    }

    /// Fold `source` into this record, see [`merge::update`]
    pub fn update_from(&mut self, source: &StarRecord, policy: OverwritePolicy, mask: Option<&PropertyMask>) -> StarResult<bool> {
        merge::update(self, source, policy, mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fields;
    use approx::assert_relative_eq;

    fn idx(id: &str) -> usize {
        PropertySchema::standard().index_of(id).unwrap()
    }

    fn star(ra: &str, dec: &str) -> StarRecord {
        let mut s = StarRecord::standard();
        s.set_string(idx(fields::RA), ra, Origin::Gaia, Confidence::High, false).unwrap();
        s.set_string(idx(fields::DEC), dec, Origin::Gaia, Confidence::High, false).unwrap();
        s
    }

    #[test]
    fn test_new_record_covers_schema() {
        let s = StarRecord::standard();
        assert_eq!(s.len(), PropertySchema::standard().len());
        assert!(s.cells().iter().all(|c| !c.is_set()));
        assert!(s.get(s.len()).is_none());
        assert_eq!(s.get_by_id(fields::MAG_V).unwrap().index(), idx(fields::MAG_V));
    }

    #[test]
    fn test_normalize_ra_without_seconds() {
        let mut s = star("12 30", "+20 00 00.00");
        let (deg, status) = s.ra_degrees().unwrap();
        assert_eq!(status, Normalization::Rewritten);
        assert_eq!(deg, parse_ra("12 30 00.000").unwrap());
        assert_eq!(s.text(idx(fields::RA)).unwrap(), "12 30 00.000");

        let (again, status) = s.ra_degrees().unwrap();
        assert_eq!(status, Normalization::Canonical);
        assert_eq!(again, deg);

        // rewrite keeps provenance
        let cell = s.get(idx(fields::RA)).unwrap();
        assert_eq!(cell.origin(), Origin::Gaia);
        assert_eq!(cell.confidence(), Confidence::High);
    }

    #[test]
    fn test_normalize_caches_rounded_angle() {
        let mut s = star("10 00 00.0004", "+20 00 00.004");
        let (ra, status) = s.ra_degrees().unwrap();
        assert_eq!(status, Normalization::Rewritten);
        assert_eq!(s.text(idx(fields::RA)).unwrap(), "10 00 00.000");
        assert_eq!(ra, parse_ra("10 00 00.000").unwrap());
        assert_eq!(s.ra_deg().unwrap(), ra);

        let (dec, status) = s.dec_degrees().unwrap();
        assert_eq!(status, Normalization::Rewritten);
        assert_eq!(s.text(idx(fields::DEC)).unwrap(), "+20 00 00.00");
        assert_eq!(s.dec_deg().unwrap(), dec);
        assert_eq!(dec, parse_dec("+20 00 00.00").unwrap());

        assert!(s.same_position_as(&star("10 00 00.000", "+20 00 00.00")));
    }

    #[test]
    fn test_normalize_wraps_past_midnight() {
        let mut s = star("23 59 59.9996", "+10 00 00.00");
        let (ra, status) = s.ra_degrees().unwrap();
        assert_eq!(status, Normalization::Rewritten);
        assert_eq!(s.text(idx(fields::RA)).unwrap(), "00 00 00.000");
        assert_eq!(ra, 0.0);
        assert_eq!(s.ra_deg().unwrap(), 0.0);
        assert!(s.same_position_as(&star("00 00 00.000", "+10 00 00.00")));
    }

    #[test]
    fn test_normalize_dec() {
        let mut s = star("10 00 00.000", "-05:30");
        let (deg, status) = s.dec_degrees().unwrap();
        assert_eq!(status, Normalization::Rewritten);
        assert_relative_eq!(deg, -5.5);
        assert_eq!(s.text(idx(fields::DEC)).unwrap(), "-05 30 00.00");
        assert_eq!(s.dec_degrees().unwrap().1, Normalization::Canonical);
    }

    #[test]
    fn test_missing_coordinate() {
        let mut s = StarRecord::standard();
        assert_eq!(s.ra_degrees(), Err(StarError::MissingCoordinate("RA")));
        assert_eq!(s.dec_deg(), Err(StarError::MissingCoordinate("DEC")));
        assert!(s.position().is_err());
    }

    #[test]
    fn test_malformed_coordinate() {
        let s = star("not a ra", "+10 00 00");
        assert!(matches!(s.ra_deg(), Err(StarError::Coordinate(_))));
    }

    #[test]
    fn test_caches_fill_together_and_reset_on_write() {
        let mut s = star("10 00 00.000", "+20 00 00.00");
        assert!(s.cached(Axis::Ra).is_none() && s.cached(Axis::Dec).is_none());

        s.ra_deg().unwrap();
        assert_relative_eq!(s.cached(Axis::Ra).unwrap(), 150.0);
        assert_relative_eq!(s.cached(Axis::Dec).unwrap(), 20.0);

        s.set_string(idx(fields::DEC), "+21 00 00.00", Origin::User, Confidence::High, true).unwrap();
        assert!(s.cached(Axis::Ra).is_none() && s.cached(Axis::Dec).is_none());
        assert_relative_eq!(s.dec_deg().unwrap(), 21.0);

        // writes elsewhere keep the cache
        s.set_number(idx(fields::MAG_V), 5.0, Origin::User, Confidence::High, false).unwrap();
        assert!(s.cached(Axis::Dec).is_some());
    }

    #[test]
    fn test_proper_motion_ra() {
        let mut s = star("10 00 00.000", "+60 00 00.00");
        assert_eq!(s.proper_motion_ra().unwrap(), 0.0);

        s.set_number(idx(fields::PMRA), 50.0, Origin::Gaia, Confidence::High, false).unwrap();
        assert_relative_eq!(s.proper_motion_ra().unwrap(), 100.0, epsilon = 1e-9);

        let mut no_dec = StarRecord::standard();
        no_dec.set_number(idx(fields::PMRA), 50.0, Origin::Gaia, Confidence::High, false).unwrap();
        assert_eq!(no_dec.proper_motion_ra(), Err(StarError::MissingCoordinate("DEC")));
    }

    #[test]
    fn test_display_id_priority() {
        let mut s = StarRecord::standard();
        assert_eq!(s.resolve_display_id(), "unknown");

        s.set_string(idx(fields::RA), "10 00 00.000", Origin::Gaia, Confidence::High, false).unwrap();
        assert_eq!(s.resolve_display_id(), "unknown");
        s.set_string(idx(fields::DEC), "+20 00 00.00", Origin::Gaia, Confidence::High, false).unwrap();
        assert_eq!(s.resolve_display_id(), "10 00 00.000 +20 00 00.00");

        s.set_string(idx(fields::ID_TYC), "1234-567-1", Origin::Tycho2, Confidence::High, false).unwrap();
        assert_eq!(s.resolve_display_id(), "TYC 1234-567-1");

        s.set_string(idx(fields::ID_GAIA), "4295806720", Origin::Gaia, Confidence::High, false).unwrap();
        assert_eq!(s.resolve_display_id(), "Gaia DR3 4295806720");

        s.set_string(idx(fields::ID_HIP), "8102", Origin::Hipparcos, Confidence::High, false).unwrap();
        assert_eq!(s.resolve_display_id(), "HIP 8102");

        s.set_string(idx(fields::ID_HD), "10700", Origin::Simbad, Confidence::High, false).unwrap();
        assert_eq!(s.resolve_display_id(), "HD 10700");

        s.set_string(idx(fields::ID_SIMBAD), "* tau Cet", Origin::Simbad, Confidence::High, false).unwrap();
        assert_eq!(s.resolve_display_id(), "* tau Cet");
    }

    #[test]
    fn test_same_position() {
        let a = star("10 00 00.000", "+20 00 00.00");
        let b = star("10:00:00", "+20 00 00");
        let c = star("10 00 00.001", "+20 00 00.00");
        assert!(a.same_position_as(&b));
        assert!(!a.same_position_as(&c));
        assert!(!a.same_position_as(&StarRecord::standard()));
    }

    #[test]
    fn test_clone_is_deep() {
        let mut a = star("10 00 00.000", "+20 00 00.00");
        a.set_string(idx(fields::OBJ_TYPES), "*,PM*,IR,UV", Origin::Simbad, Confidence::High, false).unwrap();
        a.ra_deg().unwrap();

        let b = a.clone();
        a.clear();
        assert!(!a.is_set(idx(fields::OBJ_TYPES)));
        assert!(a.cached(Axis::Ra).is_none());
        assert_eq!(b.text(idx(fields::OBJ_TYPES)).unwrap(), "*,PM*,IR,UV");
        assert_relative_eq!(b.cached(Axis::Ra).unwrap(), 150.0);
    }

    #[test]
    fn test_record_is_sync() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<StarRecord>();
    }
}
