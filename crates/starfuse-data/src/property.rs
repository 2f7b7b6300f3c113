//! Typed, provenance-tagged storage slot

use crate::error::{StarError, StarResult};
use crate::origin::{Confidence, Origin};
use crate::schema::{PrintFormat, PropertyDescriptor, PropertyType};

/// Longest string stored without a heap allocation
pub const INLINE_CAPACITY: usize = 7;

/// Short string kept inside the cell
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct InlineStr {
    len: u8,
    bytes: [u8; INLINE_CAPACITY],
}

impl InlineStr {
    pub const EMPTY: InlineStr = InlineStr { len: 0, bytes: [0; INLINE_CAPACITY] };

    pub fn new(text: &str) -> Option<Self> {
        if text.len() > INLINE_CAPACITY {
            return None;
        }
        let mut bytes = [0; INLINE_CAPACITY];
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        Some(Self { len: text.len() as u8, bytes })
    }

    pub fn as_str(&self) -> &str {
        // bytes always come from a whole &str
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }
}

impl std::fmt::Debug for InlineStr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self.as_str(), f)
    }
}

/// Storage of a cell.
///
/// The family (numeric, integer, text) is fixed by the descriptor type when
/// the cell is built. Text cells move between `InlineText` and `OwnedText`
/// as their content grows or shrinks; nothing else changes variant.
#[derive(Clone, Debug)]
pub enum CellValue {
    Numeric { value: f64, error: f64 },
    /// Integers and booleans (0/1)
    Integer(i64),
    InlineText(InlineStr),
    OwnedText(Box<str>),
}

impl CellValue {
    fn empty(kind: PropertyType) -> Self {
        match kind {
            PropertyType::Float => CellValue::Numeric { value: f64::NAN, error: f64::NAN },
            PropertyType::Integer | PropertyType::Boolean => CellValue::Integer(0),
            PropertyType::String => CellValue::InlineText(InlineStr::EMPTY),
        }
    }

    fn text(value: &str) -> Self {
        match InlineStr::new(value) {
            Some(inline) => CellValue::InlineText(inline),
            None => CellValue::OwnedText(value.into()),
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::InlineText(s) => Some(s.as_str()),
            CellValue::OwnedText(s) => Some(s),
            _ => None,
        }
    }

    fn same(&self, other: &CellValue) -> bool {
        match (self, other) {
            (
                CellValue::Numeric { value: v1, error: e1 },
                CellValue::Numeric { value: v2, error: e2 },
            ) => v1.to_bits() == v2.to_bits() && (e1.to_bits() == e2.to_bits() || (e1.is_nan() && e2.is_nan())),
            (CellValue::Integer(a), CellValue::Integer(b)) => a == b,
            _ => match (self.as_text(), other.as_text()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// One value slot of a star record
#[derive(Clone, Debug)]
pub struct PropertyCell {
    value: CellValue,
    index: u16,
    kind: PropertyType,
    origin: Origin,
    confidence: Confidence,
    set: bool,
}

impl PropertyCell {
    pub(crate) fn new(index: usize, kind: PropertyType) -> Self {
        Self {
            value: CellValue::empty(kind),
            index: index as u16,
            kind,
            origin: Origin::None,
            confidence: Confidence::None,
            set: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn kind(&self) -> PropertyType {
        self.kind
    }

    pub fn is_set(&self) -> bool {
        self.set
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// True when the cell owns a heap string
    pub fn is_heap_allocated(&self) -> bool {
        matches!(self.value, CellValue::OwnedText(_))
    }

    pub fn set_string(&mut self, value: &str, origin: Origin, confidence: Confidence, overwrite: bool) -> StarResult<bool> {
        self.expect_kind(PropertyType::String)?;
        if self.set && !overwrite {
            return Ok(false);
        }
        self.value = CellValue::text(value);
        self.mark(origin, confidence);
        Ok(true)
    }

    /// Store a float value; a previous error no longer applies and is dropped
    pub fn set_number(&mut self, value: f64, origin: Origin, confidence: Confidence, overwrite: bool) -> StarResult<bool> {
        self.expect_kind(PropertyType::Float)?;
        if value.is_nan() {
            return Err(StarError::InvalidValue { index: self.index(), reason: "NaN is not a value".into() });
        }
        if self.set && !overwrite {
            return Ok(false);
        }
        self.value = CellValue::Numeric { value, error: f64::NAN };
        self.mark(origin, confidence);
        Ok(true)
    }

    pub fn set_integer(&mut self, value: i64, origin: Origin, confidence: Confidence, overwrite: bool) -> StarResult<bool> {
        self.expect_kind(PropertyType::Integer)?;
        if self.set && !overwrite {
            return Ok(false);
        }
        self.value = CellValue::Integer(value);
        self.mark(origin, confidence);
        Ok(true)
    }

    pub fn set_bool(&mut self, value: bool, origin: Origin, confidence: Confidence, overwrite: bool) -> StarResult<bool> {
        self.expect_kind(PropertyType::Boolean)?;
        if self.set && !overwrite {
            return Ok(false);
        }
        self.value = CellValue::Integer(value as i64);
        self.mark(origin, confidence);
        Ok(true)
    }

    /// Store the uncertainty of a float value. NaN means "error unknown".
    pub fn set_error(&mut self, error: f64, overwrite: bool) -> StarResult<bool> {
        self.expect_kind(PropertyType::Float)?;
        if !self.set {
            return Err(StarError::NotSet { index: self.index() });
        }
        let mismatch = self.mismatch(PropertyType::Float);
        match &mut self.value {
            CellValue::Numeric { error: slot, .. } => {
                if !slot.is_nan() && !overwrite {
                    return Ok(false);
                }
                *slot = error;
                Ok(true)
            }
            _ => Err(mismatch),
        }
    }

    pub fn is_error_set(&self) -> bool {
        self.set && matches!(self.value, CellValue::Numeric { error, .. } if !error.is_nan())
    }

    pub fn value_as_string(&self) -> StarResult<&str> {
        self.readable(PropertyType::String)?;
        self.value.as_text().ok_or_else(|| self.mismatch(PropertyType::String))
    }

    pub fn value_as_number(&self) -> StarResult<f64> {
        self.readable(PropertyType::Float)?;
        match self.value {
            CellValue::Numeric { value, .. } => Ok(value),
            _ => Err(self.mismatch(PropertyType::Float)),
        }
    }

    pub fn value_as_integer(&self) -> StarResult<i64> {
        self.readable(PropertyType::Integer)?;
        match self.value {
            CellValue::Integer(v) => Ok(v),
            _ => Err(self.mismatch(PropertyType::Integer)),
        }
    }

    pub fn value_as_bool(&self) -> StarResult<bool> {
        self.readable(PropertyType::Boolean)?;
        match self.value {
            CellValue::Integer(v) => Ok(v != 0),
            _ => Err(self.mismatch(PropertyType::Boolean)),
        }
    }

    /// Uncertainty of a set float value; NaN when unknown
    pub fn error(&self) -> StarResult<f64> {
        self.readable(PropertyType::Float)?;
        match self.value {
            CellValue::Numeric { error, .. } => Ok(error),
            _ => Err(self.mismatch(PropertyType::Float)),
        }
    }

    /// Value as f64 for float and integer cells, NaN when unset
    pub fn number_or_nan(&self) -> f64 {
        if !self.set {
            return f64::NAN;
        }
        match self.value {
            CellValue::Numeric { value, .. } => value,
            CellValue::Integer(v) => v as f64,
            _ => f64::NAN,
        }
    }

    pub fn error_or_nan(&self) -> f64 {
        match self.value {
            CellValue::Numeric { error, .. } if self.set => error,
            _ => f64::NAN,
        }
    }

    /// Text value, empty when unset
    pub fn text_or_empty(&self) -> &str {
        if !self.set {
            return "";
        }
        self.value.as_text().unwrap_or_default()
    }

    /// Parse raw catalog text according to the cell type.
    ///
    /// Blank text stores nothing and returns `Ok(false)`.
    pub fn parse_and_set(&mut self, text: &str, origin: Origin, confidence: Confidence, overwrite: bool) -> StarResult<bool> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(false);
        }
        match self.kind {
            PropertyType::String => self.set_string(trimmed, origin, confidence, overwrite),
            PropertyType::Float => {
                let value = trimmed.parse::<f64>().map_err(|e| self.invalid(trimmed, e))?;
                self.set_number(value, origin, confidence, overwrite)
            }
            PropertyType::Integer => {
                let value = trimmed.parse::<i64>().map_err(|e| self.invalid(trimmed, e))?;
                self.set_integer(value, origin, confidence, overwrite)
            }
            PropertyType::Boolean => {
                let value = match trimmed.to_ascii_lowercase().as_str() {
                    "1" | "t" | "true" | "y" | "yes" => true,
                    "0" | "f" | "false" | "n" | "no" => false,
                    _ => return Err(self.invalid(trimmed, "not a boolean")),
                };
                self.set_bool(value, origin, confidence, overwrite)
            }
        }
    }

    /// Back to the unset state, releasing any heap string
    pub fn clear(&mut self) {
        self.value = CellValue::empty(self.kind);
        self.origin = Origin::None;
        self.confidence = Confidence::None;
        self.set = false;
    }

    /// Same set flag, provenance and value (errors included)
    pub fn same_content(&self, other: &PropertyCell) -> bool {
        if self.set != other.set {
            return false;
        }
        if !self.set {
            return true;
        }
        self.origin == other.origin && self.confidence == other.confidence && self.value.same(&other.value)
    }

    /// Render the value with the descriptor's format.
    ///
    /// Values that did not come straight from a catalog (computed or
    /// mixed) are printed with full round-trip precision instead.
    pub fn format(&self, descriptor: &PropertyDescriptor) -> String {
        if !self.set {
            return String::new();
        }
        match &self.value {
            CellValue::Numeric { value, .. } => self.format_number(*value, descriptor.format),
            CellValue::Integer(v) if self.kind == PropertyType::Boolean => (*v != 0).to_string(),
            CellValue::Integer(v) => v.to_string(),
            _ => self.text_or_empty().to_string(),
        }
    }

    /// Render the error with the error descriptor's format, empty when unknown
    pub fn format_error(&self, descriptor: &PropertyDescriptor) -> String {
        let error = self.error_or_nan();
        if error.is_nan() {
            return String::new();
        }
        let format = descriptor.error.as_deref().map_or(descriptor.format, |e| e.format);
        self.format_number(error, format)
    }

    fn format_number(&self, value: f64, format: PrintFormat) -> String {
        if !self.origin.is_catalog() {
            return format!("{}", value);
        }
        match format {
            PrintFormat::Fixed(decimals) => format!("{:.*}", decimals as usize, value),
            PrintFormat::Scientific(decimals) => format!("{:.*e}", decimals as usize, value),
            PrintFormat::Integer => format!("{:.0}", value),
            PrintFormat::Text => format!("{}", value),
        }
    }

    fn mark(&mut self, origin: Origin, confidence: Confidence) {
        self.origin = origin;
        self.confidence = confidence;
        self.set = true;
    }

    fn expect_kind(&self, requested: PropertyType) -> StarResult<()> {
        if self.kind == requested {
            Ok(())
        } else {
            Err(self.mismatch(requested))
        }
    }

    fn readable(&self, requested: PropertyType) -> StarResult<()> {
        if !self.set {
            return Err(StarError::NotSet { index: self.index() });
        }
        self.expect_kind(requested)
    }

    fn mismatch(&self, requested: PropertyType) -> StarError {
        StarError::TypeMismatch { index: self.index(), actual: self.kind, requested }
    }

    fn invalid(&self, text: &str, reason: impl std::fmt::Display) -> StarError {
        StarError::InvalidValue { index: self.index(), reason: format!("'{}': {}", text, reason) }
    }
}
