//! Property schema registry
//!
//! Every star record is an array of cells laid out against one
//! [`PropertySchema`]. Fields are registered once, in a fixed order, on a
//! [`SchemaBuilder`]; the order of registration is the schema index used by
//! records, criteria and merges. Once finalized the schema is immutable and
//! shared through `Arc`.

use crate::error::{StarError, StarResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Well-known property ids of the standard schema
pub mod fields {
    pub const ID_SIMBAD: &str = "ID_SIMBAD";
    pub const ID_HD: &str = "ID_HD";
    pub const ID_HIP: &str = "ID_HIP";
    pub const ID_TYC: &str = "ID_TYC";
    pub const ID_2MASS: &str = "ID_2MASS";
    pub const ID_GAIA: &str = "ID_GAIA";
    pub const ID_WDS: &str = "ID_WDS";

    pub const RA: &str = "RA";
    pub const DEC: &str = "DEC";
    pub const PMRA: &str = "PMRA";
    pub const PMDEC: &str = "PMDEC";
    pub const PLX: &str = "PLX";

    pub const SP_TYPE: &str = "SP_TYPE";
    pub const OBJ_TYPES: &str = "OBJ_TYPES";
    pub const BINARY_FLAG: &str = "BINARY_FLAG";

    pub const MAG_B: &str = "MAG_B";
    pub const MAG_V: &str = "MAG_V";
    pub const MAG_R: &str = "MAG_R";
    pub const MAG_I: &str = "MAG_I";
    pub const MAG_J: &str = "MAG_J";
    pub const MAG_H: &str = "MAG_H";
    pub const MAG_K: &str = "MAG_K";
    pub const MAG_G: &str = "MAG_G";
    /// G magnitude estimated from other bands
    pub const MAG_G_EST: &str = "MAG_G_EST";

    pub const XM_SEP: &str = "XM_SEP";
    pub const XM_N_MATES: &str = "XM_N_MATES";
    pub const GROUP_SIZE: &str = "GROUP_SIZE";

    /// Internal fields that merges always overwrite, whatever the policy
    pub const BOOKKEEPING: [&str; 3] = [XM_SEP, XM_N_MATES, GROUP_SIZE];

    /// Display identifier priority: (field, prefix), most stable first
    pub const IDENTIFIER_CHAIN: [(&str, &str); 7] = [
        (ID_SIMBAD, ""),
        (ID_HD, "HD"),
        (ID_HIP, "HIP"),
        (ID_2MASS, "2MASS"),
        (ID_GAIA, "Gaia DR3"),
        (ID_TYC, "TYC"),
        (ID_WDS, "WDS"),
    ];
}

/// Declared value type of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PropertyType {
    String,
    Float,
    Integer,
    Boolean,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::String => "string",
            PropertyType::Float => "float",
            PropertyType::Integer => "integer",
            PropertyType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// How catalog values of a property are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintFormat {
    /// Fixed-point with N decimals
    Fixed(u8),
    /// Scientific notation with N decimals
    Scientific(u8),
    Integer,
    Text,
}

impl PrintFormat {
    fn default_for(kind: PropertyType) -> Self {
        match kind {
            PropertyType::Float => PrintFormat::Fixed(3),
            PropertyType::Integer => PrintFormat::Integer,
            PropertyType::String | PropertyType::Boolean => PrintFormat::Text,
        }
    }
}

/// Immutable description of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub id: String,
    pub display_name: String,
    pub kind: PropertyType,
    pub unit: String,
    pub format: PrintFormat,
    /// Companion uncertainty, only for float properties
    pub error: Option<Box<PropertyDescriptor>>,
    pub description: String,
    /// URL template, `{value}` is replaced by the formatted value
    pub link: Option<String>,
}

impl PropertyDescriptor {
    pub fn new(id: &str, display_name: &str, kind: PropertyType) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            kind,
            unit: String::new(),
            format: PrintFormat::default_for(kind),
            error: None,
            description: String::new(),
            link: None,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn with_format(mut self, format: PrintFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_link(mut self, template: &str) -> Self {
        self.link = Some(template.to_string());
        self
    }

    /// Attach an uncertainty companion sharing this field's unit and format
    pub fn with_error(mut self, id: &str, display_name: &str) -> Self {
        let error = PropertyDescriptor::new(id, display_name, PropertyType::Float)
            .with_unit(&self.unit)
            .with_format(self.format)
            .with_description(&format!("Uncertainty on {}", self.display_name));
        self.error = Some(Box::new(error));
        self
    }

    pub fn error_id(&self) -> Option<&str> {
        self.error.as_deref().map(|e| e.id.as_str())
    }

    /// Expand the link template for a given value
    pub fn link_for(&self, value: &str) -> Option<String> {
        self.link.as_ref().map(|t| t.replace("{value}", value))
    }
}

/// Machine-readable field summary written for documentation tooling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub index: usize,
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    pub unit: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
}

/// Mutable registration stage of a schema
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    descriptors: Vec<PropertyDescriptor>,
    by_id: HashMap<String, usize>,
    by_error_id: HashMap<String, usize>,
    finalized: bool,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor and return its schema index
    pub fn register(&mut self, descriptor: PropertyDescriptor) -> StarResult<usize> {
        if self.finalized {
            return Err(StarError::Configuration(format!(
                "cannot register '{}' after the schema was finalized",
                descriptor.id
            )));
        }

        let index = self.descriptors.len();
        if index > u16::MAX as usize {
            return Err(StarError::Configuration("schema holds too many properties".into()));
        }
        if self.is_taken(&descriptor.id) {
            return Err(StarError::Configuration(format!(
                "property '{}' is already registered",
                descriptor.id
            )));
        }

        if let Some(error_id) = descriptor.error_id() {
            if descriptor.kind != PropertyType::Float {
                return Err(StarError::Configuration(format!(
                    "property '{}' is {} and cannot carry an error",
                    descriptor.id, descriptor.kind
                )));
            }
            if error_id == descriptor.id || self.is_taken(error_id) {
                return Err(StarError::Configuration(format!(
                    "error property '{}' is already registered",
                    error_id
                )));
            }
            self.by_error_id.insert(error_id.to_string(), index);
        }

        tracing::debug!("Registered property #{} '{}' ({})", index, descriptor.id, descriptor.kind);

        self.by_id.insert(descriptor.id.clone(), index);
        self.descriptors.push(descriptor);
        Ok(index)
    }

    fn is_taken(&self, id: &str) -> bool {
        self.by_id.contains_key(id) || self.by_error_id.contains_key(id)
    }

    /// Freeze the registry; no property may be added afterwards
    pub fn finalize(&mut self) -> StarResult<Arc<PropertySchema>> {
        if self.finalized {
            return Err(StarError::Configuration("schema already finalized".into()));
        }

        let ra = self.required_text_field(fields::RA)?;
        let dec = self.required_text_field(fields::DEC)?;
        let pmra = self.by_id.get(fields::PMRA).copied();

        let bookkeeping = fields::BOOKKEEPING
            .iter()
            .filter_map(|id| self.by_id.get(*id).copied())
            .collect();

        let identifiers = fields::IDENTIFIER_CHAIN
            .iter()
            .filter_map(|(id, prefix)| self.by_id.get(*id).map(|&i| (i, *prefix)))
            .collect();

        self.finalized = true;
        tracing::debug!("Schema finalized with {} properties", self.descriptors.len());

        Ok(Arc::new(PropertySchema {
            descriptors: std::mem::take(&mut self.descriptors),
            by_id: std::mem::take(&mut self.by_id),
            by_error_id: std::mem::take(&mut self.by_error_id),
            ra,
            dec,
            pmra,
            bookkeeping,
            identifiers,
        }))
    }

    fn required_text_field(&self, id: &str) -> StarResult<usize> {
        let index = *self
            .by_id
            .get(id)
            .ok_or_else(|| StarError::Configuration(format!("schema lacks required property '{}'", id)))?;

        if self.descriptors[index].kind != PropertyType::String {
            return Err(StarError::Configuration(format!("property '{}' must be a string", id)));
        }
        Ok(index)
    }
}

/// Finalized, read-only field table shared by every record built on it
#[derive(Debug)]
pub struct PropertySchema {
    descriptors: Vec<PropertyDescriptor>,
    by_id: HashMap<String, usize>,
    by_error_id: HashMap<String, usize>,
    ra: usize,
    dec: usize,
    pmra: Option<usize>,
    bookkeeping: Vec<usize>,
    identifiers: Vec<(usize, &'static str)>,
}

static STANDARD: OnceLock<Arc<PropertySchema>> = OnceLock::new();

impl PropertySchema {
    /// Process-wide standard schema, registered on first use
    pub fn standard() -> Arc<PropertySchema> {
        STANDARD
            .get_or_init(|| register_standard().expect("standard schema registration"))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptor(&self, index: usize) -> Option<&PropertyDescriptor> {
        self.descriptors.get(index)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.descriptors.iter()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Index of the property whose error companion has this id
    pub fn index_of_error(&self, error_id: &str) -> Option<usize> {
        self.by_error_id.get(error_id).copied()
    }

    /// Like `index_of`, for ids coming from configuration
    pub fn require(&self, id: &str) -> StarResult<usize> {
        self.index_of(id)
            .ok_or_else(|| StarError::Configuration(format!("unknown property '{}'", id)))
    }

    pub fn ra_index(&self) -> usize {
        self.ra
    }

    pub fn dec_index(&self) -> usize {
        self.dec
    }

    pub fn pmra_index(&self) -> Option<usize> {
        self.pmra
    }

    pub fn is_bookkeeping(&self, index: usize) -> bool {
        self.bookkeeping.contains(&index)
    }

    pub(crate) fn identifier_chain(&self) -> &[(usize, &'static str)] {
        &self.identifiers
    }

    /// Field summary for documentation and UI generators
    pub fn dump(&self) -> Vec<FieldInfo> {
        self.descriptors
            .iter()
            .enumerate()
            .map(|(index, d)| FieldInfo {
                index,
                id: d.id.clone(),
                name: d.display_name.clone(),
                kind: d.kind,
                unit: d.unit.clone(),
                description: d.description.clone(),
                error_id: d.error_id().map(str::to_string),
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.dump())
    }

    /// Write the field dump as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write schema dump: {}", path.display()))?;
        tracing::info!("Wrote {} property descriptors to {}", self.len(), path.display());
        Ok(())
    }
}

fn magnitude(id: &str, error_id: &str, band: &str) -> PropertyDescriptor {
    PropertyDescriptor::new(id, &format!("{} mag", band), PropertyType::Float)
        .with_unit("mag")
        .with_description(&format!("Apparent magnitude in the {} band", band))
        .with_error(error_id, &format!("e_{} mag", band))
}

fn identifier(id: &str, name: &str, description: &str) -> PropertyDescriptor {
    PropertyDescriptor::new(id, name, PropertyType::String)
        .with_description(description)
        .with_link("https://simbad.cds.unistra.fr/simbad/sim-id?Ident={value}")
}

fn register_standard() -> StarResult<Arc<PropertySchema>> {
    use fields::*;
    use PropertyType::*;

    let mut builder = SchemaBuilder::new();

    builder.register(identifier(ID_SIMBAD, "SIMBAD", "Main identifier resolved by SIMBAD"))?;
    builder.register(identifier(ID_HD, "HD", "Henry Draper catalog number"))?;
    builder.register(identifier(ID_HIP, "HIP", "Hipparcos catalog number"))?;
    builder.register(identifier(ID_TYC, "TYC", "Tycho-2 identifier"))?;
    builder.register(identifier(ID_2MASS, "2MASS", "2MASS point source identifier"))?;
    builder.register(identifier(ID_GAIA, "Gaia DR3", "Gaia DR3 source_id"))?;
    builder.register(identifier(ID_WDS, "WDS", "Washington Double Star identifier"))?;

    builder.register(
        PropertyDescriptor::new(RA, "RA", String)
            .with_unit("h:m:s")
            .with_description("Right ascension (J2000)"),
    )?;
    builder.register(
        PropertyDescriptor::new(DEC, "DEC", String)
            .with_unit("d:m:s")
            .with_description("Declination (J2000)"),
    )?;
    builder.register(
        PropertyDescriptor::new(PMRA, "pmRA", Float)
            .with_unit("mas/yr")
            .with_format(PrintFormat::Fixed(2))
            .with_description("Proper motion in RA, multiplied by cos(DEC)")
            .with_error("PMRA_ERR", "e_pmRA"),
    )?;
    builder.register(
        PropertyDescriptor::new(PMDEC, "pmDEC", Float)
            .with_unit("mas/yr")
            .with_format(PrintFormat::Fixed(2))
            .with_description("Proper motion in DEC")
            .with_error("PMDEC_ERR", "e_pmDEC"),
    )?;
    builder.register(
        PropertyDescriptor::new(PLX, "plx", Float)
            .with_unit("mas")
            .with_format(PrintFormat::Fixed(2))
            .with_description("Trigonometric parallax")
            .with_error("PLX_ERR", "e_plx"),
    )?;

    builder.register(PropertyDescriptor::new(SP_TYPE, "SpType", String).with_description("MK spectral type"))?;
    builder.register(PropertyDescriptor::new(OBJ_TYPES, "ObjTypes", String).with_description("SIMBAD object types"))?;
    builder.register(
        PropertyDescriptor::new(BINARY_FLAG, "Binary", Boolean)
            .with_description("Known spectroscopic or visual binary"),
    )?;

    builder.register(magnitude(MAG_B, "MAG_B_ERR", "B"))?;
    builder.register(magnitude(MAG_V, "MAG_V_ERR", "V"))?;
    builder.register(magnitude(MAG_R, "MAG_R_ERR", "R"))?;
    builder.register(magnitude(MAG_I, "MAG_I_ERR", "I"))?;
    builder.register(magnitude(MAG_J, "MAG_J_ERR", "J"))?;
    builder.register(magnitude(MAG_H, "MAG_H_ERR", "H"))?;
    builder.register(magnitude(MAG_K, "MAG_K_ERR", "K"))?;
    builder.register(magnitude(MAG_G, "MAG_G_ERR", "G"))?;
    builder.register(
        PropertyDescriptor::new(MAG_G_EST, "G mag (est)", Float)
            .with_unit("mag")
            .with_description("G magnitude estimated from V and B-V")
            .with_error("MAG_G_EST_ERR", "e_G mag (est)"),
    )?;

    builder.register(
        PropertyDescriptor::new(XM_SEP, "XM sep", Float)
            .with_unit("arcsec")
            .with_format(PrintFormat::Fixed(4))
            .with_description("Separation to the cross-matched counterpart"),
    )?;
    builder.register(
        PropertyDescriptor::new(XM_N_MATES, "XM mates", Integer)
            .with_description("Number of candidates inside the match area"),
    )?;
    builder.register(
        PropertyDescriptor::new(GROUP_SIZE, "Group size", Integer)
            .with_description("Number of catalog records merged into this one"),
    )?;

    builder.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> SchemaBuilder {
        let mut builder = SchemaBuilder::new();
        builder.register(PropertyDescriptor::new(fields::RA, "RA", PropertyType::String)).unwrap();
        builder.register(PropertyDescriptor::new(fields::DEC, "DEC", PropertyType::String)).unwrap();
        builder
    }

    #[test]
    fn test_registration_order_defines_index() {
        let mut builder = minimal();
        let idx = builder
            .register(
                PropertyDescriptor::new("MAG_V", "V", PropertyType::Float).with_error("MAG_V_ERR", "e_V"),
            )
            .unwrap();
        assert_eq!(idx, 2);

        let schema = builder.finalize().unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.index_of("RA"), Some(0));
        assert_eq!(schema.index_of("MAG_V"), Some(2));
        assert_eq!(schema.index_of_error("MAG_V_ERR"), Some(2));
        assert_eq!(schema.index_of("MAG_V_ERR"), None);
        assert_eq!(schema.pmra_index(), None);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut builder = minimal();
        let err = builder
            .register(PropertyDescriptor::new(fields::RA, "RA again", PropertyType::String))
            .unwrap_err();
        assert!(matches!(err, StarError::Configuration(_)));

        builder
            .register(PropertyDescriptor::new("PLX", "plx", PropertyType::Float).with_error("PLX_ERR", "e"))
            .unwrap();
        // error ids share the namespace
        let err = builder
            .register(PropertyDescriptor::new("PLX_ERR", "clash", PropertyType::Float))
            .unwrap_err();
        assert!(matches!(err, StarError::Configuration(_)));
    }

    #[test]
    fn test_registration_after_finalize_rejected() {
        let mut builder = minimal();
        builder.finalize().unwrap();

        let err = builder
            .register(PropertyDescriptor::new("LATE", "late", PropertyType::Integer))
            .unwrap_err();
        assert!(matches!(err, StarError::Configuration(_)));
        assert!(builder.finalize().is_err());
    }

    #[test]
    fn test_error_companion_requires_float() {
        let mut builder = minimal();
        let err = builder
            .register(PropertyDescriptor::new("NAME", "name", PropertyType::String).with_error("NAME_ERR", "e"))
            .unwrap_err();
        assert!(matches!(err, StarError::Configuration(_)));
    }

    #[test]
    fn test_finalize_requires_coordinates() {
        let mut builder = SchemaBuilder::new();
        builder.register(PropertyDescriptor::new(fields::RA, "RA", PropertyType::String)).unwrap();
        assert!(matches!(builder.finalize(), Err(StarError::Configuration(_))));
    }

    #[test]
    fn test_standard_schema_is_shared() {
        let a = PropertySchema::standard();
        let b = PropertySchema::standard();
        assert!(Arc::ptr_eq(&a, &b));

        assert_eq!(a.index_of(fields::ID_SIMBAD), Some(0));
        assert_eq!(a.descriptor(a.ra_index()).unwrap().id, fields::RA);
        assert!(a.pmra_index().is_some());
        assert_eq!(a.index_of_error("MAG_V_ERR"), a.index_of(fields::MAG_V));

        let group = a.index_of(fields::GROUP_SIZE).unwrap();
        assert!(a.is_bookkeeping(group));
        assert!(!a.is_bookkeeping(a.index_of(fields::MAG_V).unwrap()));
    }

    #[test]
    fn test_dump_lists_every_field() {
        let schema = PropertySchema::standard();
        let dump = schema.dump();
        assert_eq!(dump.len(), schema.len());
        assert_eq!(dump[schema.ra_index()].id, "RA");

        let v = &dump[schema.index_of(fields::MAG_V).unwrap()];
        assert_eq!(v.kind, PropertyType::Float);
        assert_eq!(v.unit, "mag");
        assert_eq!(v.error_id.as_deref(), Some("MAG_V_ERR"));

        let json = schema.to_json().unwrap();
        let parsed: Vec<FieldInfo> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, dump);
        assert!(json.contains("\"type\": \"float\""));
    }

    #[test]
    fn test_save_dump() {
        let path = std::env::temp_dir().join(format!("starfuse-schema-{}.json", std::process::id()));
        PropertySchema::standard().save(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("GROUP_SIZE"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_link_template() {
        let schema = PropertySchema::standard();
        let hd = schema.descriptor(schema.index_of(fields::ID_HD).unwrap()).unwrap();
        assert_eq!(
            hd.link_for("HD 1234").as_deref(),
            Some("https://simbad.cds.unistra.fr/simbad/sim-id?Ident=HD 1234")
        );
    }
}
