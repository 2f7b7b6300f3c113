//! Provenance and quality tags carried by every stored value

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which catalog (or computation) produced a value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Origin {
    #[default]
    None,
    /// Derived by this system from other fields
    Computed,
    /// Combination of several catalogs
    Mixed,
    Simbad,
    Gaia,
    Hipparcos,
    Tycho2,
    Ascc,
    TwoMass,
    Wise,
    Denis,
    Sb9,
    Wds,
    Jsdc,
    User,
}

impl Origin {
    /// True for values that came straight out of an external catalog
    pub fn is_catalog(&self) -> bool {
        !matches!(self, Origin::None | Origin::Computed | Origin::Mixed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Origin::None => "-",
            Origin::Computed => "computed",
            Origin::Mixed => "mixed",
            Origin::Simbad => "SIMBAD",
            Origin::Gaia => "Gaia DR3",
            Origin::Hipparcos => "Hipparcos",
            Origin::Tycho2 => "Tycho-2",
            Origin::Ascc => "ASCC",
            Origin::TwoMass => "2MASS",
            Origin::Wise => "WISE",
            Origin::Denis => "DENIS",
            Origin::Sb9 => "SB9",
            Origin::Wds => "WDS",
            Origin::Jsdc => "JSDC",
            Origin::User => "user",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Qualitative reliability of a value, independent of its origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Confidence {
    #[default]
    None,
    Low,
    Medium,
    High,
}
