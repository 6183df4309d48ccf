//! Built-in dataset schemas plus runcard-declared ones.

use std::collections::BTreeMap;

use crate::data::schema::{Column, DatasetSchema, EnergyUnit, KinematicRule, SysUnit};
use crate::domain::{SysKind, UNCORR};
use crate::error::AppError;

/// Top-quark pole mass (GeV) used for the top-pair kinematics.
pub const TOP_MASS: f64 = 173.3;

/// Luminosity category shared by every CMS 13 TeV (2015) measurement.
pub const CMS_LUMI_13: &str = "CMSLUMI13";

/// Layout shared by the CMS inclusive ttbar tables:
/// `index  √s[TeV]  σ  stat  sys+  sys-  lumi`
fn cms_ttbar_columns(lumi_name: &str) -> Vec<Column> {
    vec![
        Column::Index,
        Column::Energy {
            unit: EnergyUnit::Tev,
        },
        Column::Central,
        Column::Stat,
        Column::AsymmetricSys {
            name: UNCORR.to_string(),
        },
        Column::Sys {
            name: lumi_name.to_string(),
            unit: SysUnit::Absolute,
            kind: SysKind::Mult,
        },
    ]
}

/// CMS inclusive ttbar cross sections at 5, 7, 8 and 13 TeV.
///
/// The four points come from different runs, so their luminosity
/// uncertainties are uncorrelated.
pub fn cms_ttbar_tot() -> DatasetSchema {
    DatasetSchema {
        name: "CMSTTBARTOT".to_string(),
        process: "INC".to_string(),
        n_data: 4,
        kinematics: KinematicRule::TopPair { top_mass: TOP_MASS },
        columns: cms_ttbar_columns(UNCORR),
    }
}

/// CMS inclusive ttbar cross section at 13 TeV (2.2 fb^-1).
pub fn cms_ttbar_tot_13tev() -> DatasetSchema {
    DatasetSchema {
        name: "CMSTTBARTOT13TEV".to_string(),
        process: "INC".to_string(),
        n_data: 1,
        kinematics: KinematicRule::TopPair { top_mass: TOP_MASS },
        columns: cms_ttbar_columns(CMS_LUMI_13),
    }
}

/// Name → schema lookup. Runcard schemas override built-ins of the same name.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, DatasetSchema>,
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SchemaCatalog {
    pub fn builtin() -> Self {
        let mut schemas = BTreeMap::new();
        for schema in [cms_ttbar_tot(), cms_ttbar_tot_13tev()] {
            schemas.insert(schema.name.clone(), schema);
        }
        Self { schemas }
    }

    /// Built-ins extended with (and overridden by) `extra`.
    pub fn with_schemas(extra: &[DatasetSchema]) -> Result<Self, AppError> {
        let mut catalog = Self::builtin();
        for schema in extra {
            schema.validate()?;
            if catalog.schemas.contains_key(&schema.name) {
                log::info!("Runcard schema overrides built-in dataset {}", schema.name);
            }
            catalog.schemas.insert(schema.name.clone(), schema.clone());
        }
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Result<&DatasetSchema, AppError> {
        self.schemas.get(name).ok_or_else(|| {
            AppError::new(
                2,
                format!(
                    "Unknown dataset '{name}'. Known datasets: {}",
                    self.names().collect::<Vec<_>>().join(", ")
                ),
            )
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_schemas_are_valid() {
        let catalog = SchemaCatalog::builtin();
        for name in catalog.names() {
            catalog.get(name).unwrap().validate().unwrap();
        }
    }

    #[test]
    fn ttbar_layout_has_seven_tokens_and_two_systematics() {
        let schema = cms_ttbar_tot_13tev();
        assert_eq!(schema.n_tokens(), 7);
        assert_eq!(schema.n_sys(), 2);
    }

    #[test]
    fn unknown_dataset_lists_known_ones() {
        let catalog = SchemaCatalog::builtin();
        let err = catalog.get("NOPE").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("CMSTTBARTOT13TEV"));
    }

    #[test]
    fn runcard_schema_overrides_builtin() {
        let mut custom = cms_ttbar_tot_13tev();
        custom.process = "CUSTOM".to_string();
        let catalog = SchemaCatalog::with_schemas(&[custom]).unwrap();
        assert_eq!(catalog.get("CMSTTBARTOT13TEV").unwrap().process, "CUSTOM");
    }
}
