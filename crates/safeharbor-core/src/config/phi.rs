//! PHI column-name catalog.
//!
//! Three lowercase sets of column names that may never appear in a query:
//! direct identifiers, sub-state geographic identifiers and date elements
//! more specific than a year. The file format is:
//!
//! ```yaml
//! direct_identifiers: [patient_name, ssn]
//! geographic_prohibited: [zip, city]
//! date_prohibited: [birth_date, month]
//! ```

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const DIRECT_IDENTIFIERS: &[&str] = &[
    // Names
    "patient_name",
    "first_name",
    "last_name",
    "middle_name",
    "given_name",
    "family_name",
    "full_name",
    "name",
    // SSN
    "ssn",
    "social_security_number",
    "social_security_no",
    // Record, plan and account numbers
    "mrn",
    "medical_record_number",
    "medical_record_no",
    "patient_id",
    "health_plan_id",
    "beneficiary_id",
    "subscriber_id",
    "member_id",
    "account_number",
    "account_no",
    "certificate_number",
    "license_number",
    "driver_license",
    // Contact
    "phone",
    "telephone",
    "phone_number",
    "tel_no",
    "fax",
    "fax_number",
    "email",
    "email_address",
    // Vehicles and devices
    "vehicle_id",
    "vin",
    "license_plate",
    "device_id",
    "serial_number",
    "device_serial",
    // Network
    "url",
    "web_url",
    "website",
    "ip_address",
    "ip_addr",
    "mac_address",
    // Biometric
    "fingerprint",
    "retinal_scan",
    "biometric",
    "facial_image",
    "photograph",
];

const GEOGRAPHIC_PROHIBITED: &[&str] = &[
    "street_address",
    "address",
    "address_line_1",
    "address_line_2",
    "street",
    "city",
    "town",
    "county",
    "zip",
    "zip_code",
    "zipcode",
    "postal_code",
    "latitude",
    "longitude",
    "lat",
    "lon",
    "geocode",
];

const DATE_PROHIBITED: &[&str] = &[
    "birth_date",
    "birthdate",
    "date_of_birth",
    "dob",
    "death_date",
    "admission_date",
    "discharge_date",
    "visit_date",
    "month_of_birth",
    "day_of_birth",
    "month",
    "day",
];

/// Which PHI set a column name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhiCategory {
    Direct,
    Geographic,
    Date,
}

#[derive(Debug, Default, Deserialize)]
struct PhiFile {
    #[serde(default)]
    direct_identifiers: Vec<String>,
    #[serde(default)]
    geographic_prohibited: Vec<String>,
    #[serde(default)]
    date_prohibited: Vec<String>,
}

/// Read-only PHI pattern sets.
#[derive(Debug, Clone)]
pub struct PhiCatalog {
    direct: HashSet<String>,
    geographic: HashSet<String>,
    date: HashSet<String>,
}

impl Default for PhiCatalog {
    fn default() -> Self {
        Self::new(
            DIRECT_IDENTIFIERS.iter().copied(),
            GEOGRAPHIC_PROHIBITED.iter().copied(),
            DATE_PROHIBITED.iter().copied(),
        )
    }
}

impl PhiCatalog {
    pub fn new<D, G, T, S>(direct: D, geographic: G, date: T) -> Self
    where
        D: IntoIterator<Item = S>,
        G: IntoIterator<Item = S>,
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        fn lower<S: AsRef<str>>(items: impl IntoIterator<Item = S>) -> HashSet<String> {
            items.into_iter().map(|s| s.as_ref().to_lowercase()).collect()
        }
        Self {
            direct: lower(direct),
            geographic: lower(geographic),
            date: lower(date),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let file: PhiFile = serde_yaml::from_str(content)?;
        if file.direct_identifiers.is_empty()
            && file.geographic_prohibited.is_empty()
            && file.date_prohibited.is_empty()
        {
            return Err(ConfigError::Config(
                "PHI identifier file defines no patterns".to_string(),
            ));
        }
        Ok(Self::new(
            file.direct_identifiers,
            file.geographic_prohibited,
            file.date_prohibited,
        ))
    }

    /// Classify a column name. Direct identifiers win over geographic, which
    /// win over date elements.
    pub fn category_of(&self, column: &str) -> Option<PhiCategory> {
        let column = column.to_lowercase();
        if self.direct.contains(&column) {
            Some(PhiCategory::Direct)
        } else if self.geographic.contains(&column) {
            Some(PhiCategory::Geographic)
        } else if self.date.contains(&column) {
            Some(PhiCategory::Date)
        } else {
            None
        }
    }

    pub fn is_direct(&self, column: &str) -> bool {
        self.direct.contains(&column.to_lowercase())
    }

    pub fn is_geographic(&self, column: &str) -> bool {
        self.geographic.contains(&column.to_lowercase())
    }

    pub fn is_date(&self, column: &str) -> bool {
        self.date.contains(&column.to_lowercase())
    }

    /// Total number of patterns across all three sets.
    pub fn pattern_count(&self) -> usize {
        self.direct.len() + self.geographic.len() + self.date.len()
    }

    /// Human-readable Safe Harbor category for a direct identifier.
    pub fn identifier_type(column: &str) -> &'static str {
        let column = column.to_lowercase();
        let has = |patterns: &[&str]| patterns.iter().any(|p| column.contains(p));

        if has(&["name", "first", "last", "given", "family"]) {
            "name (Category 1)"
        } else if has(&["ssn", "social_security"]) {
            "SSN (Category 7)"
        } else if has(&["mrn", "medical_record"]) {
            "medical record number (Category 8)"
        } else if has(&["phone", "telephone", "tel", "fax"]) {
            "telephone/fax number (Categories 4-5)"
        } else if has(&["email"]) {
            "email address (Category 6)"
        } else if has(&["account", "beneficiary", "subscriber", "member"]) {
            "account/beneficiary number (Categories 9-10)"
        } else if has(&["license", "certificate", "driver"]) {
            "license/certificate number (Category 11)"
        } else if has(&["vehicle", "vin", "license_plate"]) {
            "vehicle identifier (Category 12)"
        } else if has(&["device", "serial"]) {
            "device identifier (Category 13)"
        } else if has(&["url", "web", "ip", "mac"]) {
            "web/IP identifier (Categories 14-15)"
        } else if has(&["fingerprint", "biometric", "retinal", "facial"]) {
            "biometric identifier (Category 16)"
        } else {
            "unique identifier (Category 18)"
        }
    }
}
