//! Observation records and the numeric fields that statistics run over.

mod columns;

pub use columns::{
    conform_batch, observation_schema, observations_from_batch, observations_to_batch,
    read_float_column, stored_schema, ROW_ID_COLUMN,
};
pub(crate) use columns::{attach_row_ids, read_string_column};

use crate::error::{Result, WqError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column holding the calendar date token.
pub const DATE_COLUMN: &str = "date";

/// Column holding the optional time-of-day token.
pub const TIME_COLUMN: &str = "time";

/// All canonical columns, in storage and serialization order.
pub const OBSERVATION_COLUMNS: [&str; 7] = [
    "date",
    "time",
    "latitude",
    "longitude",
    "temperature",
    "salinity",
    "odo",
];

/// A numeric sensor field that can be filtered, summarized and screened for outliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericField {
    /// Water temperature in degrees Celsius
    Temperature,
    /// Salinity in parts per thousand
    Salinity,
    /// Optical dissolved oxygen in mg/L
    Odo,
}

impl NumericField {
    /// Every numeric field, in response order.
    pub const ALL: [NumericField; 3] = [
        NumericField::Temperature,
        NumericField::Salinity,
        NumericField::Odo,
    ];

    /// Stored column name.
    pub fn as_str(&self) -> &'static str {
        match self {
            NumericField::Temperature => "temperature",
            NumericField::Salinity => "salinity",
            NumericField::Odo => "odo",
        }
    }

    fn unknown() -> WqError {
        let names: Vec<String> = Self::ALL
            .iter()
            .map(|f| format!("'{}'", f.as_str()))
            .collect();
        WqError::invalid_argument(format!("field must be one of [{}]", names.join(", ")))
    }
}

impl FromStr for NumericField {
    type Err = WqError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(Self::unknown)
    }
}

impl fmt::Display for NumericField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored sensor reading.
///
/// Numeric fields are a finite float or `None` ("sensor did not report").
/// Storage-assigned identity is never part of the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: Option<String>,
    pub time: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub temperature: Option<f64>,
    pub salinity: Option<f64>,
    pub odo: Option<f64>,
}

impl Observation {
    /// Creates an observation for `date` with every reading absent.
    pub fn on(date: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            ..Self::default()
        }
    }

    /// Returns this observation with `field` set.
    pub fn with(mut self, field: NumericField, value: f64) -> Self {
        *self.slot(field) = Some(value);
        self
    }

    /// Returns this observation with a position.
    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Reading for `field`, if reported.
    pub fn value(&self, field: NumericField) -> Option<f64> {
        match field {
            NumericField::Temperature => self.temperature,
            NumericField::Salinity => self.salinity,
            NumericField::Odo => self.odo,
        }
    }

    fn slot(&mut self, field: NumericField) -> &mut Option<f64> {
        match field {
            NumericField::Temperature => &mut self.temperature,
            NumericField::Salinity => &mut self.salinity,
            NumericField::Odo => &mut self.odo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_field() {
        assert_eq!("odo".parse::<NumericField>().unwrap(), NumericField::Odo);
        assert_eq!(
            "temperature".parse::<NumericField>().unwrap(),
            NumericField::Temperature
        );

        let err = "ph".parse::<NumericField>().unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(
            err.to_string(),
            "field must be one of ['temperature', 'salinity', 'odo']"
        );
        // field names are case sensitive
        assert!("Temperature".parse::<NumericField>().is_err());
    }

    #[test]
    fn test_observation_serializes_all_fields() {
        let obs = Observation::on("03/14/21")
            .with(NumericField::Temperature, 21.5)
            .with(NumericField::Salinity, 35.1);
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "date": "03/14/21",
                "time": null,
                "latitude": null,
                "longitude": null,
                "temperature": 21.5,
                "salinity": 35.1,
                "odo": null,
            })
        );
        assert_eq!(obs.value(NumericField::Odo), None);
    }
}
