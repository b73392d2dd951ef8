//! Arrow representation of observations.
//!
//! Numeric columns are decoded with strict casts: a value that cannot be read
//! as a float is a [`WqError::DataIntegrity`] error naming the column, and
//! NaN/Infinity become null.

use super::{Observation, DATE_COLUMN, OBSERVATION_COLUMNS, TIME_COLUMN};
use crate::error::{Result, WqError};
use arrow::array::{new_null_array, Array, ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::compute::{cast, cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Storage-assigned row identity. Used for ordering, never returned.
pub const ROW_ID_COLUMN: &str = "_row_id";

static OBSERVATION_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| {
    Arc::new(Schema::new(
        OBSERVATION_COLUMNS
            .iter()
            .map(|name| Field::new(*name, column_type(name), true))
            .collect::<Vec<_>>(),
    ))
});

static STORED_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| {
    let mut fields: Vec<Field> = OBSERVATION_SCHEMA
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    fields.push(Field::new(ROW_ID_COLUMN, DataType::UInt64, false));
    Arc::new(Schema::new(fields))
});

fn column_type(name: &str) -> DataType {
    if name == DATE_COLUMN || name == TIME_COLUMN {
        DataType::Utf8
    } else {
        DataType::Float64
    }
}

/// Canonical observation schema: every column nullable, no row identity.
pub fn observation_schema() -> SchemaRef {
    OBSERVATION_SCHEMA.clone()
}

/// Schema of the stored table: the observation schema plus [`ROW_ID_COLUMN`].
pub fn stored_schema() -> SchemaRef {
    STORED_SCHEMA.clone()
}

/// Reads column `name` as finite floats. Returns `None` if the column is absent.
pub fn read_float_column(batch: &RecordBatch, name: &str) -> Result<Option<Float64Array>> {
    batch
        .column_by_name(name)
        .map(|column| to_finite_floats(column, name))
        .transpose()
}

fn to_finite_floats(array: &ArrayRef, name: &str) -> Result<Float64Array> {
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    let floats = cast_with_options(array, &DataType::Float64, &options)
        .map_err(|e| WqError::data_integrity(name, e.to_string()))?;
    let floats = floats
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| WqError::Internal(format!("cast of '{name}' did not yield Float64")))?;
    Ok(floats.iter().map(|v| v.filter(|x| x.is_finite())).collect())
}

/// Reads column `name` as text. Returns `None` if the column is absent.
pub(crate) fn read_string_column(batch: &RecordBatch, name: &str) -> Result<Option<StringArray>> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let strings = cast(column, &DataType::Utf8)?;
    let strings = strings
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| WqError::Internal(format!("cast of '{name}' did not yield Utf8")))?;
    Ok(Some(strings))
}

/// Projects `batch` onto [`observation_schema`].
///
/// Missing optional columns are null-filled; a missing `date` column is a
/// data-integrity error.
pub fn conform_batch(batch: &RecordBatch) -> Result<RecordBatch> {
    if batch.column_by_name(DATE_COLUMN).is_none() {
        return Err(WqError::data_integrity(DATE_COLUMN, "column is missing"));
    }

    let schema = observation_schema();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let name = field.name().as_str();
        let column: ArrayRef = match field.data_type() {
            DataType::Utf8 => match read_string_column(batch, name)? {
                Some(strings) => Arc::new(strings),
                None => new_null_array(&DataType::Utf8, batch.num_rows()),
            },
            _ => match read_float_column(batch, name)? {
                Some(floats) => Arc::new(floats),
                None => new_null_array(&DataType::Float64, batch.num_rows()),
            },
        };
        columns.push(column);
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Appends sequential row identities starting at `first_id`.
pub(crate) fn attach_row_ids(batch: &RecordBatch, first_id: u64) -> Result<RecordBatch> {
    let ids = UInt64Array::from_iter_values(first_id..first_id + batch.num_rows() as u64);
    let mut columns = batch.columns().to_vec();
    columns.push(Arc::new(ids));
    Ok(RecordBatch::try_new(stored_schema(), columns)?)
}

/// Decodes every row of `batch`. Columns other than the canonical ones are ignored.
pub fn observations_from_batch(batch: &RecordBatch) -> Result<Vec<Observation>> {
    let date = read_string_column(batch, "date")?;
    let time = read_string_column(batch, "time")?;
    let latitude = read_float_column(batch, "latitude")?;
    let longitude = read_float_column(batch, "longitude")?;
    let temperature = read_float_column(batch, "temperature")?;
    let salinity = read_float_column(batch, "salinity")?;
    let odo = read_float_column(batch, "odo")?;

    fn text(column: &Option<StringArray>, row: usize) -> Option<String> {
        column
            .as_ref()
            .filter(|a| a.is_valid(row))
            .map(|a| a.value(row).to_string())
    }
    fn number(column: &Option<Float64Array>, row: usize) -> Option<f64> {
        column
            .as_ref()
            .filter(|a| a.is_valid(row))
            .map(|a| a.value(row))
    }

    Ok((0..batch.num_rows())
        .map(|row| Observation {
            date: text(&date, row),
            time: text(&time, row),
            latitude: number(&latitude, row),
            longitude: number(&longitude, row),
            temperature: number(&temperature, row),
            salinity: number(&salinity, row),
            odo: number(&odo, row),
        })
        .collect())
}

/// Encodes observations as a batch in [`observation_schema`].
pub fn observations_to_batch(observations: &[Observation]) -> Result<RecordBatch> {
    let strings = |f: fn(&Observation) -> Option<&str>| -> ArrayRef {
        Arc::new(observations.iter().map(f).collect::<StringArray>())
    };
    let floats = |f: fn(&Observation) -> Option<f64>| -> ArrayRef {
        Arc::new(
            observations
                .iter()
                .map(|o| f(o).filter(|v| v.is_finite()))
                .collect::<Float64Array>(),
        )
    };

    Ok(RecordBatch::try_new(
        observation_schema(),
        vec![
            strings(|o| o.date.as_deref()),
            strings(|o| o.time.as_deref()),
            floats(|o| o.latitude),
            floats(|o| o.longitude),
            floats(|o| o.temperature),
            floats(|o| o.salinity),
            floats(|o| o.odo),
        ],
    )?)
}
