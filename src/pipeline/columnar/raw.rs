//! Bronze reader: any rectangular parquet file into a [`RawTable`].

use arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use tracing::debug;

use crate::domain::{RawTable, RawValue};
use crate::error::Result;

/// Convert a loosely typed batch into untyped raw values.
///
/// Integers, floats, booleans and text keep their kind; every other arrow
/// type (dates, timestamps, dictionaries, decimals) is cast to text.
pub fn batch_to_raw_table(batch: &RecordBatch) -> Result<RawTable> {
    let schema = batch.schema();
    let columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    let row_count = batch.num_rows();

    let mut converted: Vec<Vec<RawValue>> = Vec::with_capacity(columns.len());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        debug!(column = %field.name(), data_type = %field.data_type(), "Reading raw column");
        converted.push(column_values(array)?);
    }

    let mut table = RawTable::new(columns);
    for row in 0..row_count {
        table.push_row(
            converted
                .iter()
                .map(|col| col.get(row).cloned().unwrap_or(RawValue::Null))
                .collect(),
        );
    }
    Ok(table)
}

fn column_values(array: &ArrayRef) -> Result<Vec<RawValue>> {
    let values = match array.data_type() {
        DataType::Null => vec![RawValue::Null; array.len()],
        DataType::Boolean => array
            .as_boolean()
            .iter()
            .map(|v| v.map_or(RawValue::Null, RawValue::Boolean))
            .collect(),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let ints = cast(array, &DataType::Int64)?;
            ints.as_primitive::<Int64Type>()
                .iter()
                .map(|v| v.map_or(RawValue::Null, RawValue::Integer))
                .collect()
        }
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            let floats = cast(array, &DataType::Float64)?;
            floats
                .as_primitive::<Float64Type>()
                .iter()
                .map(|v| v.map_or(RawValue::Null, RawValue::Float))
                .collect()
        }
        _ => {
            let text = cast(array, &DataType::Utf8)?;
            text.as_string::<i32>()
                .iter()
                .map(|v| v.map_or(RawValue::Null, |s| RawValue::Text(s.to_string())))
                .collect()
        }
    };
    Ok(values)
}
