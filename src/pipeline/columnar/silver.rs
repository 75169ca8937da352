//! Silver codec: [`CanonicalTable`] to and from an arrow batch.
//!
//! Column layout: present source columns (raw text next to each derived
//! column), then extra source columns, then derived columns. A derived column
//! is only emitted when its source column is present.

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Int32Array, Int64Array, RecordBatch,
    StringArray, TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Date32Type, Field, Int64Type, Schema, TimeUnit, TimestampMicrosecondType,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{
    AgeGroup, Answer, CanonicalRecord, CanonicalTable, Gender, SurveyAnswer, SurveyColumns,
    WorkInterference, YesNoField,
};
use crate::error::{PipelineError, Result};

const DERIVED_TAIL: &[&str] = &["risk_score", "needs_follow_up", "processed_at"];

/// Typed values of one silver column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Text(Vec<Option<String>>),
    Int64(Vec<Option<i64>>),
    Int32(Vec<Option<i32>>),
    Boolean(Vec<Option<bool>>),
    Date(Vec<Option<NaiveDate>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    TimestampUtc(Vec<Option<DateTime<Utc>>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Text(v) => v.len(),
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::Int32(v) => v.len(),
            ColumnValues::Boolean(v) => v.len(),
            ColumnValues::Date(v) => v.len(),
            ColumnValues::Timestamp(v) => v.len(),
            ColumnValues::TimestampUtc(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        fn nulls<T>(values: &[Option<T>]) -> usize {
            values.iter().filter(|v| v.is_none()).count()
        }
        match self {
            ColumnValues::Text(v) => nulls(v),
            ColumnValues::Int64(v) => nulls(v),
            ColumnValues::Int32(v) => nulls(v),
            ColumnValues::Boolean(v) => nulls(v),
            ColumnValues::Date(v) => nulls(v),
            ColumnValues::Timestamp(v) => nulls(v),
            ColumnValues::TimestampUtc(v) => nulls(v),
        }
    }

    fn data_type(&self) -> DataType {
        match self {
            ColumnValues::Text(_) => DataType::Utf8,
            ColumnValues::Int64(_) => DataType::Int64,
            ColumnValues::Int32(_) => DataType::Int32,
            ColumnValues::Boolean(_) => DataType::Boolean,
            ColumnValues::Date(_) => DataType::Date32,
            ColumnValues::Timestamp(_) => DataType::Timestamp(TimeUnit::Microsecond, None),
            ColumnValues::TimestampUtc(_) => {
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
            }
        }
    }

    fn into_array(self) -> ArrayRef {
        match self {
            ColumnValues::Text(v) => Arc::new(StringArray::from(v)),
            ColumnValues::Int64(v) => Arc::new(Int64Array::from(v)),
            ColumnValues::Int32(v) => Arc::new(Int32Array::from(v)),
            ColumnValues::Boolean(v) => Arc::new(BooleanArray::from(v)),
            ColumnValues::Date(v) => Arc::new(Date32Array::from(
                v.into_iter()
                    .map(|d| d.map(days_since_epoch))
                    .collect::<Vec<_>>(),
            )),
            ColumnValues::Timestamp(v) => Arc::new(TimestampMicrosecondArray::from(
                v.into_iter()
                    .map(|ts| ts.map(|t| t.and_utc().timestamp_micros()))
                    .collect::<Vec<_>>(),
            )),
            ColumnValues::TimestampUtc(v) => Arc::new(
                TimestampMicrosecondArray::from(
                    v.into_iter()
                        .map(|ts| ts.map(|t| t.timestamp_micros()))
                        .collect::<Vec<_>>(),
                )
                .with_timezone("UTC"),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SilverColumn {
    pub name: String,
    pub values: ColumnValues,
}

impl SilverColumn {
    fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.signed_duration_since(NaiveDate::default()).num_days() as i32
}

fn text<F>(records: &[CanonicalRecord], f: F) -> ColumnValues
where
    F: Fn(&CanonicalRecord) -> Option<String>,
{
    ColumnValues::Text(records.iter().map(f).collect())
}

/// The silver column layout for a canonical table, in write order
pub fn silver_columns(table: &CanonicalTable) -> Vec<SilverColumn> {
    let records = &table.records;
    let present = &table.columns;
    let mut columns = Vec::new();

    // Source columns
    if present.timestamp {
        columns.push(SilverColumn::new(
            "timestamp",
            ColumnValues::Timestamp(records.iter().map(|r| r.timestamp).collect()),
        ));
    }
    if present.age {
        columns.push(SilverColumn::new(
            "age",
            ColumnValues::Int64(records.iter().map(|r| r.age).collect()),
        ));
    }
    if present.gender {
        columns.push(SilverColumn::new("gender", text(records, |r| r.gender.clone())));
    }
    if present.country {
        columns.push(SilverColumn::new("country", text(records, |r| r.country.clone())));
    }
    if present.state {
        columns.push(SilverColumn::new("state", text(records, |r| r.state.clone())));
    }
    if present.comments {
        columns.push(SilverColumn::new("comments", text(records, |r| r.comments.clone())));
    }
    for field in &present.answers {
        columns.push(SilverColumn::new(
            field.as_str(),
            text(records, |r| r.answers.get(field).and_then(|a| a.raw.clone())),
        ));
    }
    if present.no_employees {
        columns.push(SilverColumn::new(
            "no_employees",
            text(records, |r| r.no_employees.clone()),
        ));
    }
    if present.work_interfere {
        columns.push(SilverColumn::new(
            "work_interfere",
            text(records, |r| r.work_interfere.clone()),
        ));
    }

    for (idx, name) in table.extra_columns.iter().enumerate() {
        columns.push(SilverColumn::new(
            name.clone(),
            text(records, |r| r.extras.get(idx).cloned().flatten()),
        ));
    }

    // Derived columns
    if present.timestamp {
        columns.push(SilverColumn::new(
            "date",
            ColumnValues::Date(records.iter().map(|r| r.date).collect()),
        ));
        columns.push(SilverColumn::new(
            "hour",
            ColumnValues::Int32(records.iter().map(|r| r.hour.map(|h| h as i32)).collect()),
        ));
    }
    if present.age {
        columns.push(SilverColumn::new(
            "age_group",
            text(records, |r| Some(r.age_group.as_str().to_string())),
        ));
    }
    if present.gender {
        columns.push(SilverColumn::new(
            "gender_norm",
            text(records, |r| Some(r.gender_norm.as_str().to_string())),
        ));
    }
    for field in &present.answers {
        columns.push(SilverColumn::new(
            field.std_column(),
            text(records, |r| Some(r.answer(*field).as_str().to_string())),
        ));
    }
    if present.no_employees {
        columns.push(SilverColumn::new(
            "no_employees_bucket",
            text(records, |r| r.no_employees_bucket.clone()),
        ));
    }
    if present.work_interfere {
        columns.push(SilverColumn::new(
            "work_interfere_std",
            text(records, |r| Some(r.work_interfere_std.as_str().to_string())),
        ));
    }
    columns.push(SilverColumn::new(
        "risk_score",
        ColumnValues::Int64(records.iter().map(|r| Some(r.risk_score as i64)).collect()),
    ));
    columns.push(SilverColumn::new(
        "needs_follow_up",
        ColumnValues::Boolean(records.iter().map(|r| Some(r.needs_follow_up)).collect()),
    ));
    columns.push(SilverColumn::new(
        "processed_at",
        ColumnValues::TimestampUtc(records.iter().map(|r| Some(r.processed_at)).collect()),
    ));

    columns
}

pub fn encode_silver(table: &CanonicalTable) -> Result<RecordBatch> {
    let columns = silver_columns(table);
    let fields: Vec<Field> = columns
        .iter()
        .map(|c| Field::new(c.name.as_str(), c.values.data_type(), true))
        .collect();
    let arrays: Vec<ArrayRef> = columns.into_iter().map(|c| c.values.into_array()).collect();
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Names the silver layout owns; anything else read back is an extra column
fn is_layout_column(name: &str) -> bool {
    const FIXED: &[&str] = &[
        "timestamp",
        "age",
        "gender",
        "country",
        "state",
        "comments",
        "no_employees",
        "work_interfere",
        "date",
        "hour",
        "age_group",
        "gender_norm",
        "no_employees_bucket",
        "work_interfere_std",
    ];
    FIXED.contains(&name)
        || DERIVED_TAIL.contains(&name)
        || YesNoField::from_label(name).is_some()
        || name
            .strip_suffix("_std")
            .and_then(YesNoField::from_label)
            .is_some()
}

fn text_values(batch: &RecordBatch, name: &str) -> Result<Option<Vec<Option<String>>>> {
    let Some(array) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let array = cast(array, &DataType::Utf8)?;
    Ok(Some(
        array
            .as_string::<i32>()
            .iter()
            .map(|v| v.map(str::to_string))
            .collect(),
    ))
}

fn int_values(batch: &RecordBatch, name: &str) -> Result<Option<Vec<Option<i64>>>> {
    let Some(array) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let array = cast(array, &DataType::Int64)?;
    Ok(Some(array.as_primitive::<Int64Type>().iter().collect()))
}

fn bool_values(batch: &RecordBatch, name: &str) -> Result<Option<Vec<Option<bool>>>> {
    let Some(array) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let array = cast(array, &DataType::Boolean)?;
    Ok(Some(array.as_boolean().iter().collect()))
}

fn timestamp_values(batch: &RecordBatch, name: &str) -> Result<Option<Vec<Option<NaiveDateTime>>>> {
    let Some(array) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let array = match array.data_type() {
        DataType::Timestamp(TimeUnit::Microsecond, _) => array.clone(),
        _ => cast(array, &DataType::Timestamp(TimeUnit::Microsecond, None))?,
    };
    let typed = array.as_primitive::<TimestampMicrosecondType>();
    Ok(Some(
        (0..typed.len())
            .map(|i| {
                if typed.is_null(i) {
                    None
                } else {
                    DateTime::from_timestamp_micros(typed.value(i)).map(|dt| dt.naive_utc())
                }
            })
            .collect(),
    ))
}

fn date_values(batch: &RecordBatch, name: &str) -> Result<Option<Vec<Option<NaiveDate>>>> {
    let Some(array) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let array = cast(array, &DataType::Date32)?;
    let typed = array.as_primitive::<Date32Type>();
    Ok(Some(
        (0..typed.len())
            .map(|i| {
                if typed.is_null(i) {
                    None
                } else {
                    typed.value_as_date(i)
                }
            })
            .collect(),
    ))
}

fn at<T: Clone>(column: &Option<Vec<Option<T>>>, row: usize) -> Option<T> {
    column.as_ref().and_then(|v| v.get(row).cloned().flatten())
}

fn label_at<T, F>(column: &Option<Vec<Option<String>>>, row: usize, parse: F, default: T) -> T
where
    F: Fn(&str) -> Option<T>,
{
    at(column, row).and_then(|s| parse(&s)).unwrap_or(default)
}

/// Rebuild a canonical table from a silver batch.
///
/// Stored derived values are taken as written, so a silver artifact reads back
/// to exactly the records that produced it.
pub fn decode_silver(batch: &RecordBatch) -> Result<CanonicalTable> {
    let rows = batch.num_rows();

    let timestamp = timestamp_values(batch, "timestamp")?;
    let age = int_values(batch, "age")?;
    let gender = text_values(batch, "gender")?;
    let country = text_values(batch, "country")?;
    let state = text_values(batch, "state")?;
    let comments = text_values(batch, "comments")?;
    let no_employees = text_values(batch, "no_employees")?;
    let work_interfere = text_values(batch, "work_interfere")?;

    let date = date_values(batch, "date")?;
    let hour = int_values(batch, "hour")?;
    let age_group = text_values(batch, "age_group")?;
    let gender_norm = text_values(batch, "gender_norm")?;
    let no_employees_bucket = text_values(batch, "no_employees_bucket")?;
    let work_interfere_std = text_values(batch, "work_interfere_std")?;
    let risk_score = int_values(batch, "risk_score")?;
    let needs_follow_up = bool_values(batch, "needs_follow_up")?;
    let processed_at = timestamp_values(batch, "processed_at")?;

    let mut answers = Vec::new();
    for field in YesNoField::ALL {
        if let Some(raw) = text_values(batch, field.as_str())? {
            let std = text_values(batch, &field.std_column())?;
            answers.push((*field, raw, std));
        }
    }

    let extra_columns: Vec<String> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|name| !is_layout_column(name))
        .collect();
    let mut extras = Vec::with_capacity(extra_columns.len());
    for name in &extra_columns {
        extras.push(text_values(batch, name)?);
    }

    let columns = SurveyColumns {
        timestamp: timestamp.is_some(),
        age: age.is_some(),
        gender: gender.is_some(),
        country: country.is_some(),
        state: state.is_some(),
        comments: comments.is_some(),
        no_employees: no_employees.is_some(),
        work_interfere: work_interfere.is_some(),
        answers: answers.iter().map(|(field, _, _)| *field).collect(),
    };

    let mut records = Vec::with_capacity(rows);
    for row in 0..rows {
        let answer_map: BTreeMap<YesNoField, SurveyAnswer> = answers
            .iter()
            .map(|(field, raw, std)| {
                let answer = SurveyAnswer {
                    raw: raw.get(row).cloned().flatten(),
                    normalized: label_at(std, row, Answer::from_label, Answer::Unknown),
                };
                (*field, answer)
            })
            .collect();

        let score = at(&risk_score, row).unwrap_or(0);
        let processed = at(&processed_at, row).ok_or_else(|| {
            PipelineError::Serialization(format!("silver row {row} has no processed_at"))
        })?;

        records.push(CanonicalRecord {
            timestamp: at(&timestamp, row),
            date: at(&date, row),
            hour: at(&hour, row).and_then(|h| u32::try_from(h).ok()),
            age: at(&age, row),
            age_group: label_at(&age_group, row, AgeGroup::from_label, AgeGroup::Unknown),
            gender: at(&gender, row),
            gender_norm: label_at(&gender_norm, row, Gender::from_label, Gender::Unknown),
            country: at(&country, row),
            state: at(&state, row),
            comments: at(&comments, row),
            answers: answer_map,
            no_employees: at(&no_employees, row),
            no_employees_bucket: at(&no_employees_bucket, row),
            work_interfere: at(&work_interfere, row),
            work_interfere_std: label_at(
                &work_interfere_std,
                row,
                WorkInterference::from_label,
                WorkInterference::Unknown,
            ),
            extras: extras.iter().map(|col| at(col, row)).collect(),
            risk_score: u8::try_from(score).unwrap_or(0),
            needs_follow_up: at(&needs_follow_up, row).unwrap_or(false),
            processed_at: processed.and_utc(),
        });
    }

    Ok(CanonicalTable {
        columns,
        extra_columns,
        records,
    })
}
