use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{ArrayRef, Date32Builder, Float64Builder, Int64Builder, StringBuilder},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use crate::normalize::NormalizedRecord;
use crate::process::date_parser;
use crate::schema::{build_arrow_schema, Column, ColumnType};

/// Text value of `col` in `rec`, untouched. Only absent fields are NULL; an
/// empty or padded value must still parse as the column type.
fn cell<'a>(rec: &'a NormalizedRecord, col: &Column) -> Option<&'a str> {
    rec.get(&col.name)
}

fn violation(row: usize, col: &Column, raw: &str) -> anyhow::Error {
    anyhow!(
        "row {}: value `{}` in column `{}` is not a valid {}",
        row,
        raw,
        col.name,
        col.ty
    )
}

/// Build one typed column from the text values of every record.
fn build_column(records: &[NormalizedRecord], col: &Column) -> Result<ArrayRef> {
    let arr: ArrayRef = match col.ty {
        ColumnType::Date => {
            let mut b = Date32Builder::with_capacity(records.len());
            for (row, rec) in records.iter().enumerate() {
                match cell(rec, col) {
                    Some(s) => {
                        let days =
                            date_parser::parse_date32(s).ok_or_else(|| violation(row, col, s))?;
                        b.append_value(days);
                    }
                    None => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Integer => {
            let mut b = Int64Builder::with_capacity(records.len());
            for (row, rec) in records.iter().enumerate() {
                match cell(rec, col) {
                    Some(s) => b.append_value(s.parse::<i64>().map_err(|_| violation(row, col, s))?),
                    None => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Float => {
            let mut b = Float64Builder::with_capacity(records.len());
            for (row, rec) in records.iter().enumerate() {
                match cell(rec, col) {
                    Some(s) => b.append_value(s.parse::<f64>().map_err(|_| violation(row, col, s))?),
                    None => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::String => {
            let mut b = StringBuilder::new();
            for rec in records {
                // strings keep their raw text; only absence is NULL
                b.append_option(rec.get(&col.name));
            }
            Arc::new(b.finish())
        }
    };
    Ok(arr)
}

/// Convert normalized text records into a typed batch matching `columns`.
///
/// Fails on the first value that cannot be read as its column's type, so a
/// bad row rejects the whole batch.
pub fn records_to_batch(records: &[NormalizedRecord], columns: &[Column]) -> Result<RecordBatch> {
    let schema = build_arrow_schema(columns);
    let arrays = columns
        .iter()
        .map(|col| build_column(records, col))
        .collect::<Result<Vec<_>>>()?;
    RecordBatch::try_new(schema, arrays).context("assembling typed record batch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::parse_line;
    use crate::schema::historical_prices_schema;
    use arrow::array::{Array, Date32Array, Float64Array, Int64Array, StringArray};
    use rstest::rstest;

    #[test]
    fn converts_full_rows() -> Result<()> {
        let records = vec![
            parse_line("2020-01-02,1000,10.5,10.6,10.7,10.4,10.55"),
            parse_line("\"2020-01-03\",2000,11,11.1,11.2,10.9,11.05\r\n"),
        ];
        let batch = records_to_batch(&records, &historical_prices_schema())?;
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 7);

        let dates = batch.column(0).as_any().downcast_ref::<Date32Array>().unwrap();
        assert_eq!(dates.value(0), 18263);
        let volume = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(volume.value(1), 2000);
        let adj = batch.column(6).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(adj.value(0), 10.55);
        Ok(())
    }

    #[test]
    fn absent_fields_become_null() -> Result<()> {
        let records = vec![parse_line("2020-01-02,1000,10.5")];
        let batch = records_to_batch(&records, &historical_prices_schema())?;
        assert!(!batch.column(1).is_null(0));
        assert!(!batch.column(2).is_null(0));
        for i in 3..7 {
            assert!(batch.column(i).is_null(0));
        }
        Ok(())
    }

    #[test]
    fn empty_typed_value_is_rejected() {
        let records = vec![parse_line("2020-01-02,,10.5")];
        let msg = records_to_batch(&records, &historical_prices_schema())
            .unwrap_err()
            .to_string();
        assert!(msg.contains("`volume`"), "{msg}");
    }

    #[test]
    fn blank_line_is_rejected() {
        // a blank line normalizes to a single empty `date`
        let records = vec![parse_line("2020-01-02,1,1,1,1,1,1"), parse_line("")];
        let msg = records_to_batch(&records, &historical_prices_schema())
            .unwrap_err()
            .to_string();
        assert!(msg.contains("row 1"), "{msg}");
        assert!(msg.contains("`date`"), "{msg}");
    }

    #[rstest]
    #[case::padded_integer("2020-01-02, 1000 ")]
    #[case::padded_float("2020-01-02,1, 10.5")]
    #[case::padded_date(" 2020-01-02,1")]
    fn padded_values_are_not_trimmed(#[case] line: &str) {
        let records = vec![parse_line(line)];
        assert!(records_to_batch(&records, &historical_prices_schema()).is_err());
    }

    #[test]
    fn non_numeric_volume_is_rejected() {
        let records = vec![
            parse_line("2020-01-02,1000,1,1,1,1,1"),
            parse_line("2020-01-03,lots,1,1,1,1,1"),
        ];
        let err = records_to_batch(&records, &historical_prices_schema()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("row 1"), "{msg}");
        assert!(msg.contains("`volume`"), "{msg}");
        assert!(msg.contains("INTEGER"), "{msg}");
    }

    #[test]
    fn bad_date_is_rejected() {
        let records = vec![parse_line("02/01/2020,1000")];
        assert!(records_to_batch(&records, &historical_prices_schema()).is_err());
    }

    #[test]
    fn header_row_that_slipped_through_is_rejected() {
        let records = vec![parse_line("Date,Volume,Open,Close,High,Low,Adj Close")];
        assert!(records_to_batch(&records, &historical_prices_schema()).is_err());
    }

    #[test]
    fn string_columns_keep_raw_text() -> Result<()> {
        let cols = vec![Column::new("date", ColumnType::String)];
        let batch = records_to_batch(&[parse_line(" x "), parse_line("")], &cols)?;
        let s = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(s.value(0), " x ");
        assert_eq!(s.value(1), "");
        Ok(())
    }

    #[test]
    fn empty_input_gives_empty_batch() -> Result<()> {
        let batch = records_to_batch(&[], &historical_prices_schema())?;
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 7);
        Ok(())
    }
}
