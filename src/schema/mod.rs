pub mod arrow;
pub mod types;

pub use self::arrow::{build_arrow_schema, map_to_arrow_type};
pub use types::{Column, ColumnType};

use anyhow::{bail, Context, Result};

/// Column declaration of the historical prices table.
pub const HISTORICAL_PRICES_SCHEMA: &str =
    "date:DATE,volume:INTEGER,open:FLOAT,close:FLOAT,high:FLOAT,low:FLOAT,adjclose:FLOAT";

/// Parse a `name:TYPE,name:TYPE,...` declaration.
pub fn parse_schema(decl: &str) -> Result<Vec<Column>> {
    let mut cols = Vec::new();
    for part in decl.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, ty) = part
            .split_once(':')
            .with_context(|| format!("column `{}` is missing `:TYPE`", part))?;
        let name = name.trim();
        if name.is_empty() {
            bail!("empty column name in `{}`", part);
        }
        if cols.iter().any(|c: &Column| c.name == name) {
            bail!("duplicate column `{}`", name);
        }
        let ty = ty
            .parse()
            .with_context(|| format!("parsing type of column `{}`", name))?;
        cols.push(Column::new(name, ty));
    }
    if cols.is_empty() {
        bail!("schema declaration has no columns");
    }
    Ok(cols)
}

/// The fixed table schema, in column order.
pub fn historical_prices_schema() -> Vec<Column> {
    use ColumnType::{Date, Float, Integer};
    vec![
        Column::new("date", Date),
        Column::new("volume", Integer),
        Column::new("open", Float),
        Column::new("close", Float),
        Column::new("high", Float),
        Column::new("low", Float),
        Column::new("adjclose", Float),
    ]
}
