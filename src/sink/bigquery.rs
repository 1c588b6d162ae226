// src/sink/bigquery.rs

use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{Array, ArrayRef, Date32Array, Float64Array, Int64Array, StringArray},
    datatypes::DataType,
    record_batch::RecordBatch,
};
use google_cloud_bigquery::{
    client::{google_cloud_auth::credentials::CredentialsFile, Client, ClientConfig},
    http::job::query::QueryRequest,
    query::row::Row,
};
use std::{fmt, path::Path};
use tracing::{debug, info, instrument};

use crate::config::JobConfig;
use crate::normalize::NormalizedRecord;
use crate::process::{convert::records_to_batch, date_parser::format_date32};
use crate::schema::Column;

/// `[project:]dataset.table` (a `.` separator after the project works too).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigQueryTable {
    pub project: Option<String>,
    pub dataset: String,
    pub table: String,
}

fn valid_ident(s: &str, extra: &[char]) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || extra.contains(&c))
}

impl BigQueryTable {
    pub fn parse(id: &str) -> Result<Self> {
        let (project, rest) = match id.split_once(':') {
            Some((p, rest)) => (Some(p), rest),
            None => (None, id),
        };
        let parts: Vec<&str> = rest.split('.').collect();
        let (project, dataset, table) = match (project, parts.as_slice()) {
            (p, [d, t]) => (p, *d, *t),
            (None, [p, d, t]) => (Some(*p), *d, *t),
            _ => bail!("`{}` is not a [project:]dataset.table identifier", id),
        };
        if let Some(p) = project {
            if !valid_ident(p, &['-']) {
                bail!("invalid project `{}` in `{}`", p, id);
            }
        }
        if !valid_ident(dataset, &[]) {
            bail!("invalid dataset `{}` in `{}`", dataset, id);
        }
        if !valid_ident(table, &['-']) {
            bail!("invalid table `{}` in `{}`", table, id);
        }
        Ok(Self {
            project: project.map(str::to_string),
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }

    /// Backtick-quoted `project.dataset.table` for use in SQL.
    pub fn qualified(&self, project: &str) -> String {
        format!("`{}.{}.{}`", project, self.dataset, self.table)
    }
}

impl fmt::Display for BigQueryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project {
            Some(p) => write!(f, "{}:{}.{}", p, self.dataset, self.table),
            None => write!(f, "{}.{}", self.dataset, self.table),
        }
    }
}

pub fn create_table_ddl(table: &str, columns: &[Column]) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| format!("`{}` {}", c.name, c.ty.bigquery_ddl_type()))
        .collect();
    format!("CREATE TABLE IF NOT EXISTS {} ({})", table, cols.join(", "))
}

/// Upper bound BigQuery puts on the text of one query job.
const MAX_SCRIPT_BYTES: usize = 1024 * 1024;

/// One transaction that empties `table` and runs `inserts`. BigQuery either
/// commits all of it or rolls back to the previous contents.
pub fn replace_script(table: &str, inserts: &[String]) -> String {
    let mut script = String::from("BEGIN TRANSACTION;\n");
    script.push_str(&format!("DELETE FROM {} WHERE TRUE;\n", table));
    for sql in inserts {
        script.push_str(sql);
        script.push_str(";\n");
    }
    script.push_str("COMMIT TRANSACTION;");
    script
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render one cell of a typed column as a Standard SQL literal.
pub fn sql_literal(col: &ArrayRef, row: usize) -> Result<String> {
    if col.is_null(row) {
        return Ok("NULL".to_string());
    }
    let lit = match col.data_type() {
        DataType::Date32 => {
            let days = col
                .as_any()
                .downcast_ref::<Date32Array>()
                .ok_or_else(|| anyhow!("Date32 column is not a Date32Array"))?
                .value(row);
            let date = format_date32(days).ok_or_else(|| anyhow!("date out of range: {}", days))?;
            format!("DATE '{}'", date)
        }
        DataType::Int64 => col
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| anyhow!("Int64 column is not an Int64Array"))?
            .value(row)
            .to_string(),
        DataType::Float64 => {
            let v = col
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| anyhow!("Float64 column is not a Float64Array"))?
                .value(row);
            if v.is_nan() {
                "CAST('NaN' AS FLOAT64)".to_string()
            } else if v.is_infinite() {
                let sign = if v > 0.0 { "" } else { "-" };
                format!("CAST('{}inf' AS FLOAT64)", sign)
            } else {
                format!("{:?}", v)
            }
        }
        DataType::Utf8 => quote_string(
            col.as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| anyhow!("Utf8 column is not a StringArray"))?
                .value(row),
        ),
        other => bail!("no SQL literal for {:?}", other),
    };
    Ok(lit)
}

/// `INSERT ... VALUES` statements covering `batch`, `chunk` rows each.
pub fn insert_statements(
    table: &str,
    columns: &[Column],
    batch: &RecordBatch,
    chunk: usize,
) -> Result<Vec<String>> {
    let names: Vec<String> = columns.iter().map(|c| format!("`{}`", c.name)).collect();
    let head = format!("INSERT INTO {} ({}) VALUES ", table, names.join(", "));

    let mut out = Vec::new();
    let mut offset = 0;
    while offset < batch.num_rows() {
        let len = chunk.min(batch.num_rows() - offset);
        let mut rows = Vec::with_capacity(len);
        for row in offset..offset + len {
            let cells = batch
                .columns()
                .iter()
                .map(|col| sql_literal(col, row))
                .collect::<Result<Vec<_>>>()?;
            rows.push(format!("({})", cells.join(", ")));
        }
        out.push(format!("{}{}", head, rows.join(", ")));
        offset += len;
    }
    Ok(out)
}

/// Build a BigQuery client and the project id the credentials belong to.
pub async fn make_client(credentials: Option<&Path>) -> Result<(Client, Option<String>)> {
    let (config, project) = match credentials {
        Some(path) => {
            let file = CredentialsFile::new_from_file(path.to_string_lossy().into_owned())
                .await
                .with_context(|| format!("loading credentials from {}", path.display()))?;
            ClientConfig::new_with_credentials(file)
                .await
                .context("authenticating BigQuery client")?
        }
        None => ClientConfig::new_with_auth()
            .await
            .context("authenticating BigQuery client")?,
    };
    let client = Client::new(config).await.context("creating BigQuery client")?;
    Ok((client, project))
}

async fn run_statement(client: &Client, project: &str, sql: String) -> Result<()> {
    debug!(bytes = sql.len(), "running statement");
    let req = QueryRequest {
        query: sql,
        use_legacy_sql: false,
        ..Default::default()
    };
    let mut rows = client.query::<Row>(project, req).await?;
    while rows.next().await?.is_some() {}
    Ok(())
}

/// Create the table if needed, then replace its rows with `records` in a
/// single transaction.
///
/// All values are type-checked before the first statement runs. A failure
/// inside the transaction leaves the previous rows in place.
#[instrument(level = "info", skip(table, records, config), fields(table = %table, rows = records.len()))]
pub async fn write_truncate(
    table: &BigQueryTable,
    records: &[NormalizedRecord],
    config: &JobConfig,
) -> Result<u64> {
    let batch = records_to_batch(records, &config.schema)?;
    let batch_size = config.engine.batch_size()?;

    let (client, cred_project) = make_client(config.credentials.as_deref()).await?;
    let project = table
        .project
        .clone()
        .or_else(|| config.engine.project().map(str::to_string))
        .or(cred_project)
        .ok_or_else(|| anyhow!("no project for {}; pass --project or use project:dataset.table", table))?;
    let target = table.qualified(&project);

    let inserts = insert_statements(&target, &config.schema, &batch, batch_size)?;
    let script = replace_script(&target, &inserts);
    if script.len() > MAX_SCRIPT_BYTES {
        bail!(
            "replacing {} needs a {} byte script, over the {} byte query limit",
            target,
            script.len(),
            MAX_SCRIPT_BYTES
        );
    }

    run_statement(&client, &project, create_table_ddl(&target, &config.schema))
        .await
        .with_context(|| format!("creating {}", target))?;
    info!(table = %target, statements = inserts.len(), "replacing rows in one transaction");
    run_statement(&client, &project, script)
        .await
        .with_context(|| format!("replacing rows of {}", target))?;

    let rows = batch.num_rows() as u64;
    info!(table = %target, rows, "replaced table contents");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::parse_line;
    use crate::schema::historical_prices_schema;

    #[test]
    fn parses_table_identifiers() -> Result<()> {
        let t = BigQueryTable::parse("stocks_data.historical_prices")?;
        assert_eq!(t.project, None);
        assert_eq!(t.dataset, "stocks_data");
        assert_eq!(t.table, "historical_prices");

        let t = BigQueryTable::parse("my-proj:stocks_data.prices")?;
        assert_eq!(t.project.as_deref(), Some("my-proj"));
        assert_eq!(t.to_string(), "my-proj:stocks_data.prices");

        let t = BigQueryTable::parse("my-proj.stocks_data.prices")?;
        assert_eq!(t.project.as_deref(), Some("my-proj"));

        for bad in ["prices", "a.b.c.d", "p:a.b.c", "ds.`t`", "ds.t; DROP", ".t", "ds."] {
            assert!(BigQueryTable::parse(bad).is_err(), "{bad}");
        }
        Ok(())
    }

    #[test]
    fn ddl_declares_fixed_schema() {
        let sql = create_table_ddl("`p.ds.t`", &historical_prices_schema());
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS `p.ds.t` (`date` DATE, `volume` INT64, `open` FLOAT64, \
             `close` FLOAT64, `high` FLOAT64, `low` FLOAT64, `adjclose` FLOAT64)"
        );
    }

    #[test]
    fn replacement_is_one_transaction() {
        let inserts = vec![
            "INSERT INTO `p.ds.t` (`date`) VALUES (DATE '2020-01-02')".to_string(),
            "INSERT INTO `p.ds.t` (`date`) VALUES (DATE '2020-01-03')".to_string(),
        ];
        assert_eq!(
            replace_script("`p.ds.t`", &inserts),
            "BEGIN TRANSACTION;\n\
             DELETE FROM `p.ds.t` WHERE TRUE;\n\
             INSERT INTO `p.ds.t` (`date`) VALUES (DATE '2020-01-02');\n\
             INSERT INTO `p.ds.t` (`date`) VALUES (DATE '2020-01-03');\n\
             COMMIT TRANSACTION;"
        );
    }

    #[test]
    fn empty_replacement_still_clears_the_table() {
        let script = replace_script("`p.ds.t`", &[]);
        assert_eq!(
            script,
            "BEGIN TRANSACTION;\nDELETE FROM `p.ds.t` WHERE TRUE;\nCOMMIT TRANSACTION;"
        );
    }

    #[test]
    fn inserts_are_chunked_and_typed() -> Result<()> {
        let records = vec![
            parse_line("2020-01-02,1000,10.5,10.6,10.7,10.4,10.55"),
            parse_line("2020-01-03,2000,11,NaN,-inf,1e300,11.05"),
            parse_line("2020-01-06,3000"),
        ];
        let cols = historical_prices_schema();
        let batch = records_to_batch(&records, &cols)?;
        let stmts = insert_statements("`p.ds.t`", &cols, &batch, 2)?;

        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with(
            "INSERT INTO `p.ds.t` (`date`, `volume`, `open`, `close`, `high`, `low`, `adjclose`) VALUES "
        ));
        assert!(stmts[0].contains("(DATE '2020-01-02', 1000, 10.5, 10.6, 10.7, 10.4, 10.55)"));
        assert!(stmts[0].contains(
            "(DATE '2020-01-03', 2000, 11.0, CAST('NaN' AS FLOAT64), CAST('-inf' AS FLOAT64), 1e300, 11.05)"
        ));
        assert!(stmts[1].ends_with("(DATE '2020-01-06', 3000, NULL, NULL, NULL, NULL, NULL)"));
        Ok(())
    }

    #[test]
    fn no_rows_no_inserts() -> Result<()> {
        let cols = historical_prices_schema();
        let batch = records_to_batch(&[], &cols)?;
        assert!(insert_statements("`p.ds.t`", &cols, &batch, 10)?.is_empty());
        Ok(())
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(quote_string("it's a \\ test\n"), "'it\\'s a \\\\ test\\n'");
    }

    #[tokio::test]
    #[ignore] // needs a real project and credentials
    async fn test_write_real_table() -> Result<()> {
        let table = BigQueryTable::parse(&std::env::var("BQ_TEST_TABLE")?)?;
        let config = JobConfig::try_from_args(["stockload"])?;
        let rows = write_truncate(&table, &[parse_line("2020-01-02,1,1,1,1,1,1")], &config).await?;
        assert_eq!(rows, 1);
        Ok(())
    }
}
