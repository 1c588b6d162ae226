// src/config.rs

use anyhow::{Context, Result};
use clap::Parser;
use std::{ffi::OsString, path::PathBuf};

use crate::schema::{parse_schema, Column, HISTORICAL_PRICES_SCHEMA};

pub const DEFAULT_INPUT: &str = "gs://stock_data_test/*.AX.csv";
pub const DEFAULT_OUTPUT: &str = "stocks_data.historical_prices";
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Flags owned by this binary. Anything else on the command line is kept as
/// an engine option.
#[derive(Parser, Debug, Clone)]
#[command(name = "stockload", about = "Load stock price CSVs into an analytical table")]
pub struct Args {
    /// Input file pattern. A local glob or `gs://bucket/<glob>`.
    #[arg(long, default_value = DEFAULT_INPUT)]
    pub input: String,

    /// Output table: `[project:]dataset.table`, or a path ending in `.parquet`.
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    pub output: String,

    /// Service account key file used by the cloud clients.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub credentials: Option<PathBuf>,
}

const KNOWN_FLAGS: &[&str] = &["--input", "--output", "--credentials"];
const KNOWN_SWITCHES: &[&str] = &["-h", "--help"];

/// Split `argv` into (this binary's args, pass-through args), the way
/// argparse's `parse_known_args` does. `argv[0]` stays with the known half.
pub fn parse_known_args<I, T>(argv: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut iter = argv.into_iter().map(Into::into);
    let mut known: Vec<String> = iter.next().into_iter().collect();
    let mut rest = Vec::new();

    while let Some(arg) = iter.next() {
        let flag = arg.split_once('=').map_or(arg.as_str(), |(f, _)| f);
        if KNOWN_SWITCHES.contains(&arg.as_str()) {
            known.push(arg);
        } else if KNOWN_FLAGS.contains(&flag) {
            let takes_next = !arg.contains('=');
            known.push(arg);
            if takes_next {
                if let Some(value) = iter.next() {
                    known.push(value);
                }
            }
        } else {
            rest.push(arg);
        }
    }

    (known, rest)
}

/// Pass-through options for the execution engine, kept in command-line order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
    raw: Vec<String>,
    pairs: Vec<(String, Option<String>)>,
}

impl EngineOptions {
    /// Parse `--key=value`, `--key value` and bare `--flag` forms.
    /// Tokens that are not flags are kept in `raw` only.
    pub fn parse(raw: Vec<String>) -> Self {
        let mut pairs = Vec::new();
        let mut i = 0;
        while i < raw.len() {
            let arg = &raw[i];
            i += 1;
            let Some(body) = arg.strip_prefix("--") else {
                continue;
            };
            match body.split_once('=') {
                Some((k, v)) => pairs.push((normalize_key(k), Some(v.to_string()))),
                None => {
                    let value = raw
                        .get(i)
                        .filter(|next| !next.starts_with("--"))
                        .cloned();
                    if value.is_some() {
                        i += 1;
                    }
                    pairs.push((normalize_key(body), value));
                }
            }
        }
        Self { raw, pairs }
    }

    /// The arguments exactly as given.
    pub fn raw(&self) -> &[String] {
        &self.raw
    }

    /// Last value given for `key`. Dashes and underscores are interchangeable.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn project(&self) -> Option<&str> {
        self.get("project")
    }

    /// Rows per BigQuery insert statement.
    pub fn batch_size(&self) -> Result<usize> {
        match self.get("batch_size") {
            None => Ok(DEFAULT_BATCH_SIZE),
            Some(v) => {
                let n: usize = v
                    .parse()
                    .with_context(|| format!("invalid --batch_size `{}`", v))?;
                anyhow::ensure!(n > 0, "--batch_size must be positive");
                Ok(n)
            }
        }
    }

    /// Worker threads for the normalize stage; `None` leaves rayon's default.
    pub fn max_workers(&self) -> Result<Option<usize>> {
        self.get("max_workers")
            .map(|v| {
                v.parse()
                    .with_context(|| format!("invalid --max_workers `{}`", v))
            })
            .transpose()
    }
}

fn normalize_key(k: &str) -> String {
    k.replace('-', "_")
}

/// Everything the job needs, assembled once at startup.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub input: String,
    pub output: String,
    pub credentials: Option<PathBuf>,
    pub schema: Vec<Column>,
    pub engine: EngineOptions,
}

impl JobConfig {
    /// Build from the process arguments. Exits on `--help` or bad flags.
    pub fn from_env_args() -> Result<Self> {
        let argv: Vec<String> = std::env::args_os()
            .map(|a: OsString| a.to_string_lossy().into_owned())
            .collect();
        let (known, rest) = parse_known_args(argv);
        Self::from_parts(Args::parse_from(known), rest)
    }

    /// Like `from_env_args` but returns parse errors instead of exiting.
    pub fn try_from_args<I, T>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let (known, rest) = parse_known_args(argv);
        let args = Args::try_parse_from(known).context("parsing command line")?;
        Self::from_parts(args, rest)
    }

    fn from_parts(args: Args, rest: Vec<String>) -> Result<Self> {
        Ok(Self {
            input: args.input,
            output: args.output,
            credentials: args.credentials,
            schema: parse_schema(HISTORICAL_PRICES_SCHEMA)?,
            engine: EngineOptions::parse(rest),
        })
    }
}
