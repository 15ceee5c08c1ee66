//! Row oriented dataset with a batched, optionally parallel `map`.

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressIterator, ProgressStyle};
use rayon::prelude::*;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fs;
use std::path::Path;

use crate::template::{DialogTemplate, TextMessage};

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Parses one JSON object per line, skipping blank lines
    pub fn from_jsonl_str(jsonl: &str) -> Result<Self> {
        let rows = jsonl
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str::<Row>(line)
                    .with_context(|| format!("line {} is not a JSON object", idx + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows })
    }

    /// Parses a JSON array of objects
    pub fn from_json_str(json: &str) -> Result<Self> {
        let rows: Vec<Row> = serde_json::from_str(json).context("expected an array of objects")?;
        Ok(Self { rows })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = crate::time_it!(
            "Time to read",
            fs::read_to_string(path).with_context(|| format!("unable to read {}", path.display()))?
        );
        let dataset = match path.extension().and_then(|ext| ext.to_str()) {
            Some("jsonl") => Self::from_jsonl_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => bail!("unsupported dataset file {}, expected .jsonl or .json", path.display()),
        }
        .with_context(|| format!("failed to parse {}", path.display()))?;
        tracing::info!("Loaded {} rows from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Keys of the first row, then keys first seen in later rows
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for row in &self.rows {
            for key in row.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        names
    }

    pub fn column(&self, name: &str) -> Result<Vec<&Value>> {
        column_values(&self.rows, name, 0)
    }

    /// Hands consecutive batches of rows to `f` and merges the fields it
    /// returns into those rows. `f` also receives the index of the batch's
    /// first row. Batches run on a pool of `num_proc` threads when more than
    /// one is requested.
    pub fn map_batched<F>(self, batch_size: usize, num_proc: Option<usize>, f: F) -> Result<Self>
    where
        F: Fn(usize, &[Row]) -> Result<Vec<Row>> + Sync,
    {
        let batch_size = batch_size.max(1);
        let mut rows = self.rows;
        let batches = rows.len().div_ceil(batch_size);
        let style = ProgressStyle::with_template(
            "Mapping: [{elapsed_precise} / {eta_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {per_sec}",
        )?;
        let pb = ProgressBar::new(batches as u64).with_style(style);

        let run = |(idx, batch): (usize, &mut [Row])| -> Result<()> {
            let fields = f(idx * batch_size, batch)?;
            if fields.len() != batch.len() {
                bail!(
                    "mapped batch returned {} rows, expected {}",
                    fields.len(),
                    batch.len()
                );
            }
            for (row, new_fields) in batch.iter_mut().zip(fields) {
                row.extend(new_fields);
            }
            Ok(())
        };

        match num_proc {
            Some(threads) if threads > 1 => {
                tracing::debug!("Mapping {} batches on {} threads", batches, threads);
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()?;
                pool.install(|| {
                    rows.par_chunks_mut(batch_size)
                        .enumerate()
                        .progress_with(pb)
                        .try_for_each(run)
                })?;
            }
            _ => {
                rows.chunks_mut(batch_size)
                    .enumerate()
                    .progress_with(pb)
                    .try_for_each(run)?;
            }
        }
        Ok(Self { rows })
    }
}

/// Borrowed values of `name`, `offset` is the index of `rows[0]` for errors
pub fn column_values<'a>(rows: &'a [Row], name: &str, offset: usize) -> Result<Vec<&'a Value>> {
    rows.iter()
        .enumerate()
        .map(|(idx, row)| {
            row.get(name)
                .ok_or_else(|| anyhow!("column \"{}\" not found in row {}", name, offset + idx))
        })
        .collect()
}

/// Dialog text of a cell, rendering message lists through `template`
pub fn dialog_text<'a>(
    value: &'a Value,
    template: &DialogTemplate,
    column: &str,
) -> Result<Cow<'a, str>> {
    match value {
        Value::String(text) => Ok(Cow::Borrowed(text)),
        Value::Array(_) => {
            let messages = Vec::<TextMessage>::deserialize(value)
                .with_context(|| format!("column \"{}\" holds a malformed message list", column))?;
            Ok(Cow::Owned(template.apply(&messages)?))
        }
        other => bail!(
            "unsupported column type for \"{}\": expected string or message list, got {}",
            column,
            type_name(other)
        ),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
