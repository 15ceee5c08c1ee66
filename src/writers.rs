// Persists datasets as jsonl, arrow or msgpack

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, ListBuilder, StringBuilder, UInt32Builder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dataset::{Dataset, Row};

/// Columns written as `List<UInt32>` in arrow files
pub const TOKEN_COLUMNS: [&str; 3] = ["input_ids", "attention_mask", "token_type_ids"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Jsonl,
    Arrow,
    Msgpack,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Arrow => "arrow",
            OutputFormat::Msgpack => "msgpack",
        }
    }
}

/// `input/file.jsonl -> out_folder/file.<ext>`
pub fn output_path(input: &Path, out_folder: &Path, format: OutputFormat) -> Result<PathBuf> {
    let file_stem = input
        .file_stem() // get the filename without extension
        .with_context(|| format!("invalid file path {}", input.display()))?;
    let mut out_path = out_folder.join(file_stem);
    out_path.set_extension(format.extension());
    Ok(out_path)
}

pub fn write_dataset(dataset: &Dataset, path: &Path, format: OutputFormat) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("unable to create {}", path.display()))?;
    let mut buffer = BufWriter::new(file);
    match format {
        OutputFormat::Jsonl => write_jsonl(dataset, &mut buffer)?,
        OutputFormat::Msgpack => write_msgpack(dataset, &mut buffer)?,
        OutputFormat::Arrow => write_arrow(dataset, &mut buffer)?,
    }
    buffer.flush()?;
    tracing::info!("Wrote {} rows to {}", dataset.len(), path.display());
    Ok(())
}

pub fn write_jsonl<W: Write>(dataset: &Dataset, writer: &mut W) -> Result<()> {
    for row in dataset.rows() {
        serde_json::to_writer(&mut *writer, row)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

pub fn write_msgpack<W: Write>(dataset: &Dataset, writer: &mut W) -> Result<()> {
    rmp_serde::encode::write_named(writer, dataset.rows())?;
    Ok(())
}

fn is_token_column(name: &str) -> bool {
    TOKEN_COLUMNS.contains(&name)
}

fn token_list_type() -> DataType {
    DataType::List(Arc::new(Field::new("item", DataType::UInt32, true)))
}

pub fn arrow_schema(columns: &[String]) -> Schema {
    let fields: Vec<Field> = columns
        .iter()
        .map(|name| {
            if is_token_column(name) {
                Field::new(name, token_list_type(), true)
            } else {
                Field::new(name, DataType::Utf8, true)
            }
        })
        .collect();
    Schema::new(fields)
}

fn token_column(rows: &[Row], name: &str) -> Result<ArrayRef> {
    let mut builder = ListBuilder::new(UInt32Builder::new());
    for (idx, row) in rows.iter().enumerate() {
        match row.get(name) {
            Some(Value::Array(ids)) => {
                for id in ids {
                    let id = id
                        .as_u64()
                        .and_then(|id| u32::try_from(id).ok())
                        .with_context(|| format!("{} of row {} holds a non u32 value", name, idx))?;
                    builder.values().append_value(id);
                }
                builder.append(true);
            }
            _ => builder.append(false),
        }
    }
    Ok(Arc::new(builder.finish()))
}

fn text_column(rows: &[Row], name: &str) -> ArrayRef {
    let mut builder = StringBuilder::new();
    for row in rows {
        match row.get(name) {
            None | Some(Value::Null) => builder.append_null(),
            Some(Value::String(text)) => builder.append_value(text),
            Some(other) => builder.append_value(other.to_string()),
        }
    }
    Arc::new(builder.finish())
}

/// Arrow IPC file with a single record batch
pub fn write_arrow<W: Write>(dataset: &Dataset, writer: &mut W) -> Result<()> {
    let columns = dataset.column_names();
    let schema = Arc::new(arrow_schema(&columns));
    let rows = dataset.rows();
    let arrays = columns
        .iter()
        .map(|name| {
            if is_token_column(name) {
                token_column(rows, name)
            } else {
                Ok(text_column(rows, name))
            }
        })
        .collect::<Result<Vec<_>>>()?;
    let mut writer = FileWriter::try_new(writer, &schema)?;
    if !columns.is_empty() {
        let batch = RecordBatch::try_new(schema.clone(), arrays)?;
        writer.write(&batch)?;
    }
    writer.finish()?;
    Ok(())
}
