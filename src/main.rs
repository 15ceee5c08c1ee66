use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Context, Result};
use clap::Parser;
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use dialogsplit::args;
use dialogsplit::dataset::Dataset;
use dialogsplit::template::DialogTemplate;
use dialogsplit::tokenize::{self, PairTokenizer, TokenizeOptions};
use dialogsplit::writers::{self, OutputFormat};

/// Dataset files directly inside `folder`, sorted by name
fn dataset_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(folder)
        .with_context(|| format!("unable to read {}", folder.display()))?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            match path.extension()?.to_str()? {
                "jsonl" | "json" => Some(path),
                _ => None,
            }
        })
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

fn process_file(
    path: &Path,
    out_folder: &Path,
    format: OutputFormat,
    tokenizer: &PairTokenizer,
    template: &DialogTemplate,
    options: &TokenizeOptions,
) -> Result<()> {
    tracing::info!("Reading dataset: {}", path.display());
    let dataset = Dataset::load(path)?;
    let dataset = dialogsplit::time_it!(
        "Time to tokenize",
        tokenize::tokenize_dataset_with(dataset, tokenizer, template, options)
            .with_context(|| format!("failed to tokenize {}", path.display()))?
    );
    let out_path = writers::output_path(path, out_folder, format)?;
    writers::write_dataset(&dataset, &out_path, format)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = args::Cli::parse();
    let input = PathBuf::from(&args.input);
    let out_folder = PathBuf::from(&args.output);
    // check if output folder exists
    if !out_folder.exists() {
        fs::create_dir_all(&out_folder)?;
    }

    let options = TokenizeOptions {
        column: args.column,
        model: args.tokenizer,
        num_proc: Some(args.num_proc),
        batch_size: args.batch_size,
        delimiter: args.delimiter,
        max_length: args.max_length,
        revision: args.revision,
        token: std::env::var("HF_TOKEN").ok(),
    };
    if options.delimiter.is_empty() {
        bail!("--delimiter must not be empty");
    }

    let tokenizer = PairTokenizer::load(
        &options.model,
        options.max_length,
        options.pretrained_params(),
    )?;
    tracing::debug!("Vocabulary size: {}", tokenizer.inner().get_vocab_size(true));
    let template = match &args.template {
        Some(path) => DialogTemplate::from_file(path)?.with_special_tokens(tokenizer.config()),
        None => DialogTemplate::default(),
    };

    let paths = if input.is_dir() {
        dataset_files(&input)?
    } else {
        vec![input]
    };
    if paths.is_empty() {
        bail!("no .jsonl or .json files found in {}", args.input);
    }

    let total = paths.len();
    let done = AtomicUsize::new(0);
    paths
        .par_iter()
        .map(|path| -> Result<()> {
            process_file(path, &out_folder, args.format, &tokenizer, &template, &options)?;
            let done = done.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!("Processed {} out of {}", done, total);
            Ok(())
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialogsplit::config::FromPretrainedParameters;
    use serde_json::json;

    #[test]
    fn test_dataset_files() {
        let dir = std::env::temp_dir().join(format!("dialogsplit-files-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for name in ["b.jsonl", "a.json", "notes.txt"] {
            fs::write(dir.join(name), "").unwrap();
        }
        let files = dataset_files(&dir).unwrap();
        assert_eq!(files, vec![dir.join("a.json"), dir.join("b.jsonl")]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_process_file() {
        let dir = std::env::temp_dir().join(format!("dialogsplit-process-{}", std::process::id()));
        let out = dir.join("out");
        fs::create_dir_all(&out).unwrap();
        let vocab = json!({
            "[UNK]": 0, "Human": 1, "Assistant": 2, ":": 3, "str1": 4, "str2": 5
        });
        let tokenizer_json = json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": {"type": "Whitespace"},
            "post_processor": null,
            "decoder": null,
            "model": {"type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]"}
        });
        let tokenizer_path = dir.join("tokenizer.json");
        fs::write(&tokenizer_path, tokenizer_json.to_string()).unwrap();
        fs::write(dir.join("tokenizer_config.json"), r#"{"model_max_length": 512}"#).unwrap();
        let input = dir.join("train.jsonl");
        fs::write(&input, "{\"chosen\": \"Human: str1 Assistant: str2\"}\n").unwrap();

        let tokenizer = PairTokenizer::load(
            tokenizer_path.to_str().unwrap(),
            None,
            FromPretrainedParameters::default(),
        )
        .unwrap();
        process_file(
            &input,
            &out,
            OutputFormat::Jsonl,
            &tokenizer,
            &DialogTemplate::default(),
            &TokenizeOptions::default(),
        )
        .unwrap();

        let written = Dataset::load(out.join("train.jsonl")).unwrap();
        assert_eq!(written.rows()[0]["input_ids"], json!([1, 3, 4, 2, 3, 5]));
        assert_eq!(written.rows()[0]["attention_mask"], json!([1, 1, 1, 1, 1, 1]));
        fs::remove_dir_all(&dir).unwrap();
    }
}
