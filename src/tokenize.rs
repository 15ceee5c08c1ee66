// src/tokenize.rs
use anyhow::{bail, Result};
use serde_json::Value;
use tokenizers::{
    EncodeInput, Encoding, Tokenizer, TruncationDirection, TruncationParams, TruncationStrategy,
};

use crate::config::{self, FromPretrainedParameters, TokenizerConfig};
use crate::dataset::{self, Dataset, Row};
use crate::split;
use crate::template::DialogTemplate;

pub const DEFAULT_MODEL: &str = "google/flan-t5-small";
pub const DEFAULT_COLUMN: &str = "chosen";
pub const DEFAULT_NUM_PROC: usize = 2;
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Options for [`tokenized_dataset`]
#[derive(Debug, Clone)]
pub struct TokenizeOptions {
    /// Column holding the dialog, either a string or a message list
    pub column: String,
    /// Hub `<org>/<name>`, a local tokenizer directory, or a `tokenizer.json` path
    pub model: String,
    pub num_proc: Option<usize>,
    pub batch_size: usize,
    pub delimiter: String,
    /// Overrides `model_max_length` from the tokenizer config
    pub max_length: Option<usize>,
    pub revision: String,
    pub token: Option<String>,
}

impl Default for TokenizeOptions {
    fn default() -> Self {
        Self {
            column: DEFAULT_COLUMN.to_string(),
            model: DEFAULT_MODEL.to_string(),
            num_proc: Some(DEFAULT_NUM_PROC),
            batch_size: DEFAULT_BATCH_SIZE,
            delimiter: split::DEFAULT_DELIMITER.to_string(),
            max_length: None,
            revision: "main".to_string(),
            token: None,
        }
    }
}

impl TokenizeOptions {
    pub fn pretrained_params(&self) -> FromPretrainedParameters {
        FromPretrainedParameters {
            revision: self.revision.clone(),
            token: self.token.clone(),
            ..Default::default()
        }
    }
}

/// Tokenizer that encodes (prompt, output) pairs with truncation enabled
pub struct PairTokenizer {
    inner: Tokenizer,
    config: TokenizerConfig,
}

impl PairTokenizer {
    /// Loads a tokenizer the same way for hub names, directories and files
    ///
    /// # Arguments
    ///
    /// * `identifier` - `huggingface <org>/<name>`, a directory holding
    ///   `tokenizer.json`, or a path to a `tokenizer.json` file
    /// * `max_length` - truncation length, falls back to `model_max_length`
    pub fn load(
        identifier: &str,
        max_length: Option<usize>,
        params: FromPretrainedParameters,
    ) -> Result<Self> {
        let path = std::path::Path::new(identifier);
        let tokenizer = if identifier.ends_with(".json") {
            tracing::info!("Loading tokenizer from file: {}", identifier);
            Tokenizer::from_file(identifier).map_err(anyhow::Error::msg)?
        } else if path.is_dir() {
            tracing::info!("Loading tokenizer from directory: {}", identifier);
            Tokenizer::from_file(path.join("tokenizer.json")).map_err(anyhow::Error::msg)?
        } else {
            tracing::info!("Loading tokenizer: {}", identifier);
            Tokenizer::from_pretrained(identifier, Some(params.clone().into()))
                .map_err(anyhow::Error::msg)?
        };
        let config = config::read_config(identifier, Some(params))?;
        Self::new(tokenizer, &config, max_length)
    }

    pub fn new(
        mut inner: Tokenizer,
        config: &TokenizerConfig,
        max_length: Option<usize>,
    ) -> Result<Self> {
        match max_length.or_else(|| config.max_length()) {
            Some(max_length) => {
                let direction = if config.truncate_left() {
                    TruncationDirection::Left
                } else {
                    TruncationDirection::Right
                };
                inner
                    .with_truncation(Some(TruncationParams {
                        max_length,
                        strategy: TruncationStrategy::LongestFirst,
                        direction,
                        stride: 0,
                    }))
                    .map_err(anyhow::Error::msg)?;
            }
            None => {
                tracing::warn!(
                    "Tokenizer has no maximum length and none was given, sequences will not be truncated"
                );
                inner.with_truncation(None).map_err(anyhow::Error::msg)?;
            }
        }
        // padding is left to the collator
        inner.with_padding(None);
        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    pub fn encode_pairs<P, O>(&self, prompts: &[P], outputs: &[O]) -> Result<Vec<Encoding>>
    where
        P: AsRef<str> + Sync,
        O: AsRef<str> + Sync,
    {
        if prompts.len() != outputs.len() {
            bail!(
                "got {} prompts but {} outputs",
                prompts.len(),
                outputs.len()
            );
        }
        let inputs: Vec<EncodeInput> = prompts
            .iter()
            .zip(outputs)
            .map(|(prompt, output)| (prompt.as_ref(), output.as_ref()).into())
            .collect();
        self.inner
            .encode_batch(inputs, true)
            .map_err(anyhow::Error::msg)
    }

    /// Tokenizer output fields for one encoding
    pub fn fields(&self, encoding: &Encoding) -> Row {
        let mut row = Row::new();
        row.insert("input_ids".into(), Value::from(encoding.get_ids().to_vec()));
        row.insert(
            "attention_mask".into(),
            Value::from(encoding.get_attention_mask().to_vec()),
        );
        if self.config.returns_token_type_ids() {
            row.insert(
                "token_type_ids".into(),
                Value::from(encoding.get_type_ids().to_vec()),
            );
        }
        row
    }

    pub fn inner(&self) -> &Tokenizer {
        &self.inner
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }
}

/// Splits `column` into last prompt and last output and tokenizes the pairs
/// with an already loaded tokenizer
pub fn tokenize_dataset_with(
    dataset: Dataset,
    tokenizer: &PairTokenizer,
    template: &DialogTemplate,
    options: &TokenizeOptions,
) -> Result<Dataset> {
    if options.delimiter.is_empty() {
        bail!("delimiter must not be empty");
    }
    let column = options.column.as_str();
    dataset.map_batched(options.batch_size, options.num_proc, |offset, batch| {
        let dialogs = dataset::column_values(batch, column, offset)?
            .into_iter()
            .map(|value| dataset::dialog_text(value, template, column))
            .collect::<Result<Vec<_>>>()?;
        let (last_prompts, last_outputs) = split::split_with_delimiter(&dialogs, &options.delimiter);
        let encodings = tokenizer.encode_pairs(&last_prompts, &last_outputs)?;
        Ok(encodings.iter().map(|encoding| tokenizer.fields(encoding)).collect())
    })
}

/// Loads `options.model` and returns `dataset` with `input_ids`,
/// `attention_mask` and, when the model uses them, `token_type_ids` added
pub fn tokenized_dataset(dataset: Dataset, options: &TokenizeOptions) -> Result<Dataset> {
    let tokenizer = PairTokenizer::load(
        &options.model,
        options.max_length,
        options.pretrained_params(),
    )?;
    tokenize_dataset_with(dataset, &tokenizer, DialogTemplate::hh(), options)
}
