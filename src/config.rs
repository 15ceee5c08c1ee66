/// Handles the resolving of `tokenizer_config.json`
/// Reference from hf tokenizers for downloading:
/// https://github.com/huggingface/tokenizers/blob/c45aebd1029acfbe9e5dfe64e8b8441d9fae727a/tokenizers/src/utils/from_pretrained.rs#L26

use anyhow::{bail, Context, Result};
use hf_hub::{api::sync::ApiBuilder, Cache, Repo, RepoType};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "tokenizer_config.json";

/// Cutoff for `model_max_length`; hub configs without a real limit store `int(1e30)`
const UNBOUNDED_MAX_LENGTH: f64 = 1e20;

#[derive(Deserialize, Debug, Default, Clone)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub model_max_length: Option<f64>,
    #[serde(default)]
    pub truncation_side: Option<String>,
    #[serde(default)]
    pub model_input_names: Option<Vec<String>>,
    #[serde(default, deserialize_with = "token_content")]
    pub bos_token: Option<String>,
    #[serde(default, deserialize_with = "token_content")]
    pub eos_token: Option<String>,
}

impl TokenizerConfig {
    /// Usable truncation length, `None` when the config carries no real bound
    pub fn max_length(&self) -> Option<usize> {
        self.model_max_length
            .filter(|len| *len > 0.0 && *len < UNBOUNDED_MAX_LENGTH)
            .map(|len| len as usize)
    }

    pub fn truncate_left(&self) -> bool {
        self.truncation_side.as_deref() == Some("left")
    }

    pub fn returns_token_type_ids(&self) -> bool {
        self.model_input_names
            .as_ref()
            .is_some_and(|names| names.iter().any(|name| name == "token_type_ids"))
    }
}

/// Special tokens are either a plain string or an `AddedToken` object
fn token_content<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Token {
        Plain(String),
        Added { content: String },
    }
    let token: Option<Token> = Option::deserialize(deserializer)?;
    Ok(token.map(|token| match token {
        Token::Plain(content) | Token::Added { content } => content,
    }))
}

/// Defines the additional parameters available for the `from_pretrained` function
#[derive(Debug, Clone)]
pub struct FromPretrainedParameters {
    pub revision: String,
    pub user_agent: HashMap<String, String>,
    pub token: Option<String>,
}

impl Default for FromPretrainedParameters {
    fn default() -> Self {
        Self {
            revision: "main".into(),
            user_agent: HashMap::new(),
            token: None,
        }
    }
}

impl From<FromPretrainedParameters> for tokenizers::FromPretrainedParameters {
    fn from(params: FromPretrainedParameters) -> Self {
        Self {
            revision: params.revision,
            user_agent: params.user_agent,
            token: params.token,
        }
    }
}

fn check_identifier(kind: &str, value: &str) -> Result<()> {
    let valid_chars = ['-', '_', '.', '/'];
    let is_valid_char = |x: char| x.is_alphanumeric() || valid_chars.contains(&x);
    if value.chars().all(is_valid_char) {
        return Ok(());
    }
    let valid_chars_stringified = valid_chars
        .iter()
        .map(|x| format!("'{}'", x))
        .collect::<Vec<_>>()
        .join(", ");
    bail!(
        "{kind} \"{value}\" contains invalid characters, expected only alphanumeric or {valid_chars_stringified}"
    )
}

/// Downloads and cache the tokenizer config if it exists on
/// the Hugging Face Hub, and returns a local path to the file.
/// `None` when the repo has no config file.
fn from_pretrained(identifier: &str, params: FromPretrainedParameters) -> Result<Option<PathBuf>> {
    check_identifier("Model", identifier)?;
    check_identifier("Revision", &params.revision)?;

    let repo = Repo::with_revision(identifier.to_string(), RepoType::Model, params.revision);
    if let Some(path) = Cache::default().repo(repo.clone()).get(CONFIG_FILE) {
        return Ok(Some(path));
    }

    let mut builder = ApiBuilder::new();
    if let Some(token) = params.token {
        builder = builder.with_token(Some(token));
    }
    let api = builder.build()?.repo(repo);
    let info = api
        .info()
        .with_context(|| format!("unable to fetch repo info for \"{identifier}\""))?;
    if !info.siblings.iter().any(|file| file.rfilename == CONFIG_FILE) {
        return Ok(None);
    }
    let path = api
        .get(CONFIG_FILE)
        .with_context(|| format!("unable to fetch {CONFIG_FILE} for \"{identifier}\""))?;
    Ok(Some(path))
}

pub fn parse_config(json: &str) -> Result<TokenizerConfig> {
    Ok(serde_json::from_str(json)?)
}

fn read_config_file(path: &Path) -> Result<TokenizerConfig> {
    let config = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    parse_config(&config).with_context(|| format!("invalid tokenizer config {}", path.display()))
}

/// Resolves the tokenizer config for a hub identifier, a local tokenizer
/// directory, or a local `tokenizer.json` file
pub fn read_config(
    tokenizer: &str,
    params: Option<FromPretrainedParameters>,
) -> Result<TokenizerConfig> {
    let local = Path::new(tokenizer);
    if local.is_dir() {
        let path = local.join(CONFIG_FILE);
        if path.is_file() {
            return read_config_file(&path);
        }
        tracing::debug!("No {} in {}, using defaults", CONFIG_FILE, tokenizer);
        return Ok(TokenizerConfig::default());
    }
    if tokenizer.ends_with(".json") {
        let sibling = local.with_file_name(CONFIG_FILE);
        if sibling.is_file() {
            return read_config_file(&sibling);
        }
        tracing::debug!("No {} next to {}, using defaults", CONFIG_FILE, tokenizer);
        return Ok(TokenizerConfig::default());
    }
    match from_pretrained(tokenizer, params.unwrap_or_default())? {
        Some(path) => read_config_file(&path),
        None => {
            tracing::debug!("{} has no {}, using defaults", tokenizer, CONFIG_FILE);
            Ok(TokenizerConfig::default())
        }
    }
}
