// Renders message lists into plain HH style transcripts so they can be split
// the same way as raw dialog strings.
//
use anyhow::{Context, Result};
use minijinja::{Environment, Template};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::config::TokenizerConfig;

/// Turns are rendered as `\n\nHuman: ...` / `\n\nAssistant: ...`
pub const HH_TEMPLATE: &str = concat!(
    "{%- for message in messages -%}",
    "{%- if message.role in ['assistant', 'gpt', 'bot'] -%}",
    "{{ '\\n\\nAssistant: ' ~ message.content }}",
    "{%- else -%}",
    "{{ '\\n\\nHuman: ' ~ message.content }}",
    "{%- endif -%}",
    "{%- endfor -%}"
);

#[derive(Serialize)]
struct DialogTemplateInputs<'a> {
    messages: &'a [TextMessage],
    bos_token: Option<&'a str>,
    eos_token: Option<&'a str>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct TextMessage {
    #[serde(alias = "from")]
    pub role: String,
    #[serde(alias = "value")]
    pub content: String,
}

#[derive(Clone)]
pub struct DialogTemplate {
    template: Template<'static, 'static>,
    bos_token: Option<String>,
    eos_token: Option<String>,
}

static HH: OnceLock<DialogTemplate> = OnceLock::new();

impl DialogTemplate {
    pub fn new(source: String) -> Result<Self> {
        let mut env = Environment::new();
        minijinja_contrib::add_to_environment(&mut env);
        env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
        let env = Box::new(env);

        let template_str = source.into_boxed_str();

        // leaking env and template_str as read-only, static resources for performance.
        let template = Box::leak(env)
            .template_from_str(Box::leak(template_str))
            .context("invalid dialog template")?;

        Ok(Self {
            template,
            bos_token: None,
            eos_token: None,
        })
    }

    /// Built-in HH template, compiled once
    pub fn hh() -> &'static DialogTemplate {
        HH.get_or_init(|| Self::new(HH_TEMPLATE.to_string()).expect("built-in template compiles"))
    }

    /// Exposes the tokenizer's `bos_token` and `eos_token` to the template
    pub fn with_special_tokens(mut self, config: &TokenizerConfig) -> Self {
        self.bos_token = config.bos_token.clone();
        self.eos_token = config.eos_token.clone();
        self
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read template {}", path))?;
        Self::new(source)
    }

    pub fn apply(&self, messages: &[TextMessage]) -> Result<String> {
        Ok(self.template.render(DialogTemplateInputs {
            messages,
            bos_token: self.bos_token.as_deref(),
            eos_token: self.eos_token.as_deref(),
        })?)
    }
}

impl Default for DialogTemplate {
    fn default() -> Self {
        Self::hh().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split;

    fn messages() -> Vec<TextMessage> {
        vec![
            TextMessage {
                role: "user".to_string(),
                content: "What is Deep Learning?".to_string(),
            },
            TextMessage {
                role: "assistant".to_string(),
                content: "magic!".to_string(),
            },
            TextMessage {
                role: "user".to_string(),
                content: "Really?".to_string(),
            },
            TextMessage {
                role: "assistant".to_string(),
                content: "Mostly matrices.".to_string(),
            },
        ]
    }

    #[test]
    fn test_default_template() {
        let result = DialogTemplate::default().apply(&messages()).unwrap();
        assert_eq!(
            result,
            "\n\nHuman: What is Deep Learning?\n\nAssistant: magic!\n\nHuman: Really?\n\nAssistant: Mostly matrices."
        );
        let (prompt, output) = split::split_dialog(&result, split::DEFAULT_DELIMITER);
        assert!(prompt.ends_with("Really?\n\nAssistant: "));
        assert_eq!(output, "Mostly matrices.");
    }

    #[test]
    fn test_sharegpt_aliases() {
        let messages: Vec<TextMessage> = serde_json::from_str(
            r#"[{"from": "human", "value": "Hi!"}, {"from": "gpt", "value": "Hello"}]"#,
        )
        .unwrap();
        let result = DialogTemplate::default().apply(&messages).unwrap();
        assert_eq!(result, "\n\nHuman: Hi!\n\nAssistant: Hello");
    }

    #[test]
    fn test_custom_template_with_pycompat() {
        let ct = DialogTemplate::new(
            "{% for m in messages %}{{ m.role.upper() }}: {{ m.content.strip() }} {% endfor %}"
                .to_string(),
        )
        .unwrap();
        let messages = vec![TextMessage {
            role: "user".to_string(),
            content: "  Hi!  ".to_string(),
        }];
        assert_eq!(ct.apply(&messages).unwrap(), "USER: Hi! ");
    }

    #[test]
    fn test_special_tokens() {
        let config = crate::config::parse_config(r#"{"bos_token": "<s>", "eos_token": "</s>"}"#).unwrap();
        let ct = DialogTemplate::new(
            "{{ bos_token }}{% for m in messages %}{{ m.content }}{{ eos_token }}{% endfor %}".to_string(),
        )
        .unwrap()
        .with_special_tokens(&config);
        assert_eq!(ct.apply(&messages()[..2]).unwrap(), "<s>What is Deep Learning?</s>magic!</s>");

        let plain = DialogTemplate::new("{{ bos_token }}|{{ eos_token }}".to_string()).unwrap();
        assert_eq!(plain.apply(&[]).unwrap(), "none|none");
    }

    #[test]
    fn test_hh_is_shared() {
        assert!(std::ptr::eq(DialogTemplate::hh(), DialogTemplate::hh()));
    }

    #[test]
    fn test_invalid_template() {
        assert!(DialogTemplate::new("{% for %}".to_string()).is_err());
    }
}
