// lib.rs
pub mod args;
pub mod config;
pub mod dataset;
pub mod split;
pub mod template;
pub mod tokenize;
pub mod utils;
pub mod writers;

pub use dataset::Dataset;
pub use split::{split_into_last_prompt_and_last_output, split_with_delimiter};
pub use tokenize::{tokenized_dataset, TokenizeOptions};
