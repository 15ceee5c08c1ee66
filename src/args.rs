use clap::Parser;

use crate::split::DEFAULT_DELIMITER;
use crate::tokenize::{DEFAULT_BATCH_SIZE, DEFAULT_COLUMN, DEFAULT_MODEL, DEFAULT_NUM_PROC};
use crate::writers::OutputFormat;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    long_about = "This program splits dialogs into their last prompt and last output and tokenizes the pairs for preference tuning."
)]
pub struct Cli {
    #[clap(short, long, help="Input dataset, either a .jsonl/.json file or a folder containing them like so - path/*.jsonl",
    value_hint=clap::ValueHint::AnyPath)]
    pub input: String,
    #[clap(short, long, help = "Output folder, each dataset is written as its own file
    in the output folder. Eg. input/file.jsonl -> output/file.arrow",
    value_hint=clap::ValueHint::DirPath)]
    pub output: String,
    #[clap(
        short,
        long,
        help = "Accepts huggingface <org>/<name> format, a tokenizer folder or a tokenizer.json path",
        default_value = DEFAULT_MODEL
    )]
    pub tokenizer: String,
    #[clap(
        short,
        long,
        help = "Format of output file",
        value_enum,
        default_value_t = OutputFormat::Arrow
    )]
    pub format: OutputFormat,
    #[clap(short, long, help = "Column holding the dialog", default_value = DEFAULT_COLUMN)]
    pub column: String,
    #[clap(long, help = "Number of threads mapping batches", default_value_t = DEFAULT_NUM_PROC)]
    pub num_proc: usize,
    #[clap(long, help = "Rows per batch", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    #[clap(long, help = "Marker that opens the reply turn", default_value = DEFAULT_DELIMITER)]
    pub delimiter: String,
    #[clap(long, help = "Truncation length, defaults to the tokenizer's model_max_length")]
    pub max_length: Option<usize>,
    #[clap(long, help = "Hub revision of the tokenizer", default_value = "main")]
    pub revision: String,
    #[clap(long, help = "Jinja template rendering message list columns into a dialog",
    value_hint=clap::ValueHint::FilePath)]
    pub template: Option<String>,
}
