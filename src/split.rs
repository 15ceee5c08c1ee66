// Splits dialog transcripts into the last prompt and the last output

/// Marker that opens a reply turn in HH style transcripts
pub const DEFAULT_DELIMITER: &str = "Assistant: ";

/// Splits a single dialog on the last occurrence of `delimiter`.
///
/// The prompt keeps the delimiter. When the delimiter is missing the prompt is
/// empty and the whole dialog becomes the output.
///
/// # Example
///
/// ```
/// use dialogsplit::split::split_dialog;
///
/// let (prompt, output) = split_dialog("Human: hi Assistant: hello", "Assistant: ");
/// assert_eq!(prompt, "Human: hi Assistant: ");
/// assert_eq!(output, "hello");
/// ```
pub fn split_dialog<'a>(dialog: &'a str, delimiter: &str) -> (&'a str, &'a str) {
    match dialog.rfind(delimiter) {
        Some(start) => dialog.split_at(start + delimiter.len()),
        None => ("", dialog),
    }
}

/// Same as [`split_into_last_prompt_and_last_output`] with a custom delimiter
pub fn split_with_delimiter<S: AsRef<str>>(
    dialogs: &[S],
    delimiter: &str,
) -> (Vec<String>, Vec<String>) {
    dialogs
        .iter()
        .map(|dialog| {
            let (prompt, output) = split_dialog(dialog.as_ref(), delimiter);
            (prompt.to_string(), output.to_string())
        })
        .unzip()
}

/// Splits every dialog into the text up to and including the last
/// `"Assistant: "` and the text after it.
///
/// Both returned vectors have the same length and order as `dialogs`.
pub fn split_into_last_prompt_and_last_output<S: AsRef<str>>(
    dialogs: &[S],
) -> (Vec<String>, Vec<String>) {
    split_with_delimiter(dialogs, DEFAULT_DELIMITER)
}
