//! Flattening recognized pages into plain text.

use crate::read_api::AnalyzeResult;

/// Concatenate the text of every line on every page, in document order,
/// with each line followed by `\n`.
pub fn aggregate_text(result: &AnalyzeResult) -> String {
    let mut text = String::new();
    for page in &result.read_results {
        for line in &page.lines {
            text.push_str(&line.text);
            text.push('\n');
        }
    }
    text
}
