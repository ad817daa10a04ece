//! Line-aligned text chunking
//!
//! Splits collected text into ordered pieces that can be submitted to the
//! LLM independently. Boundaries only fall on `\n`, so joining the chunks
//! with `\n` reproduces the input exactly.

/// Splits `text` into chunks of at most `chunk_size` bytes
///
/// A single line longer than `chunk_size` is kept whole and becomes its own
/// oversized chunk. Empty input yields one empty chunk.
///
/// # Arguments
/// * `text` - The collected text
/// * `chunk_size` - Byte budget per chunk, separators included
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut lines_in_current = 0usize;

    for line in text.split('\n') {
        let added = if lines_in_current == 0 {
            line.len()
        } else {
            line.len() + 1
        };

        if lines_in_current > 0 && current.len() + added > chunk_size {
            chunks.push(std::mem::take(&mut current));
            lines_in_current = 0;
        }

        if lines_in_current > 0 {
            current.push('\n');
        }
        current.push_str(line);
        lines_in_current += 1;
    }

    chunks.push(current);
    chunks
}
