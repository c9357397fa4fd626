//! Output truncation strategies for captured command output.

/// How to truncate output that exceeds the maximum character limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationMode {
    /// Keep first 40% and last 60%, with a marker in the middle.
    HeadTail,
    /// Keep last `max_chars`, with a marker at the start.
    Tail,
}

/// Byte offset of the `n`th character of `s` (or `s.len()` past the end).
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

/// Truncate `output` to at most `max_chars` characters using the given mode.
///
/// If the output is within the limit, it is returned unchanged.
/// Otherwise a marker is inserted indicating how many characters were removed.
/// Cuts always land on character boundaries.
pub fn truncate_output(output: &str, max_chars: usize, mode: TruncationMode) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_string();
    }

    match mode {
        TruncationMode::HeadTail => {
            let head_size = max_chars * 40 / 100;
            let tail_size = max_chars - head_size;
            let removed = total - head_size - tail_size;
            let head = &output[..char_offset(output, head_size)];
            let tail = &output[char_offset(output, total - tail_size)..];
            format!(
                "{}\n[... {} characters removed ...]\n{}",
                head, removed, tail
            )
        }
        TruncationMode::Tail => {
            let removed = total - max_chars;
            let tail = &output[char_offset(output, removed)..];
            format!("[... {} characters removed ...]\n{}", removed, tail)
        }
    }
}
