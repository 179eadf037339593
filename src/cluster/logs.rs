//! Node log inspection.

const ERROR_MARKER: &str = "ERROR";

/// Level tokens that start a new log record
const RECORD_STARTS: [&str; 5] = ["ERROR", "WARN", "INFO", "DEBUG", "TRACE"];

fn starts_record(line: &str) -> bool {
    RECORD_STARTS.iter().any(|level| line.starts_with(level))
}

/// Groups every line mentioning `ERROR` with its continuation lines (stack
/// traces, wrapped messages) up to the next log record.
pub fn error_blocks<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut in_block = false;

    for line in lines {
        let line = line.as_ref();
        if line.contains(ERROR_MARKER) {
            blocks.push(vec![line]);
            in_block = true;
        } else if in_block && !starts_record(line) {
            if let Some(block) = blocks.last_mut() {
                block.push(line);
            }
        } else {
            in_block = false;
        }
    }

    blocks.into_iter().map(|b| b.join("\n")).collect()
}
