//! Indentation inference: the one rewrite every block edit shares.
//!
//! Replacement code is dedented by its common leading whitespace, then each
//! non-blank line is re-prefixed with the inferred indent. Blank lines stay
//! blank.

/// One indentation level.
pub const INDENT_UNIT: &str = "    ";

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

pub fn leading_ws(line: &str) -> &str {
    let end = line
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    &line[..end]
}

/// Longest whitespace prefix shared by every non-blank line.
fn common_prefix(code: &str) -> String {
    let mut prefix: Option<&str> = None;
    for line in code.lines().filter(|l| !is_blank(l)) {
        let ws = leading_ws(line);
        prefix = Some(match prefix {
            None => ws,
            Some(current) => {
                let shared = current
                    .char_indices()
                    .zip(ws.chars())
                    .take_while(|((_, a), b)| a == b)
                    .last()
                    .map(|((i, a), _)| i + a.len_utf8())
                    .unwrap_or(0);
                &current[..shared]
            }
        });
    }
    prefix.unwrap_or("").to_string()
}

/// Strip the common leading whitespace; blank lines become empty.
pub fn dedent(code: &str) -> Vec<String> {
    let prefix = common_prefix(code);
    code.lines()
        .map(|line| {
            if is_blank(line) {
                String::new()
            } else {
                line.strip_prefix(prefix.as_str()).unwrap_or(line).to_string()
            }
        })
        .collect()
}

/// Dedent, then prefix every non-blank line with `indent`.
pub fn reindent(code: &str, indent: &str) -> Vec<String> {
    dedent(code)
        .into_iter()
        .map(|line| {
            if line.is_empty() {
                line
            } else {
                format!("{indent}{line}")
            }
        })
        .collect()
}
