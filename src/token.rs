//! Command-line tokenizer for the interactive prompt.
//!
//! Splits one raw input line into argument tokens. Spaces separate tokens;
//! a double quote switches the current token into quoted mode, where it is
//! terminated only by the closing quote, so arguments may contain spaces.
//! Quote characters are never part of a token's value.

enum State {
    Idle,
    InToken,
    InQuotedToken,
}

/// Tokenize one line.
///
/// Runs of separators collapse, so tokens are never empty; a line of pure
/// whitespace yields no tokens. An unterminated quote closes its token at
/// end of input, and a line terminator ends any open token.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut state = State::Idle;

    for ch in line.chars() {
        match state {
            State::Idle => match ch {
                ' ' => {}
                '\n' | '\r' => break,
                '"' => state = State::InQuotedToken,
                _ => {
                    current.push(ch);
                    state = State::InToken;
                }
            },
            State::InToken => match ch {
                ' ' => {
                    tokens.push(std::mem::take(&mut current));
                    state = State::Idle;
                }
                '\n' | '\r' => break,
                '"' => state = State::InQuotedToken,
                _ => current.push(ch),
            },
            State::InQuotedToken => match ch {
                '"' => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                    state = State::Idle;
                }
                '\n' | '\r' => break,
                _ => current.push(ch),
            },
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
