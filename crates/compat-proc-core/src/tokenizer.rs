//! Shell-like command splitting.

/// Split a command line into argument tokens.
///
/// Spaces separate tokens, `\ ` is a literal space, and `"` or `'` open a
/// quoted span closed by the same character. A closed, non-empty quoted
/// token keeps its closing quote (`"a b"` becomes `a b"`); callers downstream
/// rely on that exact shape. A quote left open at end of input drops the
/// remainder.
pub fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut open_quote: Option<char> = None;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(quote) = open_quote {
            if c == quote {
                open_quote = None;
                if !token.is_empty() {
                    token.push(quote);
                    tokens.push(std::mem::take(&mut token));
                }
            } else {
                token.push(c);
            }
            continue;
        }

        match c {
            '"' | '\'' => open_quote = Some(c),
            '\\' if chars.peek() == Some(&' ') => {
                chars.next();
                token.push(' ');
            }
            ' ' => {
                if !token.is_empty() {
                    tokens.push(std::mem::take(&mut token));
                }
            }
            _ => token.push(c),
        }
    }

    if open_quote.is_none() && !token.is_empty() {
        tokens.push(token);
    }

    tokens
}
