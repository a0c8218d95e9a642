//! Minimal tokenizer for Rhai-flavoured cell text.
//!
//! Only what dependency analysis needs: identifiers (optionally `$`-prefixed),
//! string literals with their contents, numbers and single-character
//! punctuation. Comments are dropped. Interpolations inside backtick strings
//! are tokenized recursively so their identifiers count as reads.

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Ident { name: String, sigil: bool },
    Str(String),
    Number,
    Punct(char),
}

impl Token {
    pub fn is_punct(&self, ch: char) -> bool {
        matches!(self, Token::Punct(c) if *c == ch)
    }

    pub fn ident(&self) -> Option<&str> {
        match self {
            Token::Ident { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Lexed {
    pub tokens: Vec<Token>,
    /// Byte offset of a string or comment that never closed.
    pub unterminated: Option<usize>,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub(crate) fn lex(source: &str) -> Lexed {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut out = Lexed::default();
    let mut i = 0usize;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, ch)| *ch);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i].1 != '\n' {
                i += 1;
            }
            continue;
        }

        if c == '/' && next == Some('*') {
            i += 2;
            let mut closed = false;
            while i + 1 < chars.len() {
                if chars[i].1 == '*' && chars[i + 1].1 == '/' {
                    closed = true;
                    i += 2;
                    break;
                }
                i += 1;
            }
            if !closed {
                out.unterminated.get_or_insert(offset);
                i = chars.len();
            }
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let mut text = String::new();
            let mut escaped = false;
            let mut closed = false;
            i += 1;
            while i < chars.len() {
                let ch = chars[i].1;
                i += 1;
                if escaped {
                    text.push(ch);
                    escaped = false;
                    continue;
                }
                if ch == '\\' {
                    escaped = true;
                    continue;
                }
                if ch == quote {
                    closed = true;
                    break;
                }
                text.push(ch);
            }
            if !closed {
                out.unterminated.get_or_insert(offset);
            }
            out.tokens.push(Token::Str(text));
            continue;
        }

        if c == '`' {
            i = lex_backtick(source, &chars, i, &mut out);
            continue;
        }

        if c.is_ascii_digit() {
            i += 1;
            while i < chars.len() {
                let ch = chars[i].1;
                let after = chars.get(i + 1).map(|(_, ch)| *ch);
                if is_ident_continue(ch) {
                    i += 1;
                } else if ch == '.' && after.is_some_and(|a| a.is_ascii_digit()) {
                    i += 1;
                } else if (ch == '+' || ch == '-')
                    && matches!(chars[i - 1].1, 'e' | 'E')
                    && after.is_some_and(|a| a.is_ascii_digit())
                {
                    i += 1;
                } else {
                    break;
                }
            }
            out.tokens.push(Token::Number);
            continue;
        }

        let sigil = c == '$' && next.is_some_and(is_ident_start);
        if sigil || is_ident_start(c) {
            let start = if sigil { i + 1 } else { i };
            let mut end = start;
            while end < chars.len() && is_ident_continue(chars[end].1) {
                end += 1;
            }
            let name: String = chars[start..end].iter().map(|(_, ch)| *ch).collect();
            out.tokens.push(Token::Ident { name, sigil });
            i = end;
            continue;
        }

        out.tokens.push(Token::Punct(c));
        i += 1;
    }

    out
}

/// Lex a backtick string starting at `start`; returns the index after it.
fn lex_backtick(source: &str, chars: &[(usize, char)], start: usize, out: &mut Lexed) -> usize {
    let offset = chars[start].0;
    let mut i = start + 1;
    let mut text = String::new();

    while i < chars.len() {
        let ch = chars[i].1;
        if ch == '`' {
            out.tokens.push(Token::Str(text));
            return i + 1;
        }
        if ch == '$' && chars.get(i + 1).map(|(_, c)| *c) == Some('{') {
            let inner_start = i + 2;
            let mut depth = 1usize;
            let mut j = inner_start;
            while j < chars.len() {
                match chars[j].1 {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                j += 1;
            }
            let from = chars.get(inner_start).map(|(o, _)| *o).unwrap_or(source.len());
            let to = chars.get(j).map(|(o, _)| *o).unwrap_or(source.len());
            let inner = lex(&source[from..to]);
            out.tokens.push(Token::Punct('('));
            out.tokens.extend(inner.tokens);
            out.tokens.push(Token::Punct(')'));
            if let Some(pos) = inner.unterminated {
                out.unterminated.get_or_insert(from + pos);
            }
            i = j + 1;
            continue;
        }
        text.push(ch);
        i += 1;
    }

    out.unterminated.get_or_insert(offset);
    out.tokens.push(Token::Str(text));
    chars.len()
}

/// Drop legacy `$` sigils in front of identifiers, leaving string literals alone.
pub(crate) fn strip_sigils(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut quote: Option<char> = None;
    let mut backslashes = 0usize;

    for (i, &c) in chars.iter().enumerate() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                backslashes += 1;
                continue;
            }
            if c == q && backslashes % 2 == 0 {
                quote = None;
            }
            backslashes = 0;
            continue;
        }

        if c == '"' || c == '\'' || c == '`' {
            quote = Some(c);
            backslashes = 0;
            out.push(c);
            continue;
        }

        if c == '$' && chars.get(i + 1).is_some_and(|n| is_ident_start(*n)) {
            let prev = if i > 0 { chars.get(i - 1) } else { None };
            if !prev.is_some_and(|p| is_ident_continue(*p)) {
                continue;
            }
        }
        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idents(src: &str) -> Vec<String> {
        lex(src)
            .tokens
            .iter()
            .filter_map(|t| t.ident().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_lex_skips_strings_and_comments() {
        assert_eq!(idents(r#"a + "b c" // d"#), vec!["a"]);
        assert_eq!(idents("x /* y */ + z"), vec!["x", "z"]);
    }

    #[test]
    fn test_lex_numbers_are_not_identifiers() {
        assert_eq!(idents("1e5 + 0x1F + 2.5 + n"), vec!["n"]);
    }

    #[test]
    fn test_lex_sigil_identifier() {
        let lexed = lex("$price * qty");
        assert_eq!(
            lexed.tokens[0],
            Token::Ident {
                name: "price".to_string(),
                sigil: true
            }
        );
    }

    #[test]
    fn test_lex_backtick_interpolation() {
        assert_eq!(idents("`total: ${sum + tax}`"), vec!["sum", "tax"]);
    }

    #[test]
    fn test_lex_reports_unterminated_string() {
        let lexed = lex("a + \"open");
        assert_eq!(lexed.unterminated, Some(4));
    }

    #[test]
    fn test_strip_sigils_outside_strings() {
        assert_eq!(strip_sigils("$a + $b"), "a + b");
        assert_eq!(strip_sigils(r#"$a + "$b""#), r#"a + "$b""#);
    }
}
