//! Tokenizer for kiln config files.
//!
//! Produces a flat stream of [`Token`]s. Newlines are not significant to the
//! grammar, except that an unquoted value after `=` runs to the end of its
//! line. Inside a `{ ... }` block an unquoted value also stops at the first
//! `}`, so one-line blocks such as `if (A) { X = 1 }` work; a value that
//! itself contains `}` must be quoted there.

use std::iter::Peekable;
use std::path::PathBuf;
use std::str::CharIndices;

use crate::error::ConfigError;

/// A token with source location.
#[derive(Debug, Clone)]
pub struct Token {
    /// What was read.
    pub kind: TokenKind,
    /// Where the token starts.
    pub span: Span,
}

/// Source location for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// File the token was read from.
    pub file: PathBuf,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, in characters.
    pub col: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.col)
    }
}

/// Token variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// `[name]` group marker, brackets stripped.
    Group(String),
    /// Bare identifier: a key name, or a key reference inside a condition.
    Ident(String),
    /// Quoted string content (quotes stripped, escapes applied).
    String(String),
    /// Unquoted assignment value: the rest of the line after `=`, trimmed.
    Value(String),

    /// `if`
    If,
    /// `else`
    Else,
    /// `and` or `&&`
    And,
    /// `or` or `||`
    Or,
    /// `not` or `!`
    Not,

    /// `=`
    Assign,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Group(name) => write!(f, "[{name}]"),
            TokenKind::Ident(s) | TokenKind::Value(s) => f.write_str(s),
            TokenKind::String(s) => write!(f, "\"{s}\""),
            TokenKind::If => f.write_str("if"),
            TokenKind::Else => f.write_str("else"),
            TokenKind::And => f.write_str("and"),
            TokenKind::Or => f.write_str("or"),
            TokenKind::Not => f.write_str("not"),
            TokenKind::Assign => f.write_str("="),
            TokenKind::Less => f.write_str("<"),
            TokenKind::LessEqual => f.write_str("<="),
            TokenKind::Greater => f.write_str(">"),
            TokenKind::GreaterEqual => f.write_str(">="),
            TokenKind::Equal => f.write_str("=="),
            TokenKind::NotEqual => f.write_str("!="),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::LBrace => f.write_str("{"),
            TokenKind::RBrace => f.write_str("}"),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '+')
}

/// Character cursor that keeps the current line and column up to date.
struct Cursor<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    file: PathBuf,
    line: usize,
    col: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str, file: PathBuf) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            file,
            line: 1,
            col: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    /// Byte offset of the next character, or the end of the source.
    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.source.len(), |&(p, _)| p)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    /// Consume characters while `keep` holds.
    fn bump_while(&mut self, keep: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&keep) {
            self.bump();
        }
    }

    fn span(&self) -> Span {
        Span { file: self.file.clone(), line: self.line, col: self.col }
    }
}

/// Tokenize config source text.
#[allow(clippy::too_many_lines)]
pub fn tokenize(source: &str, file: PathBuf) -> Result<Vec<Token>, ConfigError> {
    let mut tokens = Vec::new();
    let mut cur = Cursor::new(source, file);
    // Set right after `=`: the next token is lexed as a value.
    let mut expect_value = false;
    // Open `{` blocks.
    let mut depth = 0usize;

    while let Some(ch) = cur.peek() {
        let span = cur.span();

        if expect_value && ch != ' ' && ch != '\t' && ch != '"' {
            expect_value = false;
            let start = cur.offset();
            cur.bump_while(|c| c != '\n' && !(depth > 0 && c == '}'));
            let end = cur.offset();
            tokens.push(Token {
                kind: TokenKind::Value(source[start..end].trim().to_string()),
                span,
            });
            continue;
        }

        match ch {
            ' ' | '\t' | '\r' | '\n' => {
                cur.bump();
            }

            // Comments: skip to end of line
            '#' => cur.bump_while(|c| c != '\n'),
            '/' => {
                cur.bump();
                if cur.peek() != Some('/') {
                    return Err(ConfigError::UnexpectedCharacter { span, ch });
                }
                cur.bump_while(|c| c != '\n');
            }

            '"' => {
                expect_value = false;
                cur.bump();
                let mut s = String::new();
                loop {
                    match cur.bump() {
                        Some('"') => break,
                        Some('\\') => match cur.bump() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some('\\') => s.push('\\'),
                            Some('"') => s.push('"'),
                            Some(other) => {
                                s.push('\\');
                                s.push(other);
                            }
                            None => return Err(ConfigError::UnterminatedString { span }),
                        },
                        Some('\n') | None => return Err(ConfigError::UnterminatedString { span }),
                        Some(c) => s.push(c),
                    }
                }
                tokens.push(Token { kind: TokenKind::String(s), span });
            }

            '[' => {
                cur.bump();
                let mut name = String::new();
                loop {
                    match cur.bump() {
                        Some(']') => break,
                        Some('\n') | None => return Err(ConfigError::UnterminatedGroup { span }),
                        Some(c) => name.push(c),
                    }
                }
                tokens.push(Token { kind: TokenKind::Group(name.trim().to_string()), span });
            }

            '=' => {
                cur.bump();
                let kind = if cur.peek() == Some('=') {
                    cur.bump();
                    TokenKind::Equal
                } else {
                    expect_value = true;
                    TokenKind::Assign
                };
                tokens.push(Token { kind, span });
            }
            '!' => {
                cur.bump();
                let kind = if cur.peek() == Some('=') {
                    cur.bump();
                    TokenKind::NotEqual
                } else {
                    TokenKind::Not
                };
                tokens.push(Token { kind, span });
            }
            '<' | '>' => {
                cur.bump();
                let or_equal = cur.peek() == Some('=');
                if or_equal {
                    cur.bump();
                }
                let kind = match (ch, or_equal) {
                    ('<', false) => TokenKind::Less,
                    ('<', true) => TokenKind::LessEqual,
                    (_, false) => TokenKind::Greater,
                    (_, true) => TokenKind::GreaterEqual,
                };
                tokens.push(Token { kind, span });
            }
            '&' | '|' => {
                cur.bump();
                if cur.peek() != Some(ch) {
                    return Err(ConfigError::UnexpectedCharacter { span, ch });
                }
                cur.bump();
                let kind = if ch == '&' { TokenKind::And } else { TokenKind::Or };
                tokens.push(Token { kind, span });
            }
            '(' | ')' | '{' | '}' => {
                cur.bump();
                let kind = match ch {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '{' => {
                        depth += 1;
                        TokenKind::LBrace
                    }
                    _ => {
                        depth = depth.saturating_sub(1);
                        TokenKind::RBrace
                    }
                };
                tokens.push(Token { kind, span });
            }

            // Identifiers and keywords
            c if is_ident_start(c) => {
                let start = cur.offset();
                cur.bump();
                cur.bump_while(is_ident_continue);
                let word = &source[start..cur.offset()];

                let kind = match word {
                    "if" => TokenKind::If,
                    "else" => TokenKind::Else,
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    _ => TokenKind::Ident(word.to_string()),
                };
                tokens.push(Token { kind, span });
            }

            _ => return Err(ConfigError::UnexpectedCharacter { span, ch }),
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, PathBuf::from("test"))
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenize_group_and_assignment() {
        let kinds = kinds("[Project]\nName = \"MyApp\"\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Group("Project".into()),
                TokenKind::Ident("Name".into()),
                TokenKind::Assign,
                TokenKind::String("MyApp".into()),
            ]
        );
    }

    #[test]
    fn raw_value_runs_to_end_of_line() {
        let kinds = kinds("Out = $(Workspace.Directory)/bin # not a comment\nNext = 1");
        assert_eq!(kinds[2], TokenKind::Value("$(Workspace.Directory)/bin # not a comment".into()));
        assert_eq!(kinds[3], TokenKind::Ident("Next".into()));
        assert_eq!(kinds[5], TokenKind::Value("1".into()));
    }

    #[test]
    fn tokenize_condition_operators() {
        let kinds = kinds("if (not A == \"x\" && B != C or D <= 2 || E >= 3 and !F < G > H) {}");
        assert!(kinds.contains(&TokenKind::If));
        assert!(kinds.contains(&TokenKind::Not));
        assert!(kinds.contains(&TokenKind::Equal));
        assert!(kinds.contains(&TokenKind::NotEqual));
        assert!(kinds.contains(&TokenKind::LessEqual));
        assert!(kinds.contains(&TokenKind::GreaterEqual));
        assert!(kinds.contains(&TokenKind::Less));
        assert!(kinds.contains(&TokenKind::Greater));
        assert_eq!(kinds.iter().filter(|k| **k == TokenKind::And).count(), 2);
        assert_eq!(kinds.iter().filter(|k| **k == TokenKind::Or).count(), 2);
        assert_eq!(kinds.iter().filter(|k| **k == TokenKind::Not).count(), 2);
        assert_eq!(kinds.last(), Some(&TokenKind::RBrace));
    }

    #[test]
    fn comments_are_skipped() {
        let kinds = kinds("# leading\n// another\n[A] # trailing\n");
        assert_eq!(kinds, vec![TokenKind::Group("A".into())]);
    }

    #[test]
    fn spans_are_one_based() {
        let tokens = tokenize("\n\n  [Build]", PathBuf::from("ws.kiln")).unwrap();
        assert_eq!(tokens[0].span.line, 3);
        assert_eq!(tokens[0].span.col, 3);
        assert_eq!(tokens[0].span.to_string(), "ws.kiln:3:3");
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("Name = \"oops\n", PathBuf::from("test")).unwrap_err();
        assert!(matches!(err, ConfigError::UnterminatedString { ref span } if span.line == 1));
    }

    #[test]
    fn raw_value_stops_at_closing_brace_inside_block() {
        let kinds = kinds("if (A) { X = 1 } else { X = $(B)/out }\nY = a}b\n");
        assert_eq!(kinds[7], TokenKind::Value("1".into()));
        assert_eq!(kinds[8], TokenKind::RBrace);
        assert_eq!(kinds[13], TokenKind::Value("$(B)/out".into()));
        assert_eq!(kinds[14], TokenKind::RBrace);
        // Outside any block a brace is ordinary value text.
        assert_eq!(kinds[17], TokenKind::Value("a}b".into()));
    }

    #[test]
    fn columns_count_characters_on_long_lines() {
        let line = format!("{}A = 1", " ".repeat(5000));
        let tokens = tokenize(&format!("é = 2\n{line}"), PathBuf::from("t")).unwrap();
        assert_eq!((tokens[2].span.line, tokens[2].span.col), (1, 5));
        assert_eq!((tokens[3].span.line, tokens[3].span.col), (2, 5001));
        assert_eq!(tokens[5].span.col, 5005);
    }

    #[test]
    fn single_ampersand_is_an_error() {
        let err = tokenize("if (A & B) {}", PathBuf::from("test")).unwrap_err();
        assert!(matches!(err, ConfigError::UnexpectedCharacter { ch: '&', .. }));
    }
}
