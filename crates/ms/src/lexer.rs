//! Token stream over source text.
//!
//! Tokens are produced on demand (`next`/`peek`) rather than all at once, so
//! the parser and the REPL's line-continuation check can share the same
//! scanning logic (`ends_with_line_continuation`) without re-lexing.

use std::collections::VecDeque;

use crate::error::MsError;

const KEYWORDS: &[&str] = &[
    "break", "continue", "else", "end", "for", "function", "if", "in", "isa", "new", "null", "then", "repeat",
    "return", "while", "and", "or", "not", "true", "false", "self", "super",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    CaretEq,
    Assign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Dot,
    Colon,
    Comma,
    At,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

impl Op {
    /// Compound-assignment operators reduce to their bare arithmetic opcode.
    pub fn compound_base(self) -> Option<Op> {
        Some(match self {
            Op::PlusEq => Op::Plus,
            Op::MinusEq => Op::Minus,
            Op::StarEq => Op::Star,
            Op::SlashEq => Op::Slash,
            Op::PercentEq => Op::Percent,
            Op::CaretEq => Op::Caret,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(String),
    Identifier(String),
    Number(f64),
    Str(String),
    Op(Op),
    Eol,
    Eof,
}

impl TokenKind {
    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(self, TokenKind::Keyword(k) if k == word)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    /// True if one or more spaces/tabs preceded this token — needed to
    /// disambiguate unary minus from a binary minus at statement start.
    pub preceded_by_space: bool,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    queue: VecDeque<Token>,
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic() || (c as u32) > 0x9F
}

fn is_ident_continue(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self { chars: source.chars().collect(), pos: 0, line: 1, queue: VecDeque::new() }
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += 1;
        Some(c)
    }

    /// Returns the next token without consuming it. Repeated peeks return
    /// the same token.
    pub fn peek(&mut self) -> Result<&Token, MsError> {
        if self.queue.is_empty() {
            let tok = self.scan_merged()?;
            self.queue.push_back(tok);
        }
        Ok(self.queue.front().expect("just pushed"))
    }

    /// Returns the token after the next one, without consuming either.
    pub fn peek2(&mut self) -> Result<&Token, MsError> {
        while self.queue.len() < 2 {
            let tok = self.scan_merged()?;
            self.queue.push_back(tok);
        }
        Ok(&self.queue[1])
    }

    /// Consumes and returns the next token.
    pub fn next(&mut self) -> Result<Token, MsError> {
        if let Some(tok) = self.queue.pop_front() {
            return Ok(tok);
        }
        self.scan_merged()
    }

    pub fn current_line(&self) -> u32 {
        self.line
    }

    /// Scans one token, applying the `end X` / `else if` two-token merge.
    fn scan_merged(&mut self) -> Result<Token, MsError> {
        let tok = self.scan_raw()?;
        if let TokenKind::Keyword(word) = &tok.kind {
            if word == "end" {
                let skipped = self.skip_space_tabs();
                let next = self.scan_raw()?;
                if let TokenKind::Keyword(next_word) = &next.kind {
                    return Ok(Token {
                        kind: TokenKind::Keyword(format!("end {next_word}")),
                        line: tok.line,
                        preceded_by_space: tok.preceded_by_space,
                    });
                }
                return Err(MsError::lex(format!(
                    "'end' must be followed by a keyword (line {})",
                    tok.line
                )));
            }
            if word == "else" {
                let save_pos = self.pos;
                let save_line = self.line;
                let _ = self.skip_space_tabs();
                let next = self.scan_raw()?;
                let merges = matches!(&next.kind, TokenKind::Keyword(w) if w == "if")
                    && !matches!(self.peek_char(), Some(c) if is_ident_continue(c));
                if merges {
                    return Ok(Token {
                        kind: TokenKind::Keyword("else if".to_string()),
                        line: tok.line,
                        preceded_by_space: tok.preceded_by_space,
                    });
                }
                self.pos = save_pos;
                self.line = save_line;
            }
        }
        Ok(tok)
    }

    fn skip_space_tabs(&mut self) -> bool {
        let mut any = false;
        while matches!(self.peek_char(), Some(' ') | Some('\t')) {
            self.pos += 1;
            any = true;
        }
        any
    }

    fn scan_raw(&mut self) -> Result<Token, MsError> {
        let preceded_by_space = self.skip_space_tabs();
        let line = self.line;

        let Some(c) = self.peek_char() else {
            return Ok(Token { kind: TokenKind::Eof, line, preceded_by_space });
        };

        // Line comment.
        if c == '/' && self.peek_char_at(1) == Some('/') {
            while !matches!(self.peek_char(), None | Some('\n')) {
                self.pos += 1;
            }
            return self.scan_raw();
        }

        // End of line.
        if c == '\n' {
            self.pos += 1;
            self.line += 1;
            return Ok(Token { kind: TokenKind::Eol, line, preceded_by_space });
        }
        if c == '\r' {
            self.pos += 1;
            if self.peek_char() == Some('\n') {
                self.pos += 1;
            }
            self.line += 1;
            return Ok(Token { kind: TokenKind::Eol, line, preceded_by_space });
        }
        if c == ';' {
            self.pos += 1;
            return Ok(Token { kind: TokenKind::Eol, line, preceded_by_space });
        }

        if c == '"' {
            return self.scan_string(line, preceded_by_space);
        }

        if c.is_ascii_digit() || (c == '.' && matches!(self.peek_char_at(1), Some(d) if d.is_ascii_digit())) {
            return self.scan_number(line, preceded_by_space);
        }

        if is_ident_start(c) {
            return self.scan_identifier(line, preceded_by_space);
        }

        self.scan_operator(line, preceded_by_space)
    }

    fn scan_string(&mut self, line: u32, preceded_by_space: bool) -> Result<Token, MsError> {
        self.pos += 1; // opening quote
        let mut s = String::new();
        loop {
            match self.peek_char() {
                None => return Err(MsError::lex(format!("unterminated string literal (line {line})"))),
                Some('\n') | Some('\r') => {
                    return Err(MsError::lex(format!("unterminated string literal (line {line})")));
                }
                Some('"') => {
                    self.pos += 1;
                    if self.peek_char() == Some('"') {
                        s.push('"');
                        self.pos += 1;
                        continue;
                    }
                    break;
                }
                Some(ch) => {
                    s.push(ch);
                    self.pos += 1;
                }
            }
        }
        Ok(Token { kind: TokenKind::Str(s), line, preceded_by_space })
    }

    fn scan_number(&mut self, line: u32, preceded_by_space: bool) -> Result<Token, MsError> {
        let start = self.pos;
        while matches!(self.peek_char(), Some(d) if d.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek_char() == Some('.') && matches!(self.peek_char_at(1), Some(d) if d.is_ascii_digit()) {
            self.pos += 1;
            while matches!(self.peek_char(), Some(d) if d.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek_char(), Some('+') | Some('-')) {
                self.pos += 1;
            }
            if matches!(self.peek_char(), Some(d) if d.is_ascii_digit()) {
                while matches!(self.peek_char(), Some(d) if d.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = save;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let value: f64 = text
            .parse()
            .map_err(|_| MsError::lex(format!("invalid number literal '{text}' (line {line})")))?;
        Ok(Token { kind: TokenKind::Number(value), line, preceded_by_space })
    }

    fn scan_identifier(&mut self, line: u32, preceded_by_space: bool) -> Result<Token, MsError> {
        let start = self.pos;
        while matches!(self.peek_char(), Some(c) if is_ident_continue(c)) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = if KEYWORDS.contains(&text.as_str()) {
            TokenKind::Keyword(text)
        } else {
            TokenKind::Identifier(text)
        };
        Ok(Token { kind, line, preceded_by_space })
    }

    fn scan_operator(&mut self, line: u32, preceded_by_space: bool) -> Result<Token, MsError> {
        let c = self.advance_char().expect("checked by caller");
        let op = match c {
            '+' => {
                if self.peek_char() == Some('=') {
                    self.pos += 1;
                    Op::PlusEq
                } else {
                    Op::Plus
                }
            }
            '-' => {
                if self.peek_char() == Some('=') {
                    self.pos += 1;
                    Op::MinusEq
                } else {
                    Op::Minus
                }
            }
            '*' => {
                if self.peek_char() == Some('=') {
                    self.pos += 1;
                    Op::StarEq
                } else {
                    Op::Star
                }
            }
            '/' => {
                if self.peek_char() == Some('=') {
                    self.pos += 1;
                    Op::SlashEq
                } else {
                    Op::Slash
                }
            }
            '%' => {
                if self.peek_char() == Some('=') {
                    self.pos += 1;
                    Op::PercentEq
                } else {
                    Op::Percent
                }
            }
            '^' => {
                if self.peek_char() == Some('=') {
                    self.pos += 1;
                    Op::CaretEq
                } else {
                    Op::Caret
                }
            }
            '=' => {
                if self.peek_char() == Some('=') {
                    self.pos += 1;
                    Op::Eq
                } else {
                    Op::Assign
                }
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.pos += 1;
                    Op::NotEq
                } else {
                    return Err(MsError::lex(format!("unexpected character '!' (line {line})")));
                }
            }
            '<' => {
                if self.peek_char() == Some('=') {
                    self.pos += 1;
                    Op::LtEq
                } else {
                    Op::Lt
                }
            }
            '>' => {
                if self.peek_char() == Some('=') {
                    self.pos += 1;
                    Op::GtEq
                } else {
                    Op::Gt
                }
            }
            '.' => Op::Dot,
            ':' => Op::Colon,
            ',' => Op::Comma,
            '@' => Op::At,
            '(' => Op::LParen,
            ')' => Op::RParen,
            '[' => Op::LBracket,
            ']' => Op::RBracket,
            '{' => Op::LBrace,
            '}' => Op::RBrace,
            other => return Err(MsError::lex(format!("unexpected character '{other}' (line {line})"))),
        };
        Ok(Token { kind: TokenKind::Op(op), line, preceded_by_space })
    }
}

/// True if the last significant token of `source` is an operator or opening
/// bracket (not a closing bracket, identifier, number, string, or terminal
/// keyword) — used by REPL mode to decide whether more input is needed.
pub fn ends_with_line_continuation(source: &str) -> bool {
    let mut lexer = Lexer::new(source);
    let mut last: Option<Token> = None;
    loop {
        match lexer.next() {
            Ok(tok) if tok.kind == TokenKind::Eof => break,
            Ok(tok) if tok.kind == TokenKind::Eol => continue,
            Ok(tok) => last = Some(tok),
            Err(_) => return false,
        }
    }
    let Some(tok) = last else { return false };
    match tok.kind {
        TokenKind::Op(op) => matches!(
            op,
            Op::Plus
                | Op::Minus
                | Op::Star
                | Op::Slash
                | Op::Percent
                | Op::Caret
                | Op::PlusEq
                | Op::MinusEq
                | Op::StarEq
                | Op::SlashEq
                | Op::PercentEq
                | Op::CaretEq
                | Op::Assign
                | Op::Eq
                | Op::NotEq
                | Op::Lt
                | Op::LtEq
                | Op::Gt
                | Op::GtEq
                | Op::Dot
                | Op::Colon
                | Op::Comma
                | Op::At
                | Op::LParen
                | Op::LBracket
                | Op::LBrace
        ),
        TokenKind::Keyword(ref w) => matches!(w.as_str(), "and" | "or" | "not" | "isa" | "in" | "new" | "then" | "else"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next().unwrap();
            if tok.kind == TokenKind::Eof {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn merges_end_if() {
        let k = kinds("if x then\nend if");
        assert!(k.iter().any(|t| matches!(t, TokenKind::Keyword(w) if w == "end if")));
    }

    #[test]
    fn merges_else_if() {
        let k = kinds("else if x then");
        assert!(matches!(&k[0], TokenKind::Keyword(w) if w == "else if"));
    }

    #[test]
    fn string_escape() {
        let k = kinds("\"a\"\"b\"");
        assert_eq!(k, vec![TokenKind::Str("a\"b".to_string())]);
    }

    #[test]
    fn number_forms() {
        let k = kinds("1 .5 1e-3 2.5E2");
        assert_eq!(
            k,
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(0.5),
                TokenKind::Number(1e-3),
                TokenKind::Number(2.5e2),
            ]
        );
    }

    #[test]
    fn end_without_keyword_errors() {
        let mut lexer = Lexer::new("end");
        assert!(lexer.next().is_err());
    }

    #[test]
    fn continuation_detection() {
        assert!(ends_with_line_continuation("x +"));
        assert!(ends_with_line_continuation("if x then"));
        assert!(!ends_with_line_continuation("x + 1"));
    }
}
