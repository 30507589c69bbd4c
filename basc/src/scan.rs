use std::fmt;
use std::io::BufRead;

use util::VmValue;

use crate::error::{Error, Result};

/// Longest accepted source line, excluding the line terminator.
pub const MAX_LINE: usize = 127;
/// Longest accepted identifier.
pub const MAX_TOKEN: usize = 31;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Keyword {
    REM,
    DEF,
    DIM,
    AS,
    LET,
    IF,
    THEN,
    ELSE,
    END,
    FOR,
    TO,
    STEP,
    NEXT,
    DO,
    WHILE,
    UNTIL,
    LOOP,
    GOTO,
    MOD,
    AND,
    OR,
    NOT,
    STOP,
    RETURN,
    PRINT,
}

util::enum_from_str!(Keyword {
    REM, DEF, DIM, AS, LET, IF, THEN, ELSE, END, FOR, TO, STEP, NEXT, DO,
    WHILE, UNTIL, LOOP, GOTO, MOD, AND, OR, NOT, STOP, RETURN, PRINT,
});

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Token {
    Keyword(Keyword),
    // compound keywords recognized by two-word lookahead
    ElseIf,
    EndDef,
    EndIf,
    DoWhile,
    DoUntil,
    LoopWhile,
    LoopUntil,
    // multi-character operators
    Le,
    Ne,
    Ge,
    Shl,
    Shr,
    Identifier,
    Number,
    StringLit,
    Eol,
    Eof,
    /// Single-character operators and separators.
    Char(u8),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Token::Keyword(keyword) => write!(f, "{:?}", keyword),
            Token::ElseIf => f.write_str("ELSE IF"),
            Token::EndDef => f.write_str("END DEF"),
            Token::EndIf => f.write_str("END IF"),
            Token::DoWhile => f.write_str("DO WHILE"),
            Token::DoUntil => f.write_str("DO UNTIL"),
            Token::LoopWhile => f.write_str("LOOP WHILE"),
            Token::LoopUntil => f.write_str("LOOP UNTIL"),
            Token::Le => f.write_str("'<='"),
            Token::Ne => f.write_str("'<>'"),
            Token::Ge => f.write_str("'>='"),
            Token::Shl => f.write_str("'<<'"),
            Token::Shr => f.write_str("'>>'"),
            Token::Identifier => f.write_str("identifier"),
            Token::Number => f.write_str("number"),
            Token::StringLit => f.write_str("string"),
            Token::Eol => f.write_str("end of line"),
            Token::Eof => f.write_str("end of input"),
            Token::Char(ch) => write!(f, "'{}'", ch as char),
        }
    }
}

/// Pull-style tokenizer over line-at-a-time input.
///
/// The caller drives line reading with [`get_line`](Scanner::get_line);
/// tokens never span lines, except that a `/* */` comment left open
/// carries over into the following lines. One token of lookahead is
/// available through [`save_token`](Scanner::save_token), and the scanner
/// keeps a single character of pushback within the current line.
pub struct Scanner<R> {
    reader: R,
    line: Vec<u8>,
    position: usize,
    line_number: u32,
    saved_token: Option<Token>,
    token_text: String,
    value: VmValue,
    in_comment: bool,
}

impl<R: BufRead> Scanner<R> {
    pub fn new(reader: R) -> Scanner<R> {
        Scanner {
            reader,
            line: Vec::new(),
            position: 0,
            line_number: 0,
            saved_token: None,
            token_text: String::new(),
            value: 0,
            in_comment: false,
        }
    }

    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    /// Text of the most recent identifier or string token.
    pub fn token_text(&self) -> &str {
        &self.token_text
    }

    /// Value of the most recent number token.
    pub fn value(&self) -> VmValue {
        self.value
    }

    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            line: self.line_number,
            message: message.into(),
        }
    }

    /// Pulls the next source line. Returns false at end of input.
    pub fn get_line(&mut self) -> Result<bool> {
        let mut buf = String::new();
        if self.reader.read_line(&mut buf)? == 0 {
            return Ok(false);
        }
        self.line_number += 1;
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        if buf.len() > MAX_LINE {
            return Err(self.error("line too long"));
        }
        self.line = buf.into_bytes();
        self.position = 0;
        Ok(true)
    }

    pub fn save_token(&mut self, token: Token) {
        debug_assert!(self.saved_token.is_none());
        self.saved_token = Some(token);
    }

    pub fn get_token(&mut self) -> Result<Token> {
        if let Some(token) = self.saved_token.take() {
            return Ok(token);
        }

        let ch = match self.skip_spaces() {
            Some(ch) => ch,
            None => return Ok(Token::Eol),
        };

        if ch.is_ascii_alphabetic() || ch == b'_' {
            return self.scan_identifier(ch);
        }
        if ch.is_ascii_digit() {
            return self.scan_number(ch);
        }

        match ch {
            b'"' => self.scan_string(),
            b'<' => Ok(match self.get_char() {
                Some(b'=') => Token::Le,
                Some(b'>') => Token::Ne,
                Some(b'<') => Token::Shl,
                Some(_) => {
                    self.unget_char();
                    Token::Char(b'<')
                }
                None => Token::Char(b'<'),
            }),
            b'>' => Ok(match self.get_char() {
                Some(b'=') => Token::Ge,
                Some(b'>') => Token::Shr,
                Some(_) => {
                    self.unget_char();
                    Token::Char(b'>')
                }
                None => Token::Char(b'>'),
            }),
            _ => Ok(Token::Char(ch)),
        }
    }

    /// Asserts that `token` is `required`.
    pub fn require(&self, token: Token, required: Token) -> Result<()> {
        if token == required {
            Ok(())
        } else {
            Err(self.error(format!("expecting {}, found {}", required, token)))
        }
    }

    /// Fetches the next token and asserts that it is `required`.
    pub fn frequire(&mut self, required: Token) -> Result<()> {
        let token = self.get_token()?;
        self.require(token, required)
    }

    /// Consumes the rest of the current line (REM comments).
    pub fn skip_to_eol(&mut self) {
        self.position = self.line.len();
    }

    fn scan_identifier(&mut self, first: u8) -> Result<Token> {
        self.token_text.clear();
        self.token_text.push(first as char);
        while let Some(ch) = self.get_char() {
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                if self.token_text.len() >= MAX_TOKEN {
                    return Err(self.error("identifier too long"));
                }
                self.token_text.push(ch as char);
            } else {
                self.unget_char();
                break;
            }
        }

        match self.token_text.to_uppercase().parse::<Keyword>() {
            Ok(keyword) => self.compound(keyword),
            Err(_) => Ok(Token::Identifier),
        }
    }

    /// Second word of lookahead for the compound keywords. A failed
    /// lookahead rewinds to the start of the peeked token instead of
    /// using the token pushback slot, which stays free for the parser.
    fn compound(&mut self, keyword: Keyword) -> Result<Token> {
        let token = match keyword {
            Keyword::ELSE => {
                if self.match_word(Keyword::IF)? {
                    Token::ElseIf
                } else {
                    Token::Keyword(Keyword::ELSE)
                }
            }
            Keyword::END => {
                if self.match_word(Keyword::DEF)? {
                    Token::EndDef
                } else if self.match_word(Keyword::IF)? {
                    Token::EndIf
                } else {
                    Token::Keyword(Keyword::END)
                }
            }
            Keyword::DO => {
                if self.match_word(Keyword::WHILE)? {
                    Token::DoWhile
                } else if self.match_word(Keyword::UNTIL)? {
                    Token::DoUntil
                } else {
                    Token::Keyword(Keyword::DO)
                }
            }
            Keyword::LOOP => {
                if self.match_word(Keyword::WHILE)? {
                    Token::LoopWhile
                } else if self.match_word(Keyword::UNTIL)? {
                    Token::LoopUntil
                } else {
                    Token::Keyword(Keyword::LOOP)
                }
            }
            _ => Token::Keyword(keyword),
        };
        Ok(token)
    }

    fn match_word(&mut self, keyword: Keyword) -> Result<bool> {
        let token_offset = self.position;
        if self.get_token()? == Token::Keyword(keyword) {
            Ok(true)
        } else {
            self.position = token_offset;
            Ok(false)
        }
    }

    fn scan_number(&mut self, first: u8) -> Result<Token> {
        let mut value = VmValue::from(first - b'0');
        while let Some(ch) = self.get_char() {
            if ch.is_ascii_digit() {
                value = value
                    .wrapping_mul(10)
                    .wrapping_add(VmValue::from(ch - b'0'));
            } else {
                self.unget_char();
                break;
            }
        }
        self.value = value;
        Ok(Token::Number)
    }

    fn scan_string(&mut self) -> Result<Token> {
        self.token_text.clear();
        loop {
            match self.get_char() {
                None => return Err(self.error("missing closing quote")),
                Some(b'"') => break,
                Some(ch) => self.token_text.push(ch as char),
            }
        }
        Ok(Token::StringLit)
    }

    fn skip_spaces(&mut self) -> Option<u8> {
        loop {
            if self.in_comment {
                loop {
                    match self.get_char() {
                        None => return None,
                        Some(b'*') => match self.get_char() {
                            Some(b'/') => {
                                self.in_comment = false;
                                break;
                            }
                            Some(_) => self.unget_char(),
                            None => return None,
                        },
                        Some(_) => {}
                    }
                }
                continue;
            }

            match self.get_char() {
                None => return None,
                Some(b' ') | Some(b'\t') => {}
                Some(b'/') => match self.get_char() {
                    Some(b'*') => self.in_comment = true,
                    Some(_) => {
                        self.unget_char();
                        return Some(b'/');
                    }
                    None => return Some(b'/'),
                },
                Some(ch) => return Some(ch),
            }
        }
    }

    fn get_char(&mut self) -> Option<u8> {
        if self.position < self.line.len() {
            let ch = self.line[self.position];
            self.position += 1;
            Some(ch)
        } else {
            None
        }
    }

    fn unget_char(&mut self) {
        self.position -= 1;
    }
}
