use super::{Expr, Program, Result, ScriptError};

/// Nesting limit for lists; generated scripts stay far below it.
const MAX_NESTING: usize = 256;

/// Parse script text into a [`Program`].
///
/// Lists are assembled on an explicit stack, so deeply nested input fails
/// with a syntax error instead of exhausting the call stack.
pub fn parse_program(source: &str) -> Result<Program> {
    let mut open: Vec<(usize, Vec<Expr>)> = Vec::new();
    let mut forms = Vec::new();

    for token in Lexer::new(source) {
        let (at, token) = token?;
        let expr = match token {
            Token::Open => {
                if open.len() >= MAX_NESTING {
                    return Err(syntax("lists nested too deeply", at));
                }
                open.push((at, Vec::new()));
                continue;
            }
            Token::Close => match open.pop() {
                Some((_, items)) => Expr::List(items),
                None => return Err(syntax("unbalanced ')'", at)),
            },
            Token::Str(text) => Expr::String(text),
            Token::Atom(text) => atom(text, at)?,
        };
        match open.last_mut() {
            Some((_, items)) => items.push(expr),
            None => forms.push(expr),
        }
    }

    if let Some((at, _)) = open.last() {
        return Err(syntax("unterminated list", *at));
    }

    let name = program_name(&forms).unwrap_or("anonymous").to_string();
    Ok(Program::new(name, source, forms))
}

/// Name from the first `(program NAME ...)` form.
fn program_name(forms: &[Expr]) -> Option<&str> {
    forms.iter().find_map(|form| match form {
        Expr::List(items) if form.head() == Some("program") => match items.get(1) {
            Some(Expr::Symbol(name) | Expr::String(name)) => Some(name.as_str()),
            _ => None,
        },
        _ => None,
    })
}

fn atom(text: &str, at: usize) -> Result<Expr> {
    match text {
        "true" => return Ok(Expr::Boolean(true)),
        "false" => return Ok(Expr::Boolean(false)),
        _ => {}
    }

    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return text
            .parse::<i64>()
            .map(Expr::Integer)
            .map_err(|_| syntax("integer literal out of range", at));
    }

    Ok(Expr::Symbol(text.to_string()))
}

fn syntax(message: &str, at: usize) -> ScriptError {
    ScriptError::Syntax(format!("{} at byte {}", message, at))
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Open,
    Close,
    Str(String),
    Atom(&'a str),
}

/// Splits source text into tokens tagged with their byte offset.
struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Skip whitespace and `;` comments.
    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();
            if !trimmed.starts_with(';') {
                return;
            }
            self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
        }
    }

    fn string(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let mut text = String::new();
        let mut chars = self.rest().char_indices().skip(1);
        while let Some((offset, ch)) = chars.next() {
            match ch {
                '"' => {
                    self.pos += offset + 1;
                    return Ok(Token::Str(text));
                }
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        break;
                    };
                    text.push(match escaped {
                        '"' => '"',
                        '\\' => '\\',
                        'n' => '\n',
                        't' => '\t',
                        other => {
                            let message = format!("unknown escape \\{}", other);
                            return Err(syntax(&message, start + offset));
                        }
                    });
                }
                other => text.push(other),
            }
        }
        Err(syntax("unterminated string literal", start))
    }

    fn atom(&mut self) -> Token<'a> {
        let rest = self.rest();
        let len = rest.find(|c: char| !is_atom_char(c)).unwrap_or(rest.len());
        self.pos += len;
        Token::Atom(&rest[..len])
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<(usize, Token<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_trivia();
        let at = self.pos;
        let token = match self.rest().chars().next()? {
            '(' => {
                self.pos += 1;
                Token::Open
            }
            ')' => {
                self.pos += 1;
                Token::Close
            }
            '"' => match self.string() {
                Ok(token) => token,
                Err(err) => {
                    // Stop after the first error.
                    self.pos = self.src.len();
                    return Some(Err(err));
                }
            },
            _ => self.atom(),
        };
        Some(Ok((at, token)))
    }
}

fn is_atom_char(ch: char) -> bool {
    !(ch.is_whitespace() || matches!(ch, '(' | ')' | '"' | ';'))
}
