use serde::{Deserialize, Serialize};

/// S-expression nodes produced by the block code generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Expr {
    /// A bare symbol.
    Symbol(String),
    /// String literal (block identifiers are usually strings).
    String(String),
    /// Signed integer literal.
    Integer(i64),
    /// Boolean literal.
    Boolean(bool),
    /// Nested list.
    List(Vec<Expr>),
}

impl Expr {
    /// Head symbol of a list form, if any.
    pub fn head(&self) -> Option<&str> {
        match self {
            Expr::List(items) => match items.first() {
                Some(Expr::Symbol(sym)) => Some(sym),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Parsed script: the raw top-level forms plus the source they came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Program identifier, taken from a `(program <name> …)` form when present.
    pub name: String,
    /// Parsed top-level forms.
    pub forms: Vec<Expr>,
    /// Original source text, retained for error reporting and debugging.
    pub source: String,
}

impl Program {
    /// Construct a program with the provided name/source.
    pub fn new(name: impl Into<String>, source: impl Into<String>, forms: Vec<Expr>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            forms,
        }
    }
}
