//! Type Descriptors
//!
//! Field types are declared as strings in the schema syntax of the generated
//! code, e.g. `int16_t`, `chdb::mux_key_t`, `ss::string<32>`,
//! `ss::vector<chdb::mux_t, 4>`, `std::optional<int32_t>` or
//! `std::variant<int8_t, ss::vector<int16_t, 2>>`.
//!
//! A small recursive-descent parser turns such a string into a [`TypeExpr`].
//! Anything that does not parse, or a generic container we do not know about,
//! is kept as an opaque [`TypeExpr::Scalar`] carrying the original text.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::TypeTarget;

// =============================================================================
// Type Expression
// =============================================================================

/// A scalar (non-container) type name, possibly namespaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarType {
    /// Unqualified name (`mux_key_t`) or, for opaque generics, the full text
    pub name: String,
    /// Namespace path (`chdb`), `None` for unqualified names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Record or enum this name refers to, filled in by resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TypeTarget>,
}

/// Structured field type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeExpr {
    /// Built-in scalar, enum or record reference
    Scalar(ScalarType),
    /// Growable sequence with an inline capacity (0 when not given)
    Vector {
        element: Box<TypeExpr>,
        capacity: usize,
    },
    /// Optional wrapper
    Optional { element: Box<TypeExpr> },
    /// Tagged union of alternatives
    Variant { alternatives: Vec<TypeExpr> },
    /// String with an inline capacity
    FixedString { capacity: usize },
    /// Raw byte buffer with an inline capacity
    ByteBuffer { capacity: usize },
}

impl TypeExpr {
    /// Parse a type string. Never fails: unknown syntax becomes an opaque scalar.
    pub fn parse(text: &str) -> TypeExpr {
        let trimmed = text.trim();
        let mut parser = Parser::new(trimmed);
        match parser.parse_syntax() {
            Some(syntax) if parser.at_end() => syntax.into_expr(),
            _ => TypeExpr::opaque(trimmed),
        }
    }

    /// Opaque scalar holding the raw type text
    pub fn opaque(text: &str) -> TypeExpr {
        TypeExpr::Scalar(ScalarType {
            name: text.to_string(),
            namespace: None,
            target: None,
        })
    }

    /// Plain scalar constructor
    pub fn scalar(name: impl Into<String>, namespace: Option<&str>) -> TypeExpr {
        TypeExpr::Scalar(ScalarType {
            name: name.into(),
            namespace: namespace.map(str::to_string),
            target: None,
        })
    }

    pub fn as_scalar(&self) -> Option<&ScalarType> {
        match self {
            TypeExpr::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The record or enum this type directly names (not through containers)
    pub fn target(&self) -> Option<&TypeTarget> {
        self.as_scalar().and_then(|s| s.target.as_ref())
    }

    /// True if this is a by-value reference to another record
    pub fn is_record(&self) -> bool {
        self.target().map(|t| t.is_record()).unwrap_or(false)
    }

    /// Copy with every capacity set to zero.
    ///
    /// Two containers that differ only in inline capacity store the same
    /// scalar data, so they compare equal after erasure.
    pub fn erase_capacity(&self) -> TypeExpr {
        match self {
            TypeExpr::Scalar(s) => TypeExpr::Scalar(s.clone()),
            TypeExpr::Vector { element, .. } => TypeExpr::Vector {
                element: Box::new(element.erase_capacity()),
                capacity: 0,
            },
            TypeExpr::Optional { element } => TypeExpr::Optional {
                element: Box::new(element.erase_capacity()),
            },
            TypeExpr::Variant { alternatives } => TypeExpr::Variant {
                alternatives: alternatives.iter().map(TypeExpr::erase_capacity).collect(),
            },
            TypeExpr::FixedString { .. } => TypeExpr::FixedString { capacity: 0 },
            TypeExpr::ByteBuffer { .. } => TypeExpr::ByteBuffer { capacity: 0 },
        }
    }

    /// Same underlying storable scalar, ignoring capacities
    pub fn same_storage(&self, other: &TypeExpr) -> bool {
        self.erase_capacity() == other.erase_capacity()
    }

    /// Visit every scalar in the expression tree mutably
    pub(crate) fn for_each_scalar_mut(&mut self, f: &mut dyn FnMut(&mut ScalarType)) {
        match self {
            TypeExpr::Scalar(s) => f(s),
            TypeExpr::Vector { element, .. } | TypeExpr::Optional { element } => {
                element.for_each_scalar_mut(f)
            }
            TypeExpr::Variant { alternatives } => {
                for alt in alternatives {
                    alt.for_each_scalar_mut(f);
                }
            }
            TypeExpr::FixedString { .. } | TypeExpr::ByteBuffer { .. } => {}
        }
    }

    /// Visit every scalar in the expression tree
    pub fn for_each_scalar(&self, f: &mut dyn FnMut(&ScalarType)) {
        match self {
            TypeExpr::Scalar(s) => f(s),
            TypeExpr::Vector { element, .. } | TypeExpr::Optional { element } => {
                element.for_each_scalar(f)
            }
            TypeExpr::Variant { alternatives } => {
                for alt in alternatives {
                    alt.for_each_scalar(f);
                }
            }
            TypeExpr::FixedString { .. } | TypeExpr::ByteBuffer { .. } => {}
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Scalar(s) => match &s.namespace {
                Some(ns) => write!(f, "{}::{}", ns, s.name),
                None => write!(f, "{}", s.name),
            },
            TypeExpr::Vector { element, capacity } if *capacity == 0 => {
                write!(f, "ss::vector<{}>", element)
            }
            TypeExpr::Vector { element, capacity } => {
                write!(f, "ss::vector<{}, {}>", element, capacity)
            }
            TypeExpr::Optional { element } => write!(f, "std::optional<{}>", element),
            TypeExpr::Variant { alternatives } => {
                write!(f, "std::variant<")?;
                for (i, alt) in alternatives.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", alt)?;
                }
                write!(f, ">")
            }
            TypeExpr::FixedString { capacity } => write!(f, "ss::string<{}>", capacity),
            TypeExpr::ByteBuffer { capacity } => write!(f, "ss::bytebuffer<{}>", capacity),
        }
    }
}

// =============================================================================
// Parser
// =============================================================================

/// Raw parse tree before container names are interpreted
#[derive(Debug)]
enum Syntax {
    Name {
        path: Vec<String>,
        args: Option<Vec<Syntax>>,
        text: String,
    },
    Number(usize),
}

impl Syntax {
    fn into_expr(self) -> TypeExpr {
        match self {
            Syntax::Number(n) => TypeExpr::opaque(&n.to_string()),
            Syntax::Name { mut path, args, text } => {
                let name = path.pop().unwrap_or_default();
                let namespace = if path.is_empty() { None } else { Some(path.join("::")) };
                match args {
                    None => TypeExpr::Scalar(ScalarType {
                        name,
                        namespace,
                        target: None,
                    }),
                    Some(args) => {
                        let container_ns = matches!(namespace.as_deref(), None | Some("ss") | Some("std"));
                        if container_ns {
                            if let Some(expr) = interpret_container(&name, args) {
                                return expr;
                            }
                        }
                        TypeExpr::opaque(&text)
                    }
                }
            }
        }
    }
}

fn interpret_container(name: &str, args: Vec<Syntax>) -> Option<TypeExpr> {
    let mut args = args.into_iter();
    match name {
        "string" => {
            let capacity = capacity_arg(args.next())?;
            args.next().is_none().then_some(TypeExpr::FixedString { capacity })
        }
        "bytebuffer" => {
            let capacity = capacity_arg(args.next())?;
            args.next().is_none().then_some(TypeExpr::ByteBuffer { capacity })
        }
        "vector" => {
            let element = type_arg(args.next()?)?;
            let capacity = capacity_arg(args.next())?;
            args.next().is_none().then_some(TypeExpr::Vector {
                element: Box::new(element),
                capacity,
            })
        }
        "optional" => {
            let element = type_arg(args.next()?)?;
            args.next().is_none().then_some(TypeExpr::Optional {
                element: Box::new(element),
            })
        }
        "variant" => {
            let alternatives = args.map(type_arg).collect::<Option<Vec<_>>>()?;
            (!alternatives.is_empty()).then_some(TypeExpr::Variant { alternatives })
        }
        _ => None,
    }
}

fn type_arg(arg: Syntax) -> Option<TypeExpr> {
    match arg {
        Syntax::Number(_) => None,
        name => Some(name.into_expr()),
    }
}

/// Missing capacity means 0; a type where a capacity belongs is a mismatch
fn capacity_arg(arg: Option<Syntax>) -> Option<usize> {
    match arg {
        None => Some(0),
        Some(Syntax::Number(n)) => Some(n),
        Some(_) => None,
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Option<String> {
        self.skip_ws();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let ident = &self.src[start..self.pos];
        match ident.chars().next() {
            Some(c) if !c.is_ascii_digit() => Some(ident.to_string()),
            _ => {
                self.pos = start;
                None
            }
        }
    }

    fn number(&mut self) -> Option<usize> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return None;
        }
        self.src[start..self.pos].parse().ok()
    }

    fn parse_syntax(&mut self) -> Option<Syntax> {
        self.skip_ws();
        if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            return self.number().map(Syntax::Number);
        }

        let start = self.pos;
        let mut path = vec![self.ident()?];
        while self.eat("::") {
            path.push(self.ident()?);
        }

        let args = if self.eat("<") {
            let mut args = Vec::new();
            if !self.eat(">") {
                loop {
                    args.push(self.parse_syntax()?);
                    if self.eat(",") {
                        continue;
                    }
                    if self.eat(">") {
                        break;
                    }
                    return None;
                }
            }
            Some(args)
        } else {
            None
        };

        let text = self.src[start..self.pos].trim().to_string();
        Some(Syntax::Name { path, args, text })
    }
}
