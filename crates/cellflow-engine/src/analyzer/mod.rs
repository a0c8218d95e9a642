//! Dependency analysis: which variables a cell reads and which it writes.
//!
//! Everything here is a pure function of cell text. Malformed input never
//! fails hard; it contributes nothing to the read set and produces an
//! [`AnalysisError`] warning instead.
//!
//! - Script cells: free identifiers, minus keywords, built-ins and names
//!   the script binds itself. The write set is only an estimate (static
//!   `exports.NAME = ...` assignments) until the script has run.
//! - Formula cells: identifiers in the expression; `$name` is the legacy
//!   spelling of `name`.
//! - Markdown cells: identifiers inside `{{ expr | filter,args }}`
//!   placeholders, taken from the part before the pipe.

mod lexer;

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use thiserror::Error;

use crate::cell::{CellKind, WriteSet};
use lexer::{Token, lex};

pub(crate) use lexer::strip_sigils;

pub const PLACEHOLDER_OPEN: &str = "{{";
pub const PLACEHOLDER_CLOSE: &str = "}}";

/// Rhai keywords and reserved words.
pub const KEYWORDS: &[&str] = &[
    "let", "const", "if", "else", "switch", "do", "while", "loop", "until", "for", "in", "continue",
    "break", "return", "throw", "try", "catch", "fn", "private", "import", "export", "as", "global",
    "this", "true", "false", "Fn", "call", "curry", "is_shared", "is_def_var", "is_def_fn",
    "type_of", "print", "debug", "eval", "var", "static", "shared", "with", "is", "goto", "exit",
    "match", "case", "public", "protected", "new", "use", "module", "package", "super",
    "thread", "spawn", "go", "sync", "async", "await", "yield", "default", "void", "null", "nil",
];

/// Names provided by the sandbox (or reserved for host objects) that are
/// never treated as notebook variables.
pub const BUILTIN_NAMES: &[&str] = &[
    "exports", "require", "storage_get", "storage_has", "storage_keys", "storage_set", "output",
    "console", "Math", "math", "module", "global", "window", "document", "undefined", "NaN",
    "Infinity", "PI", "E", "abs", "sqrt", "floor", "ceiling", "round", "int", "fraction", "min",
    "max", "sin", "cos", "tan", "exp", "ln", "log", "pow", "len",
];

/// A non-fatal problem found while scanning cell text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Unterminated placeholder at byte {offset}")]
    UnterminatedPlaceholder { offset: usize },

    #[error("Unterminated string or comment at byte {offset}")]
    UnterminatedLiteral { offset: usize },
}

/// Result of analyzing one cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    pub reads: BTreeSet<String>,
    pub writes: WriteSet,
    pub warnings: Vec<AnalysisError>,
}

/// A `{{ ... }}` occurrence in a markdown template.
#[derive(Clone, Debug, PartialEq)]
pub struct Placeholder {
    pub expression: String,
    pub filter: Option<FilterSpec>,
}

/// `name,arg1,arg2` after the pipe of a placeholder.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSpec {
    pub name: String,
    pub args: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Placeholder(Placeholder),
}

fn variable_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("variable name regex must compile")
    })
}

/// Whether `name` can be used as a notebook variable.
pub fn is_valid_variable_name(name: &str) -> bool {
    variable_name_re().is_match(name) && !KEYWORDS.contains(&name) && !BUILTIN_NAMES.contains(&name)
}

fn is_reserved(name: &str) -> bool {
    KEYWORDS.contains(&name) || BUILTIN_NAMES.contains(&name)
}

/// Analyze a cell's content.
pub fn analyze(kind: &CellKind) -> Analysis {
    match kind {
        CellKind::Script { source } => {
            let (reads, warnings) = script_reads(source);
            Analysis {
                reads,
                writes: WriteSet::Provisional(script_export_estimate(source)),
                warnings,
            }
        }
        CellKind::Formula { expression, output } => {
            let (reads, warnings) = expression_reads(expression);
            Analysis {
                reads,
                writes: WriteSet::Confirmed(BTreeSet::from([output.clone()])),
                warnings,
            }
        }
        CellKind::Markdown { template } => {
            let (reads, warnings) = template_reads(template);
            Analysis {
                reads,
                writes: WriteSet::Confirmed(BTreeSet::new()),
                warnings,
            }
        }
        CellKind::Input { output, .. } => Analysis {
            reads: BTreeSet::new(),
            writes: WriteSet::Confirmed(BTreeSet::from([output.clone()])),
            warnings: Vec::new(),
        },
    }
}

/// Free variables of a script body.
pub fn script_reads(source: &str) -> (BTreeSet<String>, Vec<AnalysisError>) {
    let lexed = lex(source);
    let mut warnings = Vec::new();
    if let Some(offset) = lexed.unterminated {
        warnings.push(AnalysisError::UnterminatedLiteral { offset });
    }
    (free_identifiers(&lexed.tokens), warnings)
}

/// Variables referenced by a formula expression (bare or `$`-prefixed).
pub fn expression_reads(expression: &str) -> (BTreeSet<String>, Vec<AnalysisError>) {
    let lexed = lex(expression);
    if let Some(offset) = lexed.unterminated {
        return (
            BTreeSet::new(),
            vec![AnalysisError::UnterminatedLiteral { offset }],
        );
    }
    (free_identifiers(&lexed.tokens), Vec::new())
}

/// Variables referenced by the placeholders of a markdown template.
pub fn template_reads(template: &str) -> (BTreeSet<String>, Vec<AnalysisError>) {
    let (parts, mut warnings) = parse_template(template);
    let mut reads = BTreeSet::new();
    for part in parts {
        if let TemplatePart::Placeholder(p) = part {
            let (names, w) = expression_reads(&p.expression);
            reads.extend(names);
            warnings.extend(w);
        }
    }
    (reads, warnings)
}

/// Names a script assigns on its export surface, found statically.
///
/// Matches `exports.NAME = ...`, `exports["NAME"] = ...` and compound
/// assignments. Conditional or computed exports are only discovered at run time.
pub fn script_export_estimate(source: &str) -> BTreeSet<String> {
    let tokens = lex(source).tokens;
    let mut names = BTreeSet::new();

    for i in 0..tokens.len() {
        if tokens[i].ident() != Some("exports") {
            continue;
        }
        let (name, after) = match (tokens.get(i + 1), tokens.get(i + 2), tokens.get(i + 3)) {
            (Some(t), Some(Token::Ident { name, .. }), _) if t.is_punct('.') => (name.clone(), i + 3),
            (Some(t), Some(Token::Str(name)), Some(close)) if t.is_punct('[') && close.is_punct(']') => {
                (name.clone(), i + 4)
            }
            _ => continue,
        };
        if is_assignment_at(&tokens, after) {
            names.insert(name);
        }
    }

    names
}

fn is_assignment_at(tokens: &[Token], i: usize) -> bool {
    let Some(first) = tokens.get(i) else {
        return false;
    };
    let second = tokens.get(i + 1);
    if first.is_punct('=') {
        return !second.is_some_and(|t| t.is_punct('=') || t.is_punct('>'));
    }
    let compound = ['+', '-', '*', '/', '%', '&', '|', '^'];
    compound.iter().any(|op| first.is_punct(*op)) && second.is_some_and(|t| t.is_punct('='))
}

fn is_operand(token: Option<&Token>) -> bool {
    match token {
        Some(Token::Ident { name, sigil }) => *sigil || !KEYWORDS.contains(&name.as_str()),
        Some(Token::Str(_)) | Some(Token::Number) => true,
        Some(Token::Punct(c)) => matches!(c, ')' | ']' | '}'),
        None => false,
    }
}

/// Names bound inside one block, closure or loop body.
struct Scope {
    names: BTreeSet<String>,
    /// Bracket nesting depth the scope was opened at.
    depth: usize,
    /// Expression-bodied closures end at the next `,` or `;` at their depth.
    expression: bool,
}

/// Lexical bindings while walking a token stream.
///
/// `let`/`const` names bind at the end of their statement, so the
/// initializer still sees an outer variable of the same name. Parameters
/// and loop variables bind only inside the body that follows them.
struct Scopes {
    stack: Vec<Scope>,
    depth: usize,
    /// Parameters waiting for the `{` that opens their body.
    pending: BTreeSet<String>,
    /// `let` names waiting for the `;` that ends their statement.
    statements: Vec<(String, usize)>,
}

impl Scopes {
    fn new() -> Self {
        Scopes {
            stack: vec![Scope {
                names: BTreeSet::new(),
                depth: 0,
                expression: false,
            }],
            depth: 0,
            pending: BTreeSet::new(),
            statements: Vec::new(),
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.stack.iter().any(|scope| scope.names.contains(name))
    }

    fn bind_after_statement(&mut self, name: &str) {
        self.statements.push((name.to_string(), self.depth));
    }

    fn open(&mut self, brace: bool) {
        self.depth += 1;
        if brace {
            let names = std::mem::take(&mut self.pending);
            self.stack.push(Scope {
                names,
                depth: self.depth,
                expression: false,
            });
        }
    }

    fn close(&mut self) {
        while self.stack.len() > 1 && self.stack.last().is_some_and(|s| s.depth >= self.depth) {
            self.stack.pop();
        }
        let depth = self.depth;
        self.statements.retain(|(_, d)| *d < depth);
        self.depth = self.depth.saturating_sub(1);
    }

    fn closure(&mut self, params: BTreeSet<String>, block_body: bool) {
        if block_body {
            self.pending.extend(params);
        } else {
            self.stack.push(Scope {
                names: params,
                depth: self.depth,
                expression: true,
            });
        }
    }

    /// `,` or `;` at the current depth.
    fn separator(&mut self, end_of_statement: bool) {
        while self.stack.len() > 1
            && self
                .stack
                .last()
                .is_some_and(|s| s.expression && s.depth == self.depth)
        {
            self.stack.pop();
        }
        if end_of_statement {
            let depth = self.depth;
            let (done, rest): (Vec<_>, Vec<_>) =
                self.statements.drain(..).partition(|(_, d)| *d == depth);
            self.statements = rest;
            if let Some(top) = self.stack.last_mut() {
                top.names.extend(done.into_iter().map(|(name, _)| name));
            }
        }
    }
}

/// Identifiers inside `( ... )` starting at `tokens[open]`; returns them and
/// the index just past the closing paren.
fn parenthesized_names(tokens: &[Token], open: usize) -> (BTreeSet<String>, usize) {
    let mut names = BTreeSet::new();
    let mut j = open + 1;
    while j < tokens.len() && !tokens[j].is_punct(')') {
        if let Some(name) = tokens[j].ident() {
            names.insert(name.to_string());
        }
        j += 1;
    }
    (names, j + 1)
}

fn free_identifiers(tokens: &[Token]) -> BTreeSet<String> {
    let mut scopes = Scopes::new();
    let mut reads = BTreeSet::new();
    let mut i = 0usize;

    while i < tokens.len() {
        let prev = if i > 0 { tokens.get(i - 1) } else { None };

        if let Token::Punct(c) = tokens[i] {
            match c {
                // `||` is either logical or, or a closure without parameters.
                '|' if tokens.get(i + 1).is_some_and(|t| t.is_punct('|')) => {
                    if !is_operand(prev) {
                        let block = tokens.get(i + 2).is_some_and(|t| t.is_punct('{'));
                        scopes.closure(BTreeSet::new(), block);
                    }
                    i += 2;
                    continue;
                }
                // Closure parameters: `|a, b|` where the pipe cannot be an operator.
                '|' if !is_operand(prev) => {
                    let mut params = BTreeSet::new();
                    let mut j = i + 1;
                    while j < tokens.len() && !tokens[j].is_punct('|') {
                        if let Some(name) = tokens[j].ident() {
                            params.insert(name.to_string());
                        }
                        j += 1;
                    }
                    let block = tokens.get(j + 1).is_some_and(|t| t.is_punct('{'));
                    scopes.closure(params, block);
                    i = j + 1;
                    continue;
                }
                '{' => scopes.open(true),
                '(' | '[' => scopes.open(false),
                '}' | ')' | ']' => scopes.close(),
                ',' => scopes.separator(false),
                ';' => scopes.separator(true),
                _ => {}
            }
            i += 1;
            continue;
        }

        let Token::Ident { name, sigil } = &tokens[i] else {
            i += 1;
            continue;
        };

        if !sigil {
            match name.as_str() {
                "let" | "const" | "as" => {
                    if let Some(bound) = tokens.get(i + 1).and_then(Token::ident) {
                        scopes.bind_after_statement(bound);
                    }
                    i += 2;
                    continue;
                }
                "fn" => {
                    let open = i + 2;
                    if tokens.get(open).is_some_and(|t| t.is_punct('(')) {
                        let (params, after) = parenthesized_names(tokens, open);
                        scopes.pending.extend(params);
                        i = after;
                    } else {
                        i = open;
                    }
                    continue;
                }
                "for" | "catch" => {
                    let j = i + 1;
                    if tokens.get(j).is_some_and(|t| t.is_punct('(')) {
                        let (bound, after) = parenthesized_names(tokens, j);
                        scopes.pending.extend(bound);
                        i = after;
                    } else {
                        if let Some(bound) = tokens.get(j).and_then(Token::ident) {
                            scopes.pending.insert(bound.to_string());
                        }
                        i = j + 1;
                    }
                    continue;
                }
                _ => {}
            }
        }

        let next = tokens.get(i + 1);
        let after_next = tokens.get(i + 2);
        let prev_prev = if i > 1 { tokens.get(i - 2) } else { None };

        let property = prev.is_some_and(|t| t.is_punct('.'))
            && !prev_prev.is_some_and(|t| t.is_punct('.'));
        let qualified = prev.is_some_and(|t| t.is_punct(':'))
            && prev_prev.is_some_and(|t| t.is_punct(':'));
        let path_root =
            next.is_some_and(|t| t.is_punct(':')) && after_next.is_some_and(|t| t.is_punct(':'));
        let map_key = next.is_some_and(|t| t.is_punct(':')) && !path_root;
        let call = next.is_some_and(|t| t.is_punct('('));

        let skip = property
            || qualified
            || path_root
            || (!sigil && (map_key || call || is_reserved(name) || scopes.is_bound(name)));
        if !skip {
            reads.insert(name.clone());
        }
        i += 1;
    }

    reads
}

/// Split a template into literal text and placeholders.
///
/// An opening marker with no closing marker before the end of the text is
/// kept as literal text and reported as a warning.
pub fn parse_template(template: &str) -> (Vec<TemplatePart>, Vec<AnalysisError>) {
    let mut parts = Vec::new();
    let mut warnings = Vec::new();
    let mut rest = template;
    let mut consumed = 0usize;

    while let Some(open) = rest.find(PLACEHOLDER_OPEN) {
        let inner_start = open + PLACEHOLDER_OPEN.len();
        let Some(close) = rest[inner_start..].find(PLACEHOLDER_CLOSE) else {
            warnings.push(AnalysisError::UnterminatedPlaceholder {
                offset: consumed + open,
            });
            break;
        };
        if open > 0 {
            parts.push(TemplatePart::Text(rest[..open].to_string()));
        }
        let inner = &rest[inner_start..inner_start + close];
        parts.push(TemplatePart::Placeholder(parse_placeholder(inner)));

        let advance = inner_start + close + PLACEHOLDER_CLOSE.len();
        consumed += advance;
        rest = &rest[advance..];
    }

    if !rest.is_empty() {
        parts.push(TemplatePart::Text(rest.to_string()));
    }

    (parts, warnings)
}

fn parse_placeholder(inner: &str) -> Placeholder {
    match filter_pipe(inner) {
        Some(pipe) => {
            let expression = inner[..pipe].trim().to_string();
            let mut pieces = inner[pipe + 1..].split(',').map(|s| s.trim().to_string());
            let name = pieces.next().unwrap_or_default();
            let args: Vec<String> = pieces.collect();
            Placeholder {
                expression,
                filter: (!name.is_empty()).then_some(FilterSpec { name, args }),
            }
        }
        None => Placeholder {
            expression: inner.trim().to_string(),
            filter: None,
        },
    }
}

/// Byte index of the pipe separating expression from filter (not `||`,
/// not inside a string literal).
fn filter_pipe(inner: &str) -> Option<usize> {
    let bytes = inner.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' | b'`' => quote = Some(b),
            b'|' if bytes.get(i + 1) == Some(&b'|') => {
                i += 2;
                continue;
            }
            b'|' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}
