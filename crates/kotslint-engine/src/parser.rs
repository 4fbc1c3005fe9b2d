//! Parser for repl directives
//!
//! A document is literal text interleaved with directives written as
//! `repl{{ ... }}` or `{{repl ... }}`; plain `{{ ... }}` is literal. The
//! grammar is in `repl_directive.pest`. Inside a directive the syntax is that
//! of a Go template action, and error messages follow the Go parser so
//! authors see familiar text.
//!
//! Control flow is kept as open/close markers (`If`, `ElseIf`, `Else`,
//! `End`) rather than a tree; nesting is validated here so the translator can
//! emit tags one to one.

use std::fmt;

use pest::Parser;
use pest::error::{Error as PestError, InputLocation, LineColLocation};
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::suggestions::function_not_defined;

#[derive(Parser)]
#[grammar = "repl_directive.pest"]
struct DirectiveParser;

/// Go template actions the renderer does not support
const UNSUPPORTED_ACTIONS: &[&str] = &[
    "range", "with", "define", "template", "block", "break", "continue",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Function(String),
    String(String),
    Number(String),
    Bool(bool),
    Nil,
    Field(String),
    Pipeline(Pipeline),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(name) => f.write_str(name),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Number(n) => f.write_str(n),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Nil => f.write_str("nil"),
            Self::Field(name) => write!(f, ".{name}"),
            Self::Pipeline(_) => f.write_str("(...)"),
        }
    }
}

/// Operands of one command; the first is the function when there are several
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub operands: Vec<Operand>,
}

/// Commands joined by `|`
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Text(String),
    Output(Pipeline),
    If(Pipeline),
    ElseIf(Pipeline),
    Else,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// 1-based line where the node starts
    pub line: usize,
    /// Newlines the node spans
    pub newlines: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

struct OpenBlock {
    line: usize,
    has_else: bool,
}

/// Parse `input`; `functions` lists the names that may be called
pub fn parse(input: &str, functions: &[&str]) -> Result<Vec<Node>, SyntaxError> {
    let mut pairs = DirectiveParser::parse(Rule::document, input).map_err(|e| {
        let line = match e.line_col {
            LineColLocation::Pos((line, _)) | LineColLocation::Span((line, _), _) => line,
        };
        SyntaxError::new(e.variant.message().into_owned(), line)
    })?;

    let mut nodes = Vec::new();
    let mut blocks: Vec<OpenBlock> = Vec::new();
    let mut line = 1;

    let Some(document) = pairs.next() else {
        return Ok(nodes);
    };
    for pair in document.into_inner() {
        let newlines = pair.as_str().matches('\n').count();
        let kind = match pair.as_rule() {
            Rule::text => NodeKind::Text(pair.as_str().to_string()),
            Rule::directive => Directive::new(pair, line, functions).node_kind(&mut blocks)?,
            _ => continue,
        };
        nodes.push(Node {
            kind,
            line,
            newlines,
        });
        line += newlines;
    }

    if let Some(open) = blocks.last() {
        return Err(SyntaxError::new(
            format!("unexpected EOF, {{{{if}}}} opened at line {} is not closed", open.line),
            line,
        ));
    }

    Ok(nodes)
}

/// A lexeme of a directive body; offsets are relative to the body
struct Lexeme<'i> {
    rule: Rule,
    text: &'i str,
    start: usize,
    end: usize,
}

/// One directive being parsed
struct Directive<'i, 'f> {
    body: &'i str,
    lexemes: Vec<Lexeme<'i>>,
    closed: bool,
    /// Line of the opening delimiter
    line: usize,
    functions: &'f [&'f str],
}

impl<'i, 'f> Directive<'i, 'f> {
    fn new(pair: Pair<'i, Rule>, line: usize, functions: &'f [&'f str]) -> Self {
        let mut directive = Self {
            body: "",
            lexemes: Vec::new(),
            closed: true,
            line,
            functions,
        };

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::body => {
                    directive.body = inner.as_str();
                    let body_start = inner.as_span().start();
                    directive.lexemes = inner
                        .into_inner()
                        .map(|lexeme| Lexeme {
                            rule: lexeme.as_rule(),
                            text: lexeme.as_str(),
                            start: lexeme.as_span().start() - body_start,
                            end: lexeme.as_span().end() - body_start,
                        })
                        .collect();
                }
                Rule::unclosed => directive.closed = false,
                _ => {}
            }
        }
        directive
    }

    /// Line of a body offset
    fn line_at(&self, offset: usize) -> usize {
        let offset = offset.min(self.body.len());
        self.line + self.body[..offset].matches('\n').count()
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> SyntaxError {
        SyntaxError::new(message, self.line_at(offset))
    }

    fn node_kind(&self, blocks: &mut Vec<OpenBlock>) -> Result<NodeKind, SyntaxError> {
        self.check_lexemes()?;

        let clause = DirectiveParser::parse(Rule::action, self.body)
            .map_err(|e| self.structure_error(&e))?
            .next()
            .and_then(|action| action.into_inner().next());
        let Some(clause) = clause else {
            return Err(self.error("missing value for command", 0));
        };
        let start = clause.as_span().start();

        match clause.as_rule() {
            Rule::if_clause => {
                let pipeline = self.clause_pipeline(clause)?;
                blocks.push(OpenBlock {
                    line: self.line_at(start),
                    has_else: false,
                });
                Ok(NodeKind::If(pipeline))
            }
            Rule::else_clause | Rule::else_if_clause => {
                let Some(open) = blocks.last_mut() else {
                    return Err(self.error("unexpected {{else}}", start));
                };
                if open.has_else {
                    return Err(self.error("expected end; found {{else}}", start));
                }
                if clause.as_rule() == Rule::else_clause {
                    open.has_else = true;
                    Ok(NodeKind::Else)
                } else {
                    Ok(NodeKind::ElseIf(self.clause_pipeline(clause)?))
                }
            }
            Rule::end_clause => {
                if blocks.pop().is_none() {
                    return Err(self.error("unexpected {{end}}", start));
                }
                Ok(NodeKind::End)
            }
            Rule::pipeline => Ok(NodeKind::Output(self.pipeline(clause)?)),
            _ => Err(self.error("missing value for command", start)),
        }
    }

    /// Lexical errors, reported before any structural error
    fn check_lexemes(&self) -> Result<(), SyntaxError> {
        for lexeme in &self.lexemes {
            match lexeme.rule {
                Rule::unterminated_string => {
                    return Err(self.error("unterminated quoted string", lexeme.start));
                }
                Rule::unterminated_raw_string => {
                    return Err(self.error("unterminated raw quoted string", lexeme.end));
                }
                Rule::bad_char => {
                    let c = lexeme.text.chars().next().unwrap_or_default();
                    return Err(self.error(
                        format!("unrecognized character in action: U+{:04X} '{c}'", c as u32),
                        lexeme.start,
                    ));
                }
                Rule::number if number_literal(lexeme.text).is_none() => {
                    return Err(self.error(
                        format!("bad number syntax: \"{}\"", lexeme.text),
                        lexeme.start,
                    ));
                }
                Rule::string if unquote(lexeme.text).is_none() => {
                    return Err(self.error("invalid syntax", lexeme.start));
                }
                Rule::word if UNSUPPORTED_ACTIONS.contains(&lexeme.text) => {
                    return Err(self.error(
                        format!("unsupported action \"{}\"", lexeme.text),
                        lexeme.start,
                    ));
                }
                _ => {}
            }
        }

        if !self.closed {
            return Err(self.error("unclosed action", self.body.len()));
        }
        Ok(())
    }

    /// Go parser message for a body that does not match the action grammar
    fn structure_error(&self, e: &PestError<Rule>) -> SyntaxError {
        let offset = match e.location {
            InputLocation::Pos(pos) => pos,
            InputLocation::Span((start, _)) => start,
        };
        let depth: i32 = self
            .lexemes
            .iter()
            .take_while(|l| l.end <= offset)
            .map(|l| match l.rule {
                Rule::lparen => 1,
                Rule::rparen => -1,
                _ => 0,
            })
            .sum();
        let next = self.lexemes.iter().position(|l| l.end > offset);
        let first = self.lexemes.first().map(|l| l.text);

        let Some(index) = next else {
            let message = if depth > 0 {
                "unclosed left paren"
            } else if first == Some("if") && self.lexemes.len() == 1 {
                "missing value for if"
            } else {
                "missing value for command"
            };
            return self.error(message, self.body.len());
        };

        let lexeme = &self.lexemes[index];
        let message = match lexeme.rule {
            Rule::rparen if depth <= 0 => "unexpected \")\" in command".to_string(),
            Rule::rparen | Rule::pipe => "missing value for command".to_string(),
            _ => {
                let context = match (index, first) {
                    (1, Some("else")) => "else",
                    (1, Some("end")) => "end",
                    _ => "command",
                };
                format!("unexpected {} in {context}", describe(lexeme))
            }
        };
        self.error(message, lexeme.start)
    }

    fn clause_pipeline(&self, clause: Pair<'_, Rule>) -> Result<Pipeline, SyntaxError> {
        let start = clause.as_span().start();
        match clause.into_inner().find(|p| p.as_rule() == Rule::pipeline) {
            Some(pipeline) => self.pipeline(pipeline),
            None => Err(self.error("missing value for command", start)),
        }
    }

    fn pipeline(&self, pair: Pair<'_, Rule>) -> Result<Pipeline, SyntaxError> {
        let mut commands: Vec<Command> = Vec::new();

        for pair in pair.into_inner().filter(|p| p.as_rule() == Rule::command) {
            let start = pair.as_span().start();
            let command = self.command(pair)?;
            match command.operands.first() {
                Some(first) if !commands.is_empty() && !matches!(first, Operand::Function(_)) => {
                    return Err(self.error(
                        format!("can't give argument to non-function {first}"),
                        start,
                    ));
                }
                _ => {}
            }
            commands.push(command);
        }

        Ok(Pipeline { commands })
    }

    fn command(&self, pair: Pair<'_, Rule>) -> Result<Command, SyntaxError> {
        let start = pair.as_span().start();
        let operands = pair
            .into_inner()
            .filter(|p| !matches!(p.as_rule(), Rule::lparen | Rule::rparen))
            .map(|p| self.operand(p))
            .collect::<Result<Vec<_>, _>>()?;

        match operands.first() {
            None => Err(self.error("missing value for command", start)),
            Some(Operand::Nil) => Err(self.error("nil is not a command", start)),
            Some(Operand::Function(_)) => Ok(Command { operands }),
            Some(first) if operands.len() > 1 => Err(self.error(
                format!("can't give argument to non-function {first}"),
                start,
            )),
            Some(_) => Ok(Command { operands }),
        }
    }

    fn operand(&self, pair: Pair<'_, Rule>) -> Result<Operand, SyntaxError> {
        let start = pair.as_span().start();
        let text = pair.as_str();

        let operand = match pair.as_rule() {
            Rule::identifier => {
                if !self.functions.contains(&text) {
                    return Err(self.error(function_not_defined(text, self.functions), start));
                }
                Operand::Function(text.to_string())
            }
            Rule::string => Operand::String(
                unquote(text).ok_or_else(|| self.error("invalid syntax", start))?,
            ),
            Rule::raw_string => Operand::String(text.trim_matches('`').to_string()),
            Rule::number => Operand::Number(number_literal(text).ok_or_else(|| {
                self.error(format!("bad number syntax: \"{text}\""), start)
            })?),
            Rule::boolean => Operand::Bool(text == "true"),
            Rule::nil => Operand::Nil,
            Rule::field => Operand::Field(text.trim_start_matches('.').to_string()),
            Rule::parenthesized => {
                match pair.into_inner().find(|p| p.as_rule() == Rule::pipeline) {
                    Some(pipeline) => Operand::Pipeline(self.pipeline(pipeline)?),
                    None => return Err(self.error("missing value for command", start)),
                }
            }
            _ => return Err(self.error(format!("unexpected {text:?} in command"), start)),
        };
        Ok(operand)
    }
}

fn describe(lexeme: &Lexeme<'_>) -> String {
    match (lexeme.rule, lexeme.text) {
        (Rule::word, keyword @ ("if" | "else" | "end")) => format!("<{keyword}>"),
        (_, text) => format!("{text:?}"),
    }
}

/// Number literal as a MiniJinja literal, if it is one
fn number_literal(text: &str) -> Option<String> {
    let digits = text.trim_start_matches('+').replace('_', "");
    if digits.parse::<i64>().is_err() && digits.parse::<f64>().is_err() {
        return None;
    }
    let digits = match digits.strip_prefix("-.") {
        Some(rest) => format!("-0.{rest}"),
        None => match digits.strip_prefix('.') {
            Some(rest) => format!("0.{rest}"),
            None => digits,
        },
    };
    Some(digits)
}

/// Value of a double-quoted string literal with Go escapes
fn unquote(text: &str) -> Option<String> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = chars.next()?;
        let value = match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\u{07}',
            'b' => '\u{08}',
            'f' => '\u{0c}',
            'v' => '\u{0b}',
            '\\' | '"' | '\'' => escaped,
            'x' | 'u' | 'U' => {
                let width = match escaped {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = chars.by_ref().take(width).collect();
                if hex.chars().count() != width || !hex.chars().all(|h| h.is_ascii_hexdigit()) {
                    return None;
                }
                u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)?
            }
            _ => return None,
        };
        out.push(value);
    }
    Some(out)
}
