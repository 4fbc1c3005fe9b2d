//! Translation of parsed directives into MiniJinja source
//!
//! The output keeps the line structure of the input: literal text is
//! wrapped in `{% raw %}` blocks verbatim, and each directive becomes one
//! tag padded with the newlines it spanned. A runtime error reported by
//! MiniJinja on line N is therefore on line N of the document.

use crate::functions::mangle;
use crate::parser::{Command, Node, NodeKind, Operand, Pipeline};

/// Translate parsed nodes into a MiniJinja template
pub fn translate(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        let padding = "\n".repeat(node.newlines);
        match &node.kind {
            NodeKind::Text(text) => push_literal(&mut out, text),
            NodeKind::Output(pipeline) => {
                out.push_str(&format!("{{{{ {}{padding} }}}}", expression(pipeline)));
            }
            NodeKind::If(pipeline) => {
                out.push_str(&format!("{{% if {}{padding} %}}", expression(pipeline)));
            }
            NodeKind::ElseIf(pipeline) => {
                out.push_str(&format!("{{% elif {}{padding} %}}", expression(pipeline)));
            }
            NodeKind::Else => out.push_str(&format!("{{% else{padding} %}}")),
            NodeKind::End => out.push_str(&format!("{{% endif{padding} %}}")),
        }
    }
    out
}

/// Emit literal text. `{%` cannot appear inside a raw block, so the text is
/// split there and the delimiter is emitted as a string expression.
fn push_literal(out: &mut String, text: &str) {
    for (i, piece) in text.split("{%").enumerate() {
        if i > 0 {
            out.push_str("{{ \"{%\" }}");
        }
        if !piece.is_empty() {
            out.push_str("{% raw %}");
            out.push_str(piece);
            out.push_str("{% endraw %}");
        }
    }
}

/// A pipeline as a nested call expression: `a x | b y` is `b(y, a(x))`
pub fn expression(pipeline: &Pipeline) -> String {
    let mut previous: Option<String> = None;
    for command in &pipeline.commands {
        previous = Some(command_expression(command, previous));
    }
    previous.unwrap_or_else(|| "none".to_string())
}

fn command_expression(command: &Command, piped: Option<String>) -> String {
    match command.operands.split_first() {
        Some((Operand::Function(name), args)) => {
            let mut rendered: Vec<String> = args.iter().map(operand).collect();
            rendered.extend(piped);
            format!("{}({})", mangle(name), rendered.join(", "))
        }
        Some((single, _)) => operand(single),
        None => "none".to_string(),
    }
}

fn operand(operand: &Operand) -> String {
    match operand {
        Operand::Function(name) => format!("{}()", mangle(name)),
        Operand::String(s) => string_literal(s),
        Operand::Number(n) => n.clone(),
        Operand::Bool(b) => b.to_string(),
        Operand::Nil | Operand::Field(_) => "none".to_string(),
        Operand::Pipeline(p) => format!("({})", expression(p)),
    }
}

/// A double-quoted MiniJinja string literal
fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
