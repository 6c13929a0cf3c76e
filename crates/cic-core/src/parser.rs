//! Bracket/AST Parser (C5)
//!
//! A line-oriented, brace-depth scanner that is intentionally coarse and
//! polyglot: precise symbol resolution is out of scope, the retrieval
//! pipeline tolerates the resulting noise via scoring. See spec.md §4.4.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::node::{CodeNode, NodeType};

/// Declaration-header keywords recognized across target languages. The
/// regex captures the identifier immediately following the keyword.
static DECLARATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:class|struct|interface|function|def|async\s+def|void|int|auto|const|let|var|export)\s+(?:function\s+)?([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("static regex is valid")
});

/// `import "..."` / `import '...'` module specifiers.
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*import\s+.*?['"]([^'"]+)['"]"#).expect("static regex is valid")
});

fn keyword_to_node_type(line: &str) -> NodeType {
    let lower = line.to_lowercase();
    if lower.contains("class ") || lower.contains("struct ") || lower.contains("interface ") {
        NodeType::Class
    } else if lower.contains("function ") || lower.contains("def ") || lower.contains("void ") {
        NodeType::Function
    } else {
        NodeType::CodeBlock
    }
}

/// Extract the basename of an import specifier: `./a/b` -> `b`, `pkg/mod` ->
/// `mod`, `simple` -> `simple`.
fn import_basename(specifier: &str) -> String {
    specifier
        .rsplit('/')
        .next()
        .unwrap_or(specifier)
        .trim_end_matches(".ts")
        .trim_end_matches(".js")
        .trim_end_matches(".py")
        .to_string()
}

fn file_level_imports(text: &str) -> HashSet<String> {
    text.lines()
        .filter(|l| l.trim_start().starts_with("import "))
        .filter_map(|l| IMPORT_RE.captures(l))
        .map(|c| import_basename(&c[1]))
        .collect()
}

/// Parse `text` (the raw content of `relative_path`) into a list of
/// [`CodeNode`]s: zero or more declaration-block nodes, followed by a
/// whole-file node that always appears last.
pub fn parse_file(relative_path: &str, text: &str) -> Vec<CodeNode> {
    let imports = file_level_imports(text);
    let mut nodes = Vec::new();

    let mut buffer: Option<(String, NodeType, Vec<&str>, i64)> = None;

    for line in text.lines() {
        if let Some((name, node_type, buf, depth)) = buffer.as_mut() {
            buf.push(line);
            *depth += brace_delta(line);
            if *depth <= 0 {
                let content = buf.join("\n");
                nodes.push(CodeNode::block(
                    relative_path,
                    name.clone(),
                    content,
                    *node_type,
                    structural_weight_for(*node_type),
                    imports.clone(),
                ));
                buffer = None;
            }
            continue;
        }

        if let Some(caps) = DECLARATION_RE.captures(line) {
            let name = caps[1].to_string();
            let node_type = keyword_to_node_type(line);
            let delta = brace_delta(line);
            if delta > 0 {
                buffer = Some((name, node_type, vec![line], delta));
            } else {
                // No opening brace on the declaration line (a brace-less
                // statement like `def foo(): pass`, or a forward
                // declaration): the line itself is the whole block.
                nodes.push(CodeNode::block(
                    relative_path,
                    name,
                    line.to_string(),
                    node_type,
                    structural_weight_for(node_type),
                    imports.clone(),
                ));
            }
        }
    }

    // An unterminated block (malformed/truncated source) is dropped rather
    // than emitted half-open; the whole-file node still covers its text.

    nodes.push(CodeNode::file(relative_path, text, imports));
    nodes
}

fn structural_weight_for(node_type: NodeType) -> f64 {
    match node_type {
        NodeType::Class => 0.7,
        NodeType::Function | NodeType::Method => 0.6,
        NodeType::CodeBlock => 0.5,
        NodeType::File | NodeType::Unknown => 0.4,
    }
}

/// Net change in brace depth contributed by one line, ignoring braces that
/// appear inside string or char literals would require a real lexer; the
/// scanner accepts this as the cost of staying polyglot and dependency-free.
fn brace_delta(line: &str) -> i64 {
    let mut delta = 0i64;
    for c in line.chars() {
        match c {
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_file_node_is_always_emitted_last() {
        let nodes = parse_file("a.py", "def foo(): pass");
        assert_eq!(nodes.last().unwrap().node_type, NodeType::File);
        assert_eq!(nodes.last().unwrap().id, "a.py");
    }

    #[test]
    fn braced_block_is_extracted() {
        let src = "export function y() {\n  return 1;\n}\n";
        let nodes = parse_file("b.ts", src);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "y");
        assert!(nodes[0].content.contains("return 1"));
    }

    #[test]
    fn import_dependencies_propagate_to_every_node() {
        let src = "import x from './a';\nexport const y = 1;\n";
        let nodes = parse_file("b.ts", src);
        // `const y = 1;` has no opening brace: a single-line block node for
        // `y`, plus the trailing file node.
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "y");
        assert!(nodes.iter().all(|n| n.dependencies.contains("a")));
    }

    #[test]
    fn declaration_without_brace_yields_a_single_line_block_node() {
        let nodes = parse_file("c.rs", "void forward_decl();\n");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "forward_decl");
        assert_eq!(nodes[0].content, "void forward_decl();");
        assert_eq!(nodes[1].node_type, NodeType::File);
    }

    #[test]
    fn nested_braces_track_depth_to_close() {
        let src = "class Foo {\n  int bar() {\n    return 1;\n  }\n}\n";
        let nodes = parse_file("d.java", src);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "Foo");
        assert_eq!(nodes[0].node_type, NodeType::Class);
        assert!(nodes[0].content.contains("bar"));
    }
}
