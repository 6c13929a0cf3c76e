//! AST "X-ray" pass
//!
//! An optional, syntax-validating enrichment used for `read_file`
//! observations in the agent loop (spec.md §4.4). It is deliberately
//! separate from the coarse [`crate::parser`]: it uses real tree-sitter
//! grammars to validate that the source parses and to enumerate named
//! function/class/method/struct identifiers. Failure here — unsupported
//! extension, parse error — is non-fatal and yields an empty symbol list.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use tree_sitter::{Language, Parser};

/// A language the X-ray pass can validate and enumerate symbols for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XrayLanguage {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Rust,
    Go,
    C,
    Cpp,
    CSharp,
}

impl XrayLanguage {
    fn tree_sitter_language(self) -> Language {
        match self {
            XrayLanguage::Python => tree_sitter_python::LANGUAGE.into(),
            XrayLanguage::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            XrayLanguage::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            XrayLanguage::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            XrayLanguage::Rust => tree_sitter_rust::LANGUAGE.into(),
            XrayLanguage::Go => tree_sitter_go::LANGUAGE.into(),
            XrayLanguage::C => tree_sitter_c::LANGUAGE.into(),
            XrayLanguage::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            XrayLanguage::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
        }
    }

    /// Node kinds in this grammar that name a function/class/method/struct
    /// declaration, together worth surfacing as "symbols" for the agent.
    fn declaration_kinds(self) -> &'static [&'static str] {
        match self {
            XrayLanguage::Python => &["function_definition", "class_definition"],
            XrayLanguage::JavaScript | XrayLanguage::TypeScript | XrayLanguage::Tsx => &[
                "function_declaration",
                "class_declaration",
                "method_definition",
            ],
            XrayLanguage::Rust => &["function_item", "struct_item", "impl_item", "trait_item"],
            XrayLanguage::Go => &["function_declaration", "method_declaration", "type_declaration"],
            XrayLanguage::C | XrayLanguage::Cpp => &["function_definition", "struct_specifier", "class_specifier"],
            XrayLanguage::CSharp => &["method_declaration", "class_declaration", "struct_declaration"],
        }
    }
}

static EXTENSION_MAP: OnceLock<HashMap<&'static str, XrayLanguage>> = OnceLock::new();

fn extension_map() -> &'static HashMap<&'static str, XrayLanguage> {
    EXTENSION_MAP.get_or_init(|| {
        HashMap::from([
            ("py", XrayLanguage::Python),
            ("js", XrayLanguage::JavaScript),
            ("mjs", XrayLanguage::JavaScript),
            ("cjs", XrayLanguage::JavaScript),
            ("ts", XrayLanguage::TypeScript),
            ("tsx", XrayLanguage::Tsx),
            ("rs", XrayLanguage::Rust),
            ("go", XrayLanguage::Go),
            ("c", XrayLanguage::C),
            ("h", XrayLanguage::C),
            ("cpp", XrayLanguage::Cpp),
            ("hpp", XrayLanguage::Cpp),
            ("cc", XrayLanguage::Cpp),
            ("cxx", XrayLanguage::Cpp),
            ("cs", XrayLanguage::CSharp),
        ])
    })
}

fn language_for_path(path: &str) -> Option<XrayLanguage> {
    let ext = Path::new(path).extension()?.to_str()?.to_lowercase();
    extension_map().get(ext.as_str()).copied()
}

/// One named declaration found by the X-ray pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XraySymbol {
    pub kind: String,
    pub name: String,
    pub start_line: usize,
}

/// Validate `content` as `path`'s language and enumerate its named
/// declarations. Returns an empty vector for unsupported extensions or
/// content that fails to parse — this pass is observational only.
pub fn xray(path: &str, content: &str) -> Vec<XraySymbol> {
    let Some(lang) = language_for_path(path) else {
        return Vec::new();
    };

    let mut parser = Parser::new();
    if parser.set_language(&lang.tree_sitter_language()).is_err() {
        return Vec::new();
    }

    let Some(tree) = parser.parse(content, None) else {
        return Vec::new();
    };

    let kinds = lang.declaration_kinds();
    let mut symbols = Vec::new();
    let mut cursor = tree.walk();
    walk_for_symbols(&mut cursor, content.as_bytes(), kinds, &mut symbols);
    symbols
}

fn walk_for_symbols(
    cursor: &mut tree_sitter::TreeCursor,
    source: &[u8],
    kinds: &[&str],
    out: &mut Vec<XraySymbol>,
) {
    loop {
        let node = cursor.node();
        if kinds.contains(&node.kind()) {
            let name = node
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source).ok())
                .unwrap_or("<anonymous>")
                .to_string();
            out.push(XraySymbol {
                kind: node.kind().to_string(),
                name,
                start_line: node.start_position().row + 1,
            });
        }

        if cursor.goto_first_child() {
            walk_for_symbols(cursor, source, kinds, out);
            cursor.goto_parent();
        }
        if !cursor.goto_next_sibling() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_yields_empty_symbols() {
        assert!(xray("a.toml", "[package]\nname = \"x\"").is_empty());
    }

    #[test]
    fn python_function_is_detected() {
        let symbols = xray("a.py", "def foo():\n    pass\n");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "foo");
        assert_eq!(symbols[0].kind, "function_definition");
    }

    #[test]
    fn rust_struct_and_fn_are_detected() {
        let symbols = xray("a.rs", "struct Foo;\nfn bar() {}\n");
        let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Foo"));
        assert!(names.contains(&"bar"));
    }

    #[test]
    fn malformed_source_does_not_panic() {
        // tree-sitter is error-tolerant; this should still parse to some
        // tree (possibly with ERROR nodes) rather than panicking.
        let symbols = xray("a.py", "def (((( broken");
        let _ = symbols;
    }
}
