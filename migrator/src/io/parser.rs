//! Structural analysis of legacy source files.
//!
//! Parsing is regex-based and deliberately shallow: the facts feed prompts
//! and the dependency graph, not a compiler. A [`StructuralParser`] never
//! fails; when a file resists analysis the facts come back partial with the
//! problem recorded on [`SourceFacts::error`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static PACKAGE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*package\s+([\w.]+)\s*;").expect("valid package regex")
});
static IMPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*import\s+(?:static\s+)?([\w.]+(?:\.\*)?)\s*;").expect("valid import regex")
});
static TYPE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:public\s+|protected\s+|private\s+)?(?:static\s+|final\s+|abstract\s+)*(class|interface|enum)\s+(\w+)(?:<[^>]*>)?(?:\s+extends\s+([\w.]+)(?:<[^>]*>)?)?(?:\s+implements\s+([\w.\s,<>]+?))?\s*\{",
    )
    .expect("valid type regex")
});
static METHOD_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:public|protected|private)\s+(?:static\s+|final\s+|synchronized\s+)*(?:[\w<>\[\],\s]+?)\s+(\w+)\s*\(([^)]*)\)\s*(?:throws\s+[\w.,\s]+)?\s*\{",
    )
    .expect("valid method regex")
});
static FIELD_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:public|protected|private)\s+(?:static\s+|final\s+)*([\w<>\[\],\s]+?)\s+(\w+)\s*(?:=|;)",
    )
    .expect("valid field regex")
});

/// An import statement, before graph resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDecl {
    /// Dotted path without any `.*` suffix.
    pub path: String,
    pub wildcard: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    pub supertype: Option<String>,
    pub interfaces: Vec<String>,
}

/// Everything extracted from one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFacts {
    /// Declared package, empty for the default package.
    pub package: String,
    pub imports: Vec<ImportDecl>,
    pub types: Vec<TypeDecl>,
    pub methods: Vec<MethodDecl>,
    pub fields: Vec<FieldDecl>,
    /// Set when analysis was partial; the facts above are still usable.
    pub error: Option<String>,
}

/// Abstraction over source-language analyzers.
pub trait StructuralParser {
    /// Extract facts from one source file. Never fails: a file that resists
    /// analysis yields partial facts with `error` set.
    fn parse(&self, source: &str) -> SourceFacts;
}

/// Regex-based analyzer for Java sources.
pub struct RegexJavaParser;

impl StructuralParser for RegexJavaParser {
    fn parse(&self, source: &str) -> SourceFacts {
        let package = PACKAGE_DECL
            .captures(source)
            .map_or(String::new(), |c| c[1].to_string());

        let imports = IMPORT_DECL
            .captures_iter(source)
            .map(|c| {
                let raw = &c[1];
                match raw.strip_suffix(".*") {
                    Some(prefix) => ImportDecl {
                        path: prefix.to_string(),
                        wildcard: true,
                    },
                    None => ImportDecl {
                        path: raw.to_string(),
                        wildcard: false,
                    },
                }
            })
            .collect();

        let types: Vec<TypeDecl> = TYPE_DECL
            .captures_iter(source)
            .map(|c| TypeDecl {
                kind: match &c[1] {
                    "interface" => TypeKind::Interface,
                    "enum" => TypeKind::Enum,
                    _ => TypeKind::Class,
                },
                name: c[2].to_string(),
                supertype: c.get(3).map(|m| m.as_str().to_string()),
                interfaces: c.get(4).map_or_else(Vec::new, |m| {
                    m.as_str()
                        .split(',')
                        .map(str::trim)
                        .filter(|i| !i.is_empty())
                        .map(str::to_string)
                        .collect()
                }),
            })
            .collect();

        let methods = METHOD_DECL
            .captures_iter(source)
            .map(|c| MethodDecl {
                name: c[1].to_string(),
                parameters: c[2]
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect(),
            })
            .collect();

        let fields = FIELD_DECL
            .captures_iter(source)
            .map(|c| FieldDecl {
                type_name: c[1].trim().to_string(),
                name: c[2].to_string(),
            })
            .collect();

        let error = if types.is_empty() {
            Some("no type declaration found".to_string())
        } else {
            None
        };

        SourceFacts {
            package,
            imports,
            types,
            methods,
            fields,
            error,
        }
    }
}
