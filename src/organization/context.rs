//! Contexts: groups of files sharing a semantic role.

use crate::diagnostics::Diagnostics;
use crate::models::Expression;
use crate::organization::Stores;
use serde::Serialize;
use std::fmt;

/// Semantic role of a context, in merge precedence order (low to
/// high): Generic < Configuration < BaseMap < DefaultMap <
/// PartialMap(n) (ordered by n) < Merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextRole {
    Generic,
    Configuration,
    BaseMap,
    DefaultMap,
    PartialMap(usize),
    Merge,
}

impl fmt::Display for ContextRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextRole::Generic => write!(f, "Generic"),
            ContextRole::Configuration => write!(f, "Configuration"),
            ContextRole::BaseMap => write!(f, "BaseMap"),
            ContextRole::DefaultMap => write!(f, "DefaultMap"),
            ContextRole::PartialMap(layer) => write!(f, "PartialMap {layer}"),
            ContextRole::Merge => write!(f, "Merge"),
        }
    }
}

/// All files and organized expressions belonging to one role.
///
/// Files are added in load order; within the role, later files
/// override earlier ones through the store override rules.
#[derive(Debug, Clone)]
pub struct Context {
    pub role: ContextRole,
    pub files: Vec<String>,
    pub stores: Stores,
}

impl Context {
    /// Creates an empty context for a role.
    #[must_use]
    pub fn new(role: ContextRole) -> Self {
        Self {
            role,
            files: Vec::new(),
            stores: Stores::new(),
        }
    }

    /// Organizes one file's expressions into this context's stores.
    pub fn add_file(
        &mut self,
        path: impl Into<String>,
        expressions: &[Expression],
        diagnostics: &mut Diagnostics,
    ) {
        self.files.push(path.into());
        for expression in expressions {
            self.stores.add_expression(expression, diagnostics);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    #[test]
    fn test_role_precedence_order() {
        assert!(ContextRole::Generic < ContextRole::Configuration);
        assert!(ContextRole::Configuration < ContextRole::BaseMap);
        assert!(ContextRole::BaseMap < ContextRole::DefaultMap);
        assert!(ContextRole::DefaultMap < ContextRole::PartialMap(0));
        assert!(ContextRole::PartialMap(0) < ContextRole::PartialMap(1));
        assert!(ContextRole::PartialMap(9) < ContextRole::Merge);
    }

    #[test]
    fn test_later_file_overrides_earlier() {
        let mut diagnostics = Diagnostics::new();
        let mut context = Context::new(ContextRole::BaseMap);

        let first = parse_source("a.kll", "S0x10 : U\"A\";", &mut diagnostics);
        let second = parse_source("b.kll", "S0x10 : U\"B\";", &mut diagnostics);
        context.add_file("a.kll", &first, &mut diagnostics);
        context.add_file("b.kll", &second, &mut diagnostics);

        let entry = context.stores.mappings.get("S0x10").unwrap();
        let crate::organization::MappingAction::Set { results, .. } = &entry.action else {
            panic!()
        };
        assert_eq!(results[0].to_string(), "U\"B\"");
        // Cross-file override inside one context is silent
        assert_eq!(diagnostics.warning_count(), 0);
    }
}
