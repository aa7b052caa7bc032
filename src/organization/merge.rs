//! Cross-context merge.
//!
//! Contexts fold left-to-right in precedence order into a single
//! [`MergeContext`]. Layer 0 is the combined Generic / Configuration /
//! BaseMap / DefaultMap (and explicit Merge) view; each PartialMap
//! projects as its own layer carrying only its own entries, so the
//! firmware's layer-0 fallthrough stays intact.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::organization::{Context, ContextRole, MappingAction, MappingStore, Stores};
use tracing::debug;

/// The merged view of an entire compilation.
///
/// Owns deep copies of the chosen expressions; emitter output is
/// independent of input-file retention.
#[derive(Debug, Clone, Default)]
pub struct MergeContext {
    /// Merged non-layer stores plus the layer-0 mapping store.
    pub globals: Stores,
    /// PartialMap mapping stores, in layer order (layer n+1).
    pub partial_layers: Vec<MappingStore>,
    /// Every file that contributed, in merge order.
    pub files: Vec<String>,
}

impl MergeContext {
    /// Folds contexts into a merge context.
    ///
    /// `contexts` may arrive in any order; they are sorted into
    /// precedence order first. Within one role, callers are expected to
    /// have organized all files into a single context already.
    #[must_use]
    pub fn build(mut contexts: Vec<Context>, diagnostics: &mut Diagnostics) -> Self {
        contexts.sort_by_key(|c| c.role);

        let mut merged = MergeContext::default();

        // Fold everything below the partial maps into layer 0
        for context in contexts
            .iter()
            .filter(|c| c.role < ContextRole::PartialMap(0))
        {
            debug!(role = %context.role, files = ?context.files, "merging context");
            merged.files.extend(context.files.iter().cloned());
            merged.globals.overlay(&context.stores, diagnostics);
        }

        // Project each partial map as its own layer, resolved against
        // the current layer-0 mappings
        for context in contexts
            .iter()
            .filter(|c| matches!(c.role, ContextRole::PartialMap(_)))
        {
            debug!(role = %context.role, files = ?context.files, "projecting partial layer");
            merged.files.extend(context.files.iter().cloned());

            let layer =
                project_partial_layer(&merged.globals.mappings, &context.stores, diagnostics);
            merged.partial_layers.push(layer);

            // Non-mapping stores still merge globally
            let mut without_mappings = context.stores.clone();
            without_mappings.mappings = MappingStore::new();
            merged.globals.overlay(&without_mappings, diagnostics);
        }

        // The explicit Merge role folds onto layer 0 last
        for context in contexts.iter().filter(|c| c.role == ContextRole::Merge) {
            debug!(files = ?context.files, "merging final context");
            merged.files.extend(context.files.iter().cloned());
            merged.globals.overlay(&context.stores, diagnostics);
        }

        merged.globals.mappings.resolve_pending(diagnostics);
        merged.warn_isolation_conflicts(diagnostics);
        merged
    }

    /// Layer-indexed mapping stores: index 0 is the base view, each
    /// partial map follows in declaration order.
    #[must_use]
    pub fn layers(&self) -> Vec<&MappingStore> {
        let mut layers = vec![&self.globals.mappings];
        layers.extend(self.partial_layers.iter());
        layers
    }

    /// Two partial layers both declaring an isolated mapping for one
    /// trigger is under-specified; the higher-indexed layer wins at
    /// runtime, so surface a warning naming both.
    fn warn_isolation_conflicts(&self, diagnostics: &mut Diagnostics) {
        for (first_index, first) in self.partial_layers.iter().enumerate() {
            for (second_index, second) in
                self.partial_layers.iter().enumerate().skip(first_index + 1)
            {
                for (key, entry) in first.iter_ordered() {
                    let MappingAction::Set { isolated: true, .. } = entry.action else {
                        continue;
                    };
                    let Some(other) = second.get(key) else {
                        continue;
                    };
                    if let MappingAction::Set { isolated: true, .. } = other.action {
                        diagnostics.push(
                            Diagnostic::warning(
                                DiagnosticKind::Merge,
                                format!(
                                    "trigger '{}' isolated in both layer {} and layer {}; \
                                     layer {} takes precedence",
                                    entry.trigger,
                                    first_index + 1,
                                    second_index + 1,
                                    second_index + 1
                                ),
                            )
                            .at(&other.origin.file, other.origin.line, 1),
                        );
                    }
                }
            }
        }
    }
}

/// Resolves one partial context's mappings into a standalone layer.
///
/// The layer carries only the triggers the partial map itself
/// mentions; everything else falls through to layer 0 at evaluation
/// time. `:+` / `:-` entries materialize here against the layer-0
/// result set. An attempt to override a layer-0 isolated mapping
/// without `::` is rejected: the isolated mapping is carried into the
/// layer instead and a warning names the rejected override.
fn project_partial_layer(
    base: &MappingStore,
    partial: &Stores,
    diagnostics: &mut Diagnostics,
) -> MappingStore {
    let mut layer = MappingStore::new();

    for (key, entry) in partial.mappings.iter_ordered() {
        match &entry.action {
            MappingAction::Set { isolated, .. } => {
                if !isolated {
                    if let Some(base_entry) = base.get(key) {
                        if let MappingAction::Set { isolated: true, .. } = base_entry.action {
                            diagnostics.push(
                                Diagnostic::warning(
                                    DiagnosticKind::Merge,
                                    format!(
                                        "isolated mapping for '{}' retained; override at {}:{} \
                                         rejected",
                                        entry.trigger, entry.origin.file, entry.origin.line
                                    ),
                                )
                                .at(&base_entry.origin.file, base_entry.origin.line, 1),
                            );
                            layer.insert(key.clone(), base_entry.clone());
                            continue;
                        }
                    }
                }
                layer.insert(key.clone(), entry.clone());
            }
            MappingAction::Adjust { appends, removes } => {
                // Accumulate on top of the layer-0 result set
                let mut materialized = match base.get(key) {
                    Some(base_entry) => base_entry.clone(),
                    None => entry.clone(),
                };
                if let MappingAction::Set { results, .. } = &mut materialized.action {
                    for append in appends {
                        let text = append.to_string();
                        if !results.iter().any(|s| s.to_string() == text) {
                            results.push(append.clone());
                        }
                    }
                    for remove in removes {
                        let text = remove.to_string();
                        results.retain(|s| s.to_string() != text);
                    }
                    if results.is_empty() {
                        diagnostics.push(
                            Diagnostic::warning(
                                DiagnosticKind::Merge,
                                format!(
                                    "mapping for '{}' removed; result set became empty",
                                    entry.trigger
                                ),
                            )
                            .at(&entry.origin.file, entry.origin.line, 1),
                        );
                        continue;
                    }
                }
                materialized.origin = entry.origin.clone();
                layer.insert(key.clone(), materialized);
            }
        }
    }

    layer.resolve_pending(diagnostics);
    layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn context_from(role: ContextRole, file: &str, text: &str) -> (Context, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let expressions = parse_source(file, text, &mut diagnostics);
        let mut context = Context::new(role);
        context.add_file(file, &expressions, &mut diagnostics);
        (context, diagnostics)
    }

    fn set_results(store: &MappingStore, key: &str) -> String {
        let entry = store.get(key).unwrap();
        entry.combined_results().unwrap().to_string()
    }

    #[test]
    fn test_add_to_existing_across_contexts() {
        let (base, _) = context_from(ContextRole::BaseMap, "base.kll", "U\"A\" : U\"B\";");
        let (default, _) = context_from(ContextRole::DefaultMap, "default.kll", "U\"A\" :+ U\"C\";");
        let mut diagnostics = Diagnostics::new();
        let merged = MergeContext::build(vec![base, default], &mut diagnostics);

        assert_eq!(
            set_results(&merged.globals.mappings, "U\"A\""),
            "U\"B\", U\"C\""
        );
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_default_overrides_base() {
        let (base, _) = context_from(ContextRole::BaseMap, "base.kll", "S0x10 : U\"A\";");
        let (default, _) = context_from(ContextRole::DefaultMap, "default.kll", "S0x10 : U\"B\";");
        let mut diagnostics = Diagnostics::new();
        let merged = MergeContext::build(vec![default, base], &mut diagnostics);

        assert_eq!(set_results(&merged.globals.mappings, "S0x10"), "U\"B\"");
    }

    #[test]
    fn test_partial_layer_keeps_own_entries_only() {
        let (base, _) = context_from(
            ContextRole::BaseMap,
            "base.kll",
            "S0x10 : U\"A\";\nS0x11 : U\"B\";",
        );
        let (partial, _) = context_from(ContextRole::PartialMap(0), "layer1.kll", "S0x10 : U\"Q\";");
        let mut diagnostics = Diagnostics::new();
        let merged = MergeContext::build(vec![base, partial], &mut diagnostics);

        assert_eq!(merged.partial_layers.len(), 1);
        let layer = &merged.partial_layers[0];
        assert_eq!(set_results(layer, "S0x10"), "U\"Q\"");
        // S0x11 falls through to layer 0: not copied into the layer
        assert!(layer.get("S0x11").is_none());
        // Layer 0 keeps its own mapping
        assert_eq!(set_results(&merged.globals.mappings, "S0x10"), "U\"A\"");
    }

    #[test]
    fn test_partial_append_accumulates_on_layer0() {
        let (base, _) = context_from(ContextRole::BaseMap, "base.kll", "U\"A\" : U\"B\";");
        let (partial, _) = context_from(ContextRole::PartialMap(0), "layer1.kll", "U\"A\" :+ U\"C\";");
        let mut diagnostics = Diagnostics::new();
        let merged = MergeContext::build(vec![base, partial], &mut diagnostics);

        assert_eq!(set_results(&merged.partial_layers[0], "U\"A\""), "U\"B\", U\"C\"");
        // Layer 0 untouched
        assert_eq!(set_results(&merged.globals.mappings, "U\"A\""), "U\"B\"");
    }

    #[test]
    fn test_isolation_rejects_partial_override() {
        let (base, _) = context_from(ContextRole::BaseMap, "base.kll", "U\"A\" :: U\"Z\";");
        let (partial, _) = context_from(ContextRole::PartialMap(0), "layer1.kll", "U\"A\" : U\"Q\";");
        let mut diagnostics = Diagnostics::new();
        let merged = MergeContext::build(vec![base, partial], &mut diagnostics);

        // The isolation is carried into layer 1
        assert_eq!(set_results(&merged.partial_layers[0], "U\"A\""), "U\"Z\"");
        assert_eq!(diagnostics.warning_count(), 1);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_isolation_override_with_isolate_succeeds() {
        let (base, _) = context_from(ContextRole::BaseMap, "base.kll", "U\"A\" :: U\"Z\";");
        let (partial, _) =
            context_from(ContextRole::PartialMap(0), "layer1.kll", "U\"A\" :: U\"Q\";");
        let mut diagnostics = Diagnostics::new();
        let merged = MergeContext::build(vec![base, partial], &mut diagnostics);

        assert_eq!(set_results(&merged.partial_layers[0], "U\"A\""), "U\"Q\"");
        assert_eq!(diagnostics.warning_count(), 0);
    }

    #[test]
    fn test_partial_layer_ordering() {
        let (base, _) = context_from(ContextRole::BaseMap, "base.kll", "S0x10 : U\"A\";");
        let (layer2, _) = context_from(ContextRole::PartialMap(1), "layer2.kll", "S0x10 : U\"C\";");
        let (layer1, _) = context_from(ContextRole::PartialMap(0), "layer1.kll", "S0x10 : U\"B\";");
        let mut diagnostics = Diagnostics::new();
        // Deliberately out of order: build() sorts by role
        let merged = MergeContext::build(vec![layer2, base, layer1], &mut diagnostics);

        assert_eq!(set_results(&merged.partial_layers[0], "S0x10"), "U\"B\"");
        assert_eq!(set_results(&merged.partial_layers[1], "S0x10"), "U\"C\"");
    }

    #[test]
    fn test_isolated_in_two_partials_warns() {
        let (base, _) = context_from(ContextRole::BaseMap, "base.kll", "S0x10 : U\"A\";");
        let (layer1, _) = context_from(ContextRole::PartialMap(0), "l1.kll", "U\"A\" :: U\"B\";");
        let (layer2, _) = context_from(ContextRole::PartialMap(1), "l2.kll", "U\"A\" :: U\"C\";");
        let mut diagnostics = Diagnostics::new();
        MergeContext::build(vec![base, layer1, layer2], &mut diagnostics);

        assert_eq!(diagnostics.warning_count(), 1);
        assert!(diagnostics.to_string().contains("layer 2 takes precedence"));
    }

    #[test]
    fn test_merge_role_applies_last() {
        let (base, _) = context_from(ContextRole::BaseMap, "base.kll", "S0x10 : U\"A\";");
        let (merge, _) = context_from(ContextRole::Merge, "merge.kll", "S0x10 : U\"Z\";");
        let mut diagnostics = Diagnostics::new();
        let merged = MergeContext::build(vec![merge, base], &mut diagnostics);

        assert_eq!(set_results(&merged.globals.mappings, "S0x10"), "U\"Z\"");
    }

    #[test]
    fn test_configuration_variables_merge() {
        let (config, _) = context_from(
            ContextRole::Configuration,
            "config.kll",
            "Name = \"Board\";\nUSBProtocol = 1;",
        );
        let (default, _) = context_from(ContextRole::DefaultMap, "default.kll", "USBProtocol = 2;");
        let mut diagnostics = Diagnostics::new();
        let merged = MergeContext::build(vec![config, default], &mut diagnostics);

        let entry = merged.globals.variables.get("USBProtocol").unwrap();
        assert_eq!(
            entry.value,
            crate::organization::VariableValue::Scalar("2".to_string())
        );
    }
}
