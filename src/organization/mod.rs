//! Per-context expression organization.
//!
//! Each context owns a set of typed stores into which its expressions
//! are classified and deduplicated under role-local override rules:
//! last writer wins for plain assignment, `:+` unions, `:-` removes,
//! `::` isolates. Cross-context combination lives in [`merge`].

pub mod context;
pub mod merge;

pub use context::{Context, ContextRole};
pub use merge::MergeContext;

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::models::expression::{
    AssignmentExpr, MappingExpr, OpKind, Origin, PixelModExpr, Sequence,
};
use crate::models::id::{AnimationModifier, PixelChannel};
use crate::models::position::PhysicalPosition;
use crate::models::{Expression, ExpressionKind};
use std::collections::BTreeMap;

/// Value of a variable store entry.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Scalar(String),
    /// Sparse array; unassigned slots stay `None`
    Array(Vec<Option<String>>),
}

/// A stored variable with its last assignment site.
#[derive(Debug, Clone)]
pub struct VariableEntry {
    pub value: VariableValue,
    pub origin: Origin,
}

/// A stored capability declaration.
#[derive(Debug, Clone)]
pub struct CapabilityEntry {
    pub decl: crate::models::expression::CapabilityExpr,
    pub origin: Origin,
}

/// A stored name → C identifier association.
#[derive(Debug, Clone)]
pub struct DefineEntry {
    pub def: crate::models::expression::DefineExpr,
    pub origin: Origin,
}

/// A stored pixel channel composition.
#[derive(Debug, Clone)]
pub struct PixelChannelsEntry {
    pub index: u32,
    pub channels: Vec<PixelChannel>,
    pub scancode: Option<u16>,
    pub origin: Origin,
}

/// A stored physical position, merged axis by axis.
#[derive(Debug, Clone)]
pub struct PositionEntry {
    pub position: PhysicalPosition,
    pub origin: Origin,
}

/// Accumulated animation state: settings merged by modifier name plus
/// the frame table.
#[derive(Debug, Clone, Default)]
pub struct AnimationState {
    pub settings: Vec<AnimationModifier>,
    pub frames: BTreeMap<u32, Vec<PixelModExpr>>,
}

impl AnimationState {
    /// Overlays settings: a modifier replaces the previous modifier of
    /// the same name, new names append.
    pub fn merge_settings(&mut self, modifiers: &[AnimationModifier]) {
        for modifier in modifiers {
            match self.settings.iter_mut().find(|m| m.name == modifier.name) {
                Some(existing) => *existing = modifier.clone(),
                None => self.settings.push(modifier.clone()),
            }
        }
    }

    /// True when the settings mark this animation append-mode, which
    /// makes cross-context frame merges extend instead of replace.
    #[must_use]
    pub fn append_mode(&self) -> bool {
        self.settings.iter().any(|m| m.name == "append")
    }
}

/// What a mapping entry currently means for its trigger key.
#[derive(Debug, Clone)]
pub enum MappingAction {
    /// A concrete mapping: the trigger fires these result sequences
    Set {
        results: Vec<Sequence>,
        isolated: bool,
    },
    /// Pending adjustment carried until a lower-precedence mapping
    /// exists to apply it to (cross-context `:+` / `:-`)
    Adjust {
        appends: Vec<Sequence>,
        removes: Vec<Sequence>,
    },
}

/// A mapping store entry.
#[derive(Debug, Clone)]
pub struct MappingEntry {
    pub trigger: Sequence,
    pub indicator: bool,
    pub action: MappingAction,
    pub origin: Origin,
    /// First-appearance counter for deterministic traversal
    pub order: u64,
}

impl MappingEntry {
    /// Concatenates the result sequences into the single emitted
    /// sequence (appended results become further combos in order).
    #[must_use]
    pub fn combined_results(&self) -> Option<Sequence> {
        match &self.action {
            MappingAction::Set { results, .. } => {
                let mut combined = Sequence::default();
                for sequence in results {
                    combined.combos.extend(sequence.combos.iter().cloned());
                }
                Some(combined)
            }
            MappingAction::Adjust { .. } => None,
        }
    }
}

fn sequence_in(list: &[Sequence], candidate: &Sequence) -> bool {
    let text = candidate.to_string();
    list.iter().any(|s| s.to_string() == text)
}

/// Trigger-keyed mapping store.
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    entries: BTreeMap<String, MappingEntry>,
    next_order: u64,
}

impl MappingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MappingEntry> {
        self.entries.get(key)
    }

    /// Entries in canonical key order.
    pub fn iter_by_key(&self) -> impl Iterator<Item = (&String, &MappingEntry)> {
        self.entries.iter()
    }

    /// Entries in first-appearance order.
    #[must_use]
    pub fn iter_ordered(&self) -> Vec<(&String, &MappingEntry)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.order);
        entries
    }

    fn insert(&mut self, key: String, mut entry: MappingEntry) {
        // A replaced key keeps its first-appearance position
        if let Some(existing) = self.entries.get(&key) {
            entry.order = existing.order;
        } else {
            entry.order = self.next_order;
            self.next_order += 1;
        }
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Applies one mapping expression under intra-context rules.
    pub fn apply(&mut self, mapping: &MappingExpr, origin: &Origin, diagnostics: &mut Diagnostics) {
        let key = mapping.trigger_key();

        match mapping.operator.kind {
            OpKind::Assign | OpKind::Replace | OpKind::Isolate => {
                let isolated = mapping.operator.kind == OpKind::Isolate;

                // Shadowing an earlier assignment from the same file is
                // legal but worth a warning
                if let Some(previous) = self.entries.get(&key) {
                    if !isolated
                        && matches!(previous.action, MappingAction::Set { .. })
                        && previous.origin.file == origin.file
                    {
                        diagnostics.push(
                            Diagnostic::warning(
                                DiagnosticKind::Semantic,
                                format!(
                                    "mapping for '{}' shadows earlier assignment at line {}",
                                    mapping.trigger, previous.origin.line
                                ),
                            )
                            .at(&origin.file, origin.line, 1),
                        );
                    }
                }

                self.insert(
                    key,
                    MappingEntry {
                        trigger: mapping.trigger.clone(),
                        indicator: mapping.operator.indicator,
                        action: MappingAction::Set {
                            results: vec![mapping.result.clone()],
                            isolated,
                        },
                        origin: origin.clone(),
                        order: 0,
                    },
                );
            }
            OpKind::Append => match self.entries.get_mut(&key).map(|e| &mut e.action) {
                Some(MappingAction::Set { results, .. }) => {
                    if !sequence_in(results, &mapping.result) {
                        results.push(mapping.result.clone());
                    }
                }
                Some(MappingAction::Adjust { appends, .. }) => {
                    if !sequence_in(appends, &mapping.result) {
                        appends.push(mapping.result.clone());
                    }
                }
                None => {
                    self.insert(
                        key,
                        MappingEntry {
                            trigger: mapping.trigger.clone(),
                            indicator: mapping.operator.indicator,
                            action: MappingAction::Adjust {
                                appends: vec![mapping.result.clone()],
                                removes: Vec::new(),
                            },
                            origin: origin.clone(),
                            order: 0,
                        },
                    );
                }
            },
            OpKind::Remove => match self.entries.get_mut(&key).map(|e| &mut e.action) {
                Some(MappingAction::Set { results, .. }) => {
                    let text = mapping.result.to_string();
                    results.retain(|s| s.to_string() != text);
                    if results.is_empty() {
                        self.remove(&key);
                        diagnostics.push(
                            Diagnostic::warning(
                                DiagnosticKind::Semantic,
                                format!(
                                    "mapping for '{}' removed; result set became empty",
                                    mapping.trigger
                                ),
                            )
                            .at(&origin.file, origin.line, 1),
                        );
                    }
                }
                Some(MappingAction::Adjust { appends, removes }) => {
                    let text = mapping.result.to_string();
                    appends.retain(|s| s.to_string() != text);
                    if !sequence_in(removes, &mapping.result) {
                        removes.push(mapping.result.clone());
                    }
                }
                None => {
                    self.insert(
                        key,
                        MappingEntry {
                            trigger: mapping.trigger.clone(),
                            indicator: mapping.operator.indicator,
                            action: MappingAction::Adjust {
                                appends: Vec::new(),
                                removes: vec![mapping.result.clone()],
                            },
                            origin: origin.clone(),
                            order: 0,
                        },
                    );
                }
            },
        }
    }

    /// Overlays a higher-precedence store onto this one (§4.4 rules).
    pub fn overlay(&mut self, incoming: &MappingStore, diagnostics: &mut Diagnostics) {
        for (key, entry) in incoming.iter_ordered() {
            match &entry.action {
                MappingAction::Set { isolated, .. } => {
                    if let Some(existing) = self.entries.get(key) {
                        if let MappingAction::Set {
                            isolated: existing_isolated,
                            ..
                        } = existing.action
                        {
                            if existing_isolated && !*isolated {
                                diagnostics.push(
                                    Diagnostic::warning(
                                        DiagnosticKind::Merge,
                                        format!(
                                            "isolated mapping for '{}' retained; override at \
                                             {}:{} rejected",
                                            entry.trigger, entry.origin.file, entry.origin.line
                                        ),
                                    )
                                    .at(&existing.origin.file, existing.origin.line, 1),
                                );
                                continue;
                            }
                        }
                    }
                    self.insert(key.clone(), entry.clone());
                }
                MappingAction::Adjust { appends, removes } => {
                    self.adjust(key, &entry.trigger, entry, appends, removes, diagnostics);
                }
            }
        }
    }

    /// Applies pending `:+` / `:-` adjustments to the current entry for
    /// `key`, creating or extending a pending entry when none exists.
    fn adjust(
        &mut self,
        key: &str,
        trigger: &Sequence,
        incoming: &MappingEntry,
        appends: &[Sequence],
        removes: &[Sequence],
        diagnostics: &mut Diagnostics,
    ) {
        match self.entries.get_mut(key).map(|e| &mut e.action) {
            Some(MappingAction::Set { results, .. }) => {
                for append in appends {
                    if !sequence_in(results, append) {
                        results.push(append.clone());
                    }
                }
                for remove in removes {
                    let text = remove.to_string();
                    results.retain(|s| s.to_string() != text);
                }
                if let Some(MappingAction::Set { results, .. }) =
                    self.entries.get(key).map(|e| &e.action)
                {
                    if results.is_empty() {
                        self.remove(key);
                        diagnostics.push(
                            Diagnostic::warning(
                                DiagnosticKind::Merge,
                                format!("mapping for '{trigger}' removed; result set became empty"),
                            )
                            .at(&incoming.origin.file, incoming.origin.line, 1),
                        );
                    }
                }
            }
            Some(MappingAction::Adjust {
                appends: pending_appends,
                removes: pending_removes,
            }) => {
                for append in appends {
                    if !sequence_in(pending_appends, append) {
                        pending_appends.push(append.clone());
                    }
                }
                for remove in removes {
                    if !sequence_in(pending_removes, remove) {
                        pending_removes.push(remove.clone());
                    }
                }
            }
            None => {
                let mut entry = incoming.clone();
                entry.action = MappingAction::Adjust {
                    appends: appends.to_vec(),
                    removes: removes.to_vec(),
                };
                self.insert(key.to_string(), entry);
            }
        }
    }

    /// Converts leftover pending adjustments into concrete mappings:
    /// appends with no base become plain mappings, removals with no
    /// target are dropped with a warning.
    pub fn resolve_pending(&mut self, diagnostics: &mut Diagnostics) {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| matches!(e.action, MappingAction::Adjust { .. }))
            .map(|(k, _)| k.clone())
            .collect();

        for key in keys {
            let Some(entry) = self.entries.get_mut(&key) else {
                continue;
            };
            let MappingAction::Adjust { appends, removes } = &entry.action else {
                continue;
            };
            let appends = appends.clone();
            let had_removes = !removes.is_empty();

            if appends.is_empty() {
                if had_removes {
                    diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::Merge,
                            format!("removal from '{}' had no mapping to act on", entry.trigger),
                        )
                        .at(&entry.origin.file, entry.origin.line, 1),
                    );
                }
                self.remove(&key);
            } else {
                entry.action = MappingAction::Set {
                    results: appends,
                    isolated: false,
                };
            }
        }
    }
}

/// The typed stores one context carries.
#[derive(Debug, Clone, Default)]
pub struct Stores {
    pub variables: BTreeMap<String, VariableEntry>,
    pub capabilities: BTreeMap<String, CapabilityEntry>,
    pub defines: BTreeMap<String, DefineEntry>,
    pub mappings: MappingStore,
    pub pixel_channels: BTreeMap<u32, PixelChannelsEntry>,
    pub pixel_positions: BTreeMap<u32, PositionEntry>,
    pub scancode_positions: BTreeMap<u16, PositionEntry>,
    pub animations: BTreeMap<String, AnimationState>,
}

impl Stores {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies one expression into its store under intra-context
    /// override rules.
    pub fn add_expression(&mut self, expression: &Expression, diagnostics: &mut Diagnostics) {
        let origin = &expression.origin;
        match &expression.kind {
            ExpressionKind::Assignment(assignment) => {
                self.apply_assignment(assignment, origin, diagnostics);
            }
            ExpressionKind::Mapping(mapping) => {
                self.mappings.apply(mapping, origin, diagnostics);
            }
            ExpressionKind::PixelChannels(channels) => {
                self.pixel_channels.insert(
                    channels.pixel.index as u32,
                    PixelChannelsEntry {
                        index: channels.pixel.index as u32,
                        channels: channels.pixel.channels.clone(),
                        scancode: channels.scancode,
                        origin: origin.clone(),
                    },
                );
            }
            ExpressionKind::PixelPosition(position) => {
                self.pixel_positions
                    .entry(position.index)
                    .or_insert_with(|| PositionEntry {
                        position: PhysicalPosition::new(),
                        origin: origin.clone(),
                    })
                    .position
                    .merge(&position.position);
            }
            ExpressionKind::ScanCodePosition(position) => {
                self.scancode_positions
                    .entry(position.scancode)
                    .or_insert_with(|| PositionEntry {
                        position: PhysicalPosition::new(),
                        origin: origin.clone(),
                    })
                    .position
                    .merge(&position.position);
            }
            ExpressionKind::Capability(capability) => {
                if let Some(existing) = self.capabilities.get(&capability.name) {
                    if !existing.decl.same_signature(capability) {
                        diagnostics.push(
                            Diagnostic::error(
                                DiagnosticKind::Semantic,
                                format!(
                                    "capability '{}' re-declared with a different signature \
                                     (first declared at {}:{})",
                                    capability.name, existing.origin.file, existing.origin.line
                                ),
                            )
                            .at(&origin.file, origin.line, 1),
                        );
                        return;
                    }
                }
                self.capabilities.insert(
                    capability.name.clone(),
                    CapabilityEntry {
                        decl: capability.clone(),
                        origin: origin.clone(),
                    },
                );
            }
            ExpressionKind::Define(define) => {
                if let Some(existing) = self.defines.get(&define.name) {
                    if existing.def.symbol != define.symbol {
                        diagnostics.push(
                            Diagnostic::error(
                                DiagnosticKind::Semantic,
                                format!(
                                    "'{}' re-declared with a different target (was '{}' at \
                                     {}:{})",
                                    define.name,
                                    existing.def.symbol,
                                    existing.origin.file,
                                    existing.origin.line
                                ),
                            )
                            .at(&origin.file, origin.line, 1),
                        );
                        return;
                    }
                }
                self.defines.insert(
                    define.name.clone(),
                    DefineEntry {
                        def: define.clone(),
                        origin: origin.clone(),
                    },
                );
            }
            ExpressionKind::AnimationDef(def) => {
                self.animations
                    .entry(def.name.clone())
                    .or_default()
                    .merge_settings(&def.modifiers);
            }
            ExpressionKind::AnimationFrame(frame) => {
                let state = self.animations.entry(frame.name.clone()).or_default();
                for index in &frame.frames {
                    state.frames.insert(*index, frame.values.clone());
                }
            }
        }
    }

    fn apply_assignment(
        &mut self,
        assignment: &AssignmentExpr,
        origin: &Origin,
        diagnostics: &mut Diagnostics,
    ) {
        match assignment {
            AssignmentExpr::Scalar { name, value } => {
                if let Some(existing) = self.variables.get(name) {
                    if existing.origin.file == origin.file {
                        diagnostics.push(
                            Diagnostic::warning(
                                DiagnosticKind::Semantic,
                                format!(
                                    "assignment to '{name}' shadows earlier assignment at line {}",
                                    existing.origin.line
                                ),
                            )
                            .at(&origin.file, origin.line, 1),
                        );
                    }
                }
                self.variables.insert(
                    name.clone(),
                    VariableEntry {
                        value: VariableValue::Scalar(value.clone()),
                        origin: origin.clone(),
                    },
                );
            }
            AssignmentExpr::ArrayWhole { name, values } => {
                self.variables.insert(
                    name.clone(),
                    VariableEntry {
                        value: VariableValue::Array(
                            values.iter().cloned().map(Some).collect(),
                        ),
                        origin: origin.clone(),
                    },
                );
            }
            AssignmentExpr::ArrayElement { name, index, value } => {
                let entry = self
                    .variables
                    .entry(name.clone())
                    .or_insert_with(|| VariableEntry {
                        value: VariableValue::Array(Vec::new()),
                        origin: origin.clone(),
                    });

                // An element patch onto a scalar restarts as an array
                if let VariableValue::Scalar(_) = entry.value {
                    entry.value = VariableValue::Array(Vec::new());
                }
                if let VariableValue::Array(elements) = &mut entry.value {
                    if elements.len() <= *index {
                        elements.resize(*index + 1, None);
                    }
                    elements[*index] = Some(value.clone());
                }
                entry.origin = origin.clone();
            }
        }
    }

    /// Overlays a higher-precedence context's stores onto this one.
    pub fn overlay(&mut self, incoming: &Stores, diagnostics: &mut Diagnostics) {
        // Variables: scalars replace; arrays overlay per element
        for (name, entry) in &incoming.variables {
            match (self.variables.get_mut(name), &entry.value) {
                (
                    Some(VariableEntry {
                        value: VariableValue::Array(base),
                        origin,
                    }),
                    VariableValue::Array(update),
                ) => {
                    if base.len() < update.len() {
                        base.resize(update.len(), None);
                    }
                    for (slot, value) in base.iter_mut().zip(update.iter()) {
                        if value.is_some() {
                            *slot = value.clone();
                        }
                    }
                    *origin = entry.origin.clone();
                }
                _ => {
                    self.variables.insert(name.clone(), entry.clone());
                }
            }
        }

        // Capabilities: signature conflicts are irreconcilable
        for (name, entry) in &incoming.capabilities {
            if let Some(existing) = self.capabilities.get(name) {
                if !existing.decl.same_signature(&entry.decl) {
                    diagnostics.push(
                        Diagnostic::error(
                            DiagnosticKind::Merge,
                            format!(
                                "capability '{name}' declared with conflicting signatures \
                                 ({}:{} vs {}:{})",
                                existing.origin.file,
                                existing.origin.line,
                                entry.origin.file,
                                entry.origin.line
                            ),
                        )
                        .at(&entry.origin.file, entry.origin.line, 1),
                    );
                    continue;
                }
            }
            self.capabilities.insert(name.clone(), entry.clone());
        }

        for (name, entry) in &incoming.defines {
            self.defines.insert(name.clone(), entry.clone());
        }

        self.mappings.overlay(&incoming.mappings, diagnostics);

        for (index, entry) in &incoming.pixel_channels {
            self.pixel_channels.insert(*index, entry.clone());
        }

        for (index, entry) in &incoming.pixel_positions {
            self.pixel_positions
                .entry(*index)
                .or_insert_with(|| PositionEntry {
                    position: PhysicalPosition::new(),
                    origin: entry.origin.clone(),
                })
                .position
                .merge(&entry.position);
        }

        for (code, entry) in &incoming.scancode_positions {
            self.scancode_positions
                .entry(*code)
                .or_insert_with(|| PositionEntry {
                    position: PhysicalPosition::new(),
                    origin: entry.origin.clone(),
                })
                .position
                .merge(&entry.position);
        }

        // Animations: settings merge by field; frames replace wholesale
        // unless the (merged) settings mark append-mode
        for (name, incoming_state) in &incoming.animations {
            let state = self.animations.entry(name.clone()).or_default();
            state.merge_settings(&incoming_state.settings);
            if !incoming_state.frames.is_empty() {
                if state.append_mode() {
                    for (frame, values) in &incoming_state.frames {
                        state.frames.insert(*frame, values.clone());
                    }
                } else {
                    state.frames = incoming_state.frames.clone();
                }
            }
        }
    }

    /// Looks up a capability declaration by name.
    #[must_use]
    pub fn capability(&self, name: &str) -> Option<&CapabilityEntry> {
        self.capabilities.get(name)
    }

    /// Read-only coercing view of the variable store.
    #[must_use]
    pub fn variables(&self) -> VariableView<'_> {
        VariableView {
            variables: &self.variables,
        }
    }
}

/// Key → value lookup over merged configuration variables, with the
/// type coercion helpers emitters rely on.
#[derive(Debug, Clone, Copy)]
pub struct VariableView<'a> {
    variables: &'a BTreeMap<String, VariableEntry>,
}

impl<'a> VariableView<'a> {
    /// Raw scalar value as written (quotes stripped).
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&'a str> {
        match &self.variables.get(name)?.value {
            VariableValue::Scalar(value) => Some(value.trim_matches('"')),
            VariableValue::Array(_) => None,
        }
    }

    /// Scalar coerced to an integer (decimal or `0x…`).
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        let text = self.get_str(name)?;
        if let Some(hex) = text.strip_prefix("0x") {
            i64::from_str_radix(hex, 16).ok()
        } else {
            text.parse().ok()
        }
    }

    /// Scalar coerced to a float.
    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get_str(name)?.parse().ok()
    }

    /// Scalar coerced to a boolean (`1`, `true`, `yes`, `on`).
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        let text = self.get_str(name)?.to_lowercase();
        Some(matches!(text.as_str(), "1" | "true" | "yes" | "on"))
    }

    /// Array elements, with unassigned slots as `None`.
    #[must_use]
    pub fn get_array(&self, name: &str) -> Option<&'a [Option<String>]> {
        match &self.variables.get(name)?.value {
            VariableValue::Array(elements) => Some(elements),
            VariableValue::Scalar(_) => None,
        }
    }

    /// Iterates all variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a String, &'a VariableEntry)> {
        self.variables.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn stores_from(text: &str) -> (Stores, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let expressions = parse_source("test.kll", text, &mut diagnostics);
        let mut stores = Stores::new();
        for expression in &expressions {
            stores.add_expression(expression, &mut diagnostics);
        }
        (stores, diagnostics)
    }

    #[test]
    fn test_last_writer_wins_with_warning() {
        let (stores, diagnostics) = stores_from("U\"A\" : U\"B\";\nU\"A\" : U\"C\";");
        let entry = stores.mappings.get("U\"A\"").unwrap();
        let MappingAction::Set { results, .. } = &entry.action else {
            panic!()
        };
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].to_string(), "U\"C\"");
        assert_eq!(diagnostics.warning_count(), 1);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_append_unions_results() {
        let (stores, _) = stores_from("U\"A\" : U\"B\";\nU\"A\" :+ U\"C\";\nU\"A\" :+ U\"C\";");
        let entry = stores.mappings.get("U\"A\"").unwrap();
        let MappingAction::Set { results, .. } = &entry.action else {
            panic!()
        };
        // Duplicate append elided by value equality
        assert_eq!(results.len(), 2);
        assert_eq!(entry.combined_results().unwrap().to_string(), "U\"B\", U\"C\"");
    }

    #[test]
    fn test_remove_deletes_empty_mapping() {
        let (stores, diagnostics) = stores_from("U\"A\" : U\"B\";\nU\"A\" :- U\"B\";");
        assert!(stores.mappings.get("U\"A\"").is_none());
        assert_eq!(diagnostics.warning_count(), 1);
    }

    #[test]
    fn test_isolate_marks_entry() {
        let (stores, _) = stores_from("U\"A\" :: U\"Z\";");
        let entry = stores.mappings.get("U\"A\"").unwrap();
        let MappingAction::Set { isolated, .. } = &entry.action else {
            panic!()
        };
        assert!(isolated);
    }

    #[test]
    fn test_append_without_base_stays_pending() {
        let (stores, _) = stores_from("U\"A\" :+ U\"C\";");
        let entry = stores.mappings.get("U\"A\"").unwrap();
        assert!(matches!(entry.action, MappingAction::Adjust { .. }));
    }

    #[test]
    fn test_array_assignments() {
        let (stores, _) = stores_from("List[] = a, b, c;\nList[1] = d;");
        let entry = stores.variables.get("List").unwrap();
        let VariableValue::Array(elements) = &entry.value else {
            panic!()
        };
        assert_eq!(
            elements,
            &vec![
                Some("a".to_string()),
                Some("d".to_string()),
                Some("c".to_string())
            ]
        );
    }

    #[test]
    fn test_whole_array_replaces_elements() {
        let (stores, _) = stores_from("List[5] = x;\nList[] = a, b;");
        let entry = stores.variables.get("List").unwrap();
        let VariableValue::Array(elements) = &entry.value else {
            panic!()
        };
        assert_eq!(elements.len(), 2);
    }

    #[test]
    fn test_duplicate_capability_signature_mismatch() {
        let (_, diagnostics) =
            stores_from("power => usbPower(state:1);\npower => usbPower(state:2);");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn test_duplicate_capability_identical_ok() {
        let (_, diagnostics) =
            stores_from("power => usbPower(state:1);\npower => usbPower(state:1);");
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_define_conflict() {
        let (_, diagnostics) = stores_from("name => Def_A;\nname => Def_B;");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn test_positions_merge_by_axis() {
        let (stores, _) = stores_from("S0x40 <= x:20;\nS0x40 <= y:15;");
        let entry = stores.scancode_positions.get(&0x40).unwrap();
        assert_eq!(entry.position.x, Some(20.0));
        assert_eq!(entry.position.y, Some(15.0));
    }

    #[test]
    fn test_animation_settings_merge_by_name() {
        let (stores, _) =
            stores_from("A[Fade] <= start, loop:3;\nA[Fade] <= loop:5, interp;");
        let state = stores.animations.get("Fade").unwrap();
        assert_eq!(state.settings.len(), 3);
        let loop_mod = state.settings.iter().find(|m| m.name == "loop").unwrap();
        assert_eq!(loop_mod.to_string(), "loop:5");
    }

    #[test]
    fn test_overlay_replaces_scalar_stores() {
        let (mut base, _) = stores_from("Var = 1;\nU\"A\" : U\"B\";");
        let (update, _) = stores_from("Var = 2;");
        let mut diagnostics = Diagnostics::new();
        base.overlay(&update, &mut diagnostics);
        let entry = base.variables.get("Var").unwrap();
        assert_eq!(entry.value, VariableValue::Scalar("2".to_string()));
    }

    #[test]
    fn test_overlay_capability_conflict_is_merge_error() {
        let (mut base, _) = stores_from("power => usbPower(state:1);");
        let (update, _) = stores_from("power => usbOther(state:1);");
        let mut diagnostics = Diagnostics::new();
        base.overlay(&update, &mut diagnostics);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn test_overlay_isolation_retained() {
        let (mut base, _) = stores_from("U\"A\" :: U\"Z\";");
        let (update, _) = stores_from("U\"A\" : U\"Q\";");
        let mut diagnostics = Diagnostics::new();
        base.overlay(&update, &mut diagnostics);

        let entry = base.mappings.get("U\"A\"").unwrap();
        let MappingAction::Set { results, .. } = &entry.action else {
            panic!()
        };
        assert_eq!(results[0].to_string(), "U\"Z\"");
        assert_eq!(diagnostics.warning_count(), 1);
    }

    #[test]
    fn test_overlay_isolation_overridden_by_isolate() {
        let (mut base, _) = stores_from("U\"A\" :: U\"Z\";");
        let (update, _) = stores_from("U\"A\" :: U\"Q\";");
        let mut diagnostics = Diagnostics::new();
        base.overlay(&update, &mut diagnostics);

        let entry = base.mappings.get("U\"A\"").unwrap();
        let MappingAction::Set { results, .. } = &entry.action else {
            panic!()
        };
        assert_eq!(results[0].to_string(), "U\"Q\"");
    }

    #[test]
    fn test_overlay_append_accumulates() {
        let (mut base, _) = stores_from("U\"A\" : U\"B\";");
        let (update, _) = stores_from("U\"A\" :+ U\"C\";");
        let mut diagnostics = Diagnostics::new();
        base.overlay(&update, &mut diagnostics);

        let entry = base.mappings.get("U\"A\"").unwrap();
        assert_eq!(entry.combined_results().unwrap().to_string(), "U\"B\", U\"C\"");
    }

    #[test]
    fn test_resolve_pending() {
        let (mut stores, _) = stores_from("U\"A\" :+ U\"C\";\nU\"B\" :- U\"X\";");
        let mut diagnostics = Diagnostics::new();
        stores.mappings.resolve_pending(&mut diagnostics);

        // Append without a base becomes a plain mapping
        let entry = stores.mappings.get("U\"A\"").unwrap();
        assert!(matches!(entry.action, MappingAction::Set { .. }));
        // Removal without a target is dropped with a warning
        assert!(stores.mappings.get("U\"B\"").is_none());
        assert_eq!(diagnostics.warning_count(), 1);
    }
}
