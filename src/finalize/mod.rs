//! Finalization: projecting the merge context into dense tables.
//!
//! This stage expands symbolic ranges, assigns stable integer indices
//! to trigger and result macros, builds the per-layer scan-code
//! trigger lists and the pixel tables, and resolves physical
//! positions. It never mutates the [`MergeContext`]; the produced
//! [`FinalData`] is a separate object. Finalization errors abort
//! immediately instead of accumulating.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::hid_db::HidDb;
use crate::models::expression::{
    CapabilityArgDecl, Combo, ComboElem, Origin, PixelModExpr, RangeKind, ScheduledId, Sequence,
};
use crate::models::id::{AnimationModifier, HidId, Id, LayerId, PixelChannel, ScanCodeId};
use crate::organization::{MappingAction, MappingStore, MergeContext};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A trigger or result macro with its canonical text form.
#[derive(Debug, Clone, Serialize)]
pub struct MacroEntry {
    pub index: usize,
    pub text: String,
    pub sequence: Sequence,
}

/// A declared capability with its assigned index.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityFinal {
    pub index: usize,
    pub name: String,
    pub symbol: String,
    pub args: Vec<CapabilityArgDecl>,
}

/// One trigger → result pairing inside a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerEntry {
    pub trigger: usize,
    pub result: usize,
}

/// A finalized layer table.
#[derive(Debug, Clone, Serialize)]
pub struct FinalLayer {
    pub index: usize,
    /// Trigger macro → result macro pairs, in assignment order
    pub mapping: Vec<LayerEntry>,
    /// Scan code → trigger macro indices whose trigger starts with it
    pub scancode_triggers: BTreeMap<u16, Vec<usize>>,
}

/// One slot of the dense pixel map.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum PixelMapEntry {
    /// An assigned pixel with its channel tuples
    Pixel {
        index: u32,
        channels: Vec<PixelChannel>,
        scancode: Option<u16>,
    },
    /// Unused slot kept for density
    Blank { index: u32 },
}

/// A finalized animation.
#[derive(Debug, Clone, Serialize)]
pub struct AnimationFinal {
    pub index: usize,
    pub name: String,
    pub modifiers: Vec<AnimationModifier>,
    pub frames: Vec<AnimationFrameFinal>,
}

/// One animation frame's pixel operations.
#[derive(Debug, Clone, Serialize)]
pub struct AnimationFrameFinal {
    pub frame: u32,
    pub values: Vec<PixelModExpr>,
}

/// Physical position of a scan code, all axes resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ScanCodePositionFinal {
    pub scancode: u16,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    /// Pixel sharing this switch's location, when mapped
    pub pixel: Option<u32>,
}

/// Physical position of a pixel, all axes resolved.
#[derive(Debug, Clone, Serialize)]
pub struct PixelPositionFinal {
    pub pixel: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub scancode: Option<u16>,
}

/// The finalized, emitter-ready view of a compilation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FinalData {
    pub layers: Vec<FinalLayer>,
    pub trigger_macros: Vec<MacroEntry>,
    pub result_macros: Vec<MacroEntry>,
    pub capabilities: Vec<CapabilityFinal>,
    pub pixel_map: Vec<PixelMapEntry>,
    /// 2-D grid of pixel indices; 0 marks an unmapped cell
    pub pixel_display_map: Vec<Vec<u32>>,
    pub animations: Vec<AnimationFinal>,
    pub scancode_positions: Vec<ScanCodePositionFinal>,
    pub pixel_positions: Vec<PixelPositionFinal>,
    pub max_scan_code: u16,
    pub max_pixel: u32,
}

impl Default for FinalLayer {
    fn default() -> Self {
        Self {
            index: 0,
            mapping: Vec::new(),
            scancode_triggers: BTreeMap::new(),
        }
    }
}

/// A fully expanded trigger → result pair.
#[derive(Debug, Clone)]
struct Expanded {
    trigger: Sequence,
    result: Sequence,
    from_range: bool,
    origin: Origin,
}

/// Builds one concrete id for a range code.
fn range_code_id(kind: RangeKind, code: u32, hid: &HidDb) -> Id {
    match kind {
        RangeKind::ScanCode => Id::ScanCode(ScanCodeId::new(code as u16)),
        RangeKind::Hid(page) => match hid.name_of(page, code as u16) {
            Some(symbol) => Id::Hid(HidId::named(page, code as u16, symbol)),
            None => Id::Hid(HidId::new(page, code as u16)),
        },
        RangeKind::Layer(mode) => Id::Layer(LayerId { mode, index: code }),
    }
}

/// Expands one combo element into its id variants.
fn expand_elem(elem: &ComboElem, hid: &HidDb) -> Vec<ScheduledId> {
    match elem {
        ComboElem::Id(scheduled) => vec![scheduled.clone()],
        ComboElem::Range(range) => range
            .codes()
            .map(|code| ScheduledId {
                id: range_code_id(range.kind, code, hid),
                schedule: range.schedule.clone(),
            })
            .collect(),
    }
}

/// Expands a combo into its variants (cartesian over elements).
fn expand_combo(combo: &Combo, hid: &HidDb) -> Vec<Combo> {
    let mut variants = vec![Combo { elems: Vec::new() }];
    for elem in &combo.elems {
        let options = expand_elem(elem, hid);
        let mut next = Vec::with_capacity(variants.len() * options.len());
        for variant in &variants {
            for option in &options {
                let mut grown = variant.clone();
                grown.elems.push(ComboElem::Id(option.clone()));
                next.push(grown);
            }
        }
        variants = next;
    }
    variants
}

/// Expands a sequence into its variants (cartesian over combos).
fn expand_sequence(sequence: &Sequence, hid: &HidDb) -> Vec<Sequence> {
    let mut variants = vec![Sequence { combos: Vec::new() }];
    for combo in &sequence.combos {
        let options = expand_combo(combo, hid);
        let mut next = Vec::with_capacity(variants.len() * options.len());
        for variant in &variants {
            for option in &options {
                let mut grown = variant.clone();
                grown.combos.push(option.clone());
                next.push(grown);
            }
        }
        variants = next;
    }
    variants
}

/// Expands one layer's mapping store, resolving range collisions:
/// an explicit mapping beats a range-generated one for the same
/// trigger; two range-generated mappings colliding is a hard error.
fn expand_layer(
    store: &MappingStore,
    hid: &HidDb,
) -> Result<Vec<Expanded>, Box<Diagnostic>> {
    let mut expanded: Vec<Expanded> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for (_, entry) in store.iter_ordered() {
        let MappingAction::Set { .. } = entry.action else {
            continue;
        };
        let Some(result) = entry.combined_results() else {
            continue;
        };

        let from_range = entry.trigger.has_ranges();
        let trigger_variants = expand_sequence(&entry.trigger, hid);
        let result_variants = expand_sequence(&result, hid);

        // A ranged result pairs element-wise with a ranged trigger;
        // a single result broadcasts to every trigger variant
        if result_variants.len() != 1 && result_variants.len() != trigger_variants.len() {
            return Err(Box::new(
                Diagnostic::error(
                    DiagnosticKind::Finalization,
                    format!(
                        "range size mismatch: {} trigger variants vs {} result variants for '{}'",
                        trigger_variants.len(),
                        result_variants.len(),
                        entry.trigger
                    ),
                )
                .at(&entry.origin.file, entry.origin.line, 1),
            ));
        }

        for (variant_index, trigger) in trigger_variants.into_iter().enumerate() {
            let result = if result_variants.len() == 1 {
                result_variants[0].clone()
            } else {
                result_variants[variant_index].clone()
            };
            // Indicator-family mappings keep their own keyspace
            let key = if entry.indicator {
                format!("i|{trigger}")
            } else {
                trigger.to_string()
            };

            match by_key.get(&key) {
                Some(&slot) => {
                    let existing = &expanded[slot];
                    match (existing.from_range, from_range) {
                        // Explicit beats range-generated
                        (true, false) => {
                            expanded[slot] = Expanded {
                                trigger,
                                result,
                                from_range,
                                origin: entry.origin.clone(),
                            };
                        }
                        (false, true) => {}
                        (true, true) => {
                            return Err(Box::new(
                                Diagnostic::error(
                                    DiagnosticKind::Finalization,
                                    format!(
                                        "two ranges expand to a mapping for '{key}' \
                                         (first at {}:{})",
                                        existing.origin.file, existing.origin.line
                                    ),
                                )
                                .at(&entry.origin.file, entry.origin.line, 1),
                            ));
                        }
                        (false, false) => {
                            expanded[slot] = Expanded {
                                trigger,
                                result,
                                from_range,
                                origin: entry.origin.clone(),
                            };
                        }
                    }
                }
                None => {
                    by_key.insert(key, expanded.len());
                    expanded.push(Expanded {
                        trigger,
                        result,
                        from_range,
                        origin: entry.origin.clone(),
                    });
                }
            }
        }
    }

    Ok(expanded)
}

/// Interning table assigning stable indices to macro texts.
#[derive(Default)]
struct MacroTable {
    entries: Vec<MacroEntry>,
    lookup: HashMap<String, usize>,
}

impl MacroTable {
    fn intern(&mut self, sequence: &Sequence) -> usize {
        let text = sequence.to_string();
        if let Some(&index) = self.lookup.get(&text) {
            return index;
        }
        let index = self.entries.len();
        self.lookup.insert(text.clone(), index);
        self.entries.push(MacroEntry {
            index,
            text,
            sequence: sequence.clone(),
        });
        index
    }
}

fn max_scan_code_of(sequence: &Sequence, current: &mut u16) {
    for combo in &sequence.combos {
        for elem in &combo.elems {
            if let ComboElem::Id(scheduled) = elem {
                if let Some(code) = scheduled.id.as_scan_code() {
                    *current = (*current).max(code);
                }
            }
        }
    }
}

/// Finds the pixel index sharing a scan code's location, via the pixel
/// channel table.
fn pixel_for_scancode(merge: &MergeContext, scancode: u16) -> Option<u32> {
    merge
        .globals
        .pixel_channels
        .values()
        .find(|entry| entry.scancode == Some(scancode))
        .map(|entry| entry.index)
}

/// Builds the 2-D pixel display grid from physical positions.
///
/// Pixels are bucketed by x into columns and by y into rows, with the
/// pitch controlled by the `Pixel_DisplayMapping_*` configuration
/// variables. Cells left at 0 are unmapped.
fn build_display_map(
    merge: &MergeContext,
    positions: &BTreeMap<u32, [f64; 6]>,
    diagnostics: &mut Diagnostics,
) -> Vec<Vec<u32>> {
    if positions.is_empty() {
        return Vec::new();
    }

    let vars = merge.globals.variables();
    let unit_size = vars
        .get_f64("Pixel_DisplayMapping_UnitSize")
        .filter(|v| *v > 0.0)
        .unwrap_or(1.0);
    let column_size = vars.get_int("Pixel_DisplayMapping_ColumnSize").unwrap_or(20) as f64;
    let row_size = vars.get_int("Pixel_DisplayMapping_RowSize").unwrap_or(20) as f64;
    let column_direction = vars
        .get_int("Pixel_DisplayMapping_ColumnDirection")
        .unwrap_or(1);
    let row_direction = vars.get_int("Pixel_DisplayMapping_RowDirection").unwrap_or(1);

    let mut min = (f64::MAX, f64::MAX);
    let mut max = (f64::MIN, f64::MIN);
    for axes in positions.values() {
        min.0 = min.0.min(axes[0]);
        min.1 = min.1.min(axes[1]);
        max.0 = max.0.max(axes[0]);
        max.1 = max.1.max(axes[1]);
    }

    let width_val = max.0 - min.0;
    let height_val = max.1 - min.1;
    let width = (width_val / unit_size * column_size).round() as usize + 1;
    let height = (height_val / unit_size * row_size).round() as usize + 1;

    let mut grid = vec![vec![0u32; width]; height];
    for (&pixel, axes) in positions {
        let mut x_percent = if width_val == 0.0 {
            0.0
        } else {
            (axes[0] - min.0) / width_val
        };
        let mut y_percent = if height_val == 0.0 {
            0.0
        } else {
            (axes[1] - min.1) / height_val
        };
        if row_direction == -1 {
            x_percent = 1.0 - x_percent;
        }
        if column_direction == -1 {
            y_percent = 1.0 - y_percent;
        }

        let x = (x_percent * (width - 1) as f64).round() as usize;
        let y = (y_percent * (height - 1) as f64).round() as usize;

        if grid[y][x] == 0 {
            grid[y][x] = pixel;
        } else {
            diagnostics.push(Diagnostic::warning(
                DiagnosticKind::Finalization,
                format!(
                    "pixel {pixel} does not fit the display grid at ({x},{y}); \
                     cell already holds pixel {}",
                    grid[y][x]
                ),
            ));
        }
    }

    grid
}

/// Converts a [`MergeContext`] into [`FinalData`].
///
/// # Errors
///
/// Returns the first finalization error (range conflicts, size
/// mismatches); finalization does not accumulate errors.
pub fn finalize(
    merge: &MergeContext,
    diagnostics: &mut Diagnostics,
) -> Result<FinalData, Box<Diagnostic>> {
    let hid = HidDb::new();
    let mut data = FinalData::default();

    let mut triggers = MacroTable::default();
    let mut results = MacroTable::default();
    let mut max_scan_code = 0u16;

    // Layer tables: trigger/result macro interning in deterministic
    // traversal order (layer order, then first-appearance order)
    for (layer_index, store) in merge.layers().iter().enumerate() {
        let mut layer = FinalLayer {
            index: layer_index,
            ..FinalLayer::default()
        };

        for expanded in expand_layer(store, &hid)? {
            let trigger_index = triggers.intern(&expanded.trigger);
            let result_index = results.intern(&expanded.result);

            let entry = LayerEntry {
                trigger: trigger_index,
                result: result_index,
            };
            if !layer.mapping.contains(&entry) {
                layer.mapping.push(entry);
            }

            if let Some(scancode) = expanded.trigger.leading_scan_code() {
                let list = layer.scancode_triggers.entry(scancode).or_default();
                if !list.contains(&trigger_index) {
                    list.push(trigger_index);
                }
            }

            max_scan_code_of(&expanded.trigger, &mut max_scan_code);

            // Capability invocations must resolve to declarations
            for combo in &expanded.result.combos {
                for elem in &combo.elems {
                    if let ComboElem::Id(scheduled) = elem {
                        if let Id::Capability(call) = &scheduled.id {
                            if !merge.globals.capabilities.contains_key(&call.name) {
                                diagnostics.push(
                                    Diagnostic::warning(
                                        DiagnosticKind::Semantic,
                                        format!("capability '{}' is not declared", call.name),
                                    )
                                    .at(&expanded.origin.file, expanded.origin.line, 1),
                                );
                            }
                        }
                    }
                }
            }
        }

        debug!(
            layer = layer_index,
            entries = layer.mapping.len(),
            "finalized layer"
        );
        data.layers.push(layer);
    }

    data.trigger_macros = triggers.entries;
    data.result_macros = results.entries;

    // Capability table, in name order
    for (index, (name, entry)) in merge.globals.capabilities.iter().enumerate() {
        data.capabilities.push(CapabilityFinal {
            index,
            name: name.clone(),
            symbol: entry.decl.symbol.clone(),
            args: entry.decl.args.clone(),
        });
    }

    // Dense pixel map over [1..=max_pixel]
    let max_pixel = merge
        .globals
        .pixel_channels
        .keys()
        .copied()
        .max()
        .unwrap_or(0);
    for index in 1..=max_pixel {
        match merge.globals.pixel_channels.get(&index) {
            Some(entry) => data.pixel_map.push(PixelMapEntry::Pixel {
                index,
                channels: entry.channels.clone(),
                scancode: entry.scancode,
            }),
            None => data.pixel_map.push(PixelMapEntry::Blank { index }),
        }
    }
    data.max_pixel = max_pixel;

    // Physical positions: pixels directly, scan codes via the channel
    // table's scancode link
    let mut display_positions: BTreeMap<u32, [f64; 6]> = BTreeMap::new();
    for (&index, entry) in &merge.globals.pixel_positions {
        display_positions.insert(index, entry.position.resolved());
    }

    for (&scancode, entry) in &merge.globals.scancode_positions {
        max_scan_code = max_scan_code.max(scancode);
        let axes = entry.position.resolved();
        let pixel = pixel_for_scancode(merge, scancode);
        if let Some(pixel) = pixel {
            display_positions.entry(pixel).or_insert(axes);
        }
        data.scancode_positions.push(ScanCodePositionFinal {
            scancode,
            x: axes[0],
            y: axes[1],
            z: axes[2],
            rx: axes[3],
            ry: axes[4],
            rz: axes[5],
            pixel,
        });
    }

    for (&pixel, entry) in &merge.globals.pixel_positions {
        let axes = entry.position.resolved();
        let scancode = merge
            .globals
            .pixel_channels
            .get(&pixel)
            .and_then(|e| e.scancode);
        data.pixel_positions.push(PixelPositionFinal {
            pixel,
            x: axes[0],
            y: axes[1],
            z: axes[2],
            rx: axes[3],
            ry: axes[4],
            rz: axes[5],
            scancode,
        });
    }

    data.pixel_display_map = build_display_map(merge, &display_positions, diagnostics);

    // Animations, in name order
    for (index, (name, state)) in merge.globals.animations.iter().enumerate() {
        data.animations.push(AnimationFinal {
            index,
            name: name.clone(),
            modifiers: state.settings.clone(),
            frames: state
                .frames
                .iter()
                .map(|(frame, values)| AnimationFrameFinal {
                    frame: *frame,
                    values: values.clone(),
                })
                .collect(),
        });
    }

    data.max_scan_code = max_scan_code;
    Ok(data)
}
