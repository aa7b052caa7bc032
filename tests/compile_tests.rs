//! End-to-end pipeline tests over in-memory sources.
//!
//! These cover the cross-stage behaviors: override and append rules
//! across contexts, isolation, range expansion, schedule
//! canonicalization, and layer fallthrough.

use kllc::organization::ContextRole;
use kllc::pipeline::{compile_sources, CancelFlag, CompileOutput, SourceUnit};

fn unit(path: &str, role: ContextRole, text: &str) -> SourceUnit {
    SourceUnit {
        path: path.to_string(),
        role,
        text: text.to_string(),
    }
}

fn compile(sources: &[SourceUnit]) -> CompileOutput {
    compile_sources(sources, &CancelFlag::new())
}

/// Looks up the result macro text mapped to a trigger in a layer.
fn mapping_of(output: &CompileOutput, layer: usize, trigger: &str) -> Option<String> {
    let data = output.final_data.as_ref()?;
    let layer = &data.layers[layer];
    layer
        .mapping
        .iter()
        .find(|entry| data.trigger_macros[entry.trigger].text == trigger)
        .map(|entry| data.result_macros[entry.result].text.clone())
}

#[test]
fn test_last_writer_wins_within_a_file() {
    let output = compile(&[unit(
        "map.kll",
        ContextRole::BaseMap,
        "U\"A\" : U\"B\";\nU\"A\" : U\"C\";",
    )]);
    assert!(output.succeeded(), "{}", output.diagnostics);

    // Single mapping, second assignment wins, one shadowing warning
    assert_eq!(mapping_of(&output, 0, "U\"A\"").as_deref(), Some("U\"C\""));
    assert_eq!(output.final_data.as_ref().unwrap().layers[0].mapping.len(), 1);
    assert_eq!(output.diagnostics.warning_count(), 1);
}

#[test]
fn test_add_to_existing_across_contexts() {
    let output = compile(&[
        unit("base.kll", ContextRole::BaseMap, "U\"A\" : U\"B\";"),
        unit("default.kll", ContextRole::DefaultMap, "U\"A\" :+ U\"C\";"),
    ]);
    assert!(output.succeeded(), "{}", output.diagnostics);
    assert_eq!(
        mapping_of(&output, 0, "U\"A\"").as_deref(),
        Some("U\"B\", U\"C\"")
    );
}

#[test]
fn test_range_and_explicit_collision() {
    let output = compile(&[unit(
        "map.kll",
        ContextRole::BaseMap,
        "S[0x10-0x12] : U\"X\";\nS0x11 : U\"Y\";",
    )]);
    assert!(output.succeeded(), "{}", output.diagnostics);

    assert_eq!(mapping_of(&output, 0, "S0x10").as_deref(), Some("U\"X\""));
    assert_eq!(mapping_of(&output, 0, "S0x11").as_deref(), Some("U\"Y\""));
    assert_eq!(mapping_of(&output, 0, "S0x12").as_deref(), Some("U\"X\""));
}

#[test]
fn test_schedule_canonicalization() {
    let plain = compile(&[unit(
        "a.kll",
        ContextRole::BaseMap,
        "S0x43(P,UP,UR) : U\"Enter\";",
    )]);
    let bracketed = compile(&[unit(
        "a.kll",
        ContextRole::BaseMap,
        "S[0x43(P,UP,UR)] : U\"Enter\";",
    )]);

    let plain_json = serde_json::to_string(&plain.final_data.unwrap()).unwrap();
    let bracketed_json = serde_json::to_string(&bracketed.final_data.unwrap()).unwrap();
    assert_eq!(plain_json, bracketed_json);
}

#[test]
fn test_timing_in_result() {
    let output = compile(&[unit(
        "map.kll",
        ContextRole::BaseMap,
        "U\"V\" : U\"A\"(P,H:300ms,R);",
    )]);
    assert!(output.succeeded(), "{}", output.diagnostics);
    assert_eq!(
        mapping_of(&output, 0, "U\"V\"").as_deref(),
        Some("U\"A\"(P,H:300ms,R)")
    );
}

#[test]
fn test_isolation_across_layers() {
    let output = compile(&[
        unit("base.kll", ContextRole::BaseMap, "U\"A\" :: U\"Z\";"),
        unit("layer1.kll", ContextRole::PartialMap(0), "U\"A\" : U\"Q\";"),
    ]);
    assert!(!output.diagnostics.has_errors(), "{}", output.diagnostics);

    // Layer 1 carries the isolation and the override attempt warns
    assert_eq!(mapping_of(&output, 1, "U\"A\"").as_deref(), Some("U\"Z\""));
    assert_eq!(output.diagnostics.warning_count(), 1);
    assert!(output.diagnostics.to_string().contains("isolated"));
}

#[test]
fn test_layer_fallthrough_sentinel() {
    let output = compile(&[
        unit(
            "base.kll",
            ContextRole::BaseMap,
            "S0x10 : U\"A\";\nS0x11 : U\"B\";",
        ),
        unit("layer1.kll", ContextRole::PartialMap(0), "S0x11 : U\"C\";"),
    ]);
    let data = output.final_data.as_ref().unwrap();

    // The partial layer emits its own entry only; the omitted trigger
    // has no entry at all, which the firmware reads as fallthrough
    assert_eq!(data.layers[1].mapping.len(), 1);
    assert!(mapping_of(&output, 1, "S0x10").is_none());
    assert_eq!(mapping_of(&output, 0, "S0x10").as_deref(), Some("U\"A\""));
}

#[test]
fn test_remove_across_contexts_deletes_mapping() {
    let output = compile(&[
        unit("base.kll", ContextRole::BaseMap, "U\"A\" : U\"B\";"),
        unit("default.kll", ContextRole::DefaultMap, "U\"A\" :- U\"B\";"),
    ]);
    assert!(!output.diagnostics.has_errors(), "{}", output.diagnostics);
    assert!(mapping_of(&output, 0, "U\"A\"").is_none());
    // Deleting a mapping by emptying its result set warns
    assert!(output.diagnostics.warning_count() >= 1);
}

#[test]
fn test_capability_signature_conflict_across_contexts() {
    let output = compile(&[
        unit(
            "base.kll",
            ContextRole::BaseMap,
            "power => usbPower(state:1);",
        ),
        unit(
            "default.kll",
            ContextRole::DefaultMap,
            "power => otherPower(state:1);",
        ),
    ]);
    assert!(output.diagnostics.has_errors());
    assert!(output.final_data.is_none());
    assert_eq!(output.diagnostics.exit_code(), 1);
}

#[test]
fn test_multiple_errors_reported_in_one_pass() {
    let output = compile(&[unit(
        "bad.kll",
        ContextRole::BaseMap,
        "U\"A\" :;\nS0x10 : U\"B\";\nU\"C\" :;",
    )]);
    assert!(!output.succeeded());
    assert_eq!(output.diagnostics.error_count(), 2);
}

#[test]
fn test_indicator_mappings_are_separate() {
    let output = compile(&[unit(
        "map.kll",
        ContextRole::BaseMap,
        "I\"NumLock\" i: ledNumLock(1);\nledNumLock => led_num_lock(state:1);",
    )]);
    assert!(output.succeeded(), "{}", output.diagnostics);
    assert_eq!(
        mapping_of(&output, 0, "I\"NumLock\"").as_deref(),
        Some("ledNumLock(1)")
    );
}

#[test]
fn test_full_stack_compile() {
    let output = compile(&[
        unit(
            "config.kll",
            ContextRole::Configuration,
            "Name = \"Board\";\nPixel_DisplayMapping_UnitSize = 19;\n\
             Pixel_DisplayMapping_ColumnSize = 1;\nPixel_DisplayMapping_RowSize = 1;",
        ),
        unit(
            "base.kll",
            ContextRole::BaseMap,
            "S0x10 : U\"A\";\nS0x11 : U\"B\";\n\
             S0x10 <= x:0, y:0;\nS0x11 <= x:19, y:0;\n\
             P[1](30:8,31:8,32:8) : S0x10;\nP[2](33:8,34:8,35:8) : S0x11;\n\
             P[1] <= x:0, y:0;\nP[2] <= x:19, y:0;",
        ),
        unit(
            "default.kll",
            ContextRole::DefaultMap,
            "S0x12 : layerShift(1);\nlayerShift => layer_shift(layer:1);",
        ),
        unit("layer1.kll", ContextRole::PartialMap(0), "S0x10 : U\"Esc\";"),
    ]);
    assert!(output.succeeded(), "{}", output.diagnostics);

    let data = output.final_data.as_ref().unwrap();
    assert_eq!(data.layers.len(), 2);
    assert_eq!(data.max_pixel, 2);
    assert_eq!(data.pixel_map.len(), 2);
    assert_eq!(data.capabilities.len(), 1);
    assert_eq!(data.scancode_positions.len(), 2);
    assert_eq!(data.pixel_display_map[0], vec![1, 2]);
}
