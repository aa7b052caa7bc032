//! JSON emitter: a stable machine-readable dump of the finalized data.

use crate::constants::{COMPILER_VERSION, KLL_VERSION};
use crate::finalize::FinalData;
use crate::organization::{MergeContext, VariableValue};
use anyhow::{Context, Result};
use serde_json::{json, Map, Value};

/// Serializes the finalized data as the stable JSON object.
///
/// Top-level keys and array orderings are fixed; indices are integers,
/// ids are objects with a `kind` discriminator.
///
/// # Errors
///
/// Fails only if serialization itself fails.
pub fn emit(merge: &MergeContext, data: &FinalData) -> Result<String> {
    let mut variables = Map::new();
    for (name, entry) in merge.globals.variables().iter() {
        let value = match &entry.value {
            VariableValue::Scalar(scalar) => Value::String(scalar.trim_matches('"').to_string()),
            VariableValue::Array(elements) => Value::Array(
                elements
                    .iter()
                    .map(|element| match element {
                        Some(text) => Value::String(text.trim_matches('"').to_string()),
                        None => Value::Null,
                    })
                    .collect(),
            ),
        };
        variables.insert(name.clone(), value);
    }

    let root = json!({
        "kll_version": KLL_VERSION,
        "compiler_version": COMPILER_VERSION,
        "variables": variables,
        "capabilities": data.capabilities,
        "layers": data.layers,
        "trigger_macros": data.trigger_macros,
        "result_macros": data.result_macros,
        "pixel_mapping": data.pixel_map,
        "pixel_display_mapping": data.pixel_display_map,
        "animations": data.animations,
        "scancode_positions": data.scancode_positions,
        "pixel_positions": data.pixel_positions,
    });

    let mut output =
        serde_json::to_string_pretty(&root).context("Failed to serialize JSON output")?;
    output.push('\n');
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::finalize::finalize;
    use crate::organization::{Context as KllContext, ContextRole};
    use crate::parser::parse_source;

    fn compile(text: &str) -> (MergeContext, FinalData) {
        let mut diagnostics = Diagnostics::new();
        let expressions = parse_source("test.kll", text, &mut diagnostics);
        let mut context = KllContext::new(ContextRole::BaseMap);
        context.add_file("test.kll", &expressions, &mut diagnostics);
        let merge = crate::organization::MergeContext::build(vec![context], &mut diagnostics);
        let data = finalize(&merge, &mut diagnostics).unwrap();
        (merge, data)
    }

    #[test]
    fn test_stable_top_level_keys() {
        let (merge, data) = compile("Name = \"Board\";\nS0x10 : U\"A\";");
        let output = emit(&merge, &data).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();

        for key in [
            "variables",
            "capabilities",
            "layers",
            "trigger_macros",
            "result_macros",
            "pixel_mapping",
            "pixel_display_mapping",
            "animations",
            "scancode_positions",
            "pixel_positions",
            "kll_version",
            "compiler_version",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }

        assert_eq!(value["variables"]["Name"], "Board");
        assert_eq!(value["trigger_macros"][0]["text"], "S0x10");
    }

    #[test]
    fn test_id_objects_carry_kind() {
        let (merge, data) = compile("S0x10 : U\"A\";");
        let output = emit(&merge, &data).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();

        let trigger_id =
            &value["trigger_macros"][0]["sequence"]["combos"][0]["elems"][0]["id"];
        assert_eq!(trigger_id["kind"], "scan_code");
        assert_eq!(trigger_id["code"], 0x10);

        let result_id = &value["result_macros"][0]["sequence"]["combos"][0]["elems"][0]["id"];
        assert_eq!(result_id["kind"], "hid");
        assert_eq!(result_id["code"], 0x04);
    }
}
