//! KLL emitter: regenerates the merge context as canonical KLL.
//!
//! One statement per line, ids and schedules in canonical form,
//! sections ordered by statement kind and entries by key. A round-trip
//! through parse → merge → emit is idempotent up to this canonical
//! form.

use crate::constants::{COMPILER_VERSION, KLL_VERSION};
use crate::organization::{MappingAction, MappingStore, MergeContext, VariableValue};
use std::fmt::Write;

fn push_section(out: &mut String, title: &str, body: String) {
    if body.is_empty() {
        return;
    }
    let _ = writeln!(out, "# {title}");
    out.push_str(&body);
    out.push('\n');
}

fn emit_mappings(store: &MappingStore) -> String {
    let mut body = String::new();
    for (_, entry) in store.iter_by_key() {
        let MappingAction::Set { results, isolated } = &entry.action else {
            continue;
        };
        let prefix = if entry.indicator { "i" } else { "" };
        for (index, result) in results.iter().enumerate() {
            let operator = if index > 0 {
                ":+"
            } else if *isolated {
                "::"
            } else {
                ":"
            };
            let _ = writeln!(body, "{} {prefix}{operator} {result};", entry.trigger);
        }
    }
    body
}

/// Prints the merge context as a canonical `.kll` file.
#[must_use]
pub fn emit(merge: &MergeContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Generated by kllc {COMPILER_VERSION} (KLL {KLL_VERSION})");
    out.push('\n');

    // Variables
    let mut body = String::new();
    for (name, entry) in merge.globals.variables().iter() {
        match &entry.value {
            VariableValue::Scalar(value) => {
                let _ = writeln!(body, "{name} = {value};");
            }
            VariableValue::Array(elements) => {
                let values: Vec<&str> = elements
                    .iter()
                    .map(|e| e.as_deref().unwrap_or(""))
                    .collect();
                let _ = writeln!(body, "{name}[] = {};", values.join(", "));
            }
        }
    }
    push_section(&mut out, "Variables", body);

    // Defines
    let mut body = String::new();
    for entry in merge.globals.defines.values() {
        let _ = writeln!(body, "{}", entry.def);
    }
    push_section(&mut out, "Defines", body);

    // Capabilities
    let mut body = String::new();
    for entry in merge.globals.capabilities.values() {
        let _ = writeln!(body, "{}", entry.decl);
    }
    push_section(&mut out, "Capabilities", body);

    // Physical positions
    let mut body = String::new();
    for (code, entry) in &merge.globals.scancode_positions {
        let _ = writeln!(body, "S0x{code:02X} <= {};", entry.position);
    }
    push_section(&mut out, "ScanCode Physical Positions", body);

    let mut body = String::new();
    for (index, entry) in &merge.globals.pixel_positions {
        let _ = writeln!(body, "P[{index}] <= {};", entry.position);
    }
    push_section(&mut out, "Pixel Physical Positions", body);

    // Pixel channel map
    let mut body = String::new();
    for (index, entry) in &merge.globals.pixel_channels {
        let channels: Vec<String> = entry.channels.iter().map(ToString::to_string).collect();
        let target = match entry.scancode {
            Some(code) => format!("S0x{code:02X}"),
            None => "None".to_string(),
        };
        let _ = writeln!(body, "P[{index}]({}) : {target};", channels.join(","));
    }
    push_section(&mut out, "Pixel Mapping", body);

    // Animations and frames
    let mut body = String::new();
    for (name, state) in &merge.globals.animations {
        if !state.settings.is_empty() {
            let settings: Vec<String> = state.settings.iter().map(ToString::to_string).collect();
            let _ = writeln!(body, "A[{name}] <= {};", settings.join(", "));
        }
        for (frame, values) in &state.frames {
            let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
            let _ = writeln!(body, "A[{name}, {frame}] <= {};", rendered.join(", "));
        }
    }
    push_section(&mut out, "Animations", body);

    // Mappings, layer by layer
    push_section(&mut out, "Layer 0 Mapping", emit_mappings(&merge.globals.mappings));
    for (index, layer) in merge.partial_layers.iter().enumerate() {
        push_section(
            &mut out,
            &format!("Layer {} Mapping", index + 1),
            emit_mappings(layer),
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::organization::{Context as KllContext, ContextRole};
    use crate::parser::parse_source;

    fn merge_text(text: &str) -> MergeContext {
        let mut diagnostics = Diagnostics::new();
        let expressions = parse_source("test.kll", text, &mut diagnostics);
        assert!(!diagnostics.has_errors(), "{diagnostics}");
        let mut context = KllContext::new(ContextRole::BaseMap);
        context.add_file("test.kll", &expressions, &mut diagnostics);
        crate::organization::MergeContext::build(vec![context], &mut diagnostics)
    }

    #[test]
    fn test_statements_regenerated() {
        let merge = merge_text(
            "Name = \"Board\";\n\
             myCap => my_func(state:1);\n\
             S0x10 : U\"A\";\n\
             S0x10 <= x:12;\n\
             P[1](30:8) : S0x10;",
        );
        let output = emit(&merge);

        assert!(output.contains("Name = \"Board\";"));
        assert!(output.contains("myCap => my_func(state:1);"));
        assert!(output.contains("S0x10 : U\"A\";"));
        assert!(output.contains("S0x10 <= x:12;"));
        assert!(output.contains("P[1](30:8) : S0x10;"));
    }

    #[test]
    fn test_round_trip_idempotence() {
        let source = "Name = \"Board\";\n\
                      S0x10 : U\"A\";\n\
                      S[0x20-0x22] : U\"X\";\n\
                      U\"B\" : U\"C\"(P,H:300ms,R);\n\
                      S0x11 :: U\"Z\";\n\
                      S0x12 : U\"D\", U\"E\" + U\"F\";\n\
                      A[Fade] <= start, loop:2;\n\
                      A[Fade, 0] <= P[1](255,0,0);";

        let first = emit(&merge_text(source));
        let second = emit(&merge_text(&first));
        assert_eq!(first, second);
    }

    #[test]
    fn test_appended_results_regenerate_as_appends() {
        let merge = merge_text("U\"A\" : U\"B\";\nU\"A\" :+ U\"C\";");
        let output = emit(&merge);
        assert!(output.contains("U\"A\" : U\"B\";"));
        assert!(output.contains("U\"A\" :+ U\"C\";"));

        // And the appends survive a round trip
        let again = emit(&merge_text(&output));
        assert_eq!(output, again);
    }

    #[test]
    fn test_isolation_survives_round_trip() {
        let output = emit(&merge_text("U\"A\" :: U\"Z\";"));
        assert!(output.contains("U\"A\" :: U\"Z\";"));
    }
}
