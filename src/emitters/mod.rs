//! Back-end emitters.
//!
//! Emitters read the finalized data and the merged context through a
//! read-only façade and never reach back into the pipeline's stores.
//! Selection is by name: `kll` regenerates a canonical `.kll` file,
//! `json` dumps the stable JSON object, `none` produces nothing (used
//! for validation-only runs).

pub mod json;
pub mod kll;

use crate::finalize::FinalData;
use crate::organization::MergeContext;
use anyhow::Result;

/// One file an emitter wants written.
#[derive(Debug, Clone)]
pub struct EmitterOutput {
    /// File name relative to the target directory
    pub filename: String,
    pub content: String,
}

/// Emitter names accepted by [`emit`].
pub const EMITTER_NAMES: &[&str] = &["kll", "json", "none"];

/// Runs the named emitter over the finalized data.
///
/// # Errors
///
/// Fails on an unknown emitter name or serialization failure.
pub fn emit(name: &str, merge: &MergeContext, data: &FinalData) -> Result<Vec<EmitterOutput>> {
    match name {
        "kll" => Ok(vec![EmitterOutput {
            filename: "final.kll".to_string(),
            content: kll::emit(merge),
        }]),
        "json" => Ok(vec![EmitterOutput {
            filename: "kll.json".to_string(),
            content: json::emit(merge, data)?,
        }]),
        "none" => Ok(Vec::new()),
        other => anyhow::bail!(
            "unknown emitter '{other}' (expected one of: {})",
            EMITTER_NAMES.join(", ")
        ),
    }
}
