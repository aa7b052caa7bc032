//! The compilation pipeline: files → tokens → expressions → contexts
//! → merge → finalization.
//!
//! The pipeline is a pure function from the request's files and roles
//! to [`FinalData`]. User errors accumulate per stage; the next stage
//! only runs when the accumulated set is empty. Cancellation is
//! cooperative: each stage checks the flag at its top boundary and
//! returns a `Cancelled` diagnostic without partial output.

use crate::constants::{DEFAULT_EMITTER, DEFAULT_TARGET_DIR};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::emitters;
use crate::finalize::{finalize, FinalData};
use crate::organization::{Context, ContextRole, MergeContext};
use crate::parser::parse_source;
use anyhow::{Context as AnyhowContext, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the driver hands the core for one compilation.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub generic_files: Vec<PathBuf>,
    pub config_files: Vec<PathBuf>,
    pub base_files: Vec<PathBuf>,
    pub default_files: Vec<PathBuf>,
    /// Each inner list is one PartialMap layer, in layer order
    pub partial_groups: Vec<Vec<PathBuf>>,
    pub merge_files: Vec<PathBuf>,
    pub emitter: String,
    pub target_dir: PathBuf,
    /// Extra JSON dump location, independent of the emitter choice
    pub json_output: Option<PathBuf>,
}

impl Default for CompileRequest {
    fn default() -> Self {
        Self {
            generic_files: Vec::new(),
            config_files: Vec::new(),
            base_files: Vec::new(),
            default_files: Vec::new(),
            partial_groups: Vec::new(),
            merge_files: Vec::new(),
            emitter: DEFAULT_EMITTER.to_string(),
            target_dir: PathBuf::from(DEFAULT_TARGET_DIR),
            json_output: None,
        }
    }
}

/// Cooperative cancellation flag shared with the driver.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; stages notice at their next boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// An in-memory source file with its role, for the file stage.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: String,
    pub role: ContextRole,
    pub text: String,
}

/// Result of a compilation run.
#[derive(Debug)]
pub struct CompileOutput {
    pub diagnostics: Diagnostics,
    pub merge: Option<MergeContext>,
    pub final_data: Option<FinalData>,
}

impl CompileOutput {
    /// True when the pipeline ran to completion without errors.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.final_data.is_some() && !self.diagnostics.has_errors()
    }
}

fn cancelled(diagnostics: &mut Diagnostics, stage: &str) -> CompileOutput {
    diagnostics.push(Diagnostic::error(
        DiagnosticKind::Cancelled,
        format!("compilation cancelled before {stage}"),
    ));
    CompileOutput {
        diagnostics: std::mem::take(diagnostics),
        merge: None,
        final_data: None,
    }
}

/// Runs the pipeline over in-memory sources.
///
/// This is the core entry point; [`compile`] wraps it with file
/// reading. Stages 2-3 are per-file pure, so their loop is safe to
/// parallelize by file; organization onward is sequential because the
/// semantics depend on role precedence and load order.
#[must_use]
pub fn compile_sources(sources: &[SourceUnit], cancel: &CancelFlag) -> CompileOutput {
    let mut diagnostics = Diagnostics::new();

    // Tokenize + parse
    if cancel.is_cancelled() {
        return cancelled(&mut diagnostics, "parsing");
    }
    let mut parsed = Vec::with_capacity(sources.len());
    for source in sources {
        debug!(file = %source.path, role = %source.role, "parsing");
        let expressions = parse_source(&source.path, &source.text, &mut diagnostics);
        parsed.push((source.role, source.path.clone(), expressions));
    }
    if diagnostics.has_errors() {
        return CompileOutput {
            diagnostics,
            merge: None,
            final_data: None,
        };
    }

    // Organize into per-role contexts
    if cancel.is_cancelled() {
        return cancelled(&mut diagnostics, "organization");
    }
    let mut contexts: BTreeMap<ContextRole, Context> = BTreeMap::new();
    for (role, path, expressions) in &parsed {
        contexts
            .entry(*role)
            .or_insert_with(|| Context::new(*role))
            .add_file(path.clone(), expressions, &mut diagnostics);
    }
    if diagnostics.has_errors() {
        return CompileOutput {
            diagnostics,
            merge: None,
            final_data: None,
        };
    }

    // Cross-context merge
    if cancel.is_cancelled() {
        return cancelled(&mut diagnostics, "merge");
    }
    let merge = MergeContext::build(contexts.into_values().collect(), &mut diagnostics);
    if diagnostics.has_errors() {
        return CompileOutput {
            diagnostics,
            merge: Some(merge),
            final_data: None,
        };
    }

    // Finalization aborts on the first error
    if cancel.is_cancelled() {
        return cancelled(&mut diagnostics, "finalization");
    }
    match finalize(&merge, &mut diagnostics) {
        Ok(final_data) => {
            info!(
                layers = final_data.layers.len(),
                triggers = final_data.trigger_macros.len(),
                "compilation finished"
            );
            CompileOutput {
                diagnostics,
                merge: Some(merge),
                final_data: Some(final_data),
            }
        }
        Err(diagnostic) => {
            diagnostics.push(*diagnostic);
            CompileOutput {
                diagnostics,
                merge: Some(merge),
                final_data: None,
            }
        }
    }
}

fn read_role(
    sources: &mut Vec<SourceUnit>,
    paths: &[PathBuf],
    role: ContextRole,
) -> Result<()> {
    for path in paths {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read KLL file: {}", path.display()))?;
        sources.push(SourceUnit {
            path: path.display().to_string(),
            role,
            text,
        });
    }
    Ok(())
}

/// Reads the request's files and runs the pipeline.
///
/// # Errors
///
/// Fails on unreadable input files; compilation problems are reported
/// through the returned diagnostics instead.
pub fn compile(request: &CompileRequest, cancel: &CancelFlag) -> Result<CompileOutput> {
    let mut sources = Vec::new();
    read_role(&mut sources, &request.generic_files, ContextRole::Generic)?;
    read_role(&mut sources, &request.config_files, ContextRole::Configuration)?;
    read_role(&mut sources, &request.base_files, ContextRole::BaseMap)?;
    read_role(&mut sources, &request.default_files, ContextRole::DefaultMap)?;
    for (layer, group) in request.partial_groups.iter().enumerate() {
        read_role(&mut sources, group, ContextRole::PartialMap(layer))?;
    }
    read_role(&mut sources, &request.merge_files, ContextRole::Merge)?;

    Ok(compile_sources(&sources, cancel))
}

/// Writes the requested emitter outputs, returning the paths written.
///
/// # Errors
///
/// Fails on an unknown emitter or filesystem problems.
pub fn write_outputs(
    request: &CompileRequest,
    merge: &MergeContext,
    data: &FinalData,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let outputs = emitters::emit(&request.emitter, merge, data)?;
    if !outputs.is_empty() {
        std::fs::create_dir_all(&request.target_dir).with_context(|| {
            format!(
                "Failed to create target directory: {}",
                request.target_dir.display()
            )
        })?;
    }
    for output in outputs {
        let path = request.target_dir.join(&output.filename);
        write_file(&path, &output.content)?;
        written.push(path);
    }

    // The JSON dump can be requested alongside any emitter
    if let Some(json_path) = &request.json_output {
        if let Some(parent) = json_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }
        let content = emitters::json::emit(merge, data)?;
        write_file(json_path, &content)?;
        written.push(json_path.clone());
    }

    Ok(written)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write output file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(path: &str, role: ContextRole, text: &str) -> SourceUnit {
        SourceUnit {
            path: path.to_string(),
            role,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_compile_sources_end_to_end() {
        let sources = [
            unit("base.kll", ContextRole::BaseMap, "S0x10 : U\"A\";"),
            unit("default.kll", ContextRole::DefaultMap, "S0x10 :+ U\"B\";"),
        ];
        let output = compile_sources(&sources, &CancelFlag::new());
        assert!(output.succeeded(), "{}", output.diagnostics);

        let data = output.final_data.unwrap();
        assert_eq!(data.layers.len(), 1);
        assert_eq!(data.result_macros[0].text, "U\"A\", U\"B\"");
    }

    #[test]
    fn test_parse_errors_stop_before_merge() {
        let sources = [unit("bad.kll", ContextRole::BaseMap, "U\"A\" :;")];
        let output = compile_sources(&sources, &CancelFlag::new());
        assert!(!output.succeeded());
        assert!(output.merge.is_none());
        assert_eq!(output.diagnostics.exit_code(), 1);
    }

    #[test]
    fn test_cancellation_reports_cancelled() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let sources = [unit("base.kll", ContextRole::BaseMap, "S0x10 : U\"A\";")];
        let output = compile_sources(&sources, &cancel);
        assert!(!output.succeeded());
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Cancelled));
    }

    #[test]
    fn test_partial_groups_become_layers() {
        let sources = [
            unit("base.kll", ContextRole::BaseMap, "S0x10 : U\"A\";"),
            unit("l1.kll", ContextRole::PartialMap(0), "S0x10 : U\"B\";"),
            unit("l2.kll", ContextRole::PartialMap(1), "S0x10 : U\"C\";"),
        ];
        let output = compile_sources(&sources, &CancelFlag::new());
        let data = output.final_data.unwrap();
        assert_eq!(data.layers.len(), 3);
    }

    #[test]
    fn test_determinism_across_runs() {
        let sources = [
            unit("config.kll", ContextRole::Configuration, "Name = \"kb\";"),
            unit(
                "base.kll",
                ContextRole::BaseMap,
                "S[0x10-0x1F] : U\"A\";\nS0x12 : U\"B\";",
            ),
            unit("l1.kll", ContextRole::PartialMap(0), "S0x10 :+ U\"C\";"),
        ];
        let first = compile_sources(&sources, &CancelFlag::new());
        let second = compile_sources(&sources, &CancelFlag::new());
        assert_eq!(
            serde_json::to_string(&first.final_data.unwrap()).unwrap(),
            serde_json::to_string(&second.final_data.unwrap()).unwrap()
        );
    }
}
