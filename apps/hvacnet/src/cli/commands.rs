//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::{OutputFormat, PromptHandler};
use hvacnet_core::{
    Answer, CanonicalNetwork, DecisionBook, DefaultsHandler, HvacError, HvacGraph,
    NetworkDocument, NetworkMetrics, Reducer, ReductionConfig, ReductionReport, ReplayHandler,
    export_canonical, formats::MAX_DOCUMENT_SIZE, import_canonical,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a configuration file (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Maximum size of an answer log (16 MB).
const MAX_ANSWERS_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Maximum size of a canonical export read back for verification (500 MB).
const MAX_CANONICAL_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), HvacError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| HvacError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(HvacError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and make sure it names a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, HvacError> {
    let canonical = path.canonicalize().map_err(|e| {
        HvacError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(HvacError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent directory of an output path.
fn validate_output_path(path: &Path) -> Result<PathBuf, HvacError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        HvacError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(HvacError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| HvacError::Io("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn read_limited(path: &Path, max_size: u64) -> Result<Vec<u8>, HvacError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, max_size)?;
    std::fs::read(&validated).map_err(|e| HvacError::Io(format!("Read file: {}", e)))
}

fn write_output(path: &Path, data: &[u8]) -> Result<PathBuf, HvacError> {
    let validated = validate_output_path(path)?;
    std::fs::write(&validated, data).map_err(|e| HvacError::Io(format!("Write file: {}", e)))?;
    Ok(validated)
}

// =============================================================================
// LOADING
// =============================================================================

/// Load a network document and build its graph.
pub fn load_network(path: &Path) -> Result<HvacGraph, HvacError> {
    let data = read_limited(path, MAX_DOCUMENT_SIZE as u64)?;
    let network = NetworkDocument::from_slice(&data)?.into_network()?;
    let graph = HvacGraph::build(network)?;
    info!(
        elements = graph.element_count(),
        path = %path.display(),
        "loaded network"
    );
    Ok(graph)
}

/// Load a TOML configuration, or the defaults when no path is given.
///
/// Missing keys keep their default values.
pub fn load_config(path: Option<&Path>) -> Result<ReductionConfig, HvacError> {
    let Some(path) = path else {
        return Ok(ReductionConfig::default());
    };
    let data = read_limited(path, MAX_CONFIG_FILE_SIZE)?;
    let text = String::from_utf8(data)
        .map_err(|e| HvacError::Config(format!("{}: {}", path.display(), e)))?;
    let config: ReductionConfig = toml::from_str(&text)
        .map_err(|e| HvacError::Config(format!("{}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Load a recorded answer log: a JSON object from decision key to answer.
pub fn load_answers(path: &Path) -> Result<BTreeMap<String, Answer>, HvacError> {
    let data = read_limited(path, MAX_ANSWERS_FILE_SIZE)?;
    serde_json::from_slice(&data)
        .map_err(|e| HvacError::Serialization(format!("{}: {}", path.display(), e)))
}

// =============================================================================
// REDUCTION
// =============================================================================

/// Arguments shared by `reduce` and `checksum`.
#[derive(Debug, Clone)]
pub struct ReduceArgs {
    pub input: PathBuf,
    pub config: Option<PathBuf>,
    pub answers: Option<PathBuf>,
    pub record: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub passes: usize,
    pub non_interactive: bool,
}

/// A finished reduction.
#[derive(Debug)]
pub struct Reduction {
    pub graph: HvacGraph,
    pub reports: Vec<ReductionReport>,
    pub book: DecisionBook,
}

/// Load, configure and reduce a network.
///
/// Recorded answers are replayed first. Open questions go to the
/// terminal, or to their defaults with `non_interactive`.
pub fn reduce_network(args: &ReduceArgs) -> Result<Reduction, HvacError> {
    let config = load_config(args.config.as_deref())?;
    let recorded = match &args.answers {
        Some(path) => load_answers(path)?,
        None => BTreeMap::new(),
    };
    let mut graph = load_network(&args.input)?;
    let mut reducer = Reducer::new(config);
    let passes = args.passes.max(1);

    let reports = if args.non_interactive {
        let mut handler = ReplayHandler::new(recorded, DefaultsHandler);
        reducer.run_until_stable(&mut graph, &mut handler, passes)?
    } else {
        let stdin = std::io::stdin();
        let mut handler =
            ReplayHandler::new(recorded, PromptHandler::new(stdin.lock(), std::io::stderr()));
        reducer.run_until_stable(&mut graph, &mut handler, passes)?
    };

    Ok(Reduction {
        graph,
        reports,
        book: reducer.into_book(),
    })
}

#[derive(Debug, Serialize)]
struct ReduceSummary<'a> {
    reports: &'a [ReductionReport],
    elements: usize,
    checksum: String,
    decisions: &'a BTreeMap<String, Answer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

// =============================================================================
// REDUCE COMMAND
// =============================================================================

/// Reduce a network, print the report and write the requested outputs.
pub fn cmd_reduce(args: &ReduceArgs, json_mode: bool) -> Result<(), HvacError> {
    let reduction = reduce_network(args)?;
    let canonical = CanonicalNetwork::from_graph(&reduction.graph);
    let checksum = canonical.checksum()?;

    if let Some(path) = &args.record {
        let data = serde_json::to_vec_pretty(reduction.book.answers())
            .map_err(|e| HvacError::Serialization(e.to_string()))?;
        let written = write_output(path, &data)?;
        info!(answers = reduction.book.len(), path = %written.display(), "recorded answers");
    }

    let output = match &args.output {
        Some(path) => {
            let data = match args.format {
                OutputFormat::Json => serde_json::to_vec_pretty(&canonical)
                    .map_err(|e| HvacError::Serialization(e.to_string()))?,
                OutputFormat::Document => canonical.to_document().to_json()?.into_bytes(),
                OutputFormat::Canonical => export_canonical(&reduction.graph)?,
            };
            let written = write_output(path, &data)?;
            info!(bytes = data.len(), path = %written.display(), "wrote reduced network");
            Some(written)
        }
        None => None,
    };

    if json_mode {
        let summary = ReduceSummary {
            reports: &reduction.reports,
            elements: reduction.graph.element_count(),
            checksum,
            decisions: reduction.book.answers(),
            output: output.map(|p| p.display().to_string()),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).unwrap_or_default()
        );
        return Ok(());
    }

    for (index, report) in reduction.reports.iter().enumerate() {
        if reduction.reports.len() > 1 {
            println!("Pass {}", index + 1);
        }
        println!("{}", report);
        println!();
    }
    println!("Elements: {}", reduction.graph.element_count());
    println!("Checksum: {}", checksum);
    if let Some(path) = output {
        println!("Output:   {}", path.display());
    }

    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Show structural metrics of a network without reducing it.
pub fn cmd_inspect(
    input: &Path,
    config: Option<&Path>,
    json_mode: bool,
) -> Result<(), HvacError> {
    let config = load_config(config)?;
    let graph = load_network(input)?;
    let metrics = NetworkMetrics::of(&graph, &config);

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&metrics).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Network: {}", input.display());
    println!("==================");
    println!("Elements:    {}", metrics.elements);
    println!("Connections: {}", metrics.connections);
    println!("Cycles:      {}", metrics.cycles);
    println!("Components:  {}", metrics.connected_components);
    println!();
    println!("Elements per kind:");
    for (kind, count) in &metrics.per_kind {
        println!("  {:<34} {:>6}", kind.ifc_classification(), count);
    }
    println!();
    println!("Candidates per pattern:");
    for (pattern, count) in &metrics.candidates {
        println!("  {:<34} {:>6}", pattern.name(), count);
    }

    Ok(())
}

// =============================================================================
// CHECKSUM COMMAND
// =============================================================================

/// Reduce a network and print the replay checksum.
///
/// With `verify`, the checksum is compared against a canonical export and
/// a mismatch is an error.
pub fn cmd_checksum(
    args: &ReduceArgs,
    verify: Option<&Path>,
    json_mode: bool,
) -> Result<(), HvacError> {
    let reduction = reduce_network(args)?;
    let checksum = CanonicalNetwork::from_graph(&reduction.graph).checksum()?;

    let verified = match verify {
        Some(path) => {
            let data = read_limited(path, MAX_CANONICAL_FILE_SIZE)?;
            let expected = import_canonical(&data)?.checksum()?;
            if expected != checksum {
                return Err(HvacError::Serialization(format!(
                    "Checksum mismatch: {} computed, {} in {}",
                    checksum,
                    expected,
                    path.display()
                )));
            }
            true
        }
        None => false,
    };

    if json_mode {
        let output = serde_json::json!({
            "checksum": checksum,
            "verified": verified,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!("{}", checksum);
        if verified {
            println!("Verified");
        }
    }

    Ok(())
}
