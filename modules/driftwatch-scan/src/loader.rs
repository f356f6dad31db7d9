use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use driftwatch_common::{canonicalize_url, DriftwatchError, Target};

/// Targets resolved from a source reference, plus a provenance label for
/// history rows and notifications.
#[derive(Debug, Clone)]
pub struct LoadedTargets {
    pub targets: Vec<Target>,
    pub source_label: String,
}

/// Resolves a target-source reference (a file path or an inline
/// comma-separated list) into deduplicated, canonicalized targets.
#[derive(Debug, Default)]
pub struct TargetLoader;

impl TargetLoader {
    pub fn new() -> Self {
        Self
    }

    pub async fn load_and_select(&self, reference: &str) -> Result<LoadedTargets, DriftwatchError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(DriftwatchError::Validation(
                "target source reference is empty".into(),
            ));
        }

        let path = Path::new(reference);
        let (lines, source_label, from_file) = if path.is_file() {
            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                DriftwatchError::Validation(format!(
                    "cannot read target file {}: {e}",
                    path.display()
                ))
            })?;
            let label = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| reference.to_string());
            let lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();
            (lines, label, true)
        } else {
            let lines: Vec<String> = reference.split(',').map(|l| l.to_string()).collect();
            (lines, "inline".to_string(), false)
        };

        let targets = normalize_lines(&lines, from_file);

        if targets.is_empty() {
            return Err(DriftwatchError::Validation(format!(
                "no valid targets in source '{reference}'"
            )));
        }

        debug!(count = targets.len(), source = %source_label, "Targets loaded");
        Ok(LoadedTargets {
            targets,
            source_label,
        })
    }
}

fn normalize_lines(lines: &[String], from_file: bool) -> Vec<Target> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut targets = Vec::new();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if from_file && (line.starts_with('#') || line.starts_with("//")) {
            continue;
        }
        if !line.starts_with("http://") && !line.starts_with("https://") {
            warn!(line = %line, "Skipping target without http(s) scheme");
            continue;
        }
        let normalized = match canonicalize_url(line) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(line = %line, error = %e, "Skipping unparseable target URL");
                continue;
            }
        };
        if seen.insert(normalized.clone()) {
            targets.push(Target::new(line, normalized));
        }
    }

    targets
}
