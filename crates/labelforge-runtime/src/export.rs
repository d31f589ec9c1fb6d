//! Line-delimited interchange: sample import and lossless export.

use serde::{Deserialize, Serialize};
use tracing::info;

use labelforge_core::{Error, Result};
use labelforge_select::token_signature;
use labelforge_store::{AnnotationSource, AuditEntry, SampleStatus, SqliteStore};

/// One exported sample: identity, authoritative label, and full
/// provenance. Field order is fixed, rows are ordered by sample id, so an
/// unchanged project exports byte-identically every time.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportRecord {
    pub sample_id: i64,
    pub content_ref: String,
    pub status: SampleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<AnnotationSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub audit: Vec<AuditEntry>,
}

/// One imported sample line.
#[derive(Debug, Deserialize)]
pub struct ImportRecord {
    pub content_ref: String,
}

/// Export a project as JSONL, one sample per line.
pub fn export_project(store: &SqliteStore, project_id: i64) -> Result<String> {
    if store.get_project(project_id)?.is_none() {
        return Err(Error::NotFound(format!("project {}", project_id)));
    }

    let samples = store.samples_for_project(project_id)?;
    let mut out = String::new();
    for sample in samples {
        let authoritative = store.authoritative_annotation(sample.id)?;
        let record = ExportRecord {
            sample_id: sample.id,
            content_ref: sample.content_ref,
            status: sample.status,
            label: authoritative.as_ref().map(|a| a.label.clone()),
            source: authoritative.as_ref().map(|a| a.source),
            confidence: authoritative.as_ref().and_then(|a| a.confidence),
            audit: store.audit_history(sample.id)?,
        };
        out.push_str(&serde_json::to_string(&record)?);
        out.push('\n');
    }
    Ok(out)
}

/// Import samples from JSONL. Each line is an [`ImportRecord`]; blank
/// lines are ignored. Returns the new sample ids.
pub fn import_jsonl(
    store: &SqliteStore,
    project_id: i64,
    payload: &str,
    actor: &str,
) -> Result<Vec<i64>> {
    if store.get_project(project_id)?.is_none() {
        return Err(Error::NotFound(format!("project {}", project_id)));
    }

    let mut ids = Vec::new();
    for line in payload.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: ImportRecord = serde_json::from_str(line)?;
        let signature = token_signature(&record.content_ref);
        let id = store.add_sample(project_id, &record.content_ref, Some(&signature), actor)?;
        ids.push(id);
    }
    info!("Imported {} samples into project {}", ids.len(), project_id);
    Ok(ids)
}
