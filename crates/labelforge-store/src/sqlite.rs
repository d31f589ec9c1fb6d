//! SQLite-backed store for the annotation pipeline.
//!
//! Single writer per sample is enforced through the `sample_leases` table;
//! every status transition commits together with its audit entry, so a
//! decision without its mutation can never be observed after a crash.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::schema::SCHEMA_SQL;
use crate::types::*;
use labelforge_core::{Error, ProjectPolicy, Result};

/// SQLite store with WAL journaling and cached statements.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the store. `db_dir` is the data directory; the file
    /// will be `db_dir/labelforge.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let db_path = db_dir.join("labelforge.db");

        let conn = Connection::open(&db_path)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        let stats = store.stats()?;
        info!(
            "SqliteStore initialized: {} projects, {} samples, path={}",
            stats.total_projects,
            stats.total_samples,
            store.db_path.display()
        );

        Ok(store)
    }

    // ---------------------------------------------------------------
    // Projects
    // ---------------------------------------------------------------

    /// Insert a project. Returns the new project ID.
    pub fn create_project(&self, project: NewProject) -> Result<i64> {
        let schema_json = serde_json::to_string(&project.label_schema)?;
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO projects
                 (name, task_type, label_schema, confidence_threshold,
                  require_double_annotation, agreement_threshold, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .insert(params![
                project.name,
                project.task_type.as_str(),
                schema_json,
                project.confidence_threshold,
                project.require_double_annotation,
                project.agreement_threshold,
                now_millis(),
            ])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(id)
    }

    /// Get a project by ID.
    pub fn get_project(&self, project_id: i64) -> Result<Option<Project>> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached("SELECT * FROM projects WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![project_id], row_to_project)
            .optional()
            .map_err(|e| Error::Database(e.to_string()));
        result
    }

    /// List all projects, newest first.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM projects ORDER BY id DESC")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_project)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Snapshot the routing/QA policy of a project for a batch.
    pub fn project_policy(&self, project_id: i64) -> Result<ProjectPolicy> {
        let project = self
            .get_project(project_id)?
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))?;
        Ok(ProjectPolicy {
            project_id: project.id,
            confidence_threshold: project.confidence_threshold,
            require_double_annotation: project.require_double_annotation,
            agreement_threshold: project.agreement_threshold,
            label_schema: project.label_schema,
            policy_version: project.policy_version,
        })
    }

    /// Update threshold/QA policy. The label schema is immutable; each
    /// update bumps `policy_version` so audit entries can name the policy
    /// they were made under.
    pub fn update_project_policy(
        &self,
        project_id: i64,
        confidence_threshold: Option<f64>,
        require_double_annotation: Option<bool>,
        agreement_threshold: Option<f64>,
    ) -> Result<Project> {
        {
            let conn = self.conn.lock();
            let updated = conn
                .prepare_cached(
                    "UPDATE projects SET
                         confidence_threshold = COALESCE(?2, confidence_threshold),
                         require_double_annotation = COALESCE(?3, require_double_annotation),
                         agreement_threshold = COALESCE(?4, agreement_threshold),
                         policy_version = policy_version + 1
                     WHERE id = ?1",
                )
                .map_err(|e| Error::Database(e.to_string()))?
                .execute(params![
                    project_id,
                    confidence_threshold,
                    require_double_annotation,
                    agreement_threshold,
                ])
                .map_err(|e| Error::Database(e.to_string()))?;
            if updated == 0 {
                return Err(Error::NotFound(format!("project {}", project_id)));
            }
        }
        self.get_project(project_id)?
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))
    }

    // ---------------------------------------------------------------
    // Samples
    // ---------------------------------------------------------------

    /// Insert a sample in status `unlabeled`, writing its `imported` audit
    /// entry in the same transaction.
    pub fn add_sample(
        &self,
        project_id: i64,
        content_ref: &str,
        signature: Option<&str>,
        actor: &str,
    ) -> Result<i64> {
        let policy_version = self.policy_version(project_id)?;
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;
        let now = now_millis();
        let sample_id = tx
            .prepare_cached(
                "INSERT INTO samples (project_id, content_ref, signature, status, created_at)
                 VALUES (?1, ?2, ?3, 'unlabeled', ?4)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .insert(params![project_id, content_ref, signature, now])
            .map_err(|e| Error::Database(e.to_string()))?;
        insert_audit(
            &tx,
            &NewAuditEntry {
                sample_id,
                decision: DecisionKind::Imported,
                actor: actor.to_string(),
                confidence: None,
                context_hash: None,
                policy_version,
                resulting_status: SampleStatus::Unlabeled,
                detail: None,
            },
            now,
        )?;
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        Ok(sample_id)
    }

    /// Get a sample by ID.
    pub fn get_sample(&self, sample_id: i64) -> Result<Option<Sample>> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached("SELECT * FROM samples WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![sample_id], row_to_sample)
            .optional()
            .map_err(|e| Error::Database(e.to_string()));
        result
    }

    /// Samples of a project in a given status, ordered by id.
    pub fn samples_by_status(
        &self,
        project_id: i64,
        status: SampleStatus,
    ) -> Result<Vec<Sample>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM samples WHERE project_id = ?1 AND status = ?2 ORDER BY id ASC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![project_id, status.as_str()], row_to_sample)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    /// All samples of a project ordered by id (export order).
    pub fn samples_for_project(&self, project_id: i64) -> Result<Vec<Sample>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM samples WHERE project_id = ?1 ORDER BY id ASC")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![project_id], row_to_sample)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Unlabeled samples with their most recent model confidence, for the
    /// selector. One row per sample, ordered by id for determinism.
    pub fn selection_candidates(&self, project_id: i64) -> Result<Vec<SelectionCandidate>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT s.id, s.signature,
                        (SELECT a.confidence FROM annotations a
                         WHERE a.sample_id = s.id AND a.source = 'model'
                         ORDER BY a.created_at DESC, a.id DESC LIMIT 1)
                 FROM samples s
                 WHERE s.project_id = ?1 AND s.status = 'unlabeled'
                 ORDER BY s.id ASC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(SelectionCandidate {
                    sample_id: row.get(0)?,
                    signature: row.get(1)?,
                    last_confidence: row.get(2)?,
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Apply a status transition together with its audit entry, atomically.
    /// Returns the audit entry id.
    pub fn transition_sample(
        &self,
        sample_id: i64,
        status: SampleStatus,
        entry: &NewAuditEntry,
    ) -> Result<i64> {
        debug_assert_eq!(entry.resulting_status, status);
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;
        let now = now_millis();
        let updated = tx
            .prepare_cached("UPDATE samples SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![sample_id, status.as_str(), now])
            .map_err(|e| Error::Database(e.to_string()))?;
        if updated == 0 {
            return Err(Error::NotFound(format!("sample {}", sample_id)));
        }
        let audit_id = insert_audit(&tx, entry, now)?;
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        debug!(
            "Sample {} -> {} (audit {})",
            sample_id,
            status.as_str(),
            audit_id
        );
        Ok(audit_id)
    }

    /// Route a sample to human review: the status change, its audit entry,
    /// and the review task commit together, so an open task exists exactly
    /// when the sample is pending review. Returns (audit id, task id).
    pub fn route_to_review(&self, sample_id: i64, entry: &NewAuditEntry) -> Result<(i64, i64)> {
        debug_assert_eq!(entry.resulting_status, SampleStatus::PendingReview);
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;
        let now = now_millis();
        let updated = tx
            .prepare_cached(
                "UPDATE samples SET status = 'pendingreview', updated_at = ?2 WHERE id = ?1",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![sample_id, now])
            .map_err(|e| Error::Database(e.to_string()))?;
        if updated == 0 {
            return Err(Error::NotFound(format!("sample {}", sample_id)));
        }
        let audit_id = insert_audit(&tx, entry, now)?;
        let task_id = tx
            .prepare_cached("INSERT INTO review_tasks (sample_id, created_at) VALUES (?1, ?2)")
            .map_err(|e| Error::Database(e.to_string()))?
            .insert(params![sample_id, now])
            .map_err(|e| Error::Database(e.to_string()))?;
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        Ok((audit_id, task_id))
    }

    /// Resolve the open review task for a sample and transition the sample
    /// out of pending review in one commit. Returns the audit entry id.
    pub fn resolve_review(
        &self,
        task_id: i64,
        reviewer: &str,
        outcome: &str,
        status: SampleStatus,
        entry: &NewAuditEntry,
    ) -> Result<i64> {
        debug_assert_eq!(entry.resulting_status, status);
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;
        let now = now_millis();
        let resolved = tx
            .prepare_cached(
                "UPDATE review_tasks SET reviewer = ?2, outcome = ?3, resolved_at = ?4
                 WHERE id = ?1 AND resolved_at IS NULL",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![task_id, reviewer, outcome, now])
            .map_err(|e| Error::Database(e.to_string()))?;
        if resolved == 0 {
            return Err(Error::NotFound(format!("open review task {}", task_id)));
        }
        tx.prepare_cached("UPDATE samples SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![entry.sample_id, status.as_str(), now])
            .map_err(|e| Error::Database(e.to_string()))?;
        let audit_id = insert_audit(&tx, entry, now)?;
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        Ok(audit_id)
    }

    // ---------------------------------------------------------------
    // Leases
    // ---------------------------------------------------------------

    /// Acquire the per-sample processing lease. Exactly one caller wins;
    /// everyone else gets `ConcurrencyConflict`.
    pub fn acquire_lease(&self, sample_id: i64, owner: &str) -> Result<()> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached(
                "INSERT INTO sample_leases (sample_id, owner, acquired_at) VALUES (?1, ?2, ?3)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![sample_id, owner, now_millis()]);
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("UNIQUE constraint") => {
                Err(Error::ConcurrencyConflict(sample_id))
            }
            Err(e) => Err(Error::Database(e.to_string())),
        }
    }

    /// Release a lease. Only the owner's lease is removed.
    pub fn release_lease(&self, sample_id: i64, owner: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached("DELETE FROM sample_leases WHERE sample_id = ?1 AND owner = ?2")
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![sample_id, owner])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Annotations
    // ---------------------------------------------------------------

    /// Insert an annotation. Human annotations never carry confidence.
    pub fn add_annotation(&self, annotation: &NewAnnotation) -> Result<i64> {
        let confidence = match annotation.source {
            AnnotationSource::Model => annotation.confidence,
            AnnotationSource::Human => None,
        };
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO annotations (sample_id, label, source, confidence, producer, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .insert(params![
                annotation.sample_id,
                annotation.label,
                annotation.source.as_str(),
                confidence,
                annotation.producer,
                now_millis(),
            ])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(id)
    }

    /// Mark one annotation authoritative, clearing any previous one for the
    /// sample in the same transaction.
    pub fn set_authoritative(&self, sample_id: i64, annotation_id: i64) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;
        tx.prepare_cached("UPDATE annotations SET authoritative = 0 WHERE sample_id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![sample_id])
            .map_err(|e| Error::Database(e.to_string()))?;
        let updated = tx
            .prepare_cached(
                "UPDATE annotations SET authoritative = 1 WHERE id = ?1 AND sample_id = ?2",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .execute(params![annotation_id, sample_id])
            .map_err(|e| Error::Database(e.to_string()))?;
        if updated == 0 {
            return Err(Error::NotFound(format!(
                "annotation {} on sample {}",
                annotation_id, sample_id
            )));
        }
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// All annotations for a sample, oldest first.
    pub fn annotations_for_sample(&self, sample_id: i64) -> Result<Vec<Annotation>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM annotations WHERE sample_id = ?1 ORDER BY created_at ASC, id ASC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![sample_id], row_to_annotation)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    /// The sample's authoritative annotation, if any.
    pub fn authoritative_annotation(&self, sample_id: i64) -> Result<Option<Annotation>> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached(
                "SELECT * FROM annotations WHERE sample_id = ?1 AND authoritative = 1",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![sample_id], row_to_annotation)
            .optional()
            .map_err(|e| Error::Database(e.to_string()));
        result
    }

    // ---------------------------------------------------------------
    // Review tasks
    // ---------------------------------------------------------------

    /// Create a review task for a sample.
    pub fn create_review_task(&self, sample_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached("INSERT INTO review_tasks (sample_id, created_at) VALUES (?1, ?2)")
            .map_err(|e| Error::Database(e.to_string()))?
            .insert(params![sample_id, now_millis()])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(id)
    }

    /// The open (unresolved) review task for a sample, if any.
    pub fn open_review_task(&self, sample_id: i64) -> Result<Option<ReviewTask>> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached(
                "SELECT * FROM review_tasks WHERE sample_id = ?1 AND resolved_at IS NULL
             ORDER BY id DESC LIMIT 1",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![sample_id], row_to_review_task)
            .optional()
            .map_err(|e| Error::Database(e.to_string()));
        result
    }

    /// Get a review task by ID.
    pub fn get_review_task(&self, task_id: i64) -> Result<Option<ReviewTask>> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached("SELECT * FROM review_tasks WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![task_id], row_to_review_task)
            .optional()
            .map_err(|e| Error::Database(e.to_string()));
        result
    }

    /// All open review tasks, oldest first.
    pub fn open_review_tasks(&self) -> Result<Vec<ReviewTask>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM review_tasks WHERE resolved_at IS NULL ORDER BY id ASC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_review_task)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Resolve a review task. Terminal: resolving twice is an error.
    pub fn resolve_review_task(
        &self,
        task_id: i64,
        reviewer: &str,
        outcome: &str,
    ) -> Result<ReviewTask> {
        {
            let conn = self.conn.lock();
            let updated = conn
                .prepare_cached(
                    "UPDATE review_tasks SET reviewer = ?2, outcome = ?3, resolved_at = ?4
                     WHERE id = ?1 AND resolved_at IS NULL",
                )
                .map_err(|e| Error::Database(e.to_string()))?
                .execute(params![task_id, reviewer, outcome, now_millis()])
                .map_err(|e| Error::Database(e.to_string()))?;
            if updated == 0 {
                return Err(Error::NotFound(format!(
                    "open review task {}",
                    task_id
                )));
            }
        }
        self.get_review_task(task_id)?
            .ok_or_else(|| Error::NotFound(format!("review task {}", task_id)))
    }

    // ---------------------------------------------------------------
    // Context snapshots
    // ---------------------------------------------------------------

    /// Store a context snapshot once, keyed by content hash. Returns the
    /// snapshot id whether it was just inserted or already present.
    pub fn put_context_snapshot(
        &self,
        content_hash: &str,
        entities: &serde_json::Value,
    ) -> Result<i64> {
        let entities_json = serde_json::to_string(entities)?;
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT OR IGNORE INTO context_snapshots (content_hash, entities_json, created_at)
             VALUES (?1, ?2, ?3)",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![content_hash, entities_json, now_millis()])
        .map_err(|e| Error::Database(e.to_string()))?;
        let result = conn
            .prepare_cached("SELECT id FROM context_snapshots WHERE content_hash = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![content_hash], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()));
        result
    }

    /// Fetch a context snapshot by hash.
    pub fn get_context_snapshot(&self, content_hash: &str) -> Result<Option<ContextSnapshot>> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached("SELECT * FROM context_snapshots WHERE content_hash = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![content_hash], |row| {
                let entities_json: String = row.get("entities_json")?;
                Ok(ContextSnapshot {
                    id: row.get("id")?,
                    content_hash: row.get("content_hash")?,
                    entities: serde_json::from_str(&entities_json).unwrap_or_default(),
                    created_at: row.get("created_at")?,
                })
            })
            .optional()
            .map_err(|e| Error::Database(e.to_string()));
        result
    }

    // ---------------------------------------------------------------
    // Audit ledger
    // ---------------------------------------------------------------

    /// Append an audit entry outside a status transition (imports and
    /// transitions use their own transactional paths).
    pub fn append_audit(&self, entry: &NewAuditEntry) -> Result<i64> {
        let conn = self.conn.lock();
        insert_audit(&conn, entry, now_millis())
    }

    /// Full provenance for a sample, ordered by timestamp then entry id.
    pub fn audit_history(&self, sample_id: i64) -> Result<Vec<AuditEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM audit_log WHERE sample_id = ?1 ORDER BY created_at ASC, id ASC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![sample_id], row_to_audit_entry)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    // ---------------------------------------------------------------
    // Quality metrics
    // ---------------------------------------------------------------

    /// Append a quality metric snapshot. Snapshots are never mutated.
    pub fn append_quality_metric(
        &self,
        project_id: i64,
        window_size: i64,
        agreement_score: f64,
        flag_count: i64,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO quality_metrics
                 (project_id, window_size, agreement_score, flag_count, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .insert(params![
                project_id,
                window_size,
                agreement_score,
                flag_count,
                now_millis(),
            ])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(id)
    }

    /// Latest quality metric snapshot for a project.
    pub fn latest_quality_metric(&self, project_id: i64) -> Result<Option<QualityMetric>> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached(
                "SELECT * FROM quality_metrics WHERE project_id = ?1
             ORDER BY computed_at DESC, id DESC LIMIT 1",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![project_id], row_to_quality_metric)
            .optional()
            .map_err(|e| Error::Database(e.to_string()));
        result
    }

    /// IDs of the most recently decided samples, for the QA sliding window.
    pub fn recent_decided_samples(&self, project_id: i64, window: usize) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id FROM samples
                 WHERE project_id = ?1
                   AND status IN ('autolabeled', 'pendingreview', 'reviewed', 'rejected')
                 ORDER BY updated_at DESC, id DESC LIMIT ?2",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![project_id, window as i64], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows)
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    /// Store-level statistics for the health surface.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> Result<i64> {
            conn.prepare_cached(sql)
                .map_err(|e| Error::Database(e.to_string()))?
                .query_row([], |row| row.get(0))
                .map_err(|e| Error::Database(e.to_string()))
        };
        let total_projects = count("SELECT COUNT(*) FROM projects")?;
        let total_samples = count("SELECT COUNT(*) FROM samples")?;
        let total_annotations = count("SELECT COUNT(*) FROM annotations")?;
        let open_review_tasks =
            count("SELECT COUNT(*) FROM review_tasks WHERE resolved_at IS NULL")?;
        let audit_entries = count("SELECT COUNT(*) FROM audit_log")?;
        let db_size_mb = std::fs::metadata(&self.db_path)
            .map(|m| m.len() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0);
        Ok(StoreStats {
            total_projects,
            total_samples,
            total_annotations,
            open_review_tasks,
            audit_entries,
            db_path: self.db_path.display().to_string(),
            db_size_mb,
        })
    }

    fn policy_version(&self, project_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached("SELECT policy_version FROM projects WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![project_id], |row| row.get(0))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)));
        result
    }
}

fn insert_audit(conn: &Connection, entry: &NewAuditEntry, now: i64) -> Result<i64> {
    conn.prepare_cached(
        "INSERT INTO audit_log
         (sample_id, decision, actor, confidence, context_hash, policy_version,
          resulting_status, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .map_err(|e| Error::Database(e.to_string()))?
    .insert(params![
        entry.sample_id,
        entry.decision.as_str(),
        entry.actor,
        entry.confidence,
        entry.context_hash,
        entry.policy_version,
        entry.resulting_status.as_str(),
        entry.detail,
        now,
    ])
    .map_err(|e| Error::StorageUnavailable(e.to_string()))
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ---------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------

fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
    let task_type: String = row.get("task_type")?;
    let schema_json: String = row.get("label_schema")?;
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        task_type: TaskType::parse(&task_type).unwrap_or(TaskType::Classification),
        label_schema: serde_json::from_str(&schema_json).unwrap_or_default(),
        confidence_threshold: row.get("confidence_threshold")?,
        require_double_annotation: row.get("require_double_annotation")?,
        agreement_threshold: row.get("agreement_threshold")?,
        policy_version: row.get("policy_version")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_sample(row: &Row) -> rusqlite::Result<Sample> {
    let status: String = row.get("status")?;
    Ok(Sample {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        content_ref: row.get("content_ref")?,
        signature: row.get("signature")?,
        status: SampleStatus::parse(&status).unwrap_or(SampleStatus::Unlabeled),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_annotation(row: &Row) -> rusqlite::Result<Annotation> {
    let source: String = row.get("source")?;
    Ok(Annotation {
        id: row.get("id")?,
        sample_id: row.get("sample_id")?,
        label: row.get("label")?,
        source: AnnotationSource::parse(&source).unwrap_or(AnnotationSource::Model),
        confidence: row.get("confidence")?,
        producer: row.get("producer")?,
        authoritative: row.get("authoritative")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_review_task(row: &Row) -> rusqlite::Result<ReviewTask> {
    Ok(ReviewTask {
        id: row.get("id")?,
        sample_id: row.get("sample_id")?,
        reviewer: row.get("reviewer")?,
        created_at: row.get("created_at")?,
        resolved_at: row.get("resolved_at")?,
        outcome: row.get("outcome")?,
    })
}

fn row_to_audit_entry(row: &Row) -> rusqlite::Result<AuditEntry> {
    let decision: String = row.get("decision")?;
    let status: String = row.get("resulting_status")?;
    Ok(AuditEntry {
        id: row.get("id")?,
        sample_id: row.get("sample_id")?,
        decision: DecisionKind::parse(&decision).unwrap_or(DecisionKind::Imported),
        actor: row.get("actor")?,
        confidence: row.get("confidence")?,
        context_hash: row.get("context_hash")?,
        policy_version: row.get("policy_version")?,
        resulting_status: SampleStatus::parse(&status).unwrap_or(SampleStatus::Unlabeled),
        detail: row.get("detail")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_quality_metric(row: &Row) -> rusqlite::Result<QualityMetric> {
    Ok(QualityMetric {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        window_size: row.get("window_size")?,
        agreement_score: row.get("agreement_score")?,
        flag_count: row.get("flag_count")?,
        computed_at: row.get("computed_at")?,
    })
}
