//! Database schema SQL.

/// Core tables: projects, samples, annotations, review tasks, context
/// snapshots, quality metrics, audit ledger, sample leases.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    task_type TEXT NOT NULL,
    label_schema TEXT NOT NULL,
    confidence_threshold REAL NOT NULL,
    require_double_annotation INTEGER NOT NULL DEFAULT 0,
    agreement_threshold REAL NOT NULL,
    policy_version INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    content_ref TEXT NOT NULL,
    signature TEXT,
    status TEXT NOT NULL DEFAULT 'unlabeled',
    created_at INTEGER NOT NULL,
    updated_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_samples_project_status ON samples(project_id, status);

CREATE TABLE IF NOT EXISTS annotations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_id INTEGER NOT NULL REFERENCES samples(id) ON DELETE CASCADE,
    label TEXT NOT NULL,
    source TEXT NOT NULL,
    confidence REAL,
    producer TEXT NOT NULL,
    authoritative INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_annotations_sample ON annotations(sample_id);

CREATE TABLE IF NOT EXISTS review_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_id INTEGER NOT NULL REFERENCES samples(id) ON DELETE CASCADE,
    reviewer TEXT,
    created_at INTEGER NOT NULL,
    resolved_at INTEGER,
    outcome TEXT
);

CREATE INDEX IF NOT EXISTS idx_review_tasks_sample ON review_tasks(sample_id);

CREATE TABLE IF NOT EXISTS context_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_hash TEXT NOT NULL UNIQUE,
    entities_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS quality_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    window_size INTEGER NOT NULL,
    agreement_score REAL NOT NULL,
    flag_count INTEGER NOT NULL,
    computed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_quality_metrics_project ON quality_metrics(project_id);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_id INTEGER NOT NULL REFERENCES samples(id),
    decision TEXT NOT NULL,
    actor TEXT NOT NULL,
    confidence REAL,
    context_hash TEXT,
    policy_version INTEGER NOT NULL,
    resulting_status TEXT NOT NULL,
    detail TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_sample ON audit_log(sample_id);

CREATE TABLE IF NOT EXISTS sample_leases (
    sample_id INTEGER PRIMARY KEY REFERENCES samples(id) ON DELETE CASCADE,
    owner TEXT NOT NULL,
    acquired_at INTEGER NOT NULL
);
"#;
