//! SQL layout for a Postgres deployment of the ledger, job and audit tables.
//!
//! The conditional writes of the in-memory store map onto these statements:
//! debits run inside a transaction that locks the user's newest entry, claims
//! are `UPDATE ... WHERE status = 'pending'` checked by affected-row count,
//! and refunds rely on the unique partial index over `reference_id`.

/// Migration statements, in order.
pub fn migrations() -> &'static [&'static str] {
    &[
        r#"
CREATE TABLE IF NOT EXISTS cq_ledger_entries (
    id UUID PRIMARY KEY,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('debit', 'credit')),
    amount BIGINT NOT NULL,
    balance_after BIGINT NOT NULL,
    reference_kind TEXT NOT NULL,
    reference_id UUID NOT NULL,
    description TEXT NOT NULL,
    seq BIGSERIAL NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_cq_ledger_user_created ON cq_ledger_entries (user_id, created_at, seq);
CREATE UNIQUE INDEX IF NOT EXISTS idx_cq_ledger_refund_once
    ON cq_ledger_entries (reference_id) WHERE reference_kind = 'job_refund';
"#,
        r#"
CREATE TABLE IF NOT EXISTS cq_jobs (
    id UUID PRIMARY KEY,
    user_id TEXT NOT NULL,
    user_tier TEXT NOT NULL,
    generation_type TEXT NOT NULL,
    prompt TEXT NOT NULL,
    input_params JSONB NOT NULL,
    project_context JSONB,
    status TEXT NOT NULL CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
    priority SMALLINT NOT NULL,
    credit_cost BIGINT NOT NULL,
    claimed_by TEXT,
    attempts INT NOT NULL DEFAULT 0,
    seq BIGSERIAL NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    result_ref TEXT,
    error_message TEXT
);
CREATE INDEX IF NOT EXISTS idx_cq_jobs_dequeue ON cq_jobs (status, priority, created_at, seq);
CREATE INDEX IF NOT EXISTS idx_cq_jobs_user ON cq_jobs (user_id, created_at DESC);
"#,
        r#"
CREATE TABLE IF NOT EXISTS cq_audit_events (
    event_id TEXT PRIMARY KEY,
    job_id UUID,
    user_id TEXT NOT NULL,
    action TEXT NOT NULL,
    detail TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_cq_audit_events_job ON cq_audit_events (job_id);
CREATE INDEX IF NOT EXISTS idx_cq_audit_events_user_created ON cq_audit_events (user_id, created_at);
"#,
    ]
}
