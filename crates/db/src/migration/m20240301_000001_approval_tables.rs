//! Approval tables: workflows, their levels and rules, and approval requests.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: WORKFLOW DEFINITIONS
        // ============================================================
        db.execute_unprepared(APPROVAL_WORKFLOWS_SQL).await?;
        db.execute_unprepared(APPROVAL_LEVELS_SQL).await?;
        db.execute_unprepared(APPROVAL_RULES_SQL).await?;

        // ============================================================
        // PART 2: REQUESTS
        // ============================================================
        db.execute_unprepared(APPROVAL_REQUESTS_SQL).await?;

        // ============================================================
        // PART 3: TRIGGERS
        // ============================================================
        db.execute_unprepared(UPDATED_AT_TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const APPROVAL_WORKFLOWS_SQL: &str = r"
CREATE TABLE approval_workflows (
    id                  UUID PRIMARY KEY,
    name                VARCHAR(255) NOT NULL,
    document_type       VARCHAR(100) NOT NULL,
    threshold_amount    NUMERIC(19, 4) NOT NULL DEFAULT 0,
    auto_escalate       BOOLEAN NOT NULL DEFAULT FALSE,
    require_all_levels  BOOLEAN NOT NULL DEFAULT TRUE,
    is_active           BOOLEAN NOT NULL DEFAULT TRUE,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_workflow_threshold CHECK (threshold_amount >= 0)
);

CREATE INDEX idx_approval_workflows_document_type
    ON approval_workflows(document_type, threshold_amount)
    WHERE is_active = TRUE;
";

const APPROVAL_LEVELS_SQL: &str = r"
CREATE TABLE approval_levels (
    id                          UUID PRIMARY KEY,
    workflow_id                 UUID NOT NULL REFERENCES approval_workflows(id) ON DELETE CASCADE,
    level                       INTEGER NOT NULL,
    name                        VARCHAR(255) NOT NULL,
    approver_id                 UUID,
    approver_role               VARCHAR(100),
    escalation_hours            INTEGER NOT NULL DEFAULT 24,
    can_delegate                BOOLEAN NOT NULL DEFAULT TRUE,
    auto_approve_if_same_user   BOOLEAN NOT NULL DEFAULT FALSE,
    is_active                   BOOLEAN NOT NULL DEFAULT TRUE,
    created_at                  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at                  TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    -- Soft-deleted levels keep their number.
    CONSTRAINT uq_approval_level_number UNIQUE (workflow_id, level),
    CONSTRAINT chk_level_positive CHECK (level >= 1),
    CONSTRAINT chk_level_escalation_hours CHECK (escalation_hours BETWEEN 1 AND 168),
    CONSTRAINT chk_level_approver CHECK (
        (approver_id IS NOT NULL AND approver_role IS NULL) OR
        (approver_id IS NULL AND approver_role IS NOT NULL)
    )
);

CREATE INDEX idx_approval_levels_workflow ON approval_levels(workflow_id, level);
";

const APPROVAL_RULES_SQL: &str = r"
CREATE TABLE approval_rules (
    id                  UUID PRIMARY KEY,
    workflow_id         UUID NOT NULL REFERENCES approval_workflows(id) ON DELETE CASCADE,
    name                VARCHAR(255) NOT NULL,
    conditions          JSONB NOT NULL DEFAULT '[]',
    priority            INTEGER NOT NULL DEFAULT 0,
    auto_trigger        BOOLEAN NOT NULL DEFAULT FALSE,
    escalation_rules    JSONB NOT NULL DEFAULT '{}',
    is_active           BOOLEAN NOT NULL DEFAULT TRUE,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_approval_rules_workflow ON approval_rules(workflow_id, priority);
";

const APPROVAL_REQUESTS_SQL: &str = r"
CREATE TABLE approval_requests (
    id                  UUID PRIMARY KEY,
    workflow_id         UUID NOT NULL REFERENCES approval_workflows(id),
    rule_id             UUID REFERENCES approval_rules(id),
    document_type       VARCHAR(100) NOT NULL,
    document_id         UUID NOT NULL,
    requestor_id        UUID NOT NULL,
    approver_id         UUID NOT NULL,
    amount              NUMERIC(19, 4) NOT NULL,
    priority            VARCHAR(20) NOT NULL DEFAULT 'medium',
    current_level       INTEGER NOT NULL,
    status              VARCHAR(20) NOT NULL DEFAULT 'pending',
    due_date            TIMESTAMPTZ NOT NULL,
    approved_at         TIMESTAMPTZ,
    rejected_at         TIMESTAMPTZ,
    completed_at        TIMESTAMPTZ,
    escalated_at        TIMESTAMPTZ,
    delegated_at        TIMESTAMPTZ,
    delegated_by        UUID,
    requestor_comments  TEXT,
    approver_comments   TEXT,
    escalation_reason   TEXT,
    escalation_action_level INTEGER,
    fields              JSONB NOT NULL DEFAULT '{}',
    version             BIGINT NOT NULL DEFAULT 0,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_request_amount CHECK (amount >= 0),
    CONSTRAINT chk_request_priority CHECK (priority IN ('low', 'medium', 'high', 'urgent')),
    CONSTRAINT chk_request_status CHECK (
        status IN ('pending', 'approved', 'rejected', 'escalated', 'completed')
    ),
    CONSTRAINT chk_request_outcome_timestamps CHECK (
        (status = 'approved') = (approved_at IS NOT NULL) AND
        (status = 'rejected') = (rejected_at IS NOT NULL) AND
        (status = 'completed') = (completed_at IS NOT NULL) AND
        (status = 'escalated') = (escalated_at IS NOT NULL)
    )
);

CREATE INDEX idx_approval_requests_approver
    ON approval_requests(approver_id, created_at)
    WHERE status = 'pending';
CREATE INDEX idx_approval_requests_due
    ON approval_requests(due_date)
    WHERE status = 'pending';
CREATE INDEX idx_approval_requests_document
    ON approval_requests(document_type, document_id, created_at);
";

const UPDATED_AT_TRIGGERS_SQL: &str = r"
CREATE OR REPLACE FUNCTION touch_updated_at()
RETURNS TRIGGER AS $$
BEGIN
    IF NEW.updated_at = OLD.updated_at THEN
        NEW.updated_at := NOW();
    END IF;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_approval_workflows_updated_at
    BEFORE UPDATE ON approval_workflows
    FOR EACH ROW EXECUTE FUNCTION touch_updated_at();

CREATE TRIGGER trg_approval_levels_updated_at
    BEFORE UPDATE ON approval_levels
    FOR EACH ROW EXECUTE FUNCTION touch_updated_at();

CREATE TRIGGER trg_approval_rules_updated_at
    BEFORE UPDATE ON approval_rules
    FOR EACH ROW EXECUTE FUNCTION touch_updated_at();
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS approval_requests;
DROP TABLE IF EXISTS approval_rules;
DROP TABLE IF EXISTS approval_levels;
DROP TABLE IF EXISTS approval_workflows;
DROP FUNCTION IF EXISTS touch_updated_at();
";
