//! Outstanding work derived from a form.
//!
//! Issues come out in document order. A checkboxes field with
//! `approvalMode="blocking"` acts as a checkpoint: until every option is
//! settled, each issue after it lists it in `blocked_by`, whatever the role.

use serde::Serialize;

use crate::models::{Field, FieldKind, Form, ResponseState, Role};
use crate::scope::ScopeRef;
use crate::validate::{ErrorCode, all_settled, field_errors, required_errors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Required,
    Recommended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueReason {
    RequiredMissing,
    ValidationError,
    OptionalEmpty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub scope: ScopeRef,
    pub message: String,
    pub severity: Severity,
    pub reason: IssueReason,
    /// Validation code for `validation_error` issues.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub role: Role,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
}

/// Which roles an issue list is computed for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RoleFilter {
    #[default]
    All,
    Roles(Vec<Role>),
}

impl RoleFilter {
    pub fn only(role: Role) -> Self {
        RoleFilter::Roles(vec![role])
    }

    pub fn matches(&self, role: Role) -> bool {
        match self {
            RoleFilter::All => true,
            RoleFilter::Roles(roles) => roles.contains(&role),
        }
    }
}

/// A blocking checkpoint is satisfied once answered with every option settled.
fn checkpoint_satisfied(field: &Field) -> bool {
    field.response.is_answered() && all_settled(field)
}

fn field_issues(field: &Field) -> Vec<Issue> {
    let issue = |message: String, severity, reason, code| Issue {
        scope: ScopeRef::field(&field.id),
        message,
        severity,
        reason,
        code,
        role: field.role,
        blocked_by: Vec::new(),
    };

    match field.response.state {
        ResponseState::Skipped => {
            return required_errors(field)
                .into_iter()
                .map(|e| {
                    issue(
                        e.message,
                        Severity::Required,
                        IssueReason::RequiredMissing,
                        Some(e.code),
                    )
                })
                .collect();
        }
        ResponseState::Aborted => return Vec::new(),
        ResponseState::Empty if field.required => {
            return vec![issue(
                format!("`{}` is required", field.label),
                Severity::Required,
                IssueReason::RequiredMissing,
                None,
            )];
        }
        ResponseState::Empty => {
            return vec![issue(
                format!("`{}` is optional and still empty", field.label),
                Severity::Recommended,
                IssueReason::OptionalEmpty,
                None,
            )];
        }
        ResponseState::Answered => {}
    }

    let mut issues: Vec<Issue> = field_errors(field)
        .into_iter()
        .map(|e| {
            issue(
                e.message,
                Severity::Required,
                IssueReason::ValidationError,
                Some(e.code),
            )
        })
        .collect();

    if field.required && matches!(field.kind, FieldKind::Checkboxes(_)) && !all_settled(field) {
        issues.push(issue(
            format!("`{}` has unfinished items", field.label),
            Severity::Required,
            IssueReason::RequiredMissing,
            None,
        ));
    }
    issues
}

/// Outstanding issues for the roles in `filter`, in document order.
pub fn list_issues(form: &Form, filter: &RoleFilter) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut blockers: Vec<String> = Vec::new();

    for field in form.fields() {
        if filter.matches(field.role) {
            for mut issue in field_issues(field) {
                issue.blocked_by = blockers.clone();
                issues.push(issue);
            }
        }
        if field.is_checkpoint() && !checkpoint_satisfied(field) {
            blockers.push(field.id.clone());
        }
    }

    issues
}

/// No field is aborted and no `required` issue remains for `filter`.
pub fn is_complete(form: &Form, filter: &RoleFilter) -> bool {
    let aborted = form
        .fields()
        .any(|f| f.response.state == ResponseState::Aborted);
    !aborted
        && list_issues(form, filter)
            .iter()
            .all(|i| i.severity != Severity::Required)
}
