//! Task model: hidden-namespace entries decoded into executable work items.
//!
//! Hidden account determines the kind of every task it holds:
//!
//! | account              | kind              | entry name                                          |
//! |----------------------|-------------------|-----------------------------------------------------|
//! | `.expiring_objects`  | expire-delete     | `<delete_at:010>-<account>/<container>/<object>`    |
//! | `.misplaced_objects` | policy-reconcile  | `<ts:010>-<src>:<dst>:/<account>/<container>/<object>` |
//!
//! Task containers bucket entries by time (86400 s for expirations, 3600 s
//! for reconciliation) so a busy cluster spreads tasks over many scopes.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::TaskParseError;
use super::ids::{AccountName, ContainerName, ObjectPath, PolicyIndex, Scope, TaskId};

pub const EXPIRER_ACCOUNT: &str = ".expiring_objects";
pub const RECONCILER_ACCOUNT: &str = ".misplaced_objects";

pub const EXPIRER_CONTAINER_DIVISOR: i64 = 86_400;
pub const RECONCILER_CONTAINER_DIVISOR: i64 = 3_600;

/// Which hidden account a daemon consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskNamespace {
    Expirer,
    Reconciler,
}

impl TaskNamespace {
    pub fn account_str(self) -> &'static str {
        match self {
            TaskNamespace::Expirer => EXPIRER_ACCOUNT,
            TaskNamespace::Reconciler => RECONCILER_ACCOUNT,
        }
    }

    pub fn account(self) -> AccountName {
        AccountName::from_trusted(self.account_str().to_string())
    }

    pub fn from_account(account: &AccountName) -> Option<Self> {
        match account.as_str() {
            EXPIRER_ACCOUNT => Some(TaskNamespace::Expirer),
            RECONCILER_ACCOUNT => Some(TaskNamespace::Reconciler),
            _ => None,
        }
    }

    pub fn container_divisor(self) -> i64 {
        match self {
            TaskNamespace::Expirer => EXPIRER_CONTAINER_DIVISOR,
            TaskNamespace::Reconciler => RECONCILER_CONTAINER_DIVISOR,
        }
    }

    /// Task container that holds entries scheduled at `at`.
    pub fn scope_for(self, at: DateTime<Utc>) -> Scope {
        let divisor = self.container_divisor();
        let bucket = at.timestamp().div_euclid(divisor) * divisor;
        Scope::new(
            self.account(),
            ContainerName::from_trusted(format!("{bucket:010}")),
        )
    }
}

/// What a task does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TaskKind {
    ExpireDelete,
    PolicyReconcile {
        source_policy: PolicyIndex,
        dest_policy: PolicyIndex,
    },
}

impl TaskKind {
    pub fn namespace(&self) -> TaskNamespace {
        match self {
            TaskKind::ExpireDelete => TaskNamespace::Expirer,
            TaskKind::PolicyReconcile { .. } => TaskNamespace::Reconciler,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::ExpireDelete => f.write_str("expire-delete"),
            TaskKind::PolicyReconcile {
                source_policy,
                dest_policy,
            } => write!(f, "policy-reconcile({source_policy}->{dest_policy})"),
        }
    }
}

/// Raw listing entry as stored in the task store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub id: TaskId,
    pub created_at: DateTime<Utc>,
}

impl TaskEntry {
    pub fn cursor(&self) -> TaskCursor {
        TaskCursor {
            created_at: self.created_at,
            id: self.id.clone(),
        }
    }
}

/// Listing position inside a scope. Entries are ordered by creation time,
/// ties broken by name, so a cursor stays valid after its entry is deleted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskCursor {
    pub created_at: DateTime<Utc>,
    pub id: TaskId,
}

/// A decoded unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub scope: Scope,
    pub id: TaskId,
    pub target: ObjectPath,
    pub kind: TaskKind,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Build a new expiration task for `target`, due at `delete_at`.
    pub fn expiration(target: ObjectPath, delete_at: DateTime<Utc>, created_at: DateTime<Utc>) -> Self {
        Self::build(target, TaskKind::ExpireDelete, delete_at, created_at)
    }

    /// Build a new reconciliation task moving `target` from `source` to `dest`.
    pub fn reconcile(
        target: ObjectPath,
        source_policy: PolicyIndex,
        dest_policy: PolicyIndex,
        timestamp: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let kind = TaskKind::PolicyReconcile {
            source_policy,
            dest_policy,
        };
        Self::build(target, kind, timestamp, created_at)
    }

    fn build(
        target: ObjectPath,
        kind: TaskKind,
        scheduled_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let namespace = kind.namespace();
        let id = encode_task_id(&kind, &target, scheduled_at);
        Self {
            scope: namespace.scope_for(scheduled_at),
            id,
            target,
            kind,
            scheduled_at,
            created_at,
        }
    }

    /// Decode a listing entry of `scope`.
    pub fn from_entry(scope: &Scope, entry: &TaskEntry) -> Result<Self, TaskParseError> {
        let namespace = TaskNamespace::from_account(&scope.account)
            .ok_or_else(|| TaskParseError::UnknownNamespace(scope.account.to_string()))?;

        let raw = entry.id.as_str();
        let (ts, rest) = raw
            .split_once('-')
            .ok_or_else(|| TaskParseError::MissingTimestamp(raw.to_string()))?;
        let scheduled_at = parse_timestamp(ts)?;

        let (kind, target) = match namespace {
            TaskNamespace::Expirer => (TaskKind::ExpireDelete, ObjectPath::parse(rest)?),
            TaskNamespace::Reconciler => parse_reconcile(rest)?,
        };

        Ok(Self {
            scope: scope.clone(),
            id: entry.id.clone(),
            target,
            kind,
            scheduled_at,
            created_at: entry.created_at,
        })
    }

    pub fn entry(&self) -> TaskEntry {
        TaskEntry {
            id: self.id.clone(),
            created_at: self.created_at,
        }
    }

    /// `now - created_at`
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.created_at
    }
}

fn encode_task_id(kind: &TaskKind, target: &ObjectPath, at: DateTime<Utc>) -> TaskId {
    let ts = at.timestamp();
    let name = match kind {
        TaskKind::ExpireDelete => format!(
            "{ts:010}-{}/{}/{}",
            target.account, target.container, target.object
        ),
        TaskKind::PolicyReconcile {
            source_policy,
            dest_policy,
        } => format!("{ts:010}-{source_policy}:{dest_policy}:{target}"),
    };
    TaskId::from_trusted(name)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TaskParseError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TaskParseError::InvalidTimestamp(raw.to_string()));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| TaskParseError::InvalidTimestamp(raw.to_string()))
}

fn parse_policy(raw: &str) -> Result<PolicyIndex, TaskParseError> {
    raw.parse::<u32>()
        .map(PolicyIndex)
        .map_err(|_| TaskParseError::InvalidPolicy(raw.to_string()))
}

fn parse_reconcile(rest: &str) -> Result<(TaskKind, ObjectPath), TaskParseError> {
    let mut parts = rest.splitn(3, ':');
    let (Some(source), Some(dest), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TaskParseError::MissingPolicies(rest.to_string()));
    };
    if !path.starts_with('/') {
        return Err(TaskParseError::MissingPolicies(rest.to_string()));
    }
    let source_policy = parse_policy(source)?;
    let dest_policy = parse_policy(dest)?;
    if source_policy == dest_policy {
        return Err(TaskParseError::SamePolicy(source_policy));
    }
    let kind = TaskKind::PolicyReconcile {
        source_policy,
        dest_policy,
    };
    Ok((kind, ObjectPath::parse(path)?))
}
