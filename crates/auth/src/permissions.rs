//! Permission records: a single authorization atom.
//!
//! A permission grants one [`PermissionAction`] on one entity (resource
//! name), optionally narrowed by an opaque [`PolicyCondition`]. Permissions
//! are immutable once created and are referenced by id from roles.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use keystone_core::{DomainError, Entity, PermissionId};

/// Fixed set of actions a permission can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionAction {
    Create,
    Read,
    Update,
    Delete,
    List,
    Export,
    Approve,
}

impl PermissionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionAction::Create => "CREATE",
            PermissionAction::Read => "READ",
            PermissionAction::Update => "UPDATE",
            PermissionAction::Delete => "DELETE",
            PermissionAction::List => "LIST",
            PermissionAction::Export => "EXPORT",
            PermissionAction::Approve => "APPROVE",
        }
    }
}

impl core::fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATE" => Ok(PermissionAction::Create),
            "READ" => Ok(PermissionAction::Read),
            "UPDATE" => Ok(PermissionAction::Update),
            "DELETE" => Ok(PermissionAction::Delete),
            "LIST" => Ok(PermissionAction::List),
            "EXPORT" => Ok(PermissionAction::Export),
            "APPROVE" => Ok(PermissionAction::Approve),
            other => Err(DomainError::validation(format!("unknown permission action '{other}'"))),
        }
    }
}

/// Attribute-based narrowing expression.
///
/// Opaque to this crate: it is carried and handed to a [`ConditionEvaluator`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyCondition(String);

impl PolicyCondition {
    pub fn new(expression: impl Into<String>) -> Self {
        Self(expression.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// External policy engine evaluating a condition against request context.
///
/// Implementations are request-scoped: they capture whatever attributes the
/// expression language needs.
pub trait ConditionEvaluator {
    fn evaluate(&self, condition: &PolicyCondition) -> bool;
}

impl<F> ConditionEvaluator for F
where
    F: Fn(&PolicyCondition) -> bool,
{
    fn evaluate(&self, condition: &PolicyCondition) -> bool {
        self(condition)
    }
}

/// Evaluator that rejects every condition; conditional grants never apply.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyConditional;

impl ConditionEvaluator for DenyConditional {
    fn evaluate(&self, _condition: &PolicyCondition) -> bool {
        false
    }
}

/// An immutable permission record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    id: PermissionId,
    entity: String,
    action: PermissionAction,
    condition: Option<PolicyCondition>,
    description: Option<String>,
}

impl Permission {
    pub fn create(
        entity: impl Into<String>,
        action: PermissionAction,
        condition: Option<PolicyCondition>,
        description: Option<String>,
    ) -> Result<Self, DomainError> {
        let entity = entity.into().trim().to_string();
        if entity.is_empty() {
            return Err(DomainError::validation("permission entity cannot be empty"));
        }

        let condition = condition.filter(|c| !c.as_str().trim().is_empty());

        Ok(Self {
            id: PermissionId::new(),
            entity,
            action,
            condition,
            description,
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn action(&self) -> PermissionAction {
        self.action
    }

    pub fn condition(&self) -> Option<&PolicyCondition> {
        self.condition.as_ref()
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether this record targets `entity`/`action`, ignoring any condition.
    pub fn covers(&self, entity: &str, action: PermissionAction) -> bool {
        self.action == action && self.entity == entity
    }
}

impl Entity for Permission {
    type Id = PermissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.entity, self.action)?;
        if let Some(condition) = &self.condition {
            write!(f, " [{}]", condition.as_str())?;
        }
        Ok(())
    }
}
