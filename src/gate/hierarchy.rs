//! Role-hierarchy rules layered on top of the gate by individual actions.

use crate::error::GateError;
use crate::principal::{Principal, Role};
use std::collections::HashSet;

/// Hard cap on targets per bulk call.
pub const MAX_BULK_TARGETS: usize = 50;

/// Actions a principal may never aim at their own account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelfAction {
    /// Single or bulk role update.
    ChangeRole,
    Ban,
    Suspend,
    /// Soft or hard account deletion.
    Delete,
}

impl SelfAction {
    fn message(self) -> &'static str {
        match self {
            SelfAction::ChangeRole => "You cannot change your own role",
            SelfAction::Ban => "You cannot ban yourself",
            SelfAction::Suspend => "You cannot suspend yourself",
            SelfAction::Delete => "You cannot delete your own account",
        }
    }
}

/// Reject actions where the actor targets itself.
pub fn ensure_not_self(
    actor: &Principal,
    target_id: &str,
    action: SelfAction,
) -> Result<(), GateError> {
    if actor.id == target_id {
        return Err(GateError::forbidden(action.message()));
    }
    Ok(())
}

/// Admins may act on anyone; everyone else only on roles ranked strictly below their own.
///
/// `verb` completes "Only administrators can ... an administrator", e.g. `"ban"`.
pub fn ensure_can_act_on(actor: &Principal, target_role: Role, verb: &str) -> Result<(), GateError> {
    if actor.role == Role::Admin || target_role.rank() < actor.role.rank() {
        return Ok(());
    }
    let whom = match target_role {
        Role::Admin => "an administrator",
        Role::Moderator => "a moderator",
        _ => "a user of equal or higher rank",
    };
    Err(GateError::forbidden(format!("Only administrators can {verb} {whom}")))
}

/// Only admins hand out `admin` or `moderator`.
pub fn ensure_can_assign(actor: &Principal, new_role: Role) -> Result<(), GateError> {
    if actor.role == Role::Admin {
        return Ok(());
    }
    match new_role {
        Role::Admin => Err(GateError::forbidden("Only administrators can promote users to admin")),
        Role::Moderator => {
            Err(GateError::forbidden("Only administrators can promote users to moderator"))
        }
        _ => Ok(()),
    }
}

/// Irreversible deletions are admin-only.
pub fn ensure_hard_delete(actor: &Principal, what: &str) -> Result<(), GateError> {
    if actor.role != Role::Admin {
        return Err(GateError::forbidden(format!(
            "Only administrators can permanently delete {what}"
        )));
    }
    Ok(())
}

/// Validate a bulk target list and return it de-duplicated in first-seen order.
///
/// Empty lists and lists over `cap` are validation failures; a list naming the actor is
/// forbidden regardless of the other ids.
pub fn validate_bulk(
    actor: &Principal,
    ids: &[String],
    cap: usize,
) -> Result<Vec<String>, GateError> {
    if ids.is_empty() {
        return Err(GateError::validation("No users selected"));
    }
    if ids.len() > cap {
        return Err(GateError::validation(format!(
            "Cannot update more than {cap} users at once"
        )));
    }
    if ids.iter().any(|id| *id == actor.id) {
        return Err(GateError::forbidden("You cannot change your own role"));
    }
    let mut seen = HashSet::new();
    Ok(ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect())
}
