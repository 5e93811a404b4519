//! The privileged action set: every moderation mutation the forum exposes.

use super::{Access, Gateway, Outcome};
use crate::audit::AuditEvent;
use crate::error::{ActionResult, GateError};
use crate::gate::{
    ensure_can_act_on, ensure_can_assign, ensure_hard_delete, ensure_not_self, validate_bulk,
    SelfAction,
};
use crate::principal::{Principal, RequestContext, Role};
use crate::store::{
    Ban, ContentKind, ContentPatch, ContentRecord, Suspension, UserPatch, UserRecord,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::warn;

/// Rate-limit and audit action keys of the privileged actions.
pub mod action_keys {
    /// Ban a user.
    pub const USER_BAN: &str = "user_ban";
    /// Lift a ban.
    pub const USER_UNBAN: &str = "user_unban";
    /// Suspend a user for a number of hours.
    pub const USER_SUSPEND: &str = "user_suspend";
    /// Lift a suspension.
    pub const USER_UNSUSPEND: &str = "user_unsuspend";
    /// Soft or hard account deletion.
    pub const USER_DELETE: &str = "user_delete";
    /// Delete a thread or reply.
    pub const CONTENT_DELETE: &str = "content_delete";
    /// Restore a soft-deleted thread or reply.
    pub const CONTENT_RESTORE: &str = "content_restore";
    /// Lock a thread.
    pub const THREAD_LOCK: &str = "thread_lock";
    /// Unlock a thread.
    pub const THREAD_UNLOCK: &str = "thread_unlock";
    /// Pin a thread.
    pub const THREAD_PIN: &str = "thread_pin";
    /// Unpin a thread.
    pub const THREAD_UNPIN: &str = "thread_unpin";
    /// Change one user's role.
    pub const ROLE_UPDATE: &str = "role_update";
    /// Change the role of several users at once.
    pub const ROLE_BULK_UPDATE: &str = "role_bulk_update";
    /// Clear a principal's rate-limit window.
    pub const RATE_LIMIT_RESET: &str = "rate_limit_reset";
}

use action_keys::*;

/// Longest accepted moderation reason, in characters.
pub const MAX_REASON_LEN: usize = 500;
/// Longest temporary ban.
pub const MAX_BAN_DAYS: u32 = 365;
/// Longest suspension.
pub const MAX_SUSPENSION_HOURS: u32 = 720;

const DAY_MS: u64 = 86_400_000;
const HOUR_MS: u64 = 3_600_000;

const USERS_PATH: &str = "/admin/users";
const CONTENT_PATH: &str = "/admin/content";

/// Result of a bulk role change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    /// Ids whose role was changed.
    pub updated: Vec<String>,
    /// Ids left alone, with the reason.
    pub skipped: Vec<BulkSkip>,
}

/// A bulk target that was not updated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BulkSkip {
    /// Target user id.
    pub id: String,
    /// Why it was skipped, e.g. `"User not found"`.
    pub reason: String,
}

fn validate_reason(reason: &str) -> Result<(), GateError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(GateError::validation("A reason is required"));
    }
    if trimmed.chars().count() > MAX_REASON_LEN {
        return Err(GateError::validation(format!(
            "Reason must be at most {MAX_REASON_LEN} characters"
        )));
    }
    Ok(())
}

fn content_label(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Thread => "Thread",
        ContentKind::Reply => "Reply",
    }
}

impl Gateway {
    async fn load_user(&self, id: &str) -> Result<UserRecord, GateError> {
        self.store
            .user(id)
            .await
            .map_err(|e| GateError::store("load user", e))?
            .ok_or_else(|| GateError::validation("User not found"))
    }

    async fn load_content(&self, kind: ContentKind, id: &str) -> Result<ContentRecord, GateError> {
        self.store
            .content(kind, id)
            .await
            .map_err(|e| GateError::store("load content", e))?
            .ok_or_else(|| GateError::validation(format!("{} not found", content_label(kind))))
    }

    /// Ban a user, permanently when `duration_days` is `None`.
    pub async fn ban_user(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        reason: &str,
        duration_days: Option<u32>,
    ) -> ActionResult<UserRecord> {
        let precheck = |actor: &Principal| -> Result<(), GateError> {
            ensure_not_self(actor, user_id, SelfAction::Ban)?;
            validate_reason(reason)?;
            match duration_days {
                Some(d) if d == 0 || d > MAX_BAN_DAYS => Err(GateError::validation(format!(
                    "Ban duration must be between 1 and {MAX_BAN_DAYS} days"
                ))),
                _ => Ok(()),
            }
        };
        self.run(ctx, Access::Privileged, USER_BAN, precheck, |actor| async move {
            let target = self.load_user(user_id).await?;
            ensure_can_act_on(&actor, target.role, "ban")?;
            let reason = reason.trim();
            let until_ms = duration_days
                .map(|d| self.clock.now_millis().saturating_add(u64::from(d) * DAY_MS));
            let ban = Ban { reason: reason.to_string(), until_ms };
            let patch = UserPatch { ban: Some(Some(ban)), ..UserPatch::default() };
            let user = self
                .store
                .update_user(user_id, patch)
                .await
                .map_err(|e| GateError::store("ban user", e))?;
            let event = AuditEvent::new(USER_BAN)
                .target("user", user_id)
                .reason(reason)
                .detail("durationDays", duration_days.map_or(JsonValue::Null, JsonValue::from))
                .detail("permanent", duration_days.is_none());
            Ok(Outcome::audited(user, event).revalidate(USERS_PATH))
        })
        .await
    }

    /// Lift a ban.
    pub async fn unban_user(&self, ctx: &RequestContext, user_id: &str) -> ActionResult<UserRecord> {
        self.run(ctx, Access::Privileged, USER_UNBAN, |_| Ok(()), |actor| async move {
            let target = self.load_user(user_id).await?;
            ensure_can_act_on(&actor, target.role, "unban")?;
            if target.ban.is_none() {
                return Err(GateError::validation("User is not banned"));
            }
            let patch = UserPatch { ban: Some(None), ..UserPatch::default() };
            let user = self
                .store
                .update_user(user_id, patch)
                .await
                .map_err(|e| GateError::store("unban user", e))?;
            let event = AuditEvent::new(USER_UNBAN).target("user", user_id);
            Ok(Outcome::audited(user, event).revalidate(USERS_PATH))
        })
        .await
    }

    /// Suspend a user for `duration_hours`.
    pub async fn suspend_user(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        reason: &str,
        duration_hours: u32,
    ) -> ActionResult<UserRecord> {
        let precheck = |actor: &Principal| -> Result<(), GateError> {
            ensure_not_self(actor, user_id, SelfAction::Suspend)?;
            validate_reason(reason)?;
            if duration_hours == 0 || duration_hours > MAX_SUSPENSION_HOURS {
                return Err(GateError::validation(format!(
                    "Suspension must be between 1 and {MAX_SUSPENSION_HOURS} hours"
                )));
            }
            Ok(())
        };
        self.run(ctx, Access::Privileged, USER_SUSPEND, precheck, |actor| async move {
            let target = self.load_user(user_id).await?;
            ensure_can_act_on(&actor, target.role, "suspend")?;
            let reason = reason.trim();
            let until_ms =
                self.clock.now_millis().saturating_add(u64::from(duration_hours) * HOUR_MS);
            let suspension = Suspension { reason: reason.to_string(), until_ms };
            let patch = UserPatch { suspension: Some(Some(suspension)), ..UserPatch::default() };
            let user = self
                .store
                .update_user(user_id, patch)
                .await
                .map_err(|e| GateError::store("suspend user", e))?;
            let event = AuditEvent::new(USER_SUSPEND)
                .target("user", user_id)
                .reason(reason)
                .detail("durationHours", duration_hours)
                .detail("untilMs", until_ms);
            Ok(Outcome::audited(user, event).revalidate(USERS_PATH))
        })
        .await
    }

    /// End a suspension early.
    pub async fn unsuspend_user(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> ActionResult<UserRecord> {
        self.run(ctx, Access::Privileged, USER_UNSUSPEND, |_| Ok(()), |actor| async move {
            let target = self.load_user(user_id).await?;
            ensure_can_act_on(&actor, target.role, "unsuspend")?;
            if target.suspension.is_none() {
                return Err(GateError::validation("User is not suspended"));
            }
            let patch = UserPatch { suspension: Some(None), ..UserPatch::default() };
            let user = self
                .store
                .update_user(user_id, patch)
                .await
                .map_err(|e| GateError::store("unsuspend user", e))?;
            let event = AuditEvent::new(USER_UNSUSPEND).target("user", user_id);
            Ok(Outcome::audited(user, event).revalidate(USERS_PATH))
        })
        .await
    }

    /// Delete an account. `hard` removes the row and is admin-only.
    pub async fn delete_user(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        reason: &str,
        hard: bool,
    ) -> ActionResult<()> {
        let precheck = |actor: &Principal| -> Result<(), GateError> {
            ensure_not_self(actor, user_id, SelfAction::Delete)?;
            validate_reason(reason)?;
            if hard {
                ensure_hard_delete(actor, "users")?;
            }
            Ok(())
        };
        self.run(ctx, Access::Privileged, USER_DELETE, precheck, |actor| async move {
            let target = self.load_user(user_id).await?;
            ensure_can_act_on(&actor, target.role, "delete")?;
            if hard {
                self.store
                    .purge_user(user_id)
                    .await
                    .map_err(|e| GateError::store("delete user", e))?;
            } else {
                let patch = UserPatch { deleted: Some(true), ..UserPatch::default() };
                self.store
                    .update_user(user_id, patch)
                    .await
                    .map_err(|e| GateError::store("delete user", e))?;
            }
            let event = AuditEvent::new(USER_DELETE)
                .target("user", user_id)
                .reason(reason.trim())
                .detail("hard", hard)
                .detail("role", target.role.as_str());
            Ok(Outcome::audited((), event).revalidate(USERS_PATH))
        })
        .await
    }

    /// Remove a thread or reply. Soft deletes hide it; `hard` (admin-only) purges it.
    pub async fn delete_content(
        &self,
        ctx: &RequestContext,
        kind: ContentKind,
        id: &str,
        reason: &str,
        hard: bool,
    ) -> ActionResult<()> {
        let precheck = |actor: &Principal| -> Result<(), GateError> {
            validate_reason(reason)?;
            if hard {
                ensure_hard_delete(actor, "content")?;
            }
            Ok(())
        };
        self.run(ctx, Access::Privileged, CONTENT_DELETE, precheck, |_| async move {
            let record = self.load_content(kind, id).await?;
            if hard {
                self.store
                    .purge_content(kind, id)
                    .await
                    .map_err(|e| GateError::store("delete content", e))?;
            } else {
                let patch = ContentPatch { deleted: Some(true), ..ContentPatch::default() };
                self.store
                    .update_content(kind, id, patch)
                    .await
                    .map_err(|e| GateError::store("delete content", e))?;
            }
            let event = AuditEvent::new(CONTENT_DELETE)
                .target(kind.as_str(), id)
                .reason(reason.trim())
                .detail("hard", hard)
                .detail("authorId", record.author_id);
            Ok(Outcome::audited((), event).revalidate(CONTENT_PATH))
        })
        .await
    }

    /// Undo a soft delete.
    pub async fn restore_content(
        &self,
        ctx: &RequestContext,
        kind: ContentKind,
        id: &str,
    ) -> ActionResult<ContentRecord> {
        self.run(ctx, Access::Privileged, CONTENT_RESTORE, |_| Ok(()), |_| async move {
            let record = self.load_content(kind, id).await?;
            if !record.deleted {
                return Err(GateError::validation(format!(
                    "{} is not deleted",
                    content_label(kind)
                )));
            }
            let patch = ContentPatch { deleted: Some(false), ..ContentPatch::default() };
            let restored = self
                .store
                .update_content(kind, id, patch)
                .await
                .map_err(|e| GateError::store("restore content", e))?;
            let event = AuditEvent::new(CONTENT_RESTORE).target(kind.as_str(), id);
            Ok(Outcome::audited(restored, event).revalidate(CONTENT_PATH))
        })
        .await
    }

    /// Lock or unlock a thread. Both directions share the `thread_lock` window.
    pub async fn set_thread_locked(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        locked: bool,
    ) -> ActionResult<ContentRecord> {
        self.run(ctx, Access::Privileged, THREAD_LOCK, |_| Ok(()), |_| async move {
            self.load_content(ContentKind::Thread, thread_id).await?;
            let patch = ContentPatch { locked: Some(locked), ..ContentPatch::default() };
            let thread = self
                .store
                .update_content(ContentKind::Thread, thread_id, patch)
                .await
                .map_err(|e| GateError::store("update thread", e))?;
            let action = if locked { THREAD_LOCK } else { THREAD_UNLOCK };
            let event = AuditEvent::new(action).target("thread", thread_id);
            Ok(Outcome::audited(thread, event).revalidate(format!("/threads/{thread_id}")))
        })
        .await
    }

    /// Pin or unpin a thread. Both directions share the `thread_pin` window.
    pub async fn set_thread_pinned(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        pinned: bool,
    ) -> ActionResult<ContentRecord> {
        self.run(ctx, Access::Privileged, THREAD_PIN, |_| Ok(()), |_| async move {
            self.load_content(ContentKind::Thread, thread_id).await?;
            let patch = ContentPatch { pinned: Some(pinned), ..ContentPatch::default() };
            let thread = self
                .store
                .update_content(ContentKind::Thread, thread_id, patch)
                .await
                .map_err(|e| GateError::store("update thread", e))?;
            let action = if pinned { THREAD_PIN } else { THREAD_UNPIN };
            let event = AuditEvent::new(action).target("thread", thread_id);
            Ok(Outcome::audited(thread, event).revalidate("/"))
        })
        .await
    }

    /// Change one user's role.
    pub async fn update_role(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        role: Role,
    ) -> ActionResult<UserRecord> {
        let precheck = |actor: &Principal| -> Result<(), GateError> {
            ensure_not_self(actor, user_id, SelfAction::ChangeRole)?;
            ensure_can_assign(actor, role)
        };
        self.run(ctx, Access::Privileged, ROLE_UPDATE, precheck, |actor| async move {
            let target = self.load_user(user_id).await?;
            ensure_can_act_on(&actor, target.role, "change the role of")?;
            let patch = UserPatch { role: Some(role), ..UserPatch::default() };
            let user = self
                .store
                .update_user(user_id, patch)
                .await
                .map_err(|e| GateError::store("update role", e))?;
            let event = AuditEvent::new(ROLE_UPDATE)
                .target("user", user_id)
                .detail("from", target.role.as_str())
                .detail("to", role.as_str());
            Ok(Outcome::audited(user, event).revalidate(USERS_PATH))
        })
        .await
    }

    /// Change the role of up to the configured bulk cap of users in one call.
    ///
    /// The whole list is validated before anything is written. Targets that are missing or
    /// outrank the actor are skipped, not fatal; one audit entry covers the batch.
    pub async fn bulk_update_roles(
        &self,
        ctx: &RequestContext,
        user_ids: &[String],
        role: Role,
    ) -> ActionResult<BulkOutcome> {
        let cap = self.config.max_bulk_targets();
        let precheck = |actor: &Principal| -> Result<(), GateError> {
            validate_bulk(actor, user_ids, cap)?;
            ensure_can_assign(actor, role)
        };
        self.run(ctx, Access::Privileged, ROLE_BULK_UPDATE, precheck, |actor| async move {
            let targets = validate_bulk(&actor, user_ids, cap)?;
            let mut outcome = BulkOutcome::default();
            for id in targets {
                let result = self.bulk_one(&actor, &id, role).await;
                let skip = match result {
                    Ok(()) => {
                        outcome.updated.push(id);
                        continue;
                    }
                    Err(e) if e.is_client_error() => e.to_string(),
                    Err(e) => {
                        warn!(target: "forumgate::gate", user = %id, error = ?e, "bulk role update failed");
                        e.public_message()
                    }
                };
                outcome.skipped.push(BulkSkip { id, reason: skip });
            }
            let event = AuditEvent::new(ROLE_BULK_UPDATE)
                .detail("role", role.as_str())
                .detail("updated", outcome.updated.clone())
                .detail("skipped", outcome.skipped.len());
            Ok(Outcome::audited(outcome, event).revalidate(USERS_PATH))
        })
        .await
    }

    async fn bulk_one(&self, actor: &Principal, id: &str, role: Role) -> Result<(), GateError> {
        let target = self.load_user(id).await?;
        ensure_can_act_on(actor, target.role, "change the role of")?;
        let patch = UserPatch { role: Some(role), ..UserPatch::default() };
        self.store.update_user(id, patch).await.map_err(|e| GateError::store("update role", e))?;
        Ok(())
    }

    /// Administrative override that clears `principal_id`'s window for `action`.
    pub async fn reset_rate_limit(
        &self,
        ctx: &RequestContext,
        principal_id: &str,
        action: &str,
    ) -> ActionResult<()> {
        self.run(ctx, Access::Privileged, RATE_LIMIT_RESET, |_| Ok(()), |actor| async move {
            self.limiter.reset(principal_id, action, &actor).await?;
            let event = AuditEvent::new(RATE_LIMIT_RESET)
                .target("user", principal_id)
                .detail("action", action);
            Ok(Outcome::audited((), event))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditDispatch, MemoryAuditStore};
    use crate::clock::ManualClock;
    use crate::config::GatewayConfig;
    use crate::principal::StaticResolver;
    use crate::store::{ForumStore, MemoryForumStore};
    use std::sync::Arc;

    struct Fixture {
        gw: Gateway,
        store: Arc<MemoryForumStore>,
        audit: Arc<MemoryAuditStore>,
    }

    async fn fixture() -> Fixture {
        let resolver = StaticResolver::new()
            .with_principal(Principal::new("admin-1", Role::Admin))
            .with_principal(Principal::new("mod-1", Role::Moderator))
            .with_principal(Principal::new("mod-2", Role::Moderator));
        let store = Arc::new(MemoryForumStore::new());
        for (id, role) in [("admin-1", Role::Admin), ("mod-2", Role::Moderator), ("u-1", Role::Member)] {
            store.insert_user(UserRecord::new(id, role)).await;
        }
        store.insert_content(ContentRecord::new(ContentKind::Thread, "t-1", "u-1")).await;
        let audit = Arc::new(MemoryAuditStore::default());
        let config = GatewayConfig::builder()
            .sweep_probability(0.0)
            .audit_dispatch(AuditDispatch::Inline)
            .build();
        let gw = Gateway::builder(Arc::new(resolver), store.clone(), audit.clone())
            .config(config)
            .clock(Arc::new(ManualClock::new(1_000)))
            .build();
        Fixture { gw, store, audit }
    }

    fn as_mod() -> RequestContext {
        RequestContext::with_credential("mod-1")
    }

    #[tokio::test]
    async fn temporary_ban_sets_expiry() {
        let f = fixture().await;
        let user = f.gw.ban_user(&as_mod(), "u-1", " spam ", Some(2)).await.into_data().unwrap();
        let ban = user.ban.unwrap();
        assert_eq!(ban.reason, "spam");
        assert_eq!(ban.until_ms, Some(1_000 + 2 * DAY_MS));
        let entries = f.audit.entries().await;
        assert_eq!(entries[0].details["durationDays"], 2);
        assert_eq!(entries[0].details["permanent"], false);
    }

    #[tokio::test]
    async fn ban_input_validation() {
        let f = fixture().await;
        let res = f.gw.ban_user(&as_mod(), "u-1", "   ", None).await;
        assert_eq!(res.error(), Some("A reason is required"));
        let long = "x".repeat(MAX_REASON_LEN + 1);
        assert!(!f.gw.ban_user(&as_mod(), "u-1", &long, None).await.success());
        assert!(!f.gw.ban_user(&as_mod(), "u-1", "spam", Some(0)).await.success());
        assert!(!f.gw.ban_user(&as_mod(), "u-1", "spam", Some(366)).await.success());
        assert_eq!(f.store.writes(), 0);
    }

    #[tokio::test]
    async fn missing_user_is_a_validation_failure() {
        let f = fixture().await;
        let res = f.gw.ban_user(&as_mod(), "ghost", "spam", None).await;
        assert_eq!(res.error(), Some("User not found"));
        assert!(f.audit.is_empty().await);
    }

    #[tokio::test]
    async fn moderator_cannot_ban_peer() {
        let f = fixture().await;
        let res = f.gw.ban_user(&as_mod(), "mod-2", "spam", None).await;
        assert_eq!(res.error(), Some("Only administrators can ban a moderator"));
        assert_eq!(f.store.writes(), 0);
    }

    #[tokio::test]
    async fn unban_requires_existing_ban() {
        let f = fixture().await;
        assert_eq!(f.gw.unban_user(&as_mod(), "u-1").await.error(), Some("User is not banned"));
        f.gw.ban_user(&as_mod(), "u-1", "spam", None).await;
        let user = f.gw.unban_user(&as_mod(), "u-1").await.into_data().unwrap();
        assert!(user.ban.is_none());
    }

    #[tokio::test]
    async fn suspension_window() {
        let f = fixture().await;
        assert!(!f.gw.suspend_user(&as_mod(), "u-1", "flood", 721).await.success());
        let user = f.gw.suspend_user(&as_mod(), "u-1", "flood", 24).await.into_data().unwrap();
        assert_eq!(user.suspension.map(|s| s.until_ms), Some(1_000 + 24 * HOUR_MS));
        let user = f.gw.unsuspend_user(&as_mod(), "u-1").await.into_data().unwrap();
        assert!(user.suspension.is_none());
    }

    #[tokio::test]
    async fn hard_deletes_are_admin_only() {
        let f = fixture().await;
        let res = f.gw.delete_content(&as_mod(), ContentKind::Thread, "t-1", "spam", true).await;
        assert_eq!(res.error(), Some("Only administrators can permanently delete content"));

        let admin = RequestContext::with_credential("admin-1");
        assert!(f.gw.delete_user(&admin, "u-1", "spam", true).await.success());
        assert!(f.store.user("u-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn soft_delete_and_restore() {
        let f = fixture().await;
        assert!(f.gw.delete_content(&as_mod(), ContentKind::Thread, "t-1", "off topic", false).await.success());
        let thread = f.gw.restore_content(&as_mod(), ContentKind::Thread, "t-1").await.into_data().unwrap();
        assert!(!thread.deleted);
        let again = f.gw.restore_content(&as_mod(), ContentKind::Thread, "t-1").await;
        assert_eq!(again.error(), Some("Thread is not deleted"));
        let missing = f.gw.restore_content(&as_mod(), ContentKind::Reply, "r-9").await;
        assert_eq!(missing.error(), Some("Reply not found"));
    }

    #[tokio::test]
    async fn lock_and_pin_audit_direction() {
        let f = fixture().await;
        assert!(f.gw.set_thread_locked(&as_mod(), "t-1", true).await.into_data().unwrap().locked);
        assert!(!f.gw.set_thread_locked(&as_mod(), "t-1", false).await.into_data().unwrap().locked);
        assert!(f.gw.set_thread_pinned(&as_mod(), "t-1", true).await.into_data().unwrap().pinned);
        let actions: Vec<String> = f.audit.entries().await.into_iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![THREAD_LOCK, THREAD_UNLOCK, THREAD_PIN]);
    }

    #[tokio::test]
    async fn role_update_records_transition() {
        let f = fixture().await;
        let user = f.gw.update_role(&as_mod(), "u-1", Role::Vip).await.into_data().unwrap();
        assert_eq!(user.role, Role::Vip);
        let entry = &f.audit.entries().await[0];
        assert_eq!(entry.details["from"], "member");
        assert_eq!(entry.details["to"], "vip");

        let res = f.gw.update_role(&as_mod(), "u-1", Role::Moderator).await;
        assert!(!res.success());
    }

    #[tokio::test]
    async fn bulk_skips_outranked_and_missing() {
        let f = fixture().await;
        let ids: Vec<String> = ["u-1", "mod-2", "ghost", "u-1"].iter().map(|s| s.to_string()).collect();
        let out = f.gw.bulk_update_roles(&as_mod(), &ids, Role::Vip).await.into_data().unwrap();
        assert_eq!(out.updated, vec!["u-1"]);
        let skipped: Vec<&str> = out.skipped.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(skipped, vec!["mod-2", "ghost"]);
        assert_eq!(out.skipped[1].reason, "User not found");
        assert_eq!(f.audit.len().await, 1);
    }

    #[tokio::test]
    async fn reset_is_admin_only_and_audited() {
        let f = fixture().await;
        let res = f.gw.reset_rate_limit(&as_mod(), "u-1", "user_ban").await;
        assert_eq!(res.error(), Some("Only administrators can reset rate limits"));
        let admin = RequestContext::with_credential("admin-1");
        assert!(f.gw.reset_rate_limit(&admin, "u-1", "user_ban").await.success());
        let entries = f.audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, RATE_LIMIT_RESET);
    }
}
