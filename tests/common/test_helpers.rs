use async_trait::async_trait;
use forumgate::audit::{AuditDispatch, AuditPage, AuditQuery};
use forumgate::store::{ContentPatch, UserPatch};
use forumgate::{
    AuditEntry, AuditError, AuditStore, ContentKind, ContentRecord, ForumStore, Gateway,
    GatewayConfig, ManualClock, MemoryAuditStore, MemoryForumStore, PolicyCatalog, Principal,
    RateLimitPolicy, RequestContext, Role, StaticResolver, StoreError, UserRecord,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

/// Simulated start time for every harness.
pub const T0: u64 = 1_700_000_000_000;

/// Principals known to the resolver, with their stored roles.
pub const STAFF: [(&str, Role); 4] = [
    ("admin-1", Role::Admin),
    ("admin-2", Role::Admin),
    ("mod-1", Role::Moderator),
    ("mod-2", Role::Moderator),
];

pub fn ctx(id: &str) -> RequestContext {
    RequestContext::with_credential(id)
}

/// Forum defaults plus a 5-per-minute cap on bans and role updates.
pub fn test_policies() -> PolicyCatalog {
    PolicyCatalog::forum_defaults()
        .with_policy("user_ban", RateLimitPolicy::new(60_000, 5).expect("valid policy"))
        .with_policy("role_update", RateLimitPolicy::new(60_000, 5).expect("valid policy"))
}

pub struct Harness {
    pub gateway: Gateway,
    pub forum: Arc<MemoryForumStore>,
    pub audit: Arc<MemoryAuditStore>,
    pub clock: ManualClock,
}

pub fn resolver() -> StaticResolver {
    let mut resolver = StaticResolver::new();
    for (id, role) in STAFF {
        resolver = resolver.with_principal(Principal::new(id, role));
    }
    resolver
        .with_principal(Principal::new("vip-1", Role::Vip))
        .with_principal(Principal::new("u-1", Role::Member))
}

/// Seed staff, `vip-1`, members `u-0..u-59`, and thread `t-1`.
pub async fn seed(forum: &MemoryForumStore) {
    for (id, role) in STAFF {
        forum.insert_user(UserRecord::new(id, role)).await;
    }
    forum.insert_user(UserRecord::new("vip-1", Role::Vip)).await;
    for i in 0..60 {
        forum.insert_user(UserRecord::new(format!("u-{i}"), Role::Member)).await;
    }
    forum.insert_content(ContentRecord::new(ContentKind::Thread, "t-1", "u-1")).await;
}

pub fn config() -> GatewayConfig {
    GatewayConfig::builder()
        .policies(test_policies())
        .sweep_probability(0.0)
        .audit_dispatch(AuditDispatch::Inline)
        .build()
}

/// Route `tracing` output through the test harness; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Formatted log output captured by [`capture_logs`].
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    /// Captured lines containing `needle`.
    pub fn lines_with(&self, needle: &str) -> Vec<String> {
        self.contents().lines().filter(|l| l.contains(needle)).map(str::to_string).collect()
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureGuard;
    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureGuard(self.0.clone())
    }
}

pub struct LogCaptureGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogCaptureGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Capture every event at `debug` and above on the current thread while the guard lives.
///
/// Lines read `LEVEL target: message fields`, e.g. `DEBUG forumgate::gate: action rejected ...`.
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(capture.clone()))
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .with_ansi(false)
        .without_time()
        .finish();
    (capture, tracing::subscriber::set_default(subscriber))
}

pub async fn harness() -> Harness {
    init_tracing();
    let forum = Arc::new(MemoryForumStore::new());
    seed(&forum).await;
    let audit = Arc::new(MemoryAuditStore::default());
    let clock = ManualClock::new(T0);
    let gateway = Gateway::builder(Arc::new(resolver()), forum.clone(), audit.clone())
        .config(config())
        .clock(Arc::new(clock.clone()))
        .build();
    Harness { gateway, forum, audit, clock }
}

/// Audit store whose every call fails.
#[derive(Debug, Default)]
pub struct FailingAuditStore {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl AuditStore for FailingAuditStore {
    async fn append(&self, _entry: AuditEntry) -> Result<(), AuditError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AuditError::Write("audit table offline".into()))
    }

    async fn query(&self, _query: &AuditQuery) -> Result<AuditPage, AuditError> {
        Err(AuditError::Read("audit table offline".into()))
    }

    async fn count_by_action(&self) -> Result<BTreeMap<String, u64>, AuditError> {
        Err(AuditError::Read("audit table offline".into()))
    }
}

/// Forum store that reads from `inner` but refuses every write.
pub struct ReadOnlyForumStore {
    pub inner: MemoryForumStore,
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("connection reset by peer (10.0.0.3:5432)".into())
}

#[async_trait]
impl ForumStore for ReadOnlyForumStore {
    async fn user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.inner.user(id).await
    }

    async fn update_user(&self, _id: &str, _patch: UserPatch) -> Result<UserRecord, StoreError> {
        Err(unavailable())
    }

    async fn purge_user(&self, _id: &str) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn content(
        &self,
        kind: ContentKind,
        id: &str,
    ) -> Result<Option<ContentRecord>, StoreError> {
        self.inner.content(kind, id).await
    }

    async fn update_content(
        &self,
        _kind: ContentKind,
        _id: &str,
        _patch: ContentPatch,
    ) -> Result<ContentRecord, StoreError> {
        Err(unavailable())
    }

    async fn purge_content(&self, _kind: ContentKind, _id: &str) -> Result<(), StoreError> {
        Err(unavailable())
    }
}
