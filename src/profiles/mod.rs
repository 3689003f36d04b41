//! # Profile Execution
//!
//! A *profile* names a benchmark behaviour (e.g. `ping`, `iperf_tcp`) and
//! supplies one executor type per [`ExecutionDirection`]. A
//! [`ProfileExecution`] binds a profile to a direction and a freshly
//! generated execution id, and drives its executor through
//! `prepare` → `run` → `cleanup`. This mirrors the original's
//! `profiles/base.py` (`Profile`, `ProfileExecutor`, `ProfileExecution`)
//! with the executor's correspondence calls (`send_msg`/`wait_msg_type`/
//! `propagate_results`/`collect_results`) realized as methods on
//! [`ExecutorContext`] instead of on a shared mutable base class.

pub mod dummy;
pub mod http_transfer;
pub mod iperf;
pub mod ping;
pub mod subprocess;

use crate::connection::Connection;
use crate::error::{NstsError, ProfileRuntimeError};
use crate::options::{Options, OptionsDescriptor};
use crate::proto::{Message, Params};
use crate::units::Time;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

/// Which side of a profile execution this peer is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionDirection {
    Send,
    Receive,
}

impl ExecutionDirection {
    pub fn is_send(&self) -> bool {
        matches!(self, Self::Send)
    }

    pub fn is_receive(&self) -> bool {
        matches!(self, Self::Receive)
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Send => Self::Receive,
            Self::Receive => Self::Send,
        }
    }
}

impl FromStr for ExecutionDirection {
    type Err = ProfileRuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "send" | "s" => Ok(Self::Send),
            "receive" | "r" => Ok(Self::Receive),
            other => Err(ProfileRuntimeError::Other(format!(
                "unknown execution direction '{other}'"
            ))),
        }
    }
}

/// The unit kind a declared result must carry; mirrors the original's
/// `ResultValueDescriptor.unit_type` restricted-to-`Unit`-subclass
/// invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Time,
    BitRate,
    ByteRate,
    Byte,
    Percentage,
    Packet,
}

/// Declares one named, unit-typed value a profile produces.
#[derive(Debug, Clone)]
pub struct ResultDescriptor {
    pub id: String,
    pub name: String,
    pub kind: ResultKind,
}

/// Shared state and peer-correspondence helpers available to an
/// executor while it runs. Sub-messages exchanged between the two
/// executors of one execution are namespaced `__<profile_id>_<type>` so
/// they cannot collide with the top-level control commands or with
/// another profile's traffic on the same connection.
pub struct ExecutorContext {
    pub connection: Arc<Mutex<Connection>>,
    pub profile_id: String,
    pub execution_id: String,
    pub direction: ExecutionDirection,
    pub options: Options,
    /// Whether the underlying connection is over IPv6, captured
    /// synchronously at context-construction time so executor factories
    /// (which cannot `await`) can pick protocol-specific binaries like
    /// `ping` vs. `ping6`.
    pub ipv6: bool,
    results: BTreeMap<String, Value>,
}

impl ExecutorContext {
    pub fn new(
        connection: Arc<Mutex<Connection>>,
        profile_id: impl Into<String>,
        execution_id: impl Into<String>,
        direction: ExecutionDirection,
        options: Options,
        ipv6: bool,
    ) -> Self {
        Self {
            connection,
            profile_id: profile_id.into(),
            execution_id: execution_id.into(),
            direction,
            options,
            ipv6,
            results: BTreeMap::new(),
        }
    }

    fn sub_type(&self, type_: &str) -> String {
        format!("__{}_{}", self.profile_id, type_)
    }

    /// Send a sub-message to the peer executor of this same execution.
    pub async fn send_msg(&self, type_: &str, params: Params) -> Result<(), NstsError> {
        let full = self.sub_type(type_);
        let mut conn = self.connection.lock().await;
        conn.send_msg(&Message::with_params(full, params)).await
    }

    pub async fn send_msg_plain(&self, type_: &str) -> Result<(), NstsError> {
        self.send_msg(type_, Params::new()).await
    }

    /// As [`Self::send_msg`], but swallows failures after logging — used
    /// once the connection is known to be finishing or broken.
    pub async fn send_best_effort(&self, type_: &str, params: Params) {
        if let Err(e) = self.send_msg(type_, params).await {
            tracing::warn!(
                "best-effort sub-message '{}' for profile '{}' failed: {}",
                type_,
                self.profile_id,
                e
            );
        }
    }

    /// Block until the peer executor sends the given sub-message type.
    pub async fn wait_msg_type(&self, type_: &str) -> Result<Message, NstsError> {
        let full = self.sub_type(type_);
        let mut conn = self.connection.lock().await;
        conn.wait_msg_type(&full).await
    }

    pub fn store_result(&mut self, id: impl Into<String>, value: impl Into<Value>) {
        self.results.insert(id.into(), value.into());
    }

    pub fn results(&self) -> &BTreeMap<String, Value> {
        &self.results
    }

    /// Send everything stored so far to the peer executor, which receives
    /// it via [`Self::collect_results`].
    pub async fn propagate_results(&self) -> Result<(), NstsError> {
        let mut params = Params::new();
        params.insert("results".to_string(), Value::Map(self.results.clone()));
        self.send_msg("RESULTS", params).await
    }

    /// Receive a peer's propagated results and merge them into this
    /// context's own result set.
    pub async fn collect_results(&mut self) -> Result<(), NstsError> {
        let msg = self.wait_msg_type("RESULTS").await?;
        if let Some(Value::Map(m)) = msg.param("results").cloned() {
            self.results.extend(m);
        }
        Ok(())
    }
}

/// Common behaviour of a profile's send- or receive-side executor.
#[async_trait]
pub trait ProfileExecutor: Send {
    /// Whether the external tooling this executor needs is installed on
    /// this host. Checked before `INSTANTIATEPROFILE` succeeds.
    fn is_supported(&self) -> bool;

    async fn prepare(&mut self) -> Result<(), NstsError>;

    async fn run(&mut self) -> Result<(), NstsError>;

    async fn cleanup(&mut self) -> Result<(), NstsError>;

    /// Results collected or produced by this executor so far.
    fn results(&self) -> &BTreeMap<String, Value>;

    /// This executor's context, used to reach the peer executor for the
    /// same execution (e.g. a best-effort failure notification) without
    /// every profile needing to re-expose its own plumbing.
    fn context(&self) -> &ExecutorContext;
}

type ExecutorFactory = fn(ExecutorContext) -> Box<dyn ProfileExecutor>;

/// A registered benchmark behaviour: one executor factory per direction,
/// the results it produces, and the options it accepts.
pub struct Profile {
    pub id: String,
    pub name: String,
    pub description: String,
    send_factory: ExecutorFactory,
    receive_factory: ExecutorFactory,
    pub supported_results: Vec<ResultDescriptor>,
    pub supported_options: OptionsDescriptor,
}

impl Profile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        send_factory: ExecutorFactory,
        receive_factory: ExecutorFactory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            send_factory,
            receive_factory,
            supported_results: Vec::new(),
            supported_options: OptionsDescriptor::new(),
        }
    }

    pub fn add_result(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ResultKind,
    ) -> &mut Self {
        self.supported_results.push(ResultDescriptor {
            id: id.into(),
            name: name.into(),
            kind,
        });
        self
    }

    pub fn build_executor(
        &self,
        direction: ExecutionDirection,
        ctx: ExecutorContext,
    ) -> Box<dyn ProfileExecutor> {
        match direction {
            ExecutionDirection::Send => (self.send_factory)(ctx),
            ExecutionDirection::Receive => (self.receive_factory)(ctx),
        }
    }
}

/// A single execution of one profile in one direction: owns the executor
/// and timing information used to compute statistics afterward.
pub struct ProfileExecution {
    pub profile_id: String,
    pub execution_id: String,
    pub direction: ExecutionDirection,
    executor: Box<dyn ProfileExecutor>,
    started_at: std::time::Instant,
    finished_at: Option<std::time::Instant>,
}

impl ProfileExecution {
    /// `nonce` should be freshly randomized per execution; it, together
    /// with the profile id and start time, seeds the execution id hash
    /// (the original hashes `profile_id + started_at + random()` with
    /// `sha1`; this uses `blake3` over the same three ingredients).
    pub fn new(
        profile: &Profile,
        direction: ExecutionDirection,
        connection: Arc<Mutex<Connection>>,
        options: Options,
        nonce: u64,
        ipv6: bool,
    ) -> Self {
        let started_at = std::time::Instant::now();
        let mut hasher = blake3::Hasher::new();
        hasher.update(profile.id.as_bytes());
        hasher.update(&std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
            .to_le_bytes());
        hasher.update(&nonce.to_le_bytes());
        let execution_id = hasher.finalize().to_hex().to_string();

        let ctx = ExecutorContext::new(
            connection,
            profile.id.clone(),
            execution_id.clone(),
            direction,
            options,
            ipv6,
        );
        let executor = profile.build_executor(direction, ctx);

        Self {
            profile_id: profile.id.clone(),
            execution_id,
            direction,
            executor,
            started_at,
            finished_at: None,
        }
    }

    /// Build an execution around an execution id received from the peer,
    /// rather than generating a fresh one. Used on the server side, where
    /// `INSTANTIATEPROFILE` carries the id the client already generated.
    pub fn from_execution_id(
        profile: &Profile,
        direction: ExecutionDirection,
        connection: Arc<Mutex<Connection>>,
        options: Options,
        execution_id: impl Into<String>,
        ipv6: bool,
    ) -> Self {
        let execution_id = execution_id.into();
        let ctx = ExecutorContext::new(
            connection,
            profile.id.clone(),
            execution_id.clone(),
            direction,
            options,
            ipv6,
        );
        let executor = profile.build_executor(direction, ctx);
        Self {
            profile_id: profile.id.clone(),
            execution_id,
            direction,
            executor,
            started_at: std::time::Instant::now(),
            finished_at: None,
        }
    }

    pub fn executor_mut(&mut self) -> &mut Box<dyn ProfileExecutor> {
        &mut self.executor
    }

    /// Best-effort notifies the peer executor for this same execution that
    /// the local side failed, so a `wait_msg_type` call it is blocked on
    /// fails fast on type mismatch instead of hanging until the connection
    /// itself drops.
    pub async fn notify_peer_failure(&self, err: &NstsError) {
        let mut params = Params::new();
        params.insert("error".to_string(), Value::from(err.to_string()));
        self.executor.context().send_best_effort("ERROR", params).await;
    }

    pub fn mark_finished(&mut self) {
        self.finished_at = Some(std::time::Instant::now());
    }

    /// Wall-clock time spent in this execution so far, or total time if
    /// already finished.
    pub fn execution_time(&self) -> Time {
        let end = self.finished_at.unwrap_or_else(std::time::Instant::now);
        Time::from_base(end.duration_since(self.started_at).as_secs_f64())
    }

    pub fn results(&self) -> &BTreeMap<String, Value> {
        self.executor.results()
    }
}

static REGISTRY: OnceLock<HashMap<String, Profile>> = OnceLock::new();

/// The process-wide, read-only-after-startup profile registry.
pub fn registry() -> &'static HashMap<String, Profile> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for profile in [
            dummy::profile(),
            ping::profile(),
            iperf::profile_tcp(),
            iperf::profile_jitter(),
            http_transfer::profile(),
        ] {
            map.insert(profile.id.clone(), profile);
        }
        map
    })
}

pub fn get_profile(id: &str) -> Option<&'static Profile> {
    registry().get(id)
}

pub fn is_registered(id: &str) -> bool {
    registry().contains_key(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        assert_eq!(ExecutionDirection::Send.opposite(), ExecutionDirection::Receive);
        assert_eq!(
            ExecutionDirection::Send.opposite().opposite(),
            ExecutionDirection::Send
        );
    }

    #[test]
    fn direction_parses_long_and_short_forms() {
        assert_eq!(ExecutionDirection::from_str("send").unwrap(), ExecutionDirection::Send);
        assert_eq!(ExecutionDirection::from_str("r").unwrap(), ExecutionDirection::Receive);
        assert!(ExecutionDirection::from_str("sideways").is_err());
    }

    #[test]
    fn builtin_profiles_are_registered() {
        assert!(is_registered("dummy"));
        assert!(is_registered("ping"));
        assert!(is_registered("iperf_tcp"));
        assert!(is_registered("iperf_jitter"));
        assert!(is_registered("http_transfer"));
        assert!(!is_registered("not-a-real-profile"));
    }
}
