//! # Client Engine
//!
//! Connects to a server, runs one profile at a time against it, and
//! drives a whole [`SpeedTestSuite`] by repeating that for every test,
//! taking however many samples each test's options call for with the
//! configured interval between them. Grounded on the original's
//! `client.py` (`NSTSClient`, `NSTSConnectionClient.run_test`), adapted
//! to the newer `CHECKPROFILE`/`INSTANTIATEPROFILE`/`EXECUTIONFINISHED`
//! command set used by the final `server.py` rather than the legacy
//! `PREPARETEST`/`TESTFINISHED` pair found alongside it — the client and
//! server sides must agree on one protocol, and the server is the
//! newer, canonical one.

use crate::connection::{Connection, ConnectionRole};
use crate::error::{NstsError, ProtocolError};
use crate::events;
use crate::options::Options;
use crate::profiles::{self, ExecutionDirection, Profile, ProfileExecution};
use crate::proto::{Message, Params};
use crate::speedtest::{SpeedTest, SpeedTestSuite};
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

static EXECUTION_NONCE: AtomicU64 = AtomicU64::new(0);

/// A connected client, ready to run profiles or whole suites against the
/// peer it handshook with.
pub struct Client {
    connection: Arc<Mutex<Connection>>,
    ipv6: bool,
}

impl Client {
    /// Connect to `host:port` and run the startup handshake.
    pub async fn connect(host: &str, port: u16, ipv6: bool) -> Result<Self, NstsError> {
        let stream = TcpStream::connect((host, port)).await?;
        let mut connection = Connection::new(stream)?;
        connection.handshake(ConnectionRole::Client).await?;
        let ipv6 = connection.is_ipv6() || ipv6;
        info!("connected to {}:{} (ipv6={})", host, port, ipv6);
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            ipv6,
        })
    }

    /// Ask the server whether `profile_id` is installed there.
    async fn check_profile(&self, profile_id: &str) -> Result<(), NstsError> {
        let mut params = Params::new();
        params.insert("profile_id".to_string(), Value::from(profile_id.to_string()));
        self.connection
            .lock()
            .await
            .send_msg(&Message::with_params("CHECKPROFILE", params))
            .await?;
        let reply = self.connection.lock().await.wait_msg_type("PROFILEINFO").await?;
        let supported = reply.param("supported").and_then(Value::as_bool).unwrap_or(false);
        if !supported {
            return Err(ProtocolError::Malformed(format!(
                "profile '{profile_id}' is not supported by the remote peer"
            ))
            .into());
        }
        Ok(())
    }

    /// Run one sample of `profile` in `direction` with `options`, driving
    /// the local executor and exchanging the `INSTANTIATEPROFILE` /
    /// `EXECUTIONFINISHED` handshake with the server, which runs the
    /// opposite direction's executor concurrently over the same
    /// connection.
    pub async fn run_profile(
        &self,
        profile: &'static Profile,
        direction: ExecutionDirection,
        options: Options,
    ) -> Result<ProfileExecution, NstsError> {
        self.check_profile(&profile.id).await?;

        let wire_options: BTreeMap<String, Value> = options.values().clone();

        let nonce = EXECUTION_NONCE.fetch_add(1, Ordering::Relaxed);
        let mut execution = ProfileExecution::new(
            profile,
            direction,
            self.connection.clone(),
            options,
            nonce,
            self.ipv6,
        );

        let mut started_extra = BTreeMap::new();
        started_extra.insert(
            "execution_id".to_string(),
            Value::from(execution.execution_id.clone()),
        );
        events::dispatcher().send(
            "profile_execution_started",
            Some(profile.id.clone()),
            started_extra,
        );

        let mut params = Params::new();
        params.insert("profile_id".to_string(), Value::from(profile.id.clone()));
        params.insert(
            "direction".to_string(),
            Value::from(direction.opposite().to_string()),
        );
        params.insert("execution_id".to_string(), Value::from(execution.execution_id.clone()));
        params.insert("options".to_string(), Value::Map(wire_options));

        debug!("instantiating '{}' (execution {})", profile.id, execution.execution_id);
        self.connection
            .lock()
            .await
            .send_msg(&Message::with_params("INSTANTIATEPROFILE", params))
            .await?;
        self.connection.lock().await.wait_msg_type("OK").await?;

        let run_result = async {
            execution.executor_mut().prepare().await?;
            execution.executor_mut().run().await
        }
        .await;

        if let Err(ref e) = run_result {
            execution.notify_peer_failure(e).await;
        }

        let finished = self.connection.lock().await.wait_msg_type("EXECUTIONFINISHED").await;
        let mut ack = Params::new();
        ack.insert("execution_id".to_string(), Value::from(execution.execution_id.clone()));
        if let Err(ref e) = run_result {
            ack.insert("error".to_string(), Value::from(e.to_string()));
        }
        self.connection
            .lock()
            .await
            .send_best_effort(&Message::with_params("EXECUTIONFINISHED", ack))
            .await;

        execution.mark_finished();
        execution.executor_mut().cleanup().await?;

        run_result?;
        finished?;
        Ok(execution)
    }

    /// Take `samples` consecutive samples of `test`'s profile/direction,
    /// sleeping `interval` between each, pushing every finished execution
    /// into `test` and publishing `test_execution_started`/
    /// `profile_execution_finished`/`test_execution_finished` events along
    /// the way.
    pub async fn run_test(&self, test: &mut SpeedTest) -> Result<(), NstsError> {
        let samples = test.options.get("samples")?.as_int().unwrap_or(1).max(1);
        let interval = test
            .options
            .get("interval")?
            .as_unit()
            .and_then(|u| u.as_time())
            .unwrap_or(crate::units::Time::from_base(0.0));

        let mut started_extra = BTreeMap::new();
        started_extra.insert("test_name".to_string(), Value::from(test.name()));
        events::dispatcher().send(
            "test_execution_started",
            Some(test.profile.id.clone()),
            started_extra,
        );

        let result = async {
            for i in 0..samples {
                let execution = self
                    .run_profile(test.profile, test.direction, test.profile_options.clone())
                    .await?;
                let mut extra = BTreeMap::new();
                extra.insert("test_name".to_string(), Value::from(test.name()));
                extra.insert("execution_id".to_string(), Value::from(execution.execution_id.clone()));
                events::dispatcher().send("profile_execution_finished", Some(test.profile.id.clone()), extra);
                test.push_sample(execution);

                if i + 1 < samples && interval.raw_value() > 0.0 {
                    tokio::time::sleep(std::time::Duration::from_secs_f64(interval.raw_value())).await;
                }
            }
            Ok(())
        }
        .await;

        let mut finished_extra = BTreeMap::new();
        finished_extra.insert("test_name".to_string(), Value::from(test.name()));
        finished_extra.insert("sample_count".to_string(), Value::Int(test.samples.len() as i64));
        events::dispatcher().send(
            "test_execution_finished",
            Some(test.profile.id.clone()),
            finished_extra,
        );

        result
    }

    /// Run every test in `suite` in order.
    pub async fn run_suite(&self, suite: &mut SpeedTestSuite) -> Result<(), NstsError> {
        let mut started_extra = BTreeMap::new();
        started_extra.insert("test_count".to_string(), Value::Int(suite.tests.len() as i64));
        events::dispatcher().send("suite_execution_started", None, started_extra);

        let result = async {
            for test in &mut suite.tests {
                info!("running test '{}'", test.name());
                self.run_test(test).await?;
            }
            Ok(())
        }
        .await;

        events::dispatcher().send("suite_execution_finished", None, BTreeMap::new());
        result
    }
}

impl std::fmt::Display for ExecutionDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionDirection::Send => write!(f, "send"),
            ExecutionDirection::Receive => write!(f, "receive"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_profile_rejects_an_unsupported_remote_profile() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(stream).unwrap();
            conn.handshake(ConnectionRole::Server).await.unwrap();
            let msg = conn.wait_msg_type("CHECKPROFILE").await.unwrap();
            assert_eq!(msg.param("profile_id").and_then(Value::as_str), Some("dummy"));
            let mut params = Params::new();
            params.insert("profile_id".to_string(), Value::from("dummy".to_string()));
            params.insert("installed".to_string(), Value::Bool(false));
            params.insert("supported".to_string(), Value::Bool(false));
            conn.send_msg(&Message::with_params("PROFILEINFO", params)).await.unwrap();
        });

        let client = Client::connect(&addr.ip().to_string(), addr.port(), false).await.unwrap();
        let profile = profiles::get_profile("dummy").unwrap();
        let options = profile.supported_options.instantiate();
        let result = client.run_profile(profile, ExecutionDirection::Send, options).await;
        assert!(result.is_err());
        server_task.await.unwrap();
    }
}
