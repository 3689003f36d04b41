//! # Ping Profile
//!
//! Wraps the system `ping`/`ping6` tool to measure ICMP round-trip
//! latency. Only the sender spawns a subprocess; the receiver side exists
//! purely to collect the propagated result, since `ping` needs no
//! cooperating process on the target host.

use crate::error::{NstsError, ProfileRuntimeError};
use crate::profiles::subprocess::SubprocessSupport;
use crate::profiles::{ExecutorContext, Profile, ProfileExecutor, ResultKind};
use crate::units::Time;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::str::FromStr;

pub fn profile() -> Profile {
    let mut p = Profile::new(
        "ping",
        "Ping",
        "Wrapper for the \"ping\" system tool; measures round-trip latency",
        |ctx| {
            let binary = if ctx.ipv6 { "ping6" } else { "ping" };
            Box::new(PingSender {
                subprocess: SubprocessSupport::new(binary),
                ctx,
            })
        },
        |ctx| Box::new(PingReceiver { ctx }),
    );
    p.add_result("rtt", "RTT", ResultKind::Time);
    p
}

struct PingSender {
    subprocess: SubprocessSupport,
    ctx: ExecutorContext,
}

impl PingSender {
    fn parse_and_store(&mut self, output: &str) -> Result<(), NstsError> {
        // Expects a trailer line like:
        // "rtt min/avg/max/mdev = 0.032/0.041/0.050/0.009 ms"
        let lines: Vec<&str> = output.lines().collect();
        let rtt_line = lines
            .iter()
            .rev()
            .find(|l| l.trim_start().starts_with("rtt"))
            .ok_or_else(|| {
                ProfileRuntimeError::UnexpectedOutput {
                    profile: "ping".to_string(),
                    detail: output.to_string(),
                }
            })?;

        let mut fields = rtt_line.split_whitespace();
        let values_field = fields
            .nth(3)
            .ok_or_else(|| ProfileRuntimeError::UnexpectedOutput {
                profile: "ping".to_string(),
                detail: rtt_line.to_string(),
            })?;
        let unit = fields
            .next()
            .ok_or_else(|| ProfileRuntimeError::UnexpectedOutput {
                profile: "ping".to_string(),
                detail: rtt_line.to_string(),
            })?;
        let avg = values_field
            .split('/')
            .nth(1)
            .ok_or_else(|| ProfileRuntimeError::UnexpectedOutput {
                profile: "ping".to_string(),
                detail: rtt_line.to_string(),
            })?;

        let rtt = Time::from_str(&format!("{avg} {unit}")).map_err(|e| {
            ProfileRuntimeError::UnexpectedOutput {
                profile: "ping".to_string(),
                detail: e.to_string(),
            }
        })?;
        self.ctx.store_result("rtt", rtt);
        Ok(())
    }
}

#[async_trait]
impl ProfileExecutor for PingSender {
    fn is_supported(&self) -> bool {
        self.subprocess.is_supported()
    }

    async fn prepare(&mut self) -> Result<(), NstsError> {
        Ok(())
    }

    async fn run(&mut self) -> Result<(), NstsError> {
        let remote = {
            let conn = self.ctx.connection.lock().await;
            conn.remote_addr.ip().to_string()
        };
        self.subprocess
            .execute(&["-c".to_string(), "1".to_string(), remote])?;
        self.subprocess.wait_until_exit().await;
        let output = self.subprocess.take_output().await?;
        self.parse_and_store(&output)?;
        self.ctx.propagate_results().await
    }

    async fn cleanup(&mut self) -> Result<(), NstsError> {
        self.subprocess.cleanup().await;
        Ok(())
    }

    fn results(&self) -> &BTreeMap<String, Value> {
        self.ctx.results()
    }

    fn context(&self) -> &ExecutorContext {
        &self.ctx
    }
}

struct PingReceiver {
    ctx: ExecutorContext,
}

#[async_trait]
impl ProfileExecutor for PingReceiver {
    fn is_supported(&self) -> bool {
        true
    }

    async fn prepare(&mut self) -> Result<(), NstsError> {
        Ok(())
    }

    async fn run(&mut self) -> Result<(), NstsError> {
        self.ctx.collect_results().await
    }

    async fn cleanup(&mut self) -> Result<(), NstsError> {
        Ok(())
    }

    fn results(&self) -> &BTreeMap<String, Value> {
        self.ctx.results()
    }

    fn context(&self) -> &ExecutorContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::options::OptionsDescriptor;
    use crate::profiles::ExecutionDirection;
    use std::sync::Arc;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::Mutex;

    async fn dummy_context() -> ExecutorContext {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, _server) = tokio::join!(TcpStream::connect(addr), async {
            listener.accept().await.unwrap().0
        });
        let conn = Connection::new(client).unwrap();
        ExecutorContext::new(
            Arc::new(Mutex::new(conn)),
            "ping",
            "test-exec",
            ExecutionDirection::Send,
            OptionsDescriptor::new().instantiate(),
            false,
        )
    }

    #[tokio::test]
    async fn parses_linux_ping_summary_line() {
        let output = "PING localhost (127.0.0.1) 56(84) bytes of data.\n\
             64 bytes from localhost (127.0.0.1): icmp_seq=1 ttl=64 time=0.041 ms\n\
             \n\
             --- localhost ping statistics ---\n\
             1 packets transmitted, 1 received, 0% packet loss, time 0ms\n\
             rtt min/avg/max/mdev = 0.032/0.041/0.050/0.009 ms\n";
        let mut sender = PingSender {
            subprocess: SubprocessSupport::new("ping"),
            ctx: dummy_context().await,
        };
        sender.parse_and_store(output).unwrap();
        let rtt = sender.ctx.results().get("rtt").unwrap().as_unit().unwrap().as_time().unwrap();
        assert!((rtt.scale("ms").unwrap() - 0.041).abs() < 1e-9);
    }
}
