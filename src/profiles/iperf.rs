//! # Iperf Profiles
//!
//! Wraps the `iperf` benchmark tool for two profiles: `iperf_tcp` (raw TCP
//! throughput) and `iperf_jitter` (UDP throughput, jitter, and packet
//! loss). Both share one receiver executor, which starts `iperf -s` on
//! request and tears it down on request; the two senders differ only in
//! the client/server arguments they pass and how they parse `iperf`'s
//! `-y C` CSV output.

use crate::error::{NstsError, ProfileRuntimeError};
use crate::options::OptionType;
use crate::profiles::subprocess::SubprocessSupport;
use crate::profiles::{ExecutorContext, Profile, ProfileExecutor, ResultKind};
use crate::units::{BitRate, Packet, Percentage, Time};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::str::FromStr;

pub fn profile_tcp() -> Profile {
    let mut p = Profile::new(
        "iperf_tcp",
        "TCP (iperf)",
        "Wrapper for the \"iperf\" benchmark tool; measures raw TCP throughput",
        |ctx| Box::new(IperfSender::new(ctx, IperfVariant::Tcp)),
        |ctx| Box::new(IperfReceiver { ctx, subprocess: SubprocessSupport::new("iperf") }),
    );
    p.add_result("transfer_rate", "Transfer Rate", ResultKind::BitRate);
    p.supported_options.add_option(
        "time",
        "time to transmit for",
        OptionType::Time,
        Value::from(Time::from_base(10.0)),
    );
    p
}

pub fn profile_jitter() -> Profile {
    let mut p = Profile::new(
        "iperf_jitter",
        "Jitter (iperf)",
        "Wrapper for the \"iperf\" benchmark tool; measures UDP jitter and packet loss",
        |ctx| Box::new(IperfSender::new(ctx, IperfVariant::Jitter)),
        |ctx| Box::new(IperfReceiver { ctx, subprocess: SubprocessSupport::new("iperf") }),
    );
    p.add_result("transfer_rate", "Trans. Rate", ResultKind::BitRate);
    p.add_result("jitter", "Jitter", ResultKind::Time);
    p.add_result("lost_packets", "Lost Pck", ResultKind::Packet);
    p.add_result("total_packets", "Total Pck", ResultKind::Packet);
    p.add_result("percentage_lost", "Lost Pck %", ResultKind::Percentage);
    p.supported_options.add_option(
        "time",
        "time to transmit for",
        OptionType::Time,
        Value::from(Time::from_base(10.0)),
    );
    p.supported_options.add_option(
        "rate",
        "rate to send udp packets at",
        OptionType::BitRate,
        Value::from(BitRate::from_base(1e6)),
    );
    p
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IperfVariant {
    Tcp,
    Jitter,
}

struct IperfSender {
    ctx: ExecutorContext,
    subprocess: SubprocessSupport,
    variant: IperfVariant,
}

impl IperfSender {
    fn new(ctx: ExecutorContext, variant: IperfVariant) -> Self {
        Self {
            ctx,
            subprocess: SubprocessSupport::new("iperf"),
            variant,
        }
    }

    fn server_arguments(&self) -> Vec<String> {
        let mut args = vec!["-s".to_string()];
        if self.ctx.ipv6 {
            args.push("-V".to_string());
        }
        if self.variant == IperfVariant::Jitter {
            args.push("-u".to_string());
        }
        args
    }

    fn client_arguments(&self) -> Result<Vec<String>, NstsError> {
        let mut args = vec!["-y".to_string(), "C".to_string()];
        if self.ctx.ipv6 {
            args.push("-V".to_string());
        }
        let time = self
            .ctx
            .options
            .get("time")?
            .as_unit()
            .and_then(|u| u.as_time())
            .unwrap_or(Time::from_base(10.0));
        if self.variant == IperfVariant::Jitter {
            let rate = self
                .ctx
                .options
                .get("rate")?
                .as_unit()
                .and_then(|u| u.as_bit_rate())
                .unwrap_or(BitRate::from_base(1e6));
            args.push("-u".to_string());
            args.push("-t".to_string());
            args.push(format!("{}", time.raw_value()));
            args.push("-b".to_string());
            args.push(format!("{}", rate.raw_value()));
        } else {
            args.push("-t".to_string());
            args.push(format!("{}", time.raw_value()));
        }
        Ok(args)
    }

    fn parse_and_store(&mut self, output: &str) -> Result<(), NstsError> {
        match self.variant {
            IperfVariant::Tcp => {
                let fields: Vec<&str> = output.trim().split(',').collect();
                let rate_bps: f64 = fields
                    .get(8)
                    .ok_or_else(|| unexpected("iperf_tcp", output))?
                    .parse()
                    .map_err(|_| unexpected("iperf_tcp", output))?;
                self.ctx
                    .store_result("transfer_rate", BitRate::from_base(rate_bps));
            }
            IperfVariant::Jitter => {
                let line = output
                    .lines()
                    .nth(1)
                    .ok_or_else(|| unexpected("iperf_jitter", output))?;
                let fields: Vec<&str> = line.trim().split(',').collect();
                let get = |i: usize| fields.get(i).copied().ok_or_else(|| unexpected("iperf_jitter", output));

                let rate_bps: f64 = get(8)?.parse().map_err(|_| unexpected("iperf_jitter", output))?;
                let jitter_ms: f64 = get(9)?.parse().map_err(|_| unexpected("iperf_jitter", output))?;
                let lost: f64 = get(10)?.parse().map_err(|_| unexpected("iperf_jitter", output))?;
                let total: f64 = get(11)?.parse().map_err(|_| unexpected("iperf_jitter", output))?;
                let pct: f64 = get(12)?.parse().map_err(|_| unexpected("iperf_jitter", output))?;

                self.ctx.store_result("transfer_rate", BitRate::from_base(rate_bps));
                self.ctx.store_result("jitter", Time::from_str(&format!("{jitter_ms} ms")).map_err(
                    |e| ProfileRuntimeError::UnexpectedOutput { profile: "iperf_jitter".into(), detail: e.to_string() },
                )?);
                self.ctx.store_result("lost_packets", Packet::from_base(lost));
                self.ctx.store_result("total_packets", Packet::from_base(total));
                self.ctx.store_result("percentage_lost", Percentage::from_base(pct));
            }
        }
        Ok(())
    }
}

fn unexpected(profile: &str, output: &str) -> NstsError {
    ProfileRuntimeError::UnexpectedOutput {
        profile: profile.to_string(),
        detail: output.to_string(),
    }
    .into()
}

#[async_trait]
impl ProfileExecutor for IperfSender {
    fn is_supported(&self) -> bool {
        self.subprocess.is_supported()
    }

    async fn prepare(&mut self) -> Result<(), NstsError> {
        Ok(())
    }

    async fn run(&mut self) -> Result<(), NstsError> {
        let server_args: Vec<Value> = self
            .server_arguments()
            .into_iter()
            .map(Value::Str)
            .collect();
        let mut params = crate::proto::Params::new();
        params.insert("server_arguments".to_string(), Value::List(server_args));
        self.ctx.send_msg("STARTSERVER", params).await?;
        self.ctx.wait_msg_type("OK").await?;

        let remote = {
            let conn = self.ctx.connection.lock().await;
            conn.remote_addr.ip().to_string()
        };
        let mut args = vec!["-c".to_string(), remote];
        args.extend(self.client_arguments()?);
        self.subprocess.execute(&args)?;
        self.subprocess.wait_until_exit().await;

        self.ctx.send_msg_plain("STOPSERVER").await?;
        self.ctx.wait_msg_type("OK").await?;

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

struct IperfReceiver {
    ctx: ExecutorContext,
    subprocess: SubprocessSupport,
}

#[async_trait]
impl ProfileExecutor for IperfReceiver {
    fn is_supported(&self) -> bool {
        self.subprocess.is_supported()
    }

    async fn prepare(&mut self) -> Result<(), NstsError> {
        Ok(())
    }

    async fn run(&mut self) -> Result<(), NstsError> {
        let msg = self.ctx.wait_msg_type("STARTSERVER").await?;
        let args: Vec<String> = match msg.param("server_arguments") {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => {
                return Err(ProfileRuntimeError::UnexpectedOutput {
                    profile: "iperf".to_string(),
                    detail: "STARTSERVER missing server_arguments".to_string(),
                }
                .into())
            }
        };
        self.subprocess.execute(&args)?;
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        self.ctx.send_msg_plain("OK").await?;

        self.ctx.wait_msg_type("STOPSERVER").await?;
        self.subprocess.kill().await;
        self.ctx.send_msg_plain("OK").await?;

        self.ctx.collect_results().await
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_csv_row() {
        // iperf -y C format; field 8 is the transfer rate in bits/sec.
        let row = "20231001120000,127.0.0.1,5001,127.0.0.1,54321,3,0.0-10.0,1250000000,1000000000";
        let fields: Vec<&str> = row.split(',').collect();
        let rate: f64 = fields[8].parse().unwrap();
        assert_eq!(rate, 1_000_000_000.0);
    }
}
