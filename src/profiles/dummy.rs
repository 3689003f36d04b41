//! # Dummy Profile
//!
//! Exercises the full protocol and profile-execution machinery without
//! depending on any external binary: the sender picks a random
//! [`BitRate`]/[`Time`] pair within its configured bounds and propagates
//! them; the receiver just collects. Used by the end-to-end smoke test
//! scenario and by anyone validating a deployment's control-channel
//! connectivity before reaching for a real benchmark profile.

use crate::error::NstsError;
use crate::options::OptionType;
use crate::profiles::{ExecutorContext, Profile, ProfileExecutor, ResultKind};
use crate::units::{BitRate, Time};
use crate::value::Value;
use async_trait::async_trait;
use rand::Rng;
use std::collections::BTreeMap;

pub fn profile() -> Profile {
    let mut p = Profile::new(
        "dummy",
        "Dummy",
        "Generates random transfer/time values; exercises the protocol without external tools",
        |ctx| Box::new(DummySender { ctx }),
        |ctx| Box::new(DummyReceiver { ctx }),
    );
    p.add_result("random_transfer", "Random Transfer", ResultKind::BitRate);
    p.add_result("random_time", "Random Time", ResultKind::Time);
    p.supported_options.add_option(
        "min_transfer",
        "minimum random transfer rate",
        OptionType::BitRate,
        Value::from(BitRate::from_base(1e6)),
    );
    p.supported_options.add_option(
        "max_transfer",
        "maximum random transfer rate",
        OptionType::BitRate,
        Value::from(BitRate::from_base(1e9)),
    );
    p.supported_options.add_option(
        "min_time",
        "minimum random time",
        OptionType::Time,
        Value::from(Time::from_base(0.1)),
    );
    p.supported_options.add_option(
        "max_time",
        "maximum random time",
        OptionType::Time,
        Value::from(Time::from_base(10.0)),
    );
    p
}

struct DummySender {
    ctx: ExecutorContext,
}

#[async_trait]
impl ProfileExecutor for DummySender {
    fn is_supported(&self) -> bool {
        true
    }

    async fn prepare(&mut self) -> Result<(), NstsError> {
        Ok(())
    }

    async fn run(&mut self) -> Result<(), NstsError> {
        let min_transfer = self
            .ctx
            .options
            .get("min_transfer")?
            .as_unit()
            .and_then(|u| u.as_bit_rate())
            .unwrap_or(BitRate::from_base(0.0));
        let max_transfer = self
            .ctx
            .options
            .get("max_transfer")?
            .as_unit()
            .and_then(|u| u.as_bit_rate())
            .unwrap_or(BitRate::from_base(1.0));
        let min_time = self
            .ctx
            .options
            .get("min_time")?
            .as_unit()
            .and_then(|u| u.as_time())
            .unwrap_or(Time::from_base(0.0));
        let max_time = self
            .ctx
            .options
            .get("max_time")?
            .as_unit()
            .and_then(|u| u.as_time())
            .unwrap_or(Time::from_base(1.0));

        let mut rng = rand::thread_rng();
        let lo = min_transfer.raw_value().min(max_transfer.raw_value());
        let hi = min_transfer.raw_value().max(max_transfer.raw_value());
        let transfer = if hi > lo {
            rng.gen_range(lo..hi)
        } else {
            lo
        };
        let lo_t = min_time.raw_value().min(max_time.raw_value());
        let hi_t = min_time.raw_value().max(max_time.raw_value());
        let time = if hi_t > lo_t {
            rng.gen_range(lo_t..hi_t)
        } else {
            lo_t
        };

        self.ctx
            .store_result("random_transfer", BitRate::from_base(transfer));
        self.ctx.store_result("random_time", Time::from_base(time));
        self.ctx.propagate_results().await
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

struct DummyReceiver {
    ctx: ExecutorContext,
}

#[async_trait]
impl ProfileExecutor for DummyReceiver {
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
