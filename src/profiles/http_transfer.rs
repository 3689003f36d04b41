//! # HTTP Transfer Profile
//!
//! Measures HTTP download throughput. The receive side sandboxes a
//! static document root in a temp directory and launches whatever
//! `httpd`/`apache2ctl`-style binary is resolvable on `PATH` against it;
//! the send side drives `wget` to fetch a server-generated file. Grounded
//! on the original's `profiles/apache.py` (`ApacheExecutorServer`,
//! `WgetExecutorClient`), with the request/response sub-message sequence
//! (`STARTSERVER`/`OK`, then repeated `GENERATEFILE`/`OK`, then a final
//! zero-size `GENERATEFILE` to signal shutdown) kept unchanged.

use crate::error::{NstsError, ProfileRuntimeError};
use crate::options::OptionType;
use crate::profiles::subprocess::SubprocessSupport;
use crate::profiles::{ExecutorContext, Profile, ProfileExecutor, ResultKind};
use crate::units::{Byte, ByteRate, Time};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use tempfile::TempDir;

/// Candidate server binaries tried in order, most-specific first; the
/// original hardcoded `/usr/sbin/apache2`, but distributions vary enough
/// that resolving several names on `PATH` is more portable.
const SERVER_BINARIES: &[&str] = &["apache2", "apache2ctl", "httpd"];

pub fn profile() -> Profile {
    let mut p = Profile::new(
        "http_transfer",
        "HTTP (apache)",
        "Measures HTTP download throughput against a sandboxed static file server",
        |ctx| Box::new(HttpClient::new(ctx)),
        |ctx| Box::new(HttpServer::new(ctx)),
    );
    p.add_result("transfer_rate", "Transfer Rate", ResultKind::ByteRate);
    p.supported_options.add_option(
        "port",
        "port the sandboxed server listens on",
        OptionType::Int,
        Value::Int(58338),
    );
    p.supported_options.add_option(
        "filesize",
        "size of the file to download",
        OptionType::Byte,
        Value::from(Byte::from_base(1024.0 * 1024.0)),
    );
    p
}

fn resolve_server_binary() -> Option<PathBuf> {
    SERVER_BINARIES.iter().find_map(|name| crate::utils::which(name))
}

struct HttpServer {
    ctx: ExecutorContext,
    subprocess: Option<SubprocessSupport>,
    document_root: Option<TempDir>,
}

impl HttpServer {
    fn new(ctx: ExecutorContext) -> Self {
        Self {
            ctx,
            subprocess: None,
            document_root: None,
        }
    }

    async fn start_server(&mut self) -> Result<(), NstsError> {
        let binary = resolve_server_binary().ok_or_else(|| ProfileRuntimeError::NotSupported("apache2/httpd".to_string()))?;
        let root = tempfile::Builder::new()
            .prefix("nsts-http-")
            .tempdir()
            .map_err(|e| ProfileRuntimeError::Other(format!("failed to create document root: {e}")))?;

        let port = self.ctx.options.get("port")?.as_int().unwrap_or(58338);
        let mut support = SubprocessSupport::new(binary.to_string_lossy().into_owned());
        let extra = [
            "HostnameLookups Off".to_string(),
            "KeepAlive On".to_string(),
            format!("DocumentRoot {}", root.path().display()),
            format!("Listen {port}"),
        ];
        let mut args = vec!["-d".to_string(), "/tmp".to_string()];
        for opt in extra {
            args.push("-c".to_string());
            args.push(opt);
        }
        support.execute(&args)?;
        support.wait_until_exit().await;

        self.document_root = Some(root);
        self.subprocess = Some(support);
        Ok(())
    }

    async fn stop_server(&mut self) {
        if let Some(support) = self.subprocess.as_mut() {
            support.cleanup().await;
        }
    }

    async fn generate_file(&self, filename: &str, size: i64) -> Result<(), NstsError> {
        let root = self
            .document_root
            .as_ref()
            .ok_or_else(|| ProfileRuntimeError::Other("document root not initialized".to_string()))?;
        let path = root.path().join(filename);
        let data = vec![0u8; size.max(0) as usize];
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| ProfileRuntimeError::Other(format!("failed to generate {filename}: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ProfileExecutor for HttpServer {
    fn is_supported(&self) -> bool {
        resolve_server_binary().is_some()
    }

    async fn prepare(&mut self) -> Result<(), NstsError> {
        Ok(())
    }

    async fn run(&mut self) -> Result<(), NstsError> {
        self.ctx.wait_msg_type("STARTSERVER").await?;
        self.start_server().await?;
        self.ctx.send_msg_plain("OK").await?;

        loop {
            let msg = self.ctx.wait_msg_type("GENERATEFILE").await?;
            let size = msg.param("size").and_then(Value::as_int).unwrap_or(0);
            if size == 0 {
                break;
            }
            let filename = msg
                .param("filename")
                .and_then(Value::as_str)
                .unwrap_or("file_static")
                .to_string();
            self.generate_file(&filename, size).await?;
            self.ctx.send_msg_plain("OK").await?;
        }

        self.stop_server().await;
        self.ctx.send_msg_plain("OK").await?;
        self.ctx.collect_results().await
    }

    async fn cleanup(&mut self) -> Result<(), NstsError> {
        self.stop_server().await;
        self.document_root.take();
        Ok(())
    }

    fn results(&self) -> &BTreeMap<String, Value> {
        self.ctx.results()
    }

    fn context(&self) -> &ExecutorContext {
        &self.ctx
    }
}

struct HttpClient {
    ctx: ExecutorContext,
    subprocess: SubprocessSupport,
}

impl HttpClient {
    fn new(ctx: ExecutorContext) -> Self {
        Self {
            ctx,
            subprocess: SubprocessSupport::new("wget"),
        }
    }

    /// Parses a `wget` summary line like:
    /// `2023-10-01 12:00:00 (1.23 MB/s) - '/dev/null' saved [1048576/1048576]`
    fn parse_rate(output: &str) -> Result<ByteRate, NstsError> {
        let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
        let rate_line = lines
            .iter()
            .rev()
            .find(|l| l.contains('(') && l.contains(')'))
            .ok_or_else(|| ProfileRuntimeError::UnexpectedOutput {
                profile: "http_transfer".to_string(),
                detail: output.to_string(),
            })?;
        let start = rate_line.find('(').unwrap();
        let end = rate_line[start..]
            .find(')')
            .ok_or_else(|| ProfileRuntimeError::UnexpectedOutput {
                profile: "http_transfer".to_string(),
                detail: rate_line.to_string(),
            })?
            + start;
        let inside = &rate_line[start + 1..end];
        ByteRate::from_str(inside).map_err(|e| {
            ProfileRuntimeError::UnexpectedOutput {
                profile: "http_transfer".to_string(),
                detail: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl ProfileExecutor for HttpClient {
    fn is_supported(&self) -> bool {
        self.subprocess.is_supported()
    }

    async fn prepare(&mut self) -> Result<(), NstsError> {
        Ok(())
    }

    async fn run(&mut self) -> Result<(), NstsError> {
        self.ctx.send_msg_plain("STARTSERVER").await?;
        self.ctx.wait_msg_type("OK").await?;

        let remote = {
            let conn = self.ctx.connection.lock().await;
            conn.remote_addr.ip().to_string()
        };
        let port = self.ctx.options.get("port")?.as_int().unwrap_or(58338);
        let filesize = self
            .ctx
            .options
            .get("filesize")?
            .as_unit()
            .and_then(|u| u.as_byte())
            .unwrap_or(Byte::from_base(1024.0 * 1024.0));

        let filename = "file_static".to_string();
        let mut params = crate::proto::Params::new();
        params.insert("filename".to_string(), Value::Str(filename.clone()));
        params.insert("size".to_string(), Value::Int(filesize.raw_value() as i64));
        self.ctx.send_msg("GENERATEFILE", params).await?;
        self.ctx.wait_msg_type("OK").await?;

        let url = format!("http://{remote}:{port}/{filename}");
        self.subprocess
            .execute(&[url, "--no-cache".to_string(), "-O".to_string(), "/dev/null".to_string()])?;
        self.subprocess.wait_until_exit().await;
        let output = self.subprocess.take_output().await?;
        let rate = Self::parse_rate(&output)?;
        self.ctx.store_result("transfer_rate", rate);

        let mut stop_params = crate::proto::Params::new();
        stop_params.insert("size".to_string(), Value::Int(0));
        self.ctx.send_msg("GENERATEFILE", stop_params).await?;
        self.ctx.wait_msg_type("OK").await?;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wget_speed_line() {
        let output = "2023-10-01 12:00:00 (1.23 MB/s) - '/dev/null' saved [1048576/1048576]\n";
        let rate = HttpClient::parse_rate(output).unwrap();
        assert!((rate.scale("MBps").unwrap() - 1.23).abs() < 1e-6);
    }
}
