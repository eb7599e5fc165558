//! calllog host
//!
//! Drives the call-log bridge from line-delimited JSON on stdin, against an
//! in-memory platform. Each line is either a method call
//!
//! ```text
//! {"id":1,"method":"query","arguments":{"dateFrom":"100"}}
//! ```
//!
//! or a host event standing in for the platform:
//!
//! ```text
//! {"event":"callState","state":"IDLE"}
//! {"event":"permissions","requestCode":0,"permissions":["android.permission.READ_CALL_LOG"],"grants":["granted"]}
//! {"event":"detach"}
//! ```
//!
//! Responses are written to stdout, one JSON object per line, as they
//! complete. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use calllog_core::logging::{log_welcome, parse_log_level, setup_logging, LoggingConfig};
use calllog_core::platform::memory::{MemoryAuthorizer, MemoryCallLog, MemoryPlatform, SimulatedTelephony};
use calllog_core::{
    BridgeConfig, CallLogBridge, CallLogRow, CallState, CallStateEvent, GrantResult, MethodCall,
    MethodResponse, Permission, ResponseEnvelope, ResultSink,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Line-delimited JSON host for the call-log bridge", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "CALLLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Storage root for recording lookups (overrides the config file)
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// JSON array of call-log rows to serve
    #[arg(long)]
    call_log: Option<PathBuf>,

    /// Permissions granted up front: `all`, `none`, or a comma list such as READ_CALL_LOG,CALL_PHONE
    #[arg(short, long, default_value = "all")]
    grant: String,

    /// Platform API level to report
    #[arg(long, default_value_t = calllog_core::platform::memory::DEFAULT_API_LEVEL)]
    api_level: u32,

    /// Give up waiting for a call to end after this many seconds
    #[arg(long)]
    call_end_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

/// Platform-side events injected by the host
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum HostEvent {
    CallState {
        state: CallState,
        #[serde(default, rename = "phoneNumber")]
        phone_number: Option<String>,
    },
    Permissions {
        #[serde(default, rename = "requestCode")]
        request_code: i32,
        permissions: Vec<Permission>,
        grants: Vec<GrantResult>,
    },
    /// The foreground activity went away
    Detach,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Event(HostEvent),
    Call {
        #[serde(default)]
        id: Option<Value>,
        #[serde(flatten)]
        call: MethodCall,
    },
}

fn parse_grants(grants: &str) -> Result<Vec<Permission>> {
    match grants.trim() {
        "all" => Ok(Permission::ALL.to_vec()),
        "none" | "" => Ok(Vec::new()),
        list => list
            .split(',')
            .map(|name| {
                name.trim()
                    .parse::<Permission>()
                    .map_err(|e| anyhow::anyhow!("{}", e))
            })
            .collect(),
    }
}

fn load_config(args: &Args) -> Result<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(root) = &args.storage_root {
        config = config.with_storage_root(root.clone());
    }
    if let Some(secs) = args.call_end_timeout {
        config = config.with_call_end_timeout(Duration::from_secs(secs));
    }
    config.validate()?;
    Ok(config)
}

fn load_call_log(path: Option<&PathBuf>) -> Result<MemoryCallLog> {
    let Some(path) = path else {
        return Ok(MemoryCallLog::new());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading call log {}", path.display()))?;
    let rows: Vec<CallLogRow> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing call log {}", path.display()))?;
    info!("loaded {} call log rows", rows.len());
    Ok(MemoryCallLog::with_rows(rows))
}

fn handle_event(event: HostEvent, bridge: &CallLogBridge, platform: &MemoryPlatform) {
    match event {
        HostEvent::CallState {
            state,
            phone_number,
        } => {
            let delivered = platform.telephony.emit(CallStateEvent {
                state,
                phone_number,
            });
            debug!("call state {:?} reached {} listeners", state, delivered);
        }
        HostEvent::Permissions {
            request_code,
            permissions,
            grants,
        } => {
            for (permission, grant) in permissions.iter().zip(grants.iter()) {
                if grant.is_granted() {
                    platform.authorizer.grant(*permission);
                }
            }
            if !bridge.on_request_permissions_result(request_code, &permissions, &grants) {
                warn!("permission result with request code {} was not handled", request_code);
            }
        }
        HostEvent::Detach => {
            info!("host detached");
            bridge.detach();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = parse_log_level(&args.log_level)?;
    let mut logging = LoggingConfig::new(level).with_stderr();
    if args.json_logs {
        logging = logging.with_json();
    }
    setup_logging(logging)?;
    log_welcome("calllog", calllog_core::VERSION);

    let config = load_config(&args)?;
    let platform = MemoryPlatform::new(
        MemoryAuthorizer::granting(parse_grants(&args.grant)?),
        load_call_log(args.call_log.as_ref())?,
        SimulatedTelephony::with_api_level(args.api_level),
    );
    let bridge = Arc::new(CallLogBridge::new(config, platform.platform())?);
    info!("serving channel {}", bridge.channel_name());

    let (tx, mut rx) = mpsc::unbounded_channel::<ResponseEnvelope>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(envelope) = rx.recv().await {
            let mut line = serde_json::to_string(&envelope)?;
            line.push('\n');
            stdout.write_all(line.as_bytes()).await?;
            stdout.flush().await?;
        }
        Ok::<_, anyhow::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Inbound>(&line) {
            Ok(Inbound::Event(event)) => handle_event(event, &bridge, &platform),
            Ok(Inbound::Call { id, call }) => {
                let tx = tx.clone();
                let sink = ResultSink::from_fn(move |outcome| {
                    let _ = tx.send(ResponseEnvelope {
                        id,
                        response: MethodResponse::from_outcome(outcome),
                    });
                });
                bridge.handle(call, sink);
            }
            Err(err) => {
                warn!("ignoring malformed line: {}", err);
                let _ = tx.send(ResponseEnvelope {
                    id: None,
                    response: MethodResponse::Error {
                        code: "MALFORMED".to_string(),
                        message: err.to_string(),
                    },
                });
            }
        }
    }

    // Dropping the platform closes the call-state feed, which fails any
    // parked wait and releases the last response senders.
    drop(tx);
    drop(bridge);
    drop(platform);
    writer.await??;
    Ok(())
}
