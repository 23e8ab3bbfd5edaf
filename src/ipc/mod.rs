//! 守护进程与命令行之间的本地 socket 协议
//!
//! 每行一个 JSON 请求，守护进程回复一行 JSON。

use anyhow::{Context, Result};
use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::{
    GenericFilePath, GenericNamespaced, ListenerOptions, Name, NameType, ToFsName, ToNsName,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::pomodoro::{Command, DriverHandle, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Start,
    Pause,
    Reset,
    StartFocus,
    SetTask { label: String },
    Status,
    ReloadSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Snapshot(Snapshot),
    Error { message: String },
}

fn socket_name(name: &str) -> std::io::Result<Name<'static>> {
    if GenericNamespaced::is_supported() {
        name.to_string().to_ns_name::<GenericNamespaced>()
    } else {
        std::env::temp_dir()
            .join(name)
            .to_fs_name::<GenericFilePath>()
    }
}

/// 请求对应的驱动命令，`Status` 只查询
fn command_for(request: Request) -> Option<Command> {
    match request {
        Request::Start => Some(Command::Start),
        Request::Pause => Some(Command::Pause),
        Request::Reset => Some(Command::Reset),
        Request::StartFocus => Some(Command::StartFocus),
        Request::SetTask { label } => Some(Command::SetTask(label)),
        Request::ReloadSettings => Some(Command::ReloadSettings),
        Request::Status => None,
    }
}

pub async fn handle_request(request: Request, handle: &DriverHandle) -> Response {
    if let Some(command) = command_for(request) {
        if handle.send(command).await.is_err() {
            return Response::Error {
                message: "timer driver has stopped".into(),
            };
        }
    }
    match handle.query().await {
        Some(snapshot) => Response::Snapshot(snapshot),
        None => Response::Error {
            message: "timer driver has stopped".into(),
        },
    }
}

/// 接受连接，直到监听失败
pub async fn serve(name: &str, handle: DriverHandle) -> Result<()> {
    let listener = ListenerOptions::new()
        .name(socket_name(name)?)
        .create_tokio()
        .with_context(|| format!("Failed to listen on {}", name))?;
    tracing::info!("Listening on {}", name);

    loop {
        let conn = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
                continue;
            }
        };
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(conn, handle).await {
                tracing::warn!("Client connection failed: {}", e);
            }
        });
    }
}

async fn serve_connection(conn: Stream, handle: DriverHandle) -> Result<()> {
    let (recver, mut sender) = conn.split();
    let mut lines = BufReader::new(recver).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                tracing::debug!(?request, "request");
                handle_request(request, &handle).await
            }
            Err(e) => Response::Error {
                message: format!("bad request: {}", e),
            },
        };
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        sender.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

/// 向守护进程发送一个请求
pub async fn send_request(name: &str, request: &Request) -> Result<Response> {
    let conn = Stream::connect(socket_name(name)?)
        .await
        .context("Cannot reach the timer daemon (is `pomod` running?)")?;
    let (recver, mut sender) = conn.split();

    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    sender.write_all(line.as_bytes()).await?;

    let mut reader = BufReader::new(recver);
    let mut reply = String::new();
    reader.read_line(&mut reply).await?;
    serde_json::from_str(&reply).context("Malformed reply from daemon")
}
