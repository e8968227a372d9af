//! NDJSON control-plane service for the choreo daemon.
//!
//! This module exposes a small dispatcher that translates newline-delimited
//! JSON commands into requests on the daemon's control loop. It backs the
//! `choreod` daemon and is intentionally conservative: commands on one
//! connection are processed sequentially, and unsupported operations return
//! structured errors. Sessions never touch the control core directly; every
//! command crosses an mpsc channel and waits on a oneshot reply, so the
//! core stays single-writer.

use crate::PROTOCOL_VERSION;
use crate::core::CoreStatus;
use crate::language::SyntaxError;
use crate::store::ProgramLibrary;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

/// What `save_programs` did once the library hit disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    /// Whether the code selected for execution changed.
    pub current_code_changed: bool,
    /// Compile errors from reloading the changed current program. The save
    /// itself succeeded; a non-empty list means nothing is running now.
    pub compile_errors: Vec<SyntaxError>,
}

/// One command from a session to the daemon's control loop.
#[derive(Debug)]
pub enum ControlRequest {
    /// Snapshot program state, positions, and powers.
    Status {
        /// Reply channel.
        reply: oneshot::Sender<CoreStatus>,
    },
    /// Read the persisted program library.
    GetPrograms {
        /// Reply channel.
        reply: oneshot::Sender<ProgramLibrary>,
    },
    /// Replace and persist the program library; reload the current program
    /// when its code changed.
    SavePrograms {
        /// The validated replacement library.
        library: ProgramLibrary,
        /// Reply channel; `Err` is a persistence failure.
        reply: oneshot::Sender<Result<SaveReport, String>>,
    },
    /// Recompile the current program and restart it from the beginning.
    RunProgram {
        /// Reply channel; `Err` carries compile errors.
        reply: oneshot::Sender<Result<(), Vec<SyntaxError>>>,
    },
    /// Drop the program, clear all plans, cut all motor power.
    StopAll {
        /// Reply channel.
        reply: oneshot::Sender<()>,
    },
}

/// Service entry point: one instance serves every connection, handing each
/// session a clone of the control-loop sender.
#[derive(Clone)]
pub struct Service {
    control: mpsc::Sender<ControlRequest>,
}

impl Service {
    /// Create a new service in front of the given control loop.
    pub fn new(control: mpsc::Sender<ControlRequest>) -> Self {
        Self { control }
    }

    /// Process a single connection by consuming requests from the reader
    /// and writing responses.
    pub async fn handle<R, W>(&self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut session = Session {
            control: self.control.clone(),
            writer,
            handshake_completed: false,
        };
        session.run(reader).await
    }
}

struct Session<W: AsyncWrite + Unpin> {
    control: mpsc::Sender<ControlRequest>,
    writer: W,
    handshake_completed: bool,
}

impl<W: AsyncWrite + Unpin> Session<W> {
    async fn run<R: AsyncBufRead + Unpin>(&mut self, reader: R) -> io::Result<()> {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let envelope: Result<RequestEnvelope, _> = serde_json::from_str(&line);
            match envelope {
                Ok(request) => {
                    let response = self.handle_request(request).await;
                    self.write_response(response).await?;
                }
                Err(err) => {
                    let response = ResponseEnvelope::from_error(
                        Value::Null,
                        ServiceError::Parse(err.to_string()),
                    );
                    self.write_response(response).await?;
                }
            }
        }

        Ok(())
    }

    async fn write_response(&mut self, envelope: ResponseEnvelope) -> io::Result<()> {
        let mut bytes = serde_json::to_vec(&envelope)?;
        bytes.push(b'\n');
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await
    }

    async fn handle_request(&mut self, request: RequestEnvelope) -> ResponseEnvelope {
        match self.dispatch(&request.command, &request.params).await {
            Ok(value) => ResponseEnvelope::success(request.id, value),
            Err(err) => ResponseEnvelope::from_error(request.id, err),
        }
    }

    async fn dispatch(&mut self, command: &str, params: &Value) -> Result<Value, ServiceError> {
        match command {
            "handshake" => self.cmd_handshake(params),
            "status" => self.cmd_status().await,
            "get_programs" => self.cmd_get_programs().await,
            "save_programs" => self.cmd_save_programs(params).await,
            "run_program" => self.cmd_run_program().await,
            "stop_all" => self.cmd_stop_all().await,
            other => Err(ServiceError::Unsupported(other.to_string())),
        }
    }

    fn cmd_handshake(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let client = params
            .get("client")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::invalid_param("client"))?;

        let requested = params
            .get("protocol_version")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::invalid_param("protocol_version"))?;

        if requested != PROTOCOL_VERSION {
            return Err(ServiceError::Protocol(format!(
                "unsupported protocol version: expected {}, got {}",
                PROTOCOL_VERSION, requested
            )));
        }

        self.handshake_completed = true;

        Ok(json!({
            "protocol_version": PROTOCOL_VERSION,
            "service": {
                "name": "choreo",
                "version": crate::VERSION,
                "client": client,
                "features": [
                    "status",
                    "program_library",
                    "program_control"
                ]
            }
        }))
    }

    fn ensure_handshake(&self) -> Result<(), ServiceError> {
        if self.handshake_completed {
            Ok(())
        } else {
            Err(ServiceError::Protocol(
                "handshake required before issuing commands".into(),
            ))
        }
    }

    async fn cmd_status(&mut self) -> Result<Value, ServiceError> {
        self.ensure_handshake()?;
        let status = self
            .request(|reply| ControlRequest::Status { reply })
            .await?;
        Ok(serde_json::to_value(status).unwrap_or_default())
    }

    async fn cmd_get_programs(&mut self) -> Result<Value, ServiceError> {
        self.ensure_handshake()?;
        let library = self
            .request(|reply| ControlRequest::GetPrograms { reply })
            .await?;
        Ok(serde_json::to_value(library).unwrap_or_default())
    }

    async fn cmd_save_programs(&mut self, params: &Value) -> Result<Value, ServiceError> {
        self.ensure_handshake()?;
        let library = params
            .get("library")
            .cloned()
            .ok_or_else(|| ServiceError::invalid_param("library"))?;
        let library: ProgramLibrary = serde_json::from_value(library)
            .map_err(|err| ServiceError::InvalidParams(format!("invalid library: {err}")))?;
        library.validate().map_err(ServiceError::InvalidParams)?;

        let report = self
            .request(|reply| ControlRequest::SavePrograms { library, reply })
            .await?
            .map_err(ServiceError::Internal)?;

        Ok(json!({
            "saved": true,
            "current_code_changed": report.current_code_changed,
            "errors": report.compile_errors,
        }))
    }

    async fn cmd_run_program(&mut self) -> Result<Value, ServiceError> {
        self.ensure_handshake()?;
        self.request(|reply| ControlRequest::RunProgram { reply })
            .await?
            .map_err(ServiceError::Compile)?;
        Ok(json!({ "running": true }))
    }

    async fn cmd_stop_all(&mut self) -> Result<Value, ServiceError> {
        self.ensure_handshake()?;
        self.request(|reply| ControlRequest::StopAll { reply })
            .await?;
        Ok(json!({ "stopped": true }))
    }

    /// Send one request to the control loop and wait for its reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ControlRequest,
    ) -> Result<T, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.control
            .send(build(reply))
            .await
            .map_err(|_| ServiceError::control_gone())?;
        response.await.map_err(|_| ServiceError::control_gone())
    }
}

#[derive(Debug)]
enum ServiceError {
    Parse(String),
    InvalidParams(String),
    Unsupported(String),
    Protocol(String),
    Compile(Vec<SyntaxError>),
    Internal(String),
}

impl ServiceError {
    fn invalid_param(name: &str) -> Self {
        ServiceError::InvalidParams(format!("missing or invalid parameter: {}", name))
    }

    fn control_gone() -> Self {
        ServiceError::Internal("control loop unavailable".into())
    }
}

#[derive(Deserialize)]
struct RequestEnvelope {
    id: Value,
    command: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct ResponseEnvelope {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEnvelope>,
}

impl ResponseEnvelope {
    fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn from_error(id: Value, error: ServiceError) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorEnvelope::from(error)),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl From<ServiceError> for ErrorEnvelope {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Parse(message) => ErrorEnvelope {
                code: "parse_error".into(),
                message,
                details: None,
            },
            ServiceError::InvalidParams(message) => ErrorEnvelope {
                code: "invalid_params".into(),
                message,
                details: None,
            },
            ServiceError::Unsupported(command) => ErrorEnvelope {
                code: "unsupported_command".into(),
                message: format!("Command '{command}' is not supported"),
                details: None,
            },
            ServiceError::Protocol(message) => ErrorEnvelope {
                code: "protocol_error".into(),
                message,
                details: None,
            },
            ServiceError::Compile(errors) => ErrorEnvelope {
                code: "compile_error".into(),
                message: format!("program has {} compile error(s)", errors.len()),
                details: Some(json!(errors)),
            },
            ServiceError::Internal(message) => ErrorEnvelope {
                code: "internal_error".into(),
                message,
                details: None,
            },
        }
    }
}
