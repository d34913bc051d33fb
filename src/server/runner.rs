use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::app::{Action, App, Event, Fragment, Page, Render};
use crate::session::{SessionContext, SessionStore};

#[cfg(test)]
#[path = "runner_tests.rs"]
mod runner_tests;

/// One input line.
#[derive(Debug, Clone, Deserialize)]
pub struct PassRequest {
    /// Session to run against; the runner's default session when absent.
    #[serde(default)]
    pub session: Option<String>,
    pub page: Page,
    #[serde(default = "default_action")]
    pub action: Action,
}

fn default_action() -> Action {
    Action::View
}

/// One output line.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PassResponse {
    Render {
        session: String,
        render: Render,
    },
    Fragment {
        session: String,
        fragment: Fragment,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        session: Option<String>,
        error: String,
    },
}

/// Runs one pass per input line over line-delimited JSON.
pub struct PassServer {
    app: App,
    store: Arc<dyn SessionStore>,
    default_session: String,
}

impl PassServer {
    pub fn new(app: App, store: Arc<dyn SessionStore>, default_session: impl Into<String>) -> Self {
        Self {
            app,
            store,
            default_session: default_session.into(),
        }
    }

    /// Session used for requests that do not name one.
    pub fn default_session(&self) -> &str {
        &self.default_session
    }

    /// Run the runner using async stdio
    pub async fn run(&self) -> std::io::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Process lines from `reader` until EOF, writing responses to `writer`.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(session_id = %self.default_session, "Pass runner starting...");

        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            // EOF reached
            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<PassRequest>(trimmed) {
                Ok(request) => self.handle_request(request, &mut writer).await?,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    let response = PassResponse::Error {
                        session: None,
                        error: format!("Parse error: {}", e),
                    };
                    write_line(&mut writer, &response).await?;
                }
            }
        }

        Ok(())
    }

    /// Run one pass, forwarding fragments while it is in flight.
    async fn handle_request<W>(&self, request: PassRequest, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let session = request
            .session
            .unwrap_or_else(|| self.default_session.clone());
        let ctx = SessionContext::new(session.clone(), self.store.clone());
        let event = Event::new(request.page, request.action);

        let (tx, mut rx) = mpsc::unbounded_channel::<Fragment>();
        let mut sink = move |fragment: Fragment| {
            // The receiver outlives the pass.
            let _ = tx.send(fragment);
        };

        let pass = self.app.handle(&ctx, event, &mut sink);
        tokio::pin!(pass);

        let result = loop {
            tokio::select! {
                Some(fragment) = rx.recv() => {
                    let response = PassResponse::Fragment { session: session.clone(), fragment };
                    write_line(writer, &response).await?;
                }
                result = &mut pass => break result,
            }
        };

        while let Ok(fragment) = rx.try_recv() {
            let response = PassResponse::Fragment {
                session: session.clone(),
                fragment,
            };
            write_line(writer, &response).await?;
        }

        let response = match result {
            Ok(render) => PassResponse::Render { session, render },
            Err(e) => {
                error!(session_id = %session, error = %e, "Pass failed");
                PassResponse::Error {
                    session: Some(session),
                    error: e.to_string(),
                }
            }
        };
        write_line(writer, &response).await
    }
}

async fn write_line<W>(writer: &mut W, response: &PassResponse) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response_json = serde_json::to_string(response)?;
    debug!(bytes = response_json.len(), "Sending response");

    writer.write_all(response_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
