use crate::command::{self, UserCommand};
use crate::transport::{self, FrameReader, FrameWriter};
use anyhow::Context;
use std::{io, path::Path, time::Duration};
use stomp_core::{frame, parse_events_file, summary, Session, SessionError, SharedSession};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub host_header: String,
    pub max_frame_bytes: usize,
    pub write_timeout: Duration,
}

struct ActiveSession {
    session: SharedSession,
    writer: FrameWriter,
    stopped_rx: watch::Receiver<bool>,
    listener: JoinHandle<()>,
}

/// Drives one user's sessions: reads commands, owns the transport, and runs
/// the listener task for the session currently logged in.
pub struct Client {
    config: ClientConfig,
    out: mpsc::UnboundedSender<String>,
    active: Option<ActiveSession>,
}

impl Client {
    pub fn new(config: ClientConfig, out: mpsc::UnboundedSender<String>) -> Self {
        Self {
            config,
            out,
            active: None,
        }
    }

    fn say(&self, line: impl Into<String>) {
        let _ = self.out.send(line.into());
    }

    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R) {
        let mut lines = input.lines();
        loop {
            let stopped = self.active.as_ref().map(|active| active.stopped_rx.clone());
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => self.handle_line(&line).await,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(event = "input_error", error = %err);
                        break;
                    }
                },
                _ = wait_stopped(stopped) => self.teardown().await,
            }
        }
        self.teardown().await;
    }

    pub async fn handle_line(&mut self, line: &str) {
        let command = match command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(message) => {
                self.say(message);
                return;
            }
        };

        if self.active_terminated() {
            self.teardown().await;
        }

        if let UserCommand::Login {
            addr,
            username,
            password,
        } = command
        {
            self.login(&addr, username, &password).await;
            return;
        }

        let Some(active) = self.active.as_ref() else {
            self.say("Please login first");
            return;
        };

        // File I/O runs outside the lock; only session bookkeeping runs under it.
        let frames = match &command {
            UserCommand::Join { channel } => active.session.lock().join(channel).map(|f| vec![f]),
            UserCommand::Exit { channel } => active.session.lock().exit(channel).map(|f| vec![f]),
            UserCommand::Logout => active.session.lock().logout().map(|f| vec![f]),
            UserCommand::Report { path } => {
                self.report(path).await;
                return;
            }
            UserCommand::Summary { game, user, output } => {
                let report = active.session.lock().summary(game, user);
                let written = report.and_then(|report| summary::write_summary(&report, output));
                match written {
                    Ok(()) => self.say(format!("Summary written to {}", output.display())),
                    Err(err) => self.say(format!("Error: {err}")),
                }
                return;
            }
            UserCommand::Login { .. } => Ok(Vec::new()),
        };

        match frames {
            Ok(frames) => {
                self.send_all(&frames).await;
            }
            Err(err) => self.say(format!("Error: {err}")),
        }
    }

    /// Sends one SEND per event; only the events actually written are
    /// recorded for this user's summaries.
    async fn report(&mut self, path: &Path) {
        let batch = match parse_events_file(path) {
            Ok(batch) => batch,
            Err(err) => {
                self.say(format!("Error: {err}"));
                return;
            }
        };
        let frames = match self.active.as_ref() {
            Some(active) => active.session.lock().report(&batch),
            None => return,
        };
        let frames = match frames {
            Ok(frames) => frames,
            Err(err) => {
                self.say(format!("Error: {err}"));
                return;
            }
        };
        let sent = self.send_all(&frames).await;
        if let Some(active) = self.active.as_ref() {
            active.session.lock().record_sent(&batch, sent);
        }
    }

    /// Returns how many frames were written before any failure.
    async fn send_all(&mut self, frames: &[String]) -> usize {
        let Some(active) = self.active.as_mut() else {
            return 0;
        };
        for (sent, text) in frames.iter().enumerate() {
            if let Err(err) = active.writer.send(text).await {
                warn!(event = "send_error", error = %err);
                self.say("Disconnected. Exiting...");
                self.teardown().await;
                return sent;
            }
        }
        frames.len()
    }

    fn active_terminated(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.session.lock().is_terminated())
    }

    async fn login(&mut self, addr: &str, username: String, password: &str) {
        if self.active.is_some() {
            self.say("User is already logged in");
            return;
        }
        match self.open_session(addr, username, password).await {
            Ok(active) => {
                self.active = Some(active);
            }
            Err(err) => {
                warn!(event = "login_failed", addr = addr, error = %format!("{err:#}"));
                self.say(format!("Could not connect to server: {err:#}"));
            }
        }
    }

    async fn open_session(
        &self,
        addr: &str,
        username: String,
        password: &str,
    ) -> anyhow::Result<ActiveSession> {
        let (reader, mut writer) =
            transport::connect(addr, self.config.max_frame_bytes, self.config.write_timeout)
                .await
                .with_context(|| format!("connect to {addr}"))?;

        let mut session = Session::new(username);
        let connect = session.begin_connect(&self.config.host_header, password)?;
        writer
            .send(&connect)
            .await
            .context("send CONNECT frame")?;

        let session = SharedSession::new(session);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let listener = tokio::spawn(listen(
            session.clone(),
            reader,
            stopped_tx,
            self.out.clone(),
        ));
        info!(event = "session_open", addr = addr, user = %session.lock().username());

        Ok(ActiveSession {
            session,
            writer,
            stopped_rx,
            listener,
        })
    }

    /// Flags termination, closes the transport (which fails the listener's
    /// pending read), waits for the listener, then drops the session.
    pub async fn teardown(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.session.lock().terminate();
        active.writer.close().await;
        if let Err(err) = active.listener.await {
            warn!(event = "listener_join_error", error = %err);
        }
        info!(event = "session_closed");
    }
}

async fn wait_stopped(stopped: Option<watch::Receiver<bool>>) {
    match stopped {
        Some(mut rx) => {
            let _ = rx.wait_for(|stopped| *stopped).await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn listen(
    session: SharedSession,
    mut reader: FrameReader,
    stopped_tx: watch::Sender<bool>,
    out: mpsc::UnboundedSender<String>,
) {
    loop {
        let text = match reader.next_frame().await {
            Ok(Some(text)) => text,
            Ok(None) => {
                mark_lost(&session, &out);
                break;
            }
            Err(err) if err.kind() == io::ErrorKind::ConnectionAborted => {
                debug!(event = "listener_transport_closed");
                mark_lost(&session, &out);
                break;
            }
            Err(err) => {
                warn!(event = "read_error", error = %err);
                mark_lost(&session, &out);
                break;
            }
        };
        let parsed = match frame::decode(&text) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(event = "malformed_frame", error = %err);
                let _ = out.send(format!("Error: {}", SessionError::from(err)));
                continue;
            }
        };
        let dispatch = session.lock().handle_frame(&parsed);
        for notice in dispatch.notices {
            let _ = out.send(notice);
        }
        if !dispatch.keep_listening {
            break;
        }
    }
    let _ = stopped_tx.send(true);
}

/// The peer went away without a logout receipt or ERROR.
fn mark_lost(session: &SharedSession, out: &mpsc::UnboundedSender<String>) {
    let mut session = session.lock();
    if !session.is_terminated() {
        let _ = out.send("Disconnected. Exiting...".to_string());
        session.terminate();
    }
}
