//! Encoder Supervisor (spec §4.2).
//!
//! Spec.md §4.2 specifies only the interface the core relies on and treats
//! the supervisor's internals as out of scope; this module is a concrete
//! implementation of that interface, grounded in the subprocess-supervision
//! style of a transcoding worker (spawn, pipe stdout, watch for freeze,
//! react to exit) but driving a single long-lived child per stream instead
//! of a job queue.
//!
//! The state diagram (spec §4.5.9) draws two distinct exits from `Restart`:
//! a successful respawn goes back to `Standby` with every client still
//! attached, while an encoder that exits outright (including one that fails
//! to respawn) is the only path that calls `disconnectAll` and drops the
//! stream to `Offline`. `run` is therefore an outer respawn loop around a
//! single attempt, with a single health watcher shared across attempts.
//!
//! That watcher also owns the `ONAir -> Idling` demotion (spec §4.5.2,
//! §4.5.9): "idling detection is the supervisor's job via `client_count ==
//! 0`", so it is the encoder supervisor, not `LiveStream` itself, that
//! notices a viewerless stream and calls `set_status(Idling, ...)`.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{error, info, warn};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::time::interval;

use crate::live_stream::{LiveStream, StreamStatus};

const CHUNK_SIZE: usize = 64 * 1024;
const FREEZE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of a single encoder attempt.
enum AttemptOutcome {
    /// Freeze detected; the caller should set `Standby` and spawn another
    /// attempt.
    Restart,
    /// The encoder exited, failed to spawn, or shutdown was requested; the
    /// caller should tear the stream down.
    Terminated { detail: &'static str },
}

/// Runs the encoder subprocess for `stream` until it exits or is cancelled,
/// driving the stream's status and broadcasting chunks as they arrive.
///
/// This is the task spawned by `LiveStream::connect` as the "encoder
/// supervision task" (spec §4.5.1 step 4, §9 "Dynamic task handles").
pub async fn run(stream: Arc<LiveStream>, command: Vec<String>, shutdown: Arc<Notify>) {
    let restart_signal = Arc::new(Notify::new());
    let health_watch = tokio::spawn(watch_stream_health(
        stream.clone(),
        shutdown.clone(),
        restart_signal.clone(),
    ));

    let terminal_detail = loop {
        match run_attempt(&stream, &command, &shutdown, &restart_signal).await {
            AttemptOutcome::Restart => {
                stream
                    .set_status(StreamStatus::Standby, "restarting after freeze", false)
                    .await;
                continue;
            }
            AttemptOutcome::Terminated { detail } => break detail,
        }
    };

    health_watch.abort();
    stream.disconnect_all().await;
    stream
        .set_status(StreamStatus::Offline, terminal_detail, false)
        .await;
}

/// Runs a single encoder child process to completion or until a restart is
/// requested (spec §4.2 steps i-v).
async fn run_attempt(
    stream: &Arc<LiveStream>,
    command: &[String],
    shutdown: &Notify,
    restart_signal: &Notify,
) -> AttemptOutcome {
    if let Some(tuner) = stream.tuner() {
        tuner.lock().await;
    }

    let Some((program, args)) = command.split_first() else {
        error!("[Encoder] no encoder command configured, stream stays Offline");
        return AttemptOutcome::Terminated {
            detail: "no encoder command configured",
        };
    };

    let mut child = match Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            error!("[Encoder] failed to spawn encoder: {err}");
            return AttemptOutcome::Terminated {
                detail: "failed to spawn encoder",
            };
        }
    };

    let mut stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            error!("[Encoder] child has no stdout pipe");
            let _ = child.kill().await;
            return AttemptOutcome::Terminated {
                detail: "encoder has no stdout",
            };
        }
    };

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut first_chunk = true;
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("[Encoder] shutdown requested, killing encoder");
                kill_and_wait(&mut child).await;
                return AttemptOutcome::Terminated { detail: "shutdown requested" };
            }
            _ = restart_signal.notified() => {
                warn!("[Encoder] freeze detected, killing and respawning encoder");
                kill_and_wait(&mut child).await;
                return AttemptOutcome::Restart;
            }
            read_result = stdout.read(&mut buf) => {
                match read_result {
                    Ok(0) => {
                        info!("[Encoder] encoder stdout closed");
                        let _ = child.wait().await;
                        return AttemptOutcome::Terminated { detail: "encoder exited" };
                    }
                    Ok(n) => {
                        if first_chunk {
                            stream
                                .set_status(StreamStatus::ONAir, "first chunk received", false)
                                .await;
                            first_chunk = false;
                        }
                        let chunk = Bytes::copy_from_slice(&buf[..n]);
                        stream.write_stream_data(chunk.clone()).await;
                        stream.write_raw_recording_chunk(&chunk).await;
                        stream.push_psi_archive_chunk(&chunk).await;
                    }
                    Err(err) => {
                        warn!("[Encoder] error reading encoder stdout: {err}");
                        let _ = child.wait().await;
                        return AttemptOutcome::Terminated { detail: "encoder read error" };
                    }
                }
            }
        }
    }
}

async fn kill_and_wait(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Polls the stream's liveness and viewer count once per tick, across the
/// whole lifetime of `run` (every respawn included):
///
/// - `stream.stream_data_written_at()` against the configured freeze
///   thresholds, requesting a restart when tripped (spec §4.2 step vi, §5
///   "Encoder freeze").
/// - `ONAir` with zero attached clients, demoting to `Idling` so the tuner
///   is released and a sibling stream can reclaim it (spec §4.5.2, §4.5.9
///   "last client leaves" arrow; "idling detection is the supervisor's job
///   via `client_count == 0`").
async fn watch_stream_health(stream: Arc<LiveStream>, shutdown: Arc<Notify>, restart_signal: Arc<Notify>) {
    let mut ticker = interval(FREEZE_CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {
                if stream.is_frozen() {
                    stream
                        .set_status(StreamStatus::Restart, "encoder freeze detected", false)
                        .await;
                    restart_signal.notify_one();
                    continue;
                }

                let snapshot = stream.get_status();
                if snapshot.status == StreamStatus::ONAir && snapshot.client_count == 0 {
                    stream
                        .set_status(StreamStatus::Idling, "last client disconnected", false)
                        .await;
                }
            }
        }
    }
}
