//! Worker processes: spawn a pipeline of external commands and report its end
//! on a completion channel.

use crate::error::DumpError;
use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use std::fs::File;
use std::io::Read;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// End of one worker, as seen by its reaper thread.
#[derive(Debug)]
pub struct Completion {
    /// Sequence id of the blob the worker was bound to.
    pub job: u32,
    /// Process id of the first command in the pipeline.
    pub pid: u32,
    pub outcome: std::result::Result<(), DumpError>,
    pub finished_at: Instant,
}

pub type CompletionSender = Sender<Completion>;

/// One command of a pipeline with the label used in error reports.
pub struct Stage {
    pub label: String,
    pub cmd: Command,
}

impl Stage {
    pub fn new(label: impl Into<String>, cmd: Command) -> Self {
        Self { label: label.into(), cmd }
    }
}

fn drain(stderr: Option<ChildStderr>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut s) = stderr {
            let _ = s.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn kill_all(children: &mut [(String, Child)]) {
    for (_, c) in children.iter_mut() {
        let _ = c.kill();
        let _ = c.wait();
    }
}

/// Start `stages` connected stdout-to-stdin, the last one writing to `output`
/// (or discarding when `None`). A detached reaper thread waits for every stage
/// and sends exactly one [`Completion`] for `job`. Returns the lead pid.
pub fn spawn_pipeline(job: u32, stages: Vec<Stage>, mut output: Option<File>, done: &CompletionSender) -> Result<u32> {
    anyhow::ensure!(!stages.is_empty(), "empty pipeline for blob #{job}");
    let n = stages.len();
    let mut children: Vec<(String, Child)> = Vec::with_capacity(n);
    let mut readers = Vec::with_capacity(n);
    let mut upstream: Option<ChildStdout> = None;

    for (i, mut stage) in stages.into_iter().enumerate() {
        let last = i + 1 == n;
        stage.cmd.stdin(match upstream.take() {
            Some(out) => Stdio::from(out),
            None => Stdio::null(),
        });
        if last {
            stage.cmd.stdout(match output.take() {
                Some(f) => Stdio::from(f),
                None => Stdio::null(),
            });
        } else {
            stage.cmd.stdout(Stdio::piped());
        }
        stage.cmd.stderr(Stdio::piped());

        let mut child = match stage.cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                kill_all(&mut children);
                return Err(DumpError::tool_spawn(&stage.label, &e).into());
            }
        };
        if !last {
            upstream = child.stdout.take();
        }
        readers.push(drain(child.stderr.take()));
        children.push((stage.label, child));
    }

    let pid = children[0].1.id();
    let done = done.clone();
    thread::Builder::new()
        .name(format!("reap-{job}"))
        .spawn(move || {
            // The last failing stage is reported: when a downstream stage dies,
            // upstream ones usually fail with a broken pipe as a consequence.
            let mut outcome = Ok(());
            for ((label, mut child), reader) in children.into_iter().zip(readers) {
                let status = child.wait();
                let stderr = reader.join().unwrap_or_default();
                match status {
                    Ok(s) if s.success() => {}
                    Ok(s) => outcome = Err(DumpError::tool_exit(&label, s, stderr)),
                    Err(e) => outcome = Err(DumpError::tool_spawn(&label, &e)),
                }
            }
            let _ = done.send(Completion { job, pid, outcome, finished_at: Instant::now() });
        })
        .context("spawning reaper thread")?;
    Ok(pid)
}
