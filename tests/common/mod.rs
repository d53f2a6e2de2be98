#![allow(dead_code)]

use anyhow::Result;
use chunkdump::{
    CompletionSender, Launcher, QueryRunner, Row, ScheduledBlob, Stage, TableDescriptor, TableListing,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub fn row(fields: &[&str]) -> Row {
    fields.iter().map(|s| s.to_string()).collect()
}

/// Text as `encode(convert_to(x, 'UTF8'), 'hex')` returns it.
pub fn hex(text: &str) -> String {
    text.bytes().map(|b| format!("{b:02x}")).collect()
}

pub fn table(schema: &str, name: &str, oid: u32, size_kb: u64) -> TableDescriptor {
    TableDescriptor {
        schema: schema.to_string(),
        table: name.to_string(),
        qualified: format!("{schema}.{name}"),
        oid,
        size_kb,
        primary_key: None,
    }
}

/// Query runner answering from a script: the first rule whose needle occurs in
/// the SQL wins; unmatched queries return no rows. Every query is recorded.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, Vec<Row>)>,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, rows: Vec<Row>) -> Self {
        self.rules.push((needle.to_string(), rows));
        self
    }

    pub fn queries_containing(&self, needle: &str) -> usize {
        self.seen.lock().iter().filter(|q| q.contains(needle)).count()
    }
}

impl QueryRunner for ScriptedRunner {
    fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.seen.lock().push(sql.to_string());
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

pub struct FixedListing(pub Vec<(String, String)>);

impl FixedListing {
    pub fn of(pairs: &[(&str, &str)]) -> Self {
        Self(pairs.iter().map(|(s, t)| (s.to_string(), t.to_string())).collect())
    }
}

impl TableListing for FixedListing {
    fn list_tables(&self) -> Result<Vec<(String, String)>> {
        Ok(self.0.clone())
    }
}

/// Launcher running `sh -c <script>` per blob and tracking concurrency.
/// Blob ids listed in `failing` run `exit 3` instead.
pub struct ShellLauncher {
    pub script: String,
    pub failing: BTreeSet<u32>,
    pub running: usize,
    pub peak: usize,
    pub finished: Vec<u32>,
}

impl ShellLauncher {
    pub fn new(script: &str) -> Self {
        Self {
            script: script.to_string(),
            failing: BTreeSet::new(),
            running: 0,
            peak: 0,
            finished: Vec::new(),
        }
    }

    pub fn failing(mut self, id: u32) -> Self {
        self.failing.insert(id);
        self
    }
}

impl Launcher for ShellLauncher {
    fn launch(&mut self, job: &ScheduledBlob, done: &CompletionSender) -> Result<u32> {
        let script = if self.failing.contains(&job.id) {
            "echo boom >&2; exit 3".to_string()
        } else {
            self.script.clone()
        };
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        self.running += 1;
        self.peak = self.peak.max(self.running);
        chunkdump::spawn_pipeline(job.id, vec![Stage::new("sh", cmd)], None, done)
    }

    fn finish(&mut self, job: &ScheduledBlob) -> Result<()> {
        self.running -= 1;
        self.finished.push(job.id);
        Ok(())
    }
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// A stand-in for psql that prints each argument on its own line.
#[cfg(unix)]
pub fn echo_psql(dir: &Path) -> PathBuf {
    write_script(dir, "fake_psql", "for a in \"$@\"; do printf '%s\\n' \"$a\"; done")
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
