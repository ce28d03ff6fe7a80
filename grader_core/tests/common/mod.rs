#![allow(dead_code)]

use async_trait::async_trait;
use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use grader_core::{
    error::{Error, Result},
    policy::RunLimits,
    sandbox::{RunOutput, RunRequest, SandboxExecutor},
    submission::{Language, Submission},
};

#[derive(Clone)]
pub enum Behaviour {
    Reply(RunOutput),
    /// Never returns on its own.
    Hang,
    Fail(String),
    Panic(String),
}

pub fn reply(exit_code: i32, stdout: &str, report: &str) -> Behaviour {
    Behaviour::Reply(RunOutput {
        exit_code,
        stdout: stdout.into(),
        stderr: String::new(),
        report: report.into(),
    })
}

/// What the fake saw on one `run` call.
#[derive(Debug, Clone)]
pub struct Seen {
    pub script: String,
    pub content: String,
    pub limits: RunLimits,
    pub stdin: Option<String>,
    pub box_files: Vec<String>,
}

pub struct FakeExecutor {
    dir: tempfile::TempDir,
    pub fail_init: bool,
    pub compile: Mutex<Behaviour>,
    pub run: Mutex<Behaviour>,
    /// Consumed one per run before falling back to `run`.
    pub run_queue: Mutex<VecDeque<Behaviour>>,
    pub inits: AtomicUsize,
    pub cleanups: AtomicUsize,
    pub seen: Mutex<Vec<Seen>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            dir: tempfile::TempDir::new().unwrap(),
            fail_init: false,
            compile: Mutex::new(reply(0, "", "time:0.1\ntime-wall:0.2\nmax-rss:2000\nexitcode:0")),
            run: Mutex::new(reply(0, "", "time:0.1\ntime-wall:0.2\nmax-rss:2000\nexitcode:0")),
            run_queue: Mutex::new(VecDeque::new()),
            inits: AtomicUsize::new(0),
            cleanups: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_run(self, behaviour: Behaviour) -> Self {
        *self.run.lock().unwrap() = behaviour;
        self
    }

    pub fn with_runs(self, behaviours: Vec<Behaviour>) -> Self {
        *self.run_queue.lock().unwrap() = behaviours.into();
        self
    }

    pub fn with_compile(self, behaviour: Behaviour) -> Self {
        *self.compile.lock().unwrap() = behaviour;
        self
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn runs_of(&self, script: &str) -> Vec<Seen> {
        self.seen().into_iter().filter(|s| s.script == script).collect()
    }

    pub fn workdir(&self, box_id: u64) -> PathBuf {
        self.dir.path().join(box_id.to_string())
    }
}

#[async_trait]
impl SandboxExecutor for FakeExecutor {
    async fn init(&self, box_id: u64, _cgroups: bool) -> Result<PathBuf> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(Error::SandboxInit {
                box_id,
                msg: "box is busy".into(),
            });
        }
        let workdir = self.workdir(box_id);
        std::fs::create_dir_all(workdir.join("box"))?;
        Ok(workdir)
    }

    async fn run(&self, request: &RunRequest) -> Result<RunOutput> {
        let boxdir = request.workdir.join("box");
        let content = std::fs::read_to_string(boxdir.join(&request.script))?;
        let mut box_files: Vec<String> = std::fs::read_dir(&boxdir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        box_files.sort();
        self.seen.lock().unwrap().push(Seen {
            script: request.script.clone(),
            content,
            limits: request.limits.clone(),
            stdin: request.stdin.clone(),
            box_files,
        });

        let behaviour = if request.script == "compile.sh" {
            self.compile.lock().unwrap().clone()
        } else {
            let queued = self.run_queue.lock().unwrap().pop_front();
            queued.unwrap_or_else(|| self.run.lock().unwrap().clone())
        };
        match behaviour {
            Behaviour::Reply(output) => Ok(output),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(RunOutput::default())
            }
            Behaviour::Fail(msg) => Err(Error::Sandbox(msg)),
            Behaviour::Panic(msg) => panic!("{}", msg),
        }
    }

    async fn cleanup(&self, _box_id: u64, _cgroups: bool) -> Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn python() -> Language {
    Language {
        id: 71,
        name: "Python (3.8.1)".into(),
        compile_cmd: "".into(),
        run_cmd: "/usr/local/python-3.8.1/bin/python3 script.py".into(),
        source_file: "script.py".into(),
        is_archived: false,
    }
}

pub fn c() -> Language {
    Language {
        id: 50,
        name: "C (GCC 9.2.0)".into(),
        compile_cmd: "/usr/local/gcc-9.2.0/bin/gcc %s main.c".into(),
        run_cmd: "./a.out".into(),
        source_file: "main.c".into(),
        is_archived: false,
    }
}

pub fn submission(id: u64, language: Language) -> Submission {
    Submission::new(id, language, "print(input())".into())
}
