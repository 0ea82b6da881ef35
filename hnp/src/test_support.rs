//! Test-only fakes and a two-player table sharing one ledger.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use crate::core::round::PatchReview;
use crate::io::clock::Clock;
use crate::io::config::GameSettings;
use crate::io::docker::ServiceRuntime;
use crate::io::git::Vcs;
use crate::io::prompt::Prompter;
use crate::workspace::Workspace;

/// Temp directory holding one workspace per player plus a shared ledger.
pub struct TestTable {
    dir: TempDir,
}

impl TestTable {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("shared"))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Settings every workspace on this table uses.
    pub fn settings(&self) -> GameSettings {
        GameSettings {
            ledger_path: self.dir.path().join("shared").join("hnp_global.json"),
            ..GameSettings::default()
        }
    }

    /// Workspace directory `name` (created on first use).
    pub fn workspace(&self, name: &str) -> Workspace {
        let root = self.dir.path().join(name);
        fs::create_dir_all(&root).expect("create workspace dir");
        Workspace::new(root, self.settings())
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: DateTime<Utc>,
    now: Rc<Cell<DateTime<Utc>>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2025, 3, 1, 10, 0, 0)
            .single()
            .expect("valid start time");
        Self {
            start,
            now: Rc::new(Cell::new(start)),
        }
    }
}

impl ManualClock {
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn advance(&self, secs: i64) {
        self.advance_by(Duration::seconds(secs));
    }

    pub fn advance_by(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// Runtime that records calls instead of running docker.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    calls: RefCell<Vec<String>>,
    fail_on: Option<&'static str>,
    run_delay: Option<(ManualClock, i64)>,
}

impl FakeRuntime {
    /// Fails the `build`, `run` or `stop` step.
    pub fn failing(step: &'static str) -> Self {
        Self {
            fail_on: Some(step),
            ..Self::default()
        }
    }

    /// Move `clock` forward by `secs` while the container starts.
    pub fn advancing(mut self, clock: &ManualClock, secs: i64) -> Self {
        self.run_delay = Some((clock.clone(), secs));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, step: &'static str, call: String) -> Result<()> {
        self.calls.borrow_mut().push(call);
        if self.fail_on == Some(step) {
            return Err(anyhow!("docker {step} failed (scripted)"));
        }
        Ok(())
    }
}

impl ServiceRuntime for FakeRuntime {
    fn build_image(&self, image: &str, _context: &Path) -> Result<()> {
        self.record("build", format!("build {image}"))
    }

    fn run_container(&self, image: &str, ports: &str) -> Result<String> {
        self.record("run", format!("run {image} {ports}"))?;
        if let Some((clock, secs)) = &self.run_delay {
            clock.advance(*secs);
        }
        Ok("c0ffee01".to_string())
    }

    fn stop_container(&self, id: &str) -> Result<()> {
        self.record("stop", format!("stop {id}"))
    }
}

/// Repository that records calls instead of running git.
#[derive(Debug, Default)]
pub struct FakeVcs {
    calls: RefCell<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl FakeVcs {
    /// Fails the `checkout -b`, `merge`, `push` or `reset --hard` step.
    pub fn failing(step: &'static str) -> Self {
        Self {
            fail_on: Some(step),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, step: &'static str, call: String) -> Result<()> {
        self.calls.borrow_mut().push(call);
        if self.fail_on == Some(step) {
            return Err(anyhow!("git {step} failed (scripted)"));
        }
        Ok(())
    }
}

impl Vcs for FakeVcs {
    fn create_branch(&self, branch: &str) -> Result<()> {
        self.record("checkout -b", format!("checkout -b {branch}"))
    }

    fn merge_into(&self, target: &str, branch: &str) -> Result<()> {
        self.record("merge", format!("merge {branch} into {target}"))
    }

    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.record("push", format!("push {remote} {branch}"))
    }

    fn reset_hard(&self, rev: &str) -> Result<()> {
        self.record("reset --hard", format!("reset --hard {rev}"))
    }
}

/// Prompter with canned answers. Panics on a question nobody scripted.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    username: Option<String>,
    answers: RefCell<VecDeque<bool>>,
    username_prompts: Cell<usize>,
    budget_prompts: Cell<usize>,
}

impl ScriptedPrompter {
    pub fn with_username(name: &str) -> Self {
        Self {
            username: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Queue answers for over-budget confirmations, in order.
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub fn username_prompts(&self) -> usize {
        self.username_prompts.get()
    }

    pub fn budget_prompts(&self) -> usize {
        self.budget_prompts.get()
    }
}

impl Prompter for ScriptedPrompter {
    fn username(&self) -> Result<String> {
        self.username_prompts.set(self.username_prompts.get() + 1);
        Ok(self
            .username
            .clone()
            .expect("unexpected username prompt"))
    }

    fn confirm_over_budget(&self, review: &PatchReview) -> Result<bool> {
        self.budget_prompts.set(self.budget_prompts.get() + 1);
        let answer = self
            .answers
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected budget prompt for {review:?}"));
        Ok(answer)
    }
}
