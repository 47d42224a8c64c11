// Scripted stand-in for the container CLI.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use dockside_core::{
    CommandOutput, CommandRunner, ConvergencePolicy, Controller, CoreConfig, DataStore, ExecError,
    LoadingFlags,
};

/// One canned reaction to an invocation.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(String),
    Fail(i32, String),
    SpawnError,
    /// Hold the call open for a while, then answer with the inner reply.
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn json(value: &Value) -> Self {
        Self::Ok(value.to_string())
    }

    pub fn delayed(delay: Duration, reply: Self) -> Self {
        Self::Delayed(delay, Box::new(reply))
    }
}

/// What the runner saw on one invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub args: Vec<String>,
    pub stdin: Option<String>,
    /// Loading flags in the store at the moment the CLI was invoked.
    pub loading: LoadingFlags,
}

/// Replies are scripted per argv. The last reply for an argv repeats once
/// its script runs out; unscripted argv fail to spawn.
#[derive(Default)]
pub struct FakeRunner {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
    store: Mutex<Option<Arc<DataStore>>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, argv: &str, reply: Reply) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(argv.to_owned())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn observe(&self, store: &Arc<DataStore>) {
        *self.store.lock().unwrap() = Some(Arc::clone(store));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn argvs(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.args.join(" ")).collect()
    }

    pub fn count(&self, argv: &str) -> usize {
        self.argvs().iter().filter(|a| *a == argv).count()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, ExecError> {
        let loading = self
            .store
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.loading())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(Call {
            args: args.to_vec(),
            stdin: stdin.map(str::to_owned),
            loading,
        });

        let key = args.join(" ");
        let mut reply = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        while let Some(Reply::Delayed(delay, inner)) = reply {
            tokio::time::sleep(delay).await;
            reply = Some(*inner);
        }

        match reply {
            Some(Reply::Ok(stdout)) => Ok(CommandOutput::success(stdout)),
            Some(Reply::Fail(code, stderr)) => Ok(CommandOutput::failure(code, stderr)),
            Some(Reply::SpawnError | Reply::Delayed(..)) | None => Err(ExecError::Spawn {
                program: PathBuf::from(program),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            }),
        }
    }
}

pub fn config() -> CoreConfig {
    CoreConfig {
        program: PathBuf::from("/usr/local/bin/container"),
        refresh_interval: Duration::from_secs(5),
        convergence: ConvergencePolicy::default(),
    }
}

/// Controller wired to `runner`, with the runner watching its store.
pub fn controller(runner: &Arc<FakeRunner>) -> Controller {
    controller_with(runner, config())
}

pub fn controller_with(runner: &Arc<FakeRunner>, config: CoreConfig) -> Controller {
    let store = Arc::new(DataStore::new());
    runner.observe(&store);
    Controller::with_store(config, Arc::clone(runner) as Arc<dyn CommandRunner>, store)
}

// ── Fixtures ────────────────────────────────────────────────────────

pub const LIST_CONTAINERS: &str = "ls --all --format json";
pub const LIST_IMAGES: &str = "images list --format json";
pub const BUILDER_STATUS: &str = "builder status --json";

const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

pub fn container(id: &str, status: &str) -> Value {
    json!({
        "status": status,
        "configuration": {
            "id": id,
            "runtimeHandler": "container-runtime-linux",
            "platform": { "os": "linux", "architecture": "arm64" },
            "image": {
                "reference": "docker.io/library/nginx:latest",
                "descriptor": {
                    "digest": "sha256:abc",
                    "mediaType": OCI_INDEX,
                    "size": 1024
                }
            },
            "initProcess": {
                "terminal": false,
                "environment": ["PATH=/usr/bin"],
                "workingDirectory": "/",
                "arguments": [],
                "executable": "nginx",
                "user": { "id": { "uid": 0, "gid": 0 } }
            },
            "mounts": [],
            "rosetta": false,
            "resources": { "cpus": 4, "memoryInBytes": 1_073_741_824_u64 }
        },
        "networks": [{
            "gateway": "192.168.64.1",
            "hostname": id,
            "network": "default",
            "address": "192.168.64.2/24"
        }]
    })
}

pub fn with_mount(
    mut container: Value,
    source: &str,
    destination: &str,
    options: &[&str],
) -> Value {
    container["configuration"]["mounts"]
        .as_array_mut()
        .unwrap()
        .push(json!({
            "type": { "virtiofs": {} },
            "source": source,
            "destination": destination,
            "options": options,
        }));
    container
}

pub fn builder(status: &str) -> Value {
    json!({
        "status": status,
        "configuration": {
            "id": "buildkit",
            "labels": { "role": "builder" },
            "sysctls": {},
            "networks": ["default"]
        }
    })
}

pub fn image(reference: &str) -> Value {
    json!({
        "reference": reference,
        "descriptor": { "digest": "sha256:def", "mediaType": OCI_INDEX, "size": 2048 }
    })
}
