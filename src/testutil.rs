//! In-memory port fakes shared by unit tests.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use crate::context::ServiceContext;
use crate::model::{
    GenerationConstraints, GenerationRequest, GenerationResponse, HarnessPlan, MethodTarget,
};
use crate::ports::clock::Clock;
use crate::ports::credentials::CredentialProvider;
use crate::ports::emitter::TestFileEmitter;
use crate::ports::filesystem::FileSystem;
use crate::ports::id_gen::IdGenerator;
use crate::ports::process::{ProcessFuture, ProcessOutput, ProcessRequest, ProcessRunner};
use crate::ports::source::SourceResolver;

/// Clock pinned to a fixed instant.
#[derive(Clone)]
pub(crate) struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        Self(Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Sequential id generator: `id-1`, `id-2`, ...
#[derive(Clone, Default)]
pub(crate) struct SeqIds(Arc<AtomicU64>);

impl IdGenerator for SeqIds {
    fn generate_id(&self) -> String {
        format!("id-{}", self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// In-memory filesystem keyed by path.
#[derive(Clone, Default)]
pub(crate) struct MemFs {
    files: Arc<Mutex<BTreeMap<PathBuf, String>>>,
    dirs: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MemFs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, path: impl Into<PathBuf>, content: &str) {
        self.files.lock().unwrap().insert(path.into(), content.to_string());
    }

    pub(crate) fn content(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.lock().unwrap().get(path.as_ref()).cloned()
    }

    pub(crate) fn created_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.dirs.lock().unwrap().iter().cloned().collect();
        dirs.sort();
        dirs
    }
}

impl FileSystem for MemFs {
    fn read_to_string(
        &self,
        path: &Path,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| format!("no such file: {}", path.display()).into())
    }

    fn write(
        &self,
        path: &Path,
        contents: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.files.lock().unwrap().insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
            || self.dirs.lock().unwrap().contains(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.dirs.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    fn find_files(
        &self,
        dir: &Path,
        suffix: &str,
    ) -> Result<Vec<PathBuf>, Box<dyn std::error::Error + Send + Sync>> {
        let mut found: Vec<PathBuf> = self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|p| p.starts_with(dir) && p.to_string_lossy().ends_with(suffix))
            .cloned()
            .collect();
        found.sort();
        Ok(found)
    }
}

/// Process runner that replays scripted outcomes and records requests.
#[derive(Clone, Default)]
pub(crate) struct ScriptedProcess {
    outcomes: Arc<Mutex<VecDeque<Result<ProcessOutput, String>>>>,
    requests: Arc<Mutex<Vec<ProcessRequest>>>,
}

impl ScriptedProcess {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues a successful process completion.
    pub(crate) fn push_exit(&self, exit_code: i32, stdout: &str, stderr: &str) {
        self.outcomes.lock().unwrap().push_back(Ok(ProcessOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }));
    }

    /// Queues a spawn failure.
    pub(crate) fn push_error(&self, message: &str) {
        self.outcomes.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub(crate) fn requests(&self) -> Vec<ProcessRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ProcessRunner for ScriptedProcess {
    fn run(&self, request: &ProcessRequest) -> ProcessFuture<'_> {
        self.requests.lock().unwrap().push(request.clone());
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ProcessOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            }));
        Box::pin(async move { outcome.map_err(Into::into) })
    }
}

/// Source resolver producing minimal requests without touching disk.
#[derive(Clone, Default)]
pub(crate) struct StubResolver {
    /// Methods returned by `find_all_methods`.
    pub all_methods: Arc<Mutex<Vec<MethodTarget>>>,
    /// Display names for which `collect_context` fails.
    pub failing: Arc<Mutex<HashSet<String>>>,
}

impl StubResolver {
    pub(crate) fn fail_for(&self, display_name: &str) {
        self.failing.lock().unwrap().insert(display_name.to_string());
    }
}

impl SourceResolver for StubResolver {
    fn collect_context(
        &self,
        target: &MethodTarget,
        request_id: &str,
        constraints: GenerationConstraints,
    ) -> Result<GenerationRequest, Box<dyn std::error::Error + Send + Sync>> {
        if self.failing.lock().unwrap().contains(&target.method_display_name) {
            return Err(format!("method {} not found", target.method_display_name).into());
        }
        Ok(GenerationRequest {
            request_id: request_id.to_string(),
            target_method: target.clone(),
            method_signature: target.method_display_name.clone(),
            containing_type_source: format!("class {} {{ }}", target.type_full_name),
            method_source: "return 0;".to_string(),
            branch_hints: Vec::new(),
            harness_plan: HarnessPlan::default(),
            constraints,
        })
    }

    fn find_all_methods(
        &self,
        filter: Option<&str>,
    ) -> Result<Vec<MethodTarget>, Box<dyn std::error::Error + Send + Sync>> {
        let methods = self.all_methods.lock().unwrap().clone();
        match filter {
            None => Ok(methods),
            Some(needle) => {
                let needle = needle.to_lowercase();
                Ok(methods
                    .into_iter()
                    .filter(|m| m.type_full_name.to_lowercase().contains(&needle))
                    .collect())
            }
        }
    }
}

/// Emitter that records what it was asked to write.
#[derive(Clone, Default)]
pub(crate) struct RecordingEmitter {
    /// `(method_id, proposed test count, output dir)` per call.
    pub emitted: Arc<Mutex<Vec<(String, usize, PathBuf)>>>,
}

impl TestFileEmitter for RecordingEmitter {
    fn emit(
        &self,
        response: &GenerationResponse,
        target: &MethodTarget,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, Box<dyn std::error::Error + Send + Sync>> {
        self.emitted.lock().unwrap().push((
            target.method_id.clone(),
            response.proposed_tests.len(),
            output_dir.to_path_buf(),
        ));
        if response.proposed_tests.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![output_dir.join("GeneratedTests.cs")])
    }
}

/// Credential provider with fixed tokens.
pub(crate) struct StaticCreds {
    tokens: Mutex<VecDeque<String>>,
}

impl StaticCreds {
    pub(crate) fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: Mutex::new(tokens.iter().map(ToString::to_string).collect()),
        }
    }
}

impl CredentialProvider for StaticCreds {
    fn acquire(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        self.tokens
            .lock()
            .unwrap()
            .front()
            .cloned()
            .ok_or_else(|| "no token".into())
    }

    fn refresh(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let mut tokens = self.tokens.lock().unwrap();
        if tokens.len() > 1 {
            tokens.pop_front();
        }
        tokens.front().cloned().ok_or_else(|| "no token".into())
    }
}

/// Assembles a full fake context. Pass clones of the fakes you need to
/// inspect after the run.
pub(crate) fn test_context(
    fs: MemFs,
    process: ScriptedProcess,
    resolver: StubResolver,
    emitter: RecordingEmitter,
) -> ServiceContext {
    ServiceContext {
        clock: Box::new(FixedClock::default()),
        fs: Box::new(fs),
        process: Box::new(process),
        id_gen: Box::new(SeqIds::default()),
        source: Box::new(resolver),
        emitter: Box::new(emitter),
        credentials: Arc::new(StaticCreds::new(&["test-token"])),
    }
}

/// A method target with one uncovered line, for loop and gate tests.
pub(crate) fn sample_target(id: &str, branches: usize, lines: usize) -> MethodTarget {
    use crate::model::{BranchPoint, SequencePoint};
    MethodTarget {
        method_id: id.to_string(),
        type_full_name: format!("Demo.Type{id}"),
        method_display_name: format!("Type{id}.Method{id}"),
        source_files: vec!["src/Demo.cs".to_string()],
        uncovered_sequence_points: (0..lines)
            .map(|i| SequencePoint {
                file: "src/Demo.cs".to_string(),
                start_line: u32::try_from(10 + i).unwrap_or(10),
                end_line: u32::try_from(10 + i).unwrap_or(10),
                start_col: None,
                end_col: None,
            })
            .collect(),
        uncovered_branch_points: (0..branches)
            .map(|i| BranchPoint {
                file: "src/Demo.cs".to_string(),
                line: 20,
                path_ordinal: u32::try_from(i).unwrap_or(0),
                offset: None,
            })
            .collect(),
    }
}

/// Scripted HTTP/1.1 responder for exercising the networked backends
/// against a real socket. Serves one canned `(status, body)` pair per
/// connection, in order, then stops accepting.
pub(crate) struct StubHttp {
    /// Base URL of the listener, e.g. `http://127.0.0.1:41234`.
    pub base_url: String,
    /// Raw request text (head plus body), one entry per connection.
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl StubHttp {
    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn request(&self, index: usize) -> String {
        self.requests.lock().unwrap()[index].clone()
    }
}

/// Binds an ephemeral listener and serves the canned responses.
pub(crate) async fn serve_http(responses: Vec<(u16, String)>) -> StubHttp {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let Ok(n) = stream.read(&mut chunk).await else {
                    return;
                };
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(head_end) = find_subsequence(&buf, b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..head_end]);
                    let content_length = head
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            if name.trim().eq_ignore_ascii_case("content-length") {
                                value.trim().parse::<usize>().ok()
                            } else {
                                None
                            }
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }
            seen.lock().unwrap().push(String::from_utf8_lossy(&buf).into_owned());

            let reason = match status {
                200 => "OK",
                401 => "Unauthorized",
                404 => "Not Found",
                500 => "Internal Server Error",
                _ => "Other",
            };
            let reply = format!(
                "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    StubHttp { base_url, requests }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
