//! Conversational analysis engine.
//!
//! Runs the staged protocol against a [`CompletionBackend`]:
//!
//! ```text
//! Enumerate (per window)
//!   └─ per candidate, one transcript:
//!        Locate → LocateFinalize → Verify → VerifyFinalize → Extract → ExtractFinalize
//!                                                                     └─ Accepted | Rejected
//! ```
//!
//! Each decision point is a free-form reasoning turn followed by a
//! "finalize" turn that must be JSON; the reasoning turn stays in the
//! transcript so the structured answer can build on it. A structured answer
//! that does not decode rejects the candidate without retrying.
//!
//! The engine holds no state across candidates apart from a token counter.
//! Backend failures (timeout, connection, HTTP) come back as
//! [`AnalysisError::Backend`]; the caller decides to skip and continue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::completion::{Completion, CompletionBackend};
use crate::decode::{self, LineRange};
use crate::error::{AnalysisError, CompletionError, DecodeError, Stage};
use crate::models::FunctionInfo;
use crate::prompt;
use crate::transcript::Transcript;
use crate::walker::Language;
use crate::window::Window;

/// 0-based, half-open line span `[start, end)` of a located function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

impl LineSpan {
    /// 1-based first line.
    pub fn line_start(&self) -> i64 {
        self.start as i64 + 1
    }

    /// 1-based last line (inclusive).
    pub fn line_end(&self) -> i64 {
        self.end as i64
    }
}

/// Why a candidate produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A finalize turn did not decode to the expected shape.
    Malformed(Stage),
    /// The committed line range is inverted or starts outside the window.
    InvalidRange { start_line: i64, end_line: i64 },
    /// The body is not entirely inside the window; a larger window may help.
    NotContained,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFunction {
    pub name: String,
    pub span: LineSpan,
    pub info: FunctionInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    Accepted(ExtractedFunction),
    Rejected(Rejection),
}

/// Map a backend-reported 1-based inclusive range onto `window`.
pub fn span_in_window(range: LineRange, window: &Window) -> Result<LineSpan, Rejection> {
    let invalid = Rejection::InvalidRange {
        start_line: range.start_line,
        end_line: range.end_line,
    };
    if range.start_line < 1 || range.end_line < range.start_line {
        return Err(invalid);
    }
    let start = (range.start_line - 1) as usize;
    if start < window.start() || start >= window.end() {
        return Err(invalid);
    }
    let end = range.end_line as usize;
    if end > window.end() {
        return Err(Rejection::NotContained);
    }
    Ok(LineSpan { start, end })
}

pub struct Engine<'a> {
    backend: &'a dyn CompletionBackend,
    language: Language,
    deadline: Duration,
    tokens: AtomicU64,
}

impl<'a> Engine<'a> {
    /// `deadline` bounds every single backend call.
    pub fn new(backend: &'a dyn CompletionBackend, language: Language, deadline: Duration) -> Self {
        Self {
            backend,
            language,
            deadline,
            tokens: AtomicU64::new(0),
        }
    }

    /// Tokens reported by the backend for all calls made so far.
    pub fn tokens_used(&self) -> u64 {
        self.tokens.load(Ordering::Relaxed)
    }

    async fn with_deadline<F>(&self, call: F) -> Result<Completion, AnalysisError>
    where
        F: std::future::Future<Output = Result<Completion, CompletionError>>,
    {
        let completion = tokio::time::timeout(self.deadline, call)
            .await
            .map_err(|_| CompletionError::Timeout(self.deadline))??;
        self.tokens.fetch_add(completion.tokens, Ordering::Relaxed);
        Ok(completion)
    }

    /// Append `prompt` as a user turn, ask for the next turn, record it.
    async fn ask(&self, transcript: &mut Transcript, prompt: String) -> Result<String, AnalysisError> {
        transcript.push_user(prompt);
        let completion = self
            .with_deadline(self.backend.chat(prompt::SYSTEM_PROMPT, transcript.turns()))
            .await?;
        transcript.push_assistant(completion.text.clone());
        Ok(completion.text)
    }

    /// Candidate names defined in `window`. An undecodable answer means no
    /// candidates, not an error.
    pub async fn enumerate(
        &self,
        lines: &[String],
        window: &Window,
    ) -> Result<Vec<String>, AnalysisError> {
        let request = prompt::enumerate(lines, window, self.language);
        let completion = self
            .with_deadline(self.backend.generate(prompt::SYSTEM_PROMPT, &request))
            .await?;

        match decode::candidates(&completion.text) {
            Ok(names) => Ok(names),
            Err(source) => {
                let err = AnalysisError::MalformedResponse {
                    stage: Stage::Enumerate,
                    source,
                };
                debug!(
                    start = window.start(),
                    end = window.end(),
                    error = %err,
                    "treating window as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Locate, verify and extract one candidate on a fresh transcript.
    pub async fn analyze_candidate(
        &self,
        name: &str,
        lines: &[String],
        window: &Window,
    ) -> Result<CandidateOutcome, AnalysisError> {
        let mut transcript = Transcript::new();

        // Locate
        self.ask(&mut transcript, prompt::locate(name, lines, window, self.language))
            .await?;
        let answer = self.ask(&mut transcript, prompt::locate_final(name)).await?;
        let range = match decode::line_range(&answer) {
            Ok(range) => range,
            Err(e) => return Ok(reject(name, Stage::Locate, e)),
        };
        let span = match span_in_window(range, window) {
            Ok(span) => span,
            Err(rejection) => {
                debug!(candidate = name, ?rejection, "located range unusable");
                return Ok(CandidateOutcome::Rejected(rejection));
            }
        };

        // Verify
        self.ask(
            &mut transcript,
            prompt::verify(name, range.start_line, range.end_line, self.language),
        )
        .await?;
        let answer = self.ask(&mut transcript, prompt::verify_final(name)).await?;
        match decode::verdict(&answer) {
            Ok(true) => {}
            Ok(false) => {
                debug!(candidate = name, "body not contained in window");
                return Ok(CandidateOutcome::Rejected(Rejection::NotContained));
            }
            Err(e) => return Ok(reject(name, Stage::Verify, e)),
        }

        // Extract
        self.ask(&mut transcript, prompt::extract(name, self.language))
            .await?;
        let answer = self.ask(&mut transcript, prompt::extract_final(name)).await?;
        let info = match decode::function_info(&answer) {
            Ok(info) => info,
            Err(e) => return Ok(reject(name, Stage::Extract, e)),
        };

        Ok(CandidateOutcome::Accepted(ExtractedFunction {
            name: name.to_string(),
            span,
            info,
        }))
    }
}

fn reject(name: &str, stage: Stage, source: DecodeError) -> CandidateOutcome {
    let err = AnalysisError::MalformedResponse { stage, source };
    debug!(candidate = name, error = %err, "candidate rejected");
    CandidateOutcome::Rejected(Rejection::Malformed(stage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{Role, Turn};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned answers in order and records every request.
    struct Replay {
        generate: Mutex<VecDeque<String>>,
        chat: Mutex<VecDeque<String>>,
        seen: Mutex<Vec<Vec<Turn>>>,
    }

    impl Replay {
        fn new(generate: &[&str], chat: &[&str]) -> Self {
            Self {
                generate: Mutex::new(generate.iter().map(|s| s.to_string()).collect()),
                chat: Mutex::new(chat.iter().map(|s| s.to_string()).collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for Replay {
        fn model_name(&self) -> &str {
            "replay"
        }

        async fn generate(&self, _system: &str, _prompt: &str) -> Result<Completion, CompletionError> {
            let text = self.generate.lock().unwrap().pop_front().unwrap_or_default();
            Ok(Completion { text, tokens: 5 })
        }

        async fn chat(&self, _system: &str, turns: &[Turn]) -> Result<Completion, CompletionError> {
            self.seen.lock().unwrap().push(turns.to_vec());
            match self.chat.lock().unwrap().pop_front() {
                Some(text) => Ok(Completion { text, tokens: 1 }),
                None => Err(CompletionError::Connection("script exhausted".into())),
            }
        }
    }

    struct Stalled;

    #[async_trait]
    impl CompletionBackend for Stalled {
        fn model_name(&self) -> &str {
            "stalled"
        }

        async fn generate(&self, _system: &str, _prompt: &str) -> Result<Completion, CompletionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Completion { text: String::new(), tokens: 0 })
        }

        async fn chat(&self, _system: &str, _turns: &[Turn]) -> Result<Completion, CompletionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Completion { text: String::new(), tokens: 0 })
        }
    }

    fn source() -> Vec<String> {
        ["func foo(a, b int) int {", "\treturn a + b", "}", "", "func bar() {}"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    const FOO_INFO: &str = r#"{"purpose":"adds two numbers","signature":"func foo(a,b int) int","arguments":"a, b: int","return":"int"}"#;

    #[test]
    fn span_translation() {
        let w = Window::initial(100, 100);
        let span = span_in_window(LineRange { start_line: 1, end_line: 3 }, &w).unwrap();
        assert_eq!(span, LineSpan { start: 0, end: 3 });
        assert_eq!((span.line_start(), span.line_end()), (1, 3));
    }

    #[test]
    fn span_rejections() {
        let mut w = Window::initial(300, 100);
        w.slide(100); // [100, 200)
        let r = |s, e| span_in_window(LineRange { start_line: s, end_line: e }, &w);
        assert!(matches!(r(0, 5), Err(Rejection::InvalidRange { .. })));
        assert!(matches!(r(150, 149), Err(Rejection::InvalidRange { .. })));
        assert!(matches!(r(50, 150), Err(Rejection::InvalidRange { .. })));
        assert!(matches!(r(201, 210), Err(Rejection::InvalidRange { .. })));
        assert_eq!(r(190, 230), Err(Rejection::NotContained));
        assert_eq!(r(101, 200), Ok(LineSpan { start: 100, end: 200 }));
    }

    #[tokio::test]
    async fn enumerate_decodes_names() {
        let backend = Replay::new(&[r#"[{"function_name":"foo"},{"function_name":""},{"function_name":"bar"}]"#], &[]);
        let engine = Engine::new(&backend, Language::Go, Duration::from_secs(5));
        let src = source();
        let names = engine
            .enumerate(&src, &Window::initial(src.len(), 100))
            .await
            .unwrap();
        assert_eq!(names, vec!["foo", "bar"]);
        assert_eq!(engine.tokens_used(), 5);
    }

    #[tokio::test]
    async fn enumerate_malformed_is_empty() {
        let backend = Replay::new(&["I found foo and bar."], &[]);
        let engine = Engine::new(&backend, Language::Go, Duration::from_secs(5));
        let src = source();
        let names = engine
            .enumerate(&src, &Window::initial(src.len(), 100))
            .await
            .unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn accepted_candidate_uses_one_growing_transcript() {
        let backend = Replay::new(
            &[],
            &[
                "foo starts at 1 and ends at 3",
                r#"{"start_line": 1, "end_line": 3}"#,
                "the closing brace is on line 3",
                r#"{"result": true}"#,
                "it adds a and b",
                FOO_INFO,
            ],
        );
        let engine = Engine::new(&backend, Language::Go, Duration::from_secs(5));
        let src = source();
        let outcome = engine
            .analyze_candidate("foo", &src, &Window::initial(src.len(), 100))
            .await
            .unwrap();

        match outcome {
            CandidateOutcome::Accepted(f) => {
                assert_eq!(f.name, "foo");
                assert_eq!((f.span.line_start(), f.span.line_end()), (1, 3));
                assert_eq!(f.info.purpose, "adds two numbers");
                assert_eq!(f.info.return_type, "int");
            }
            other => panic!("expected accepted, got {:?}", other),
        }

        let seen = backend.seen.lock().unwrap();
        let lens: Vec<usize> = seen.iter().map(|t| t.len()).collect();
        assert_eq!(lens, vec![1, 3, 5, 7, 9, 11]);
        let last = seen.last().unwrap();
        assert!(last[0].content.contains("   1 |\tfunc foo"));
        assert_eq!(last[1].role, Role::Assistant);
        assert_eq!(last[1].content, "foo starts at 1 and ends at 3");
    }

    #[tokio::test]
    async fn verify_false_rejects() {
        let backend = Replay::new(
            &[],
            &["...", r#"{"start_line": 1, "end_line": 3}"#, "...", r#"{"result": false}"#],
        );
        let engine = Engine::new(&backend, Language::Go, Duration::from_secs(5));
        let src = source();
        let outcome = engine
            .analyze_candidate("foo", &src, &Window::initial(src.len(), 100))
            .await
            .unwrap();
        assert_eq!(outcome, CandidateOutcome::Rejected(Rejection::NotContained));
        assert_eq!(backend.seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn unparsable_locate_rejects_without_retry() {
        let backend = Replay::new(&[], &["...", "lines one to three"]);
        let engine = Engine::new(&backend, Language::Go, Duration::from_secs(5));
        let src = source();
        let outcome = engine
            .analyze_candidate("foo", &src, &Window::initial(src.len(), 100))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CandidateOutcome::Rejected(Rejection::Malformed(Stage::Locate))
        );
        assert_eq!(backend.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unparsable_extract_rejects() {
        let backend = Replay::new(
            &[],
            &[
                "...",
                r#"{"start_line": 1, "end_line": 3}"#,
                "...",
                r#"{"result": true}"#,
                "...",
                "it adds numbers",
            ],
        );
        let engine = Engine::new(&backend, Language::Go, Duration::from_secs(5));
        let src = source();
        let outcome = engine
            .analyze_candidate("foo", &src, &Window::initial(src.len(), 100))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CandidateOutcome::Rejected(Rejection::Malformed(Stage::Extract))
        );
    }

    #[tokio::test]
    async fn backend_failure_is_an_error() {
        let backend = Replay::new(&[], &["..."]);
        let engine = Engine::new(&backend, Language::Go, Duration::from_secs(5));
        let src = source();
        let err = engine
            .analyze_candidate("foo", &src, &Window::initial(src.len(), 100))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Backend(CompletionError::Connection(_))));
    }

    #[tokio::test]
    async fn stalled_call_hits_deadline() {
        let engine = Engine::new(&Stalled, Language::Go, Duration::from_millis(50));
        let src = source();
        let err = engine
            .enumerate(&src, &Window::initial(src.len(), 100))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Backend(CompletionError::Timeout(_))));
    }
}
