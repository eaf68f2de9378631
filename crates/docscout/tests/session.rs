use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use docscout::core::{STEP_LIMIT_MESSAGE, TranscriptSource};
use docscout::indexer::IndexingResult;
use docscout::tools::{SearchBackend, SearchError};
use docscout::{Session, SessionBuilder, WorkspaceContextBuilder};
use docscout_model::{ModelMessage, Role, ToolCallRequest};
use docscout_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use serde_json::{Value, json};
use tempfile::TempDir;

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for (path, content) in [
        ("README.md", "# Notes\n"),
        ("a/b/c.md", "C\n"),
        ("a/e/f/d.md", "D\n"),
        ("exam_notes/week1.md", "Week 1\n"),
        ("lectures/intro.md", "Intro\n"),
    ] {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

fn session(root: &Path, recursion_limit: usize) -> (Session, TestModelProvider) {
    let context = WorkspaceContextBuilder::with_workspace_root(root)
        .with_recursion_limit(recursion_limit)
        .build()
        .unwrap();
    let provider = TestModelProvider::default();
    let session = SessionBuilder::new(context, provider.clone()).build();
    (session, provider)
}

fn tool_call(id: &str, name: &str, arguments: Value) -> PresetEvent {
    PresetEvent::ToolCall(ToolCallRequest {
        id: id.to_owned(),
        name: name.to_owned(),
        arguments,
    })
}

fn roles(session: &Session) -> Vec<Role> {
    session
        .conversation()
        .items()
        .iter()
        .map(|item| item.role())
        .collect()
}

fn tool_payload(session: &Session, idx: usize) -> Value {
    let ModelMessage::Tool(result) = session.conversation().items()[idx].message()
    else {
        panic!("item {idx} is not a tool result");
    };
    serde_json::from_str(&result.content).unwrap()
}

#[tokio::test]
async fn test_answer_without_tools() {
    let dir = workspace();
    let (mut session, provider) = session(dir.path(), 25);
    provider.add_response(PresetResponse::text("A course workspace."));
    provider.add_response(PresetResponse::text("There are four documents."));

    let answer = session.send_message("What is in here?").await;
    assert_eq!(answer, "There are four documents.");
    assert_eq!(roles(&session), [Role::User, Role::Assistant, Role::Assistant]);

    let index: IndexingResult =
        serde_json::from_str(session.conversation().items()[1].transcript())
            .unwrap();
    assert_eq!(index.analysis_report, "A course workspace.");
    assert_eq!(index.document_count, 5);
    assert_eq!(
        index.directory_count,
        index.directory_structure_paths.len() + 1
    );

    // The agent sees the question and the index, with every tool bound.
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let agent_request = &requests[1];
    assert_eq!(agent_request.messages[0].role(), Role::System);
    assert_eq!(agent_request.messages[1], ModelMessage::User("What is in here?".to_owned()));
    assert_eq!(agent_request.messages[2].role(), Role::Assistant);
    let tool_names: Vec<_> =
        agent_request.tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(
        tool_names,
        ["find_directory", "list_directory_files", "read_file"]
    );
}

#[tokio::test]
async fn test_tool_results_before_next_model_turn() {
    let dir = workspace();
    let (mut session, provider) = session(dir.path(), 25);
    provider.add_response(PresetResponse::text("overview"));
    provider.add_response(PresetResponse::with_events([
        tool_call("call_1", "find_directory", json!({ "keyword": "exam" })),
        tool_call("call_2", "list_directory_files", json!({ "path": "a" })),
    ]));
    provider.add_response(PresetResponse::text("Exams are in exam_notes."));

    let answer = session.send_message("Where are my exams?").await;
    assert_eq!(answer, "Exams are in exam_notes.");
    assert_eq!(
        roles(&session),
        [
            Role::User,
            Role::Assistant,
            Role::Assistant,
            Role::Tool,
            Role::Tool,
            Role::Assistant,
        ]
    );

    let found = tool_payload(&session, 3);
    assert_eq!(found["matching_directories"], json!(["exam_notes"]));
    assert_eq!(found["count"], 1);
    let listed = tool_payload(&session, 4);
    assert_eq!(listed["files"], json!(["a/b/c.md", "a/e/f/d.md"]));

    // Both results are part of the request of the next model turn.
    let last_request = provider.requests().pop().unwrap();
    let tool_messages = last_request
        .messages
        .iter()
        .filter(|msg| msg.role() == Role::Tool)
        .count();
    assert_eq!(tool_messages, 2);
}

#[tokio::test]
async fn test_read_missing_file() {
    let dir = workspace();
    let (mut session, provider) = session(dir.path(), 25);
    provider.add_response(PresetResponse::text("overview"));
    provider.add_response(PresetResponse::with_events([tool_call(
        "call_1",
        "read_file",
        json!({ "path": "missing.md" }),
    )]));
    provider.add_response(PresetResponse::text("No such file."));

    session.send_message("Read missing.md").await;
    let payload = tool_payload(&session, 3);
    assert!(payload["error"].is_string());
    assert_eq!(payload["content"], Value::Null);
}

#[tokio::test]
async fn test_step_limit_apology() {
    let dir = workspace();
    let (mut session, provider) = session(dir.path(), 4);
    provider.add_response(PresetResponse::text("overview"));
    for id in ["call_1", "call_2"] {
        provider.add_response(PresetResponse::with_events([tool_call(
            id,
            "find_directory",
            json!({ "keyword": "a" }),
        )]));
    }

    let answer = session.send_message("Keep looking").await;
    assert_eq!(answer, STEP_LIMIT_MESSAGE);
    assert!(session.conversation().is_last_step());
    assert_eq!(
        roles(&session),
        [
            Role::User,
            Role::Assistant,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
        ]
    );
    assert_eq!(provider.remaining_responses(), 0);
}

#[tokio::test]
async fn test_missing_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, provider) = session(&dir.path().join("missing"), 25);
    provider.add_response(PresetResponse::text("The workspace is missing."));

    let answer = session.send_message("Hello").await;
    assert_eq!(answer, "The workspace is missing.");

    let index: IndexingResult =
        serde_json::from_str(session.conversation().items()[1].transcript())
            .unwrap();
    assert!(index.error.is_some());
    assert_eq!(index.document_count, 0);
    assert_eq!(index.directory_count, 0);
    assert!(index.directory_structure_paths.is_empty());
    // Only the agent talked to the model.
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn test_follow_up_reuses_index() {
    let dir = workspace();
    let (mut session, provider) = session(dir.path(), 25);
    provider.add_response(PresetResponse::text("overview"));
    provider.add_response(PresetResponse::text("First answer."));
    provider.add_response(PresetResponse::text("Second answer."));

    session.send_message("First?").await;
    let answer = session.send_message("Second?").await;
    assert_eq!(answer, "Second answer.");
    assert_eq!(session.conversation().items().len(), 5);
    // The follow-up runs with a fresh step budget.
    assert_eq!(session.conversation().step(), 1);

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[2].messages.len(), 5);
}

#[tokio::test]
async fn test_transcripts() {
    let dir = workspace();
    let context = WorkspaceContextBuilder::with_workspace_root(dir.path())
        .build()
        .unwrap();
    let provider = TestModelProvider::default();
    provider.add_response(PresetResponse::text("overview"));
    provider.add_response(PresetResponse::text("Done."));

    let transcripts = Arc::new(Mutex::new(vec![]));
    let mut session = SessionBuilder::new(context, provider)
        .on_transcript({
            let transcripts = Arc::clone(&transcripts);
            move |transcript, source| {
                transcripts
                    .lock()
                    .unwrap()
                    .push((transcript.to_owned(), source));
            }
        })
        .build();
    session.send_message("Hi").await;

    // The index is not reported, it is not meant for the user.
    assert_eq!(
        *transcripts.lock().unwrap(),
        [
            ("Hi".to_owned(), TranscriptSource::User),
            ("Done.".to_owned(), TranscriptSource::Assistant),
        ]
    );
}

struct StaticSearch;

impl SearchBackend for StaticSearch {
    fn search(
        &self,
        query: &str,
        _max_results: usize,
    ) -> impl Future<Output = Result<Value, SearchError>> + Send + 'static {
        let result = json!({
            "query": query,
            "results": [
                { "title": "one" },
                { "title": "two" },
                { "title": "three" },
            ],
        });
        std::future::ready(Ok(result))
    }
}

#[tokio::test]
async fn test_search_backend() {
    let dir = workspace();
    let context = WorkspaceContextBuilder::with_workspace_root(dir.path())
        .with_max_search_results(2)
        .build()
        .unwrap();
    let provider = TestModelProvider::default();
    provider.add_response(PresetResponse::text("overview"));
    provider.add_response(PresetResponse::with_events([tool_call(
        "call_1",
        "search",
        json!({ "query": "rust" }),
    )]));
    provider.add_response(PresetResponse::text("Found two."));
    let mut session = SessionBuilder::new(context, provider.clone())
        .with_search_backend(StaticSearch)
        .build();

    session.send_message("Search the web").await;
    let payload = tool_payload(&session, 3);
    assert_eq!(payload["query"], "rust");
    assert_eq!(payload["results"].as_array().unwrap().len(), 2);
    assert!(
        provider.requests()[1]
            .tools
            .iter()
            .any(|tool| tool.name == "search")
    );
}
