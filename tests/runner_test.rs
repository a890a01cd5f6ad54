use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ruload::http::{EngineResponse, HttpEngine, HttpError, PostPayload};
use ruload::parser::{Document, Request};
use ruload::runner::{self, CorrelationWorker, RunError, RunnerRegistry, Sequence, TestGroup, Worker};
use ruload::variable::CaptureError;

/// 脚本化的假引擎：按 URL 匹配返回预置响应，并记录每次请求
struct ScriptedEngine {
    responses: Vec<(String, u16, String)>,
    log: Mutex<Vec<RequestRecord>>,
}

#[derive(Debug, Clone, PartialEq)]
struct RequestRecord {
    method: String,
    url: String,
    parameters: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl ScriptedEngine {
    fn new(responses: Vec<(&str, u16, &str)>) -> Self {
        Self {
            responses: responses
                .into_iter()
                .map(|(url, status, body)| (url.to_string(), status, body.to_string()))
                .collect(),
            log: Mutex::new(Vec::new()),
        }
    }

    fn respond(&self, url: &str) -> Result<EngineResponse, HttpError> {
        for (pattern, status, body) in &self.responses {
            if url.starts_with(pattern.as_str()) {
                return Ok(EngineResponse::new(*status, body.clone(), Duration::ZERO));
            }
        }
        Err(HttpError::Other(format!("no scripted response for {}", url)))
    }

    fn log(&self) -> Vec<RequestRecord> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpEngine for ScriptedEngine {
    async fn get(
        &self,
        url: &str,
        parameters: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<EngineResponse, HttpError> {
        self.log.lock().unwrap().push(RequestRecord {
            method: "GET".to_string(),
            url: url.to_string(),
            parameters: parameters.to_vec(),
            headers: headers.to_vec(),
            body: None,
        });
        self.respond(url)
    }

    async fn post(
        &self,
        url: &str,
        payload: PostPayload<'_>,
        headers: &[(String, String)],
    ) -> Result<EngineResponse, HttpError> {
        let (parameters, body) = match payload {
            PostPayload::Body(text) => (Vec::new(), Some(text.to_string())),
            PostPayload::Params(params) => (params.to_vec(), None),
        };
        self.log.lock().unwrap().push(RequestRecord {
            method: "POST".to_string(),
            url: url.to_string(),
            parameters,
            headers: headers.to_vec(),
            body,
        });
        self.respond(url)
    }
}

fn login_document() -> Document {
    let mut doc = Document::new().with_filename("login.webtest");

    let mut login = Request::new("http://app/login", "POST", 2);
    login.add_parameter(Some("username".to_string()), Some("{USERNAME}".to_string()));
    login.capture = "{SID = <sid>(.+)</sid>}".to_string();
    doc.add_request(login);

    doc
}

fn browse_document() -> Document {
    let mut doc = Document::new().with_filename("browse.webtest");

    let mut browse = Request::new("http://app/home", "GET", 2);
    browse.add_parameter(Some("session".to_string()), Some("{SID}".to_string()));
    browse.add_header(Some("X-Session".to_string()), Some("{SID}".to_string()));
    doc.add_request(browse);

    doc
}

fn registry_with(documents: Vec<Document>, groups: Vec<TestGroup>) -> Arc<RunnerRegistry> {
    let mut builder = RunnerRegistry::builder()
        .think_time(Duration::ZERO)
        .variable("USERNAME", "phil");
    for document in documents {
        builder = builder.document(document).unwrap();
    }
    Arc::new(builder.groups(groups).build().unwrap())
}

#[tokio::test]
async fn test_capture_carries_across_documents() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        ("http://app/login", 200, "<sid>314159265</sid>"),
        ("http://app/home", 200, "welcome"),
    ]));
    let registry = registry_with(
        vec![login_document(), browse_document()],
        vec![TestGroup::from_members(vec![
            "login.webtest".to_string(),
            "browse.webtest".to_string(),
        ])],
    );

    let mut worker = Worker::new(registry, engine.clone(), 0).await.unwrap();
    let stats = worker.call().await.unwrap();
    worker.shutdown().await;

    assert_eq!(stats.requests, 2);
    assert!(stats.success());
    assert_eq!(worker.variables().get("SID"), Some("314159265"));

    let log = engine.log();
    assert_eq!(log.len(), 2);
    // 登录参数展开了默认变量
    assert_eq!(log[0].parameters[0], ("username".to_string(), "phil".to_string()));
    // 第二个请求的参数和 header 值都展开了捕获到的 SID
    assert_eq!(log[1].parameters[0], ("session".to_string(), "314159265".to_string()));
    assert_eq!(log[1].headers[0], ("X-Session".to_string(), "314159265".to_string()));
}

#[tokio::test]
async fn test_before_and_after_groups_run_once() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        ("http://app/login", 200, "<sid>1</sid>"),
        ("http://app/home", 200, "ok"),
    ]));
    let registry = Arc::new(
        RunnerRegistry::builder()
            .think_time(Duration::ZERO)
            .variable("USERNAME", "phil")
            .document(login_document())
            .unwrap()
            .document(browse_document())
            .unwrap()
            .before(TestGroup::new("login.webtest"))
            .after(TestGroup::new("login.webtest"))
            .group(TestGroup::new("browse.webtest"))
            .build()
            .unwrap(),
    );

    let mut worker = Worker::new(registry, engine.clone(), 0).await.unwrap();
    worker.call().await.unwrap();
    worker.call().await.unwrap();
    worker.shutdown().await;

    let urls: Vec<String> = engine.log().iter().map(|r| r.url.clone()).collect();
    assert_eq!(
        urls,
        vec![
            "http://app/login", // before
            "http://app/home",
            "http://app/home",
            "http://app/login", // after
        ]
    );
}

#[tokio::test]
async fn test_http_failure_counts_but_does_not_abort() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        ("http://app/login", 500, "boom"),
    ]));
    let mut doc = Document::new().with_filename("login.webtest");
    doc.add_request(Request::new("http://app/login", "POST", 2));
    let registry = registry_with(vec![doc], vec![TestGroup::new("login.webtest")]);

    let mut worker = Worker::new(registry, engine, 0).await.unwrap();
    let stats = worker.call().await.unwrap();

    assert_eq!(stats.requests, 1);
    assert_eq!(stats.failed, 1);
    assert!(!stats.success());
}

#[tokio::test]
async fn test_capture_miss_is_recoverable() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        ("http://app/login", 200, "no session here"),
    ]));
    let registry = registry_with(
        vec![login_document()],
        vec![TestGroup::new("login.webtest")],
    );

    let mut worker = Worker::new(registry, engine, 0).await.unwrap();
    let err = worker.call().await.unwrap_err();

    assert!(err.is_recoverable());
    assert!(matches!(
        err,
        RunError::Capture(CaptureError::NotFound { .. })
    ));
    // 捕获失败不留下半截变量
    assert_eq!(worker.variables().get("SID"), None);
}

#[tokio::test]
async fn test_unsupported_method_is_fatal() {
    let engine = Arc::new(ScriptedEngine::new(vec![("http://app/", 200, "ok")]));
    let mut doc = Document::new().with_filename("delete.webtest");
    doc.add_request(Request::new("http://app/thing", "DELETE", 7));
    let registry = registry_with(vec![doc], vec![TestGroup::new("delete.webtest")]);

    let mut worker = Worker::new(registry, engine, 0).await.unwrap();
    let err = worker.call().await.unwrap_err();

    assert!(!err.is_recoverable());
    match err {
        RunError::UnsupportedMethod { method, line } => {
            assert_eq!(method, "DELETE");
            assert_eq!(line, 7);
        }
        other => panic!("expected UnsupportedMethod, got {:?}", other),
    }
}

#[tokio::test]
async fn test_post_body_takes_precedence_over_params() {
    let engine = Arc::new(ScriptedEngine::new(vec![("http://app/api", 200, "ok")]));
    let mut doc = Document::new().with_filename("api.webtest");
    let mut req = Request::new("http://app/api", "POST", 2);
    req.add_parameter(Some("ignored".to_string()), Some("x".to_string()));
    req.body = r#"{"user": "{USERNAME}"}"#.to_string();
    doc.add_request(req);
    let registry = registry_with(vec![doc], vec![TestGroup::new("api.webtest")]);

    let mut worker = Worker::new(registry, engine.clone(), 0).await.unwrap();
    worker.call().await.unwrap();

    let log = engine.log();
    assert_eq!(log[0].body.as_deref(), Some(r#"{"user": "phil"}"#));
    assert!(log[0].parameters.is_empty());
}

#[tokio::test]
async fn test_run_workers_reports() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        ("http://app/home", 200, "ok"),
    ]));
    // browse 需要 SID，预置为默认变量
    let registry = Arc::new(
        RunnerRegistry::builder()
            .think_time(Duration::ZERO)
            .variable("SID", "42")
            .document(browse_document())
            .unwrap()
            .group(TestGroup::new("browse.webtest"))
            .build()
            .unwrap(),
    );

    let reports = runner::run_workers(registry, engine, 3, 2).await;

    assert_eq!(reports.len(), 3);
    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report.index, i);
        assert_eq!(report.invocations, 2);
        assert_eq!(report.requests, 2);
        assert_eq!(report.failed, 0);
        assert!(report.fatal.is_none());
    }
}

#[tokio::test]
async fn test_thread_sequence_pins_groups() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        ("http://app/home", 200, "ok"),
        ("http://app/other", 200, "ok"),
    ]));
    let mut other = Document::new().with_filename("other.webtest");
    other.add_request(Request::new("http://app/other", "GET", 2));

    let registry = Arc::new(
        RunnerRegistry::builder()
            .think_time(Duration::ZERO)
            .variable("SID", "42")
            .document(browse_document())
            .unwrap()
            .document(other)
            .unwrap()
            .sequence(Sequence::Thread)
            .group(TestGroup::new("browse.webtest"))
            .group(TestGroup::new("other.webtest"))
            .build()
            .unwrap(),
    );

    let mut worker0 = Worker::new(registry.clone(), engine.clone(), 0).await.unwrap();
    let mut worker2 = Worker::new(registry.clone(), engine.clone(), 2).await.unwrap();
    let mut worker1 = Worker::new(registry, engine.clone(), 1).await.unwrap();

    worker0.call().await.unwrap();
    worker1.call().await.unwrap();
    worker2.call().await.unwrap();

    let urls: Vec<String> = engine.log().iter().map(|r| r.url.clone()).collect();
    assert_eq!(
        urls,
        vec!["http://app/home", "http://app/other", "http://app/home"]
    );
}

#[tokio::test]
async fn test_correlation_finds_parameter_in_earlier_response() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        ("http://app/login", 200, "form with session_id field"),
        ("http://app/home", 200, "ok"),
    ]));

    // 关联只在同一文件内检索更早的响应
    let mut doc = Document::new().with_filename("session.webtest");
    doc.add_request(Request::new("http://app/login", "GET", 2));
    let mut req = Request::new("http://app/home", "GET", 8);
    req.add_parameter(Some("session_id".to_string()), Some("12345".to_string()));
    req.add_parameter(Some("unrelated".to_string()), Some("x".to_string()));
    doc.add_request(req);

    let registry = Arc::new(
        RunnerRegistry::builder()
            .think_time(Duration::ZERO)
            .document(doc)
            .unwrap()
            .group(TestGroup::new("session.webtest"))
            .build()
            .unwrap(),
    );

    let mut correlator = CorrelationWorker::new(registry, engine, 0).await.unwrap();
    correlator.call().await.unwrap();
    correlator.shutdown().await;

    let reports = correlator.reports();
    assert_eq!(reports.len(), 2);

    let session = reports.iter().find(|r| r.parameter == "session_id").unwrap();
    assert!(session.is_correlated());
    assert_eq!(session.found_in, vec![1001]);

    let unrelated = reports.iter().find(|r| r.parameter == "unrelated").unwrap();
    assert!(!unrelated.is_correlated());
}

#[tokio::test]
async fn test_correlation_skips_captures() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        ("http://app/login", 200, "no sid in this body"),
    ]));
    let registry = registry_with(
        vec![login_document()],
        vec![TestGroup::new("login.webtest")],
    );

    // 标准 worker 会因捕获未命中而失败；关联模式跳过捕获
    let mut correlator = CorrelationWorker::new(registry, engine, 0).await.unwrap();
    let stats = correlator.call().await.unwrap();
    assert_eq!(stats.requests, 1);
    assert!(stats.success());
}
