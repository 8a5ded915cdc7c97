//! Integration tests for the agentflow-agent crate.
//!
//! Every collaborator (model, HTTP client, function runner, memory store)
//! is a hand-written mock, so these run without network access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use agentflow_agent::llm::{TextStream, ToolCall, ToolChoice};
use agentflow_agent::memory::{MemoryItem, MemoryOptions, SearchResult};
use agentflow_agent::{
    AgentDefinition, AgentError, Context, ContextState, EngineConfig, FunctionOutput,
    FunctionRequest, FunctionRunner, HttpClient, HttpRequest, InMemoryStore, LlmInput, LlmModel,
    LlmOutput, LocalFunctionAgent, Memorable, Message, Registry, RunInput, RunOptions,
    RunResponse, Runnable, RunnableDefinition, Services,
};
use agentflow_core::{DataKind, DataType, OutputCollector, RunChunk};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

// ═══════════════════════════════════════════════════════════════════════
//  Mocks
// ═══════════════════════════════════════════════════════════════════════

/// Model that streams fixed fragments, answers JSON calls with a fixed
/// object, and answers tool calls with a fixed function name.
#[derive(Default)]
struct ScriptedModel {
    fragments: Vec<String>,
    json: Value,
    tool: Option<String>,
    calls: Mutex<Vec<LlmInput>>,
}

impl ScriptedModel {
    fn calls(&self) -> Vec<LlmInput> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmModel for ScriptedModel {
    async fn chat(&self, input: &LlmInput) -> agentflow_agent::Result<LlmOutput> {
        self.calls.lock().unwrap().push(input.clone());
        if input.tool_choice.is_some() {
            let tool_calls = self
                .tool
                .iter()
                .map(|name| ToolCall {
                    id: "call_1".into(),
                    name: name.clone(),
                    arguments: json!({}),
                })
                .collect();
            return Ok(LlmOutput {
                text: None,
                tool_calls,
            });
        }
        Ok(LlmOutput {
            text: Some(self.json.to_string()),
            tool_calls: Vec::new(),
        })
    }

    async fn stream_chat(&self, input: &LlmInput) -> agentflow_agent::Result<TextStream> {
        self.calls.lock().unwrap().push(input.clone());
        let items: Vec<agentflow_agent::Result<String>> =
            self.fragments.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// HTTP client that records requests and answers by url.
#[derive(Default)]
struct MockHttp {
    responses: HashMap<String, Value>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttp {
    fn with(mut self, url: &str, response: Value) -> Self {
        self.responses.insert(url.to_owned(), response);
        self
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttp {
    async fn send(&self, request: &HttpRequest) -> agentflow_agent::Result<Value> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .get(&request.url)
            .cloned()
            .ok_or_else(|| AgentError::Http {
                status: 404,
                message: format!("404 fetching {}", request.url),
            })
    }
}

/// Function runner that returns the length of the `text` argument.
struct LengthRunner;

#[async_trait]
impl FunctionRunner for LengthRunner {
    async fn run(&self, request: FunctionRequest) -> agentflow_agent::Result<FunctionOutput> {
        let text = request.arguments["text"].as_str().unwrap_or_default();
        Ok(FunctionOutput::Object(obj(json!({ "result": text.chars().count() }))))
    }
}

fn obj(value: Value) -> RunInput {
    value.as_object().cloned().unwrap()
}

fn definition(value: Value) -> AgentDefinition {
    serde_json::from_value(value).unwrap()
}

fn context(registry: Registry, services: Services) -> Context {
    Context::new(registry, Arc::new(services))
}

fn services() -> Services {
    Services::with_http_client(EngineConfig::default(), Arc::new(MockHttp::default()))
}

/// Fold a streamed run chunk by chunk, returning the chunks and the result.
async fn fold_stream(
    runnable: &dyn Runnable,
    input: RunInput,
    ctx: &Context,
) -> (Vec<RunChunk>, agentflow_agent::RunOutput) {
    let chunks: Vec<RunChunk> = runnable
        .stream(input, ctx)
        .map(|c| c.unwrap())
        .collect()
        .await;
    let mut collector = OutputCollector::new();
    for chunk in &chunks {
        collector.push(chunk);
    }
    (chunks, collector.into_output())
}

// ═══════════════════════════════════════════════════════════════════════
//  LLM agent
// ═══════════════════════════════════════════════════════════════════════

fn llm_agent(outputs: Value) -> AgentDefinition {
    definition(json!({
        "type": "llm",
        "id": "chat",
        "inputs": [
            { "id": "q", "name": "question", "type": "string", "required": true },
            { "id": "l", "name": "language", "type": "string" }
        ],
        "outputs": outputs,
        "messages": [{ "id": "m1", "role": "user", "content": "reply {{question}} in {{language}}" }]
    }))
}

#[tokio::test]
async fn llm_streams_fragments_then_one_delta() {
    let model = Arc::new(ScriptedModel {
        fragments: vec!["Hel".into(), "lo".into()],
        json: json!({ "score": 7 }),
        ..ScriptedModel::default()
    });
    let registry = Registry::new();
    let agent = llm_agent(json!([
        { "id": "o1", "name": "$text", "type": "string" },
        { "id": "o2", "name": "score", "type": "number" }
    ]))
    .instantiate(&registry)
    .unwrap();
    let ctx = context(registry, services().with_model(model.clone()));

    let chunks: Vec<RunChunk> = agent
        .stream(obj(json!({ "question": "hello" })), &ctx)
        .map(|c| c.unwrap())
        .collect()
        .await;

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].text.as_deref(), Some("Hel"));
    assert_eq!(chunks[1].text.as_deref(), Some("lo"));
    assert_eq!(Value::Object(chunks[2].delta.clone().unwrap()), json!({ "score": 7 }));

    let calls = model.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.messages[0].content == "reply hello in "));
    assert!(calls.iter().any(|c| c.response_format.is_some()));
}

#[tokio::test]
async fn llm_streaming_and_run_agree() {
    let model = Arc::new(ScriptedModel {
        fragments: vec!["a".into(), "b".into()],
        json: json!({ "score": 1 }),
        ..ScriptedModel::default()
    });
    let registry = Registry::new();
    let agent = llm_agent(json!([
        { "id": "o1", "name": "$text", "type": "string" },
        { "id": "o2", "name": "score", "type": "number" }
    ]))
    .instantiate(&registry)
    .unwrap();
    let ctx = context(registry, services().with_model(model));
    let input = obj(json!({ "question": "q", "language": "French" }));

    let streamed = agent
        .invoke(input.clone(), &ctx, RunOptions::streaming())
        .await
        .unwrap();
    assert!(matches!(streamed, RunResponse::Stream(_)));
    let streamed = streamed.into_output().await.unwrap();

    let direct = agent.run(input, &ctx).await.unwrap();
    assert_eq!(streamed, direct);
    assert_eq!(Value::Object(direct), json!({ "$text": "ab", "score": 1 }));
}

#[tokio::test]
async fn llm_without_model_fails() {
    let registry = Registry::new();
    let agent = llm_agent(json!([])).instantiate(&registry).unwrap();
    let ctx = context(registry, services());
    let err = agent.run(obj(json!({ "question": "x" })), &ctx).await.unwrap_err();
    assert_eq!(err.to_string(), "LLM model is required");
}

#[tokio::test]
async fn llm_text_only_emits_empty_terminal_delta() {
    let model = Arc::new(ScriptedModel {
        fragments: vec!["only text".into()],
        ..ScriptedModel::default()
    });
    let registry = Registry::new();
    let agent = llm_agent(json!([{ "id": "o1", "name": "$text", "type": "string" }]))
        .instantiate(&registry)
        .unwrap();
    let ctx = context(registry, services().with_model(model.clone()));

    let output = agent.run(obj(json!({ "question": "x" })), &ctx).await.unwrap();
    assert_eq!(Value::Object(output), json!({ "$text": "only text" }));
    // No JSON call when nothing structured is declared.
    assert_eq!(model.calls().len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Pipeline
// ═══════════════════════════════════════════════════════════════════════

fn pipeline_registry(log: Arc<Mutex<Vec<String>>>) -> Registry {
    let registry = Registry::new();

    let step1_log = log.clone();
    let step1 = LocalFunctionAgent::new(
        RunnableDefinition::new("step1")
            .with_input(DataType::new("question", DataKind::String).with_id("q").required())
            .unwrap()
            .with_output(DataType::new("$text", DataKind::String).with_id("t"))
            .unwrap(),
        move |input: RunInput, _ctx| {
            let log = step1_log.clone();
            async move {
                let question = input["question"].as_str().unwrap_or_default().to_owned();
                let stream = async_stream::stream! {
                    log.lock().unwrap().push("step1:start".to_owned());
                    yield Ok::<_, AgentError>(RunChunk::text("step1: "));
                    yield Ok(RunChunk::text(question));
                    log.lock().unwrap().push("step1:end".to_owned());
                };
                Ok(FunctionOutput::Stream(Box::pin(stream)))
            }
        },
    );
    registry.register_instance(Arc::new(step1));

    let step2_log = log;
    let step2 = LocalFunctionAgent::new(
        RunnableDefinition::new("step2")
            .with_input(DataType::new("text", DataKind::String).with_id("s").required())
            .unwrap()
            .with_output(DataType::new("result", DataKind::Number).with_id("r"))
            .unwrap(),
        move |input: RunInput, _ctx| {
            let log = step2_log.clone();
            async move {
                log.lock().unwrap().push("step2:start".to_owned());
                let text = input["text"].as_str().unwrap_or_default();
                Ok(FunctionOutput::Object(obj(json!({ "result": text.chars().count() }))))
            }
        },
    );
    registry.register_instance(Arc::new(step2));

    registry.register_definition(definition(json!({
        "type": "pipeline",
        "id": "pipe",
        "inputs": [{ "id": "in_q", "name": "question", "type": "string" }],
        "outputs": [
            { "id": "o_text", "name": "$text", "type": "string" },
            { "id": "o_result", "name": "result", "type": "number" }
        ],
        "processes": [
            { "id": "p1", "runnable": "step1", "input": { "q": { "fromVariableId": "in_q" } } },
            {
                "id": "p2",
                "runnable": "step2",
                "input": { "s": { "fromVariableId": "p1", "fromVariablePropertyPath": ["$text"] } }
            }
        ],
        "outputVariables": {
            "o_text": { "fromVariableId": "p1", "fromVariablePropertyPath": ["$text"] },
            "o_result": { "fromVariableId": "p2", "fromVariablePropertyPath": ["result"] }
        }
    })));
    registry
}

#[tokio::test]
async fn pipeline_runs_steps_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = pipeline_registry(log.clone());
    let pipeline = registry.resolve("pipe").unwrap();
    let ctx = context(registry, services());

    let output = pipeline.run(obj(json!({ "question": "hello" })), &ctx).await.unwrap();
    assert_eq!(Value::Object(output), json!({ "$text": "step1: hello", "result": 12 }));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["step1:start", "step1:end", "step2:start"]
    );
}

#[tokio::test]
async fn pipeline_forwards_text_live() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = pipeline_registry(log.clone());
    let pipeline = registry.resolve("pipe").unwrap();
    let ctx = context(registry, services());

    let mut stream = pipeline.stream(obj(json!({ "question": "hello" })), &ctx);
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.text.as_deref(), Some("step1: "));
    // The first fragment arrives before step1 has finished.
    assert_eq!(*log.lock().unwrap(), vec!["step1:start"]);

    let rest: Vec<RunChunk> = stream.map(|c| c.unwrap()).collect().await;
    assert_eq!(rest[0].text.as_deref(), Some("hello"));
    let last = rest.last().unwrap();
    assert_eq!(Value::Object(last.delta.clone().unwrap()), json!({ "result": 12 }));
}

#[tokio::test]
async fn pipeline_streaming_and_run_agree() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = pipeline_registry(log);

    let progress = LocalFunctionAgent::new(
        RunnableDefinition::new("progress")
            .with_input(DataType::new("text", DataKind::String).with_id("s").required())
            .unwrap(),
        |_input: RunInput, _ctx| async move {
            let stream = async_stream::stream! {
                yield Ok::<_, AgentError>(RunChunk::delta(obj(json!({ "count": 1 }))));
                yield Ok(RunChunk::delta(obj(json!({ "count": 2 }))));
                yield Ok(RunChunk::delta(obj(json!({ "done": true }))));
            };
            Ok(FunctionOutput::Stream(Box::pin(stream)))
        },
    );
    registry.register_instance(Arc::new(progress));
    registry.register_definition(definition(json!({
        "type": "pipeline",
        "id": "progressive",
        "inputs": [{ "id": "in_q", "name": "question", "type": "string" }],
        "outputs": [
            { "id": "o_text", "name": "$text", "type": "string" },
            { "id": "o_count", "name": "count", "type": "number" },
            { "id": "o_done", "name": "done", "type": "boolean" }
        ],
        "processes": [
            { "id": "p1", "runnable": "step1", "input": { "q": { "fromVariableId": "in_q" } } },
            {
                "id": "p2",
                "runnable": "progress",
                "input": { "s": { "fromVariableId": "p1", "fromVariablePropertyPath": ["$text"] } }
            }
        ],
        "outputVariables": {
            "o_text": { "fromVariableId": "p1", "fromVariablePropertyPath": ["$text"] },
            "o_count": { "fromVariableId": "p2", "fromVariablePropertyPath": ["count"] },
            "o_done": { "fromVariableId": "p2", "fromVariablePropertyPath": ["done"] }
        }
    })));

    let pipeline = registry.resolve("progressive").unwrap();
    let ctx = context(registry, services());
    let input = obj(json!({ "question": "hello" }));

    let (chunks, streamed) = fold_stream(pipeline.as_ref(), input.clone(), &ctx).await;
    let deltas: Vec<Value> = chunks
        .iter()
        .filter_map(|c| c.delta.clone().map(Value::Object))
        .collect();
    assert_eq!(
        deltas,
        vec![
            json!({ "count": 1 }),
            json!({ "count": 2 }),
            json!({ "count": 2, "done": true })
        ]
    );

    let direct = pipeline.run(input, &ctx).await.unwrap();
    assert_eq!(streamed, direct);
    assert_eq!(
        Value::Object(direct),
        json!({ "$text": "step1: hello", "count": 2, "done": true })
    );
}

#[tokio::test]
async fn pipeline_with_function_runner_step() {
    let registry = Registry::new();
    registry.register_all([
        definition(json!({
            "type": "function",
            "id": "len",
            "inputs": [{ "id": "s", "name": "text", "type": "string", "required": true }],
            "outputs": [{ "id": "r", "name": "result", "type": "number" }],
            "code": "return { result: input.text.length }"
        })),
        definition(json!({
            "type": "pipeline",
            "id": "pipe",
            "inputs": [{ "id": "in", "name": "text", "type": "string" }],
            "outputs": [{ "id": "out", "name": "length", "type": "number" }],
            "processes": [
                { "id": "p", "runnable": "len", "input": { "s": { "fromVariableId": "in" } } }
            ],
            "outputVariables": {
                "out": { "fromVariableId": "p", "fromVariablePropertyPath": ["result"] }
            }
        })),
    ]);
    registry.validate().unwrap();

    let pipeline = registry.resolve("pipe").unwrap();
    let ctx = context(registry, services().with_function_runner(Arc::new(LengthRunner)));
    let output = pipeline.run(obj(json!({ "text": "four" })), &ctx).await.unwrap();
    assert_eq!(Value::Object(output), json!({ "length": 4 }));
}

#[tokio::test]
async fn invalid_pipeline_fails_validation() {
    let registry = Registry::new();
    registry.register_definition(definition(json!({
        "type": "pipeline",
        "id": "broken",
        "processes": [{ "id": "p", "runnable": "does-not-exist" }]
    })));
    let err = registry.validate().unwrap_err();
    assert_eq!(err.to_string(), "runnable not found: does-not-exist");
}

// ═══════════════════════════════════════════════════════════════════════
//  Decision
// ═══════════════════════════════════════════════════════════════════════

fn recording_case(id: &str, seen: Arc<Mutex<Vec<(String, RunInput)>>>) -> LocalFunctionAgent {
    let name = id.to_owned();
    LocalFunctionAgent::new(
        RunnableDefinition::new(id).with_name(id),
        move |input: RunInput, _ctx| {
            let seen = seen.clone();
            let name = name.clone();
            async move {
                seen.lock().unwrap().push((name.clone(), input));
                Ok(FunctionOutput::Object(obj(json!({ "handled_by": name }))))
            }
        },
    )
}

#[tokio::test]
async fn decision_routes_original_input_to_chosen_case() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();
    registry.register_instance(Arc::new(recording_case("case1", seen.clone())));
    registry.register_instance(Arc::new(recording_case("case2", seen.clone())));
    registry.register_definition(definition(json!({
        "type": "decision",
        "id": "router",
        "messages": [{ "id": "m", "role": "user", "content": "route {{question}}" }],
        "cases": [
            { "id": "c1", "runnable": "case1" },
            { "id": "c2", "runnable": "case2" }
        ]
    })));

    let model = Arc::new(ScriptedModel {
        tool: Some("case2".into()),
        ..ScriptedModel::default()
    });
    let router = registry.resolve("router").unwrap();
    let ctx = context(registry, services().with_model(model.clone()));

    let input = obj(json!({ "question": "hi", "extra": [1, 2] }));
    let output = router.run(input.clone(), &ctx).await.unwrap();
    assert_eq!(Value::Object(output), json!({ "handled_by": "case2" }));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "case2");
    assert_eq!(seen[0].1, input);

    let calls = model.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].tool_choice, Some(ToolChoice::Required));
    assert_eq!(calls[0].tools.len(), 2);
}

#[tokio::test]
async fn decision_streaming_and_run_agree() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();
    registry.register_instance(Arc::new(recording_case("case1", seen.clone())));
    registry.register_instance(Arc::new(recording_case("case2", seen.clone())));
    registry.register_definition(definition(json!({
        "type": "decision",
        "id": "router",
        "messages": [{ "id": "m", "role": "user", "content": "route {{question}}" }],
        "cases": [
            { "id": "c1", "runnable": "case1" },
            { "id": "c2", "runnable": "case2" }
        ]
    })));

    let model = Arc::new(ScriptedModel {
        tool: Some("case1".into()),
        ..ScriptedModel::default()
    });
    let router = registry.resolve("router").unwrap();
    let ctx = context(registry, services().with_model(model));
    let input = obj(json!({ "question": "hi" }));

    let (_, streamed) = fold_stream(router.as_ref(), input.clone(), &ctx).await;
    let direct = router.run(input, &ctx).await.unwrap();
    assert_eq!(streamed, direct);
    assert_eq!(Value::Object(direct), json!({ "handled_by": "case1" }));
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn decision_without_matching_case_fails() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();
    registry.register_instance(Arc::new(recording_case("case1", seen.clone())));
    registry.register_definition(definition(json!({
        "type": "decision",
        "id": "router",
        "messages": [{ "id": "m", "role": "user", "content": "x" }],
        "cases": [{ "id": "c1", "runnable": "case1" }]
    })));
    let router = registry.resolve("router").unwrap();

    let ctx = context(
        registry.clone(),
        services().with_model(Arc::new(ScriptedModel {
            tool: Some("nope".into()),
            ..ScriptedModel::default()
        })),
    );
    let err = router.run(RunInput::new(), &ctx).await.unwrap_err();
    assert!(matches!(err, AgentError::UnknownCase { ref name } if name == "nope"));

    let ctx = context(registry, services().with_model(Arc::new(ScriptedModel::default())));
    let err = router.run(RunInput::new(), &ctx).await.unwrap_err();
    assert!(matches!(err, AgentError::NoToolCall));
    assert!(seen.lock().unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════
//  HTTP agents
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn open_api_agent_sends_built_request() {
    let http = Arc::new(MockHttp::default().with("https://api.example.com/test/123", json!({ "ok": true })));
    let registry = Registry::new();
    let agent = definition(json!({
        "type": "open_api",
        "id": "api",
        "url": "https://api.example.com/test/{id}",
        "inputs": [
            { "id": "id", "name": "id", "type": "string" },
            { "id": "message", "name": "message", "type": "string" }
        ],
        "parameters": { "id": "path" },
        "auth": { "type": "bearer", "token": "123456" }
    }))
    .instantiate(&registry)
    .unwrap();
    let ctx = context(
        registry,
        Services::with_http_client(EngineConfig::default(), http.clone()),
    );

    let output = agent
        .run(obj(json!({ "id": "123", "message": "hello" })), &ctx)
        .await
        .unwrap();
    assert_eq!(Value::Object(output), json!({ "ok": true }));

    let requests = http.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].headers.as_ref().unwrap()["Authorization"], "Bearer 123456");
    assert_eq!(requests[0].query.as_ref().unwrap()["message"], "hello");
}

#[tokio::test]
async fn open_api_agent_rejects_non_object_response() {
    let http = Arc::new(MockHttp::default().with("https://x.test", json!([1, 2])));
    let registry = Registry::new();
    let agent = definition(json!({ "type": "open_api", "id": "api", "url": "https://x.test" }))
        .instantiate(&registry)
        .unwrap();
    let ctx = context(registry, Services::with_http_client(EngineConfig::default(), http));
    let err = agent.run(RunInput::new(), &ctx).await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidResponse { .. }));
}

#[tokio::test]
async fn blocklet_agent_discovers_operation_once() {
    let http = Arc::new(
        MockHttp::default()
            .with(
                "https://app.test/.well-known/service/openapi.json",
                json!({
                    "paths": {
                        "/api/echo/{word}": {
                            "get": {
                                "x-id": "echo",
                                "parameters": [{ "name": "word", "in": "path" }]
                            }
                        }
                    }
                }),
            )
            .with("https://app.test/api/echo/hi", json!({ "echo": "hi" })),
    );
    let mut config = EngineConfig::default();
    config.blocklet.app_url = Some("https://app.test/".into());

    let registry = Registry::new();
    registry.register_definition(definition(json!({
        "type": "blocklet",
        "id": "echo",
        "openapiId": "echo",
        "inputs": [{ "id": "w", "name": "word", "type": "string" }]
    })));
    registry.register_definition(definition(json!({
        "type": "blocklet",
        "id": "missing",
        "openapiId": "nope"
    })));
    let ctx = context(registry.clone(), Services::with_http_client(config, http.clone()));

    let agent = registry.resolve("echo").unwrap();
    for _ in 0..2 {
        let output = agent.run(obj(json!({ "word": "hi" })), &ctx).await.unwrap();
        assert_eq!(Value::Object(output), json!({ "echo": "hi" }));
    }
    let err = registry
        .resolve("missing")
        .unwrap()
        .run(RunInput::new(), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "unknown operation: nope");

    let discovery = http
        .requests()
        .iter()
        .filter(|r| r.url.ends_with("openapi.json"))
        .count();
    assert_eq!(discovery, 1);
}

#[tokio::test]
async fn blocklet_agent_requires_app_url() {
    let registry = Registry::new();
    let agent = definition(json!({ "type": "blocklet", "id": "b", "openapiId": "x" }))
        .instantiate(&registry)
        .unwrap();
    let ctx = context(registry, services());
    let err = agent.run(RunInput::new(), &ctx).await.unwrap_err();
    assert_eq!(err.to_string(), "API url is required");
}

// ═══════════════════════════════════════════════════════════════════════
//  Memory
// ═══════════════════════════════════════════════════════════════════════

/// Store that returns one fixed hit and records added messages.
#[derive(Default)]
struct FixedStore {
    added: Mutex<Vec<Message>>,
    queries: Mutex<Vec<(String, MemoryOptions)>>,
}

#[async_trait]
impl Memorable for FixedStore {
    async fn add(&self, messages: &[Message], _options: &MemoryOptions) -> agentflow_agent::Result<Vec<MemoryItem>> {
        self.added.lock().unwrap().extend_from_slice(messages);
        Ok(Vec::new())
    }

    async fn search(&self, query: &str, options: &MemoryOptions) -> agentflow_agent::Result<SearchResult> {
        self.queries.lock().unwrap().push((query.to_owned(), options.clone()));
        Ok(serde_json::from_value(json!({
            "results": [{
                "id": "m1",
                "createdAt": "2024-01-01T00:00:00Z",
                "updatedAt": "2024-01-01T00:00:00Z",
                "memory": "likes tea",
                "metadata": {},
                "score": 0.9
            }]
        }))?)
    }

    async fn filter(&self, _options: &MemoryOptions) -> agentflow_agent::Result<Vec<MemoryItem>> {
        Ok(Vec::new())
    }

    async fn get(&self, _id: &str) -> agentflow_agent::Result<Option<MemoryItem>> {
        Ok(None)
    }

    async fn create(&self, _memory: &str, _options: &MemoryOptions) -> agentflow_agent::Result<MemoryItem> {
        Err(AgentError::Memory { reason: "read-only".into() })
    }

    async fn update(&self, _id: &str, _memory: &str) -> agentflow_agent::Result<Option<MemoryItem>> {
        Ok(None)
    }

    async fn delete(&self, _id: &str) -> agentflow_agent::Result<Option<MemoryItem>> {
        Ok(None)
    }

    async fn reset(&self) -> agentflow_agent::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn memories_reach_templates_and_record_replies() {
    let store = Arc::new(FixedStore::default());
    let model = Arc::new(ScriptedModel {
        fragments: vec!["noted".into()],
        ..ScriptedModel::default()
    });

    let registry = Registry::new();
    registry.register_definition(definition(json!({
        "type": "llm",
        "id": "chat",
        "inputs": [{ "id": "q", "name": "question", "type": "string" }],
        "outputs": [{ "id": "t", "name": "$text", "type": "string" }],
        "memories": [
            { "id": "prefs", "name": "preferences", "query": { "from": "variable", "from_variable_id": "q" } },
            { "id": "orphan" }
        ],
        "messages": [{
            "id": "m",
            "role": "system",
            "content": "{{preferences.results.0.memory}} / {{prefs.results.0.score}}"
        }]
    })));
    let ctx = context(
        registry.clone(),
        services().with_model(model.clone()).with_memory("prefs", store.clone()),
    )
    .with_state(ContextState {
        user_id: Some("u1".into()),
        session_id: Some("s1".into()),
    });

    let output = registry
        .resolve("chat")
        .unwrap()
        .run(obj(json!({ "question": "drinks?" })), &ctx)
        .await
        .unwrap();
    assert_eq!(Value::Object(output), json!({ "$text": "noted" }));

    assert_eq!(model.calls()[0].messages[0].content, "likes tea / 0.9");

    let queries = store.queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].0, "drinks?");
    assert_eq!(queries[0].1.user_id.as_deref(), Some("u1"));
    assert_eq!(queries[0].1.session_id.as_deref(), Some("s1"));

    let added = store.added.lock().unwrap();
    assert_eq!(added.len(), 2);
    assert_eq!(added[1].content, "noted");
}

#[tokio::test]
async fn in_memory_store_round_trip_through_agent() {
    let store = Arc::new(InMemoryStore::new());
    let model = Arc::new(ScriptedModel {
        fragments: vec!["green tea is great".into()],
        ..ScriptedModel::default()
    });
    let registry = Registry::new();
    registry.register_definition(definition(json!({
        "type": "llm",
        "id": "chat",
        "memories": [{ "id": "log" }],
        "messages": [{ "id": "m", "role": "user", "content": "{{text}}" }]
    })));
    let ctx = context(
        registry.clone(),
        services().with_model(model).with_memory("log", store.clone()),
    );

    let chat = registry.resolve("chat").unwrap();
    chat.run(obj(json!({ "text": "tea" })), &ctx).await.unwrap();
    assert!(!store.is_empty().await);

    let found = store
        .search("green tea", &MemoryOptions::default())
        .await
        .unwrap();
    assert!(!found.results.is_empty());
}
