use super::*;
use crate::config::{Config, GcpConfig};
use crate::providers::{ChatMessage, ChatRequest, ChatResponse, ToolCall};
use crate::sessions::{ConversationKey, InMemoryConversationStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Provider double that replays canned turns and records every request.
struct ScriptedProvider {
    turns: Mutex<VecDeque<anyhow::Result<ChatResponse>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    saw_tools: Mutex<Vec<usize>>,
}

impl ScriptedProvider {
    fn new(turns: Vec<anyhow::Result<ChatResponse>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
            saw_tools: Mutex::new(Vec::new()),
        })
    }

    fn request(&self, idx: usize) -> Vec<ChatMessage> {
        self.requests.lock()[idx].clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn supports_native_tools(&self) -> bool {
        true
    }

    async fn chat(
        &self,
        request: ChatRequest<'_>,
        _model: &str,
        _temperature: f64,
    ) -> anyhow::Result<ChatResponse> {
        self.requests.lock().push(request.messages.to_vec());
        self.saw_tools
            .lock()
            .push(request.tools.map_or(0, <[_]>::len));
        self.turns
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(text("(script exhausted)")))
    }
}

#[derive(Default)]
struct CountingObserver {
    calls: Mutex<Vec<String>>,
}

impl RunObserver for CountingObserver {
    fn on_tool_call(&self, tool_name: &str) {
        self.calls.lock().push(tool_name.to_string());
    }
}

fn text(body: &str) -> ChatResponse {
    ChatResponse {
        text: Some(body.to_string()),
        tool_calls: Vec::new(),
    }
}

fn call(id: &str, name: &str, arguments: &str) -> ChatResponse {
    ChatResponse {
        text: None,
        tool_calls: vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }],
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.agent.max_tool_iterations = 4;
    config
}

fn deps(provider: Arc<ScriptedProvider>) -> AgentDeps {
    AgentDeps {
        provider,
        store: Arc::new(InMemoryConversationStore::new()),
        gcp: Arc::new(GcpClient::from_config(&GcpConfig::default())),
        monitor: Arc::new(SessionMonitor::default()),
    }
}

fn root_with_stub_devops(config: &Config, deps: &AgentDeps) -> ToolLoopAgent {
    let devops: Arc<dyn AgentRunner> = Arc::new(build_devops_agent(config, deps));
    build_root_agent(config, deps, devops)
}

#[tokio::test]
async fn plain_answer_is_stored_in_transcript() {
    let provider = ScriptedProvider::new(vec![Ok(text("Hello there"))]);
    let deps = deps(provider.clone());
    let agent = root_with_stub_devops(&test_config(), &deps);

    let observer = CountingObserver::default();
    let output = agent
        .run(&AgentInput::new("hi", "s1", "default_user"), &observer)
        .await
        .unwrap();

    assert_eq!(output.response, "Hello there");
    assert_eq!(output.tool_calls_made, 0);
    assert!(observer.calls.lock().is_empty());

    let key = ConversationKey::new("gemini_agent", "default_user", "s1");
    let transcript = deps.store.get_transcript(&key, None).await.unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role, "user");
    assert_eq!(transcript[1].content, "Hello there");
}

#[tokio::test]
async fn first_request_carries_instruction_and_tools() {
    let provider = ScriptedProvider::new(vec![Ok(text("ok"))]);
    let deps = deps(provider.clone());
    let agent = root_with_stub_devops(&test_config(), &deps);

    agent
        .run(&AgentInput::new("hi", "s1", "u"), &NoopObserver)
        .await
        .unwrap();

    let first = provider.request(0);
    assert_eq!(first[0].role, "system");
    assert!(first[0].content.contains("ask_devops"));
    assert_eq!(first.last().unwrap().content, "hi");
    assert_eq!(provider.saw_tools.lock()[0], 6);
}

#[tokio::test]
async fn tool_call_result_is_fed_back() {
    let provider = ScriptedProvider::new(vec![
        Ok(call("call_1", "get_weather", r#"{"city":"London"}"#)),
        Ok(text("It is rainy in London.")),
    ]);
    let deps = deps(provider.clone());
    let agent = root_with_stub_devops(&test_config(), &deps);

    let observer = CountingObserver::default();
    let output = agent
        .run(&AgentInput::new("weather in london?", "s1", "u"), &observer)
        .await
        .unwrap();

    assert_eq!(output.response, "It is rainy in London.");
    assert_eq!(output.tool_calls_made, 1);
    assert_eq!(*observer.calls.lock(), vec!["get_weather".to_string()]);

    let second = provider.request(1);
    let assistant = &second[second.len() - 2];
    assert_eq!(assistant.tool_calls.len(), 1);
    let tool_msg = second.last().unwrap();
    assert_eq!(tool_msg.role, "tool");
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    let envelope: serde_json::Value = serde_json::from_str(&tool_msg.content).unwrap();
    assert_eq!(envelope["status"], "success");
    assert!(envelope["report"].as_str().unwrap().contains("rainy"));
}

#[tokio::test]
async fn unknown_tool_and_bad_arguments_become_error_envelopes() {
    let provider = ScriptedProvider::new(vec![
        Ok(call("c1", "launch_rocket", "{}")),
        Ok(call("c2", "get_weather", "{not json")),
        Ok(text("Sorry")),
    ]);
    let deps = deps(provider.clone());
    let agent = root_with_stub_devops(&test_config(), &deps);

    let observer = CountingObserver::default();
    let output = agent
        .run(&AgentInput::new("do it", "s1", "u"), &observer)
        .await
        .unwrap();
    assert_eq!(output.tool_calls_made, 2);

    let unknown = provider.request(1).last().unwrap().content.clone();
    assert!(unknown.contains("Unknown tool: launch_rocket"));
    let invalid = provider.request(2).last().unwrap().content.clone();
    assert!(invalid.contains("Invalid JSON arguments for get_weather"));
}

#[tokio::test]
async fn loop_stops_at_iteration_limit() {
    let turns = (0..10)
        .map(|i| Ok(call(&format!("c{i}"), "get_current_time", r#"{"city":"Tokyo"}"#)))
        .collect();
    let provider = ScriptedProvider::new(turns);
    let deps = deps(provider.clone());
    let agent = root_with_stub_devops(&test_config(), &deps);

    let err = agent
        .run(&AgentInput::new("loop", "s1", "u"), &NoopObserver)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("maximum of 4 tool iterations"));
    assert_eq!(provider.requests.lock().len(), 4);

    // Failed turns are not recorded.
    let key = ConversationKey::new("gemini_agent", "u", "s1");
    assert!(deps.store.get_transcript(&key, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn provider_error_propagates() {
    let provider = ScriptedProvider::new(vec![Err(anyhow::anyhow!("Gemini API error (500)"))]);
    let deps = deps(provider);
    let agent = root_with_stub_devops(&test_config(), &deps);

    let err = agent
        .run(&AgentInput::new("hi", "s1", "u"), &NoopObserver)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn history_is_replayed_on_next_turn() {
    let provider = ScriptedProvider::new(vec![Ok(text("first answer")), Ok(text("second"))]);
    let deps = deps(provider.clone());
    let agent = root_with_stub_devops(&test_config(), &deps);

    let input = AgentInput::new("first question", "s1", "u");
    agent.run(&input, &NoopObserver).await.unwrap();
    agent
        .run(&AgentInput::new("follow up", "s1", "u"), &NoopObserver)
        .await
        .unwrap();

    let second = provider.request(1);
    let contents: Vec<&str> = second.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents[1..], ["first question", "first answer", "follow up"]);
}

#[tokio::test]
async fn delegation_in_test_mode_reports_marker() {
    let provider = ScriptedProvider::new(vec![
        Ok(call("c1", "ask_devops", r#"{"request":"create topic foo"}"#)),
        Ok(text("Delegated.")),
    ]);
    let deps = deps(provider.clone());
    let mut config = test_config();
    config.gateway.test_mode = true;
    let agent = build_root_agent(
        &config,
        &deps,
        Arc::new(build_devops_agent(&config, &deps)),
    );

    let observer = CountingObserver::default();
    agent
        .run(&AgentInput::new("create topic foo", "s1", "u"), &observer)
        .await
        .unwrap();

    assert_eq!(*observer.calls.lock(), vec!["ask_devops".to_string()]);
    let tool_msg = provider.request(1).last().unwrap().content.clone();
    assert!(tool_msg.contains("[devops-test-mode] create topic foo"));
}

#[tokio::test]
async fn devops_agent_keeps_its_own_conversation() {
    let provider = ScriptedProvider::new(vec![
        Ok(call("c1", "ask_devops", r#"{"request":"list topics"}"#)),
        // DevOps agent's own turn
        Ok(text("No topics created yet.")),
        // Root agent's final answer
        Ok(text("The DevOps agent says there are no topics.")),
    ]);
    let deps = deps(provider.clone());
    let agent = build_agents(&test_config(), &deps);

    let output = agent
        .run(&AgentInput::new("any topics?", "s1", "default_user"), &NoopObserver)
        .await
        .unwrap();
    assert_eq!(output.response, "The DevOps agent says there are no topics.");

    let devops_key = ConversationKey::new("devops_agent", "main_agent", "delegation_main_agent");
    let devops_transcript = deps.store.get_transcript(&devops_key, None).await.unwrap();
    assert_eq!(devops_transcript.len(), 2);
    assert_eq!(devops_transcript[1].content, "No topics created yet.");

    // The delegated request went out with the DevOps instruction and two tools.
    let devops_request = provider.request(1);
    assert!(devops_request[0].content.contains("DevOps specialist"));
    assert_eq!(provider.saw_tools.lock()[1], 2);
}

#[test]
fn agents_expose_names_and_models() {
    let provider = ScriptedProvider::new(vec![]);
    let deps = deps(provider);
    let config = test_config();
    let devops = build_devops_agent(&config, &deps);
    assert_eq!(AgentRunner::name(&devops), "devops_agent");
    assert_eq!(devops.model(), "gemini-2.0-flash");
    let names: Vec<String> = devops.tool_specs().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["create_pubsub_topic", "write_log_entry"]);
}
