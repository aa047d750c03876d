//! End-to-end flow: settings into configs, a streamed reply folded into a
//! message, branching, and budgeted context assembly.

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use futures::stream;
use tokio_util::sync::CancellationToken;

use loom_core::{Message, Role, StreamId};
use loom_embeddings::{SemanticIndexAdapter, SemanticIndexConfig};
use loom_llm::{
    ChatRequest, Fragment, FragmentStream, LanguageModel, MessageAccumulator, StreamError,
    stream_reply,
};
use loom_memory::{
    GraphAwareMemory, GraphMemoryConfig, HybridMemory, HybridMemoryConfig, estimate_tokens,
};
use loom_settings::LoomSettings;

/// Replies with fixed parts, one fragment each, then a terminal fragment.
struct ScriptedModel {
    parts: Vec<&'static str>,
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, _request: &ChatRequest) -> loom_llm::Result<Message> {
        Ok(Message::assistant(self.parts.concat()))
    }

    async fn stream(&self, _request: &ChatRequest) -> loom_llm::Result<FragmentStream> {
        let id = StreamId::from("reply");
        let mut fragments: Vec<Fragment> = self
            .parts
            .iter()
            .enumerate()
            .map(|(i, part)| Fragment::text(id.clone(), i, *part).with_model("scripted"))
            .collect();
        fragments.push(Fragment::done(id, self.parts.len(), ""));
        Ok(Box::pin(stream::iter(fragments)))
    }
}

fn settings() -> LoomSettings {
    let mut settings = LoomSettings::default();
    settings.memory.index.score_threshold = 0.2;
    settings.memory.hybrid.vector.score_threshold = 0.3;
    settings.validate().unwrap();
    settings
}

fn graph_memory(settings: &LoomSettings) -> GraphAwareMemory {
    let adapter =
        SemanticIndexAdapter::from_config(SemanticIndexConfig::from_settings(&settings.memory.index))
            .unwrap();
    GraphAwareMemory::new(adapter, GraphMemoryConfig::from_settings(&settings.memory))
}

#[tokio::test]
async fn streamed_reply_branch_and_context() {
    let settings = settings();
    let mut memory = graph_memory(&settings);
    let accumulator = MessageAccumulator::new();
    let model = ScriptedModel {
        parts: vec![
            "<think>",
            "recall the move rules",
            "</think>",
            "ownership moves values ",
            "between bindings",
        ],
    };

    let question = memory
        .add_message(Message::user("explain rust ownership"))
        .await
        .unwrap();
    let request = ChatRequest::new("scripted", memory.build_context(&question.content).await);
    assert_eq!(request.messages.len(), 1);

    let reply = stream_reply(&model, &request, &accumulator, &CancellationToken::new(), false)
        .await
        .unwrap();
    assert!(accumulator.is_empty());
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, "ownership moves values between bindings");
    let thinking = reply.thinking.clone().unwrap();
    assert_eq!(thinking.content, "recall the move rules");
    assert!(!thinking.visible);

    let reply = memory.add_message(reply).await.unwrap();
    assert_eq!(reply.parent_id.as_ref(), Some(&question.id));
    let sourdough = memory
        .add_message(Message::user("what about sourdough starters"))
        .await
        .unwrap();

    let branch = memory
        .branch_from_message(&reply.id, "lifetimes")
        .await
        .unwrap();
    memory.switch_context(&branch.id).unwrap();
    let follow_up = memory
        .add_message(Message::user("how do lifetimes annotate references"))
        .await
        .unwrap();
    assert!(
        memory
            .tree()
            .get_message(&reply.id)
            .unwrap()
            .metadata
            .branch_point
    );

    let context = memory.build_context("lifetimes").await;
    assert_eq!(context[0].id, follow_up.id);
    assert_eq!(context.len(), 4);
    let cost: usize = context.iter().map(|m| estimate_tokens(&m.content)).sum();
    assert!(cost <= memory.config().max_context_tokens);

    let relevant = memory.relevant_messages("sourdough").await;
    assert!(relevant.iter().any(|m| m.id == sourdough.id));
    assert_eq!(relevant.last().map(|m| &m.id), Some(&follow_up.id));

    let vars = memory.memory_variables().unwrap();
    assert_eq!(vars.context_info.unwrap().context_title, "lifetimes");
    assert!(vars.history.unwrap().ends_with("Human: how do lifetimes annotate references"));
}

#[tokio::test]
async fn cancelled_reply_leaves_memory_untouched() {
    let settings = settings();
    let mut memory = graph_memory(&settings);
    let accumulator = MessageAccumulator::new();
    let model = ScriptedModel {
        parts: vec!["never", "seen"],
    };

    let _ = memory
        .add_message(Message::user("explain rust ownership"))
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let request = ChatRequest::new("scripted", memory.build_context("rust").await);
    let result = stream_reply(&model, &request, &accumulator, &cancel, false).await;
    assert_matches!(result, Err(StreamError::Cancelled));
    assert!(accumulator.is_empty());
    assert_eq!(memory.tree().message_count(), 1);
}

#[tokio::test]
async fn hybrid_memory_shares_the_index() {
    let settings = settings();
    let adapter =
        SemanticIndexAdapter::from_config(SemanticIndexConfig::from_settings(&settings.memory.index))
            .unwrap();
    let index = Arc::clone(adapter.index());

    let mut memory =
        HybridMemory::new(index.clone(), HybridMemoryConfig::from_settings(&settings.memory.hybrid));
    memory
        .save_context("rust ownership rules", "moves transfer ownership")
        .await
        .unwrap();
    memory
        .add_message(Message::tool_result("cargo", "build completed successfully"))
        .await
        .unwrap();

    let context = memory.hybrid_context("rust").await;
    assert_eq!(context[0].content, "rust ownership rules");
    assert_eq!(context.len(), 3);

    let tools = memory.relevant_tool_outputs("cargo build", 5).await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(index.count("tools").await.unwrap(), 1);
    assert_eq!(index.count("conversations").await.unwrap(), 3);

    let vars = memory.memory_variables().await;
    assert!(vars.hybrid_context.is_none());
    assert!(vars.history.starts_with("Human: rust ownership rules\nAI: moves transfer ownership"));
}
