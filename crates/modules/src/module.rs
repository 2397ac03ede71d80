use aitoys_domain::config::ModuleRegistrationConfig;
use aitoys_domain::stream::StreamEvent;
use aitoys_domain::tool::ToolSpec;
use aitoys_domain::Result;
use futures_core::stream::BoxStream;

/// The uniform call surface every pluggable AI provider implements,
/// regardless of whether it backs VAD, ASR, LLM, TTS, memory, or the
/// reserved intent stage. The registry and orchestrator only ever talk to
/// modules through this trait; `tool_name`/`arguments` are opaque to the
/// dispatch layer and interpreted by the module itself (e.g. an LLM module
/// answers a `"chat"` tool with a message list in `arguments`, a TTS module
/// answers `"synthesize"` with a text string).
#[async_trait::async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Tools this module advertises to an LLM's function-calling surface.
    /// Non-LLM modules typically return an empty list.
    fn tools(&self) -> &[ToolSpec] {
        &[]
    }

    async fn call(&self, tool_name: &str, arguments: serde_json::Value) -> Result<serde_json::Value>;

    /// Streaming variant for streaming-capable tools. The default
    /// implementation adapts `call` into a one-shot stream for modules
    /// that have no native streaming support.
    async fn call_stream(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let result = self.call(tool_name, arguments).await;
        let stream = async_stream::stream! {
            match result {
                Ok(value) => {
                    yield Ok(StreamEvent::Token { text: value.to_string() });
                    yield Ok(StreamEvent::Done { usage: None });
                }
                Err(e) => {
                    let kind = e.kind();
                    yield Ok(StreamEvent::Error {
                        error_kind: kind.as_str().to_string(),
                        message: e.to_string(),
                        retriable: matches!(
                            kind,
                            aitoys_domain::ErrorKind::ProviderTransient | aitoys_domain::ErrorKind::Timeout
                        ),
                    });
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Constructs a `Module` from its merged registration config. Implemented
/// once per module type; the registry owns both construction and the
/// `init()` step that follows (credential resolution, connectivity probe).
/// Implementations MUST NOT do network work in `create` itself — that
/// belongs in a follow-up `init`-equivalent the factory performs before
/// returning, so the two-phase contract is visible to callers as a single
/// fallible async call.
#[async_trait::async_trait]
pub trait ModuleFactory: Send + Sync {
    async fn create(&self, config: &ModuleRegistrationConfig) -> Result<Box<dyn Module>>;
}
