pub mod agent_store;
pub mod analysis;
pub mod conversation;
pub mod growth;
pub mod locks;
pub mod metrics_store;
pub mod models;
pub mod pool;
pub mod session_store;

pub use agent_store::{AgentStore, EffectiveAgentConfig};
pub use analysis::{AnalysisStore, SessionAnalyzer};
pub use conversation::{ConversationStore, ConversationSummarizer, ConversationWindow};
pub use growth::{GrowthStore, GrowthSummarizer};
pub use metrics_store::MetricsStore;
pub use pool::StorePool;
pub use session_store::SessionStore;
