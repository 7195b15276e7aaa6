use forge_core::AgentType;
use serde::{Deserialize, Serialize};

/// Per agent type ceiling on concurrently running steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub ui: usize,
    pub backend: usize,
    pub database: usize,
    pub integration: usize,
    pub deployment: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            ui: 3,
            backend: 5,
            database: 2,
            integration: 3,
            deployment: 2,
        }
    }
}

impl ConcurrencyConfig {
    /// Ceiling for one agent type. A zero ceiling is treated as one so a plan
    /// can never stall on configuration alone.
    pub fn limit(&self, agent_type: AgentType) -> usize {
        let limit = match agent_type {
            AgentType::Ui => self.ui,
            AgentType::Backend => self.backend,
            AgentType::Database => self.database,
            AgentType::Integration => self.integration,
            AgentType::Deployment => self.deployment,
        };
        limit.max(1)
    }

    pub fn set(&mut self, agent_type: AgentType, limit: usize) {
        match agent_type {
            AgentType::Ui => self.ui = limit,
            AgentType::Backend => self.backend = limit,
            AgentType::Database => self.database = limit,
            AgentType::Integration => self.integration = limit,
            AgentType::Deployment => self.deployment = limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Base backoff when the classification carries none.
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Retry budget when the classification carries none.
    pub default_max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            default_max_retries: 3,
        }
    }
}

impl RetryConfig {
    /// Delay before the given retry (1-based): `base * 2^(retry-1)`, capped.
    pub fn backoff_ms(&self, base_delay_ms: u64, retry_count: u32) -> u64 {
        let exponent = retry_count.saturating_sub(1).min(32);
        base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    /// Bounded wait on one generation call.
    pub timeout_ms: u64,
    pub decomposition_temperature: f32,
    pub decomposition_max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "anthropic/claude-3.5-sonnet".to_string(),
            timeout_ms: 60_000,
            decomposition_temperature: 0.3,
            decomposition_max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Capacity of each event channel.
    pub event_capacity: usize,
    /// Finished plan results kept for lookup.
    pub result_history: usize,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub generation: GenerationConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
            generation: GenerationConfig::default(),
            event_capacity: 1000,
            result_history: 100,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_concurrency(mut self, agent_type: AgentType, limit: usize) -> Self {
        self.concurrency.set(agent_type, limit);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_generation_timeout(mut self, timeout_ms: u64) -> Self {
        self.generation.timeout_ms = timeout_ms;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_result_history(mut self, size: usize) -> Self {
        self.result_history = size;
        self
    }
}
