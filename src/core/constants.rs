//! Shared constants used across the application

pub const DEFAULT_BASE_URL: &str = "https://api.together.xyz/v1";
pub const DEFAULT_MODEL: &str = "deepseek-ai/DeepSeek-R1-Distill-Llama-70B-free";
pub const DEFAULT_GREETING: &str = "Hello! How can I help you today?";

/// Sampling parameters sent with every completion request. These are fixed;
/// only the model and endpoint are configurable.
pub const TEMPERATURE: f32 = 0.7;
pub const TOP_P: f32 = 0.7;
pub const TOP_K: u32 = 50;
pub const REPETITION_PENALTY: f32 = 1.0;

/// Provider-specific stop sequence for the default DeepSeek distill models.
pub const STOP_SEQUENCE: &str = "<｜end▁of▁sentence｜>";
