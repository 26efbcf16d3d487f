//! Span attribute keys in the `hikari.` namespace

pub const PIPELINE_ID: &str = "hikari.pipeline_id";
pub const STAGE: &str = "hikari.stage";
pub const MODEL: &str = "hikari.model";
pub const PROVIDER: &str = "hikari.provider";
pub const TOKENS_INPUT: &str = "hikari.tokens.input";
pub const TOKENS_OUTPUT: &str = "hikari.tokens.output";
pub const COST_INPUT: &str = "hikari.cost.input";
pub const COST_OUTPUT: &str = "hikari.cost.output";
pub const COST_TOTAL: &str = "hikari.cost.total";

/// Attributes every ingested span must carry
pub const REQUIRED: [&str; 3] = [STAGE, MODEL, PROVIDER];
