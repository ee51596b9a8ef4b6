//! Talking to models and to the people reviewing them: prompt runs, the
//! bake-off, human labels and the pre-flight health check.

pub mod bakeoff;
pub mod client;
pub mod flow;
pub mod health;
pub mod labels;
pub mod review;

pub use bakeoff::{run_bakeoff, BakeoffOutcome};
pub use client::{api_key_from_env, Completion, ModelClient, OpenAiClient, API_KEY_ENV};
pub use flow::{require_models, run_flow, FlowResult, TurnRecord};
pub use health::{health_check, Check, CheckStatus, HealthReport};
pub use labels::{label_timestamp, LabelRecord, LabelStore, Verdict};
pub use review::{initial_state, step, Command, Draft, Effect, Flag, ReviewSession, ReviewState};
