//! These models represent the objects passed around by the agent
//!
//! There are several related formats we need to interact with:
//! - the transcript kept by the agent state machine for one run
//! - openai-compatible chat messages/tools, sent from the agent to the LLM
//! - page snapshots produced by the browser adapter
//! - rows written to and read from the conversation store
//!
//! We convert to and from the wire formats at the edges; everything inside the crate
//! works with the types defined here.
pub mod element;
pub mod message;
pub mod role;
pub mod tool;
pub mod workflow;
