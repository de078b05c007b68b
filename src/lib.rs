//! lucy-chat: conversation-driven deployment workflow runtime.
//!
//! A terminal chat front for a conversational agent that can, mid-dialogue,
//! deploy a generated contract through an external backend and then submit a
//! wallet-signed registration transfer. The interesting machinery is the
//! workflow controller: a shared transcript mutated by concurrent tasks, a
//! phase classifier over agent replies, a trigger detector over user
//! messages, and two side-effect orchestrators that keep the visible message
//! list consistent through timeouts and failures.

pub mod backend;
pub mod bootstrap;
pub mod chain;
pub mod channels;
pub mod cli;
pub mod config;
pub mod error;
pub mod storage;
pub mod transcript;
pub mod workflow;

pub use error::{Error, Result};
