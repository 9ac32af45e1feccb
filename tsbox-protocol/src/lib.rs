//! Wire-level types for the tsbox executor.
//!
//! This crate carries only serde types: the descriptor the executor
//! advertises, the tool-call request/result envelope, and the JSON-RPC 2.0
//! envelope spoken by sibling services. No engine logic lives here.

pub mod jsonrpc;
pub mod tool;

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
pub use tool::{ContentBlock, ToolCallRequest, ToolCallResult, ToolDescriptor};
