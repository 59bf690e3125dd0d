/// XenAPI RPC 模块
///
/// 提供基于 JSON-RPC 的 XenAPI 调用框架

pub mod message;
pub mod error;
pub mod types;
pub mod client;

pub use message::{RpcRequest, RpcResponse, RpcErrorInfo};
pub use error::{RpcError, RpcErrorCode};
pub use client::JsonRpcClient;
pub use types::*;
