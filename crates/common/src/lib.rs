/// Xen 电源状态管理 - 公共库
///
/// 提供共享的数据模型、错误处理、XenAPI RPC 协议层与工具函数

pub mod errors;
pub mod models;
pub mod rpc;
pub mod utils;

// 重新导出常用类型
pub use errors::{Error, Result};
pub use models::{DesiredState, PowerState, TaskStatus, VmOperation, VmRecord, VmSelector};
pub use rpc::{JsonRpcClient, RpcError, RpcErrorCode};
