/// 工具函数集合

use chrono::NaiveDateTime;
use uuid::Uuid;

/// XenAPI 日期时间格式
const XEN_DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%SZ";

/// 生成唯一 ID
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// 由主机地址生成 JSON-RPC 入口地址
///
/// 未指定协议时默认使用 https
pub fn jsonrpc_endpoint(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}/jsonrpc", host)
    } else {
        format!("https://{}/jsonrpc", host)
    }
}

/// 解析 `task.get_result` 的返回值
///
/// 结果是形如 `<value>OpaqueRef:...</value>` 的 XML 片段，空结果返回 None
pub fn parse_task_result(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let inner = match (raw.find("<value>"), raw.rfind("</value>")) {
        (Some(start), Some(end)) if start + 7 <= end => &raw[start + 7..end],
        _ => raw,
    };
    let inner = inner.trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

/// 将 XenAPI 日期时间字符串转换为 RFC 3339 格式
///
/// 不符合格式的字符串返回 None
pub fn normalize_xen_datetime(value: &str) -> Option<String> {
    NaiveDateTime::parse_from_str(value, XEN_DATETIME_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().to_rfc3339())
}
