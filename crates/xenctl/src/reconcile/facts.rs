/// 虚拟机信息收集
///
/// 输出完整的虚拟机记录，支持按任意字段过滤

use common::utils::normalize_xen_datetime;
use serde_json::Value;
use std::collections::HashMap;

/// 字段 -> 可接受的取值
pub type FactFilters = HashMap<String, Vec<String>>;

/// 取值为 XenAPI 日期时间的字段
const DATETIME_FIELDS: &[&str] = &["snapshot_time", "start_time", "install_time", "last_updated"];

/// 将 `key=value` 列表合并为过滤条件
pub fn build_filters(pairs: &[(String, String)]) -> FactFilters {
    let mut filters = FactFilters::new();
    for (key, value) in pairs {
        filters.entry(key.clone()).or_default().push(value.clone());
    }
    filters
}

/// 生成过滤后的完整记录，按名称排序
///
/// 记录按原样输出；过滤基于 XenAPI 原始取值，之后才转换日期时间字段
pub fn gather_facts(records: HashMap<String, Value>, filters: &FactFilters) -> Vec<Value> {
    let mut facts: Vec<Value> = records
        .into_iter()
        .map(|(object_ref, mut record)| {
            if let Value::Object(map) = &mut record {
                map.insert("ref".to_string(), Value::String(object_ref));
            }
            record
        })
        .filter(|record| matches_filters(record, filters))
        .map(normalize_datetimes)
        .collect();
    facts.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    facts
}

fn normalize_datetimes(mut record: Value) -> Value {
    if let Value::Object(map) = &mut record {
        for key in DATETIME_FIELDS {
            if let Some(field) = map.get_mut(*key) {
                if let Some(converted) = field.as_str().and_then(normalize_xen_datetime) {
                    *field = Value::String(converted);
                }
            }
        }
    }
    record
}

fn sort_key(value: &Value) -> (String, String) {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    (field("name_label"), field("ref"))
}

/// `tags` 需要包含全部取值，其余字段取值属于列表即可
fn matches_filters(record: &Value, filters: &FactFilters) -> bool {
    filters.iter().all(|(key, expected)| match record.get(key) {
        Some(Value::Array(items)) if key == "tags" => expected
            .iter()
            .all(|tag| items.iter().any(|item| item.as_str() == Some(tag.as_str()))),
        Some(field) => {
            let actual = match field {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            expected.iter().any(|value| *value == actual)
        }
        None => false,
    })
}
