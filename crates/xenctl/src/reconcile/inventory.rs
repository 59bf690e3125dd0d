/// 虚拟机清单过滤
///
/// 从全部记录中选出与条件匹配的虚拟机，模板与控制域始终排除

use common::rpc::RawVmRecord;
use common::{VmRecord, VmSelector};

/// 按选择条件过滤原始记录
///
/// 单次遍历、惰性求值；输出只保留固定字段
pub fn filter_inventory<'a, I>(
    records: I,
    selector: &'a VmSelector,
) -> impl Iterator<Item = VmRecord> + 'a
where
    I: IntoIterator<Item = (String, RawVmRecord)>,
    I::IntoIter: 'a,
{
    records
        .into_iter()
        .filter(|(_, raw)| !raw.is_a_template && !raw.is_control_domain)
        .filter(move |(_, raw)| matches_selector(raw, selector))
        .map(|(object_ref, raw)| raw.into_record(object_ref))
}

/// 名称：属于列表即匹配；标签：必须包含全部标签
pub fn matches_selector(raw: &RawVmRecord, selector: &VmSelector) -> bool {
    match selector {
        VmSelector::Names(names) => names.iter().any(|name| *name == raw.name_label),
        VmSelector::Tags(tags) => tags.iter().all(|tag| raw.tags.contains(tag)),
    }
}
