/// 状态转换规划
///
/// 根据期望状态与当前电源状态决定需要提交的操作

use common::{DesiredState, PowerState, VmOperation};
use thiserror::Error;

/// 当前电源状态不在已知集合内
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("意外的电源状态: {0}")]
pub struct UnexpectedState(pub PowerState);

/// 计算下一步操作，`None` 表示已处于期望状态
///
/// | 期望状态  | halted         | running        | suspended     |
/// |-----------|----------------|----------------|---------------|
/// | running   | start          | -              | resume        |
/// | halted    | -              | clean_shutdown | hard_shutdown |
/// | restarted | start          | clean_reboot   | resume        |
/// | absent    | destroy        | hard_shutdown  | hard_shutdown |
/// | present   | -              | -              | -             |
pub fn plan(
    desired: DesiredState,
    current: PowerState,
) -> Result<Option<VmOperation>, UnexpectedState> {
    use PowerState::{Halted, Running, Suspended};

    if !matches!(current, Halted | Running | Suspended) {
        return Err(UnexpectedState(current));
    }

    let operation = match (desired, current) {
        (DesiredState::Running, Halted) => Some(VmOperation::Start),
        (DesiredState::Running, Suspended) => Some(VmOperation::Resume),
        (DesiredState::Running, _) => None,

        (DesiredState::Halted, Running) => Some(VmOperation::CleanShutdown),
        (DesiredState::Halted, Suspended) => Some(VmOperation::HardShutdown),
        (DesiredState::Halted, _) => None,

        // 重启从不视为无操作：已停止的虚拟机直接启动
        (DesiredState::Restarted, Halted) => Some(VmOperation::Start),
        (DesiredState::Restarted, Running) => Some(VmOperation::CleanReboot),
        (DesiredState::Restarted, _) => Some(VmOperation::Resume),

        (DesiredState::Absent, Halted) => Some(VmOperation::Destroy),
        (DesiredState::Absent, _) => Some(VmOperation::HardShutdown),

        (DesiredState::Present, _) => None,
    };

    Ok(operation)
}

/// 该操作完成后是否还需要继续规划下一步
pub fn is_intermediate(desired: DesiredState, operation: VmOperation) -> bool {
    desired == DesiredState::Absent && operation == VmOperation::HardShutdown
}
