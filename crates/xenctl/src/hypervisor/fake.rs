/// 测试用的内存 XenAPI
///
/// 记录每次调用，提交操作时立即修改虚拟机状态，任务结束方式可配置

use async_trait::async_trait;
use common::rpc::{RawVmRecord, VmCall};
use common::{Error, PowerState, Result, TaskStatus, VmOperation, VmRecord};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::XenApi;

/// 任务的结束方式
#[derive(Debug, Clone)]
pub enum TaskBehaviour {
    /// 在若干次状态查询后成功
    SucceedAfter(usize),
    /// 立即失败并返回错误信息
    Fail(Vec<String>),
    /// 永远处于 pending
    Hang,
}

struct FakeTask {
    polls_left: usize,
    status: TaskStatus,
    result: Option<String>,
    error: Vec<String>,
}

struct FakeState {
    vms: BTreeMap<String, RawVmRecord>,
    busy: HashMap<String, usize>,
    session_failures: Vec<String>,
    tasks: HashMap<String, FakeTask>,
    behaviour: TaskBehaviour,
    /// 按操作覆盖任务结束方式
    overrides: HashMap<VmOperation, TaskBehaviour>,
    failing_lookups: bool,
    next_task: usize,
    calls: Vec<String>,
}

pub struct FakeXen {
    state: Mutex<FakeState>,
}

/// 测试用虚拟机记录构造器
pub struct FakeVm {
    object_ref: String,
    raw: RawVmRecord,
}

/// 构造一台虚拟机，允许的操作按电源状态填充
pub fn vm(object_ref: &str, name: &str, state: PowerState) -> FakeVm {
    FakeVm {
        object_ref: object_ref.to_string(),
        raw: RawVmRecord {
            uuid: format!("uuid-{}", name),
            name_label: name.to_string(),
            name_description: String::new(),
            tags: Vec::new(),
            power_state: state,
            current_operations: HashMap::new(),
            allowed_operations: default_allowed(state),
            is_a_template: false,
            is_control_domain: false,
            extra: serde_json::Map::new(),
        },
    }
}

impl FakeVm {
    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.raw.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn template(mut self) -> Self {
        self.raw.is_a_template = true;
        self
    }

    pub fn allowing(mut self, operations: &[&str]) -> Self {
        self.raw.allowed_operations = operations.iter().map(|op| op.to_string()).collect();
        self
    }

    /// 带一个进行中的操作
    pub fn busy(mut self) -> Self {
        self.raw
            .current_operations
            .insert("OpaqueRef:busy".to_string(), "clean_reboot".to_string());
        self
    }
}

fn default_allowed(state: PowerState) -> Vec<String> {
    let ops: &[&str] = match state {
        PowerState::Halted => &["start", "destroy", "clone", "provision"],
        PowerState::Running => &["clean_shutdown", "hard_shutdown", "clean_reboot", "suspend"],
        PowerState::Suspended => &["resume", "hard_shutdown"],
        _ => &["hard_shutdown"],
    };
    ops.iter().map(|op| op.to_string()).collect()
}

impl FakeXen {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                vms: BTreeMap::new(),
                busy: HashMap::new(),
                session_failures: Vec::new(),
                tasks: HashMap::new(),
                behaviour: TaskBehaviour::SucceedAfter(0),
                overrides: HashMap::new(),
                failing_lookups: false,
                next_task: 0,
                calls: Vec::new(),
            }),
        }
    }

    pub fn with_vm(self, vm: FakeVm) -> Self {
        self.state.lock().unwrap().vms.insert(vm.object_ref, vm.raw);
        self
    }

    /// 之后的 `polls` 次获取仍返回非空操作队列
    pub fn busy_for(&self, object_ref: &str, polls: usize) {
        self.state.lock().unwrap().busy.insert(object_ref.to_string(), polls);
    }

    /// 获取该虚拟机记录时返回连接错误
    pub fn fail_session_on(&self, object_ref: &str) {
        self.state
            .lock()
            .unwrap()
            .session_failures
            .push(object_ref.to_string());
    }

    pub fn set_task_behaviour(&self, behaviour: TaskBehaviour) {
        self.state.lock().unwrap().behaviour = behaviour;
    }

    /// 只对指定操作生效的任务结束方式
    pub fn fail_operation(&self, operation: VmOperation, behaviour: TaskBehaviour) {
        self.state.lock().unwrap().overrides.insert(operation, behaviour);
    }

    /// 任务结束后获取结果/错误信息的调用返回错误
    pub fn fail_task_lookups(&self) {
        self.state.lock().unwrap().failing_lookups = true;
    }

    /// 直接读取记录（不计入调用）
    pub fn record(&self, object_ref: &str) -> VmRecord {
        let state = self.state.lock().unwrap();
        state.vms[object_ref].clone().into_record(object_ref)
    }

    pub fn power_state(&self, object_ref: &str) -> Option<PowerState> {
        let state = self.state.lock().unwrap();
        state.vms.get(object_ref).map(|raw| raw.power_state)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// 以指定方法名开头的调用次数
    pub fn count(&self, method: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.split(' ').next() == Some(method))
            .count()
    }

    /// 已提交的异步调用
    pub fn submitted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with("Async."))
            .collect()
    }

    /// 尚未释放的任务句柄
    pub fn live_tasks(&self) -> Vec<String> {
        self.state.lock().unwrap().tasks.keys().cloned().collect()
    }
}

fn handle_invalid(object_ref: &str) -> Error {
    Error::Hypervisor(format!("[HANDLE_INVALID] {}", object_ref))
}

#[async_trait]
impl XenApi for FakeXen {
    async fn list_vms(&self) -> Result<HashMap<String, RawVmRecord>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("VM.get_all_records".to_string());
        Ok(state.vms.clone().into_iter().collect())
    }

    async fn list_vm_facts(&self) -> Result<HashMap<String, Value>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("VM.get_all_records".to_string());
        let mut records = HashMap::new();
        for (object_ref, raw) in &state.vms {
            records.insert(object_ref.clone(), serde_json::to_value(raw)?);
        }
        Ok(records)
    }

    async fn get_raw_vm(&self, vm_ref: &str) -> Result<RawVmRecord> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("VM.get_record {}", vm_ref));

        if state.session_failures.iter().any(|r| r == vm_ref) {
            return Err(Error::Connection("connection reset by peer".to_string()));
        }

        let busy = state.busy.get(vm_ref).copied().unwrap_or(0);
        if busy > 0 {
            state.busy.insert(vm_ref.to_string(), busy - 1);
        }
        let raw = state
            .vms
            .get_mut(vm_ref)
            .ok_or_else(|| handle_invalid(vm_ref))?;
        if busy == 0 {
            raw.current_operations.clear();
        } else {
            raw.current_operations
                .insert("OpaqueRef:busy".to_string(), "clean_reboot".to_string());
        }
        Ok(raw.clone())
    }

    async fn find_vms_by_name(&self, name: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("VM.get_by_name_label {}", name));
        Ok(state
            .vms
            .iter()
            .filter(|(_, raw)| raw.name_label == name)
            .map(|(object_ref, _)| object_ref.clone())
            .collect())
    }

    async fn submit(&self, vm_ref: &str, call: &VmCall) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("{} {}", call.operation().async_method(), vm_ref));

        if !state.vms.contains_key(vm_ref) {
            return Err(handle_invalid(vm_ref));
        }

        state.next_task += 1;
        let task_ref = format!("OpaqueRef:task{}", state.next_task);
        let behaviour = state
            .overrides
            .get(&call.operation())
            .unwrap_or(&state.behaviour)
            .clone();

        let mut result = None;
        if !matches!(behaviour, TaskBehaviour::Fail(_)) {
            let new_state = match call {
                VmCall::Start | VmCall::Resume | VmCall::CleanReboot => Some(PowerState::Running),
                VmCall::CleanShutdown | VmCall::HardShutdown => Some(PowerState::Halted),
                _ => None,
            };
            if let Some(new_state) = new_state {
                if let Some(raw) = state.vms.get_mut(vm_ref) {
                    raw.power_state = new_state;
                    raw.allowed_operations = default_allowed(new_state);
                }
            }
            match call {
                VmCall::Destroy => {
                    state.vms.remove(vm_ref);
                }
                VmCall::Clone { new_name } => {
                    let new_ref = format!("OpaqueRef:{}", new_name);
                    let mut raw = state.vms[vm_ref].clone();
                    raw.name_label = new_name.clone();
                    raw.uuid = format!("uuid-{}", new_name);
                    raw.is_a_template = false;
                    raw.power_state = PowerState::Halted;
                    raw.allowed_operations = default_allowed(PowerState::Halted);
                    state.vms.insert(new_ref.clone(), raw);
                    result = Some(new_ref);
                }
                _ => {}
            }
        }

        let task = match behaviour {
            TaskBehaviour::SucceedAfter(polls) => FakeTask {
                polls_left: polls,
                status: TaskStatus::Success,
                result,
                error: Vec::new(),
            },
            TaskBehaviour::Fail(error) => FakeTask {
                polls_left: 0,
                status: TaskStatus::Failure,
                result: None,
                error,
            },
            TaskBehaviour::Hang => FakeTask {
                polls_left: usize::MAX,
                status: TaskStatus::Pending,
                result: None,
                error: Vec::new(),
            },
        };
        state.tasks.insert(task_ref.clone(), task);
        Ok(task_ref)
    }

    async fn task_status(&self, task: &str) -> Result<TaskStatus> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("task.get_status {}", task));
        let task = state.tasks.get_mut(task).ok_or_else(|| handle_invalid(task))?;
        if task.polls_left > 0 {
            task.polls_left -= 1;
            return Ok(TaskStatus::Pending);
        }
        Ok(task.status)
    }

    async fn task_result(&self, task: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("task.get_result {}", task));
        if state.failing_lookups {
            return Err(Error::Hypervisor("[INTERNAL_ERROR] task lookup".to_string()));
        }
        let task = state.tasks.get(task).ok_or_else(|| handle_invalid(task))?;
        Ok(task.result.clone())
    }

    async fn task_error(&self, task: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("task.get_error_info {}", task));
        if state.failing_lookups {
            return Err(Error::Hypervisor("[INTERNAL_ERROR] task lookup".to_string()));
        }
        let task = state.tasks.get(task).ok_or_else(|| handle_invalid(task))?;
        Ok(task.error.clone())
    }

    async fn destroy_task(&self, task: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("task.destroy {}", task));
        state
            .tasks
            .remove(task)
            .map(|_| ())
            .ok_or_else(|| handle_invalid(task))
    }
}
