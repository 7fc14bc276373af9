//! 并发闸门 - 基础设施层
//!
//! 限制同时对渲染器执行的任务数量（容量 N），超出的任务按到达顺序排队。
//!
//! - `acquire()` 有空位时立即放行，否则挂起并排入 FIFO 队列
//! - 许可证析构即释放；释放与放行队首在同一把锁内完成，空位不会闲置
//! - 已排队的等待者无法撤销：调用方放弃后，轮到它时该位置会被立即释放
//! - 占用数归零且队列为空时调用排空钩子（渲染器计划重启依赖它）

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

type DrainHook = Box<dyn Fn() + Send + Sync>;

pub struct ConcurrencyGate {
    capacity: usize,
    state: Mutex<GateState>,
    drain_hook: OnceLock<DrainHook>,
}

struct GateState {
    admitted: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// 闸门状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    pub capacity: usize,
    pub admitted: usize,
    pub pending: usize,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            state: Mutex::new(GateState {
                admitted: 0,
                waiters: VecDeque::new(),
            }),
            drain_hook: OnceLock::new(),
        })
    }

    /// 注册排空钩子（只能注册一次）
    ///
    /// 钩子在闸门锁内执行，因此执行期间不会有新任务被放行；钩子不能再调用闸门。
    pub fn on_drain(&self, hook: impl Fn() + Send + Sync + 'static) {
        if self.drain_hook.set(Box::new(hook)).is_err() {
            warn!("排空钩子已注册，忽略重复注册");
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn admitted_count(&self) -> usize {
        self.lock().admitted
    }

    /// 队列中的等待数（包含调用方已放弃但尚未轮到的等待者）
    pub fn pending_count(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn status(&self) -> GateStatus {
        let state = self.lock();
        GateStatus {
            capacity: self.capacity,
            admitted: state.admitted,
            pending: state.waiters.len(),
        }
    }

    /// 获取一个执行许可
    pub async fn acquire(self: &Arc<Self>) -> GatePermit {
        let rx = {
            let mut state = self.lock();
            if state.admitted < self.capacity && state.waiters.is_empty() {
                state.admitted += 1;
                return GatePermit {
                    gate: Arc::clone(self),
                };
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            debug!("闸门已满，排队等待 (队列长度: {})", state.waiters.len());
            rx
        };

        let mut pending = PendingAdmission {
            gate: Arc::clone(self),
            rx: Some(rx),
        };
        if let Some(rx) = pending.rx.as_mut() {
            // 发送端只会在放行时被消费，闸门存活期间不会被直接丢弃
            let _ = rx.await;
        }
        // 已被放行，位置的所有权转交给许可证
        pending.rx = None;

        GatePermit {
            gate: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut state = self.lock();
        loop {
            match state.waiters.pop_front() {
                Some(waiter) => {
                    if waiter.send(()).is_ok() {
                        // 位置直接移交给队首，占用数不变
                        return;
                    }
                    debug!("队首等待者已放弃，其位置立即释放");
                }
                None => {
                    state.admitted = state.admitted.saturating_sub(1);
                    if state.admitted == 0 {
                        if let Some(hook) = self.drain_hook.get() {
                            hook();
                        }
                    }
                    return;
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 执行许可，析构时释放位置
pub struct GatePermit {
    gate: Arc<ConcurrencyGate>,
}

impl fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatePermit")
            .field("capacity", &self.gate.capacity)
            .finish_non_exhaustive()
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// 排队中的获取请求
///
/// 若调用方在等待期间放弃（例如任务超时），关闭接收端；如果放行信号
/// 恰好已经送达，则代为释放这个位置，避免位置泄漏。
struct PendingAdmission {
    gate: Arc<ConcurrencyGate>,
    rx: Option<oneshot::Receiver<()>>,
}

impl Drop for PendingAdmission {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if rx.try_recv().is_ok() {
                self.gate.release();
            }
        }
    }
}
