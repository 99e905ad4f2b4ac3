use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// 周期性刷新的后台任务
///
/// 每个周期调用一次 `on_tick`，返回的 future 作为独立任务执行，
/// 因此停止定时器不会打断正在进行的发送。`on_tick` 返回 None 时任务自行退出。
/// 定时器随所有者一起销毁。
pub(crate) struct FlushTimer {
    handle: JoinHandle<()>,
}

impl FlushTimer {
    pub(crate) fn start<F, Fut>(runtime: &Handle, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Option<Fut> + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = runtime.spawn(async move {
            // 第一次触发在一个周期之后
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match on_tick() {
                    Some(task) => {
                        tokio::spawn(task);
                    }
                    None => break,
                }
            }
        });

        Self { handle }
    }

    /// 停止定时器（已经发出的任务继续执行）
    pub(crate) fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
