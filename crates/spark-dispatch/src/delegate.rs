use spark_transport::Transport;

use crate::channel::Channel;
use crate::error::{DispatchError, HandlerResult};
use crate::fallback;

/// 组合进分发器的协议行为。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 用一个“能力集合”对象替代对分发器基类的继承：同一个委托可以挂在明文或 TLS 分发器上；
/// - 每个能力都有默认实现（见 [`fallback`]），委托只覆盖关心的事件。
///
/// ## 契约（What）
/// - 所有回调都拿到当前 [`Channel`]，通过它收发数据、关闭或登记错误；
/// - `handle_*` 返回的错误进入 `handle_error`，分发器不会吞掉也不会重试；
/// - `init` 在通道绑定后恰好调用一次，返回错误会让分发器构造失败；
/// - `readable`/`writable` 供 Reactor 决定是否关注读写就绪。
///
/// ## 风险提示（Trade-offs）
/// - 回调在事件循环线程上同步执行，不得阻塞；
/// - `handle_error` 没有返回值：错误处理本身的失败只能记录日志或登记关闭。
pub trait Delegate<T: Transport> {
    fn init(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        let _ = channel;
        Ok(())
    }

    fn handle_connect(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        fallback::handle_connect(channel)
    }

    fn handle_close(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        fallback::handle_close(channel)
    }

    fn handle_read(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        fallback::handle_read(channel)
    }

    fn handle_write(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        fallback::handle_write(channel)
    }

    fn handle_accept(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        fallback::handle_accept(channel)
    }

    fn handle_expt(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        fallback::handle_expt(channel)
    }

    fn handle_error(&mut self, channel: &mut Channel<T>, error: DispatchError) {
        fallback::handle_error(channel, error)
    }

    fn readable(&self, channel: &Channel<T>) -> bool {
        fallback::readable(channel)
    }

    fn writable(&self, channel: &Channel<T>) -> bool {
        fallback::writable(channel)
    }
}

/// 调用方保留所有权、分发器只借用委托。
impl<T: Transport, D: Delegate<T> + ?Sized> Delegate<T> for &mut D {
    fn init(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).init(channel)
    }

    fn handle_connect(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).handle_connect(channel)
    }

    fn handle_close(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).handle_close(channel)
    }

    fn handle_read(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).handle_read(channel)
    }

    fn handle_write(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).handle_write(channel)
    }

    fn handle_accept(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).handle_accept(channel)
    }

    fn handle_expt(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).handle_expt(channel)
    }

    fn handle_error(&mut self, channel: &mut Channel<T>, error: DispatchError) {
        (**self).handle_error(channel, error)
    }

    fn readable(&self, channel: &Channel<T>) -> bool {
        (**self).readable(channel)
    }

    fn writable(&self, channel: &Channel<T>) -> bool {
        (**self).writable(channel)
    }
}

impl<T: Transport, D: Delegate<T> + ?Sized> Delegate<T> for Box<D> {
    fn init(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).init(channel)
    }

    fn handle_connect(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).handle_connect(channel)
    }

    fn handle_close(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).handle_close(channel)
    }

    fn handle_read(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).handle_read(channel)
    }

    fn handle_write(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).handle_write(channel)
    }

    fn handle_accept(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).handle_accept(channel)
    }

    fn handle_expt(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        (**self).handle_expt(channel)
    }

    fn handle_error(&mut self, channel: &mut Channel<T>, error: DispatchError) {
        (**self).handle_error(channel, error)
    }

    fn readable(&self, channel: &Channel<T>) -> bool {
        (**self).readable(channel)
    }

    fn writable(&self, channel: &Channel<T>) -> bool {
        (**self).writable(channel)
    }
}

/// 全部使用默认行为的空委托。
impl<T: Transport> Delegate<T> for () {}
