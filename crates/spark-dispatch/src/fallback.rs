//! 委托未覆盖事件时使用的传输默认行为。
//!
//! # 教案级说明
//! - **Why**：委托只实现关心的事件，其余事件必须有确定且无害的落点；
//! - **What**：connect/read/write/accept/expt 记录 `unhandled ... event` 告警后什么也不做；
//!   close 记录告警并关闭通道；error 以 `error` 级别记录错误码与文案，然后登记关闭；
//! - **How**：全部是自由函数，委托在覆盖某个事件时仍可显式调用它们复用默认行为。

use spark_transport::Transport;

use crate::channel::Channel;
use crate::error::{DispatchError, HandlerResult};

fn unhandled<T: Transport>(channel: &Channel<T>, event: &'static str) {
    tracing::warn!(
        target: "spark.dispatch",
        token = ?channel.token(),
        event,
        "unhandled {event} event"
    );
}

pub fn handle_connect<T: Transport>(channel: &mut Channel<T>) -> HandlerResult {
    unhandled(channel, "connect");
    Ok(())
}

pub fn handle_read<T: Transport>(channel: &mut Channel<T>) -> HandlerResult {
    unhandled(channel, "read");
    Ok(())
}

pub fn handle_write<T: Transport>(channel: &mut Channel<T>) -> HandlerResult {
    unhandled(channel, "write");
    Ok(())
}

/// 默认不接受连接：挂起的连接留在 backlog 中。
pub fn handle_accept<T: Transport>(channel: &mut Channel<T>) -> HandlerResult {
    unhandled(channel, "accept");
    Ok(())
}

pub fn handle_expt<T: Transport>(channel: &mut Channel<T>) -> HandlerResult {
    unhandled(channel, "incoming priority");
    Ok(())
}

pub fn handle_close<T: Transport>(channel: &mut Channel<T>) -> HandlerResult {
    unhandled(channel, "close");
    channel.close()
}

/// 记录错误并登记关闭；关闭随后经由委托的 `handle_close` 派发。
pub fn handle_error<T: Transport>(channel: &mut Channel<T>, error: DispatchError) {
    tracing::error!(
        target: "spark.dispatch",
        token = ?channel.token(),
        code = error.code(),
        error = %error,
        "uncaptured error, closing channel"
    );
    channel.request_close();
}

pub fn readable<T: Transport>(_channel: &Channel<T>) -> bool {
    true
}

pub fn writable<T: Transport>(_channel: &Channel<T>) -> bool {
    true
}
