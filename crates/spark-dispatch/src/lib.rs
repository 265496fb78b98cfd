#![deny(unsafe_code)]
#![doc = r#"
# spark-dispatch

## 设计动机（Why）
- **组合替代继承**：协议行为不再通过继承分发器基类实现，而是作为 [`Delegate`] 组合进 [`Dispatcher`]；
  委托未覆盖的事件自动回落到 [`fallback`] 中的传输默认行为；
- **单线程就绪驱动**：外部 Reactor 负责多路复用，本 crate 只把“某套接字可读/可写/异常”翻译成委托回调。

## 核心契约（What）
- [`Channel`]：套接字 + `connected`/`accepting`/`connecting` 状态 + 对 `Transport` 错误的事件化映射（EOF/断开 → 关闭，`WouldBlock` → 0）；
- [`Delegate`]：`init`、`handle_connect`、`handle_close`、`handle_read`、`handle_write`、`handle_accept`、
  `handle_expt`、`handle_error`、`readable`、`writable`，全部带默认实现；
- [`Dispatcher`]：事件入口 `handle_read_event`/`handle_write_event`/`handle_expt_event`/[`Dispatcher::readwrite`]；
- [`SocketMap`]/[`SocketRegistry`]：按 [`SocketToken`](spark_transport::SocketToken) 登记的套接字表；
- `SecureDispatcher`（feature `tls`）：创建时即绑定 TLS 上下文，`connect` 短暂阻塞完成握手。

## 实现策略（How）
- 通道上的 recv/send 把 EOF 与断开类错误转成“待处理关闭事件”，由分发器在委托返回后统一派发，
  避免在委托回调内部重入委托；
- 委托返回的错误全部进入错误漏斗 `handle_error`，默认实现记录日志并关闭通道，没有任何重试。

## 风险与考量（Trade-offs）
- 事件派发是同步的，委托内的耗时操作会阻塞整个事件循环；
- 关闭事件延迟到委托返回后派发，委托在同一回调内仍能看到关闭前的通道状态。
"#]

mod channel;
mod delegate;
mod dispatcher;
mod error;
pub mod fallback;
mod map;
mod readiness;
#[cfg(feature = "tls")]
mod secure;

pub use channel::Channel;
pub use delegate::Delegate;
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, HandlerResult};
pub use map::{SocketMap, SocketRegistry};
pub use readiness::Readiness;
#[cfg(feature = "tls")]
pub use secure::SecureDispatcher;
