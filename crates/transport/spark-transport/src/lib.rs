#![deny(unsafe_code)]
#![doc = "spark-transport: 就绪驱动（readiness-driven）套接字的统一传输契约。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：明文 TCP 与 TLS 加密套接字必须向分发器与分帧器呈现完全一致的 recv/send/accept/close 语义，才能用组合替代继承。"]
#![doc = "- **What**：定义 [`Transport`] trait、稳定错误码 [`OperationKind`]、错误分类 [`ErrorCategory`] 以及套接字标识 [`SocketToken`]。"]
#![doc = "- **How**：全部操作均为同步、非阻塞调用；`WouldBlock` 等“尚未就绪”信号原样返回，由外部 Reactor 在就绪后重新调度。"]

pub mod connection;
pub mod error;
pub mod shutdown;
pub mod token;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use connection::Transport;
pub use error::{ErrorCategory, OperationKind, TransportError};
pub use shutdown::ShutdownDirection;
pub use token::SocketToken;

/// 传输层统一返回别名，默认错误类型为 [`TransportError`]。
pub type Result<T, E = TransportError> = core::result::Result<T, E>;
