use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

use crate::{Result, ShutdownDirection, SocketToken};

/// 统一的同步非阻塞套接字契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 明文套接字与 TLS 套接字必须对分发器、分帧器呈现一模一样的接口，
///   上层只依赖本 trait，既不关心加密，也不继承任何协议基类；
/// - 分发器依赖“可观察的失败形态”做决策：`WouldBlock` 代表“稍后再试”，
///   空读代表 EOF，断开类错误代表关闭，因此实现不得自行吞掉或重试这些信号。
///
/// ## 架构定位（Architecture）
/// - 由 `spark-transport-tcp::TcpSocket` 与 `spark-transport-tls::SecureSocket` 实现；
/// - `spark-dispatch::Channel` 在其上把断开类错误映射为关闭事件。
///
/// ## 契约说明（What）
/// - `recv(max)`：最多读取 `max` 字节；返回空 [`Bytes`] 表示对端有序关闭；
/// - `send(data)`：返回实际写入字节数，可能小于 `data.len()`（短写）；
/// - `connect`：非阻塞模式下可能返回 `EINPROGRESS`/`EALREADY`/`WouldBlock`，由调用方解读；
/// - `accept`：返回新连接与对端地址，新连接继承实现类型（TLS 监听套接字产出 TLS 连接）；
/// - `take_error`：读取并清除 `SO_ERROR`，用于判定异步 connect 的结果；
/// - `wants_write`/`flush`：带内部发送缓冲的实现（TLS）借此在后续可写事件中排空密文，
///   明文实现保持默认值即可。
/// - `pending_read`：已读入实现内部、但尚未被 `recv` 取走的字节数；底层套接字不会再为这些字节
///   触发可读事件，调用方应在其非零时继续 `recv`。
///
/// ## 风险提示（Trade-offs）
/// - 所有方法都是同步调用，除显式切换为阻塞模式外不得阻塞；
/// - `close` 之后的任何调用都应返回 `NotConnected`/`EBADF` 类错误而非 panic。
pub trait Transport: Send + 'static {
    /// 用作 socket map 键的稳定标识。
    fn token(&self) -> SocketToken;

    /// 读取至多 `max` 字节；空结果表示 EOF。
    fn recv(&mut self, max: usize) -> Result<Bytes>;

    /// 写入数据，返回实际写入的字节数。
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// 释放底层资源。
    fn close(&mut self) -> Result<()>;

    fn connect(&mut self, addr: SocketAddr) -> Result<()>;

    fn accept(&mut self) -> Result<(Self, SocketAddr)>
    where
        Self: Sized;

    fn bind(&mut self, addr: SocketAddr) -> Result<()>;

    fn listen(&mut self, backlog: i32) -> Result<()>;

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()>;

    /// 当前阻塞操作超时；`None` 表示无限等待。
    fn timeout(&self) -> Result<Option<Duration>>;

    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;

    fn shutdown(&mut self, how: ShutdownDirection) -> Result<()>;

    /// 读取并清除挂起的套接字错误（`SO_ERROR`）。
    fn take_error(&mut self) -> Result<Option<io::Error>>;

    fn local_addr(&self) -> Result<SocketAddr>;

    fn peer_addr(&self) -> Result<SocketAddr>;

    /// 内部已缓冲、可立即 `recv` 的字节数。
    fn pending_read(&self) -> usize {
        0
    }

    /// 是否仍有内部缓冲的待发送数据。
    fn wants_write(&self) -> bool {
        false
    }

    /// 尝试排空内部缓冲，`WouldBlock` 时保留剩余数据。
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
