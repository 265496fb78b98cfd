use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use spark_transport::{ErrorCategory, OperationKind, SocketToken, Transport, TransportError};

use crate::error::DispatchError;
use crate::map::SocketMap;

const NO_SOCKET: OperationKind =
    OperationKind::new("spark.dispatch.no_socket", "channel has no socket");

/// 通道操作登记、由分发器在委托返回后派发的事件。
#[derive(Debug)]
pub(crate) enum ChannelEvent {
    Connect,
    Close,
    Error(DispatchError),
}

/// 分发器持有的套接字及其连接状态。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 委托拿到的是通道而不是裸套接字：通道把传输错误翻译成分发语义
///   （`WouldBlock` → 写出 0 字节，EOF/断开 → 关闭事件），委托只面对业务；
/// - `connected`/`accepting`/`connecting` 决定读写事件被路由到 accept、connect 完成还是普通读写。
///
/// ## 逻辑（How）
/// - `recv`/`send`/`connect` 在需要触发其他事件时只登记 [`ChannelEvent`]，
///   由 [`Dispatcher`](crate::Dispatcher) 在当前回调结束后依序派发；
/// - 绑定套接字即登记进 [`SocketMap`]，`close` 时注销。
///
/// ## 契约（What）
/// - 绑定的套接字总是被切换为非阻塞模式；
/// - `close` 幂等：第二次调用不再触碰套接字。
pub struct Channel<T: Transport> {
    socket: Option<T>,
    token: Option<SocketToken>,
    map: Arc<dyn SocketMap>,
    connected: bool,
    accepting: bool,
    connecting: bool,
    addr: Option<SocketAddr>,
    events: VecDeque<ChannelEvent>,
}

impl<T: Transport> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("token", &self.token)
            .field("connected", &self.connected)
            .field("accepting", &self.accepting)
            .field("connecting", &self.connecting)
            .field("addr", &self.addr)
            .field("pending_events", &self.events.len())
            .finish()
    }
}

impl<T: Transport> Channel<T> {
    /// 尚未绑定套接字的通道，稍后通过 [`Channel::create_socket`] 绑定。
    pub fn new(map: Arc<dyn SocketMap>) -> Self {
        Self {
            socket: None,
            token: None,
            map,
            connected: false,
            accepting: false,
            connecting: false,
            addr: None,
            events: VecDeque::new(),
        }
    }

    /// 绑定一个已存在的套接字（通常来自 accept）。
    ///
    /// 能取到对端地址即视为已连接；`NotConnected`/`InvalidInput` 表示尚未连接，
    /// 其余错误直接返回且不登记。
    pub fn with_socket(mut socket: T, map: Arc<dyn SocketMap>) -> Result<Self, DispatchError> {
        socket.set_nonblocking(true)?;
        let (connected, addr) = match socket.peer_addr() {
            Ok(peer) => (true, Some(peer)),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::NotConnected | io::ErrorKind::InvalidInput
                ) =>
            {
                (false, None)
            }
            Err(err) => return Err(err.into()),
        };
        let mut channel = Self::new(map);
        channel.set_socket(socket);
        channel.connected = connected;
        channel.addr = addr;
        Ok(channel)
    }

    /// 切换为非阻塞并绑定套接字。
    pub fn create_socket(&mut self, mut socket: T) -> Result<(), DispatchError> {
        socket.set_nonblocking(true)?;
        self.set_socket(socket);
        Ok(())
    }

    /// 绑定套接字并登记进套接字表；已有套接字的登记会先被注销。
    pub fn set_socket(&mut self, socket: T) {
        if let Some(previous) = self.token.take() {
            self.map.del_channel(previous);
        }
        let token = socket.token();
        self.map.add_channel(token);
        self.token = Some(token);
        self.socket = Some(socket);
    }

    pub fn socket(&self) -> Option<&T> {
        self.socket.as_ref()
    }

    pub fn socket_mut(&mut self) -> Option<&mut T> {
        self.socket.as_mut()
    }

    pub fn token(&self) -> Option<SocketToken> {
        self.token
    }

    pub fn map(&self) -> &Arc<dyn SocketMap> {
        &self.map
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn accepting(&self) -> bool {
        self.accepting
    }

    pub fn connecting(&self) -> bool {
        self.connecting
    }

    /// 对端（或监听）地址。
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn has_socket(&self) -> bool {
        self.socket.is_some()
    }

    /// 登记一次关闭事件，委托返回后由分发器调用 `handle_close`。
    pub fn request_close(&mut self) {
        if !matches!(self.events.back(), Some(ChannelEvent::Close)) {
            self.events.push_back(ChannelEvent::Close);
        }
    }

    /// 登记一个错误，委托返回后进入 `handle_error`。
    pub fn report_error(&mut self, error: impl Into<DispatchError>) {
        self.events.push_back(ChannelEvent::Error(error.into()));
    }

    pub(crate) fn require_socket(&mut self) -> Result<&mut T, TransportError> {
        self.socket
            .as_mut()
            .ok_or_else(|| TransportError::new(NO_SOCKET, io::ErrorKind::NotConnected.into()))
    }

    /// 写出数据，返回实际写出的字节数。
    ///
    /// `WouldBlock` 记为 0；断开类错误登记关闭事件并返回 0；其他错误原样返回。
    pub fn send(&mut self, data: &[u8]) -> Result<usize, DispatchError> {
        match self.require_socket()?.send(data) {
            Ok(sent) => Ok(sent),
            Err(err) if err.is_would_block() => Ok(0),
            Err(err) if err.is_disconnect() => {
                self.request_close();
                Ok(0)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// 读取至多 `max` 字节。
    ///
    /// EOF 与断开类错误登记关闭事件并返回空结果；`WouldBlock`（例如 TLS 记录尚不完整）
    /// 返回空结果但不关闭。
    pub fn recv(&mut self, max: usize) -> Result<Bytes, DispatchError> {
        match self.require_socket()?.recv(max) {
            Ok(data) if data.is_empty() => {
                self.request_close();
                Ok(data)
            }
            Ok(data) => Ok(data),
            Err(err) if err.is_would_block() => Ok(Bytes::new()),
            Err(err) if err.is_disconnect() => {
                self.request_close();
                Ok(Bytes::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// 发起非阻塞连接。
    ///
    /// 进行中（`EINPROGRESS`/`EALREADY`/`WouldBlock`）时保持 `connecting`，等待可写事件完成；
    /// 立即成功或 `EISCONN` 时登记连接事件。
    pub fn connect(&mut self, addr: SocketAddr) -> Result<(), DispatchError> {
        self.connected = false;
        self.connecting = true;
        match self.require_socket()?.connect(addr) {
            Ok(()) => {
                self.addr = Some(addr);
                self.events.push_back(ChannelEvent::Connect);
                Ok(())
            }
            Err(err) if connect_in_progress(&err) => {
                self.addr = Some(addr);
                Ok(())
            }
            Err(err) if already_connected(&err) => {
                self.addr = Some(addr);
                self.events.push_back(ChannelEvent::Connect);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// 接受一个连接；`WouldBlock` 或连接已被对端放弃时返回 `None`。
    ///
    /// 安全类与超时类错误只属于单个对端（证书被拒、握手超期），同样返回 `None`，
    /// 监听套接字保持注册。
    pub fn accept(&mut self) -> Result<Option<(T, SocketAddr)>, DispatchError> {
        match self.require_socket()?.accept() {
            Ok(pair) => Ok(Some(pair)),
            Err(err) if peer_scoped(&err) => {
                tracing::warn!(
                    target: "spark.dispatch",
                    token = ?self.token,
                    code = err.code(),
                    category = ?err.category(),
                    error = %err,
                    "accept rejected a peer"
                );
                Ok(None)
            }
            Err(err) if err.is_would_block() || err.is_disconnect() => {
                tracing::debug!(
                    target: "spark.dispatch",
                    token = ?self.token,
                    code = err.code(),
                    error = %err,
                    "accept yielded no connection"
                );
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn bind(&mut self, addr: SocketAddr) -> Result<(), DispatchError> {
        self.addr = Some(addr);
        self.require_socket()?.bind(addr)?;
        Ok(())
    }

    pub fn listen(&mut self, backlog: i32) -> Result<(), DispatchError> {
        self.accepting = true;
        self.require_socket()?.listen(backlog)?;
        Ok(())
    }

    /// 套接字内部已缓冲、可立即读取的字节数（例如 TLS 已解密的明文）。
    pub fn pending_read(&self) -> usize {
        self.socket.as_ref().map_or(0, Transport::pending_read)
    }

    /// 套接字内部是否还有待写出的数据（例如 TLS 密文）。
    pub fn wants_write(&self) -> bool {
        self.socket.as_ref().is_some_and(Transport::wants_write)
    }

    /// 尝试排空套接字内部缓冲；错误映射与 [`Channel::send`] 一致。
    pub fn flush(&mut self) -> Result<(), DispatchError> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(());
        };
        if !socket.wants_write() {
            return Ok(());
        }
        match socket.flush() {
            Ok(()) => Ok(()),
            Err(err) if err.is_would_block() => Ok(()),
            Err(err) if err.is_disconnect() => {
                self.request_close();
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// 读取并清除挂起的套接字错误。
    pub fn take_socket_error(&mut self) -> Result<Option<io::Error>, DispatchError> {
        Ok(self.require_socket()?.take_error()?)
    }

    /// 清除状态、注销登记并关闭套接字。
    ///
    /// 套接字已处于未连接/坏描述符状态时的关闭失败被忽略。
    pub fn close(&mut self) -> Result<(), DispatchError> {
        self.connected = false;
        self.accepting = false;
        self.connecting = false;
        if let Some(token) = self.token.take() {
            self.map.del_channel(token);
        }
        let Some(mut socket) = self.socket.take() else {
            return Ok(());
        };
        match socket.close() {
            Ok(()) => Ok(()),
            Err(err) if err.is_disconnect() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub(crate) fn set_connecting(&mut self, connecting: bool) {
        self.connecting = connecting;
    }

    #[cfg_attr(not(feature = "tls"), allow(dead_code))]
    pub(crate) fn set_addr(&mut self, addr: SocketAddr) {
        self.addr = Some(addr);
    }

    pub(crate) fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.pop_front()
    }
}

fn peer_scoped(err: &TransportError) -> bool {
    matches!(err.category(), ErrorCategory::Security | ErrorCategory::Timeout)
}

fn connect_in_progress(err: &TransportError) -> bool {
    err.is_would_block() || connect_errno_in_progress(err.raw_os_error())
}

#[cfg(unix)]
fn connect_errno_in_progress(raw: Option<i32>) -> bool {
    use nix::errno::Errno;
    raw.is_some_and(|code| matches!(Errno::from_raw(code), Errno::EINPROGRESS | Errno::EALREADY))
}

#[cfg(not(unix))]
fn connect_errno_in_progress(_raw: Option<i32>) -> bool {
    false
}

#[cfg(unix)]
fn already_connected(err: &TransportError) -> bool {
    use nix::errno::Errno;
    err.raw_os_error()
        .is_some_and(|code| Errno::from_raw(code) == Errno::EISCONN)
}

#[cfg(not(unix))]
fn already_connected(_err: &TransportError) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::SocketRegistry;
    use spark_transport::testing::ScriptedTransport;

    fn channel() -> (Channel<ScriptedTransport>, spark_transport::testing::ScriptHandle, Arc<SocketRegistry>) {
        let registry = SocketRegistry::new();
        let (raw, handle) = ScriptedTransport::new();
        let channel = Channel::with_socket(raw, registry.clone()).expect("绑定套接字");
        (channel, handle, registry)
    }

    #[test]
    fn binding_registers_and_switches_to_nonblocking() {
        let (channel, handle, registry) = channel();
        assert!(handle.is_nonblocking());
        assert!(channel.connected());
        assert!(registry.contains(channel.token().expect("已登记")));
    }

    #[test]
    fn unconnected_socket_is_not_marked_connected() {
        let registry = SocketRegistry::new();
        let (raw, handle) = ScriptedTransport::new();
        handle.clear_peer_addr();
        let channel = Channel::with_socket(raw, registry).expect("绑定套接字");
        assert!(!channel.connected());
        assert_eq!(channel.addr(), None);
    }

    #[test]
    fn would_block_send_reports_zero() {
        let (mut channel, handle, _) = channel();
        handle.set_send_limit(Some(0));
        assert_eq!(channel.send(b"abc").expect("写出"), 0);
        assert!(channel.next_event().is_none());
    }

    #[test]
    fn disconnect_on_send_requests_close_once() {
        let (mut channel, handle, _) = channel();
        handle.push_send_error(io::ErrorKind::BrokenPipe);
        handle.push_send_error(io::ErrorKind::ConnectionReset);
        assert_eq!(channel.send(b"abc").expect("断开映射为 0"), 0);
        assert_eq!(channel.send(b"abc").expect("断开映射为 0"), 0);
        assert!(matches!(channel.next_event(), Some(ChannelEvent::Close)));
        assert!(channel.next_event().is_none());
    }

    #[test]
    fn eof_requests_close_but_would_block_does_not() {
        let (mut channel, handle, _) = channel();
        assert!(channel.recv(16).expect("WouldBlock").is_empty());
        assert!(channel.next_event().is_none());

        handle.push_eof();
        assert!(channel.recv(16).expect("EOF").is_empty());
        assert!(matches!(channel.next_event(), Some(ChannelEvent::Close)));
    }

    #[test]
    fn other_recv_errors_propagate() {
        let (mut channel, handle, _) = channel();
        handle.push_recv_error(io::ErrorKind::InvalidData);
        let err = channel.recv(16).expect_err("非断开错误必须上抛");
        assert_eq!(err.code(), "spark.transport.scripted.read_failed");
    }

    #[test]
    fn close_is_idempotent_and_unregisters() {
        let (mut channel, handle, registry) = channel();
        channel.close().expect("首次关闭");
        channel.close().expect("再次关闭");
        assert!(registry.is_empty());
        assert_eq!(handle.calls().iter().filter(|c| **c == "close").count(), 1);
        assert!(!channel.connected());
    }

    #[test]
    fn close_ignores_not_connected() {
        let (mut channel, handle, _) = channel();
        handle.fail_close(io::ErrorKind::NotConnected);
        channel.close().expect("未连接的关闭失败被忽略");

        let (mut other, other_handle, _) = self::channel();
        other_handle.fail_close(io::ErrorKind::PermissionDenied);
        assert!(other.close().is_err());
    }

    #[test]
    fn operations_without_socket_fail() {
        let mut channel: Channel<ScriptedTransport> = Channel::new(SocketRegistry::new());
        let err = channel.send(b"x").expect_err("没有套接字");
        assert_eq!(err.code(), "spark.dispatch.no_socket");
    }
}
