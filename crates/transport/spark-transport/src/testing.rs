//! 脚本化内存传输，供各 crate 的单元测试与契约测试复用。
//!
//! # 教案级说明
//! - **Why**：分帧器与分发器的核心语义（短写、断开映射、关闭顺序）依赖精确可控的失败注入，
//!   真实套接字难以稳定复现；
//! - **How**：[`ScriptedTransport`] 与 [`ScriptHandle`] 共享同一份状态，测试把脚本写入句柄、
//!   把传输交给被测对象，最后再从句柄读取写出的字节与调用日志；
//! - **What**：入站数据按脚本顺序逐块吐出，脚本耗尽时返回 `WouldBlock`；
//!   `send` 可限制单次写入量以模拟短写。

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{OperationKind, Result, ShutdownDirection, SocketToken, Transport, TransportError};

const READ: OperationKind = OperationKind::new("spark.transport.scripted.read_failed", "scripted read");
const WRITE: OperationKind =
    OperationKind::new("spark.transport.scripted.write_failed", "scripted write");
const CONNECT: OperationKind =
    OperationKind::new("spark.transport.scripted.connect_failed", "scripted connect");
const ACCEPT: OperationKind =
    OperationKind::new("spark.transport.scripted.accept_failed", "scripted accept");
const SHUTDOWN: OperationKind =
    OperationKind::new("spark.transport.scripted.shutdown_failed", "scripted shutdown");
const CLOSE: OperationKind =
    OperationKind::new("spark.transport.scripted.close_failed", "scripted close");
const CONFIGURE: OperationKind =
    OperationKind::new("spark.transport.scripted.configure_failed", "scripted configure");
const PEER: OperationKind =
    OperationKind::new("spark.transport.scripted.peer_failed", "scripted peer address");

/// 可复制的错误描述；`io::Error` 本身不可 `Clone`，脚本中只保存生成它所需的信息。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptedError {
    Kind(io::ErrorKind),
    Os(i32),
}

impl ScriptedError {
    pub fn to_io(self) -> io::Error {
        match self {
            ScriptedError::Kind(kind) => io::Error::from(kind),
            ScriptedError::Os(code) => io::Error::from_raw_os_error(code),
        }
    }
}

impl From<io::ErrorKind> for ScriptedError {
    fn from(kind: io::ErrorKind) -> Self {
        ScriptedError::Kind(kind)
    }
}

enum Inbound {
    Data(Bytes),
    Eof,
    Error(ScriptedError),
}

struct ScriptState {
    inbound: VecDeque<Inbound>,
    send_limit: Option<usize>,
    send_errors: VecDeque<ScriptedError>,
    connect_results: VecDeque<ScriptedError>,
    accept_queue: VecDeque<(ScriptedTransport, SocketAddr)>,
    accept_errors: VecDeque<ScriptedError>,
    buffered_reads: bool,
    pending_error: Option<ScriptedError>,
    shutdown_error: Option<ScriptedError>,
    close_error: Option<ScriptedError>,
    written: Vec<u8>,
    calls: Vec<&'static str>,
    nonblocking: bool,
    timeout: Option<Duration>,
    closed: bool,
    local: SocketAddr,
    peer: Option<SocketAddr>,
}

impl Default for ScriptState {
    fn default() -> Self {
        let loopback = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        Self {
            inbound: VecDeque::new(),
            send_limit: None,
            send_errors: VecDeque::new(),
            connect_results: VecDeque::new(),
            accept_queue: VecDeque::new(),
            accept_errors: VecDeque::new(),
            buffered_reads: false,
            pending_error: None,
            shutdown_error: None,
            close_error: None,
            written: Vec::new(),
            calls: Vec::new(),
            nonblocking: false,
            timeout: None,
            closed: false,
            local: loopback,
            peer: Some(loopback),
        }
    }
}

/// 内存传输本体，交给被测对象持有。
pub struct ScriptedTransport {
    token: SocketToken,
    state: Arc<Mutex<ScriptState>>,
}

/// 测试侧句柄：写脚本、读结果。
#[derive(Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, ScriptHandle) {
        let state = Arc::new(Mutex::new(ScriptState::default()));
        (
            Self {
                token: SocketToken::next(),
                state: Arc::clone(&state),
            },
            ScriptHandle { state },
        )
    }
}

impl ScriptHandle {
    pub fn push_inbound(&self, data: impl Into<Bytes>) {
        self.state.lock().inbound.push_back(Inbound::Data(data.into()));
    }

    /// 下一次 `recv` 返回空结果（对端关闭）。
    pub fn push_eof(&self) {
        self.state.lock().inbound.push_back(Inbound::Eof);
    }

    pub fn push_recv_error(&self, error: impl Into<ScriptedError>) {
        self.state
            .lock()
            .inbound
            .push_back(Inbound::Error(error.into()));
    }

    /// 限制单次 `send` 写入量；`Some(0)` 表示持续 `WouldBlock`。
    pub fn set_send_limit(&self, limit: Option<usize>) {
        self.state.lock().send_limit = limit;
    }

    pub fn push_send_error(&self, error: impl Into<ScriptedError>) {
        self.state.lock().send_errors.push_back(error.into());
    }

    /// 下一次 `connect` 返回给定错误；脚本为空时 `connect` 直接成功。
    pub fn push_connect_result(&self, error: impl Into<ScriptedError>) {
        self.state.lock().connect_results.push_back(error.into());
    }

    pub fn push_accept(&self, transport: ScriptedTransport, addr: SocketAddr) {
        self.state.lock().accept_queue.push_back((transport, addr));
    }

    /// 下一次 `accept` 返回给定错误，优先于排队的连接。
    pub fn push_accept_error(&self, error: impl Into<ScriptedError>) {
        self.state.lock().accept_errors.push_back(error.into());
    }

    /// 开启后，队首数据块视为已进入内部缓冲，其长度由 `pending_read` 报告。
    pub fn set_buffered_reads(&self, buffered: bool) {
        self.state.lock().buffered_reads = buffered;
    }

    /// 设置 `take_error` 将返回的挂起错误（读取后清除）。
    pub fn set_pending_error(&self, error: impl Into<ScriptedError>) {
        self.state.lock().pending_error = Some(error.into());
    }

    pub fn fail_shutdown(&self, error: impl Into<ScriptedError>) {
        self.state.lock().shutdown_error = Some(error.into());
    }

    pub fn fail_close(&self, error: impl Into<ScriptedError>) {
        self.state.lock().close_error = Some(error.into());
    }

    pub fn set_peer_addr(&self, addr: SocketAddr) {
        self.state.lock().peer = Some(addr);
    }

    /// 让 `peer_addr` 返回 `NotConnected`，模拟尚未连接的套接字。
    pub fn clear_peer_addr(&self) {
        self.state.lock().peer = None;
    }

    /// 迄今为止成功写出的全部字节。
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().written)
    }

    /// 按调用顺序记录的方法名。
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn is_nonblocking(&self) -> bool {
        self.state.lock().nonblocking
    }

    pub fn inbound_remaining(&self) -> usize {
        self.state.lock().inbound.len()
    }
}

impl Transport for ScriptedTransport {
    fn token(&self) -> SocketToken {
        self.token
    }

    fn recv(&mut self, max: usize) -> Result<Bytes> {
        let mut state = self.state.lock();
        state.calls.push("recv");
        if state.closed {
            return Err(TransportError::new(READ, io::ErrorKind::NotConnected.into()));
        }
        match state.inbound.pop_front() {
            None => Err(TransportError::new(READ, io::ErrorKind::WouldBlock.into())),
            Some(Inbound::Eof) => Ok(Bytes::new()),
            Some(Inbound::Error(error)) => Err(TransportError::new(READ, error.to_io())),
            Some(Inbound::Data(mut data)) => {
                if data.len() > max {
                    let rest = data.split_off(max);
                    state.inbound.push_front(Inbound::Data(rest));
                }
                Ok(data)
            }
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        state.calls.push("send");
        if state.closed {
            return Err(TransportError::new(WRITE, io::ErrorKind::NotConnected.into()));
        }
        if let Some(error) = state.send_errors.pop_front() {
            return Err(TransportError::new(WRITE, error.to_io()));
        }
        let n = match state.send_limit {
            Some(0) => return Err(TransportError::new(WRITE, io::ErrorKind::WouldBlock.into())),
            Some(limit) => limit.min(data.len()),
            None => data.len(),
        };
        state.written.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("close");
        state.closed = true;
        match state.close_error.take() {
            Some(error) => Err(TransportError::new(CLOSE, error.to_io())),
            None => Ok(()),
        }
    }

    fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("connect");
        match state.connect_results.pop_front() {
            Some(error) => Err(TransportError::new(CONNECT, error.to_io())),
            None => {
                state.peer = Some(addr);
                Ok(())
            }
        }
    }

    fn accept(&mut self) -> Result<(Self, SocketAddr)> {
        let mut state = self.state.lock();
        state.calls.push("accept");
        if let Some(error) = state.accept_errors.pop_front() {
            return Err(TransportError::new(ACCEPT, error.to_io()));
        }
        state
            .accept_queue
            .pop_front()
            .ok_or_else(|| TransportError::new(ACCEPT, io::ErrorKind::WouldBlock.into()))
    }

    fn bind(&mut self, addr: SocketAddr) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("bind");
        state.local = addr;
        Ok(())
    }

    fn listen(&mut self, _backlog: i32) -> Result<()> {
        self.state.lock().calls.push("listen");
        Ok(())
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("set_nonblocking");
        state.nonblocking = nonblocking;
        Ok(())
    }

    fn timeout(&self) -> Result<Option<Duration>> {
        Ok(self.state.lock().timeout)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("set_timeout");
        if timeout == Some(Duration::ZERO) {
            return Err(TransportError::new(
                CONFIGURE,
                io::Error::new(io::ErrorKind::InvalidInput, "zero timeout"),
            ));
        }
        state.timeout = timeout;
        Ok(())
    }

    fn shutdown(&mut self, _how: ShutdownDirection) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("shutdown");
        match state.shutdown_error.take() {
            Some(error) => Err(TransportError::new(SHUTDOWN, error.to_io())),
            None => Ok(()),
        }
    }

    fn take_error(&mut self) -> Result<Option<io::Error>> {
        let mut state = self.state.lock();
        state.calls.push("take_error");
        Ok(state.pending_error.take().map(ScriptedError::to_io))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.state.lock().local)
    }

    fn peer_addr(&self) -> Result<SocketAddr> {
        self.state
            .lock()
            .peer
            .ok_or_else(|| TransportError::new(PEER, io::ErrorKind::NotConnected.into()))
    }

    fn pending_read(&self) -> usize {
        let state = self.state.lock();
        match state.inbound.front() {
            Some(Inbound::Data(data)) if state.buffered_reads => data.len(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_chunks_are_split_by_max() {
        let (mut transport, handle) = ScriptedTransport::new();
        handle.push_inbound(&b"abcdef"[..]);
        assert_eq!(transport.recv(4).expect("first slice"), &b"abcd"[..]);
        assert_eq!(transport.recv(4).expect("second slice"), &b"ef"[..]);
        assert!(transport.recv(4).expect_err("script exhausted").is_would_block());
    }

    #[test]
    fn send_limit_produces_short_writes() {
        let (mut transport, handle) = ScriptedTransport::new();
        handle.set_send_limit(Some(1));
        assert_eq!(transport.send(b"xyz").expect("short write"), 1);
        assert_eq!(handle.written(), b"x");
    }
}
