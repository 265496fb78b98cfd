use crate::error::{
    self, CLOSE, CONFIGURE, CONNECT, READ, SHUTDOWN, WRITE, closed_error, map_io_error,
    unsupported_address,
};
use crate::listener;
use bytes::{Bytes, BytesMut};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use spark_transport::{OperationKind, Result, ShutdownDirection, SocketToken, Transport};
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// TCP 套接字级配置项，实现对内核行为的显式控制。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将“关闭时等待未发送数据多久”这一契约显式配置化，避免调用方直接操作 `socket2`；
/// - 监听套接字持有一份默认配置，`accept` 产出的每条连接都继承它。
///
/// ## 核心逻辑（How）
/// - `linger` 为 `Some(dur)` 时通过 `socket2::Socket::set_linger` 设置 `SO_LINGER`；
/// - `None` 遵循内核默认策略。
///
/// ## 设计取舍与注意事项（Trade-offs）
/// - `SO_LINGER` 在 Linux 上取整到秒；
/// - 若设置过小，仍在发送缓冲区的数据可能被丢弃并触发对端 `ECONNRESET`。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TcpSocketConfig {
    linger: Option<Duration>,
}

impl TcpSocketConfig {
    /// 创建默认配置，等价于 `linger = None`。
    pub const fn new() -> Self {
        Self { linger: None }
    }

    /// 设置 `SO_LINGER` 超时时长。
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    /// 读取当前配置的超时时长。
    pub fn linger(&self) -> Option<Duration> {
        self.linger
    }

    pub(crate) fn apply(&self, socket: &Socket) -> io::Result<()> {
        if self.linger.is_some() {
            socket.set_linger(self.linger)?;
        }
        Ok(())
    }
}

/// 基于 `socket2` 的同步 TCP 套接字，实现 [`Transport`] 契约。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 为分发器提供一个“原样暴露 errno”的明文套接字：非阻塞 connect 的
///   `EINPROGRESS`、读写的 `WouldBlock` 都不在此层消化；
/// - 同一类型既可作为监听套接字也可作为连接套接字，与 BSD socket 模型一致。
///
/// ## 逻辑 (How)
/// - 内部以 `Option<Socket>` 表示生命周期，`close` 取走并释放描述符，之后的调用返回
///   `NotConnected`；
/// - `recv` 每次分配至多 `max` 字节的缓冲并截断到实际读取长度；
/// - `timeout` 同时作用于读写两个方向，并缓存在结构体中以便无系统调用地查询。
///
/// ## 契约 (What)
/// - `stream`/`for_addr`：创建未连接的流套接字；
/// - `from_std`：接管已建立的 `std::net::TcpStream`；
/// - 其余方法见 [`Transport`]。
#[derive(Debug)]
pub struct TcpSocket {
    socket: Option<Socket>,
    token: SocketToken,
    timeout: Option<Duration>,
    config: TcpSocketConfig,
}

impl TcpSocket {
    /// 为给定地址族创建未连接的 TCP 套接字。
    pub fn for_addr(addr: &SocketAddr) -> Result<Self> {
        Self::stream(Domain::for_address(*addr), TcpSocketConfig::default())
    }

    /// 以指定地址族与配置创建未连接的 TCP 套接字。
    pub fn stream(domain: Domain, config: TcpSocketConfig) -> Result<Self> {
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|err| map_io_error(CONFIGURE, err))?;
        config
            .apply(&socket)
            .map_err(|err| map_io_error(CONFIGURE, err))?;
        Ok(Self::from_socket(socket, config))
    }

    /// 接管一个已建立的标准库连接。
    pub fn from_std(stream: TcpStream) -> Self {
        Self::from_socket(Socket::from(stream), TcpSocketConfig::default())
    }

    pub(crate) fn from_socket(socket: Socket, config: TcpSocketConfig) -> Self {
        Self {
            socket: Some(socket),
            token: SocketToken::next(),
            timeout: None,
            config,
        }
    }

    pub fn config(&self) -> &TcpSocketConfig {
        &self.config
    }

    /// 设置 `SO_REUSEADDR`，需在 `bind` 之前调用。
    pub fn set_reuse_address(&mut self, reuse: bool) -> Result<()> {
        self.socket_ref(CONFIGURE)?
            .set_reuse_address(reuse)
            .map_err(|err| map_io_error(CONFIGURE, err))
    }

    pub(crate) fn socket_ref(&self, op: OperationKind) -> Result<&Socket> {
        self.socket.as_ref().ok_or_else(|| closed_error(op))
    }

    fn socket_mut(&mut self, op: OperationKind) -> Result<&mut Socket> {
        self.socket.as_mut().ok_or_else(|| closed_error(op))
    }
}

pub(crate) fn to_inet(addr: SockAddr, op: OperationKind) -> Result<SocketAddr> {
    addr.as_socket().ok_or_else(|| unsupported_address(op))
}

impl Transport for TcpSocket {
    fn token(&self) -> SocketToken {
        self.token
    }

    fn recv(&mut self, max: usize) -> Result<Bytes> {
        let socket = self.socket_mut(READ)?;
        let mut buf = BytesMut::zeroed(max);
        let n = socket.read(&mut buf).map_err(|err| map_io_error(READ, err))?;
        buf.truncate(n);
        Ok(buf.freeze())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.socket_ref(WRITE)?
            .send(data)
            .map_err(|err| map_io_error(WRITE, err))
    }

    fn close(&mut self) -> Result<()> {
        match self.socket.take() {
            Some(socket) => {
                tracing::debug!(target: "spark.transport.tcp", token = %self.token, "closing socket");
                drop(socket);
                Ok(())
            }
            None => Err(closed_error(CLOSE)),
        }
    }

    fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        tracing::debug!(target: "spark.transport.tcp", token = %self.token, %addr, "connect");
        self.socket_ref(CONNECT)?
            .connect(&SockAddr::from(addr))
            .map_err(|err| map_io_error(CONNECT, err))
    }

    fn accept(&mut self) -> Result<(Self, SocketAddr)> {
        let socket = self.socket_ref(error::ACCEPT)?;
        listener::accept_from(socket, &self.config)
    }

    fn bind(&mut self, addr: SocketAddr) -> Result<()> {
        self.socket_ref(error::BIND)?
            .bind(&SockAddr::from(addr))
            .map_err(|err| map_io_error(error::BIND, err))
    }

    fn listen(&mut self, backlog: i32) -> Result<()> {
        self.socket_ref(error::LISTEN)?
            .listen(backlog)
            .map_err(|err| map_io_error(error::LISTEN, err))
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()> {
        self.socket_ref(CONFIGURE)?
            .set_nonblocking(nonblocking)
            .map_err(|err| map_io_error(CONFIGURE, err))
    }

    fn timeout(&self) -> Result<Option<Duration>> {
        self.socket_ref(CONFIGURE)?;
        Ok(self.timeout)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        let socket = self.socket_ref(CONFIGURE)?;
        socket
            .set_read_timeout(timeout)
            .and_then(|()| socket.set_write_timeout(timeout))
            .map_err(|err| map_io_error(CONFIGURE, err))?;
        self.timeout = timeout;
        Ok(())
    }

    fn shutdown(&mut self, how: ShutdownDirection) -> Result<()> {
        self.socket_ref(SHUTDOWN)?
            .shutdown(how.into())
            .map_err(|err| map_io_error(SHUTDOWN, err))
    }

    fn take_error(&mut self) -> Result<Option<io::Error>> {
        self.socket_ref(CONFIGURE)?
            .take_error()
            .map_err(|err| map_io_error(CONFIGURE, err))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        let addr = self
            .socket_ref(CONFIGURE)?
            .local_addr()
            .map_err(|err| map_io_error(CONFIGURE, err))?;
        to_inet(addr, CONFIGURE)
    }

    fn peer_addr(&self) -> Result<SocketAddr> {
        let addr = self
            .socket_ref(CONFIGURE)?
            .peer_addr()
            .map_err(|err| map_io_error(CONFIGURE, err))?;
        to_inet(addr, CONFIGURE)
    }
}

impl From<TcpStream> for TcpSocket {
    fn from(stream: TcpStream) -> Self {
        Self::from_std(stream)
    }
}
