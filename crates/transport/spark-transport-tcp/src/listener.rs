use crate::TcpSocket;
use crate::error::{self, map_io_error};
use crate::socket::{TcpSocketConfig, to_inet};
use socket2::{Domain, Socket};
use spark_transport::{Result, Transport};
use std::net::SocketAddr;
use std::time::Duration;

/// 默认监听队列长度，与 `Dispatcher::listen(5)` 的常见取值保持一致。
pub const DEFAULT_BACKLOG: i32 = 5;

/// 从监听套接字接受一条连接，并为其应用监听端的默认配置。
///
/// 新连接保持内核默认的阻塞模式；是否切换为非阻塞由注册它的分发器决定。
pub(crate) fn accept_from(
    listener: &Socket,
    config: &TcpSocketConfig,
) -> Result<(TcpSocket, SocketAddr)> {
    let (socket, remote) = listener
        .accept()
        .map_err(|err| map_io_error(error::ACCEPT, err))?;
    config
        .apply(&socket)
        .map_err(|err| map_io_error(error::CONFIGURE, err))?;
    let peer = to_inet(remote, error::ACCEPT)?;
    tracing::debug!(target: "spark.transport.tcp", %peer, "accepted connection");
    Ok((TcpSocket::from_socket(socket, config.clone()), peer))
}

/// 监听套接字的建造器：创建 → `SO_REUSEADDR` → `bind` → `listen`。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 服务端装配监听套接字的步骤固定且顺序敏感（复用地址必须早于绑定），集中到一处避免遗漏；
/// - 在监听阶段就指定新连接的默认 [`TcpSocketConfig`]，保证所有被接受连接的关闭策略一致。
///
/// ## 契约（What）
/// - `new`：以监听地址创建 Builder，默认 `reuse_address = true`、`backlog = 5`；
/// - `with_linger`/`with_default_socket_config`：设置新连接继承的配置；
/// - `build`：返回已进入监听状态的 [`TcpSocket`]；任何一步失败都返回对应操作码的错误。
///
/// ## 风险提示（Trade-offs）
/// - Builder 被消费后无法复用，若需不同配置请分别构建；
/// - 返回的监听套接字仍为阻塞模式，交给分发器注册时会被切换为非阻塞。
#[derive(Clone, Debug)]
pub struct TcpListenerBuilder {
    addr: SocketAddr,
    backlog: i32,
    reuse_address: bool,
    default_config: TcpSocketConfig,
}

impl TcpListenerBuilder {
    /// 基于监听地址创建 Builder。
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            backlog: DEFAULT_BACKLOG,
            reuse_address: true,
            default_config: TcpSocketConfig::default(),
        }
    }

    /// 覆盖默认的套接字配置。
    pub fn with_default_socket_config(mut self, config: TcpSocketConfig) -> Self {
        self.default_config = config;
        self
    }

    /// 便捷设置 `SO_LINGER`。
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.default_config = self.default_config.clone().with_linger(linger);
        self
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_reuse_address(mut self, reuse: bool) -> Self {
        self.reuse_address = reuse;
        self
    }

    pub fn build(self) -> Result<TcpSocket> {
        let mut socket = TcpSocket::stream(Domain::for_address(self.addr), self.default_config)?;
        if self.reuse_address {
            socket.set_reuse_address(true)?;
        }
        socket.bind(self.addr)?;
        socket.listen(self.backlog)?;
        Ok(socket)
    }
}
