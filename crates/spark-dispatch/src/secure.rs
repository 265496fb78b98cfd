use std::net::SocketAddr;
use std::sync::Arc;

use spark_transport::Transport;
use spark_transport_tls::{SecureContext, SecureSocket};

use crate::channel::Channel;
use crate::delegate::Delegate;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::map::SocketMap;
use crate::readiness::Readiness;

/// 绑定了 TLS 上下文的分发器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 客户端场景下由分发器自己创建套接字，此时套接字必须一开始就绑定 TLS 上下文；
/// - 非阻塞 connect 之后再异步完成 TLS 握手会让 `handle_connect` 早于握手完成触发，
///   因此这里选择短暂阻塞：连接与握手完成后才报告连接事件。
///
/// ## 逻辑（How）
/// - `create_socket(raw)` 用上下文包装原始套接字后绑定；
/// - `connect`：切换为阻塞 → 连接并握手 → 恢复非阻塞 → 触发连接事件；
/// - 其余事件与 [`Dispatcher`] 完全一致，recv 的 EOF/断开同样转为关闭事件。
///
/// ## 风险提示（Trade-offs）
/// - 阻塞握手期间事件循环被占用，时长取决于对端与网络。
pub struct SecureDispatcher<T: Transport, D: Delegate<SecureSocket<T>>> {
    dispatcher: Dispatcher<SecureSocket<T>, D>,
    context: SecureContext,
}

impl<T: Transport, D: Delegate<SecureSocket<T>>> SecureDispatcher<T, D> {
    pub fn new(
        delegate: D,
        context: SecureContext,
        map: Arc<dyn SocketMap>,
    ) -> Result<Self, DispatchError> {
        Ok(Self {
            dispatcher: Dispatcher::new(delegate, map)?,
            context,
        })
    }

    /// 绑定安全连接（例如安全监听套接字 accept 的结果），未完成的握手随后续读写事件推进。
    pub fn with_socket(
        delegate: D,
        socket: SecureSocket<T>,
        map: Arc<dyn SocketMap>,
    ) -> Result<Self, DispatchError> {
        let context = socket.context().clone();
        Ok(Self {
            dispatcher: Dispatcher::with_socket(delegate, socket, map)?,
            context,
        })
    }

    pub fn context(&self) -> &SecureContext {
        &self.context
    }

    /// 用上下文包装原始套接字并绑定。
    pub fn create_socket(&mut self, raw: T) -> Result<(), DispatchError> {
        let socket = self.context.wrap_socket(raw);
        self.dispatcher.create_socket(socket)
    }

    /// 阻塞地连接并完成握手，随后恢复非阻塞并触发连接事件。
    pub fn connect(&mut self, addr: SocketAddr) -> Result<(), DispatchError> {
        let channel = self.dispatcher.channel_mut();
        channel.set_connected(false);
        channel.set_connecting(true);
        let socket = channel.require_socket()?;
        socket.set_nonblocking(false)?;
        let connected = socket.connect(addr);
        let restored = socket.set_nonblocking(true);
        connected?;
        restored?;
        channel.set_addr(addr);
        tracing::debug!(
            target: "spark.dispatch",
            token = ?channel.token(),
            %addr,
            session_id = self.context.session_id(),
            "secure connect completed"
        );
        self.dispatcher.handle_connect_event();
        Ok(())
    }

    pub fn dispatcher(&self) -> &Dispatcher<SecureSocket<T>, D> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<SecureSocket<T>, D> {
        &mut self.dispatcher
    }

    pub fn channel(&self) -> &Channel<SecureSocket<T>> {
        self.dispatcher.channel()
    }

    pub fn channel_mut(&mut self) -> &mut Channel<SecureSocket<T>> {
        self.dispatcher.channel_mut()
    }

    pub fn delegate(&self) -> &D {
        self.dispatcher.delegate()
    }

    pub fn delegate_mut(&mut self) -> &mut D {
        self.dispatcher.delegate_mut()
    }

    pub fn bind(&mut self, addr: SocketAddr) -> Result<(), DispatchError> {
        self.dispatcher.bind(addr)
    }

    pub fn listen(&mut self, backlog: i32) -> Result<(), DispatchError> {
        self.dispatcher.listen(backlog)
    }

    pub fn close(&mut self) -> Result<(), DispatchError> {
        self.dispatcher.close()
    }

    pub fn readable(&self) -> bool {
        self.dispatcher.readable()
    }

    pub fn writable(&self) -> bool {
        self.dispatcher.writable()
    }

    pub fn handle_read_event(&mut self) {
        self.dispatcher.handle_read_event();
    }

    pub fn handle_write_event(&mut self) {
        self.dispatcher.handle_write_event();
    }

    pub fn handle_expt_event(&mut self) {
        self.dispatcher.handle_expt_event();
    }

    pub fn handle_close(&mut self) {
        self.dispatcher.handle_close();
    }

    pub fn readwrite(&mut self, readiness: Readiness) {
        self.dispatcher.readwrite(readiness);
    }

    pub fn into_parts(self) -> (Channel<SecureSocket<T>>, D) {
        self.dispatcher.into_parts()
    }
}
