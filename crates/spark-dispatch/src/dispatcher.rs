use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use spark_transport::{OperationKind, Transport, TransportError};

use crate::channel::{Channel, ChannelEvent};
use crate::delegate::Delegate;
use crate::error::{DispatchError, HandlerResult};
use crate::map::SocketMap;
use crate::readiness::Readiness;

const CONNECT: OperationKind =
    OperationKind::new("spark.dispatch.connect_failed", "asynchronous connect failed");

/// 把 Reactor 的就绪事件翻译为委托回调。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - Reactor 只知道“某个套接字可读/可写/有优先数据/挂断”，协议行为只想知道“连上了、有数据、可以写”；
///   分发器负责两者之间的路由，并把所有失败收敛到一个错误漏斗；
/// - 委托以值、`Box` 或 `&mut` 的形式组合进来，分发器不对协议做任何假设。
///
/// ## 逻辑（How）
/// - 读事件：监听中 → `handle_accept`；连接中 → 先完成连接再 `handle_read`；否则 `handle_read`；
/// - 写事件：监听中忽略；连接中先完成连接；随后排空套接字内部缓冲并调用 `handle_write`；
/// - 优先数据事件：存在挂起的套接字错误 → 关闭，否则 `handle_expt`；
/// - 委托返回的错误：断开类走关闭路径，其余进入 `handle_error`；
/// - 每次回调之后派发通道登记的连接/关闭/错误事件。
///
/// ## 契约（What）
/// - `init` 在构造时调用一次；失败时通道被关闭并返回错误；
/// - 事件方法自身不返回错误：失败已交给委托处理；
/// - 通道关闭后，`readwrite` 剩余的就绪标志不再派发。
pub struct Dispatcher<T: Transport, D: Delegate<T>> {
    channel: Channel<T>,
    delegate: D,
}

impl<T: Transport, D: Delegate<T>> fmt::Debug for Dispatcher<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl<T: Transport, D: Delegate<T>> Dispatcher<T, D> {
    /// 尚未绑定套接字的分发器；随后调用 [`Dispatcher::create_socket`]。
    pub fn new(delegate: D, map: Arc<dyn SocketMap>) -> Result<Self, DispatchError> {
        Self::from_channel(delegate, Channel::new(map))
    }

    /// 绑定已有套接字（例如 accept 得到的连接）。
    pub fn with_socket(
        delegate: D,
        socket: T,
        map: Arc<dyn SocketMap>,
    ) -> Result<Self, DispatchError> {
        Self::from_channel(delegate, Channel::with_socket(socket, map)?)
    }

    fn from_channel(delegate: D, channel: Channel<T>) -> Result<Self, DispatchError> {
        let mut dispatcher = Self { channel, delegate };
        if let Err(err) = dispatcher.delegate.init(&mut dispatcher.channel) {
            if let Err(close_err) = dispatcher.channel.close() {
                tracing::debug!(
                    target: "spark.dispatch",
                    error = %close_err,
                    "closing channel after failed init"
                );
            }
            return Err(err);
        }
        dispatcher.drain_events();
        Ok(dispatcher)
    }

    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel<T> {
        &mut self.channel
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn delegate_mut(&mut self) -> &mut D {
        &mut self.delegate
    }

    pub fn into_parts(self) -> (Channel<T>, D) {
        (self.channel, self.delegate)
    }

    pub fn create_socket(&mut self, socket: T) -> Result<(), DispatchError> {
        self.channel.create_socket(socket)
    }

    /// 发起连接；若立即连上，`handle_connect` 在返回前已被调用。
    pub fn connect(&mut self, addr: SocketAddr) -> Result<(), DispatchError> {
        self.channel.connect(addr)?;
        self.drain_events();
        Ok(())
    }

    pub fn bind(&mut self, addr: SocketAddr) -> Result<(), DispatchError> {
        self.channel.bind(addr)
    }

    pub fn listen(&mut self, backlog: i32) -> Result<(), DispatchError> {
        self.channel.listen(backlog)
    }

    pub fn close(&mut self) -> Result<(), DispatchError> {
        self.channel.close()
    }

    /// Reactor 是否应关注读就绪。
    pub fn readable(&self) -> bool {
        self.delegate.readable(&self.channel)
    }

    /// Reactor 是否应关注写就绪。
    pub fn writable(&self) -> bool {
        self.delegate.writable(&self.channel)
    }

    pub fn handle_read_event(&mut self) {
        if self.channel.accepting() {
            self.dispatch(|delegate, channel| delegate.handle_accept(channel));
        } else if !self.channel.connected() {
            if self.channel.connecting() && !self.connect_event() {
                return;
            }
            self.dispatch(|delegate, channel| delegate.handle_read(channel));
        } else {
            self.dispatch(|delegate, channel| delegate.handle_read(channel));
        }
    }

    pub fn handle_write_event(&mut self) {
        if self.channel.accepting() {
            return;
        }
        if !self.channel.connected() && self.channel.connecting() && !self.connect_event() {
            return;
        }
        self.dispatch(|delegate, channel| {
            channel.flush()?;
            delegate.handle_write(channel)
        });
    }

    pub fn handle_expt_event(&mut self) {
        match self.channel.take_socket_error() {
            Ok(Some(err)) => {
                tracing::debug!(
                    target: "spark.dispatch",
                    token = ?self.channel.token(),
                    error = %err,
                    "pending socket error on priority event"
                );
                self.close_event();
            }
            Ok(None) => {
                self.dispatch(|delegate, channel| delegate.handle_expt(channel));
                return;
            }
            Err(err) => self.fail(err),
        }
        self.drain_events();
    }

    /// 完成一次连接：检查挂起错误，调用 `handle_connect`，再标记为已连接。
    pub fn handle_connect_event(&mut self) {
        self.connect_event();
    }

    /// 挂断/错误就绪时由 Reactor 调用。
    pub fn handle_close(&mut self) {
        self.close_event();
        self.drain_events();
    }

    /// 按 读 → 写 → 优先数据 → 挂断 的顺序派发一次就绪快照。
    pub fn readwrite(&mut self, readiness: Readiness) {
        if readiness.readable && self.channel.has_socket() {
            self.handle_read_event();
        }
        if readiness.writable && self.channel.has_socket() {
            self.handle_write_event();
        }
        if readiness.priority && self.channel.has_socket() {
            self.handle_expt_event();
        }
        if readiness.is_closed() && self.channel.has_socket() {
            self.handle_close();
        }
    }

    fn complete_connect(&mut self) -> HandlerResult {
        if let Some(err) = self.channel.take_socket_error()? {
            return Err(TransportError::new(CONNECT, err).into());
        }
        self.delegate.handle_connect(&mut self.channel)?;
        self.channel.set_connected(true);
        self.channel.set_connecting(false);
        Ok(())
    }

    fn connect_event(&mut self) -> bool {
        let completed = match self.complete_connect() {
            Ok(()) => true,
            Err(err) => {
                self.fail(err);
                false
            }
        };
        self.drain_events();
        completed
    }

    fn dispatch(&mut self, event: impl FnOnce(&mut D, &mut Channel<T>) -> HandlerResult) {
        if let Err(err) = event(&mut self.delegate, &mut self.channel) {
            self.fail(err);
        }
        self.drain_events();
    }

    fn fail(&mut self, err: DispatchError) {
        if err.is_disconnect() {
            tracing::debug!(
                target: "spark.dispatch",
                token = ?self.channel.token(),
                code = err.code(),
                error = %err,
                "peer disconnected"
            );
            self.close_event();
        } else {
            self.delegate.handle_error(&mut self.channel, err);
        }
    }

    fn close_event(&mut self) {
        if let Err(err) = self.delegate.handle_close(&mut self.channel) {
            self.delegate.handle_error(&mut self.channel, err);
        }
    }

    /// 派发通道登记的事件；同一轮中关闭至多派发一次。
    fn drain_events(&mut self) {
        let mut closed = false;
        while let Some(event) = self.channel.next_event() {
            match event {
                ChannelEvent::Connect => {
                    if let Err(err) = self.complete_connect() {
                        self.fail(err);
                    }
                }
                ChannelEvent::Close if closed => {}
                ChannelEvent::Close => {
                    closed = true;
                    self.close_event();
                }
                ChannelEvent::Error(err) => self.delegate.handle_error(&mut self.channel, err),
            }
        }
    }
}
