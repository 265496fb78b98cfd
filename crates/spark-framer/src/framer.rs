use bytes::Bytes;
use spark_dispatch::{Channel, Delegate, HandlerResult};
use spark_transport::Transport;

use crate::chat::Chat;
use crate::config::{FramerConfig, FramerConfigError};
use crate::outbound::Pending;

/// 分帧器回调到协议层的处理器。
///
/// - `collect_incoming_data`：每一段切分出的数据都会经过这里，默认追加到 [`Chat`] 的收集区；
/// - `found_terminator`：终止符命中时调用，通常在此 `take_incoming` 并排队响应；
/// - 返回的错误交给分发器的错误漏斗。
pub trait ChatHandler {
    fn init(&mut self, chat: &mut Chat) -> HandlerResult {
        let _ = chat;
        Ok(())
    }

    fn collect_incoming_data(&mut self, data: Bytes, chat: &mut Chat) -> HandlerResult {
        chat.collect(data);
        Ok(())
    }

    fn found_terminator(&mut self, chat: &mut Chat) -> HandlerResult;
}

/// 把 [`ChatHandler`] 适配成分发器委托的分帧器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 分帧逻辑与传输无关：同一个 `Framer` 可以挂在明文 `Dispatcher` 或 `SecureDispatcher` 上；
/// - 读方向负责切分，写方向负责按块节流，处理器只关心消息。
///
/// ## 逻辑（How）
/// - 读事件：读取至多 `in_buffer_size` 字节，追加到缓冲后循环切分，直到缓冲耗尽或需要更多数据；
///   套接字报告仍有内部缓冲（`pending_read`，例如 TLS 一次解密出的多余明文）时在同一事件内继续读取；
/// - 写事件：从写队列取下一块，写出后按实际写出量出队，每个事件最多写一次；
/// - 关闭哨兵出队时登记关闭事件，由分发器回到 `handle_close`。
///
/// ## 契约（What）
/// - `readable` 恒为真；`writable` 在写队列非空、尚未连接或套接字内部仍有待写数据时为真；
/// - 读写错误原样返回，由分发器送入 `handle_error`。
#[derive(Debug)]
pub struct Framer<H> {
    handler: H,
    chat: Chat,
}

impl<H: ChatHandler> Framer<H> {
    pub fn new(handler: H, config: FramerConfig) -> Result<Self, FramerConfigError> {
        config.validate()?;
        Ok(Self {
            handler,
            chat: Chat::new(config),
        })
    }

    pub fn with_defaults(handler: H) -> Self {
        Self {
            handler,
            chat: Chat::new(FramerConfig::default()),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    pub fn chat_mut(&mut self) -> &mut Chat {
        &mut self.chat
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// 读取并切分；套接字内部仍有已缓冲的数据时继续读取，直到缓冲取尽。
    fn on_readable<T: Transport>(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        let max = self.chat.config().in_buffer_size;
        loop {
            let data = channel.recv(max)?;
            if data.is_empty() {
                return Ok(());
            }
            self.chat.append(&data);
            self.split_segments()?;
            if channel.pending_read() == 0 {
                return Ok(());
            }
        }
    }

    fn split_segments(&mut self) -> HandlerResult {
        while let Some(segment) = self.chat.next_segment() {
            if let Some(data) = segment.data {
                self.handler.collect_incoming_data(data, &mut self.chat)?;
            }
            if segment.terminated {
                self.handler.found_terminator(&mut self.chat)?;
            }
            if !segment.more {
                break;
            }
        }
        Ok(())
    }

    fn on_writable<T: Transport>(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        if !channel.connected() {
            return Ok(());
        }
        match self.chat.outbound().next_pending() {
            Pending::Nothing => Ok(()),
            Pending::Close => {
                tracing::debug!(
                    target: "spark.framer",
                    token = ?channel.token(),
                    "outbound queue drained, closing"
                );
                channel.request_close();
                Ok(())
            }
            Pending::Send { data, generation } => {
                let sent = channel.send(&data)?;
                tracing::trace!(
                    target: "spark.framer",
                    token = ?channel.token(),
                    sent,
                    chunk = data.len(),
                    "outbound chunk written"
                );
                self.chat.outbound().consume(sent, generation);
                Ok(())
            }
        }
    }
}

impl<T: Transport, H: ChatHandler> Delegate<T> for Framer<H> {
    fn init(&mut self, _channel: &mut Channel<T>) -> HandlerResult {
        self.handler.init(&mut self.chat)
    }

    fn handle_read(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        self.on_readable(channel)
    }

    fn handle_write(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        self.on_writable(channel)
    }

    fn handle_close(&mut self, channel: &mut Channel<T>) -> HandlerResult {
        channel.close()
    }

    fn readable(&self, _channel: &Channel<T>) -> bool {
        true
    }

    fn writable(&self, channel: &Channel<T>) -> bool {
        !self.chat.outbound().is_empty() || !channel.connected() || channel.wants_write()
    }
}
