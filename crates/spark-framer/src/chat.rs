use std::fmt;

use bytes::{Buf, Bytes, BytesMut};

use crate::config::FramerConfig;
use crate::outbound::{OutboundHandle, Producer};
use crate::terminator::{self, Terminator};

/// 一次切分的结果。
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Segment {
    /// 需要交给 `collect_incoming_data` 的数据。
    pub(crate) data: Option<Bytes>,
    /// 是否随后触发 `found_terminator`。
    pub(crate) terminated: bool,
    /// 是否继续切分剩余缓冲。
    pub(crate) more: bool,
}

/// 分帧器的会话状态：终止符、入站缓冲、已收集片段与写队列。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 处理器回调只拿到 `Chat`，既能读取已收集的消息，也能修改终止符或排队响应，
///   但接触不到套接字，从而无法在回调中途进行 I/O；
///
/// ## 逻辑（How）
/// - `in_buffer` 累积尚未切分的原始字节；
/// - `incoming` 保存默认 `collect_incoming_data` 收集的片段，`take_incoming` 时一次拼接；
/// - 终止符在每轮切分前重新读取，回调中修改立即对剩余缓冲生效。
///
/// ## 契约（What）
/// - 字节既不重排也不重复：切分只在缓冲头部进行，分隔符本身被丢弃。
pub struct Chat {
    terminator: Terminator,
    in_buffer: BytesMut,
    incoming: Vec<Bytes>,
    outbound: OutboundHandle,
    config: FramerConfig,
}

impl fmt::Debug for Chat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chat")
            .field("terminator", &self.terminator)
            .field("buffered", &self.in_buffer.len())
            .field("incoming", &self.incoming.len())
            .field("outbound", &self.outbound)
            .finish()
    }
}

impl Chat {
    pub(crate) fn new(config: FramerConfig) -> Self {
        Self {
            terminator: Terminator::None,
            in_buffer: BytesMut::with_capacity(config.in_buffer_size),
            incoming: Vec::new(),
            outbound: OutboundHandle::new(config.out_buffer_size),
            config,
        }
    }

    pub fn config(&self) -> &FramerConfig {
        &self.config
    }

    pub fn set_terminator(&mut self, terminator: impl Into<Terminator>) {
        self.terminator = terminator.into();
    }

    pub fn terminator(&self) -> &Terminator {
        &self.terminator
    }

    /// 尚未切分的入站字节数。
    pub fn buffered(&self) -> usize {
        self.in_buffer.len()
    }

    /// 默认的收集行为：把片段追加到 `incoming`。
    pub fn collect(&mut self, data: Bytes) {
        self.incoming.push(data);
    }

    /// 取出已收集的全部片段，拼接为一段连续字节并清空。
    pub fn take_incoming(&mut self) -> Bytes {
        match self.incoming.len() {
            0 => Bytes::new(),
            1 => self.incoming.pop().unwrap_or_default(),
            _ => {
                let total = self.incoming.iter().map(Bytes::len).sum();
                let mut joined = BytesMut::with_capacity(total);
                for part in self.incoming.drain(..) {
                    joined.extend_from_slice(&part);
                }
                joined.freeze()
            }
        }
    }

    pub fn push(&self, data: impl Into<Bytes>) {
        self.outbound.push(data);
    }

    pub fn push_producer(&self, producer: impl Producer + 'static) {
        self.outbound.push_producer(producer);
    }

    pub fn close_when_done(&self) {
        self.outbound.close_when_done();
    }

    /// 可交给其他线程的写队列句柄。
    pub fn outbound_handle(&self) -> OutboundHandle {
        self.outbound.clone()
    }

    pub(crate) fn outbound(&self) -> &OutboundHandle {
        &self.outbound
    }

    /// 丢弃入站缓冲、已收集片段与写队列。
    pub fn discard_buffers(&mut self) {
        self.in_buffer.clear();
        self.incoming.clear();
        self.outbound.clear();
    }

    pub(crate) fn append(&mut self, data: &[u8]) {
        self.in_buffer.extend_from_slice(data);
    }

    /// 按当前终止符从缓冲头部切出下一段；缓冲为空时返回 `None`。
    pub(crate) fn next_segment(&mut self) -> Option<Segment> {
        if self.in_buffer.is_empty() {
            return None;
        }
        let len = self.in_buffer.len();
        if self.terminator.is_none() {
            return Some(Segment {
                data: Some(self.in_buffer.split().freeze()),
                terminated: false,
                more: false,
            });
        }

        // === 教案级注释 ===
        // Why: 长度终止符跨越多次读取时要记住还差多少字节；
        // How: 不足时整段交付并递减计数，满足时只交付恰好 N 字节并把计数清零；
        // What: 计数清零后等同“无终止符”，处理器需在 `found_terminator` 中重新设置。
        if let Terminator::Count(remaining) = self.terminator {
            if len < remaining {
                self.terminator = Terminator::Count(remaining - len);
                return Some(Segment {
                    data: Some(self.in_buffer.split().freeze()),
                    terminated: false,
                    more: false,
                });
            }
            self.terminator = Terminator::Count(0);
            return Some(Segment {
                data: Some(self.in_buffer.split_to(remaining).freeze()),
                terminated: true,
                more: true,
            });
        }

        let Terminator::Delimiter(delimiter) = &self.terminator else {
            return None;
        };
        if let Some(index) = terminator::find(&self.in_buffer, delimiter) {
            let data = (index > 0).then(|| self.in_buffer.split_to(index).freeze());
            self.in_buffer.advance(delimiter.len());
            return Some(Segment {
                data,
                terminated: true,
                more: true,
            });
        }

        // === 教案级注释 ===
        // Why: 分隔符可能被读取边界截断，缓冲末尾的半截分隔符不能提前交付；
        // How: 求缓冲后缀与分隔符前缀的最长重叠，重叠部分留在缓冲中；
        // Trade-offs: 重叠部分若恰好不是分隔符，会晚一次读取才交付，但不会丢失或重复。
        let overlap = terminator::find_prefix_at_end(&self.in_buffer, delimiter);
        let data = if overlap == 0 {
            Some(self.in_buffer.split().freeze())
        } else if overlap < len {
            Some(self.in_buffer.split_to(len - overlap).freeze())
        } else {
            None
        };
        Some(Segment {
            data,
            terminated: false,
            more: false,
        })
    }
}
