use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use parking_lot::Mutex;

/// 惰性数据源：写队列轮到它时才被询问下一块数据。
///
/// 返回空 `Bytes` 表示已耗尽，生产者随即被移出队列。
pub trait Producer: Send {
    fn more(&mut self) -> Bytes;
}

impl<F> Producer for F
where
    F: FnMut() -> Bytes + Send,
{
    fn more(&mut self) -> Bytes {
        self()
    }
}

enum OutboundUnit {
    Data(Bytes),
    Producer(Box<dyn Producer>),
    Close,
}

#[derive(Default)]
struct QueueState {
    units: VecDeque<OutboundUnit>,
    generation: u64,
}

/// 写队列的下一步动作。
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Pending {
    Nothing,
    Close,
    Send { data: Bytes, generation: u64 },
}

/// 可跨线程共享的写队列句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 应用线程负责生产数据，事件循环线程负责写出；两者只在队列上相遇，
///   因此队列需要一把锁，而且这把锁必须足够“短”；
///
/// ## 逻辑（How）
/// - `push` 在入队时就按 `chunk_size` 切分，每个可写事件最多写出一块；
/// - 生产者在锁外被调用，产出的数据连同生产者本身重新插回队首；
/// - `clear` 递增代数（generation），让锁外进行中的生产者调用与写出结果作废。
///
/// ## 契约（What）
/// - 单元严格 FIFO；关闭哨兵之前的所有数据都会先写出；
/// - 锁只在队列变更期间持有，从不跨越传输 I/O 或生产者回调。
#[derive(Clone)]
pub struct OutboundHandle {
    shared: Arc<Mutex<QueueState>>,
    chunk_size: usize,
}

impl fmt::Debug for OutboundHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundHandle")
            .field("pending", &self.len())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl OutboundHandle {
    pub(crate) fn new(chunk_size: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(QueueState::default())),
            chunk_size,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 追加数据，超过分块大小的部分预先切成多块。
    pub fn push(&self, data: impl Into<Bytes>) {
        let mut data = data.into();
        if data.is_empty() {
            return;
        }
        let mut chunks = Vec::with_capacity(data.len().div_ceil(self.chunk_size));
        while data.len() > self.chunk_size {
            chunks.push(data.split_to(self.chunk_size));
        }
        chunks.push(data);

        let mut state = self.shared.lock();
        state
            .units
            .extend(chunks.into_iter().map(OutboundUnit::Data));
    }

    pub fn push_producer(&self, producer: impl Producer + 'static) {
        self.shared
            .lock()
            .units
            .push_back(OutboundUnit::Producer(Box::new(producer)));
    }

    /// 追加关闭哨兵：之前排队的数据全部写出后关闭通道。
    pub fn close_when_done(&self) {
        self.shared.lock().units.push_back(OutboundUnit::Close);
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().units.is_empty()
    }

    /// 队列中的单元数（数据块、生产者与哨兵各计一个）。
    pub fn len(&self) -> usize {
        self.shared.lock().units.len()
    }

    /// 丢弃全部待写单元。
    pub fn clear(&self) {
        let mut state = self.shared.lock();
        state.units.clear();
        state.generation = state.generation.wrapping_add(1);
    }

    /// 取出下一块待写数据，必要时跳过空块并轮询生产者。
    pub(crate) fn next_pending(&self) -> Pending {
        loop {
            let (mut producer, generation) = {
                let mut state = self.shared.lock();
                let generation = state.generation;
                match state.units.front() {
                    None => return Pending::Nothing,
                    Some(OutboundUnit::Close) => {
                        state.units.pop_front();
                        return Pending::Close;
                    }
                    Some(OutboundUnit::Data(data)) if data.is_empty() => {
                        state.units.pop_front();
                        continue;
                    }
                    Some(OutboundUnit::Data(data)) => {
                        let end = data.len().min(self.chunk_size);
                        return Pending::Send {
                            data: data.slice(..end),
                            generation,
                        };
                    }
                    Some(OutboundUnit::Producer(_)) => {}
                }
                match state.units.pop_front() {
                    Some(OutboundUnit::Producer(producer)) => (producer, generation),
                    _ => continue,
                }
            };

            let data = producer.more();

            let mut state = self.shared.lock();
            if state.generation != generation {
                continue;
            }
            if data.is_empty() {
                tracing::trace!(target: "spark.framer", "producer exhausted");
                continue;
            }
            state.units.push_front(OutboundUnit::Producer(producer));
            state.units.push_front(OutboundUnit::Data(data));
        }
    }

    /// 记录一次写出结果：写完的块出队，短写保留剩余部分在队首。
    pub(crate) fn consume(&self, sent: usize, generation: u64) {
        if sent == 0 {
            return;
        }
        let mut state = self.shared.lock();
        if state.generation != generation {
            return;
        }
        if let Some(OutboundUnit::Data(data)) = state.units.front_mut() {
            if sent >= data.len() {
                state.units.pop_front();
            } else {
                data.advance(sent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_send(pending: Pending) -> (Bytes, u64) {
        match pending {
            Pending::Send { data, generation } => (data, generation),
            other => panic!("期望待写数据，实际为 {other:?}"),
        }
    }

    #[test]
    fn push_splits_into_chunks() {
        let queue = OutboundHandle::new(4);
        queue.push(&b"abcdefghij"[..]);
        assert_eq!(queue.len(), 3);
        let (first, generation) = expect_send(queue.next_pending());
        assert_eq!(&first[..], b"abcd");
        queue.consume(first.len(), generation);
        let (second, _) = expect_send(queue.next_pending());
        assert_eq!(&second[..], b"efgh");
    }

    #[test]
    fn short_write_keeps_remainder_at_head() {
        let queue = OutboundHandle::new(8);
        queue.push(&b"hello"[..]);
        let (data, generation) = expect_send(queue.next_pending());
        queue.consume(2, generation);
        assert_eq!(&data[..], b"hello");
        let (rest, _) = expect_send(queue.next_pending());
        assert_eq!(&rest[..], b"llo");
    }

    #[test]
    fn producer_output_goes_before_producer() {
        let queue = OutboundHandle::new(16);
        let mut parts = vec![Bytes::from_static(b"two"), Bytes::from_static(b"one")];
        queue.push_producer(move || parts.pop().unwrap_or_default());
        queue.push(&b"tail"[..]);

        let mut written = Vec::new();
        loop {
            match queue.next_pending() {
                Pending::Send { data, generation } => {
                    written.extend_from_slice(&data);
                    queue.consume(data.len(), generation);
                }
                Pending::Nothing => break,
                Pending::Close => panic!("未排队关闭哨兵"),
            }
        }
        assert_eq!(written, b"onetwotail");
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_invalidates_in_flight_results() {
        let queue = OutboundHandle::new(8);
        queue.push(&b"stale"[..]);
        let (_, generation) = expect_send(queue.next_pending());
        queue.clear();
        queue.push(&b"fresh"[..]);
        queue.consume(5, generation);
        let (data, _) = expect_send(queue.next_pending());
        assert_eq!(&data[..], b"fresh");
    }

    #[test]
    fn sentinel_is_reached_after_data() {
        let queue = OutboundHandle::new(8);
        queue.push(Bytes::new());
        queue.close_when_done();
        assert_eq!(queue.next_pending(), Pending::Close);
        assert_eq!(queue.next_pending(), Pending::Nothing);
    }
}
