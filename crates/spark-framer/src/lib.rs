#![deny(unsafe_code)]

//! `spark-framer`：基于终止符的增量分帧引擎与分块写队列。
//!
//! # 教案背景（Why）
//! - 面向流的协议需要从任意切分的字节流中提取消息：同一段数据无论被拆成多少次读取，
//!   交付给处理器的消息序列都必须完全一致；
//! - 写方向需要背压：大块数据被预先切分为固定大小的块，每个可写事件只写出一块，
//!   慢速对端不会让单次事件占用过久。
//!
//! # 使用概览（How）
//! - 实现 [`ChatHandler`]（至少实现 `found_terminator`），用 [`Framer::new`] 组合成分帧器；
//! - [`Framer`] 实现 `spark_dispatch::Delegate`，直接交给 `Dispatcher` 或 `SecureDispatcher`；
//! - 处理器通过 [`Chat`] 设置终止符、取出已收集的数据、排队写出或请求写完后关闭；
//! - 其他线程通过 [`OutboundHandle`] 推送数据，写出仍发生在事件循环线程上。
//!
//! # 合约说明（What）
//! - 终止符（[`Terminator`]）三选一：无、固定字节数、字节序列分隔符，可在回调中随时更换；
//! - 写队列按 FIFO 写出数据块、惰性生产者与关闭哨兵；
//! - 写队列的锁只在队列变更期间持有，从不跨越传输 I/O 或生产者回调。
//!
//! # 风险提示与后续（Trade-offs）
//! - 入站缓冲没有上限：对端持续发送不含终止符的数据时，处理器应在 `collect_incoming_data`
//!   中自行设置上限；
//! - 每个可写事件只写一块，吞吐受事件频率约束。

mod chat;
mod config;
mod framer;
mod outbound;
mod terminator;

pub use chat::Chat;
pub use config::{FramerConfig, FramerConfigError};
pub use framer::{ChatHandler, Framer};
pub use outbound::{OutboundHandle, Producer};
pub use terminator::{Terminator, find_prefix_at_end};
