#![deny(unsafe_code)]
#![doc = "spark-transport-tcp: 基于 socket2 的同步明文 TCP 套接字。"]
#![doc = ""]
#![doc = "`TcpSocket` 同时承担监听与连接两种角色，实现 `spark_transport::Transport`；"]
#![doc = "`TcpListenerBuilder` 负责按固定顺序装配监听套接字。"]

mod error;
mod listener;
mod socket;

pub use listener::{DEFAULT_BACKLOG, TcpListenerBuilder};
pub use socket::{TcpSocket, TcpSocketConfig};
pub use socket2::Domain;
