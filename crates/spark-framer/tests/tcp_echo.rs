//! `tcp_echo` 集成测试：在真实回环 TCP 连接上串起 分发器 → 分帧器 → 处理器。
//!
//! # 测试目标（Why）
//! - 非阻塞套接字的 `WouldBlock` 不会被误判为 EOF；
//! - 回写数据按排队顺序完整到达对端，对端关闭后通道随之关闭并注销。

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use spark_dispatch::{Dispatcher, HandlerResult, Readiness, SocketRegistry};
use spark_framer::{Chat, ChatHandler, Framer};
use spark_transport::Transport;
use spark_transport_tcp::{TcpListenerBuilder, TcpSocket};

#[derive(Debug, Default)]
struct Echo {
    lines: usize,
}

impl ChatHandler for Echo {
    fn init(&mut self, chat: &mut Chat) -> HandlerResult {
        chat.set_terminator("\n");
        Ok(())
    }

    fn found_terminator(&mut self, chat: &mut Chat) -> HandlerResult {
        self.lines += 1;
        let mut line = chat.take_incoming().to_vec();
        line.extend_from_slice(b"\n");
        chat.push(line);
        Ok(())
    }
}

fn pump(
    dispatcher: &mut Dispatcher<TcpSocket, Framer<Echo>>,
    mut done: impl FnMut(&Dispatcher<TcpSocket, Framer<Echo>>) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(dispatcher) {
        assert!(Instant::now() < deadline, "等待事件超时");
        let mut readiness = Readiness::readable();
        if dispatcher.writable() {
            readiness = readiness.union(Readiness::writable());
        }
        dispatcher.readwrite(readiness);
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn lines_echo_over_loopback() {
    let mut listener = TcpListenerBuilder::new("127.0.0.1:0".parse::<SocketAddr>().expect("parse addr"))
        .build()
        .expect("构建监听套接字");
    let addr = listener.local_addr().expect("监听地址");
    let mut client = TcpStream::connect(addr).expect("客户端连接");
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("设置读超时");
    let (conn, _peer) = listener.accept().expect("接受连接");

    let registry = SocketRegistry::new();
    let mut dispatcher =
        Dispatcher::with_socket(Framer::with_defaults(Echo::default()), conn, registry.clone())
            .expect("构造分发器");
    assert!(dispatcher.channel().connected());

    client.write_all(b"ping\npo").expect("写入前半");
    client.write_all(b"ng\n").expect("写入后半");
    pump(&mut dispatcher, |d| d.delegate().handler().lines == 2 && !d.writable());

    let mut echoed = [0u8; 10];
    client.read_exact(&mut echoed).expect("读取回显");
    assert_eq!(&echoed, b"ping\npong\n");

    drop(client);
    pump(&mut dispatcher, |d| !d.channel().has_socket());
    assert!(registry.is_empty());
}
