//! `close_ordering` 集成测试：借助脚本化传输观察 `SecureSocket::close` 对底层的调用顺序。
//!
//! # 测试目标（Why）
//! - 关闭流程必须先 `shutdown(Both)` 再 `close`；
//! - 即使 `shutdown` 失败（例如对端已断开），`close` 仍然必须被调用；
//! - 会话出错后的告警写不出去时留下调试日志，调用方拿到的仍是会话错误。

use spark_transport::Transport;
use spark_transport::testing::ScriptedTransport;
use spark_transport_tls::{SecureContext, SecureContextConfig, SecureState};
use std::io;
use tracing_test::traced_test;

fn client_context() -> SecureContext {
    SecureContext::new(SecureContextConfig::default()).expect("客户端上下文")
}

#[test]
fn shutdown_precedes_close() {
    let (raw, handle) = ScriptedTransport::new();
    let mut socket = client_context().wrap_socket(raw);

    socket.close().expect("关闭");
    assert_eq!(handle.calls(), vec!["shutdown", "close"]);
    assert_eq!(socket.state(), SecureState::Closed);
}

#[test]
fn close_runs_even_when_shutdown_fails() {
    let (raw, handle) = ScriptedTransport::new();
    handle.fail_shutdown(io::ErrorKind::NotConnected);
    let mut socket = client_context().wrap_socket(raw);

    socket.close().expect("shutdown 失败不影响 close");
    let calls = handle.calls();
    let shutdown = calls.iter().position(|c| *c == "shutdown").expect("调用了 shutdown");
    let close = calls.iter().position(|c| *c == "close").expect("调用了 close");
    assert!(shutdown < close);
    assert!(handle.is_closed());
}

/// 握手进行中关闭：close_notify 的写出先于 shutdown，shutdown 失败后 close 仍被调用。
#[test]
fn handshaking_socket_sends_close_notify_before_shutdown() {
    let (raw, handle) = ScriptedTransport::new();
    let mut socket = client_context().wrap_socket(raw);
    // 无入站数据：ClientHello 被写出后握手停在等待 ServerHello。
    socket
        .connect("127.0.0.1:443".parse().expect("parse addr"))
        .expect("非阻塞握手起步");
    assert_eq!(socket.state(), SecureState::Handshaking);
    let hello_len = handle.written().len();
    assert!(hello_len > 0, "ClientHello 应已写出");
    let sends_before_close = handle.calls().iter().filter(|c| **c == "send").count();

    handle.fail_shutdown(io::ErrorKind::NotConnected);
    socket.close().expect("关闭");
    let calls = handle.calls();
    let shutdown = calls.iter().position(|c| *c == "shutdown").expect("调用了 shutdown");
    let close = calls.iter().position(|c| *c == "close").expect("调用了 close");
    assert!(shutdown < close);
    // close_notify 的写出（若有）只能发生在 shutdown 之前。
    let sends_after_shutdown = calls[shutdown..].iter().filter(|c| **c == "send").count();
    assert_eq!(sends_after_shutdown, 0);
    assert!(calls[..shutdown].iter().filter(|c| **c == "send").count() >= sends_before_close);
    assert!(handle.is_closed());
}

#[test]
fn recv_before_connect_is_not_connected() {
    let (raw, _handle) = ScriptedTransport::new();
    let mut socket = client_context().wrap_socket(raw);
    let err = socket.recv(16).expect_err("未连接");
    assert_eq!(err.kind(), io::ErrorKind::NotConnected);
}

#[traced_test]
#[test]
fn unflushed_alert_is_logged_and_session_error_returned() {
    let (raw, handle) = ScriptedTransport::new();
    let mut socket = client_context().wrap_socket(raw);
    socket
        .connect("127.0.0.1:443".parse().expect("parse addr"))
        .expect("非阻塞握手起步");
    handle.push_inbound(&b"GET / HTTP/1.1\r\n\r\n"[..]);
    handle.push_send_error(io::ErrorKind::BrokenPipe);

    let err = socket.recv(16).expect_err("非 TLS 记录");
    assert_eq!(err.code(), "spark.transport.tls.handshake_failed");
    assert!(logs_contain("tls alert not flushed"));
}
