//! `handshake` 集成测试：在回环 TCP 上验证 `SecureSocket` 的握手、读写、校验与关闭语义。
//!
//! # 测试目标（Why）
//! - 加密连接必须与明文连接呈现相同的 `Transport` 契约（读写、EOF）；
//! - `accept` 只接受原始连接，不等待对端握手；
//! - 客户端证书校验失败必须表现为该连接握手失败，并留下包含证书主题的审计记录；
//! - 握手期限过后推进握手返回超时错误；
//! - 单次读取取不完的已解密明文由 `pending_read` 报告，无需等待新的网络数据。
//!
//! # 结构安排（How）
//! - 服务端与客户端分别运行在测试线程与辅助线程上；需要断言日志的用例让服务端留在测试线程，
//!   以便 `tracing-test` 捕获其日志。

mod support;

use parking_lot::Mutex;
use spark_transport::{ErrorCategory, Transport};
use spark_transport_tcp::{TcpListenerBuilder, TcpSocket};
use spark_transport_tls::{
    AuditSink, CertificateRejection, SecureContext, SecureContextConfig, SecureSocket, SecureState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use support::Pki;
use tracing_test::traced_test;

fn secure_listener(context: &SecureContext) -> (SecureSocket<TcpSocket>, SocketAddr) {
    let raw = TcpListenerBuilder::new("127.0.0.1:0".parse().expect("parse addr"))
        .build()
        .expect("构建监听套接字");
    let addr = raw.local_addr().expect("监听地址");
    (context.wrap_socket(raw), addr)
}

/// 接受连接后切换为阻塞并推进服务端握手直到结束。
fn accept_and_handshake(
    listener: &mut SecureSocket<TcpSocket>,
) -> spark_transport::Result<SecureSocket<TcpSocket>> {
    let (mut conn, _peer) = listener.accept()?;
    conn.set_nonblocking(false)?;
    conn.handshake()?;
    Ok(conn)
}

fn spawn_client(
    config: SecureContextConfig,
    addr: SocketAddr,
) -> thread::JoinHandle<spark_transport::Result<SecureSocket<TcpSocket>>> {
    thread::spawn(move || {
        let context = SecureContext::new(config).expect("客户端上下文");
        let mut client = context.wrap_socket(TcpSocket::for_addr(&addr)?);
        client.connect(addr)?;
        Ok(client)
    })
}

/// 验证双向认证握手后的读写、对端证书与 close_notify 语义。
///
/// # 步骤说明（How）
/// 1. 服务端在测试线程 accept，客户端在辅助线程 connect；
/// 2. 双方互相读写一次，并检查对端证书链非空；
/// 3. 服务端有序关闭后，客户端读到空结果（EOF）。
#[test]
fn mutual_tls_round_trip_and_orderly_close() {
    let pki = Pki::mint();
    let server_ctx = SecureContext::new(pki.server_config()).expect("服务端上下文");
    let (mut listener, addr) = secure_listener(&server_ctx);

    let client = thread::spawn({
        let config = pki.client_config();
        move || {
            let context = SecureContext::new(config).expect("客户端上下文");
            let mut client = context.wrap_socket(TcpSocket::for_addr(&addr).expect("客户端"));
            client.connect(addr).expect("客户端握手");
            assert_eq!(client.state(), SecureState::Established);
            assert!(client.peer_certificates().is_some_and(|chain| !chain.is_empty()));

            assert_eq!(client.send(b"ping").expect("客户端写入"), 4);
            let reply = client.recv(64).expect("客户端读取");
            assert_eq!(&reply[..], b"pong");
            assert!(client.recv(64).expect("读取 close_notify").is_empty());
            client.close().expect("客户端关闭");
        }
    });

    let (mut conn, peer) = listener.accept().expect("接受连接");
    assert_eq!(peer.ip(), addr.ip());
    assert_eq!(conn.state(), SecureState::Handshaking);
    assert_eq!(conn.timeout().expect("读取超时"), None);
    conn.set_nonblocking(false).expect("切换为阻塞");
    assert!(conn.handshake().expect("服务端握手"));
    assert_eq!(conn.state(), SecureState::Established);
    assert!(conn.peer_certificates().is_some_and(|chain| !chain.is_empty()));

    let request = conn.recv(64).expect("服务端读取");
    assert_eq!(&request[..], b"ping");
    conn.send(b"pong").expect("服务端写入");
    conn.close().expect("服务端关闭");
    assert_eq!(conn.state(), SecureState::Closed);

    client.join().expect("客户端线程");
}

/// 陌生 CA 签发的客户端证书：服务端握手失败，默认审计出口记录证书主题。
#[traced_test]
#[test]
fn rogue_client_certificate_is_logged_and_rejected() {
    let pki = Pki::mint();
    let server_ctx = SecureContext::new(pki.server_config()).expect("服务端上下文");
    let (mut listener, addr) = secure_listener(&server_ctx);
    let client = spawn_client(pki.rogue_client_config(), addr);

    let err = accept_and_handshake(&mut listener).expect_err("流氓证书必须被拒绝");
    assert_eq!(err.category(), ErrorCategory::Security);
    assert_eq!(err.code(), "spark.transport.tls.handshake_failed");
    assert!(logs_contain("invalid client certificate with subject"));
    assert!(logs_contain("rogue-client"));

    let _ = client.join().expect("客户端线程");
}

#[derive(Debug, Default)]
struct RecordingSink {
    subjects: Mutex<Vec<String>>,
}

impl AuditSink for RecordingSink {
    fn invalid_peer_certificate(&self, event: &CertificateRejection<'_>) {
        assert_eq!(event.session_id, "audit-test");
        self.subjects.lock().push(event.subject.to_owned());
    }
}

/// 注入的审计出口只观察，不改变结论。
#[test]
fn injected_audit_sink_observes_rejection() {
    let pki = Pki::mint();
    let sink = Arc::new(RecordingSink::default());
    let server_ctx = SecureContext::with_audit_sink(
        pki.server_config().with_session_id("audit-test"),
        sink.clone(),
    )
    .expect("服务端上下文");
    let (mut listener, addr) = secure_listener(&server_ctx);
    let client = spawn_client(pki.rogue_client_config(), addr);

    assert!(accept_and_handshake(&mut listener).is_err());
    let subjects = sink.subjects.lock();
    assert_eq!(subjects.len(), 1);
    assert!(subjects[0].contains("CN=rogue-client"), "{}", subjects[0]);
    drop(subjects);

    let _ = client.join().expect("客户端线程");
}

/// 配置了 CA 的服务端拒绝不出示证书的客户端。
#[test]
fn missing_client_certificate_is_rejected() {
    let pki = Pki::mint();
    let server_ctx = SecureContext::new(pki.server_config()).expect("服务端上下文");
    let (mut listener, addr) = secure_listener(&server_ctx);
    let client = spawn_client(pki.anonymous_client_config(), addr);

    let err = accept_and_handshake(&mut listener).expect_err("缺少客户端证书必须被拒绝");
    assert_eq!(err.category(), ErrorCategory::Security);

    let _ = client.join().expect("客户端线程");
}

/// 对端只建立 TCP 连接却不发起握手：accept 立即返回，期限过后推进握手得到超时错误。
#[test]
fn silent_peer_does_not_hold_accept_and_times_out_later() {
    let pki = Pki::mint();
    let config = pki
        .server_config()
        .with_handshake_timeout(Duration::from_millis(100));
    let server_ctx = SecureContext::new(config).expect("服务端上下文");
    let (mut listener, addr) = secure_listener(&server_ctx);

    let mut silent = TcpSocket::for_addr(&addr).expect("静默客户端");
    silent.connect(addr).expect("TCP 连接");

    let started = Instant::now();
    let (mut conn, _peer) = listener.accept().expect("accept 不等待握手");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(conn.state(), SecureState::Handshaking);
    assert!(!conn.handshake().expect("期限内仍在等待对端"));
    assert!(conn.recv(64).expect_err("握手未完成").is_would_block());

    thread::sleep(Duration::from_millis(150));
    let err = conn.handshake().expect_err("握手应当超时");
    assert_eq!(err.category(), ErrorCategory::Timeout);
    assert_eq!(err.code(), "spark.transport.tls.handshake_failed");

    conn.close().expect("关闭服务端连接");
    silent.close().expect("关闭静默客户端");
}

/// 一条记录解密出的明文超过单次读取上限时，余量留在会话内并由 `pending_read` 报告。
#[test]
fn oversized_record_keeps_remaining_plaintext_pending() {
    const PAYLOAD: usize = 12_000;
    let pki = Pki::mint();
    let server_ctx = SecureContext::new(pki.server_config()).expect("服务端上下文");
    let (mut listener, addr) = secure_listener(&server_ctx);

    let client = thread::spawn({
        let config = pki.client_config();
        move || {
            let context = SecureContext::new(config).expect("客户端上下文");
            let mut client = context.wrap_socket(TcpSocket::for_addr(&addr).expect("客户端"));
            client.connect(addr).expect("客户端握手");
            let payload = vec![b'x'; PAYLOAD];
            let mut sent = 0;
            while sent < payload.len() {
                sent += client.send(&payload[sent..]).expect("客户端写入");
            }
            assert!(client.recv(64).expect("等待关闭").is_empty());
            client.close().expect("客户端关闭");
        }
    });

    let mut conn = accept_and_handshake(&mut listener).expect("服务端握手");
    let first = conn.recv(4096).expect("首次读取");
    assert_eq!(first.len(), 4096);
    assert_eq!(conn.pending_read(), PAYLOAD - 4096);

    // 余量全部来自会话缓冲，非阻塞读取也不会遇到 WouldBlock。
    conn.set_nonblocking(true).expect("切换为非阻塞");
    let mut total = first.len();
    while conn.pending_read() > 0 {
        total += conn.recv(4096).expect("读取缓冲明文").len();
    }
    assert_eq!(total, PAYLOAD);

    conn.close().expect("服务端关闭");
    client.join().expect("客户端线程");
}
