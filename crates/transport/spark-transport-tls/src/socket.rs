use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use rustls::Connection;
use rustls::pki_types::CertificateDer;
use spark_transport::{Result, ShutdownDirection, SocketToken, Transport, TransportError};

use crate::context::SecureContext;
use crate::error::{
    FLUSH, HANDSHAKE, READ, SESSION, WRITE, config_error, handshake_timeout, map_rustls_error,
    map_stream_error, not_established,
};
use crate::io::TransportIo;

/// 安全套接字的生命周期阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecureState {
    /// 已绑定上下文，尚未确定角色。
    Unconnected,
    Handshaking,
    Established,
    /// 已发出 close_notify，等待底层关闭。
    ShutdownSent,
    Closed,
}

/// 在任意 [`Transport`] 之上叠加 TLS 的套接字。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 分发器与分帧器只认识 [`Transport`]；本类型让加密连接以完全相同的 recv/send/accept/close
///   契约出现，上层无需区分明文与密文；
/// - 在契约之外补充 TLS 特有语义：握手、对端证书、带 close_notify 的有序关闭。
///
/// ## 逻辑（How）
/// - 会话使用 `rustls::Connection`，角色在 `connect`（客户端）或由监听套接字 `accept`（服务端）时确定；
/// - `recv` 先读出已解密的明文，不足时 `read_tls` → `process_new_packets`，对端 EOF 呈现为空结果；
/// - `send` 在仍有未发出的密文时返回 `WouldBlock`（上层记为写出 0 字节），否则写入明文并尽力刷出；
/// - 两端的握手都在后续的 recv/send/flush（或显式的 [`SecureSocket::handshake`]）中推进，
///   `accept` 只接受原始连接并建立服务端会话，不等待对端；
/// - 握手期限自会话建立起按上下文的握手超时计算，超期后下一次推进返回超时错误；
/// - 一次 `read_tls` 可能解密出多于 `max` 的明文，剩余量由 [`Transport::pending_read`] 报告，
///   调用方应在其非零时继续 `recv`，底层套接字不会再为这些字节触发可读事件。
///
/// ## 契约（What）
/// - `close` 顺序固定：close_notify → 底层 `shutdown(Both)` → 底层 `close`，
///   前两步失败只记录日志，`close` 总会被调用；
/// - 握手或证书校验失败表现为 `connect` 或该连接握手期间的 recv/send/flush 返回错误，
///   监听套接字本身不受影响。
#[derive(Debug)]
pub struct SecureSocket<T: Transport> {
    inner: T,
    context: SecureContext,
    session: Option<Connection>,
    state: SecureState,
    /// 会话内已解密、尚未被 `recv` 取走的明文字节数。
    buffered_plaintext: usize,
    handshake_deadline: Option<Instant>,
}

impl<T: Transport> SecureSocket<T> {
    pub fn new(inner: T, context: SecureContext) -> Self {
        Self {
            inner,
            context,
            session: None,
            state: SecureState::Unconnected,
            buffered_plaintext: 0,
            handshake_deadline: None,
        }
    }

    pub fn context(&self) -> &SecureContext {
        &self.context
    }

    pub fn state(&self) -> SecureState {
        self.state
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// 对端出示的证书链；握手完成前或对端未出示时为 `None`。
    pub fn peer_certificates(&self) -> Option<&[CertificateDer<'static>]> {
        self.session
            .as_ref()
            .and_then(|session| session.peer_certificates())
    }

    /// 在已接受的原始连接上建立服务端会话，握手留给后续的读写事件推进。
    fn server_side(mut raw: T, context: SecureContext) -> Result<Self> {
        let session = context
            .server_session()
            .map_err(|err| config_error(SESSION, err))?;
        raw.set_nonblocking(true)?;
        let deadline = Instant::now().checked_add(context.handshake_timeout());
        Ok(Self {
            inner: raw,
            context,
            session: Some(Connection::Server(session)),
            state: SecureState::Handshaking,
            buffered_plaintext: 0,
            handshake_deadline: deadline,
        })
    }

    /// 推进尚未完成的握手；返回 `true` 表示会话已可用，`false` 表示仍在等待对端。
    ///
    /// 底层为阻塞模式时会一直推进到握手结束（或读写超时）。
    pub fn handshake(&mut self) -> Result<bool> {
        match self.state {
            SecureState::Established | SecureState::ShutdownSent => Ok(true),
            SecureState::Handshaking => self.drive_handshake(),
            SecureState::Unconnected | SecureState::Closed => Err(not_established(HANDSHAKE)),
        }
    }

    /// 推进握手；返回 `true` 表示握手已完成。
    ///
    /// `WouldBlock` 在期限内表示等待对端，超过期限则映射为握手超时。
    fn drive_handshake(&mut self) -> Result<bool> {
        let Some(session) = self.session.as_mut() else {
            return Err(not_established(HANDSHAKE));
        };
        let deadline = self.handshake_deadline;
        let mut io = TransportIo::new(&mut self.inner);
        let pending = |err: io::Error| -> Result<bool> {
            if err.kind() == io::ErrorKind::WouldBlock {
                match deadline {
                    Some(deadline) if Instant::now() >= deadline => Err(handshake_timeout()),
                    _ => Ok(false),
                }
            } else {
                Err(map_stream_error(HANDSHAKE, err))
            }
        };

        while session.is_handshaking() {
            if session.wants_write() {
                if let Err(err) = session.write_tls(&mut io) {
                    return pending(err);
                }
                continue;
            }
            match session.read_tls(&mut io) {
                Ok(0) => {
                    return Err(TransportError::new(
                        HANDSHAKE,
                        io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "peer closed connection during tls handshake",
                        ),
                    ));
                }
                Ok(_) => match session.process_new_packets() {
                    Ok(state) => self.buffered_plaintext = state.plaintext_bytes_to_read(),
                    Err(err) => {
                        // 尽力把告警发给对端，结论以本地错误为准。
                        flush_alert(session, &mut io);
                        return Err(map_rustls_error(HANDSHAKE, err));
                    }
                },
                Err(err) => return pending(err),
            }
        }

        if let Err(err) = write_pending(session, &mut io)
            && err.kind() != io::ErrorKind::WouldBlock
        {
            return Err(map_stream_error(HANDSHAKE, err));
        }
        self.state = SecureState::Established;
        self.handshake_deadline = None;
        tracing::debug!(
            target: "spark.transport.tls",
            token = %self.inner.token(),
            session_id = self.context.session_id(),
            "tls session established"
        );
        Ok(true)
    }

    /// recv/send 的公共前置：推进未完成的握手并确认会话可用。
    fn ensure_established(&mut self, op: spark_transport::OperationKind) -> Result<()> {
        match self.state {
            SecureState::Established | SecureState::ShutdownSent => Ok(()),
            SecureState::Handshaking => {
                if self.drive_handshake()? {
                    Ok(())
                } else {
                    Err(TransportError::new(op, io::ErrorKind::WouldBlock.into()))
                }
            }
            SecureState::Unconnected | SecureState::Closed => Err(not_established(op)),
        }
    }
}

/// 把会话中排队的密文全部写出；底层返回 `WouldBlock` 时原样返回。
fn write_pending<T: Transport>(session: &mut Connection, io: &mut TransportIo<'_, T>) -> io::Result<()> {
    while session.wants_write() {
        if session.write_tls(io)? == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
    }
    Ok(())
}

/// 会话出错后尽力发出告警；写不出去只记录日志。
fn flush_alert<T: Transport>(session: &mut Connection, io: &mut TransportIo<'_, T>) {
    if let Err(err) = write_pending(session, io) {
        tracing::debug!(target: "spark.transport.tls", error = %err, "tls alert not flushed");
    }
}

impl<T: Transport> Transport for SecureSocket<T> {
    fn token(&self) -> SocketToken {
        self.inner.token()
    }

    fn recv(&mut self, max: usize) -> Result<Bytes> {
        self.ensure_established(READ)?;
        let Some(session) = self.session.as_mut() else {
            return Err(not_established(READ));
        };
        let mut io = TransportIo::new(&mut self.inner);
        if let Err(err) = write_pending(session, &mut io)
            && err.kind() != io::ErrorKind::WouldBlock
        {
            return Err(map_stream_error(READ, err));
        }

        let mut buf = BytesMut::zeroed(max);
        loop {
            match session.reader().read(&mut buf) {
                // 0 表示对端发送了 close_notify。
                Ok(n) => {
                    self.buffered_plaintext = self.buffered_plaintext.saturating_sub(n);
                    buf.truncate(n);
                    return Ok(buf.freeze());
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => return Err(map_stream_error(READ, err)),
            }

            match session.read_tls(&mut io) {
                Ok(0) => return Ok(Bytes::new()),
                Ok(_) => match session.process_new_packets() {
                    Ok(state) => self.buffered_plaintext = state.plaintext_bytes_to_read(),
                    Err(err) => {
                        flush_alert(session, &mut io);
                        return Err(map_rustls_error(READ, err));
                    }
                },
                Err(err) => return Err(map_stream_error(READ, err)),
            }
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_established(WRITE)?;
        let Some(session) = self.session.as_mut() else {
            return Err(not_established(WRITE));
        };
        let mut io = TransportIo::new(&mut self.inner);
        // 上一批密文尚未写出时不再接收明文，避免会话缓冲无限增长。
        write_pending(session, &mut io).map_err(|err| map_stream_error(WRITE, err))?;

        let written = session
            .writer()
            .write(data)
            .map_err(|err| map_stream_error(WRITE, err))?;
        if let Err(err) = write_pending(session, &mut io)
            && err.kind() != io::ErrorKind::WouldBlock
        {
            return Err(map_stream_error(WRITE, err));
        }
        Ok(written)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(session) = self.session.as_mut()
            && matches!(
                self.state,
                SecureState::Handshaking | SecureState::Established
            )
        {
            session.send_close_notify();
            self.state = SecureState::ShutdownSent;
            let mut io = TransportIo::new(&mut self.inner);
            if let Err(err) = write_pending(session, &mut io) {
                tracing::debug!(target: "spark.transport.tls", error = %err, "close_notify not flushed");
            }
        }
        if let Err(err) = self.inner.shutdown(ShutdownDirection::Both) {
            tracing::debug!(
                target: "spark.transport.tls",
                code = err.code(),
                error = %err,
                "shutdown before close failed"
            );
        }
        self.session = None;
        self.state = SecureState::Closed;
        self.buffered_plaintext = 0;
        self.handshake_deadline = None;
        self.inner.close()
    }

    fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        let session = self
            .context
            .client_session()
            .map_err(|err| config_error(SESSION, err))?;
        self.session = Some(Connection::Client(session));
        self.state = SecureState::Handshaking;
        self.handshake_deadline = Instant::now().checked_add(self.context.handshake_timeout());
        self.inner.connect(addr)?;
        self.drive_handshake().map(|_| ())
    }

    fn accept(&mut self) -> Result<(Self, SocketAddr)> {
        let (raw, peer) = self.inner.accept()?;
        let socket = Self::server_side(raw, self.context.clone())?;
        tracing::debug!(
            target: "spark.transport.tls",
            token = %socket.token(),
            %peer,
            "tls connection accepted, handshake pending"
        );
        Ok((socket, peer))
    }

    fn bind(&mut self, addr: SocketAddr) -> Result<()> {
        self.inner.bind(addr)
    }

    fn listen(&mut self, backlog: i32) -> Result<()> {
        self.inner.listen(backlog)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()> {
        self.inner.set_nonblocking(nonblocking)
    }

    fn timeout(&self) -> Result<Option<Duration>> {
        self.inner.timeout()
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_timeout(timeout)
    }

    fn shutdown(&mut self, how: ShutdownDirection) -> Result<()> {
        self.inner.shutdown(how)
    }

    fn take_error(&mut self) -> Result<Option<io::Error>> {
        self.inner.take_error()
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr()
    }

    fn pending_read(&self) -> usize {
        self.buffered_plaintext
    }

    fn wants_write(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.wants_write())
    }

    fn flush(&mut self) -> Result<()> {
        if self.state == SecureState::Handshaking {
            self.drive_handshake()?;
            return Ok(());
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let mut io = TransportIo::new(&mut self.inner);
        match write_pending(session, &mut io) {
            Err(err) if err.kind() != io::ErrorKind::WouldBlock => {
                Err(map_stream_error(FLUSH, err))
            }
            _ => Ok(()),
        }
    }
}
