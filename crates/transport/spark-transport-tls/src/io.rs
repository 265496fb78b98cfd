use std::io::{self, Read, Write};

use spark_transport::{Transport, TransportError};

/// 让 rustls 的 `read_tls`/`write_tls` 直接驱动任意 [`Transport`]。
///
/// 错误以原始 `io::Error` 形式返回，`WouldBlock` 与 errno 都保持不变。
pub(crate) struct TransportIo<'a, T> {
    inner: &'a mut T,
}

impl<'a, T: Transport> TransportIo<'a, T> {
    pub(crate) fn new(inner: &'a mut T) -> Self {
        Self { inner }
    }
}

impl<T: Transport> Read for TransportIo<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self
            .inner
            .recv(buf.len())
            .map_err(TransportError::into_io)?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl<T: Transport> Write for TransportIo<'_, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.send(buf).map_err(TransportError::into_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
