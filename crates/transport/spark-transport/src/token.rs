use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Reactor socket map 的键。
///
/// # 教案级注释
/// - 每个套接字对象在创建时分配一次，进程内单调递增、永不复用；
/// - 不使用原始文件描述符，避免描述符关闭后被内核复用造成 map 串号；
/// - 包装层（如 TLS）沿用内层套接字的 token，保证注册与注销对称。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketToken(u64);

impl SocketToken {
    /// 分配下一个全局唯一 token。
    pub fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SocketToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}
