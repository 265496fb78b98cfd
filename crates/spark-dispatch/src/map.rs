use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use spark_transport::SocketToken;

/// 外部 Reactor 的套接字表。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - Reactor 需要知道哪些套接字参与轮询；分发器只负责登记与注销，轮询本身不在本 crate；
/// - 以 trait 暴露，Reactor 可以用自己的数据结构（例如 token → 注册句柄）实现。
///
/// ## 契约（What）
/// - `add_channel` 在通道绑定套接字时调用，`del_channel` 在关闭时调用，重复注销必须是无害的；
/// - 实现需要 `Send + Sync`：生产者线程可能持有同一张表。
pub trait SocketMap: Send + Sync + fmt::Debug {
    fn add_channel(&self, token: SocketToken);

    fn del_channel(&self, token: SocketToken);

    fn contains(&self, token: SocketToken) -> bool;
}

/// 默认的内存套接字表。
#[derive(Debug, Default)]
pub struct SocketRegistry {
    tokens: Mutex<BTreeSet<SocketToken>>,
}

impl SocketRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }

    /// 当前登记的全部标识，按数值升序。
    pub fn tokens(&self) -> Vec<SocketToken> {
        self.tokens.lock().iter().copied().collect()
    }
}

impl SocketMap for SocketRegistry {
    fn add_channel(&self, token: SocketToken) {
        self.tokens.lock().insert(token);
    }

    fn del_channel(&self, token: SocketToken) {
        self.tokens.lock().remove(&token);
    }

    fn contains(&self, token: SocketToken) -> bool {
        self.tokens.lock().contains(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_removal_is_harmless() {
        let registry = SocketRegistry::new();
        let token = SocketToken::from_raw(7);
        registry.add_channel(token);
        assert!(registry.contains(token));
        registry.del_channel(token);
        registry.del_channel(token);
        assert!(registry.is_empty());
    }
}
