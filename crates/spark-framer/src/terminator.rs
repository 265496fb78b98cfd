use bytes::Bytes;

/// 入站消息的终止条件。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 同一条连接上常常混用两种分帧方式：先按分隔符读出头部，再按头部给出的长度读出正文；
///   因此终止符是可变状态，处理器在 `found_terminator` 中随时切换；
///
/// ## 契约（What）
/// - `None`：收到的数据全部交给 `collect_incoming_data`，从不触发 `found_terminator`；
/// - `Count(n)`：累计收满 `n` 字节后触发一次，之后计数归零（等同 `None`），直到处理器重新设置；
/// - `Delimiter(d)`：遇到字节序列 `d` 时触发，`d` 本身不会交付；
/// - `Count(0)` 与空分隔符的行为与 `None` 相同。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Terminator {
    #[default]
    None,
    Count(usize),
    Delimiter(Bytes),
}

impl Terminator {
    pub fn delimiter(bytes: impl Into<Bytes>) -> Self {
        Terminator::Delimiter(bytes.into())
    }

    /// 是否等同于“无终止符”。
    pub fn is_none(&self) -> bool {
        match self {
            Terminator::None => true,
            Terminator::Count(n) => *n == 0,
            Terminator::Delimiter(d) => d.is_empty(),
        }
    }
}

impl From<usize> for Terminator {
    fn from(count: usize) -> Self {
        Terminator::Count(count)
    }
}

impl From<&'static [u8]> for Terminator {
    fn from(delimiter: &'static [u8]) -> Self {
        Terminator::Delimiter(Bytes::from_static(delimiter))
    }
}

impl From<&'static str> for Terminator {
    fn from(delimiter: &'static str) -> Self {
        Terminator::Delimiter(Bytes::from_static(delimiter.as_bytes()))
    }
}

impl From<Vec<u8>> for Terminator {
    fn from(delimiter: Vec<u8>) -> Self {
        Terminator::Delimiter(Bytes::from(delimiter))
    }
}

impl From<Bytes> for Terminator {
    fn from(delimiter: Bytes) -> Self {
        Terminator::Delimiter(delimiter)
    }
}

/// 返回 `haystack` 的最长后缀长度，该后缀同时是 `needle` 的真前缀；不存在时返回 0。
///
/// 用于判断缓冲末尾是否可能是被切断的分隔符：例如缓冲 `"AAAB"`、分隔符 `"BC"` 时返回 1，
/// 末尾的 `"B"` 必须留在缓冲中等待下一次读取。
pub fn find_prefix_at_end(haystack: &[u8], needle: &[u8]) -> usize {
    let mut len = needle.len().saturating_sub(1);
    while len > 0 && !haystack.ends_with(&needle[..len]) {
        len -= 1;
    }
    len
}

/// 在 `haystack` 中查找 `needle` 首次出现的位置；`needle` 必须非空。
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
