//! 电机线上地址
//!
//! 地址以混淆形式（逐字节按位取反）在线上传输，并且节点号为小端序。
//! 显示形式为 `~a3 ~a2 ~a1` 的十六进制。

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

/// 按位取反混淆（对合运算：取反两次得到原值）
#[inline]
pub fn obfuscate(byte: u8) -> u8 {
    !byte
}

/// 3 字节线上地址
///
/// 排序为 `(a1, a2, a3)` 的字典序，即线上字节顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WireAddress(pub [u8; 3]);

impl WireAddress {
    /// 从线上字节构建
    pub const fn new(a1: u8, a2: u8, a3: u8) -> Self {
        Self([a1, a2, a3])
    }

    /// 从切片开头读取地址
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        match bytes {
            [a1, a2, a3, ..] => Ok(Self::new(*a1, *a2, *a3)),
            _ => Err(ProtocolError::InvalidLength {
                expected: 3,
                actual: bytes.len(),
            }),
        }
    }

    /// 从显示形式（去混淆后的节点号）构建
    pub fn from_node_id(node_id: [u8; 3]) -> Self {
        Self::new(
            obfuscate(node_id[2]),
            obfuscate(node_id[1]),
            obfuscate(node_id[0]),
        )
    }

    /// 线上字节
    pub fn bytes(&self) -> [u8; 3] {
        self.0
    }

    /// 显示形式（去混淆后的节点号，高位在前）
    pub fn node_id(&self) -> [u8; 3] {
        [obfuscate(self.0[2]), obfuscate(self.0[1]), obfuscate(self.0[0])]
    }
}

impl fmt::Display for WireAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [n1, n2, n3] = self.node_id();
        write!(f, "{:02X}{:02X}{:02X}", n1, n2, n3)
    }
}

impl FromStr for WireAddress {
    type Err = ProtocolError;

    /// 解析显示形式，如 `"3F13A0"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 6 || !s.is_ascii() {
            return Err(ProtocolError::InvalidAddress(s.to_string()));
        }
        let mut node_id = [0u8; 3];
        for (i, byte) in node_id.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| ProtocolError::InvalidAddress(s.to_string()))?;
        }
        Ok(Self::from_node_id(node_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_display_is_complemented_and_reversed() {
        let addr = WireAddress::new(0x5F, 0xC0, 0xEC);
        assert_eq!(addr.node_id(), [0x13, 0x3F, 0xA0]);
        assert_eq!(addr.to_string(), "133FA0");
    }

    #[test]
    fn test_parse_display_form() {
        let addr: WireAddress = "133FA0".parse().unwrap();
        assert_eq!(addr, WireAddress::new(0x5F, 0xC0, 0xEC));
        assert!("12345".parse::<WireAddress>().is_err());
        assert!("ZZ0000".parse::<WireAddress>().is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic_on_wire_bytes() {
        let a = WireAddress::new(0x01, 0xFF, 0xFF);
        let b = WireAddress::new(0x02, 0x00, 0x00);
        let c = WireAddress::new(0x02, 0x00, 0x01);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_from_slice_too_short() {
        assert!(WireAddress::from_slice(&[1, 2]).is_err());
        assert_eq!(
            WireAddress::from_slice(&[1, 2, 3, 4]).unwrap(),
            WireAddress::new(1, 2, 3)
        );
    }

    proptest! {
        /// 取反两次得到原值
        #[test]
        fn obfuscation_is_involutive(byte in any::<u8>()) {
            prop_assert_eq!(obfuscate(obfuscate(byte)), byte);
        }

        /// 显示形式与线上形式互逆
        #[test]
        fn node_id_roundtrip(bytes in any::<[u8; 3]>()) {
            let addr = WireAddress(bytes);
            prop_assert_eq!(WireAddress::from_node_id(addr.node_id()), addr);
        }
    }
}
