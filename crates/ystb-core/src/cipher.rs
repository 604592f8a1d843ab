use crate::types::V290;

pub const KEY_200: u32 = 0x07B4_024A;
pub const KEY_290: u32 = 0xD36F_AC96;

/// 4-byte repeating XOR key. The key constant is applied in big-endian byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XorKey(pub [u8; 4]);

impl XorKey {
    pub fn for_version(version: u32) -> Self {
        if version >= V290 {
            KEY_290.into()
        } else {
            KEY_200.into()
        }
    }

    /// Applies the key cyclically from the start of `section`; its own inverse.
    pub fn apply(&self, section: &mut [u8]) {
        for (b, k) in section.iter_mut().zip(self.0.iter().cycle()) {
            *b ^= k;
        }
    }
}

impl From<u32> for XorKey {
    fn from(key: u32) -> Self {
        XorKey(key.to_be_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_per_version() {
        assert_eq!(XorKey::for_version(289), XorKey([0x07, 0xB4, 0x02, 0x4A]));
        assert_eq!(XorKey::for_version(290), XorKey([0xD3, 0x6F, 0xAC, 0x96]));
    }

    #[test]
    fn apply_is_cyclic_and_involutive() {
        let key = XorKey::from(0x0102_0304);
        let mut data = vec![0u8; 6];
        key.apply(&mut data);
        assert_eq!(data, [1, 2, 3, 4, 1, 2]);
        key.apply(&mut data);
        assert_eq!(data, [0; 6]);
    }
}
