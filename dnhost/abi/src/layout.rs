//! Wire layout of the parameter block, independent of any compiler's struct
//! layout rules. A writer targeting another process uses this to produce the
//! exact bytes the bootstrap reads, including for a target whose pointer
//! width differs from its own.

use serde::{Deserialize, Serialize};

/// Bumped whenever field order or widths change.
pub const LAYOUT_VERSION: u32 = 1;

/// Field names in wire order. Every field is one target pointer wide.
pub const FIELDS: [&str; 5] = [
    "library_path",
    "runtime_config_path",
    "type_path",
    "method_name",
    "user_data",
];

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("Field `{field}` address {address:#x} does not fit a {bits}-bit pointer")]
    AddressTooWide {
        field: &'static str,
        address: u64,
        bits: u32,
    },
    #[error("Expected {expected} bytes for a {bits}-bit block, got {actual}")]
    Length {
        expected: usize,
        actual: usize,
        bits: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    pub fn native() -> Self {
        if cfg!(target_pointer_width = "64") {
            Self::Bits64
        } else {
            Self::Bits32
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Total size of a block for this width.
    pub fn block_size(self) -> usize {
        FIELDS.len() * self.bytes()
    }

    /// Byte offset of `field` inside the block.
    pub fn offset_of(self, field: &str) -> Option<usize> {
        FIELDS
            .iter()
            .position(|name| *name == field)
            .map(|index| index * self.bytes())
    }
}

/// Parameter block addresses as seen from the target process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLoadParams {
    pub library_path: u64,
    pub runtime_config_path: u64,
    pub type_path: u64,
    pub method_name: u64,
    pub user_data: u64,
}

impl RawLoadParams {
    fn fields(&self) -> [u64; 5] {
        [
            self.library_path,
            self.runtime_config_path,
            self.type_path,
            self.method_name,
            self.user_data,
        ]
    }

    /// Native-endian bytes of the block for a target with `width` pointers.
    pub fn encode(&self, width: PointerWidth) -> Result<Vec<u8>, LayoutError> {
        let mut out = Vec::with_capacity(width.block_size());
        for (field, address) in FIELDS.into_iter().zip(self.fields()) {
            match width {
                PointerWidth::Bits64 => out.extend_from_slice(&address.to_ne_bytes()),
                PointerWidth::Bits32 => {
                    let narrow = u32::try_from(address).map_err(|_| LayoutError::AddressTooWide {
                        field,
                        address,
                        bits: width.bits(),
                    })?;
                    out.extend_from_slice(&narrow.to_ne_bytes());
                }
            }
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8], width: PointerWidth) -> Result<Self, LayoutError> {
        if bytes.len() != width.block_size() {
            return Err(LayoutError::Length {
                expected: width.block_size(),
                actual: bytes.len(),
                bits: width.bits(),
            });
        }

        let mut fields = [0u64; 5];
        for (slot, chunk) in fields.iter_mut().zip(bytes.chunks_exact(width.bytes())) {
            *slot = match width {
                PointerWidth::Bits64 => {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(chunk);
                    u64::from_ne_bytes(raw)
                }
                PointerWidth::Bits32 => {
                    let mut raw = [0u8; 4];
                    raw.copy_from_slice(chunk);
                    u64::from(u32::from_ne_bytes(raw))
                }
            };
        }

        let [library_path, runtime_config_path, type_path, method_name, user_data] = fields;
        Ok(Self {
            library_path,
            runtime_config_path,
            type_path,
            method_name,
            user_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: RawLoadParams = RawLoadParams {
        library_path: 0x1000,
        runtime_config_path: 0x2000,
        type_path: 0x3000,
        method_name: 0x4000,
        user_data: 0,
    };

    #[test]
    fn test_block_sizes() {
        assert_eq!(PointerWidth::Bits32.block_size(), 20);
        assert_eq!(PointerWidth::Bits64.block_size(), 40);
    }

    #[test]
    fn test_field_offsets() {
        assert_eq!(PointerWidth::Bits64.offset_of("library_path"), Some(0));
        assert_eq!(PointerWidth::Bits64.offset_of("runtime_config_path"), Some(8));
        assert_eq!(PointerWidth::Bits64.offset_of("user_data"), Some(32));
        assert_eq!(PointerWidth::Bits32.offset_of("method_name"), Some(12));
        assert_eq!(PointerWidth::Bits32.offset_of("missing"), None);
    }

    #[test]
    fn test_encode_64_reference_layout() {
        let bytes = SAMPLE.encode(PointerWidth::Bits64).unwrap();
        let mut expected = Vec::new();
        for value in [0x1000u64, 0x2000, 0x3000, 0x4000, 0] {
            expected.extend_from_slice(&value.to_ne_bytes());
        }
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_encode_32_reference_layout() {
        let bytes = SAMPLE.encode(PointerWidth::Bits32).unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[4..8], &0x2000u32.to_ne_bytes());
        assert_eq!(&bytes[16..20], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_32_rejects_wide_address() {
        let raw = RawLoadParams {
            type_path: 0x1_0000_0000,
            ..SAMPLE
        };
        let err = raw.encode(PointerWidth::Bits32).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::AddressTooWide {
                field: "type_path",
                bits: 32,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_restores_encoded_block() {
        for width in [PointerWidth::Bits32, PointerWidth::Bits64] {
            let bytes = SAMPLE.encode(width).unwrap();
            assert_eq!(RawLoadParams::decode(&bytes, width).unwrap(), SAMPLE);
        }
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = RawLoadParams::decode(&[0u8; 39], PointerWidth::Bits64).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::Length {
                expected: 40,
                actual: 39,
                ..
            }
        ));
    }

    #[test]
    fn test_raw_params_from_json() {
        let json = r#"{"library_path":1,"runtime_config_path":2,"type_path":3,"method_name":4,"user_data":5}"#;
        let raw: RawLoadParams = serde_json::from_str(json).unwrap();
        assert_eq!(raw.method_name, 4);
        assert_eq!(raw.user_data, 5);
    }
}
