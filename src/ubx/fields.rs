use crate::ParseError;

/// Little-endian field access into a UBX payload with bounds checking.
pub(crate) struct Fields<'a> {
    buf: &'a [u8],
    name: &'static str,
}

macro_rules! le_field {
    ($fn:ident, $ty:ty) => {
        pub fn $fn(&self, offset: usize) -> Result<$ty, ParseError> {
            const N: usize = std::mem::size_of::<$ty>();
            let bytes = self.slice(offset, N)?;
            let mut arr = [0u8; N];
            arr.copy_from_slice(bytes);
            Ok(<$ty>::from_le_bytes(arr))
        }
    };
}

impl<'a> Fields<'a> {
    pub fn new(buf: &'a [u8], name: &'static str) -> Self {
        Self { buf, name }
    }

    /// Fail unless the payload holds at least `len` bytes.
    pub fn require(&self, len: usize) -> Result<(), ParseError> {
        if self.buf.len() < len {
            Err(ParseError::Length {
                name: self.name,
                expected: len,
                found: self.buf.len(),
            })
        } else {
            Ok(())
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], ParseError> {
        self.require(offset + len)?;
        Ok(&self.buf[offset..offset + len])
    }

    /// Zero padded ASCII string
    pub fn string(&self, offset: usize, len: usize) -> Result<String, ParseError> {
        let bytes = self.slice(offset, len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
        Ok(String::from_utf8_lossy(&bytes[..end]).trim().to_string())
    }

    le_field!(u1, u8);
    le_field!(i1, i8);
    le_field!(u2, u16);
    le_field!(i2, i16);
    le_field!(u4, u32);
    le_field!(i4, i32);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bounds() {
        let f = Fields::new(&[0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFF], "TEST");
        assert_eq!(f.u2(0), Ok(0x0201));
        assert_eq!(f.i4(2), Ok(-1));
        assert!(matches!(f.u4(4), Err(ParseError::Length { found: 6, expected: 8, .. })));
    }

    #[test]
    fn strings() {
        let f = Fields::new(b"ROM CORE 3.01\0\0\0", "MON-VER");
        assert_eq!(f.string(0, 16), Ok("ROM CORE 3.01".to_string()));
    }
}
