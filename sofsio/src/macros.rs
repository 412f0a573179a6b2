// SPDX-License-Identifier: MIT

/// Implements read/write functions for primitive values located at a byte
/// offset inside a block.
#[macro_export]
macro_rules! dev_impl_primitive_rw {
    ($($ty:ty),+ $(,)?) => {
        $(
            paste::paste! {
                fn [<write_ $ty _at>](&mut self, n: u32, offset: usize, value: $ty) -> DevResult {
                    let bytes = value.to_le_bytes();
                    if offset + bytes.len() > BLOCK_SIZE {
                        return Err(DevError::OutOfBounds);
                    }
                    let mut buf = [0u8; BLOCK_SIZE];
                    self.read_block(n, &mut buf)?;
                    buf[offset..offset + bytes.len()].copy_from_slice(&bytes);
                    self.write_block(n, &buf)
                }

                fn [<read_ $ty _at>](&mut self, n: u32, offset: usize) -> DevResult<$ty> {
                    let mut bytes = [0u8; core::mem::size_of::<$ty>()];
                    let len = bytes.len();
                    if offset + len > BLOCK_SIZE {
                        return Err(DevError::OutOfBounds);
                    }
                    let mut buf = [0u8; BLOCK_SIZE];
                    self.read_block(n, &mut buf)?;
                    bytes.copy_from_slice(&buf[offset..offset + len]);
                    Ok(<$ty>::from_le_bytes(bytes))
                }
            }
        )+
    };
}
