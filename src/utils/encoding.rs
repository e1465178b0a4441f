use std::io::{self, Write};

/// Read a u8 at `offset`, or `None` if the slice is too short
#[inline]
pub fn read_u8_at(buf: &[u8], offset: usize) -> Option<u8> {
    buf.get(offset).copied()
}

/// Read a little-endian u64 at `offset`
#[inline]
pub fn read_u64_le_at(buf: &[u8], offset: usize) -> Option<u64> {
    let end = offset.checked_add(8)?;
    let bytes: [u8; 8] = buf.get(offset..end)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// Read a little-endian i64 at `offset`
#[inline]
pub fn read_i64_le_at(buf: &[u8], offset: usize) -> Option<i64> {
    read_u64_le_at(buf, offset).map(|v| v as i64)
}

/// Read a little-endian i32 at `offset`
#[inline]
pub fn read_i32_le_at(buf: &[u8], offset: usize) -> Option<i32> {
    let end = offset.checked_add(4)?;
    let bytes: [u8; 4] = buf.get(offset..end)?.try_into().ok()?;
    Some(i32::from_le_bytes(bytes))
}

/// Write an i32 in little-endian format
pub fn write_i32_le<W: Write>(writer: &mut W, value: i32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Write a slice of i64 values, batching to reduce system call overhead
pub fn write_i64_slice_le<W: Write>(writer: &mut W, values: &[i64]) -> io::Result<()> {
    let mut buffer = Vec::with_capacity(8 * 1024);
    for &value in values {
        buffer.extend_from_slice(&value.to_le_bytes());
        if buffer.len() >= 8 * 1024 {
            writer.write_all(&buffer)?;
            buffer.clear();
        }
    }
    if !buffer.is_empty() {
        writer.write_all(&buffer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_past_end() {
        let buf = [1u8, 0, 0, 0, 0, 0, 0];
        assert_eq!(read_u64_le_at(&buf, 0), None);
        assert_eq!(read_i32_le_at(&buf, 4), None);
        assert_eq!(read_u8_at(&buf, 7), None);
        assert_eq!(read_i32_le_at(&buf, 0), Some(1));
        assert_eq!(read_u64_le_at(&buf, usize::MAX - 2), None);
    }

    #[test]
    fn test_slice_writer_crosses_batch_boundary() {
        let values: Vec<i64> = (0..3000).map(|v| v * 7 - 11).collect();
        let mut out = Vec::new();
        write_i64_slice_le(&mut out, &values).unwrap();
        assert_eq!(out.len(), values.len() * 8);
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(read_i64_le_at(&out, i * 8), Some(v));
        }
    }
}
