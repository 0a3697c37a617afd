// Fixed-width stream readers shared by both container families.

use std::io::{self, Read, Seek, SeekFrom};

pub(crate) fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub(crate) fn read_u16_le<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32_be<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

pub(crate) fn read_fourcc<R: Read>(reader: &mut R) -> io::Result<[u8; 4]> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read a single byte, or `None` when the stream ends exactly here.
/// Used at chunk boundaries where end-of-file is a legal end of stream.
pub(crate) fn read_u8_or_eof<R: Read>(reader: &mut R) -> io::Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Read a FourCC, or `None` when the stream ends before its first byte.
pub(crate) fn read_fourcc_or_eof<R: Read>(reader: &mut R) -> io::Result<Option<[u8; 4]>> {
    let Some(first) = read_u8_or_eof(reader)? else {
        return Ok(None);
    };
    let mut rest = [0u8; 3];
    reader.read_exact(&mut rest)?;
    Ok(Some([first, rest[0], rest[1], rest[2]]))
}

/// Skip `n` bytes forward. Seeking past the end is not an error for
/// `Seek`, so the skip is verified against the stream length.
pub(crate) fn skip<R: Seek>(reader: &mut R, n: u64) -> io::Result<()> {
    if n == 0 {
        return Ok(());
    }
    let target = reader.seek(SeekFrom::Current(n as i64))?;
    let end = reader.seek(SeekFrom::End(0))?;
    if target > end {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    reader.seek(SeekFrom::Start(target))?;
    Ok(())
}
