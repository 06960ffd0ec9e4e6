use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Writes `payload` prefixed by its big endian length.
pub async fn write_frame<W>(tx: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = payload.len() as LenType;
    tx.write_all(&len.to_be_bytes()).await?;
    tx.write_all(payload).await?;
    tx.flush().await
}

/// Reads the length prefix of the next frame.
///
/// # Returns
/// `None` if the peer closed the stream between frames.
pub async fn read_len<R>(rx: &mut R) -> io::Result<Option<usize>>
where
    R: AsyncRead + Unpin,
{
    let mut size_buf = [0; LEN_TYPE_SIZE];
    let mut filled = 0;

    while filled < LEN_TYPE_SIZE {
        let n = rx.read(&mut size_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        filled += n;
    }

    Ok(Some(LenType::from_be_bytes(size_buf) as usize))
}

/// Reads the next frame of floats into `out`, which must match its length.
pub async fn read_floats_into<R>(rx: &mut R, out: &mut [f32]) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let len = read_len(rx)
        .await?
        .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;

    let view: &mut [u8] = bytemuck::cast_slice_mut(out);
    if len != view.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected a frame of {} bytes, got {len}", view.len()),
        ));
    }

    rx.read_exact(view).await?;
    Ok(())
}
