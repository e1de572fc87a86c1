use bytes::Bytes;
use nom::{
    bytes::complete::take_while1,
    character::complete::space1,
    multi::separated_list0,
    IResult,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::{Error, ProtocolError};

fn is_token_char(b: u8) -> bool {
    b > 32 && b < 127
}

fn token(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_token_char)(input)
}

fn tokenize(line: &[u8]) -> Vec<Bytes> {
    let trimmed = trim_ascii_whitespace(line);
    if trimmed.is_empty() {
        return Vec::new();
    }
    let parse: IResult<&[u8], Vec<&[u8]>> = separated_list0(space1, token)(trimmed);
    match parse {
        Ok((_, tokens)) => tokens.into_iter().map(Bytes::copy_from_slice).collect(),
        Err(_) => Vec::new(),
    }
}

fn trim_ascii_whitespace(mut buf: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = buf {
        if first.is_ascii_whitespace() {
            buf = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = buf {
        if last.is_ascii_whitespace() {
            buf = rest;
        } else {
            break;
        }
    }
    buf
}

pub struct Framer {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    line_buf: Vec<u8>,
}

impl Framer {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Framer {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            line_buf: Vec::new(),
        }
    }

    pub async fn read_line(&mut self) -> Result<Option<Vec<Bytes>>, Error> {
        self.line_buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.line_buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(tokenize(&self.line_buf)))
    }

    pub async fn read_data(&mut self, len: usize) -> Result<Bytes, Error> {
        let mut buf = vec![0u8; len];
        read_exact(&mut self.reader, &mut buf).await?;

        let mut terminator = [0u8; 1];
        read_exact(&mut self.reader, &mut terminator).await?;
        if terminator[0] != b'\n' {
            return Err(ProtocolError::MissingDataTerminator.into());
        }

        Ok(Bytes::from(buf))
    }

    pub async fn write_line(&mut self, parts: &[&[u8]]) -> Result<(), Error> {
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                self.writer.write_all(b" ").await?;
            }
            self.writer.write_all(part).await?;
        }
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn write_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.writer.write_all(data).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

async fn read_exact<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<(), Error> {
    use tokio::io::AsyncReadExt;
    reader.read_exact(buf).await?;
    Ok(())
}
