//! TCP client for the disk service's line-oriented block protocol.

use crate::{
    error::{Error, Result},
    wire, Block, BlockDevice, BSIZE,
};
use log::{debug, trace};
use std::{
    io::BufReader,
    net::{TcpStream, ToSocketAddrs},
};

/// Speaks `I`/`R cyl sec`/`W cyl sec hexdata` to a disk service over TCP and
/// exposes the flat `bread`/`bwrite`/`binfo` interface over it.
pub struct TcpBlockDevice {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    /// Cached geometry from the last successful `binfo`, used to translate a
    /// flat block number into `(cyl, sec)`.
    geometry: Option<(u32, u32)>,
}

impl TcpBlockDevice {
    /// Connects to the disk service at `addr`.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            geometry: None,
        })
    }

    fn nsec(&mut self) -> Result<u32> {
        match self.geometry {
            Some((_, nsec)) => Ok(nsec),
            None => Ok(self.binfo()?.1),
        }
    }

    fn recv_line(&mut self) -> Result<String> {
        wire::recv_line(&mut self.reader)?
            .ok_or_else(|| Error::Protocol("disk service closed the connection".into()))
    }
}

impl BlockDevice for TcpBlockDevice {
    fn binfo(&mut self) -> Result<(u32, u32)> {
        wire::send_line(&mut self.writer, "I")?;
        let line = self.recv_line()?;
        let mut parts = line.split_whitespace();
        let ncyl: u32 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Protocol(format!("bad I response: {line:?}")))?;
        let nsec: u32 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Protocol(format!("bad I response: {line:?}")))?;
        debug!("binfo: ncyl={ncyl} nsec={nsec}");
        self.geometry = Some((ncyl, nsec));
        Ok((ncyl, nsec))
    }

    fn bread(&mut self, bno: u32) -> Result<Block> {
        let nsec = self.nsec()?;
        let (cyl, sec) = (bno / nsec, bno % nsec);
        trace!("bread bno={bno} -> cyl={cyl} sec={sec}");
        wire::send_line(&mut self.writer, &format!("R {cyl} {sec}"))?;
        let line = self.recv_line()?;
        let data = line
            .strip_prefix("Yes ")
            .ok_or_else(|| Error::Rejected(line.clone()))?;
        wire::decode(data).ok_or_else(|| Error::Protocol(format!("bad hex payload: {line:?}")))
    }

    fn bwrite(&mut self, bno: u32, data: &Block) -> Result<()> {
        let nsec = self.nsec()?;
        let (cyl, sec) = (bno / nsec, bno % nsec);
        trace!("bwrite bno={bno} -> cyl={cyl} sec={sec}");
        let hex = wire::encode(data);
        debug_assert_eq!(hex.len(), BSIZE * 2);
        wire::send_line(&mut self.writer, &format!("W {cyl} {sec} {hex}"))?;
        let line = self.recv_line()?;
        if line == "Yes" {
            Ok(())
        } else {
            Err(Error::Rejected(line))
        }
    }
}
