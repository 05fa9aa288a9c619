//! Bounded cursor for reading codec command streams
use crate::Error;

pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize
}

impl <'a> ByteReader<'a> {
    pub fn create(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0
        }
    }
    /// position of the cursor
    pub fn pos(&self) -> usize {
        self.pos
    }
    /// number of bytes not yet read
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
    pub fn read_u8(&mut self) -> Result<u8,Error> {
        match self.buf.get(self.pos) {
            Some(val) => {
                self.pos += 1;
                Ok(*val)
            },
            None => Err(Error::UnexpectedEnd)
        }
    }
    /// little endian word
    pub fn read_u16(&mut self) -> Result<u16,Error> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_le_bytes([bytes[0],bytes[1]]))
    }
    /// borrow the next `n` bytes and advance past them
    pub fn read_slice(&mut self,n: usize) -> Result<&'a [u8],Error> {
        if n > self.remaining() {
            return Err(Error::UnexpectedEnd);
        }
        let ans = &self.buf[self.pos..self.pos+n];
        self.pos += n;
        Ok(ans)
    }
}

#[test]
fn reads_little_endian() {
    let mut rdr = ByteReader::create(&[0x01,0x34,0x12,0xff]);
    assert_eq!(rdr.read_u8().unwrap(),1);
    assert_eq!(rdr.read_u16().unwrap(),0x1234);
    assert_eq!(rdr.remaining(),1);
    assert!(matches!(rdr.read_u16(),Err(Error::UnexpectedEnd)));
    // failed read does not move the cursor
    assert_eq!(rdr.pos(),3);
    assert_eq!(rdr.read_u8().unwrap(),0xff);
    assert!(matches!(rdr.read_u8(),Err(Error::UnexpectedEnd)));
}

#[test]
fn slices() {
    let mut rdr = ByteReader::create(b"abcde");
    assert_eq!(rdr.read_slice(3).unwrap(),b"abc");
    assert!(rdr.read_slice(3).is_err());
    assert_eq!(rdr.read_slice(2).unwrap(),b"de");
    assert_eq!(rdr.read_slice(0).unwrap(),b"");
}
