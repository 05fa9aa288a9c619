//! WSA Animations
//!
//! This is the animation container of Dune II.  The file starts with a 10 byte header,
//! followed by a table of `frame_count+1` offsets, followed by the frame data:
//!
//! | field | type |
//! |-------|------|
//! | frame count | u16 |
//! | tile width | u16 |
//! | tile height | u16 |
//! | delta | u32 |
//! | offsets | u32 * (frame count + 1) |
//!
//! All values are little endian and offsets are absolute positions in the stream.
//! Each frame is LCW compressed, and the expanded data is an XOR delta against the
//! previous frame (against a blank frame for the first one).
//!
//! Detection (`sniff`) never fails, it only says whether the stream looks like WSA.
//! Once a stream is recognized, corrupt frame data is an error (`build`).

use std::io::{Cursor,Read,Seek,SeekFrom};
use crate::{lcw,xor_delta,Error,SpriteFrame,SpriteLoader};

pub const HEADER_LEN: u64 = 10;

/// Options controlling decoding
#[derive(Clone)]
pub struct Options {
    /// refuse tiles with more pixels than this
    pub max_frame_bytes: usize,
    /// refuse animations whose frames add up to more than this
    pub max_total_bytes: usize,
    /// passed on to the LCW stage
    pub lcw: lcw::Options
}

pub const STD_OPTIONS: Options = Options {
    max_frame_bytes: 1 << 24,
    max_total_bytes: 1 << 28,
    lcw: lcw::STD_OPTIONS
};

/// Fixed fields at the start of the file
#[derive(Clone,Debug,PartialEq)]
pub struct Header {
    pub frame_count: u16,
    pub tile_width: u16,
    pub tile_height: u16,
    /// pacing information, not needed for decoding
    pub delta: u32
}

impl Header {
    fn from_bytes(buf: &[u8;HEADER_LEN as usize]) -> Self {
        Self {
            frame_count: u16::from_le_bytes([buf[0],buf[1]]),
            tile_width: u16::from_le_bytes([buf[2],buf[3]]),
            tile_height: u16::from_le_bytes([buf[4],buf[5]]),
            delta: u32::from_le_bytes([buf[6],buf[7],buf[8],buf[9]])
        }
    }
    /// bytes in one frame
    pub fn frame_bytes(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize
    }
}

/// Where each frame's data starts, with one extra entry marking the end of the last frame.
#[derive(Clone,Debug,PartialEq)]
pub struct OffsetTable {
    pub offsets: Vec<u32>,
    /// first byte after the table as it was stored
    pub data_start: u64
}

impl OffsetTable {
    /// byte range of frame `i`
    fn run(&self,i: usize) -> (u64,u64) {
        (self.offsets[i] as u64,self.offsets[i+1] as u64)
    }
}

/// One reconstructed frame
#[derive(Clone,Debug,PartialEq)]
pub struct WsaFrame {
    width: usize,
    height: usize,
    index: usize,
    data: Vec<u8>
}

impl WsaFrame {
    /// position in the animation
    pub fn index(&self) -> usize {
        self.index
    }
}

impl SpriteFrame for WsaFrame {
    fn size(&self) -> (usize,usize) {
        (self.width,self.height)
    }
    fn data(&self) -> &[u8] {
        &self.data
    }
}

fn read_tables<R: Read + Seek>(stream: &mut R,start: u64) -> Result<Option<(Header,OffsetTable)>,std::io::Error> {
    let len = stream.seek(SeekFrom::End(0))?;
    if len < HEADER_LEN {
        log::debug!("{} bytes is too short for WSA",len);
        return Ok(None);
    }
    stream.seek(SeekFrom::Start(start))?;
    let mut buf: [u8;HEADER_LEN as usize] = [0;HEADER_LEN as usize];
    stream.read_exact(&mut buf)?;
    let mut header = Header::from_bytes(&buf);
    log::debug!("frame count {}",header.frame_count);
    log::debug!("tile width {}",header.tile_width);
    log::debug!("tile height {}",header.tile_height);
    log::debug!("delta {}",header.delta);
    let mut raw = vec![0;4 * (header.frame_count as usize + 1)];
    stream.read_exact(&mut raw)?;
    let mut offsets: Vec<u32> = raw.chunks_exact(4).map(|b| u32::from_le_bytes([b[0],b[1],b[2],b[3]])).collect();
    for (i,offset) in offsets.iter().enumerate() {
        log::trace!("offset {} = {}",i,offset);
    }
    log::debug!("stream length {}",len);
    let data_start = stream.stream_position()?;
    if offsets[header.frame_count as usize] as u64 > len {
        log::debug!("final offset is past the end of the stream");
        return Ok(None);
    }
    if header.tile_width == 0 || header.tile_height == 0 {
        log::debug!("empty tiles");
        return Ok(None);
    }
    if offsets[0] == 0 {
        if header.frame_count == 0 {
            log::debug!("leading loop entry with no frames");
            return Ok(None);
        }
        log::debug!("dropping leading loop entry");
        header.frame_count -= 1;
        offsets.remove(0);
    }
    Ok(Some((header,OffsetTable { offsets, data_start })))
}

/// Check whether the stream is a WSA file, and if so return the header and the offset table.
/// A zero first offset marks a loop entry, it is dropped and the frame count reduced by 1.
/// Streams that are too short, or whose final offset lies past the end, give `None`, as does
/// any I/O failure.  The stream position is restored before returning.
pub fn sniff<R: Read + Seek>(stream: &mut R) -> Option<(Header,OffsetTable)> {
    let start = match stream.stream_position() {
        Ok(pos) => pos,
        Err(e) => {
            log::debug!("stream position unavailable: {}",e);
            return None;
        }
    };
    let ans = match read_tables(stream,start) {
        Ok(ans) => ans,
        Err(e) => {
            log::debug!("not WSA: {}",e);
            None
        }
    };
    match stream.seek(SeekFrom::Start(start)) {
        Ok(_) => ans,
        Err(e) => {
            log::warn!("could not restore stream position: {}",e);
            None
        }
    }
}

/// Make sure every frame's run lies between the end of the table and the end of the stream
fn check_offsets(table: &OffsetTable,frame_count: usize,len: u64) -> Result<(),Error> {
    if table.offsets.len() < frame_count + 1 {
        return Err(Error::BadOffsetTable(format!("{} offsets for {} frames",table.offsets.len(),frame_count)));
    }
    for i in 0..frame_count {
        let (beg,end) = table.run(i);
        if beg < table.data_start {
            return Err(Error::BadOffsetTable(format!("frame {} starts at {}, inside the header",i,beg)));
        }
        if end < beg {
            return Err(Error::BadOffsetTable(format!("frame {} ends at {} before it starts at {}",i,end,beg)));
        }
        if end > len {
            return Err(Error::BadOffsetTable(format!("frame {} ends at {}, stream length is {}",i,end,len)));
        }
    }
    Ok(())
}

fn build_frames<R: Read + Seek>(stream: &mut R,header: &Header,table: &OffsetTable,opt: &Options) -> Result<Vec<WsaFrame>,Error> {
    let frame_count = header.frame_count as usize;
    let frame_bytes = header.frame_bytes();
    if frame_bytes > opt.max_frame_bytes {
        log::error!("tile of {} bytes exceeds maximum {}",frame_bytes,opt.max_frame_bytes);
        return Err(Error::FrameTooLarge(frame_bytes));
    }
    let total_bytes = frame_bytes.checked_mul(frame_count).unwrap_or(usize::MAX);
    if total_bytes > opt.max_total_bytes {
        log::error!("{} frames of {} bytes exceed maximum {}",frame_count,frame_bytes,opt.max_total_bytes);
        return Err(Error::AnimationTooLarge(total_bytes));
    }
    let len = stream.seek(SeekFrom::End(0))?;
    if let Err(e) = check_offsets(table,frame_count,len) {
        log::error!("{}",e);
        return Err(e);
    }
    let mut frames: Vec<WsaFrame> = Vec::with_capacity(frame_count);
    let mut compressed: Vec<u8> = Vec::new();
    let mut patch = vec![0;frame_bytes];
    for i in 0..frame_count {
        let (beg,end) = table.run(i);
        log::debug!("frame {} from {} to {}",i,beg,end);
        stream.seek(SeekFrom::Start(beg))?;
        compressed.resize((end - beg) as usize,0);
        stream.read_exact(&mut compressed)?;
        let patch_len = lcw::expand(&compressed,&mut patch,&opt.lcw)?;
        let mut data = match frames.last() {
            Some(prev) => prev.data.clone(),
            None => vec![0;frame_bytes]
        };
        xor_delta::apply(&patch[0..patch_len],&mut data)?;
        frames.push(WsaFrame {
            width: header.tile_width as usize,
            height: header.tile_height as usize,
            index: i,
            data
        });
    }
    Ok(frames)
}

/// Rebuild all frames of a stream that `sniff` accepted.  Each frame starts as a copy of the
/// one before it, and is then patched.  Any corruption fails the whole call, no frames are
/// returned in that case.  The stream position is restored before returning.
pub fn build<R: Read + Seek>(stream: &mut R,header: &Header,table: &OffsetTable,opt: &Options) -> Result<Vec<WsaFrame>,Error> {
    let start = stream.stream_position()?;
    let ans = build_frames(stream,header,table,opt);
    stream.seek(SeekFrom::Start(start))?;
    ans
}

/// Loader for the sprite framework
#[derive(Clone)]
pub struct WsaLoader {
    pub opt: Options
}

impl Default for WsaLoader {
    fn default() -> Self {
        Self {
            opt: STD_OPTIONS
        }
    }
}

impl SpriteLoader for WsaLoader {
    type Frame = WsaFrame;
    fn detect<R: Read + Seek>(&self, stream: &mut R) -> bool {
        sniff(stream).is_some()
    }
    fn try_parse_sprite<R: Read + Seek>(&self, stream: &mut R) -> Result<Option<Vec<WsaFrame>>,Error> {
        match sniff(stream) {
            Some((header,table)) => Ok(Some(build(stream,&header,&table,&self.opt)?)),
            None => Ok(None)
        }
    }
}

/// Convenience function, detects and decodes an in-memory WSA file.
/// Returns `Error::FileFormatMismatch` if the buffer is not WSA.
pub fn decode_slice(slice: &[u8]) -> Result<Vec<WsaFrame>,Error> {
    let mut src = Cursor::new(slice);
    match WsaLoader::default().try_parse_sprite(&mut src)? {
        Some(frames) => Ok(frames),
        None => Err(Error::FileFormatMismatch)
    }
}

// *************** TESTS *****************

// Two 4x4 frames.  Frame 0 XORs runs of 1 and 2 into the blank frame,
// frame 1 skips 9 bytes and XORs 7 into the next one.
#[cfg(test)]
const TWO_FRAMES: &str = "02 00 04 00 04 00 00 00 00 00
    16 00 00 00 21 00 00 00 29 00 00 00
    89 00 04 01 00 04 02 80 00 00 80
    86 89 01 07 80 00 00 80";

// Same frames with a leading loop entry in the table
#[cfg(test)]
const LOOP_ENTRY: &str = "03 00 04 00 04 00 2A 00 00 00
    00 00 00 00 1A 00 00 00 25 00 00 00 2D 00 00 00
    89 00 04 01 00 04 02 80 00 00 80
    86 89 01 07 80 00 00 80";

#[cfg(test)]
fn bytes(hex_str: &str) -> Vec<u8> {
    hex::decode(hex_str.split_whitespace().collect::<String>()).unwrap()
}

#[cfg(test)]
fn expected_frames() -> [Vec<u8>;2] {
    let f0 = vec![1,1,1,1,2,2,2,2,0,0,0,0,0,0,0,0];
    let mut f1 = f0.clone();
    f1[9] = 7;
    [f0,f1]
}

#[test]
fn short_streams_rejected() {
    for n in 0..10 {
        let buf = vec![0;n];
        let mut src = Cursor::new(&buf);
        assert!(sniff(&mut src).is_none());
        assert!(!WsaLoader::default().detect(&mut src));
        assert!(WsaLoader::default().try_parse_sprite(&mut src).unwrap().is_none());
        assert_eq!(src.position(),0);
        src.set_position(7);
        assert!(sniff(&mut src).is_none());
        assert_eq!(src.position(),7);
    }
}

#[test]
fn header_and_offsets() {
    let buf = bytes(TWO_FRAMES);
    let mut src = Cursor::new(&buf);
    let (header,table) = sniff(&mut src).expect("not detected");
    assert_eq!(header,Header { frame_count: 2, tile_width: 4, tile_height: 4, delta: 0 });
    assert_eq!(table.offsets,vec![22,33,41]);
    assert_eq!(table.data_start,22);
    assert_eq!(src.position(),0);
}

#[test]
fn loop_entry_dropped() {
    let buf = bytes(LOOP_ENTRY);
    let mut src = Cursor::new(&buf);
    let (header,table) = sniff(&mut src).expect("not detected");
    assert_eq!(header.frame_count,2);
    assert_eq!(header.delta,42);
    assert_eq!(table.offsets,vec![26,37,45]);
    let frames = build(&mut src,&header,&table,&STD_OPTIONS).expect("build failed");
    assert_eq!(frames.len(),2);
    assert_eq!(frames[1].data(),expected_frames()[1].as_slice());
}

#[test]
fn final_offset_past_end() {
    let mut buf = bytes(TWO_FRAMES);
    buf[18] = 42;
    let mut src = Cursor::new(&buf);
    assert!(sniff(&mut src).is_none());
    assert_eq!(src.position(),0);
    src.set_position(7);
    assert!(sniff(&mut src).is_none());
    assert_eq!(src.position(),7);
    // ending exactly at the stream length is fine
    buf[18] = 41;
    assert!(sniff(&mut Cursor::new(&buf)).is_some());
    // table runs off the end of the stream
    let buf = bytes("FF 00 04 00 04 00 00 00 00 00 10 00 00 00");
    assert!(sniff(&mut Cursor::new(&buf)).is_none());
}

#[test]
fn degenerate_headers_rejected() {
    let buf = bytes("00 00 04 00 04 00 00 00 00 00 00 00 00 00");
    assert!(sniff(&mut Cursor::new(&buf)).is_none());
    let buf = bytes("00 00 00 00 04 00 00 00 00 00 0E 00 00 00");
    assert!(sniff(&mut Cursor::new(&buf)).is_none());
    // no frames is still a valid animation
    let buf = bytes("00 00 04 00 04 00 00 00 00 00 0E 00 00 00");
    assert!(decode_slice(&buf).expect("decode failed").is_empty());
}

#[test]
fn frame_chain() {
    let frames = decode_slice(&bytes(TWO_FRAMES)).expect("decode failed");
    let expected = expected_frames();
    assert_eq!(frames.len(),2);
    for (i,frame) in frames.iter().enumerate() {
        assert_eq!(frame.index(),i);
        assert_eq!(frame.size(),(4,4));
        assert_eq!(frame.frame_size(),(4,4));
        assert_eq!(frame.offset(),(0.0,0.0));
        assert_eq!(frame.data(),expected[i].as_slice());
    }
}

#[test]
fn first_frame_starts_blank() {
    // frame 0 patch is only the end marker
    let buf = bytes("01 00 03 00 02 00 00 00 00 00 12 00 00 00 17 00 00 00 83 80 00 00 80");
    let frames = decode_slice(&buf).expect("decode failed");
    assert_eq!(frames[0].data(),&[0;6]);
}

#[test]
fn deterministic() {
    let buf = bytes(TWO_FRAMES);
    let mut src = Cursor::new(&buf);
    let loader = WsaLoader::default();
    let first = loader.try_parse_sprite(&mut src).unwrap().unwrap();
    let second = loader.try_parse_sprite(&mut src).unwrap().unwrap();
    assert_eq!(first,second);
}

#[test]
fn position_restored() {
    let buf = bytes(TWO_FRAMES);
    let mut src = Cursor::new(&buf);
    let (header,table) = sniff(&mut src).unwrap();
    src.set_position(5);
    build(&mut src,&header,&table,&STD_OPTIONS).expect("build failed");
    assert_eq!(src.position(),5);
    let mut bad = buf.clone();
    bad[22] = 0x00;
    let mut src = Cursor::new(&bad);
    src.set_position(3);
    assert!(build(&mut src,&header,&table,&STD_OPTIONS).is_err());
    assert_eq!(src.position(),3);
}

#[test]
fn bad_command_is_fatal() {
    // first LCW command of frame 0 refers back before the start of output
    let mut buf = bytes(TWO_FRAMES);
    buf[22] = 0x00;
    buf[23] = 0x05;
    match decode_slice(&buf) {
        Err(Error::BadCommand { cmd: 0, pos: 0 }) => {},
        _ => panic!("expected bad command")
    }
}

#[test]
fn truncated_run_is_fatal() {
    // frame 1 loses its LCW end marker
    let mut buf = bytes(TWO_FRAMES);
    buf.pop();
    buf[18] = 40;
    assert!(matches!(decode_slice(&buf),Err(Error::UnexpectedEnd)));
}

#[test]
fn inconsistent_offsets_are_fatal() {
    // frame 1 would start before frame 0
    let mut buf = bytes(TWO_FRAMES);
    buf[14] = 0x10;
    assert!(matches!(decode_slice(&buf),Err(Error::BadOffsetTable(_))));
    // frame 0 would start inside the table
    let mut buf = bytes(TWO_FRAMES);
    buf[10] = 0x0a;
    assert!(matches!(decode_slice(&buf),Err(Error::BadOffsetTable(_))));
}

#[test]
fn oversized_tiles_rejected() {
    let buf = bytes(TWO_FRAMES);
    let loader = WsaLoader { opt: Options { max_frame_bytes: 15, max_total_bytes: 1 << 28, lcw: lcw::STD_OPTIONS } };
    assert!(matches!(loader.try_parse_sprite(&mut Cursor::new(&buf)),Err(Error::FrameTooLarge(16))));
}

#[test]
fn oversized_animation_rejected() {
    // 2000 frames of 4096x4096, each a valid run that patches nothing
    let frame_count: u32 = 2000;
    let data_start = 10 + 4 * (frame_count + 1);
    let mut buf = [
        u16::to_le_bytes(frame_count as u16).to_vec(),
        u16::to_le_bytes(4096).to_vec(),
        u16::to_le_bytes(4096).to_vec(),
        u32::to_le_bytes(0).to_vec()
    ].concat();
    for i in 0..=frame_count {
        buf.extend_from_slice(&u32::to_le_bytes(data_start + 5 * i));
    }
    for _i in 0..frame_count {
        buf.extend_from_slice(&[0x83,0x80,0x00,0x00,0x80]);
    }
    assert_eq!(buf.len(),18014);
    match decode_slice(&buf) {
        Err(Error::AnimationTooLarge(n)) => assert_eq!(n,2000 << 24),
        _ => panic!("expected animation size error")
    }
    // the limit is checked before the offset table, so an empty table still hits it
    let header = Header { frame_count: u16::MAX, tile_width: u16::MAX, tile_height: u16::MAX, delta: 0 };
    let table = OffsetTable { offsets: Vec::new(), data_start: 0 };
    let opt = Options { max_frame_bytes: usize::MAX, ..STD_OPTIONS };
    assert!(matches!(build(&mut Cursor::new(Vec::<u8>::new()),&header,&table,&opt),Err(Error::AnimationTooLarge(_))));
}
