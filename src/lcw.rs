//! LCW Decompression
//!
//! LCW, also known as format80, is the LZ/RLE hybrid used by Westwood for
//! images and animation frames.  The stream is a sequence of commands, each
//! one selected by the high bits of its first byte:
//!
//! * `0cccpppp pppppppp` - copy `ccc+3` bytes from `pppppppppppp` bytes back in the output
//! * `10cccccc` - copy `cccccc` literal bytes from the input, `0x80` alone ends the stream
//! * `11cccccc word` - copy `cccccc+3` bytes from output position `word`
//! * `0xfe word byte` - write `byte` `word` times
//! * `0xff word word` - copy first `word` bytes from output position second `word`
//!
//! Words are little endian.  The output capacity is fixed by the caller, decoding
//! stops at the end command, or as soon as the output is exactly full.
//! Back references may overlap the write cursor, so they are copied byte by byte.

use crate::tools::byte_reader::ByteReader;
use crate::Error;

const END_OF_STREAM: u8 = 0x80;
const LONG_FILL: usize = 0x3e;
const LONG_COPY: usize = 0x3f;

/// Options controlling expansion
#[derive(Clone)]
pub struct Options {
    /// The source word of the `11cccccc` and `0xff` commands is a distance
    /// back from the write cursor rather than an absolute output position.
    pub relative: bool
}

pub const STD_OPTIONS: Options = Options {
    relative: false
};

/// Make sure `count` more bytes fit at `dest_pos`
fn check_capacity(dest: &[u8],dest_pos: usize,count: usize) -> Result<(),Error> {
    if dest_pos + count > dest.len() {
        log::error!("LCW command needs {} bytes at {}, capacity is {}",count,dest_pos,dest.len());
        return Err(Error::CapacityExceeded { needed: dest_pos + count, capacity: dest.len() });
    }
    Ok(())
}

/// Copy from earlier in the output, the ranges can overlap
fn copy_previous(dest: &mut [u8],dest_pos: usize,src_pos: usize,count: usize) {
    if dest_pos - src_pos == 1 {
        let val = dest[src_pos];
        dest[dest_pos..dest_pos+count].fill(val);
    } else {
        for i in 0..count {
            dest[dest_pos+i] = dest[src_pos+i];
        }
    }
}

/// Expand the LCW stream `src` into `dest`, whose length is the output capacity.
/// Returns the number of bytes written.  Fails if the input ends before
/// the stream does, if a back reference is out of range, or if a command would
/// overrun `dest`, in which case `dest` is left partly written.
pub fn expand(src: &[u8],dest: &mut [u8],opt: &Options) -> Result<usize,Error> {
    let mut reader = ByteReader::create(src);
    let mut dest_pos: usize = 0;
    while dest_pos < dest.len() {
        let cmd_pos = reader.pos();
        let cmd = reader.read_u8()?;
        if cmd & 0x80 == 0 {
            let count = ((cmd as usize & 0x70) >> 4) + 3;
            let dist = ((cmd as usize & 0x0f) << 8) + reader.read_u8()? as usize;
            log::trace!("relative copy {} from -{}",count,dist);
            if dist == 0 || dist > dest_pos {
                log::error!("LCW back reference to -{} at output {}",dist,dest_pos);
                return Err(Error::BadCommand { cmd, pos: cmd_pos });
            }
            check_capacity(dest,dest_pos,count)?;
            copy_previous(dest,dest_pos,dest_pos - dist,count);
            dest_pos += count;
        } else if cmd & 0x40 == 0 {
            if cmd == END_OF_STREAM {
                log::trace!("end of stream at {}",cmd_pos);
                break;
            }
            let count = cmd as usize & 0x3f;
            check_capacity(dest,dest_pos,count)?;
            dest[dest_pos..dest_pos+count].copy_from_slice(reader.read_slice(count)?);
            dest_pos += count;
        } else if cmd as usize & 0x3f == LONG_FILL {
            let count = reader.read_u16()? as usize;
            let val = reader.read_u8()?;
            log::trace!("fill {} with {}",count,val);
            check_capacity(dest,dest_pos,count)?;
            dest[dest_pos..dest_pos+count].fill(val);
            dest_pos += count;
        } else {
            let count = match cmd as usize & 0x3f {
                LONG_COPY => reader.read_u16()? as usize,
                short => short + 3
            };
            let word = reader.read_u16()? as usize;
            let src_pos = match opt.relative {
                true => dest_pos.checked_sub(word),
                false => Some(word)
            };
            log::trace!("copy {} from {:?}",count,src_pos);
            let src_pos = match src_pos {
                Some(p) if p < dest_pos => p,
                _ => {
                    log::error!("LCW copy source {} not behind output {}",word,dest_pos);
                    return Err(Error::BadCommand { cmd, pos: cmd_pos });
                }
            };
            check_capacity(dest,dest_pos,count)?;
            copy_previous(dest,dest_pos,src_pos,count);
            dest_pos += count;
        }
    }
    Ok(dest_pos)
}

/// Convenience function, calls `expand` with a buffer of `capacity` bytes,
/// returning only the bytes that were written.
pub fn expand_slice(src: &[u8],capacity: usize,opt: &Options) -> Result<Vec<u8>,Error> {
    let mut ans = vec![0;capacity];
    let len = expand(src,&mut ans,opt)?;
    ans.truncate(len);
    Ok(ans)
}

// *************** TESTS *****************

#[cfg(test)]
fn lcw(hex_str: &str,capacity: usize) -> Result<Vec<u8>,Error> {
    expand_slice(&hex::decode(hex_str.replace(" ","")).unwrap(),capacity,&STD_OPTIONS)
}

#[test]
fn literals() {
    let expanded = lcw("8B 49 20 61 6D 20 53 61 6D 2E 0A 20 80",64).expect("expansion failed");
    assert_eq!(expanded,"I am Sam.\n ".as_bytes());
    // literal copy of zero length is the end marker even if data follows
    let expanded = lcw("82 41 42 80 83 43 44 45",64).expect("expansion failed");
    assert_eq!(expanded,b"AB");
}

#[test]
fn relative_back_reference() {
    // `abc` then copy 5 from 3 back, overlapping the cursor
    let expanded = lcw("83 61 62 63 20 03 80",64).expect("expansion failed");
    assert_eq!(expanded,b"abcabcab");
    // distance 1 is a run of the previous byte
    let expanded = lcw("81 7A 70 01 80",64).expect("expansion failed");
    assert_eq!(expanded,b"zzzzzzzzzzz");
}

#[test]
fn absolute_back_reference() {
    let expanded = lcw("83 78 79 7A C0 00 00 C1 01 00 80",64).expect("expansion failed");
    assert_eq!(expanded,b"xyzxyzyzxy");
    // long form with explicit count
    let expanded = lcw("82 71 72 FF 05 00 00 00 80",64).expect("expansion failed");
    assert_eq!(expanded,b"qrqrqrq");
}

#[test]
fn relative_mode() {
    let opt = Options { relative: true };
    let src = hex::decode("83 78 79 7A C0 03 00 FF 04 00 01 00 80".replace(" ","")).unwrap();
    let expanded = expand_slice(&src,64,&opt).expect("expansion failed");
    assert_eq!(expanded,b"xyzxyzzzzz");
    // as an absolute position the first source word points at the cursor
    assert!(matches!(expand_slice(&src,64,&STD_OPTIONS),Err(Error::BadCommand { cmd: 0xc0, pos: 4 })));
}

#[test]
fn long_fill() {
    let expanded = lcw("FE 10 00 AB 80",16).expect("expansion failed");
    assert_eq!(expanded,vec![0xab;16]);
    let expanded = lcw("FE 00 00 AB 81 01 80",16).expect("expansion failed");
    assert_eq!(expanded,vec![1]);
}

#[test]
fn stops_when_full() {
    // no end marker needed when the capacity is reached
    let expanded = lcw("83 61 62 63",3).expect("expansion failed");
    assert_eq!(expanded,b"abc");
    let expanded = lcw("FE 20 00 00 83 61 62 63",32).expect("expansion failed");
    assert_eq!(expanded,vec![0;32]);
}

#[test]
fn truncated_input() {
    assert!(matches!(lcw("85 61 62",64),Err(Error::UnexpectedEnd)));
    assert!(matches!(lcw("83 61 62 63",64),Err(Error::UnexpectedEnd)));
    assert!(matches!(lcw("FE 10",64),Err(Error::UnexpectedEnd)));
    assert!(matches!(lcw("",64),Err(Error::UnexpectedEnd)));
}

#[test]
fn bad_back_reference() {
    assert!(matches!(lcw("00 05 80",64),Err(Error::BadCommand { cmd: 0, pos: 0 })));
    assert!(matches!(lcw("81 61 00 00 80",64),Err(Error::BadCommand { cmd: 0, pos: 2 })));
    // absolute source must be behind the cursor
    assert!(matches!(lcw("82 61 62 C0 02 00 80",64),Err(Error::BadCommand { cmd: 0xc0, pos: 3 })));
}

#[test]
fn capacity_checked_before_write() {
    let mut dest = [0u8;4];
    let src = hex::decode("82 61 62 FE 08 00 55 80".replace(" ","")).unwrap();
    match expand(&src,&mut dest,&STD_OPTIONS) {
        Err(Error::CapacityExceeded { needed, capacity }) => {
            assert_eq!(needed,10);
            assert_eq!(capacity,4);
        },
        _ => panic!("expected capacity error")
    }
    // the fill was rejected, nothing after the literals was written
    assert_eq!(dest,[0x61,0x62,0,0]);
    assert!(matches!(lcw("85 01 02 03 04 05 80",4),Err(Error::CapacityExceeded { .. })));
    assert!(matches!(lcw("82 01 02 50 02 80",4),Err(Error::CapacityExceeded { .. })));
}
