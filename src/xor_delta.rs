//! XOR Delta Patching
//!
//! Format40 stores the difference between two images as a sparse patch.  The
//! destination already holds the previous image, and the patch either skips over
//! bytes that do not change or XORs new values into the ones that do.
//!
//! * `0ccccccc` - XOR the next `ccccccc` patch bytes into the destination
//! * `00000000 count value` - XOR `value` into `count` bytes
//! * `1ccccccc` - skip `ccccccc` bytes
//! * `10000000 word` - long command, selected by the top bits of `word`:
//!   * `0` - end of patch
//!   * `0xxxxxxx xxxxxxxx` - skip
//!   * `10xxxxxx xxxxxxxx` - XOR the next `x` patch bytes
//!   * `11xxxxxx xxxxxxxx value` - XOR `value` into `x` bytes
//!
//! Bytes after the last command are left as they were.

use crate::tools::byte_reader::ByteReader;
use crate::Error;

/// Make sure the cursor can move `count` bytes forward
fn check_capacity(dest: &[u8],dest_pos: usize,count: usize) -> Result<(),Error> {
    if dest_pos + count > dest.len() {
        log::error!("XOR delta command needs {} bytes at {}, capacity is {}",count,dest_pos,dest.len());
        return Err(Error::CapacityExceeded { needed: dest_pos + count, capacity: dest.len() });
    }
    Ok(())
}

fn xor_bytes(dest: &mut [u8],vals: &[u8]) {
    for (d,v) in dest.iter_mut().zip(vals) {
        *d ^= v;
    }
}

fn xor_fill(dest: &mut [u8],val: u8) {
    for d in dest.iter_mut() {
        *d ^= val;
    }
}

/// Apply `patch` to `dest` in place.  Returns the cursor position when the end
/// command was reached.  The patch must end with the end command, and no command
/// may move the cursor past the end of `dest`.  Capacity is checked before writing,
/// but earlier commands will already have been applied when an error is returned.
pub fn apply(patch: &[u8],dest: &mut [u8]) -> Result<usize,Error> {
    let mut reader = ByteReader::create(patch);
    let mut dest_pos: usize = 0;
    loop {
        let cmd = reader.read_u8()?;
        let short_count = (cmd & 0x7f) as usize;
        if cmd & 0x80 == 0 {
            if short_count == 0 {
                let count = reader.read_u8()? as usize;
                let val = reader.read_u8()?;
                check_capacity(dest,dest_pos,count)?;
                xor_fill(&mut dest[dest_pos..dest_pos+count],val);
                dest_pos += count;
            } else {
                check_capacity(dest,dest_pos,short_count)?;
                xor_bytes(&mut dest[dest_pos..dest_pos+short_count],reader.read_slice(short_count)?);
                dest_pos += short_count;
            }
        } else if short_count > 0 {
            check_capacity(dest,dest_pos,short_count)?;
            dest_pos += short_count;
        } else {
            let word = reader.read_u16()? as usize;
            let count = word & 0x3fff;
            if word == 0 {
                log::trace!("end of patch at {}",dest_pos);
                return Ok(dest_pos);
            } else if word & 0x8000 == 0 {
                check_capacity(dest,dest_pos,word)?;
                dest_pos += word;
            } else if word & 0x4000 == 0 {
                check_capacity(dest,dest_pos,count)?;
                xor_bytes(&mut dest[dest_pos..dest_pos+count],reader.read_slice(count)?);
                dest_pos += count;
            } else {
                let val = reader.read_u8()?;
                check_capacity(dest,dest_pos,count)?;
                xor_fill(&mut dest[dest_pos..dest_pos+count],val);
                dest_pos += count;
            }
        }
    }
}

// *************** TESTS *****************

#[cfg(test)]
fn patched(prev: &[u8],hex_str: &str) -> Result<Vec<u8>,Error> {
    let mut ans = prev.to_vec();
    apply(&hex::decode(hex_str.replace(" ","")).unwrap(),&mut ans)?;
    Ok(ans)
}

#[test]
fn skip_then_xor_one() {
    let prev = [10,20,30,40,50];
    let ans = patched(&prev,"82 01 0F 80 00 00").expect("patch failed");
    assert_eq!(ans,vec![10,20,30^0x0f,40,50]);
}

#[test]
fn end_marker_leaves_tail() {
    let prev = [7;8];
    assert_eq!(patched(&prev,"80 00 00").unwrap(),prev.to_vec());
    let mut dest = prev;
    let pos = apply(&hex::decode("0201028000000303").unwrap(),&mut dest).expect("patch failed");
    assert_eq!(pos,2);
    assert_eq!(dest,[6,5,7,7,7,7,7,7]);
}

#[test]
fn short_fill() {
    let ans = patched(&[0;6],"81 00 03 55 80 00 00").expect("patch failed");
    assert_eq!(ans,vec![0,0x55,0x55,0x55,0,0]);
}

#[test]
fn long_commands() {
    // long skip 3, long literal 2, long fill 2 of 0xaa
    let ans = patched(&[0x0f;8],"80 03 00 80 02 80 F0 01 80 02 C0 AA 80 00 00").expect("patch failed");
    assert_eq!(ans,vec![0x0f,0x0f,0x0f,0xff,0x0e,0xa5,0xa5,0x0f]);
}

#[test]
fn xor_is_its_own_inverse() {
    let prev = b"westwood".to_vec();
    let patch = hex::decode("0401020304 00 04 99 800000".replace(" ","")).unwrap();
    let mut dest = prev.clone();
    apply(&patch,&mut dest).expect("patch failed");
    assert_ne!(dest,prev);
    apply(&patch,&mut dest).expect("patch failed");
    assert_eq!(dest,prev);
}

#[test]
fn missing_end_marker() {
    assert!(matches!(patched(&[0;4],"82 01 0F"),Err(Error::UnexpectedEnd)));
    assert!(matches!(patched(&[0;4],"03 01 02"),Err(Error::UnexpectedEnd)));
    assert!(matches!(patched(&[0;4],"80 00"),Err(Error::UnexpectedEnd)));
    assert!(matches!(patched(&[0;4],""),Err(Error::UnexpectedEnd)));
}

#[test]
fn overrun_rejected() {
    // skipping exactly to the end is fine
    assert!(patched(&[0;4],"84 80 00 00").is_ok());
    assert!(matches!(patched(&[0;4],"85 80 00 00"),Err(Error::CapacityExceeded { needed: 5, capacity: 4 })));
    assert!(matches!(patched(&[0;4],"83 02 01 01 80 00 00"),Err(Error::CapacityExceeded { .. })));
    assert!(matches!(patched(&[0;4],"00 05 01 80 00 00"),Err(Error::CapacityExceeded { .. })));
    assert!(matches!(patched(&[0;4],"80 FF 7F 80 00 00"),Err(Error::CapacityExceeded { .. })));
    assert!(matches!(patched(&[0;4],"80 05 C0 01 80 00 00"),Err(Error::CapacityExceeded { .. })));
}
