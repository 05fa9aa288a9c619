use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

// Two 4x4 frames with a leading loop entry in the offset table.
// Frame 0 is rows of 1 and 2 over a blank frame, frame 1 changes byte 9 to 7.
const LOOP_ENTRY: &str = "03 00 04 00 04 00 2A 00 00 00
    00 00 00 00 1A 00 00 00 25 00 00 00 2D 00 00 00
    89 00 04 01 00 04 02 80 00 00 80
    86 89 01 07 80 00 00 80";

fn write_hex(temp_dir: &tempfile::TempDir,name: &str,hex_str: &str) -> Result<PathBuf,Box<dyn std::error::Error>> {
    let path = temp_dir.path().join(name);
    std::fs::write(&path,hex::decode(hex_str.split_whitespace().collect::<String>())?)?;
    Ok(path)
}

fn expected_frames() -> Vec<u8> {
    let f0 = vec![1,1,1,1,2,2,2,2,0,0,0,0,0,0,0,0];
    let mut f1 = f0.clone();
    f1[9] = 7;
    [f0,f1].concat()
}

#[test]
fn wsa_info() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = write_hex(&temp_dir,"anim.wsa",LOOP_ENTRY)?;
    Command::cargo_bin("retrowsa")?
        .arg("info")
        .arg("-i").arg(&in_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("frames: 2"))
        .stdout(predicate::str::contains("size: 4x4"))
        .stdout(predicate::str::contains("delta: 42"))
        .stdout(predicate::str::contains("offsets: [26, 37, 45]"));
    Ok(())
}

#[test]
fn wsa_expansion() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = write_hex(&temp_dir,"anim.wsa",LOOP_ENTRY)?;
    let out_path = temp_dir.path().join("anim.raw");
    Command::cargo_bin("retrowsa")?
        .arg("expand")
        .arg("-m").arg("wsa")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("expanded 45 into 32"));
    assert_eq!(std::fs::read(out_path)?,expected_frames());
    Ok(())
}

#[test]
fn wsa_single_frame() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = write_hex(&temp_dir,"anim.wsa",LOOP_ENTRY)?;
    let out_path = temp_dir.path().join("frame1.raw");
    Command::cargo_bin("retrowsa")?
        .arg("expand")
        .arg("-m").arg("wsa")
        .arg("-f").arg("1")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success();
    assert_eq!(std::fs::read(out_path)?,expected_frames()[16..].to_vec());
    let out_path = temp_dir.path().join("frame2.raw");
    Command::cargo_bin("retrowsa")?
        .arg("expand")
        .arg("-m").arg("wsa")
        .arg("-f").arg("2")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .failure();
    assert!(!out_path.exists());
    Ok(())
}

#[test]
fn not_wsa() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("short.bin");
    std::fs::write(&in_path,b"WSA?")?;
    Command::cargo_bin("retrowsa")?
        .arg("info")
        .arg("-i").arg(&in_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("FileFormatMismatch"));
    Ok(())
}

#[test]
fn corrupt_wsa() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    // first command of frame 0 refers back before the start of output
    let in_path = write_hex(&temp_dir,"bad.wsa",&LOOP_ENTRY.replacen("89 00 04","00 05 04",1))?;
    let out_path = temp_dir.path().join("bad.raw");
    Command::cargo_bin("retrowsa")?
        .arg("expand")
        .arg("-m").arg("wsa")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("BadCommand"));
    assert!(!out_path.exists());
    Ok(())
}

#[test]
fn lcw_expansion() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = write_hex(&temp_dir,"data.lcw","83 61 62 63 20 03 FE 04 00 21 80")?;
    let out_path = temp_dir.path().join("data.bin");
    Command::cargo_bin("retrowsa")?
        .arg("expand")
        .arg("-m").arg("lcw")
        .arg("-s").arg("64")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success();
    assert_eq!(std::fs::read(out_path)?,b"abcabcab!!!!".to_vec());
    Ok(())
}

#[test]
fn lcw_relative_expansion() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = write_hex(&temp_dir,"data.lcw","83 78 79 7A C0 03 00 80")?;
    let out_path = temp_dir.path().join("data.bin");
    Command::cargo_bin("retrowsa")?
        .arg("expand")
        .arg("-m").arg("lcw-relative")
        .arg("-s").arg("6")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success();
    assert_eq!(std::fs::read(out_path)?,b"xyzxyz".to_vec());
    Ok(())
}

#[test]
fn lcw_needs_size() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = write_hex(&temp_dir,"data.lcw","81 61 80")?;
    Command::cargo_bin("retrowsa")?
        .arg("expand")
        .arg("-m").arg("lcw")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(temp_dir.path().join("data.bin"))
        .assert()
        .failure();
    Ok(())
}
