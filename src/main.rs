use clap::{arg,crate_version,Command};
use std::io::Write;
use retrowsa::{lcw,wsa,SpriteFrame,SpriteLoader};
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const RCH: &str = "unreachable was reached";

fn ok_to_overwrite(path_out: &str) -> bool {
    if let Ok(_f) = std::fs::File::open(path_out) {
        let mut ans = String::new();
        eprint!("{} exists, overwrite? (y/n) ",path_out);
        std::io::stdin().read_line(&mut ans).expect("could not read stdin");
        if ans.trim_end()=="y" || ans.trim_end()=="Y" {
            return true;
        }
        return false;
    }
    true
}

fn info(path_in: &str) -> STDRESULT {
    let mut in_file = std::fs::File::open(path_in)?;
    let len = in_file.metadata()?.len();
    match wsa::sniff(&mut in_file) {
        Some((header,table)) => {
            println!("frames: {}",header.frame_count);
            println!("size: {}x{}",header.tile_width,header.tile_height);
            println!("delta: {}",header.delta);
            println!("offsets: {:?}",table.offsets);
            println!("length: {}",len);
            Ok(())
        },
        None => Err(Box::new(retrowsa::Error::FileFormatMismatch))
    }
}

/// Returns (in_size,expanded)
fn expand_wsa(path_in: &str,frame: Option<usize>) -> Result<(u64,Vec<u8>),Box<dyn std::error::Error>> {
    let mut in_file = std::fs::File::open(path_in)?;
    let in_size = in_file.metadata()?.len();
    let frames = match wsa::WsaLoader::default().try_parse_sprite(&mut in_file)? {
        Some(frames) => frames,
        None => return Err(Box::new(retrowsa::Error::FileFormatMismatch))
    };
    if let Some(idx) = frame {
        if idx >= frames.len() {
            eprintln!("frame {} requested, but there are only {}",idx,frames.len());
            return Err(Box::new(std::fmt::Error));
        }
    }
    let mut ans = Vec::new();
    for f in frames.iter().filter(|f| frame.is_none() || frame==Some(f.index())) {
        ans.extend_from_slice(f.data());
    }
    Ok((in_size,ans))
}

/// Returns (in_size,expanded)
fn expand_lcw(path_in: &str,capacity: usize,opt: &lcw::Options) -> Result<(u64,Vec<u8>),Box<dyn std::error::Error>> {
    let compressed = std::fs::read(path_in)?;
    let expanded = lcw::expand_slice(&compressed,capacity,opt)?;
    Ok((compressed.len() as u64,expanded))
}

fn main() -> STDRESULT
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let long_help =
"Examples:
---------
Header:        `retrowsa info -i intro.wsa`
All frames:    `retrowsa expand -m wsa -i intro.wsa -o intro.raw`
One frame:     `retrowsa expand -m wsa -f 3 -i intro.wsa -o frame3.raw`
Raw LCW:       `retrowsa expand -m lcw -s 64000 -i screen.lcw -o screen.raw`";

    let methods = ["wsa","lcw","lcw-relative"];

    let mut main_cmd = Command::new("retrowsa")
        .about("Expand Westwood WSA animations and LCW data")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(Command::new("info")
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .about("show the WSA header and offset table"));

    main_cmd = main_cmd.subcommand(Command::new("expand")
        .arg(arg!(-m --method <METHOD> "decompression algorithm").value_parser(methods)
            .required(true))
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-o --output <PATH> "output path").required(true))
        .arg(arg!(-s --size <BYTES> "output capacity, required for LCW").value_parser(clap::value_parser!(usize))
            .required(false))
        .arg(arg!(-f --frame <INDEX> "only write this WSA frame").value_parser(clap::value_parser!(usize))
            .required(false))
        .about("expand a file, WSA frames are written as raw palette indices"));

    let matches = main_cmd.get_matches();

    if let Some(cmd) = matches.subcommand_matches("info") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        return info(path_in);
    }

    if let Some(cmd) = matches.subcommand_matches("expand") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let path_out = cmd.get_one::<String>("output").expect(RCH);
        let method = cmd.get_one::<String>("method").expect(RCH);
        let size = cmd.get_one::<usize>("size").copied();
        let frame = cmd.get_one::<usize>("frame").copied();
        if method.starts_with("lcw") && size.is_none() {
            eprintln!("{} needs --size",method);
            return Err(Box::new(std::fmt::Error));
        }
        if !ok_to_overwrite(path_out) {
            eprintln!("abort operation");
            return Ok(());
        }
        // output is only created once decoding succeeds
        let (in_size,expanded) = match (method.as_str(),size) {
            ("wsa",_) => expand_wsa(path_in,frame)?,
            ("lcw",Some(cap)) => expand_lcw(path_in,cap,&lcw::STD_OPTIONS)?,
            ("lcw-relative",Some(cap)) => expand_lcw(path_in,cap,&lcw::Options { relative: true })?,
            _ => {
                eprintln!("{} not supported",method);
                return Err(Box::new(std::fmt::Error));
            }
        };
        let mut out_file = std::fs::OpenOptions::new().write(true).truncate(true).create(true).open(path_out)?;
        out_file.write_all(&expanded)?;
        eprintln!("expanded {} into {}",in_size,expanded.len());
    }

    Ok(())
}
