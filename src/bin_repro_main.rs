use std::io::Cursor;
use fastar::fasta::FASTAFile;

fn main() {
    let raw = ">seq1 desc>with>brackets\nAC>GT\n>seq2\nGGCC\n";
    let mut compressed = Vec::new();
    fastar::bgzf::compress(&mut Cursor::new(raw.as_bytes()), &mut compressed).unwrap();
    eprintln!("compressed len {}", compressed.len());

    let file = FASTAFile::from_stream(Cursor::new(compressed), None, None).unwrap();
    eprintln!("compression {:?}", file.compression());
    let mut it = file.iter().unwrap();
    for i in 0..5 {
        eprintln!("calling next {i}");
        match it.next() {
            Some(Ok(r)) => eprintln!("got record {}", r.id()),
            Some(Err(e)) => { eprintln!("err {:?}", e); break; }
            None => { eprintln!("done"); break; }
        }
    }
}
