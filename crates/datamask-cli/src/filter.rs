//! `filter-lines`: keep the header lines plus every line containing an
//! expression. Lines are compared as bytes so non-UTF-8 input passes through.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

/// Copy `header_lines` lines, then only the lines containing `expr`.
/// Returns the number of matching lines written after the header.
pub fn filter_lines<R: BufRead, W: Write>(
    expr: &str,
    header_lines: usize,
    mut input: R,
    mut output: W,
) -> io::Result<usize> {
    let needle = expr.as_bytes();
    let mut line = Vec::new();
    let mut index = 0usize;
    let mut matched = 0usize;
    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if index < header_lines {
            output.write_all(&line)?;
        } else if contains(&line, needle) {
            output.write_all(&line)?;
            matched += 1;
        }
        index += 1;
    }
    output.flush()?;
    Ok(matched)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

/// `-` stands for stdin / stdout.
pub fn run(expr: &str, header_lines: usize, infile: &str, outfile: &str) -> io::Result<usize> {
    let input: Box<dyn BufRead> = if infile == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(File::open(infile)?))
    };
    let output: Box<dyn Write> = if outfile == "-" {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(File::create(outfile)?))
    };
    filter_lines(expr, header_lines, input, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(expr: &str, header_lines: usize, input: &[u8]) -> (usize, Vec<u8>) {
        let mut out = Vec::new();
        let matched = filter_lines(expr, header_lines, input, &mut out).unwrap();
        (matched, out)
    }

    #[test]
    fn keeps_header_and_matching_lines() {
        let (matched, out) = filter("Oslo", 1, b"name;city\nAnn;Oslo\nBob;Bergen\nCid;Oslo");
        assert_eq!(matched, 2);
        assert_eq!(out, b"name;city\nAnn;Oslo\nCid;Oslo");
    }

    #[test]
    fn header_lines_are_kept_even_without_match() {
        let (matched, out) = filter("zzz", 2, b"a\nb\nc\n");
        assert_eq!(matched, 0);
        assert_eq!(out, b"a\nb\n");
    }

    #[test]
    fn works_on_non_utf8_bytes() {
        let (matched, out) = filter("x", 0, b"\xff x\n\xfe y\n");
        assert_eq!(matched, 1);
        assert_eq!(out, b"\xff x\n");
    }
}
