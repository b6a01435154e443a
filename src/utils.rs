use crate::error::Result;
use base64::Engine;
use std::{env, path::Path};

pub(crate) fn format_bytes(bytesval: usize, precision: usize) -> String {
    let mut val = bytesval as f32;

    for unit in ["bytes", "KiB", "MiB", "GiB", "TiB"] {
        if val < 1024.0 {
            return format!("{:.precision$} {}", val, unit, precision = precision);
        }

        val /= 1024.0;
    }

    format!("{:.precision$}", bytesval, precision = precision)
}

pub(crate) fn decode_base64<T: AsRef<[u8]>>(input: T) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(input)
        .map_err(|x| crate::error::Error::Parse(format!("invalid base64 data ({})", x)))
}

/// Strips filesystem reserved characters so a catalog title can be used as an
/// output file name.
pub(crate) fn sanitize_filename(title: &str) -> String {
    let mut filename = title
        .chars()
        .map(|x| match x {
            '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>' | ';' | '=' => '_',
            _ => x,
        })
        .collect::<String>()
        .trim()
        .to_owned();

    if filename.len() > 128 {
        let mut end = 128;

        while !filename.is_char_boundary(end) {
            end -= 1;
        }

        filename.truncate(end);
    }

    filename
}

pub(crate) fn find_executable(bin: &str) -> Option<String> {
    let bin = if cfg!(target_os = "windows") {
        format!("{}.exe", bin)
    } else {
        bin.to_owned()
    };

    if Path::new(&bin).exists() {
        return Some(bin);
    }

    env::var("PATH")
        .ok()?
        .split(if cfg!(target_os = "windows") {
            ';'
        } else {
            ':'
        })
        .find_map(|s| {
            let x = Path::new(s).join(&bin);

            if x.exists() {
                Some(x.to_string_lossy().into_owned())
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_titles_keep_word_characters() {
        assert_eq!(
            sanitize_filename("The Last Voyage: Part 2/3"),
            "The Last Voyage_ Part 2_3"
        );
    }

    #[test]
    fn sanitized_titles_are_bounded() {
        let long = "x".repeat(300);
        assert_eq!(sanitize_filename(&long).len(), 128);
    }
}
