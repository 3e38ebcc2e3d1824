use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};

use log::error;

use super::FindError;

pub type KeyValues = BTreeMap<String, String>;

/// Parses `key: value` lines, every one of `keys` must be present.
pub fn read(input: impl Read, keys: &[&str]) -> Result<KeyValues, FindError> {
    let mut kv = BTreeMap::new();

    for line in BufReader::new(input).lines() {
        let line = line.map_err(|e| {
            error!("couldn't read line: {e}");
            FindError::Internal
        })?;

        let (k, v) = line.split_once(':').ok_or_else(|| {
            error!("invalid line, can't split");
            FindError::Internal
        })?;

        let Some(v) = v.strip_prefix(' ') else {
            error!("invalid line - no whitespace after colon");
            return Err(FindError::Internal);
        };
        kv.insert(k.into(), v.into());
    }

    if let Some(missing) = keys.iter().find(|k| !kv.contains_key(**k)) {
        error!("missing key \"{missing}\"");
        return Err(FindError::Internal);
    }

    Ok(kv)
}

pub fn write(mut output: impl Write, keyvalues: &KeyValues) -> Result<(), std::io::Error> {
    for (k, v) in keyvalues {
        writeln!(output, "{}: {}", k, v)?;
    }
    output.flush()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_back_what_was_written() {
        let mut kv = KeyValues::new();
        kv.insert("id".into(), "3".into());
        kv.insert("pwhash".into(), "$2b$04$abc: with colon".into());

        let mut out = vec![];
        write(&mut out, &kv).unwrap();
        assert_eq!(
            std::str::from_utf8(&out).unwrap(),
            "id: 3\npwhash: $2b$04$abc: with colon\n"
        );

        let back = read(&out[..], &["id", "pwhash"]).unwrap();
        assert_eq!(back, kv);
    }

    #[test]
    fn missing_key() {
        let input = "id: 1\n";
        assert!(matches!(
            read(input.as_bytes(), &["id", "pwhash"]),
            Err(FindError::Internal)
        ));
    }

    #[test]
    fn malformed_lines() {
        assert!(read("id 1\n".as_bytes(), &[]).is_err());
        assert!(read("id:1\n".as_bytes(), &[]).is_err());
    }
}
