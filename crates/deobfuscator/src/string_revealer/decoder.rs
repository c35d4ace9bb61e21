use base64::alphabet::Alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

/// Obfuscated strings are base64 encoded with the lower case letters first, the alphabet the
/// wrapper embeds and `BASE64_WRAPPER` looks for.
const ALPHABET: Alphabet =
  match Alphabet::new("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789+/") {
    Ok(alphabet) => alphabet,
    Err(_) => panic!("invalid base64 alphabet"),
  };

const ENGINE: GeneralPurpose = GeneralPurpose::new(
  &ALPHABET,
  GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_allow_trailing_bits(true)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderKind {
  Basic,
  Base64,
  Rc4,
}

/// Reads entries of a string table the way one of its wrapper functions does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringDecoder {
  pub kind: DecoderKind,
  /// Added to the index a wrapper is called with, e.g. `-419` for `index = index - 0x1a3`
  pub offset: i64,
}

impl StringDecoder {
  pub fn new(kind: DecoderKind, offset: i64) -> Self {
    StringDecoder { kind, offset }
  }

  /// The string `wrapper(index, key)` returns for the current order of `table`.
  pub fn decode(&self, table: &[String], index: f64, key: Option<&str>) -> Option<String> {
    if index.fract() != 0.0 || !index.is_finite() {
      return None;
    }
    let position = (index as i64)
      .checked_add(self.offset)
      .and_then(|position| usize::try_from(position).ok())?;
    let encoded = table.get(position)?;

    match self.kind {
      DecoderKind::Basic => Some(encoded.clone()),
      DecoderKind::Base64 => base64_decode(encoded).map(utf8_or_latin1),
      DecoderKind::Rc4 => {
        let key = key?;
        let bytes = base64_decode(encoded)?;
        rc4(&bytes, key).map(utf8_or_latin1)
      }
    }
  }
}

/// Characters outside of the alphabet are ignored.
fn base64_decode(encoded: &str) -> Option<Vec<u8>> {
  let filtered: String = encoded
    .chars()
    .filter(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '/')
    .collect();
  ENGINE.decode(filtered).ok()
}

/// RC4 with the UTF-16 code units of `key` as the key schedule.
fn rc4(data: &[u8], key: &str) -> Option<Vec<u8>> {
  let key: Vec<u16> = key.encode_utf16().collect();
  if key.is_empty() {
    return None;
  }

  let mut state: [u8; 256] = std::array::from_fn(|i| i as u8);
  let mut j: usize = 0;
  for i in 0..256 {
    j = (j + state[i] as usize + key[i % key.len()] as usize) % 256;
    state.swap(i, j);
  }

  let mut i: usize = 0;
  j = 0;
  Some(
    data
      .iter()
      .map(|byte| {
        i = (i + 1) % 256;
        j = (j + state[i] as usize) % 256;
        state.swap(i, j);
        byte ^ state[(state[i] as usize + state[j] as usize) % 256]
      })
      .collect(),
  )
}

/// Bytes that are not valid UTF-8 are read one character per byte.
fn utf8_or_latin1(bytes: Vec<u8>) -> String {
  String::from_utf8(bytes)
    .unwrap_or_else(|error| error.into_bytes().into_iter().map(char::from).collect())
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn table(strings: &[&str]) -> Vec<String> {
    strings.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn test_basic() {
    let decoder = StringDecoder::new(DecoderKind::Basic, 0);
    let strings = table(&["foo", "bar"]);
    assert_eq!(decoder.decode(&strings, 1.0, None), Some("bar".into()));
    assert_eq!(decoder.decode(&strings, 5.0, None), None);
    assert_eq!(decoder.decode(&strings, 0.5, None), None);
  }

  #[test]
  fn test_basic_offset() {
    let decoder = StringDecoder::new(DecoderKind::Basic, -0x1a3);
    let strings = table(&["foo", "bar"]);
    assert_eq!(decoder.decode(&strings, 0x1a4 as f64, None), Some("bar".into()));
    assert_eq!(decoder.decode(&strings, 0.0, None), None);
  }

  #[test]
  fn test_out_of_range_index() {
    let decoder = StringDecoder::new(DecoderKind::Basic, 1);
    let strings = table(&["foo", "bar"]);
    assert_eq!(decoder.decode(&strings, 0.0, None), Some("bar".into()));
    assert_eq!(decoder.decode(&strings, 1e19, None), None);
    assert_eq!(decoder.decode(&strings, -1e19, None), None);
  }

  #[test]
  fn test_base64() {
    let decoder = StringDecoder::new(DecoderKind::Base64, 0);
    let strings = table(&["Bg9N", "sgvSBg8SifDVCMXKiq==", "AmoPBgXV", "/0e="]);
    assert_eq!(decoder.decode(&strings, 0.0, None), Some("log".into()));
    assert_eq!(
      decoder.decode(&strings, 1.0, None),
      Some("Hello, World!".into())
    );
    assert_eq!(decoder.decode(&strings, 2.0, None), Some("héllo".into()));
    assert_eq!(decoder.decode(&strings, 3.0, None), Some("\u{ff}A".into()));
  }

  #[test]
  fn test_rc4() {
    let decoder = StringDecoder::new(DecoderKind::Rc4, 0);
    let strings = table(&["TClD", "NGWRlUHSdWHH5vHCtW==", "y6+DGuJG"]);
    assert_eq!(decoder.decode(&strings, 0.0, Some("Xk9a")), Some("log".into()));
    assert_eq!(
      decoder.decode(&strings, 1.0, Some("abcd")),
      Some("Hello, World!".into())
    );
    assert_eq!(decoder.decode(&strings, 2.0, Some("key")), Some("héllo".into()));
    assert_eq!(decoder.decode(&strings, 0.0, None), None);
    assert_eq!(decoder.decode(&strings, 0.0, Some("")), None);
  }
}
