//! Escape sequences in string literals.
//!
//! Literals arrive from the parser still escaped. They are decoded exactly
//! once, before interning, and re-escaped only when written out as an
//! `.ascii` directive.

/// Decode `\0 \b \n \f \r \" \' \\`. Unknown escapes are kept verbatim.
pub fn decode(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  let mut chars = raw.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('0') => out.push('\0'),
      Some('b') => out.push('\u{8}'),
      Some('n') => out.push('\n'),
      Some('f') => out.push('\u{c}'),
      Some('r') => out.push('\r'),
      Some('"') => out.push('"'),
      Some('\'') => out.push('\''),
      Some('\\') => out.push('\\'),
      Some(other) => {
        out.push('\\');
        out.push(other);
      }
      None => out.push('\\'),
    }
  }
  out
}

/// Escape decoded text for a quoted assembler string.
pub fn encode(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '\0' => out.push_str("\\0"),
      '\u{8}' => out.push_str("\\b"),
      '\n' => out.push_str("\\n"),
      '\u{c}' => out.push_str("\\f"),
      '\r' => out.push_str("\\r"),
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      other => out.push(other),
    }
  }
  out
}
