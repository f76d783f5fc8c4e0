//! Reader for the script-literal payloads the generator writes.
//!
//! Shards are JavaScript assignments (`var searchData = [...];`) whose values
//! use single-quoted strings, so they are not JSON. This reader accepts the
//! small literal subset the generator uses (arrays, objects, strings, numbers,
//! `true`/`false`/`null`, trailing commas, line comments) and produces a
//! [`serde_json::Value`] for the typed parse step. Plain JSON is a subset and
//! parses unchanged.

use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at byte {offset}")]
pub(crate) struct LiteralError {
    pub(crate) offset: usize,
    pub(crate) message: String,
}

/// Parse a whole payload: an optional `var <name> =` prefix, one literal value,
/// and an optional trailing `;`.
pub(crate) fn parse_script(text: &str) -> Result<Value, LiteralError> {
    let mut reader = Reader::new(text);
    reader.skip_trivia();
    reader.skip_assignment();
    let value = reader.value()?;
    reader.skip_trivia();
    if reader.peek() == Some(b';') {
        reader.pos += 1;
        reader.skip_trivia();
    }
    if reader.pos < reader.src.len() {
        return Err(reader.error("unexpected trailing content"));
    }
    Ok(value)
}

/// Parse a sequence of `var <name> = <value>;` statements into a name → value map.
pub(crate) fn parse_assignments(text: &str) -> Result<Map<String, Value>, LiteralError> {
    let mut reader = Reader::new(text);
    let mut vars = Map::new();
    loop {
        reader.skip_trivia();
        if reader.pos >= reader.src.len() {
            return Ok(vars);
        }
        let Some(name) = reader.skip_assignment() else {
            return Err(reader.error("expected variable assignment"));
        };
        let value = reader.value()?;
        reader.skip_trivia();
        if reader.peek() == Some(b';') {
            reader.pos += 1;
        }
        vars.insert(name.to_string(), value);
    }
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();
            if trimmed.starts_with("//") {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else {
                break;
            }
        }
    }

    /// Skip `var name =` / `let name =` / `const name =` if present and
    /// return the variable name.
    fn skip_assignment(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let after_kw = ["var ", "let ", "const "]
            .iter()
            .find_map(|kw| rest.strip_prefix(kw))?;
        let eq = after_kw.find('=')?;
        let name = after_kw[..eq].trim();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            return None;
        }
        self.pos += (rest.len() - after_kw.len()) + eq + 1;
        self.skip_trivia();
        Some(name)
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_trivia();
        match self.peek() {
            Some(b'[') => self.array(),
            Some(b'{') => self.object(),
            Some(b'\'' | b'"') => self.string().map(Value::String),
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(_) => self.keyword(),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn array(&mut self) -> Result<Value, LiteralError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                None => return Err(self.error("unterminated array")),
                _ => {}
            }
            items.push(self.value()?);
            self.skip_trivia();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {}
                None => return Err(self.error("unterminated array")),
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn object(&mut self) -> Result<Value, LiteralError> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            let key = match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                Some(b'\'' | b'"') => self.string()?,
                Some(c) if c.is_ascii_alphanumeric() || c == b'_' => self.bare_word().to_string(),
                _ => return Err(self.error("expected object key")),
            };
            self.skip_trivia();
            if self.peek() != Some(b':') {
                return Err(self.error("expected ':'"));
            }
            self.pos += 1;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_trivia();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let Some(quote @ (b'\'' | b'"')) = self.peek() else {
            return Err(self.error("expected string"));
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            let rest = self.rest();
            let Some(offset) = rest.find(|c: char| c == quote as char || c == '\\') else {
                return Err(self.error("unterminated string"));
            };
            out.push_str(&rest[..offset]);
            self.pos += offset;
            if self.peek() == Some(quote) {
                self.pos += 1;
                return Ok(out);
            }
            self.pos += 1;
            let escaped = self.rest().chars().next();
            match escaped {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('b') => out.push('\u{8}'),
                Some('f') => out.push('\u{c}'),
                Some('0') => out.push('\0'),
                Some('u') => {
                    self.pos += 1;
                    out.push(self.unicode_escape()?);
                    continue;
                }
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated escape")),
            }
            self.pos += escaped.map_or(0, char::len_utf8);
        }
    }

    fn unicode_escape(&mut self) -> Result<char, LiteralError> {
        let high = self.hex4()?;
        if (0xD800..0xDC00).contains(&high) && self.rest().starts_with("\\u") {
            self.pos += 2;
            let low = self.hex4()?;
            let combined = 0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
            return char::from_u32(combined).ok_or_else(|| self.error("invalid surrogate pair"));
        }
        char::from_u32(high).ok_or_else(|| self.error("invalid unicode escape"))
    }

    fn hex4(&mut self) -> Result<u32, LiteralError> {
        let digits = self
            .rest()
            .get(..4)
            .ok_or_else(|| self.error("truncated unicode escape"))?;
        let value =
            u32::from_str_radix(digits, 16).map_err(|_| self.error("invalid unicode escape"))?;
        self.pos += 4;
        Ok(value)
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')))
            .unwrap_or(rest.len());
        let text = &rest[..len];
        let number = if let Ok(int) = text.parse::<i64>() {
            Number::from(int)
        } else {
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .ok_or_else(|| self.error(format!("invalid number '{}'", text)))?
        };
        self.pos += len;
        Ok(Value::Number(number))
    }

    fn bare_word(&mut self) -> &'a str {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn keyword(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        match self.bare_word() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" | "undefined" => Ok(Value::Null),
            _ => {
                self.pos = start;
                Err(self.error("unexpected token"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{check, let_assert};
    use serde_json::json;

    #[test]
    fn parses_generator_assignment() {
        let text = "var searchData=\n[\n  ['top_3',['top',['../a.html#x',1,'singlepp::TrainSingleOptions']]],\n];\n";
        let_assert!(Ok(value) = parse_script(text));
        check!(
            value
                == json!([["top_3", ["top", ["../a.html#x", 1, "singlepp::TrainSingleOptions"]]]])
        );
    }

    #[test]
    fn accepts_plain_json() {
        let_assert!(Ok(value) = parse_script(r#"[["a_0", ["a", ["x.html", 1, ""]]]]"#));
        check!(value == json!([["a_0", ["a", ["x.html", 1, ""]]]]));
    }

    #[test]
    fn decodes_escapes() {
        let_assert!(Ok(value) = parse_script(r"['it\'s', 'a\\b', 'é', 'x\ny']"));
        check!(value == json!(["it's", "a\\b", "é", "x\ny"]));
    }

    #[test]
    fn parses_objects_with_bare_keys() {
        let_assert!(Ok(value) = parse_script("{ 0: \"_abc\", 1: 'all', } // trailing"));
        check!(value == json!({"0": "_abc", "1": "all"}));
    }

    #[test]
    fn reports_errors_with_offsets() {
        let_assert!(Err(err) = parse_script("[['a_0', ['a']"));
        check!(err.message == "unterminated array");
        let_assert!(Err(err) = parse_script("['a'] extra"));
        check!(err.message == "unexpected trailing content");
        check!(err.offset == 6);
        let_assert!(Err(_) = parse_script("['unterminated]"));
        let_assert!(Err(_) = parse_script(""));
    }

    #[test]
    fn parses_assignment_sequences() {
        let text = "var a =\n{\n  0: \"_ab}\",\n};\n\nvar b = { 0: 'all' };\n";
        let_assert!(Ok(vars) = parse_assignments(text));
        check!(vars.get("a") == Some(&json!({"0": "_ab}"})));
        check!(vars.get("b") == Some(&json!({"0": "all"})));
        let_assert!(Err(err) = parse_assignments("var a = 1; oops"));
        check!(err.message == "expected variable assignment");
    }
}
