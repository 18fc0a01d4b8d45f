//! Minimal bencode decoder
//!
//! Decodes borrowed values and keeps the raw bytes each value was parsed
//! from, which is what the info hash is computed over.

use thiserror::Error;

/// Nesting limit for lists and dictionaries
const MAX_DEPTH: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BencodeError {
    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("unexpected byte 0x{byte:02x} at offset {pos}")]
    UnexpectedByte { byte: u8, pos: usize },

    #[error("invalid integer at offset {0}")]
    InvalidInteger(usize),

    #[error("invalid string length at offset {0}")]
    InvalidLength(usize),

    #[error("dictionary key is not a string at offset {0}")]
    NonStringKey(usize),

    #[error("trailing data at offset {0}")]
    TrailingData(usize),

    #[error("nesting deeper than {} levels", MAX_DEPTH)]
    TooDeep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'a> {
    Int(i64),
    Bytes(&'a [u8]),
    List(Vec<Node<'a>>),
    Dict(Vec<(&'a [u8], Node<'a>)>),
}

/// A decoded value plus the exact bytes it was decoded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node<'a> {
    pub value: Value<'a>,
    pub raw: &'a [u8],
}

impl<'a> Node<'a> {
    /// Dictionary lookup; `None` for missing keys and non-dictionaries
    pub fn get(&self, key: &str) -> Option<&Node<'a>> {
        match &self.value {
            Value::Dict(entries) => entries
                .iter()
                .find(|(k, _)| *k == key.as_bytes())
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.value {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self.value {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[Node<'a>]> {
        match &self.value {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_dict(&self) -> bool {
        matches!(self.value, Value::Dict(_))
    }
}

/// Decode exactly one value spanning all of `input`
pub fn decode(input: &[u8]) -> Result<Node<'_>, BencodeError> {
    let mut decoder = Decoder { input, pos: 0 };
    let node = decoder.node(0)?;
    if decoder.pos != input.len() {
        return Err(BencodeError::TrailingData(decoder.pos));
    }
    Ok(node)
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Result<u8, BencodeError> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::UnexpectedEof)
    }

    fn node(&mut self, depth: usize) -> Result<Node<'a>, BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::TooDeep);
        }

        let start = self.pos;
        let value = match self.peek()? {
            b'i' => Value::Int(self.int()?),
            b'l' => Value::List(self.list(depth)?),
            b'd' => Value::Dict(self.dict(depth)?),
            b'0'..=b'9' => Value::Bytes(self.bytes()?),
            byte => return Err(BencodeError::UnexpectedByte { byte, pos: start }),
        };

        Ok(Node {
            value,
            raw: &self.input[start..self.pos],
        })
    }

    fn int(&mut self) -> Result<i64, BencodeError> {
        let start = self.pos;
        self.pos += 1; // 'i'

        let end = self.input[self.pos..]
            .iter()
            .position(|&b| b == b'e')
            .map(|offset| self.pos + offset)
            .ok_or(BencodeError::UnexpectedEof)?;
        let digits = &self.input[self.pos..end];

        let (negative, magnitude) = match digits.split_first() {
            Some((b'-', rest)) => (true, rest),
            _ => (false, digits),
        };
        let canonical = !magnitude.is_empty()
            && magnitude.iter().all(u8::is_ascii_digit)
            && !(magnitude.len() > 1 && magnitude[0] == b'0')
            && !(negative && magnitude == b"0");
        if !canonical {
            return Err(BencodeError::InvalidInteger(start));
        }

        let value = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(BencodeError::InvalidInteger(start))?;

        self.pos = end + 1;
        Ok(value)
    }

    fn bytes(&mut self) -> Result<&'a [u8], BencodeError> {
        let start = self.pos;
        let colon = self.input[self.pos..]
            .iter()
            .position(|&b| b == b':')
            .map(|offset| self.pos + offset)
            .ok_or(BencodeError::UnexpectedEof)?;

        let digits = &self.input[self.pos..colon];
        if digits.is_empty()
            || !digits.iter().all(u8::is_ascii_digit)
            || (digits.len() > 1 && digits[0] == b'0')
        {
            return Err(BencodeError::InvalidLength(start));
        }
        let len = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or(BencodeError::InvalidLength(start))?;

        let body_start = colon + 1;
        let body_end = body_start
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or(BencodeError::UnexpectedEof)?;

        self.pos = body_end;
        Ok(&self.input[body_start..body_end])
    }

    fn list(&mut self, depth: usize) -> Result<Vec<Node<'a>>, BencodeError> {
        self.pos += 1; // 'l'
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.node(depth + 1)?);
        }
        self.pos += 1;
        Ok(items)
    }

    fn dict(&mut self, depth: usize) -> Result<Vec<(&'a [u8], Node<'a>)>, BencodeError> {
        self.pos += 1; // 'd'
        let mut entries = Vec::new();
        while self.peek()? != b'e' {
            if !self.peek()?.is_ascii_digit() {
                return Err(BencodeError::NonStringKey(self.pos));
            }
            let key = self.bytes()?;
            let value = self.node(depth + 1)?;
            entries.push((key, value));
        }
        self.pos += 1;
        Ok(entries)
    }
}
