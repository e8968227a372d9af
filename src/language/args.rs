//! Sandboxed invocation-argument scanning.
//!
//! Arguments are deliberately restricted to integer literals and bare
//! identifiers naming declared symbols, parsed by a hand-rolled scanner.
//! Nothing here evaluates anything: a program
//! downloaded from the control panel can never smuggle an expression in
//! through an argument list.

/// One scanned argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// An integer literal like `12`.
    Integer(i64),
    /// A bare identifier like `A`, resolved against declared symbols later.
    Symbol(String),
}

/// A scanned argument list: positional values then `name=value` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallArgs {
    /// Positional arguments, in source order.
    pub positional: Vec<ArgValue>,
    /// Named arguments, in source order.
    pub named: Vec<(String, ArgValue)>,
}

impl CallArgs {
    /// Look up a named argument.
    pub fn named_value(&self, name: &str) -> Option<&ArgValue> {
        self.named
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// Scan a raw argument list, parentheses included, e.g. `(A, to=12, speed=1)`.
///
/// Returns a message (no line number; the caller owns that) when the list
/// is not well formed: unbalanced parentheses, stray tokens, a positional
/// argument after a named one, or a duplicated name.
pub fn parse_call_args(raw: &str) -> Result<CallArgs, String> {
    let mut scanner = Scanner::new(raw);
    scanner.skip_spaces();
    if !scanner.eat(b'(') {
        return Err("Invalid arguments".to_string());
    }

    let mut args = CallArgs::default();
    scanner.skip_spaces();
    if scanner.eat(b')') {
        return finish(scanner, args);
    }

    loop {
        scanner.skip_spaces();
        match scanner.current() {
            Some(ch) if ch.is_ascii_digit() => {
                if !args.named.is_empty() {
                    return Err("Positional argument after named argument".to_string());
                }
                args.positional.push(ArgValue::Integer(scanner.scan_integer()?));
            }
            Some(ch) if is_ident_start(ch) => {
                let name = scanner.scan_identifier();
                scanner.skip_spaces();
                if scanner.eat(b'=') {
                    scanner.skip_spaces();
                    if args.named_value(&name).is_some() {
                        return Err(format!("Duplicate argument \"{name}\""));
                    }
                    let value = scanner.scan_value()?;
                    args.named.push((name, value));
                } else {
                    if !args.named.is_empty() {
                        return Err("Positional argument after named argument".to_string());
                    }
                    args.positional.push(ArgValue::Symbol(name));
                }
            }
            _ => return Err("Invalid arguments".to_string()),
        }

        scanner.skip_spaces();
        if scanner.eat(b',') {
            continue;
        }
        if scanner.eat(b')') {
            return finish(scanner, args);
        }
        return Err("Invalid arguments".to_string());
    }
}

fn finish(mut scanner: Scanner<'_>, args: CallArgs) -> Result<CallArgs, String> {
    scanner.skip_spaces();
    if scanner.eof() {
        Ok(args)
    } else {
        Err("Invalid arguments".to_string())
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

struct Scanner<'a> {
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Scanner<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            bytes: raw.as_bytes(),
            index: 0,
        }
    }

    fn eof(&self) -> bool {
        self.index >= self.bytes.len()
    }

    fn current(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn advance(&mut self) {
        if self.index < self.bytes.len() {
            self.index += 1;
        }
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.current() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_spaces(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_ascii_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn scan_value(&mut self) -> Result<ArgValue, String> {
        match self.current() {
            Some(ch) if ch.is_ascii_digit() => Ok(ArgValue::Integer(self.scan_integer()?)),
            Some(ch) if is_ident_start(ch) => Ok(ArgValue::Symbol(self.scan_identifier())),
            _ => Err("Invalid arguments".to_string()),
        }
    }

    fn scan_identifier(&mut self) -> String {
        let start = self.index;
        while let Some(ch) = self.current() {
            if is_ident_char(ch) {
                self.advance();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.bytes[start..self.index]).into_owned()
    }

    fn scan_integer(&mut self) -> Result<i64, String> {
        let start = self.index;
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
        std::str::from_utf8(&self.bytes[start..self.index])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| "Invalid arguments".to_string())
    }
}
