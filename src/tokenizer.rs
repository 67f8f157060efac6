use std::io::{self, BufRead};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A parameter name or value. Unquoted text is folded to lowercase.
    Word(String),
    /// The `##` marker separating the configuration from the data block.
    EndOfConfig,
    /// The stream ended before any character of a word was read.
    Empty,
}

/// Splits an LCONF stream into words, one character at a time.
///
/// The tokenizer never reads past the characters that make up the word it
/// returns (plus any comment it discards), so after [`Token::EndOfConfig`]
/// the underlying reader sits right behind the `##` marker and can be handed
/// over to the data loader with [`Tokenizer::into_inner`].
pub struct Tokenizer<R> {
    reader: R,
}

impl<R: BufRead> Tokenizer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next word from the stream.
    pub fn next_word(&mut self) -> io::Result<Token> {
        let mut word = String::new();
        let mut quoted = false;

        while let Some(c) = self.read_char()? {
            match c {
                // A closing quote always ends the word, even an empty one
                '"' if quoted => return Ok(Token::Word(word)),
                '"' => quoted = true,
                '#' if !quoted => {
                    match self.read_char()? {
                        Some('#') => return Ok(Token::EndOfConfig),
                        Some('\n') | None => {}
                        Some(_) => self.discard_line()?,
                    }
                    // The comment started in the middle of a word
                    if !word.is_empty() {
                        return Ok(Token::Word(word));
                    }
                }
                ' ' | '\t' | '\n' | '\r' if !quoted => {
                    if !word.is_empty() {
                        return Ok(Token::Word(word));
                    }
                }
                c if quoted => word.push(c),
                c => word.extend(c.to_lowercase()),
            }
        }

        if word.is_empty() {
            Ok(Token::Empty)
        } else {
            Ok(Token::Word(word))
        }
    }

    fn discard_line(&mut self) -> io::Result<()> {
        let mut skipped = Vec::new();
        self.reader.read_until(b'\n', &mut skipped)?;
        log::trace!("Skipped comment: {}", String::from_utf8_lossy(&skipped).trim_end());
        Ok(())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = match self.reader.fill_buf()?.first() {
            Some(&byte) => byte,
            None => return Ok(None),
        };
        self.reader.consume(1);
        Ok(Some(byte))
    }

    fn read_char(&mut self) -> io::Result<Option<char>> {
        let Some(first) = self.read_byte()? else {
            return Ok(None);
        };

        let width = match first {
            0x00..=0x7F => return Ok(Some(char::from(first))),
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return Err(invalid_utf8()),
        };

        let mut buffer = [first, 0, 0, 0];
        for slot in buffer.iter_mut().take(width).skip(1) {
            *slot = self.read_byte()?.ok_or_else(invalid_utf8)?;
        }

        std::str::from_utf8(&buffer[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .map(Some)
            .ok_or_else(invalid_utf8)
    }
}

fn invalid_utf8() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "stream is not valid UTF-8")
}
