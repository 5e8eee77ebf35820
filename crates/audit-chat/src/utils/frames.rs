//! Newline-delimited frame decoder.

/// Incremental decoder that accepts body chunks and yields complete lines.
///
/// Bytes are buffered until a `\n` arrives, so a UTF-8 sequence split across
/// two chunks is decoded only once it is whole.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed a body chunk and return every frame it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if !line.is_empty() {
                frames.push(String::from_utf8_lossy(line).into_owned());
            }
        }

        frames
    }

    /// Flush the trailing partial line when the body ends.
    pub fn finish(self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.buffer).into_owned())
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
