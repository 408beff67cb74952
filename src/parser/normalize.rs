/// Turns raw pipe chunks into meaningful lines.
///
/// yt-dlp redraws its progress line with `\r`, so of every line only the text
/// after the last carriage return counts. A redraw is emitted as soon as it
/// arrives; text with neither `\r` nor `\n` before it is held back until a
/// terminator proves it complete.
#[derive(Debug, Default)]
pub struct LineNormalizer {
    pending: Vec<u8>,
    /// `pending` follows a `\r`, i.e. it is a live redraw
    redraw: bool,
    /// Redraw text already emitted from `pending`
    shown: Option<String>,
}

impl LineNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let held = self.pending.len();
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();

        let tail_start = match self.pending.iter().rposition(|&b| b == b'\n') {
            Some(newline) => {
                let shown = self.shown.take();
                for (i, line) in self.pending[..newline].split(|&b| b == b'\n').enumerate() {
                    let text = meaningful(last_overwrite(line));
                    // The first line may just terminate a redraw emitted earlier
                    if i == 0 && text.is_some() && text == shown {
                        continue;
                    }
                    lines.extend(text);
                }
                self.redraw = false;
                newline + 1
            }
            None => 0,
        };

        let keep_from = match self.pending[tail_start..].iter().rposition(|&b| b == b'\r') {
            Some(cr) => {
                let end = tail_start + cr;
                let start = self.pending[tail_start..end]
                    .iter()
                    .rposition(|&b| b == b'\r')
                    .map_or(tail_start, |prev| tail_start + prev + 1);
                // Redraws overwritten within this same chunk are skipped; a
                // segment carried over from earlier, or ended by a trailing
                // `\r` (split CRLF), still counts
                if start < held || end + 1 == self.pending.len() {
                    let before = meaningful(&self.pending[start..end]);
                    if before.is_some() && before != self.shown {
                        lines.extend(before);
                    }
                }
                self.shown = None;
                self.redraw = true;
                tail_start + cr + 1
            }
            None => tail_start,
        };
        self.pending.drain(..keep_from);

        if self.redraw {
            // A redraw split inside a UTF-8 sequence waits for the rest
            if let Ok(text) = std::str::from_utf8(&self.pending) {
                let text = text.trim();
                if !text.is_empty() && self.shown.as_deref() != Some(text) {
                    lines.push(text.to_string());
                    self.shown = Some(text.to_string());
                }
            }
        }

        lines
    }

    /// Flushes whatever is left once the stream has closed.
    pub fn finish(&mut self) -> Option<String> {
        let shown = self.shown.take();
        self.redraw = false;
        let text = meaningful(last_overwrite(&self.pending));
        self.pending.clear();
        text.filter(|text| Some(text) != shown.as_ref())
    }
}

fn last_overwrite(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    match line.iter().rposition(|&b| b == b'\r') {
        Some(cr) => &line[cr + 1..],
        None => line,
    }
}

fn meaningful(segment: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(segment);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
