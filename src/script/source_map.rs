/// Maps byte offsets in a script to line/column positions.
pub struct SourceMap {
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.bytes().enumerate().filter(|&(_, b)| b == b'\n').map(|(i, _)| i + 1));
        SourceMap { line_starts }
    }

    /// Returns (line, col), both 1-based.
    pub fn lookup(&self, offset: usize) -> (usize, usize) {
        let line = self.line_index(offset);
        (line + 1, offset.saturating_sub(self.line_starts[line]) + 1)
    }

    /// 0-based line containing `offset`.
    pub fn line_index(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        }
    }

    /// Text of the 1-based `line`, without its line ending.
    pub fn line_text<'a>(&self, source: &'a str, line: usize) -> &'a str {
        if line == 0 || line > self.line_starts.len() {
            return "";
        }
        let start = self.line_starts[line - 1];
        let end = self.line_starts.get(line).copied().unwrap_or(source.len());
        source[start..end].trim_end_matches('\n').trim_end_matches('\r')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "begin Main\n  nr 5\n  echo 1\nend";

    #[test]
    fn lookup_positions() {
        let sm = SourceMap::new(SCRIPT);
        assert_eq!(sm.lookup(0), (1, 1));
        assert_eq!(sm.lookup(10), (1, 11)); // the newline belongs to line 1
        assert_eq!(sm.lookup(13), (2, 3)); // 'n' of "nr"
        assert_eq!(sm.lookup(SCRIPT.len() - 1), (4, 3));
    }

    #[test]
    fn line_index_is_zero_based() {
        let sm = SourceMap::new(SCRIPT);
        assert_eq!(sm.line_index(0), 0);
        assert_eq!(sm.line_index(13), 1);
        assert_eq!(sm.line_index(20), 2);
    }

    #[test]
    fn line_text_trims_endings() {
        let src = "first\r\nsecond\n";
        let sm = SourceMap::new(src);
        assert_eq!(sm.line_text(src, 1), "first");
        assert_eq!(sm.line_text(src, 2), "second");
        assert_eq!(sm.line_text(src, 3), "");
        assert_eq!(sm.line_text(src, 0), "");
        assert_eq!(sm.line_text(src, 9), "");
    }

    #[test]
    fn empty_source() {
        let sm = SourceMap::new("");
        assert_eq!(sm.lookup(0), (1, 1));
        assert_eq!(sm.line_text("", 1), "");
    }
}
