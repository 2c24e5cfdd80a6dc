use std::io::{self, BufRead};

/// Iterator over the entity lines of a Wikidata JSON export: one object
/// per line inside an outer array. Bracket, comma and blank lines are
/// skipped; trailing separators are trimmed from each entity line.
pub struct EntityLines<B> {
    reader: B,
    lines_read: u64,
}

impl<B: BufRead> EntityLines<B> {
    pub fn new(reader: B) -> Self {
        EntityLines {
            reader,
            lines_read: 0,
        }
    }

    /// Total lines consumed, including skipped framing lines.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

impl<B: BufRead> Iterator for EntityLines<B> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    self.lines_read += 1;
                    let trimmed = line.trim().trim_end_matches(',');
                    if !trimmed.starts_with('{') {
                        continue;
                    }
                    return Some(Ok(trimmed.to_owned()));
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_skips_array_framing() {
        let dump = "[\n{\"id\":\"Q1\"},\n{\"id\":\"Q2\"},\n\n]\n";
        let lines: Vec<String> = EntityLines::new(dump.as_bytes())
            .collect::<io::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(lines, vec!["{\"id\":\"Q1\"}", "{\"id\":\"Q2\"}"]);
    }

    #[test]
    fn test_counts_all_lines() {
        let dump = "[\n{\"id\":\"Q1\"}\n]\n";
        let mut stream = EntityLines::new(dump.as_bytes());
        while stream.next().is_some() {}
        assert_eq!(stream.lines_read(), 3);
    }
}
