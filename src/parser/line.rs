//! Splits the raw document into ordered lines and classifies each one.

pub(crate) const HEADER: &str = "#EXTM3U";

#[derive(Debug, PartialEq)]
pub(crate) enum Line<'a> {
    Blank,
    /// A `#`-prefixed directive. `value` is everything after the first
    /// colon; bare directives have none.
    Directive {
        tag: &'a str,
        value: Option<&'a str>,
    },
    Text(&'a str),
}

pub(crate) struct Lines<'a> {
    lines: Vec<&'a str>,
    cursor: usize,
}

impl<'a> Lines<'a> {
    pub fn new(input: &'a str) -> Self {
        // Strip one trailing \r per line up front so CRLF input never leaks
        // a stray control character into a tag value or title.
        let lines = input
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect();
        Self { lines, cursor: 0 }
    }

    /// 1-based number of the most recently taken line. After the input is
    /// exhausted this is the number of the final line.
    pub fn current_line(&self) -> usize {
        self.cursor
    }

    pub fn next(&mut self) -> Option<Line<'a>> {
        self.next_raw().map(classify)
    }

    /// The next physical line, verbatim. Used for the two-line `#EXTINF`
    /// title form, which consumes the following line without classifying it.
    pub fn next_raw(&mut self) -> Option<&'a str> {
        let line = self.lines.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(line)
    }
}

fn classify(raw: &str) -> Line<'_> {
    if raw.is_empty() {
        Line::Blank
    } else if raw.starts_with('#') {
        match raw.split_once(':') {
            Some((tag, value)) => Line::Directive {
                tag,
                value: Some(value),
            },
            None => Line::Directive {
                tag: raw,
                value: None,
            },
        }
    } else {
        Line::Text(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), Line::Blank);
        assert_eq!(
            classify("#EXT-X-VERSION:3"),
            Line::Directive {
                tag: "#EXT-X-VERSION",
                value: Some("3"),
            }
        );
        assert_eq!(
            classify("#EXT-X-ENDLIST"),
            Line::Directive {
                tag: "#EXT-X-ENDLIST",
                value: None,
            }
        );
        assert_eq!(classify("segment-title"), Line::Text("segment-title"));
    }

    #[test]
    fn test_value_keeps_later_colons() {
        assert_eq!(
            classify("#EXT-X-PROGRAM-DATE-TIME:2010-02-19T14:54:23Z"),
            Line::Directive {
                tag: "#EXT-X-PROGRAM-DATE-TIME",
                value: Some("2010-02-19T14:54:23Z"),
            }
        );
    }

    #[test]
    fn test_crlf_normalization() {
        let mut lines = Lines::new("#EXTM3U\r\n#EXT-X-VERSION:3\r\n");
        assert_eq!(
            lines.next(),
            Some(Line::Directive {
                tag: HEADER,
                value: None,
            })
        );
        assert_eq!(
            lines.next(),
            Some(Line::Directive {
                tag: "#EXT-X-VERSION",
                value: Some("3"),
            })
        );
        assert_eq!(lines.next(), Some(Line::Blank));
        assert_eq!(lines.next(), None);
        assert_eq!(lines.current_line(), 3);
    }

    #[test]
    fn test_raw_line_is_verbatim() {
        let mut lines = Lines::new("#EXTINF:9.5,\n#not a tag, a title");
        lines.next();
        assert_eq!(lines.next_raw(), Some("#not a tag, a title"));
    }
}
