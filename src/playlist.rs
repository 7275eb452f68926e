use std::path::Path;

use tracing::{debug, instrument};

use crate::error::{Error, Result};

pub const HEADER: &str = "#EXTM3U";
pub const ENTRY_MARKER: &str = "#EXTINF";

/// A single channel: its `#EXTINF` line and the stream URL that follows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub metadata: String,
    pub url: String,
}

impl PlaylistEntry {
    pub fn new(metadata: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            metadata: metadata.into(),
            url: url.into(),
        }
    }

    /// Display name of the channel, the text after the last comma of the metadata line
    #[must_use]
    pub fn channel_name(&self) -> &str {
        self.metadata
            .rsplit_once(',')
            .map_or(self.metadata.as_str(), |(_, name)| name)
            .trim()
    }
}

/// Parses playlist text into its entries, in document order.
///
/// Lines that are not part of an `#EXTINF` / URL pair are ignored, and so is
/// a trailing `#EXTINF` line with nothing after it.
#[must_use]
pub fn parse(content: &str) -> Vec<PlaylistEntry> {
    let mut entries = Vec::new();
    let mut lines = lines(content).map(str::trim);

    while let Some(line) = lines.next() {
        if !line.starts_with(ENTRY_MARKER) {
            continue;
        }

        match lines.next() {
            Some(url) if !url.is_empty() => entries.push(PlaylistEntry::new(line, url)),
            Some(_) => debug!("Dropping channel without stream URL: {line}"),
            None => debug!("Dropping dangling channel at end of playlist: {line}"),
        }
    }

    entries
}

/// Splits on `\n`, `\r\n` and a lone `\r`
fn lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .split('\n')
        .flat_map(|line| line.strip_suffix('\r').unwrap_or(line).split('\r'))
}

/// Serializes entries back into playlist text, header first
#[must_use]
pub fn render(entries: &[PlaylistEntry]) -> String {
    let mut out = String::with_capacity(
        HEADER.len() + 1 + entries.iter().map(|e| e.metadata.len() + e.url.len() + 2).sum::<usize>(),
    );
    out.push_str(HEADER);
    out.push('\n');
    for entry in entries {
        out.push_str(&entry.metadata);
        out.push('\n');
        out.push_str(&entry.url);
        out.push('\n');
    }
    out
}

/// Writes the rendered playlist to `path`, replacing any existing file
///
/// # Errors
/// [`Error::DestinationUnwritable`] when the file cannot be written
#[instrument(skip(entries), fields(entries = entries.len()))]
pub async fn save(path: &Path, entries: &[PlaylistEntry]) -> Result<()> {
    tokio::fs::write(path, render(entries))
        .await
        .map_err(|source| Error::DestinationUnwritable {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_and_skips_noise() {
        let content = "#EXTM3U\n\n# a comment\n#EXTINF:-1 tvg-id=\"a\",Channel A\n  http://a/stream  \n\n#EXTINF:-1,Channel B\r\nhttp://b/stream\r\n";

        assert_eq!(
            parse(content),
            vec![
                PlaylistEntry::new("#EXTINF:-1 tvg-id=\"a\",Channel A", "http://a/stream"),
                PlaylistEntry::new("#EXTINF:-1,Channel B", "http://b/stream"),
            ]
        );
    }

    #[test]
    fn accepts_carriage_return_line_endings() {
        let expected = vec![
            PlaylistEntry::new("#EXTINF:-1,A", "http://a"),
            PlaylistEntry::new("#EXTINF:-1,B", "http://b"),
        ];

        assert_eq!(
            parse("#EXTM3U\r#EXTINF:-1,A\rhttp://a\r#EXTINF:-1,B\rhttp://b\r"),
            expected
        );
        assert_eq!(
            parse("#EXTM3U\r\n#EXTINF:-1,A\r\nhttp://a\n#EXTINF:-1,B\rhttp://b"),
            expected
        );
    }

    #[test]
    fn drops_dangling_metadata() {
        let content = "#EXTM3U\n#EXTINF:-1,A\nhttp://a\n#EXTINF:-1,B";
        assert_eq!(parse(content), vec![PlaylistEntry::new("#EXTINF:-1,A", "http://a")]);
    }

    #[test]
    fn drops_metadata_followed_by_blank_line() {
        let content = "#EXTINF:-1,A\n\nhttp://orphan\n#EXTINF:-1,B\nhttp://b\n";
        assert_eq!(parse(content), vec![PlaylistEntry::new("#EXTINF:-1,B", "http://b")]);
    }

    #[test]
    fn empty_input_has_no_entries() {
        assert!(parse("").is_empty());
        assert!(parse("#EXTM3U\n").is_empty());
    }

    #[test]
    fn channel_name_is_after_last_comma() {
        assert_eq!(
            PlaylistEntry::new("#EXTINF:-1 group-title=\"News, World\", BBC World ", "u").channel_name(),
            "BBC World"
        );
        assert_eq!(PlaylistEntry::new("  #EXTINF:-1  ", "u").channel_name(), "#EXTINF:-1");
        assert_eq!(PlaylistEntry::new("#EXTINF:-1,", "u").channel_name(), "");
    }

    #[test]
    fn render_then_parse_gives_back_the_entries() {
        let entries = vec![
            PlaylistEntry::new("#EXTINF:-1,Zeta", "http://z"),
            PlaylistEntry::new("#EXTINF:0 tvg-logo=\"x.png\",Alpha", "https://a/live.m3u8?token=1"),
            PlaylistEntry::new("#EXTINF:-1,Zeta", "http://z"),
        ];

        let text = render(&entries);
        assert!(text.starts_with("#EXTM3U\n"));
        assert_eq!(parse(&text), entries);
    }

    #[test]
    fn render_empty_is_header_only() {
        assert_eq!(render(&[]), "#EXTM3U\n");
    }

    #[tokio::test]
    async fn save_writes_rendered_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.m3u");
        let entries = vec![PlaylistEntry::new("#EXTINF:-1,A", "http://a")];

        save(&path, &entries).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "#EXTM3U\n#EXTINF:-1,A\nhttp://a\n");
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.m3u");

        let err = save(&path, &[]).await.unwrap_err();
        assert!(matches!(err, Error::DestinationUnwritable { .. }));
    }
}
