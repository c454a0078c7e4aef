//! Text normalization applied to inbound messages before they are relayed.
//!
//! Everything protocol-specific about message *text* lives here, so the
//! router only decides where a message goes.

use regex::Regex;

/// Compiled patterns for IRC formatting, Gitter uploads and status notices.
#[derive(Debug, Clone)]
pub struct MessageTransformer {
    irc_formatting: Regex,
    gitter_thumbnail: Regex,
    gitter_attachment: Regex,
    status_allow: Regex,
}

impl MessageTransformer {
    /// Compile the pattern set.
    ///
    /// # Errors
    ///
    /// Returns an error only if a built-in pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            // bold, italic, underline, strikethrough, monospace, reverse, reset, colours
            irc_formatting: Regex::new(
                r"\x02|\x1d|\x1f|\x1e|\x11|\x16|\x0f|\x03(?:[0-9]{1,2}(?:,[0-9]{1,2})?)?",
            )?,
            // [![asm.png](https://files.gitter.im/org/repo/0I1c/thumb/asm.png)](https://files.gitter.im/org/repo/0I1c/asm.png)
            gitter_thumbnail: Regex::new(
                r"^\[!\[[^\]]+\]\(https?://files\.gitter\.im/[^/]+/[^/]+/[^/]+/thumb/[^)]+\)\]\(([^)]+)\)$",
            )?,
            // [test.exe](https://files.gitter.im/org/repo/ROVJ/test.exe)
            gitter_attachment: Regex::new(
                r"\[[^\]]+\]\((https://files\.gitter\.im/[^/]+/[^/]+/[^/]+/[^)]+)\)$",
            )?,
            status_allow: Regex::new(r"\[Github\].+(opened|closed)")?,
        })
    }

    /// Remove mIRC bold/underline/colour control codes.
    pub fn strip_irc_formatting(&self, text: &str) -> String {
        self.irc_formatting.replace_all(text, "").into_owned()
    }

    /// Replace Gitter upload markup with the bare file link.
    ///
    /// A message that is only a thumbnail image becomes the full-size link;
    /// an attachment link at the end of a message becomes its URL. Anything
    /// else is returned unchanged, so applying this twice is a no-op.
    pub fn rewrite_gitter_upload(&self, text: &str) -> String {
        let text = self.gitter_thumbnail.replace(text, "$1");
        self.gitter_attachment.replace(&text, "$1").into_owned()
    }

    /// Whether a status notice should still be relayed (issue/PR opened or closed).
    pub fn is_status_allowed(&self, text: &str) -> bool {
        self.status_allow.is_match(text)
    }

    /// Full IRC-family normalization: control codes always, upload markup for Gitter.
    pub fn normalize_irc(&self, text: &str, gitter: bool) -> String {
        let stripped = self.strip_irc_formatting(text);
        if gitter {
            self.rewrite_gitter_upload(&stripped)
        } else {
            stripped
        }
    }
}

/// Prefix a line with its author: `<author> text`.
pub fn tag_line(author: &str, text: &str) -> String {
    format!("<{author}> {text}")
}

/// Split text into wire lines, dropping carriage returns and blank lines.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .collect()
}
