//! Text normalization: IRC control codes, Gitter uploads, status filter.

use chatbridge::relay::transform::{split_lines, tag_line, MessageTransformer};

fn transformer() -> MessageTransformer {
    MessageTransformer::new().expect("patterns compile")
}

#[test]
fn plain_text_is_untouched() {
    let t = transformer();
    assert_eq!(t.normalize_irc("just words, 100% plain", true), "just words, 100% plain");
}

#[test]
fn reset_reverse_and_italic_codes_are_removed() {
    let t = transformer();
    assert_eq!(t.strip_irc_formatting("\x1ditalic\x0f \x16rev\x16"), "italic rev");
}

#[test]
fn bare_colour_code_is_removed() {
    let t = transformer();
    assert_eq!(t.strip_irc_formatting("\x03back to default"), "back to default");
}

#[test]
fn gitter_thumbnail_becomes_full_size_link() {
    let t = transformer();
    let text = "[![asm.png](https://files.gitter.im/org/repo/0I1c/thumb/asm.png)](https://files.gitter.im/org/repo/0I1c/asm.png)";
    assert_eq!(
        t.rewrite_gitter_upload(text),
        "https://files.gitter.im/org/repo/0I1c/asm.png"
    );
}

#[test]
fn gitter_attachment_becomes_link() {
    let t = transformer();
    assert_eq!(
        t.rewrite_gitter_upload("[test.exe](https://files.gitter.im/org/repo/ROVJ/test.exe)"),
        "https://files.gitter.im/org/repo/ROVJ/test.exe"
    );
}

#[test]
fn ordinary_markdown_link_is_kept() {
    let t = transformer();
    let text = "[docs](https://example.org/readme)";
    assert_eq!(t.rewrite_gitter_upload(text), text);
}

#[test]
fn rewrite_is_idempotent() {
    let t = transformer();
    let once = t.rewrite_gitter_upload("[a.zip](https://files.gitter.im/o/r/XYZ1/a.zip)");
    assert_eq!(t.rewrite_gitter_upload(&once), once);
}

#[test]
fn upload_markup_only_rewritten_for_gitter() {
    let t = transformer();
    let text = "[a.zip](https://files.gitter.im/o/r/XYZ1/a.zip)";
    assert_eq!(t.normalize_irc(text, false), text);
    assert_eq!(t.normalize_irc(text, true), "https://files.gitter.im/o/r/XYZ1/a.zip");
}

#[test]
fn status_filter_allows_opened_and_closed() {
    let t = transformer();
    assert!(t.is_status_allowed("[Github] bob opened pull request #7"));
    assert!(t.is_status_allowed("[Github] bob closed issue #8"));
    assert!(!t.is_status_allowed("[Github] bob commented on issue #8"));
    assert!(!t.is_status_allowed("[Travis] build opened"));
}

#[test]
fn tag_line_wraps_author() {
    assert_eq!(tag_line("alice", "hi"), "<alice> hi");
}

#[test]
fn split_lines_on_single_line() {
    assert_eq!(split_lines("hello"), vec!["hello"]);
    assert!(split_lines("\r\n  \n").is_empty());
}
