// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    plain = { "ada", "ada" },
    tag = { "<script>alert(1)</script>", "&lt;script&gt;alert(1)&lt;/script&gt;" },
    quotes = { r#"a"b'c"#, "a&quot;b&#39;c" },
    amp = { "R&D", "R&amp;D" },
)]
fn escapes_html(input: &str, expected: &str) {
    assert_eq!(escape_html(input), expected);
}

#[test]
fn success_template_has_placeholder() {
    assert!(SUCCESS_HTML.contains("{{user}}"));
}
