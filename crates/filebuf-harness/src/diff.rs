//! Diff rendering for transcript comparison.

/// Render a line diff between expected and actual transcripts.
#[must_use]
pub fn render_diff(expected: &str, actual: &str) -> String {
    if expected == actual {
        return String::from("[identical]");
    }

    let mut out = String::new();
    out.push_str("--- expected\n");
    out.push_str("+++ actual\n");
    let expected_lines: Vec<&str> = expected.lines().collect();
    let actual_lines: Vec<&str> = actual.lines().collect();
    let longest = expected_lines.len().max(actual_lines.len());
    for i in 0..longest {
        let e = expected_lines.get(i);
        let a = actual_lines.get(i);
        if e == a {
            continue;
        }
        out.push_str(&format!("@@ line {} @@\n", i + 1));
        if let Some(e) = e {
            out.push_str(&format!("-{e}\n"));
        }
        if let Some(a) = a {
            out.push_str(&format!("+{a}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical() {
        assert_eq!(render_diff("a\nb", "a\nb"), "[identical]");
    }

    #[test]
    fn changed_line() {
        let d = render_diff("get 'a'\nget eof", "get 'a'\nget 'b'");
        assert!(d.contains("@@ line 2 @@\n-get eof\n+get 'b'\n"));
        assert!(!d.contains("line 1"));
    }

    #[test]
    fn missing_and_extra_lines_are_shown() {
        let d = render_diff("a\nb\nc", "a");
        assert!(d.contains("@@ line 2 @@\n-b\n"));
        assert!(d.contains("@@ line 3 @@\n-c\n"));
        let d = render_diff("a", "a\nz");
        assert!(d.contains("@@ line 2 @@\n+z\n"));
    }
}
