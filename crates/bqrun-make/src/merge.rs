//! Sentinel-delimited merge of generated rules into an existing file

/// Replace everything from the first `sentinel` line onward with the
/// sentinel followed by `generated`.
///
/// Content before the sentinel is kept byte for byte (a missing final
/// newline is added). Without a sentinel the block is appended.
pub fn merge_generated(existing: &str, sentinel: &str, generated: &str) -> String {
    let mut merged = String::with_capacity(existing.len() + generated.len());

    for line in existing.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == sentinel {
            break;
        }
        merged.push_str(line);
    }

    if !merged.is_empty() && !merged.ends_with('\n') {
        merged.push('\n');
    }

    merged.push_str(sentinel);
    merged.push('\n');
    merged.push_str(generated);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SENTINEL: &str = "# ---- generated ----";

    #[test]
    fn appends_when_sentinel_is_absent() {
        let merged = merge_generated("deploy:\n\t./deploy.sh\n", SENTINEL, "all: x\n");
        assert_eq!(merged, "deploy:\n\t./deploy.sh\n# ---- generated ----\nall: x\n");
    }

    #[test]
    fn replaces_everything_after_first_sentinel() {
        let existing = "keep\n# ---- generated ----\nold\n# ---- generated ----\nolder\n";
        let merged = merge_generated(existing, SENTINEL, "new\n");
        assert_eq!(merged, "keep\n# ---- generated ----\nnew\n");
    }

    #[test]
    fn merging_twice_is_stable() {
        let once = merge_generated("keep", SENTINEL, "all: x\n");
        let twice = merge_generated(&once, SENTINEL, "all: x\n");
        assert_eq!(once, "keep\n# ---- generated ----\nall: x\n");
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_file() {
        assert_eq!(merge_generated("", SENTINEL, "all:\n"), "# ---- generated ----\nall:\n");
    }

    #[test]
    fn sentinel_must_match_a_whole_line() {
        let existing = "echo '# ---- generated ----'\n";
        let merged = merge_generated(existing, SENTINEL, "x\n");
        assert!(merged.starts_with(existing));
    }
}
