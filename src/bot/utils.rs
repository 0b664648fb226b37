use crate::bot::gitlab::{Change, MergeRequestCommit};

pub(crate) fn shorten_content(content: &str) -> String {
    let max_length = 72;
    if content.len() <= max_length {
        content.to_owned()
    } else {
        content.chars().take(max_length).collect::<String>() + "…"
    }
}

/// Markdown rendering of a changed file, with its old path when the change
/// moved it.
pub(crate) fn changed_path(change: &Change) -> String {
    if !change.old_path.is_empty() && change.old_path != change.new_path {
        format!("`{}` (moved from `{}`)", change.new_path, change.old_path)
    } else {
        format!("`{}`", change.new_path)
    }
}

pub(crate) fn short_sha(commit: &MergeRequestCommit) -> &str {
    if !commit.short_id.is_empty() {
        &commit.short_id
    } else {
        commit.id.get(..8).unwrap_or(&commit.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_path_annotates_moves() {
        let change = Change {
            diff: String::new(),
            old_path: "src/old.rs".to_owned(),
            new_path: "src/new.rs".to_owned(),
        };
        assert_eq!(changed_path(&change), "`src/new.rs` (moved from `src/old.rs`)");

        let unmoved = Change {
            diff: String::new(),
            old_path: "src/lib.rs".to_owned(),
            new_path: "src/lib.rs".to_owned(),
        };
        assert_eq!(changed_path(&unmoved), "`src/lib.rs`");
    }

    #[test]
    fn short_sha_falls_back_to_a_truncated_id() {
        let commit = MergeRequestCommit {
            id: "0123456789abcdef".to_owned(),
            ..MergeRequestCommit::default()
        };
        assert_eq!(short_sha(&commit), "01234567");

        let with_short = MergeRequestCommit {
            id: "0123456789abcdef".to_owned(),
            short_id: "0123456".to_owned(),
            ..MergeRequestCommit::default()
        };
        assert_eq!(short_sha(&with_short), "0123456");
    }
}
