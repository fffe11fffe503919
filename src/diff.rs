use crate::inventory::{Directory, File};
use std::collections::HashSet;

/// Compare a local and remote inventory. Asymmetric by design: files that
/// exist only on the remote are never reported, since they may belong to a
/// concurrent writer and are not this system's responsibility to reconcile.
pub fn diff(local: &Directory, remote: &Directory) -> (HashSet<File>, HashSet<File>) {
    let local_set: HashSet<File> = local.iter().cloned().collect();
    let remote_set: HashSet<File> = remote.iter().cloned().collect();

    let in_sync = local_set.intersection(&remote_set).cloned().collect();
    let missing_remote = local_set.difference(&remote_set).cloned().collect();

    (in_sync, missing_remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, size: u64, md5: &str) -> File {
        File { relative_path: path.to_string(), size, md5: md5.to_string() }
    }

    #[test]
    fn test_diff_reports_missing_remote() {
        let local = Directory::from_unsorted_for_test(vec![
            file("a.txt", 1, "aaaa"),
            file("b.txt", 2, "bbbb"),
        ]);
        let remote = Directory::from_unsorted_for_test(vec![file("a.txt", 1, "aaaa")]);

        let (in_sync, missing) = diff(&local, &remote);
        assert_eq!(in_sync.len(), 1);
        assert!(in_sync.contains(&file("a.txt", 1, "aaaa")));
        assert_eq!(missing.len(), 1);
        assert!(missing.contains(&file("b.txt", 2, "bbbb")));
    }

    #[test]
    fn test_diff_never_reports_remote_only_files() {
        let local = Directory::from_unsorted_for_test(vec![file("a.txt", 1, "aaaa")]);
        let remote = Directory::from_unsorted_for_test(vec![
            file("a.txt", 1, "aaaa"),
            file("stray.txt", 9, "ffff"),
        ]);

        let (in_sync, missing) = diff(&local, &remote);
        assert_eq!(in_sync.len(), 1);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_diff_treats_same_path_different_content_as_missing() {
        let local = Directory::from_unsorted_for_test(vec![file("a.txt", 1, "aaaa")]);
        let remote = Directory::from_unsorted_for_test(vec![file("a.txt", 1, "zzzz")]);

        let (in_sync, missing) = diff(&local, &remote);
        assert!(in_sync.is_empty());
        assert_eq!(missing.len(), 1);
    }

    #[test]
    fn test_diff_empty_local_is_trivially_in_sync() {
        let local = Directory::default();
        let remote = Directory::from_unsorted_for_test(vec![file("a.txt", 1, "aaaa")]);

        let (in_sync, missing) = diff(&local, &remote);
        assert!(in_sync.is_empty());
        assert!(missing.is_empty());
    }
}
