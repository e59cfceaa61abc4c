//! End-to-end multi-workspace scenarios, run against the built `cling`
//! binary the way a user would invoke it.

mod common;

use common::{attach_workspace, cling_in, cling_ok, commit, setup_repo_and_workspace, write_file};

#[test]
fn independent_adds_converge() {
    let (repo, w1) = setup_repo_and_workspace();
    write_file(w1.path(), "a.txt", "a");
    commit(w1.path(), "add a.txt");

    let w2 = attach_workspace(repo.path(), None);
    commit(w2.path(), "pull");

    let contents = std::fs::read_to_string(w2.path().join("a.txt")).expect("a.txt restored in w2");
    assert_eq!(contents, "a");

    let head1 = cling_ok(w1.path(), &["log", "--short"]);
    let head2 = cling_ok(w2.path(), &["log", "--short"]);
    assert_eq!(head1, head2);
}

#[test]
fn conflicting_adds_are_reported_and_block_the_head() {
    let (repo, w1) = setup_repo_and_workspace();
    write_file(w1.path(), "a.txt", "a");
    commit(w1.path(), "add a.txt (w1)");

    let w2 = attach_workspace(repo.path(), None);
    write_file(w2.path(), "a.txt", "aa");
    let out = cling_in(w2.path(), &["commit", "--message", "add a.txt (w2)"]);

    assert!(!out.status.success(), "conflicting commit should fail");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("conflict"), "expected a conflict message, got: {stderr}");

    // The merge is fail-fast: w2's local head is not advanced, so its
    // rewrite of a.txt is still an uncommitted local change.
    let status = cling_ok(w2.path(), &["status", "--short"]);
    assert!(status.contains("a.txt"), "a.txt should still show as a pending local change: {status}");
}

#[test]
fn remote_delete_under_subtree_merges_with_local_add() {
    let (repo, w1) = setup_repo_and_workspace();
    write_file(w1.path(), "b/c.txt", "c");
    commit(w1.path(), "add b/c.txt");

    let w2 = attach_workspace(repo.path(), None);
    commit(w2.path(), "pull b/c.txt");
    assert!(w2.path().join("b/c.txt").exists());

    std::fs::remove_file(w1.path().join("b/c.txt")).unwrap();
    commit(w1.path(), "remove b/c.txt");

    write_file(w2.path(), "b/d.txt", "d");
    commit(w2.path(), "add b/d.txt");

    assert!(!w2.path().join("b/c.txt").exists(), "b/c.txt should be gone after merge");
    let contents = std::fs::read_to_string(w2.path().join("b/d.txt")).unwrap();
    assert_eq!(contents, "d");

    let head1 = cling_ok(w1.path(), &["log", "--short"]);
    assert!(!head1.trim().is_empty());
}

#[test]
fn path_prefix_scopes_status_and_ls_to_the_subtree() {
    let (repo, w_root) = setup_repo_and_workspace();
    write_file(w_root.path(), "a.txt", "a");
    write_file(w_root.path(), "look/here/b.txt", "b");
    commit(w_root.path(), "seed root and subtree files");

    let w_prefix = attach_workspace(repo.path(), Some("look/here"));
    commit(w_prefix.path(), "pull scoped subtree");

    assert!(w_prefix.path().join("b.txt").exists());
    assert!(!w_prefix.path().join("a.txt").exists());
    assert!(!w_prefix.path().join("look").exists());

    let listing = cling_ok(w_prefix.path(), &["ls"]);
    assert!(listing.contains("b.txt"));
    assert!(!listing.contains("a.txt"));

    write_file(w_prefix.path(), "c.txt", "c");
    commit(w_prefix.path(), "add c.txt under prefix");

    // `ls`/`log` resolve HEAD straight from the repository, not the
    // workspace's cached local head, so w_root sees the new revision
    // without having to merge first.
    let full_listing = cling_ok(w_root.path(), &["ls", "look/here"]);
    assert!(full_listing.contains("c.txt"));
}
