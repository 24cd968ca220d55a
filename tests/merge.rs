use camino::{Utf8Path, Utf8PathBuf};

use kira_edges::merge::MergeEngine;

fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn write(dir: &Utf8Path, name: &str, lines: &[&str]) -> Utf8PathBuf {
    let path = dir.join(name);
    std::fs::write(path.as_std_path(), lines.concat()).unwrap();
    path
}

fn read(path: &Utf8Path) -> String {
    std::fs::read_to_string(path.as_std_path()).unwrap()
}

fn merge(inputs: &[Utf8PathBuf], output: &Utf8Path) -> String {
    MergeEngine::new()
        .verify_sorted(true)
        .merge(inputs, output)
        .unwrap();
    read(output)
}

#[test]
fn duplicate_line_collapses_once() {
    let (_temp, dir) = temp_dir();
    let a = write(&dir, "a.tsv", &["a\tb\n", "c\td\n"]);
    let b = write(&dir, "b.tsv", &["a\tb\n", "e\tf\n"]);

    let merged = merge(&[a, b], &dir.join("out.tsv"));
    assert_eq!(merged, "a\tb\nc\td\ne\tf\n");
}

#[test]
fn merging_file_with_itself_is_identity() {
    let (_temp, dir) = temp_dir();
    let a = write(&dir, "a.tsv", &["P1\tR-1\n", "P2\tR-2\n", "P3\tR-1\n"]);

    let merged = merge(&[a.clone(), a.clone()], &dir.join("out.tsv"));
    assert_eq!(merged, read(&a));
}

#[test]
fn remerging_is_duplicate_insensitive() {
    let (_temp, dir) = temp_dir();
    let a = write(&dir, "a.tsv", &["a\n", "c\n", "e\n"]);
    let b = write(&dir, "b.tsv", &["b\n", "c\n", "f\n"]);

    let ab = dir.join("ab.tsv");
    let once = merge(&[a, b.clone()], &ab);
    let twice = merge(&[ab, b], &dir.join("abb.tsv"));
    assert_eq!(once, twice);
}

#[test]
fn output_is_sorted_and_order_independent() {
    let (_temp, dir) = temp_dir();
    let a = write(&dir, "a.tsv", &["9606.A\t9606.B\n", "9606.C\t9606.D\n", "Z\tZ\n"]);
    let b = write(&dir, "b.tsv", &["10090.A\t10090.B\n", "9606.C\t9606.D\n"]);
    let c = write(&dir, "c.tsv", &[]);

    let forward = merge(&[a.clone(), b.clone(), c.clone()], &dir.join("f.tsv"));
    let backward = merge(&[c, b, a], &dir.join("r.tsv"));
    assert_eq!(forward, backward);

    let lines: Vec<&str> = forward.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines.windows(2).all(|pair| pair[0].as_bytes() <= pair[1].as_bytes()));
}

#[test]
fn byte_order_not_locale_order() {
    let (_temp, dir) = temp_dir();
    let a = write(&dir, "a.tsv", &["B\n", "a\n"]);
    let b = write(&dir, "b.tsv", &["A\n", "b\n"]);
    assert_eq!(merge(&[a, b], &dir.join("out.tsv")), "A\nB\na\nb\n");
}

#[test]
fn failed_merge_leaves_previous_output() {
    let (_temp, dir) = temp_dir();
    let out = write(&dir, "out.tsv", &["previous\n"]);
    let result = MergeEngine::new().merge(&[dir.join("missing.tsv")], &out);
    assert!(result.is_err());
    assert_eq!(read(&out), "previous\n");
}

#[test]
fn prefix_line_sorts_before_its_extension() {
    let (_temp, dir) = temp_dir();
    let a = write(&dir, "a.tsv", &["P1\n"]);
    let b = write(&dir, "b.tsv", &["P1\tR-1\n"]);

    let merged = merge(&[b, a], &dir.join("out.tsv"));
    assert_eq!(merged, "P1\nP1\tR-1\n");
    let lines: Vec<&str> = merged.lines().collect();
    assert!(lines.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn verification_accepts_c_locale_order() {
    let (_temp, dir) = temp_dir();
    let a = write(&dir, "a.tsv", &["P1\n", "P1\tR-1\n", "P1\tR-2\n", "P2\n"]);

    let merged = merge(&[a.clone()], &dir.join("out.tsv"));
    assert_eq!(merged, read(&a));
}
