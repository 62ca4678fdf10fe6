// Fails the build when a source file suppresses a lint with an allow attribute.
// Set CHECK_NO_ALLOW=0 to skip the scan.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const SCANNED_DIRS: [&str; 3] = ["src", "tests", "benches"];

struct Suppression {
    file: PathBuf,
    line: usize,
    text: String,
}

fn main() {
    println!("cargo:rerun-if-env-changed=CHECK_NO_ALLOW");
    for dir in SCANNED_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    if env::var("CHECK_NO_ALLOW").is_ok_and(|v| v == "0") {
        return;
    }

    let root = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir"));
    let found: Vec<Suppression> = SCANNED_DIRS
        .iter()
        .map(|dir| root.join(dir))
        .filter(|dir| dir.is_dir())
        .flat_map(|dir| rust_files(&dir))
        .flat_map(|file| suppressions_in(&file))
        .collect();

    if found.is_empty() {
        return;
    }

    for s in &found {
        eprintln!("{}:{}: {}", s.file.display(), s.line, s.text.trim());
    }
    panic!(
        "{} lint suppression attribute(s) found in streamfold; fix the lint instead",
        found.len()
    );
}

fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).expect("read dir") {
        let path = entry.expect("dir entry").path();
        if path.is_dir() {
            files.extend(rust_files(&path));
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
    files
}

fn suppressions_in(file: &Path) -> Vec<Suppression> {
    let needle = concat!("#", "[allow");
    let inner_needle = concat!("#!", "[allow");
    let Ok(content) = fs::read_to_string(file) else {
        return Vec::new();
    };
    content
        .lines()
        .enumerate()
        .filter(|(_, text)| text.contains(needle) || text.contains(inner_needle))
        .map(|(idx, text)| Suppression {
            file: file.to_path_buf(),
            line: idx + 1,
            text: text.to_string(),
        })
        .collect()
}
