use regex::Regex;
use std::collections::BTreeSet;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Every `.rs` file below `root`, walked without recursion.
fn source_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut files = Vec::new();
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
    }
    Ok(files)
}

/// `ILOG_*` keys mentioned anywhere in the sources. A key glued to a longer
/// identifier (like the generated constant's own name) does not count.
fn referenced_env_keys(files: &[PathBuf]) -> std::io::Result<BTreeSet<String>> {
    let key = Regex::new(r"\bILOG_[A-Z0-9_]+").map_err(std::io::Error::other)?;
    let mut keys = BTreeSet::new();
    for file in files {
        let source = fs::read_to_string(file)?;
        keys.extend(key.find_iter(&source).map(|m| m.as_str().to_string()));
    }
    Ok(keys)
}

fn render_allowlist(keys: &BTreeSet<String>) -> String {
    let mut out = String::from("pub const GENERATED_ILOG_ENV_ALLOWLIST: &[&str] = &[\n");
    for key in keys {
        let _ = writeln!(out, "    {key:?},");
    }
    out.push_str("];\n");
    out
}

fn main() -> std::io::Result<()> {
    let files = source_files(Path::new("src"))?;
    let keys = referenced_env_keys(&files)?;
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
        std::io::Error::other("OUT_DIR is not set")
    })?);
    fs::write(out_dir.join("ilog_env_allowlist.rs"), render_allowlist(&keys))?;

    let since_epoch = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    println!(
        "cargo:rustc-env=BUILD_UUID={:x}-{:x}",
        since_epoch.as_secs(),
        since_epoch.subsec_nanos()
    );
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
    Ok(())
}
