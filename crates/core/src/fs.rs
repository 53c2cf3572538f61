use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::Path;

pub trait FileSystem: Sync {
    fn exists(&self, path: &Path) -> bool;

    // must refuse to replace an existing `to` unless it is the same file as `from`
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn read_dir_names(&self, dir: &Path) -> io::Result<Vec<OsString>>;

    fn is_case_sensitive(&self, dir: &Path) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if fs::symlink_metadata(to).is_ok() && !same_file(from, to) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("refusing to replace existing entry {}", to.display()),
            ));
        }
        fs::rename(from, to)
    }

    fn read_dir_names(&self, dir: &Path) -> io::Result<Vec<OsString>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            names.push(entry?.file_name());
        }
        Ok(names)
    }

    fn is_case_sensitive(&self, dir: &Path) -> bool {
        for ancestor in dir.ancestors() {
            let Some(name) = ancestor.file_name().and_then(|v| v.to_str()) else {
                continue;
            };
            let toggled = toggle_ascii_case(name);
            if toggled == name {
                continue;
            }
            let flipped = ancestor.with_file_name(toggled);
            if fs::symlink_metadata(ancestor).is_err() {
                continue;
            }
            return !same_file(ancestor, &flipped);
        }
        !cfg!(any(target_os = "macos", target_os = "windows"))
    }
}

pub fn case_fold(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

fn toggle_ascii_case(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_lowercase() {
                ch.to_ascii_uppercase()
            } else {
                ch.to_ascii_lowercase()
            }
        })
        .collect()
}

#[cfg(unix)]
fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::symlink_metadata(a), fs::symlink_metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => case_fold(&a) == case_fold(&b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rename_refuses_to_replace_existing_target() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a.txt");
        let b = temp.path().join("b.txt");
        fs::write(&a, b"a").expect("write a");
        fs::write(&b, b"b").expect("write b");

        let err = RealFileSystem.rename(&a, &b).expect_err("must refuse");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&b).expect("read b"), b"b");
        assert!(a.exists());
    }

    #[test]
    fn rename_moves_into_free_slot() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a.txt");
        let c = temp.path().join("c.txt");
        fs::write(&a, b"a").expect("write a");

        RealFileSystem.rename(&a, &c).expect("rename");
        assert!(!a.exists());
        assert!(c.exists());
    }

    #[test]
    fn read_dir_names_lists_entries() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("one"), b"").expect("write");
        fs::write(temp.path().join("two"), b"").expect("write");

        let mut names = RealFileSystem
            .read_dir_names(temp.path())
            .expect("read dir");
        names.sort();
        assert_eq!(names, vec![OsString::from("one"), OsString::from("two")]);
    }

    #[test]
    fn case_fold_lowercases_whole_path() {
        assert_eq!(case_fold(Path::new("/Photos/IMG.JPG")), "/photos/img.jpg");
    }
}
