//! Locating optional real granules for tests.
//!
//! MOD13Q1 granules are around 100 MB each, so none are checked in. Tests
//! that want one look it up here and skip when it is missing.

use std::path::PathBuf;

/// Environment variable pointing at a directory of downloaded granules.
pub const TEST_DATA_ENV: &str = "TEST_DATA_DIR";

/// Workspace root, two levels above this crate's manifest.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(2)
        .map(PathBuf::from)
        .unwrap_or(manifest_dir)
}

/// Directories searched for granules, in order: `$TEST_DATA_DIR`, the
/// hdf-parser and ndvi testdata dirs, then `testdata/` at the root.
pub fn granule_search_dirs() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut dirs: Vec<PathBuf> = std::env::var_os(TEST_DATA_ENV).map(PathBuf::from).into_iter().collect();
    dirs.push(root.join("crates").join("hdf-parser").join("testdata"));
    dirs.push(root.join("crates").join("ndvi").join("testdata"));
    dirs.push(root.join("testdata"));
    dirs
}

/// First existing file called `name` in [`granule_search_dirs`].
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    granule_search_dirs()
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}
