#![allow(dead_code)]

use std::path::PathBuf;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A fresh, empty scratch directory for one test.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("e64-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}
