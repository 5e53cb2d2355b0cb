/// Directory names the crawler never descends into.
const SKIPPED_DIRECTORIES: &[&str] = &[
    ".git",
    ".github",
    ".gitlab",
    ".svn",
    ".hg",
    "node_modules",
    "__pycache__",
    ".tox",
    ".venv",
    "venv",
    ".cache",
    ".pytest_cache",
    "build",
    "dist",
    "target",
    "out",
    "tests",
    "test",
    "docs",
];

/// True if `file_name` is a collection descriptor (`galaxy.yml` / `galaxy.yaml`).
pub fn is_descriptor_file(file_name: &str) -> bool {
    file_name.eq_ignore_ascii_case("galaxy.yml") || file_name.eq_ignore_ascii_case("galaxy.yaml")
}

/// True if a directory with this name should not be crawled.
pub fn is_skipped_directory(dir_name: &str) -> bool {
    SKIPPED_DIRECTORIES.contains(&dir_name)
}

/// Strip leading/trailing slashes and `./` so path filters compare cleanly.
/// Returns an empty string for the repository root.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_start_matches("./").trim_matches('/');
    if trimmed == "." {
        String::new()
    } else {
        trimmed.to_owned()
    }
}

/// Join a directory path and a child name, treating `""` as the root.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}/{name}")
    }
}
