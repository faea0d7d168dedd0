//! Source path normalization.
//!
//! Route and middleware modules are addressed by the path they were
//! discovered at, relative to the routes root (`(group)/[slug]/route.ts`).

const MODULE_EXTENSIONS: [&str; 4] = ["mjs", "cjs", "js", "ts"];

/// Normalize separators and strip leading/trailing slashes.
pub fn normalize_source(raw: &str) -> String {
    raw.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Directory of a module path: drops a trailing `{stem}.{mjs,cjs,js,ts}` file name.
pub fn module_dir(raw: &str, stem: &str) -> String {
    let normalized = normalize_source(raw);
    match normalized.rsplit_once('/') {
        Some((dir, file)) if is_module_file(file, stem) => dir.to_string(),
        None if is_module_file(&normalized, stem) => String::new(),
        _ => normalized,
    }
}

fn is_module_file(file: &str, stem: &str) -> bool {
    file.strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|ext| MODULE_EXTENSIONS.contains(&ext))
}

/// Route string with group segments removed, always starting with `/`.
pub fn clean_route(dir: &str) -> String {
    let kept: Vec<&str> = dir
        .split('/')
        .filter(|s| !s.is_empty() && !is_group(s))
        .collect();
    format!("/{}", kept.join("/"))
}

/// `(name)` segments only organize the tree; they never match.
pub fn is_group(segment: &str) -> bool {
    segment
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .is_some_and(|inner| {
            !inner.is_empty()
                && inner
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '$'))
        })
}

/// Every directory from the root (`""`) down to `dir`, root first.
pub fn ancestor_dirs(dir: &str) -> Vec<String> {
    let mut dirs = vec![String::new()];
    let mut current = String::new();
    for segment in dir.split('/').filter(|s| !s.is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        dirs.push(current.clone());
    }
    dirs
}
