/// Facts about one installed dependency, recovered from the installer report.
///
/// Include and library paths are always absolute. The value is only used to fold
/// paths into (or out of) the project's `[source]` arrays; it is never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    pub package_ref: String,
    pub libs: Vec<String>,
    pub include_paths: Vec<String>,
    pub lib_paths: Vec<String>,
}

impl PackageInfo {
    pub fn is_empty(&self) -> bool {
        self.libs.is_empty() && self.include_paths.is_empty() && self.lib_paths.is_empty()
    }
}
